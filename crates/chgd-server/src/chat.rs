//! Chat bridge: classifies the user's question, assembles grounding data
//! from the store, and delegates prose to the text generator.

use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde_json::json;
use tracing::warn;

use chgd_core::chat::ChatRequest;
use chgd_core::generate::{GenerateOptions, TextGenerator};
use chgd_core::query::{SortBy, SortOrder, TicketFilters};
use chgd_core::ticket::{ChangeTicket, ComplianceStatus, Priority, TicketStatus};
use chgd_engine::{EngineError, QueryEngine, StatsAggregator};
use chgd_store::Database;

pub const DEFAULT_GENERATE_TIMEOUT: Duration = Duration::from_secs(30);

/// Returned verbatim whenever generation fails, times out, or produces
/// nothing.
pub const FALLBACK_REPLY: &str = "I couldn't generate a response. Please try again.";

const SYSTEM_PROMPT: &str = "You are a helpful assistant for a change ticket compliance dashboard.
You help controls team members review change tickets, understand compliance issues, and provide guidance on how to fix them.

You have access to the following ticket data:

{tickets_data}

Key concepts:
- Each ticket has a compliance status: \"compliant\" (green), \"warning\" (yellow), or \"non-compliant\" (red)
- Tickets are validated against 6 rules:
  1. Required Fields - all mandatory fields must be filled (error)
  2. Approval Chain - enough approvers assigned for the ticket's priority (error)
  3. Testing Evidence - test results attached for High and Critical changes (warning)
  4. Schedule Order - the scheduled start must come before the scheduled end (error)
  5. Change Window - a change window must be specified and contain the schedule (warning)
  6. Rollback Plan - a rollback procedure must be documented (error)

Compliance status logic:
- \"non-compliant\": at least one error-severity rule failed
- \"warning\": no errors failed, but at least one warning-severity rule failed
- \"compliant\": every rule passed

Formatting guidelines:
- Always respond in Markdown format for better readability
- Use tables when presenting multiple tickets or comparing data (e.g., | Ticket | Status | Priority |)
- Use bullet points for lists of items or issues
- Use **bold** for ticket numbers and important terms
- Use headings (##, ###) to organize longer responses
- Be concise but helpful
- Always reference ticket numbers (CHG...) when discussing specific tickets";

/// What the last user message is asking for. Decides which slice of ticket
/// data is handed to the generator.
#[derive(Debug)]
enum Intent {
    /// Why a specific ticket fails: grounded on its failed results only.
    Explanation(String),
    /// A specific ticket, any other question: grounded on its full summary.
    Lookup(String),
    /// A listing request with a recognizable filter word.
    FilteredList(TicketFilters),
    /// Counting and summary questions.
    Stats,
    /// Everything else: grounded on the compact all-ticket summary.
    General,
}

/// Grounding assembly either yields data for the generator or resolves the
/// question outright.
enum Grounding {
    Data(String),
    ShortCircuit(String),
}

pub struct ChatBridge {
    query: QueryEngine,
    stats: StatsAggregator,
    generator: Arc<dyn TextGenerator>,
    timeout: Duration,
}

impl ChatBridge {
    pub fn new(db: Database, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            query: QueryEngine::new(db.clone()),
            stats: StatsAggregator::new(db),
            generator,
            timeout: DEFAULT_GENERATE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Answer the latest user question in the transcript. Stateless: the
    /// full transcript arrives on every call.
    pub async fn respond(&self, request: &ChatRequest) -> String {
        let question = request.latest_question().unwrap_or("");
        let intent = classify(question);

        let grounding = match self.grounding_for(&intent) {
            Ok(Grounding::Data(data)) => data,
            Ok(Grounding::ShortCircuit(reply)) => return reply,
            Err(e) => {
                warn!(error = %e, "grounding assembly failed");
                return FALLBACK_REPLY.to_string();
            }
        };

        let system = SYSTEM_PROMPT.replace("{tickets_data}", &grounding);
        let options = GenerateOptions::default();

        let generation = tokio::time::timeout(
            self.timeout,
            self.generator.generate(&system, &request.messages, &options),
        );

        match generation.await {
            Ok(Ok(text)) if !text.is_empty() => text,
            Ok(Ok(_)) => FALLBACK_REPLY.to_string(),
            Ok(Err(e)) => {
                warn!(error = %e, "generation failed");
                FALLBACK_REPLY.to_string()
            }
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "generation timed out");
                FALLBACK_REPLY.to_string()
            }
        }
    }

    fn grounding_for(&self, intent: &Intent) -> Result<Grounding, EngineError> {
        match intent {
            Intent::Explanation(number) => match self.query.get_by_number(number) {
                Ok(ticket) => {
                    let data = json!({
                        "number": ticket.number,
                        "complianceStatus": ticket.compliance_status,
                        "failedValidations": ticket.failed_results(),
                    });
                    Ok(Grounding::Data(pretty(&data)))
                }
                Err(EngineError::NotFound(_)) => {
                    Ok(Grounding::ShortCircuit(not_found_reply(number)))
                }
                Err(e) => Err(e),
            },
            Intent::Lookup(number) => match self.query.get_by_number(number) {
                Ok(ticket) => {
                    let failed = failed_rule_names(&ticket);
                    let data = json!({
                        "ticket": ticket,
                        "failedValidations": failed,
                    });
                    Ok(Grounding::Data(pretty(&data)))
                }
                Err(EngineError::NotFound(_)) => {
                    Ok(Grounding::ShortCircuit(not_found_reply(number)))
                }
                Err(e) => Err(e),
            },
            Intent::FilteredList(filters) => {
                let page = self.query.list(
                    filters,
                    SortBy::default(),
                    SortOrder::default(),
                    1,
                    100,
                )?;
                Ok(Grounding::Data(pretty(&json!(page))))
            }
            Intent::Stats => {
                let stats = self.stats.compute()?;
                Ok(Grounding::Data(pretty(&json!(stats))))
            }
            Intent::General => {
                let summaries: Vec<serde_json::Value> =
                    self.query.scan()?.iter().map(compact_summary).collect();
                Ok(Grounding::Data(pretty(&json!(summaries))))
            }
        }
    }
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn not_found_reply(number: &str) -> String {
    format!(
        "I couldn't find a ticket numbered **{number}**. Double-check the number and try again."
    )
}

fn failed_rule_names(ticket: &ChangeTicket) -> Vec<String> {
    ticket
        .failed_results()
        .iter()
        .map(|r| r.rule.clone())
        .collect()
}

/// The original backend's per-ticket context shape: identity, people,
/// verdicts, failed rule names, and artifact presence flags.
fn compact_summary(ticket: &ChangeTicket) -> serde_json::Value {
    json!({
        "id": ticket.id,
        "number": ticket.number,
        "shortDescription": ticket.short_description,
        "assignedTo": ticket.assigned_to,
        "requestedBy": ticket.requested_by,
        "priority": ticket.priority,
        "status": ticket.status,
        "complianceStatus": ticket.compliance_status,
        "scheduledStartDate": ticket.scheduled_start_date,
        "failedValidations": failed_rule_names(ticket),
        "hasApprovalChain": ticket.approval_chain.as_ref().is_some_and(|c| !c.is_empty()),
        "hasTestingEvidence": ticket.testing_evidence.is_some(),
        "hasRollbackPlan": ticket.rollback_plan.is_some(),
        "hasChangeWindow": ticket.change_window.is_some(),
    })
}

fn ticket_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bCHG\d{7}\b").expect("ticket number pattern"))
}

fn list_verb_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(show|list|find)\b").expect("list verb pattern"))
}

fn has_word(text: &str, word: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric() && c != '-')
        .any(|w| w == word)
}

fn classify(question: &str) -> Intent {
    let lower = question.to_lowercase();

    if let Some(m) = ticket_number_re().find(question) {
        let number = m.as_str().to_uppercase();
        let explanation = lower.contains("why")
            || lower.contains("non-compliant")
            || lower.contains("noncompliant")
            || lower.contains("fail");
        return if explanation {
            Intent::Explanation(number)
        } else {
            Intent::Lookup(number)
        };
    }

    if list_verb_re().is_match(&lower) {
        if let Some(filters) = extract_filters(&lower) {
            return Intent::FilteredList(filters);
        }
    }

    let stats = lower.contains("how many")
        || has_word(&lower, "count")
        || has_word(&lower, "stats")
        || has_word(&lower, "statistics")
        || has_word(&lower, "summary")
        || has_word(&lower, "overview");
    if stats {
        return Intent::Stats;
    }

    Intent::General
}

/// Map recognizable filter words in the question to ticket filters.
/// "non-compliant" must win over its "compliant" substring.
fn extract_filters(lower: &str) -> Option<TicketFilters> {
    let mut filters = TicketFilters::default();

    if has_word(lower, "non-compliant") || has_word(lower, "noncompliant") {
        filters.compliance = Some(ComplianceStatus::NonCompliant);
    } else if has_word(lower, "compliant") {
        filters.compliance = Some(ComplianceStatus::Compliant);
    } else if has_word(lower, "warning") || has_word(lower, "warnings") {
        filters.compliance = Some(ComplianceStatus::Warning);
    }

    if has_word(lower, "critical") {
        filters.priority = Some(Priority::Critical);
    } else if has_word(lower, "high") {
        filters.priority = Some(Priority::High);
    } else if has_word(lower, "medium") {
        filters.priority = Some(Priority::Medium);
    } else if has_word(lower, "low") {
        filters.priority = Some(Priority::Low);
    }

    if has_word(lower, "pending") {
        filters.status = Some(TicketStatus::PendingApproval);
    } else if has_word(lower, "approved") {
        filters.status = Some(TicketStatus::Approved);
    } else if has_word(lower, "rejected") {
        filters.status = Some(TicketStatus::Rejected);
    } else if lower.contains("in review") {
        filters.status = Some(TicketStatus::InReview);
    }

    if filters.is_empty() {
        None
    } else {
        Some(filters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chgd_core::chat::ChatMessage;
    use chgd_core::errors::GatewayError;
    use chgd_engine::{RulePolicy, Validator};
    use chgd_llm::{MockGenerator, MockReply};
    use chgd_store::TicketRepo;

    fn seeded_db() -> Database {
        let db = Database::in_memory().unwrap();
        let repo = TicketRepo::new(db.clone());
        let validator = Validator::new(&RulePolicy::default());
        validator.seed_if_empty(&repo).unwrap();
        db
    }

    fn bridge_with(replies: Vec<MockReply>) -> (ChatBridge, Arc<MockGenerator>) {
        let generator = Arc::new(MockGenerator::new(replies));
        let bridge = ChatBridge::new(seeded_db(), generator.clone());
        (bridge, generator)
    }

    fn ask(question: &str) -> ChatRequest {
        ChatRequest {
            messages: vec![ChatMessage::user(question)],
        }
    }

    #[test]
    fn classify_explanation_on_number_plus_why() {
        let intent = classify("Why is CHG0012348 non-compliant?");
        assert!(matches!(intent, Intent::Explanation(n) if n == "CHG0012348"));
    }

    #[test]
    fn classify_lookup_on_bare_number() {
        let intent = classify("Tell me about chg0012345");
        assert!(matches!(intent, Intent::Lookup(n) if n == "CHG0012345"));
    }

    #[test]
    fn classify_filtered_list() {
        let intent = classify("show me all critical tickets");
        match intent {
            Intent::FilteredList(f) => assert_eq!(f.priority, Some(Priority::Critical)),
            other => panic!("unexpected intent: {other:?}"),
        }

        let intent = classify("list the non-compliant ones");
        match intent {
            Intent::FilteredList(f) => {
                assert_eq!(f.compliance, Some(ComplianceStatus::NonCompliant))
            }
            other => panic!("unexpected intent: {other:?}"),
        }
    }

    #[test]
    fn classify_stats() {
        assert!(matches!(classify("how many tickets are there?"), Intent::Stats));
        assert!(matches!(classify("give me an overview"), Intent::Stats));
    }

    #[test]
    fn classify_general_fallthrough() {
        assert!(matches!(classify("what should I work on first?"), Intent::General));
        // A list verb without a recognizable filter word is not a listing
        assert!(matches!(classify("show me something interesting"), Intent::General));
    }

    #[test]
    fn list_verb_without_filter_word_keeps_stats_intent() {
        assert!(matches!(classify("show me a summary"), Intent::Stats));
    }

    #[tokio::test]
    async fn explanation_grounds_on_failed_results_only() {
        let (bridge, generator) = bridge_with(vec![MockReply::text("explained")]);

        let reply = bridge.respond(&ask("Why is CHG0012348 failing?")).await;
        assert_eq!(reply, "explained");

        let system = generator.last_system().unwrap();
        // CHG0012348 fails Approval Chain and Rollback Plan
        assert!(system.contains("No approvers assigned"));
        assert!(system.contains("No rollback plan provided"));
        // Passed results and other tickets are excluded
        assert!(!system.contains("All mandatory fields are filled"));
        assert!(!system.contains("CHG0012345"));
    }

    #[tokio::test]
    async fn lookup_grounds_on_full_ticket() {
        let (bridge, generator) = bridge_with(vec![MockReply::text("here it is")]);

        let reply = bridge.respond(&ask("Tell me about CHG0012345")).await;
        assert_eq!(reply, "here it is");

        let system = generator.last_system().unwrap();
        assert!(system.contains("CHG0012345"));
        assert!(system.contains("\"ticket\""));
        assert!(!system.contains("CHG0012346"));
    }

    #[tokio::test]
    async fn unknown_ticket_number_short_circuits() {
        let (bridge, generator) = bridge_with(vec![MockReply::text("unreachable")]);

        let reply = bridge.respond(&ask("why is CHG9999999 failing?")).await;
        assert!(reply.contains("CHG9999999"));
        assert!(reply.contains("couldn't find"));
        assert_eq!(generator.call_count(), 0);
    }

    #[tokio::test]
    async fn filtered_list_grounds_on_matching_tickets_only() {
        let (bridge, generator) = bridge_with(vec![MockReply::text("listed")]);

        let reply = bridge.respond(&ask("show me all critical tickets")).await;
        assert_eq!(reply, "listed");

        let system = generator.last_system().unwrap();
        assert!(system.contains("CHG0012346"));
        assert!(system.contains("CHG0012347"));
        assert!(!system.contains("CHG0012345")); // High, not Critical
    }

    #[tokio::test]
    async fn stats_intent_grounds_on_dashboard_stats() {
        let (bridge, generator) = bridge_with(vec![MockReply::text("counted")]);

        let reply = bridge.respond(&ask("how many tickets do we have?")).await;
        assert_eq!(reply, "counted");

        let system = generator.last_system().unwrap();
        assert!(system.contains("totalTickets"));
        assert!(system.contains("byAssignee"));
    }

    #[tokio::test]
    async fn general_intent_grounds_on_compact_summaries() {
        let (bridge, generator) = bridge_with(vec![MockReply::text("ok")]);

        bridge.respond(&ask("what should I prioritize?")).await;

        let system = generator.last_system().unwrap();
        // All tickets present, with presence flags, but no full descriptions
        assert!(system.contains("CHG0012345"));
        assert!(system.contains("CHG0012359"));
        assert!(system.contains("hasRollbackPlan"));
        assert!(!system.contains("\"description\""));
    }

    #[tokio::test]
    async fn generation_error_yields_fallback() {
        let (bridge, _) = bridge_with(vec![MockReply::Error(GatewayError::ServerError {
            status: 500,
            body: "boom".into(),
        })]);

        let reply = bridge.respond(&ask("anything")).await;
        assert_eq!(reply, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn generation_timeout_yields_fallback() {
        let generator = Arc::new(MockGenerator::new(vec![MockReply::delayed(
            Duration::from_millis(200),
            MockReply::text("too late"),
        )]));
        let bridge = ChatBridge::new(seeded_db(), generator)
            .with_timeout(Duration::from_millis(50));

        let reply = bridge.respond(&ask("anything")).await;
        assert_eq!(reply, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn empty_generation_yields_fallback() {
        let (bridge, _) = bridge_with(vec![MockReply::text("")]);

        let reply = bridge.respond(&ask("anything")).await;
        assert_eq!(reply, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn transcript_without_user_turn_is_general() {
        let (bridge, generator) = bridge_with(vec![MockReply::text("ok")]);

        let request = ChatRequest {
            messages: vec![ChatMessage::assistant("hello")],
        };
        bridge.respond(&request).await;

        let system = generator.last_system().unwrap();
        assert!(system.contains("CHG0012345"));
    }
}
