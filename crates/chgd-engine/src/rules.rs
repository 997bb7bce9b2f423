use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use chgd_core::ticket::{Priority, Severity, TicketDraft};

/// Outcome of a single rule check, before it is stamped with the rule's
/// name and severity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuleOutcome {
    pub passed: bool,
    pub message: String,
    pub suggestion: String,
}

impl RuleOutcome {
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            suggestion: String::new(),
        }
    }

    pub fn fail(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }
}

/// One compliance rule. `check` never panics; an `Err` is converted by the
/// validator into a failed result carrying the diagnostic, leaving the rest
/// of the catalog unaffected.
pub trait ComplianceRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn severity(&self) -> Severity;
    fn check(&self, ticket: &TicketDraft) -> Result<RuleOutcome, String>;
}

/// Minimum approver counts per priority.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MinApprovers {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl Default for MinApprovers {
    fn default() -> Self {
        Self {
            critical: 2,
            high: 1,
            medium: 1,
            low: 1,
        }
    }
}

impl MinApprovers {
    pub fn for_priority(&self, priority: Priority) -> usize {
        match priority {
            Priority::Critical => self.critical,
            Priority::High => self.high,
            Priority::Medium => self.medium,
            Priority::Low => self.low,
        }
    }
}

/// Externally configurable rule parameters.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RulePolicy {
    pub min_approvers: MinApprovers,
}

/// Ordered rule catalog. Every registered rule reports exactly once per
/// evaluation, in registration order.
pub struct RuleRegistry {
    rules: Vec<Box<dyn ComplianceRule>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn register(&mut self, rule: Box<dyn ComplianceRule>) {
        self.rules.push(rule);
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn ComplianceRule> {
        self.rules.iter().map(|r| r.as_ref())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The standard catalog, in reporting order.
    pub fn catalog(policy: &RulePolicy) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(RequiredFieldsRule));
        registry.register(Box::new(ApprovalChainRule {
            min_approvers: policy.min_approvers.clone(),
        }));
        registry.register(Box::new(TestingEvidenceRule));
        registry.register(Box::new(ScheduleOrderRule));
        registry.register(Box::new(ChangeWindowRule));
        registry.register(Box::new(RollbackPlanRule));
        registry
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::catalog(&RulePolicy::default())
    }
}

fn filled(s: &str) -> bool {
    !s.trim().is_empty()
}

fn filled_opt(s: &Option<String>) -> bool {
    s.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// Every mandatory field present and non-empty.
pub struct RequiredFieldsRule;

impl ComplianceRule for RequiredFieldsRule {
    fn name(&self) -> &'static str {
        "Required Fields"
    }

    fn severity(&self) -> Severity {
        Severity::Error
    }

    fn check(&self, ticket: &TicketDraft) -> Result<RuleOutcome, String> {
        let complete = filled(&ticket.short_description)
            && filled(&ticket.description)
            && filled(&ticket.requested_by)
            && filled(&ticket.assigned_to)
            && filled(&ticket.scheduled_start_date)
            && filled(&ticket.scheduled_end_date);

        Ok(if complete {
            RuleOutcome::pass("All mandatory fields are filled")
        } else {
            RuleOutcome::fail(
                "Missing required fields",
                "Fill in all mandatory fields: description, requestedBy, assignedTo, scheduled dates",
            )
        })
    }
}

/// Approval chain present and sized for the ticket's priority.
pub struct ApprovalChainRule {
    pub min_approvers: MinApprovers,
}

impl ComplianceRule for ApprovalChainRule {
    fn name(&self) -> &'static str {
        "Approval Chain"
    }

    fn severity(&self) -> Severity {
        Severity::Error
    }

    fn check(&self, ticket: &TicketDraft) -> Result<RuleOutcome, String> {
        let required = self.min_approvers.for_priority(ticket.priority);
        let count = ticket.approval_chain.as_deref().map_or(0, |c| c.len());

        Ok(if count == 0 {
            RuleOutcome::fail(
                "No approvers assigned",
                "Add at least one approver to the approval chain",
            )
        } else if count < required {
            RuleOutcome::fail(
                format!(
                    "Only {count} of {required} required approvers for {} priority",
                    ticket.priority.as_str()
                ),
                format!(
                    "Add approvers until the chain has at least {required} for {} changes",
                    ticket.priority.as_str()
                ),
            )
        } else {
            RuleOutcome::pass("Approval chain is configured")
        })
    }
}

/// Testing evidence attached; only demanded for High and Critical changes.
pub struct TestingEvidenceRule;

impl ComplianceRule for TestingEvidenceRule {
    fn name(&self) -> &'static str {
        "Testing Evidence"
    }

    fn severity(&self) -> Severity {
        Severity::Warning
    }

    fn check(&self, ticket: &TicketDraft) -> Result<RuleOutcome, String> {
        let required = matches!(ticket.priority, Priority::Critical | Priority::High);

        Ok(if filled_opt(&ticket.testing_evidence) {
            RuleOutcome::pass("Testing evidence attached")
        } else if !required {
            RuleOutcome::pass(format!(
                "Testing evidence not required for {} priority",
                ticket.priority.as_str()
            ))
        } else {
            RuleOutcome::fail(
                "No testing evidence found",
                "Attach test results, screenshots, or documentation proving the change was tested",
            )
        })
    }
}

fn parse_rfc3339(raw: &str) -> Result<DateTime<FixedOffset>, String> {
    DateTime::parse_from_rfc3339(raw).map_err(|e| format!("'{raw}' is not RFC 3339: {e}"))
}

/// Scheduled start strictly before scheduled end.
pub struct ScheduleOrderRule;

impl ComplianceRule for ScheduleOrderRule {
    fn name(&self) -> &'static str {
        "Schedule Order"
    }

    fn severity(&self) -> Severity {
        Severity::Error
    }

    fn check(&self, ticket: &TicketDraft) -> Result<RuleOutcome, String> {
        let start = match parse_rfc3339(&ticket.scheduled_start_date) {
            Ok(dt) => dt,
            Err(e) => {
                return Ok(RuleOutcome::fail(
                    format!("scheduledStartDate {e}"),
                    "Use an RFC 3339 timestamp for the scheduled start date",
                ))
            }
        };
        let end = match parse_rfc3339(&ticket.scheduled_end_date) {
            Ok(dt) => dt,
            Err(e) => {
                return Ok(RuleOutcome::fail(
                    format!("scheduledEndDate {e}"),
                    "Use an RFC 3339 timestamp for the scheduled end date",
                ))
            }
        };

        Ok(if start < end {
            RuleOutcome::pass("Scheduled window is ordered correctly")
        } else {
            RuleOutcome::fail(
                "Scheduled start is not before scheduled end",
                "Adjust the schedule so the start time comes before the end time",
            )
        })
    }
}

/// Change window present; verified against the schedule when it is a
/// machine-readable RFC 3339 interval ("start/end"). Free-text windows pass
/// the presence check only.
pub struct ChangeWindowRule;

impl ChangeWindowRule {
    fn parse_interval(raw: &str) -> Option<(DateTime<FixedOffset>, DateTime<FixedOffset>)> {
        let (start, end) = raw.split_once('/')?;
        let start = DateTime::parse_from_rfc3339(start.trim()).ok()?;
        let end = DateTime::parse_from_rfc3339(end.trim()).ok()?;
        Some((start, end))
    }
}

impl ComplianceRule for ChangeWindowRule {
    fn name(&self) -> &'static str {
        "Change Window"
    }

    fn severity(&self) -> Severity {
        Severity::Warning
    }

    fn check(&self, ticket: &TicketDraft) -> Result<RuleOutcome, String> {
        let Some(window) = ticket.change_window.as_deref().filter(|w| !w.trim().is_empty())
        else {
            return Ok(RuleOutcome::fail(
                "No change window defined",
                "Specify an approved change window (e.g., 'Saturday 2:00 AM - 6:00 AM EST')",
            ));
        };

        let Some((win_start, win_end)) = Self::parse_interval(window) else {
            return Ok(RuleOutcome::pass(
                "Change window specified (unverified free-text window)",
            ));
        };

        let sched = parse_rfc3339(&ticket.scheduled_start_date)
            .and_then(|s| parse_rfc3339(&ticket.scheduled_end_date).map(|e| (s, e)));
        let Ok((sched_start, sched_end)) = sched else {
            return Ok(RuleOutcome::pass(
                "Change window specified (schedule unparseable, containment unverified)",
            ));
        };

        Ok(if win_start <= sched_start && sched_end <= win_end {
            RuleOutcome::pass("Change window covers the scheduled window")
        } else {
            RuleOutcome::fail(
                "Change window does not cover the scheduled window",
                "Align the change window with the scheduled start and end dates",
            )
        })
    }
}

/// Rollback plan documented.
pub struct RollbackPlanRule;

impl ComplianceRule for RollbackPlanRule {
    fn name(&self) -> &'static str {
        "Rollback Plan"
    }

    fn severity(&self) -> Severity {
        Severity::Error
    }

    fn check(&self, ticket: &TicketDraft) -> Result<RuleOutcome, String> {
        Ok(if filled_opt(&ticket.rollback_plan) {
            RuleOutcome::pass("Rollback plan documented")
        } else {
            RuleOutcome::fail(
                "No rollback plan provided",
                "Document a step-by-step rollback procedure in case the change fails",
            )
        })
    }
}
