use tracing::{debug, instrument, warn};

use chgd_core::ticket::{ChangeTicket, ComplianceStatus, TicketDraft, ValidationResult};
use chgd_store::TicketRepo;

use crate::compliance;
use crate::error::EngineError;
use crate::rules::{RulePolicy, RuleRegistry};

/// Runs the rule catalog over ticket drafts and writes evaluated tickets
/// through the store.
pub struct Validator {
    registry: RuleRegistry,
}

impl Validator {
    pub fn new(policy: &RulePolicy) -> Self {
        Self {
            registry: RuleRegistry::catalog(policy),
        }
    }

    /// Use a custom registry (extra rules register here; the aggregation
    /// logic never changes).
    pub fn with_registry(registry: RuleRegistry) -> Self {
        Self { registry }
    }

    /// Evaluate the full catalog, in order, yielding one result per rule.
    /// A rule that errors out is recorded as failed with its diagnostic;
    /// the remaining rules still run.
    pub fn evaluate(&self, draft: &TicketDraft) -> (ComplianceStatus, Vec<ValidationResult>) {
        let mut results = Vec::with_capacity(self.registry.len());
        for rule in self.registry.iter() {
            let result = match rule.check(draft) {
                Ok(outcome) if outcome.passed => {
                    ValidationResult::passed(rule.name(), rule.severity(), outcome.message)
                }
                Ok(outcome) => ValidationResult::failed(
                    rule.name(),
                    rule.severity(),
                    outcome.message,
                    outcome.suggestion,
                ),
                Err(diagnostic) => {
                    warn!(
                        ticket_id = %draft.id,
                        rule = rule.name(),
                        %diagnostic,
                        "rule evaluation failed"
                    );
                    ValidationResult::failed(
                        rule.name(),
                        rule.severity(),
                        format!("Rule evaluation failed: {diagnostic}"),
                        "Correct the ticket data and re-run validation",
                    )
                }
            };
            results.push(result);
        }
        let status = compliance::aggregate(&results);
        (status, results)
    }

    /// Evaluate a draft and persist the resulting ticket in one step.
    #[instrument(skip(self, repo, draft), fields(ticket_id = %draft.id))]
    pub fn ingest(&self, repo: &TicketRepo, draft: TicketDraft) -> Result<ChangeTicket, EngineError> {
        let (status, results) = self.evaluate(&draft);
        let ticket = ChangeTicket::from_draft(draft, status, results);
        repo.upsert(&ticket).map_err(EngineError::from_store)?;
        debug!(ticket_id = %ticket.id, status = ticket.compliance_status.as_str(), "ticket ingested");
        Ok(ticket)
    }

    /// Re-run the catalog over a stored ticket and overwrite its derived
    /// fields.
    #[instrument(skip(self, repo), fields(ticket_id = %id))]
    pub fn revalidate(&self, repo: &TicketRepo, id: &str) -> Result<ChangeTicket, EngineError> {
        let ticket = repo.get(id).map_err(EngineError::from_store)?;
        let draft = ticket.to_draft();
        let (status, results) = self.evaluate(&draft);
        repo.update_validation(id, status, &results)
            .map_err(EngineError::from_store)?;
        Ok(ChangeTicket::from_draft(draft, status, results))
    }

    /// Ingest the bundled fixture set when the store is empty. Returns the
    /// number of tickets seeded (zero when the store already has data).
    pub fn seed_if_empty(&self, repo: &TicketRepo) -> Result<usize, EngineError> {
        if repo.count().map_err(EngineError::from_store)? > 0 {
            return Ok(0);
        }
        let drafts = chgd_store::seed::seed_drafts().map_err(EngineError::from_store)?;
        let count = drafts.len();
        for draft in drafts {
            self.ingest(repo, draft)?;
        }
        Ok(count)
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(&RulePolicy::default())
    }
}
