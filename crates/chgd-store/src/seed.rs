use chgd_core::ticket::TicketDraft;

use crate::error::StoreError;

/// Bundled fixture set, ingested when the store is empty at startup.
const SEED_TICKETS: &str = include_str!("../assets/seed_tickets.json");

/// Parse the bundled seed drafts. Evaluation happens at ingest time, so the
/// fixture carries no derived fields.
pub fn seed_drafts() -> Result<Vec<TicketDraft>, StoreError> {
    serde_json::from_str(SEED_TICKETS).map_err(StoreError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chgd_core::ticket::{Priority, TicketStatus};

    #[test]
    fn seed_parses() {
        let drafts = seed_drafts().unwrap();
        assert_eq!(drafts.len(), 15);
    }

    #[test]
    fn seed_numbers_are_unique_and_sequential() {
        let drafts = seed_drafts().unwrap();
        for (i, draft) in drafts.iter().enumerate() {
            assert_eq!(draft.number, format!("CHG00123{}", 45 + i));
        }
    }

    #[test]
    fn seed_covers_all_statuses() {
        let drafts = seed_drafts().unwrap();
        for status in [
            TicketStatus::PendingApproval,
            TicketStatus::InReview,
            TicketStatus::Approved,
            TicketStatus::Rejected,
        ] {
            assert!(drafts.iter().any(|d| d.status == status), "missing {status:?}");
        }
    }

    #[test]
    fn redis_expansion_is_missing_artifacts() {
        let drafts = seed_drafts().unwrap();
        let redis = drafts.iter().find(|d| d.number == "CHG0012348").unwrap();
        assert_eq!(redis.priority, Priority::Medium);
        assert!(redis.approval_chain.is_none());
        assert!(redis.rollback_plan.is_none());
        assert!(redis.testing_evidence.is_some());
    }
}
