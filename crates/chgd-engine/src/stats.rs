use std::collections::BTreeMap;

use chgd_core::query::DashboardStats;
use chgd_core::ticket::{ComplianceStatus, TicketStatus};
use chgd_store::{Database, TicketRepo};

use crate::error::EngineError;

/// Dashboard-wide counters. `compute` performs one full scan per call and
/// holds no cached state, so it can never drift from the store.
pub struct StatsAggregator {
    repo: TicketRepo,
}

impl StatsAggregator {
    pub fn new(db: Database) -> Self {
        Self {
            repo: TicketRepo::new(db),
        }
    }

    pub fn compute(&self) -> Result<DashboardStats, EngineError> {
        let tickets = self.repo.list_all().map_err(EngineError::from_store)?;

        let mut by_priority: BTreeMap<String, usize> = BTreeMap::new();
        let mut by_assignee: BTreeMap<String, usize> = BTreeMap::new();
        let mut pending_approval = 0;
        let mut compliant = 0;
        let mut warning = 0;
        let mut non_compliant = 0;

        for ticket in &tickets {
            if ticket.status == TicketStatus::PendingApproval {
                pending_approval += 1;
            }
            match ticket.compliance_status {
                ComplianceStatus::Compliant => compliant += 1,
                ComplianceStatus::Warning => warning += 1,
                ComplianceStatus::NonCompliant => non_compliant += 1,
            }
            *by_priority
                .entry(ticket.priority.as_str().to_string())
                .or_default() += 1;
            *by_assignee.entry(ticket.assigned_to.clone()).or_default() += 1;
        }

        Ok(DashboardStats {
            total_tickets: tickets.len(),
            pending_approval,
            compliant,
            warning,
            non_compliant,
            by_priority,
            by_assignee,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chgd_core::query::TicketFilters;
    use chgd_core::ticket::Priority;
    use chgd_store::Database;

    use crate::query::QueryEngine;
    use crate::validate::Validator;

    fn seeded_db() -> Database {
        let db = Database::in_memory().unwrap();
        let repo = TicketRepo::new(db.clone());
        Validator::default().seed_if_empty(&repo).unwrap();
        db
    }

    #[test]
    fn empty_store_yields_zeroed_stats() {
        let db = Database::in_memory().unwrap();
        let stats = StatsAggregator::new(db).compute().unwrap();
        assert_eq!(stats.total_tickets, 0);
        assert_eq!(stats.pending_approval, 0);
        assert!(stats.by_priority.is_empty());
        assert!(stats.by_assignee.is_empty());
    }

    #[test]
    fn verdict_counts_partition_the_total() {
        let db = seeded_db();
        let stats = StatsAggregator::new(db).compute().unwrap();
        assert_eq!(stats.total_tickets, 15);
        assert_eq!(
            stats.compliant + stats.warning + stats.non_compliant,
            stats.total_tickets
        );
    }

    #[test]
    fn stats_agree_with_a_full_scan() {
        let db = seeded_db();
        let stats = StatsAggregator::new(db.clone()).compute().unwrap();
        let engine = QueryEngine::new(db);
        let tickets = engine.scan().unwrap();

        assert_eq!(stats.total_tickets, tickets.len());
        assert_eq!(
            stats.pending_approval,
            tickets
                .iter()
                .filter(|t| t.status == TicketStatus::PendingApproval)
                .count()
        );
        assert_eq!(
            stats.non_compliant,
            tickets
                .iter()
                .filter(|t| t.compliance_status == ComplianceStatus::NonCompliant)
                .count()
        );
        for (priority, count) in &stats.by_priority {
            assert_eq!(
                *count,
                tickets
                    .iter()
                    .filter(|t| t.priority.as_str() == priority)
                    .count()
            );
        }
        for (assignee, count) in &stats.by_assignee {
            assert_eq!(
                *count,
                tickets.iter().filter(|t| &t.assigned_to == assignee).count()
            );
        }
    }

    #[test]
    fn stats_agree_with_filtered_totals() {
        let db = seeded_db();
        let stats = StatsAggregator::new(db.clone()).compute().unwrap();
        let engine = QueryEngine::new(db);

        let filters = TicketFilters {
            priority: Some(Priority::Critical),
            ..Default::default()
        };
        let page = engine
            .list(&filters, Default::default(), Default::default(), 1, 100)
            .unwrap();
        assert_eq!(stats.by_priority.get("Critical"), Some(&page.total));
    }

    #[test]
    fn stats_reflect_writes_immediately() {
        let db = seeded_db();
        let repo = TicketRepo::new(db.clone());
        let aggregator = StatsAggregator::new(db);

        let before = aggregator.compute().unwrap();

        let mut ticket = repo.get_by_number("CHG0012345").unwrap();
        ticket.id = "16".into();
        ticket.number = "CHG0012360".into();
        repo.upsert(&ticket).unwrap();

        let after = aggregator.compute().unwrap();
        assert_eq!(after.total_tickets, before.total_tickets + 1);
    }
}
