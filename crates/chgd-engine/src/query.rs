use std::cmp::Ordering;

use chgd_core::query::{SortBy, SortOrder, TicketFilters, TicketPage};
use chgd_core::ticket::ChangeTicket;
use chgd_store::{Database, TicketRepo};

use crate::error::EngineError;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

/// Read-side engine: filter, sort, paginate, and point lookups. All lookups
/// read through one store closure so a page and its total come from the same
/// snapshot.
pub struct QueryEngine {
    repo: TicketRepo,
}

impl QueryEngine {
    pub fn new(db: Database) -> Self {
        Self {
            repo: TicketRepo::new(db),
        }
    }

    /// One page of the filtered, sorted listing. Pages are 1-indexed;
    /// past-the-end pages come back empty with the correct total.
    pub fn list(
        &self,
        filters: &TicketFilters,
        sort_by: SortBy,
        sort_order: SortOrder,
        page: usize,
        page_size: usize,
    ) -> Result<TicketPage, EngineError> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);

        let mut matched: Vec<ChangeTicket> = self
            .repo
            .list_all()
            .map_err(EngineError::from_store)?
            .into_iter()
            .filter(|t| filters.matches(t))
            .collect();

        let total = matched.len();
        sort_tickets(&mut matched, sort_by, sort_order);

        let start = (page - 1).saturating_mul(page_size);
        let tickets = if start >= matched.len() {
            Vec::new()
        } else {
            matched
                .into_iter()
                .skip(start)
                .take(page_size)
                .collect()
        };

        Ok(TicketPage {
            tickets,
            total,
            page,
            page_size,
        })
    }

    pub fn get(&self, id: &str) -> Result<ChangeTicket, EngineError> {
        self.repo.get(id).map_err(EngineError::from_store)
    }

    /// Full unfiltered scan, in catalog order. Used by the stats aggregator
    /// and the chat bridge's grounding assembly.
    pub fn scan(&self) -> Result<Vec<ChangeTicket>, EngineError> {
        self.repo.list_all().map_err(EngineError::from_store)
    }

    pub fn get_by_number(&self, number: &str) -> Result<ChangeTicket, EngineError> {
        self.repo
            .get_by_number(number)
            .map_err(EngineError::from_store)
    }
}

/// Sort in place. Ties on the primary key always break by ticket number
/// ascending, independent of the requested order.
fn sort_tickets(tickets: &mut [ChangeTicket], sort_by: SortBy, sort_order: SortOrder) {
    tickets.sort_by(|a, b| {
        let primary = match sort_by {
            SortBy::CreatedAt => a.created_at.cmp(&b.created_at),
            SortBy::Priority => a.priority.rank().cmp(&b.priority.rank()),
            SortBy::Compliance => a.compliance_status.rank().cmp(&b.compliance_status.rank()),
            SortBy::ScheduledStartDate => a.scheduled_start_date.cmp(&b.scheduled_start_date),
        };
        let primary = match sort_order {
            SortOrder::Asc => primary,
            SortOrder::Desc => primary.reverse(),
        };
        match primary {
            Ordering::Equal => a.number.cmp(&b.number),
            other => other,
        }
    });
}

/// Parse the wire filter strings, rejecting unknown spellings.
pub fn parse_filters(
    status: Option<&str>,
    priority: Option<&str>,
    compliance: Option<&str>,
    assignee: Option<&str>,
) -> Result<TicketFilters, EngineError> {
    Ok(TicketFilters {
        status: status
            .map(|s| s.parse().map_err(EngineError::InvalidFilter))
            .transpose()?,
        priority: priority
            .map(|s| s.parse().map_err(EngineError::InvalidFilter))
            .transpose()?,
        compliance: compliance
            .map(|s| s.parse().map_err(EngineError::InvalidFilter))
            .transpose()?,
        assignee: assignee.map(str::to_string),
    })
}

/// Parse the wire sort strings, rejecting unknown spellings.
pub fn parse_sort(
    sort_by: Option<&str>,
    sort_order: Option<&str>,
) -> Result<(SortBy, SortOrder), EngineError> {
    let sort_by = sort_by
        .map(|s| s.parse().map_err(EngineError::InvalidFilter))
        .transpose()?
        .unwrap_or_default();
    let sort_order = sort_order
        .map(|s| s.parse().map_err(EngineError::InvalidFilter))
        .transpose()?
        .unwrap_or_default();
    Ok((sort_by, sort_order))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chgd_core::ticket::{ComplianceStatus, Priority};
    use chgd_store::Database;

    use crate::validate::Validator;

    fn seeded_engine() -> QueryEngine {
        let db = Database::in_memory().unwrap();
        let repo = TicketRepo::new(db.clone());
        Validator::default().seed_if_empty(&repo).unwrap();
        QueryEngine::new(db)
    }

    #[test]
    fn unfiltered_list_reports_full_total() {
        let engine = seeded_engine();
        let page = engine
            .list(&TicketFilters::default(), SortBy::default(), SortOrder::default(), 1, 20)
            .unwrap();
        assert_eq!(page.total, 15);
        assert_eq!(page.tickets.len(), 15);
        assert_eq!(page.page, 1);
        assert_eq!(page.page_size, 20);
    }

    #[test]
    fn total_counts_matches_before_pagination() {
        let engine = seeded_engine();
        let filters = TicketFilters {
            priority: Some(Priority::High),
            ..Default::default()
        };
        let page = engine
            .list(&filters, SortBy::default(), SortOrder::default(), 1, 2)
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.tickets.len(), 2);
        assert!(page.tickets.iter().all(|t| t.priority == Priority::High));
    }

    #[test]
    fn filters_and_combine() {
        let engine = seeded_engine();
        let filters = TicketFilters {
            priority: Some(Priority::High),
            assignee: Some("Emily Zhang".into()),
            ..Default::default()
        };
        let page = engine
            .list(&filters, SortBy::default(), SortOrder::default(), 1, 20)
            .unwrap();
        // Only CHG0012359 is High and assigned to Emily Zhang
        assert_eq!(page.total, 1);
        assert_eq!(page.tickets[0].number, "CHG0012359");
    }

    #[test]
    fn default_sort_is_created_at_desc() {
        let engine = seeded_engine();
        let page = engine
            .list(&TicketFilters::default(), SortBy::default(), SortOrder::default(), 1, 20)
            .unwrap();
        // CHG0012347 is the newest (2025-01-29), CHG0012356 the oldest (2025-01-20)
        assert_eq!(page.tickets.first().unwrap().number, "CHG0012347");
        assert_eq!(page.tickets.last().unwrap().number, "CHG0012356");
    }

    #[test]
    fn priority_sort_asc_puts_critical_first_with_number_tiebreak() {
        let engine = seeded_engine();
        let page = engine
            .list(&TicketFilters::default(), SortBy::Priority, SortOrder::Asc, 1, 20)
            .unwrap();
        let numbers: Vec<_> = page.tickets.iter().map(|t| t.number.as_str()).collect();
        // Criticals first, in number order
        assert_eq!(&numbers[..3], &["CHG0012346", "CHG0012347", "CHG0012356"]);
        // Lows last, in number order
        assert_eq!(&numbers[13..], &["CHG0012351", "CHG0012355"]);
    }

    #[test]
    fn tiebreak_stays_ascending_under_desc_order() {
        let engine = seeded_engine();
        let page = engine
            .list(&TicketFilters::default(), SortBy::Priority, SortOrder::Desc, 1, 20)
            .unwrap();
        let numbers: Vec<_> = page.tickets.iter().map(|t| t.number.as_str()).collect();
        // Lows first under desc, still in ascending number order
        assert_eq!(&numbers[..2], &["CHG0012351", "CHG0012355"]);
        assert_eq!(&numbers[12..], &["CHG0012346", "CHG0012347", "CHG0012356"]);
    }

    #[test]
    fn compliance_sort_ranks_non_compliant_first() {
        let engine = seeded_engine();
        let page = engine
            .list(&TicketFilters::default(), SortBy::Compliance, SortOrder::Asc, 1, 20)
            .unwrap();
        let first = &page.tickets[0];
        assert_eq!(first.compliance_status, ComplianceStatus::NonCompliant);
        let last = page.tickets.last().unwrap();
        assert_eq!(last.compliance_status, ComplianceStatus::Compliant);
    }

    #[test]
    fn pages_concatenate_to_the_full_ordering() {
        let engine = seeded_engine();
        let full = engine
            .list(&TicketFilters::default(), SortBy::Priority, SortOrder::Asc, 1, 100)
            .unwrap();

        let mut collected = Vec::new();
        for page in 1..=4 {
            let chunk = engine
                .list(&TicketFilters::default(), SortBy::Priority, SortOrder::Asc, page, 4)
                .unwrap();
            assert_eq!(chunk.total, 15);
            collected.extend(chunk.tickets);
        }
        assert_eq!(collected.len(), 15);
        let expected: Vec<_> = full.tickets.iter().map(|t| &t.number).collect();
        let got: Vec<_> = collected.iter().map(|t| &t.number).collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn past_the_end_page_is_empty_with_total() {
        let engine = seeded_engine();
        let page = engine
            .list(&TicketFilters::default(), SortBy::default(), SortOrder::default(), 9, 20)
            .unwrap();
        assert!(page.tickets.is_empty());
        assert_eq!(page.total, 15);
        assert_eq!(page.page, 9);
    }

    #[test]
    fn page_size_is_clamped() {
        let engine = seeded_engine();
        let page = engine
            .list(&TicketFilters::default(), SortBy::default(), SortOrder::default(), 1, 5000)
            .unwrap();
        assert_eq!(page.page_size, 100);

        let page = engine
            .list(&TicketFilters::default(), SortBy::default(), SortOrder::default(), 1, 0)
            .unwrap();
        assert_eq!(page.page_size, 1);
        assert_eq!(page.tickets.len(), 1);
    }

    #[test]
    fn page_zero_clamps_to_first_page() {
        let engine = seeded_engine();
        let first = engine
            .list(&TicketFilters::default(), SortBy::default(), SortOrder::default(), 1, 5)
            .unwrap();
        let clamped = engine
            .list(&TicketFilters::default(), SortBy::default(), SortOrder::default(), 0, 5)
            .unwrap();
        assert_eq!(clamped.page, 1);
        let numbers = |p: &TicketPage| {
            p.tickets.iter().map(|t| t.number.clone()).collect::<Vec<_>>()
        };
        assert_eq!(numbers(&clamped), numbers(&first));
    }

    #[test]
    fn get_known_and_unknown() {
        let engine = seeded_engine();
        let ticket = engine.get("4").unwrap();
        assert_eq!(ticket.number, "CHG0012348");

        assert!(matches!(engine.get("999"), Err(EngineError::NotFound(_))));
    }

    #[test]
    fn parse_filters_rejects_unknown_spellings() {
        assert!(parse_filters(Some("Pending Approval"), None, None, None).is_ok());
        assert!(matches!(
            parse_filters(Some("pending"), None, None, None),
            Err(EngineError::InvalidFilter(_))
        ));
        assert!(matches!(
            parse_filters(None, Some("Urgent"), None, None),
            Err(EngineError::InvalidFilter(_))
        ));
        assert!(matches!(
            parse_filters(None, None, Some("noncompliant"), None),
            Err(EngineError::InvalidFilter(_))
        ));
    }

    #[test]
    fn parse_sort_defaults_and_rejects() {
        let (by, order) = parse_sort(None, None).unwrap();
        assert_eq!(by, SortBy::CreatedAt);
        assert_eq!(order, SortOrder::Desc);

        let (by, order) = parse_sort(Some("priority"), Some("asc")).unwrap();
        assert_eq!(by, SortBy::Priority);
        assert_eq!(order, SortOrder::Asc);

        assert!(matches!(
            parse_sort(Some("created_at"), None),
            Err(EngineError::InvalidFilter(_))
        ));
        assert!(matches!(
            parse_sort(None, Some("descending")),
            Err(EngineError::InvalidFilter(_))
        ));
    }
}
