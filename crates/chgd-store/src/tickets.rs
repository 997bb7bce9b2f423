use chrono::Utc;
use tracing::instrument;

use chgd_core::ticket::{ChangeTicket, ComplianceStatus, ValidationResult};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

const TICKET_COLUMNS: &str = "id, number, short_description, description, requested_by, \
     assigned_to, priority, status, created_at, scheduled_start_date, scheduled_end_date, \
     approval_chain, testing_evidence, rollback_plan, change_window, compliance_status, \
     validation_results";

/// Repository over the tickets table.
pub struct TicketRepo {
    db: Database,
}

impl TicketRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert or replace a fully evaluated ticket.
    #[instrument(skip(self, ticket), fields(ticket_id = %ticket.id))]
    pub fn upsert(&self, ticket: &ChangeTicket) -> Result<(), StoreError> {
        let approval_chain = ticket
            .approval_chain
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let validation_results = serde_json::to_string(&ticket.validation_results)?;
        let now = Utc::now().to_rfc3339();

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO tickets (id, number, short_description, description, \
                 requested_by, assigned_to, priority, status, created_at, scheduled_start_date, \
                 scheduled_end_date, approval_chain, testing_evidence, rollback_plan, \
                 change_window, compliance_status, validation_results, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
                rusqlite::params![
                    ticket.id,
                    ticket.number,
                    ticket.short_description,
                    ticket.description,
                    ticket.requested_by,
                    ticket.assigned_to,
                    ticket.priority.as_str(),
                    ticket.status.as_str(),
                    ticket.created_at,
                    ticket.scheduled_start_date,
                    ticket.scheduled_end_date,
                    approval_chain,
                    ticket.testing_evidence,
                    ticket.rollback_plan,
                    ticket.change_window,
                    ticket.compliance_status.as_str(),
                    validation_results,
                    now,
                ],
            )?;
            Ok(())
        })
    }

    /// Get a ticket by ID.
    #[instrument(skip(self), fields(ticket_id = %id))]
    pub fn get(&self, id: &str) -> Result<ChangeTicket, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TICKET_COLUMNS} FROM tickets WHERE id = ?1"
            ))?;
            let mut rows = stmt.query([id])?;
            match rows.next()? {
                Some(row) => row_to_ticket(row),
                None => Err(StoreError::NotFound(format!("ticket {id}"))),
            }
        })
    }

    /// Get a ticket by its change number (e.g. "CHG0012345").
    #[instrument(skip(self))]
    pub fn get_by_number(&self, number: &str) -> Result<ChangeTicket, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TICKET_COLUMNS} FROM tickets WHERE number = ?1"
            ))?;
            let mut rows = stmt.query([number])?;
            match rows.next()? {
                Some(row) => row_to_ticket(row),
                None => Err(StoreError::NotFound(format!("ticket {number}"))),
            }
        })
    }

    /// Load every ticket in one snapshot, ordered by number ascending.
    pub fn list_all(&self) -> Result<Vec<ChangeTicket>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TICKET_COLUMNS} FROM tickets ORDER BY number ASC"
            ))?;
            let mut rows = stmt.query([])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_ticket(row)?);
            }
            Ok(results)
        })
    }

    pub fn count(&self) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM tickets", [], |row| row.get(0))
                .map_err(StoreError::from)
        })
    }

    /// Overwrite a ticket's derived evaluation outcome in place.
    #[instrument(skip(self, results), fields(ticket_id = %id))]
    pub fn update_validation(
        &self,
        id: &str,
        compliance: ComplianceStatus,
        results: &[ValidationResult],
    ) -> Result<(), StoreError> {
        let validation_results = serde_json::to_string(results)?;
        let now = Utc::now().to_rfc3339();

        self.db.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE tickets SET compliance_status = ?1, validation_results = ?2, \
                 updated_at = ?3 WHERE id = ?4",
                rusqlite::params![compliance.as_str(), validation_results, now, id],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound(format!("ticket {id}")));
            }
            Ok(())
        })
    }
}

fn row_to_ticket(row: &rusqlite::Row<'_>) -> Result<ChangeTicket, StoreError> {
    let priority_str: String = row_helpers::get(row, 6, "tickets", "priority")?;
    let status_str: String = row_helpers::get(row, 7, "tickets", "status")?;
    let compliance_str: String = row_helpers::get(row, 15, "tickets", "compliance_status")?;
    let approval_raw: Option<String> = row_helpers::get_opt(row, 11, "tickets", "approval_chain")?;
    let results_raw: String = row_helpers::get(row, 16, "tickets", "validation_results")?;

    Ok(ChangeTicket {
        id: row_helpers::get(row, 0, "tickets", "id")?,
        number: row_helpers::get(row, 1, "tickets", "number")?,
        short_description: row_helpers::get(row, 2, "tickets", "short_description")?,
        description: row_helpers::get(row, 3, "tickets", "description")?,
        requested_by: row_helpers::get(row, 4, "tickets", "requested_by")?,
        assigned_to: row_helpers::get(row, 5, "tickets", "assigned_to")?,
        priority: row_helpers::parse_enum(&priority_str, "tickets", "priority")?,
        status: row_helpers::parse_enum(&status_str, "tickets", "status")?,
        created_at: row_helpers::get(row, 8, "tickets", "created_at")?,
        scheduled_start_date: row_helpers::get(row, 9, "tickets", "scheduled_start_date")?,
        scheduled_end_date: row_helpers::get(row, 10, "tickets", "scheduled_end_date")?,
        approval_chain: approval_raw
            .as_deref()
            .map(|raw| row_helpers::parse_json(raw, "tickets", "approval_chain"))
            .transpose()?,
        testing_evidence: row_helpers::get_opt(row, 12, "tickets", "testing_evidence")?,
        rollback_plan: row_helpers::get_opt(row, 13, "tickets", "rollback_plan")?,
        change_window: row_helpers::get_opt(row, 14, "tickets", "change_window")?,
        compliance_status: row_helpers::parse_enum(&compliance_str, "tickets", "compliance_status")?,
        validation_results: row_helpers::parse_json(&results_raw, "tickets", "validation_results")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chgd_core::ticket::{Priority, Severity, TicketStatus};

    fn sample(id: &str, number: &str) -> ChangeTicket {
        ChangeTicket {
            id: id.into(),
            number: number.into(),
            short_description: "Database schema migration".into(),
            description: "Migrate user database schema".into(),
            requested_by: "Sarah Chen".into(),
            assigned_to: "Mike Johnson".into(),
            priority: Priority::High,
            status: TicketStatus::PendingApproval,
            created_at: "2025-01-28T09:00:00Z".into(),
            scheduled_start_date: "2025-02-01T02:00:00Z".into(),
            scheduled_end_date: "2025-02-01T06:00:00Z".into(),
            approval_chain: Some(vec!["David Kim".into(), "Lisa Wang".into()]),
            testing_evidence: Some("Unit tests passed".into()),
            rollback_plan: Some("Restore from backup".into()),
            change_window: Some("Saturday 2:00 AM - 6:00 AM EST".into()),
            compliance_status: ComplianceStatus::Compliant,
            validation_results: vec![ValidationResult::passed(
                "Required Fields",
                Severity::Error,
                "All mandatory fields are filled",
            )],
        }
    }

    #[test]
    fn upsert_and_get() {
        let db = Database::in_memory().unwrap();
        let repo = TicketRepo::new(db);
        repo.upsert(&sample("1", "CHG0012345")).unwrap();

        let fetched = repo.get("1").unwrap();
        assert_eq!(fetched.number, "CHG0012345");
        assert_eq!(fetched.priority, Priority::High);
        assert_eq!(
            fetched.approval_chain.as_deref(),
            Some(&["David Kim".to_string(), "Lisa Wang".to_string()][..])
        );
        assert_eq!(fetched.validation_results.len(), 1);
        assert!(fetched.validation_results[0].passed);
    }

    #[test]
    fn get_by_number() {
        let db = Database::in_memory().unwrap();
        let repo = TicketRepo::new(db);
        repo.upsert(&sample("1", "CHG0012345")).unwrap();

        let fetched = repo.get_by_number("CHG0012345").unwrap();
        assert_eq!(fetched.id, "1");
    }

    #[test]
    fn get_nonexistent_fails() {
        let db = Database::in_memory().unwrap();
        let repo = TicketRepo::new(db);
        assert!(matches!(repo.get("99"), Err(StoreError::NotFound(_))));
        assert!(matches!(
            repo.get_by_number("CHG9999999"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn upsert_replaces_existing() {
        let db = Database::in_memory().unwrap();
        let repo = TicketRepo::new(db);
        repo.upsert(&sample("1", "CHG0012345")).unwrap();

        let mut updated = sample("1", "CHG0012345");
        updated.assigned_to = "Emily Zhang".into();
        repo.upsert(&updated).unwrap();

        assert_eq!(repo.count().unwrap(), 1);
        assert_eq!(repo.get("1").unwrap().assigned_to, "Emily Zhang");
    }

    #[test]
    fn list_all_ordered_by_number() {
        let db = Database::in_memory().unwrap();
        let repo = TicketRepo::new(db);
        repo.upsert(&sample("2", "CHG0012346")).unwrap();
        repo.upsert(&sample("1", "CHG0012345")).unwrap();

        let all = repo.list_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].number, "CHG0012345");
        assert_eq!(all[1].number, "CHG0012346");
    }

    #[test]
    fn update_validation_overwrites_outcome() {
        let db = Database::in_memory().unwrap();
        let repo = TicketRepo::new(db);
        repo.upsert(&sample("1", "CHG0012345")).unwrap();

        let failed = vec![ValidationResult::failed(
            "Rollback Plan",
            Severity::Error,
            "No rollback plan provided",
            "Document a step-by-step rollback procedure in case the change fails",
        )];
        repo.update_validation("1", ComplianceStatus::NonCompliant, &failed)
            .unwrap();

        let fetched = repo.get("1").unwrap();
        assert_eq!(fetched.compliance_status, ComplianceStatus::NonCompliant);
        assert_eq!(fetched.validation_results.len(), 1);
        assert!(!fetched.validation_results[0].passed);
    }

    #[test]
    fn update_validation_missing_ticket_fails() {
        let db = Database::in_memory().unwrap();
        let repo = TicketRepo::new(db);
        let result = repo.update_validation("99", ComplianceStatus::Compliant, &[]);
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn nullable_fields_round_trip_as_none() {
        let db = Database::in_memory().unwrap();
        let repo = TicketRepo::new(db);
        let mut ticket = sample("4", "CHG0012348");
        ticket.approval_chain = None;
        ticket.rollback_plan = None;
        repo.upsert(&ticket).unwrap();

        let fetched = repo.get("4").unwrap();
        assert!(fetched.approval_chain.is_none());
        assert!(fetched.rollback_plan.is_none());
        assert!(fetched.testing_evidence.is_some());
    }
}
