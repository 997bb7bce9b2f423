use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ticket::{ChangeTicket, ComplianceStatus, Priority, TicketStatus};

/// Optional equality constraints on ticket dimensions. Unset fields impose
/// no constraint; set fields AND-combine.
#[derive(Clone, Debug, Default)]
pub struct TicketFilters {
    pub status: Option<TicketStatus>,
    pub priority: Option<Priority>,
    pub compliance: Option<ComplianceStatus>,
    pub assignee: Option<String>,
}

impl TicketFilters {
    pub fn matches(&self, ticket: &ChangeTicket) -> bool {
        if let Some(status) = self.status {
            if ticket.status != status {
                return false;
            }
        }
        if let Some(priority) = self.priority {
            if ticket.priority != priority {
                return false;
            }
        }
        if let Some(compliance) = self.compliance {
            if ticket.compliance_status != compliance {
                return false;
            }
        }
        if let Some(assignee) = &self.assignee {
            if &ticket.assigned_to != assignee {
                return false;
            }
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.priority.is_none()
            && self.compliance.is_none()
            && self.assignee.is_none()
    }
}

/// Sortable ticket dimensions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortBy {
    #[default]
    CreatedAt,
    Priority,
    Compliance,
    ScheduledStartDate,
}

impl FromStr for SortBy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "createdAt" => Ok(Self::CreatedAt),
            "priority" => Ok(Self::Priority),
            "compliance" => Ok(Self::Compliance),
            "scheduledStartDate" => Ok(Self::ScheduledStartDate),
            other => Err(format!("unknown sort field: {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortOrder {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(format!("unknown sort order: {other}")),
        }
    }
}

/// One page of a filtered, sorted ticket listing. `total` counts matches
/// before pagination.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketPage {
    pub tickets: Vec<ChangeTicket>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
}

/// Dashboard-wide counts over the full unfiltered ticket set.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_tickets: usize,
    pub pending_approval: usize,
    pub compliant: usize,
    pub warning: usize,
    pub non_compliant: usize,
    pub by_priority: BTreeMap<String, usize>,
    pub by_assignee: BTreeMap<String, usize>,
}
