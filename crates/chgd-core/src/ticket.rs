use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ticket priority. Wire spelling matches the upstream system exactly.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    /// Sort rank: most severe first.
    pub fn rank(self) -> u8 {
        match self {
            Self::Critical => 0,
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "Critical",
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Critical" => Ok(Self::Critical),
            "High" => Ok(Self::High),
            "Medium" => Ok(Self::Medium),
            "Low" => Ok(Self::Low),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// Workflow status of a change ticket.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TicketStatus {
    #[serde(rename = "Pending Approval")]
    PendingApproval,
    #[serde(rename = "In Review")]
    InReview,
    Approved,
    Rejected,
}

impl TicketStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PendingApproval => "Pending Approval",
            Self::InReview => "In Review",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending Approval" => Ok(Self::PendingApproval),
            "In Review" => Ok(Self::InReview),
            "Approved" => Ok(Self::Approved),
            "Rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

/// Tri-state compliance verdict derived from validation results.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ComplianceStatus {
    #[serde(rename = "compliant")]
    Compliant,
    #[serde(rename = "warning")]
    Warning,
    #[serde(rename = "non-compliant")]
    NonCompliant,
}

impl ComplianceStatus {
    /// Sort rank: worst first.
    pub fn rank(self) -> u8 {
        match self {
            Self::NonCompliant => 0,
            Self::Warning => 1,
            Self::Compliant => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compliant => "compliant",
            Self::Warning => "warning",
            Self::NonCompliant => "non-compliant",
        }
    }
}

impl fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComplianceStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compliant" => Ok(Self::Compliant),
            "warning" => Ok(Self::Warning),
            "non-compliant" => Ok(Self::NonCompliant),
            other => Err(format!("unknown compliance status: {other}")),
        }
    }
}

/// Failure impact of a rule: error escalates to non-compliant, warning only
/// to warning.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// Outcome of one compliance rule check against a ticket.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationResult {
    pub rule: String,
    pub passed: bool,
    pub severity: Severity,
    pub message: String,
    /// Remediation text; empty when the rule passed.
    pub suggestion: String,
}

impl ValidationResult {
    pub fn passed(rule: &str, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            rule: rule.to_string(),
            passed: true,
            severity,
            message: message.into(),
            suggestion: String::new(),
        }
    }

    pub fn failed(
        rule: &str,
        severity: Severity,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            rule: rule.to_string(),
            passed: false,
            severity,
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }
}

/// A change ticket as ingested from the upstream system, before rule
/// evaluation. Derived fields do not exist at this stage.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketDraft {
    pub id: String,
    pub number: String,
    pub short_description: String,
    pub description: String,
    pub requested_by: String,
    pub assigned_to: String,
    pub priority: Priority,
    pub status: TicketStatus,
    pub created_at: String,
    pub scheduled_start_date: String,
    pub scheduled_end_date: String,
    #[serde(default)]
    pub approval_chain: Option<Vec<String>>,
    #[serde(default)]
    pub testing_evidence: Option<String>,
    #[serde(default)]
    pub rollback_plan: Option<String>,
    #[serde(default)]
    pub change_window: Option<String>,
}

/// A fully evaluated change ticket. `compliance_status` and
/// `validation_results` are always the output of the most recent rule
/// evaluation over the other fields, never independently stored state.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeTicket {
    pub id: String,
    pub number: String,
    pub short_description: String,
    pub description: String,
    pub requested_by: String,
    pub assigned_to: String,
    pub priority: Priority,
    pub status: TicketStatus,
    pub created_at: String,
    pub scheduled_start_date: String,
    pub scheduled_end_date: String,
    #[serde(default)]
    pub approval_chain: Option<Vec<String>>,
    #[serde(default)]
    pub testing_evidence: Option<String>,
    #[serde(default)]
    pub rollback_plan: Option<String>,
    #[serde(default)]
    pub change_window: Option<String>,
    pub compliance_status: ComplianceStatus,
    pub validation_results: Vec<ValidationResult>,
}

impl ChangeTicket {
    /// Assemble a ticket from its draft plus an evaluation outcome.
    pub fn from_draft(
        draft: TicketDraft,
        compliance_status: ComplianceStatus,
        validation_results: Vec<ValidationResult>,
    ) -> Self {
        Self {
            id: draft.id,
            number: draft.number,
            short_description: draft.short_description,
            description: draft.description,
            requested_by: draft.requested_by,
            assigned_to: draft.assigned_to,
            priority: draft.priority,
            status: draft.status,
            created_at: draft.created_at,
            scheduled_start_date: draft.scheduled_start_date,
            scheduled_end_date: draft.scheduled_end_date,
            approval_chain: draft.approval_chain,
            testing_evidence: draft.testing_evidence,
            rollback_plan: draft.rollback_plan,
            change_window: draft.change_window,
            compliance_status,
            validation_results,
        }
    }

    /// The fields a rule can read, detached from derived state.
    pub fn to_draft(&self) -> TicketDraft {
        TicketDraft {
            id: self.id.clone(),
            number: self.number.clone(),
            short_description: self.short_description.clone(),
            description: self.description.clone(),
            requested_by: self.requested_by.clone(),
            assigned_to: self.assigned_to.clone(),
            priority: self.priority,
            status: self.status,
            created_at: self.created_at.clone(),
            scheduled_start_date: self.scheduled_start_date.clone(),
            scheduled_end_date: self.scheduled_end_date.clone(),
            approval_chain: self.approval_chain.clone(),
            testing_evidence: self.testing_evidence.clone(),
            rollback_plan: self.rollback_plan.clone(),
            change_window: self.change_window.clone(),
        }
    }

    pub fn failed_results(&self) -> Vec<&ValidationResult> {
        self.validation_results.iter().filter(|r| !r.passed).collect()
    }
}
