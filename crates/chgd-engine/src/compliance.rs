use chgd_core::ticket::{ComplianceStatus, Severity, ValidationResult};

/// Derive the tri-state verdict from a full evaluation: any failed error
/// result makes the ticket non-compliant; otherwise any failed warning
/// result downgrades it to warning; otherwise it is compliant.
pub fn aggregate(results: &[ValidationResult]) -> ComplianceStatus {
    let failed = results.iter().filter(|r| !r.passed);
    let mut worst = ComplianceStatus::Compliant;
    for result in failed {
        match result.severity {
            Severity::Error => return ComplianceStatus::NonCompliant,
            Severity::Warning => worst = ComplianceStatus::Warning,
        }
    }
    worst
}
