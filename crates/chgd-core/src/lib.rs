pub mod chat;
pub mod errors;
pub mod generate;
pub mod query;
pub mod ticket;

pub use chat::{ChatMessage, ChatRequest, ChatResponse, ChatRole};
pub use errors::GatewayError;
pub use generate::{GenerateOptions, TextGenerator};
pub use query::{DashboardStats, SortBy, SortOrder, TicketFilters, TicketPage};
pub use ticket::{
    ChangeTicket, ComplianceStatus, Priority, Severity, TicketDraft, TicketStatus,
    ValidationResult,
};
