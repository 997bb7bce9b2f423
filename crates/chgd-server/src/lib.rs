pub mod chat;
pub mod handlers;
pub mod server;

pub use chat::ChatBridge;
pub use server::{build_router, start, AppState, ServerConfig, ServerHandle};
