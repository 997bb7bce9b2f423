pub mod anthropic;
pub mod mock;
pub mod reliable;

pub use anthropic::AnthropicGenerator;
pub use mock::{MockGenerator, MockReply};
pub use reliable::{ReliableConfig, ReliableGenerator};
