pub mod agent;
pub mod bus;
pub mod config;
pub mod fallback;
pub mod logging;
pub mod parser;
pub mod scheduler;
pub mod tools;

// Re-export the request-path types at crate root for convenience
pub use agent::Agent;
pub use bus::MessageBus;
pub use config::Config;
pub use parser::{IntentParser, Tool, ToolCall};
pub use scheduler::{EventChecker, EventStore, SchedulerEngine};
pub use tools::ToolDispatcher;
