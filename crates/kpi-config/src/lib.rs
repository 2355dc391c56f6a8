pub mod agent;
pub mod loader;

pub use agent::{AgentConfig, ScheduleConfig};
pub use loader::ConfigLoader;
