pub mod pipeline;
pub mod scheduler;

pub use pipeline::Pipeline;
pub use scheduler::CycleScheduler;
