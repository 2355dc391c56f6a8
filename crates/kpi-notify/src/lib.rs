pub mod error;
pub mod file;
pub mod manager;
pub mod recording;
pub mod sink;
pub mod webhook;

pub use error::{Result, SinkError};
pub use file::FileSink;
pub use manager::{AlertConfig, DeliveryStats, SinkManager};
pub use recording::RecordingSink;
pub use sink::AlertSink;
pub use webhook::{WebhookConfig, WebhookSink};
