pub mod alert;
pub mod node;
pub mod sample;

pub use alert::{AlertEntry, AlertPayload, AlertRecord, KpiThreshold};
pub use node::{Credentials, NodeConfig, NodeType};
pub use sample::{KpiSample, KpiSeries};
