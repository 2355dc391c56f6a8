//! 三类网元的 KPI 采集器
//!
//! 所有采集器都实现 [`NodeCollector`]，只依赖 [`kpi_remote::RemoteSession`] 访问网元。
//! 会话的建立与释放由调度器负责。

pub mod cli;
pub mod collector;
pub mod delta;
pub mod error;
pub mod session_stat;

pub use cli::{CliCounterCollector, CliOptions, ColumnRef, RowRef, TabularKpi};
pub use collector::{collector_for, CollectContext, CollectorOptions, NodeCollector};
pub use delta::{DeltaCounterCollector, DeltaKpi, DeltaOptions};
pub use error::{CollectError, ParseError, Result};
pub use session_stat::{SessionStatCollector, SessionStatOptions};
