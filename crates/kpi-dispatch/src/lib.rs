//! 采集周期调度
//!
//! 每个周期针对一种网元类型：并发采集全部网元（有上限、互不影响），
//! 等待全部结束后逐个入库，再运行检测并在有告警时投递。

pub mod dispatcher;

pub use dispatcher::{worker_count, DispatchConfig, ParallelDispatcher};
