//! KPI 异常检测
//!
//! 从时序库拉取每个 (node, kpi) 最近的历史，用 EMA 基线和多窗口持续下降规则
//! 判定是否告警，并组装成按网元类型投递的告警载荷。

pub mod config;
pub mod detector;
pub mod ema;
pub mod trend;

pub use config::{Criterion, DetectorConfig, MatchPolicy, Polarity, MAX_LOOKBACK_MINUTES};
pub use detector::{DetectionOutcome, SignalDetector};
pub use ema::ema;
pub use trend::{evaluate_trend, TrendMatch};
