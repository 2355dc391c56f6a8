use chrono::Duration;
use serde::{Deserialize, Serialize};

/// 回看时长上限：30 天
pub const MAX_LOOKBACK_MINUTES: i64 = 30 * 24 * 60;

/// 多个窗口同时命中时以哪个为准
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchPolicy {
    FirstMatch,
    #[default]
    LastMatch,
}

/// 告警判据
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Criterion {
    #[default]
    Trend,
    Baseline,
    TrendOrBaseline,
}

/// 判据的极性；`Inverted` 时判据不成立的组才告警
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Polarity {
    #[default]
    Direct,
    Inverted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// 每个序列保留的最近样本数
    pub window: usize,

    /// 趋势窗口上限（不含）
    pub max_n: usize,

    pub lookback_minutes: i64,
    pub ema_span: usize,
    pub policy: MatchPolicy,
    pub criterion: Criterion,
    pub polarity: Polarity,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window: 7,
            max_n: 9,
            lookback_minutes: 280,
            ema_span: 3,
            policy: MatchPolicy::default(),
            criterion: Criterion::default(),
            polarity: Polarity::default(),
        }
    }
}

impl DetectorConfig {
    /// 回看时长，超出范围时截断到 `0..=MAX_LOOKBACK_MINUTES`
    pub fn lookback(&self) -> Duration {
        Duration::try_minutes(self.lookback_minutes.clamp(0, MAX_LOOKBACK_MINUTES))
            .unwrap_or_else(Duration::zero)
    }

    pub fn decide(&self, trend_flag: bool, baseline_breach: bool) -> bool {
        let raw = match self.criterion {
            Criterion::Trend => trend_flag,
            Criterion::Baseline => baseline_breach,
            Criterion::TrendOrBaseline => trend_flag || baseline_breach,
        };

        match self.polarity {
            Polarity::Direct => raw,
            Polarity::Inverted => !raw,
        }
    }
}
