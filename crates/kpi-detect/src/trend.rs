use crate::config::MatchPolicy;

/// 某一时刻的趋势判定
#[derive(Debug, Clone, PartialEq)]
pub struct TrendMatch {
    /// 命中的窗口大小
    pub window: Option<usize>,

    /// 基准值，命中时为 `value[t-n] - 1`，否则为 `value[t-2] - 1`
    pub floor: Option<f64>,

    pub reason: String,
}

impl TrendMatch {
    pub fn is_match(&self) -> bool {
        self.window.is_some()
    }
}

fn reason_for(window: usize) -> String {
    format!("sustained drop over {} steps", window - 1)
}

/// 在下标 `t` 处按窗口 `n = 2 .. max_n-1` 评估持续下降规则
///
/// 窗口 `n` 命中条件：`value[t]` 与 `value[t-1] .. value[t-n+1]` 全部小于
/// `value[t-n] - 1`。`LastMatch` 时较大的窗口覆盖较小的窗口。
pub fn evaluate_trend(values: &[f64], t: usize, max_n: usize, policy: MatchPolicy) -> TrendMatch {
    let mut result = TrendMatch {
        window: None,
        floor: (t >= 2 && t < values.len()).then(|| values[t - 2] - 1.0),
        reason: String::new(),
    };
    if t >= values.len() {
        return result;
    }

    for n in 2..max_n {
        if t < n {
            break;
        }

        let floor = values[t - n] - 1.0;
        let satisfied = (0..n).all(|k| values[t - k] < floor);
        if !satisfied {
            continue;
        }

        result.window = Some(n);
        result.floor = Some(floor);
        result.reason = reason_for(n);

        if policy == MatchPolicy::FirstMatch {
            break;
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const FALLING: [f64; 7] = [100.0, 97.0, 94.0, 91.0, 88.0, 85.0, 82.0];

    #[test]
    fn test_last_match_takes_largest_window() {
        let m = evaluate_trend(&FALLING, 6, 9, MatchPolicy::LastMatch);
        assert_eq!(m.window, Some(6));
        assert_eq!(m.floor, Some(99.0));
        assert_eq!(m.reason, "sustained drop over 5 steps");
    }

    #[test]
    fn test_first_match_takes_smallest_window() {
        let m = evaluate_trend(&FALLING, 6, 9, MatchPolicy::FirstMatch);
        assert_eq!(m.window, Some(2));
        assert_eq!(m.floor, Some(87.0));
        assert_eq!(m.reason, "sustained drop over 1 steps");
    }

    #[test]
    fn test_max_n_bounds_window() {
        let m = evaluate_trend(&FALLING, 6, 4, MatchPolicy::LastMatch);
        assert_eq!(m.window, Some(3));
        assert_eq!(m.floor, Some(90.0));
    }

    #[test]
    fn test_flat_and_rising_never_match() {
        let flat = [90.0; 7];
        let rising = [80.0, 82.0, 84.0, 86.0, 88.0, 90.0, 92.0];
        for t in 0..7 {
            assert!(!evaluate_trend(&flat, t, 9, MatchPolicy::LastMatch).is_match());
            assert!(!evaluate_trend(&rising, t, 9, MatchPolicy::LastMatch).is_match());
        }
    }

    #[test]
    fn test_small_drops_within_unit_offset() {
        let values = [96.0, 95.5, 95.0, 94.0, 93.0, 92.0, 91.0];
        let m = evaluate_trend(&values, 6, 9, MatchPolicy::LastMatch);
        assert!(!m.is_match());
        assert_eq!(m.floor, Some(92.0));
        assert!(m.reason.is_empty());
    }

    #[test]
    fn test_short_series() {
        assert_eq!(
            evaluate_trend(&[10.0, 5.0], 1, 9, MatchPolicy::LastMatch),
            TrendMatch {
                window: None,
                floor: None,
                reason: String::new()
            }
        );

        let m = evaluate_trend(&[10.0, 5.0, 3.0], 2, 9, MatchPolicy::LastMatch);
        assert_eq!(m.window, Some(2));
        assert_eq!(m.floor, Some(9.0));
    }
}
