/// 递归形式的指数移动平均：`alpha = 2/(span+1)`，`ema_0 = value_0`
///
/// 输入需按时间升序。
pub fn ema(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span.max(1) as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());

    let mut prev: Option<f64> = None;
    for &value in values {
        let next = match prev {
            Some(p) => alpha * value + (1.0 - alpha) * p,
            None => value,
        };
        out.push(next);
        prev = Some(next);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_series() {
        assert_eq!(ema(&[5.0; 6], 3), vec![5.0; 6]);
    }

    #[test]
    fn test_span_three() {
        let out = ema(&[96.0, 95.5, 95.0, 94.0], 3);
        assert_eq!(out, vec![96.0, 95.75, 95.375, 94.6875]);
    }

    #[test]
    fn test_empty() {
        assert!(ema(&[], 3).is_empty());
    }
}
