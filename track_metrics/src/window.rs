use std::collections::VecDeque;

/// Trailing arithmetic mean over the last `width` values, updated in O(1).
///
/// While fewer than `width` values have been seen the mean is taken over all
/// of them, so the first output equals the first input.
#[derive(Clone, Debug)]
pub struct RollingMean {
    width: usize,
    sum: f64,
    values: VecDeque<f64>,
}

impl RollingMean {
    /// `width` is clamped to at least 1.
    pub fn new(width: usize) -> Self {
        let width = width.max(1);
        Self {
            width,
            sum: 0.0,
            values: VecDeque::with_capacity(width),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Feed the next value and return the mean of the current window.
    pub fn push(&mut self, value: f64) -> f64 {
        if self.values.len() == self.width {
            if let Some(leaving) = self.values.pop_front() {
                self.sum -= leaving;
            }
            self.sum += value;
            self.values.push_back(value);
            self.sum / self.width as f64
        } else {
            self.sum += value;
            self.values.push_back(value);
            self.sum / self.values.len() as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive(values: &[f64], i: usize, width: usize) -> f64 {
        let start = (i + 1).saturating_sub(width);
        let slice = &values[start..=i];
        slice.iter().sum::<f64>() / slice.len() as f64
    }

    fn noisy_series(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let f = i as f64;
                12.0 + (f * 0.37).sin() * 4.0 + (f * 1.91).cos() * 2.5 - (i % 7) as f64
            })
            .collect()
    }

    #[test]
    fn shrinks_at_start_then_slides() {
        let mut mean = RollingMean::new(3);
        let out: Vec<f64> = [10.0, 20.0, 30.0, 40.0, 50.0, 60.0]
            .iter()
            .map(|&v| mean.push(v))
            .collect();
        assert_eq!(out, vec![10.0, 15.0, 20.0, 30.0, 40.0, 50.0]);
    }

    #[test]
    fn matches_recomputed_mean() {
        let values = noisy_series(200);
        for width in [1usize, 5, 20] {
            let mut mean = RollingMean::new(width);
            for (i, &v) in values.iter().enumerate() {
                let got = mean.push(v);
                let want = naive(&values, i, width);
                assert!(
                    (got - want).abs() < 1e-9,
                    "width {width} index {i}: {got} != {want}"
                );
            }
        }
    }

    #[test]
    fn width_one_is_identity() {
        let mut mean = RollingMean::new(1);
        assert_eq!(mean.push(3.5), 3.5);
        assert_eq!(mean.push(-2.0), -2.0);
    }

    #[test]
    fn zero_width_behaves_as_one() {
        let mut mean = RollingMean::new(0);
        assert_eq!(mean.width(), 1);
        assert_eq!(mean.push(4.0), 4.0);
        assert_eq!(mean.push(8.0), 8.0);
    }
}
