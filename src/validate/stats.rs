//! Baseline statistics over a window of samples.

/// Standard deviation used when the window is too small to estimate one.
pub const STDEV_FLOOR: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baseline {
    pub mean: f64,
    pub stdev: f64,
    pub count: usize,
}

impl Baseline {
    /// Mean and sample standard deviation (n - 1). Fewer than two samples
    /// get `STDEV_FLOOR` instead of a zero-width band. `None` when empty.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        let n = samples.len();
        if n == 0 {
            return None;
        }
        let mean = samples.iter().sum::<f64>() / n as f64;
        let stdev = if n < 2 {
            STDEV_FLOOR
        } else {
            let ss: f64 = samples.iter().map(|x| (x - mean).powi(2)).sum();
            (ss / (n - 1) as f64).sqrt()
        };
        Some(Self {
            mean,
            stdev,
            count: n,
        })
    }

    pub fn deviation(&self, value: f64) -> f64 {
        (value - self.mean).abs()
    }

    /// Strictly beyond `threshold` standard deviations.
    pub fn is_outlier(&self, value: f64, threshold: f64) -> bool {
        self.deviation(value) > threshold * self.stdev
    }
}

/// Round to `places` decimals for published figures.
pub fn round_to(x: f64, places: i32) -> f64 {
    let f = 10f64.powi(places);
    (x * f).round() / f
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_stdev_uses_n_minus_one() {
        let b = Baseline::from_samples(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!((b.mean - 5.0).abs() < 1e-12);
        // population sd is 2.0; sample sd is sqrt(32/7)
        assert!((b.stdev - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn single_sample_gets_floor() {
        let b = Baseline::from_samples(&[12.0]).unwrap();
        assert_eq!(b.stdev, STDEV_FLOOR);
        assert!(Baseline::from_samples(&[]).is_none());
    }

    #[test]
    fn outlier_is_strict() {
        let b = Baseline {
            mean: 10.0,
            stdev: 1.0,
            count: 10,
        };
        assert!(!b.is_outlier(13.0, 3.0));
        assert!(b.is_outlier(13.01, 3.0));
        assert!(b.is_outlier(6.5, 3.0));
    }

    #[test]
    fn rounding() {
        assert_eq!(round_to(1.23456, 2), 1.23);
        assert_eq!(round_to(-0.005, 2), -0.01);
    }
}
