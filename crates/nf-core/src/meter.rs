//! Exponential running averages for noisy per-iteration metrics.

/// Stores the latest value and an exponentially decayed average of all values.
///
/// The first `update` seeds the average with the value itself; every later
/// update applies `avg = avg * momentum + val * (1 - momentum)`.
#[derive(Clone, Debug)]
pub struct RunningAverageMeter {
    momentum: f64,
    val: Option<f64>,
    avg: f64,
}

impl Default for RunningAverageMeter {
    fn default() -> Self {
        Self::new(0.99)
    }
}

impl RunningAverageMeter {
    pub fn new(momentum: f64) -> Self {
        Self {
            momentum,
            val: None,
            avg: 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.val = None;
        self.avg = 0.0;
    }

    pub fn update(&mut self, val: f64) {
        if self.val.is_none() {
            self.avg = val;
        } else {
            self.avg = self.avg * self.momentum + val * (1.0 - self.momentum);
        }
        self.val = Some(val);
    }

    /// Most recent value, `None` before the first update.
    pub fn val(&self) -> Option<f64> {
        self.val
    }

    pub fn avg(&self) -> f64 {
        self.avg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Tolerances, nearly_equal};

    #[test]
    fn first_update_is_exact() {
        let mut m = RunningAverageMeter::new(0.97);
        assert_eq!(m.val(), None);
        m.update(3.25);
        assert_eq!(m.avg(), 3.25);
        assert_eq!(m.val(), Some(3.25));
    }

    #[test]
    fn second_update_decays() {
        let mut m = RunningAverageMeter::new(0.97);
        m.update(2.0);
        m.update(5.0);
        let expected = 2.0 * 0.97 + 5.0 * (1.0 - 0.97);
        assert!(nearly_equal(m.avg(), expected, Tolerances::default()));
        assert_eq!(m.val(), Some(5.0));
    }

    #[test]
    fn reset_restarts_seeding() {
        let mut m = RunningAverageMeter::new(0.5);
        m.update(10.0);
        m.update(0.0);
        m.reset();
        assert_eq!(m.avg(), 0.0);
        m.update(7.0);
        assert_eq!(m.avg(), 7.0);
    }

    #[test]
    fn nan_propagates() {
        let mut m = RunningAverageMeter::new(0.97);
        m.update(1.0);
        m.update(f64::NAN);
        assert!(m.avg().is_nan());
    }
}
