//! First order low-pass filter

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A discrete first order low-pass filter with time constant `rc` sampled at
/// a fixed period `dt`.
///
/// An uninitialised filter takes the value of the first sample it is given,
/// avoiding the slow ramp from the initial value.
#[derive(Debug, Clone, Copy)]
pub struct FirstOrderFilter {
    x: f64,
    dt: f64,
    alpha: f64,
    initialized: bool
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl FirstOrderFilter {
    /// Create a new filter.
    ///
    /// # Inputs
    /// - `x0`: Initial filter value
    /// - `rc`: Time constant in seconds
    /// - `dt`: Sample period in seconds
    /// - `initialized`: If false the first sample passed to `update` is taken
    ///   directly as the filter value.
    pub fn new(x0: f64, rc: f64, dt: f64, initialized: bool) -> Self {
        let mut filter = Self {
            x: x0,
            dt,
            alpha: 0.0,
            initialized
        };
        filter.update_alpha(rc);
        filter
    }

    /// Change the time constant of the filter.
    pub fn update_alpha(&mut self, rc: f64) {
        self.alpha = self.dt / (rc + self.dt);
    }

    /// Pass a new sample through the filter, returning the filtered value.
    pub fn update(&mut self, x: f64) -> f64 {
        if self.initialized {
            self.x = (1.0 - self.alpha) * self.x + self.alpha * x;
        }
        else {
            self.initialized = true;
            self.x = x;
        }

        self.x
    }

    /// Current filtered value.
    pub fn value(&self) -> f64 {
        self.x
    }

    /// Whether the filter has received a sample (or was created initialised).
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Reset the filter value. An uninitialised filter snaps to its next
    /// sample again.
    pub fn reset(&mut self, x0: f64, initialized: bool) {
        self.x = x0;
        self.initialized = initialized;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_uninitialised_snaps_to_first_sample() {
        let mut f = FirstOrderFilter::new(0.0, 2.5, 0.01, false);
        assert_eq!(f.update(0.5), 0.5);

        // Then moves slowly
        let x = f.update(0.0);
        assert!(x < 0.5 && x > 0.49);
    }

    #[test]
    fn test_reset() {
        let mut f = FirstOrderFilter::new(0.0, 2.5, 0.01, false);
        f.update(0.5);

        f.reset(0.0, false);
        assert!(!f.is_initialized());
        assert_eq!(f.update(-0.3), -0.3);

        f.reset(1.0, true);
        assert!(f.update(0.0) > 0.99);
    }

    #[test]
    fn test_converges() {
        let mut f = FirstOrderFilter::new(0.0, 0.5, 0.01, true);
        let alpha = 0.01 / 0.51;
        assert!((f.update(1.0) - alpha).abs() < 1e-12);

        for _ in 0..1000 {
            f.update(1.0);
        }
        assert!((f.value() - 1.0).abs() < 1e-6);
    }
}
