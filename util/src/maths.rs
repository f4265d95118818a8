//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Map a value from one range into another.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where
    T: Float
{
    target_range.0
        + ((value - source_range.0)
        * (target_range.1 - target_range.0)
        / (source_range.1 - source_range.0))
}

/// Piecewise linear interpolation of `value` over the breakpoints `x_bp` and
/// values `y_bp`.
///
/// Values outside the breakpoint range are held at the first or last value.
/// The breakpoints must be ascending. If the two slices have different
/// lengths only the common prefix is used. Interpolating over empty
/// breakpoints returns zero.
pub fn interp<T>(value: T, x_bp: &[T], y_bp: &[T]) -> T
where
    T: Float
{
    let n = x_bp.len().min(y_bp.len());

    if n == 0 {
        return T::zero()
    }

    if value <= x_bp[0] {
        return y_bp[0]
    }
    if value >= x_bp[n - 1] {
        return y_bp[n - 1]
    }

    // Find the segment containing the value. The checks above guarantee the
    // value lies strictly inside the breakpoint range.
    for i in 1..n {
        if value <= x_bp[i] {
            // Repeated breakpoints have no width, take the right hand value
            if x_bp[i] == x_bp[i - 1] {
                return y_bp[i]
            }

            return lin_map((x_bp[i - 1], x_bp[i]), (y_bp[i - 1], y_bp[i]), value)
        }
    }

    y_bp[n - 1]
}

/// Return the sign of a value as -1, 0, or +1.
///
/// Unlike `Float::signum` zero (of either sign) maps to zero.
pub fn sign<T>(value: T) -> T
where
    T: Float
{
    if value > T::zero() {
        T::one()
    }
    else if value < T::zero() {
        -T::one()
    }
    else {
        T::zero()
    }
}

pub fn clamp<T>(value: &T, min: &T, max: &T) -> T
where
    T: Float
{
    let mut ret = *value;

    if ret > *max {
        ret = *max
    }
    if ret < *min {
        ret = *min
    }

    ret
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_interp() {
        let x = [8.0, 13.0, 20.0];
        let y = [0.88, 0.93, 1.0];

        assert_eq!(interp(0.0, &x, &y), 0.88);
        assert_eq!(interp(8.0, &x, &y), 0.88);
        assert!((interp(13.0, &x, &y) - 0.93).abs() < 1e-12);
        assert!((interp(10.5, &x, &y) - 0.905).abs() < 1e-12);
        assert_eq!(interp(20.0, &x, &y), 1.0);
        assert_eq!(interp(35.0, &x, &y), 1.0);

        // Descending values are fine, only breakpoints must ascend
        assert!((interp(0.5, &[0.0, 1.0], &[0.5, 0.0]) - 0.25).abs() < 1e-12);

        // Degenerate inputs
        assert_eq!(interp(1.0, &[], &[] as &[f64]), 0.0);
        assert_eq!(interp(1.0, &[2.0], &[3.0]), 3.0);
    }

    #[test]
    fn test_sign() {
        assert_eq!(sign(3.2f64), 1.0);
        assert_eq!(sign(-0.1f64), -1.0);
        assert_eq!(sign(0.0f64), 0.0);
        assert_eq!(sign(-0.0f64), 0.0);
    }

    #[test]
    fn test_clamp() {
        assert_eq!(clamp(&1.5f64, &-1.0, &1.0), 1.0);
        assert_eq!(clamp(&-1.5f64, &-1.0, &1.0), -1.0);
        assert_eq!(clamp(&0.25f64, &-1.0, &1.0), 0.25);
    }
}
