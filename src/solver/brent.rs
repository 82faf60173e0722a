//! Bracketed scalar root finding (Brent's method).
//!
//! Combines inverse quadratic interpolation and secant steps with a
//! bisection fallback. The bracket [lower, upper] must straddle a sign
//! change or the search fails before iterating.

use crate::error::{PKError, PKResult};

/// Finds a root of `f` inside `[lower, upper]`.
///
/// Returns `PKError::Bracket` when f(lower) and f(upper) have the same sign.
pub fn find_root<F>(
    mut f: F,
    lower: f64,
    upper: f64,
    tolerance: f64,
    max_iterations: usize,
) -> PKResult<f64>
where
    F: FnMut(f64) -> f64,
{
    let mut a = lower;
    let mut b = upper;
    let mut fa = f(a);
    let mut fb = f(b);

    if fa * fb > 0.0 {
        return Err(PKError::Bracket { lower, upper });
    }

    if fa.abs() < fb.abs() {
        std::mem::swap(&mut a, &mut b);
        std::mem::swap(&mut fa, &mut fb);
    }

    let mut c = a;
    let mut fc = fa;
    let mut mflag = true;
    let mut d = 0.0;

    for _ in 0..max_iterations {
        if (b - a).abs() < tolerance {
            return Ok(b);
        }

        let mut s = if fa != fc && fb != fc {
            // Inverse quadratic interpolation
            a * fb * fc / ((fa - fb) * (fa - fc))
                + b * fa * fc / ((fb - fa) * (fb - fc))
                + c * fa * fb / ((fc - fa) * (fc - fb))
        } else {
            // Secant step
            b - fb * (b - a) / (fb - fa)
        };

        // Safeguards: fall back to bisection when the interpolated point is
        // outside [(3a+b)/4, b] or fails to shrink the bracket fast enough.
        let out_of_range = s < (3.0 * a + b) / 4.0 || s > b;
        let slow_with_flag = mflag && (s - b).abs() >= (b - c).abs() / 2.0;
        let slow_without_flag = !mflag && (s - b).abs() >= (c - d).abs() / 2.0;
        let stalled_with_flag = mflag && (b - c).abs() < tolerance;
        let stalled_without_flag = !mflag && (c - d).abs() < tolerance;

        if out_of_range
            || slow_with_flag
            || slow_without_flag
            || stalled_with_flag
            || stalled_without_flag
        {
            s = (a + b) / 2.0;
            mflag = true;
        } else {
            mflag = false;
        }

        let fs = f(s);
        d = c;
        c = b;
        fc = fb;

        if fa * fs < 0.0 {
            b = s;
            fb = fs;
        } else {
            a = s;
            fa = fs;
        }

        if fa.abs() < fb.abs() {
            std::mem::swap(&mut a, &mut b);
            std::mem::swap(&mut fa, &mut fb);
        }
    }

    Ok(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_finds_sqrt_two() {
        let root = find_root(|x| x * x - 2.0, 1.0, 2.0, 1e-12, 100).unwrap();
        assert_relative_eq!(root, std::f64::consts::SQRT_2, epsilon = 1e-10);
    }

    #[test]
    fn test_monotone_function_idempotent() {
        let f = |x: f64| x.exp() - 3.0;
        let first = find_root(f, 0.0, 2.0, 1e-12, 100).unwrap();
        let second = find_root(f, 0.0, 2.0, 1e-12, 100).unwrap();
        assert_eq!(first, second);
        assert_relative_eq!(first, 3.0_f64.ln(), epsilon = 1e-10);
    }

    #[test]
    fn test_rejects_bracket_without_sign_change() {
        let result = find_root(|x| x * x + 1.0, -1.0, 1.0, 1e-12, 100);
        assert!(matches!(result, Err(PKError::Bracket { .. })));
    }

    #[test]
    fn test_root_at_endpoint() {
        // f(a) == 0 makes fa * fb == 0, which is an acceptable bracket
        let root = find_root(|x| x - 1.0, 1.0, 2.0, 1e-12, 100).unwrap();
        assert_relative_eq!(root, 1.0, epsilon = 1e-10);
    }
}
