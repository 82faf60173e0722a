//! Real-root solver for the monic cubic x^3 + a2*x^2 + a1*x + a0 = 0.
//!
//! The compartmental disposition polynomial has three negative real
//! eigenvalues for physiological rate constants. Callers work with their
//! magnitudes, so roots are returned as absolute values sorted descending
//! (alpha >= beta >= gamma).

use std::f64::consts::PI;

const DISCRIMINANT_EPS: f64 = 1e-10;

/// Solves the monic cubic and returns the magnitudes of its real roots in
/// descending order. Fewer than three entries means the cubic does not have
/// three real roots and the caller must treat the solve as failed.
pub fn solve_monic_cubic(a2: f64, a1: f64, a0: f64) -> Vec<f64> {
    // Depressed form t^3 + p*t + q = 0 with x = t - a2/3
    let p = a1 - a2 * a2 / 3.0;
    let q = (2.0 * a2 * a2 * a2 - 9.0 * a2 * a1 + 27.0 * a0) / 27.0;

    let discriminant = (q / 2.0).powi(2) + (p / 3.0).powi(3);

    let mut roots = Vec::with_capacity(3);

    if discriminant > DISCRIMINANT_EPS {
        // One real root (Cardano)
        let sqrt_disc = discriminant.sqrt();
        let u = (-q / 2.0 + sqrt_disc).cbrt();
        let v = (-q / 2.0 - sqrt_disc).cbrt();
        roots.push(u + v - a2 / 3.0);
    } else if discriminant.abs() <= DISCRIMINANT_EPS {
        if p.abs() < DISCRIMINANT_EPS {
            // Triple root
            let x = -a2 / 3.0;
            roots.extend([x, x, x]);
        } else {
            // Double root
            let x1 = 3.0 * q / p - a2 / 3.0;
            let x2 = -3.0 * q / (2.0 * p) - a2 / 3.0;
            roots.extend([x1, x2, x2]);
        }
    } else {
        // Three distinct real roots (trigonometric form)
        let rho = (-(p / 3.0).powi(3)).sqrt();
        let theta = (-q / (2.0 * rho)).acos();

        for k in 0..3 {
            let t = 2.0 * rho.cbrt() * ((theta + 2.0 * PI * k as f64) / 3.0).cos();
            roots.push(t - a2 / 3.0);
        }
    }

    let mut magnitudes: Vec<f64> = roots
        .into_iter()
        .filter(|r| r.is_finite())
        .map(f64::abs)
        .collect();
    magnitudes.sort_by(|a, b| b.partial_cmp(a).unwrap());
    magnitudes
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn coefficients_from_eigenvalues(l1: f64, l2: f64, l3: f64) -> (f64, f64, f64) {
        // (x + l1)(x + l2)(x + l3) expanded
        (l1 + l2 + l3, l1 * l2 + l1 * l3 + l2 * l3, l1 * l2 * l3)
    }

    #[test]
    fn test_three_distinct_roots_round_trip() {
        let (a2, a1, a0) = coefficients_from_eigenvalues(1.2, 0.4, 0.05);
        let roots = solve_monic_cubic(a2, a1, a0);

        assert_eq!(roots.len(), 3);
        assert_relative_eq!(roots[0], 1.2, epsilon = 1e-8);
        assert_relative_eq!(roots[1], 0.4, epsilon = 1e-8);
        assert_relative_eq!(roots[2], 0.05, epsilon = 1e-8);
    }

    #[test]
    fn test_compartmental_eigenvalues() {
        // k10=0.3, k12=0.2, k21=0.1, k13=0.05, k31=0.02
        let (k10, k12, k21, k13, k31) = (0.3, 0.2, 0.1, 0.05, 0.02);
        let a2 = k10 + k12 + k13 + k21 + k31;
        let a1 = (k10 + k13) * k21 + (k10 + k12) * k31 + k21 * k31;
        let a0 = k10 * k21 * k31;

        let roots = solve_monic_cubic(a2, a1, a0);
        assert_eq!(roots.len(), 3);

        // Each magnitude must actually solve (x + r) factorization, i.e.
        // -r is a root of the monic cubic.
        for &r in &roots {
            let x = -r;
            let residual = x.powi(3) + a2 * x.powi(2) + a1 * x + a0;
            assert!(residual.abs() < 1e-10, "residual {} for root {}", residual, r);
        }
        assert!(roots[0] >= roots[1] && roots[1] >= roots[2]);
    }

    #[test]
    fn test_triple_root() {
        // (x + 1)^3
        let roots = solve_monic_cubic(3.0, 3.0, 1.0);
        assert_eq!(roots.len(), 3);
        for &r in &roots {
            assert_relative_eq!(r, 1.0, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_double_root() {
        // (x + 2)^2 (x + 1)
        let roots = solve_monic_cubic(5.0, 8.0, 4.0);
        assert_eq!(roots.len(), 3);
        assert_relative_eq!(roots[0], 2.0, epsilon = 1e-8);
        assert_relative_eq!(roots[1], 2.0, epsilon = 1e-8);
        assert_relative_eq!(roots[2], 1.0, epsilon = 1e-8);
    }

    #[test]
    fn test_single_real_root() {
        // x^3 + x + 1 has one real root near -0.6823
        let roots = solve_monic_cubic(0.0, 1.0, 1.0);
        assert_eq!(roots.len(), 1);
        assert_relative_eq!(roots[0], 0.6823278038280193, epsilon = 1e-10);
    }
}
