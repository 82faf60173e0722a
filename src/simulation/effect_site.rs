//! Hybrid analytic effect-site concentration calculation.
//!
//! The effect site follows dCe/dt = ke0 (Cp - Ce). Over each sampling
//! interval the plasma concentration is treated as constant or linear,
//! both of which admit closed-form solutions, so the series is exact for
//! piecewise-linear plasma input. Accuracy against the true plasma curve
//! is set by the sampling density chosen upstream.

use crate::error::{PKError, PKResult};

/// Plasma differences below this are treated as a constant segment.
const CONSTANT_PLASMA_EPS: f64 = 1e-6;
/// Below this value of ke0*dt the general solution loses precision to
/// cancellation; a second-order Taylor expansion is used instead.
const TAYLOR_THRESHOLD: f64 = 1e-3;

/// Computes the effect-site series for a plasma series sampled at `times`.
/// Ce starts at zero.
pub fn hybrid_series(plasma: &[f64], times: &[f64], ke0: f64) -> PKResult<Vec<f64>> {
    if plasma.len() != times.len() {
        return Err(PKError::InvalidInput(format!(
            "plasma series has {} points but time grid has {}",
            plasma.len(),
            times.len()
        )));
    }
    if !ke0.is_finite() || ke0 <= 0.0 {
        return Err(PKError::InvalidInput(format!(
            "ke0 must be positive, got {}",
            ke0
        )));
    }

    let mut ce = vec![0.0; times.len()];
    if times.is_empty() {
        return Ok(ce);
    }

    for i in 1..times.len() {
        let dt = times[i] - times[i - 1];
        let cp_current = plasma[i];
        let cp_previous = plasma[i - 1];
        let ce_previous = ce[i - 1];

        ce[i] = if (cp_current - cp_previous).abs() < CONSTANT_PLASMA_EPS {
            // Step input: exact exponential approach toward Cp.
            cp_current + (ce_previous - cp_current) * (-ke0 * dt).exp()
        } else {
            let slope = (cp_current - cp_previous) / dt;
            if (ke0 * dt).abs() < TAYLOR_THRESHOLD {
                ce_previous
                    + dt * ke0 * (cp_previous - ce_previous)
                    + dt * dt * ke0 * slope / 2.0
            } else {
                // Closed form for a linear ramp input.
                cp_current + (ce_previous - cp_previous + slope / ke0) * (-ke0 * dt).exp()
                    - slope / ke0
            }
        };
    }

    Ok(ce)
}
