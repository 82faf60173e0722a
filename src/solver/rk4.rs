//! Classical 4th-order Runge-Kutta step for the three-compartment system.
//!
//! Deterministic fallback with no error estimate and no failure branch;
//! the caller chooses the step size.

use crate::models::{CompartmentState, PKParameters};

/// Advances the compartment state by `dt` minutes under a constant central
/// infusion rate. Amounts are clamped non-negative afterwards.
pub fn step(
    params: &PKParameters,
    state: &CompartmentState,
    input_mg_min: f64,
    dt: f64,
) -> CompartmentState {
    let k1 = params.mass_balance(state, input_mg_min);
    let k2 = params.mass_balance(&state.advanced(dt / 2.0, k1), input_mg_min);
    let k3 = params.mass_balance(&state.advanced(dt / 2.0, k2), input_mg_min);
    let k4 = params.mass_balance(&state.advanced(dt, k3), input_mg_min);

    let next = CompartmentState {
        a1: state.a1 + dt * (k1[0] + 2.0 * k2[0] + 2.0 * k3[0] + k4[0]) / 6.0,
        a2: state.a2 + dt * (k1[1] + 2.0 * k2[1] + 2.0 * k3[1] + k4[1]) / 6.0,
        a3: state.a3 + dt * (k1[2] + 2.0 * k2[2] + 2.0 * k3[2] + k4[2]) / 6.0,
    };
    next.clamped_non_negative()
}
