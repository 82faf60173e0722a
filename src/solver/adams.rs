//! Adaptive-order, adaptive-step Adams predictor-corrector integrator.
//!
//! Non-stiff multistep method in Nordsieck form: each state variable carries
//! the scaled derivative history z[j] = h^j y^(j) / j!, which is projected
//! forward with the Pascal-triangle cascade (predict), corrected with a
//! single derivative evaluation at the predicted point, and accepted only if
//! the weighted local error estimate is at most one. Step size and order are
//! re-selected after every accepted step; a rejected step restores the
//! history, shrinks the step by 4 and retries down to a hard floor.
//!
//! Corrector update coefficients are generated by the classical generating-
//! polynomial recurrence; rows for orders 1..=3 are the Adams-Moulton values
//! ([1, 1], [1/2, 1, 1/2], [5/12, 1, 3/4, 1/6]).

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{PKError, PKResult};

/// Largest supported corrector order.
pub const MAX_ORDER: usize = 12;

/// Order ceiling used unless the caller raises it. Beyond order five the
/// truncation error on a fine output grid drops below double-precision
/// noise in the history columns and the error estimate loses meaning.
pub const DEFAULT_MAX_ORDER: usize = 5;

const STEP_SHRINK: f64 = 0.25;
const STEP_SAFETY: f64 = 0.9;
const STEP_GROWTH_MAX: f64 = 5.0;
const STEP_GROWTH_MIN: f64 = 0.1;
const ORDER_RAISE_THRESHOLD: f64 = 0.25;
const ORDER_LOWER_THRESHOLD: f64 = 0.9;
const STEP_FLOOR_RATIO: f64 = 1e-10;
const INITIAL_STEP_RATIO: f64 = 1e-4;
// Residual interval shorter than this (minutes) is treated as already at
// the output point; integrating it would rescale the history into
// round-off noise.
const TIME_SNAP: f64 = 1e-9;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverSettings {
    #[serde(default = "default_rel_tol")]
    pub rel_tol: f64,
    #[serde(default = "default_abs_tol")]
    pub abs_tol: f64,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default = "default_max_order")]
    pub max_order: usize,
}

fn default_rel_tol() -> f64 {
    1e-8
}

fn default_abs_tol() -> f64 {
    1e-12
}

fn default_max_steps() -> usize {
    500
}

fn default_max_order() -> usize {
    DEFAULT_MAX_ORDER
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            rel_tol: default_rel_tol(),
            abs_tol: default_abs_tol(),
            max_steps: default_max_steps(),
            max_order: default_max_order(),
        }
    }
}

/// Counters describing one `integrate` run, reported to the caller as part
/// of the simulation diagnostics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IntegrationStats {
    pub accepted_steps: usize,
    pub rejected_steps: usize,
    pub derivative_evals: usize,
    pub final_order: usize,
    pub final_step_size: f64,
}

impl IntegrationStats {
    /// Accumulates counters from a follow-on integration segment.
    pub fn absorb(&mut self, other: &IntegrationStats) {
        self.accepted_steps += other.accepted_steps;
        self.rejected_steps += other.rejected_steps;
        self.derivative_evals += other.derivative_evals;
        self.final_order = other.final_order;
        self.final_step_size = other.final_step_size;
    }
}

/// State vectors at exactly the requested output times, plus run counters.
#[derive(Debug, Clone)]
pub struct Integration {
    pub states: Vec<Vec<f64>>,
    pub stats: IntegrationStats,
}

/// Corrector update rows, one per order; `rows[q][j]` multiplies the
/// correction applied to history column j at order q. Generated by forming
/// the polynomial p(x) = (x+1)(x+2)..(x+q-1) and integrating it over
/// [-1, 0], the standard Adams-Moulton construction.
fn corrector_rows() -> [[f64; MAX_ORDER + 1]; MAX_ORDER + 1] {
    let mut rows = [[0.0; MAX_ORDER + 1]; MAX_ORDER + 1];
    let mut pc = [0.0; MAX_ORDER + 2];
    pc[1] = 1.0;
    let mut rqfac = 1.0;

    for nq in 1..=MAX_ORDER {
        let rq1fac = rqfac;
        rqfac /= nq as f64;
        let fnqm1 = (nq - 1) as f64;

        if nq != 1 {
            pc[nq] = 0.0;
            for i in (2..=nq).rev() {
                pc[i] = pc[i - 1] + fnqm1 * pc[i];
            }
            pc[1] *= fnqm1;
        }

        let mut pint = pc[1];
        let mut tsign = 1.0;
        for i in 2..=nq {
            tsign = -tsign;
            pint += tsign * pc[i] / i as f64;
        }

        rows[nq][0] = pint * rq1fac;
        rows[nq][1] = 1.0;
        for i in 2..=nq {
            rows[nq][i] = rq1fac * pc[i] / i as f64;
        }
    }

    rows
}

/// Variable-order, variable-step integrator for non-stiff first-order ODE
/// systems. Stateless between calls: every `integrate` starts from a fresh
/// history, so repeated runs with identical inputs are bit-identical.
#[derive(Debug, Clone)]
pub struct AdaptiveIntegrator {
    settings: SolverSettings,
    el: [[f64; MAX_ORDER + 1]; MAX_ORDER + 1],
}

impl AdaptiveIntegrator {
    pub fn new(settings: SolverSettings) -> Self {
        let max_order = settings.max_order.clamp(1, MAX_ORDER);
        Self {
            settings: SolverSettings {
                max_order,
                ..settings
            },
            el: corrector_rows(),
        }
    }

    /// Integrates dy/dt = f(t, y) from `times[0]`, producing the state at
    /// every entry of `times`. `f` writes the derivative into its third
    /// argument.
    ///
    /// Fails with `StepSizeCollapse` when repeated rejections push the step
    /// below its floor, or `StepBudgetExhausted` when a single output
    /// interval consumes more than `max_steps` attempts.
    pub fn integrate<F>(&self, mut f: F, y0: &[f64], times: &[f64]) -> PKResult<Integration>
    where
        F: FnMut(f64, &[f64], &mut [f64]),
    {
        let neq = y0.len();
        let mut stats = IntegrationStats {
            final_order: 1,
            ..Default::default()
        };
        let mut states = Vec::with_capacity(times.len());
        states.push(y0.to_vec());
        if times.len() < 2 || neq == 0 {
            return Ok(Integration { states, stats });
        }

        let mut tn = times[0];
        let mut h = (times[1] - times[0]).abs() * INITIAL_STEP_RATIO;
        let mut order = 1usize;
        let mut hold = 0usize;

        // Nordsieck history: z[i][j] = h^j * y_i^(j) / j!
        let mut z = vec![[0.0f64; MAX_ORDER + 1]; neq];
        let mut dydt = vec![0.0f64; neq];
        f(tn, y0, &mut dydt);
        stats.derivative_evals += 1;
        for i in 0..neq {
            z[i][0] = y0[i];
            z[i][1] = h * dydt[i];
        }
        let mut h_floor = h * STEP_FLOOR_RATIO;

        let mut y_pred = vec![0.0f64; neq];
        let mut acor = vec![0.0f64; neq];

        for &tout in &times[1..] {
            let mut attempts = 0usize;
            while tn < tout {
                if attempts >= self.settings.max_steps {
                    return Err(PKError::StepBudgetExhausted {
                        time: tn,
                        max_steps: self.settings.max_steps,
                    });
                }

                let remaining = tout - tn;
                if remaining <= TIME_SNAP {
                    tn = tout;
                    break;
                }
                let clamped = h >= remaining;
                if clamped {
                    rescale(&mut z, order, remaining / h);
                    h = remaining;
                    h_floor = h * STEP_FLOOR_RATIO;
                }

                let snapshot = z.clone();

                // Predict: Pascal-triangle projection of the history.
                for k in 0..order {
                    for j in (k..order).rev() {
                        for zi in z.iter_mut() {
                            zi[j] += zi[j + 1];
                        }
                    }
                }

                let t_pred = tn + h;
                for i in 0..neq {
                    y_pred[i] = z[i][0];
                }
                f(t_pred, &y_pred, &mut dydt);
                stats.derivative_evals += 1;

                // Correct and estimate the weighted local error.
                let el = &self.el[order];
                let mut errmax = 0.0f64;
                let mut finite = true;
                for i in 0..neq {
                    acor[i] = h * dydt[i] - z[i][1];
                    for j in 0..=order {
                        z[i][j] += el[j] * acor[i];
                    }
                    if acor[i].is_finite() && z[i][0].is_finite() {
                        let weight =
                            self.settings.abs_tol + self.settings.rel_tol * z[i][0].abs();
                        errmax = errmax.max(acor[i].abs() / weight);
                    } else {
                        finite = false;
                    }
                }

                attempts += 1;
                if finite && errmax <= 1.0 {
                    stats.accepted_steps += 1;
                    tn = if clamped { tout } else { tn + h };

                    let factor = if errmax == 0.0 {
                        STEP_GROWTH_MAX
                    } else {
                        (2.0 / errmax)
                            .powf(1.0 / (order + 1) as f64)
                            .clamp(STEP_GROWTH_MIN, STEP_GROWTH_MAX)
                    } * STEP_SAFETY;

                    // Order moves are frozen for a few steps after each
                    // change so the fresh history column settles.
                    if hold > 0 {
                        hold -= 1;
                    } else if errmax < ORDER_RAISE_THRESHOLD && order < self.settings.max_order {
                        order += 1;
                        for zi in z.iter_mut() {
                            zi[order] = 0.0;
                        }
                        hold = order + 1;
                    } else if errmax > ORDER_LOWER_THRESHOLD && order > 1 {
                        order -= 1;
                        hold = order + 1;
                    }

                    // Leave the step alone inside the deadband; marginal
                    // rescales only churn the history.
                    if !(1.0..1.1).contains(&factor) {
                        rescale(&mut z, order, factor);
                        h *= factor;
                        h_floor = h * STEP_FLOOR_RATIO;
                    }
                } else {
                    stats.rejected_steps += 1;
                    z = snapshot;
                    rescale(&mut z, order, STEP_SHRINK);
                    h *= STEP_SHRINK;
                    if h < h_floor {
                        return Err(PKError::StepSizeCollapse { time: tn, step: h });
                    }
                }
            }
            states.push(z.iter().map(|zi| zi[0]).collect());
        }

        stats.final_order = order;
        stats.final_step_size = h;
        debug!(
            "adaptive integration finished: {} accepted, {} rejected, {} evals, order {}",
            stats.accepted_steps, stats.rejected_steps, stats.derivative_evals, order
        );
        Ok(Integration { states, stats })
    }
}

fn rescale(z: &mut [[f64; MAX_ORDER + 1]], order: usize, ratio: f64) {
    for zi in z.iter_mut() {
        let mut r = ratio;
        for j in 1..=order {
            zi[j] *= r;
            r *= ratio;
        }
    }
}
