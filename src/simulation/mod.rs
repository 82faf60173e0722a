pub mod effect_site;

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use std::fmt;

use crate::config::{IntegrationMethod, SimulationSettings};
use crate::dosing::DosingSchedule;
use crate::error::{PKError, PKResult};
use crate::models::ke0::{derive_ke0, Ke0Derivation, Ke0Method};
use crate::models::{CompartmentState, DoseEvent, PKParameters, Patient};
use crate::solver::{rk4, AdaptiveIntegrator, IntegrationStats};

/// Simulated tail appended after the last dose event when no explicit
/// duration is requested.
const DEFAULT_TAIL_MIN: f64 = 120.0;
/// Bolus timestamps are matched against grid points within this tolerance.
const EVENT_TIME_EPS: f64 = 1e-9;
/// A display point reports the dose event scheduled within this window of
/// its timestamp.
const DISPLAY_EVENT_WINDOW_MIN: f64 = 0.5;

/// Integration path that actually produced the plasma series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineMethod {
    AdaptiveAdams,
    FixedStepRk4,
}

impl fmt::Display for EngineMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineMethod::AdaptiveAdams => write!(f, "adaptive Adams-Moulton"),
            EngineMethod::FixedStepRk4 => write!(f, "fixed-step RK4"),
        }
    }
}

/// Structured provenance returned with every result instead of being
/// printed as a side effect.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    /// Strategy that produced ke0; absent when parameters were injected
    /// directly.
    pub ke0_method: Option<Ke0Method>,
    pub integration: EngineMethod,
    pub solver_stats: Option<IntegrationStats>,
    pub fallback_reason: Option<String>,
}

/// One piecewise-constant infusion segment, echoed back in the caller's
/// dosing units.
#[derive(Debug, Clone, Serialize)]
pub struct InfusionPlanEntry {
    pub time_min: f64,
    pub rate_mg_kg_hr: f64,
}

/// One display-resolution sample.
#[derive(Debug, Clone, Serialize)]
pub struct TimePoint {
    pub time_min: f64,
    pub dose: Option<DoseEvent>,
    pub plasma_ug_ml: f64,
    pub effect_site_ug_ml: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationResult {
    pub time_points: Vec<TimePoint>,
    /// Full-resolution computation grid and series.
    pub grid_times: Vec<f64>,
    pub plasma: Vec<f64>,
    pub effect_site: Vec<f64>,
    pub parameters: PKParameters,
    pub infusion_plan: Vec<InfusionPlanEntry>,
    pub method: EngineMethod,
    pub calculated_at: DateTime<Utc>,
    pub diagnostics: Diagnostics,
}

impl SimulationResult {
    pub fn max_plasma(&self) -> f64 {
        self.plasma.iter().cloned().fold(0.0, f64::max)
    }

    pub fn max_effect_site(&self) -> f64 {
        self.effect_site.iter().cloned().fold(0.0, f64::max)
    }

    pub fn duration_min(&self) -> f64 {
        self.grid_times.last().copied().unwrap_or(0.0)
    }

    pub fn method_label(&self) -> String {
        format!("VHAC + {} engine", self.method)
    }
}

/// Drives one simulation: ke0 derivation, grid construction, integration
/// split at bolus events, effect-site calculation, display sampling.
pub struct Simulator {
    settings: SimulationSettings,
}

impl Simulator {
    pub fn new(settings: SimulationSettings) -> Self {
        Self { settings }
    }

    pub fn with_defaults() -> Self {
        Self::new(SimulationSettings::default())
    }

    /// Derives ke0 and the PK parameter set without running a simulation.
    pub fn derive_parameters(&self, patient: &Patient) -> PKResult<Ke0Derivation> {
        derive_ke0(patient, &self.settings.ke0)
    }

    pub fn simulate(
        &self,
        patient: &Patient,
        events: &[DoseEvent],
    ) -> PKResult<SimulationResult> {
        let derivation = derive_ke0(patient, &self.settings.ke0)?;
        info!(
            "derived ke0 = {:.5} /min via {} method",
            derivation.ke0, derivation.method
        );
        self.run(patient, events, &derivation.parameters, Some(derivation.method))
    }

    /// Runs the simulation with explicitly supplied PK parameters,
    /// bypassing demographic derivation.
    pub fn simulate_with_parameters(
        &self,
        patient: &Patient,
        events: &[DoseEvent],
        parameters: &PKParameters,
    ) -> PKResult<SimulationResult> {
        self.run(patient, events, parameters, None)
    }

    fn run(
        &self,
        patient: &Patient,
        events: &[DoseEvent],
        parameters: &PKParameters,
        ke0_method: Option<Ke0Method>,
    ) -> PKResult<SimulationResult> {
        if !parameters.ke0.is_finite() || parameters.ke0 <= 0.0 {
            return Err(PKError::InvalidInput(format!(
                "ke0 must be positive, got {}",
                parameters.ke0
            )));
        }
        if !(self.settings.grid_step_min > 0.0) {
            return Err(PKError::InvalidInput(
                "grid step must be positive".to_string(),
            ));
        }

        let schedule = DosingSchedule::from_events(events, patient.weight_kg)?;
        let duration = self
            .settings
            .duration_min
            .unwrap_or(schedule.last_event_time() + DEFAULT_TAIL_MIN);
        if !duration.is_finite() || duration <= 0.0 {
            return Err(PKError::InvalidInput(format!(
                "simulation duration must be positive, got {}",
                duration
            )));
        }
        let grid = build_grid(duration, self.settings.grid_step_min);

        let (masses, method, solver_stats, fallback_reason) = match self.settings.method {
            IntegrationMethod::FixedStep => (
                self.fixed_step_masses(&schedule, parameters, &grid),
                EngineMethod::FixedStepRk4,
                None,
                None,
            ),
            IntegrationMethod::Adaptive => {
                match self.adaptive_masses(&schedule, parameters, &grid) {
                    Ok((masses, stats)) => {
                        (masses, EngineMethod::AdaptiveAdams, Some(stats), None)
                    }
                    Err(
                        err @ (PKError::StepSizeCollapse { .. }
                        | PKError::StepBudgetExhausted { .. }),
                    ) => {
                        warn!(
                            "adaptive integration failed ({}), recomputing run with fixed-step fallback",
                            err
                        );
                        (
                            self.fixed_step_masses(&schedule, parameters, &grid),
                            EngineMethod::FixedStepRk4,
                            None,
                            Some(err.to_string()),
                        )
                    }
                    Err(other) => return Err(other),
                }
            }
        };

        let plasma: Vec<f64> = masses
            .iter()
            .map(|state| (state.a1 / parameters.v1).max(0.0))
            .collect();
        let effect_site = effect_site::hybrid_series(&plasma, &grid, parameters.ke0)?;
        let time_points = self.display_points(&grid, &plasma, &effect_site, events);
        let infusion_plan = schedule
            .segments()
            .iter()
            .map(|segment| InfusionPlanEntry {
                time_min: segment.time_min,
                rate_mg_kg_hr: segment.rate_mg_min * 60.0 / patient.weight_kg,
            })
            .collect();

        Ok(SimulationResult {
            time_points,
            grid_times: grid,
            plasma,
            effect_site,
            parameters: parameters.clone(),
            infusion_plan,
            method,
            calculated_at: Utc::now(),
            diagnostics: Diagnostics {
                ke0_method,
                integration: method,
                solver_stats,
                fallback_reason,
            },
        })
    }

    /// Adaptive path. Integration is split at every bolus timestamp: the
    /// solver runs up to the bolus, the mass jump is applied to the state,
    /// and integration resumes from the jump as a fresh initial condition.
    /// A grid point coinciding with a bolus records the post-bolus state;
    /// the t = 0 sample alone stays the pre-dose baseline.
    fn adaptive_masses(
        &self,
        schedule: &DosingSchedule,
        parameters: &PKParameters,
        grid: &[f64],
    ) -> PKResult<(Vec<CompartmentState>, IntegrationStats)> {
        let integrator = AdaptiveIntegrator::new(self.settings.solver.clone());
        let end = *grid.last().unwrap();
        let boluses = schedule.boluses();

        let mut out = Vec::with_capacity(grid.len());
        let mut state = CompartmentState::default();
        out.push(state);

        let mut totals = IntegrationStats::default();
        let mut bolus_idx = 0;
        while bolus_idx < boluses.len()
            && boluses[bolus_idx].time_min <= grid[0] + EVENT_TIME_EPS
        {
            state.a1 += boluses[bolus_idx].amount_mg;
            bolus_idx += 1;
        }

        let mut segment_start = grid[0];
        let mut next_idx = 1;

        while bolus_idx < boluses.len() && boluses[bolus_idx].time_min <= end + EVENT_TIME_EPS {
            let bolus_time = boluses[bolus_idx].time_min;
            let (new_state, new_idx) = self.run_segment(
                &integrator,
                schedule,
                parameters,
                state,
                segment_start,
                bolus_time,
                false,
                grid,
                next_idx,
                &mut out,
                &mut totals,
            )?;
            state = new_state;
            next_idx = new_idx;

            while bolus_idx < boluses.len()
                && (boluses[bolus_idx].time_min - bolus_time).abs() <= EVENT_TIME_EPS
            {
                state.a1 += boluses[bolus_idx].amount_mg;
                bolus_idx += 1;
            }
            if next_idx < grid.len() && (grid[next_idx] - bolus_time).abs() <= EVENT_TIME_EPS {
                out.push(state);
                next_idx += 1;
            }
            segment_start = bolus_time;
        }

        let (_, final_idx) = self.run_segment(
            &integrator,
            schedule,
            parameters,
            state,
            segment_start,
            end,
            true,
            grid,
            next_idx,
            &mut out,
            &mut totals,
        )?;
        debug_assert_eq!(final_idx, grid.len());
        debug_assert_eq!(out.len(), grid.len());

        Ok((out, totals))
    }

    /// Integrates one bolus-free stretch, recording every grid point it
    /// covers. Returns the state at `target` and the next unrecorded grid
    /// index.
    #[allow(clippy::too_many_arguments)]
    fn run_segment(
        &self,
        integrator: &AdaptiveIntegrator,
        schedule: &DosingSchedule,
        parameters: &PKParameters,
        state: CompartmentState,
        start: f64,
        target: f64,
        include_target_point: bool,
        grid: &[f64],
        next_idx: usize,
        out: &mut Vec<CompartmentState>,
        totals: &mut IntegrationStats,
    ) -> PKResult<(CompartmentState, usize)> {
        if target - start <= EVENT_TIME_EPS {
            return Ok((state, next_idx));
        }

        let mut call_times = vec![start];
        let mut recorded = 0usize;
        let mut idx = next_idx;
        while idx < grid.len() && grid[idx] < target - EVENT_TIME_EPS {
            call_times.push(grid[idx]);
            recorded += 1;
            idx += 1;
        }
        if include_target_point
            && idx < grid.len()
            && (grid[idx] - target).abs() <= EVENT_TIME_EPS
        {
            call_times.push(grid[idx]);
            recorded += 1;
            idx += 1;
        } else if target - *call_times.last().unwrap() > EVENT_TIME_EPS {
            call_times.push(target);
        }
        if call_times.len() < 2 {
            return Ok((state, next_idx));
        }

        let integration = integrator.integrate(
            |t, y, dy| {
                let current = CompartmentState::from_slice(y);
                let derivative = parameters.mass_balance(&current, schedule.rate_at(t));
                dy.copy_from_slice(&derivative);
            },
            &state.as_array(),
            &call_times,
        )?;
        totals.absorb(&integration.stats);

        for position in 1..=recorded {
            out.push(CompartmentState::from_slice(&integration.states[position]).clamped_non_negative());
        }
        let final_state =
            CompartmentState::from_slice(integration.states.last().unwrap()).clamped_non_negative();
        Ok((final_state, idx))
    }

    /// Fixed-step fallback: one RK4 step per grid interval, boluses applied
    /// when their timestamp is reached.
    fn fixed_step_masses(
        &self,
        schedule: &DosingSchedule,
        parameters: &PKParameters,
        grid: &[f64],
    ) -> Vec<CompartmentState> {
        let boluses = schedule.boluses();
        let mut out = Vec::with_capacity(grid.len());
        let mut state = CompartmentState::default();
        out.push(state);

        let mut bolus_idx = 0;
        while bolus_idx < boluses.len()
            && boluses[bolus_idx].time_min <= grid[0] + EVENT_TIME_EPS
        {
            state.a1 += boluses[bolus_idx].amount_mg;
            bolus_idx += 1;
        }

        for i in 1..grid.len() {
            let dt = grid[i] - grid[i - 1];
            let rate = schedule.rate_at(grid[i - 1]);
            state = rk4::step(parameters, &state, rate, dt);
            while bolus_idx < boluses.len()
                && boluses[bolus_idx].time_min <= grid[i] + EVENT_TIME_EPS
            {
                state.a1 += boluses[bolus_idx].amount_mg;
                bolus_idx += 1;
            }
            out.push(state);
        }
        out
    }

    fn display_points(
        &self,
        grid: &[f64],
        plasma: &[f64],
        effect_site: &[f64],
        events: &[DoseEvent],
    ) -> Vec<TimePoint> {
        let stride = (self.settings.display_interval_min / self.settings.grid_step_min)
            .round()
            .max(1.0) as usize;

        let mut points = Vec::new();
        let mut i = 0;
        while i < grid.len() {
            let t = grid[i];
            let dose = events
                .iter()
                .find(|e| (e.time_min - t).abs() < DISPLAY_EVENT_WINDOW_MIN)
                .cloned();
            points.push(TimePoint {
                time_min: (t * 1000.0).round() / 1000.0,
                dose,
                plasma_ug_ml: plasma[i],
                effect_site_ug_ml: effect_site[i],
            });
            i += stride;
        }
        points
    }
}

fn build_grid(duration_min: f64, step_min: f64) -> Vec<f64> {
    let n = (duration_min / step_min).round() as usize;
    (0..=n).map(|i| i as f64 * step_min).collect()
}
