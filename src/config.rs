use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{PKError, PKResult};
use crate::models::ke0::Ke0Options;
use crate::models::{DoseEvent, Patient};
use crate::solver::{SolverSettings, MAX_ORDER};

/// A complete simulation request: patient, dosing, and engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub patient: Patient,
    pub dose_events: Vec<DoseEvent>,
    #[serde(default)]
    pub simulation: SimulationSettings,
    /// Anesthesia start used to render clock times in exported tables.
    #[serde(default)]
    pub anesthesia_start: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSettings {
    /// Simulated duration in minutes; defaults to 120 minutes past the
    /// last dose event.
    #[serde(default)]
    pub duration_min: Option<f64>,
    /// Internal computation grid resolution.
    #[serde(default = "default_grid_step")]
    pub grid_step_min: f64,
    /// Spacing of the reported display points.
    #[serde(default = "default_display_interval")]
    pub display_interval_min: f64,
    #[serde(default)]
    pub method: IntegrationMethod,
    #[serde(default)]
    pub solver: SolverSettings,
    #[serde(default)]
    pub ke0: Ke0Options,
}

fn default_grid_step() -> f64 {
    0.01
}

fn default_display_interval() -> f64 {
    1.0
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            duration_min: None,
            grid_step_min: default_grid_step(),
            display_interval_min: default_display_interval(),
            method: IntegrationMethod::default(),
            solver: SolverSettings::default(),
            ke0: Ke0Options::default(),
        }
    }
}

/// Integration strategy. `Adaptive` falls back to the fixed-step path for
/// the whole run on the first adaptive failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationMethod {
    #[default]
    Adaptive,
    #[serde(rename = "fixed-step")]
    FixedStep,
}

impl Scenario {
    pub fn from_file<P: AsRef<Path>>(path: P) -> PKResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let scenario: Scenario = serde_json::from_str(&content)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn validate(&self) -> PKResult<()> {
        self.validate_patient()?;
        self.validate_dosing()?;
        self.simulation.validate()
    }

    fn validate_patient(&self) -> PKResult<()> {
        let patient = &self.patient;
        for (name, value) in [
            ("age", patient.age_years),
            ("weight", patient.weight_kg),
            ("height", patient.height_cm),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(PKError::Validation(format!(
                    "patient {} must be positive, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    fn validate_dosing(&self) -> PKResult<()> {
        if self.dose_events.is_empty() {
            return Err(PKError::InvalidDosing(
                "at least one dose event is required".to_string(),
            ));
        }
        for event in &self.dose_events {
            if !event.time_min.is_finite() || event.time_min < 0.0 {
                return Err(PKError::InvalidDosing(format!(
                    "dose event time must be non-negative, got {}",
                    event.time_min
                )));
            }
            if event.bolus_mg < 0.0 || event.infusion_mg_kg_hr < 0.0 {
                return Err(PKError::InvalidDosing(
                    "bolus and infusion amounts must be non-negative".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl SimulationSettings {
    pub fn validate(&self) -> PKResult<()> {
        if !(self.grid_step_min > 0.0) {
            return Err(PKError::Validation(
                "grid step must be positive".to_string(),
            ));
        }
        if self.display_interval_min < self.grid_step_min {
            return Err(PKError::Validation(
                "display interval must be at least one grid step".to_string(),
            ));
        }
        if let Some(duration) = self.duration_min {
            if !duration.is_finite() || duration <= 0.0 {
                return Err(PKError::Validation(format!(
                    "duration must be positive, got {}",
                    duration
                )));
            }
        }
        if !(self.solver.rel_tol > 0.0) || !(self.solver.abs_tol > 0.0) {
            return Err(PKError::Validation(
                "solver tolerances must be positive".to_string(),
            ));
        }
        if self.solver.max_order < 1 || self.solver.max_order > MAX_ORDER {
            return Err(PKError::Validation(format!(
                "solver order ceiling must be within 1..={}",
                MAX_ORDER
            )));
        }
        let (lower, upper) = self.ke0.bracket;
        if !(lower > 0.0) || !(upper > lower) {
            return Err(PKError::Validation(format!(
                "ke0 bracket must satisfy 0 < lower < upper, got [{}, {}]",
                lower, upper
            )));
        }
        if !(self.ke0.peak_time_min > 0.0) {
            return Err(PKError::Validation(
                "ke0 peak time must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
