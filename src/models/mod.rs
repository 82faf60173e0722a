pub mod ke0;
pub mod masui;

use serde::{Deserialize, Serialize};

/// Patient demographics driving parameter derivation. The engine assumes
/// values are already range-checked by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub age_years: f64,
    pub weight_kg: f64,
    pub height_cm: f64,
    pub sex: Sex,
    pub asa_ps: AsaPs,
}

impl Patient {
    pub fn bmi(&self) -> f64 {
        self.weight_kg / (self.height_cm / 100.0).powi(2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    /// Covariate coding used by the population model: male 0, female 1.
    pub fn indicator(&self) -> f64 {
        match self {
            Sex::Male => 0.0,
            Sex::Female => 1.0,
        }
    }
}

/// ASA physical status, dichotomized the way the population model was fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AsaPs {
    #[serde(rename = "I-II")]
    Class1To2,
    #[serde(rename = "III-IV")]
    Class3To4,
}

impl AsaPs {
    pub fn indicator(&self) -> f64 {
        match self {
            AsaPs::Class1To2 => 0.0,
            AsaPs::Class3To4 => 1.0,
        }
    }
}

/// One dosing instruction: an optional bolus and/or a change of the
/// continuous infusion rate, both effective at `time_min`. A zero rate is a
/// stop-infusion instruction, not absence of data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoseEvent {
    pub time_min: f64,
    #[serde(default)]
    pub bolus_mg: f64,
    #[serde(default)]
    pub infusion_mg_kg_hr: f64,
}

impl DoseEvent {
    /// Infusion rate in mg/min for a given patient weight.
    pub fn infusion_rate_mg_min(&self, weight_kg: f64) -> f64 {
        self.infusion_mg_kg_hr * weight_kg / 60.0
    }
}

/// Derived three-compartment parameters: volumes in L, clearances in L/min,
/// ke0 in 1/min. Computed once per simulation, immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PKParameters {
    pub v1: f64,
    pub v2: f64,
    pub v3: f64,
    pub cl: f64,
    pub q2: f64,
    pub q3: f64,
    pub ke0: f64,
}

impl PKParameters {
    pub fn k10(&self) -> f64 {
        self.cl / self.v1
    }

    pub fn k12(&self) -> f64 {
        self.q2 / self.v1
    }

    pub fn k21(&self) -> f64 {
        self.q2 / self.v2
    }

    pub fn k13(&self) -> f64 {
        self.q3 / self.v1
    }

    pub fn k31(&self) -> f64 {
        self.q3 / self.v3
    }

    /// Mass balance of the three-compartment system under a constant input
    /// rate into the central compartment, in mg/min.
    pub fn mass_balance(&self, state: &CompartmentState, input_mg_min: f64) -> [f64; 3] {
        let (k10, k12, k21, k13, k31) =
            (self.k10(), self.k12(), self.k21(), self.k13(), self.k31());
        [
            input_mg_min - (k10 + k12 + k13) * state.a1 + k21 * state.a2 + k31 * state.a3,
            k12 * state.a1 - k21 * state.a2,
            k13 * state.a1 - k31 * state.a3,
        ]
    }
}

/// Drug amounts (mg) in the central and the two peripheral compartments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CompartmentState {
    pub a1: f64,
    pub a2: f64,
    pub a3: f64,
}

impl CompartmentState {
    pub fn new(a1: f64, a2: f64, a3: f64) -> Self {
        Self { a1, a2, a3 }
    }

    pub fn total_mass(&self) -> f64 {
        self.a1 + self.a2 + self.a3
    }

    pub fn advanced(&self, dt: f64, derivative: [f64; 3]) -> Self {
        Self {
            a1: self.a1 + dt * derivative[0],
            a2: self.a2 + dt * derivative[1],
            a3: self.a3 + dt * derivative[2],
        }
    }

    /// Numerical underflow must not produce negative drug mass.
    pub fn clamped_non_negative(&self) -> Self {
        Self {
            a1: self.a1.max(0.0),
            a2: self.a2.max(0.0),
            a3: self.a3.max(0.0),
        }
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.a1, self.a2, self.a3]
    }

    pub fn from_slice(values: &[f64]) -> Self {
        Self {
            a1: values[0],
            a2: values[1],
            a3: values[2],
        }
    }
}
