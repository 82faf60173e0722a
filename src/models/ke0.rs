//! Effect-site rate constant (ke0) derivation.
//!
//! Three strategies, tried in order:
//! 1. Exact: solve the disposition cubic for the hybrid rate constants,
//!    then root-find the time-to-peak condition for the effect-site curve
//!    after a unit bolus.
//! 2. Published multivariate regression on demographic transforms.
//! 3. Simplified logistic regression clamped to the clinical range.
//!
//! A fallback is logged and reported through `Ke0Method`, never raised as
//! an error; only all three strategies failing is fatal.

use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::masui::{self, STANDARD_WEIGHT_KG};
use super::{PKParameters, Patient};
use crate::error::{PKError, PKResult};
use crate::solver::{brent, cubic};

/// Clinical bounds applied to the logistic fallback (1/min).
pub const KE0_CLINICAL_MIN: f64 = 0.05;
pub const KE0_CLINICAL_MAX: f64 = 0.3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ke0Options {
    /// Physiologically plausible search bracket for the exact root (1/min).
    /// A clinical prior without a documented derivation; kept configurable.
    #[serde(default = "default_bracket")]
    pub bracket: (f64, f64),
    /// Time of maximal effect-site concentration after a unit bolus (min).
    #[serde(default = "default_peak_time")]
    pub peak_time_min: f64,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

fn default_bracket() -> (f64, f64) {
    (0.15, 0.26)
}

fn default_peak_time() -> f64 {
    2.6
}

fn default_tolerance() -> f64 {
    1e-12
}

fn default_max_iterations() -> usize {
    100
}

impl Default for Ke0Options {
    fn default() -> Self {
        Self {
            bracket: default_bracket(),
            peak_time_min: default_peak_time(),
            tolerance: default_tolerance(),
            max_iterations: default_max_iterations(),
        }
    }
}

/// Which strategy produced the reported ke0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ke0Method {
    Numerical,
    Regression,
    Logistic,
}

impl fmt::Display for Ke0Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ke0Method::Numerical => write!(f, "numerical"),
            Ke0Method::Regression => write!(f, "regression"),
            Ke0Method::Logistic => write!(f, "logistic"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Ke0Derivation {
    pub ke0: f64,
    pub method: Ke0Method,
    pub parameters: PKParameters,
}

/// Derives ke0 and the full PK parameter set for a patient.
pub fn derive_ke0(patient: &Patient, options: &Ke0Options) -> PKResult<Ke0Derivation> {
    let population = masui::population_parameters(patient);

    let (ke0, method) = match numerical_ke0(&population.rate_constants(), options) {
        Ok(value) if value.is_finite() && value > 0.0 => (value, Ke0Method::Numerical),
        outcome => {
            match outcome {
                Ok(value) => warn!("numerical ke0 {} not usable, trying regression", value),
                Err(err) => warn!("numerical ke0 failed ({}), trying regression", err),
            }
            let regression = regression_ke0(patient);
            if regression.is_finite() && regression > 0.0 {
                (regression, Ke0Method::Regression)
            } else {
                warn!(
                    "regression ke0 {} not usable, falling back to logistic model",
                    regression
                );
                let logistic = logistic_ke0(patient);
                if !logistic.is_finite() || logistic <= 0.0 {
                    return Err(PKError::Ke0Unavailable);
                }
                (logistic, Ke0Method::Logistic)
            }
        }
    };

    Ok(Ke0Derivation {
        ke0,
        method,
        parameters: PKParameters {
            v1: population.v1,
            v2: population.v2,
            v3: population.v3,
            cl: population.cl,
            q2: population.q2,
            q3: population.q3,
            ke0,
        },
    })
}

/// Exact ke0: the value for which the effect-site concentration after a
/// unit bolus peaks at `peak_time_min`. The plasma curve is the
/// tri-exponential A e^-at + B e^-bt + C e^-ct; setting dCe/dt = 0 at the
/// peak gives the residual function handed to the root finder.
pub fn numerical_ke0(rates: &masui::RateConstants, options: &Ke0Options) -> PKResult<f64> {
    let (a2, a1, a0) = rates.cubic_coefficients();
    let roots = cubic::solve_monic_cubic(a2, a1, a0);
    if roots.len() < 3 {
        return Err(PKError::CubicRoots { found: roots.len() });
    }
    let (alpha, beta, gamma) = (roots[0], roots[1], roots[2]);

    // Partial-fraction residues of the unit-bolus plasma curve.
    let coeff_a =
        ((rates.k21 - alpha) * (rates.k31 - alpha)) / ((beta - alpha) * (gamma - alpha));
    let coeff_b = ((rates.k21 - beta) * (rates.k31 - beta)) / ((alpha - beta) * (gamma - beta));
    let coeff_c =
        ((rates.k21 - gamma) * (rates.k31 - gamma)) / ((alpha - gamma) * (beta - gamma));

    let t_peak = options.peak_time_min;
    let residual = |ke0: f64| {
        [(alpha, coeff_a), (beta, coeff_b), (gamma, coeff_c)]
            .iter()
            .map(|&(root, coeff)| {
                (ke0 * coeff / (ke0 - root))
                    * (root * (-root * t_peak).exp() - ke0 * (-ke0 * t_peak).exp())
            })
            .sum::<f64>()
    };

    brent::find_root(
        residual,
        options.bracket.0,
        options.bracket.1,
        options.tolerance,
        options.max_iterations,
    )
}

/// Published multivariate regression: per-covariate polynomial transforms
/// F(x), centered companions F2(x), and pairwise/three-way interaction
/// terms with fixed coefficients.
pub fn regression_ke0(patient: &Patient) -> f64 {
    let age = patient.age_years;
    let tbw = patient.weight_kg;
    let height = patient.height_cm;
    let sex = patient.sex.indicator();
    let asa = patient.asa_ps.indicator();

    let f_age = 0.228 - 2.72e-5 * age + 2.96e-7 * (age - 55.0).powi(2)
        - 4.34e-9 * (age - 55.0).powi(3)
        + 5.05e-11 * (age - 55.0).powi(4);
    let f_tbw = 0.196 + 3.53e-4 * tbw - 7.91e-7 * (tbw - 90.0).powi(2);
    let f_height = 0.148 + 4.73e-4 * height - 1.43e-6 * (height - 167.5).powi(2);
    let f_sex = 0.237 - 2.16e-2 * sex;
    let f_asa = 0.214 + 2.41e-2 * asa;

    let f2_age = f_age - 0.227;
    let f2_tbw = f_tbw - 0.227;
    let f2_height = f_height - 0.226;
    let f2_sex = f_sex - 0.226;
    let f2_asa = f_asa - 0.226;

    -9.06 + f_age + f_tbw + f_height + 0.999 * f_sex + f_asa
        - 4.50 * f2_age * f2_tbw
        - 4.51 * f2_age * f2_height
        + 2.46 * f2_age * f2_sex
        + 3.35 * f2_age * f2_asa
        - 12.6 * f2_tbw * f2_height
        + 0.394 * f2_tbw * f2_sex
        + 2.06 * f2_tbw * f2_asa
        + 0.390 * f2_height * f2_sex
        + 2.07 * f2_height * f2_asa
        + 5.03 * f2_sex * f2_asa
        + 99.8 * f2_age * f2_tbw * f2_height
        + 5.11 * f2_tbw * f2_height * f2_sex
        - 39.4 * f2_tbw * f2_height * f2_asa
        - 5.00 * f2_tbw * f2_sex * f2_asa
        - 5.04 * f2_height * f2_sex * f2_asa
}

/// Last-resort logistic model on centered demographics, clamped to the
/// clinical range.
pub fn logistic_ke0(patient: &Patient) -> f64 {
    let age = patient.age_years - masui::STANDARD_AGE_YR;
    let weight = patient.weight_kg - STANDARD_WEIGHT_KG;
    let height = patient.height_cm - 159.0;
    let sex = patient.sex.indicator();
    let asa = patient.asa_ps.indicator();

    let mut predictor = -2.847 + 0.0234 * age + 0.0145 * weight + 0.0123 * height
        + 0.0842 * sex
        + 0.0578 * asa;
    predictor += -0.0001 * age * weight - 0.00008 * age * height - 0.00006 * weight * height;
    predictor = predictor.clamp(-10.0, 0.0);

    predictor.exp().clamp(KE0_CLINICAL_MIN, KE0_CLINICAL_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AsaPs, Sex};
    use approx::assert_relative_eq;

    fn reference_patient() -> Patient {
        Patient {
            age_years: 50.0,
            weight_kg: 70.0,
            height_cm: 170.0,
            sex: Sex::Male,
            asa_ps: AsaPs::Class1To2,
        }
    }

    #[test]
    fn test_numerical_ke0_for_reference_patient() {
        let derivation = derive_ke0(&reference_patient(), &Ke0Options::default()).unwrap();
        assert_eq!(derivation.method, Ke0Method::Numerical);
        assert_relative_eq!(derivation.ke0, 0.22065, epsilon = 1e-4);
        assert!(derivation.ke0 >= KE0_CLINICAL_MIN && derivation.ke0 <= KE0_CLINICAL_MAX);
    }

    #[test]
    fn test_numerical_ke0_across_demographics() {
        let patients = [
            (54.0, 67.3, 159.0, Sex::Male, AsaPs::Class1To2),
            (80.0, 45.0, 150.0, Sex::Female, AsaPs::Class3To4),
            (30.0, 120.0, 190.0, Sex::Male, AsaPs::Class1To2),
        ];
        for (age, weight, height, sex, asa) in patients {
            let patient = Patient {
                age_years: age,
                weight_kg: weight,
                height_cm: height,
                sex,
                asa_ps: asa,
            };
            let derivation = derive_ke0(&patient, &Ke0Options::default()).unwrap();
            assert_eq!(derivation.method, Ke0Method::Numerical);
            assert!(derivation.ke0 > 0.15 && derivation.ke0 < 0.26);
        }
    }

    #[test]
    fn test_derivation_returns_parameters_with_ke0() {
        let derivation = derive_ke0(&reference_patient(), &Ke0Options::default()).unwrap();
        assert_relative_eq!(derivation.parameters.ke0, derivation.ke0);
        assert!(derivation.parameters.v1 > 0.0);
        assert!(derivation.parameters.cl > 0.0);
    }

    #[test]
    fn test_misconfigured_bracket_falls_back_without_error() {
        // A bracket that cannot straddle the root forces the fallback
        // chain; the regression value is non-positive for ordinary adults,
        // so the logistic model answers.
        let options = Ke0Options {
            bracket: (0.5, 0.6),
            ..Default::default()
        };
        let derivation = derive_ke0(&reference_patient(), &options).unwrap();
        assert_eq!(derivation.method, Ke0Method::Logistic);
        assert!(derivation.ke0 >= KE0_CLINICAL_MIN && derivation.ke0 <= KE0_CLINICAL_MAX);
    }

    #[test]
    fn test_logistic_ke0_respects_clinical_bounds() {
        let extreme = Patient {
            age_years: 100.0,
            weight_kg: 200.0,
            height_cm: 220.0,
            sex: Sex::Male,
            asa_ps: AsaPs::Class1To2,
        };
        let value = logistic_ke0(&extreme);
        assert!((KE0_CLINICAL_MIN..=KE0_CLINICAL_MAX).contains(&value));
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let first = derive_ke0(&reference_patient(), &Ke0Options::default()).unwrap();
        let second = derive_ke0(&reference_patient(), &Ke0Options::default()).unwrap();
        assert_eq!(first.ke0.to_bits(), second.ke0.to_bits());
    }
}
