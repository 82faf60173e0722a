//! Masui 2022 population pharmacokinetic model for remimazolam.
//!
//! Fixed-effect coefficients (theta), body-size transforms, and allometric
//! scaling as published; volumes in L, clearances in L/min.

use serde::Serialize;

use super::Patient;

pub const THETA1_V1: f64 = 3.57;
pub const THETA2_V2: f64 = 11.3;
pub const THETA3_V3: f64 = 27.2;
pub const THETA4_CL: f64 = 1.03;
pub const THETA5_Q2: f64 = 1.10;
pub const THETA6_Q3: f64 = 0.401;
pub const THETA8_V3_AGE: f64 = 0.308;
pub const THETA9_CL_SEX: f64 = 0.146;
pub const THETA10_CL_ASA: f64 = -0.184;

pub const STANDARD_WEIGHT_KG: f64 = 67.3;
pub const STANDARD_AGE_YR: f64 = 54.0;

const IBW_CONSTANT: f64 = 45.4;
const IBW_HEIGHT_COEFFICIENT: f64 = 0.89;
const IBW_HEIGHT_OFFSET_CM: f64 = 152.4;
const IBW_SEX_COEFFICIENT: f64 = 4.5;
const ABW_COEFFICIENT: f64 = 0.4;

/// Demographic volumes and clearances, before ke0 derivation.
#[derive(Debug, Clone, Serialize)]
pub struct PopulationParameters {
    pub ibw_kg: f64,
    pub abw_kg: f64,
    pub v1: f64,
    pub v2: f64,
    pub v3: f64,
    pub cl: f64,
    pub q2: f64,
    pub q3: f64,
}

impl PopulationParameters {
    pub fn rate_constants(&self) -> RateConstants {
        RateConstants {
            k10: self.cl / self.v1,
            k12: self.q2 / self.v1,
            k13: self.q3 / self.v1,
            k21: self.q2 / self.v2,
            k31: self.q3 / self.v3,
        }
    }
}

/// First-order micro rate constants of the disposition model (1/min).
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RateConstants {
    pub k10: f64,
    pub k12: f64,
    pub k13: f64,
    pub k21: f64,
    pub k31: f64,
}

impl RateConstants {
    /// Coefficients of the monic disposition cubic
    /// x^3 + a2 x^2 + a1 x + a0, whose roots are the negatives of the
    /// hybrid rate constants alpha, beta, gamma.
    pub fn cubic_coefficients(&self) -> (f64, f64, f64) {
        let a2 = self.k10 + self.k12 + self.k13 + self.k21 + self.k31;
        let a1 =
            (self.k10 + self.k13) * self.k21 + (self.k10 + self.k12) * self.k31 + self.k21 * self.k31;
        let a0 = self.k10 * self.k21 * self.k31;
        (a2, a1, a0)
    }
}

/// Derives the demographic PK parameters: ideal body weight by the modified
/// Devine formula, adjusted body weight 40% of the way from IBW toward
/// total weight, linear size scaling for volumes and allometric 0.75-power
/// scaling for clearances.
pub fn population_parameters(patient: &Patient) -> PopulationParameters {
    let sex = patient.sex.indicator();
    let asa = patient.asa_ps.indicator();

    let ibw = IBW_CONSTANT
        + IBW_HEIGHT_COEFFICIENT * (patient.height_cm - IBW_HEIGHT_OFFSET_CM)
        + IBW_SEX_COEFFICIENT * (1.0 - sex);
    let abw = ibw + ABW_COEFFICIENT * (patient.weight_kg - ibw);

    let size = abw / STANDARD_WEIGHT_KG;
    let size_allometric = size.powf(0.75);

    PopulationParameters {
        ibw_kg: ibw,
        abw_kg: abw,
        v1: THETA1_V1 * size,
        v2: THETA2_V2 * size,
        v3: (THETA3_V3 + THETA8_V3_AGE * (patient.age_years - STANDARD_AGE_YR)) * size,
        cl: (THETA4_CL + THETA9_CL_SEX * sex + THETA10_CL_ASA * asa) * size_allometric,
        q2: THETA5_Q2 * size_allometric,
        q3: THETA6_Q3 * size_allometric,
    }
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
    fn test_body_weight_transforms() {
        let params = population_parameters(&reference_patient());
        // IBW = 45.4 + 0.89 * (170 - 152.4) + 4.5
        assert_relative_eq!(params.ibw_kg, 65.564, epsilon = 1e-10);
        assert_relative_eq!(params.abw_kg, 65.564 + 0.4 * (70.0 - 65.564), epsilon = 1e-10);
    }

    #[test]
    fn test_standard_patient_recovers_thetas() {
        // At standard weight and age with ABW == TBW the size ratio is 1.
        let patient = Patient {
            age_years: STANDARD_AGE_YR,
            weight_kg: STANDARD_WEIGHT_KG,
            height_cm: 152.4 + (STANDARD_WEIGHT_KG - 45.4 - 4.5) / 0.89,
            sex: Sex::Male,
            asa_ps: AsaPs::Class1To2,
        };
        let params = population_parameters(&patient);
        assert_relative_eq!(params.v1, THETA1_V1, epsilon = 1e-10);
        assert_relative_eq!(params.v2, THETA2_V2, epsilon = 1e-10);
        assert_relative_eq!(params.v3, THETA3_V3, epsilon = 1e-10);
        assert_relative_eq!(params.cl, THETA4_CL, epsilon = 1e-10);
    }

    #[test]
    fn test_sex_and_asa_affect_clearance_only_through_coefficients() {
        let male = population_parameters(&reference_patient());

        let mut sick = reference_patient();
        sick.asa_ps = AsaPs::Class3To4;
        let sick_params = population_parameters(&sick);

        assert!(sick_params.cl < male.cl);
        assert_relative_eq!(sick_params.v1, male.v1);
        assert_relative_eq!(sick_params.q2, male.q2);
    }

    #[test]
    fn test_age_increases_v3() {
        let young = population_parameters(&Patient {
            age_years: 30.0,
            ..reference_patient()
        });
        let old = population_parameters(&Patient {
            age_years: 80.0,
            ..reference_patient()
        });
        assert!(old.v3 > young.v3);
    }

    #[test]
    fn test_cubic_coefficients_are_symmetric_functions() {
        let rates = population_parameters(&reference_patient()).rate_constants();
        let (a2, a1, a0) = rates.cubic_coefficients();
        assert_relative_eq!(
            a2,
            rates.k10 + rates.k12 + rates.k13 + rates.k21 + rates.k31,
            epsilon = 1e-12
        );
        assert!(a1 > 0.0 && a0 > 0.0);
    }
}
