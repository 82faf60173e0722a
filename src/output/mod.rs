use chrono::{DateTime, Duration, Utc};
use log::info;
use serde::Serialize;
use std::fs::File;
use std::path::Path;

use crate::config::Scenario;
use crate::error::PKResult;
use crate::models::ke0::Ke0Method;
use crate::models::PKParameters;
use crate::simulation::{Diagnostics, InfusionPlanEntry, SimulationResult};

pub fn save_results<P: AsRef<Path>>(
    result: &SimulationResult,
    scenario: &Scenario,
    output_dir: P,
) -> PKResult<()> {
    let output_path = output_dir.as_ref();

    save_concentration_table(result, scenario, &output_path.join("concentrations.csv"))?;
    save_summary(result, &output_path.join("summary.json"))?;
    generate_report(result, scenario, &output_path.join("simulation_report.md"))?;

    info!("results saved to {:?}", output_path);
    Ok(())
}

fn save_concentration_table<P: AsRef<Path>>(
    result: &SimulationResult,
    scenario: &Scenario,
    path: P,
) -> PKResult<()> {
    let mut writer = csv::Writer::from_path(path)?;

    let clock_base = scenario.anesthesia_start;
    if clock_base.is_some() {
        writer.write_record([
            "CLOCK_TIME",
            "TIME_MIN",
            "BOLUS_MG",
            "INFUSION_MG_KG_HR",
            "CP_UG_ML",
            "CE_UG_ML",
        ])?;
    } else {
        writer.write_record([
            "TIME_MIN",
            "BOLUS_MG",
            "INFUSION_MG_KG_HR",
            "CP_UG_ML",
            "CE_UG_ML",
        ])?;
    }

    for point in &result.time_points {
        let bolus = point.dose.as_ref().map(|d| d.bolus_mg).unwrap_or(0.0);
        let infusion = point
            .dose
            .as_ref()
            .map(|d| d.infusion_mg_kg_hr)
            .unwrap_or(0.0);

        let mut record = Vec::new();
        if let Some(base) = clock_base {
            record.push(clock_time(base, point.time_min));
        }
        record.push(format!("{}", point.time_min));
        record.push(format!("{:.3}", bolus));
        record.push(format!("{:.3}", infusion));
        record.push(format!("{:.3}", point.plasma_ug_ml));
        record.push(format!("{:.3}", point.effect_site_ug_ml));
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

fn clock_time(base: DateTime<Utc>, minutes: f64) -> String {
    let offset = Duration::seconds((minutes * 60.0).round() as i64);
    (base + offset).format("%H:%M").to_string()
}

#[derive(Serialize)]
struct Summary<'a> {
    calculated_at: DateTime<Utc>,
    method_label: String,
    ke0_per_min: f64,
    ke0_method: Option<Ke0Method>,
    parameters: &'a PKParameters,
    duration_min: f64,
    max_plasma_ug_ml: f64,
    max_effect_site_ug_ml: f64,
    infusion_plan: &'a [InfusionPlanEntry],
    diagnostics: &'a Diagnostics,
}

fn save_summary<P: AsRef<Path>>(result: &SimulationResult, path: P) -> PKResult<()> {
    let summary = Summary {
        calculated_at: result.calculated_at,
        method_label: result.method_label(),
        ke0_per_min: result.parameters.ke0,
        ke0_method: result.diagnostics.ke0_method,
        parameters: &result.parameters,
        duration_min: result.duration_min(),
        max_plasma_ug_ml: result.max_plasma(),
        max_effect_site_ug_ml: result.max_effect_site(),
        infusion_plan: &result.infusion_plan,
        diagnostics: &result.diagnostics,
    };
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, &summary)?;
    Ok(())
}

fn generate_report<P: AsRef<Path>>(
    result: &SimulationResult,
    scenario: &Scenario,
    path: P,
) -> PKResult<()> {
    let params = &result.parameters;
    let fallback_note = match &result.diagnostics.fallback_reason {
        Some(reason) => format!("- **Fallback**: {}\n", reason),
        None => String::new(),
    };

    let report = format!(
        r#"# PK/PD Simulation Report

## Patient
- Age: {:.0} yr, weight: {:.1} kg, height: {:.1} cm (BMI {:.1})
- Sex: {:?}, ASA-PS: {:?}

## Engine
- **Method**: {}
- **ke0**: {:.5} /min
{}
## PK Parameters
- V1: {:.3} L, V2: {:.3} L, V3: {:.3} L
- CL: {:.4} L/min, Q2: {:.4} L/min, Q3: {:.4} L/min

## Results
- Simulated duration: {:.0} min ({} display points)
- Max plasma concentration: {:.3} ug/mL
- Max effect-site concentration: {:.3} ug/mL

Generated at {}.
"#,
        scenario.patient.age_years,
        scenario.patient.weight_kg,
        scenario.patient.height_cm,
        scenario.patient.bmi(),
        scenario.patient.sex,
        scenario.patient.asa_ps,
        result.method_label(),
        params.ke0,
        fallback_note,
        params.v1,
        params.v2,
        params.v3,
        params.cl,
        params.q2,
        params.q3,
        result.duration_min(),
        result.time_points.len(),
        result.max_plasma(),
        result.max_effect_site(),
        result.calculated_at.format("%Y-%m-%d %H:%M:%S UTC"),
    );

    std::fs::write(path, report)?;
    Ok(())
}
