//! Dose-event preprocessing: bolus schedule plus piecewise-constant
//! infusion segments.

use crate::error::{PKError, PKResult};
use crate::models::DoseEvent;

/// An instantaneous addition to central-compartment mass.
#[derive(Debug, Clone, PartialEq)]
pub struct BolusDose {
    pub time_min: f64,
    pub amount_mg: f64,
}

/// Start of a constant infusion-rate segment. The segment runs until the
/// next segment begins; a zero rate stops the infusion.
#[derive(Debug, Clone, PartialEq)]
pub struct InfusionSegment {
    pub time_min: f64,
    pub rate_mg_min: f64,
}

/// Forcing function derived from the dose-event list for one patient.
#[derive(Debug, Clone)]
pub struct DosingSchedule {
    boluses: Vec<BolusDose>,
    segments: Vec<InfusionSegment>,
    last_event_time: f64,
}

impl DosingSchedule {
    /// Builds the schedule. Events are taken in time order; at equal
    /// timestamps boluses accumulate and the latest infusion rate wins.
    pub fn from_events(events: &[DoseEvent], weight_kg: f64) -> PKResult<Self> {
        if events.is_empty() {
            return Err(PKError::InvalidDosing(
                "at least one dose event is required".to_string(),
            ));
        }
        for event in events {
            if !event.time_min.is_finite() || event.time_min < 0.0 {
                return Err(PKError::InvalidDosing(format!(
                    "dose event time must be non-negative, got {}",
                    event.time_min
                )));
            }
            if !event.bolus_mg.is_finite() || event.bolus_mg < 0.0 {
                return Err(PKError::InvalidDosing(format!(
                    "bolus amount must be non-negative, got {}",
                    event.bolus_mg
                )));
            }
            if !event.infusion_mg_kg_hr.is_finite() || event.infusion_mg_kg_hr < 0.0 {
                return Err(PKError::InvalidDosing(format!(
                    "infusion rate must be non-negative, got {}",
                    event.infusion_mg_kg_hr
                )));
            }
        }

        let mut ordered: Vec<&DoseEvent> = events.iter().collect();
        ordered.sort_by(|a, b| a.time_min.partial_cmp(&b.time_min).unwrap());

        let mut boluses = Vec::new();
        let mut segments: Vec<InfusionSegment> = Vec::new();

        for event in &ordered {
            if event.bolus_mg > 0.0 {
                boluses.push(BolusDose {
                    time_min: event.time_min,
                    amount_mg: event.bolus_mg,
                });
            }
            let rate = event.infusion_rate_mg_min(weight_kg);
            // A segment only starts where the rate actually changes.
            if segments.last().map(|s| s.rate_mg_min) != Some(rate) {
                segments.push(InfusionSegment {
                    time_min: event.time_min,
                    rate_mg_min: rate,
                });
            }
        }

        // Implicit zero-rate lead-in when dosing starts after t = 0.
        if segments.first().map(|s| s.time_min) != Some(0.0) {
            segments.insert(
                0,
                InfusionSegment {
                    time_min: 0.0,
                    rate_mg_min: 0.0,
                },
            );
        }

        let last_event_time = ordered.last().map(|e| e.time_min).unwrap_or(0.0);

        Ok(Self {
            boluses,
            segments,
            last_event_time,
        })
    }

    /// Infusion rate (mg/min) active at time `t`.
    pub fn rate_at(&self, t: f64) -> f64 {
        let mut rate = 0.0;
        for segment in &self.segments {
            if t >= segment.time_min {
                rate = segment.rate_mg_min;
            } else {
                break;
            }
        }
        rate
    }

    pub fn boluses(&self) -> &[BolusDose] {
        &self.boluses
    }

    pub fn segments(&self) -> &[InfusionSegment] {
        &self.segments
    }

    pub fn last_event_time(&self) -> f64 {
        self.last_event_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn event(time_min: f64, bolus_mg: f64, infusion_mg_kg_hr: f64) -> DoseEvent {
        DoseEvent {
            time_min,
            bolus_mg,
            infusion_mg_kg_hr,
        }
    }

    #[test]
    fn test_empty_event_list_is_rejected() {
        let result = DosingSchedule::from_events(&[], 70.0);
        assert!(matches!(result, Err(PKError::InvalidDosing(_))));
    }

    #[test]
    fn test_bolus_and_infusion_split() {
        let events = vec![event(0.0, 12.0, 1.0), event(30.0, 0.0, 0.5)];
        let schedule = DosingSchedule::from_events(&events, 60.0).unwrap();

        assert_eq!(schedule.boluses().len(), 1);
        assert_relative_eq!(schedule.boluses()[0].amount_mg, 12.0);

        // 1.0 mg/kg/hr at 60 kg is exactly 1 mg/min.
        assert_relative_eq!(schedule.rate_at(0.0), 1.0);
        assert_relative_eq!(schedule.rate_at(29.99), 1.0);
        assert_relative_eq!(schedule.rate_at(30.0), 0.5);
        assert_relative_eq!(schedule.rate_at(120.0), 0.5);
    }

    #[test]
    fn test_implicit_zero_rate_lead_in() {
        let events = vec![event(10.0, 0.0, 2.0)];
        let schedule = DosingSchedule::from_events(&events, 60.0).unwrap();

        assert_eq!(schedule.segments().len(), 2);
        assert_relative_eq!(schedule.rate_at(0.0), 0.0);
        assert_relative_eq!(schedule.rate_at(9.999), 0.0);
        assert_relative_eq!(schedule.rate_at(10.0), 2.0);
    }

    #[test]
    fn test_zero_rate_event_stops_infusion() {
        let events = vec![event(0.0, 0.0, 1.5), event(45.0, 0.0, 0.0)];
        let schedule = DosingSchedule::from_events(&events, 60.0).unwrap();

        assert_relative_eq!(schedule.rate_at(44.0), 1.5);
        assert_relative_eq!(schedule.rate_at(45.0), 0.0);
        assert_relative_eq!(schedule.rate_at(300.0), 0.0);
    }

    #[test]
    fn test_repeated_rate_does_not_open_new_segment() {
        let events = vec![event(0.0, 0.0, 1.0), event(15.0, 5.0, 1.0)];
        let schedule = DosingSchedule::from_events(&events, 60.0).unwrap();
        assert_eq!(schedule.segments().len(), 1);
        assert_eq!(schedule.boluses().len(), 1);
    }

    #[test]
    fn test_events_are_ordered_by_time() {
        let events = vec![event(30.0, 5.0, 0.0), event(0.0, 10.0, 0.0)];
        let schedule = DosingSchedule::from_events(&events, 60.0).unwrap();
        assert_relative_eq!(schedule.boluses()[0].time_min, 0.0);
        assert_relative_eq!(schedule.boluses()[1].time_min, 30.0);
        assert_relative_eq!(schedule.last_event_time(), 30.0);
    }

    #[test]
    fn test_negative_values_are_rejected() {
        assert!(DosingSchedule::from_events(&[event(-1.0, 0.0, 0.0)], 70.0).is_err());
        assert!(DosingSchedule::from_events(&[event(0.0, -5.0, 0.0)], 70.0).is_err());
        assert!(DosingSchedule::from_events(&[event(0.0, 0.0, -1.0)], 70.0).is_err());
    }
}
