//! Preference scoring for a single trip.
//!
//! Scores are additive: a schedule's score is the sum of its trips' scores,
//! so the solver can total retained and added trips independently.

use chrono::{Datelike, Timelike};

use crate::config::{AdjustmentCondition, ScoringConfig};
use crate::model::Trip;

const FAVORITE_OVERNIGHT_POINTS: i64 = 3;
const FAVORITE_TURN_POINTS: i64 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripScore {
    points: i64,
    num_favorite_overnights: usize,
    num_legs: usize,
    has_equipment_two_hundred_segments: bool,
    explanation: Vec<String>,
}

impl TripScore {
    pub fn new(trip: &Trip, config: &ScoringConfig) -> Self {
        let mut points = 0i64;
        let mut explanation = Vec::new();

        let mut num_favorite_overnights = 0;
        for section in &trip.sections {
            let Some(layover) = &section.layover_airport else {
                continue;
            };
            if config.favorite_overnights.contains(layover) {
                num_favorite_overnights += 1;
            } else if config.despised_overnights.contains(layover) {
                points -= FAVORITE_OVERNIGHT_POINTS;
                explanation.push(format!("-{} for overnight in {}", FAVORITE_OVERNIGHT_POINTS, layover));
            }
        }
        if num_favorite_overnights > 0 {
            let bonus = num_favorite_overnights as i64 * FAVORITE_OVERNIGHT_POINTS;
            points += bonus;
            explanation.push(format!("+{} for favorite overnights", bonus));
        }

        for section in &trip.sections {
            for airport in section.turn_airports() {
                if config.favorite_turns.iter().any(|a| a == airport) {
                    points += FAVORITE_TURN_POINTS;
                    explanation.push(format!("+1 for a turn to {}", airport));
                } else if config.despised_turns.iter().any(|a| a == airport) {
                    points -= FAVORITE_TURN_POINTS;
                    explanation.push(format!("-1 for a turn to {}", airport));
                }
            }
        }

        if let (Some(origin), Some(first)) = (&config.preferred_origin, trip.first_section()) {
            let departs_from_origin = first
                .legs
                .first()
                .is_some_and(|leg| &leg.departure_airport == origin);
            if departs_from_origin {
                points += 1;
                explanation.push(format!("+1 for departing {}", origin));
            }
        }

        let num_sections = trip.sections.len();
        for (i, section) in trip.sections.iter().enumerate() {
            let ideal = if i == 0 || i + 1 == num_sections {
                config.ideal_first_last_day_legs
            } else {
                config.ideal_middle_day_legs
            };
            let legs = section.num_legs();
            if legs > ideal {
                let excess = (legs - ideal) as i64;
                points -= excess;
                explanation.push(format!("-{} for legs on day {} ({} > {})", excess, i + 1, legs, ideal));
            }
        }

        if let Some(first) = trip.first_section() {
            let hour = first.duty_start.hour();
            if hour > config.commutable_report_after_hour && hour <= config.commutable_report_until_hour {
                points += 1;
                explanation.push("+1 for good start time".to_string());
            } else {
                points -= 1;
                explanation.push("-1 for bad start time".to_string());
            }
        }

        if let Some(last) = trip.last_section() {
            if last.duty_end.hour() <= config.commutable_release_by_hour {
                points += 1;
                explanation.push("+1 for good end time".to_string());
            } else {
                points -= 1;
                explanation.push("-1 for bad end time".to_string());
            }
        }

        let num_legs = trip.num_legs();
        let has_equipment_two_hundred_segments =
            trip.sections.iter().any(|s| s.is_equipment_two_hundred());
        if has_equipment_two_hundred_segments {
            points -= num_legs as i64;
            explanation.push(format!("-{} for 200 segments", num_legs));
        }

        if config.enable_efficiency_score && trip.credit > crate::calendar::Period::ZERO {
            // 1.0 means flying every minute on duty.
            let efficiency = trip.credit.ratio(trip.duty);
            let factor = -((1.0 - efficiency) * 10.0) as i64;
            points += factor;
            explanation.push(format!(
                "Efficiency {:.2}; efficiency factor {} ({} credit / {} duty)",
                efficiency, factor, trip.credit, trip.duty
            ));
        }

        for adjustment in &config.score_adjustments {
            let delta = match &adjustment.condition {
                AdjustmentCondition::Crew(ids) if trip.contains_crewmember(ids) => adjustment.points,
                AdjustmentCondition::SoftDaysOff(days) if trip.spans_days_of_month(days) => {
                    adjustment.points
                }
                AdjustmentCondition::Weekdays | AdjustmentCondition::Weekends => {
                    let matching = trip
                        .departure_dates
                        .iter()
                        .filter(|d| adjustment.condition.matches_weekday(d.weekday()))
                        .count();
                    matching as i64 * adjustment.points
                }
                _ => continue,
            };
            points += delta;
            explanation.push(format!("{} for {:?}", delta, adjustment.condition));
        }

        explanation.push(format!("Final score: {}", points));
        Self {
            points,
            num_favorite_overnights,
            num_legs,
            has_equipment_two_hundred_segments,
            explanation,
        }
    }

    pub fn points(&self) -> i64 {
        self.points
    }

    pub fn num_favorite_overnights(&self) -> usize {
        self.num_favorite_overnights
    }

    pub fn num_legs(&self) -> usize {
        self.num_legs
    }

    pub fn has_equipment_two_hundred_segments(&self) -> bool {
        self.has_equipment_two_hundred_segments
    }

    pub fn explanation(&self) -> &[String] {
        &self.explanation
    }
}
