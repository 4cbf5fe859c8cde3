use serde::{Deserialize, Serialize};

use crate::error::{validation_error, Error};

/// Defined fare function: `(base + per_km * distance + per_minute * duration)
/// * multiplier`. Replaces the randomized placeholder estimate the booking
/// form used to show; callers supply the distance/duration estimates.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FareSchedule {
    pub base: f64,
    pub per_km: f64,
    pub per_minute: f64,
    pub multiplier: f64,
}

impl Default for FareSchedule {
    fn default() -> Self {
        Self {
            base: 60.0,
            per_km: 12.0,
            per_minute: 2.0,
            multiplier: 1.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Quote {
    pub base: f64,
    pub distance: f64,
    pub time: f64,
    pub multiplier: f64,
    pub total: f64,
}

impl FareSchedule {
    pub fn quote(&self, distance_km: f64, duration_min: f64) -> Result<Quote, Error> {
        if !distance_km.is_finite() || distance_km < 0.0 {
            return Err(validation_error("distance must be a non-negative number"));
        }

        if !duration_min.is_finite() || duration_min < 0.0 {
            return Err(validation_error("duration must be a non-negative number"));
        }

        let distance = self.per_km * distance_km;
        let time = self.per_minute * duration_min;
        let total = (self.base + distance + time) * self.multiplier;

        Ok(Quote {
            base: self.base,
            distance,
            time,
            multiplier: self.multiplier,
            total,
        })
    }
}

#[test]
fn quotes_are_deterministic_and_itemized() {
    let schedule = FareSchedule::default();

    let quote = schedule.quote(5.0, 7.5).unwrap();
    assert_eq!(quote.total, 135.0);
    assert_eq!(quote.base + quote.distance + quote.time, quote.total);

    // same inputs, same fare
    let again = schedule.quote(5.0, 7.5).unwrap();
    assert_eq!(again.total, quote.total);
}

#[test]
fn surge_multiplier_scales_the_whole_fare() {
    let schedule = FareSchedule {
        multiplier: 1.5,
        ..FareSchedule::default()
    };

    let quote = schedule.quote(10.0, 20.0).unwrap();
    assert_eq!(quote.total, (60.0 + 120.0 + 40.0) * 1.5);
}

#[test]
fn negative_inputs_are_validation_errors() {
    use crate::error::Kind;

    let schedule = FareSchedule::default();
    assert_eq!(schedule.quote(-1.0, 5.0).unwrap_err().kind(), Kind::Validation);
    assert_eq!(schedule.quote(3.0, f64::NAN).unwrap_err().kind(), Kind::Validation);
}
