use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One completed ride's contribution to a driver's earnings, as served by
/// the earnings summary read.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Earning {
    pub ride_id: Uuid,
    pub pickup: String,
    pub destination: String,
    pub fare: f64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EarningsSummary {
    pub earnings: Vec<Earning>,
    pub total: f64,
}

/// Calendar-bucketed earnings. Each bucket is an independent fold over the
/// full set (a ride earned today also counts in the week and month sums);
/// nothing is accumulated across calls.
#[derive(Clone, Debug, PartialEq)]
pub struct EarningsReport {
    pub today: f64,
    pub week: f64,
    pub month: f64,
    pub total: f64,
    pub rides: usize,
}

impl EarningsReport {
    /// `now` fixes the calendar boundaries: today is calendar-day equality,
    /// the week starts Sunday, the month is the calendar month.
    pub fn compute(earnings: &[Earning], now: DateTime<Utc>) -> Self {
        let today = now.date_naive();
        let week_start = today - Duration::days(now.weekday().num_days_from_sunday() as i64);
        let week_end = week_start + Duration::days(7);

        let sum = |pred: &dyn Fn(&Earning) -> bool| -> f64 {
            earnings.iter().filter(|e| pred(e)).map(|e| e.fare).sum()
        };

        Self {
            today: sum(&|e| e.completed_at.date_naive() == today),
            week: sum(&|e| {
                let day = e.completed_at.date_naive();
                day >= week_start && day < week_end
            }),
            month: sum(&|e| {
                e.completed_at.year() == now.year() && e.completed_at.month() == now.month()
            }),
            total: sum(&|_| true),
            rides: earnings.len(),
        }
    }
}

#[test]
fn buckets_fold_independently_over_the_full_set() {
    use chrono::TimeZone;

    // Wednesday 2025-03-19; the week started Sunday 2025-03-16.
    let now = Utc.with_ymd_and_hms(2025, 3, 19, 12, 0, 0).unwrap();

    let earning = |fare: f64, y: i32, m: u32, d: u32| Earning {
        ride_id: Uuid::new_v4(),
        pickup: "a".into(),
        destination: "b".into(),
        fare,
        completed_at: Utc.with_ymd_and_hms(y, m, d, 9, 30, 0).unwrap(),
    };

    let earnings = vec![
        earning(100.0, 2025, 3, 19), // today
        earning(40.0, 2025, 3, 17),  // this week, not today
        earning(25.0, 2025, 3, 14),  // this month, before Sunday
        earning(500.0, 2025, 2, 20), // previous month
    ];

    let report = EarningsReport::compute(&earnings, now);

    assert_eq!(report.today, 100.0);
    assert_eq!(report.week, 140.0);
    assert_eq!(report.month, 165.0);
    assert_eq!(report.total, 665.0);
    assert_eq!(report.rides, 4);

    // recomputation from the same set is identical
    assert_eq!(EarningsReport::compute(&earnings, now), report);
}

#[test]
fn week_starts_on_sunday() {
    use chrono::TimeZone;

    // Sunday 2025-03-16 at noon: the week is exactly one day old.
    let now = Utc.with_ymd_and_hms(2025, 3, 16, 12, 0, 0).unwrap();

    let saturday = Earning {
        ride_id: Uuid::new_v4(),
        pickup: "a".into(),
        destination: "b".into(),
        fare: 75.0,
        completed_at: Utc.with_ymd_and_hms(2025, 3, 15, 23, 0, 0).unwrap(),
    };

    let sunday = Earning {
        ride_id: Uuid::new_v4(),
        pickup: "a".into(),
        destination: "b".into(),
        fare: 30.0,
        completed_at: Utc.with_ymd_and_hms(2025, 3, 16, 1, 0, 0).unwrap(),
    };

    let report = EarningsReport::compute(&[saturday, sunday], now);
    assert_eq!(report.week, 30.0);
    assert_eq!(report.month, 105.0);
}

#[test]
fn empty_set_reports_zero_everywhere() {
    let report = EarningsReport::compute(&[], Utc::now());
    assert_eq!(report.total, 0.0);
    assert_eq!(report.today, 0.0);
    assert_eq!(report.rides, 0);
}
