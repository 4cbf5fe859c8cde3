use chrono::{DateTime, Utc};
use oso::PolarClass;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{invalid_transition_error, Error};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ride {
    pub id: Uuid,
    pub rider_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub pickup: String,
    pub destination: String,
    pub fare: f64,
    pub payment: PaymentMethod,
    pub status: Status,
    pub requested_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub in_transit_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Wallet,
}

/// Cancellation lives in the status enum; there is no separate flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Requested,
    Accepted,
    PickedUp,
    InTransit,
    Completed,
    Cancelled,
}

impl Status {
    pub fn name(&self) -> String {
        match self {
            Self::Requested => "requested".into(),
            Self::Accepted => "accepted".into(),
            Self::PickedUp => "picked_up".into(),
            Self::InTransit => "in_transit".into(),
            Self::Completed => "completed".into(),
            Self::Cancelled => "cancelled".into(),
        }
    }

    /// The single legal forward successor. Cancellation is not a successor;
    /// it is reachable from any non-terminal status via `Ride::cancel`.
    pub fn next(&self) -> Option<Status> {
        match self {
            Self::Requested => Some(Self::Accepted),
            Self::Accepted => Some(Self::PickedUp),
            Self::PickedUp => Some(Self::InTransit),
            Self::InTransit => Some(Self::Completed),
            Self::Completed | Self::Cancelled => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RideEvent {
    pub status: Status,
    pub at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Contact {
    pub id: Uuid,
    pub name: String,
    pub phone: Option<String>,
}

/// Full ride detail as served by the ride-by-id read, including the assigned
/// driver's contact card when one exists.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RideDetail {
    pub ride: Ride,
    pub driver: Option<Contact>,
}

impl Ride {
    pub fn new(
        rider_id: Uuid,
        pickup: String,
        destination: String,
        fare: f64,
        payment: PaymentMethod,
    ) -> Self {
        let now = Utc::now();

        Self {
            id: Uuid::new_v4(),
            rider_id,
            driver_id: None,
            pickup,
            destination,
            fare,
            payment,
            status: Status::Requested,
            requested_at: now,
            accepted_at: None,
            picked_up_at: None,
            in_transit_at: None,
            completed_at: None,
            cancelled_at: None,
            updated_at: now,
        }
    }

    pub fn is_ongoing(&self) -> bool {
        matches!(
            self.status,
            Status::Accepted | Status::PickedUp | Status::InTransit
        )
    }

    /// Claim the ride for a driver. Only legal while the ride is still
    /// requested and unassigned; a lost race surfaces here as an error.
    #[tracing::instrument]
    pub fn accept(&mut self, driver_id: Uuid) -> Result<(), Error> {
        match (self.status, self.driver_id) {
            (Status::Requested, None) => {
                self.driver_id = Some(driver_id);
                self.status = Status::Accepted;
                self.accepted_at = Some(Utc::now());
                self.touch();
                Ok(())
            }
            _ => Err(invalid_transition_error()),
        }
    }

    /// Move the ride one stage along the forward chain, stamping the stage
    /// timestamp. Acceptance has its own path and is rejected here.
    #[tracing::instrument]
    pub fn advance_to(&mut self, next: Status) -> Result<(), Error> {
        if self.status.next() != Some(next) {
            return Err(invalid_transition_error());
        }

        match next {
            Status::PickedUp => self.picked_up_at = Some(Utc::now()),
            Status::InTransit => self.in_transit_at = Some(Utc::now()),
            Status::Completed => self.completed_at = Some(Utc::now()),
            _ => return Err(invalid_transition_error()),
        }

        self.status = next;
        self.touch();

        Ok(())
    }

    #[tracing::instrument]
    pub fn cancel(&mut self) -> Result<(), Error> {
        if self.status.is_terminal() {
            return Err(invalid_transition_error());
        }

        self.status = Status::Cancelled;
        self.cancelled_at = Some(Utc::now());
        self.touch();

        Ok(())
    }

    /// Event history reconstructed purely from timestamp presence: requested
    /// is always there, each later stage only if its timestamp was stamped.
    pub fn timeline(&self) -> Vec<RideEvent> {
        let mut events = vec![RideEvent {
            status: Status::Requested,
            at: self.requested_at,
        }];

        let stages = [
            (Status::Accepted, self.accepted_at),
            (Status::PickedUp, self.picked_up_at),
            (Status::InTransit, self.in_transit_at),
            (Status::Completed, self.completed_at),
            (Status::Cancelled, self.cancelled_at),
        ];

        for (status, stamp) in stages {
            if let Some(at) = stamp {
                events.push(RideEvent { status, at });
            }
        }

        events
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl PolarClass for Ride {
    fn get_polar_class_builder() -> oso::ClassBuilder<Ride> {
        oso::Class::builder()
            .name("Ride")
            .add_attribute_getter("rider_id", |recv: &Ride| recv.rider_id.clone())
            .add_attribute_getter("driver_id", |recv: &Ride| recv.driver_id.clone())
            .add_attribute_getter("status_name", |recv: &Ride| recv.status.name())
    }

    fn get_polar_class() -> oso::Class {
        let builder = Ride::get_polar_class_builder();
        builder.build()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortField {
    RequestedAt,
    Fare,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Client-side view filter over an already-fetched ride set: substring
/// search on either location, status and fare-range predicates, sorting and
/// fixed-size pagination.
#[derive(Clone, Debug)]
pub struct RideFilter {
    pub search: Option<String>,
    pub status: Option<Status>,
    pub fare_min: Option<f64>,
    pub fare_max: Option<f64>,
    pub sort: SortField,
    pub direction: SortDirection,
    pub page: usize,
    pub page_size: usize,
}

impl Default for RideFilter {
    fn default() -> Self {
        Self {
            search: None,
            status: None,
            fare_min: None,
            fare_max: None,
            sort: SortField::RequestedAt,
            direction: SortDirection::Descending,
            page: 1,
            page_size: 10,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub page_count: usize,
}

impl RideFilter {
    pub fn matches(&self, ride: &Ride) -> bool {
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            let hit = ride.pickup.to_lowercase().contains(&needle)
                || ride.destination.to_lowercase().contains(&needle);

            if !hit {
                return false;
            }
        }

        if let Some(status) = self.status {
            if ride.status != status {
                return false;
            }
        }

        if let Some(min) = self.fare_min {
            if ride.fare < min {
                return false;
            }
        }

        if let Some(max) = self.fare_max {
            if ride.fare > max {
                return false;
            }
        }

        true
    }

    pub fn apply(&self, rides: &[Ride]) -> Page<Ride> {
        let mut matched: Vec<Ride> = rides
            .iter()
            .filter(|ride| self.matches(ride))
            .cloned()
            .collect();

        matched.sort_by(|a, b| {
            let ordering = match self.sort {
                SortField::RequestedAt => a.requested_at.cmp(&b.requested_at),
                SortField::Fare => a
                    .fare
                    .partial_cmp(&b.fare)
                    .unwrap_or(std::cmp::Ordering::Equal),
            };

            match self.direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            }
        });

        let total = matched.len();
        let page_size = self.page_size.max(1);
        let page_count = total.div_ceil(page_size);
        let page = self.page.max(1);
        let start = (page - 1).saturating_mul(page_size);

        let items = if start < total {
            matched[start..(start + page_size).min(total)].to_vec()
        } else {
            Vec::new()
        };

        Page {
            items,
            total,
            page,
            page_count,
        }
    }
}

#[test]
fn forward_chain_is_the_only_legal_path() {
    let rider = Uuid::new_v4();
    let driver = Uuid::new_v4();
    let mut ride = Ride::new(rider, "12 Main St".into(), "99 Oak Ave".into(), 135.0, PaymentMethod::Cash);

    // skipping a stage is rejected
    assert!(ride.advance_to(Status::InTransit).is_err());
    assert!(ride.advance_to(Status::Completed).is_err());

    // acceptance never goes through advance_to
    assert!(ride.advance_to(Status::Accepted).is_err());

    ride.accept(driver).unwrap();
    assert_eq!(ride.status, Status::Accepted);
    assert_eq!(ride.driver_id, Some(driver));

    // a second claim loses
    assert!(ride.accept(Uuid::new_v4()).is_err());
    assert_eq!(ride.driver_id, Some(driver));

    ride.advance_to(Status::PickedUp).unwrap();
    ride.advance_to(Status::InTransit).unwrap();
    ride.advance_to(Status::Completed).unwrap();

    // terminal states absorb
    assert!(ride.advance_to(Status::Completed).is_err());
    assert!(ride.cancel().is_err());
    assert_eq!(ride.status, Status::Completed);
}

#[test]
fn cancel_is_reachable_from_any_non_terminal_status() {
    let mut ride = Ride::new(Uuid::new_v4(), "a".into(), "b".into(), 50.0, PaymentMethod::Card);
    ride.accept(Uuid::new_v4()).unwrap();
    ride.advance_to(Status::PickedUp).unwrap();

    ride.cancel().unwrap();
    assert_eq!(ride.status, Status::Cancelled);
    assert!(ride.cancelled_at.is_some());
    assert!(ride.cancel().is_err());
}

#[test]
fn random_transition_sequences_respect_the_state_machine() {
    use rand::Rng;

    let targets = [
        Status::Requested,
        Status::Accepted,
        Status::PickedUp,
        Status::InTransit,
        Status::Completed,
        Status::Cancelled,
    ];

    let mut rng = rand::thread_rng();

    for _ in 0..200 {
        let mut ride = Ride::new(Uuid::new_v4(), "a".into(), "b".into(), 80.0, PaymentMethod::Cash);

        for _ in 0..16 {
            let target = targets[rng.gen_range(0..targets.len())];
            let before = ride.status;
            let had_driver = ride.driver_id.is_some();

            let result = match target {
                Status::Accepted => ride.accept(Uuid::new_v4()),
                Status::Cancelled => ride.cancel(),
                other => ride.advance_to(other),
            };

            let legal = match target {
                Status::Accepted => before == Status::Requested && !had_driver,
                Status::Cancelled => !before.is_terminal(),
                Status::Requested => false,
                other => before.next() == Some(other),
            };

            assert_eq!(result.is_ok(), legal, "{:?} -> {:?}", before, target);

            if !legal {
                assert_eq!(ride.status, before, "rejected transition mutated state");
            }
        }
    }
}

#[test]
fn stage_timestamps_exist_iff_the_stage_was_passed() {
    let mut ride = Ride::new(Uuid::new_v4(), "a".into(), "b".into(), 60.0, PaymentMethod::Wallet);
    assert!(ride.accepted_at.is_none() && ride.picked_up_at.is_none());

    ride.accept(Uuid::new_v4()).unwrap();
    assert!(ride.accepted_at.is_some() && ride.picked_up_at.is_none());

    ride.advance_to(Status::PickedUp).unwrap();
    ride.advance_to(Status::InTransit).unwrap();
    ride.advance_to(Status::Completed).unwrap();

    let accepted = ride.accepted_at.unwrap();
    let picked_up = ride.picked_up_at.unwrap();
    let in_transit = ride.in_transit_at.unwrap();
    let completed = ride.completed_at.unwrap();

    assert!(ride.requested_at <= accepted);
    assert!(accepted <= picked_up);
    assert!(picked_up <= in_transit);
    assert!(in_transit <= completed);
    assert!(ride.cancelled_at.is_none());
}

#[test]
fn timeline_is_synthesized_from_timestamp_presence() {
    let mut ride = Ride::new(Uuid::new_v4(), "a".into(), "b".into(), 60.0, PaymentMethod::Cash);
    assert_eq!(ride.timeline().len(), 1);

    ride.accept(Uuid::new_v4()).unwrap();
    ride.advance_to(Status::PickedUp).unwrap();

    let events: Vec<Status> = ride.timeline().iter().map(|e| e.status).collect();
    assert_eq!(events, vec![Status::Requested, Status::Accepted, Status::PickedUp]);

    ride.cancel().unwrap();
    let events: Vec<Status> = ride.timeline().iter().map(|e| e.status).collect();
    assert_eq!(
        events,
        vec![Status::Requested, Status::Accepted, Status::PickedUp, Status::Cancelled]
    );
}

#[test]
fn filters_compose_order_independently() {
    let rider = Uuid::new_v4();
    let mut rides = Vec::new();

    for (fare, completed) in [(50.0, true), (120.0, true), (120.0, false), (300.0, true)] {
        let mut ride = Ride::new(rider, "Mirpur Rd".into(), "Gulshan 1".into(), fare, PaymentMethod::Cash);

        if completed {
            ride.accept(Uuid::new_v4()).unwrap();
            ride.advance_to(Status::PickedUp).unwrap();
            ride.advance_to(Status::InTransit).unwrap();
            ride.advance_to(Status::Completed).unwrap();
        }

        rides.push(ride);
    }

    let filter = RideFilter {
        status: Some(Status::Completed),
        fare_min: Some(100.0),
        fare_max: Some(200.0),
        ..RideFilter::default()
    };

    let page = filter.apply(&rides);
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].fare, 120.0);
    assert_eq!(page.items[0].status, Status::Completed);

    // the conjunction equals sequential application, in either order
    let by_status = RideFilter {
        status: Some(Status::Completed),
        ..RideFilter::default()
    };
    let by_fare = RideFilter {
        fare_min: Some(100.0),
        fare_max: Some(200.0),
        ..RideFilter::default()
    };

    let status_then_fare = by_fare.apply(&by_status.apply(&rides).items).items;
    let fare_then_status = by_status.apply(&by_fare.apply(&rides).items).items;

    assert_eq!(status_then_fare.len(), 1);
    assert_eq!(fare_then_status.len(), 1);
    assert_eq!(status_then_fare[0].id, page.items[0].id);
    assert_eq!(fare_then_status[0].id, page.items[0].id);
}

#[test]
fn search_sorting_and_pagination() {
    let rider = Uuid::new_v4();
    let fares = [90.0, 30.0, 150.0, 60.0, 120.0];

    let rides: Vec<Ride> = fares
        .iter()
        .enumerate()
        .map(|(i, fare)| {
            Ride::new(
                rider,
                format!("Stop {}", i),
                "Airport Rd".into(),
                *fare,
                PaymentMethod::Card,
            )
        })
        .collect();

    let filter = RideFilter {
        search: Some("airport".into()),
        sort: SortField::Fare,
        direction: SortDirection::Ascending,
        page: 1,
        page_size: 2,
        ..RideFilter::default()
    };

    let page = filter.apply(&rides);
    assert_eq!(page.total, 5);
    assert_eq!(page.page_count, 3);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].fare, 30.0);
    assert_eq!(page.items[1].fare, 60.0);

    let last = RideFilter { page: 3, ..filter }.apply(&rides);
    assert_eq!(last.items.len(), 1);
    assert_eq!(last.items[0].fare, 150.0);

    let beyond = RideFilter {
        page: 9,
        search: Some("airport".into()),
        page_size: 2,
        ..RideFilter::default()
    }
    .apply(&rides);
    assert!(beyond.items.is_empty());
}
