use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::Engine;
use crate::api::{RideAPI, RideRequest};
use crate::auth::Platform;
use crate::cache::RideScope;
use crate::entities::{EarningsReport, Page, Ride, RideDetail, RideFilter, Status};
use crate::error::{conflict_error, invalid_transition_error, validation_error, Error, Kind};

impl Engine {
    /// Book a new ride. Form-level constraints are checked before anything
    /// touches the network.
    #[tracing::instrument(skip(self))]
    pub async fn request_ride(&self, request: RideRequest) -> Result<Ride, Error> {
        let user = self.require_identity().await?;
        self.authorize(user, "request_ride", Platform)?;

        if request.pickup.trim().len() < 3 {
            return Err(validation_error("pickup location is required"));
        }

        if request.destination.trim().len() < 3 {
            return Err(validation_error("destination is required"));
        }

        if !request.fare.is_finite() || request.fare <= 0.0 {
            return Err(validation_error("fare must be a positive number"));
        }

        let ride = self.remote.request_ride(request).await?;
        self.views.invalidate_rides().await;

        Ok(ride)
    }

    /// Unassigned requested rides, for drivers. An empty page is a valid
    /// answer, not an error.
    pub async fn list_available(&self, filter: &RideFilter) -> Result<Page<Ride>, Error> {
        let user = self.require_identity().await?;
        self.authorize(user, "list_available", Platform)?;

        let rides = self.scoped_rides(RideScope::Available).await?;

        Ok(filter.apply(&rides))
    }

    pub async fn my_rides(&self, filter: &RideFilter) -> Result<Page<Ride>, Error> {
        self.require_identity().await?;

        let rides = self.scoped_rides(RideScope::Mine).await?;

        Ok(filter.apply(&rides))
    }

    pub async fn driver_rides(&self, filter: &RideFilter) -> Result<Page<Ride>, Error> {
        let user = self.require_identity().await?;
        self.authorize(user, "list_driver", Platform)?;

        let rides = self.scoped_rides(RideScope::Driver).await?;

        Ok(filter.apply(&rides))
    }

    pub async fn all_rides(&self, filter: &RideFilter) -> Result<Page<Ride>, Error> {
        let user = self.require_identity().await?;
        self.authorize(user, "list_all", Platform)?;

        let rides = self.scoped_rides(RideScope::All).await?;

        Ok(filter.apply(&rides))
    }

    /// The rider's rides that are still underway.
    pub async fn my_ongoing(&self) -> Result<Vec<Ride>, Error> {
        self.require_identity().await?;

        let mut rides = self.scoped_rides(RideScope::Mine).await?;
        rides.retain(|ride| ride.is_ongoing());

        Ok(rides)
    }

    /// The driver's assigned rides that are still underway.
    pub async fn driver_ongoing(&self) -> Result<Vec<Ride>, Error> {
        let user = self.require_identity().await?;
        self.authorize(user, "list_driver", Platform)?;

        let mut rides = self.scoped_rides(RideScope::Driver).await?;
        rides.retain(|ride| ride.is_ongoing());

        Ok(rides)
    }

    /// Claim a requested ride. Losing the race to another driver is an
    /// expected conflict: the caller refreshes and the ride is gone.
    #[tracing::instrument(skip(self, ride), fields(ride_id = %ride.id))]
    pub async fn accept(&self, ride: &Ride) -> Result<Ride, Error> {
        let user = self.require_identity().await?;
        self.authorize(user, "accept", ride.clone())?;

        let _guard = self.begin_transition(ride.id)?;
        let result = self.remote.accept_ride(ride.id).await;

        self.settle_mutation(result).await
    }

    /// Move the ride to the single status adjacent to the caller's snapshot.
    /// A stale snapshot is rejected by the service as a non-adjacent
    /// transition and surfaces as a retryable conflict.
    #[tracing::instrument(skip(self, ride), fields(ride_id = %ride.id))]
    pub async fn advance(&self, ride: &Ride) -> Result<Ride, Error> {
        let user = self.require_identity().await?;
        self.authorize(user, "advance", ride.clone())?;

        let next = ride.status.next().ok_or_else(invalid_transition_error)?;

        if next == Status::Accepted {
            // acceptance assigns a driver and has its own path
            return Err(invalid_transition_error());
        }

        let _guard = self.begin_transition(ride.id)?;
        let result = self.remote.update_status(ride.id, next).await;

        self.settle_mutation(result).await
    }

    /// Cancel from any non-terminal status. A terminal snapshot conflicts
    /// without spending a round trip.
    #[tracing::instrument(skip(self, ride), fields(ride_id = %ride.id))]
    pub async fn cancel(&self, ride: &Ride) -> Result<Ride, Error> {
        let user = self.require_identity().await?;
        self.authorize(user, "cancel", ride.clone())?;

        if ride.status.is_terminal() {
            return Err(conflict_error());
        }

        let _guard = self.begin_transition(ride.id)?;
        let result = self.remote.update_status(ride.id, Status::Cancelled).await;

        self.settle_mutation(result).await
    }

    pub async fn ride_detail(&self, id: Uuid) -> Result<RideDetail, Error> {
        let user = self.require_identity().await?;

        let detail = self.remote.find_ride(id).await?;
        self.authorize(user, "read", detail.ride.clone())?;

        Ok(detail)
    }

    /// Completed-ride earnings folded into calendar buckets around `now`.
    pub async fn earnings_report(&self, now: DateTime<Utc>) -> Result<EarningsReport, Error> {
        let user = self.require_identity().await?;
        self.authorize(user, "list_driver", Platform)?;

        let summary = match self.views.earnings().await {
            Some(cached) => cached,
            None => {
                let fresh = self.remote.earnings().await?;
                self.views.put_earnings(fresh.clone()).await;
                fresh
            }
        };

        Ok(EarningsReport::compute(&summary.earnings, now))
    }

    /// Manual refresh entry point for retry controls: drops every ride view
    /// so the next read goes back to the service.
    pub async fn refresh_rides(&self) {
        self.views.invalidate_rides().await;
    }

    async fn scoped_rides(&self, scope: RideScope) -> Result<Vec<Ride>, Error> {
        if let Some(cached) = self.views.rides(scope).await {
            return Ok(cached);
        }

        let fresh = match scope {
            RideScope::Available => self.remote.available_rides().await?,
            RideScope::Mine => self.remote.my_rides().await?,
            RideScope::Driver => self.remote.driver_rides().await?,
            RideScope::All => self.remote.all_rides().await?,
        };

        self.views.put_rides(scope, fresh.clone()).await;

        Ok(fresh)
    }

    /// Every confirmed mutation stales all ride views. A conflict means the
    /// local snapshot was behind the service, so the views are staled too
    /// and the retry starts from fresh data.
    async fn settle_mutation(&self, result: Result<Ride, Error>) -> Result<Ride, Error> {
        match result {
            Ok(ride) => {
                self.views.invalidate_rides().await;
                Ok(ride)
            }
            Err(err) => {
                tracing::warn!(code = err.code, message = %err.message, "ride mutation failed");

                if err.kind() == Kind::Conflict {
                    self.views.invalidate_rides().await;
                }

                Err(err)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::sync::Arc;

    use uuid::Uuid;

    use crate::api::DynAPI;
    use crate::engine::Engine;
    use crate::entities::{Role, User};
    use crate::simulation::Simulation;

    pub struct TestWorld {
        pub sim: Simulation,
        pub rider: Uuid,
        pub driver_a: Uuid,
        pub driver_b: Uuid,
        pub admin: Uuid,
    }

    pub async fn seed_world() -> TestWorld {
        let sim = Simulation::new();

        let rider = sim
            .seed_user(
                User::new("Asha".into(), "asha@example.com".into(), None, Role::Rider),
                "pw-rider",
            )
            .await;
        let driver_a = sim
            .seed_user(
                User::new("Karim".into(), "karim@example.com".into(), None, Role::Driver),
                "pw-a",
            )
            .await;
        let driver_b = sim
            .seed_user(
                User::new("Babul".into(), "babul@example.com".into(), None, Role::Driver),
                "pw-b",
            )
            .await;
        let admin = sim
            .seed_user(
                User::new("Root".into(), "root@example.com".into(), None, Role::Admin),
                "pw-admin",
            )
            .await;

        TestWorld {
            sim,
            rider,
            driver_a,
            driver_b,
            admin,
        }
    }

    pub fn engine_for(sim: &Simulation, user_id: Uuid) -> Engine {
        Engine::new(Arc::new(sim.connect(user_id)) as DynAPI)
    }
}

#[tokio::test]
async fn a_booked_ride_shows_up_in_the_right_views() {
    use crate::api::RideRequest;
    use crate::entities::{FareSchedule, PaymentMethod};
    use fixtures::{engine_for, seed_world};

    let world = seed_world().await;
    let rider = engine_for(&world.sim, world.rider);
    let driver = engine_for(&world.sim, world.driver_a);

    // the booking form quotes the fare before submitting
    let quote = FareSchedule::default().quote(5.0, 7.5).unwrap();
    assert_eq!(quote.total, 135.0);

    let ride = rider
        .request_ride(RideRequest {
            pickup: "12 Main St".into(),
            destination: "99 Oak Ave".into(),
            payment: PaymentMethod::Cash,
            fare: quote.total,
        })
        .await
        .unwrap();

    assert_eq!(ride.status, Status::Requested);
    assert_eq!(ride.fare, 135.0);
    assert!(ride.driver_id.is_none());

    let mine = rider.my_rides(&RideFilter::default()).await.unwrap();
    assert!(mine.items.iter().any(|r| r.id == ride.id));

    let available = driver.list_available(&RideFilter::default()).await.unwrap();
    assert!(available.items.iter().any(|r| r.id == ride.id));

    assert!(rider.my_ongoing().await.unwrap().is_empty());
    assert!(driver.driver_ongoing().await.unwrap().is_empty());
}

#[tokio::test]
async fn validation_failures_never_reach_the_service() {
    use crate::api::RideRequest;
    use crate::entities::PaymentMethod;
    use fixtures::{engine_for, seed_world};

    let world = seed_world().await;
    let rider = engine_for(&world.sim, world.rider);

    let err = rider
        .request_ride(RideRequest {
            pickup: "  ".into(),
            destination: "99 Oak Ave".into(),
            payment: PaymentMethod::Cash,
            fare: 135.0,
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), Kind::Validation);
    assert!(world.sim.rides().await.is_empty());
}

#[tokio::test]
async fn the_full_lifecycle_lands_in_history_and_earnings() {
    use crate::api::RideRequest;
    use crate::entities::PaymentMethod;
    use fixtures::{engine_for, seed_world};

    let world = seed_world().await;
    let rider = engine_for(&world.sim, world.rider);
    let driver = engine_for(&world.sim, world.driver_a);

    let ride = rider
        .request_ride(RideRequest {
            pickup: "Mirpur 10".into(),
            destination: "Banani".into(),
            payment: PaymentMethod::Wallet,
            fare: 220.0,
        })
        .await
        .unwrap();

    let ride = driver.accept(&ride).await.unwrap();
    assert_eq!(ride.status, Status::Accepted);
    assert_eq!(ride.driver_id, Some(world.driver_a));

    // the claimed ride left the available pool
    let available = driver.list_available(&RideFilter::default()).await.unwrap();
    assert!(available.items.iter().all(|r| r.id != ride.id));

    let ride = driver.advance(&ride).await.unwrap();
    assert_eq!(ride.status, Status::PickedUp);

    let ride = driver.advance(&ride).await.unwrap();
    assert_eq!(ride.status, Status::InTransit);
    assert_eq!(driver.driver_ongoing().await.unwrap().len(), 1);

    let ride = driver.advance(&ride).await.unwrap();
    assert_eq!(ride.status, Status::Completed);
    assert!(ride.completed_at.is_some());

    // gone from ongoing, present in history and earnings
    assert!(driver.driver_ongoing().await.unwrap().is_empty());

    let history = driver.driver_rides(&RideFilter::default()).await.unwrap();
    assert!(history.items.iter().any(|r| r.id == ride.id));

    let report = driver.earnings_report(Utc::now()).await.unwrap();
    assert_eq!(report.total, 220.0);
    assert_eq!(report.today, 220.0);

    let detail = driver.ride_detail(ride.id).await.unwrap();
    assert_eq!(detail.driver.as_ref().unwrap().id, world.driver_a);
    let stages: Vec<Status> = detail.ride.timeline().iter().map(|e| e.status).collect();
    assert_eq!(
        stages,
        vec![
            Status::Requested,
            Status::Accepted,
            Status::PickedUp,
            Status::InTransit,
            Status::Completed
        ]
    );
}

#[tokio::test]
async fn concurrent_accepts_have_exactly_one_winner() {
    use std::sync::Arc;

    use crate::api::RideRequest;
    use crate::entities::PaymentMethod;
    use fixtures::{engine_for, seed_world};

    let world = seed_world().await;
    let rider = engine_for(&world.sim, world.rider);
    let driver_a = Arc::new(engine_for(&world.sim, world.driver_a));
    let driver_b = Arc::new(engine_for(&world.sim, world.driver_b));

    let ride = rider
        .request_ride(RideRequest {
            pickup: "Farmgate".into(),
            destination: "Uttara".into(),
            payment: PaymentMethod::Cash,
            fare: 310.0,
        })
        .await
        .unwrap();

    let a = {
        let engine = driver_a.clone();
        let ride = ride.clone();
        tokio::spawn(async move { engine.accept(&ride).await })
    };
    let b = {
        let engine = driver_b.clone();
        let ride = ride.clone();
        tokio::spawn(async move { engine.accept(&ride).await })
    };

    let outcomes = [a.await.unwrap(), b.await.unwrap()];
    let winners: Vec<&Ride> = outcomes.iter().filter_map(|o| o.as_ref().ok()).collect();

    assert_eq!(winners.len(), 1, "exactly one driver wins the race");

    let loser_err = outcomes
        .iter()
        .find_map(|o| o.as_ref().err())
        .expect("the other driver gets an error");
    assert_eq!(loser_err.kind(), Kind::Conflict);
    assert!(loser_err.is_retryable());

    // the authoritative record carries exactly one driver
    let settled = world.sim.ride(ride.id).await.unwrap();
    assert_eq!(settled.status, Status::Accepted);
    assert!(settled.driver_id == Some(world.driver_a) || settled.driver_id == Some(world.driver_b));

    // after a refresh neither driver sees the ride as available
    for engine in [&driver_a, &driver_b] {
        let available = engine.list_available(&RideFilter::default()).await.unwrap();
        assert!(available.items.iter().all(|r| r.id != ride.id));
    }
}

#[tokio::test]
async fn stale_snapshots_surface_as_retryable_conflicts() {
    use crate::api::RideRequest;
    use crate::entities::PaymentMethod;
    use fixtures::{engine_for, seed_world};

    let world = seed_world().await;
    let rider = engine_for(&world.sim, world.rider);
    let driver = engine_for(&world.sim, world.driver_a);

    let requested = rider
        .request_ride(RideRequest {
            pickup: "Dhanmondi 27".into(),
            destination: "Motijheel".into(),
            payment: PaymentMethod::Card,
            fare: 180.0,
        })
        .await
        .unwrap();

    let accepted = driver.accept(&requested).await.unwrap();
    let picked_up = driver.advance(&accepted).await.unwrap();

    // an advance computed from the already-consumed snapshot conflicts
    let err = driver.advance(&accepted).await.unwrap_err();
    assert_eq!(err.kind(), Kind::Conflict);
    assert!(err.is_retryable());

    // the service state did not move
    let settled = world.sim.ride(requested.id).await.unwrap();
    assert_eq!(settled.status, picked_up.status);
}

#[tokio::test]
async fn cancellation_rules_follow_the_state_machine() {
    use crate::api::RideRequest;
    use crate::entities::PaymentMethod;
    use fixtures::{engine_for, seed_world};

    let world = seed_world().await;
    let rider = engine_for(&world.sim, world.rider);
    let driver = engine_for(&world.sim, world.driver_a);

    let ride = rider
        .request_ride(RideRequest {
            pickup: "Khilgaon".into(),
            destination: "Paltan".into(),
            payment: PaymentMethod::Cash,
            fare: 90.0,
        })
        .await
        .unwrap();

    let accepted = driver.accept(&ride).await.unwrap();
    let cancelled = rider.cancel(&accepted).await.unwrap();
    assert_eq!(cancelled.status, Status::Cancelled);
    assert!(cancelled.cancelled_at.is_some());

    // terminal snapshots conflict locally, without a round trip
    let err = rider.cancel(&cancelled).await.unwrap_err();
    assert_eq!(err.kind(), Kind::Conflict);

    // accepting a cancelled ride reports it gone
    let err = driver.accept(&ride).await.unwrap_err();
    assert_eq!(err.kind(), Kind::NotFound);
}

#[tokio::test]
async fn a_blocked_driver_is_rejected_by_the_service() {
    use crate::api::RideRequest;
    use crate::entities::PaymentMethod;
    use fixtures::{engine_for, seed_world};

    let world = seed_world().await;
    let rider = engine_for(&world.sim, world.rider);
    let admin = engine_for(&world.sim, world.admin);
    let driver = engine_for(&world.sim, world.driver_a);

    let ride = rider
        .request_ride(RideRequest {
            pickup: "Badda".into(),
            destination: "Mohakhali".into(),
            payment: PaymentMethod::Cash,
            fare: 70.0,
        })
        .await
        .unwrap();

    // warm the driver's identity cache, then block them behind its back
    driver.list_available(&RideFilter::default()).await.unwrap();
    admin.toggle_block(world.driver_a).await.unwrap();

    let err = driver.accept(&ride).await.unwrap_err();
    assert_eq!(err.kind(), Kind::Unauthorized);
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn in_flight_rides_refuse_overlapping_transitions() {
    use fixtures::{engine_for, seed_world};

    let world = seed_world().await;
    let engine = engine_for(&world.sim, world.rider);
    let ride_id = Uuid::new_v4();

    assert!(!engine.is_busy(ride_id));

    let guard = engine.begin_transition(ride_id).unwrap();
    assert!(engine.is_busy(ride_id));

    let err = engine.begin_transition(ride_id).unwrap_err();
    assert_eq!(err.kind(), Kind::Conflict);

    // an unrelated ride is not serialized against this one
    assert!(!engine.is_busy(Uuid::new_v4()));

    drop(guard);
    assert!(!engine.is_busy(ride_id));
}
