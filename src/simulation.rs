use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::api::{
    Credentials, DriverDecision, ProfileUpdate, Registration, RideAPI, RideRequest, UserAPI, API,
};
use crate::entities::{
    Contact, Earning, EarningsSummary, Ride, RideDetail, Role, Status, User,
    Vehicle,
};
use crate::error::{
    blocked_user_error, conflict_error, not_found_error, signed_out_error, unauthorized_error,
    validation_error, Error,
};

/// In-memory rendition of the remote ride/user service, enforcing the same
/// rules the real one owns: transition adjacency, single driver assignment
/// under concurrent accepts, role and block checks, scoped reads. Engine
/// tests run against it; concurrent sessions share one world.
pub struct Simulation {
    world: Arc<World>,
}

#[derive(Debug, Default)]
struct World {
    users: Mutex<HashMap<Uuid, User>>,
    credentials: Mutex<HashMap<String, (Uuid, String)>>,
    rides: Mutex<HashMap<Uuid, Ride>>,
}

impl Simulation {
    pub fn new() -> Self {
        Self {
            world: Arc::new(World::default()),
        }
    }

    pub async fn seed_user(&self, user: User, password: &str) -> Uuid {
        let id = user.id;

        self.world
            .credentials
            .lock()
            .await
            .insert(user.email.clone(), (id, password.to_string()));
        self.world.users.lock().await.insert(id, user);

        id
    }

    /// A session already signed in as the given user.
    pub fn connect(&self, user_id: Uuid) -> Session {
        Session {
            world: self.world.clone(),
            current: Mutex::new(Some(user_id)),
        }
    }

    /// A session with nobody signed in.
    pub fn guest(&self) -> Session {
        Session {
            world: self.world.clone(),
            current: Mutex::new(None),
        }
    }

    pub async fn ride(&self, id: Uuid) -> Option<Ride> {
        self.world.rides.lock().await.get(&id).cloned()
    }

    pub async fn rides(&self) -> Vec<Ride> {
        self.world.rides.lock().await.values().cloned().collect()
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}

/// One client's view of the simulated service.
pub struct Session {
    world: Arc<World>,
    current: Mutex<Option<Uuid>>,
}

impl Session {
    async fn actor(&self) -> Result<User, Error> {
        let id = (*self.current.lock().await).ok_or_else(signed_out_error)?;

        self.world
            .users
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(signed_out_error)
    }

    /// Blocked users keep their session but every authenticated action is
    /// rejected.
    async fn active_actor(&self) -> Result<User, Error> {
        let user = self.actor().await?;

        if user.blocked {
            return Err(blocked_user_error());
        }

        Ok(user)
    }

    async fn driver_actor(&self) -> Result<User, Error> {
        let user = self.active_actor().await?;

        if user.role != Role::Driver {
            return Err(unauthorized_error());
        }

        Ok(user)
    }

    async fn admin_actor(&self) -> Result<User, Error> {
        let user = self.active_actor().await?;

        if user.role != Role::Admin {
            return Err(unauthorized_error());
        }

        Ok(user)
    }

    async fn store_user(&self, user: User) {
        self.world.users.lock().await.insert(user.id, user);
    }
}

#[async_trait]
impl UserAPI for Session {
    async fn register(&self, registration: Registration) -> Result<(), Error> {
        let mut credentials = self.world.credentials.lock().await;

        if credentials.contains_key(&registration.email) {
            return Err(validation_error("email is already registered"));
        }

        let user = User::new(
            registration.name,
            registration.email.clone(),
            registration.phone,
            registration.role,
        );

        credentials.insert(registration.email, (user.id, registration.password));
        drop(credentials);

        self.store_user(user).await;

        Ok(())
    }

    async fn login(&self, credentials: Credentials) -> Result<(), Error> {
        let id = {
            let known = self.world.credentials.lock().await;

            match known.get(&credentials.email) {
                Some((id, password)) if *password == credentials.password => *id,
                _ => return Err(unauthorized_error()),
            }
        };

        *self.current.lock().await = Some(id);

        Ok(())
    }

    async fn logout(&self) -> Result<(), Error> {
        *self.current.lock().await = None;

        Ok(())
    }

    async fn me(&self) -> Result<Option<User>, Error> {
        let id = match *self.current.lock().await {
            Some(id) => id,
            None => return Ok(None),
        };

        Ok(self.world.users.lock().await.get(&id).cloned())
    }

    async fn update_profile(&self, update: ProfileUpdate) -> Result<User, Error> {
        let mut user = self.active_actor().await?;

        if let Some(name) = update.name {
            user.name = name;
        }

        if let Some(phone) = update.phone {
            user.phone = Some(phone);
        }

        user.updated_at = Utc::now();
        self.store_user(user.clone()).await;

        Ok(user)
    }

    async fn change_password(&self, old: String, new: String) -> Result<(), Error> {
        let user = self.active_actor().await?;
        let mut credentials = self.world.credentials.lock().await;

        match credentials.get_mut(&user.email) {
            Some((_, password)) if *password == old => {
                *password = new;
                Ok(())
            }
            Some(_) => Err(unauthorized_error()),
            None => Err(not_found_error()),
        }
    }

    async fn toggle_availability(&self) -> Result<User, Error> {
        let mut user = self.active_actor().await?;

        user.toggle_availability()?;
        self.store_user(user.clone()).await;

        Ok(user)
    }

    async fn become_driver(&self, vehicle: Vehicle) -> Result<User, Error> {
        let mut user = self.active_actor().await?;

        user.request_driver(vehicle)?;
        self.store_user(user.clone()).await;

        Ok(user)
    }

    async fn approve_driver(&self, user_id: Uuid, decision: DriverDecision) -> Result<User, Error> {
        self.admin_actor().await?;

        let mut users = self.world.users.lock().await;
        let user = users.get_mut(&user_id).ok_or_else(not_found_error)?;

        user.resolve_driver_request(decision == DriverDecision::Approve)?;

        Ok(user.clone())
    }

    async fn toggle_block(&self, user_id: Uuid) -> Result<User, Error> {
        self.admin_actor().await?;

        let mut users = self.world.users.lock().await;
        let user = users.get_mut(&user_id).ok_or_else(not_found_error)?;

        user.toggle_block();

        Ok(user.clone())
    }

    async fn all_users(&self) -> Result<Vec<User>, Error> {
        self.admin_actor().await?;

        Ok(self.world.users.lock().await.values().cloned().collect())
    }
}

#[async_trait]
impl RideAPI for Session {
    async fn request_ride(&self, request: RideRequest) -> Result<Ride, Error> {
        let user = self.active_actor().await?;

        if user.role != Role::Rider {
            return Err(unauthorized_error());
        }

        let ride = Ride::new(
            user.id,
            request.pickup,
            request.destination,
            request.fare,
            request.payment,
        );

        self.world.rides.lock().await.insert(ride.id, ride.clone());

        Ok(ride)
    }

    async fn my_rides(&self) -> Result<Vec<Ride>, Error> {
        let user = self.active_actor().await?;

        let mut rides: Vec<Ride> = self
            .world
            .rides
            .lock()
            .await
            .values()
            .filter(|ride| ride.rider_id == user.id)
            .cloned()
            .collect();

        rides.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));

        Ok(rides)
    }

    async fn available_rides(&self) -> Result<Vec<Ride>, Error> {
        self.driver_actor().await?;

        let mut rides: Vec<Ride> = self
            .world
            .rides
            .lock()
            .await
            .values()
            .filter(|ride| ride.status == Status::Requested && ride.driver_id.is_none())
            .cloned()
            .collect();

        rides.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));

        Ok(rides)
    }

    async fn driver_rides(&self) -> Result<Vec<Ride>, Error> {
        let user = self.driver_actor().await?;

        let mut rides: Vec<Ride> = self
            .world
            .rides
            .lock()
            .await
            .values()
            .filter(|ride| ride.driver_id == Some(user.id))
            .cloned()
            .collect();

        rides.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));

        Ok(rides)
    }

    async fn all_rides(&self) -> Result<Vec<Ride>, Error> {
        self.admin_actor().await?;

        Ok(self.world.rides.lock().await.values().cloned().collect())
    }

    async fn find_ride(&self, id: Uuid) -> Result<RideDetail, Error> {
        let user = self.active_actor().await?;

        let ride = self
            .world
            .rides
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(not_found_error)?;

        let related = user.role == Role::Admin
            || ride.rider_id == user.id
            || ride.driver_id == Some(user.id);

        if !related {
            return Err(unauthorized_error());
        }

        let driver = match ride.driver_id {
            Some(driver_id) => {
                self.world
                    .users
                    .lock()
                    .await
                    .get(&driver_id)
                    .map(|driver| Contact {
                        id: driver.id,
                        name: driver.name.clone(),
                        phone: driver.phone.clone(),
                    })
            }
            None => None,
        };

        Ok(RideDetail { ride, driver })
    }

    async fn accept_ride(&self, id: Uuid) -> Result<Ride, Error> {
        let user = self.driver_actor().await?;

        // check-and-claim under one lock: concurrent accepts serialize here
        // and exactly one sees the ride still requested
        let mut rides = self.world.rides.lock().await;
        let ride = rides.get_mut(&id).ok_or_else(not_found_error)?;

        if ride.status == Status::Cancelled {
            return Err(not_found_error());
        }

        ride.accept(user.id).map_err(|_| conflict_error())?;

        Ok(ride.clone())
    }

    async fn update_status(&self, id: Uuid, status: Status) -> Result<Ride, Error> {
        let user = self.active_actor().await?;

        let mut rides = self.world.rides.lock().await;
        let ride = rides.get_mut(&id).ok_or_else(not_found_error)?;

        if status == Status::Cancelled {
            let related = user.role == Role::Admin
                || ride.rider_id == user.id
                || ride.driver_id == Some(user.id);

            if !related {
                return Err(unauthorized_error());
            }

            ride.cancel()?;
        } else {
            if ride.driver_id != Some(user.id) {
                return Err(unauthorized_error());
            }

            ride.advance_to(status)?;
        }

        Ok(ride.clone())
    }

    async fn earnings(&self) -> Result<EarningsSummary, Error> {
        let user = self.driver_actor().await?;

        let mut earnings: Vec<Earning> = self
            .world
            .rides
            .lock()
            .await
            .values()
            .filter(|ride| ride.driver_id == Some(user.id) && ride.status == Status::Completed)
            .filter_map(|ride| {
                ride.completed_at.map(|completed_at| Earning {
                    ride_id: ride.id,
                    pickup: ride.pickup.clone(),
                    destination: ride.destination.clone(),
                    fare: ride.fare,
                    completed_at,
                })
            })
            .collect();

        earnings.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));

        let total = earnings.iter().map(|earning| earning.fare).sum();

        Ok(EarningsSummary { earnings, total })
    }
}

impl API for Session {}

#[tokio::test]
async fn a_fleet_racing_over_a_ride_pool_never_double_assigns() {
    use rand_distr::{Binomial, Distribution};

    use crate::api::RideRequest;
    use crate::entities::PaymentMethod;
    use crate::error::Kind;

    crate::config::init_tracing();

    let sim = Simulation::new();

    let rider_id = sim
        .seed_user(
            User::new("Asha".into(), "asha@example.com".into(), None, Role::Rider),
            "pw",
        )
        .await;

    let mut driver_ids = Vec::new();
    for n in 0..8 {
        let id = sim
            .seed_user(
                User::new(
                    format!("Driver {}", n),
                    format!("driver{}@example.com", n),
                    None,
                    Role::Driver,
                ),
                "pw",
            )
            .await;
        driver_ids.push(id);
    }

    let rider = sim.connect(rider_id);
    let mut ride_ids = Vec::new();
    for n in 0..40 {
        let ride = rider
            .request_ride(RideRequest {
                pickup: format!("Pickup {}", n),
                destination: format!("Drop {}", n),
                payment: PaymentMethod::Cash,
                fare: 50.0 + n as f64,
            })
            .await
            .unwrap();
        ride_ids.push(ride.id);
    }

    let (tx, rx) = async_channel::unbounded::<Uuid>();

    let mut handles = Vec::new();
    for driver_id in &driver_ids {
        let rx = rx.clone();
        let session = sim.connect(*driver_id);

        let handle = tokio::spawn(async move {
            let mut wins = 0usize;

            while let Ok(ride_id) = rx.recv().await {
                // drivers decline a share of offers, like real ones do
                let interested = Binomial::new(1, 0.8)
                    .unwrap()
                    .sample(&mut rand::thread_rng());

                if interested == 0 {
                    continue;
                }

                match session.accept_ride(ride_id).await {
                    Ok(ride) => {
                        assert_eq!(ride.status, Status::Accepted);
                        wins += 1;
                    }
                    Err(err) => {
                        assert_eq!(err.kind(), Kind::Conflict, "losers only ever see conflicts");
                    }
                }
            }

            wins
        });

        handles.push(handle);
    }

    // offer every ride to every driver
    for ride_id in &ride_ids {
        for _ in 0..driver_ids.len() {
            tx.send(*ride_id).await.unwrap();
        }
    }
    drop(tx);

    let wins: usize = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|result| result.unwrap())
        .sum();

    let rides = sim.rides().await;
    let accepted: Vec<&Ride> = rides
        .iter()
        .filter(|ride| ride.status == Status::Accepted)
        .collect();

    assert_eq!(wins, accepted.len(), "every win corresponds to one assignment");

    for ride in &rides {
        match ride.status {
            Status::Accepted => assert!(ride.driver_id.is_some()),
            Status::Requested => assert!(ride.driver_id.is_none()),
            other => panic!("unexpected status in this scenario: {:?}", other),
        }
    }
}

#[tokio::test]
async fn scoped_reads_only_show_what_the_caller_owns() {
    use crate::api::RideRequest;
    use crate::entities::PaymentMethod;
    use crate::error::Kind;

    let sim = Simulation::new();

    let rider_a = sim
        .seed_user(
            User::new("A".into(), "a@example.com".into(), None, Role::Rider),
            "pw",
        )
        .await;
    let rider_b = sim
        .seed_user(
            User::new("B".into(), "b@example.com".into(), None, Role::Rider),
            "pw",
        )
        .await;

    let session_a = sim.connect(rider_a);
    let session_b = sim.connect(rider_b);

    let ride = session_a
        .request_ride(RideRequest {
            pickup: "Shahbagh".into(),
            destination: "Kalabagan".into(),
            payment: PaymentMethod::Card,
            fare: 110.0,
        })
        .await
        .unwrap();

    assert_eq!(session_a.my_rides().await.unwrap().len(), 1);
    assert!(session_b.my_rides().await.unwrap().is_empty());

    // a stranger cannot read someone else's ride detail
    let err = session_b.find_ride(ride.id).await.unwrap_err();
    assert_eq!(err.kind(), Kind::Unauthorized);

    // riders have no access to the driver pool
    let err = session_a.available_rides().await.unwrap_err();
    assert_eq!(err.kind(), Kind::Unauthorized);
}
