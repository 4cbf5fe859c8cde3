use uuid::Uuid;

use super::Engine;
use crate::api::{Credentials, DriverDecision, ProfileUpdate, Registration, UserAPI};
use crate::auth::{gate, Access, IdentityState, Platform};
use crate::entities::{Role, User, Vehicle};
use crate::error::{unauthorized_error, validation_error, Error};

impl Engine {
    /// The current identity, fetched through the cache. Only `invalidate`
    /// calls (login, logout, profile mutation) send the next read back to
    /// the service.
    pub async fn identity(&self) -> Result<Option<User>, Error> {
        match self.identity.snapshot().await {
            IdentityState::Settled(user) => Ok(user),
            IdentityState::Pending => {
                let fetched = self.remote.me().await?;
                self.identity.settle(fetched.clone()).await;

                Ok(fetched)
            }
        }
    }

    /// Route-gate outcome for a protected area, re-evaluated per navigation.
    pub async fn access(&self, allowed: &[Role]) -> Result<Access, Error> {
        let user = self.identity().await?;

        Ok(gate::evaluate(&IdentityState::Settled(user), allowed))
    }

    #[tracing::instrument(skip(self, registration))]
    pub async fn register(&self, registration: Registration) -> Result<(), Error> {
        if registration.name.trim().len() < 3 {
            return Err(validation_error("name must be at least 3 characters"));
        }

        if !registration.email.contains('@') {
            return Err(validation_error("email address is invalid"));
        }

        if registration.password.len() < 6 {
            return Err(validation_error("password must be at least 6 characters"));
        }

        self.remote.register(registration).await
    }

    #[tracing::instrument(skip(self, credentials))]
    pub async fn login(&self, credentials: Credentials) -> Result<User, Error> {
        self.remote.login(credentials).await?;

        // a new principal invalidates everything cached for the old one
        self.identity.invalidate().await;
        self.views.invalidate_rides().await;
        self.views.invalidate_users().await;

        self.identity().await?.ok_or_else(unauthorized_error)
    }

    #[tracing::instrument(skip(self))]
    pub async fn logout(&self) -> Result<(), Error> {
        let result = self.remote.logout().await;

        self.identity.invalidate().await;
        self.views.invalidate_rides().await;
        self.views.invalidate_users().await;

        result
    }

    #[tracing::instrument(skip(self, update))]
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<User, Error> {
        self.require_identity().await?;

        if let Some(name) = &update.name {
            if name.trim().len() < 3 {
                return Err(validation_error("name must be at least 3 characters"));
            }
        }

        let user = self.remote.update_profile(update).await?;
        self.identity.invalidate().await;

        Ok(user)
    }

    #[tracing::instrument(skip(self, old, new))]
    pub async fn change_password(&self, old: String, new: String) -> Result<(), Error> {
        self.require_identity().await?;

        if new.len() < 6 {
            return Err(validation_error("password must be at least 6 characters"));
        }

        self.remote.change_password(old, new).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn toggle_availability(&self) -> Result<User, Error> {
        let user = self.require_identity().await?;
        self.authorize(user, "toggle_availability", Platform)?;

        let updated = self.remote.toggle_availability().await?;
        self.identity.invalidate().await;

        Ok(updated)
    }

    #[tracing::instrument(skip(self, vehicle))]
    pub async fn become_driver(&self, vehicle: Vehicle) -> Result<User, Error> {
        let user = self.require_identity().await?;
        self.authorize(user, "become_driver", Platform)?;

        if vehicle.model.trim().is_empty() || vehicle.plate.trim().is_empty() {
            return Err(validation_error("vehicle model and plate are required"));
        }

        let updated = self.remote.become_driver(vehicle).await?;
        self.identity.invalidate().await;

        Ok(updated)
    }

    #[tracing::instrument(skip(self))]
    pub async fn approve_driver(
        &self,
        user_id: Uuid,
        decision: DriverDecision,
    ) -> Result<User, Error> {
        let user = self.require_identity().await?;
        self.authorize(user, "manage_users", Platform)?;

        let updated = self.remote.approve_driver(user_id, decision).await?;
        self.views.invalidate_users().await;

        Ok(updated)
    }

    #[tracing::instrument(skip(self))]
    pub async fn toggle_block(&self, user_id: Uuid) -> Result<User, Error> {
        let user = self.require_identity().await?;
        self.authorize(user, "manage_users", Platform)?;

        let updated = self.remote.toggle_block(user_id).await?;
        self.views.invalidate_users().await;

        Ok(updated)
    }

    pub async fn list_users(&self) -> Result<Vec<User>, Error> {
        let user = self.require_identity().await?;
        self.authorize(user, "manage_users", Platform)?;

        if let Some(cached) = self.views.users().await {
            return Ok(cached);
        }

        let fresh = self.remote.all_users().await?;
        self.views.put_users(fresh.clone()).await;

        Ok(fresh)
    }
}

#[tokio::test]
async fn login_settles_a_fresh_identity() {
    use super::ride_api::fixtures::{engine_for, seed_world};

    let world = seed_world().await;
    let engine = Engine::new(std::sync::Arc::new(world.sim.guest()) as crate::api::DynAPI);

    // nobody is signed in: the gate redirects
    assert_eq!(engine.access(&[Role::Rider]).await.unwrap(), Access::SignedOut);

    let user = engine
        .login(Credentials {
            email: "asha@example.com".into(),
            password: "pw-rider".into(),
        })
        .await
        .unwrap();
    assert_eq!(user.id, world.rider);

    assert_eq!(
        engine.access(&[Role::Rider]).await.unwrap(),
        Access::Granted(Role::Rider)
    );
    assert_eq!(engine.access(&[Role::Admin]).await.unwrap(), Access::Denied);

    engine.logout().await.unwrap();
    assert_eq!(engine.access(&[Role::Rider]).await.unwrap(), Access::SignedOut);

    let other = engine_for(&world.sim, world.rider);
    assert!(other.identity().await.unwrap().is_some());
}

#[tokio::test]
async fn bad_credentials_do_not_sign_anyone_in() {
    use super::ride_api::fixtures::seed_world;
    use crate::error::Kind;

    let world = seed_world().await;
    let engine = Engine::new(std::sync::Arc::new(world.sim.guest()) as crate::api::DynAPI);

    let err = engine
        .login(Credentials {
            email: "asha@example.com".into(),
            password: "wrong".into(),
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), Kind::Unauthorized);
    assert!(engine.identity().await.unwrap().is_none());
}

#[tokio::test]
async fn the_driver_approval_workflow_promotes_a_rider() {
    use super::ride_api::fixtures::{engine_for, seed_world};
    use crate::entities::{Availability, DriverRequestStatus, VehicleType};

    let world = seed_world().await;
    let rider = engine_for(&world.sim, world.rider);
    let admin = engine_for(&world.sim, world.admin);

    let vehicle = Vehicle {
        kind: VehicleType::Cng,
        model: "Bajaj RE".into(),
        plate: "DH-4455".into(),
    };

    let applied = rider.become_driver(vehicle).await.unwrap();
    assert_eq!(
        applied.driver_request.as_ref().unwrap().status,
        DriverRequestStatus::Pending
    );
    assert_eq!(applied.role, Role::Rider);

    let approved = admin
        .approve_driver(world.rider, DriverDecision::Approve)
        .await
        .unwrap();
    assert_eq!(approved.role, Role::Driver);
    assert_eq!(approved.availability, Some(Availability::Offline));

    // the rider's next identity read reflects the promotion
    let fresh = rider.identity().await.unwrap().unwrap();
    assert_eq!(fresh.role, Role::Driver);

    let online = rider.toggle_availability().await.unwrap();
    assert_eq!(online.availability, Some(Availability::Online));
}

#[tokio::test]
async fn admin_only_operations_reject_other_roles() {
    use super::ride_api::fixtures::{engine_for, seed_world};
    use crate::error::Kind;

    let world = seed_world().await;
    let rider = engine_for(&world.sim, world.rider);
    let admin = engine_for(&world.sim, world.admin);

    let err = rider.list_users().await.unwrap_err();
    assert_eq!(err.kind(), Kind::Unauthorized);

    let err = rider.toggle_block(world.driver_a).await.unwrap_err();
    assert_eq!(err.kind(), Kind::Unauthorized);

    let users = admin.list_users().await.unwrap();
    assert_eq!(users.len(), 4);

    let blocked = admin.toggle_block(world.driver_a).await.unwrap();
    assert!(blocked.blocked);

    let unblocked = admin.toggle_block(world.driver_a).await.unwrap();
    assert!(!unblocked.blocked);
}

#[tokio::test]
async fn profile_mutations_invalidate_the_cached_identity() {
    use super::ride_api::fixtures::{engine_for, seed_world};

    let world = seed_world().await;
    let engine = engine_for(&world.sim, world.rider);

    // warm the cache
    assert_eq!(engine.identity().await.unwrap().unwrap().name, "Asha");

    engine
        .update_profile(ProfileUpdate {
            name: Some("Asha Rahman".into()),
            phone: Some("01700000000".into()),
        })
        .await
        .unwrap();

    let fresh = engine.identity().await.unwrap().unwrap();
    assert_eq!(fresh.name, "Asha Rahman");
    assert_eq!(fresh.phone.as_deref(), Some("01700000000"));
}

#[tokio::test]
async fn registration_is_validated_before_the_wire() {
    use super::ride_api::fixtures::seed_world;
    use crate::error::Kind;

    let world = seed_world().await;
    let engine = Engine::new(std::sync::Arc::new(world.sim.guest()) as crate::api::DynAPI);

    let base = Registration {
        name: "Nadia".into(),
        email: "nadia@example.com".into(),
        phone: None,
        password: "secret1".into(),
        role: Role::Rider,
    };

    let err = engine
        .register(Registration {
            email: "not-an-email".into(),
            ..base.clone()
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), Kind::Validation);

    let err = engine
        .register(Registration {
            password: "ab".into(),
            ..base.clone()
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), Kind::Validation);

    engine.register(base.clone()).await.unwrap();

    // duplicate email is refused by the service
    let err = engine.register(base).await.unwrap_err();
    assert_eq!(err.kind(), Kind::Validation);
}
