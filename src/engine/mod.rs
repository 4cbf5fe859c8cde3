mod ride_api;
mod user_api;

use std::collections::HashSet;
use std::sync::Mutex;

use oso::Oso;
use uuid::Uuid;

use crate::api::DynAPI;
use crate::auth::{authorizor, IdentityCache};
use crate::cache::ViewCache;
use crate::entities::User;
use crate::error::{ride_busy_error, signed_out_error, unauthorized_error, unexpected_error, Error};

/// Session-scoped controller: wraps the remote service, gates every action
/// through the authorization policy, and keeps the identity and list caches
/// consistent with what the service last confirmed.
pub struct Engine {
    remote: DynAPI,
    authorizor: Oso,
    identity: IdentityCache,
    views: ViewCache,
    inflight: Mutex<HashSet<Uuid>>,
}

impl Engine {
    pub fn new(remote: DynAPI) -> Self {
        Self {
            remote,
            authorizor: authorizor::new(),
            identity: IdentityCache::new(),
            views: ViewCache::new(),
            inflight: Mutex::new(HashSet::new()),
        }
    }

    pub fn authorize<Actor, Action, Resource>(
        &self,
        actor: Actor,
        action: Action,
        resource: Resource,
    ) -> Result<(), Error>
    where
        Actor: oso::ToPolar,
        Action: oso::ToPolar,
        Resource: oso::ToPolar,
    {
        if self.authorizor.is_allowed(actor, action, resource)? {
            return Ok(());
        }

        Err(unauthorized_error())
    }

    pub(crate) async fn require_identity(&self) -> Result<User, Error> {
        match self.identity().await? {
            Some(user) => Ok(user),
            None => Err(signed_out_error()),
        }
    }

    /// Whether a transition for this ride is still waiting on the service.
    /// The UI disables the ride's action control while this is true.
    pub fn is_busy(&self, ride_id: Uuid) -> bool {
        self.inflight
            .lock()
            .map(|set| set.contains(&ride_id))
            .unwrap_or(false)
    }

    /// Serializes transitions per ride: a second action for the same ride is
    /// refused while the first is in flight. Independent rides are not
    /// ordered relative to each other.
    pub(crate) fn begin_transition(&self, ride_id: Uuid) -> Result<TransitionGuard<'_>, Error> {
        let mut inflight = self.inflight.lock().map_err(|_| unexpected_error())?;

        if !inflight.insert(ride_id) {
            return Err(ride_busy_error());
        }

        Ok(TransitionGuard {
            engine: self,
            ride_id,
        })
    }
}

pub(crate) struct TransitionGuard<'a> {
    engine: &'a Engine,
    ride_id: Uuid,
}

impl std::fmt::Debug for TransitionGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitionGuard")
            .field("ride_id", &self.ride_id)
            .finish()
    }
}

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut inflight) = self.engine.inflight.lock() {
            inflight.remove(&self.ride_id);
        }
    }
}
