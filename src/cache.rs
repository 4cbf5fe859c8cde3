use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::entities::{EarningsSummary, Ride, User};

/// The list views a ride can appear in. Any ride mutation invalidates all of
/// them, since the client cannot know which scopes the affected ride is
/// visible from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RideScope {
    Available,
    Mine,
    Driver,
    All,
}

/// Fetched list views, held only until the next mutation. The policy is
/// invalidate-on-mutation: a successful write clears every view that could
/// contain the written record, and the next read goes back to the service.
#[derive(Debug, Default)]
pub struct ViewCache {
    rides: Mutex<HashMap<RideScope, Vec<Ride>>>,
    users: Mutex<Option<Vec<User>>>,
    earnings: Mutex<Option<EarningsSummary>>,
}

impl ViewCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn rides(&self, scope: RideScope) -> Option<Vec<Ride>> {
        self.rides.lock().await.get(&scope).cloned()
    }

    pub async fn put_rides(&self, scope: RideScope, rides: Vec<Ride>) {
        self.rides.lock().await.insert(scope, rides);
    }

    pub async fn users(&self) -> Option<Vec<User>> {
        self.users.lock().await.clone()
    }

    pub async fn put_users(&self, users: Vec<User>) {
        *self.users.lock().await = Some(users);
    }

    pub async fn earnings(&self) -> Option<EarningsSummary> {
        self.earnings.lock().await.clone()
    }

    pub async fn put_earnings(&self, summary: EarningsSummary) {
        *self.earnings.lock().await = Some(summary);
    }

    /// Earnings are derived from the ride set, so they go stale together.
    pub async fn invalidate_rides(&self) {
        self.rides.lock().await.clear();
        *self.earnings.lock().await = None;
    }

    pub async fn invalidate_users(&self) {
        *self.users.lock().await = None;
    }
}

#[tokio::test]
async fn ride_mutations_clear_every_ride_scope_and_earnings() {
    use crate::entities::{PaymentMethod, Ride};
    use uuid::Uuid;

    let cache = ViewCache::new();
    let ride = Ride::new(
        Uuid::new_v4(),
        "a".into(),
        "b".into(),
        50.0,
        PaymentMethod::Cash,
    );

    cache.put_rides(RideScope::Available, vec![ride.clone()]).await;
    cache.put_rides(RideScope::Mine, vec![ride]).await;
    cache
        .put_earnings(EarningsSummary {
            earnings: vec![],
            total: 0.0,
        })
        .await;

    assert!(cache.rides(RideScope::Available).await.is_some());

    cache.invalidate_rides().await;

    assert!(cache.rides(RideScope::Available).await.is_none());
    assert!(cache.rides(RideScope::Mine).await.is_none());
    assert!(cache.earnings().await.is_none());
}
