use tokio::sync::RwLock;

use crate::entities::User;

/// The fetched identity, shared by everything behind the session. `Pending`
/// means the next read must go to the remote service; `Settled(None)` means
/// the service answered and nobody is signed in.
#[derive(Clone, Debug)]
pub enum IdentityState {
    Pending,
    Settled(Option<User>),
}

/// Explicitly-invalidated cache for the current identity. `invalidate` is
/// the single entry point, called on login, logout and profile mutation;
/// nothing else may flip the state back to `Pending`.
#[derive(Debug)]
pub struct IdentityCache {
    state: RwLock<IdentityState>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(IdentityState::Pending),
        }
    }

    pub async fn snapshot(&self) -> IdentityState {
        self.state.read().await.clone()
    }

    pub async fn settle(&self, user: Option<User>) {
        *self.state.write().await = IdentityState::Settled(user);
    }

    pub async fn invalidate(&self) {
        *self.state.write().await = IdentityState::Pending;
    }

    pub async fn current(&self) -> Option<User> {
        match &*self.state.read().await {
            IdentityState::Settled(user) => user.clone(),
            IdentityState::Pending => None,
        }
    }
}

impl Default for IdentityCache {
    fn default() -> Self {
        Self::new()
    }
}

#[test]
fn invalidation_returns_the_cache_to_pending() {
    use crate::entities::Role;

    tokio_test::block_on(async {
        let cache = IdentityCache::new();
        assert!(matches!(cache.snapshot().await, IdentityState::Pending));

        let user = User::new("Asha".into(), "asha@example.com".into(), None, Role::Rider);
        cache.settle(Some(user.clone())).await;
        assert_eq!(cache.current().await.unwrap().id, user.id);

        cache.invalidate().await;
        assert!(matches!(cache.snapshot().await, IdentityState::Pending));
        assert!(cache.current().await.is_none());

        cache.settle(None).await;
        assert!(matches!(cache.snapshot().await, IdentityState::Settled(None)));
    });
}
