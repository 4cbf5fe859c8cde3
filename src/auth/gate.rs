use crate::auth::IdentityState;
use crate::entities::Role;

/// Outcome of routing into a role-protected area. `Denied` renders the
/// unauthorized view in place (the URL is preserved); only `SignedOut`
/// redirects, and only `Loading` suspends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Loading,
    SignedOut,
    Denied,
    Granted(Role),
}

/// Pure function of the current identity state; callers re-evaluate it on
/// every navigation rather than caching the outcome across routes. An empty
/// allow-list admits any signed-in role.
pub fn evaluate(identity: &IdentityState, allowed: &[Role]) -> Access {
    match identity {
        IdentityState::Pending => Access::Loading,
        IdentityState::Settled(None) => Access::SignedOut,
        IdentityState::Settled(Some(user)) => {
            if allowed.is_empty() || allowed.contains(&user.role) {
                Access::Granted(user.role)
            } else {
                Access::Denied
            }
        }
    }
}

#[test]
fn pending_identity_suspends_instead_of_redirecting() {
    assert_eq!(evaluate(&IdentityState::Pending, &[Role::Rider]), Access::Loading);
}

#[test]
fn settled_absence_redirects_to_sign_in() {
    assert_eq!(
        evaluate(&IdentityState::Settled(None), &[Role::Rider]),
        Access::SignedOut
    );
}

#[test]
fn a_driver_is_denied_the_admin_area_without_a_redirect() {
    use crate::entities::User;

    let driver = User::new("d".into(), "d@example.com".into(), None, Role::Driver);
    let state = IdentityState::Settled(Some(driver));

    assert_eq!(evaluate(&state, &[Role::Admin]), Access::Denied);
    assert_eq!(evaluate(&state, &[Role::Driver]), Access::Granted(Role::Driver));
    assert_eq!(
        evaluate(&state, &[Role::Admin, Role::Driver]),
        Access::Granted(Role::Driver)
    );
}

#[test]
fn an_empty_allow_list_admits_any_signed_in_role() {
    use crate::entities::User;

    let admin = User::new("a".into(), "a@example.com".into(), None, Role::Admin);
    let state = IdentityState::Settled(Some(admin));

    assert_eq!(evaluate(&state, &[]), Access::Granted(Role::Admin));
}
