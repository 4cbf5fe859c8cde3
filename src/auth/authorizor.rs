use oso::{Oso, PolarClass};

use crate::auth::Platform;
use crate::entities::{Ride, User};

pub fn new() -> Oso {
    let mut o = Oso::new();

    o.register_class(Platform::get_polar_class()).unwrap();
    o.register_class(User::get_polar_class()).unwrap();
    o.register_class(Ride::get_polar_class()).unwrap();

    o.load_str(include_str!("rules.polar")).unwrap();

    o
}

#[test]
fn riders_book_rides_and_drivers_do_not() {
    use crate::entities::Role;

    let authorizor = new();

    let rider = User::new("r".into(), "r@example.com".into(), None, Role::Rider);
    let driver = User::new("d".into(), "d@example.com".into(), None, Role::Driver);

    let result = authorizor.is_allowed(rider.clone(), "request_ride", Platform);
    assert_eq!(result.unwrap(), true);

    let result = authorizor.is_allowed(driver.clone(), "request_ride", Platform);
    assert_eq!(result.unwrap(), false);

    let result = authorizor.is_allowed(driver.clone(), "list_available", Platform);
    assert_eq!(result.unwrap(), true);

    let result = authorizor.is_allowed(rider.clone(), "list_available", Platform);
    assert_eq!(result.unwrap(), false);
}

#[test]
fn blocked_users_lose_every_mutating_permission() {
    use crate::entities::{PaymentMethod, Ride, Role};
    use uuid::Uuid;

    let authorizor = new();

    let mut driver = User::new("d".into(), "d@example.com".into(), None, Role::Driver);
    driver.toggle_block();

    let ride = Ride::new(
        Uuid::new_v4(),
        "12 Main St".into(),
        "99 Oak Ave".into(),
        135.0,
        PaymentMethod::Cash,
    );

    let result = authorizor.is_allowed(driver.clone(), "accept", ride.clone());
    assert_eq!(result.unwrap(), false);

    let result = authorizor.is_allowed(driver.clone(), "list_available", Platform);
    assert_eq!(result.unwrap(), false);

    let result = authorizor.is_allowed(driver.clone(), "toggle_availability", Platform);
    assert_eq!(result.unwrap(), false);
}

#[test]
fn drivers_accept_only_requested_rides_and_advance_only_their_own() {
    use crate::entities::{PaymentMethod, Ride, Role};
    use uuid::Uuid;

    let authorizor = new();

    let driver = User::new("d".into(), "d@example.com".into(), None, Role::Driver);
    let other = User::new("o".into(), "o@example.com".into(), None, Role::Driver);

    let mut ride = Ride::new(
        Uuid::new_v4(),
        "12 Main St".into(),
        "99 Oak Ave".into(),
        135.0,
        PaymentMethod::Cash,
    );

    // before acceptance

    let result = authorizor.is_allowed(driver.clone(), "accept", ride.clone());
    assert_eq!(result.unwrap(), true);

    let result = authorizor.is_allowed(driver.clone(), "advance", ride.clone());
    assert_eq!(result.unwrap(), false);

    ride.accept(driver.id).unwrap();

    // after acceptance

    let result = authorizor.is_allowed(other.clone(), "accept", ride.clone());
    assert_eq!(result.unwrap(), false);

    let result = authorizor.is_allowed(driver.clone(), "advance", ride.clone());
    assert_eq!(result.unwrap(), true);

    let result = authorizor.is_allowed(other.clone(), "advance", ride.clone());
    assert_eq!(result.unwrap(), false);

    let result = authorizor.is_allowed(driver.clone(), "cancel", ride.clone());
    assert_eq!(result.unwrap(), true);
}

#[test]
fn riders_read_and_cancel_their_own_rides_only() {
    use crate::entities::{PaymentMethod, Ride, Role};
    use uuid::Uuid;

    let authorizor = new();

    let rider = User::new("r".into(), "r@example.com".into(), None, Role::Rider);
    let stranger = User::new("s".into(), "s@example.com".into(), None, Role::Rider);
    let admin = User::new("a".into(), "a@example.com".into(), None, Role::Admin);

    let ride = Ride::new(
        rider.id,
        "12 Main St".into(),
        "99 Oak Ave".into(),
        135.0,
        PaymentMethod::Card,
    );

    let result = authorizor.is_allowed(rider.clone(), "read", ride.clone());
    assert_eq!(result.unwrap(), true);

    let result = authorizor.is_allowed(rider.clone(), "cancel", ride.clone());
    assert_eq!(result.unwrap(), true);

    let result = authorizor.is_allowed(stranger.clone(), "read", ride.clone());
    assert_eq!(result.unwrap(), false);

    let result = authorizor.is_allowed(stranger.clone(), "cancel", ride.clone());
    assert_eq!(result.unwrap(), false);

    let result = authorizor.is_allowed(admin.clone(), "read", ride.clone());
    assert_eq!(result.unwrap(), true);

    let result = authorizor.is_allowed(admin.clone(), "list_all", Platform);
    assert_eq!(result.unwrap(), true);

    let result = authorizor.is_allowed(rider, "list_all", Platform);
    assert_eq!(result.unwrap(), false);
}
