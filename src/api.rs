use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::{
    EarningsSummary, PaymentMethod, Ride, RideDetail, Role, Status, User, Vehicle,
};
use crate::error::Error;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub password: String,
    pub role: Role,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverDecision {
    Approve,
    Reject,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RideRequest {
    pub pickup: String,
    pub destination: String,
    pub payment: PaymentMethod,
    pub fare: f64,
}

/// Account, profile and administration calls. The remote service owns every
/// record; these are the only ways to touch one.
#[async_trait]
pub trait UserAPI {
    async fn register(&self, registration: Registration) -> Result<(), Error>;
    async fn login(&self, credentials: Credentials) -> Result<(), Error>;
    async fn logout(&self) -> Result<(), Error>;
    /// `Ok(None)` means the identity settled as signed-out, which is not an
    /// error; transport failures still surface as `Err`.
    async fn me(&self) -> Result<Option<User>, Error>;
    async fn update_profile(&self, update: ProfileUpdate) -> Result<User, Error>;
    async fn change_password(&self, old: String, new: String) -> Result<(), Error>;
    async fn toggle_availability(&self) -> Result<User, Error>;
    async fn become_driver(&self, vehicle: Vehicle) -> Result<User, Error>;
    async fn approve_driver(&self, user_id: Uuid, decision: DriverDecision) -> Result<User, Error>;
    async fn toggle_block(&self, user_id: Uuid) -> Result<User, Error>;
    async fn all_users(&self) -> Result<Vec<User>, Error>;
}

/// Ride lifecycle calls. Cancellation travels as
/// `update_status(Status::Cancelled)`; there is no dedicated endpoint.
#[async_trait]
pub trait RideAPI {
    async fn request_ride(&self, request: RideRequest) -> Result<Ride, Error>;
    async fn my_rides(&self) -> Result<Vec<Ride>, Error>;
    async fn available_rides(&self) -> Result<Vec<Ride>, Error>;
    async fn driver_rides(&self) -> Result<Vec<Ride>, Error>;
    async fn all_rides(&self) -> Result<Vec<Ride>, Error>;
    async fn find_ride(&self, id: Uuid) -> Result<RideDetail, Error>;
    async fn accept_ride(&self, id: Uuid) -> Result<Ride, Error>;
    async fn update_status(&self, id: Uuid, status: Status) -> Result<Ride, Error>;
    async fn earnings(&self) -> Result<EarningsSummary, Error>;
}

pub trait API: UserAPI + RideAPI {}

pub type DynAPI = Arc<dyn API + Send + Sync>;
