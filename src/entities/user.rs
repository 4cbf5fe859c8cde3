use chrono::{DateTime, Utc};
use oso::PolarClass;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{invalid_transition_error, Error};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
    pub blocked: bool,
    pub availability: Option<Availability>,
    pub vehicle: Option<Vehicle>,
    pub driver_request: Option<DriverRequest>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Rider,
    Driver,
    Admin,
}

impl Role {
    pub fn name(&self) -> String {
        match self {
            Self::Rider => "rider".into(),
            Self::Driver => "driver".into(),
            Self::Admin => "admin".into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Availability {
    Online,
    Offline,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Vehicle {
    pub kind: VehicleType,
    pub model: String,
    pub plate: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleType {
    Car,
    Bike,
    Cng,
    Auto,
}

/// Approval sub-workflow gating a rider's promotion to driver.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DriverRequest {
    pub status: DriverRequestStatus,
    pub vehicle: Vehicle,
    pub requested_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverRequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl User {
    pub fn new(name: String, email: String, phone: Option<String>, role: Role) -> Self {
        let now = Utc::now();
        let availability = match role {
            Role::Driver => Some(Availability::Offline),
            _ => None,
        };

        Self {
            id: Uuid::new_v4(),
            name,
            email,
            phone,
            role,
            blocked: false,
            availability,
            vehicle: None,
            driver_request: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_role(&self, role: String) -> bool {
        self.role.name() == role
    }

    fn id_equals(&self, id: Uuid) -> bool {
        self.id == id
    }

    fn id_equals_nullable_id(&self, optional_id: Option<Uuid>) -> bool {
        if let Some(id) = optional_id {
            if self.id == id {
                return true;
            }
        }

        false
    }

    pub fn has_pending_driver_request(&self) -> bool {
        matches!(
            &self.driver_request,
            Some(request) if request.status == DriverRequestStatus::Pending
        )
    }

    /// Open an approval request. Only riders without an open request may
    /// apply; a rejected applicant may apply again.
    #[tracing::instrument]
    pub fn request_driver(&mut self, vehicle: Vehicle) -> Result<(), Error> {
        if self.role != Role::Rider || self.has_pending_driver_request() {
            return Err(invalid_transition_error());
        }

        self.driver_request = Some(DriverRequest {
            status: DriverRequestStatus::Pending,
            vehicle,
            requested_at: Utc::now(),
            approved_at: None,
        });
        self.touch();

        Ok(())
    }

    /// Settle a pending request. Approval promotes the role, installs the
    /// requested vehicle and starts the driver offline.
    #[tracing::instrument]
    pub fn resolve_driver_request(&mut self, approve: bool) -> Result<(), Error> {
        let request = match &mut self.driver_request {
            Some(request) if request.status == DriverRequestStatus::Pending => request,
            _ => return Err(invalid_transition_error()),
        };

        if approve {
            request.status = DriverRequestStatus::Approved;
            request.approved_at = Some(Utc::now());

            let vehicle = request.vehicle.clone();
            self.role = Role::Driver;
            self.vehicle = Some(vehicle);
            self.availability = Some(Availability::Offline);
        } else {
            request.status = DriverRequestStatus::Rejected;
        }

        self.touch();

        Ok(())
    }

    #[tracing::instrument]
    pub fn toggle_availability(&mut self) -> Result<Availability, Error> {
        if self.role != Role::Driver {
            return Err(invalid_transition_error());
        }

        let flipped = match self.availability {
            Some(Availability::Online) => Availability::Offline,
            _ => Availability::Online,
        };

        self.availability = Some(flipped);
        self.touch();

        Ok(flipped)
    }

    #[tracing::instrument]
    pub fn toggle_block(&mut self) {
        self.blocked = !self.blocked;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl PolarClass for User {
    fn get_polar_class_builder() -> oso::ClassBuilder<User> {
        oso::Class::builder()
            .name("User")
            .add_attribute_getter("id", |recv: &User| recv.id.clone())
            .add_attribute_getter("blocked", |recv: &User| recv.blocked)
            .add_method("has_role", User::has_role)
            .add_method("id_equals", User::id_equals)
            .add_method("id_equals_nullable_id", User::id_equals_nullable_id)
    }

    fn get_polar_class() -> oso::Class {
        let builder = User::get_polar_class_builder();
        builder.build()
    }
}

#[test]
fn driver_request_flow_promotes_the_role_on_approval() {
    let vehicle = Vehicle {
        kind: VehicleType::Car,
        model: "Axio".into(),
        plate: "DH-1234".into(),
    };

    let mut user = User::new("Asha".into(), "asha@example.com".into(), None, Role::Rider);

    user.request_driver(vehicle.clone()).unwrap();
    assert!(user.has_pending_driver_request());

    // a second open request is refused
    assert!(user.request_driver(vehicle).is_err());

    user.resolve_driver_request(true).unwrap();
    assert_eq!(user.role, Role::Driver);
    assert!(user.vehicle.is_some());
    assert_eq!(user.availability, Some(Availability::Offline));

    let request = user.driver_request.as_ref().unwrap();
    assert_eq!(request.status, DriverRequestStatus::Approved);
    assert!(request.approved_at.is_some());

    // nothing left to settle
    assert!(user.resolve_driver_request(true).is_err());
}

#[test]
fn rejected_applicants_may_apply_again() {
    let vehicle = Vehicle {
        kind: VehicleType::Bike,
        model: "CB150".into(),
        plate: "DH-7777".into(),
    };

    let mut user = User::new("Rafi".into(), "rafi@example.com".into(), None, Role::Rider);

    user.request_driver(vehicle.clone()).unwrap();
    user.resolve_driver_request(false).unwrap();
    assert_eq!(user.role, Role::Rider);
    assert!(user.vehicle.is_none());

    user.request_driver(vehicle).unwrap();
    assert!(user.has_pending_driver_request());
}

#[test]
fn availability_only_toggles_for_drivers() {
    let mut rider = User::new("Mita".into(), "mita@example.com".into(), None, Role::Rider);
    assert!(rider.toggle_availability().is_err());

    let mut driver = User::new("Karim".into(), "karim@example.com".into(), None, Role::Driver);
    assert_eq!(driver.toggle_availability().unwrap(), Availability::Online);
    assert_eq!(driver.toggle_availability().unwrap(), Availability::Offline);
}
