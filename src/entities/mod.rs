mod earnings;
mod quote;
mod ride;
mod user;

pub use earnings::{Earning, EarningsReport, EarningsSummary};
pub use quote::{FareSchedule, Quote};
pub use ride::{
    Contact, Page, PaymentMethod, Ride, RideDetail, RideEvent, RideFilter, SortDirection,
    SortField, Status,
};
pub use user::{Availability, DriverRequest, DriverRequestStatus, Role, User, Vehicle, VehicleType};
