pub mod authorizor;
pub mod gate;
pub mod identity;
mod platform;

pub use gate::Access;
pub use identity::{IdentityCache, IdentityState};
pub use platform::Platform;
