//! Booking intake validation, slot allocation and the service catalogue.

mod allocator;
mod intake;
mod services;

pub use allocator::*;
pub use intake::*;
pub use services::*;
