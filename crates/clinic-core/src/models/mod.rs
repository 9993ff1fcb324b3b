//! Domain models for the clinic core.

mod activity;
mod billing;
mod booking;
mod inventory;
mod money;
mod patient;
mod pos;
mod service;

pub use activity::*;
pub use billing::*;
pub use booking::*;
pub use inventory::*;
pub use money::*;
pub use patient::*;
pub use pos::*;
pub use service::*;
