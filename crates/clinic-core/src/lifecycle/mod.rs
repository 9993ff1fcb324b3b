//! Booking lifecycle: the state machine, the records an accepted booking
//! creates, patient matching and outbound notifications.

mod machine;
mod matching;
mod notify;
mod records;

pub use machine::*;
pub use matching::*;
pub use notify::*;
pub use records::*;
