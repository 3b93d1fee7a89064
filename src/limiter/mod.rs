//! Per-client admission control.
//!
//! - [`ClientTable`]: mutex-guarded identity → `governor` limiter registry
//!   with an owned idle-entry sweeper
//! - [`Clock`]: injectable time source ([`SystemClock`] in production,
//!   [`ManualClock`] in tests), shared with each limiter via [`LimiterClock`]

pub mod clock;
pub mod table;

pub use clock::{Clock, LimiterClock, ManualClock, SystemClock};
pub use table::{Admission, ClientTable, ClientTableConfig};
