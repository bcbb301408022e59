//! Repository layer: tenant-scoped database operations.
//!
//! Every reminder read or write carries the pharmacy id and filters on the
//! owning therapy, so one pharmacy can never touch another's rows.

mod reminder;
mod therapy;

pub use reminder::*;
pub use therapy::*;
