//! Background job coordination.
//!
//! [`JobCoordinator`] is an in-process registry of running job keys that
//! turns a second request for the same key into a polite "already running".
//! [`BackgroundRunner`] executes detached work on a bounded number of
//! concurrent tasks.

mod coordinator;
mod runner;

pub use coordinator::{JobCoordinator, JobGuard, JobKey};
pub use runner::BackgroundRunner;
