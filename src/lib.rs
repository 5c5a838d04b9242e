//! Small monitor that measures how long a chosen set of applications stays in the foreground.
//! It polls the running processes once a second, keeps the statuses of the watched
//! applications in sync with them and counts productive and total time for the session.
//!

pub mod cli;
pub mod monitor;
pub mod process_api;
pub mod utils;
