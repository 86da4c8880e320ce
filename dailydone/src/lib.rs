//! `DailyDone` client data layer: HTTP adapter, list synchronization and
//! errand actions.

pub mod actions;
pub mod config;
pub mod http;
pub mod sync;
