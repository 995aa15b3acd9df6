//! RALLY — racing-club manager
//!
//! Teams, cars and budgets in SQLite, a noisy race simulation with
//! prize-money settlement, and a small web dashboard. The library crate
//! exposes every module to the binary entry point and integration tests.

pub mod config;
pub mod types;
pub mod engine;
pub mod storage;
pub mod dashboard;
