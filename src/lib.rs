//! Attendance sidecar for a single event: staff log in, mark participants
//! present or absent for a day, and the marks are reconciled into a hosted
//! record table.
//!
//! The UI shell drives [`ipc::handle_request`] one JSON line at a time; see
//! `main.rs` for the stdio loop.

pub mod config;
pub mod controller;
pub mod db;
pub mod ipc;
pub mod model;
pub mod reconcile;
pub mod remote;
pub mod session;
pub mod store;
