//! Blue/green HTTP gateway.
//!
//! Routes each inbound request to the currently active environment of a
//! logical service, and lets operators switch, add, remove or replace
//! services at runtime without dropping in-flight traffic.

pub mod admin;
pub mod backend;
pub mod cli;
pub mod config;
pub mod proxy;
