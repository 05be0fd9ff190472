//! Watchpost library
//!
//! A small server-rendered web application with session login and
//! diagnostic endpoints for exercising a monitoring pipeline.
//! The binary entry point is in main.rs.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod faults;
pub mod health;
pub mod server;
pub mod telemetry;
pub mod web;
