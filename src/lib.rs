#![doc = "The `taskdesk` library crate."]
#![doc = ""]
#![doc = "Core of the taskdesk task-management service: domain models, the"]
#![doc = "authentication stack (bcrypt passwords, dual-secret JWTs, request"]
#![doc = "middleware), two interchangeable storage engines behind the `Database`"]
#![doc = "trait, and the HTTP route handlers. The binary in `main.rs` wires these"]
#![doc = "together into a running server."]

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod rate_limit;
pub mod routes;
pub mod store;

pub use crate::config::Config;
pub use crate::error::AppError;
