//! Mileage Core Library
//!
//! Shared functionality for Mileage components:
//! - Data model for accrual requests, ledger entries and member profiles
//! - Configuration resolution and startup validation
//! - Common error types
//! - Tracing initialisation

pub mod config;
pub mod error;
pub mod models;
pub mod tracing_init;

pub use config::{AppEnvironment, Config};
pub use error::{Error, Result};
pub use models::{
    AccrualRequest, AccrualRequestForm, AccrualStatus, EntityId, MileageLedgerEntry, Page,
    Profile, Tier,
};
