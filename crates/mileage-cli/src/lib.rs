//! Mileage CLI Library
//!
//! Terminal front-end for the loyalty program: the operator review portal
//! (`admin`) and the member app (`member`), sharing login, configuration and
//! the API client.

pub mod admin_cmd;
pub mod auth_cmd;
pub mod config;
pub mod context;
pub mod fmt;
pub mod listing;
pub mod member_cmd;
pub mod notifier;
pub mod upload_cmd;
