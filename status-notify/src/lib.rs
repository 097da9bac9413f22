//! status-notify library crate.
//!
//! Dispatches status events (outages, incidents, maintenance windows, SLO
//! breaches) to notification providers such as Slack, Discord, Microsoft
//! Teams, PagerDuty, generic webhooks and email.

pub mod config;
pub mod error;
pub mod logging;
pub mod notification;
pub mod utils;

pub use error::{Error, Result};
