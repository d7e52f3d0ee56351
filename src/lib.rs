//! # EVLink - vehicle telematics bridge
//!
//! Polls the EVLink backend for the account's user info and the selected
//! vehicle's status, merges push webhook payloads into the cached vehicle
//! state, projects both snapshots into presentable entities and forwards
//! start/stop charging commands.
//!
//! ## Architecture
//!
//! - `config`: YAML configuration management and validation
//! - `logging`: Structured logging and tracing
//! - `notify`: Operator notifications
//! - `api`: EVLink backend HTTP client
//! - `coordinator`: Polling coordinator holding the last good snapshot
//! - `merge`: Two-level merge of push payloads
//! - `webhook`: Push webhook handler
//! - `entities`: Declarative field table and entity projections
//! - `setup`: Setup wizard, reconfigure and options flows
//! - `form_schema`: Form descriptions for the wizard steps
//! - `integration`: One activated entry (client, coordinators, webhook)
//! - `hub`: Entry lifecycle and activation retries
//! - `web`: HTTP server and REST API

pub mod api;
pub mod config;
pub mod coordinator;
pub mod entities;
pub mod error;
pub mod form_schema;
pub mod hub;
pub mod integration;
pub mod logging;
pub mod merge;
pub mod notify;
pub mod setup;
#[cfg(feature = "web")]
pub mod web;
pub mod webhook;

#[cfg(test)]
mod config_tests;

// Re-export commonly used types
pub use config::Config;
pub use error::{EvlinkError, Result};
pub use hub::Hub;
