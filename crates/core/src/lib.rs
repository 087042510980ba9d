//! Shared data model for neural forecasting jobs.
//!
//! Defines the job identity, status and snapshot types that the polling
//! client, the state store and the command-line tracker all exchange.

pub mod error;
pub mod job;
pub mod job_status;
pub mod request;
pub mod types;
