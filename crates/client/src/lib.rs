//! Job tracking client for the neural forecasting service.
//!
//! Starts training and prediction jobs over HTTP, polls their status on
//! a fixed interval until they reach a terminal state, and publishes the
//! latest snapshot through an observable state store plus a broadcast
//! channel of lifecycle events.

pub mod api;
pub mod backoff;
pub mod config;
pub mod controller;
pub mod events;
pub mod poller;
pub mod slots;
pub mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
