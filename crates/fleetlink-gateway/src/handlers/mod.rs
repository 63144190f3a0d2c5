//! HTTP request handlers.
//!
//! This module contains all the endpoint handlers the router bridge calls.

pub mod configure;
pub mod health;
pub mod pubsub;
pub mod rpc;
