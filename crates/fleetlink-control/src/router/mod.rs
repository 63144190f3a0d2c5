//! Console request routing.
//!
//! The console reaches every local capability through one `route_request`
//! RPC. Method names are classified into a [`Command`], parameters are
//! validated per command, and replies are normalized. Failures become
//! JSON-RPC error envelopes rather than RPC errors so the console always
//! gets an answer it can display.

pub mod command;
pub mod params;
pub mod reply;

pub use command::Command;
pub use reply::{error_envelope, error_reply, normalize_result};
