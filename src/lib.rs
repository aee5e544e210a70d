#![forbid(unsafe_code)]

//! Moderation event attribution.
//!
//! Gateway notifications say what changed but not who changed it. This
//! crate pairs each notification with the matching audit log entry,
//! suppresses echoes of the bot's own actions, and fans the attributed
//! events out to listeners such as the channel log emitter.

pub mod attribution;
pub mod config;
pub mod dispatch;
pub mod emitter;
pub mod errors;
pub mod models;
pub mod platform;
pub mod tasks;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
