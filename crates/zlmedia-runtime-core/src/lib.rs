//! ZLMedia Runtime Core - Platform-independent supervision of a media server process
//!
//! This crate provides the traits, configuration, channels, control-plane client and the
//! generic [`MediaRuntime`] facade shared by the platform-specific process managers.

mod client;
mod config;
mod error;
mod output;
mod pid;
mod process;
mod readiness;
mod runtime;
mod secret;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use client::*;
pub use config::*;
pub use error::*;
pub use output::*;
pub use pid::PidRecord;
pub use process::*;
pub use readiness::*;
pub use runtime::{MediaRuntime, RuntimeState};
pub use secret::*;
