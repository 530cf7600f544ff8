//! SMTP probe: connects to an SMTP server, optionally secures the session and
//! authenticates, sends a test message and reports every step in a
//! timestamped log.
//!
//! The crate is layered:
//!
//! * [`smtp`]: an async SMTP client (reply parser, commands, SASL, STARTTLS)
//! * [`probe`]: the run sequence and its verdict
//! * [`service`]: the HTTP/JSON boundary

#![deny(
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    missing_debug_implementations,
    clippy::unwrap_used
)]

pub mod error;
pub mod message;
pub mod probe;
pub mod service;
pub mod smtp;
mod types;

pub use types::*;

pub use crate::probe::{Encryption, ProbeConfig, ProbeRequest, ProbeResult, SmtpProbe};
