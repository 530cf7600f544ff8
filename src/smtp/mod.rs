//! The SMTP client protocol layer
//!
//! It sequences the commands of one session over any
//! `AsyncRead + AsyncWrite` stream:
//!
//! * greeting, then EHLO (HELO when EHLO is refused)
//! * STARTTLS, handing the stream back for the TLS upgrade
//! * AUTH with CRAM-MD5, PLAIN, LOGIN or XOAUTH2
//! * MAIL/RCPT/DATA, pipelined when the server allows it
//! * QUIT
//!
//! Opening and upgrading connections is left to a `Connector`.

pub mod authentication;
pub mod client;
pub mod commands;
pub mod error;
pub mod extension;
pub mod response;
pub mod stream;
pub mod transport;

pub use self::client::net::{ClientTlsParameters, Connector, NetConnector, NetworkStream};
pub use self::transport::{SmtpClient, SmtpTransport};

/// Default smtp port
pub const SMTP_PORT: u16 = 25;
/// Default submission port
pub const SUBMISSION_PORT: u16 = 587;
/// Default submission over TLS port
pub const SUBMISSIONS_PORT: u16 = 465;
