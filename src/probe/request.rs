//! What a caller asks the probe to do

use std::convert::TryFrom;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde_derive::Deserialize;

use crate::smtp::authentication::Credentials;
use crate::smtp::{SMTP_PORT, SUBMISSIONS_PORT, SUBMISSION_PORT};
use crate::Mailbox;

/// Subject used when the caller does not provide one
pub const DEFAULT_SUBJECT: &str = "SMTP Test Email";
/// Body used when the caller does not provide one
pub const DEFAULT_BODY: &str = "This is a test email sent from the SMTP Fly Check tool.";

/// Input rejected before any network I/O
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Auth was requested without both credentials
    #[error("Authentication required. Please provide username and password.")]
    MissingCredentials,
    /// No host given
    #[error("SMTP host is required")]
    MissingHost,
    /// Port is not a number in 1..=65535
    #[error("Invalid port: {0}")]
    InvalidPort(String),
    /// Unknown encryption keyword
    #[error("Unknown encryption mode: {0}")]
    InvalidEncryption(String),
    /// No sender given
    #[error("Sender address is required")]
    MissingFrom,
    /// No recipient given
    #[error("Recipient address is required")]
    MissingTo,
    /// Address present but unusable
    #[error("Invalid {field} address: {source}")]
    InvalidAddress {
        /// `sender` or `recipient`
        field: &'static str,
        /// Why it was rejected
        source: crate::error::Error,
    },
}

/// How the connection is secured
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum Encryption {
    /// Plaintext for the whole session
    None,
    /// Plaintext connection upgraded with the STARTTLS command
    StartTls,
    /// TLS negotiated right after the TCP connection is opened
    ImplicitTls,
}

impl Default for Encryption {
    fn default() -> Self {
        Encryption::None
    }
}

impl Display for Encryption {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(match *self {
            Encryption::None => "none",
            Encryption::StartTls => "STARTTLS",
            Encryption::ImplicitTls => "SSL/TLS",
        })
    }
}

impl FromStr for Encryption {
    type Err = ValidationError;

    /// Accepts the form keywords (`none`, `tls`, `ssl`) and the explicit
    /// `starttls` and `implicit_tls` spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Encryption::None),
            "tls" | "starttls" => Ok(Encryption::StartTls),
            "ssl" | "implicit_tls" => Ok(Encryption::ImplicitTls),
            _ => Err(ValidationError::InvalidEncryption(s.to_string())),
        }
    }
}

impl Encryption {
    /// Conventional port for this mode
    pub fn default_port(self) -> u16 {
        match self {
            Encryption::None => SMTP_PORT,
            Encryption::StartTls => SUBMISSION_PORT,
            Encryption::ImplicitTls => SUBMISSIONS_PORT,
        }
    }
}

/// Parses a user-supplied port
pub fn parse_port(input: &str) -> Result<u16, ValidationError> {
    match input.trim().parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(ValidationError::InvalidPort(input.to_string())),
    }
}

/// One probe run's parameters
#[derive(Clone)]
pub struct ProbeRequest {
    host: String,
    port: u16,
    encryption: Encryption,
    auth_enabled: bool,
    username: String,
    password: String,
    from: Mailbox,
    to: Mailbox,
    subject: String,
    body: String,
}

impl fmt::Debug for ProbeRequest {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("ProbeRequest")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("encryption", &self.encryption)
            .field("auth_enabled", &self.auth_enabled)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("subject", &self.subject)
            .finish()
    }
}

impl ProbeRequest {
    /// Creates a request without authentication and with the default
    /// subject and body.
    pub fn new(
        host: &str,
        port: u16,
        encryption: Encryption,
        from: &str,
        to: &str,
    ) -> Result<ProbeRequest, ValidationError> {
        let host = host.trim();
        if host.is_empty() {
            return Err(ValidationError::MissingHost);
        }
        if port == 0 {
            return Err(ValidationError::InvalidPort(port.to_string()));
        }
        if from.trim().is_empty() {
            return Err(ValidationError::MissingFrom);
        }
        if to.trim().is_empty() {
            return Err(ValidationError::MissingTo);
        }
        let from = Mailbox::parse(from).map_err(|source| ValidationError::InvalidAddress {
            field: "sender",
            source,
        })?;
        let to = Mailbox::parse(to).map_err(|source| ValidationError::InvalidAddress {
            field: "recipient",
            source,
        })?;

        Ok(ProbeRequest {
            host: host.to_string(),
            port,
            encryption,
            auth_enabled: false,
            username: String::new(),
            password: String::new(),
            from,
            to,
            subject: DEFAULT_SUBJECT.to_string(),
            body: DEFAULT_BODY.to_string(),
        })
    }

    /// Enables authentication with the given credentials.
    ///
    /// Empty values are accepted here and rejected when the probe runs.
    pub fn credentials(self, username: &str, password: &str) -> ProbeRequest {
        ProbeRequest {
            auth_enabled: true,
            username: username.to_string(),
            password: password.to_string(),
            ..self
        }
    }

    /// Sets the subject
    pub fn subject(self, subject: &str) -> ProbeRequest {
        ProbeRequest {
            subject: subject.to_string(),
            ..self
        }
    }

    /// Sets the body
    pub fn body(self, body: &str) -> ProbeRequest {
        ProbeRequest {
            body: body.to_string(),
            ..self
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn encryption(&self) -> Encryption {
        self.encryption
    }

    pub fn auth_enabled(&self) -> bool {
        self.auth_enabled
    }

    pub fn from(&self) -> &Mailbox {
        &self.from
    }

    pub fn to(&self) -> &Mailbox {
        &self.to
    }

    pub fn subject_text(&self) -> &str {
        &self.subject
    }

    pub fn body_text(&self) -> &str {
        &self.body
    }

    /// Credentials to authenticate with, `None` when auth is disabled
    pub fn auth_credentials(&self) -> Result<Option<Credentials>, ValidationError> {
        if !self.auth_enabled {
            return Ok(None);
        }
        if self.username.is_empty() || self.password.is_empty() {
            return Err(ValidationError::MissingCredentials);
        }
        Ok(Some(Credentials::new(
            self.username.clone(),
            self.password.clone(),
        )))
    }
}

/// Port as it arrives on the wire: a number or the text of a form field
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum PortValue {
    Number(i64),
    Text(String),
}

/// JSON body accepted by the HTTP service
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct ProbeForm {
    pub host: String,
    pub port: Option<PortValue>,
    pub username: String,
    pub password: String,
    pub encryption: Option<String>,
    pub from: String,
    pub to: String,
    pub subject: Option<String>,
    pub message: Option<String>,
    pub auth: bool,
}

impl TryFrom<ProbeForm> for ProbeRequest {
    type Error = ValidationError;

    fn try_from(form: ProbeForm) -> Result<Self, Self::Error> {
        let encryption = match form.encryption {
            Some(ref encryption) => encryption.parse()?,
            None => Encryption::default(),
        };
        let port = match form.port {
            None => encryption.default_port(),
            Some(PortValue::Number(port)) => u16::try_from(port)
                .ok()
                .filter(|port| *port != 0)
                .ok_or_else(|| ValidationError::InvalidPort(port.to_string()))?,
            Some(PortValue::Text(ref port)) if port.trim().is_empty() => {
                encryption.default_port()
            }
            Some(PortValue::Text(ref port)) => parse_port(port)?,
        };

        let mut request = ProbeRequest::new(&form.host, port, encryption, &form.from, &form.to)?
            .subject(form.subject.as_deref().unwrap_or(DEFAULT_SUBJECT))
            .body(form.message.as_deref().unwrap_or(DEFAULT_BODY));
        if form.auth {
            request = request.credentials(&form.username, &form.password);
        }
        Ok(request)
    }
}
