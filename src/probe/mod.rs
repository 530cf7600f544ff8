//! The probe: connect, secure, authenticate, send and close, with a log of
//! every step.
//!
//! ```no_run
//! use smtp_probe::probe::{Encryption, ProbeConfig, ProbeRequest, SmtpProbe};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let request = ProbeRequest::new(
//!     "smtp.example.com",
//!     587,
//!     Encryption::StartTls,
//!     "probe@example.com",
//!     "postmaster@example.com",
//! )?
//! .credentials("probe@example.com", "secret");
//!
//! let result = SmtpProbe::new(ProbeConfig::default()).run(&request).await;
//! for line in &result.logs {
//!     println!("{}", line);
//! }
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use log::{info, warn};
use tokio::time::{timeout, timeout_at, Instant};

use crate::message::{build_test_email, single_line};
use crate::smtp::authentication::{Credentials, DEFAULT_MECHANISMS};
use crate::smtp::error::Error;
use crate::smtp::extension::ClientId;
use crate::smtp::{ClientTlsParameters, Connector, NetConnector, SmtpClient, SmtpTransport};

mod request;
mod result;

pub use self::request::*;
pub use self::result::*;

/// Default bound on establishing a connection (resolution to last EHLO)
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default bound on authentication and on sending, each
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

const SUCCESS_MESSAGE: &str = "Successfully connected to SMTP server and sent test email!";
const CONNECT_FAILED_MESSAGE: &str = "Failed to connect to SMTP server. Connection refused.";
const CONNECT_TIMEOUT_MESSAGE: &str =
    "SMTP server connection timed out. Please check your server address.";

/// Why a run failed, by the step it failed in
#[derive(thiserror::Error, Debug)]
pub enum ProbeError {
    /// Malformed input, detected before I/O
    #[error("{0}")]
    Validation(#[from] ValidationError),
    /// Could not reach, secure or greet the server
    #[error("{0}")]
    Connection(#[source] Error),
    /// The server did not accept the credentials
    #[error("{}", auth_detail(.0))]
    Authentication(#[source] Error),
    /// MAIL, RCPT or DATA failed
    #[error("{0}")]
    Transmission(#[source] Error),
    /// The caller aborted the run
    #[error("SMTP test cancelled")]
    Cancelled,
}

fn auth_detail(err: &Error) -> String {
    match err.response() {
        Some(response) if !response.message.is_empty() => {
            format!("{} {}", response.code, response.text())
        }
        _ => err.to_string(),
    }
}

impl ProbeError {
    /// Whether the failing step ran out of time
    pub fn is_timeout(&self) -> bool {
        match self {
            ProbeError::Connection(err)
            | ProbeError::Authentication(err)
            | ProbeError::Transmission(err) => err.is_timeout(),
            ProbeError::Validation(_) | ProbeError::Cancelled => false,
        }
    }

    /// Summary reported as the result message
    pub fn summary(&self) -> String {
        match self {
            ProbeError::Validation(err) => err.to_string(),
            ProbeError::Connection(err) if err.is_timeout() => CONNECT_TIMEOUT_MESSAGE.to_string(),
            ProbeError::Connection(_) => CONNECT_FAILED_MESSAGE.to_string(),
            ProbeError::Authentication(_) => format!("Authentication failed: {}", self),
            ProbeError::Transmission(_) => format!("Failed to send email: {}", self),
            ProbeError::Cancelled => "SMTP test was cancelled.".to_string(),
        }
    }
}

/// Settings shared by every run of a probe
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    connect_timeout: Duration,
    send_timeout: Duration,
    hello_name: ClientId,
    accept_invalid_certs: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        ProbeConfig {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            hello_name: ClientId::default(),
            accept_invalid_certs: false,
        }
    }
}

impl ProbeConfig {
    /// Bound on resolution, TCP, TLS, greeting, EHLO and STARTTLS together
    pub fn connect_timeout(self, connect_timeout: Duration) -> ProbeConfig {
        ProbeConfig {
            connect_timeout,
            ..self
        }
    }

    /// Bound on authentication, and separately on sending
    pub fn send_timeout(self, send_timeout: Duration) -> ProbeConfig {
        ProbeConfig {
            send_timeout,
            ..self
        }
    }

    /// Name announced in EHLO/HELO and used for the Message-ID
    pub fn hello_name(self, hello_name: ClientId) -> ProbeConfig {
        ProbeConfig { hello_name, ..self }
    }

    /// Skip certificate and host name verification
    pub fn accept_invalid_certs(self, accept_invalid_certs: bool) -> ProbeConfig {
        ProbeConfig {
            accept_invalid_certs,
            ..self
        }
    }

    pub fn get_connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn get_send_timeout(&self) -> Duration {
        self.send_timeout
    }
}

/// Runs probes against SMTP servers.
///
/// Holds configuration only; one instance can serve concurrent runs.
#[derive(Debug, Clone)]
pub struct SmtpProbe<C: Connector = NetConnector> {
    config: ProbeConfig,
    connector: C,
}

impl SmtpProbe<NetConnector> {
    /// Probe using the real network
    pub fn new(config: ProbeConfig) -> SmtpProbe<NetConnector> {
        SmtpProbe::with_connector(config, NetConnector)
    }
}

impl<C: Connector> SmtpProbe<C> {
    /// Probe opening its connections through `connector`
    pub fn with_connector(config: ProbeConfig, connector: C) -> SmtpProbe<C> {
        SmtpProbe { config, connector }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Runs one probe. Every failure is reported in the result.
    pub async fn run(&self, request: &ProbeRequest) -> ProbeResult {
        let mut log = ProbeLog::new();
        let outcome = self.execute(request, &mut log).await;
        self.conclude(request, log, outcome)
    }

    /// Runs one probe, giving up when `cancel` completes first.
    ///
    /// The connection in flight is dropped, which closes it.
    pub async fn run_until<F>(&self, request: &ProbeRequest, cancel: F) -> ProbeResult
    where
        F: Future<Output = ()>,
    {
        let mut log = ProbeLog::new();
        let outcome = {
            let execution = self.execute(request, &mut log);
            tokio::pin!(execution);
            tokio::pin!(cancel);
            tokio::select! {
                outcome = &mut execution => outcome,
                _ = &mut cancel => Err(ProbeError::Cancelled),
            }
        };
        self.conclude(request, log, outcome)
    }

    fn conclude(
        &self,
        request: &ProbeRequest,
        mut log: ProbeLog,
        outcome: Result<(), ProbeError>,
    ) -> ProbeResult {
        match outcome {
            Ok(()) => {
                info!(
                    "probe of {}:{} succeeded",
                    request.host(),
                    request.port()
                );
                ProbeResult::success(log, SUCCESS_MESSAGE)
            }
            Err(err) => {
                let summary = err.summary();
                warn!(
                    "probe of {}:{} failed: {}",
                    request.host(),
                    request.port(),
                    err
                );
                log.push(format_args!("ERROR: {}", err));
                ProbeResult::failure(log, summary)
            }
        }
    }

    async fn execute(&self, request: &ProbeRequest, log: &mut ProbeLog) -> Result<(), ProbeError> {
        let credentials = request.auth_credentials()?;

        log.push(format_args!(
            "Starting SMTP test for {}:{}",
            request.host(),
            request.port()
        ));
        log.push(format_args!(
            "Attempting to connect with {} encryption",
            request.encryption()
        ));
        if let Some(ref credentials) = credentials {
            log.push(format_args!(
                "Using authentication with username: {}",
                credentials.username()
            ));
        }

        let mut transport = self.open(request, log).await?;
        let outcome = self
            .deliver(&mut transport, request, credentials.as_ref(), log)
            .await;
        transport.close().await;
        outcome?;

        log.push("Email sent successfully");
        Ok(())
    }

    /// Connects, secures and greets. On failure the connection is already
    /// closed.
    async fn open(
        &self,
        request: &ProbeRequest,
        log: &mut ProbeLog,
    ) -> Result<SmtpTransport<C::Stream>, ProbeError> {
        let deadline = Instant::now() + self.config.connect_timeout;
        let smtp_utf8 = !request.from().address().is_ascii() || !request.to().address().is_ascii();
        let client = SmtpClient::new()
            .hello_name(self.config.hello_name.clone())
            .smtp_utf8(smtp_utf8);
        let tls_parameters =
            ClientTlsParameters::for_domain(request.host(), self.config.accept_invalid_certs);
        let implicit_tls = request.encryption() == Encryption::ImplicitTls;

        let stream = within(
            deadline,
            self.connector.connect(
                request.host(),
                request.port(),
                if implicit_tls {
                    Some(&tls_parameters)
                } else {
                    None
                },
            ),
        )
        .await
        .map_err(ProbeError::Connection)?;

        let mut transport = SmtpTransport::new(client.clone(), stream);
        if let Err(err) = within(deadline, async { transport.handshake().await.map(|_| ()) }).await {
            transport.close().await;
            return Err(ProbeError::Connection(err));
        }

        if request.encryption() == Encryption::StartTls {
            if let Err(err) = within(deadline, transport.starttls()).await {
                transport.close().await;
                return Err(ProbeError::Connection(err));
            }
            let stream = within(
                deadline,
                self.connector
                    .upgrade_tls(transport.into_inner(), &tls_parameters),
            )
            .await
            .map_err(ProbeError::Connection)?;

            transport = SmtpTransport::new(client.without_greeting(), stream);
            if let Err(err) =
                within(deadline, async { transport.handshake().await.map(|_| ()) }).await
            {
                transport.close().await;
                return Err(ProbeError::Connection(err));
            }
            log.push("Connection upgraded to TLS with STARTTLS");
        }

        log.push("Successfully connected to SMTP server");
        Ok(transport)
    }

    /// Authenticates when asked to, then sends the test message.
    async fn deliver(
        &self,
        transport: &mut SmtpTransport<C::Stream>,
        request: &ProbeRequest,
        credentials: Option<&Credentials>,
        log: &mut ProbeLog,
    ) -> Result<(), ProbeError> {
        if let Some(credentials) = credentials {
            let mechanism = transport.negotiate_mechanism(DEFAULT_MECHANISMS);
            log.push(format_args!("Authenticating with {}", mechanism));
            flatten(timeout(self.config.send_timeout, transport.auth(mechanism, credentials)).await)
                .map_err(ProbeError::Authentication)?;
            log.push("Authentication successful");
        }

        log.push(format_args!(
            "Preparing test email from {} to {}",
            request.from(),
            request.to()
        ));
        log.push(format_args!(
            "Email subject: {}",
            single_line(request.subject_text())
        ));

        let email = build_test_email(
            request.from(),
            request.to(),
            request.subject_text(),
            request.body_text(),
            &self.config.hello_name,
        )
        .map_err(|_| ProbeError::Transmission(Error::Client("could not build the test message")))?;

        flatten(timeout(self.config.send_timeout, transport.send(&email)).await)
            .map_err(ProbeError::Transmission)?;
        Ok(())
    }
}

/// Runs `future` until `deadline`, turning expiry into `Error::Timeout`
async fn within<T, F>(deadline: Instant, future: F) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    flatten(timeout_at(deadline, future).await)
}

fn flatten<T>(
    result: Result<Result<T, Error>, tokio::time::error::Elapsed>,
) -> Result<T, Error> {
    result.map_err(Error::from).and_then(|inner| inner)
}
