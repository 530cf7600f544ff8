use std::time::Duration;

use log::{debug, info};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;

use crate::smtp::authentication::{Credentials, Mechanism};
use crate::smtp::commands::*;
use crate::smtp::error::{Error, SmtpResult};
use crate::smtp::extension::{ClientId, Extension, MailBodyParameter, MailParameter, ServerInfo};
use crate::smtp::stream::SmtpStream;
use crate::SendableEmail;

/// Upper bound for each of QUIT and the stream shutdown when closing
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum number of 334 challenges accepted during one AUTH exchange
const MAX_CHALLENGES: usize = 10;

/// Contains client configuration
#[derive(Debug, Clone)]
pub struct SmtpClient {
    /// Name sent during EHLO
    hello_name: ClientId,
    /// Enable UTF8 mailboxes in envelope or headers
    smtp_utf8: bool,
    /// Whether to expect greeting.
    /// Normally the server sends a greeting after connection,
    /// but not after STARTTLS.
    expect_greeting: bool,
}

impl Default for SmtpClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for the SMTP `SmtpTransport`
impl SmtpClient {
    /// Creates a new SMTP client.
    ///
    /// Defaults are:
    ///
    /// * Local host name as EHLO name
    /// * No SMTPUTF8 support
    /// * PIPELINING used when advertised
    pub fn new() -> Self {
        SmtpClient {
            smtp_utf8: false,
            hello_name: Default::default(),
            expect_greeting: true,
        }
    }

    /// Enable SMTPUTF8 if the server supports it
    pub fn smtp_utf8(self, enabled: bool) -> SmtpClient {
        Self {
            smtp_utf8: enabled,
            ..self
        }
    }

    /// Set the name used during EHLO
    pub fn hello_name(self, name: ClientId) -> SmtpClient {
        Self {
            hello_name: name,
            ..self
        }
    }

    /// Do not expect greeting.
    ///
    /// Used on the encrypted channel after STARTTLS.
    pub fn without_greeting(self) -> SmtpClient {
        Self {
            expect_greeting: false,
            ..self
        }
    }

    /// Name sent in EHLO/HELO
    pub fn client_id(&self) -> &ClientId {
        &self.hello_name
    }
}

/// Structure that implements the high level SMTP client
///
/// It owns the stream for the whole session; dropping it closes the socket.
#[derive(Debug)]
pub struct SmtpTransport<S: AsyncRead + AsyncWrite + Unpin> {
    /// Information about the server
    /// Empty until `handshake` succeeds
    server_info: ServerInfo,
    /// Information about the client
    client_info: SmtpClient,
    /// Low level client
    stream: SmtpStream<S>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> SmtpTransport<S> {
    /// Wraps a connected stream. No I/O happens until `handshake`.
    pub fn new(builder: SmtpClient, stream: S) -> Self {
        SmtpTransport {
            server_info: ServerInfo::default(),
            client_info: builder,
            stream: SmtpStream::new(stream),
        }
    }

    /// Reads the greeting (unless disabled) and introduces the client.
    ///
    /// EHLO is tried first; a permanent rejection falls back to HELO, in
    /// which case no extension is available.
    pub async fn handshake(&mut self) -> Result<&ServerInfo, Error> {
        if self.client_info.expect_greeting {
            let greeting = self.stream.read_response().await?;
            debug!("greeting: {}", greeting.text());
        }

        let client_id = self.client_info.hello_name.clone();
        self.server_info = match self.stream.ehlo(client_id.clone()).await {
            Ok(ehlo_response) => ServerInfo::from_response(&ehlo_response)?,
            Err(Error::Permanent(response)) => {
                debug!("EHLO rejected ({}), falling back to HELO", response.code);
                let helo_response = self.stream.command(HeloCommand::new(client_id)).await?;
                ServerInfo::without_extensions(&helo_response)
            }
            Err(err) => return Err(err),
        };

        // Print server information
        debug!("server {}", self.server_info);

        Ok(&self.server_info)
    }

    /// Information gathered during the handshake
    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// Sends STARTTLS command if the server supports it.
    ///
    /// On success the caller takes the stream back with `into_inner` and
    /// upgrades it to TLS.
    pub async fn starttls(&mut self) -> Result<(), Error> {
        if !self.supports_feature(Extension::StartTls) {
            return Err(From::from("server does not support STARTTLS"));
        }

        self.stream.command(StarttlsCommand).await?;
        Ok(())
    }

    /// Gives the stream back, e.g. to upgrade it after STARTTLS.
    pub fn into_inner(self) -> S {
        self.stream.into_inner()
    }

    fn supports_feature(&self, keyword: Extension) -> bool {
        self.server_info.supports_feature(keyword)
    }

    /// Picks the first accepted mechanism the server advertises.
    ///
    /// Servers that advertise none of them still get PLAIN, since many only
    /// list AUTH after TLS but accept it anyway.
    pub fn negotiate_mechanism(&self, accepted_mechanisms: &[Mechanism]) -> Mechanism {
        match accepted_mechanisms
            .iter()
            .find(|mechanism| self.server_info.supports_auth_mechanism(**mechanism))
        {
            Some(mechanism) => *mechanism,
            None => {
                info!("No supported authentication mechanism advertised, trying PLAIN");
                Mechanism::Plain
            }
        }
    }

    /// Sends an AUTH command with the given mechanism, and handles challenge if needed
    pub async fn auth(&mut self, mechanism: Mechanism, credentials: &Credentials) -> SmtpResult {
        let mut challenges = MAX_CHALLENGES;
        let mut response = self
            .stream
            .auth_command(AuthCommand::new(mechanism, credentials, None)?)
            .await?;

        while challenges > 0 && response.has_code(334) {
            challenges -= 1;
            response = self
                .stream
                .auth_command(AuthCommand::new_from_response(
                    mechanism,
                    credentials,
                    &response,
                )?)
                .await?;
        }

        if response.has_code(334) {
            Err(Error::ResponseParsing("Unexpected number of challenges"))
        } else {
            Ok(response)
        }
    }

    /// Sends an email.
    pub async fn send(&mut self, email: &SendableEmail) -> SmtpResult {
        let message = email.message();

        if let Some(max_size) = self.server_info.max_size {
            if message.len() > max_size {
                return Err(From::from("message exceeds the size limit announced by the server"));
            }
        }

        // Mail
        let mut mail_options = vec![];

        if self.server_info.max_size.is_some() {
            mail_options.push(MailParameter::Size(message.len()));
        }

        if self.supports_feature(Extension::EightBitMime) {
            mail_options.push(MailParameter::Body(MailBodyParameter::EightBitMime));
        }

        if self.supports_feature(Extension::SmtpUtfEight) && self.client_info.smtp_utf8 {
            mail_options.push(MailParameter::SmtpUtfEight);
        }

        if self.supports_feature(Extension::Pipelining) {
            self.stream
                .send_command(MailCommand::new(
                    email.envelope().from().cloned(),
                    mail_options,
                ))
                .await?;
            let mut sent_commands = 1;

            // Recipient
            for to_address in email.envelope().to() {
                self.stream
                    .send_command(RcptCommand::new(to_address.clone(), vec![]))
                    .await?;
                sent_commands += 1;
            }

            // Data
            self.stream.send_command(DataCommand).await?;
            sent_commands += 1;

            // Every reply is read before reporting the first failure, so the
            // stream stays in sync for QUIT.
            let mut first_error = None;
            for _ in 0..sent_commands {
                if let Err(err) = self.stream.read_response().await {
                    if matches!(err, Error::Io(_) | Error::Parsing(_)) {
                        return Err(err);
                    }
                    first_error.get_or_insert(err);
                }
            }
            if let Some(err) = first_error {
                return Err(err);
            }
        } else {
            self.stream
                .command(MailCommand::new(
                    email.envelope().from().cloned(),
                    mail_options,
                ))
                .await?;

            // Recipient
            for to_address in email.envelope().to() {
                self.stream
                    .command(RcptCommand::new(to_address.clone(), vec![]))
                    .await?;
                // Log the rcpt command
                debug!("to=<{}>", to_address);
            }

            // Data
            self.stream.command(DataCommand).await?;
        }

        // Message content
        let result = self.stream.message(message).await?;

        // Log the message
        debug!(
            "status=sent ({})",
            result.first_line().unwrap_or("no response")
        );

        Ok(result)
    }

    /// Closes the SMTP transaction if possible.
    pub async fn quit(&mut self) -> SmtpResult {
        self.stream.command(QuitCommand).await
    }

    /// Sends QUIT and shuts the stream down, each step bounded by
    /// `CLOSE_TIMEOUT`. Failures are only traced.
    pub async fn close(mut self) {
        match timeout(CLOSE_TIMEOUT, self.quit()).await {
            Ok(Ok(_)) => (),
            Ok(Err(err)) => debug!("QUIT failed: {}", err),
            Err(_) => debug!("QUIT timed out"),
        }
        match timeout(CLOSE_TIMEOUT, self.stream.shutdown()).await {
            Ok(Ok(())) => (),
            Ok(Err(err)) => debug!("shutdown failed: {}", err),
            Err(_) => debug!("shutdown timed out"),
        }
    }
}
