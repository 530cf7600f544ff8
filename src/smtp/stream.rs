use std::fmt::Display;

use log::debug;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::smtp::client::ClientCodec;
use crate::smtp::commands::{AuthCommand, EhloCommand};
use crate::smtp::error::{Error, SmtpResult};
use crate::smtp::extension::ClientId;
use crate::smtp::response::parse_response;

/// Upper bound on one reply, all lines included
pub const MAX_REPLY_LEN: usize = 64 * 1024;

/// SMTP stream.
#[derive(Debug)]
pub struct SmtpStream<S: AsyncRead + AsyncWrite + Unpin> {
    /// Inner stream.
    inner: BufReader<S>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> SmtpStream<S> {
    /// Creates new SMTP stream.
    pub fn new(stream: S) -> Self {
        Self {
            inner: BufReader::new(stream),
        }
    }

    /// Returns inner stream.
    ///
    /// Should only be used when there are no unread responses,
    /// because the buffer of `BufReader` may be lost.
    pub fn into_inner(self) -> S {
        self.inner.into_inner()
    }

    /// Sends EHLO command and returns server response.
    pub async fn ehlo(&mut self, client_id: ClientId) -> SmtpResult {
        self.command(EhloCommand::new(client_id)).await
    }

    /// Send the given SMTP command to the server.
    pub async fn command(&mut self, command: impl Display) -> SmtpResult {
        self.send_command(command).await?;
        self.read_response().await
    }

    /// Sends the given SMTP command to the server without waiting for response.
    pub async fn send_command(&mut self, command: impl Display) -> Result<(), Error> {
        let line = command.to_string();
        self.write(line.as_bytes()).await?;
        debug!(">> {}", escape_crlf(&line));
        Ok(())
    }

    /// Sends an AUTH line and reads the reply; the trace never shows the
    /// encoded credentials.
    pub async fn auth_command(&mut self, command: AuthCommand) -> SmtpResult {
        let line = command.to_string();
        self.write(line.as_bytes()).await?;
        if line.starts_with("AUTH ") {
            debug!(">> AUTH {} <redacted>", command.mechanism());
        } else {
            debug!(">> <redacted>");
        }
        self.read_response().await
    }

    /// Writes the given data to the server.
    async fn write(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.inner.get_mut().write_all(bytes).await?;
        self.inner.get_mut().flush().await?;
        Ok(())
    }

    /// Read an SMTP response from the wire.
    ///
    /// Negative replies are returned as `Error::Transient`/`Error::Permanent`.
    pub async fn read_response(&mut self) -> SmtpResult {
        let reader = &mut self.inner;
        let mut buffer = String::with_capacity(100);

        loop {
            let remaining = MAX_REPLY_LEN.saturating_sub(buffer.len());
            if remaining == 0 {
                return Err(Error::ResponseParsing("reply too long"));
            }
            let read = (&mut *reader)
                .take(remaining as u64)
                .read_line(&mut buffer)
                .await?;
            if read == 0 {
                break;
            }
            debug!("<< {}", escape_crlf(&buffer));
            match parse_response(&buffer) {
                Ok((_remaining, response)) => {
                    if response.is_positive() {
                        return Ok(response);
                    }

                    return Err(response.into());
                }
                Err(nom::Err::Failure(e)) => {
                    return Err(Error::Parsing(e.code));
                }
                Err(nom::Err::Incomplete(_)) => { /* read more */ }
                Err(nom::Err::Error(e)) => {
                    return Err(Error::Parsing(e.code));
                }
            }
        }

        Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed by server",
        )
        .into())
    }

    /// Sends the message content, terminated by `<CRLF>.<CRLF>`.
    pub async fn message(&mut self, message: &[u8]) -> SmtpResult {
        let mut codec = ClientCodec::new();

        codec.encode(message, self.inner.get_mut()).await?;
        let terminator: &[u8] = if codec.at_line_start() {
            b".\r\n"
        } else {
            b"\r\n.\r\n"
        };
        self.write(terminator).await?;
        debug!(">> <{} bytes of message data>", message.len());

        self.read_response().await
    }

    /// Shuts down the write side of the underlying stream.
    pub async fn shutdown(&mut self) -> Result<(), Error> {
        self.inner.get_mut().shutdown().await?;
        Ok(())
    }
}

/// Returns the string replacing all the CRLF with "\<CRLF\>"
/// Used for debug displays
pub(crate) fn escape_crlf(string: &str) -> String {
    string.replace("\r\n", "<CRLF>")
}
