//! Scripted in-memory SMTP server and a connector handing out streams to it.

#![allow(dead_code)]

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::io::{
    duplex, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream,
    ReadBuf,
};

use smtp_probe::smtp::error::Error;
use smtp_probe::smtp::{ClientTlsParameters, Connector};

/// How the fake server behaves once connected
#[derive(Debug, Clone)]
pub struct Behavior {
    pub greeting: &'static str,
    pub extensions: Vec<&'static str>,
    pub reject_ehlo: bool,
    pub accept_auth: bool,
    pub reject_rcpt: bool,
    /// Take the message but never acknowledge it
    pub stall_after_data: bool,
    /// Make the STARTTLS upgrade fail
    pub fail_upgrade: bool,
}

impl Default for Behavior {
    fn default() -> Self {
        Behavior {
            greeting: "220 fake.example.com ESMTP ready",
            extensions: vec!["PIPELINING", "8BITMIME"],
            reject_ehlo: false,
            accept_auth: true,
            reject_rcpt: false,
            stall_after_data: false,
            fail_upgrade: false,
        }
    }
}

impl Behavior {
    pub fn with_extensions(extensions: &[&'static str]) -> Behavior {
        Behavior {
            extensions: extensions.to_vec(),
            ..Behavior::default()
        }
    }
}

/// What the connector does on `connect`
#[derive(Debug, Clone)]
pub enum Mode {
    Serve(Behavior),
    Refuse,
    Hang,
}

/// Connector counting connections and shutdowns, talking to a fake server
#[derive(Debug, Clone)]
pub struct FakeConnector {
    mode: Mode,
    connects: Arc<AtomicUsize>,
    upgrades: Arc<AtomicUsize>,
    shutdowns: Arc<AtomicUsize>,
    transcript: Arc<Mutex<Vec<String>>>,
}

impl FakeConnector {
    pub fn new(mode: Mode) -> FakeConnector {
        FakeConnector {
            mode,
            connects: Arc::new(AtomicUsize::new(0)),
            upgrades: Arc::new(AtomicUsize::new(0)),
            shutdowns: Arc::new(AtomicUsize::new(0)),
            transcript: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn serving(behavior: Behavior) -> FakeConnector {
        FakeConnector::new(Mode::Serve(behavior))
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn upgrades(&self) -> usize {
        self.upgrades.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    /// Command lines received by the server, without CRLF
    pub fn transcript(&self) -> Vec<String> {
        self.transcript.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    type Stream = CountingStream;

    async fn connect(
        &self,
        _host: &str,
        _port: u16,
        _tls_parameters: Option<&ClientTlsParameters>,
    ) -> Result<CountingStream, Error> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            Mode::Refuse => Err(Error::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "Connection refused (os error 111)",
            ))),
            Mode::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            Mode::Serve(ref behavior) => {
                let (client, server) = duplex(64 * 1024);
                tokio::spawn(serve(server, behavior.clone(), self.transcript.clone()));
                Ok(CountingStream {
                    inner: client,
                    shutdowns: self.shutdowns.clone(),
                })
            }
        }
    }

    async fn upgrade_tls(
        &self,
        stream: CountingStream,
        _tls_parameters: &ClientTlsParameters,
    ) -> Result<CountingStream, Error> {
        self.upgrades.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            Mode::Serve(ref behavior) if behavior.fail_upgrade => {
                drop(stream);
                Err(Error::Io(io::Error::new(
                    io::ErrorKind::Other,
                    "TLS handshake failed",
                )))
            }
            _ => Ok(stream),
        }
    }
}

/// Client side of the in-memory connection
#[derive(Debug)]
pub struct CountingStream {
    inner: DuplexStream,
    shutdowns: Arc<AtomicUsize>,
}

impl AsyncRead for CountingStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for CountingStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let poll = Pin::new(&mut self.inner).poll_shutdown(cx);
        if poll.is_ready() {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
        poll
    }
}

enum Auth {
    None,
    LoginUser,
    LoginPassword,
    CramMd5,
}

async fn serve(stream: DuplexStream, behavior: Behavior, transcript: Arc<Mutex<Vec<String>>>) {
    let _ = converse(stream, behavior, transcript).await;
}

async fn converse(
    stream: DuplexStream,
    behavior: Behavior,
    transcript: Arc<Mutex<Vec<String>>>,
) -> io::Result<()> {
    let mut stream = BufReader::new(stream);
    reply(&mut stream, behavior.greeting).await?;

    let mut auth = Auth::None;
    let mut line = String::new();
    loop {
        line.clear();
        if stream.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        let command = line.trim_end_matches(&['\r', '\n'][..]).to_string();
        transcript.lock().unwrap().push(command.clone());
        let upper = command.to_ascii_uppercase();

        let accepted = if behavior.accept_auth {
            "235 2.7.0 Authentication successful"
        } else {
            "535 5.7.8 Authentication credentials invalid"
        };

        match auth {
            Auth::LoginUser => {
                auth = Auth::LoginPassword;
                reply(&mut stream, "334 UGFzc3dvcmQ6").await?;
                continue;
            }
            Auth::LoginPassword | Auth::CramMd5 => {
                auth = Auth::None;
                reply(&mut stream, accepted).await?;
                continue;
            }
            Auth::None => (),
        }

        if upper.starts_with("EHLO") {
            if behavior.reject_ehlo {
                reply(&mut stream, "502 5.5.2 Command not recognized").await?;
            } else {
                let mut lines = vec!["fake.example.com greets you"];
                lines.extend(behavior.extensions.iter().copied());
                multiline(&mut stream, 250, &lines).await?;
            }
        } else if upper.starts_with("HELO") {
            reply(&mut stream, "250 fake.example.com").await?;
        } else if upper == "STARTTLS" {
            reply(&mut stream, "220 2.0.0 Ready to start TLS").await?;
        } else if upper.starts_with("AUTH PLAIN") {
            reply(&mut stream, accepted).await?;
        } else if upper == "AUTH LOGIN" {
            auth = Auth::LoginUser;
            reply(&mut stream, "334 VXNlcm5hbWU6").await?;
        } else if upper == "AUTH CRAM-MD5" {
            auth = Auth::CramMd5;
            // base64 of <1896.697170952@postoffice.reston.mci.net>
            reply(
                &mut stream,
                "334 PDE4OTYuNjk3MTcwOTUyQHBvc3RvZmZpY2UucmVzdG9uLm1jaS5uZXQ+",
            )
            .await?;
        } else if upper.starts_with("MAIL FROM:") {
            reply(&mut stream, "250 2.1.0 Sender OK").await?;
        } else if upper.starts_with("RCPT TO:") {
            if behavior.reject_rcpt {
                reply(&mut stream, "550 5.1.1 Recipient address rejected").await?;
            } else {
                reply(&mut stream, "250 2.1.5 Recipient OK").await?;
            }
        } else if upper == "DATA" {
            if behavior.reject_rcpt {
                reply(&mut stream, "554 5.5.1 No valid recipients").await?;
                continue;
            }
            reply(&mut stream, "354 End data with <CR><LF>.<CR><LF>").await?;
            loop {
                line.clear();
                if stream.read_line(&mut line).await? == 0 {
                    return Ok(());
                }
                if line == ".\r\n" {
                    break;
                }
            }
            if !behavior.stall_after_data {
                reply(&mut stream, "250 2.0.0 Ok: queued as FAKE42").await?;
            }
        } else if upper == "QUIT" {
            reply(&mut stream, "221 2.0.0 Bye").await?;
            return Ok(());
        } else {
            reply(&mut stream, "500 5.5.1 Unrecognized command").await?;
        }
    }
}

async fn reply(stream: &mut BufReader<DuplexStream>, line: &str) -> io::Result<()> {
    stream.get_mut().write_all(line.as_bytes()).await?;
    stream.get_mut().write_all(b"\r\n").await?;
    stream.get_mut().flush().await
}

async fn multiline(
    stream: &mut BufReader<DuplexStream>,
    code: u16,
    lines: &[&str],
) -> io::Result<()> {
    let mut out = String::new();
    for (idx, line) in lines.iter().enumerate() {
        let separator = if idx + 1 == lines.len() { ' ' } else { '-' };
        out.push_str(&format!("{}{}{}\r\n", code, separator, line));
    }
    stream.get_mut().write_all(out.as_bytes()).await?;
    stream.get_mut().flush().await
}
