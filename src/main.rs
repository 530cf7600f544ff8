use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use structopt::StructOpt;

use smtp_probe::probe::{parse_port, Encryption, ProbeConfig, ProbeRequest, SmtpProbe};
use smtp_probe::service;
use smtp_probe::smtp::extension::ClientId;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "smtp-probe",
    about = "Checks that an SMTP server accepts a connection, credentials and a test message"
)]
struct Opt {
    /// Connection establishment timeout, in seconds
    #[structopt(
        long = "connect-timeout",
        env = "SMTP_PROBE_CONNECT_TIMEOUT",
        default_value = "10"
    )]
    connect_timeout: u64,

    /// Authentication and send timeout, in seconds
    #[structopt(long = "send-timeout", env = "SMTP_PROBE_SEND_TIMEOUT", default_value = "30")]
    send_timeout: u64,

    /// Name announced in EHLO (defaults to the local host name)
    #[structopt(long = "helo", env = "SMTP_PROBE_HELO")]
    helo: Option<String>,

    /// Do not verify TLS certificates
    #[structopt(long = "accept-invalid-certs", env = "SMTP_PROBE_ACCEPT_INVALID_CERTS")]
    accept_invalid_certs: bool,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Run the HTTP service
    Serve {
        /// Address to listen on
        #[structopt(long = "listen", env = "SMTP_PROBE_LISTEN", default_value = "127.0.0.1:8080")]
        listen: SocketAddr,
    },
    /// Probe one server and print the log
    Check {
        #[structopt(long = "host")]
        host: String,
        /// Defaults to 25, 587 or 465 depending on the encryption
        #[structopt(long = "port")]
        port: Option<String>,
        /// none, tls (STARTTLS) or ssl (implicit TLS)
        #[structopt(long = "encryption", default_value = "none")]
        encryption: String,
        #[structopt(long = "username")]
        username: Option<String>,
        #[structopt(long = "password", env = "SMTP_PROBE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        #[structopt(long = "from")]
        from: String,
        #[structopt(long = "to")]
        to: String,
        #[structopt(long = "subject")]
        subject: Option<String>,
        #[structopt(long = "body")]
        body: Option<String>,
    },
}

impl Opt {
    fn config(&self) -> ProbeConfig {
        let config = ProbeConfig::default()
            .connect_timeout(Duration::from_secs(self.connect_timeout))
            .send_timeout(Duration::from_secs(self.send_timeout))
            .accept_invalid_certs(self.accept_invalid_certs);
        match self.helo {
            Some(ref helo) => config.hello_name(ClientId::new(helo.clone())),
            None => config,
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opt = Opt::from_args();
    let code = match run(opt).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {}", err);
            2
        }
    };
    process::exit(code);
}

async fn run(opt: Opt) -> Result<i32> {
    let probe = Arc::new(SmtpProbe::new(opt.config()));

    match opt.command {
        Command::Serve { listen } => {
            let listener = tokio::net::TcpListener::bind(listen).await?;
            service::serve(listener, probe).await?;
            Ok(0)
        }
        Command::Check {
            host,
            port,
            encryption,
            username,
            password,
            from,
            to,
            subject,
            body,
        } => {
            let encryption: Encryption = encryption.parse()?;
            let port = match port {
                Some(port) => parse_port(&port)?,
                None => encryption.default_port(),
            };

            let mut request = ProbeRequest::new(&host, port, encryption, &from, &to)?;
            if let Some(subject) = subject {
                request = request.subject(&subject);
            }
            if let Some(body) = body {
                request = request.body(&body);
            }
            if username.is_some() || password.is_some() {
                request = request.credentials(
                    username.as_deref().unwrap_or_default(),
                    password.as_deref().unwrap_or_default(),
                );
            }

            let result = probe.run(&request).await;
            for line in &result.logs {
                println!("{}", line);
            }
            println!("{}", result.message);

            Ok(if result.success { 0 } else { 1 })
        }
    }
}
