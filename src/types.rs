use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use crate::error::EmailResult;
use crate::error::Error;

/// Email address
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct EmailAddress(String);

impl EmailAddress {
    pub fn new(address: String) -> EmailResult<EmailAddress> {
        // Do basic checks to avoid injection of control characters into SMTP protocol.  Actual
        // email validation should be done by the server.
        if address.is_empty()
            || address.chars().any(|c| {
                c.is_control() || c.is_whitespace() || c == '<' || c == '>'
            })
        {
            return Err(Error::InvalidEmailAddress);
        }

        Ok(EmailAddress(address))
    }

    /// Part after the last `@`, if any
    pub fn domain(&self) -> Option<&str> {
        self.0.rsplit_once('@').map(|(_, domain)| domain)
    }

    /// Whether the address needs the SMTPUTF8 extension
    pub fn is_ascii(&self) -> bool {
        self.0.is_ascii()
    }
}

impl FromStr for EmailAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EmailAddress::new(s.to_string())
    }
}

impl Display for EmailAddress {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EmailAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// An address with an optional display name, as typed into a `From` or `To` field.
///
/// Accepts either a bare `user@example.org` or `Jane Doe <user@example.org>`.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Mailbox {
    name: Option<String>,
    address: EmailAddress,
}

impl Mailbox {
    pub fn new(name: Option<String>, address: EmailAddress) -> Mailbox {
        Mailbox { name, address }
    }

    /// Parses a mailbox, rejecting anything that could smuggle CRLF into headers.
    pub fn parse(input: &str) -> EmailResult<Mailbox> {
        let input = input.trim();
        if input.chars().any(|c| c == '\r' || c == '\n') {
            return Err(Error::InvalidEmailAddress);
        }

        match input.rfind('<') {
            Some(open) => {
                let rest = &input[open + 1..];
                let address = rest.strip_suffix('>').ok_or(Error::UnterminatedMailbox)?;
                let name = input[..open].trim().trim_matches('"').trim();
                Ok(Mailbox {
                    name: if name.is_empty() {
                        None
                    } else {
                        Some(name.to_string())
                    },
                    address: address.trim().parse()?,
                })
            }
            None => Ok(Mailbox {
                name: None,
                address: input.parse()?,
            }),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn address(&self) -> &EmailAddress {
        &self.address
    }
}

impl FromStr for Mailbox {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mailbox::parse(s)
    }
}

impl Display for Mailbox {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self.name {
            Some(ref name) if needs_quoting(name) => {
                write!(f, "\"{}\" <{}>", name.replace('\\', "\\\\").replace('"', "\\\""), self.address)
            }
            Some(ref name) => write!(f, "{} <{}>", name, self.address),
            None => write!(f, "{}", self.address),
        }
    }
}

fn needs_quoting(name: &str) -> bool {
    name.chars().any(|c| "()<>[]:;@\\,.\"".contains(c))
}

/// Simple email envelope representation
///
/// We only accept mailboxes, and do not support source routes (as per RFC).
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Envelope {
    /// The envelope recipients' addresses
    ///
    /// This can not be empty.
    forward_path: Vec<EmailAddress>,
    /// The envelope sender address
    reverse_path: Option<EmailAddress>,
}

impl Envelope {
    /// Creates a new envelope, which may fail if `to` is empty.
    pub fn new(from: Option<EmailAddress>, to: Vec<EmailAddress>) -> EmailResult<Envelope> {
        if to.is_empty() {
            return Err(Error::MissingTo);
        }
        Ok(Envelope {
            forward_path: to,
            reverse_path: from,
        })
    }

    /// Destination addresses of the envelope
    pub fn to(&self) -> &[EmailAddress] {
        self.forward_path.as_slice()
    }

    /// Source address of the envelope
    pub fn from(&self) -> Option<&EmailAddress> {
        self.reverse_path.as_ref()
    }
}

/// A fully rendered message ready for the DATA phase
#[derive(Debug, Clone)]
pub struct SendableEmail {
    envelope: Envelope,
    message_id: String,
    message: Vec<u8>,
}

impl SendableEmail {
    pub fn new<S: AsRef<str>, T: AsRef<[u8]>>(
        envelope: Envelope,
        message_id: S,
        message: T,
    ) -> SendableEmail {
        SendableEmail {
            envelope,
            message_id: message_id.as_ref().into(),
            message: message.as_ref().to_vec(),
        }
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn message(&self) -> &[u8] {
        &self.message
    }
}
