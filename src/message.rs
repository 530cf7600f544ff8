//! Rendering of the probe's test message (RFC 5322, single text/plain part)

use chrono::Local;

use crate::error::EmailResult;
use crate::smtp::extension::ClientId;
use crate::{Envelope, Mailbox, SendableEmail};

/// Builds the message sent during a probe, with its envelope.
///
/// The Message-ID is a random UUID at the client id's domain.
pub fn build_test_email(
    from: &Mailbox,
    to: &Mailbox,
    subject: &str,
    body: &str,
    client_id: &ClientId,
) -> EmailResult<SendableEmail> {
    let envelope = Envelope::new(
        Some(from.address().clone()),
        vec![to.address().clone()],
    )?;
    let message_id = format!(
        "{}@{}",
        uuid::Uuid::new_v4().simple(),
        client_id.domain()
    );

    let mut out = String::with_capacity(body.len() + 512);
    write_header(&mut out, "Date", &Local::now().to_rfc2822());
    write_header(&mut out, "Message-ID", &format!("<{}>", message_id));
    write_header(&mut out, "From", &encode_mailbox(from));
    write_header(&mut out, "To", &encode_mailbox(to));
    write_header(&mut out, "Subject", &encode_header_value(&single_line(subject)));
    write_header(&mut out, "MIME-Version", "1.0");
    write_header(&mut out, "Content-Type", "text/plain; charset=utf-8");
    write_header(&mut out, "Content-Transfer-Encoding", "8bit");
    out.push_str("\r\n");
    out.push_str(&normalize_line_endings(body));

    Ok(SendableEmail::new(envelope, message_id, out))
}

fn write_header(out: &mut String, name: &str, value: &str) {
    out.push_str(name);
    out.push_str(": ");
    out.push_str(value);
    out.push_str("\r\n");
}

/// RFC 2047 encode a header value if it contains non-ASCII characters.
pub fn encode_header_value(value: &str) -> String {
    if value.is_ascii() {
        return value.to_string();
    }
    format!("=?UTF-8?B?{}?=", base64::encode(value.as_bytes()))
}

fn encode_mailbox(mailbox: &Mailbox) -> String {
    match mailbox.name() {
        Some(name) if !name.is_ascii() => {
            format!("{} <{}>", encode_header_value(name), mailbox.address())
        }
        _ => mailbox.to_string(),
    }
}

/// Joins the lines of `value` with spaces, for headers and log lines
pub fn single_line(value: &str) -> String {
    value
        .split(|c| c == '\r' || c == '\n')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Turns bare LF and bare CR into CRLF
fn normalize_line_endings(body: &str) -> String {
    let mut out = String::with_capacity(body.len() + 16);
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push_str("\r\n");
            }
            '\n' => out.push_str("\r\n"),
            other => out.push(other),
        }
    }
    out
}
