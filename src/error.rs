//! Errors raised while building addresses and envelopes for the test message

/// Address or envelope rejected before anything is sent
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Recipient address is empty
    #[error("recipient address is required")]
    MissingTo,
    /// Address contains characters that would break the SMTP dialogue
    #[error("invalid email address")]
    InvalidEmailAddress,
    /// `Name <address` without the closing bracket
    #[error("unterminated mailbox, expected '>'")]
    UnterminatedMailbox,
}

/// Address result type
pub type EmailResult<T> = Result<T, Error>;
