//! SMTP response, containing a mandatory return code and an optional text
//! message

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::result;
use std::str::FromStr;

use nom::{
    branch::alt,
    bytes::streaming::{tag, take_until},
    combinator::map,
    multi::many0,
    sequence::{preceded, terminated, tuple},
    IResult,
};

use crate::smtp::error::Error;

/// First digit indicates severity
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum Severity {
    /// 2yx
    PositiveCompletion = 2,
    /// 3yz
    PositiveIntermediate = 3,
    /// 4yz
    TransientNegativeCompletion = 4,
    /// 5yz
    PermanentNegativeCompletion = 5,
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}", *self as u8)
    }
}

/// Second digit
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum Category {
    /// x0z
    Syntax = 0,
    /// x1z
    Information = 1,
    /// x2z
    Connections = 2,
    /// x3z
    Unspecified3 = 3,
    /// x4z
    Unspecified4 = 4,
    /// x5z
    MailSystem = 5,
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}", *self as u8)
    }
}

/// The detail digit of a response code (third digit)
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct Detail(pub u8);

impl Display for Detail {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}", self.0)
    }
}

/// Represents a 3 digit SMTP response code
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct Code {
    /// First digit of the response code
    pub severity: Severity,
    /// Second digit of the response code
    pub category: Category,
    /// Third digit
    pub detail: Detail,
}

impl Display for Code {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}{}{}", self.severity, self.category, self.detail)
    }
}

impl Code {
    /// Creates a new `Code` structure
    pub fn new(severity: Severity, category: Category, detail: Detail) -> Code {
        Code {
            severity,
            category,
            detail,
        }
    }

    /// Numeric value of the code, e.g. `250`
    pub fn value(&self) -> u16 {
        u16::from(self.severity as u8) * 100
            + u16::from(self.category as u8) * 10
            + u16::from(self.detail.0)
    }
}

/// Contains an SMTP reply, with separated code and message
///
/// The text message is optional, only present if the reply has one
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Response {
    /// Response code
    pub code: Code,
    /// Server response string (optional)
    /// Handle multiline responses
    pub message: Vec<String>,
}

impl FromStr for Response {
    type Err = Error;

    fn from_str(s: &str) -> result::Result<Response, Error> {
        parse_response(s)
            .map(|(_, r)| r)
            .map_err(Error::from)
    }
}

impl Response {
    /// Creates a new `Response`
    pub fn new(code: Code, message: Vec<String>) -> Response {
        Response { code, message }
    }

    /// Tells if the response is positive
    pub fn is_positive(&self) -> bool {
        matches!(
            self.code.severity,
            Severity::PositiveCompletion | Severity::PositiveIntermediate
        )
    }

    /// Tests code equality
    pub fn has_code(&self, code: u16) -> bool {
        self.code.value() == code
    }

    /// Returns only the first word of the message if possible
    pub fn first_word(&self) -> Option<&str> {
        self.message
            .first()
            .and_then(|line| line.split_whitespace().next())
    }

    /// Returns only the line of the message if possible
    pub fn first_line(&self) -> Option<&str> {
        self.message.first().map(String::as_str)
    }

    /// Every line of the message joined with a space, for human consumption
    pub fn text(&self) -> String {
        self.message.join(" ")
    }
}

// Parsers (originally from tokio-smtp)

fn parse_code(i: &str) -> IResult<&str, Code> {
    let (i, severity) = parse_severity(i)?;
    let (i, category) = parse_category(i)?;
    let (i, detail) = parse_detail(i)?;
    Ok((
        i,
        Code {
            severity,
            category,
            detail,
        },
    ))
}

fn parse_severity(i: &str) -> IResult<&str, Severity> {
    alt((
        map(tag("2"), |_| Severity::PositiveCompletion),
        map(tag("3"), |_| Severity::PositiveIntermediate),
        map(tag("4"), |_| Severity::TransientNegativeCompletion),
        map(tag("5"), |_| Severity::PermanentNegativeCompletion),
    ))(i)
}

fn parse_category(i: &str) -> IResult<&str, Category> {
    alt((
        map(tag("0"), |_| Category::Syntax),
        map(tag("1"), |_| Category::Information),
        map(tag("2"), |_| Category::Connections),
        map(tag("3"), |_| Category::Unspecified3),
        map(tag("4"), |_| Category::Unspecified4),
        map(tag("5"), |_| Category::MailSystem),
    ))(i)
}

fn parse_detail(i: &str) -> IResult<&str, Detail> {
    alt((
        map(tag("0"), |_| Detail(0)),
        map(tag("1"), |_| Detail(1)),
        map(tag("2"), |_| Detail(2)),
        map(tag("3"), |_| Detail(3)),
        map(tag("4"), |_| Detail(4)),
        map(tag("5"), |_| Detail(5)),
        map(tag("6"), |_| Detail(6)),
        map(tag("7"), |_| Detail(7)),
        map(tag("8"), |_| Detail(8)),
        map(tag("9"), |_| Detail(9)),
    ))(i)
}

/// Parses one complete reply from the buffer.
///
/// Returns `nom::Err::Incomplete` while the final line of a (possibly multi-line)
/// reply has not arrived yet, so callers can keep reading.
pub(crate) fn parse_response(i: &str) -> IResult<&str, Response> {
    let (i, lines) = many0(tuple((
        parse_code,
        preceded(tag("-"), take_until("\r\n")),
        tag("\r\n"),
    )))(i)?;
    let (i, (last_code, last_line)) = tuple((
        parse_code,
        alt((
            terminated(preceded(tag(" "), take_until("\r\n")), tag("\r\n")),
            map(tag("\r\n"), |_| ""),
        )),
    ))(i)?;

    // Check that all codes are equal.
    if !lines.iter().all(|&(code, _, _)| code == last_code) {
        return Err(nom::Err::Failure(nom::error::Error::new(
            "",
            nom::error::ErrorKind::Not,
        )));
    }

    // Extract text from lines, and append last line.
    let mut lines: Vec<String> = lines.into_iter().map(|(_, text, _)| text.into()).collect();
    if !last_line.is_empty() {
        lines.push(last_line.to_string());
    }

    Ok((
        i,
        Response {
            code: last_code,
            message: lines,
        },
    ))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_severity_fmt() {
        assert_eq!(format!("{}", Severity::PositiveCompletion), "2");
    }

    #[test]
    fn test_code_display() {
        let code = Code {
            severity: Severity::TransientNegativeCompletion,
            category: Category::Connections,
            detail: Detail(1),
        };

        assert_eq!(code.to_string(), "421");
        assert_eq!(code.value(), 421);
    }

    #[test]
    fn test_response_from_str() {
        let raw_response = "250-me\r\n250-8BITMIME\r\n250-SIZE 42\r\n250 AUTH PLAIN CRAM-MD5\r\n";
        assert_eq!(
            raw_response.parse::<Response>().unwrap(),
            Response {
                code: Code {
                    severity: Severity::PositiveCompletion,
                    category: Category::MailSystem,
                    detail: Detail(0),
                },
                message: vec![
                    "me".to_string(),
                    "8BITMIME".to_string(),
                    "SIZE 42".to_string(),
                    "AUTH PLAIN CRAM-MD5".to_string(),
                ],
            }
        );

        let wrong_code = "2506-me\r\n250-8BITMIME\r\n250-SIZE 42\r\n250 AUTH PLAIN CRAM-MD5\r\n";
        assert!(wrong_code.parse::<Response>().is_err());

        let wrong_end = "250-me\r\n250-8BITMIME\r\n250-SIZE 42\r\n250-AUTH PLAIN CRAM-MD5\r\n";
        assert!(wrong_end.parse::<Response>().is_err());
    }

    #[test]
    fn test_response_without_text() {
        let response: Response = "354\r\n".parse().unwrap();
        assert!(response.has_code(354));
        assert!(response.message.is_empty());
        assert_eq!(response.first_line(), None);
    }

    #[test]
    fn test_partial_response_is_incomplete() {
        assert!(matches!(
            parse_response("250-me\r\n250-PIPELINING\r\n"),
            Err(nom::Err::Incomplete(_))
        ));
        assert!(matches!(
            parse_response("220 smtp.example.com ESMTP"),
            Err(nom::Err::Incomplete(_))
        ));
    }

    #[test]
    fn test_mismatched_codes_fail() {
        assert!(matches!(
            parse_response("250-me\r\n251 other\r\n"),
            Err(nom::Err::Failure(_))
        ));
    }

    #[test]
    fn test_response_is_positive() {
        assert!(Response::new(
            Code {
                severity: Severity::PositiveIntermediate,
                category: Category::MailSystem,
                detail: Detail(4),
            },
            vec!["Start mail input".to_string()],
        )
        .is_positive());
        assert!(!Response::new(
            Code {
                severity: Severity::PermanentNegativeCompletion,
                category: Category::MailSystem,
                detail: Detail(3),
            },
            vec!["5.7.8 Authentication credentials invalid".to_string()],
        )
        .is_positive());
    }

    #[test]
    fn test_response_first_word_and_text() {
        let response: Response = "334 VXNlcm5hbWU6\r\n".parse().unwrap();
        assert_eq!(response.first_word(), Some("VXNlcm5hbWU6"));

        let multi: Response = "554-5.7.1 Relay denied\r\n554 see policy\r\n".parse().unwrap();
        assert_eq!(multi.text(), "5.7.1 Relay denied see policy");
        assert_eq!(multi.first_line(), Some("5.7.1 Relay denied"));
    }
}
