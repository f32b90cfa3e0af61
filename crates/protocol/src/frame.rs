//! STOMP 1.2 frame codec.
//!
//! A frame on the wire is:
//!
//! ```text
//! COMMAND\n
//! header1:value1\n
//! header2:value2\n
//! \n
//! body^@
//! ```
//!
//! Frames are carried as WebSocket text messages. A single message may hold
//! several frames and any number of heart-beat EOLs between them.

use std::fmt;
use std::str::FromStr;

use crate::constants::JSON_CONTENT_TYPE;

/// Errors produced while decoding a frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("malformed header line: {0}")]
    MalformedHeader(String),

    #[error("invalid escape sequence in header: {0}")]
    InvalidEscape(String),

    #[error("invalid content-length: {0}")]
    InvalidContentLength(String),

    #[error("frame is missing its NUL terminator")]
    Unterminated,
}

/// STOMP command, client and server side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    // Client frames
    Connect,
    Stomp,
    Send,
    Subscribe,
    Unsubscribe,
    Ack,
    Nack,
    Begin,
    Commit,
    Abort,
    Disconnect,

    // Server frames
    Connected,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Stomp => "STOMP",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Ack => "ACK",
            Self::Nack => "NACK",
            Self::Begin => "BEGIN",
            Self::Commit => "COMMIT",
            Self::Abort => "ABORT",
            Self::Disconnect => "DISCONNECT",
            Self::Connected => "CONNECTED",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    /// CONNECT and CONNECTED headers are sent verbatim for 1.0 compatibility.
    fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }
}

impl FromStr for Command {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "CONNECT" => Self::Connect,
            "STOMP" => Self::Stomp,
            "SEND" => Self::Send,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "ACK" => Self::Ack,
            "NACK" => Self::Nack,
            "BEGIN" => Self::Begin,
            "COMMIT" => Self::Commit,
            "ABORT" => Self::Abort,
            "DISCONNECT" => Self::Disconnect,
            "CONNECTED" => Self::Connected,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            other => return Err(FrameError::UnknownCommand(other.to_string())),
        })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single STOMP frame.
///
/// Headers keep their wire order. When a header is repeated, the first
/// occurrence is authoritative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Appends a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the value of the first header called `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// SUBSCRIBE frame for `destination`, identified by `id`.
    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(Command::Subscribe)
            .header("id", id)
            .header("destination", destination)
    }

    pub fn unsubscribe(id: &str) -> Self {
        Self::new(Command::Unsubscribe).header("id", id)
    }

    /// SEND frame carrying a JSON body.
    pub fn send_json(destination: &str, body: impl Into<String>) -> Self {
        let body = body.into();
        Self::new(Command::Send)
            .header("destination", destination)
            .header("content-type", JSON_CONTENT_TYPE)
            .header("content-length", body.len().to_string())
            .with_body(body)
    }

    pub fn disconnect() -> Self {
        Self::new(Command::Disconnect)
    }

    /// Human-readable reason carried by an ERROR frame.
    pub fn error_message(&self) -> String {
        match self.get("message") {
            Some(m) if !m.is_empty() => m.to_string(),
            _ if !self.body.is_empty() => self.body.trim().to_string(),
            _ => "no reason given".to_string(),
        }
    }

    /// Serialises the frame, NUL terminator included.
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.body.len() + 64);
        out.push_str(self.command.as_str());
        out.push('\n');
        let escape = self.command.escapes_headers();
        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }
}

/// Decodes every frame in `text`.
///
/// Heart-beat EOLs before, between and after frames are skipped, so a
/// message that is only a heart-beat yields an empty vector.
pub fn parse_frames(text: &str) -> Result<Vec<Frame>, FrameError> {
    let mut frames = Vec::new();
    let mut rest = text;
    loop {
        rest = rest.trim_start_matches(['\n', '\r']);
        if rest.is_empty() {
            return Ok(frames);
        }
        let (frame, remaining) = parse_one(rest)?;
        frames.push(frame);
        rest = remaining;
    }
}

fn parse_one(input: &str) -> Result<(Frame, &str), FrameError> {
    let (command_line, mut rest) = split_line(input).ok_or(FrameError::Unterminated)?;
    let command: Command = command_line.parse()?;
    let escaped = command.escapes_headers();

    let mut headers = Vec::new();
    loop {
        let (line, after) = split_line(rest).ok_or(FrameError::Unterminated)?;
        rest = after;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
        if escaped {
            headers.push((unescape_header(name)?, unescape_header(value)?));
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    let content_length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .map(|(_, v)| v.clone());

    let (body, after_body) = match content_length {
        Some(raw) => {
            let len: usize = raw
                .trim()
                .parse()
                .map_err(|_| FrameError::InvalidContentLength(raw.clone()))?;
            let body = rest
                .get(..len)
                .ok_or_else(|| FrameError::InvalidContentLength(raw.clone()))?;
            let after = &rest[len..];
            let after = after.strip_prefix('\0').ok_or(FrameError::Unterminated)?;
            (body, after)
        }
        None => {
            let nul = rest.find('\0').ok_or(FrameError::Unterminated)?;
            (&rest[..nul], &rest[nul + 1..])
        }
    };

    Ok((
        Frame {
            command,
            headers,
            body: body.to_string(),
        },
        after_body,
    ))
}

/// Splits off one line, accepting both LF and CRLF endings.
fn split_line(input: &str) -> Option<(&str, &str)> {
    let idx = input.find('\n')?;
    let line = &input[..idx];
    let line = line.strip_suffix('\r').unwrap_or(line);
    Some((line, &input[idx + 1..]))
}

fn escape_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(raw: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(FrameError::InvalidEscape(raw.to_string())),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_connected_frame() {
        let text = "CONNECTED\nversion:1.2\nheart-beat:0,10000\n\n\0";
        let frames = parse_frames(text).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].command, Command::Connected);
        assert_eq!(frames[0].get("version"), Some("1.2"));
        assert_eq!(frames[0].get("heart-beat"), Some("0,10000"));
        assert!(frames[0].body.is_empty());
    }

    #[test]
    fn heartbeat_only_message_yields_nothing() {
        assert!(parse_frames("\n").unwrap().is_empty());
        assert!(parse_frames("\r\n\n").unwrap().is_empty());
        assert!(parse_frames("").unwrap().is_empty());
    }

    #[test]
    fn parses_multiple_frames_with_heartbeats_between() {
        let text = "\nMESSAGE\nsubscription:sub-0\n\n{\"a\":1}\0\n\nRECEIPT\nreceipt-id:7\n\n\0\n";
        let frames = parse_frames(text).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].command, Command::Message);
        assert_eq!(frames[0].body, "{\"a\":1}");
        assert_eq!(frames[1].command, Command::Receipt);
        assert_eq!(frames[1].get("receipt-id"), Some("7"));
    }

    #[test]
    fn accepts_crlf_line_endings() {
        let text = "MESSAGE\r\ndestination:/topic/x\r\n\r\nhi\0";
        let frames = parse_frames(text).unwrap();
        assert_eq!(frames[0].get("destination"), Some("/topic/x"));
        assert_eq!(frames[0].body, "hi");
    }

    #[test]
    fn content_length_allows_embedded_nul() {
        let text = "MESSAGE\ncontent-length:3\n\na\0b\0";
        let frames = parse_frames(text).unwrap();
        assert_eq!(frames[0].body, "a\0b");
    }

    #[test]
    fn rejects_bad_content_length() {
        let err = parse_frames("MESSAGE\ncontent-length:99\n\nshort\0").unwrap_err();
        assert!(matches!(err, FrameError::InvalidContentLength(_)));

        let err = parse_frames("MESSAGE\ncontent-length:abc\n\nx\0").unwrap_err();
        assert!(matches!(err, FrameError::InvalidContentLength(_)));
    }

    #[test]
    fn rejects_unknown_command_and_missing_terminator() {
        assert_eq!(
            parse_frames("HELLO\n\n\0").unwrap_err(),
            FrameError::UnknownCommand("HELLO".into())
        );
        assert_eq!(
            parse_frames("MESSAGE\n\nno terminator").unwrap_err(),
            FrameError::Unterminated
        );
    }

    #[test]
    fn rejects_header_without_colon() {
        let err = parse_frames("MESSAGE\nbogus\n\n\0").unwrap_err();
        assert!(matches!(err, FrameError::MalformedHeader(_)));
    }

    #[test]
    fn escapes_headers_except_on_connect() {
        let frame = Frame::new(Command::Send).header("x-room", "a:b\nc\\d");
        assert!(frame.encode().contains("x-room:a\\cb\\nc\\\\d\n"));

        let connect = Frame::new(Command::Connect).header("host", "api.example.com:8443");
        assert!(connect.encode().contains("host:api.example.com:8443\n"));
    }

    #[test]
    fn unescapes_headers_on_decode() {
        let frames = parse_frames("MESSAGE\nx-room:a\\cb\\nc\\\\d\n\n\0").unwrap();
        assert_eq!(frames[0].get("x-room"), Some("a:b\nc\\d"));

        let err = parse_frames("MESSAGE\nx:\\q\n\n\0").unwrap_err();
        assert!(matches!(err, FrameError::InvalidEscape(_)));
    }

    #[test]
    fn first_repeated_header_wins() {
        let frames = parse_frames("MESSAGE\nfoo:one\nfoo:two\n\n\0").unwrap();
        assert_eq!(frames[0].get("foo"), Some("one"));
    }

    #[test]
    fn send_json_sets_content_headers() {
        let frame = Frame::send_json("/app/chat/room-1", "{\"text\":\"hé\"}");
        assert_eq!(frame.get("content-type"), Some(JSON_CONTENT_TYPE));
        assert_eq!(frame.get("content-length"), Some("14"));

        let decoded = parse_frames(&frame.encode()).unwrap();
        assert_eq!(decoded[0], frame);
    }

    #[test]
    fn error_message_prefers_header() {
        let frame = Frame::new(Command::Error)
            .header("message", "bad token")
            .with_body("details");
        assert_eq!(frame.error_message(), "bad token");

        let frame = Frame::new(Command::Error).with_body("  only body \n");
        assert_eq!(frame.error_message(), "only body");

        assert_eq!(Frame::new(Command::Error).error_message(), "no reason given");
    }

    #[test]
    fn command_display_matches_wire() {
        assert_eq!(Command::Unsubscribe.to_string(), "UNSUBSCRIBE");
        assert_eq!("ERROR".parse::<Command>().unwrap(), Command::Error);
    }
}
