//! STOMP 1.2 frame encoding and decoding.
//!
//! A frame is a command line, a block of `name:value` header lines, a blank
//! line and a body terminated by NUL. Inbound WebSocket messages may carry
//! several frames back to back, and bare EOLs between frames are heartbeats.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;

/// Protocol versions offered in the CONNECT frame
pub const ACCEPT_VERSION: &str = "1.2,1.1,1.0";

/// Heartbeat EOL sent on an idle connection
pub const HEARTBEAT: &str = "\n";

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
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Stomp => "STOMP",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Ack => "ACK",
            Command::Nack => "NACK",
            Command::Begin => "BEGIN",
            Command::Commit => "COMMIT",
            Command::Abort => "ABORT",
            Command::Disconnect => "DISCONNECT",
            Command::Connected => "CONNECTED",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    /// CONNECT and CONNECTED frames never escape header values
    fn escapes_headers(&self) -> bool {
        !matches!(self, Command::Connect | Command::Stomp | Command::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let command = match s {
            "CONNECT" => Command::Connect,
            "STOMP" => Command::Stomp,
            "SEND" => Command::Send,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "ACK" => Command::Ack,
            "NACK" => Command::Nack,
            "BEGIN" => Command::Begin,
            "COMMIT" => Command::Commit,
            "ABORT" => Command::Abort,
            "DISCONNECT" => Command::Disconnect,
            "CONNECTED" => Command::Connected,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            other => {
                return Err(AppError::Protocol(format!("Unknown STOMP command: {}", other)))
            }
        };
        Ok(command)
    }
}

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

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header; repeated headers keep the first occurrence
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Build a CONNECT frame.
    ///
    /// `heartbeat` is `(outgoing, incoming)` as offered by the client.
    pub fn connect(
        host: &str,
        heartbeat: (Duration, Duration),
        extra_headers: &[(String, String)],
    ) -> Self {
        let mut frame = Frame::new(Command::Connect)
            .header("accept-version", ACCEPT_VERSION)
            .header("host", host)
            .header(
                "heart-beat",
                format!("{},{}", heartbeat.0.as_millis(), heartbeat.1.as_millis()),
            );
        for (name, value) in extra_headers {
            frame.headers.push((name.clone(), value.clone()));
        }
        frame
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new(Command::Subscribe)
            .header("id", id)
            .header("destination", destination)
    }

    pub fn disconnect(receipt: &str) -> Self {
        Frame::new(Command::Disconnect).header("receipt", receipt)
    }

    /// Serialize into the wire format, NUL terminator included
    pub fn to_wire(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
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
        if !self.body.is_empty() && self.get_header("content-length").is_none() {
            out.push_str(&format!("content-length:{}\n", self.body.len()));
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Decode every frame contained in one inbound message.
    ///
    /// Returns an empty list when the message only carries heartbeats.
    pub fn parse_all(text: &str) -> Result<Vec<Frame>, AppError> {
        let bytes = text.as_bytes();
        let mut frames = Vec::new();
        let mut pos = 0;

        loop {
            while pos < bytes.len() && (bytes[pos] == b'\n' || bytes[pos] == b'\r') {
                pos += 1;
            }
            if pos >= bytes.len() {
                break;
            }
            let (frame, next) = parse_frame(text, pos)?;
            frames.push(frame);
            pos = next;
        }

        Ok(frames)
    }
}

/// Parse one frame starting at byte offset `start`, returning it with the
/// offset just past its NUL terminator
fn parse_frame(text: &str, start: usize) -> Result<(Frame, usize), AppError> {
    let bytes = text.as_bytes();
    let mut pos = start;

    let command_line = read_line(text, &mut pos)
        .ok_or_else(|| AppError::Protocol("Truncated frame: missing command".to_string()))?;
    let command: Command = command_line.parse()?;
    let unescape = command.escapes_headers();

    let mut headers = Vec::new();
    loop {
        let line = read_line(text, &mut pos)
            .ok_or_else(|| AppError::Protocol("Truncated frame: unterminated headers".to_string()))?;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| AppError::Protocol(format!("Malformed header line: {}", line)))?;
        if unescape {
            headers.push((unescape_header(name)?, unescape_header(value)?));
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    let content_length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .map(|(_, v)| {
            v.trim()
                .parse::<usize>()
                .map_err(|_| AppError::Protocol(format!("Invalid content-length: {}", v)))
        })
        .transpose()?;

    let body_end = match content_length {
        Some(len) => {
            match pos.checked_add(len) {
                Some(end) if end < bytes.len() && bytes[end] == 0 => end,
                _ => {
                    return Err(AppError::Protocol(
                        "Frame body does not match content-length".to_string(),
                    ))
                }
            }
        }
        None => bytes[pos..]
            .iter()
            .position(|b| *b == 0)
            .map(|offset| pos + offset)
            .ok_or_else(|| AppError::Protocol("Frame is missing NUL terminator".to_string()))?,
    };

    let body = std::str::from_utf8(&bytes[pos..body_end])
        .map_err(|e| AppError::Protocol(format!("Frame body is not UTF-8: {}", e)))?
        .to_string();

    Ok((
        Frame {
            command,
            headers,
            body,
        },
        body_end + 1,
    ))
}

/// Read up to the next EOL (`\n` or `\r\n`), advancing `pos` past it
fn read_line<'a>(text: &'a str, pos: &mut usize) -> Option<&'a str> {
    let rest = &text[*pos..];
    let newline = rest.find('\n')?;
    let line = &rest[..newline];
    *pos += newline + 1;
    Some(line.strip_suffix('\r').unwrap_or(line))
}

fn escape_header(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(value: &str) -> Result<String, AppError> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            other => {
                return Err(AppError::Protocol(format!(
                    "Invalid header escape sequence: \\{}",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}

/// Negotiate heartbeat intervals from the client offer and the CONNECTED header.
///
/// Returns `(outgoing, incoming)`; a zero duration means that direction is off.
pub fn negotiate_heartbeat(
    client_outgoing: Duration,
    client_incoming: Duration,
    server_header: Option<&str>,
) -> (Duration, Duration) {
    let (server_outgoing, server_incoming) = server_header
        .and_then(|h| h.split_once(','))
        .and_then(|(sx, sy)| {
            let sx = sx.trim().parse::<u64>().ok()?;
            let sy = sy.trim().parse::<u64>().ok()?;
            Some((Duration::from_millis(sx), Duration::from_millis(sy)))
        })
        .unwrap_or((Duration::ZERO, Duration::ZERO));

    let outgoing = if client_outgoing.is_zero() || server_incoming.is_zero() {
        Duration::ZERO
    } else {
        client_outgoing.max(server_incoming)
    };
    let incoming = if client_incoming.is_zero() || server_outgoing.is_zero() {
        Duration::ZERO
    } else {
        client_incoming.max(server_outgoing)
    };

    (outgoing, incoming)
}
