//! STOMP 1.2 프레임 인코딩/디코딩.
//!
//! WebSocket 텍스트 메시지 하나에 프레임 하나 이상이 들어올 수 있습니다.
//! 단독 EOL은 heart-beat로 취급합니다.

use std::fmt;
use thiserror::Error;

/// 프레임 종료 문자.
const NUL: char = '\0';

/// 프레임 파싱 에러.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// 알 수 없는 명령
    #[error("알 수 없는 STOMP 명령: {0}")]
    UnknownCommand(String),

    /// 헤더 형식 오류
    #[error("잘못된 헤더: {0}")]
    InvalidHeader(String),

    /// 헤더 이스케이프 오류
    #[error("잘못된 이스케이프 시퀀스: {0}")]
    InvalidEscape(String),

    /// 본문이 끝나지 않음
    #[error("프레임이 NUL로 끝나지 않습니다")]
    Unterminated,

    /// content-length 오류
    #[error("잘못된 content-length: {0}")]
    InvalidContentLength(String),
}

/// STOMP 명령.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Stomp,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Ack,
    Nack,
    Begin,
    Commit,
    Abort,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl Command {
    /// 와이어 표기.
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Stomp => "STOMP",
            Command::Connected => "CONNECTED",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Ack => "ACK",
            Command::Nack => "NACK",
            Command::Begin => "BEGIN",
            Command::Commit => "COMMIT",
            Command::Abort => "ABORT",
            Command::Disconnect => "DISCONNECT",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    // CONNECT/CONNECTED 헤더는 이스케이프하지 않는다
    fn escapes_headers(&self) -> bool {
        !matches!(self, Command::Connect | Command::Stomp | Command::Connected)
    }
}

impl std::str::FromStr for Command {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "CONNECT" => Command::Connect,
            "STOMP" => Command::Stomp,
            "CONNECTED" => Command::Connected,
            "SEND" => Command::Send,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "ACK" => Command::Ack,
            "NACK" => Command::Nack,
            "BEGIN" => Command::Begin,
            "COMMIT" => Command::Commit,
            "ABORT" => Command::Abort,
            "DISCONNECT" => Command::Disconnect,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            other => return Err(FrameError::UnknownCommand(other.to_string())),
        })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// STOMP 프레임.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// 명령
    pub command: Command,
    /// 헤더 (순서 유지, 중복 허용)
    pub headers: Vec<(String, String)>,
    /// 본문
    pub body: String,
}

impl Frame {
    /// 빈 프레임 생성.
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// 헤더 추가.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// 본문 설정.
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// 헤더 조회. 중복 헤더는 첫 번째 값이 우선합니다.
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// CONNECT 프레임.
    pub fn connect(host: &str, authorization: Option<&str>, heartbeat_ms: u64) -> Self {
        let mut frame = Frame::new(Command::Connect)
            .header("accept-version", "1.2,1.1,1.0")
            .header("host", host)
            .header("heart-beat", format!("{},{}", heartbeat_ms, heartbeat_ms));
        if let Some(value) = authorization {
            frame = frame.header("Authorization", value);
        }
        frame
    }

    /// SUBSCRIBE 프레임.
    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new(Command::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    /// UNSUBSCRIBE 프레임.
    pub fn unsubscribe(id: &str) -> Self {
        Frame::new(Command::Unsubscribe).header("id", id)
    }

    /// DISCONNECT 프레임.
    pub fn disconnect() -> Self {
        Frame::new(Command::Disconnect)
    }

    /// 와이어 형식으로 인코딩.
    pub fn encode(&self) -> String {
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
        out.push(NUL);
        out
    }

    /// 단일 프레임 디코딩. heart-beat만 있으면 `None`.
    pub fn decode(text: &str) -> Result<Option<Frame>, FrameError> {
        Ok(Self::decode_all(text)?.into_iter().next())
    }

    /// 메시지 안의 모든 프레임 디코딩.
    pub fn decode_all(text: &str) -> Result<Vec<Frame>, FrameError> {
        let mut frames = Vec::new();
        let mut rest = text;

        loop {
            rest = rest.trim_start_matches(['\r', '\n']);
            if rest.is_empty() {
                break;
            }
            let (frame, remaining) = Self::decode_one(rest)?;
            frames.push(frame);
            rest = remaining;
        }

        Ok(frames)
    }

    fn decode_one(text: &str) -> Result<(Frame, &str), FrameError> {
        let (command_line, mut rest) = split_line(text).ok_or(FrameError::Unterminated)?;
        let command: Command = command_line.parse()?;
        let unescape = command.escapes_headers();

        let mut headers = Vec::new();
        loop {
            let (line, remaining) = split_line(rest).ok_or(FrameError::Unterminated)?;
            rest = remaining;
            if line.is_empty() {
                break;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| FrameError::InvalidHeader(line.to_string()))?;
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
                    .map_err(|_| FrameError::InvalidContentLength(v.clone()))
            })
            .transpose()?;

        let (body, after) = match content_length {
            Some(len) => {
                let body = rest
                    .get(..len)
                    .ok_or_else(|| FrameError::InvalidContentLength(len.to_string()))?;
                let after = rest[len..]
                    .strip_prefix(NUL)
                    .ok_or(FrameError::Unterminated)?;
                (body, after)
            }
            None => {
                let end = rest.find(NUL).ok_or(FrameError::Unterminated)?;
                (&rest[..end], &rest[end + 1..])
            }
        };

        Ok((
            Frame {
                command,
                headers,
                body: body.to_string(),
            },
            after,
        ))
    }
}

fn split_line(text: &str) -> Option<(&str, &str)> {
    let idx = text.find('\n')?;
    let line = &text[..idx];
    Some((line.strip_suffix('\r').unwrap_or(line), &text[idx + 1..]))
}

fn escape_header(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_header(value: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
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
            _ => return Err(FrameError::InvalidEscape(value.to_string())),
        }
    }
    Ok(out)
}
