//! Wire-level constants and inbound command decoding.
//!
//! The message delimiter is `¬`, sent as its UTF-8 byte sequence (`C2 AC`)
//! rather than truncated to a single byte, so both peers agree on the
//! encoding regardless of locale. Field delimiter is `|`; the aggregate
//! section/kv delimiters live in [`crate::aggregate`].

use crate::error::CoreError;
use crate::regexspec::RegexSpec;

/// The protocol version this build speaks. Compatibility is a plain string
/// match; any mismatch is fatal to the session.
pub const PROTOCOL_VERSION: &str = "4.1";
/// Marks the end of one inbound command.
pub const COMMAND_DELIM: u8 = b';';
/// Separates fields within one outbound record.
pub const FIELD_DELIM: char = '|';
/// The message delimiter, as its UTF-8 byte sequence (`C2 AC`).
pub const MESSAGE_DELIM_BYTES: &[u8] = "¬".as_bytes();

/// Which verb an inbound command named.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Grep,
    Cat,
    Tail,
    Map,
    Ack,
    AckClose,
}

impl Verb {
    fn parse(s: &str) -> Option<Verb> {
        match s {
            "grep" => Some(Verb::Grep),
            "cat" => Some(Verb::Cat),
            "tail" => Some(Verb::Tail),
            "map" => Some(Verb::Map),
            "ack" => Some(Verb::Ack),
            ".ack" => Some(Verb::AckClose),
            _ => None,
        }
    }

    /// Parse a verb named on the client's own command line (`dtail cat ...`).
    pub fn from_cli(s: &str) -> Option<Verb> {
        Verb::parse(s)
    }

    fn as_str(self) -> &'static str {
        match self {
            Verb::Grep => "grep",
            Verb::Cat => "cat",
            Verb::Tail => "tail",
            Verb::Map => "map",
            Verb::Ack => "ack",
            Verb::AckClose => ".ack",
        }
    }
}

/// Per-command options carried in the `<cmd>:<opt,opt,...>` head token.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options {
    pub quiet: bool,
    pub plain: bool,
    pub serverless: bool,
    pub before: usize,
    pub after: usize,
    pub max_count: usize,
    pub last_n: usize,
}

impl Options {
    /// Render back to the wire's `key=value,key=value` form.
    fn render(&self) -> String {
        let mut parts = Vec::new();
        if self.quiet {
            parts.push("quiet=true".to_string());
        }
        if self.plain {
            parts.push("plain=true".to_string());
        }
        if self.serverless {
            parts.push("serverless=true".to_string());
        }
        if self.before != 0 {
            parts.push(format!("before={}", self.before));
        }
        if self.after != 0 {
            parts.push(format!("after={}", self.after));
        }
        if self.max_count != 0 {
            parts.push(format!("maxcount={}", self.max_count));
        }
        if self.last_n != 0 {
            parts.push(format!("lastn={}", self.last_n));
        }
        parts.join(",")
    }

    fn parse(raw: &str) -> Options {
        let mut opts = Options::default();
        for opt in raw.split(',').filter(|s| !s.is_empty()) {
            let mut kv = opt.splitn(2, '=');
            let key = kv.next().unwrap_or("");
            let value = kv.next();
            let flag = || value.map(|v| v != "false").unwrap_or(true);
            let num = || value.and_then(|v| v.parse().ok()).unwrap_or(0);
            match key {
                "quiet" => opts.quiet = flag(),
                "plain" => opts.plain = flag(),
                "serverless" => opts.serverless = flag(),
                "before" => opts.before = num(),
                "after" => opts.after = num(),
                "maxcount" | "max_count" => opts.max_count = num(),
                "lastn" | "last_n" => opts.last_n = num(),
                _ => {}
            }
        }
        opts
    }
}

/// The payload tail of a command, whose shape depends on `verb`.
#[derive(Debug, Clone)]
pub enum Payload {
    Regex(RegexSpec),
    Query(String),
    Text(String),
    None,
}

/// One fully decoded inbound command.
#[derive(Debug, Clone)]
pub struct Command {
    pub verb: Verb,
    pub options: Options,
    pub glob: String,
    pub payload: Payload,
}

fn parse_err(msg: impl Into<String>) -> CoreError {
    CoreError::ParseError(msg.into())
}

/// Decode one command. `line` is everything up to (not including) the
/// trailing `;` delimiter.
pub fn decode(line: &str) -> Result<Command, CoreError> {
    let rest = line
        .trim()
        .strip_prefix("protocol ")
        .ok_or_else(|| parse_err("missing protocol header"))?;
    let mut parts = rest.splitn(2, ' ');
    let version = parts.next().unwrap_or("");
    if version != PROTOCOL_VERSION {
        return Err(CoreError::ProtocolMismatch {
            expected: PROTOCOL_VERSION.to_string(),
            got: version.to_string(),
        });
    }
    let body = parts.next().unwrap_or("").trim();
    if let Some(payload) = body.strip_prefix("base64 ") {
        let decoded = base64::decode(payload.trim())
            .map_err(|e| parse_err(format!("bad base64 envelope: {}", e)))?;
        let argv = String::from_utf8(decoded)
            .map_err(|e| parse_err(format!("base64 payload not utf8: {}", e)))?;
        return decode_body(&argv);
    }
    decode_body(body)
}

fn decode_body(body: &str) -> Result<Command, CoreError> {
    let mut tokens = body.trim().splitn(2, ' ');
    let head = tokens.next().unwrap_or("");
    let remainder = tokens.next().unwrap_or("").trim();

    let mut head_parts = head.splitn(2, ':');
    let verb_str = head_parts.next().unwrap_or("");
    let opts_str = head_parts.next().unwrap_or("");
    let verb = Verb::parse(verb_str).ok_or_else(|| parse_err(format!("unknown command '{}'", verb_str)))?;
    let options = Options::parse(opts_str);

    if matches!(verb, Verb::Ack | Verb::AckClose) {
        return Ok(Command {
            verb,
            options,
            glob: String::new(),
            payload: Payload::Text(remainder.to_string()),
        });
    }

    let mut rest_tokens = remainder.splitn(2, ' ');
    let glob = rest_tokens.next().unwrap_or("").to_string();
    let tail = rest_tokens.next().unwrap_or("").trim();

    let payload = if verb == Verb::Map {
        Payload::Query(tail.to_string())
    } else if tail.is_empty() {
        Payload::None
    } else {
        Payload::Regex(RegexSpec::parse(tail)?)
    };

    Ok(Command {
        verb,
        options,
        glob,
        payload,
    })
}

impl Command {
    /// Render this command back to the wire form a server's [`decode`]
    /// accepts, including the `protocol <ver>` header.
    pub fn encode(&self) -> String {
        let opts = self.options.render();
        let head = format!("{}:{}", self.verb.as_str(), opts);
        let body = match &self.payload {
            Payload::Regex(spec) => format!("{} {} {}", head, self.glob, spec.serialize()),
            Payload::Query(q) => format!("{} {} {}", head, self.glob, q),
            Payload::Text(t) => format!("{} {}", head, t).trim_end().to_string(),
            Payload::None => format!("{} {}", head, self.glob),
        };
        format!("protocol {} {}", PROTOCOL_VERSION, body)
    }

    /// Build a close-request command, sent by whichever side initiates the
    /// handshake.
    pub fn close_request() -> Command {
        Command {
            verb: Verb::Ack,
            options: Options::default(),
            glob: String::new(),
            payload: Payload::Text("close connection".to_string()),
        }
    }
}

/// Does this command's `ack` close the session?
pub fn is_close_ack(cmd: &Command) -> bool {
    matches!(cmd.verb, Verb::Ack | Verb::AckClose)
        && matches!(&cmd.payload, Payload::Text(t) if t.trim() == "close connection")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decodes_plain_cat_command() {
        let cmd = decode("protocol 4.1 cat:plain=true /var/log/app.log regex:noop").unwrap();
        assert!(matches!(cmd.verb, Verb::Cat));
        assert!(cmd.options.plain);
        assert_eq!(cmd.glob, "/var/log/app.log");
        assert!(matches!(cmd.payload, Payload::Regex(ref r) if r.noop));
    }

    #[test]
    fn decodes_grep_with_context_options() {
        let cmd = decode("protocol 4.1 grep:before=1,after=1 file regex:default ERROR").unwrap();
        assert_eq!(cmd.options.before, 1);
        assert_eq!(cmd.options.after, 1);
        match cmd.payload {
            Payload::Regex(r) => assert_eq!(r.pattern, "ERROR"),
            _ => panic!("expected a regex payload"),
        }
    }

    #[test]
    fn decodes_map_command_with_query_tail() {
        let cmd = decode("protocol 4.1 map: app.log select count(*) from app.log").unwrap();
        match cmd.payload {
            Payload::Query(q) => assert_eq!(q, "select count(*) from app.log"),
            _ => panic!("expected a query payload"),
        }
    }

    #[test]
    fn version_mismatch_is_protocol_error() {
        let result = decode("protocol 3.0 cat:plain=true file regex:noop");
        assert!(matches!(result, Err(CoreError::ProtocolMismatch { .. })));
    }

    #[test]
    fn decodes_base64_envelope() {
        use base64::encode;
        let inner = "cat:plain=true file regex:noop";
        let wire = format!("protocol 4.1 base64 {}", encode(inner));
        let cmd = decode(&wire).unwrap();
        assert!(matches!(cmd.verb, Verb::Cat));
        assert_eq!(cmd.glob, "file");
    }

    #[test]
    fn recognizes_close_ack() {
        let cmd = decode("protocol 4.1 ack close connection").unwrap();
        assert!(is_close_ack(&cmd));
    }

    #[test]
    fn missing_protocol_header_is_rejected() {
        assert!(decode("cat:plain=true file regex:noop").is_err());
    }

    #[test]
    fn encode_then_decode_roundtrips_a_grep_command() {
        let original = Command {
            verb: Verb::Grep,
            options: Options { before: 1, after: 2, ..Default::default() },
            glob: "/var/log/*.log".to_string(),
            payload: Payload::Regex(RegexSpec::detect("ERROR")),
        };
        let wire = original.encode();
        let decoded = decode(&wire).unwrap();
        assert_eq!(decoded.glob, original.glob);
        assert_eq!(decoded.options.before, 1);
        assert_eq!(decoded.options.after, 2);
    }

    #[test]
    fn close_request_encodes_to_the_close_phrase() {
        let wire = Command::close_request().encode();
        assert!(wire.ends_with("close connection"));
        assert!(is_close_ack(&decode(&wire).unwrap()));
    }
}
