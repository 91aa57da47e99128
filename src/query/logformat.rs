//! The catalog of log line formats the MapReduce processor can parse into
//! named fields. Concrete stand-in for the spec's abstract `logformat <name>`
//! clause.

use indexmap::IndexMap;

/// How to split one raw line into named fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    /// Whitespace-tokenized: field `0` is the whole line, `1..n` its tokens.
    Plain,
    /// `key=value key2="quoted value"` pairs, space separated.
    Logfmt,
    /// A single top-level JSON object per line; scalar values stringified,
    /// nested objects/arrays re-serialized as JSON text.
    Json,
    /// Delimiter-separated, like `Plain` but with a caller-chosen delimiter
    /// instead of whitespace.
    Csv { delimiter: char },
}

impl LogFormat {
    /// Parse `line` (already stripped of its trailing newline) into fields,
    /// keyed the same way a `WHERE`/`SET`/`GROUP BY` clause names them with
    /// `$name` (the token lexes to the bare name, so keys here never carry
    /// the `$`). Lines that don't fit the format at all (malformed JSON, say)
    /// parse to a map with just `0` set to the raw line, rather than failing
    /// the whole command over one bad line.
    pub fn parse(&self, line: &[u8]) -> IndexMap<String, String> {
        match self {
            LogFormat::Plain => parse_tokenized(line, |c: char| c.is_whitespace()),
            LogFormat::Logfmt => parse_logfmt(line),
            LogFormat::Json => parse_json(line),
            LogFormat::Csv { delimiter } => {
                let delimiter = *delimiter;
                parse_tokenized(line, move |c| c == delimiter)
            }
        }
    }
}

fn whole_line(line: &[u8]) -> String {
    String::from_utf8_lossy(line).into_owned()
}

fn parse_tokenized(line: &[u8], is_sep: impl Fn(char) -> bool) -> IndexMap<String, String> {
    let text = whole_line(line);
    let mut fields = IndexMap::new();
    fields.insert("0".to_string(), text.clone());
    for (i, token) in text.split(is_sep).filter(|t| !t.is_empty()).enumerate() {
        fields.insert((i + 1).to_string(), token.to_string());
    }
    fields
}

fn parse_logfmt(line: &[u8]) -> IndexMap<String, String> {
    let text = whole_line(line);
    let mut fields = IndexMap::new();
    fields.insert("0".to_string(), text.clone());
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        while i < bytes.len() && bytes[i] == b' ' {
            i += 1;
        }
        let key_start = i;
        while i < bytes.len() && bytes[i] != b'=' && bytes[i] != b' ' {
            i += 1;
        }
        if key_start == i || i >= bytes.len() || bytes[i] != b'=' {
            // No `=` found for this token; skip to the next space.
            while i < bytes.len() && bytes[i] != b' ' {
                i += 1;
            }
            continue;
        }
        let key = &text[key_start..i];
        i += 1; // skip '='
        let value = if i < bytes.len() && bytes[i] == b'"' {
            i += 1;
            let value_start = i;
            while i < bytes.len() && bytes[i] != b'"' {
                i += 1;
            }
            let value = &text[value_start..i];
            if i < bytes.len() {
                i += 1; // skip closing quote
            }
            value
        } else {
            let value_start = i;
            while i < bytes.len() && bytes[i] != b' ' {
                i += 1;
            }
            &text[value_start..i]
        };
        fields.insert(key.to_string(), value.to_string());
    }
    fields
}

fn parse_json(line: &[u8]) -> IndexMap<String, String> {
    let text = whole_line(line);
    let mut fields = IndexMap::new();
    fields.insert("0".to_string(), text.clone());
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_slice::<serde_json::Value>(line) {
        for (key, value) in map {
            let rendered = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            };
            fields.insert(key, rendered);
        }
    }
    fields
}
