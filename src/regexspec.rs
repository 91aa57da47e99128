//! The serialized regex format carried on the wire: `regex:<flags> <pattern>`,
//! where `<flags>` is a comma-separated subset of `default`, `invert`,
//! `literal`, `noop`. A server never re-derives the literal-vs-regex decision
//! from a bare pattern it receives from a peer; the peer who first saw the
//! user's filter text makes that call once and serializes the result, so the
//! decision is stable across a multi-hop fan-out.

use crate::error::CoreError;
use regex::bytes::Regex;

const PREFIX: &str = "regex:";

/// One parsed filter specification.
#[derive(Debug, Clone)]
pub struct RegexSpec {
    /// The pattern text, literal or regex depending on `literal`.
    pub pattern: String,
    /// Keep lines that do *not* match, instead of ones that do.
    pub invert: bool,
    /// Match `pattern` as a plain substring rather than compiling it as a
    /// regex.
    pub literal: bool,
    /// Match everything; used by processors (cat) that share the grep
    /// pipeline but apply no filter of their own.
    pub noop: bool,
}

impl RegexSpec {
    /// Build a spec for `pattern`, auto-detecting whether it should be
    /// treated as a literal (no metacharacters present).
    pub fn detect(pattern: impl Into<String>) -> RegexSpec {
        let pattern = pattern.into();
        let literal = is_literal_pattern(&pattern);
        RegexSpec {
            pattern,
            invert: false,
            literal,
            noop: false,
        }
    }

    /// A spec that matches every line, for processors that need a
    /// `CompiledMatcher` but apply no real filter.
    pub fn noop() -> RegexSpec {
        RegexSpec {
            pattern: String::new(),
            invert: false,
            literal: false,
            noop: true,
        }
    }

    /// Parse the wire form `regex:<flags> <pattern>`.
    pub fn parse(s: &str) -> Result<RegexSpec, CoreError> {
        let rest = s
            .strip_prefix(PREFIX)
            .ok_or_else(|| CoreError::ParseError(format!("missing {} prefix", PREFIX)))?;
        let (flags_str, pattern) = match rest.find(' ') {
            Some(idx) => (&rest[..idx], &rest[idx + 1..]),
            None => (rest, ""),
        };
        let mut spec = RegexSpec {
            pattern: pattern.to_string(),
            invert: false,
            literal: false,
            noop: false,
        };
        for flag in flags_str.split(',') {
            match flag {
                "default" | "" => {}
                "invert" => spec.invert = true,
                "literal" => spec.literal = true,
                "noop" => spec.noop = true,
                other => {
                    return Err(CoreError::ParseError(format!(
                        "unknown regex flag {}",
                        other
                    )))
                }
            }
        }
        Ok(spec)
    }

    /// Render the wire form.
    pub fn serialize(&self) -> String {
        let mut flags = Vec::new();
        if self.invert {
            flags.push("invert");
        }
        if self.literal {
            flags.push("literal");
        }
        if self.noop {
            flags.push("noop");
        }
        if flags.is_empty() {
            flags.push("default");
        }
        format!("{}{} {}", PREFIX, flags.join(","), self.pattern)
    }

    /// Compile this spec into something that can be applied to lines.
    pub fn compile(&self) -> Result<CompiledMatcher, CoreError> {
        if self.noop {
            return Ok(CompiledMatcher {
                kind: MatcherKind::Noop,
                invert: self.invert,
            });
        }
        let kind = if self.literal {
            MatcherKind::Literal(self.pattern.clone())
        } else {
            let re = Regex::new(&self.pattern)
                .map_err(|e| CoreError::ParseError(format!("invalid regex: {}", e)))?;
            MatcherKind::Regex(Box::new(re))
        };
        Ok(CompiledMatcher {
            kind,
            invert: self.invert,
        })
    }
}

enum MatcherKind {
    Literal(String),
    Regex(Box<Regex>),
    Noop,
}

/// A compiled, ready-to-apply filter.
pub struct CompiledMatcher {
    kind: MatcherKind,
    invert: bool,
}

impl CompiledMatcher {
    /// Does `line` pass this filter, accounting for `invert`?
    pub fn matches(&self, line: &[u8]) -> bool {
        let hit = match &self.kind {
            MatcherKind::Noop => true,
            MatcherKind::Literal(pat) => contains_bytes(line, pat.as_bytes()),
            MatcherKind::Regex(re) => re.is_match(line),
        };
        hit != self.invert
    }
}

fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Absence of regex metacharacters makes a pattern eligible for the faster
/// literal substring path.
pub fn is_literal_pattern(pattern: &str) -> bool {
    !pattern
        .chars()
        .any(|c| matches!(c, '.' | '^' | '$' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '\\'))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn detect_flags_plain_text_as_literal() {
        let spec = RegexSpec::detect("ERROR");
        assert!(spec.literal);
    }

    #[test]
    fn detect_flags_metacharacters_as_regex() {
        let spec = RegexSpec::detect("ERR.*");
        assert!(!spec.literal);
    }

    #[test]
    fn roundtrips_through_wire_form() {
        let spec = RegexSpec {
            pattern: "ERROR".to_string(),
            invert: true,
            literal: true,
            noop: false,
        };
        let wire = spec.serialize();
        let parsed = RegexSpec::parse(&wire).unwrap();
        assert_eq!(parsed.pattern, "ERROR");
        assert!(parsed.invert);
        assert!(parsed.literal);
    }

    #[test]
    fn default_flag_means_no_flags() {
        let spec = RegexSpec::parse("regex:default ERROR").unwrap();
        assert!(!spec.invert && !spec.literal && !spec.noop);
    }

    #[test]
    fn literal_matcher_does_substring_match() {
        let spec = RegexSpec {
            pattern: "foo".into(),
            invert: false,
            literal: true,
            noop: false,
        };
        let m = spec.compile().unwrap();
        assert!(m.matches(b"a foo bar"));
        assert!(!m.matches(b"a bar baz"));
    }

    #[test]
    fn invert_flips_the_result() {
        let spec = RegexSpec {
            pattern: "foo".into(),
            invert: true,
            literal: true,
            noop: false,
        };
        let m = spec.compile().unwrap();
        assert!(!m.matches(b"a foo bar"));
        assert!(m.matches(b"a bar baz"));
    }

    #[test]
    fn noop_matches_everything() {
        let m = RegexSpec::noop().compile().unwrap();
        assert!(m.matches(b"anything at all"));
        assert!(m.matches(b""));
    }

    #[test]
    fn unknown_flag_is_rejected() {
        assert!(RegexSpec::parse("regex:bogus foo").is_err());
    }

    #[test]
    fn missing_prefix_is_rejected() {
        assert!(RegexSpec::parse("ERROR").is_err());
    }
}
