//! Hand-written tokenizer for the MapReduce query language, in the style of
//! the crate's other wire-format parsers (manual scanning, no grammar
//! crate): an index into the source and a small peek/advance interface.

use crate::error::CoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Ident(String),
    Field(String),
    String(String),
    Number(String),
    Star,
    Comma,
    LParen,
    RParen,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Match,
}

pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Lexer<'a> {
        Lexer { src, pos: 0 }
    }

    fn bytes(&self) -> &[u8] {
        self.src.as_bytes()
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.src.len() && self.bytes()[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek_char(&self) -> Option<u8> {
        self.bytes().get(self.pos).copied()
    }

    /// Tokenize the entire input up front; queries are short, so there is no
    /// benefit to a lazy/streaming tokenizer here.
    pub fn tokenize(mut self) -> Result<Vec<Token>, CoreError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            let c = match self.peek_char() {
                Some(c) => c,
                None => break,
            };
            match c {
                // `*` is only a standalone token inside `count(*)`; anywhere
                // else (a bare glob like `*.log` in a `from` clause) it is
                // just another identifier character.
                b'*' if tokens.last() == Some(&Token::LParen) => {
                    tokens.push(Token::Star);
                    self.pos += 1;
                }
                b',' => {
                    tokens.push(Token::Comma);
                    self.pos += 1;
                }
                b'(' => {
                    tokens.push(Token::LParen);
                    self.pos += 1;
                }
                b')' => {
                    tokens.push(Token::RParen);
                    self.pos += 1;
                }
                b'=' if self.bytes().get(self.pos + 1) == Some(&b'~') => {
                    tokens.push(Token::Match);
                    self.pos += 2;
                }
                b'=' => {
                    tokens.push(Token::Eq);
                    self.pos += 1;
                }
                b'!' if self.bytes().get(self.pos + 1) == Some(&b'=') => {
                    tokens.push(Token::Ne);
                    self.pos += 2;
                }
                b'<' if self.bytes().get(self.pos + 1) == Some(&b'=') => {
                    tokens.push(Token::Le);
                    self.pos += 2;
                }
                b'<' => {
                    tokens.push(Token::Lt);
                    self.pos += 1;
                }
                b'>' if self.bytes().get(self.pos + 1) == Some(&b'=') => {
                    tokens.push(Token::Ge);
                    self.pos += 2;
                }
                b'>' => {
                    tokens.push(Token::Gt);
                    self.pos += 1;
                }
                b'"' => {
                    self.pos += 1;
                    let start = self.pos;
                    while self.peek_char().map(|c| c != b'"').unwrap_or(false) {
                        self.pos += 1;
                    }
                    if self.peek_char().is_none() {
                        return Err(CoreError::ParseError("unterminated string".to_string()));
                    }
                    tokens.push(Token::String(self.src[start..self.pos].to_string()));
                    self.pos += 1;
                }
                b'$' => {
                    self.pos += 1;
                    let start = self.pos;
                    while self
                        .peek_char()
                        .map(|c| c.is_ascii_alphanumeric() || c == b'_')
                        .unwrap_or(false)
                    {
                        self.pos += 1;
                    }
                    if self.pos == start {
                        return Err(CoreError::ParseError("bare $ with no field name".to_string()));
                    }
                    tokens.push(Token::Field(self.src[start..self.pos].to_string()));
                }
                c if c.is_ascii_digit() => {
                    let start = self.pos;
                    while self
                        .peek_char()
                        .map(|c| c.is_ascii_digit() || c == b'.')
                        .unwrap_or(false)
                    {
                        self.pos += 1;
                    }
                    tokens.push(Token::Number(self.src[start..self.pos].to_string()));
                }
                c if c.is_ascii_alphabetic() || c == b'_' || c == b'/' || c == b'.' || c == b'*' => {
                    let start = self.pos;
                    while self
                        .peek_char()
                        .map(|c| {
                            c.is_ascii_alphanumeric()
                                || matches!(c, b'_' | b'/' | b'.' | b'*' | b'-')
                        })
                        .unwrap_or(false)
                    {
                        self.pos += 1;
                    }
                    tokens.push(Token::Ident(self.src[start..self.pos].to_string()));
                }
                other => {
                    return Err(CoreError::ParseError(format!(
                        "unexpected character {:?}",
                        other as char
                    )))
                }
            }
        }
        Ok(tokens)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tokenizes_select_clause() {
        let tokens = Lexer::new("select count(*), avg($latency)").tokenize().unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("select".to_string()),
                Token::Ident("count".to_string()),
                Token::LParen,
                Token::Star,
                Token::RParen,
                Token::Comma,
                Token::Ident("avg".to_string()),
                Token::LParen,
                Token::Field("latency".to_string()),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn tokenizes_comparisons_and_strings() {
        let tokens = Lexer::new(r#"where $status = "500""#).tokenize().unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("where".to_string()),
                Token::Field("status".to_string()),
                Token::Eq,
                Token::String("500".to_string()),
            ]
        );
    }

    #[test]
    fn rejects_unterminated_string() {
        assert!(Lexer::new(r#"where $a = "oops"#).tokenize().is_err());
    }

    #[test]
    fn tokenizes_regex_match_operator() {
        let tokens = Lexer::new(r#"where $host =~ "^web""#).tokenize().unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("where".to_string()),
                Token::Field("host".to_string()),
                Token::Match,
                Token::String("^web".to_string()),
            ]
        );
    }
}
