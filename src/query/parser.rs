//! Recursive-descent parser over the token stream from [`crate::query::lexer`].
//!
//! Clauses are keyword-anchored and accepted in any order (`select` and
//! `from` are mandatory, everything else optional); each clause's own
//! grammar is fixed regardless of where it appears in the query text.

use crate::error::CoreError;
use crate::query::lexer::{Lexer, Token};
use crate::query::logformat::LogFormat;
use crate::query::{Cmp, Expr, Outfile, Query, SelectOp, SelectSpec, SetClause, WhereClause};
use std::time::Duration;

/// Parse a full query string.
pub fn parse(src: &str) -> Result<Query, CoreError> {
    let tokens = Lexer::new(src).tokenize()?;
    Parser { tokens, pos: 0 }.parse_query()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, want: Token) -> Result<(), CoreError> {
        match self.advance() {
            Some(ref t) if *t == want => Ok(()),
            other => Err(CoreError::ParseError(format!(
                "expected {:?}, got {:?}",
                want, other
            ))),
        }
    }

    fn expect_ident(&mut self) -> Result<String, CoreError> {
        match self.advance() {
            Some(Token::Ident(s)) => Ok(s),
            other => Err(CoreError::ParseError(format!(
                "expected identifier, got {:?}",
                other
            ))),
        }
    }

    fn expect_field(&mut self) -> Result<String, CoreError> {
        match self.advance() {
            Some(Token::Field(s)) => Ok(s),
            other => Err(CoreError::ParseError(format!(
                "expected $field, got {:?}",
                other
            ))),
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<(), CoreError> {
        match self.advance() {
            Some(Token::Ident(ref s)) if s.eq_ignore_ascii_case(kw) => Ok(()),
            other => Err(CoreError::ParseError(format!(
                "expected '{}', got {:?}",
                kw, other
            ))),
        }
    }

    fn peek_keyword(&self) -> Option<String> {
        match self.peek() {
            Some(Token::Ident(s)) => Some(s.to_lowercase()),
            _ => None,
        }
    }

    fn parse_query(&mut self) -> Result<Query, CoreError> {
        let mut select = None;
        let mut table = None;
        let mut where_clauses = Vec::new();
        let mut set_clauses = Vec::new();
        let mut group_by = Vec::new();
        let mut order_by = None;
        let mut reverse_order = false;
        let mut interval = None;
        let mut limit = None;
        let mut outfile = None;
        let mut log_format = LogFormat::Plain;

        while let Some(kw) = self.peek_keyword() {
            match kw.as_str() {
                "select" => {
                    self.advance();
                    select = Some(self.parse_select_list()?);
                }
                "from" => {
                    self.advance();
                    table = Some(self.expect_ident()?);
                }
                "where" => {
                    self.advance();
                    where_clauses = self.parse_where_list()?;
                }
                "set" => {
                    self.advance();
                    set_clauses = self.parse_set_list()?;
                }
                "group" => {
                    self.advance();
                    self.expect_keyword("by")?;
                    group_by = self.parse_field_list()?;
                }
                "order" => {
                    self.advance();
                    self.expect_keyword("by")?;
                    let (field, reverse) = self.parse_order_by()?;
                    order_by = Some(field);
                    reverse_order = reverse;
                }
                "rorder" => {
                    self.advance();
                    self.expect_keyword("by")?;
                    let (field, _) = self.parse_order_by()?;
                    order_by = Some(field);
                    reverse_order = true;
                }
                "limit" => {
                    self.advance();
                    limit = Some(self.parse_number()? as usize);
                }
                "interval" => {
                    self.advance();
                    interval = Some(self.parse_duration()?);
                }
                "outfile" => {
                    self.advance();
                    let append = match self.peek() {
                        Some(Token::Ident(s)) if s.eq_ignore_ascii_case("append") => {
                            self.advance();
                            true
                        }
                        _ => false,
                    };
                    let path = self.expect_ident()?;
                    outfile = Some(Outfile { path, append });
                }
                "logformat" => {
                    self.advance();
                    log_format = self.parse_logformat_name()?;
                }
                other => {
                    return Err(CoreError::ParseError(format!(
                        "unknown clause keyword '{}'",
                        other
                    )))
                }
            }
        }

        if self.pos != self.tokens.len() {
            return Err(CoreError::ParseError(
                "trailing tokens after last recognized clause".to_string(),
            ));
        }

        let select =
            select.ok_or_else(|| CoreError::ParseError("query has no select clause".to_string()))?;
        let table =
            table.ok_or_else(|| CoreError::ParseError("query has no from clause".to_string()))?;

        if group_by.is_empty() {
            if let Some(field) = select.get(0).and_then(|s| s.field.clone()) {
                group_by = vec![field];
            }
        }

        if let Some(ref field) = order_by {
            let known = select
                .iter()
                .map(|s| s.alias.as_str())
                .chain(group_by.iter().map(String::as_str))
                .any(|candidate| candidate == field);
            if !known {
                return Err(CoreError::ParseError(format!(
                    "order by '{}' names neither a select alias nor a group by field",
                    field
                )));
            }
        }

        Ok(Query {
            select,
            table,
            where_clauses,
            set_clauses,
            group_by,
            order_by,
            reverse_order,
            interval,
            limit,
            outfile,
            log_format,
        })
    }

    fn parse_select_list(&mut self) -> Result<Vec<SelectSpec>, CoreError> {
        let mut out = Vec::new();
        loop {
            out.push(self.parse_select_item()?);
            match self.peek() {
                Some(Token::Comma) => {
                    self.advance();
                }
                _ => break,
            }
        }
        Ok(out)
    }

    fn parse_select_item(&mut self) -> Result<SelectSpec, CoreError> {
        let op_name = self.expect_ident()?;
        let op = match op_name.to_lowercase().as_str() {
            "count" => SelectOp::Count,
            "sum" => SelectOp::Sum,
            "min" => SelectOp::Min,
            "max" => SelectOp::Max,
            "avg" => SelectOp::Avg,
            "last" => SelectOp::Last,
            other => return Err(CoreError::ParseError(format!("unknown aggregate '{}'", other))),
        };
        self.expect(Token::LParen)?;
        let field = match self.peek() {
            Some(Token::Star) => {
                self.advance();
                None
            }
            Some(Token::Field(_)) => match self.advance() {
                Some(Token::Field(f)) => Some(f),
                _ => unreachable!(),
            },
            other => {
                return Err(CoreError::ParseError(format!(
                    "expected * or $field inside select, got {:?}",
                    other
                )))
            }
        };
        self.expect(Token::RParen)?;
        if op != SelectOp::Count && field.is_none() {
            return Err(CoreError::ParseError(format!(
                "{}(*) is only valid for count",
                op.as_str()
            )));
        }
        let alias = match &field {
            Some(f) => format!("{}_{}", op.as_str(), f),
            None => op.as_str().to_string(),
        };
        Ok(SelectSpec { op, field, alias })
    }

    fn parse_where_list(&mut self) -> Result<Vec<WhereClause>, CoreError> {
        let mut out = Vec::new();
        loop {
            let field = self.expect_field()?;
            let cmp = self.parse_cmp()?;
            let value = self.parse_value()?;
            out.push(WhereClause { field, cmp, value });
            match self.peek() {
                Some(Token::Comma) => {
                    self.advance();
                }
                Some(Token::Ident(s)) if s.eq_ignore_ascii_case("and") => {
                    self.advance();
                }
                _ => break,
            }
        }
        Ok(out)
    }

    fn parse_cmp(&mut self) -> Result<Cmp, CoreError> {
        match self.advance() {
            Some(Token::Eq) => Ok(Cmp::Eq),
            Some(Token::Ne) => Ok(Cmp::Ne),
            Some(Token::Lt) => Ok(Cmp::Lt),
            Some(Token::Le) => Ok(Cmp::Le),
            Some(Token::Gt) => Ok(Cmp::Gt),
            Some(Token::Ge) => Ok(Cmp::Ge),
            Some(Token::Match) => Ok(Cmp::RegexMatch),
            other => Err(CoreError::ParseError(format!(
                "expected a comparison operator, got {:?}",
                other
            ))),
        }
    }

    fn parse_value(&mut self) -> Result<String, CoreError> {
        match self.advance() {
            Some(Token::String(s)) => Ok(s),
            Some(Token::Number(n)) => Ok(n),
            Some(Token::Ident(s)) => Ok(s),
            other => Err(CoreError::ParseError(format!(
                "expected a comparison value, got {:?}",
                other
            ))),
        }
    }

    fn parse_set_list(&mut self) -> Result<Vec<SetClause>, CoreError> {
        let mut out = Vec::new();
        loop {
            let target_field = self.expect_field()?;
            self.expect(Token::Eq)?;
            let expr = self.parse_expr()?;
            out.push(SetClause { target_field, expr });
            match self.peek() {
                Some(Token::Comma) => {
                    self.advance();
                }
                _ => break,
            }
        }
        Ok(out)
    }

    fn parse_expr(&mut self) -> Result<Expr, CoreError> {
        match self.advance() {
            Some(Token::Field(f)) => Ok(Expr::Field(f)),
            Some(Token::String(s)) => Ok(Expr::Literal(s)),
            Some(Token::Number(n)) => Ok(Expr::Literal(n)),
            Some(Token::Ident(name)) => {
                self.expect(Token::LParen)?;
                let mut args = Vec::new();
                if self.peek() != Some(&Token::RParen) {
                    loop {
                        args.push(self.parse_expr()?);
                        match self.peek() {
                            Some(Token::Comma) => {
                                self.advance();
                            }
                            _ => break,
                        }
                    }
                }
                self.expect(Token::RParen)?;
                Ok(Expr::Call(name, args))
            }
            other => Err(CoreError::ParseError(format!(
                "expected a value, $field or function call, got {:?}",
                other
            ))),
        }
    }

    fn parse_field_list(&mut self) -> Result<Vec<String>, CoreError> {
        let mut out = Vec::new();
        loop {
            out.push(self.expect_field()?);
            match self.peek() {
                Some(Token::Comma) => {
                    self.advance();
                }
                _ => break,
            }
        }
        Ok(out)
    }

    fn parse_order_by(&mut self) -> Result<(String, bool), CoreError> {
        let field = self.expect_ident()?;
        let mut reverse = false;
        if let Some(Token::Ident(s)) = self.peek() {
            if s.eq_ignore_ascii_case("desc") {
                reverse = true;
                self.advance();
            } else if s.eq_ignore_ascii_case("asc") {
                self.advance();
            }
        }
        Ok((field, reverse))
    }

    fn parse_number(&mut self) -> Result<u64, CoreError> {
        match self.advance() {
            Some(Token::Number(n)) => n
                .parse()
                .map_err(|_| CoreError::ParseError(format!("not an integer: {}", n))),
            other => Err(CoreError::ParseError(format!(
                "expected a number, got {:?}",
                other
            ))),
        }
    }

    fn parse_duration(&mut self) -> Result<Duration, CoreError> {
        let n = self.parse_number()?;
        let unit = match self.peek() {
            Some(Token::Ident(s)) => {
                let u = s.clone();
                self.advance();
                u
            }
            _ => "s".to_string(),
        };
        match unit.as_str() {
            "s" | "sec" | "secs" => Ok(Duration::from_secs(n)),
            "ms" => Ok(Duration::from_millis(n)),
            "m" | "min" | "mins" => Ok(Duration::from_secs(n * 60)),
            "h" | "hour" | "hours" => Ok(Duration::from_secs(n * 3600)),
            other => Err(CoreError::ParseError(format!(
                "unknown interval unit '{}'",
                other
            ))),
        }
    }

    fn parse_logformat_name(&mut self) -> Result<LogFormat, CoreError> {
        let name = self.expect_ident()?;
        match name.to_lowercase().as_str() {
            "plain" => Ok(LogFormat::Plain),
            "logfmt" => Ok(LogFormat::Logfmt),
            "json" => Ok(LogFormat::Json),
            "csv" => {
                let mut delimiter = ',';
                if self.peek() == Some(&Token::LParen) {
                    self.advance();
                    match self.advance() {
                        Some(Token::Ident(s)) | Some(Token::String(s)) => {
                            delimiter = s.chars().next().ok_or_else(|| {
                                CoreError::ParseError("empty csv delimiter".to_string())
                            })?;
                        }
                        other => {
                            return Err(CoreError::ParseError(format!(
                                "expected a csv delimiter, got {:?}",
                                other
                            )))
                        }
                    }
                    self.expect(Token::RParen)?;
                }
                Ok(LogFormat::Csv { delimiter })
            }
            other => Err(CoreError::ParseError(format!(
                "unknown log format '{}'",
                other
            ))),
        }
    }
}
