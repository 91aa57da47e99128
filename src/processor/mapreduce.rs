//! Turns one raw log line into a fields map ready for the aggregate engine.
//!
//! Deliberately not a [`crate::processor::Processor`]: its output unit is a
//! fields map destined for [`crate::aggregate::engine::AggregateEngine`],
//! not a [`crate::processor::MatchedLine`], so the session handler drives it
//! directly rather than through the shared trait.

use crate::error::CoreError;
use crate::framer::strip_newline;
use crate::query::{Cmp, Expr, Query, WhereClause};
use crate::query::functions;
use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Mutex;

lazy_static! {
    /// `WHERE $f =~ "pattern"` compiles lazily; every distinct pattern text
    /// seen by this process is compiled at most once.
    static ref REGEX_CACHE: Mutex<HashMap<String, Regex>> = Mutex::new(HashMap::new());
}

fn regex_matches(pattern: &str, actual: &str) -> bool {
    let mut cache = REGEX_CACHE.lock().unwrap();
    if !cache.contains_key(pattern) {
        match Regex::new(pattern) {
            Ok(re) => {
                cache.insert(pattern.to_string(), re);
            }
            Err(e) => {
                log::warn!("invalid where regex '{}': {}", pattern, e);
                return false;
            }
        }
    }
    cache.get(pattern).map(|re| re.is_match(actual)).unwrap_or(false)
}

pub struct MapReduceProcessor {
    query: Query,
}

impl MapReduceProcessor {
    pub fn new(query: Query) -> MapReduceProcessor {
        MapReduceProcessor { query }
    }

    /// Parse `content` (with its line terminator, if any), run it through
    /// `WHERE` and `SET`, and return the resulting fields for the aggregate
    /// engine, or `None` if `WHERE` rejected it.
    pub fn process(&self, content: &[u8]) -> Option<IndexMap<String, String>> {
        let stripped = strip_newline(content);
        let mut fields = self.query.log_format.parse(stripped);
        if !self.passes_where(&fields) {
            return None;
        }
        self.apply_set(&mut fields);
        Some(fields)
    }

    fn passes_where(&self, fields: &IndexMap<String, String>) -> bool {
        self.query
            .where_clauses
            .iter()
            .all(|clause| evaluate_where(clause, fields))
    }

    fn apply_set(&self, fields: &mut IndexMap<String, String>) {
        for set in &self.query.set_clauses {
            if let Ok(value) = eval_expr(&set.expr, fields) {
                fields.insert(set.target_field.clone(), value);
            }
        }
    }
}

fn evaluate_where(clause: &WhereClause, fields: &IndexMap<String, String>) -> bool {
    let actual = fields.get(&clause.field).map(String::as_str).unwrap_or("");
    match clause.cmp {
        Cmp::Eq => actual == clause.value,
        Cmp::Ne => actual != clause.value,
        Cmp::Lt | Cmp::Le | Cmp::Gt | Cmp::Ge => {
            match (actual.parse::<f64>(), clause.value.parse::<f64>()) {
                (Ok(a), Ok(b)) => match clause.cmp {
                    Cmp::Lt => a < b,
                    Cmp::Le => a <= b,
                    Cmp::Gt => a > b,
                    Cmp::Ge => a >= b,
                    Cmp::Eq | Cmp::Ne | Cmp::RegexMatch => unreachable!(),
                },
                _ => false,
            }
        }
        Cmp::RegexMatch => regex_matches(&clause.value, actual),
    }
}

fn eval_expr(expr: &Expr, fields: &IndexMap<String, String>) -> Result<String, CoreError> {
    match expr {
        Expr::Field(f) => Ok(fields.get(f).cloned().unwrap_or_default()),
        Expr::Literal(s) => Ok(s.clone()),
        Expr::Call(name, args) => {
            let evaluated = args
                .iter()
                .map(|a| eval_expr(a, fields))
                .collect::<Result<Vec<String>, CoreError>>()?;
            functions::call(name, &evaluated)
        }
    }
}
