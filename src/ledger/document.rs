//! Ledger document helpers.
//!
//! A user's ledger is stored as one JSON document. Updates are expressed as
//! dotted field paths with numeric increments, so map keys derived from model
//! names must not contain the path separator. Such characters are replaced
//! with full-width look-alikes before a path is built and restored on read.

use serde_json::{Map, Number, Value};

use crate::ledger::LedgerError;

const DOT: char = '.';
const DOLLAR: char = '$';
const DOT_PLACEHOLDER: char = '\u{FF0E}';
const DOLLAR_PLACEHOLDER: char = '\u{FF04}';

/// Replace characters with path meaning by their placeholders.
pub fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            DOT => DOT_PLACEHOLDER,
            DOLLAR => DOLLAR_PLACEHOLDER,
            other => other,
        })
        .collect()
}

/// Inverse of [`sanitize_key`].
pub fn restore_key(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            DOT_PLACEHOLDER => DOT,
            DOLLAR_PLACEHOLDER => DOLLAR,
            other => other,
        })
        .collect()
}

/// Names already containing a placeholder would not survive a round trip.
pub fn contains_placeholder(key: &str) -> bool {
    key.contains([DOT_PLACEHOLDER, DOLLAR_PLACEHOLDER])
}

/// Amount added to a numeric field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Delta {
    Count(u64),
    Amount(f64),
}

/// One `$inc`-style operation: add `delta` at the dotted `path`.
#[derive(Debug, Clone, PartialEq)]
pub struct Increment {
    pub path: String,
    pub delta: Delta,
}

impl Increment {
    pub fn count(path: impl Into<String>, n: u64) -> Self {
        Self {
            path: path.into(),
            delta: Delta::Count(n),
        }
    }

    pub fn amount(path: impl Into<String>, x: f64) -> Self {
        Self {
            path: path.into(),
            delta: Delta::Amount(x),
        }
    }
}

/// Fresh document for a user with zeroed totals.
pub fn new_document(user_id: &str) -> Value {
    serde_json::json!({
        "user_id": user_id,
        "total_input_cost": 0.0,
        "total_output_cost": 0.0,
        "providers": {},
    })
}

/// Apply every increment to `doc`, creating intermediate objects and missing
/// fields (which start at zero).
pub fn apply_increments(doc: &mut Value, increments: &[Increment]) -> Result<(), LedgerError> {
    for inc in increments {
        apply_one(doc, inc)?;
    }
    Ok(())
}

fn apply_one(doc: &mut Value, inc: &Increment) -> Result<(), LedgerError> {
    let mut segments: Vec<&str> = inc.path.split(DOT).collect();
    let leaf = segments
        .pop()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| LedgerError::Persistence(format!("empty field path {:?}", inc.path)))?;

    let mut node = doc;
    for segment in segments {
        node = as_object(node, &inc.path)?
            .entry(segment)
            .or_insert_with(|| Value::Object(Map::new()));
    }

    let fields = as_object(node, &inc.path)?;
    let current = fields.entry(leaf).or_insert(Value::Null);
    *current = add(current, inc.delta)
        .ok_or_else(|| LedgerError::Persistence(format!("field {} is not numeric", inc.path)))?;
    Ok(())
}

fn as_object<'a>(value: &'a mut Value, path: &str) -> Result<&'a mut Map<String, Value>, LedgerError> {
    value
        .as_object_mut()
        .ok_or_else(|| LedgerError::Persistence(format!("cannot descend into non-object on path {path}")))
}

fn add(current: &Value, delta: Delta) -> Option<Value> {
    match (current, delta) {
        (Value::Null, Delta::Count(n)) => Some(Value::from(n)),
        (Value::Null, Delta::Amount(x)) => Number::from_f64(x).map(Value::Number),
        (Value::Number(cur), Delta::Count(n)) => match cur.as_u64() {
            Some(c) => Some(Value::from(c.saturating_add(n))),
            None => Number::from_f64(cur.as_f64()? + n as f64).map(Value::Number),
        },
        (Value::Number(cur), Delta::Amount(x)) => Number::from_f64(cur.as_f64()? + x).map(Value::Number),
        _ => None,
    }
}
