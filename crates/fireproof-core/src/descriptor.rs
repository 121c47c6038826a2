// ── Query descriptors ──
//
// A compact string form of a query: a path followed by `.`-separated
// operations, each `name` or `name:arg:arg` with JSON-encoded arguments.
//
//     feed/posts.orderByChild:"score".startAt:10:"p7".limitToFirst:20
//
// Operation names the codec does not know are skipped, so descriptors
// written for a newer surface still resolve to the operations we support.
// String arguments containing `.` must be quoted: an unquoted argument
// followed by an unknown name is rejected rather than split silently.

use std::fmt;
use std::str::FromStr;

use fireproof_api::{Bound, Query, Reference};
use serde_json::Value;
use strum::{EnumString, IntoStaticStr};
use tracing::debug;

use crate::error::CoreError;
use crate::path;

/// Operation names as they appear in a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, IntoStaticStr)]
#[strum(serialize_all = "camelCase")]
enum OpName {
    OrderByKey,
    OrderByValue,
    OrderByPriority,
    OrderByChild,
    StartAt,
    EndAt,
    EqualTo,
    LimitToFirst,
    LimitToLast,
}

/// One query-shaping operation.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOp {
    OrderByKey,
    OrderByValue,
    OrderByPriority,
    OrderByChild(String),
    StartAt(Bound),
    EndAt(Bound),
    EqualTo(Bound),
    LimitToFirst(usize),
    LimitToLast(usize),
}

impl QueryOp {
    fn name(&self) -> OpName {
        match self {
            Self::OrderByKey => OpName::OrderByKey,
            Self::OrderByValue => OpName::OrderByValue,
            Self::OrderByPriority => OpName::OrderByPriority,
            Self::OrderByChild(_) => OpName::OrderByChild,
            Self::StartAt(_) => OpName::StartAt,
            Self::EndAt(_) => OpName::EndAt,
            Self::EqualTo(_) => OpName::EqualTo,
            Self::LimitToFirst(_) => OpName::LimitToFirst,
            Self::LimitToLast(_) => OpName::LimitToLast,
        }
    }

    fn args(&self) -> Vec<Value> {
        match self {
            Self::OrderByKey | Self::OrderByValue | Self::OrderByPriority => Vec::new(),
            Self::OrderByChild(child) => vec![Value::String(child.clone())],
            Self::StartAt(bound) | Self::EndAt(bound) | Self::EqualTo(bound) => {
                let mut args = vec![bound.value.clone()];
                if let Some(key) = &bound.key {
                    args.push(Value::String(key.clone()));
                }
                args
            }
            Self::LimitToFirst(n) | Self::LimitToLast(n) => vec![Value::from(*n)],
        }
    }

    fn apply(&self, query: Query) -> Query {
        match self {
            Self::OrderByKey => query.order_by_key(),
            Self::OrderByValue => query.order_by_value(),
            Self::OrderByPriority => query.order_by_priority(),
            Self::OrderByChild(child) => query.order_by_child(child.clone()),
            Self::StartAt(b) => query.start_at(b.value.clone(), b.key.as_deref()),
            Self::EndAt(b) => query.end_at(b.value.clone(), b.key.as_deref()),
            Self::EqualTo(b) => query.equal_to(b.value.clone(), b.key.as_deref()),
            Self::LimitToFirst(n) => query.limit_to_first(*n),
            Self::LimitToLast(n) => query.limit_to_last(*n),
        }
    }
}

// ── Descriptor ──────────────────────────────────────────────────────

/// A path plus an ordered list of operations.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDescriptor {
    pub path: String,
    pub ops: Vec<QueryOp>,
}

impl QueryDescriptor {
    pub fn new(path: &str) -> Result<Self, CoreError> {
        Ok(Self {
            path: path::validate(path)?,
            ops: Vec::new(),
        })
    }

    #[must_use]
    pub fn with(mut self, op: QueryOp) -> Self {
        self.ops.push(op);
        self
    }

    /// Parse a descriptor string.
    pub fn decode(descriptor: &str) -> Result<Self, CoreError> {
        let invalid = |reason: String| CoreError::InvalidDescriptor {
            descriptor: descriptor.to_owned(),
            reason,
        };

        let mut tokens = split_outside_quotes(descriptor, |c, next| {
            c == '.' && next.is_some_and(|n| n.is_ascii_alphabetic())
        })
        .into_iter();

        let head = tokens.next().unwrap_or_default();
        let path = path::validate(head).map_err(|e| invalid(e.to_string()))?;

        let mut ops = Vec::new();
        let mut bare_tail = false;
        for token in tokens {
            let mut parts = split_outside_quotes(token, |c, _| c == ':').into_iter();
            let name = parts.next().unwrap_or_default();
            let Ok(op) = OpName::from_str(name) else {
                if bare_tail {
                    return Err(invalid(format!(
                        "unquoted argument runs into '.{name}'; quote string arguments containing '.'"
                    )));
                }
                debug!(op = name, descriptor, "ignoring unknown query operation");
                continue;
            };
            let raw: Vec<&str> = parts.collect();
            bare_tail = raw.last().is_some_and(|arg| is_bare(arg));
            let args: Vec<Value> = raw.into_iter().map(parse_arg).collect();
            ops.push(build_op(op, args).map_err(invalid)?);
        }

        Ok(Self { path, ops })
    }

    /// Render the canonical string form. `decode(encode(d)) == d`.
    pub fn encode(&self) -> String {
        let mut out = self.path.clone();
        for op in &self.ops {
            let name: &'static str = op.name().into();
            out.push('.');
            out.push_str(name);
            for arg in op.args() {
                out.push(':');
                out.push_str(&arg.to_string());
            }
        }
        out
    }

    /// Resolve the descriptor against `root`: the child at `path`, then
    /// every operation applied left to right.
    pub fn apply(&self, root: &Reference) -> Result<Query, CoreError> {
        let base = root.child(&self.path)?.query();
        Ok(self.ops.iter().fold(base, |query, op| op.apply(query)))
    }
}

impl FromStr for QueryDescriptor {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl fmt::Display for QueryDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

// ── Parsing helpers ─────────────────────────────────────────────────

/// Split on separator characters that sit outside a JSON string literal.
/// The predicate sees the candidate character and the one after it.
fn split_outside_quotes(input: &str, is_sep: impl Fn(char, Option<char>) -> bool) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut chars = input.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        if c == '"' {
            in_string = true;
        } else if is_sep(c, chars.peek().map(|&(_, n)| n)) {
            pieces.push(&input[start..i]);
            start = i + c.len_utf8();
        }
    }
    pieces.push(&input[start..]);
    pieces
}

/// Arguments are JSON; anything that is not valid JSON is taken as a bare string.
fn parse_arg(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()))
}

fn is_bare(raw: &str) -> bool {
    serde_json::from_str::<Value>(raw).is_err()
}

fn build_op(name: OpName, args: Vec<Value>) -> Result<QueryOp, String> {
    let label: &'static str = name.into();
    let arity = |min: usize, max: usize| {
        if (min..=max).contains(&args.len()) {
            Ok(())
        } else if min == max {
            Err(format!("{label} takes {min} argument(s), got {}", args.len()))
        } else {
            Err(format!("{label} takes {min} to {max} arguments, got {}", args.len()))
        }
    };

    match name {
        OpName::OrderByKey => arity(0, 0).map(|()| QueryOp::OrderByKey),
        OpName::OrderByValue => arity(0, 0).map(|()| QueryOp::OrderByValue),
        OpName::OrderByPriority => arity(0, 0).map(|()| QueryOp::OrderByPriority),
        OpName::OrderByChild => {
            arity(1, 1)?;
            match &args[0] {
                Value::String(child) if !child.is_empty() => Ok(QueryOp::OrderByChild(child.clone())),
                other => Err(format!("{label} expects a child name, got {other}")),
            }
        }
        OpName::StartAt | OpName::EndAt | OpName::EqualTo => {
            arity(1, 2)?;
            let mut args = args.into_iter();
            let value = args.next().unwrap_or(Value::Null);
            let key = match args.next() {
                None => None,
                Some(Value::String(key)) => Some(key),
                Some(other) => return Err(format!("{label} key must be a string, got {other}")),
            };
            let bound = Bound { value, key };
            Ok(match name {
                OpName::StartAt => QueryOp::StartAt(bound),
                OpName::EndAt => QueryOp::EndAt(bound),
                _ => QueryOp::EqualTo(bound),
            })
        }
        OpName::LimitToFirst | OpName::LimitToLast => {
            arity(1, 1)?;
            let n = args[0]
                .as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .filter(|n| *n > 0)
                .ok_or_else(|| format!("{label} expects a positive integer, got {}", args[0]))?;
            Ok(if name == OpName::LimitToFirst {
                QueryOp::LimitToFirst(n)
            } else {
                QueryOp::LimitToLast(n)
            })
        }
    }
}
