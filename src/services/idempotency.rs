//! Caller-supplied idempotency keys.
//!
//! A raw key is capped at [`MAX_KEY_LEN`] characters and then trimmed. Each ledger
//! row written on behalf of a keyed request stores the scoped form
//! `{key}:{operation}:{entity_id}`, so one request key fans out into one
//! unique key per item or line it touches.

use std::fmt;
use uuid::Uuid;

pub const MAX_KEY_LEN: usize = 120;

/// Header accepted as a fallback when the body carries no key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Returns `None` for a missing, empty or whitespace-only key.
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        let capped: String = raw?.trim_start().chars().take(MAX_KEY_LEN).collect();
        let key = capped.trim_end();
        if key.is_empty() {
            return None;
        }
        Some(Self(key.to_string()))
    }

    /// Picks the body key, falling back to the header key.
    pub fn from_request(body: Option<&str>, header: Option<&str>) -> Option<Self> {
        Self::parse(body).or_else(|| Self::parse(header))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key stored on the ledger row for `operation` applied to `entity_id`.
    pub fn scoped(&self, operation: Operation, entity_id: Uuid) -> String {
        format!("{}:{}:{}", self.0, operation.as_str(), entity_id)
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Scopes an optional request key; unkeyed requests produce unkeyed rows.
pub fn scoped_key(key: Option<&IdempotencyKey>, operation: Operation, entity_id: Uuid) -> Option<String> {
    key.map(|k| k.scoped(operation, entity_id))
}

/// Operation suffix used in scoped keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Reserve,
    Release,
    Return,
    Receive,
    Adjust,
    Void,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Reserve => "reserve",
            Operation::Release => "release",
            Operation::Return => "return",
            Operation::Receive => "receive",
            Operation::Adjust => "adjust",
            Operation::Void => "void",
        }
    }
}
