//! Identifiers for tasks and resources
//!
//! Both are opaque strings chosen by the caller (e.g. `calibrate-zone-1`,
//! `calibration-kit`). When a caller has no natural id, [`TaskId::generate`]
//! derives one in the format `t-{7-char-hash}` from title + creation time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum IdError {
    #[error("Identifier must not be empty")]
    Empty,
}

/// Generates a 7-character hash from title and timestamp
fn generate_hash(title: &str, timestamp: DateTime<Utc>) -> String {
    let input = format!("{}{}", title, timestamp.timestamp_nanos_opt().unwrap_or(0));
    let hash = blake3::hash(input.as_bytes());
    let hex = hash.to_hex();
    hex[..7].to_string()
}

fn normalize(raw: &str) -> Result<String, IdError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(IdError::Empty);
    }
    Ok(trimmed.to_string())
}

/// Task identifier - unique, immutable, otherwise uninterpreted
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId(String);

impl TaskId {
    /// Creates a task ID from a caller-supplied string
    pub fn new(raw: &str) -> Result<Self, IdError> {
        normalize(raw).map(Self)
    }

    /// Derives a fresh `t-{hash}` ID from a title and creation timestamp
    pub fn generate(title: &str, timestamp: DateTime<Utc>) -> Self {
        Self(format!("t-{}", generate_hash(title, timestamp)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Resource identifier (e.g. `calibration-kit`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(raw: &str) -> Result<Self, IdError> {
        normalize(raw).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

macro_rules! string_id_impls {
    ($ty:ident) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $ty {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $ty::new(s)
            }
        }

        impl TryFrom<String> for $ty {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$ty> for String {
            fn from(id: $ty) -> Self {
                id.0
            }
        }
    };
}

string_id_impls!(TaskId);
string_id_impls!(ResourceId);
