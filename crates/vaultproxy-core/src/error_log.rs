//! Error taxonomy and the bounded error log.
//!
//! Every failure surfaced to a caller is classified into an [`ErrorCode`] and
//! recorded as an [`ErrorRecord`]. The log keeps the most recent records and
//! drops the oldest once full.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Caller-facing error classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    DecryptFailed,
    Locked,
    NoKey,
    NetworkError,
    UpstreamError,
    Unknown,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DecryptFailed => "DECRYPT_FAILED",
            Self::Locked => "LOCKED",
            Self::NoKey => "NO_KEY",
            Self::NetworkError => "NETWORK_ERROR",
            Self::UpstreamError => "UPSTREAM_ERROR",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logged error.
///
/// `context` must never carry secret material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default)]
    pub context: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl ErrorRecord {
    pub fn new(code: ErrorCode, message: impl Into<String>, context: serde_json::Value) -> Self {
        Self {
            code,
            message: message.into(),
            context,
            timestamp: Utc::now(),
        }
    }
}

/// Capped ring buffer of [`ErrorRecord`]s, oldest first.
#[derive(Debug, Clone)]
pub struct ErrorLog {
    records: VecDeque<ErrorRecord>,
    capacity: usize,
}

impl ErrorLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a record, evicting the oldest when full.
    pub fn push(&mut self, record: ErrorRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn records(&self) -> Vec<ErrorRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
