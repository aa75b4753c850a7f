// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Pluggable transform from raw object content to structured events.
//!
//! Concrete access-log grammars live with the embedding binary; the
//! pipeline only requires a pure [`EventParser`]. [`LineParser`] is the
//! bundled default and treats each non-empty line as one event.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One structured record bound for the telemetry sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedEvent {
    /// Event time in unix seconds, when the grammar recovers one.
    pub timestamp: Option<i64>,
    pub fields: Map<String, Value>,
}

impl ParsedEvent {
    pub fn with_field(name: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut fields = Map::new();
        fields.insert(name.into(), value.into());
        Self {
            timestamp: None,
            fields,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("object content is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("malformed record: {0}")]
    Malformed(String),
}

/// Pure transform; no side effects, polymorphic over log formats.
pub trait EventParser: Send + Sync {
    fn parse(&self, content: &[u8]) -> Result<Vec<ParsedEvent>, ParseError>;
}

/// Fallback grammar: one event per non-empty line, raw line preserved
/// under a `message` field.
#[derive(Debug, Default, Clone)]
pub struct LineParser;

impl EventParser for LineParser {
    fn parse(&self, content: &[u8]) -> Result<Vec<ParsedEvent>, ParseError> {
        let text = std::str::from_utf8(content)?;
        Ok(text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| ParsedEvent::with_field("message", line))
            .collect())
    }
}
