// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Data model for the diagnostic entries handed to the sink.
//!
//! Entries are produced by an external instrumentation framework and are
//! read-only here: each entry carries a severity, a preformatted message, a
//! timestamp, and an ordered payload value sequence whose field names come
//! from a schema shared across entries of the same event type.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Severity assigned by the producing framework, most verbose first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventLevel {
    Always,
    Verbose,
    Informational,
    Warning,
    Error,
    Critical,
}

/// Descriptive metadata shared by every entry of one event type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSchema {
    pub event_name: String,
    pub task_name: String,
    pub opcode_name: String,
    pub keywords_description: String,
    pub version: u32,
    /// Ordered field names; paired positionally with each entry's payload.
    pub payload_fields: Vec<String>,
}

/// One diagnostic event. Immutable once created; consumed exactly once by
/// the publisher.
#[derive(Debug, Clone)]
pub struct EventEntry {
    pub level: EventLevel,
    pub formatted_message: String,
    pub timestamp: DateTime<Utc>,
    /// Payload values, positionally matching `schema.payload_fields`.
    pub payload: Vec<Value>,
    pub schema: Arc<EventSchema>,
}

impl EventEntry {
    pub fn new(
        level: EventLevel,
        formatted_message: impl Into<String>,
        timestamp: DateTime<Utc>,
        payload: Vec<Value>,
        schema: Arc<EventSchema>,
    ) -> Self {
        Self {
            level,
            formatted_message: formatted_message.into(),
            timestamp,
            payload,
            schema,
        }
    }

    /// Pairs the schema's field names with this entry's payload values.
    /// The shorter of the two sequences bounds the result.
    pub fn extras(&self) -> HashMap<String, Value> {
        self.schema
            .payload_fields
            .iter()
            .cloned()
            .zip(self.payload.iter().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_schema(fields: &[&str]) -> Arc<EventSchema> {
        Arc::new(EventSchema {
            event_name: "Test".to_string(),
            task_name: "Task".to_string(),
            opcode_name: "Opcode".to_string(),
            keywords_description: "Keywords".to_string(),
            version: 5,
            payload_fields: fields.iter().map(|f| f.to_string()).collect(),
        })
    }

    #[test]
    fn extras_pairs_fields_with_values_positionally() {
        let entry = EventEntry::new(
            EventLevel::Informational,
            "Test message",
            Utc::now(),
            vec![json!("value1"), json!(2), json!("value3")],
            test_schema(&["Field1", "Field2", "Field3"]),
        );

        let extras = entry.extras();
        assert_eq!(extras.len(), 3);
        assert_eq!(extras["Field1"], json!("value1"));
        assert_eq!(extras["Field2"], json!(2));
        assert_eq!(extras["Field3"], json!("value3"));
    }

    #[test]
    fn extras_truncates_to_shorter_sequence() {
        let entry = EventEntry::new(
            EventLevel::Verbose,
            "Test message",
            Utc::now(),
            vec![json!(1)],
            test_schema(&["Field1", "Field2"]),
        );
        assert_eq!(entry.extras().len(), 1);

        let entry = EventEntry::new(
            EventLevel::Verbose,
            "Test message",
            Utc::now(),
            vec![json!(1), json!(2)],
            test_schema(&["Field1"]),
        );
        assert_eq!(entry.extras().len(), 1);
    }

    #[test]
    fn levels_are_ordered_by_severity() {
        assert!(EventLevel::Always < EventLevel::Verbose);
        assert!(EventLevel::Verbose < EventLevel::Informational);
        assert!(EventLevel::Warning < EventLevel::Error);
        assert!(EventLevel::Error < EventLevel::Critical);
    }
}
