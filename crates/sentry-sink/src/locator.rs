// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Extraction of formatted exception text from an entry's payload map.

use crate::parser::{self, ParsedException, Stacktrace};
use serde_json::Value;
use std::collections::HashMap;

/// Payload key conventionally carrying formatted exception text.
pub const DEFAULT_PAYLOAD_KEY: &str = "exception";

const PLACEHOLDER_TYPE: &str = "FormattedExceptionLocator";
const PLACEHOLDER_MESSAGE: &str = "Failed to parse formatted exception";

/// Finds and consumes formatted exception data in a payload map.
///
/// Locating never fails: payload data the sink does not understand is left
/// in place so it still reaches the remote endpoint as ordinary extra data.
pub trait ExceptionLocator: Send + Sync {
    fn locate(&self, payload: &mut HashMap<String, Value>) -> Vec<ParsedException>;
}

/// Locator for exception text stored as a string under a fixed payload key.
#[derive(Debug, Clone)]
pub struct FormattedExceptionLocator {
    payload_key: String,
}

impl FormattedExceptionLocator {
    pub fn new(payload_key: impl Into<String>) -> Self {
        Self {
            payload_key: payload_key.into(),
        }
    }
}

impl Default for FormattedExceptionLocator {
    fn default() -> Self {
        Self::new(DEFAULT_PAYLOAD_KEY)
    }
}

impl ExceptionLocator for FormattedExceptionLocator {
    /// On a successful parse the key is removed from the payload: the raw
    /// text is superseded by the structured chain. On a failed or empty
    /// parse the payload is left untouched and a synthetic placeholder is
    /// returned, so the existence of exception data stays visible even
    /// when it could not be decoded.
    fn locate(&self, payload: &mut HashMap<String, Value>) -> Vec<ParsedException> {
        let formatted = match payload.get(&self.payload_key) {
            Some(Value::String(formatted)) => formatted.clone(),
            _ => return Vec::new(),
        };

        let exceptions = parser::parse(&formatted);
        if exceptions.is_empty() {
            return vec![ParsedException {
                exception_type: PLACEHOLDER_TYPE.to_string(),
                value: PLACEHOLDER_MESSAGE.to_string(),
                stacktrace: Stacktrace::default(),
            }];
        }

        payload.remove(&self.payload_key);
        exceptions
    }
}
