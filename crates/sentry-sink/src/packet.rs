// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mapping from diagnostic entries to Sentry store packets.

use crate::entry::{EventEntry, EventLevel};
use crate::locator::ExceptionLocator;
use crate::parser::ParsedException;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

const PLATFORM: &str = "other";
const LOGGER: &str = "root";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Severity as understood by the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SentryLevel {
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

impl From<EventLevel> for SentryLevel {
    /// Total mapping; the most verbose levels collapse to `Debug`.
    fn from(level: EventLevel) -> Self {
        match level {
            EventLevel::Always | EventLevel::Verbose => SentryLevel::Debug,
            EventLevel::Informational => SentryLevel::Info,
            EventLevel::Warning => SentryLevel::Warning,
            EventLevel::Error => SentryLevel::Error,
            EventLevel::Critical => SentryLevel::Fatal,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExceptionValues {
    pub values: Vec<ParsedException>,
}

/// One outbound store record. Constructed fresh per entry; never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct JsonPacket {
    pub event_id: String,
    pub project: String,
    pub level: SentryLevel,
    pub message: String,
    pub timestamp: String,
    pub platform: &'static str,
    pub logger: &'static str,
    pub tags: HashMap<String, String>,
    pub extra: HashMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<ExceptionValues>,
}

/// Builds store packets from entries. Stateless; safe to share.
#[derive(Debug, Clone, Copy, Default)]
pub struct PacketFactory;

impl PacketFactory {
    /// Maps one entry into a packet. When a locator is supplied it runs
    /// against the extras map (and may consume the exception payload key);
    /// with no locator the payload passes through exactly as-is.
    pub fn create(
        &self,
        project_id: &str,
        entry: &EventEntry,
        locator: Option<&dyn ExceptionLocator>,
    ) -> JsonPacket {
        let mut extra = entry.extras();

        let exception = locator.and_then(|locator| {
            let values = locator.locate(&mut extra);
            if values.is_empty() {
                None
            } else {
                Some(ExceptionValues { values })
            }
        });

        JsonPacket {
            event_id: Uuid::new_v4().simple().to_string(),
            project: project_id.to_string(),
            level: entry.level.into(),
            message: entry.formatted_message.clone(),
            timestamp: entry.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            platform: PLATFORM,
            logger: LOGGER,
            tags: Self::tags(entry),
            extra,
            exception,
        }
    }

    /// The five fixed metadata tags, values copied verbatim from the
    /// entry's schema.
    fn tags(entry: &EventEntry) -> HashMap<String, String> {
        HashMap::from([
            (
                "EventKeywords".to_string(),
                entry.schema.keywords_description.clone(),
            ),
            ("EventOpcode".to_string(), entry.schema.opcode_name.clone()),
            ("EventTask".to_string(), entry.schema.task_name.clone()),
            ("EventName".to_string(), entry.schema.event_name.clone()),
            ("EventVersion".to_string(), entry.schema.version.to_string()),
        ])
    }
}
