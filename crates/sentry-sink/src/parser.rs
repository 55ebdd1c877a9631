// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Parser for formatted exception text.
//!
//! The producing framework cannot transport exception objects in an entry
//! payload, so exceptions arrive as their conventional multi-line string
//! form: a summary line of `" ---> "`-separated `type: message` segments
//! (outermost exception first), followed by `at ...` stack-frame lines,
//! with `   ---` delimiter lines separating the frames of nested
//! exceptions. This module reconstructs the structured chain from that
//! blob.

use regex::Regex;
use serde::Serialize;
use std::str::Lines;
use std::sync::LazyLock;

const SUMMARY_SEPARATOR: &str = " ---> ";
const INNER_DELIMITER: &str = "   ---";

#[allow(clippy::expect_used)]
static FRAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*at (.*?)(?: in (.*):line (\d+))?$").expect("frame pattern is valid")
});

/// One call-stack frame of a parsed exception.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackFrame {
    pub function: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abs_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lineno: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Stacktrace {
    pub frames: Vec<StackFrame>,
}

/// One exception in a parsed chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedException {
    #[serde(rename = "type")]
    pub exception_type: String,
    pub value: String,
    pub stacktrace: Stacktrace,
}

/// Parses a formatted exception blob into a chain of exceptions ordered
/// innermost-first (the original cause first, the outermost rethrow last).
///
/// A malformed summary segment yields an empty chain rather than partial
/// data. Frame parsing is best-effort per line: lines that are not stack
/// frames are skipped silently.
pub fn parse(formatted: &str) -> Vec<ParsedException> {
    let mut lines = formatted.lines();
    let summary_line = lines.next().unwrap_or("");

    let mut exceptions = parse_summaries(summary_line);
    if exceptions.is_empty() {
        return exceptions;
    }

    // The summary line reads outermost-first; frames for each exception
    // follow in the same order, separated by inner-exception delimiters.
    for exception in &mut exceptions {
        exception.stacktrace = read_stacktrace(&mut lines);
    }

    exceptions.reverse();
    exceptions
}

fn parse_summaries(summary_line: &str) -> Vec<ParsedException> {
    if summary_line.trim().is_empty() {
        return Vec::new();
    }

    let mut exceptions = Vec::new();
    for segment in summary_line
        .split(SUMMARY_SEPARATOR)
        .filter(|segment| !segment.is_empty())
    {
        let Some((exception_type, message)) = segment.split_once(':') else {
            // Malformed input is not partially parsed.
            return Vec::new();
        };

        exceptions.push(ParsedException {
            exception_type: exception_type.to_string(),
            value: message.trim_start_matches(' ').to_string(),
            stacktrace: Stacktrace::default(),
        });
    }

    exceptions
}

/// Accumulates frames up to the next inner-exception delimiter, consuming
/// the delimiter line itself.
fn read_stacktrace(lines: &mut Lines<'_>) -> Stacktrace {
    let mut frames = Vec::new();

    for line in lines {
        if line.starts_with(INNER_DELIMITER) {
            break;
        }
        if let Some(frame) = parse_frame(line) {
            frames.push(frame);
        }
    }

    Stacktrace { frames }
}

fn parse_frame(line: &str) -> Option<StackFrame> {
    let captures = FRAME_PATTERN.captures(line)?;

    Some(StackFrame {
        function: captures.get(1)?.as_str().to_string(),
        abs_path: captures.get(2).map(|m| m.as_str().to_string()),
        lineno: captures.get(3).and_then(|m| m.as_str().parse().ok()),
    })
}
