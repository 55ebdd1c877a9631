// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Buffered forwarding sink for structured diagnostic entries.
//!
//! Entries produced by an instrumentation framework are accepted one at a
//! time, batched by time/count thresholds, mapped into Sentry store packets,
//! and shipped best-effort to a remote endpoint. Delivery is not guaranteed:
//! entries are shed under overload and dropped on fatal send errors, so that
//! logging never becomes a reliability hazard for the host application.

#![deny(clippy::all)]
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

pub mod client;
pub mod config;
pub mod entry;
pub mod errors;
pub mod flusher;
pub mod locator;
pub mod packet;
pub mod parser;
pub mod publisher;
pub mod sink;
