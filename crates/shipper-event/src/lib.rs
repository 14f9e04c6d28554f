// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Event representation and copy-on-write transactional editing for the shipper
//! pipeline.
//!
//! Every ingested record becomes an [`Event`]. Processors never touch an event directly:
//! they get an [`EventEditor`] whose changes are either committed with
//! [`EventEditor::apply`] or discarded with [`EventEditor::reset`].

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod constants;
pub mod editor;
pub mod errors;
pub mod event;
pub mod path;
pub mod processor;
pub mod value;

pub use config::{ConfigError, ErrorPolicy, ProcessingConfig};
pub use editor::EventEditor;
pub use errors::{FieldError, ProcessingError};
pub use event::Event;
pub use path::{FieldPath, Namespace, RootKey};
pub use processor::{Outcome, Processor, ProcessorError, Processors, Verdict};
pub use value::{Map, Value, ValueKind};
