// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Driving an event through a chain of processors.
//!
//! Each processor gets its own [`EventEditor`]. Its changes reach the event only when it
//! returns [`Verdict::Keep`]; a failing or dropping processor leaves no trace besides what
//! the [`ErrorPolicy`] records.

use tracing::{debug, trace, warn};

use crate::config::{ConfigError, ErrorPolicy, ProcessingConfig};
use crate::editor::EventEditor;
use crate::errors::{FieldError, ProcessingError};
use crate::event::Event;

/// What a processor decided about the event it saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Keep,
    Drop,
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error(transparent)]
    Field(#[from] FieldError),

    #[error("{0}")]
    Failed(String),
}

/// A single enrichment or transformation step.
pub trait Processor: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self, event: &mut EventEditor<'_>) -> Result<Verdict, ProcessorError>;
}

/// Result of running the whole chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Kept,
    Dropped,
}

/// An ordered chain of processors.
pub struct Processors {
    processors: Vec<Box<dyn Processor>>,
    error_policy: ErrorPolicy,
}

impl Processors {
    pub fn new(
        config: &ProcessingConfig,
        processors: Vec<Box<dyn Processor>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if processors.len() > config.max_processors {
            return Err(ConfigError::TooManyProcessors {
                count: processors.len(),
                max: config.max_processors,
            });
        }
        Ok(Self {
            processors,
            error_policy: config.error_policy,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Runs every processor in order, committing the changes of each one that keeps the
    /// event.
    pub fn run(&self, event: &mut Event) -> Outcome {
        for processor in &self.processors {
            let name = processor.name();
            let mut editor = EventEditor::new(event);
            debug!("Running processor {}", name);

            match processor.run(&mut editor) {
                Ok(Verdict::Keep) => editor.apply(),
                Ok(Verdict::Drop) => {
                    editor.reset();
                    trace!("Event dropped by processor {}", name);
                    return Outcome::Dropped;
                }
                Err(e) => {
                    editor.reset();
                    warn!("Processor {} failed: {}", name, e);
                    match self.error_policy {
                        ErrorPolicy::Annotate => {
                            editor.add_error([
                                ProcessingError::new(e.to_string()).with_processor(name)
                            ]);
                            editor.apply();
                        }
                        ErrorPolicy::Drop => {
                            trace!("Event dropped after processor {} failed", name);
                            return Outcome::Dropped;
                        }
                        ErrorPolicy::Ignore => {}
                    }
                }
            }
        }
        Outcome::Kept
    }
}

impl std::fmt::Debug for Processors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.processors.iter().map(|p| p.name()).collect();
        f.debug_struct("Processors")
            .field("processors", &names)
            .field("error_policy", &self.error_policy)
            .finish()
    }
}
