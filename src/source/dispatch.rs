//! Ordered fallback across data sources
//!
//! Sources are tried one at a time in the order given. The first source
//! that answers with something non-empty wins; errors, timeouts and empty
//! answers move on to the next one. Results are never merged. Sources built
//! with [`NamedSource::on_error`] are skipped once an empty answer is held.

use std::time::Duration;

use futures::future::BoxFuture;

use super::ports::SourceError;

pub const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_secs(30);

/// Answers that can legitimately be empty
pub trait Answer {
    fn is_empty_answer(&self) -> bool;
}

impl<T> Answer for Vec<T> {
    fn is_empty_answer(&self) -> bool {
        self.is_empty()
    }
}

impl<T> Answer for Option<T> {
    fn is_empty_answer(&self) -> bool {
        self.is_none()
    }
}

/// A named, not yet started source call
pub struct NamedSource<'a, T> {
    pub name: String,
    pub call: BoxFuture<'a, Result<T, SourceError>>,
    /// Only tried when no earlier source produced an answer, empty or not
    pub errors_only: bool,
}

impl<'a, T> NamedSource<'a, T> {
    pub fn new(name: impl Into<String>, call: BoxFuture<'a, Result<T, SourceError>>) -> Self {
        Self {
            name: name.into(),
            call,
            errors_only: false,
        }
    }

    /// A fallback for failures only; an earlier empty answer stands
    pub fn on_error(name: impl Into<String>, call: BoxFuture<'a, Result<T, SourceError>>) -> Self {
        Self {
            errors_only: true,
            ..Self::new(name, call)
        }
    }
}

/// A result tagged with the source that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct Sourced<T> {
    pub value: T,
    pub source: String,
    /// Every source attempted, in order, including the answering one
    pub tried: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct Dispatcher {
    timeout: Duration,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_SOURCE_TIMEOUT)
    }
}

impl Dispatcher {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn dispatch<T: Answer>(
        &self,
        sources: Vec<NamedSource<'_, T>>,
    ) -> Result<Sourced<T>, DispatchError> {
        if sources.is_empty() {
            return Err(DispatchError::NoSources);
        }

        let mut tried = Vec::with_capacity(sources.len());
        let mut first_empty: Option<(T, String)> = None;
        let mut last_error: Option<SourceError> = None;

        for NamedSource {
            name,
            call,
            errors_only,
        } in sources
        {
            if errors_only && first_empty.is_some() {
                tracing::debug!(source = %name, "Skipping error-only source after an empty answer");
                continue;
            }
            tried.push(name.clone());

            let outcome = match tokio::time::timeout(self.timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(SourceError::Timeout(self.timeout)),
            };

            match outcome {
                Ok(value) if !value.is_empty_answer() => {
                    tracing::debug!(source = %name, attempts = tried.len(), "Source answered");
                    return Ok(Sourced {
                        value,
                        source: name,
                        tried,
                    });
                }
                Ok(value) => {
                    tracing::debug!(source = %name, "Source answered empty, trying next");
                    if first_empty.is_none() {
                        first_empty = Some((value, name));
                    }
                }
                Err(e) => {
                    tracing::warn!(source = %name, error = %e, "Source failed");
                    last_error = Some(e);
                }
            }
        }

        if let Some((value, source)) = first_empty {
            tracing::debug!(source = %source, "No source answered non-empty, returning empty answer");
            return Ok(Sourced {
                value,
                source,
                tried,
            });
        }

        match last_error {
            Some(last_error) => Err(DispatchError::AllSourcesExhausted { tried, last_error }),
            None => Err(DispatchError::NoSources),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchError {
    #[error("All sources exhausted (tried {}): {last_error}", .tried.join(", "))]
    AllSourcesExhausted {
        tried: Vec<String>,
        last_error: SourceError,
    },

    #[error("No sources configured")]
    NoSources,
}
