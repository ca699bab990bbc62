//! The control-flow engine.
//!
//! One run per request:
//!
//! ```text
//! Init → Before → Handling → After → Responding → Done
//!   │       │         │        │
//!   └───────┴─────────┴────────┴──→ Recovering → Responding → Done
//! ```
//!
//! `before` stages run in registration order, `after` and `on_error` stages
//! run in reverse. The sent flag is checked after every hook invocation and
//! after the handler; once it is set, nothing else in the forward path runs.
//!
//! A failure aborts the current stage and enters recovery. The thrown value
//! is normalized once, stored on the request context, and handed to every
//! `on_error` stage. Failures inside `on_error` are logged and swallowed. If
//! nobody responded, the executor sends a fallback built from the envelope.
//! Panics are treated like any other thrown value.

use crate::context::{RequestContext, ResponseContext};
use crate::error::{normalize, ErrorEnvelope};
use crate::hook::{BoxFuture, Hook};
use crate::pipeline::{HandlerFn, PipelineOptions};
use futures_util::FutureExt;
use serde_json::{Map, Value};
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use tracing::Instrument;

/// Execution states of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Input population.
    Init,
    /// Forward `before` stages.
    Before,
    /// The handler.
    Handling,
    /// Reverse `after` stages.
    After,
    /// Sending the success or fallback response.
    Responding,
    /// Reverse `on_error` stages.
    Recovering,
    /// Finished.
    Done,
}

impl Phase {
    /// Returns the phase name used in logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Before => "before",
            Self::Handling => "handling",
            Self::After => "after",
            Self::Responding => "responding",
            Self::Recovering => "recovering",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Every stage ran and the executor sent the output with status 200.
    Completed,

    /// A hook or the handler sent the response, so the run stopped early.
    ShortCircuited {
        /// Phase in which the response was observed as sent.
        phase: Phase,
        /// Name of the hook that sent it; `None` for the handler.
        hook: Option<String>,
    },

    /// A stage failed and the error path ran.
    Recovered {
        /// The normalized error.
        error: ErrorEnvelope,
        /// Phase that failed.
        failed_in: Phase,
        /// `true` if an `on_error` stage sent the response. `false` if the
        /// executor sent the fallback or the response was already sent
        /// when the failure happened.
        handled_by_hook: bool,
    },
}

impl Outcome {
    /// Returns `true` for [`Outcome::Completed`].
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Returns `true` for [`Outcome::ShortCircuited`].
    #[must_use]
    pub fn is_short_circuited(&self) -> bool {
        matches!(self, Self::ShortCircuited { .. })
    }

    /// Returns `true` for [`Outcome::Recovered`].
    #[must_use]
    pub fn is_recovered(&self) -> bool {
        matches!(self, Self::Recovered { .. })
    }

    /// The normalized error, if the run failed.
    #[must_use]
    pub fn error(&self) -> Option<&ErrorEnvelope> {
        match self {
            Self::Recovered { error, .. } => Some(error),
            _ => None,
        }
    }
}

enum Flow {
    Continue,
    Sent { phase: Phase, hook: Option<String> },
}

struct Failure {
    phase: Phase,
    thrown: anyhow::Error,
}

impl Failure {
    fn at(phase: Phase) -> impl FnOnce(anyhow::Error) -> Self {
        move |thrown| Self { phase, thrown }
    }
}

/// Borrowed view of a pipeline for one run.
pub(crate) struct Executor<'a> {
    pub(crate) hooks: &'a [Hook],
    pub(crate) handler: &'a HandlerFn,
    pub(crate) options: &'a PipelineOptions,
}

impl Executor<'_> {
    pub(crate) async fn run(&self, req: RequestContext, res: ResponseContext) -> Outcome {
        let span = tracing::info_span!(
            "pipeline",
            request_id = %req.request_id(),
            method = req.method().unwrap_or("-"),
            url = req.url().unwrap_or("-"),
        );

        self.run_in_span(req, res).instrument(span).await
    }

    async fn run_in_span(&self, req: RequestContext, res: ResponseContext) -> Outcome {
        if req.populate_input(&self.options.reserved_query_prefix) {
            tracing::trace!(phase = %Phase::Init, "Input derived from transport");
        }

        let outcome = match self.forward(&req, &res).await {
            Ok(Flow::Continue) => {
                tracing::trace!(phase = %Phase::Responding, "Sending output");
                let body = res
                    .output()
                    .get()
                    .filter(|output| !output.is_null())
                    .unwrap_or_else(|| Value::Object(Map::new()));
                res.status(200).json(body);
                Outcome::Completed
            }
            Ok(Flow::Sent { phase, hook }) => {
                tracing::debug!(
                    phase = %phase,
                    hook = hook.as_deref().unwrap_or("handler"),
                    "Response already sent, stopping pipeline"
                );
                Outcome::ShortCircuited { phase, hook }
            }
            Err(failure) => self.recover(failure, &req, &res).await,
        };

        let elapsed_ms = u64::try_from(req.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::trace!(phase = %Phase::Done, elapsed_ms, "Pipeline finished");
        outcome
    }

    async fn forward(&self, req: &RequestContext, res: &ResponseContext) -> Result<Flow, Failure> {
        for hook in self.hooks {
            let Some(stage) = hook.before_stage() else {
                continue;
            };
            guarded(|| stage(req.clone(), res.clone()))
                .await
                .map_err(Failure::at(Phase::Before))?;
            if res.response_sent() {
                return Ok(Flow::Sent {
                    phase: Phase::Before,
                    hook: Some(hook.name().to_string()),
                });
            }
        }

        let produced = guarded(|| (self.handler)(req.clone(), res.clone()))
            .await
            .map_err(Failure::at(Phase::Handling))?;
        if let Some(value) = produced {
            res.output().merge(value);
        }
        if res.response_sent() {
            return Ok(Flow::Sent {
                phase: Phase::Handling,
                hook: None,
            });
        }

        for hook in self.hooks.iter().rev() {
            let Some(stage) = hook.after_stage() else {
                continue;
            };
            // Hooks only see a defined output.
            let Some(output) = res.output().get() else {
                continue;
            };
            guarded(|| stage(req.clone(), res.clone(), output))
                .await
                .map_err(Failure::at(Phase::After))?;
            if res.response_sent() {
                return Ok(Flow::Sent {
                    phase: Phase::After,
                    hook: Some(hook.name().to_string()),
                });
            }
        }

        Ok(Flow::Continue)
    }

    async fn recover(&self, failure: Failure, req: &RequestContext, res: &ResponseContext) -> Outcome {
        let Failure { phase, thrown } = failure;
        let envelope = normalize(&thrown);

        if !req.record_error(&envelope) {
            tracing::debug!(code = %envelope.code, "Request already carries an error, keeping the first");
        }
        tracing::debug!(
            failed_in = %phase,
            code = %envelope.code,
            status = envelope.status,
            "Pipeline failed, running error hooks"
        );

        let sent_before_hooks = res.response_sent();
        for hook in self.hooks.iter().rev() {
            let Some(stage) = hook.on_error_stage() else {
                continue;
            };
            if let Err(secondary) = guarded(|| stage(envelope.clone(), req.clone(), res.clone())).await {
                tracing::error!(
                    hook = hook.name(),
                    error = %secondary,
                    original_code = %envelope.code,
                    "on_error hook failed"
                );
            }
        }

        let handled_by_hook = !sent_before_hooks && res.response_sent();
        if !res.response_sent() {
            let body = if self.options.verbose_errors {
                envelope.verbose_body()
            } else {
                envelope.terse_body(&self.options.internal_error_message)
            };
            tracing::trace!(phase = %Phase::Responding, status = envelope.status, "Sending fallback");
            res.status(envelope.status).json(body);
        }

        Outcome::Recovered {
            error: envelope,
            failed_in: phase,
            handled_by_hook,
        }
    }
}

/// Invokes a stage, turning panics into thrown values.
async fn guarded<T>(
    call: impl FnOnce() -> BoxFuture<'static, anyhow::Result<T>>,
) -> anyhow::Result<T> {
    let future = std::panic::catch_unwind(AssertUnwindSafe(call)).map_err(panic_error)?;
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(panic_error(payload)),
    }
}

fn panic_error(payload: Box<dyn Any + Send>) -> anyhow::Error {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    anyhow::anyhow!("panicked: {message}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_names() {
        assert_eq!(Phase::Before.to_string(), "before");
        assert_eq!(Phase::Recovering.name(), "recovering");
    }

    #[test]
    fn test_outcome_accessors() {
        let recovered = Outcome::Recovered {
            error: ErrorEnvelope::internal("x"),
            failed_in: Phase::Handling,
            handled_by_hook: false,
        };
        assert!(recovered.is_recovered());
        assert_eq!(recovered.error().map(|e| e.status), Some(500));

        assert!(Outcome::Completed.is_completed());
        assert!(Outcome::Completed.error().is_none());
        assert!(Outcome::ShortCircuited {
            phase: Phase::Before,
            hook: None
        }
        .is_short_circuited());
    }

    #[tokio::test]
    async fn test_guarded_catches_panics() {
        let err = guarded::<()>(|| {
            Box::pin(async {
                if true {
                    panic!("kaboom");
                }
                Ok(())
            })
        })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "panicked: kaboom");

        let err = guarded::<()>(|| panic!("{} {}", "eager", 1)).await.unwrap_err();
        assert_eq!(err.to_string(), "panicked: eager 1");
    }

    #[tokio::test]
    async fn test_guarded_passes_results_through() {
        let value = guarded::<i32>(|| Box::pin(async { Ok(7) })).await.unwrap();
        assert_eq!(value, 7);

        let err = guarded::<()>(|| Box::pin(async { Err(anyhow::anyhow!("plain")) }))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "plain");
    }
}
