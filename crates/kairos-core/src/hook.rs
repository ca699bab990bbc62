//! Lifecycle hooks.
//!
//! A [`Hook`] is a plain capability record: a name plus up to three optional
//! stages. The executor dispatches by presence, so a hook that only cares
//! about failures sets `on_error` and nothing else.
//!
//! | Stage      | Runs                                   | Order    |
//! |------------|----------------------------------------|----------|
//! | `before`   | before the handler                     | forward  |
//! | `after`    | after the handler, if output is defined | reverse  |
//! | `on_error` | after any failure in the stages above  | reverse  |
//!
//! # Example
//!
//! ```
//! use kairos_core::Hook;
//! use serde_json::json;
//!
//! let stamp = Hook::named("stamp")
//!     .before(|req, _res| async move {
//!         req.scratchpad().insert("startedAt", json!(1234));
//!         Ok(())
//!     })
//!     .after(|_req, res, _output| async move {
//!         res.output().merge(json!({"stamped": true}));
//!         Ok(())
//!     });
//!
//! assert!(stamp.has_before());
//! assert!(stamp.has_after());
//! assert!(!stamp.has_on_error());
//! ```

use crate::context::{RequestContext, ResponseContext};
use crate::error::ErrorEnvelope;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result of a hook stage. Any error is a thrown value.
pub type HookResult = Result<(), anyhow::Error>;

/// Future returned by every hook stage.
pub type HookFuture = BoxFuture<'static, HookResult>;

/// The `before` stage.
pub type BeforeFn = Arc<dyn Fn(RequestContext, ResponseContext) -> HookFuture + Send + Sync>;

/// The `after` stage; receives a snapshot of the current output.
pub type AfterFn =
    Arc<dyn Fn(RequestContext, ResponseContext, Value) -> HookFuture + Send + Sync>;

/// The `on_error` stage; receives the normalized error.
pub type OnErrorFn =
    Arc<dyn Fn(ErrorEnvelope, RequestContext, ResponseContext) -> HookFuture + Send + Sync>;

/// A registered unit of cross-cutting behavior.
#[derive(Clone)]
pub struct Hook {
    name: String,
    before: Option<BeforeFn>,
    after: Option<AfterFn>,
    on_error: Option<OnErrorFn>,
}

impl Hook {
    /// Creates an anonymous hook with no stages.
    #[must_use]
    pub fn new() -> Self {
        Self::named("anonymous")
    }

    /// Creates a named hook with no stages.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            before: None,
            after: None,
            on_error: None,
        }
    }

    /// Returns the hook name used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets the `before` stage.
    #[must_use]
    pub fn before<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(RequestContext, ResponseContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        let stage: BeforeFn = Arc::new(move |req: RequestContext, res: ResponseContext| -> HookFuture {
            Box::pin(f(req, res))
        });
        self.before = Some(stage);
        self
    }

    /// Sets the `after` stage.
    #[must_use]
    pub fn after<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(RequestContext, ResponseContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        let stage: AfterFn =
            Arc::new(move |req: RequestContext, res: ResponseContext, output: Value| -> HookFuture {
                Box::pin(f(req, res, output))
            });
        self.after = Some(stage);
        self
    }

    /// Sets the `on_error` stage.
    #[must_use]
    pub fn on_error<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ErrorEnvelope, RequestContext, ResponseContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        let stage: OnErrorFn =
            Arc::new(move |err: ErrorEnvelope, req: RequestContext, res: ResponseContext| -> HookFuture {
                Box::pin(f(err, req, res))
            });
        self.on_error = Some(stage);
        self
    }

    /// Returns `true` if the hook has a `before` stage.
    #[must_use]
    pub fn has_before(&self) -> bool {
        self.before.is_some()
    }

    /// Returns `true` if the hook has an `after` stage.
    #[must_use]
    pub fn has_after(&self) -> bool {
        self.after.is_some()
    }

    /// Returns `true` if the hook has an `on_error` stage.
    #[must_use]
    pub fn has_on_error(&self) -> bool {
        self.on_error.is_some()
    }

    pub(crate) fn before_stage(&self) -> Option<&BeforeFn> {
        self.before.as_ref()
    }

    pub(crate) fn after_stage(&self) -> Option<&AfterFn> {
        self.after.as_ref()
    }

    pub(crate) fn on_error_stage(&self) -> Option<&OnErrorFn> {
        self.on_error.as_ref()
    }
}

impl Default for Hook {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("name", &self.name)
            .field("before", &self.has_before())
            .field("after", &self.has_after())
            .field("on_error", &self.has_on_error())
            .finish()
    }
}

/// Conversion into a [`Hook`].
///
/// Structured middleware implements this so it can be registered directly.
pub trait IntoHook {
    /// Builds the hook.
    fn into_hook(self) -> Hook;
}

impl IntoHook for Hook {
    fn into_hook(self) -> Hook {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::BufferedSink;
    use crate::transport::TransportRequest;
    use serde_json::json;

    #[test]
    fn test_empty_hook_has_no_stages() {
        let hook = Hook::new();
        assert_eq!(hook.name(), "anonymous");
        assert!(!hook.has_before());
        assert!(!hook.has_after());
        assert!(!hook.has_on_error());
    }

    #[test]
    fn test_debug_lists_stages() {
        let hook = Hook::named("audit").on_error(|_err, _req, _res| async { Ok(()) });
        let debug = format!("{hook:?}");
        assert!(debug.contains("audit"));
        assert!(debug.contains("on_error: true"));
        assert!(debug.contains("before: false"));
    }

    #[tokio::test]
    async fn test_stages_are_invocable() {
        let hook = Hook::named("echo")
            .before(|req, _res| async move {
                req.scratchpad().insert("before", json!(true));
                Ok(())
            })
            .after(|req, _res, output| async move {
                req.scratchpad().insert("seen", output);
                Ok(())
            });

        let req = RequestContext::new(TransportRequest::default());
        let res = ResponseContext::new(BufferedSink::new());

        let before = hook.before_stage().unwrap();
        before(req.clone(), res.clone()).await.unwrap();

        let after = hook.after_stage().unwrap();
        after(req.clone(), res.clone(), json!({"x": 1})).await.unwrap();

        assert_eq!(req.scratchpad().get("before"), Some(json!(true)));
        assert_eq!(req.scratchpad().get("seen"), Some(json!({"x": 1})));
        assert!(hook.on_error_stage().is_none());
    }

    #[test]
    fn test_into_hook_is_identity_for_hooks() {
        let hook = Hook::named("same").into_hook();
        assert_eq!(hook.name(), "same");
    }
}
