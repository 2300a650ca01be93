use std::future::Future;

use tracing::instrument::{WithDispatch, WithSubscriber};
use tracing::Dispatch;

/// Logging capability handed to a bridge at construction.
///
/// Wraps a [`Dispatch`] instead of relying on a process-wide subscriber.
/// Every future the bridge runs is scoped to this dispatch, so two bridges
/// in one process can log to different sinks.
#[derive(Clone, Debug)]
pub struct Logger {
    dispatch: Dispatch,
}

impl Logger {
    pub fn new(dispatch: Dispatch) -> Self {
        Self { dispatch }
    }

    /// A logger that discards everything.
    pub fn disabled() -> Self {
        Self::new(Dispatch::none())
    }

    /// Capture the caller's current default dispatch.
    pub fn current() -> Self {
        tracing::dispatcher::get_default(|dispatch| Self::new(dispatch.clone()))
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Scope `future` to this logger.
    pub fn instrument<F: Future>(&self, future: F) -> WithDispatch<F> {
        future.with_subscriber(self.dispatch.clone())
    }

    /// Run `f` with this logger as the default.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }
}

impl From<Dispatch> for Logger {
    fn from(dispatch: Dispatch) -> Self {
        Self::new(dispatch)
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::CapturedLogs;

    use super::*;

    #[tokio::test]
    async fn instrumented_future_logs_to_injected_sink() {
        let logs = CapturedLogs::new();
        let logger = logs.logger();

        logger
            .instrument(async {
                tracing::info!(answer = 42, "inside bridge future");
            })
            .await;
        tracing::info!("outside any logger");

        let text = logs.contents();
        assert!(text.contains("inside bridge future"));
        assert!(text.contains("answer=42"));
        assert!(!text.contains("outside any logger"));
    }

    #[test]
    fn in_scope_uses_logger() {
        let logs = CapturedLogs::new();
        logs.logger().in_scope(|| tracing::warn!("scoped warning"));
        assert!(logs.contents().contains("scoped warning"));
    }

    #[test]
    fn current_captures_ambient_default() {
        let logs = CapturedLogs::new();
        let ambient = logs.logger().dispatch().clone();
        let captured = tracing::dispatcher::with_default(&ambient, Logger::current);

        tracing::info!("before capture is used");
        captured.in_scope(|| tracing::info!("logged through captured logger"));

        let text = logs.contents();
        assert!(text.contains("logged through captured logger"));
        assert!(!text.contains("before capture is used"));
    }

    #[test]
    fn disabled_logger_drops_events() {
        let logger = Logger::disabled();
        logger.in_scope(|| tracing::error!("nobody hears this"));
        assert!(logger.dispatch().is::<tracing::subscriber::NoSubscriber>());
    }
}
