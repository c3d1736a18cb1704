//! Operator notifications
//!
//! The orchestrator reports noteworthy task events through the
//! [`Notifier`] trait. The default implementation only logs; deployments
//! that want push delivery plug in their own.

use tracing::info;

/// Events worth telling the operator about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotifyEvent {
    /// A task was confirmed this session.
    Success,
    /// A task turned out to be already completed.
    AlreadyDone,
    /// A task wants a secret and needs manual attention.
    NeedsSecret,
}

impl NotifyEvent {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::AlreadyDone => "already done",
            Self::NeedsSecret => "needs secret",
        }
    }
}

/// Delivery channel for operator notifications.
pub trait Notifier {
    /// Deliver one notification. Returns whether delivery succeeded;
    /// failures are non-fatal and never retried.
    fn notify(
        &self,
        event: NotifyEvent,
        context: &str,
    ) -> impl std::future::Future<Output = bool> + Send;
}

/// Logs notifications instead of delivering them anywhere.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn notify(&self, event: NotifyEvent, context: &str) -> bool {
        info!(event = event.label(), context, "notification");
        true
    }
}
