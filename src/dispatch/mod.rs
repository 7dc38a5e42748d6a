// src/dispatch/mod.rs
//! Alert delivery
//!
//! The scan scheduler only decides which records are alert-eligible; the
//! dispatchers here carry the payload out. Several may be configured at once.

use crate::types::AlertPayload;
use async_trait::async_trait;
use std::sync::Arc;

pub mod email;
pub mod log;
pub mod webhook;

pub use email::EmailDispatcher;
pub use log::LogDispatcher;
pub use webhook::WebhookDispatcher;

/// Trait for alert channels
///
/// `Ok(())` means the alert was handed to the channel successfully.
#[async_trait]
pub trait AlertDispatcher: Send + Sync {
    async fn send(&self, payload: &AlertPayload) -> anyhow::Result<()>;

    /// Short channel name for logs
    fn name(&self) -> &str;
}

/// Fans an alert out to every configured dispatcher
pub struct DispatchManager {
    dispatchers: Vec<Arc<dyn AlertDispatcher>>,
}

impl DispatchManager {
    pub fn new() -> Self {
        Self {
            dispatchers: Vec::new(),
        }
    }

    pub fn add_dispatcher(&mut self, dispatcher: Arc<dyn AlertDispatcher>) {
        self.dispatchers.push(dispatcher);
    }

    pub fn len(&self) -> usize {
        self.dispatchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dispatchers.is_empty()
    }
}

impl Default for DispatchManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AlertDispatcher for DispatchManager {
    /// Delivered when at least one channel accepted the alert
    ///
    /// Channel errors are logged; the last one is returned if every channel
    /// failed.
    async fn send(&self, payload: &AlertPayload) -> anyhow::Result<()> {
        if self.dispatchers.is_empty() {
            anyhow::bail!("no alert dispatchers configured");
        }

        let mut delivered = false;
        let mut last_error = None;

        for dispatcher in &self.dispatchers {
            match dispatcher.send(payload).await {
                Ok(()) => {
                    tracing::debug!("Alert for {} delivered via {}", payload.domain, dispatcher.name());
                    delivered = true;
                }
                Err(e) => {
                    tracing::warn!(
                        "Alert dispatcher {} failed for {}: {:#}",
                        dispatcher.name(),
                        payload.domain,
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        match (delivered, last_error) {
            (true, _) | (false, None) => Ok(()),
            (false, Some(err)) => Err(err),
        }
    }

    fn name(&self) -> &str {
        "fanout"
    }
}
