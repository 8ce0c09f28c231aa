//! Event publishing to the injected sink.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Severity attached to a published event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Warning,
    Critical,
}

impl EventLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            EventLevel::Info => "info",
            EventLevel::Warning => "warning",
            EventLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Injected publish function: `(name, message, source, level)`.
pub type EventFn = Arc<dyn Fn(&str, &str, &str, EventLevel) + Send + Sync>;

/// Cloneable handle around the optional event function.
///
/// Every event is also logged through `tracing`, so a client built without a
/// sink still leaves a trail.
#[derive(Clone)]
pub struct EventSink {
    publish: Option<EventFn>,
    source: Arc<str>,
}

impl EventSink {
    pub fn new(publish: Option<EventFn>, source: &str) -> Self {
        Self {
            publish,
            source: Arc::from(source),
        }
    }

    #[cfg(test)]
    fn disabled() -> Self {
        Self::new(None, "")
    }

    pub fn publish(&self, name: &str, message: &str, level: EventLevel) {
        match level {
            EventLevel::Critical => tracing::error!(event = name, "{}", message),
            EventLevel::Warning => tracing::warn!(event = name, "{}", message),
            EventLevel::Info => tracing::info!(event = name, "{}", message),
        }
        if let Some(publish) = &self.publish {
            publish(name, message, &self.source, level);
        }
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("enabled", &self.publish.is_some())
            .field("source", &self.source)
            .finish()
    }
}
