//! Out-of-band event reporting.
//!
//! Background work (detached saves) has no request to return errors to, so
//! its failures go to an [`EventReporter`]. Save notifications use the same
//! channel. Events are always logged; `HttpReporter` additionally forwards
//! them as JSON to a collector.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{error, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Error,
}

#[derive(Clone, Debug, Serialize)]
pub struct Event {
    pub level: EventLevel,
    pub title: String,
    pub details: String,
    pub tags: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    fn new(level: EventLevel, title: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            details: String::new(),
            tags: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn info(title: impl Into<String>) -> Self {
        Self::new(EventLevel::Info, title)
    }

    pub fn error(title: impl Into<String>) -> Self {
        Self::new(EventLevel::Error, title)
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

pub trait EventReporter: Send + Sync {
    fn report(&self, event: Event);
}

fn log_event(event: &Event) {
    match event.level {
        EventLevel::Info => info!(title = %event.title, details = %event.details, tags = ?event.tags, "event"),
        EventLevel::Error => error!(title = %event.title, details = %event.details, tags = ?event.tags, "event"),
    }
}

/// Writes events to the tracing subscriber only.
#[derive(Clone, Debug, Default)]
pub struct LogReporter;

impl EventReporter for LogReporter {
    fn report(&self, event: Event) {
        log_event(&event);
    }
}

/// Logs events and POSTs them to `url` without blocking the caller.
///
/// Must be used from within a tokio runtime.
#[derive(Clone, Debug)]
pub struct HttpReporter {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl HttpReporter {
    pub fn new(url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            token,
        }
    }
}

impl EventReporter for HttpReporter {
    fn report(&self, event: Event) {
        log_event(&event);

        let mut request = self.client.post(&self.url).json(&event);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let url = self.url.clone();
        tokio::spawn(async move {
            match request.send().await {
                Ok(resp) if resp.status().is_success() => {}
                Ok(resp) => warn!(%url, status = %resp.status(), "event collector rejected event"),
                Err(err) => warn!(%url, error = %err, "failed to deliver event"),
            }
        });
    }
}
