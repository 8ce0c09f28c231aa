//! Test doubles shared by unit tests: a scripted transport and an event log.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::error::{TransportError, TransportErrorKind};
use crate::events::{EventFn, EventLevel};
use crate::http::{HttpRequest, HttpResponse, Transport};

#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Status(u32, String),
    Fail,
}

/// Answers by URL from a per-URL script. The last reply for a URL repeats;
/// unscripted URLs get `200`.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    script: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<(HttpRequest, Instant)>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn reply(&self, url: &str, replies: Vec<Reply>) {
        self.script
            .lock()
            .unwrap()
            .insert(url.to_string(), replies.into());
    }

    pub(crate) fn calls(&self) -> Vec<(HttpRequest, Instant)> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn calls_to(&self, url: &str) -> Vec<(HttpRequest, Instant)> {
        self.calls()
            .into_iter()
            .filter(|(req, _)| req.url == url)
            .collect()
    }
}

impl Transport for ScriptedTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.calls
            .lock()
            .unwrap()
            .push((request.clone(), Instant::now()));
        let reply = {
            let mut script = self.script.lock().unwrap();
            match script.get_mut(&request.url) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };
        match reply.unwrap_or(Reply::Status(200, String::new())) {
            Reply::Status(status, body) => Ok(HttpResponse::new(status, body)),
            Reply::Fail => Err(TransportError::new(
                request.url.clone(),
                TransportErrorKind::Connection,
                "connection refused",
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Event {
    pub name: String,
    pub message: String,
    pub level: EventLevel,
}

#[derive(Clone, Default)]
pub(crate) struct EventLog {
    events: Arc<Mutex<Vec<Event>>>,
}

impl EventLog {
    pub(crate) fn event_fn(&self) -> EventFn {
        let events = Arc::clone(&self.events);
        Arc::new(move |name: &str, message: &str, _source: &str, level: EventLevel| {
            events.lock().unwrap().push(Event {
                name: name.to_string(),
                message: message.to_string(),
                level,
            });
        })
    }

    pub(crate) fn all(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn named(&self, name: &str) -> Vec<Event> {
        self.all().into_iter().filter(|e| e.name == name).collect()
    }
}
