//! Proof-of-play delivery.
//!
//! A confirm or expire makes its first attempt on the caller's task. Retriable
//! failures (5xx, no response) go onto a bounded retry queue; a retry worker
//! holds each one until its retry interval has passed and hands it to the
//! submission worker, which makes the next attempt. The ad's lease decides
//! how long this goes on: once it has elapsed the request is abandoned.

mod classify;
mod engine;
mod request;

pub use classify::{classify_status, Disposition};
pub use engine::{EngineSettings, ProofOfPlayEngine};
pub(crate) use engine::shutdown_requested;
pub use request::{DeliveryKind, DeliveryRequest, Outcome};
