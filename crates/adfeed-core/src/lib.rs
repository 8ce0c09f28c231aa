pub mod config;
pub mod logging;

pub mod ad;
pub mod client;
pub mod error;
pub mod events;
pub mod fanout;
pub mod http;
pub mod pop;
pub mod registry;
pub mod stats;

#[cfg(test)]
pub(crate) mod testing;

pub use ad::{AdRequest, Advertisement};
pub use client::{AdDeliveryClient, ClientHooks};
pub use config::ClientConfig;
pub use error::{AdError, CacheError, ClientError, DeliveryError, TransportError};
pub use events::{EventFn, EventLevel};
pub use fanout::CacheFn;
