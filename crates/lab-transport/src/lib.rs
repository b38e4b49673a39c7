//! lab-transport: the two channels of a networked lab device
//!
//! A device exposes its resources over a synchronous command channel
//! (request/response, one request in flight) and an asynchronous telemetry
//! stream (pushed records, latest value cached). This crate provides the
//! channel traits, the wire conventions, and the two resourcers built on
//! them. Backends are feature-gated; the default `mock` backend needs no
//! network so everything builds and tests on any host.

mod types;
pub use types::{from_hex, to_hex, Reply, RequestTarget, Verb, STREAM_PATH};

mod error;
pub use error::{Result, TransportError};

mod traits;
pub use traits::{CommandConnection, TelemetryConnector, TelemetryLink};

mod command;
pub use command::SyncResourcer;

mod telemetry;
pub use telemetry::{ReconnectPolicy, TelemetryConfig, TelemetryResourcer, TelemetryStats};

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::{MockCommandHandle, MockConnection, MockTelemetry};

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::HttpConnection;

#[cfg(feature = "ws")]
mod ws;

#[cfg(feature = "ws")]
pub use ws::WsConnector;
