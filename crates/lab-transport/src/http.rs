use crate::{CommandConnection, Reply, Result, TransportError};
use std::time::Duration;
use tracing::debug;

/// Command channel over the device's HTTP server.
///
/// Every request goes out as `GET`; the logical verb is already encoded in
/// the target's query string.
pub struct HttpConnection {
    base: String,
    client: reqwest::blocking::Client,
}

impl HttpConnection {
    pub fn open(address: &str, port: u16, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let base = format!("http://{address}:{port}");
        debug!(%base, ?timeout, "http command channel ready");
        Ok(Self { base, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }
}

fn map_err(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Io(e.to_string())
    }
}

impl CommandConnection for HttpConnection {
    fn send(&mut self, target: &str) -> Result<Reply> {
        let url = format!("{}{}", self.base, target);
        let resp = self.client.get(&url).send().map_err(map_err)?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .map_err(|e| TransportError::MalformedReply(e.to_string()))?;
        Ok(Reply { status, body })
    }

    fn backend(&self) -> &'static str {
        "http"
    }
}
