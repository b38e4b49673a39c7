use crate::{CommandConnection, RequestTarget, Result, TransportError, Verb};
use parking_lot::Mutex;
use std::fmt::Display;
use tracing::debug;

/// Synchronous resourcer: one connection, one request in flight.
pub struct SyncResourcer {
    conn: Mutex<Box<dyn CommandConnection>>,
}

impl SyncResourcer {
    pub fn new(conn: impl CommandConnection + 'static) -> Self {
        Self::from_boxed(Box::new(conn))
    }

    pub fn from_boxed(conn: Box<dyn CommandConnection>) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Read the current value of `path` as text.
    pub fn get(&self, path: &str) -> Result<String> {
        let target = RequestTarget::with_verb(path, &Verb::Get);
        let reply = self.request(&target)?;
        if !reply.is_success() {
            return Err(TransportError::Status(reply.status));
        }
        Ok(reply.text().to_string())
    }

    /// Write `value` to `path`, returning the reply's status code.
    pub fn post(&self, path: &str, value: impl Display) -> Result<u16> {
        let target = RequestTarget::with_verb(path, &Verb::Post).param("value", value);
        let reply = self.request(&target)?;
        Ok(reply.status)
    }

    fn request(&self, target: &RequestTarget) -> Result<crate::Reply> {
        let mut conn = self.conn.lock();
        let reply = conn.send(target.as_str())?;
        debug!(
            backend = conn.backend(),
            target = %target,
            status = reply.status,
            "command request"
        );
        Ok(reply)
    }
}
