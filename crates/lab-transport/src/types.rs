use core::fmt;

/// Default path of the device's telemetry stream.
pub const STREAM_PATH: &str = "/stream";

/// Logical verb of a request on the command channel.
///
/// The device's HTTP stack only distinguishes `GET` and `POST`, so every
/// logical verb travels as a `verb=<VERB>` query parameter while the
/// physical request is always a `GET`.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Verb {
    Get,
    Post,
    Other(String),
}

impl Verb {
    pub fn as_str(&self) -> &str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Other(v) => v.as_str(),
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request target under construction: a resource path plus query parameters.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RequestTarget {
    target: String,
}

impl RequestTarget {
    pub fn new(path: &str) -> Self {
        Self {
            target: path.to_string(),
        }
    }

    /// Target for `verb` on `path`, e.g. `/a/b?verb=GET`.
    pub fn with_verb(path: &str, verb: &Verb) -> Self {
        Self::new(path).param("verb", verb.as_str())
    }

    /// Append `key=value`, using `&` if the target already carries a query.
    pub fn param(mut self, key: &str, value: impl fmt::Display) -> Self {
        let sep = if self.target.contains('?') { '&' } else { '?' };
        self.target.push(sep);
        self.target.push_str(key);
        self.target.push('=');
        self.target.push_str(&value.to_string());
        self
    }

    pub fn as_str(&self) -> &str {
        &self.target
    }

    pub fn into_string(self) -> String {
        self.target
    }
}

impl fmt::Display for RequestTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.target)
    }
}

/// Raw reply from the command channel.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub body: String,
}

impl Reply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body without its line terminator.
    pub fn text(&self) -> &str {
        self.body
            .strip_suffix('\n')
            .map(|s| s.strip_suffix('\r').unwrap_or(s))
            .unwrap_or(&self.body)
    }
}

/// Format a register value the way the device expects it on the wire.
pub fn to_hex(raw: u32) -> String {
    format!("0x{raw:X}")
}

/// Parse a `0x`-prefixed (or bare) hexadecimal register value.
pub fn from_hex(s: &str) -> Option<u32> {
    let t = s.trim();
    let digits = t
        .strip_prefix("0x")
        .or_else(|| t.strip_prefix("0X"))
        .unwrap_or(t);
    if digits.is_empty() {
        return None;
    }
    u32::from_str_radix(digits, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verb_tunnelled_as_query() {
        let t = RequestTarget::with_verb("/hey/look/a_wild/url", &Verb::Post);
        assert_eq!(t.as_str(), "/hey/look/a_wild/url?verb=POST");

        let t = RequestTarget::with_verb("/hey/look/a_wild/url", &Verb::Other("OMG".into()));
        assert_eq!(t.as_str(), "/hey/look/a_wild/url?verb=OMG");
    }

    #[test]
    fn test_verb_appended_to_existing_query() {
        let t = RequestTarget::with_verb("/hey/look/a_wild/url?pepito=jose", &Verb::Post);
        assert_eq!(t.as_str(), "/hey/look/a_wild/url?pepito=jose&verb=POST");
    }

    #[test]
    fn test_write_target_orders_verb_before_value() {
        let t = RequestTarget::with_verb("/a/b", &Verb::Post).param("value", 10);
        assert_eq!(t.to_string(), "/a/b?verb=POST&value=10");
    }

    #[test]
    fn test_reply_text_strips_terminator() {
        assert_eq!(Reply::new(200, "some_funny_value\n").text(), "some_funny_value");
        assert_eq!(Reply::new(200, "LOG_INFO\r\n").text(), "LOG_INFO");
        assert_eq!(Reply::new(200, "bare").text(), "bare");
        assert!(!Reply::new(404, "").is_success());
    }

    #[test]
    fn test_hex_helpers() {
        assert_eq!(to_hex(0x1E61), "0x1E61");
        assert_eq!(from_hex("0x0110"), Some(0x110));
        assert_eq!(from_hex("0X2710"), Some(0x2710));
        assert_eq!(from_hex("ff"), Some(0xFF));
        assert_eq!(from_hex("0x"), None);
        assert_eq!(from_hex("angle"), None);
    }
}
