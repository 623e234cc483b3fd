//! W3C trace context carried across process boundaries.

use std::collections::BTreeMap;
use uuid::Uuid;

/// A position in a distributed trace.
///
/// Serializes to and from the W3C `traceparent` header
/// (`00-<32 hex trace id>-<16 hex span id>-<flags>`) plus an optional
/// `baggage` header.
///
/// # Examples
///
/// ```
/// use kikkake_core::TraceContext;
///
/// let root = TraceContext::new_root();
/// let parsed = TraceContext::from_traceparent(&root.traceparent()).unwrap();
/// assert_eq!(parsed.trace_id, root.trace_id);
/// assert_eq!(parsed.span_id, root.span_id);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    pub trace_id: String,
    pub span_id: String,
    pub sampled: bool,
    pub baggage: BTreeMap<String, String>,
}

impl TraceContext {
    /// Starts a new trace.
    pub fn new_root() -> Self {
        Self {
            trace_id: Uuid::new_v4().simple().to_string(),
            span_id: new_span_id(),
            sampled: true,
            baggage: BTreeMap::new(),
        }
    }

    /// A new span in the same trace. Baggage is inherited.
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            span_id: new_span_id(),
            sampled: self.sampled,
            baggage: self.baggage.clone(),
        }
    }

    /// Parses a `traceparent` header. Returns `None` when malformed or
    /// when either id is all zeros.
    pub fn from_traceparent(header: &str) -> Option<Self> {
        let mut parts = header.trim().split('-');
        let version = parts.next()?;
        let trace_id = parts.next()?;
        let span_id = parts.next()?;
        let flags = parts.next()?;
        if parts.next().is_some() || version != "00" {
            return None;
        }
        if !is_hex(trace_id, 32) || !is_hex(span_id, 16) || !is_hex(flags, 2) {
            return None;
        }
        if trace_id.bytes().all(|b| b == b'0') || span_id.bytes().all(|b| b == b'0') {
            return None;
        }
        let flags = u8::from_str_radix(flags, 16).ok()?;
        Some(Self {
            trace_id: trace_id.to_ascii_lowercase(),
            span_id: span_id.to_ascii_lowercase(),
            sampled: flags & 0x01 == 0x01,
            baggage: BTreeMap::new(),
        })
    }

    /// Extracts a context from a `traceparent` and optional `baggage` header.
    pub fn extract(traceparent: Option<&str>, baggage: Option<&str>) -> Option<Self> {
        let mut context = Self::from_traceparent(traceparent?)?;
        if let Some(baggage) = baggage {
            context.baggage = parse_baggage(baggage);
        }
        Some(context)
    }

    pub fn with_baggage(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.baggage.insert(key.into(), value.into());
        self
    }

    pub fn traceparent(&self) -> String {
        let flags = if self.sampled { "01" } else { "00" };
        format!("00-{}-{}-{}", self.trace_id, self.span_id, flags)
    }

    /// The `baggage` header, or `None` when there is no baggage.
    pub fn baggage_header(&self) -> Option<String> {
        if self.baggage.is_empty() {
            return None;
        }
        Some(
            self.baggage
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(","),
        )
    }
}

fn new_span_id() -> String {
    let simple = Uuid::new_v4().simple().to_string();
    simple[..16].to_string()
}

fn is_hex(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_hexdigit())
}

fn parse_baggage(header: &str) -> BTreeMap<String, String> {
    header
        .split(',')
        .filter_map(|entry| {
            // properties after ';' are dropped
            let entry = entry.split(';').next()?.trim();
            let (key, value) = entry.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_ids_have_w3c_lengths() {
        let ctx = TraceContext::new_root();
        assert_eq!(ctx.trace_id.len(), 32);
        assert_eq!(ctx.span_id.len(), 16);
        assert!(ctx.traceparent().starts_with("00-"));
        assert!(ctx.traceparent().ends_with("-01"));
    }

    #[test]
    fn test_child_keeps_trace_id() {
        let root = TraceContext::new_root().with_baggage("tenant", "acme");
        let child = root.child();
        assert_eq!(child.trace_id, root.trace_id);
        assert_ne!(child.span_id, root.span_id);
        assert_eq!(child.baggage.get("tenant").map(String::as_str), Some("acme"));
    }

    #[test]
    fn test_rejects_malformed_traceparent() {
        assert!(TraceContext::from_traceparent("garbage").is_none());
        assert!(TraceContext::from_traceparent(
            "01-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"
        )
        .is_none());
        assert!(TraceContext::from_traceparent(
            "00-00000000000000000000000000000000-00f067aa0ba902b7-01"
        )
        .is_none());
        assert!(TraceContext::from_traceparent("00-4bf92f35-00f067aa0ba902b7-01").is_none());
    }

    #[test]
    fn test_extract_with_baggage() {
        let ctx = TraceContext::extract(
            Some("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-00"),
            Some("userId=42, tenant=acme;ttl=3"),
        )
        .unwrap();
        assert!(!ctx.sampled);
        assert_eq!(ctx.baggage.get("userId").map(String::as_str), Some("42"));
        assert_eq!(ctx.baggage.get("tenant").map(String::as_str), Some("acme"));
        assert_eq!(ctx.baggage_header().unwrap(), "tenant=acme,userId=42");
    }
}
