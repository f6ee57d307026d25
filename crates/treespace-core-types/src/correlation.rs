//! Request correlation
//!
//! A `RequestContext` travels with every mutation into the hook pipeline.
//! Hooks read the principal from it; log lines carry its request id.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! correlation_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Fresh time-ordered (UUIDv7) id
            pub fn new() -> Self {
                Self(Uuid::now_v7().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

correlation_id!(
    /// Identifies one call into a treespace
    RequestId
);

correlation_id!(
    /// Ties requests together across service boundaries
    TraceId
);

/// Who is asking, and under which ids
///
/// `principal` is `None` for internal requests such as bootstrap loading
/// or replication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub request_id: RequestId,
    pub trace_id: Option<TraceId>,
    pub principal: Option<String>,
}

impl RequestContext {
    /// Internal request with a fresh id
    pub fn new() -> Self {
        Self::with_request_id(RequestId::new())
    }

    pub fn with_request_id(request_id: RequestId) -> Self {
        Self {
            request_id,
            trace_id: None,
            principal: None,
        }
    }

    /// Request made on behalf of `principal`
    pub fn on_behalf_of(principal: impl Into<String>) -> Self {
        Self::new().with_principal(principal)
    }

    pub fn with_trace_id(mut self, trace_id: TraceId) -> Self {
        self.trace_id = Some(trace_id);
        self
    }

    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    pub fn is_internal(&self) -> bool {
        self.principal.is_none()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_and_display_raw() {
        let a = RequestId::new();
        let b = RequestId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string(), a.as_str());
        assert_ne!(TraceId::new(), TraceId::new());
    }

    #[test]
    fn test_context_defaults_to_internal() {
        let ctx = RequestContext::new();
        assert!(ctx.is_internal());
        assert!(ctx.trace_id.is_none());

        let trace = TraceId::from("trace-1".to_string());
        let ctx = RequestContext::on_behalf_of("netops").with_trace_id(trace.clone());
        assert!(!ctx.is_internal());
        assert_eq!(ctx.principal.as_deref(), Some("netops"));
        assert_eq!(ctx.trace_id, Some(trace));
    }

    #[test]
    fn test_ids_serialize_as_plain_strings() {
        let id = RequestId::from("req-42".to_string());
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"req-42\"");
        let back: RequestId = serde_json::from_str("\"req-42\"").unwrap();
        assert_eq!(back, id);
    }
}
