//! Analytics session context
//!
//! The session identifier is captured once at process start and handed to
//! whoever needs it. Nothing mutates it afterwards.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Header carrying the session id on outbound catalog requests
pub const SESSION_HEADER: &str = "X-POSTHOG-SESSION-ID";

/// Read-only, process-wide session identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionContext {
    session_id: String,
    started_at: DateTime<Utc>,
}

impl SessionContext {
    /// Capture a fresh session at startup
    pub fn capture() -> Self {
        Self::from_id(Uuid::new_v4().to_string())
    }

    /// Use an externally supplied session id (e.g. from the launching shell)
    pub fn from_id(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            started_at: Utc::now(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_is_unique() {
        let a = SessionContext::capture();
        let b = SessionContext::capture();
        assert_ne!(a.session_id(), b.session_id());
        assert!(Uuid::parse_str(a.session_id()).is_ok());
    }

    #[test]
    fn test_from_id() {
        let session = SessionContext::from_id("fixed");
        assert_eq!(session.session_id(), "fixed");
        assert!(session.started_at() <= Utc::now());
    }
}
