use std::fmt;

/// The identity under which a process addresses the gateway.
///
/// Intent topics embed the caller id (`.../I/{callerID}`), so the
/// gateway can attribute every intent to its origin. The id is fixed
/// at startup and injected into every topic factory that needs it.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CallerId(String);

impl CallerId {
    /// A fresh random identity (UUID v4), the default for a new process.
    pub fn random() -> CallerId {
        CallerId(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> CallerId {
        CallerId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
