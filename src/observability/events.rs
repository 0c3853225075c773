//! Observable events for myrest
//!
//! Every lifecycle log line carries one of these names in its `event`
//! field so logs can be filtered without matching on message text.

use std::fmt;

/// Observable events in myrest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Boot & Lifecycle
    /// Startup begins
    BootStart,
    /// Configuration loaded
    ConfigLoaded,
    /// Server serving (ready for requests)
    Serving,
    /// Shutdown initiated
    ShutdownStart,
    /// Shutdown complete
    ShutdownComplete,

    // Permissions
    /// Permissions file read
    PermissionsLoaded,
    /// Permissions file absent, running without rules
    PermissionsMissing,

    // Engine lifecycle
    /// Schema introspection attempt started
    IntrospectionStart,
    /// Introspection attempt failed, retry scheduled
    IntrospectionRetry,
    /// Retry budget exhausted (FATAL)
    IntrospectionFailed,
    /// Compiler engine built and cached
    EngineReady,
    /// Cached engine discarded
    EngineReset,

    // Requests
    /// Request failed and was translated to an error response
    RequestFailed,
    /// Transaction rolled back
    TransactionRolledBack,
    /// Rollback itself failed
    RollbackFailed,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            // Boot & Lifecycle
            Event::BootStart => "MYREST_STARTUP_BEGIN",
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::Serving => "MYREST_SERVING",
            Event::ShutdownStart => "SHUTDOWN_START",
            Event::ShutdownComplete => "SHUTDOWN_COMPLETE",

            // Permissions
            Event::PermissionsLoaded => "PERMISSIONS_LOADED",
            Event::PermissionsMissing => "PERMISSIONS_MISSING",

            // Engine
            Event::IntrospectionStart => "INTROSPECTION_BEGIN",
            Event::IntrospectionRetry => "INTROSPECTION_RETRY",
            Event::IntrospectionFailed => "INTROSPECTION_FAILED",
            Event::EngineReady => "ENGINE_READY",
            Event::EngineReset => "ENGINE_RESET",

            // Requests
            Event::RequestFailed => "REQUEST_FAILED",
            Event::TransactionRolledBack => "TRANSACTION_ROLLED_BACK",
            Event::RollbackFailed => "ROLLBACK_FAILED",
        }
    }

    /// Returns true if this event indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::IntrospectionFailed)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
