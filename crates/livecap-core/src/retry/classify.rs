//! Classify fetch errors for logging and run statistics.

use super::error::FetchError;
use std::fmt;

/// Coarse failure category. Never changes the retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    Connection,
    Http(u32),
    Storage,
    Other,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Timeout => f.write_str("timeout"),
            FailureKind::Connection => f.write_str("connection"),
            FailureKind::Http(code) => write!(f, "http {}", code),
            FailureKind::Storage => f.write_str("storage"),
            FailureKind::Other => f.write_str("other"),
        }
    }
}

/// Classify a curl error.
pub fn classify_curl_error(e: &curl::Error) -> FailureKind {
    if e.is_operation_timedout() {
        return FailureKind::Timeout;
    }
    if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
    {
        return FailureKind::Connection;
    }
    FailureKind::Other
}

pub fn classify(e: &FetchError) -> FailureKind {
    match e {
        FetchError::Curl(ce) => classify_curl_error(ce),
        FetchError::Http(code) => FailureKind::Http(*code),
        FetchError::Timeout(_) => FailureKind::Timeout,
        FetchError::Storage(_) => FailureKind::Storage,
        FetchError::Task(_) => FailureKind::Other,
    }
}
