//! Generator failure classification.
//!
//! | Kind              | Retryable | Typical source                  |
//! |-------------------|-----------|---------------------------------|
//! | `invalid_input`   | no        | request rejected by generator   |
//! | `safety_rejected` | no        | output failed safety filtering  |
//! | `authentication`  | no        | missing or revoked credentials  |
//! | `quota_exhausted` | no        | billing limit reached           |
//! | `rate_limited`    | yes       | HTTP 429                        |
//! | `overloaded`      | yes       | HTTP 503 / 529                  |
//! | `server_error`    | yes       | HTTP 500                        |
//! | `timeout`         | yes       | HTTP 408 / 504, client timeout  |
//! | `network`         | yes       | connection reset, DNS failure   |
//! | `unknown`         | no        | anything unclassified           |

use crate::types::ConsultationResult;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenerationErrorKind {
    InvalidInput,
    SafetyRejected,
    Authentication,
    QuotaExhausted,
    RateLimited,
    Overloaded,
    ServerError,
    Timeout,
    Network,
    Unknown,
}

impl GenerationErrorKind {
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::SafetyRejected => "safety_rejected",
            Self::Authentication => "authentication",
            Self::QuotaExhausted => "quota_exhausted",
            Self::RateLimited => "rate_limited",
            Self::Overloaded => "overloaded",
            Self::ServerError => "server_error",
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::Unknown => "unknown",
        }
    }

    /// Transient failures the caller may retry; everything else is terminal.
    #[inline]
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::Overloaded | Self::ServerError | Self::Timeout | Self::Network
        )
    }

    pub fn from_name(name: &str) -> Self {
        match name {
            "invalid_input" | "invalid_request" => Self::InvalidInput,
            "safety_rejected" | "content_filtered" => Self::SafetyRejected,
            "authentication" | "invalid_api_key" => Self::Authentication,
            "quota_exhausted" | "insufficient_quota" => Self::QuotaExhausted,
            "rate_limited" | "rate_limit_exceeded" => Self::RateLimited,
            "overloaded" | "overloaded_error" => Self::Overloaded,
            "server_error" => Self::ServerError,
            "timeout" => Self::Timeout,
            "network" => Self::Network,
            _ => Self::Unknown,
        }
    }

    pub fn from_http_status(status: u16) -> Self {
        match status {
            400 | 422 => Self::InvalidInput,
            401 | 403 => Self::Authentication,
            402 => Self::QuotaExhausted,
            408 | 504 => Self::Timeout,
            429 => Self::RateLimited,
            500 => Self::ServerError,
            503 | 529 => Self::Overloaded,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for GenerationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Failure reported by a [`ConsultationGenerator`](super::ConsultationGenerator).
///
/// Cloneable so one failure can be handed to every deduplicated waiter.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationError {
    pub kind: GenerationErrorKind,
    pub message: String,
    pub retry_after_ms: Option<u64>,
    /// Degraded content the generator produced before giving up, if any.
    pub fallback: Option<Box<ConsultationResult>>,
}

impl GenerationError {
    pub fn new(kind: GenerationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after_ms: None,
            fallback: None,
        }
    }

    pub fn with_retry_after_ms(mut self, ms: u64) -> Self {
        self.retry_after_ms = Some(ms);
        self
    }

    pub fn with_fallback(mut self, result: ConsultationResult) -> Self {
        self.fallback = Some(Box::new(result));
        self
    }

    pub fn retryable(&self) -> bool {
        self.kind.retryable()
    }
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for GenerationError {}

impl From<GenerationError> for crate::Error {
    fn from(e: GenerationError) -> Self {
        crate::Error::Generation {
            retryable: e.kind.retryable(),
            kind: e.kind,
            message: e.message,
            retry_after_ms: e.retry_after_ms,
        }
    }
}
