use crate::error::Error;

/// Failure categories the retry engine differentiates on. Driver errors
/// arrive as free-form messages, so classification falls back to message
/// matching for those.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Network,
    Timeout,
    RateLimit,
    ServerError,
    ElementNotFound,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Network => "network",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::RateLimit => "rate-limit",
            ErrorCategory::ServerError => "server-error",
            ErrorCategory::ElementNotFound => "element-not-found",
            ErrorCategory::Unknown => "unknown",
        }
    }

    /// Extra backoff applied on top of the exponential schedule. Rate
    /// limits back off hardest; a missing element is usually a render-timing
    /// blip and retries almost immediately.
    pub fn delay_multiplier(&self) -> f64 {
        match self {
            ErrorCategory::RateLimit => 3.0,
            ErrorCategory::ServerError => 2.0,
            ErrorCategory::Network => 1.5,
            ErrorCategory::Timeout => 1.25,
            ErrorCategory::Unknown => 1.0,
            ErrorCategory::ElementNotFound => 0.5,
        }
    }

    /// Whether failures of this category feed the circuit breaker. Element
    /// lookups fail for page-local reasons and say nothing about upstream
    /// health.
    pub fn counts_toward_breaker(&self) -> bool {
        matches!(self, ErrorCategory::Network | ErrorCategory::Timeout | ErrorCategory::RateLimit | ErrorCategory::ServerError)
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// `None` means the error is terminal and must never be retried.
pub fn classify(error: &Error) -> Option<ErrorCategory> {
    match error {
        Error::Network(_) => Some(ErrorCategory::Network),
        Error::Timeout(_) => Some(ErrorCategory::Timeout),
        Error::RateLimited(_) => Some(ErrorCategory::RateLimit),
        Error::ServerError(_) => Some(ErrorCategory::ServerError),
        Error::ElementNotFound { .. } => Some(ErrorCategory::ElementNotFound),
        Error::Driver(message) => Some(classify_message(message)),
        Error::IoError(io) => Some(classify_message(&io.to_string())),
        Error::CircuitOpen
        | Error::Cancelled
        | Error::InvalidConfig(_)
        | Error::InvalidTimeFormat(_)
        | Error::NoEligiblePair(_)
        | Error::ValidationError(_)
        | Error::DeserializationError(_) => None,
    }
}

/// Message/code matching for failures that surface as plain text from the
/// browser binding.
pub fn classify_message(message: &str) -> ErrorCategory {
    let lower = message.to_lowercase();

    if ["429", "rate limit", "too many requests"].iter().any(|needle| lower.contains(needle)) {
        return ErrorCategory::RateLimit;
    }
    if ["500", "502", "503", "504", "server error", "bad gateway", "service unavailable"].iter().any(|needle| lower.contains(needle)) {
        return ErrorCategory::ServerError;
    }
    if ["timeout", "timed out"].iter().any(|needle| lower.contains(needle)) {
        return ErrorCategory::Timeout;
    }
    if ["net::err", "connection", "dns", "socket", "network", "refused", "reset"].iter().any(|needle| lower.contains(needle)) {
        return ErrorCategory::Network;
    }
    if ["no element", "not found", "no node", "detached", "not attached", "selector"].iter().any(|needle| lower.contains(needle)) {
        return ErrorCategory::ElementNotFound;
    }

    ErrorCategory::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_errors_map_directly() {
        assert_eq!(classify(&Error::Network("x".into())), Some(ErrorCategory::Network));
        assert_eq!(classify(&Error::RateLimited("x".into())), Some(ErrorCategory::RateLimit));
        assert_eq!(classify(&Error::element_not_found("slot", "gone")), Some(ErrorCategory::ElementNotFound));
        assert_eq!(classify(&Error::Cancelled), None);
        assert_eq!(classify(&Error::CircuitOpen), None);
    }

    #[test]
    fn test_driver_messages_are_matched() {
        assert_eq!(classify_message("net::ERR_CONNECTION_RESET"), ErrorCategory::Network);
        assert_eq!(classify_message("Navigation timed out after 30000ms"), ErrorCategory::Timeout);
        assert_eq!(classify_message("HTTP 429 Too Many Requests"), ErrorCategory::RateLimit);
        assert_eq!(classify_message("upstream returned 503"), ErrorCategory::ServerError);
        assert_eq!(classify_message("waiting for selector `td` failed"), ErrorCategory::ElementNotFound);
        assert_eq!(classify_message("something exotic"), ErrorCategory::Unknown);
    }

    #[test]
    fn test_rate_limit_backs_off_hardest_and_element_lookup_softest() {
        assert!(ErrorCategory::RateLimit.delay_multiplier() > ErrorCategory::ServerError.delay_multiplier());
        assert!(ErrorCategory::ElementNotFound.delay_multiplier() < ErrorCategory::Unknown.delay_multiplier());
        assert!(!ErrorCategory::ElementNotFound.counts_toward_breaker());
        assert!(ErrorCategory::Network.counts_toward_breaker());
    }
}
