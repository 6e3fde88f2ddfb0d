//! Error taxonomy for the bank API clients.

use reqwest::StatusCode;

/// Errors raised while talking to Monobank or Wise.
#[derive(Debug, thiserror::Error)]
pub(crate) enum BankError {
    /// A required API token is not configured.
    #[error("{0} not found in environment")]
    MissingToken(&'static str),
    /// The configured token cannot be sent as an HTTP header.
    #[error("{0} contains characters not allowed in an HTTP header")]
    InvalidToken(&'static str),
    /// Transport-level failure (connect, timeout, body decode).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The API answered with HTTP 429.
    #[error("rate limit exceeded (429 Too Many Requests)")]
    RateLimited,
    /// The API answered with a non-success status other than 429.
    #[error("API returned {status}: {body}")]
    Status {
        /// Response status code.
        status: StatusCode,
        /// Response body, as text.
        body: String,
    },
    /// The Wise token has no profiles attached.
    #[error("no Wise profiles found for this account")]
    NoProfiles,
    /// The API returned a payload we could not interpret.
    #[error("unexpected response: {0}")]
    InvalidResponse(String),
}

impl BankError {
    /// Returns `true` when the error signals an upstream rate limit.
    pub(crate) const fn is_rate_limited(&self) -> bool {
        matches!(*self, Self::RateLimited)
    }

    /// Returns `true` when the API rejected the request as malformed (HTTP 400).
    pub(crate) fn is_bad_request(&self) -> bool {
        matches!(*self, Self::Status { status, .. } if status == StatusCode::BAD_REQUEST)
    }
}

/// Turns a non-success response into a [`BankError`], passing successes through.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, BankError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(BankError::RateLimited);
    }
    let body = response.text().await.unwrap_or_default();
    Err(BankError::Status { status, body })
}

#[cfg(test)]
#[allow(clippy::missing_docs_in_private_items, reason = "test code")]
mod tests {
    use super::BankError;
    use reqwest::StatusCode;

    #[test]
    fn rate_limit_is_detected() {
        assert!(BankError::RateLimited.is_rate_limited());
        assert!(!BankError::NoProfiles.is_rate_limited());
    }

    #[test]
    fn bad_request_is_detected() {
        let err = BankError::Status {
            status: StatusCode::BAD_REQUEST,
            body: "Period must be no more than 31 days".to_owned(),
        };
        assert!(err.is_bad_request());
        assert!(!err.is_rate_limited());
    }

    #[test]
    fn missing_token_message_names_variable() {
        let err = BankError::MissingToken("MONOBANK_API_TOKEN");
        assert_eq!(err.to_string(), "MONOBANK_API_TOKEN not found in environment");
    }
}
