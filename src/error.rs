use thiserror::Error;

/// Failures surfaced by the metadata gateway.
///
/// Controllers catch every variant and turn it into a display message via
/// [`FetchError::user_message`]; nothing here is retried automatically.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
  /// Transport failure: DNS, connect, TLS, timeout, body read.
  #[error("network error: {0}")]
  Network(String),

  /// Upstream answered HTTP 429.
  #[error("rate limited by the metadata service")]
  RateLimited,

  /// Non-success status other than 429, or a payload without a `results` array.
  #[error("invalid response: {0}")]
  InvalidResponse(String),

  /// Rejected locally before any network call.
  #[error("invalid request: {0}")]
  InvalidRequest(String),

  /// Missing API key or unusable client configuration.
  #[error("configuration error: {0}")]
  Configuration(String),
}

impl FetchError {
  pub fn user_message(&self) -> String {
    match self {
      FetchError::Network(_) => "Network error. Check your connection and press r to try again.".to_string(),
      FetchError::RateLimited => "Too many requests. Try again later.".to_string(),
      FetchError::InvalidResponse(detail) => format!("Unexpected response from server ({}).", detail),
      FetchError::InvalidRequest(detail) => format!("Invalid request: {}", detail),
      FetchError::Configuration(detail) => format!("Configuration error: {}", detail),
    }
  }
}

impl From<reqwest::Error> for FetchError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_decode() {
      FetchError::InvalidResponse(e.to_string())
    } else {
      FetchError::Network(e.to_string())
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rate_limit_message_mentions_later() {
    assert!(FetchError::RateLimited.user_message().contains("Try again later"));
  }

  #[test]
  fn invalid_response_message_carries_detail() {
    let msg = FetchError::InvalidResponse("HTTP 500".to_string()).user_message();
    assert!(msg.contains("HTTP 500"));
  }
}
