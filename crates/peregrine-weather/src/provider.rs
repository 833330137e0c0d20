//! Forecast provider abstraction.

use async_trait::async_trait;

/// Result type alias for forecast operations.
pub type WeatherResult<T> = Result<T, WeatherError>;

/// A single forecast lookup request.
///
/// Dates arrive as `YYYY-MM-DD` strings straight from the tool directive;
/// the provider parses them and degrades to a current-conditions-only
/// report when they are malformed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForecastQuery {
    /// Free-form location, e.g. `"Barcelona, Spain"`.
    pub location: String,
    /// Trip start, `YYYY-MM-DD`.
    pub start_date: String,
    /// Trip end, `YYYY-MM-DD`.
    pub end_date: String,
}

/// Errors from a forecast backend.
#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    /// HTTP transport or body deserialization failed.
    #[error("weather request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Geocoding returned no match for the requested location.
    #[error("location '{location}' not found")]
    LocationNotFound {
        /// The location string as requested.
        location: String,
    },

    /// Backend returned a non-success status.
    #[error("weather API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error description from the backend.
        message: String,
    },
}

impl WeatherError {
    /// Short user-safe description; never exposes raw error text.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::LocationNotFound { location } => format!(
                "Could not find weather data for '{location}'. Please check the location name."
            ),
            Self::Http(_) | Self::Api { .. } => {
                "Unable to retrieve weather information at this time.".to_owned()
            }
        }
    }
}

/// Forecast backend used by the tool orchestrator.
///
/// Returns pre-formatted report text suitable for injection into a model
/// prompt; implementors must not leak raw provider payloads.
#[async_trait]
pub trait ForecastProvider: Send + Sync {
    /// Resolve one lookup into a natural-language weather report.
    async fn forecast(&self, query: &ForecastQuery) -> WeatherResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_hides_transport_detail() {
        let err = WeatherError::Api {
            status: 500,
            message: "internal stack trace".into(),
        };
        let msg = err.user_message();
        assert!(!msg.contains("stack trace"));
        assert!(msg.contains("Unable to retrieve"));
    }

    #[test]
    fn user_message_names_missing_location() {
        let err = WeatherError::LocationNotFound {
            location: "Atlantis".into(),
        };
        assert!(err.user_message().contains("'Atlantis'"));
    }

    #[test]
    fn provider_trait_is_object_safe() {
        fn assert_object_safe(_: &dyn ForecastProvider) {}
        let _ = assert_object_safe;
    }
}
