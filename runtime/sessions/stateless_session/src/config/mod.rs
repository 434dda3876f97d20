//! Configure how sessions are sealed and where tokens are emitted.
//!
//! [`SessionConfig`] is the key type in this module.
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

mod cookie;
mod loader;

pub use cookie::{DEFAULT_COOKIE_NAME, FALLBACK_COOKIE_MAX_AGE, SessionCookieConfig};
pub use loader::{ConfigLoader, ConfigProfile, Profile, errors};

/// The minimum length of the sealing secret, in bytes.
pub const MIN_SECRET_LENGTH: usize = 32;

#[derive(Debug, Default, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
/// Configure how sessions are sealed and emitted.
///
/// # Example
///
/// ```yaml
/// secret: "a-very-long-secret-that-is-at-least-32-bytes"
/// expires_in: 2h
/// cookie:
///   name: my-session
///   same_site: lax
/// ```
pub struct SessionConfig {
    /// The secret used to derive encryption keys.
    ///
    /// It's required, and it must be at least [`MIN_SECRET_LENGTH`] bytes long.
    /// Every instance of your application must use the same secret, otherwise
    /// tokens issued by one instance will be rejected by the others.
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub secret: Option<SecretString>,
    /// How long a token stays valid after it's been issued.
    ///
    /// Zero, the default, means that tokens never expire.
    #[serde(default, with = "humantime_serde")]
    pub expires_in: Duration,
    /// Emit the session token in the response header with this name,
    /// rather than in a cookie.
    ///
    /// When set, no `Set-Cookie` header is emitted for the session.
    #[serde(default)]
    pub custom_header: Option<String>,
    /// Configure the session cookie.
    #[serde(default)]
    pub cookie: SessionCookieConfig,
}

impl SessionConfig {
    /// Start from the default configuration, using `secret` to seal tokens.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: Some(SecretString::from(secret.into())),
            ..Default::default()
        }
    }

    /// Check the configuration, returning the sealing secret if it's usable.
    pub(crate) fn validate(&self) -> Result<SecretString, ConfigurationError> {
        let secret = self
            .secret
            .as_ref()
            .ok_or(ConfigurationError::MissingSecret)?;
        let actual = secret.expose_secret().len();
        if actual < MIN_SECRET_LENGTH {
            return Err(ConfigurationError::SecretTooShort {
                min: MIN_SECRET_LENGTH,
                actual,
            });
        }
        if self.cookie.max_age.is_some_and(|max_age| max_age.is_zero()) {
            return Err(ConfigurationError::ZeroCookieMaxAge);
        }
        Ok(SecretString::from(secret.expose_secret().to_owned()))
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
/// The error returned by [`StatelessSession::new`] when the configuration is unusable.
///
/// [`StatelessSession::new`]: crate::StatelessSession::new
pub enum ConfigurationError {
    #[error("No secret was provided: it is required to seal session tokens")]
    MissingSecret,
    #[error("The session secret is too short: it must be at least {min} bytes long, it is {actual} bytes long")]
    SecretTooShort { min: usize, actual: usize },
    #[error("`{name}` is not a valid header name")]
    InvalidCustomHeader {
        name: String,
        #[source]
        source: http::header::InvalidHeaderName,
    },
    #[error("`{name}` is not a valid cookie name")]
    InvalidCookieName { name: String },
    #[error("The `Max-Age` of the session cookie can't be zero: the browser would discard it immediately")]
    ZeroCookieMaxAge,
}
