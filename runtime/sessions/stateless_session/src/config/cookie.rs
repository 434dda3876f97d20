use std::time::Duration;

use biscotti::SameSite;

/// The name of the session cookie, if you don't customize it.
pub const DEFAULT_COOKIE_NAME: &str = "sk-stateless-session";

/// The cookie lifetime when session tokens never expire: 7 days.
pub const FALLBACK_COOKIE_MAX_AGE: Duration = Duration::from_secs(60 * 60 * 24 * 7);

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
/// Configure the cookie used to carry the session token.
///
/// It is ignored if [`SessionConfig::custom_header`] is set.
///
/// [`SessionConfig::custom_header`]: crate::SessionConfig::custom_header
pub struct SessionCookieConfig {
    /// The name of the cookie used to store the session token.
    ///
    /// By default, the name is set to `sk-stateless-session`.
    #[serde(default = "default_session_cookie_name")]
    pub name: String,
    /// Set the `Max-Age` attribute on the cookie.
    ///
    /// If unset, it matches [`SessionConfig::expires_in`]. If tokens never expire,
    /// it falls back to [`FALLBACK_COOKIE_MAX_AGE`]: an expiring token and an
    /// evicted cookie are two different things, and a cookie without `Max-Age`
    /// would be discarded as soon as the browser session ends.
    ///
    /// It can't be zero.
    ///
    /// [`SessionConfig::expires_in`]: crate::SessionConfig::expires_in
    #[serde(default, with = "humantime_serde")]
    pub max_age: Option<Duration>,
    /// Set the `Path` attribute on the cookie.
    ///
    /// By default, the attribute is set to `/`.
    #[serde(default = "default_session_cookie_path")]
    pub path: Option<String>,
    /// Set the `Domain` attribute on the cookie.
    ///
    /// By default, the attribute is not set.
    #[serde(default)]
    pub domain: Option<String>,
    /// Set the `Secure` attribute on the cookie.
    ///
    /// If the cookie is marked as `Secure`, it will only be transmitted when the connection is secure (e.g. over HTTPS).
    ///
    /// If unset, it's `true` in release builds and `false` in debug builds,
    /// to allow local development over plain HTTP.
    #[serde(default)]
    pub secure: Option<bool>,
    /// Set the `HttpOnly` attribute on the cookie.
    ///
    /// If the cookie is marked as `HttpOnly`, it will not be visible to JavaScript
    /// snippets running in the browser.
    ///
    /// Default is `true`.
    #[serde(default = "default_session_cookie_http_only")]
    pub http_only: bool,
    /// Set the [`SameSite`] attribute on the cookie.
    ///
    /// By default, the attribute is not set.
    #[serde(default, with = "same_site")]
    pub same_site: Option<SameSite>,
}

impl Default for SessionCookieConfig {
    fn default() -> Self {
        Self {
            name: default_session_cookie_name(),
            max_age: None,
            path: default_session_cookie_path(),
            domain: None,
            secure: None,
            http_only: default_session_cookie_http_only(),
            same_site: None,
        }
    }
}

impl SessionCookieConfig {
    /// The `Max-Age` of the session cookie, given the token time-to-live.
    ///
    /// Sub-second durations are rounded up, so a non-zero duration never
    /// turns into a `Max-Age=0` attribute.
    pub fn effective_max_age(&self, expires_in: Duration) -> Duration {
        let max_age = match self.max_age {
            Some(max_age) => max_age,
            None if expires_in.is_zero() => FALLBACK_COOKIE_MAX_AGE,
            None => expires_in,
        };
        let whole_secs = max_age
            .as_secs()
            .saturating_add(u64::from(max_age.subsec_nanos() > 0));
        Duration::from_secs(whole_secs)
    }

    /// Whether the session cookie should carry the `Secure` attribute.
    pub fn effective_secure(&self) -> bool {
        self.secure.unwrap_or(cfg!(not(debug_assertions)))
    }
}

fn default_session_cookie_name() -> String {
    DEFAULT_COOKIE_NAME.to_string()
}

fn default_session_cookie_http_only() -> bool {
    true
}

fn default_session_cookie_path() -> Option<String> {
    Some("/".to_string())
}

// Deserialization and serialization routines for `same_site` attribute.
mod same_site {
    use biscotti::SameSite;
    use serde::{Deserializer, Serializer, de};
    use std::fmt;

    pub fn serialize<S>(value: &Option<SameSite>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(same_site) => {
                let same_site = match same_site {
                    SameSite::Strict => "Strict",
                    SameSite::Lax => "Lax",
                    SameSite::None => "None",
                };
                serializer.serialize_some(same_site)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<SameSite>, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct SameSiteVisitor;

        impl<'de> de::Visitor<'de> for SameSiteVisitor {
            type Value = Option<SameSite>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a string or null")
            }

            fn visit_str<E>(self, value: &str) -> Result<Option<SameSite>, E>
            where
                E: de::Error,
            {
                match value {
                    "Strict" | "strict" => Ok(Some(SameSite::Strict)),
                    "Lax" | "lax" => Ok(Some(SameSite::Lax)),
                    "None" | "none" => Ok(Some(SameSite::None)),
                    _ => Err(de::Error::unknown_variant(
                        value,
                        &["Strict", "Lax", "None"],
                    )),
                }
            }

            fn visit_some<D>(self, deserializer: D) -> Result<Option<SameSite>, D::Error>
            where
                D: Deserializer<'de>,
            {
                deserializer.deserialize_str(self)
            }

            fn visit_none<E>(self) -> Result<Option<SameSite>, E>
            where
                E: de::Error,
            {
                Ok(None)
            }

            fn visit_unit<E>(self) -> Result<Option<SameSite>, E>
            where
                E: de::Error,
            {
                Ok(None)
            }
        }

        deserializer.deserialize_option(SameSiteVisitor)
    }
}
