use biscotti::{Processor, ProcessorConfig, RequestCookies};
use http::header::{AUTHORIZATION, COOKIE};
use http::{HeaderMap, HeaderName};
use tracing_log_error::log_error;

use crate::config::DEFAULT_COOKIE_NAME;

/// Locate the session token in an incoming request.
///
/// Implementations must be infallible: if the token can't be found, or if it can't be
/// read, they must return `None`.
///
/// It is implemented for any `Fn(&HeaderMap) -> Option<String>`, so you can use a
/// closure for one-off strategies:
///
/// ```rust
/// use http::HeaderMap;
/// use stateless_session::SessionIdExtractor;
///
/// fn from_query_header(headers: &HeaderMap) -> Option<String> {
///     headers.get("x-session-token")?.to_str().ok().map(ToOwned::to_owned)
/// }
///
/// fn assert_extractor<E: SessionIdExtractor>(_e: E) {}
/// assert_extractor(from_query_header);
/// ```
pub trait SessionIdExtractor: Send + Sync {
    /// Extract the session token from the headers of the incoming request.
    fn extract(&self, headers: &HeaderMap) -> Option<String>;
}

impl<F> SessionIdExtractor for F
where
    F: Fn(&HeaderMap) -> Option<String> + Send + Sync,
{
    fn extract(&self, headers: &HeaderMap) -> Option<String> {
        self(headers)
    }
}

/// Read the session token from a request cookie.
///
/// All `Cookie` headers are inspected, the first cookie with a matching name wins.
/// Headers that can't be parsed are skipped.
pub struct CookieSessionId {
    name: String,
    processor: Processor,
}

impl std::fmt::Debug for CookieSessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieSessionId")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Default for CookieSessionId {
    fn default() -> Self {
        Self::new(DEFAULT_COOKIE_NAME)
    }
}

impl CookieSessionId {
    /// Look for the session token in the cookie named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            processor: ProcessorConfig::default().into(),
        }
    }

    /// The name of the cookie holding the session token.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl SessionIdExtractor for CookieSessionId {
    fn extract(&self, headers: &HeaderMap) -> Option<String> {
        for header in headers.get_all(COOKIE) {
            let Ok(header) = header.to_str() else {
                tracing::debug!("A `Cookie` header contains non-ASCII characters, ignoring it");
                continue;
            };
            match RequestCookies::parse_headers(std::iter::once(header), &self.processor) {
                Ok(cookies) => {
                    if let Some(cookie) = cookies.get(&self.name) {
                        return Some(cookie.value().to_owned());
                    }
                }
                Err(e) => {
                    log_error!(
                        e,
                        level: tracing::Level::WARN,
                        "A `Cookie` header is invalid, ignoring it"
                    );
                }
            }
        }
        None
    }
}

/// Look for the session token in the cookie named `name`.
///
/// Use [`DEFAULT_COOKIE_NAME`] if you haven't customized
/// the name of the session cookie.
pub fn session_id_from_cookie(name: impl Into<String>) -> CookieSessionId {
    CookieSessionId::new(name)
}

/// Read the session token from a request header.
///
/// Pair it with [`SessionConfig::custom_header`] to carry the session token
/// in headers rather than cookies.
///
/// [`SessionConfig::custom_header`]: crate::SessionConfig::custom_header
#[derive(Debug, Clone)]
pub struct HeaderSessionId {
    name: HeaderName,
    scheme: Option<String>,
}

impl HeaderSessionId {
    /// Use the raw value of the `name` header as session token.
    pub fn new(name: HeaderName) -> Self {
        Self { name, scheme: None }
    }

    /// Read the session token from the `Authorization` header,
    /// using the `Bearer` authentication scheme.
    pub fn bearer() -> Self {
        Self {
            name: AUTHORIZATION,
            scheme: Some("Bearer".into()),
        }
    }
}

impl SessionIdExtractor for HeaderSessionId {
    fn extract(&self, headers: &HeaderMap) -> Option<String> {
        let value = headers.get(&self.name)?.to_str().ok()?.trim();
        let token = match &self.scheme {
            None => value,
            Some(scheme) => {
                let (actual, token) = value.split_once(' ')?;
                if !actual.eq_ignore_ascii_case(scheme) {
                    tracing::trace!(
                        header = %self.name,
                        "Unexpected authentication scheme, ignoring the header"
                    );
                    return None;
                }
                token.trim_start()
            }
        };
        (!token.is_empty()).then(|| token.to_owned())
    }
}
