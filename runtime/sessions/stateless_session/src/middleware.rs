use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use biscotti::{Processor, ProcessorConfig, ResponseCookie, ResponseCookies, SameSite};
use http::header::SET_COOKIE;
use http::{HeaderMap, HeaderName, HeaderValue};
use tracing_log_error::log_error;

use crate::config::{ConfigurationError, SessionConfig};
use crate::seal::SessionCodec;
use crate::{Session, SessionIdExtractor};
use errors::FinalizeError;

/// Load sessions out of incoming requests, and seal them back into
/// outgoing responses if they were modified.
///
/// It is immutable once built and cheap to clone: build it once, when your
/// application starts, and share it across requests.
///
/// # Lifecycle
///
/// [`StatelessSession::handle`] drives the whole lifecycle of a request:
///
/// 1. The session token is extracted from the request, using the configured [`SessionIdExtractor`].
/// 2. The token is unsealed. If there is no token, or the token can't be unsealed,
///    the request starts with an empty session.
/// 3. The [`Session`] is attached to the request extensions, and your handler is invoked.
/// 4. If the handler modified the session, the session is sealed into a new token,
///    attached to the response either as a cookie or as a custom header.
///
/// Use [`StatelessSession::load`] and [`finalize_session`] if you need to plug the
/// two halves into different stages of your request pipeline.
#[derive(Clone)]
pub struct StatelessSession(Arc<Inner>);

struct Inner {
    codec: SessionCodec,
    extractor: Box<dyn SessionIdExtractor>,
    emitter: Emitter,
}

enum Emitter {
    Cookie(CookieEmitter),
    Header(HeaderName),
}

struct CookieEmitter {
    name: String,
    max_age: Duration,
    path: Option<String>,
    domain: Option<String>,
    secure: bool,
    http_only: bool,
    same_site: Option<SameSite>,
    processor: Processor,
}

impl std::fmt::Debug for StatelessSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let channel = match &self.0.emitter {
            Emitter::Cookie(cookie) => format!("cookie `{}`", cookie.name),
            Emitter::Header(name) => format!("header `{name}`"),
        };
        f.debug_struct("StatelessSession")
            .field("codec", &self.0.codec)
            .field("channel", &channel)
            .finish_non_exhaustive()
    }
}

impl StatelessSession {
    /// Validate the configuration and build the session middleware.
    ///
    /// `extractor` determines where the session token is looked up in incoming requests.
    /// Use [`CookieSessionId`](crate::CookieSessionId) to read it from the
    /// session cookie.
    ///
    /// # Errors
    ///
    /// It fails if the secret is missing or too short, or if the chosen emission
    /// channel can't be represented in an HTTP response.
    pub fn new<E>(config: SessionConfig, extractor: E) -> Result<Self, ConfigurationError>
    where
        E: SessionIdExtractor + 'static,
    {
        let secret = config.validate()?;
        let emitter = match config.custom_header {
            Some(name) => match HeaderName::from_bytes(name.as_bytes()) {
                Ok(header) => Emitter::Header(header),
                Err(source) => return Err(ConfigurationError::InvalidCustomHeader { name, source }),
            },
            None => {
                let cookie = config.cookie;
                if !is_valid_cookie_name(&cookie.name) {
                    return Err(ConfigurationError::InvalidCookieName { name: cookie.name });
                }
                Emitter::Cookie(CookieEmitter {
                    max_age: cookie.effective_max_age(config.expires_in),
                    secure: cookie.effective_secure(),
                    name: cookie.name,
                    path: cookie.path,
                    domain: cookie.domain,
                    http_only: cookie.http_only,
                    same_site: cookie.same_site,
                    processor: ProcessorConfig::default().into(),
                })
            }
        };
        Ok(Self(Arc::new(Inner {
            codec: SessionCodec::new(secret, config.expires_in),
            extractor: Box::new(extractor),
            emitter,
        })))
    }

    /// The codec used to seal and unseal session tokens.
    pub fn codec(&self) -> &SessionCodec {
        &self.0.codec
    }

    /// Load the session for an incoming request.
    ///
    /// It never fails: a missing, malformed, tampered or expired token
    /// results in an empty session.
    pub fn load(&self, headers: &HeaderMap) -> Session {
        let token = self
            .0
            .extractor
            .extract(headers)
            .filter(|token| !token.is_empty());
        let Some(token) = token else {
            tracing::trace!("There is no session token in the incoming request");
            return Session::default();
        };
        match self.0.codec.unseal(&token) {
            Ok(data) => Session::new(data),
            Err(e) => {
                log_error!(
                    e,
                    level: tracing::Level::WARN,
                    "Failed to unseal the incoming session token, falling back to an empty session"
                );
                Session::default()
            }
        }
    }

    /// Seal the session into a new token, if it was modified, and attach it to `response`.
    ///
    /// It returns the emitted token, or `None` if the session was left untouched.
    pub fn finalize<B>(
        &self,
        session: &Session,
        response: &mut http::Response<B>,
    ) -> Result<Option<String>, FinalizeError> {
        if !session.is_dirty() {
            tracing::trace!("The session was not modified, there is no need to re-seal it");
            return Ok(None);
        }
        let token = session.read(|data| self.0.codec.seal(data))?;
        match &self.0.emitter {
            Emitter::Header(name) => {
                let value = HeaderValue::from_str(&token)?;
                response.headers_mut().insert(name.clone(), value);
                tracing::debug!(session.channel = %name, "Re-sealed the session");
            }
            Emitter::Cookie(emitter) => {
                let mut cookies = ResponseCookies::new();
                cookies.insert(emitter.cookie(token.clone()));
                for value in cookies.header_values(&emitter.processor) {
                    let value = HeaderValue::from_str(&value)?;
                    response.headers_mut().append(SET_COOKIE, value);
                }
                tracing::debug!(session.channel = "cookie", "Re-sealed the session");
            }
        }
        Ok(Some(token))
    }

    /// Run `next` with the session of the incoming request attached to its extensions.
    ///
    /// The session can be retrieved in the handler via [`SessionExt::session`].
    /// If `next` succeeds, the session is finalized.
    /// If `next` fails, its error is returned as is and the session is not re-sealed.
    ///
    /// ```rust
    /// use http::{Request, Response};
    /// use stateless_session::{CookieSessionId, SessionConfig, SessionExt, StatelessSession};
    /// use stateless_session::errors::FinalizeError;
    ///
    /// async fn handler(request: Request<()>) -> Result<Response<()>, FinalizeError> {
    ///     let session = request.session().expect("The session middleware is installed");
    ///     session.insert_raw("visited", true.into());
    ///     Ok(Response::new(()))
    /// }
    ///
    /// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = SessionConfig::new("a-very-long-secret-that-is-at-least-32-bytes");
    /// let sessions = StatelessSession::new(config, CookieSessionId::default())?;
    /// let response = sessions.handle(Request::new(()), handler).await?;
    /// assert!(response.headers().contains_key("set-cookie"));
    /// # Ok(())
    /// # }
    /// ```
    pub async fn handle<B, R, E, F, Fut>(
        &self,
        mut request: http::Request<B>,
        next: F,
    ) -> Result<http::Response<R>, E>
    where
        F: FnOnce(http::Request<B>) -> Fut,
        Fut: Future<Output = Result<http::Response<R>, E>>,
        E: From<FinalizeError>,
    {
        let session = self.load(request.headers());
        request.extensions_mut().insert(session.clone());
        let mut response = next(request).await?;
        self.finalize(&session, &mut response)?;
        Ok(response)
    }
}

impl CookieEmitter {
    fn cookie(&self, token: String) -> ResponseCookie<'static> {
        let mut cookie = ResponseCookie::new(self.name.clone(), token);
        if let Some(domain) = self.domain.as_deref() {
            cookie = cookie.set_domain(domain.to_owned());
        }
        if let Some(path) = self.path.as_deref() {
            cookie = cookie.set_path(path.to_owned());
        }
        if let Some(same_site) = self.same_site {
            cookie = cookie.set_same_site(same_site);
        }
        if self.secure {
            cookie = cookie.set_secure(true);
        }
        if self.http_only {
            cookie = cookie.set_http_only(true);
        }
        let max_age = self.max_age.try_into().unwrap_or(time::Duration::MAX);
        cookie.set_max_age(max_age)
    }
}

// RFC 6265, section 4.1.1: a cookie name is an RFC 2616 token.
fn is_valid_cookie_name(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
        })
}

/// A post-processing step to seal the session into the outgoing response, if needed.
///
/// It's equivalent to [`StatelessSession::finalize`], in a shape that fits
/// response-mapping middleware stacks.
pub fn finalize_session<B>(
    mut response: http::Response<B>,
    sessions: &StatelessSession,
    session: &Session,
) -> Result<http::Response<B>, FinalizeError> {
    sessions.finalize(session, &mut response)?;
    Ok(response)
}

/// Retrieve the [`Session`] attached to a request by [`StatelessSession::handle`].
pub trait SessionExt {
    /// The session for the current request, if the session middleware is installed.
    fn session(&self) -> Option<&Session>;
}

impl<B> SessionExt for http::Request<B> {
    fn session(&self) -> Option<&Session> {
        self.extensions().get::<Session>()
    }
}

impl SessionExt for http::request::Parts {
    fn session(&self) -> Option<&Session> {
        self.extensions.get::<Session>()
    }
}

pub mod errors {
    use crate::seal::errors::SealError;

    #[derive(Debug, thiserror::Error)]
    #[non_exhaustive]
    /// The error returned by [`StatelessSession::finalize`](super::StatelessSession::finalize).
    pub enum FinalizeError {
        #[error("Failed to seal the session state")]
        Seal(#[from] SealError),
        #[error("The session token can't be used as a header value")]
        InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),
    }

    impl FinalizeError {
        /// The status code that should be returned to the client.
        ///
        /// The client isn't at fault: it's always `500 Internal Server Error`.
        pub fn status_code(&self) -> http::StatusCode {
            http::StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
