/*!
Stateless HTTP sessions.

# Why stateless?

Sessions allow a server to attach state to a set of requests coming from the same client.
Most session systems store that state server-side, in a database or a cache, and hand
out an opaque identifier to the client.

This crate takes a different route: **the whole session state travels with the client**.
It is serialized, encrypted and authenticated into an opaque token, which is sent to the
client (as a cookie or as a response header) and sent back with every subsequent request.
No storage backend is needed, and any instance of your application holding the same secret
can serve any request.

# Anatomy of a request

1. The session token is extracted from the incoming request, via a [`SessionIdExtractor`].
2. The token is unsealed into a [`Session`]. A missing, tampered or expired token
   results in an empty session: it never fails the request.
3. Your handler reads and mutates the [`Session`]. Every mutation is tracked.
4. If the session was modified, it's sealed into a fresh token and attached to the response.
   Untouched sessions don't emit anything.

[`StatelessSession`] drives the whole process.

# Security considerations

Tokens are encrypted with AES-256-GCM, using a key derived from your secret and a random
per-token salt. The client can't read nor forge the session state, but it can replay an
old token until it expires: don't use the session to store state that must be revocable.

Keep your tokens small! Browsers cap cookies at roughly 4 KB.
*/
pub mod config;
mod incoming;
mod middleware;
mod sealer_;
mod session_;
pub(crate) mod wire;

pub use config::SessionConfig;
pub use incoming::{CookieSessionId, HeaderSessionId, SessionIdExtractor, session_id_from_cookie};
pub use middleware::{SessionExt, StatelessSession, finalize_session};
pub use session_::{Session, SessionData};

pub mod seal {
    //! Turn session data into opaque tokens, and back.
    pub use crate::sealer_::errors;
    pub use crate::sealer_::{AesGcmSealer, Sealer, SessionCodec};
}

pub mod state {
    //! Errors raised when reading or writing session values.
    pub use crate::session_::errors;
}

pub mod errors {
    //! Errors raised while finalizing a session.
    pub use crate::middleware::errors::FinalizeError;
}
