use std::sync::Arc;
use std::time::Duration;

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use time::OffsetDateTime;

use crate::SessionData;
use crate::wire::{NONCE_LEN, SALT_LEN, WireToken};
use errors::{AuthenticationError, ExpiredTokenError, InvalidTokenError, SealError, UnsealError};

/// Turns session data into an opaque token, and back.
///
/// It binds together a [`Sealer`], the secret used to derive encryption keys
/// and the maximum token age.
/// It is immutable and cheap to clone, so it can be shared across requests.
#[derive(Clone)]
pub struct SessionCodec {
    sealer: Arc<dyn Sealer>,
    secret: Arc<SecretString>,
    ttl: Duration,
}

impl std::fmt::Debug for SessionCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCodec")
            .field("sealer", &self.sealer)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl SessionCodec {
    /// Create a new codec backed by [`AesGcmSealer`].
    ///
    /// A `ttl` of zero means that tokens never expire.
    pub fn new(secret: SecretString, ttl: Duration) -> Self {
        Self::with_sealer(AesGcmSealer, secret, ttl)
    }

    /// Create a new codec backed by a custom sealing primitive.
    pub fn with_sealer<S>(sealer: S, secret: SecretString, ttl: Duration) -> Self
    where
        S: Sealer + 'static,
    {
        Self {
            sealer: Arc::new(sealer),
            secret: Arc::new(secret),
            ttl,
        }
    }

    /// The maximum token age. Zero means that tokens never expire.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Seal `data` into a token, using the current time as issue time.
    pub fn seal(&self, data: &SessionData) -> Result<String, SealError> {
        self.seal_at(data, OffsetDateTime::now_utc())
    }

    /// Seal `data` into a token, as if it had been issued at `issued_at`.
    pub fn seal_at(
        &self,
        data: &SessionData,
        issued_at: OffsetDateTime,
    ) -> Result<String, SealError> {
        let payload = serde_json::to_vec(data).map_err(SealError::Serialization)?;
        self.sealer.seal(&payload, &self.secret, issued_at)
    }

    /// Recover the session data stored in `token`, using the current time to
    /// determine if the token has expired.
    pub fn unseal(&self, token: &str) -> Result<SessionData, UnsealError> {
        self.unseal_at(token, OffsetDateTime::now_utc())
    }

    /// Recover the session data stored in `token`, as if the current time were `now`.
    pub fn unseal_at(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<SessionData, UnsealError> {
        let payload = self.sealer.unseal(token, &self.secret, self.ttl, now)?;
        serde_json::from_slice(&payload)
            .map_err(|e| UnsealError::InvalidToken(InvalidTokenError::Payload(e)))
    }
}

/// The interface of a sealing primitive: authenticated encryption
/// of an opaque payload into a string token, with expiry enforcement.
pub trait Sealer: std::fmt::Debug + Send + Sync {
    /// Seal `payload` into a token.
    ///
    /// `issued_at` must be embedded into the token, authenticated,
    /// to allow [`Sealer::unseal`] to enforce a maximum token age.
    fn seal(
        &self,
        payload: &[u8],
        secret: &SecretString,
        issued_at: OffsetDateTime,
    ) -> Result<String, SealError>;

    /// Recover the payload stored in `token`.
    ///
    /// If `ttl` is zero, the token age must not be checked.
    /// Otherwise, tokens older than `ttl` must be rejected with [`UnsealError::Expired`].
    fn unseal(
        &self,
        token: &str,
        secret: &SecretString,
        ttl: Duration,
        now: OffsetDateTime,
    ) -> Result<Vec<u8>, UnsealError>;
}

/// The default sealing primitive.
///
/// Every token gets a fresh random salt, used together with the secret to derive
/// a 256-bit key via HMAC-SHA256. The payload is encrypted with AES-256-GCM,
/// using a random 96-bit nonce. The token header (version, salt, nonce, issue time)
/// is authenticated as associated data.
#[derive(Debug, Clone, Copy, Default)]
pub struct AesGcmSealer;

impl AesGcmSealer {
    /// Derive a per-token cipher from the secret and the token salt.
    fn cipher(secret: &SecretString, salt: &[u8]) -> Option<Aes256Gcm> {
        let mut mac =
            <Hmac<Sha256> as Mac>::new_from_slice(secret.expose_secret().as_bytes()).ok()?;
        mac.update(salt);
        let key = mac.finalize().into_bytes();
        Aes256Gcm::new_from_slice(&key).ok()
    }
}

impl Sealer for AesGcmSealer {
    fn seal(
        &self,
        payload: &[u8],
        secret: &SecretString,
        issued_at: OffsetDateTime,
    ) -> Result<String, SealError> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let mut token = WireToken {
            salt,
            nonce,
            issued_at_ms: unix_ms(issued_at),
            ciphertext: Vec::new(),
        };
        let cipher = Self::cipher(secret, &token.salt).ok_or(SealError::KeyDerivation)?;
        let aad = token.associated_data();
        token.ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&token.nonce),
                Payload {
                    msg: payload,
                    aad: aad.as_bytes(),
                },
            )
            .map_err(|_| SealError::Encryption)?;
        Ok(token.encode())
    }

    fn unseal(
        &self,
        token: &str,
        secret: &SecretString,
        ttl: Duration,
        now: OffsetDateTime,
    ) -> Result<Vec<u8>, UnsealError> {
        let token = WireToken::decode(token)?;
        let cipher = Self::cipher(secret, &token.salt).ok_or(AuthenticationError)?;
        let aad = token.associated_data();
        let payload = cipher
            .decrypt(
                Nonce::from_slice(&token.nonce),
                Payload {
                    msg: &token.ciphertext,
                    aad: aad.as_bytes(),
                },
            )
            .map_err(|_| AuthenticationError)?;

        // The issue time is only trusted once the token has been authenticated.
        if !ttl.is_zero() {
            let age_ms = unix_ms(now).saturating_sub(token.issued_at_ms);
            let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
            if age_ms > ttl_ms {
                return Err(ExpiredTokenError {
                    age: Duration::from_millis(age_ms.unsigned_abs()),
                    ttl,
                }
                .into());
            }
        }
        Ok(payload)
    }
}

fn unix_ms(t: OffsetDateTime) -> i64 {
    i64::try_from(t.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}

/// Errors that can occur when sealing or unsealing a session token.
pub mod errors {
    use std::time::Duration;

    #[derive(Debug, thiserror::Error)]
    #[non_exhaustive]
    /// The error returned by [`Sealer::seal`][super::Sealer::seal] and
    /// [`SessionCodec::seal`][super::SessionCodec::seal].
    pub enum SealError {
        #[error("Failed to serialize the session data")]
        Serialization(#[source] serde_json::Error),
        #[error("Failed to derive an encryption key from the session secret")]
        KeyDerivation,
        #[error("Failed to encrypt the session data")]
        Encryption,
    }

    /// The error returned by [`Sealer::unseal`][super::Sealer::unseal] and
    /// [`SessionCodec::unseal`][super::SessionCodec::unseal].
    ///
    /// The variants are distinguishable for diagnostic purposes, but they all
    /// lead to the same outcome when processing a request: the session starts empty.
    #[derive(Debug, thiserror::Error)]
    #[non_exhaustive]
    pub enum UnsealError {
        #[error(transparent)]
        InvalidToken(#[from] InvalidTokenError),
        #[error(transparent)]
        Authentication(#[from] AuthenticationError),
        #[error(transparent)]
        Expired(#[from] ExpiredTokenError),
    }

    #[derive(Debug, thiserror::Error)]
    #[non_exhaustive]
    /// The token is not well-formed.
    pub enum InvalidTokenError {
        #[error("Expected a session token with {expected} segments, found {actual}")]
        SegmentCount { expected: usize, actual: usize },
        #[error("Unknown session token version: `{0}`")]
        UnknownVersion(String),
        #[error("The `{segment}` segment of the session token is not valid base64")]
        Base64 {
            segment: &'static str,
            #[source]
            source: base64::DecodeError,
        },
        #[error(
            "The `{segment}` segment of the session token must be {expected} bytes long, found {actual}"
        )]
        SegmentLength {
            segment: &'static str,
            expected: usize,
            actual: usize,
        },
        #[error("The issue time of the session token is not a valid timestamp")]
        InvalidTimestamp,
        #[error("The session token has no ciphertext")]
        EmptyCiphertext,
        #[error("The session token payload is not a valid JSON object")]
        Payload(#[source] serde_json::Error),
    }

    #[derive(Debug, thiserror::Error)]
    #[non_exhaustive]
    #[error(
        "The session token failed authentication: either it was tampered with or it was sealed using a different secret"
    )]
    /// The token could not be authenticated.
    pub struct AuthenticationError;

    #[derive(Debug, thiserror::Error)]
    #[non_exhaustive]
    #[error(
        "The session token has expired: it is {}ms old, the maximum age is {}ms",
        .age.as_millis(),
        .ttl.as_millis()
    )]
    /// The token is older than the configured time-to-live.
    pub struct ExpiredTokenError {
        /// The age of the token.
        pub age: Duration,
        /// The maximum token age.
        pub ttl: Duration,
    }
}
