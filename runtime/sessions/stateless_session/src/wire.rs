use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use crate::seal::errors::InvalidTokenError;

/// The version tag that prefixes every token we produce.
pub(crate) const VERSION: &str = "v1";
pub(crate) const SALT_LEN: usize = 16;
pub(crate) const NONCE_LEN: usize = 12;

const SEPARATOR: char = '.';

/// The schema for a sealed session token.
///
/// On the wire, a token is made of five `.`-separated segments:
///
/// ```text
/// v1.<salt>.<nonce>.<issued at, in milliseconds since the Unix epoch>.<ciphertext>
/// ```
///
/// Binary segments are encoded using URL-safe base64, without padding, so that
/// the token can be used verbatim as a cookie value or as a header value.
pub(crate) struct WireToken {
    pub(crate) salt: [u8; SALT_LEN],
    pub(crate) nonce: [u8; NONCE_LEN],
    pub(crate) issued_at_ms: i64,
    pub(crate) ciphertext: Vec<u8>,
}

impl WireToken {
    /// The portion of the token that must be authenticated alongside the ciphertext.
    ///
    /// Tampering with any header segment (including the issue timestamp) is detected
    /// as an authentication failure.
    pub(crate) fn associated_data(&self) -> String {
        format!(
            "{VERSION}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}",
            URL_SAFE_NO_PAD.encode(self.salt),
            URL_SAFE_NO_PAD.encode(self.nonce),
            self.issued_at_ms
        )
    }

    pub(crate) fn encode(&self) -> String {
        format!(
            "{}{SEPARATOR}{}",
            self.associated_data(),
            URL_SAFE_NO_PAD.encode(&self.ciphertext)
        )
    }

    pub(crate) fn decode(token: &str) -> Result<Self, InvalidTokenError> {
        let segments: Vec<&str> = token.split(SEPARATOR).collect();
        let [version, salt, nonce, issued_at, ciphertext] = segments[..] else {
            return Err(InvalidTokenError::SegmentCount {
                expected: 5,
                actual: segments.len(),
            });
        };
        if version != VERSION {
            return Err(InvalidTokenError::UnknownVersion(version.to_owned()));
        }
        let salt = decode_fixed::<SALT_LEN>("salt", salt)?;
        let nonce = decode_fixed::<NONCE_LEN>("nonce", nonce)?;
        let issued_at_ms = issued_at
            .parse::<i64>()
            .map_err(|_| InvalidTokenError::InvalidTimestamp)?;
        // Only the canonical form is accepted: `associated_data` re-formats the number.
        if issued_at_ms.to_string() != issued_at {
            return Err(InvalidTokenError::InvalidTimestamp);
        }
        let ciphertext = URL_SAFE_NO_PAD
            .decode(ciphertext)
            .map_err(|source| InvalidTokenError::Base64 {
                segment: "ciphertext",
                source,
            })?;
        if ciphertext.is_empty() {
            return Err(InvalidTokenError::EmptyCiphertext);
        }
        Ok(Self {
            salt,
            nonce,
            issued_at_ms,
            ciphertext,
        })
    }
}

fn decode_fixed<const N: usize>(
    segment: &'static str,
    value: &str,
) -> Result<[u8; N], InvalidTokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|source| InvalidTokenError::Base64 { segment, source })?;
    bytes
        .try_into()
        .map_err(|bytes: Vec<u8>| InvalidTokenError::SegmentLength {
            segment,
            expected: N,
            actual: bytes.len(),
        })
}
