//! HMAC-SHA256 ticket signatures.
//!
//! A ticket's signature binds three fields into one canonical message:
//!
//! ```text
//! {uuid}|{user_id}|{generated_at}
//! ```
//!
//! `uuid` is the lowercase hyphenated form (36 chars) and `generated_at` is
//! RFC 3339 UTC with millisecond precision (24 chars). Both have a fixed
//! width, so the user id in the middle is delimited unambiguously even when
//! it contains `|`.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Shortest secret accepted as a signing key, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
#[error("ticket secret must be at least {MIN_SECRET_LEN} bytes, got {0}")]
pub struct WeakSecret(pub usize);

/// Server-held signing key.
///
/// Built once at startup and shared by reference; never serialized and
/// redacted from `Debug` output.
#[derive(Clone)]
pub struct TicketSigner {
    keyed: HmacSha256,
}

impl TicketSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, WeakSecret> {
        let secret = secret.as_ref();
        if secret.len() < MIN_SECRET_LEN {
            return Err(WeakSecret(secret.len()));
        }
        let keyed =
            HmacSha256::new_from_slice(secret).map_err(|_| WeakSecret(secret.len()))?;
        Ok(Self { keyed })
    }

    /// Hex-encoded HMAC of the canonical binding.
    pub fn sign(&self, uuid: &Uuid, user_id: &str, generated_at: &DateTime<Utc>) -> String {
        let mut mac = self.keyed.clone();
        mac.update(canonical_binding(uuid, user_id, generated_at).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Recomputes the signature and compares it to `hash` in constant time.
    pub fn verify(
        &self,
        uuid: &Uuid,
        user_id: &str,
        generated_at: &DateTime<Utc>,
        hash: &str,
    ) -> bool {
        let expected = self.sign(uuid, user_id, generated_at);
        constant_time_eq::constant_time_eq(expected.as_bytes(), hash.as_bytes())
    }
}

impl fmt::Debug for TicketSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TicketSigner")
            .field("key", &"<redacted>")
            .finish()
    }
}

pub fn canonical_binding(uuid: &Uuid, user_id: &str, generated_at: &DateTime<Utc>) -> String {
    format!(
        "{}|{}|{}",
        uuid.hyphenated(),
        user_id,
        generated_at.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}
