use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use rand::rngs::OsRng;
use rand::Rng;
use uuid::Uuid;

use crate::models::TicketIdentity;
use crate::tickets::signing::TicketSigner;

/// Symbols used in display codes. No `0`, `O`, `1` or `I`, so codes survive
/// being read aloud or copied by hand.
pub const DISPLAY_CODE_ALPHABET: &[u8; 32] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";

/// Number of random symbols in a display code (50 bits).
pub const DISPLAY_CODE_SYMBOLS: usize = 10;

/// Where fresh identifiers come from.
pub trait IdentitySource: Send + Sync {
    fn next_uuid(&self) -> Uuid;
    fn next_display_code(&self) -> String;
}

/// Identifiers drawn from the operating system's CSPRNG.
///
/// Panics if the OS entropy source fails; that is a fatal process error,
/// not a retryable condition.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

impl IdentitySource for OsEntropy {
    fn next_uuid(&self) -> Uuid {
        Uuid::new_v4()
    }

    fn next_display_code(&self) -> String {
        let mut rng = OsRng;
        let symbols: Vec<u8> = (0..DISPLAY_CODE_SYMBOLS)
            .map(|_| DISPLAY_CODE_ALPHABET[rng.gen_range(0..DISPLAY_CODE_ALPHABET.len())])
            .collect();
        format_display_code(&symbols)
    }
}

fn format_display_code(symbols: &[u8]) -> String {
    let (head, tail) = symbols.split_at(symbols.len() / 2);
    format!(
        "{}-{}",
        String::from_utf8_lossy(head),
        String::from_utf8_lossy(tail)
    )
}

/// Normalises a human-entered display code for lookup.
///
/// Case, whitespace and separators are ignored, so `abcde fghjk` and
/// `ABCDEFGHJK` both become `ABCDE-FGHJK`. Input that does not reduce to a
/// full-length code is returned upper-cased and stripped; it matches nothing.
pub fn normalize_display_code(code: &str) -> String {
    let symbols: Vec<u8> = code
        .bytes()
        .filter(u8::is_ascii_alphanumeric)
        .map(|b| b.to_ascii_uppercase())
        .collect();

    if symbols.len() == DISPLAY_CODE_SYMBOLS {
        format_display_code(&symbols)
    } else {
        String::from_utf8_lossy(&symbols).into_owned()
    }
}

/// Mints signed ticket identities.
///
/// Pure apart from reading the clock and the identity source; never touches
/// the store.
#[derive(Clone)]
pub struct TicketGenerator {
    signer: Arc<TicketSigner>,
    source: Arc<dyn IdentitySource>,
}

impl TicketGenerator {
    pub fn new(signer: Arc<TicketSigner>) -> Self {
        Self::with_source(signer, Arc::new(OsEntropy))
    }

    pub fn with_source(signer: Arc<TicketSigner>, source: Arc<dyn IdentitySource>) -> Self {
        Self { signer, source }
    }

    pub fn generate(&self, user_id: &str) -> TicketIdentity {
        self.generate_at(user_id, Utc::now())
    }

    fn generate_at(&self, user_id: &str, now: DateTime<Utc>) -> TicketIdentity {
        // Stores keep at least microseconds; millis survive every round trip.
        let generated_at = now.trunc_subsecs(3);
        let uuid = self.source.next_uuid();
        let display_code = self.source.next_display_code();
        let hash = self.signer.sign(&uuid, user_id, &generated_at);

        TicketIdentity {
            uuid,
            display_code,
            hash,
            generated_at,
        }
    }
}

impl std::fmt::Debug for TicketGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketGenerator")
            .field("signer", &self.signer)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn generator() -> TicketGenerator {
        TicketGenerator::new(Arc::new(TicketSigner::new([3u8; 32]).unwrap()))
    }

    #[test]
    fn test_display_code_shape() {
        let code = OsEntropy.next_display_code();
        assert_eq!(code.len(), DISPLAY_CODE_SYMBOLS + 1);
        assert_eq!(&code[5..6], "-");
        assert!(code
            .bytes()
            .filter(|b| *b != b'-')
            .all(|b| DISPLAY_CODE_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_generated_identity_is_signed() {
        let signer = TicketSigner::new([3u8; 32]).unwrap();
        let identity = generator().generate("user-7");
        assert!(signer.verify(
            &identity.uuid,
            "user-7",
            &identity.generated_at,
            &identity.hash
        ));
    }

    #[test]
    fn test_generated_at_has_millisecond_precision() {
        let identity = generator().generate("user-7");
        assert_eq!(identity.generated_at.timestamp_subsec_nanos() % 1_000_000, 0);
    }

    #[test]
    fn test_identities_are_distinct() {
        let generator = generator();
        let mut uuids = HashSet::new();
        let mut codes = HashSet::new();
        for _ in 0..1_000 {
            let identity = generator.generate("user-7");
            assert!(uuids.insert(identity.uuid));
            assert!(codes.insert(identity.display_code));
        }
    }

    #[test]
    fn test_normalize_display_code() {
        assert_eq!(normalize_display_code("  abcde-fghjk \n"), "ABCDE-FGHJK");
        assert_eq!(normalize_display_code("abcdefghjk"), "ABCDE-FGHJK");
        assert_eq!(normalize_display_code("ABC DE--FGH JK"), "ABCDE-FGHJK");
        assert_eq!(normalize_display_code("abc-def"), "ABCDEF");
    }

    #[test]
    fn test_generated_codes_are_already_normal() {
        let code = OsEntropy.next_display_code();
        assert_eq!(normalize_display_code(&code), code);
        assert_eq!(normalize_display_code(&code.replace('-', "")), code);
    }
}
