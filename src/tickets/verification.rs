//! Ticket authenticity checks.
//!
//! Verification never trusts anything but the lookup key from the caller:
//! the signed fields and the stored hash both come from the store, and the
//! signature is recomputed with the server key. Missing and tampered tickets
//! are ordinary negative outcomes, not errors.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::Ticket;
use crate::store::{StoreError, TicketStore};
use crate::tickets::generator::normalize_display_code;
use crate::tickets::signing::TicketSigner;

/// Lookup keys supplied by a client. `uuid` wins when both are present.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyQuery {
    pub uuid: Option<String>,
    pub code: Option<String>,
}

impl VerifyQuery {
    pub fn by_uuid(uuid: Uuid) -> Self {
        Self {
            uuid: Some(uuid.to_string()),
            code: None,
        }
    }

    pub fn by_code(code: impl Into<String>) -> Self {
        Self {
            uuid: None,
            code: Some(code.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerifyFailure {
    NotFound,
    Tampered,
    MissingKey,
}

impl VerifyFailure {
    pub fn code(&self) -> &'static str {
        match self {
            VerifyFailure::NotFound => "NOT_FOUND",
            VerifyFailure::Tampered => "TAMPERED",
            VerifyFailure::MissingKey => "MISSING_KEY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Verification {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<VerifyFailure>,
}

impl Verification {
    pub fn valid() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    pub fn invalid(failure: VerifyFailure) -> Self {
        Self {
            valid: false,
            error: Some(failure),
        }
    }
}

enum LookupKey {
    Uuid(Uuid),
    Code(String),
}

#[derive(Debug, Clone)]
pub struct VerificationService<S> {
    store: S,
    signer: Arc<TicketSigner>,
}

impl<S: TicketStore> VerificationService<S> {
    pub fn new(store: S, signer: Arc<TicketSigner>) -> Self {
        Self { store, signer }
    }

    /// Looks the ticket up and checks its signature.
    ///
    /// Only store failures are errors; every other outcome is a
    /// [`Verification`].
    pub async fn verify(&self, query: &VerifyQuery) -> Result<Verification, StoreError> {
        let key = match lookup_key(query) {
            Ok(Some(key)) => key,
            Ok(None) => return Ok(Verification::invalid(VerifyFailure::NotFound)),
            Err(failure) => return Ok(Verification::invalid(failure)),
        };

        let ticket = match key {
            LookupKey::Uuid(uuid) => self.store.find_by_uuid(uuid).await?,
            LookupKey::Code(code) => self.store.find_by_display_code(&code).await?,
        };

        let Some(ticket) = ticket else {
            debug!(?query, "Verification lookup found no ticket");
            return Ok(Verification::invalid(VerifyFailure::NotFound));
        };

        if self.check(&ticket) {
            Ok(Verification::valid())
        } else {
            warn!(
                ticket_id = %ticket.id,
                user_id = %ticket.user_id,
                "Ticket signature mismatch"
            );
            Ok(Verification::invalid(VerifyFailure::Tampered))
        }
    }

    fn check(&self, ticket: &Ticket) -> bool {
        self.signer.verify(
            &ticket.uuid,
            &ticket.user_id,
            &ticket.generated_at,
            &ticket.hash,
        )
    }
}

// Ok(None) means a key was given but cannot match any ticket.
fn lookup_key(query: &VerifyQuery) -> Result<Option<LookupKey>, VerifyFailure> {
    let present = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    if let Some(raw) = present(&query.uuid) {
        return Ok(Uuid::parse_str(&raw).ok().map(LookupKey::Uuid));
    }
    if let Some(raw) = present(&query.code) {
        return Ok(Some(LookupKey::Code(normalize_display_code(&raw))));
    }
    Err(VerifyFailure::MissingKey)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryTicketStore;
    use crate::tickets::generator::TicketGenerator;
    use crate::tickets::issuance::{IssuanceCoordinator, IssueRequest};

    struct Fixture {
        store: MemoryTicketStore,
        service: VerificationService<MemoryTicketStore>,
        ticket: Ticket,
    }

    async fn fixture() -> Fixture {
        let signer = Arc::new(TicketSigner::new([9u8; 32]).unwrap());
        let store = MemoryTicketStore::new();
        let ticket = IssuanceCoordinator::new(store.clone(), TicketGenerator::new(signer.clone()))
            .issue(IssueRequest::new("user-1", 1))
            .await
            .unwrap()
            .remove(0);
        let service = VerificationService::new(store.clone(), signer);
        Fixture {
            store,
            service,
            ticket,
        }
    }

    #[tokio::test]
    async fn test_valid_by_uuid_and_code() {
        let f = fixture().await;

        let by_uuid = f.service.verify(&VerifyQuery::by_uuid(f.ticket.uuid)).await.unwrap();
        assert_eq!(by_uuid, Verification::valid());

        let by_code = f
            .service
            .verify(&VerifyQuery::by_code(f.ticket.display_code.to_lowercase()))
            .await
            .unwrap();
        assert_eq!(by_code, Verification::valid());

        let typed = f.ticket.display_code.replace('-', " ").to_lowercase();
        let by_typed_code = f
            .service
            .verify(&VerifyQuery::by_code(typed))
            .await
            .unwrap();
        assert_eq!(by_typed_code, Verification::valid());
    }

    #[tokio::test]
    async fn test_uuid_preferred_over_code() {
        let f = fixture().await;
        let query = VerifyQuery {
            uuid: Some(Uuid::new_v4().to_string()),
            code: Some(f.ticket.display_code.clone()),
        };
        let result = f.service.verify(&query).await.unwrap();
        assert_eq!(result, Verification::invalid(VerifyFailure::NotFound));
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_keys_are_not_found() {
        let f = fixture().await;
        for query in [
            VerifyQuery::by_uuid(Uuid::new_v4()),
            VerifyQuery::by_code("AAAAA-AAAAA"),
            VerifyQuery {
                uuid: Some("not-a-uuid".to_string()),
                code: None,
            },
        ] {
            let result = f.service.verify(&query).await.unwrap();
            assert_eq!(result.error, Some(VerifyFailure::NotFound));
        }
    }

    #[tokio::test]
    async fn test_missing_key() {
        let f = fixture().await;
        let query = VerifyQuery {
            uuid: Some("   ".to_string()),
            code: None,
        };
        let result = f.service.verify(&query).await.unwrap();
        assert_eq!(result, Verification::invalid(VerifyFailure::MissingKey));
    }

    #[tokio::test]
    async fn test_tampered_fields_are_detected() {
        let f = fixture().await;

        let mut moved = f.ticket.clone();
        moved.user_id = "user-2".to_string();
        f.store.overwrite(moved);
        let result = f.service.verify(&VerifyQuery::by_uuid(f.ticket.uuid)).await.unwrap();
        assert_eq!(result.error, Some(VerifyFailure::Tampered));

        let mut backdated = f.ticket.clone();
        backdated.generated_at -= chrono::Duration::days(1);
        f.store.overwrite(backdated);
        let result = f.service.verify(&VerifyQuery::by_uuid(f.ticket.uuid)).await.unwrap();
        assert_eq!(result.error, Some(VerifyFailure::Tampered));
    }

    #[tokio::test]
    async fn test_verification_json_shape() {
        let json = serde_json::to_value(Verification::invalid(VerifyFailure::Tampered)).unwrap();
        assert_eq!(json, serde_json::json!({"valid": false, "error": "TAMPERED"}));
        let json = serde_json::to_value(Verification::valid()).unwrap();
        assert_eq!(json, serde_json::json!({"valid": true}));
    }
}
