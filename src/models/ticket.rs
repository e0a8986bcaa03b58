use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle state of a ticket.
///
/// Statuses only move forward; see [`TicketStatus::can_transition_to`].
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Pending,
    #[default]
    Available,
    Active,
    InRaffle,
    Winner,
    Lost,
    Deleted,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 7] = [
        TicketStatus::Pending,
        TicketStatus::Available,
        TicketStatus::Active,
        TicketStatus::InRaffle,
        TicketStatus::Winner,
        TicketStatus::Lost,
        TicketStatus::Deleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Pending => "PENDING",
            TicketStatus::Available => "AVAILABLE",
            TicketStatus::Active => "ACTIVE",
            TicketStatus::InRaffle => "IN_RAFFLE",
            TicketStatus::Winner => "WINNER",
            TicketStatus::Lost => "LOST",
            TicketStatus::Deleted => "DELETED",
        }
    }

    // WINNER and LOST share a rank: a drawn ticket cannot flip outcome.
    fn rank(&self) -> u8 {
        match self {
            TicketStatus::Pending => 0,
            TicketStatus::Available => 1,
            TicketStatus::Active => 2,
            TicketStatus::InRaffle => 3,
            TicketStatus::Winner | TicketStatus::Lost => 4,
            TicketStatus::Deleted => 5,
        }
    }

    /// Whether a ticket in `self` may move to `next`.
    ///
    /// Transitions must strictly advance; `DELETED` is reachable from every
    /// other status and is never left.
    pub fn can_transition_to(&self, next: TicketStatus) -> bool {
        match (self, next) {
            (TicketStatus::Deleted, _) => false,
            (_, TicketStatus::Deleted) => true,
            (current, next) => next.rank() > current.rank(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TicketStatus::Deleted)
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown ticket status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for TicketStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TicketStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// A persisted ticket, including its signature.
///
/// Deliberately not `Serialize`: the stored hash never leaves the service.
/// Use [`PublicTicket`] for anything sent to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub id: Uuid,
    pub uuid: Uuid,
    pub display_code: String,
    pub hash: String,
    pub generated_at: DateTime<Utc>,
    pub user_id: String,
    pub raffle_id: Option<Uuid>,
    pub purchase_id: Option<Uuid>,
    pub status: TicketStatus,
    pub is_used: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    pub fn to_public(&self) -> PublicTicket {
        PublicTicket {
            id: self.id,
            uuid: self.uuid,
            display_code: self.display_code.clone(),
            generated_at: self.generated_at,
            status: self.status,
            user_id: self.user_id.clone(),
            raffle_id: self.raffle_id,
            purchase_id: self.purchase_id,
        }
    }
}

/// Row shape of the `tickets` table.
#[derive(Debug, Clone, FromRow)]
pub struct TicketRow {
    pub id: Uuid,
    pub uuid: Uuid,
    pub display_code: String,
    pub hash: String,
    pub generated_at: DateTime<Utc>,
    pub user_id: String,
    pub raffle_id: Option<Uuid>,
    pub purchase_id: Option<Uuid>,
    pub status: String,
    pub is_used: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = UnknownStatus;

    fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
        Ok(Ticket {
            id: row.id,
            uuid: row.uuid,
            display_code: row.display_code,
            hash: row.hash,
            generated_at: row.generated_at,
            user_id: row.user_id,
            raffle_id: row.raffle_id,
            purchase_id: row.purchase_id,
            status: row.status.parse()?,
            is_used: row.is_used,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Signed identity produced by the generator, before persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketIdentity {
    pub uuid: Uuid,
    pub display_code: String,
    pub hash: String,
    pub generated_at: DateTime<Utc>,
}

/// Everything a store needs to insert one ticket.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub identity: TicketIdentity,
    pub user_id: String,
    pub raffle_id: Option<Uuid>,
    pub purchase_id: Option<Uuid>,
    pub status: TicketStatus,
}

/// Client-facing view of a ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicTicket {
    pub id: Uuid,
    pub uuid: Uuid,
    pub display_code: String,
    pub generated_at: DateTime<Utc>,
    pub status: TicketStatus,
    pub user_id: String,
    pub raffle_id: Option<Uuid>,
    pub purchase_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in TicketStatus::ALL {
            assert_eq!(status.as_str().parse::<TicketStatus>(), Ok(status));
        }
        assert!("SOLD".parse::<TicketStatus>().is_err());
    }

    #[test]
    fn test_status_transitions_are_monotonic() {
        assert!(TicketStatus::Pending.can_transition_to(TicketStatus::Available));
        assert!(TicketStatus::InRaffle.can_transition_to(TicketStatus::Winner));
        assert!(!TicketStatus::Active.can_transition_to(TicketStatus::Available));
        assert!(!TicketStatus::Winner.can_transition_to(TicketStatus::Lost));
        assert!(!TicketStatus::Active.can_transition_to(TicketStatus::Active));
    }

    #[test]
    fn test_deleted_is_terminal() {
        for status in TicketStatus::ALL {
            if status != TicketStatus::Deleted {
                assert!(status.can_transition_to(TicketStatus::Deleted));
            }
            assert!(!TicketStatus::Deleted.can_transition_to(status));
        }
        assert!(TicketStatus::Deleted.is_terminal());
    }

    #[test]
    fn test_status_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&TicketStatus::InRaffle).unwrap();
        assert_eq!(json, "\"IN_RAFFLE\"");
    }
}
