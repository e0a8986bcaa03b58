use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A batch of tickets bought (or assigned) together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
    pub id: Uuid,
    pub user_id: String,
    pub raffle_id: Option<Uuid>,
    pub total_amount: Decimal,
    pub ticket_count: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPurchase {
    pub user_id: String,
    pub raffle_id: Option<Uuid>,
    pub total_amount: Decimal,
    pub ticket_count: i32,
}
