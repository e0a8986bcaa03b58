//! PostgreSQL ticket store.
//!
//! Uniqueness is enforced by the `tickets_uuid_key` and
//! `tickets_display_code_key` constraints. Each ticket insert runs inside its
//! own savepoint: a unique violation aborts only that savepoint, so the
//! surrounding batch transaction can retry with a fresh candidate.

use sqlx::migrate::MigrateError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Acquire, Postgres, Transaction};
use uuid::Uuid;

use crate::models::{NewPurchase, NewTicket, Purchase, Ticket, TicketRow, TicketStatus};
use crate::store::{StoreError, TicketStore, TicketTransaction, UniqueField};

const UUID_CONSTRAINT: &str = "tickets_uuid_key";
const DISPLAY_CODE_CONSTRAINT: &str = "tickets_display_code_key";

const SELECT_BY_UUID: &str = r#"
    SELECT id, uuid, display_code, hash, generated_at, user_id, raffle_id,
           purchase_id, status, is_used, created_at, updated_at
    FROM tickets
    WHERE uuid = $1
"#;

const SELECT_BY_DISPLAY_CODE: &str = r#"
    SELECT id, uuid, display_code, hash, generated_at, user_id, raffle_id,
           purchase_id, status, is_used, created_at, updated_at
    FROM tickets
    WHERE display_code = $1
"#;

const SELECT_BY_ID: &str = r#"
    SELECT id, uuid, display_code, hash, generated_at, user_id, raffle_id,
           purchase_id, status, is_used, created_at, updated_at
    FROM tickets
    WHERE id = $1
"#;

const SELECT_BY_ID_FOR_UPDATE: &str = r#"
    SELECT id, uuid, display_code, hash, generated_at, user_id, raffle_id,
           purchase_id, status, is_used, created_at, updated_at
    FROM tickets
    WHERE id = $1
    FOR UPDATE
"#;

const SELECT_BY_USER: &str = r#"
    SELECT id, uuid, display_code, hash, generated_at, user_id, raffle_id,
           purchase_id, status, is_used, created_at, updated_at
    FROM tickets
    WHERE user_id = $1
    ORDER BY seq
"#;

const INSERT_TICKET: &str = r#"
    INSERT INTO tickets
        (uuid, display_code, hash, generated_at, user_id, raffle_id, purchase_id, status)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    RETURNING id, uuid, display_code, hash, generated_at, user_id, raffle_id,
              purchase_id, status, is_used, created_at, updated_at
"#;

const INSERT_PURCHASE: &str = r#"
    INSERT INTO purchases (user_id, raffle_id, total_amount, ticket_count)
    VALUES ($1, $2, $3, $4)
    RETURNING id, user_id, raffle_id, total_amount, ticket_count, created_at
"#;

const SOFT_DELETE: &str = r#"
    UPDATE tickets
    SET status = 'DELETED', is_used = TRUE, updated_at = NOW()
    WHERE id = $1 AND status <> 'DELETED'
    RETURNING id, uuid, display_code, hash, generated_at, user_id, raffle_id,
              purchase_id, status, is_used, created_at, updated_at
"#;

const UPDATE_STATUS: &str = r#"
    UPDATE tickets
    SET status = $2, is_used = is_used OR $3, updated_at = NOW()
    WHERE id = $1
    RETURNING id, uuid, display_code, hash, generated_at, user_id, raffle_id,
              purchase_id, status, is_used, created_at, updated_at
"#;

#[derive(Debug, Clone)]
pub struct PgTicketStore {
    pool: PgPool,
}

impl PgTicketStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), MigrateError> {
        sqlx::migrate!().run(&self.pool).await
    }
}

fn into_ticket(row: TicketRow) -> Result<Ticket, StoreError> {
    Ticket::try_from(row).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn classify_insert_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            match db_err.constraint() {
                Some(UUID_CONSTRAINT) => return StoreError::Duplicate(UniqueField::Uuid),
                Some(DISPLAY_CODE_CONSTRAINT) => {
                    return StoreError::Duplicate(UniqueField::DisplayCode)
                }
                _ => {}
            }
        }
    }
    StoreError::Database(err)
}

impl TicketStore for PgTicketStore {
    type Tx = PgTicketTransaction;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(PgTicketTransaction { tx })
    }

    async fn find_by_uuid(&self, uuid: Uuid) -> Result<Option<Ticket>, StoreError> {
        sqlx::query_as::<_, TicketRow>(SELECT_BY_UUID)
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await?
            .map(into_ticket)
            .transpose()
    }

    async fn find_by_display_code(&self, code: &str) -> Result<Option<Ticket>, StoreError> {
        sqlx::query_as::<_, TicketRow>(SELECT_BY_DISPLAY_CODE)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?
            .map(into_ticket)
            .transpose()
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Ticket>, StoreError> {
        sqlx::query_as::<_, TicketRow>(SELECT_BY_USER)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(into_ticket)
            .collect()
    }

    async fn soft_delete(&self, id: Uuid) -> Result<Ticket, StoreError> {
        let updated = sqlx::query_as::<_, TicketRow>(SOFT_DELETE)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match updated {
            Some(row) => into_ticket(row),
            // Either already deleted or missing.
            None => sqlx::query_as::<_, TicketRow>(SELECT_BY_ID)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .map(into_ticket)
                .transpose()?
                .ok_or(StoreError::NotFound(id)),
        }
    }

    async fn update_status(&self, id: Uuid, status: TicketStatus) -> Result<Ticket, StoreError> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, TicketRow>(SELECT_BY_ID_FOR_UPDATE)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .map(into_ticket)
            .transpose()?
            .ok_or(StoreError::NotFound(id))?;

        if !current.status.can_transition_to(status) {
            tx.rollback().await?;
            return Err(StoreError::InvalidTransition {
                from: current.status,
                to: status,
            });
        }

        let row = sqlx::query_as::<_, TicketRow>(UPDATE_STATUS)
            .bind(id)
            .bind(status.as_str())
            .bind(status.is_terminal())
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        into_ticket(row)
    }
}

/// A batch transaction; rolled back by sqlx if dropped uncommitted.
pub struct PgTicketTransaction {
    tx: Transaction<'static, Postgres>,
}

impl TicketTransaction for PgTicketTransaction {
    async fn create_purchase(&mut self, purchase: NewPurchase) -> Result<Purchase, StoreError> {
        let purchase = sqlx::query_as::<_, Purchase>(INSERT_PURCHASE)
            .bind(purchase.user_id)
            .bind(purchase.raffle_id)
            .bind(purchase.total_amount)
            .bind(purchase.ticket_count)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(purchase)
    }

    async fn insert_ticket(&mut self, ticket: NewTicket) -> Result<Ticket, StoreError> {
        let mut savepoint = Acquire::begin(&mut self.tx).await?;

        let inserted = sqlx::query_as::<_, TicketRow>(INSERT_TICKET)
            .bind(ticket.identity.uuid)
            .bind(ticket.identity.display_code)
            .bind(ticket.identity.hash)
            .bind(ticket.identity.generated_at)
            .bind(ticket.user_id)
            .bind(ticket.raffle_id)
            .bind(ticket.purchase_id)
            .bind(ticket.status.as_str())
            .fetch_one(&mut *savepoint)
            .await;

        match inserted {
            Ok(row) => {
                savepoint.commit().await?;
                into_ticket(row)
            }
            Err(err) => {
                savepoint.rollback().await?;
                Err(classify_insert_error(err))
            }
        }
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
