//! Ticket persistence.
//!
//! A [`TicketStore`] answers reads directly and hands out
//! [`TicketTransaction`]s for writes that must land together. A transaction
//! that is dropped without [`TicketTransaction::commit`] is rolled back, so an
//! early return, an error or a cancelled future never leaves part of a batch
//! behind.

use std::fmt;
use std::future::Future;

use thiserror::Error;
use uuid::Uuid;

use crate::models::{NewPurchase, NewTicket, Purchase, Ticket, TicketStatus};

pub mod memory;
pub mod postgres;

pub use memory::MemoryTicketStore;
pub use postgres::PgTicketStore;

/// Which unique column a rejected insert collided on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Uuid,
    DisplayCode,
}

impl fmt::Display for UniqueField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniqueField::Uuid => f.write_str("uuid"),
            UniqueField::DisplayCode => f.write_str("display_code"),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate ticket {0}")]
    Duplicate(UniqueField),

    #[error("ticket {0} not found")]
    NotFound(Uuid),

    #[error("ticket cannot move from {from} to {to}")]
    InvalidTransition { from: TicketStatus, to: TicketStatus },

    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// True when the error is a uniqueness violation on a ticket identifier.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StoreError::Duplicate(_))
    }
}

/// Read access plus a way to open write transactions.
pub trait TicketStore: Clone + Send + Sync + 'static {
    type Tx: TicketTransaction;

    fn begin(&self) -> impl Future<Output = Result<Self::Tx, StoreError>> + Send;

    fn find_by_uuid(
        &self,
        uuid: Uuid,
    ) -> impl Future<Output = Result<Option<Ticket>, StoreError>> + Send;

    fn find_by_display_code(
        &self,
        code: &str,
    ) -> impl Future<Output = Result<Option<Ticket>, StoreError>> + Send;

    /// A user's tickets in creation order.
    fn list_by_user(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Vec<Ticket>, StoreError>> + Send;

    /// Marks a ticket `DELETED` and used. Deleting twice is a no-op.
    fn soft_delete(&self, id: Uuid) -> impl Future<Output = Result<Ticket, StoreError>> + Send;

    fn update_status(
        &self,
        id: Uuid,
        status: TicketStatus,
    ) -> impl Future<Output = Result<Ticket, StoreError>> + Send;
}

/// One open write scope.
pub trait TicketTransaction: Send {
    fn create_purchase(
        &mut self,
        purchase: NewPurchase,
    ) -> impl Future<Output = Result<Purchase, StoreError>> + Send;

    /// Inserts one ticket. A collision on `uuid` or `display_code` yields
    /// [`StoreError::Duplicate`] and leaves the transaction usable.
    fn insert_ticket(
        &mut self,
        ticket: NewTicket,
    ) -> impl Future<Output = Result<Ticket, StoreError>> + Send;

    fn commit(self) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn rollback(self) -> impl Future<Output = Result<(), StoreError>> + Send;
}
