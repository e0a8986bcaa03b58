//! In-process ticket store.
//!
//! Behaves like the PostgreSQL adapter: identifiers inserted by an open
//! transaction are reserved at once (so a concurrent batch collides with
//! them), tickets only become readable on commit, and dropping an
//! uncommitted transaction releases everything it staged.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use uuid::Uuid;

use crate::models::{NewPurchase, NewTicket, Purchase, Ticket, TicketStatus};
use crate::store::{StoreError, TicketStore, TicketTransaction, UniqueField};

#[derive(Debug, Default)]
struct Inner {
    tickets: Vec<Ticket>,
    purchases: Vec<Purchase>,
    // Committed plus reserved by open transactions.
    uuids: HashSet<Uuid>,
    display_codes: HashSet<String>,
    faults: Faults,
}

#[derive(Debug, Default)]
struct Faults {
    inserts_before_failure: Option<usize>,
    fail_reads: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryTicketStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lets the next `n` ticket inserts through, then fails every insert with
    /// [`StoreError::Unavailable`] until [`MemoryTicketStore::clear_faults`].
    pub fn fail_inserts_after(&self, n: usize) {
        self.lock().faults.inserts_before_failure = Some(n);
    }

    /// Fails every lookup with [`StoreError::Unavailable`] until
    /// [`MemoryTicketStore::clear_faults`].
    pub fn fail_reads(&self) {
        self.lock().faults.fail_reads = true;
    }

    pub fn clear_faults(&self) {
        self.lock().faults = Faults::default();
    }

    /// Committed tickets, in creation order.
    pub fn tickets(&self) -> Vec<Ticket> {
        self.lock().tickets.clone()
    }

    pub fn purchases(&self) -> Vec<Purchase> {
        self.lock().purchases.clone()
    }

    /// Overwrites a committed ticket in place, bypassing every check.
    /// Used to simulate tampering with the underlying storage.
    pub fn overwrite(&self, ticket: Ticket) -> bool {
        let mut inner = self.lock();
        match inner.tickets.iter_mut().find(|t| t.id == ticket.id) {
            Some(slot) => {
                *slot = ticket;
                true
            }
            None => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock(&self.inner)
    }

    fn read(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        let inner = self.lock();
        if inner.faults.fail_reads {
            return Err(StoreError::Unavailable("injected read failure".into()));
        }
        Ok(inner)
    }

    fn modify<F>(&self, id: Uuid, apply: F) -> Result<Ticket, StoreError>
    where
        F: FnOnce(&mut Ticket) -> Result<(), StoreError>,
    {
        let mut inner = self.lock();
        let ticket = inner
            .tickets
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(StoreError::NotFound(id))?;
        apply(ticket)?;
        Ok(ticket.clone())
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TicketStore for MemoryTicketStore {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        Ok(MemoryTransaction {
            inner: Arc::clone(&self.inner),
            staged_tickets: Vec::new(),
            staged_purchases: Vec::new(),
            finished: false,
        })
    }

    async fn find_by_uuid(&self, uuid: Uuid) -> Result<Option<Ticket>, StoreError> {
        Ok(self.read()?.tickets.iter().find(|t| t.uuid == uuid).cloned())
    }

    async fn find_by_display_code(&self, code: &str) -> Result<Option<Ticket>, StoreError> {
        Ok(self
            .read()?
            .tickets
            .iter()
            .find(|t| t.display_code == code)
            .cloned())
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Ticket>, StoreError> {
        Ok(self
            .read()?
            .tickets
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn soft_delete(&self, id: Uuid) -> Result<Ticket, StoreError> {
        self.modify(id, |ticket| {
            if ticket.status != TicketStatus::Deleted {
                ticket.status = TicketStatus::Deleted;
                ticket.is_used = true;
                ticket.updated_at = Utc::now();
            }
            Ok(())
        })
    }

    async fn update_status(&self, id: Uuid, status: TicketStatus) -> Result<Ticket, StoreError> {
        self.modify(id, |ticket| {
            if !ticket.status.can_transition_to(status) {
                return Err(StoreError::InvalidTransition {
                    from: ticket.status,
                    to: status,
                });
            }
            ticket.status = status;
            if status.is_terminal() {
                ticket.is_used = true;
            }
            ticket.updated_at = Utc::now();
            Ok(())
        })
    }
}

#[derive(Debug)]
pub struct MemoryTransaction {
    inner: Arc<Mutex<Inner>>,
    staged_tickets: Vec<Ticket>,
    staged_purchases: Vec<Purchase>,
    finished: bool,
}

impl MemoryTransaction {
    fn release(&mut self) {
        let mut inner = lock(&self.inner);
        for ticket in self.staged_tickets.drain(..) {
            inner.uuids.remove(&ticket.uuid);
            inner.display_codes.remove(&ticket.display_code);
        }
        self.staged_purchases.clear();
        self.finished = true;
    }
}

impl TicketTransaction for MemoryTransaction {
    async fn create_purchase(&mut self, purchase: NewPurchase) -> Result<Purchase, StoreError> {
        let purchase = Purchase {
            id: Uuid::new_v4(),
            user_id: purchase.user_id,
            raffle_id: purchase.raffle_id,
            total_amount: purchase.total_amount,
            ticket_count: purchase.ticket_count,
            created_at: Utc::now(),
        };
        self.staged_purchases.push(purchase.clone());
        Ok(purchase)
    }

    async fn insert_ticket(&mut self, ticket: NewTicket) -> Result<Ticket, StoreError> {
        let mut inner = lock(&self.inner);

        if let Some(remaining) = inner.faults.inserts_before_failure.as_mut() {
            if *remaining == 0 {
                return Err(StoreError::Unavailable("injected insert failure".into()));
            }
            *remaining -= 1;
        }

        let identity = ticket.identity;
        if inner.uuids.contains(&identity.uuid) {
            return Err(StoreError::Duplicate(UniqueField::Uuid));
        }
        if inner.display_codes.contains(&identity.display_code) {
            return Err(StoreError::Duplicate(UniqueField::DisplayCode));
        }
        inner.uuids.insert(identity.uuid);
        inner.display_codes.insert(identity.display_code.clone());
        drop(inner);

        let now = Utc::now();
        let stored = Ticket {
            id: Uuid::new_v4(),
            uuid: identity.uuid,
            display_code: identity.display_code,
            hash: identity.hash,
            generated_at: identity.generated_at,
            user_id: ticket.user_id,
            raffle_id: ticket.raffle_id,
            purchase_id: ticket.purchase_id,
            status: ticket.status,
            is_used: false,
            created_at: now,
            updated_at: now,
        };
        self.staged_tickets.push(stored.clone());
        Ok(stored)
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        let mut inner = lock(&self.inner);
        inner.purchases.append(&mut self.staged_purchases);
        inner.tickets.append(&mut self.staged_tickets);
        drop(inner);
        self.finished = true;
        Ok(())
    }

    async fn rollback(mut self) -> Result<(), StoreError> {
        self.release();
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if !self.finished {
            self.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TicketIdentity;

    fn new_ticket(uuid: Uuid, code: &str) -> NewTicket {
        NewTicket {
            identity: TicketIdentity {
                uuid,
                display_code: code.to_string(),
                hash: "00".repeat(32),
                generated_at: Utc::now(),
            },
            user_id: "user-1".to_string(),
            raffle_id: None,
            purchase_id: None,
            status: TicketStatus::Available,
        }
    }

    #[tokio::test]
    async fn test_commit_makes_tickets_visible() {
        let store = MemoryTicketStore::new();
        let mut tx = store.begin().await.unwrap();
        let uuid = Uuid::new_v4();
        tx.insert_ticket(new_ticket(uuid, "AAAAA-AAAAA")).await.unwrap();

        assert!(store.find_by_uuid(uuid).await.unwrap().is_none());
        tx.commit().await.unwrap();
        assert!(store.find_by_uuid(uuid).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_duplicate_fields_are_distinguished() {
        let store = MemoryTicketStore::new();
        let mut tx = store.begin().await.unwrap();
        let uuid = Uuid::new_v4();
        tx.insert_ticket(new_ticket(uuid, "AAAAA-AAAAA")).await.unwrap();

        let err = tx
            .insert_ticket(new_ticket(uuid, "BBBBB-BBBBB"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(UniqueField::Uuid)));

        let err = tx
            .insert_ticket(new_ticket(Uuid::new_v4(), "AAAAA-AAAAA"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(UniqueField::DisplayCode)));
    }

    #[tokio::test]
    async fn test_open_transaction_reserves_identifiers() {
        let store = MemoryTicketStore::new();
        let uuid = Uuid::new_v4();
        let mut first = store.begin().await.unwrap();
        first.insert_ticket(new_ticket(uuid, "AAAAA-AAAAA")).await.unwrap();

        let mut second = store.begin().await.unwrap();
        let err = second
            .insert_ticket(new_ticket(uuid, "CCCCC-CCCCC"))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn test_drop_releases_reservations() {
        let store = MemoryTicketStore::new();
        let uuid = Uuid::new_v4();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_ticket(new_ticket(uuid, "AAAAA-AAAAA")).await.unwrap();
        }

        let mut tx = store.begin().await.unwrap();
        tx.insert_ticket(new_ticket(uuid, "AAAAA-AAAAA")).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.tickets().len(), 1);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let store = MemoryTicketStore::new();
        store.fail_inserts_after(1);
        let mut tx = store.begin().await.unwrap();
        tx.insert_ticket(new_ticket(Uuid::new_v4(), "AAAAA-AAAAA"))
            .await
            .unwrap();
        let err = tx
            .insert_ticket(new_ticket(Uuid::new_v4(), "BBBBB-BBBBB"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_soft_delete_is_idempotent() {
        let store = MemoryTicketStore::new();
        let mut tx = store.begin().await.unwrap();
        let ticket = tx
            .insert_ticket(new_ticket(Uuid::new_v4(), "AAAAA-AAAAA"))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let deleted = store.soft_delete(ticket.id).await.unwrap();
        assert_eq!(deleted.status, TicketStatus::Deleted);
        assert!(deleted.is_used);
        let again = store.soft_delete(ticket.id).await.unwrap();
        assert_eq!(again.updated_at, deleted.updated_at);

        let err = store
            .update_status(ticket.id, TicketStatus::Available)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_missing_ticket_is_not_found() {
        let store = MemoryTicketStore::new();
        let err = store.soft_delete(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_read_faults_until_cleared() {
        let store = MemoryTicketStore::new();
        store.fail_reads();

        let err = store.find_by_uuid(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        let err = store.find_by_display_code("AAAAA-AAAAA").await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert!(store.list_by_user("user-1").await.is_err());

        store.clear_faults();
        assert!(store.find_by_uuid(Uuid::new_v4()).await.unwrap().is_none());
    }
}
