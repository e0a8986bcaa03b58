//! Atomic batch issuance.
//!
//! Every call opens exactly one store transaction. Each slot of the batch is
//! minted and inserted with a bounded retry on identifier collisions; any
//! other failure aborts the whole batch. The transaction is committed only
//! after the last slot succeeds and is rolled back on every other path,
//! including cancellation (by dropping it).

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::models::{NewPurchase, NewTicket, Purchase, Ticket, TicketStatus};
use crate::store::{StoreError, TicketStore, TicketTransaction};
use crate::tickets::generator::TicketGenerator;
use crate::tickets::retry::{retry_if, RetryError};

/// Insert attempts per slot before the batch is abandoned.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Service limit on the size of a single batch; callers split larger orders.
pub const MAX_TICKETS_PER_BATCH: u32 = 10_000;

#[derive(Debug, Error)]
pub enum IssueError {
    /// Malformed request: blank user, quantity outside `1..=MAX_TICKETS_PER_BATCH`
    /// or a status tickets cannot start in.
    #[error("invalid issuance request: {0}")]
    Validation(String),

    #[error("no unique ticket identity for slot {slot} after {attempts} attempts")]
    CollisionExhausted { slot: u32, attempts: u32 },

    #[error("ticket store failure: {0}")]
    Store(#[from] StoreError),
}

/// Tickets for one user, optionally tied to an existing purchase.
#[derive(Debug, Clone)]
pub struct IssueRequest {
    pub user_id: String,
    pub quantity: u32,
    pub purchase_id: Option<Uuid>,
    pub raffle_id: Option<Uuid>,
    pub status: TicketStatus,
}

impl IssueRequest {
    pub fn new(user_id: impl Into<String>, quantity: u32) -> Self {
        Self {
            user_id: user_id.into(),
            quantity,
            purchase_id: None,
            raffle_id: None,
            status: TicketStatus::default(),
        }
    }

    pub fn purchase(mut self, purchase_id: Uuid) -> Self {
        self.purchase_id = Some(purchase_id);
        self
    }

    pub fn raffle(mut self, raffle_id: Uuid) -> Self {
        self.raffle_id = Some(raffle_id);
        self
    }

    pub fn status(mut self, status: TicketStatus) -> Self {
        self.status = status;
        self
    }
}

/// A new purchase and its tickets, written together.
#[derive(Debug, Clone)]
pub struct PurchaseOrder {
    pub user_id: String,
    pub quantity: u32,
    pub raffle_id: Option<Uuid>,
    pub total_amount: Decimal,
    pub status: TicketStatus,
}

#[derive(Debug, Clone)]
pub struct IssuedPurchase {
    pub purchase: Purchase,
    pub tickets: Vec<Ticket>,
}

struct Batch<'a> {
    user_id: &'a str,
    quantity: u32,
    purchase_id: Option<Uuid>,
    raffle_id: Option<Uuid>,
    status: TicketStatus,
}

#[derive(Debug, Clone)]
pub struct IssuanceCoordinator<S> {
    store: S,
    generator: TicketGenerator,
    max_attempts: u32,
}

impl<S: TicketStore> IssuanceCoordinator<S> {
    pub fn new(store: S, generator: TicketGenerator) -> Self {
        Self {
            store,
            generator,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Issues `quantity` tickets in one transaction, in creation order.
    pub async fn issue(&self, request: IssueRequest) -> Result<Vec<Ticket>, IssueError> {
        validate(&request.user_id, request.quantity, request.status)?;

        let batch = Batch {
            user_id: &request.user_id,
            quantity: request.quantity,
            purchase_id: request.purchase_id,
            raffle_id: request.raffle_id,
            status: request.status,
        };

        let mut tx = self.store.begin().await?;
        let outcome = self.mint(&mut tx, &batch).await;
        let tickets = Self::finish(tx, outcome).await?;

        info!(
            user_id = %request.user_id,
            quantity = request.quantity,
            purchase_id = ?request.purchase_id,
            "Issued ticket batch"
        );
        Ok(tickets)
    }

    /// Creates a purchase record and its tickets atomically.
    pub async fn issue_purchase(&self, order: PurchaseOrder) -> Result<IssuedPurchase, IssueError> {
        validate(&order.user_id, order.quantity, order.status)?;
        if order.total_amount.is_sign_negative() {
            return Err(IssueError::Validation(
                "total amount cannot be negative".to_string(),
            ));
        }

        let mut tx = self.store.begin().await?;
        let outcome = async {
            let purchase = tx
                .create_purchase(NewPurchase {
                    user_id: order.user_id.clone(),
                    raffle_id: order.raffle_id,
                    total_amount: order.total_amount,
                    ticket_count: order.quantity as i32,
                })
                .await?;

            let batch = Batch {
                user_id: &order.user_id,
                quantity: order.quantity,
                purchase_id: Some(purchase.id),
                raffle_id: order.raffle_id,
                status: order.status,
            };
            let tickets = self.mint(&mut tx, &batch).await?;
            Ok::<_, IssueError>(IssuedPurchase { purchase, tickets })
        }
        .await;
        let issued = Self::finish(tx, outcome).await?;

        info!(
            user_id = %order.user_id,
            quantity = order.quantity,
            purchase_id = %issued.purchase.id,
            total_amount = %order.total_amount,
            "Issued purchase"
        );
        Ok(issued)
    }

    /// Administrative assignment: a zero-amount purchase and its tickets.
    pub async fn assign(
        &self,
        user_id: impl Into<String>,
        quantity: u32,
        raffle_id: Option<Uuid>,
        status: TicketStatus,
    ) -> Result<IssuedPurchase, IssueError> {
        self.issue_purchase(PurchaseOrder {
            user_id: user_id.into(),
            quantity,
            raffle_id,
            total_amount: Decimal::ZERO,
            status,
        })
        .await
    }

    async fn mint(&self, tx: &mut S::Tx, batch: &Batch<'_>) -> Result<Vec<Ticket>, IssueError> {
        let mut tickets = Vec::with_capacity(batch.quantity as usize);

        for slot in 1..=batch.quantity {
            let ticket = retry_if(
                self.max_attempts,
                &mut *tx,
                StoreError::is_unique_violation,
                |tx, _attempt| {
                    let candidate = NewTicket {
                        identity: self.generator.generate(batch.user_id),
                        user_id: batch.user_id.to_string(),
                        raffle_id: batch.raffle_id,
                        purchase_id: batch.purchase_id,
                        status: batch.status,
                    };
                    Box::pin(async move { tx.insert_ticket(candidate).await })
                },
            )
            .await
            .map_err(|err| match err {
                RetryError::Exhausted { attempts, last } => {
                    error!(
                        user_id = %batch.user_id,
                        slot,
                        attempts,
                        error = %last,
                        "Ticket identity collisions exhausted the retry bound"
                    );
                    IssueError::CollisionExhausted { slot, attempts }
                }
                RetryError::Fatal(err) => IssueError::Store(err),
            })?;

            tickets.push(ticket);
        }

        Ok(tickets)
    }

    async fn finish<T>(tx: S::Tx, outcome: Result<T, IssueError>) -> Result<T, IssueError> {
        match outcome {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                error!(error = %err, "Aborting ticket batch");
                if let Err(rollback_err) = tx.rollback().await {
                    error!(error = ?rollback_err, "Failed to roll back ticket batch");
                }
                Err(err)
            }
        }
    }
}

fn validate(user_id: &str, quantity: u32, status: TicketStatus) -> Result<(), IssueError> {
    if user_id.trim().is_empty() {
        return Err(IssueError::Validation("user id is required".to_string()));
    }
    if quantity == 0 {
        return Err(IssueError::Validation(
            "quantity must be at least 1".to_string(),
        ));
    }
    if quantity > MAX_TICKETS_PER_BATCH {
        return Err(IssueError::Validation(format!(
            "quantity cannot exceed the service limit of {MAX_TICKETS_PER_BATCH} tickets per batch"
        )));
    }
    // Only soft delete may put a ticket into a terminal state.
    if status.is_terminal() {
        return Err(IssueError::Validation(format!(
            "tickets cannot be issued as {status}"
        )));
    }
    Ok(())
}
