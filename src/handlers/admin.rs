use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::models::{PublicTicket, Purchase, TicketStatus};
use crate::state::AppState;
use crate::store::TicketStore;
use crate::tickets::IssueRequest;
use crate::utils::error::AppError;
use crate::utils::identity::AdminUser;
use crate::utils::response::{created, success};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueTicketsBody {
    pub user_id: String,
    pub quantity: i64,
    pub purchase_id: Option<Uuid>,
    pub raffle_id: Option<Uuid>,
    pub status: Option<TicketStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignTicketsBody {
    pub user_id: String,
    pub quantity: i64,
    pub raffle_id: Option<Uuid>,
    pub status: Option<TicketStatus>,
}

#[derive(Serialize)]
pub struct AssignedTickets {
    pub purchase: Purchase,
    pub tickets: Vec<PublicTicket>,
}

fn quantity(raw: i64) -> Result<u32, AppError> {
    u32::try_from(raw)
        .map_err(|_| AppError::ValidationError(format!("quantity {raw} is out of range")))
}

/// `POST /api/admin/tickets/issue`
pub async fn issue_tickets<S: TicketStore>(
    State(state): State<AppState<S>>,
    AdminUser(admin): AdminUser,
    Json(body): Json<IssueTicketsBody>,
) -> Result<Response, AppError> {
    let mut request = IssueRequest::new(body.user_id, quantity(body.quantity)?)
        .status(body.status.unwrap_or_default());
    if let Some(purchase_id) = body.purchase_id {
        request = request.purchase(purchase_id);
    }
    if let Some(raffle_id) = body.raffle_id {
        request = request.raffle(raffle_id);
    }

    let tickets: Vec<PublicTicket> = state
        .issuer
        .issue(request)
        .await?
        .iter()
        .map(|ticket| ticket.to_public())
        .collect();

    info!(admin = %admin.user_id, count = tickets.len(), "Admin issued tickets");
    Ok(created(tickets, "Tickets issued").into_response())
}

/// `POST /api/admin/tickets/assign`
pub async fn assign_tickets<S: TicketStore>(
    State(state): State<AppState<S>>,
    AdminUser(admin): AdminUser,
    Json(body): Json<AssignTicketsBody>,
) -> Result<Response, AppError> {
    let issued = state
        .issuer
        .assign(
            body.user_id,
            quantity(body.quantity)?,
            body.raffle_id,
            body.status.unwrap_or_default(),
        )
        .await?;

    info!(
        admin = %admin.user_id,
        purchase_id = %issued.purchase.id,
        count = issued.tickets.len(),
        "Admin assigned tickets"
    );

    let payload = AssignedTickets {
        tickets: issued.tickets.iter().map(|t| t.to_public()).collect(),
        purchase: issued.purchase,
    };
    Ok(created(payload, "Tickets assigned").into_response())
}

/// `DELETE /api/admin/tickets/:id`
pub async fn delete_ticket<S: TicketStore>(
    State(state): State<AppState<S>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let ticket = state.store.soft_delete(id).await?;

    info!(admin = %admin.user_id, ticket_id = %id, "Ticket soft-deleted");
    Ok(success(ticket.to_public(), "Ticket deleted").into_response())
}
