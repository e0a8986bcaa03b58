use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{error, info};

use crate::models::PublicTicket;
use crate::state::AppState;
use crate::store::TicketStore;
use crate::tickets::{TicketStats, VerifyFailure, VerifyQuery};
use crate::utils::error::AppError;
use crate::utils::identity::AuthenticatedUser;
use crate::utils::response::{success, verify_result};

/// `POST /api/tickets/verify`. Public; answers `{ok, error}`.
pub async fn verify_ticket<S: TicketStore>(
    State(state): State<AppState<S>>,
    body: Option<Json<VerifyQuery>>,
) -> Response {
    let query = body.map(|Json(query)| query).unwrap_or_default();

    match state.verifier.verify(&query).await {
        Ok(outcome) => match outcome.error {
            None => verify_result(StatusCode::OK, true, None),
            Some(failure) => {
                info!(outcome = failure.code(), "Ticket verification rejected");
                let status = match failure {
                    VerifyFailure::MissingKey => StatusCode::BAD_REQUEST,
                    VerifyFailure::NotFound | VerifyFailure::Tampered => StatusCode::OK,
                };
                verify_result(status, false, Some(failure.code()))
            }
        },
        Err(e) => {
            error!(error = ?e, "Ticket verification failed");
            verify_result(
                StatusCode::INTERNAL_SERVER_ERROR,
                false,
                Some("INTERNAL_ERROR"),
            )
        }
    }
}

/// `GET /api/tickets/me`
pub async fn my_tickets<S: TicketStore>(
    State(state): State<AppState<S>>,
    user: AuthenticatedUser,
) -> Result<Response, AppError> {
    let tickets: Vec<PublicTicket> = state
        .store
        .list_by_user(&user.user_id)
        .await?
        .iter()
        .map(|ticket| ticket.to_public())
        .collect();

    Ok(success(tickets, "Tickets retrieved").into_response())
}

/// `GET /api/tickets/me/stats`
pub async fn my_stats<S: TicketStore>(
    State(state): State<AppState<S>>,
    user: AuthenticatedUser,
) -> Result<Response, AppError> {
    let tickets = state.store.list_by_user(&user.user_id).await?;
    let stats = TicketStats::from_tickets(&tickets);

    Ok(success(stats, "Ticket stats retrieved").into_response())
}
