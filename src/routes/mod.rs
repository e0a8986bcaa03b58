use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, SecurityHeaders};
use crate::handlers::admin::{assign_tickets, delete_ticket, issue_tickets};
use crate::handlers::health_check;
use crate::handlers::tickets::{my_stats, my_tickets, verify_ticket};
use crate::state::AppState;
use crate::store::TicketStore;

pub fn create_routes<S: TicketStore>(state: AppState<S>) -> Router {
    build_router(state, SecurityHeaders::from_env(), create_cors_layer())
}

/// Same as [`create_routes`], with explicit header and CORS policies.
pub fn build_router<S: TicketStore>(
    state: AppState<S>,
    security: SecurityHeaders,
    cors: CorsLayer,
) -> Router {
    let tickets = Router::new()
        .route("/verify", post(verify_ticket::<S>))
        .route("/me", get(my_tickets::<S>))
        .route("/me/stats", get(my_stats::<S>));

    let admin = Router::new()
        .route("/issue", post(issue_tickets::<S>))
        .route("/assign", post(assign_tickets::<S>))
        .route("/:id", delete(delete_ticket::<S>));

    let router = Router::new()
        .route("/health", get(health_check))
        .nest("/api/tickets", tickets)
        .nest("/api/admin/tickets", admin)
        .with_state(state);

    security
        .apply(router)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
