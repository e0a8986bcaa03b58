//! Raffle ticket issuance and verification.
//!
//! Tickets carry a random UUID, a short human-readable display code and an
//! HMAC-SHA256 signature over their identity fields. Batches are issued in a
//! single store transaction, so a purchase either receives all of its tickets
//! or none of them. Verification recomputes the signature from stored fields
//! and reports `NOT_FOUND` or `TAMPERED` on failure.
//!
//! # Layout
//! - [`tickets`]: signing, generation, issuance, verification and stats
//! - [`store`]: the [`store::TicketStore`] contract with PostgreSQL and
//!   in-memory implementations
//! - [`routes`] / [`handlers`]: the axum HTTP surface
//! - [`config`]: environment configuration, CORS and security headers

pub mod config;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod state;
pub mod store;
pub mod tickets;
pub mod utils;
