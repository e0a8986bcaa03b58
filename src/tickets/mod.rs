//! Ticket minting, batch issuance and verification.

pub mod generator;
pub mod issuance;
pub mod retry;
pub mod signing;
pub mod stats;
pub mod verification;

pub use generator::{IdentitySource, OsEntropy, TicketGenerator};
pub use issuance::{IssuanceCoordinator, IssueError, IssueRequest, IssuedPurchase, PurchaseOrder};
pub use signing::TicketSigner;
pub use stats::TicketStats;
pub use verification::{Verification, VerificationService, VerifyFailure, VerifyQuery};
