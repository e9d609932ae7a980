//! Mergegate Tickets - Ticket Automation Subsystem
//!
//! Resolves the change author to a ticketing account through a prioritized
//! lookup chain, composes ticket content from an aggregated report, and
//! files exactly one ticket per blocked workflow instance:
//!
//! - `IdentityResolver` — cached, fallback-chained account resolution
//! - `TicketFiler` — idempotent creation with best-effort enrichment
//! - `compose` — deterministic summary/body rendering

pub mod compose;
mod error;
mod filing;
mod resolver;

pub use compose::{ticket_body, ticket_reference_comment, ticket_summary};
pub use error::{TicketError, TicketResult};
pub use filing::{DeferredAction, FilingOutcome, TicketConfig, TicketFiler, TicketFiling};
pub use resolver::{IdentityResolver, Resolution, ResolveOutcome, ResolverConfig};
