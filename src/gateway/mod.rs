//! Query execution gateway.
//!
//! # Module Structure
//!
//! - `queries`: named query catalog with parameter validation
//! - `executor`: the gateway itself (validation, submission, polling,
//!   result access)
//! - `routes`: axum HTTP surface

pub mod executor;
pub mod queries;
pub mod routes;

pub use executor::{DailyCount, GatewayOptions, QueryGateway, RunOutcome, StatsSummary};
pub use queries::{NamedQuery, QueryNames};
pub use routes::{build_router, serve, AppState};
