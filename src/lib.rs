#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::unused_async)]
#![allow(clippy::redundant_closure_for_method_calls)]

//! tunnelgate library: the tunnel core plus its HTTP surface.
//!
//! - `transport`: collaborator traits for the backend byte channel
//! - `tunnel`: tunnel abstraction, per-direction stream locks, decorators
//! - `sessions`: per-principal sessions and the token registry
//! - `control`: administrative operations (status, invalidation)
//! - `protocols`: protocol descriptor catalog
//! - `audit`: file-transfer audit journal and webhook
//! - `streams`: stream interception seam
//! - `auth`: API key middleware and session tokens
//! - `config`: configuration loading
//! - `routes`: REST API route handlers

pub mod audit;
pub mod auth;
pub mod config;
pub mod control;
pub mod error;
pub mod protocols;
pub mod routes;
pub mod sessions;
pub mod state;
pub mod streams;
pub mod transport;
pub mod tunnel;
pub mod util;

// Re-export key types at crate root for convenience.
pub use auth::ApiKey;
pub use config::Config;
pub use control::{ControlPlane, SessionStatus};
pub use error::{ErrorKind, GatewayError};
pub use sessions::{Session, SessionRegistry};
pub use state::AppState;
pub use streams::StreamInterceptor;
pub use transport::Transport;
pub use tunnel::{SimpleTunnel, Tunnel};
