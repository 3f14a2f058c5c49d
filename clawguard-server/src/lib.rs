//! # ClawGuard Server
//!
//! The HTTP proxy engine of the clawguard security gateway. Terminates
//! inbound HTTP from the untrusted agent, authenticates it with the
//! shared agent key, resolves the target service by path prefix or
//! Host header, runs the security guard and the approval round trip,
//! injects the real upstream credential, forwards, and streams the
//! response back while recording the outcome in the audit store.
//!
//! ```rust,ignore
//! let state = AppState::new(table, coordinator, audit, settings)?;
//! let app = build_router(state);
//! axum::serve(
//!     listener,
//!     app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
//! )
//! .await?;
//! ```

mod capture;
mod error;
mod introspect;
mod proxy;
mod router;
mod routing;
mod state;

pub use capture::truncate_payload;
pub use error::GatewayHttpError;
pub use router::build_router;
pub use state::{
    AppState, GatewaySettings, AGENT_KEY_HEADER, LEGACY_AGENT_KEY_HEADER,
};
