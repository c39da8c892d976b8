//! HTTP middleware stack for the back office.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layers (capture errors, transaction per request)
//! 2. `TraceLayer` (request spans)
//! 3. Session layer (tower-sessions, `admin.session` table)
//! 4. Security headers (no caching, no indexing)
//!
//! Authentication is enforced per handler through the extractors in `auth`.

pub mod auth;
pub mod security_headers;
pub mod session;

pub use auth::{
    OptionalAdminAuth, RequireAdminAuth, RequireManager, clear_current_admin, set_current_admin,
};
pub use security_headers::security_headers_middleware;
pub use session::create_session_layer;
