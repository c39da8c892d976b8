//! Business logic services for the back office.
//!
//! # Services
//!
//! - `auth` - Operator email and password login
//! - `change_feed` - Database change feed and debounced reloads
//! - `fiscal` - NFC-e emission and cancellation
//! - `kanban` - Board moves and their side effects
//! - `loyalty` - Expiry of idle point balances
//! - `notifications` - WhatsApp status messages

pub mod auth;
pub mod change_feed;
pub mod fiscal;
pub mod kanban;
pub mod loyalty;
pub mod notifications;

pub use auth::{AdminAuthService, AuthError};
pub use change_feed::ChangeFeed;
pub use fiscal::{FiscalError, FiscalService};
pub use kanban::{KanbanService, MoveError};
pub use notifications::{NotificationError, Notifier};
