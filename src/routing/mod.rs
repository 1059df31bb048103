//! Message routing
//!
//! [`engine::TrafficRouter`] drives the per-message state machine. The
//! classifier gateway, reply interpreter and reconciliation table are
//! kept in their own modules so each can be tested without the others.

pub mod classifier;
pub mod engine;
pub mod reconcile;
pub mod replies;
pub mod schema;

pub use classifier::{ClassificationContext, ClassifierGateway};
pub use engine::TrafficRouter;
pub use reconcile::{ExtractedJob, Reconciliation};
pub use replies::{ReplyIntent, ReplyInterpreter};
pub use schema::RoutingSuggestion;
