//! Dot Traffic
//!
//! Routing service for an agency's inbound email and Teams messages. Each
//! message is classified into a work-type route (new job, update to an
//! existing job, status request, feedback, ...), reconciled against the
//! project table and recorded in a traffic log. Replies to an open
//! clarification on the same conversation close it.
//!
//! The same project table backs per-client WIP reports ([`wip`]).
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use dot_traffic::routing::TrafficRouter;
//! use dot_traffic::store::{AirtableConfig, AirtableStore};
//! use dot_traffic::llm::{AnthropicConfig, AnthropicProvider};
//! use dot_traffic::{InboundMessage, TrafficConfig};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TrafficConfig::load_from_file(Path::new("traffic.toml"))?;
//! let store = AirtableStore::new(AirtableConfig {
//!     api_key: config.get_store_api_key()?,
//!     base_id: config.store.base_id.clone(),
//!     ..Default::default()
//! })?;
//! let provider = AnthropicProvider::new(AnthropicConfig {
//!     api_key: config.get_llm_api_key()?,
//!     ..Default::default()
//! })?;
//!
//! let router = TrafficRouter::new(&config, Arc::new(store), Arc::new(provider))?;
//! let decision = router
//!     .route(&InboundMessage {
//!         email_content: "Round 2 feedback on TOW 023 attached".to_string(),
//!         sender_email: "jo@tower.co.nz".to_string(),
//!         ..Default::default()
//!     })
//!     .await?;
//! println!("{}", decision.route);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod extraction;
pub mod llm;
pub mod model;
pub mod observability;
pub mod response;
pub mod routing;
pub mod server;
pub mod store;
pub mod testing;
pub mod wip;

pub use config::{ConfigError, TrafficConfig};
pub use error::{TrafficError, TrafficResult};
pub use model::*;
pub use response::TrafficResponse;
pub use routing::TrafficRouter;
pub use wip::{WipReport, WipReporter, WipRequest};
