//! stocksense-core library.
//!
//! The inventory view-model for StockSense: a read-through cache over a live,
//! server-pushed document feed, with client-side sort/filter/selection and
//! bulk mutation orchestration layered on top.
//!
//! # Conventions
//!
//! - **Errors**: Use `thiserror` enums that map onto [`error::ErrorCode`];
//!   `anyhow::Result` only at the edges (config loading).
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).
//! - **Asynchrony**: Collaborators never call back into the view-model. The
//!   host delivers feed events and mutation outcomes explicitly.

pub mod backend;
pub mod bulk;
pub mod categories;
pub mod config;
pub mod error;
pub mod export;
pub mod feed;
pub mod memory;
pub mod model;
pub mod normalize;
pub mod selection;
pub mod session;
pub mod subscription;
pub mod summary;
pub mod view;
pub mod viewmodel;

pub use viewmodel::{DeleteConfirmation, Dispatch, InventoryViewModel};
