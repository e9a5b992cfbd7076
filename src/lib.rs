//! CircleCI API layer: paginated resource clients, bounded-concurrency
//! batching, project resolution and usage export/analysis.

pub mod analysis;
pub mod auth;
pub mod batch;
pub mod cancel;
pub mod client;
pub mod error;
pub mod resolve;
pub mod usage;

pub use auth::Token;
pub use batch::{batch_promises, BatchOptions};
pub use cancel::CancellationSignal;
pub use client::{CircleCiClients, ClientConfig, PrivateClients};
pub use error::{CciError, Result};
