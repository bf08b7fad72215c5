//! Fan one prompt out to several chat models, stream every answer into its
//! own slot, synthesize a combined answer, or let two models talk to each
//! other. `routes` holds the credential-forwarding relay server.

pub mod catalog;
pub mod config;
pub mod dialogue;
pub mod errors;
pub mod models;
pub mod routes;
pub mod service;
pub mod stream;

#[cfg(test)]
mod testing;

pub use catalog::ModelCatalog;
pub use config::RelayConfig;
pub use dialogue::{DialogueEngine, DialogueSnapshot};
pub use errors::AppError;
pub use service::{FanOutOrchestrator, PanelBoard, SynthesisRequester};
pub use stream::{ChatTransport, RelayTransport, StreamEvent, StreamOutcome};
