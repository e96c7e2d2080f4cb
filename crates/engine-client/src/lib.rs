//! Client for an external UCI search engine.
//!
//! [`EngineClient`] owns the engine process. Consumers talk to it through the
//! [`SearchEngine`] trait and read results from an [`EngineSubscription`],
//! which only ever yields output for the most recently submitted request.

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod types;

pub use client::{EngineClient, EngineSubscription, SearchEngine};
pub use config::EngineConfig;
pub use error::EngineError;
pub use types::{
    EngineEvent, EngineEventKind, EngineLine, GoMode, RequestId, Score, SearchParams, NO_REQUEST,
};
