//! Tracker engine: catalog IO, durable state and the poll/retrieval loops.
mod catalog;
mod filename;
mod handles;
mod http_client;
mod persist;
mod retrieval;
mod state_file;
mod tracker;
mod types;

pub use catalog::{
    AuxiliaryPayload, CatalogClient, Credentials, Delivery, PayloadStream, Session,
};
pub use filename::{auxiliary_artifact_name, primary_artifact_name};
pub use handles::{load_handles, HandlesError};
pub use http_client::{CatalogSettings, HttpCatalogClient};
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError};
pub use retrieval::{NoopSink, RetrievalQueue, RetrievalSettings, RetrievalSink};
pub use state_file::{StateFile, StateFileError};
pub use tracker::{Clock, CycleSummary, Tracker, TrackerError, TrackerSettings};
pub use types::{CatalogError, FailureKind, RetrievalEvent, RetrievalOutcome};
