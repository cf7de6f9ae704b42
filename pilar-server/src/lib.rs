//! pilar-server: HTTP front end for the waste classifier
//!
//! Validates uploads, runs feature extraction and prediction on a bounded
//! blocking pool and maps the result onto the category table.

pub mod error;
pub mod http;
pub mod metrics;
pub mod pool;
pub mod service;
pub mod startup;

pub use error::{ErrorKind, PredictError};
pub use http::{create_router, ApiState};
pub use metrics::Metrics;
pub use pool::{InferencePool, PoolError};
pub use service::{PredictionRequest, PredictionService};
pub use startup::{bind_listener, build_state, load_catalog};
