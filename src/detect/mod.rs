mod backend;
pub mod backends;
mod client;
mod filter;
mod registry;
mod result;

pub use backend::DetectorBackend;
pub use backends::SyntheticBackend;
#[cfg(feature = "detect-http")]
pub use backends::{HttpBackend, HttpBackendConfig};
pub use client::{Completion, DetectionClient};
pub use filter::filter_by_confidence;
pub use registry::BackendRegistry;
pub use result::{BoundingBox, Detection};
