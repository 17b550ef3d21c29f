#[cfg(feature = "detect-http")]
pub mod http;
pub mod synthetic;

#[cfg(feature = "detect-http")]
pub use http::{HttpBackend, HttpBackendConfig};
pub use synthetic::SyntheticBackend;
