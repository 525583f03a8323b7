//! HTTP request handlers for all API endpoints.
//!
//! - [`process`]: Document processing and the Lambda proxy
//! - [`status`]: Liveness endpoints

pub mod process;
pub mod status;
