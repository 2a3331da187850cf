//! Conveyor HTTP gateway
//!
//! Accepts Dockerfile uploads and answers job status queries on top of
//! [`conveyor_pipeline::JobService`].
//!
//! # Endpoints
//!
//! - `GET /` - Service up message
//! - `GET /healthz` - Health check
//! - `POST /upload_file/` - Submit a Dockerfile (multipart field `file`)
//! - `GET /status/` - All jobs, or one with `?job_id=<id>`

#![deny(missing_docs)]

pub mod error;
pub mod router;
pub mod server;

pub use error::{Error, Result};
pub use router::{router, AppState};
pub use server::{serve, DEFAULT_LISTEN_ADDR};
