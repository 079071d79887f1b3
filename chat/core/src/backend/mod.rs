//! Assistant Backend Integration
//!
//! Every network call the client makes goes through the [`ChatBackend`]
//! trait, so the turn controller can run against the real HTTP service or
//! an in-memory double.
//!
//! # Available Backends
//!
//! - **HTTP**: the assistant web service (`/query`, `/api/*`)
//!
//! # Usage
//!
//! ```ignore
//! use chat_core::backend::{ChatBackend, HttpBackend};
//!
//! let backend = HttpBackend::new("http://localhost:8000", Duration::from_secs(10))?;
//! let bytes = backend.open_stream(&request).await?;
//! ```

mod http;
mod traits;

pub use http::HttpBackend;
pub use traits::{AudioPoll, ByteStream, ChatBackend};
