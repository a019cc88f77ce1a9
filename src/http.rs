//! Minimal HTTP/1.1 surface for the static file server.
//!
//! This module covers exactly what the serving path needs: an incremental
//! request-head parser driven from a read buffer, and a response value with
//! a tagged body that knows how to write itself to a stream.
//!
//! ## Terminology
//!
//! - **Request**: parsed request line plus header fields (bodies are
//!   drained by the session, never materialized)
//! - **Response**: status, framing headers and one of three body shapes
//!   (empty, text, file)

pub mod error;
pub mod request;
pub mod response;

pub use error::ParseError;
pub use request::{Method, Request, Version};
pub use response::{Body, Response, Status};
