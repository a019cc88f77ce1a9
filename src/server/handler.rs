//! Static-file response builder.
//!
//! Maps a parsed request to a response per the serving rules: `GET` and
//! `HEAD` on validated targets under the document root, everything else a
//! `400`/`404`/`500` page. Never fails: every outcome, including I/O
//! errors, becomes a response, so a bad request can never take down its
//! session.

use std::io;
use std::path::Path;

use tokio::fs::File;

use crate::http::request::{Method, Request};
use crate::http::response::{Response, Status};
use crate::mime;

/// Builds the response for `req` from files under `doc_root`.
///
/// The filesystem path is the raw concatenation of `doc_root` and the
/// request target; a target ending in `/` gets `fallback_file` appended.
/// Targets containing `..` anywhere are rejected, which also rejects
/// legitimate names like `file..txt`; a known limitation of the
/// substring check, kept as-is.
pub async fn build_response(req: &Request, doc_root: &Path, fallback_file: &str) -> Response {
    let keep_alive = req.keep_alive();

    if !matches!(req.method, Method::Get | Method::Head) {
        return Response::text(Status::BadRequest, "Unknown HTTP-method", keep_alive);
    }

    if req.target.is_empty() || !req.target.starts_with('/') || req.target.contains("..") {
        return Response::text(Status::BadRequest, "Illegal request-target", keep_alive);
    }

    let base = doc_root.to_string_lossy();
    let mut path = format!("{}{}", base.trim_end_matches('/'), req.target);
    if req.target.ends_with('/') {
        path.push_str(fallback_file);
    }

    let file = match File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Response::text(
                Status::NotFound,
                format!("The resource \"{}\" was not found.", req.target),
                keep_alive,
            );
        }
        Err(e) => {
            return Response::text(
                Status::InternalServerError,
                format!("An error occurred: \"{}\"", e),
                keep_alive,
            );
        }
    };

    let len = match file.metadata().await {
        Ok(metadata) => metadata.len(),
        Err(e) => {
            return Response::text(
                Status::InternalServerError,
                format!("An error occurred: \"{}\"", e),
                keep_alive,
            );
        }
    };

    let content_type = mime::for_path(Path::new(&path));
    match req.method {
        Method::Head => Response::empty(len, content_type, keep_alive),
        _ => Response::file(file, len, content_type, keep_alive),
    }
}
