use std::path::{Path, PathBuf};

use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use thiserror::Error;
use tower::ServiceExt;

use crate::{AppState, create_router};

/// Public pages rendered at build time. Everything else depends on the visitor's session.
pub const EXPORTED_PAGES: &[&str] = &["/", "/browse", "/terms", "/privacy", "/login", "/signup"];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("{path} rendered with status {status}")]
    Render { path: String, status: StatusCode },
    #[error("invalid export request: {0}")]
    Request(#[from] axum::http::Error),
    #[error("failed to read rendered page: {0}")]
    Body(#[from] axum::Error),
    #[error("failed to write export: {0}")]
    Io(#[from] std::io::Error),
}

/// `/` → `index.html`, `/browse` → `browse.html`.
pub fn export_file_name(path: &str) -> String {
    match path.trim_matches('/') {
        "" => "index.html".to_string(),
        name => format!("{}.html", name.replace('/', "_")),
    }
}

/// export_pages
///
/// Renders `EXPORTED_PAGES` through the full gated router as an anonymous visitor and
/// writes each to `out_dir`. No listener is bound.
pub async fn export_pages(state: AppState, out_dir: &Path) -> Result<Vec<PathBuf>, ExportError> {
    tokio::fs::create_dir_all(out_dir).await?;

    let mut written = Vec::with_capacity(EXPORTED_PAGES.len());
    for &path in EXPORTED_PAGES {
        let request = Request::builder().uri(path).body(Body::empty())?;
        let response = match create_router(state.clone()).oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        };

        let status = response.status();
        if status != StatusCode::OK {
            return Err(ExportError::Render {
                path: path.to_string(),
                status,
            });
        }

        let html = to_bytes(response.into_body(), usize::MAX).await?;
        let file = out_dir.join(export_file_name(path));
        tokio::fs::write(&file, &html).await?;
        tracing::info!(%path, file = %file.display(), "exported page");
        written.push(file);
    }

    Ok(written)
}
