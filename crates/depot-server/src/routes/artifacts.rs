//! # Artifact Download
//!
//! `GET /artifacts/{terminal_id}/{tag}` serves one terminal's package.
//!
//! A pre-packaged `{root}/{terminal}/{tag}.zip` is served as is. Otherwise the
//! terminal's folder is carved out of the master `{root}/{tag}.zip` into a
//! temporary archive that lives exactly as long as the response body.

use std::path::Path;

use axum::Router;
use axum::body::Body;
use axum::extract::{Path as UrlPath, Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::Response;
use axum::routing::get;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use depot_core::archive::extract_subset_to_temp;
use depot_core::error::DepotError;
use depot_core::store::StoredArtifact;
use depot_core::temp::TempArtifact;
use depot_core::types::{Tag, TerminalId};

use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/artifacts/{terminal_id}/{tag}", get(get_artifact))
}

async fn get_artifact(
    State(state): State<AppState>,
    UrlPath((terminal_id, tag)): UrlPath<(String, String)>,
    request: Request,
) -> Result<Response, AppError> {
    let terminal = TerminalId::new(terminal_id)?;
    let tag = Tag::from_file_name(&tag)?;

    let store = state
        .store()
        .ok_or_else(|| AppError::NotConfigured("artifact store not configured".to_string()))?;

    let located = store.locate(&terminal, &tag).map_err(|e| match e {
        DepotError::NotFound(_) => {
            AppError::NotFound(format!("no release '{tag}' for terminal '{terminal}'"))
        }
        other => other.into(),
    })?;

    let download_name = format!("{terminal}-{tag}.zip");
    match located {
        StoredArtifact::Packaged(path) => {
            tracing::debug!(%terminal, %tag, "serving pre-packaged archive");
            serve_zip(&path, request, &download_name, None).await
        }
        StoredArtifact::Master(master) => {
            let artifact = extract_for_request(&state, master, &terminal, &tag).await?;
            let path = artifact.path().to_path_buf();
            serve_zip(&path, request, &download_name, Some(artifact)).await
        }
    }
}

/// Runs the extraction on the blocking pool.
///
/// If the request future is dropped (client went away), the drop guard
/// cancels the token and the extraction removes its partial output.
async fn extract_for_request(
    state: &AppState,
    master: std::path::PathBuf,
    terminal: &TerminalId,
    tag: &Tag,
) -> Result<TempArtifact, AppError> {
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let temp_dir = state.temp_dir().to_path_buf();
    let prefix = terminal.as_str().to_string();

    let extracted = tokio::task::spawn_blocking(move || {
        std::fs::create_dir_all(&temp_dir)
            .map_err(|e| DepotError::io(format!("create {}", temp_dir.display()), e))?;
        extract_subset_to_temp(&master, &prefix, &temp_dir, &cancel)
    })
    .await
    .map_err(|e| AppError::Internal(format!("extraction task failed: {e}")))?;
    guard.disarm();

    let (artifact, summary) = extracted.map_err(|e| match e {
        DepotError::NotFound(_) => {
            AppError::NotFound(format!("no files for terminal '{terminal}' in release '{tag}'"))
        }
        other => other.into(),
    })?;
    tracing::info!(%terminal, %tag, entries = summary.written, "extracted terminal package");
    Ok(artifact)
}

async fn serve_zip(
    path: &Path,
    request: Request,
    download_name: &str,
    keep_alive: Option<TempArtifact>,
) -> Result<Response, AppError> {
    // ServeFile reports open failures as a bare 500; classify them here first.
    if let Err(e) = tokio::fs::File::open(path).await {
        return Err(match DepotError::io(format!("open {}", path.display()), e) {
            DepotError::NotFound(_) => gone(download_name),
            other => other.into(),
        });
    }

    let mime: mime::Mime = "application/zip".parse().expect("static mime type is valid");
    let response = match ServeFile::new_with_mime(path, &mime).oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };

    let (mut parts, body) = response.into_parts();
    match parts.status {
        StatusCode::NOT_FOUND => return Err(gone(download_name)),
        status if status.is_server_error() => {
            return Err(AppError::Internal(format!(
                "serving {} failed with {status}",
                path.display()
            )));
        }
        _ => {}
    }

    let body = match keep_alive {
        // The temporary file is deleted when the body is dropped.
        Some(artifact) => Body::from_stream(Body::new(body).into_data_stream().map(move |chunk| {
            let _ = &artifact;
            chunk
        })),
        None => Body::new(body),
    };

    if parts.status.is_success() {
        let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{download_name}\""))
            .map_err(|e| AppError::Internal(format!("invalid download name: {e}")))?;
        parts.headers.insert(header::CONTENT_DISPOSITION, disposition);
    }

    Ok(Response::from_parts(parts, body))
}

fn gone(download_name: &str) -> AppError {
    AppError::NotFound(format!("{download_name} is no longer available"))
}
