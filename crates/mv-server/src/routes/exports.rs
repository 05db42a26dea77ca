//! Export route handlers: create, list templates, download and dispose.

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use mv_core::{Error, ExportOptions, ExportRequest, UserId, VideoFormat, VideoId};
use mv_export::templates::find_template;
use mv_export::ExportReport;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

use crate::context::AppContext;
use crate::error::AppError;

const DOWNLOAD_CHUNK: usize = 64 * 1024;

/// Per-field overrides applied on top of the template (or the defaults).
#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct ExportOptionsBody {
    pub include_cuesheet: Option<bool>,
    pub include_metadata: Option<bool>,
    pub include_artwork: Option<bool>,
    /// One of `video_only`, `artwork_only`, `both`.
    #[schema(value_type = Option<String>)]
    pub video_format: Option<VideoFormat>,
}

/// Request body for creating an export.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateExportRequest {
    pub name: String,
    pub video_ids: Vec<i64>,
    /// Preset id from `GET /api/exports/templates`.
    pub template: Option<String>,
    #[serde(default)]
    pub options: ExportOptionsBody,
    pub bpm: Option<f64>,
    pub key: Option<String>,
    pub genre: Option<String>,
    pub notes: Option<String>,
}

impl CreateExportRequest {
    /// Merge template and overrides into an engine request.
    pub fn into_request(self) -> mv_core::Result<ExportRequest> {
        let mut options = match self.template.as_deref() {
            Some(id) => find_template(id)
                .ok_or_else(|| Error::Validation(format!("unknown template: {id}")))?
                .options(),
            None => ExportOptions::default(),
        };

        let o = self.options;
        if let Some(v) = o.include_cuesheet {
            options.include_cuesheet = v;
        }
        if let Some(v) = o.include_metadata {
            options.include_metadata = v;
        }
        if let Some(v) = o.include_artwork {
            options.include_artwork = v;
        }
        if let Some(format) = o.video_format {
            options.video_format = format;
        }

        Ok(ExportRequest {
            name: self.name,
            video_ids: self.video_ids.into_iter().map(VideoId).collect(),
            options,
            bpm: self.bpm,
            key: self.key,
            genre: self.genre,
            notes: self.notes,
        })
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct TrackResponse {
    pub index: usize,
    pub video_id: i64,
    pub title: String,
    pub start_time: f64,
    pub end_time: f64,
    pub file_name: String,
}

/// Response for a finished export.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ExportResponse {
    pub export_id: String,
    pub file_name: String,
    pub download_path: String,
    pub size_bytes: u64,
    pub total_duration: f64,
    pub credits_charged: u32,
    pub downloads_remaining: u32,
    pub tracks: Vec<TrackResponse>,
    pub excluded_video_ids: Vec<i64>,
}

impl ExportResponse {
    fn from_report(report: &ExportReport) -> Self {
        Self {
            export_id: report.export_id.to_string(),
            file_name: report.artifact.file_name.clone(),
            download_path: report.artifact.download_path.clone(),
            size_bytes: report.artifact.size_bytes,
            total_duration: report.total_duration_secs,
            credits_charged: report.credits_charged,
            downloads_remaining: report.downloads_remaining,
            tracks: report
                .included
                .iter()
                .map(|e| TrackResponse {
                    index: e.index,
                    video_id: e.video_id.0,
                    title: e.title.clone(),
                    start_time: e.start_time_secs,
                    end_time: e.end_time_secs,
                    file_name: e.file_name.clone(),
                })
                .collect(),
            excluded_video_ids: report.excluded.iter().map(|id| id.0).collect(),
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct TemplateResponse {
    pub id: String,
    pub name: String,
    pub description: String,
    pub include_cuesheet: bool,
    pub include_metadata: bool,
    pub include_artwork: bool,
    pub format: String,
}

/// POST /api/exports
///
/// The job runs on its own task so it always reaches its cleanup path; a
/// client disconnect drops the guard and cancels it.
#[utoipa::path(
    post,
    path = "/api/exports",
    request_body = CreateExportRequest,
    responses(
        (status = 201, description = "Export created", body = ExportResponse),
        (status = 400, description = "Invalid request"),
        (status = 402, description = "Membership required or insufficient credits"),
        (status = 422, description = "No accessible videos")
    )
)]
pub async fn create_export(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
    payload: Result<Json<CreateExportRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(payload) = payload.map_err(|e| Error::Validation(e.body_text()))?;
    let request = payload.into_request()?;

    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let engine = ctx.engine.clone();
    let job = tokio::spawn(async move { engine.create_export(request, user_id, cancel).await });
    let report = job
        .await
        .map_err(|e| Error::Internal(format!("export task failed: {e}")))??;

    Ok((StatusCode::CREATED, Json(ExportResponse::from_report(&report))))
}

/// GET /api/exports/templates
#[utoipa::path(
    get,
    path = "/api/exports/templates",
    responses((status = 200, description = "Export presets", body = Vec<TemplateResponse>))
)]
pub async fn list_templates(State(ctx): State<AppContext>) -> Json<Vec<TemplateResponse>> {
    let templates = ctx
        .engine
        .list_templates()
        .iter()
        .map(|t| TemplateResponse {
            id: t.id.to_string(),
            name: t.name.to_string(),
            description: t.description.to_string(),
            include_cuesheet: t.include_cuesheet,
            include_metadata: t.include_metadata,
            include_artwork: t.include_artwork,
            format: t.format.as_str().to_string(),
        })
        .collect();
    Json(templates)
}

/// Parse a `Range: bytes=START-END` header value.
pub fn parse_range_header(value: &str) -> Option<(u64, Option<u64>)> {
    let ranges = value.strip_prefix("bytes=")?;
    let mut parts = ranges.splitn(2, '-');
    let start: u64 = parts.next()?.trim().parse().ok()?;
    let end_str = parts.next()?.trim();
    let end = if end_str.is_empty() {
        None
    } else {
        Some(end_str.parse().ok()?)
    };
    Some((start, end))
}

/// GET /api/exports/{file_name}
///
/// Streams the archive; supports single byte ranges so interrupted
/// downloads can resume.
#[utoipa::path(
    get,
    path = "/api/exports/{file_name}",
    params(("file_name" = String, Path, description = "Artifact file name")),
    responses(
        (status = 200, description = "Zip archive (application/zip)"),
        (status = 206, description = "Partial content"),
        (status = 404, description = "Artifact not found")
    )
)]
pub async fn download_export(
    State(ctx): State<AppContext>,
    Path(file_name): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let (mut file, size) = ctx.engine.open_download(&file_name).await?;
    let disposition = format!("attachment; filename=\"{file_name}\"");

    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_range_header);

    let Some((start, end)) = range else {
        let body = Body::from_stream(ReaderStream::with_capacity(file, DOWNLOAD_CHUNK));
        return Ok((
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "application/zip".to_string()),
                (header::CONTENT_LENGTH, size.to_string()),
                (header::CONTENT_DISPOSITION, disposition),
                (header::ACCEPT_RANGES, "bytes".to_string()),
            ],
            body,
        )
            .into_response());
    };

    let last = size.saturating_sub(1);
    let end = end.unwrap_or(last).min(last);
    if size == 0 || start > end {
        return Ok((
            StatusCode::RANGE_NOT_SATISFIABLE,
            [(header::CONTENT_RANGE, format!("bytes */{size}"))],
            Body::empty(),
        )
            .into_response());
    }

    file.seek(std::io::SeekFrom::Start(start))
        .await
        .map_err(|e| Error::Internal(format!("seek failed: {e}")))?;
    let length = end - start + 1;
    let body = Body::from_stream(ReaderStream::with_capacity(file.take(length), DOWNLOAD_CHUNK));

    Ok((
        StatusCode::PARTIAL_CONTENT,
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_RANGE, format!("bytes {start}-{end}/{size}")),
            (header::CONTENT_LENGTH, length.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
            (header::ACCEPT_RANGES, "bytes".to_string()),
        ],
        body,
    )
        .into_response())
}

/// DELETE /api/exports/{file_name}
#[utoipa::path(
    delete,
    path = "/api/exports/{file_name}",
    params(("file_name" = String, Path, description = "Artifact file name")),
    responses(
        (status = 204, description = "Artifact removed (or already gone)"),
        (status = 400, description = "Invalid artifact name")
    )
)]
pub async fn delete_export(
    State(ctx): State<AppContext>,
    Path(file_name): Path<String>,
) -> Result<StatusCode, AppError> {
    ctx.engine.dispose(&file_name).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(template: Option<&str>, options: ExportOptionsBody) -> CreateExportRequest {
        CreateExportRequest {
            name: "Set".into(),
            video_ids: vec![1, 2],
            template: template.map(String::from),
            options,
            bpm: None,
            key: None,
            genre: None,
            notes: None,
        }
    }

    #[test]
    fn defaults_without_template() {
        let req = body(None, ExportOptionsBody::default()).into_request().unwrap();
        assert_eq!(req.options, ExportOptions::default());
        assert_eq!(req.video_ids, vec![VideoId(1), VideoId(2)]);
    }

    #[test]
    fn template_then_overrides() {
        let req = body(
            Some("video-only"),
            ExportOptionsBody {
                include_metadata: Some(true),
                ..Default::default()
            },
        )
        .into_request()
        .unwrap();
        assert_eq!(req.options.video_format, VideoFormat::VideoOnly);
        assert!(req.options.include_metadata);
        assert!(!req.options.include_artwork);
    }

    #[test]
    fn unknown_template_is_rejected() {
        let err = body(Some("nope"), ExportOptionsBody::default())
            .into_request()
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn video_format_uses_snake_case_names() {
        let req: CreateExportRequest = serde_json::from_value(serde_json::json!({
            "name": "Set",
            "video_ids": [1],
            "options": {"video_format": "artwork_only"}
        }))
        .unwrap();
        assert_eq!(
            req.into_request().unwrap().options.video_format,
            VideoFormat::ArtworkOnly
        );

        let bad = serde_json::from_value::<CreateExportRequest>(serde_json::json!({
            "name": "Set",
            "video_ids": [1],
            "options": {"video_format": "audio"}
        }));
        assert!(bad.is_err());
    }

    #[test]
    fn range_parsing() {
        assert_eq!(parse_range_header("bytes=0-99"), Some((0, Some(99))));
        assert_eq!(parse_range_header("bytes=100-"), Some((100, None)));
        assert_eq!(parse_range_header("items=0-1"), None);
        assert_eq!(parse_range_header("bytes=x-1"), None);
    }
}
