//! Uploaded clip analysis.
//!
//! The upload is spooled to a temporary file, decoded frame by frame up to
//! the configured budget, and the peak count is compared to the gate's
//! threshold. Guards of the gate are alerted when it is exceeded.

use std::time::Instant;

use axum::extract::multipart::Field;
use axum::extract::{Multipart, State};
use axum::Json;
use cg_media::{count_people, CountBudget, MediaError, SourceInput};
use cg_models::{AccountId, AnalysisResponse, DispatchOutcome};
use cg_notify::Contact;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::extract::AccountScope;
use crate::metrics;
use crate::state::AppState;

pub const UNDECODABLE_UPLOAD: &str = "Uploaded video could not be decoded";

/// A clip written to disk for the decoder. Deleted on drop.
struct SpooledUpload {
    file: NamedTempFile,
    filename: Option<String>,
    bytes: u64,
}

/// Keep a short alphanumeric extension so the decoder can guess the container.
fn upload_suffix(filename: Option<&str>) -> String {
    filename
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext)
        .filter(|ext| {
            !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(|ext| format!(".{}", ext.to_lowercase()))
        .unwrap_or_default()
}

async fn spool_upload(field: &mut Field<'_>) -> ApiResult<SpooledUpload> {
    let filename = field.file_name().map(|s| s.to_string());
    let file = tempfile::Builder::new()
        .prefix("crowdguard-upload-")
        .suffix(&upload_suffix(filename.as_deref()))
        .tempfile()
        .map_err(|e| ApiError::internal(format!("failed to create upload file: {}", e)))?;

    let std_file = file
        .reopen()
        .map_err(|e| ApiError::internal(format!("failed to open upload file: {}", e)))?;
    let mut out = tokio::fs::File::from_std(std_file);
    let mut bytes = 0u64;

    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| ApiError::validation(format!("Failed to read upload: {}", e)))?
    {
        bytes += chunk.len() as u64;
        out.write_all(&chunk)
            .await
            .map_err(|e| ApiError::internal(format!("failed to spool upload: {}", e)))?;
    }
    out.flush()
        .await
        .map_err(|e| ApiError::internal(format!("failed to spool upload: {}", e)))?;

    Ok(SpooledUpload { file, filename, bytes })
}

async fn text_field(field: Field<'_>) -> ApiResult<String> {
    let name = field.name().unwrap_or("field").to_string();
    field
        .text()
        .await
        .map(|s| s.trim().to_string())
        .map_err(|e| ApiError::validation(format!("Invalid {} field: {}", name, e)))
}

/// Count people in an uploaded clip and alert the gate's guards.
///
/// Multipart fields: `file`, `gate` and `user_email` (or `X-Account-Id`).
pub async fn analyze_video(
    State(state): State<AppState>,
    scope: Option<AccountScope>,
    mut multipart: Multipart,
) -> ApiResult<Json<AnalysisResponse>> {
    let detector = state.require_detector()?;
    let sources = state.require_sources()?;

    let mut upload = None;
    let mut gate = None;
    let mut user_email = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(format!("Invalid multipart body: {}", e)))?
    {
        match field.name() {
            Some("file") => upload = Some(spool_upload(&mut field).await?),
            Some("gate") => gate = Some(text_field(field).await?),
            Some("user_email") => user_email = Some(text_field(field).await?),
            _ => {}
        }
    }

    let account: AccountId = match (scope, user_email.filter(|e| !e.is_empty())) {
        (Some(scope), _) => scope.0,
        (None, Some(email)) => AccountId::parse(&email)?,
        (None, None) => return Err(ApiError::validation("user_email is required")),
    };
    let gate = gate
        .filter(|g| !g.is_empty())
        .ok_or_else(|| ApiError::validation("gate is required"))?;
    let upload = upload.ok_or_else(|| ApiError::validation("file is required"))?;

    let started = Instant::now();
    info!(
        account = %account,
        gate = %gate,
        bytes = upload.bytes,
        filename = upload.filename.as_deref().unwrap_or("-"),
        "Analyzing uploaded clip"
    );

    let input = SourceInput::File(upload.file.path().to_path_buf());
    let mut source = match sources.open(&input).await {
        Ok(source) => source,
        Err(e @ MediaError::SourceOpenFailed { .. }) => {
            warn!(account = %account, gate = %gate, "Upload rejected: {}", e);
            metrics::record_analysis(
                "undecodable",
                "open_failed",
                0,
                started.elapsed().as_secs_f64(),
            );
            return Err(ApiError::unprocessable(UNDECODABLE_UPLOAD));
        }
        Err(e) => return Err(e.into()),
    };

    let budget = CountBudget::frames(state.config.analysis_frame_limit)
        .with_max_duration(state.config.analysis_time_budget);
    let summary = count_people(source.as_mut(), detector, budget).await;
    drop(source);
    drop(upload.file);

    let gate_override = state
        .gate_settings(&account)
        .get(&gate)
        .await?
        .map(|s| s.alert_threshold);
    let threshold = state.policy.threshold_for(gate_override);
    let (crowd_count, count_source) = state.policy.effective_count(summary.peak);
    let threshold_exceeded = crowd_count > threshold;

    let dispatch: Vec<DispatchOutcome> = if threshold_exceeded {
        let contacts: Vec<Contact> = state
            .guards(&account)
            .list_for_gate(&gate)
            .await?
            .iter()
            .map(Contact::from)
            .collect();
        if contacts.is_empty() {
            warn!(
                account = %account,
                gate = %gate,
                count = crowd_count,
                "Threshold exceeded but no guards are assigned"
            );
        }
        state.dispatcher.dispatch(crowd_count, threshold, &gate, &contacts).await
    } else {
        Vec::new()
    };

    info!(
        account = %account,
        gate = %gate,
        count = crowd_count,
        count_source = count_source.as_str(),
        frames = summary.frames_processed,
        threshold,
        alerts = dispatch.len(),
        stopped = summary.stopped.as_str(),
        "Analysis complete"
    );
    metrics::record_analysis(
        if threshold_exceeded { "alert" } else { "clear" },
        summary.stopped.as_str(),
        crowd_count,
        started.elapsed().as_secs_f64(),
    );

    Ok(Json(AnalysisResponse {
        gate,
        filename: upload.filename,
        crowd_count,
        count_source,
        frames_processed: summary.frames_processed,
        threshold,
        threshold_exceeded,
        messages_sent: dispatch.iter().map(DispatchOutcome::summary).collect(),
        dispatch,
    }))
}
