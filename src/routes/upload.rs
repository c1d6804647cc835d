use axum::{
    extract::{Multipart, State},
    routing::post,
    Json, Router,
};
use chrono::Utc;
use csv::{ReaderBuilder, Trim};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::StoredDataset;
use crate::{AppState, HealthRecord, RawHealthRow, Summary};

const UNKNOWN_USER: &str = "unknown";

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/upload", post(handler))
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    status: &'static str,
    data_id: String,
    summary: Summary,
    ai_enhanced: bool,
}

async fn handler(State(state): State<AppState>, multipart: Multipart) -> Result<Json<UploadResponse>, ApiError> {
    // ---
    info!("POST /upload - Starting analysis");

    // Step 1: Read the uploaded file
    let (filename, bytes) = read_file(multipart).await?;
    debug!(?filename, bytes = bytes.len(), "POST /upload - Step 1 done");

    // Step 2: Parse rows into typed records
    let (user_id, records) = parse_csv(&bytes)?;
    debug!(%user_id, records = records.len(), "POST /upload - Step 2 done");

    // Step 3: Run the analysis pipeline
    let report = state.orchestrator.analyze(&user_id, records.clone()).await;

    // Step 4: Persist the session; storage trouble does not fail the upload
    persist(&state, &report).await;

    let data_id = Uuid::new_v4().to_string();
    let response = UploadResponse {
        status: "ok",
        data_id: data_id.clone(),
        summary: report.summary.clone(),
        ai_enhanced: report.insights.ai_powered(),
    };

    state.metrics.record_upload(Utc::now());
    state
        .store_dataset(
            data_id,
            StoredDataset {
                user_id,
                filename,
                records,
                report,
            },
        )
        .await;

    info!(data_id = %response.data_id, ai_enhanced = response.ai_enhanced, "Upload complete");
    Ok(Json(response))
}

/// First field carrying a file name, else the field named `file`.
async fn read_file(mut multipart: Multipart) -> Result<(Option<String>, Vec<u8>), ApiError> {
    // ---
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        let filename = field.file_name().map(str::to_string);
        if filename.is_none() && field.name() != Some("file") {
            continue;
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {e}")))?;
        return Ok((filename, bytes.to_vec()));
    }
    Err(ApiError::BadRequest("no file in upload".to_string()))
}

/// Parse long-format `day,metric,value[,user_id]` rows.
///
/// Rows naming an unknown metric are skipped. Any other bad row rejects the
/// whole file, as does a file with no usable rows.
pub(crate) fn parse_csv(bytes: &[u8]) -> Result<(String, Vec<HealthRecord>), ApiError> {
    // ---
    let mut reader = ReaderBuilder::new().trim(Trim::All).flexible(true).from_reader(bytes);

    let mut user_id: Option<String> = None;
    let mut records = Vec::new();
    let mut skipped = 0usize;

    for (i, row) in reader.deserialize::<RawHealthRow>().enumerate() {
        let line = i + 2;
        let raw = row.map_err(|e| ApiError::BadRequest(format!("malformed CSV at line {line}: {e}")))?;

        match raw.to_record() {
            Ok(record) => records.push(record),
            Err(e) if e.is_skippable() => {
                skipped += 1;
                continue;
            }
            Err(e) => return Err(ApiError::BadRequest(format!("line {line}: {e}"))),
        }
        if user_id.is_none() {
            user_id = raw.user_id.filter(|u| !u.is_empty());
        }
    }

    if skipped > 0 {
        warn!(skipped, "skipped rows with unknown metrics");
    }
    if records.is_empty() {
        return Err(ApiError::BadRequest("CSV contains no usable health rows".to_string()));
    }

    Ok((user_id.unwrap_or_else(|| UNKNOWN_USER.to_string()), records))
}

async fn persist(state: &AppState, report: &crate::AnalysisReport) {
    // ---
    let history_days = i64::from(state.config.history_days);
    let session_id = match state.memory.open_session(report, history_days).await {
        Ok(id) => id,
        Err(e) => {
            warn!(error = %e, "could not open session, analysis kept in memory only");
            return;
        }
    };
    if let Err(e) = state.memory.finalize(&session_id).await {
        warn!(%session_id, error = %e, "could not persist session");
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::Metric;

    #[test]
    fn test_parse_csv_long_format() {
        // ---
        let csv = "day,metric,value,user_id\n\
                   2024-01-01,steps,8500,alice\n\
                   2024-01-01, heart_rate ,72,alice\n\
                   2024-01-02,mood,5,alice\n\
                   2024-01-02,sleep,7.5,\n";
        let (user, records) = parse_csv(csv.as_bytes()).unwrap();

        assert_eq!(user, "alice");
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].metric, Metric::HeartRate);
        assert_eq!(records[2].value, 7.5);
    }

    #[test]
    fn test_parse_csv_date_alias_and_default_user() {
        // ---
        let (user, records) = parse_csv(b"date,metric,value\n2024-02-01,water,2.1\n").unwrap();
        assert_eq!(user, "unknown");
        assert_eq!(records[0].metric, Metric::Water);
    }

    #[test]
    fn test_parse_csv_rejects_bad_rows() {
        // ---
        assert!(matches!(
            parse_csv(b"day,metric,value\n2024-01-01,steps,lots\n"),
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            parse_csv(b"day,metric,value\n01/02/2024,steps,100\n"),
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            parse_csv(b"day,metric,value\n2024-01-01,mood,3\n"),
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(parse_csv(b"foo,bar\n1,2\n"), Err(ApiError::BadRequest(_))));
    }
}
