//! HTTP request handlers.

use axum::extract::State;
use axum::response::Json;
use chrono::Utc;
use utoipa::OpenApi;

use upwatch_core::aggregate::summarize;
use upwatch_core::api::{LogsResponse, StatusResponse, SummaryResponse, TimezoneInfo};

use crate::background::load_view;
use crate::openapi::ApiDoc;
use crate::state::AppState;

// ============================================================
// Liveness
// ============================================================

#[utoipa::path(
    get,
    path = "/api/status",
    responses(
        (status = 200, description = "Self-check target for the monitor", body = StatusResponse)
    )
)]
pub(crate) async fn handle_status() -> Json<StatusResponse> {
    Json(StatusResponse::ok(Utc::now()))
}

#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = String)
    )
)]
pub(crate) async fn handle_health() -> &'static str {
    "ok"
}

// ============================================================
// Timezone
// ============================================================

#[utoipa::path(
    get,
    path = "/api/timezone",
    responses(
        (status = 200, description = "Effective zone and today's local date", body = TimezoneInfo)
    )
)]
pub(crate) async fn handle_timezone(State(state): AppState) -> Json<TimezoneInfo> {
    let zone = state.zone();
    Json(TimezoneInfo {
        timezone: zone.name().to_string(),
        formatted_date: zone.today(),
    })
}

// ============================================================
// Logs
// ============================================================

#[utoipa::path(
    get,
    path = "/api/logs",
    responses(
        (status = 200, description = "Records of the recent days grouped by local date", body = LogsResponse)
    )
)]
pub(crate) async fn handle_logs(State(state): AppState) -> Json<LogsResponse> {
    let view = load_view(&state).await;
    Json(LogsResponse::new(state.zone().name(), &view))
}

#[utoipa::path(
    get,
    path = "/api/summary",
    responses(
        (status = 200, description = "Per-day uptime figures, newest first", body = SummaryResponse)
    )
)]
pub(crate) async fn handle_summary(State(state): AppState) -> Json<SummaryResponse> {
    let view = load_view(&state).await;
    let zone = state.zone();
    Json(SummaryResponse {
        timezone: zone.name().to_string(),
        today: zone.today(),
        days: summarize(&view, zone),
    })
}

pub(crate) async fn handle_openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use axum::Router;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use serde_json::Value;
    use tempfile::tempdir;
    use tower::ServiceExt;

    use upwatch_core::storage::{LogRecord, LogStore, ProbeResult};
    use upwatch_core::timezone::ZoneResolver;

    use crate::build_router;
    use crate::state::WebAppInner;

    fn record(t: DateTime<Utc>, success: bool, latency_ms: u64) -> LogRecord {
        LogRecord::new(
            t,
            "Asia/Kuala_Lumpur",
            ProbeResult {
                instant: t,
                success,
                latency_ms,
                status_code: Some(if success { 200 } else { 503 }),
            },
        )
    }

    fn app(dir: &Path, zone: ZoneResolver) -> (Router, Arc<LogStore>) {
        let store = Arc::new(LogStore::open(dir, zone).unwrap());
        let state = Arc::new(WebAppInner {
            store: store.clone(),
            days: 7,
        });
        (build_router(state, None), store)
    }

    async fn get_json(app: Router, uri: &str) -> Value {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let dir = tempdir().unwrap();
        let (app, _) = app(dir.path(), ZoneResolver::utc());
        let body = get_json(app, "/api/status").await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["responseTimeMs"], 0);
        assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let dir = tempdir().unwrap();
        let (app, _) = app(dir.path(), ZoneResolver::utc());
        let response = app
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"ok");
    }

    #[tokio::test]
    async fn test_timezone_reports_effective_zone() {
        let dir = tempdir().unwrap();
        let (app, _) = app(dir.path(), ZoneResolver::resolve_or_utc("Not/AZone"));
        let body = get_json(app, "/api/timezone").await;
        assert_eq!(body["timezone"], "UTC");
        assert_eq!(
            body["formattedDate"],
            Utc::now().format("%Y-%m-%d").to_string()
        );
    }

    #[tokio::test]
    async fn test_logs_regroup_by_local_date() {
        let dir = tempdir().unwrap();
        let zone = ZoneResolver::resolve("Asia/Kuala_Lumpur").unwrap();
        let (app, store) = app(dir.path(), zone);

        // One partition written under a UTC day, spanning local midnight.
        let t = Utc.with_ymd_and_hms(2025, 5, 19, 15, 59, 30).unwrap();
        store
            .append_batch(
                vec![record(t, true, 12), record(t + Duration::seconds(60), false, 5000)],
                Utc.with_ymd_and_hms(2025, 5, 19, 15, 0, 0).unwrap(),
            )
            .unwrap();

        let body = get_json(app, "/api/logs").await;
        assert_eq!(body["timezone"], "Asia/Kuala_Lumpur");
        let logs = body["logs"].as_object().unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs["2025-05-19"].as_array().unwrap().len(), 1);
        assert_eq!(logs["2025-05-20"].as_array().unwrap().len(), 1);
        assert_eq!(logs["2025-05-20"][0]["data"]["status"], false);
        assert_eq!(logs["2025-05-19"][0]["timestamp"], "2025-05-19T15:59:30.000Z");
    }

    #[tokio::test]
    async fn test_logs_skip_corrupt_partition() {
        let dir = tempdir().unwrap();
        let (app, store) = app(dir.path(), ZoneResolver::utc());
        let t = Utc.with_ymd_and_hms(2025, 5, 18, 10, 0, 0).unwrap();
        store.append_at(record(t, true, 20), t).unwrap();
        std::fs::write(dir.path().join("2025-05-19.json"), b"[{\"timestamp\": ").unwrap();

        let body = get_json(app, "/api/logs").await;
        let logs = body["logs"].as_object().unwrap();
        assert_eq!(logs.len(), 1);
        assert!(logs.contains_key("2025-05-18"));
    }

    #[tokio::test]
    async fn test_logs_empty_directory() {
        let dir = tempdir().unwrap();
        let (app, _) = app(dir.path(), ZoneResolver::utc());
        let body = get_json(app, "/api/logs").await;
        assert_eq!(body["logs"].as_object().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_summary_newest_first() {
        let dir = tempdir().unwrap();
        let (app, store) = app(dir.path(), ZoneResolver::utc());
        let d1 = Utc.with_ymd_and_hms(2025, 5, 18, 10, 0, 0).unwrap();
        let d2 = Utc.with_ymd_and_hms(2025, 5, 19, 10, 0, 0).unwrap();
        store.append_at(record(d1, true, 10), d1).unwrap();
        store.append_at(record(d2, true, 10), d2).unwrap();
        store.append_at(record(d2 + Duration::seconds(30), false, 5000), d2).unwrap();

        let body = get_json(app, "/api/summary").await;
        let days = body["days"].as_array().unwrap();
        assert_eq!(days.len(), 2);
        assert_eq!(days[0]["date"], "2025-05-19");
        assert_eq!(days[0]["total"], 2);
        assert_eq!(days[0]["uptimePercent"], 50.0);
        assert_eq!(days[0]["level"], "down");
        assert_eq!(days[1]["date"], "2025-05-18");
        assert_eq!(days[1]["level"], "operational");
        assert_eq!(days[1]["hours"].as_array().unwrap().len(), 24);
    }

    #[tokio::test]
    async fn test_openapi_document() {
        let dir = tempdir().unwrap();
        let (app, _) = app(dir.path(), ZoneResolver::utc());
        let body = get_json(app, "/api-docs/openapi.json").await;
        assert!(body["paths"].get("/api/logs").is_some());
        assert!(body["paths"].get("/api/timezone").is_some());
    }
}
