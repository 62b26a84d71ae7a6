//! OpenAPI documentation definition.

use upwatch_core::aggregate::{DaySummary, HourSlot, StatusLevel};
use upwatch_core::api::{
    ApiLogEntry, ApiProbeData, LogsResponse, StatusResponse, SummaryResponse, TimezoneInfo,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::handle_status,
        crate::handlers::handle_health,
        crate::handlers::handle_timezone,
        crate::handlers::handle_logs,
        crate::handlers::handle_summary,
    ),
    components(schemas(
        StatusResponse,
        TimezoneInfo,
        LogsResponse,
        ApiLogEntry,
        ApiProbeData,
        SummaryResponse,
        DaySummary,
        HourSlot,
        StatusLevel,
    )),
    info(
        title = "upwatch API",
        version = "1.0",
        description = "Uptime monitor: probe history grouped by local date"
    )
)]
pub(crate) struct ApiDoc;
