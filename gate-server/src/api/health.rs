use crate::openapi::HEALTH_TAG;
use crate::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use log::warn;
use serde::Serialize;
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// Liveness or readiness report
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthReport {
    /// "ok" or "error"
    status: &'static str,
    /// Per-store state, only on `/ready`
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    stores: BTreeMap<&'static str, &'static str>,
}

impl HealthReport {
    fn ok() -> Self {
        Self {
            status: "ok",
            stores: BTreeMap::new(),
        }
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

impl IntoResponse for HealthReport {
    fn into_response(self) -> Response {
        let status_code = if self.is_ok() {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };
        (status_code, Json(self)).into_response()
    }
}

/// Liveness: the process answers
#[utoipa::path(
    get,
    path = "/health",
    tag = HEALTH_TAG,
    responses(
        (status = 200, description = "Service is alive", body = HealthReport)
    )
)]
pub(crate) async fn health_check() -> HealthReport {
    HealthReport::ok()
}

/// Readiness: every store answers
#[utoipa::path(
    get,
    path = "/ready",
    tag = HEALTH_TAG,
    responses(
        (status = 200, description = "Service is ready", body = HealthReport),
        (status = 503, description = "A store is not reachable", body = HealthReport)
    )
)]
pub(crate) async fn ready_check(State(state): State<AppState>) -> HealthReport {
    let mut report = HealthReport::ok();
    for (name, health) in state.store_health().await {
        let store_status = match health {
            Ok(()) => "healthy",
            Err(e) => {
                warn!("Readiness check failed for the {} store: {}", name, e);
                report.status = "error";
                "unavailable"
            }
        };
        report.stores.insert(name, store_status);
    }
    report
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_utils::TestFixture;
    use serde_json::json;

    #[tokio::test]
    async fn test_health_endpoint() {
        let fixture = TestFixture::new().await;
        let resp = fixture.get("/health").await;
        resp.assert_ok();
        assert_eq!(resp.json, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_ready_endpoint() {
        let fixture = TestFixture::new().await;
        let resp = fixture.get("/ready").await;
        resp.assert_ok();
        assert_eq!(
            resp.json,
            json!({
                "status": "ok",
                "stores": {
                    "clients": "healthy",
                    "codes": "healthy",
                    "pending": "healthy",
                    "revoked": "healthy",
                },
            })
        );
    }

    #[test]
    fn test_failed_report_is_unavailable() {
        let report = HealthReport {
            status: "error",
            stores: BTreeMap::from([("codes", "unavailable")]),
        };
        assert_eq!(report.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
