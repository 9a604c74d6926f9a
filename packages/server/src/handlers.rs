//! HTTP handler functions for the EcoSensor map API.

use actix_web::{HttpResponse, web};
use ecosensor_layer::{BoundingBox, CategoryFilter};
use ecosensor_pipeline::{PendingFetch, SourceOutcome, SourceReport, StaticContext};
use ecosensor_sensor_models::{EUROPEAN_AQI_LEVELS, Pollutant};
use ecosensor_server_models::{ApiHealth, ApiPollutant, ApiSource, ApiSourceStatus, StyleQueryParams};
use futures::StreamExt as _;
use futures::stream::FuturesUnordered;

use crate::AppState;

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /api/pollutants`
pub async fn pollutants() -> HttpResponse {
    let list: Vec<ApiPollutant> = Pollutant::all().iter().copied().map(Into::into).collect();
    HttpResponse::Ok().json(list)
}

/// `GET /api/legend`
///
/// Returns the European AQI bands in ascending severity.
pub async fn legend() -> HttpResponse {
    HttpResponse::Ok().json(EUROPEAN_AQI_LEVELS)
}

/// `GET /api/sources`
///
/// Lists the datasets from the manifest loaded at startup.
pub async fn sources(state: web::Data<AppState>) -> HttpResponse {
    let list: Vec<ApiSource> = state
        .manifest
        .iter()
        .map(|entry| ApiSource::from_entry(entry, &state.source_prefix))
        .collect();
    HttpResponse::Ok().json(list)
}

/// `GET /api/style`
///
/// Refreshes every dataset inside `bbox` for `pollutant` and returns the
/// resulting `MapLibre` style along with a per-dataset status list.
/// Datasets outside `bbox` are removed from the style.
pub async fn style(
    state: web::Data<AppState>,
    params: web::Query<StyleQueryParams>,
) -> HttpResponse {
    let pollutant = match params.pollutant.as_deref().map(Pollutant::from_code_or_name) {
        None => Pollutant::default(),
        Some(Some(pollutant)) => pollutant,
        Some(None) => return bad_request("unknown pollutant"),
    };
    let viewport = match params.bbox.as_deref().map(str::parse::<BoundingBox>) {
        None => None,
        Some(Ok(bbox)) => Some(bbox),
        Some(Err(e)) => return bad_request(&e.to_string()),
    };

    let ctx = StaticContext::new(CategoryFilter::Pollutant(pollutant)).with_viewport(viewport);
    let entries = ecosensor_layer::viewport::entries_in_viewport(&state.manifest, viewport.as_ref());

    let pending: Vec<PendingFetch> = {
        let mut pipeline = state.pipeline.lock().await;
        let mut document = state.document.lock().await;
        pipeline.retire_outside(&mut *document, &state.manifest, &entries);
        entries.into_iter().map(|entry| pipeline.begin(entry, &ctx)).collect()
    };

    let mut running: FuturesUnordered<_> = pending.into_iter().map(PendingFetch::run).collect();
    let mut statuses = Vec::with_capacity(running.len());
    while let Some(completion) = running.next().await {
        let mut pipeline = state.pipeline.lock().await;
        let mut document = state.document.lock().await;
        statuses.push(status(pipeline.complete(&mut *document, completion)));
    }

    let style = state.document.lock().await.to_style();
    match style {
        Ok(style) => HttpResponse::Ok().json(serde_json::json!({
            "pollutant": pollutant.code(),
            "style": style,
            "sources": statuses,
        })),
        Err(e) => {
            log::error!("Failed to serialize style: {e}");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to serialize style"
            }))
        }
    }
}

fn status(report: SourceReport) -> ApiSourceStatus {
    let (status, layers, error) = match report.outcome {
        SourceOutcome::Rendered { layers, .. } => ("rendered", layers, None),
        SourceOutcome::Failed(e) => ("failed", 0, Some(e.to_string())),
        SourceOutcome::Superseded => ("superseded", 0, None),
        SourceOutcome::Cancelled => ("cancelled", 0, None),
    };
    ApiSourceStatus {
        source_name: report.source_name,
        status,
        layers,
        error,
    }
}

fn bad_request(message: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(serde_json::json!({ "error": message }))
}
