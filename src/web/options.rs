//! Dropdown option listings, one fresh portal session per request.

use axum::extract::{Path, Query, State};
use axum::response::Json;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::portal::OptionEntry;
use crate::state::AppState;
use crate::web::error::ApiError;

#[derive(Debug, Default, Deserialize)]
pub struct OptionsParams {
    /// Building value, required for floors and rooms.
    pub building: Option<String>,
    /// Floor value, required for rooms.
    pub parent: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OptionsResponse {
    pub options: Vec<OptionEntry>,
}

/// Treat `?building=` the same as an absent parameter.
pub(super) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn required(value: Option<String>, name: &str) -> Result<String, ApiError> {
    non_empty(value).ok_or_else(|| ApiError::bad_request(format!("missing parameter: {name}")))
}

/// `GET /api/options/{kind}`
pub(super) async fn get_options(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(params): Query<OptionsParams>,
) -> Result<Json<OptionsResponse>, ApiError> {
    // Validate before touching the network.
    let (building, floor) = match kind.as_str() {
        "buildings" => (None, None),
        "floors" => (Some(required(params.building, "building")?), None),
        "rooms" => (
            Some(required(params.building, "building")?),
            Some(required(params.parent, "parent")?),
        ),
        other => {
            return Err(ApiError::bad_request(format!(
                "unknown option type: {other}"
            )));
        }
    };

    let session = state.portal().open_session()?;
    let options = match (building, floor) {
        (None, _) => session.list_buildings().await?,
        (Some(building), None) => session.list_floors(&building).await?,
        (Some(building), Some(floor)) => session.list_rooms(&building, &floor).await?.rooms,
    };

    debug!(kind = kind.as_str(), count = options.len(), "listed options");
    Ok(Json(OptionsResponse { options }))
}
