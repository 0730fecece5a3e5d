//! Usage query and refresh handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::response::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cache::QueryResult;
use crate::portal::records::DATE_FORMAT;
use crate::portal::{DateRange, Selection, UsageRecord};
use crate::state::AppState;
use crate::utils::parse_display_number;
use crate::web::error::ApiError;
use crate::web::options::non_empty;

/// Days covered when the caller gives no start date.
const DEFAULT_WINDOW_DAYS: u64 = 90;

#[derive(Debug, Default, Deserialize)]
pub struct QueryRequest {
    pub building: Option<String>,
    pub floor: Option<String>,
    pub room: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QueryInfo {
    pub building: String,
    pub floor: String,
    pub room: String,
    pub scrape_time: String,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub info: QueryInfo,
    pub records: Vec<UsageRecord>,
    pub remaining_electricity: f64,
}

impl From<QueryResult> for QueryResponse {
    fn from(result: QueryResult) -> Self {
        let remaining_electricity = match result.remaining_balance.as_deref() {
            Some(raw) => parse_display_number(raw).unwrap_or_else(|| {
                warn!(raw, "remaining balance is not a number, reporting 0");
                0.0
            }),
            None => 0.0,
        };
        Self {
            info: QueryInfo {
                scrape_time: result.scrape_time_str(),
                building: result.selection.building,
                floor: result.selection.floor,
                room: result.selection.room,
            },
            records: result.records,
            remaining_electricity,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshParams {
    pub building: Option<String>,
    pub floor: Option<String>,
    pub room: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub success: bool,
    pub message: String,
}

fn parse_date(raw: &str, field: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map_err(|_| ApiError::bad_request(format!("invalid {field}: '{raw}' (expected YYYY-MM-DD)")))
}

/// Build the query window. A missing end means `today`; a missing start
/// means [`DEFAULT_WINDOW_DAYS`] before the end.
pub fn date_range(
    start: Option<&str>,
    end: Option<&str>,
    today: NaiveDate,
) -> Result<DateRange, ApiError> {
    let end = match end {
        Some(raw) => parse_date(raw, "end_date")?,
        None => today,
    };
    let range = match start {
        Some(raw) => DateRange::new(parse_date(raw, "start_date")?, end),
        None => DateRange::last_days(end, DEFAULT_WINDOW_DAYS),
    };
    if range.start > range.end {
        return Err(ApiError::bad_request("start_date is after end_date"));
    }
    Ok(range)
}

/// `POST /api/query`
pub(super) async fn query(
    State(state): State<AppState>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, ApiError> {
    let Json(request) = body.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;

    let (Some(building), Some(floor), Some(room)) = (
        non_empty(request.building),
        non_empty(request.floor),
        non_empty(request.room),
    ) else {
        return Err(ApiError::bad_request(
            "building, floor and room are all required",
        ));
    };

    let today = chrono::Local::now().date_naive();
    let range = date_range(
        non_empty(request.start_date).as_deref(),
        non_empty(request.end_date).as_deref(),
        today,
    )?;

    let selection = Selection::new(building, floor, room);
    let result = state.queries.query(&selection, range).await?;
    Ok(Json(result.into()))
}

/// `GET /api/refresh`
pub(super) async fn refresh(
    State(state): State<AppState>,
    Query(params): Query<RefreshParams>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let given = (
        non_empty(params.building),
        non_empty(params.floor),
        non_empty(params.room),
    );

    let result = match given {
        (Some(building), Some(floor), Some(room)) => {
            let selection = Selection::new(building, floor, room);
            state.queries.refresh(Some(&selection)).await?
        }
        (None, None, None) => state.queries.refresh(None).await?,
        _ => {
            return Err(ApiError::bad_request(
                "give all of building, floor and room, or none of them",
            ));
        }
    };

    Ok(Json(RefreshResponse {
        success: true,
        message: format!(
            "refreshed {} ({} records)",
            result.selection,
            result.records.len()
        ),
    }))
}
