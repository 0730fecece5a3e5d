//! Query orchestration: cache lookup, name resolution, scrape, persist.

use chrono::{Local, NaiveDateTime};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::cache::{CacheError, CacheStore, QueryResult};
use crate::portal::{
    DateRange, OptionEntry, Portal, PortalError, PortalSession, RoomsPage, Selection,
    SelectionKind, SelectionValues, SessionState,
};
use crate::utils::{fmt_duration, log_if_slow};

/// Scrapes slower than this are logged as warnings.
const SLOW_SCRAPE: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// A user-supplied label matched no option. Not retryable.
    #[error("no {kind} named '{text}'")]
    NotFound { kind: SelectionKind, text: String },
    #[error("scraping usage records failed")]
    ScrapeFailed,
    #[error("nothing cached to refresh")]
    NothingCached,
    #[error(transparent)]
    Portal(#[from] PortalError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Find the option whose label is exactly `text` (case- and
/// whitespace-sensitive) and return its server value.
pub fn resolve_option(
    options: &[OptionEntry],
    kind: SelectionKind,
    text: &str,
) -> Result<String, QueryError> {
    match options.iter().find(|opt| opt.text == text) {
        Some(opt) => {
            debug!(%kind, text, value = opt.value.as_str(), "resolved option");
            Ok(opt.value.clone())
        }
        None => {
            let known: Vec<&str> = options.iter().map(|o| o.text.as_str()).collect();
            debug!(%kind, text, ?known, "no matching option");
            Err(QueryError::NotFound {
                kind,
                text: text.to_string(),
            })
        }
    }
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Ties the portal client and the cache together.
#[derive(Debug, Clone)]
pub struct QueryService {
    portal: Portal,
    cache: CacheStore,
}

impl QueryService {
    pub fn new(portal: Portal, cache: CacheStore) -> Self {
        Self { portal, cache }
    }

    pub fn portal(&self) -> &Portal {
        &self.portal
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Usage data for `selection`, from the cache when fresh.
    ///
    /// A cache hit is returned verbatim, including its original scrape time.
    /// The date range is not part of the cache key.
    pub async fn query(
        &self,
        selection: &Selection,
        range: DateRange,
    ) -> Result<QueryResult, QueryError> {
        if let Some(cached) = self.cache.read().await {
            if self.cache.is_fresh(&cached, selection, now()) {
                info!(%selection, scrape_time = %cached.scrape_time, "serving cached result");
                return Ok(cached);
            }
            debug!(
                %selection,
                cached_selection = %cached.selection,
                cached_at = %cached.scrape_time,
                "cache entry stale or for another room"
            );
        }

        let result = self.scrape_by_name(selection, range).await?;
        if let Err(e) = self.cache.write(&result).await {
            // The caller still gets the data; the next query just scrapes again.
            warn!(error = %e, "failed to persist scrape result");
        }
        Ok(result)
    }

    /// Scrape again regardless of cache freshness, over the default window.
    ///
    /// With a selection, names are resolved as in [`query`](Self::query).
    /// Without one, the cached entry's server values are reused and its
    /// display names carried over.
    pub async fn refresh(&self, selection: Option<&Selection>) -> Result<QueryResult, QueryError> {
        let range = DateRange::default_window();

        let result = match selection {
            Some(selection) => {
                info!(%selection, "refreshing selection");
                self.scrape_by_name(selection, range).await?
            }
            None => {
                let cached = self.cache.read().await.ok_or(QueryError::NothingCached)?;
                info!(selection = %cached.selection, "refreshing cached selection");
                self.scrape_by_values(cached.selection, cached.values, range)
                    .await?
            }
        };

        self.cache.write(&result).await?;
        Ok(result)
    }

    /// Scrape a room picked interactively on `rooms`, over the default
    /// window, and cache the result. The cache is bypassed on the way in.
    pub async fn scrape_picked(
        &self,
        session: &PortalSession,
        selection: Selection,
        rooms: &RoomsPage,
        room_value: &str,
    ) -> Result<QueryResult, QueryError> {
        let values = SelectionValues {
            building: rooms.building.clone(),
            floor: rooms.floor.clone(),
            room: room_value.to_string(),
        };
        let result = self
            .scrape(session, selection, values, &rooms.state, DateRange::default_window())
            .await?;
        self.cache.write(&result).await?;
        Ok(result)
    }

    /// Resolve display names to server values, then scrape.
    async fn scrape_by_name(
        &self,
        selection: &Selection,
        range: DateRange,
    ) -> Result<QueryResult, QueryError> {
        let start = Instant::now();
        let session = self.portal.open_session()?;

        let buildings = session.list_buildings().await?;
        let building = resolve_option(&buildings, SelectionKind::Building, &selection.building)?;

        let floors = session.list_floors(&building).await?;
        let floor = resolve_option(&floors, SelectionKind::Floor, &selection.floor)?;

        let rooms = session.list_rooms(&building, &floor).await?;
        let room = resolve_option(&rooms.rooms, SelectionKind::Room, &selection.room)?;

        let values = SelectionValues {
            building,
            floor,
            room,
        };
        debug!(%selection, ?values, elapsed = fmt_duration(start.elapsed()), "selection resolved");

        self.scrape(&session, selection.clone(), values, &rooms.state, range)
            .await
    }

    /// Re-walk the cascade with known server values to get fresh hidden state.
    async fn scrape_by_values(
        &self,
        selection: Selection,
        values: SelectionValues,
        range: DateRange,
    ) -> Result<QueryResult, QueryError> {
        let session = self.portal.open_session()?;
        let rooms = session.list_rooms(&values.building, &values.floor).await?;
        self.scrape(&session, selection, values, &rooms.state, range)
            .await
    }

    async fn scrape(
        &self,
        session: &PortalSession,
        selection: Selection,
        values: SelectionValues,
        rooms_state: &SessionState,
        range: DateRange,
    ) -> Result<QueryResult, QueryError> {
        let start = Instant::now();
        let report = session
            .scrape(&values, rooms_state, range)
            .await
            .ok_or(QueryError::ScrapeFailed)?;
        log_if_slow(start, SLOW_SCRAPE, "usage scrape");

        info!(
            %selection,
            records = report.records.len(),
            duration = fmt_duration(start.elapsed()),
            "scraped usage records"
        );

        Ok(QueryResult {
            selection,
            values,
            scrape_time: now(),
            remaining_balance: report.remaining_balance,
            records: report.records,
        })
    }
}
