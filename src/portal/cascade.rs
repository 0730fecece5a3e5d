//! The building → floor → room dropdown cascade.
//!
//! Each dropdown change on the portal is a full-page postback, and the next
//! dropdown only exists in the page that postback returns. The steps below
//! replay that sequence exactly; skipping one yields a page without the room
//! dropdown at all.
//!
//! ```text
//! open_entry ──> EntryPage ──select_building──> FloorsPage ──select_floor──> RoomsPage
//! ```
//!
//! The server refuses to accept a stale hidden-field set, so `list_floors` and
//! `list_rooms` always start over from a freshly loaded entry page.

use html_scraper::Html;
use tracing::{debug, info};
use url::Url;

use crate::portal::errors::PortalError;
use crate::portal::form::{extract_hidden_fields, extract_options, find_select};
use crate::portal::models::OptionEntry;
use crate::portal::session::{PortalSession, SessionState};

pub const BUILDING_SELECT: &str = "drlouming";
pub const FLOOR_SELECT: &str = "drceng";
pub const ROOM_SELECT: &str = "drfangjian";

/// Freshly loaded entry page: the building list is known.
#[derive(Debug, Clone)]
pub struct EntryPage {
    pub state: SessionState,
    pub buildings: Vec<OptionEntry>,
}

/// A building has been chosen: the floor list is known.
#[derive(Debug, Clone)]
pub struct FloorsPage {
    pub building: String,
    pub state: SessionState,
    pub floors: Vec<OptionEntry>,
}

/// A floor has been chosen: the room list is known, and `state` encodes the
/// server's current selection for the usage-record step.
#[derive(Debug, Clone)]
pub struct RoomsPage {
    pub building: String,
    pub floor: String,
    pub state: SessionState,
    pub rooms: Vec<OptionEntry>,
}

/// Parse a page that must carry dropdown `id`, returning its hidden state too.
fn parse_dropdown_page(
    body: &str,
    id: &'static str,
    url: &Url,
) -> Result<(SessionState, Vec<OptionEntry>), PortalError> {
    let html = Html::parse_document(body);
    let state = SessionState::new(extract_hidden_fields(&html));

    let Some(select) = find_select(&html, id) else {
        debug!(
            id,
            body_len = body.len(),
            mentions_id = body.contains(id),
            preview = %body.chars().take(200).collect::<String>(),
            "dropdown not found in page"
        );
        return Err(PortalError::MissingDropdown {
            id,
            url: url.to_string(),
        });
    };

    Ok((state, extract_options(select)))
}

impl PortalSession {
    /// GET the entry page, retrying when the portal serves its error page.
    pub async fn open_entry(&self) -> Result<EntryPage, PortalError> {
        let url = &self.entry_url;
        self.retrying("entry page", || async move {
            let body = self.get(url, None).await?;
            let (state, buildings) = parse_dropdown_page(&body, BUILDING_SELECT, url)?;
            Ok(EntryPage { state, buildings })
        })
        .await
    }

    /// Submit the "building changed" postback.
    pub async fn select_building(
        &self,
        entry: &EntryPage,
        building_value: &str,
    ) -> Result<FloorsPage, PortalError> {
        self.pause(1).await;
        let params = entry.state.postback(
            Some(BUILDING_SELECT),
            &[(BUILDING_SELECT, building_value)],
        );
        let body = self.post_form(&self.entry_url, None, &params).await?;
        let (state, floors) = parse_dropdown_page(&body, FLOOR_SELECT, &self.entry_url)?;

        Ok(FloorsPage {
            building: building_value.to_string(),
            state,
            floors,
        })
    }

    /// Submit the "floor changed" postback.
    pub async fn select_floor(
        &self,
        floors: &FloorsPage,
        floor_value: &str,
    ) -> Result<RoomsPage, PortalError> {
        self.pause(1).await;
        let params = floors.state.postback(
            Some(FLOOR_SELECT),
            &[
                (BUILDING_SELECT, floors.building.as_str()),
                (FLOOR_SELECT, floor_value),
            ],
        );
        let body = self.post_form(&self.entry_url, None, &params).await?;
        let (state, rooms) = parse_dropdown_page(&body, ROOM_SELECT, &self.entry_url)?;

        Ok(RoomsPage {
            building: floors.building.clone(),
            floor: floor_value.to_string(),
            state,
            rooms,
        })
    }

    pub async fn list_buildings(&self) -> Result<Vec<OptionEntry>, PortalError> {
        let entry = self.open_entry().await?;
        info!(count = entry.buildings.len(), "fetched building list");
        Ok(entry.buildings)
    }

    pub async fn list_floors(&self, building_value: &str) -> Result<Vec<OptionEntry>, PortalError> {
        let entry = self.open_entry().await?;
        let page = self.select_building(&entry, building_value).await?;
        info!(
            building = building_value,
            count = page.floors.len(),
            "fetched floor list"
        );
        Ok(page.floors)
    }

    /// Walk the whole cascade down to the room list.
    ///
    /// The returned page's `state` is the input the usage-record scrape needs.
    pub async fn list_rooms(
        &self,
        building_value: &str,
        floor_value: &str,
    ) -> Result<RoomsPage, PortalError> {
        let entry = self.open_entry().await?;
        let floors = self.select_building(&entry, building_value).await?;
        let rooms = self.select_floor(&floors, floor_value).await?;
        info!(
            building = building_value,
            floor = floor_value,
            count = rooms.rooms.len(),
            "fetched room list"
        );
        Ok(rooms)
    }
}
