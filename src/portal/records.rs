//! Usage-record query, results parsing and pagination.

use std::sync::LazyLock;

use chrono::{Days, NaiveDate};
use html_scraper::{Html, Selector};
use tracing::{debug, error, info};

use crate::portal::cascade::{BUILDING_SELECT, FLOOR_SELECT, ROOM_SELECT};
use crate::portal::errors::PortalError;
use crate::portal::form::extract_hidden_fields;
use crate::portal::models::{SelectionValues, UsageRecord, UsageReport};
use crate::portal::session::{PortalSession, SessionState};

/// Date format the portal's query form expects.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Label of the query form's search button; the server checks it.
const SEARCH_BUTTON: &str = "查询";

/// Inclusive date range for a usage query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// `days` days back from `end`, inclusive of `end`.
    pub fn last_days(end: NaiveDate, days: u64) -> Self {
        let start = end.checked_sub_days(Days::new(days)).unwrap_or(NaiveDate::MIN);
        Self { start, end }
    }

    /// Default window used when a caller gives no dates.
    pub fn default_window() -> Self {
        Self::last_days(chrono::Local::now().date_naive(), 90)
    }

    pub fn start_str(&self) -> String {
        self.start.format(DATE_FORMAT).to_string()
    }

    pub fn end_str(&self) -> String {
        self.end.format(DATE_FORMAT).to_string()
    }
}

/// Everything parsed from one results page.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ResultsPage {
    records: Vec<UsageRecord>,
    remaining_balance: Option<String>,
    total_pages: u32,
}

fn parse_results_page(body: &str) -> ResultsPage {
    let html = Html::parse_document(body);
    ResultsPage {
        records: parse_records(&html),
        remaining_balance: parse_remaining_balance(&html),
        total_pages: parse_page_count(&html),
    }
}

fn parse_hidden_state(body: &str) -> SessionState {
    SessionState::new(extract_hidden_fields(&Html::parse_document(body)))
}

fn parse_records_only(body: &str) -> Vec<UsageRecord> {
    parse_records(&Html::parse_document(body))
}

/// Rows of the data table. Header and footer rows don't have four cells and
/// are dropped.
fn parse_records(html: &Html) -> Vec<UsageRecord> {
    let row_sel = Selector::parse("table.dataTable tr.contentLine").unwrap();
    let td_sel = Selector::parse("td").unwrap();

    html.select(&row_sel)
        .filter_map(|row| {
            let cells: Vec<String> = row
                .select(&td_sel)
                .map(|td| td.text().collect::<String>().trim().to_string())
                .collect();
            let [date, meter_name, usage, price]: [String; 4] = cells.try_into().ok()?;
            Some(UsageRecord {
                date,
                meter_name,
                usage,
                price,
            })
        })
        .collect()
}

/// The remaining balance is the third orange badge in the first `<h6>`.
///
/// Badges are matched on the exact class attribute `number orange`; a span
/// carrying extra classes is not a badge. Nothing labels the value
/// semantically, so with any other badge count no value is reported.
fn parse_remaining_balance(html: &Html) -> Option<String> {
    let h6_sel = Selector::parse("h6").unwrap();
    let badge_sel = Selector::parse(r#"span[class="number orange"]"#).unwrap();

    let heading = html.select(&h6_sel).next()?;
    let badges: Vec<_> = heading.select(&badge_sel).collect();
    match badges.as_slice() {
        [_, _, balance] => Some(balance.text().collect::<String>().trim().to_string()),
        _ => None,
    }
}

/// Total page count from the pager's "共 N 页" text, defaulting to 1.
fn parse_page_count(html: &Html) -> u32 {
    static PAGES_RE: LazyLock<regex::Regex> =
        LazyLock::new(|| regex::Regex::new(r"共\s*(\d+)\s*页").unwrap());

    let pager_sel = Selector::parse("div.pageer").unwrap();
    html.select(&pager_sel)
        .next()
        .and_then(|pager| {
            let text = pager.text().collect::<String>();
            PAGES_RE.captures(&text)?[1].parse::<u32>().ok()
        })
        .filter(|&n| n >= 1)
        .unwrap_or(1)
}

impl PortalSession {
    /// Query usage records for a room and collect every result page.
    ///
    /// `rooms_state` must be the hidden state of the page that listed the
    /// rooms. Any failure along the way is logged and reported as `None`;
    /// partial results are never returned.
    pub async fn scrape(
        &self,
        values: &SelectionValues,
        rooms_state: &SessionState,
        range: DateRange,
    ) -> Option<UsageReport> {
        debug!(
            building = values.building.as_str(),
            floor = values.floor.as_str(),
            room = values.room.as_str(),
            start = %range.start,
            end = %range.end,
            "scraping usage records"
        );

        match self.try_scrape(values, rooms_state, range).await {
            Ok(report) => {
                info!(
                    records = report.records.len(),
                    remaining = report.remaining_balance.as_deref().unwrap_or("-"),
                    "usage scrape complete"
                );
                Some(report)
            }
            Err(e) => {
                error!(error = %e, room = values.room.as_str(), "usage scrape failed");
                None
            }
        }
    }

    async fn try_scrape(
        &self,
        values: &SelectionValues,
        rooms_state: &SessionState,
        range: DateRange,
    ) -> Result<UsageReport, PortalError> {
        // Choose the room and click the "usage records" image button. The
        // coordinates stand in for the click position the browser would send.
        self.pause(1).await;
        let params = rooms_state.postback(
            None,
            &[
                (BUILDING_SELECT, values.building.as_str()),
                (FLOOR_SELECT, values.floor.as_str()),
                (ROOM_SELECT, values.room.as_str()),
                ("radio", "usedR"),
                ("ImageButton1.x", "30"),
                ("ImageButton1.y", "10"),
            ],
        );
        let body = self
            .post_form(&self.entry_url, Some(&self.entry_url), &params)
            .await?;
        let records_state = parse_hidden_state(&body);

        self.pause(1).await;
        let (start, end) = (range.start_str(), range.end_str());
        let params = records_state.postback(
            None,
            &[
                ("txtstart", start.as_str()),
                ("txtend", end.as_str()),
                ("btnser", SEARCH_BUTTON),
            ],
        );
        let body = self
            .post_form(&self.results_url, Some(&self.results_url), &params)
            .await?;
        let first = parse_results_page(&body);
        debug!(
            total_pages = first.total_pages,
            first_page_records = first.records.len(),
            "parsed first results page"
        );

        let mut records = first.records;
        // The server keeps the query in session; later pages are plain GETs.
        for page in 2..=first.total_pages {
            let mut url = self.results_url.clone();
            url.query_pairs_mut().append_pair("p", &page.to_string());

            let url = &url;
            let body = self
                .retrying("results page", || async move {
                    self.get(url, Some(&self.results_url)).await
                })
                .await?;
            let page_records = parse_records_only(&body);
            debug!(page, count = page_records.len(), "parsed results page");
            records.extend(page_records);
        }

        Ok(UsageReport {
            records,
            remaining_balance: first.remaining_balance,
        })
    }
}
