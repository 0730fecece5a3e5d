//! In-process stand-in for the billing portal.
//!
//! Serves `default.aspx` and `usedRecord.aspx` on an ephemeral port, checks
//! that every postback echoes the hidden state of the page before it, and
//! counts requests so tests can assert on network traffic.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Form, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use chrono::{Days, NaiveDate};

use elecfee::cache::CacheStore;
use elecfee::portal::{Portal, PortalSettings};
use elecfee::query::QueryService;

pub const SESSION_COOKIE: &str = "ASP.NET_SessionId";
const SESSION_ID: &str = "fakesession42";

pub const BUILDINGS: &[(&str, &str)] = &[("1号楼", "B01"), ("2号楼", "B02")];
pub const FLOORS_B01: &[(&str, &str)] = &[("1层", "F01"), ("3层", "F03")];
pub const ROOMS_B01_F03: &[(&str, &str)] = &[("301", "R301"), ("302", "R302")];

/// Room with 47 records over three pages (20/20/7) and a balance badge.
pub const PAGED_ROOM: (&str, &str, &str) = ("1号楼", "3层", "301");
/// Room with three records on a single page and no readable balance.
pub const SMALL_ROOM: (&str, &str, &str) = ("1号楼", "3层", "302");

pub const PAGED_RECORDS: usize = 47;
const PAGE_SIZE: usize = 20;
pub const BALANCE: &str = "87.35";

#[derive(Debug, Default, Clone)]
pub struct FakeOptions {
    /// Serve this many error pages from `GET default.aspx` before the real one.
    pub flaky_entry: usize,
    /// Delay every `GET default.aspx` by this long.
    pub entry_delay: Option<Duration>,
}

#[derive(Debug, Default)]
pub struct PortalState {
    options: FakeOptions,
    flaky_left: AtomicUsize,
    hits: AtomicUsize,
    entry_gets: AtomicUsize,
    /// Postbacks and result-page loads that arrived without the session cookie.
    missing_cookie: AtomicUsize,
    /// Postbacks whose hidden state didn't match the previous page.
    bad_postbacks: AtomicUsize,
    last_range: Mutex<Option<(String, String)>>,
}

pub struct FakePortal {
    pub addr: SocketAddr,
    pub state: Arc<PortalState>,
}

impl FakePortal {
    pub fn base_url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    /// Settings with no politeness delay and a short timeout.
    pub fn settings(&self) -> PortalSettings {
        PortalSettings {
            base_url: self.base_url(),
            request_delay: Duration::ZERO,
            request_timeout: Duration::from_secs(5),
            entry_retries: 3,
        }
    }

    pub fn portal(&self) -> Portal {
        Portal::new(self.settings()).expect("portal")
    }

    pub fn service(&self, cache_path: &Path) -> QueryService {
        QueryService::new(
            self.portal(),
            CacheStore::new(cache_path, Duration::from_secs(3600)),
        )
    }

    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    pub fn entry_gets(&self) -> usize {
        self.state.entry_gets.load(Ordering::SeqCst)
    }

    pub fn missing_cookie(&self) -> usize {
        self.state.missing_cookie.load(Ordering::SeqCst)
    }

    pub fn bad_postbacks(&self) -> usize {
        self.state.bad_postbacks.load(Ordering::SeqCst)
    }

    pub fn last_range(&self) -> Option<(String, String)> {
        self.state.last_range.lock().unwrap().clone()
    }
}

pub async fn spawn_portal(options: FakeOptions) -> FakePortal {
    let state = Arc::new(PortalState {
        flaky_left: AtomicUsize::new(options.flaky_entry),
        options,
        ..Default::default()
    });

    let router = Router::new()
        .route("/default.aspx", get(entry_page).post(entry_postback))
        .route("/usedRecord.aspx", get(results_page).post(results_query))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake portal");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(axum::serve(listener, router).into_future());

    FakePortal { addr, state }
}

/// The `n`-th record of the paged room.
pub fn paged_record(n: usize) -> [String; 4] {
    let date = NaiveDate::from_ymd_opt(2026, 1, 1)
        .unwrap()
        .checked_add_days(Days::new(n as u64))
        .unwrap();
    [
        date.format("%Y-%m-%d").to_string(),
        "照明".to_string(),
        format!("{n}.5"),
        "0.588".to_string(),
    ]
}

fn small_records() -> Vec<[String; 4]> {
    (0..3)
        .map(|n| {
            [
                format!("2026-02-0{}", n + 1),
                "空调".to_string(),
                format!("1{n}.0"),
                "0.588".to_string(),
            ]
        })
        .collect()
}

// --- Handlers ---

/// Count a hit. Only the entry GET may arrive without the session cookie.
fn count(state: &PortalState, headers: &HeaderMap, needs_cookie: bool) {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let has_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.contains(&format!("{SESSION_COOKIE}={SESSION_ID}")));
    if needs_cookie && !has_cookie {
        state.missing_cookie.fetch_add(1, Ordering::SeqCst);
    }
}

fn bad_postback(state: &PortalState, why: &str) -> Response {
    state.bad_postbacks.fetch_add(1, Ordering::SeqCst);
    (StatusCode::INTERNAL_SERVER_ERROR, format!("bad postback: {why}")).into_response()
}

fn expect_field(form: &HashMap<String, String>, name: &str, value: &str) -> Result<(), String> {
    match form.get(name) {
        Some(v) if v == value => Ok(()),
        other => Err(format!("{name}: expected {value:?}, got {other:?}")),
    }
}

async fn entry_page(State(state): State<Arc<PortalState>>, headers: HeaderMap) -> Response {
    count(&state, &headers, false);
    state.entry_gets.fetch_add(1, Ordering::SeqCst);

    if let Some(delay) = state.options.entry_delay {
        tokio::time::sleep(delay).await;
    }

    let set_cookie = [(
        header::SET_COOKIE,
        format!("{SESSION_COOKIE}={SESSION_ID}; path=/; HttpOnly"),
    )];

    let flaky = state
        .flaky_left
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if flaky {
        return (set_cookie, Html(error_page())).into_response();
    }

    let body = form_page("vs-entry", &[("drlouming", BUILDINGS)]);
    (set_cookie, Html(body)).into_response()
}

async fn entry_postback(
    State(state): State<Arc<PortalState>>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    count(&state, &headers, true);

    if form.contains_key("ImageButton1.x") {
        let check = expect_field(&form, "__VIEWSTATE", "vs-rooms")
            .and_then(|_| expect_field(&form, "radio", "usedR"))
            .and_then(|_| expect_field(&form, "ImageButton1.x", "30"))
            .and_then(|_| expect_field(&form, "ImageButton1.y", "10"))
            .and_then(|_| expect_field(&form, "drlouming", "B01"))
            .and_then(|_| expect_field(&form, "drceng", "F03"))
            .and_then(|_| {
                if form.contains_key("__EVENTTARGET") {
                    Err("__EVENTTARGET must be absent on button click".into())
                } else {
                    Ok(())
                }
            });
        if let Err(why) = check {
            return bad_postback(&state, &why);
        }
        let room = form.get("drfangjian").cloned().unwrap_or_default();
        return Html(query_form_page(&format!("vs-records-{room}"))).into_response();
    }

    match form.get("__EVENTTARGET").map(String::as_str) {
        Some("drlouming") => {
            if let Err(why) = expect_field(&form, "__VIEWSTATE", "vs-entry") {
                return bad_postback(&state, &why);
            }
            let floors: &[(&str, &str)] = match form.get("drlouming").map(String::as_str) {
                Some("B01") => FLOORS_B01,
                _ => &[],
            };
            Html(form_page(
                "vs-floors",
                &[("drlouming", BUILDINGS), ("drceng", floors)],
            ))
            .into_response()
        }
        Some("drceng") => {
            let check = expect_field(&form, "__VIEWSTATE", "vs-floors")
                .and_then(|_| expect_field(&form, "drlouming", "B01"));
            if let Err(why) = check {
                return bad_postback(&state, &why);
            }
            let rooms: &[(&str, &str)] = match form.get("drceng").map(String::as_str) {
                Some("F03") => ROOMS_B01_F03,
                _ => &[],
            };
            Html(form_page(
                "vs-rooms",
                &[
                    ("drlouming", BUILDINGS),
                    ("drceng", FLOORS_B01),
                    ("drfangjian", rooms),
                ],
            ))
            .into_response()
        }
        other => bad_postback(&state, &format!("unexpected __EVENTTARGET {other:?}")),
    }
}

async fn results_query(
    State(state): State<Arc<PortalState>>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    count(&state, &headers, true);

    let room = match form.get("__VIEWSTATE").map(String::as_str) {
        Some("vs-records-R301") => "R301",
        Some("vs-records-R302") => "R302",
        other => return bad_postback(&state, &format!("unexpected __VIEWSTATE {other:?}")),
    };
    if let Err(why) = expect_field(&form, "btnser", "查询") {
        return bad_postback(&state, &why);
    }
    let referer_ok = headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.ends_with("/usedRecord.aspx"));
    if !referer_ok {
        return bad_postback(&state, "missing results-page referer");
    }
    let (Some(start), Some(end)) = (form.get("txtstart"), form.get("txtend")) else {
        return bad_postback(&state, "missing date range");
    };
    *state.last_range.lock().unwrap() = Some((start.clone(), end.clone()));

    let body = match room {
        "R301" => {
            let rows: Vec<_> = (0..PAGE_SIZE).map(paged_record).collect();
            results_html(&["12.0", "3", BALANCE], &rows, Some(3))
        }
        _ => results_html(&["12.0", "3"], &small_records(), None),
    };
    Html(body).into_response()
}

async fn results_page(
    State(state): State<Arc<PortalState>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    count(&state, &headers, true);

    let page: usize = match params.get("p").and_then(|p| p.parse().ok()) {
        Some(p) if (2..=3).contains(&p) => p,
        other => return bad_postback(&state, &format!("unexpected page {other:?}")),
    };
    let start = (page - 1) * PAGE_SIZE;
    let end = (start + PAGE_SIZE).min(PAGED_RECORDS);
    let rows: Vec<_> = (start..end).map(paged_record).collect();
    Html(results_html(&["12.0", "3", BALANCE], &rows, Some(3))).into_response()
}

// --- Page templates ---

fn hidden_fields(viewstate: &str) -> String {
    format!(
        r#"<input type="hidden" name="__EVENTTARGET" id="__EVENTTARGET" value="" />
<input type="hidden" name="__EVENTARGUMENT" id="__EVENTARGUMENT" value="" />
<input type="hidden" name="__VIEWSTATE" id="__VIEWSTATE" value="{viewstate}" />
<input type="hidden" name="__EVENTVALIDATION" id="__EVENTVALIDATION" value="ev-{viewstate}" />"#
    )
}

fn select(id: &str, options: &[(&str, &str)]) -> String {
    let options: String = options
        .iter()
        .map(|(text, value)| format!(r#"<option value="{value}">{text}</option>"#))
        .collect();
    format!(
        r#"<select name="{id}" id="{id}" onchange="javascript:setTimeout('__doPostBack(\'{id}\',\'\')', 0)">
<option value="">--请选择--</option>{options}</select>"#
    )
}

fn form_page(viewstate: &str, selects: &[(&str, &[(&str, &str)])]) -> String {
    let selects: String = selects.iter().map(|(id, opts)| select(id, opts)).collect();
    format!(
        r#"<!DOCTYPE html><html><head><title>电费查询</title></head><body>
<form method="post" action="default.aspx" id="form1">{}
{selects}
<input type="radio" name="radio" value="usedR" />用电记录
<input type="image" name="ImageButton1" src="img/query.png" />
</form></body></html>"#,
        hidden_fields(viewstate)
    )
}

fn query_form_page(viewstate: &str) -> String {
    format!(
        r#"<!DOCTYPE html><html><body>
<form method="post" action="usedRecord.aspx" id="form1">{}
<input type="text" name="txtstart" /><input type="text" name="txtend" />
<input type="submit" name="btnser" value="查询" />
</form></body></html>"#,
        hidden_fields(viewstate)
    )
}

fn results_html(badges: &[&str], rows: &[[String; 4]], pages: Option<u32>) -> String {
    let badges: String = badges
        .iter()
        .map(|b| format!(r#"<span class="number orange">{b}</span>"#))
        .collect();
    let rows: String = rows
        .iter()
        .map(|r| {
            format!(
                "<tr class=\"contentLine\"><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                r[0], r[1], r[2], r[3]
            )
        })
        .collect();
    let pager = pages
        .map(|n| format!(r#"<div class="pageer">首页 上一页 下一页 尾页 共 {n} 页</div>"#))
        .unwrap_or_default();
    format!(
        r#"<!DOCTYPE html><html><body>
<h6>本月用电 {badges}</h6>
<table class="dataTable">
<tr class="contentLine"><th>日期</th><th>电表</th><th>用量</th><th>单价</th></tr>
{rows}
</table>
{pager}
</body></html>"#
    )
}

fn error_page() -> String {
    "<!DOCTYPE html><html><body><h2>Server Error in '/' Application.</h2></body></html>"
        .to_string()
}
