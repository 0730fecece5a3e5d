//! End-to-end portal client tests against the fake portal.

mod helpers;

use std::time::Duration;

use chrono::NaiveDate;
use elecfee::portal::{DateRange, Portal, PortalError, PortalSettings, SelectionValues};
use helpers::{FakeOptions, PAGED_RECORDS, paged_record, spawn_portal};

fn range() -> DateRange {
    DateRange::new(
        NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2026, 3, 31).unwrap(),
    )
}

#[tokio::test]
async fn cascade_lists_each_level() {
    let fake = spawn_portal(FakeOptions::default()).await;
    let session = fake.portal().open_session().unwrap();

    let buildings = session.list_buildings().await.unwrap();
    let labels: Vec<_> = buildings.iter().map(|o| (o.text.as_str(), o.value.as_str())).collect();
    assert_eq!(labels, vec![("1号楼", "B01"), ("2号楼", "B02")]);

    let floors = session.list_floors("B01").await.unwrap();
    let labels: Vec<_> = floors.iter().map(|o| o.value.as_str()).collect();
    assert_eq!(labels, vec!["F01", "F03"]);

    let rooms = session.list_rooms("B01", "F03").await.unwrap();
    assert_eq!(rooms.building, "B01");
    assert_eq!(rooms.floor, "F03");
    let labels: Vec<_> = rooms.rooms.iter().map(|o| (o.text.as_str(), o.value.as_str())).collect();
    assert_eq!(labels, vec![("301", "R301"), ("302", "R302")]);
    assert_eq!(rooms.state.fields().get("__VIEWSTATE"), Some("vs-rooms"));

    assert_eq!(fake.bad_postbacks(), 0);
}

#[tokio::test]
async fn scrape_collects_every_page_in_order() {
    let fake = spawn_portal(FakeOptions::default()).await;
    let session = fake.portal().open_session().unwrap();

    let rooms = session.list_rooms("B01", "F03").await.unwrap();
    let values = SelectionValues {
        building: "B01".into(),
        floor: "F03".into(),
        room: "R301".into(),
    };
    let report = session
        .scrape(&values, &rooms.state, range())
        .await
        .expect("scrape should succeed");

    assert_eq!(report.records.len(), PAGED_RECORDS);
    for (n, record) in report.records.iter().enumerate() {
        let [date, meter, usage, price] = paged_record(n);
        assert_eq!(record.date, date);
        assert_eq!(record.meter_name, meter);
        assert_eq!(record.usage, usage);
        assert_eq!(record.price, price);
    }
    assert_eq!(report.remaining_balance.as_deref(), Some(helpers::BALANCE));
    assert_eq!(
        fake.last_range(),
        Some(("2026-01-01".to_string(), "2026-03-31".to_string()))
    );
    assert_eq!(fake.bad_postbacks(), 0);
}

#[tokio::test]
async fn session_cookie_is_echoed() {
    let fake = spawn_portal(FakeOptions::default()).await;
    let session = fake.portal().open_session().unwrap();

    let rooms = session.list_rooms("B01", "F03").await.unwrap();
    let values = SelectionValues {
        building: "B01".into(),
        floor: "F03".into(),
        room: "R302".into(),
    };
    let report = session.scrape(&values, &rooms.state, range()).await.unwrap();
    assert_eq!(report.records.len(), 3);
    assert_eq!(report.remaining_balance, None);

    // entry GET, two cascade postbacks, two scrape postbacks
    assert_eq!(fake.hits(), 5);
    assert_eq!(fake.missing_cookie(), 0);
}

#[tokio::test]
async fn entry_page_retried_after_error_page() {
    let fake = spawn_portal(FakeOptions {
        flaky_entry: 2,
        ..Default::default()
    })
    .await;
    let session = fake.portal().open_session().unwrap();

    let buildings = session.list_buildings().await.unwrap();
    assert_eq!(buildings.len(), 2);
    assert_eq!(fake.entry_gets(), 3);
}

#[tokio::test]
async fn entry_page_gives_up_after_retries() {
    let fake = spawn_portal(FakeOptions {
        flaky_entry: 10,
        ..Default::default()
    })
    .await;
    let session = fake.portal().open_session().unwrap();

    let err = session.list_buildings().await.unwrap_err();
    assert!(
        matches!(err, PortalError::MissingDropdown { id: "drlouming", .. }),
        "{err:?}"
    );
    assert_eq!(fake.entry_gets(), 3);
}

#[tokio::test]
async fn slow_portal_times_out() {
    let fake = spawn_portal(FakeOptions {
        entry_delay: Some(Duration::from_secs(2)),
        ..Default::default()
    })
    .await;
    let portal = Portal::new(PortalSettings {
        request_timeout: Duration::from_millis(200),
        entry_retries: 1,
        ..fake.settings()
    })
    .unwrap();
    let session = portal.open_session().unwrap();

    let err = session.list_buildings().await.unwrap_err();
    assert!(matches!(err, PortalError::Timeout { .. }), "{err:?}");
}

#[tokio::test]
async fn scrape_failure_yields_none() {
    let fake = spawn_portal(FakeOptions::default()).await;
    let session = fake.portal().open_session().unwrap();

    // Hidden state from the entry page, not the room list: the portal rejects it.
    let entry = session.open_entry().await.unwrap();
    let values = SelectionValues {
        building: "B01".into(),
        floor: "F03".into(),
        room: "R301".into(),
    };
    assert!(session.scrape(&values, &entry.state, range()).await.is_none());
    assert_eq!(fake.bad_postbacks(), 1);
}
