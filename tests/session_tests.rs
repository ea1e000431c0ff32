// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::{NaiveDate, NaiveDateTime};
use moneya::commands::calendar::{self, EventPatch, NewEvent};
use moneya::commands::clients::{self, NewClient};
use moneya::commands::transactions::{self, NewTransaction};
use moneya::commands::{auth, categories, profile};
use moneya::db::init_schema;
use moneya::models::TransactionKind;
use moneya::prefs::Prefs;
use moneya::state::{AppState, Language};
use moneya::MoneyaError;
use rusqlite::{params, Connection};
use rust_decimal::Decimal;

fn conn() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    init_schema(&conn).unwrap();
    conn
}

fn signed_up(conn: &Connection, email: &str) -> AppState {
    let mut state = AppState::default();
    auth::sign_up(conn, &mut state, email, "").unwrap();
    state
}

fn income(amount: i64) -> NewTransaction {
    NewTransaction {
        kind: TransactionKind::Income,
        amount: Decimal::from(amount),
        category: None,
        description: "Mission".into(),
        date: NaiveDate::from_ymd_opt(2025, 4, 2).unwrap(),
        client_id: None,
        currency_code: None,
    }
}

fn at(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
}

fn count(conn: &Connection, table: &str, owner: i64) -> i64 {
    conn.query_row(
        &format!("SELECT COUNT(*) FROM {} WHERE user_id=?1", table),
        params![owner],
        |r| r.get(0),
    )
    .unwrap()
}

#[test]
fn create_without_session_is_rejected() {
    let conn = conn();
    let state = AppState::default();
    let err = transactions::create(&conn, &state, income(10)).unwrap_err();
    assert!(matches!(err, MoneyaError::NotAuthenticated));
    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM transactions", [], |r| r.get(0))
        .unwrap();
    assert_eq!(rows, 0);
}

#[test]
fn records_of_other_users_are_invisible() {
    let conn = conn();
    let ana = signed_up(&conn, "ana@example.com");
    let bob = signed_up(&conn, "bob@example.com");
    let t = transactions::create(&conn, &ana, income(10)).unwrap();

    assert!(transactions::delete(&conn, &bob, t.id).unwrap_err().is_not_found());
    assert!(transactions::get(&conn, &bob, t.id).unwrap_err().is_not_found());
    assert!(transactions::list(&conn, &bob, &Default::default()).unwrap().is_empty());
    assert_eq!(transactions::get(&conn, &ana, t.id).unwrap().amount, Decimal::from(10));
}

#[test]
fn client_of_other_user_cannot_be_referenced() {
    let conn = conn();
    let ana = signed_up(&conn, "ana@example.com");
    let bob = signed_up(&conn, "bob@example.com");
    let c = clients::create(
        &conn,
        &ana,
        NewClient {
            name: "Acme".into(),
            email: None,
            phone: None,
            company: None,
            address: None,
            notes: None,
        },
    )
    .unwrap();
    let mut t = income(5);
    t.client_id = Some(c.id);
    assert!(transactions::create(&conn, &bob, t.clone()).unwrap_err().is_not_found());
    assert_eq!(transactions::create(&conn, &ana, t).unwrap().client_id, Some(c.id));
}

#[test]
fn new_transactions_take_session_currency() {
    let conn = conn();
    let mut state = signed_up(&conn, "ana@example.com");
    state.currency = "CHF".into();
    let t = transactions::create(&conn, &state, income(3)).unwrap();
    assert_eq!(t.currency_code.as_deref(), Some("CHF"));

    let mut bad = income(3);
    bad.currency_code = Some("euro".into());
    assert!(matches!(
        transactions::create(&conn, &state, bad).unwrap_err(),
        MoneyaError::Invalid(_)
    ));
}

#[test]
fn sign_in_is_idempotent_for_profiles() {
    let conn = conn();
    let first = signed_up(&conn, "Ana@Example.com");
    let owner = first.user_id().unwrap();
    for _ in 0..3 {
        let mut state = AppState::default();
        let u = auth::sign_in(&conn, &mut state, "ana@example.com").unwrap();
        assert_eq!(u.id, owner);
        auth::ensure_profiles(&conn, &u, &state).unwrap();
    }
    assert_eq!(count(&conn, "profiles", owner), 1);
    assert_eq!(count(&conn, "profiles_private", owner), 1);
    assert_eq!(count(&conn, "subscriptions", owner), 1);

    let view = profile::get(&conn, &first).unwrap();
    assert_eq!(view.profile.display_name, "ana");
}

#[test]
fn duplicate_or_unknown_accounts_are_rejected() {
    let conn = conn();
    signed_up(&conn, "ana@example.com");
    let mut state = AppState::default();
    assert!(auth::sign_up(&conn, &mut state, "ANA@example.com", "Ana").is_err());
    assert!(auth::sign_in(&conn, &mut state, "nobody@example.com").is_err());
    assert!(state.user.is_none());
}

#[test]
fn sign_in_adopts_profile_currency() {
    let conn = conn();
    let ana = signed_up(&conn, "ana@example.com");
    conn.execute(
        "UPDATE profiles SET currency='USD' WHERE user_id=?1",
        params![ana.user_id().unwrap()],
    )
    .unwrap();
    let mut state = AppState::default();
    auth::sign_in(&conn, &mut state, "ana@example.com").unwrap();
    assert_eq!(state.currency, "USD");

    auth::sign_out(&mut state);
    assert!(matches!(state.user_id().unwrap_err(), MoneyaError::NotAuthenticated));
}

#[test]
fn language_is_mirrored_into_profile() {
    let conn = conn();
    let mut state = signed_up(&conn, "ana@example.com");
    profile::set_language(&conn, &mut state, Language::En);
    let view = profile::get(&conn, &state).unwrap();
    assert_eq!(view.profile.language, "en");

    let mut prefs = Prefs::default();
    state.write_prefs(&mut prefs);
    assert_eq!(prefs.language.as_deref(), Some("en"));
    assert_eq!(prefs.session_user_id, state.user.as_ref().map(|u| u.id));
}

#[test]
fn profile_patch_touches_only_given_fields() {
    let conn = conn();
    let state = signed_up(&conn, "ana@example.com");
    profile::update(
        &conn,
        &state,
        profile::ProfilePatch {
            company: Some("Atelier".into()),
            ..Default::default()
        },
    )
    .unwrap();
    let view = profile::update(
        &conn,
        &state,
        profile::ProfilePatch {
            vat_number: Some("FR123".into()),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(view.private.company.as_deref(), Some("Atelier"));
    assert_eq!(view.private.vat_number.as_deref(), Some("FR123"));
}

#[test]
fn default_categories_seed_once() {
    let conn = conn();
    let state = signed_up(&conn, "ana@example.com");
    let mut prefs = Prefs::default();

    let added = categories::init_defaults(&conn, &state, &mut prefs).unwrap();
    assert_eq!(added, categories::DEFAULT_CATEGORIES.len());
    assert_eq!(categories::init_defaults(&conn, &state, &mut prefs).unwrap(), 0);

    let mut fresh_device = Prefs::default();
    assert_eq!(categories::init_defaults(&conn, &state, &mut fresh_device).unwrap(), 0);
    assert_eq!(
        categories::list(&conn, &state, Some(TransactionKind::Income)).unwrap().len(),
        3
    );
}

#[test]
fn event_end_must_follow_start() {
    let conn = conn();
    let state = signed_up(&conn, "ana@example.com");
    let bad = NewEvent {
        title: "Call".into(),
        description: None,
        starts_at: at("2025-05-02 10:00"),
        ends_at: at("2025-05-02 09:00"),
        client_id: None,
    };
    assert!(matches!(
        calendar::create(&conn, &state, bad).unwrap_err(),
        MoneyaError::Invalid(_)
    ));

    let ev = calendar::create(
        &conn,
        &state,
        NewEvent {
            title: "Call".into(),
            description: None,
            starts_at: at("2025-05-02 10:00"),
            ends_at: at("2025-05-02 11:00"),
            client_id: None,
        },
    )
    .unwrap();
    let moved = EventPatch {
        starts_at: Some(at("2025-05-02 12:00")),
        ..Default::default()
    };
    assert!(calendar::update(&conn, &state, ev.id, moved).is_err());
}
