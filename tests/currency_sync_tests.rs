// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::NaiveDate;
use moneya::commands::currency::{self, apply_plan, plan_currency_sync};
use moneya::commands::documents::NewDocument;
use moneya::commands::fx::RateTable;
use moneya::commands::transactions::{self, NewTransaction};
use moneya::commands::{auth, invoices};
use moneya::db::init_schema;
use moneya::models::{InvoiceStatus, LineItem, TransactionKind};
use moneya::state::{AppState, Language, NoticeLevel, View};
use moneya::utils::set_setting;
use moneya::MoneyaError;
use rusqlite::{params, Connection};
use rust_decimal::Decimal;

fn setup() -> (Connection, AppState) {
    let conn = Connection::open_in_memory().unwrap();
    init_schema(&conn).unwrap();
    let mut state = AppState::new(Language::En, "EUR");
    auth::sign_up(&conn, &mut state, "ana@example.com", "Ana").unwrap();
    (conn, state)
}

fn usd_rates() -> RateTable {
    RateTable::with_rates([("USD", Decimal::new(11, 1)), ("GBP", Decimal::new(85, 2))])
}

fn d(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
}

fn add_tx(conn: &Connection, state: &AppState, amount: &str, ccy: Option<&str>) -> i64 {
    transactions::create(
        conn,
        state,
        NewTransaction {
            kind: TransactionKind::Income,
            amount: d(amount),
            category: None,
            description: "work".into(),
            date: day(),
            client_id: None,
            currency_code: ccy.map(str::to_string),
        },
    )
    .unwrap()
    .id
}

fn invoice_with_items(
    conn: &Connection,
    state: &AppState,
    design_qty: &str,
    amount: Option<&str>,
) -> i64 {
    invoices::create(
        conn,
        state,
        NewDocument {
            number: None,
            client_id: None,
            amount: amount.map(d),
            items: vec![
                LineItem {
                    description: "Design".into(),
                    quantity: d(design_qty),
                    unit_price: d("50.00"),
                },
                LineItem {
                    description: "Hosting".into(),
                    quantity: Decimal::ONE,
                    unit_price: d("30.00"),
                },
            ],
            currency_code: Some("EUR".into()),
            issue_date: day(),
            end_date: None,
            notes: None,
        },
        InvoiceStatus::Draft,
    )
    .unwrap()
    .id
}

#[test]
fn usd_transaction_converts_to_eur() {
    let (conn, mut state) = setup();
    state.currency = "USD".into();
    let id = add_tx(&conn, &state, "100.00", Some("USD"));

    let report = currency::change_currency(&conn, &mut state, "EUR", &usd_rates()).unwrap();
    assert_eq!(report.converted, 1);
    assert_eq!(state.currency, "EUR");

    let t = transactions::get(&conn, &state, id).unwrap();
    assert_eq!(t.amount, d("90.91"));
    assert_eq!(t.currency_code.as_deref(), Some("EUR"));

    let notices = state.take_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Success);
    assert_eq!(notices[0].message, "1 records converted to EUR");
}

#[test]
fn round_trip_stays_within_a_cent() {
    let (conn, mut state) = setup();
    let id = add_tx(&conn, &state, "123.45", Some("EUR"));
    let rates = usd_rates();

    currency::change_currency(&conn, &mut state, "GBP", &rates).unwrap();
    currency::change_currency(&conn, &mut state, "EUR", &rates).unwrap();

    let t = transactions::get(&conn, &state, id).unwrap();
    assert!((t.amount - d("123.45")).abs() <= d("0.01"), "got {}", t.amount);
}

#[test]
fn same_currency_is_a_no_op() {
    let (conn, mut state) = setup();
    let id = add_tx(&conn, &state, "10.00", Some("EUR"));
    state.take_notices();
    state.cache.mark_fresh(View::Transactions);

    let report =
        currency::sync_currency(&conn, &state, "EUR", "EUR", &RateTable::new()).unwrap();
    assert_eq!(report.converted, 0);
    assert!(state.take_notices().is_empty());
    assert!(!state.cache.is_stale(View::Transactions));
    assert_eq!(transactions::get(&conn, &state, id).unwrap().amount, d("10.00"));
}

#[test]
fn untagged_rows_use_the_old_currency() {
    let (conn, mut state) = setup();
    let id = add_tx(&conn, &state, "50.00", Some("EUR"));
    conn.execute(
        "UPDATE transactions SET currency_code=NULL WHERE id=?1",
        params![id],
    )
    .unwrap();

    currency::change_currency(&conn, &mut state, "USD", &usd_rates()).unwrap();
    let t = transactions::get(&conn, &state, id).unwrap();
    assert_eq!(t.amount, d("55.00"));
    assert_eq!(t.currency_code.as_deref(), Some("USD"));
}

#[test]
fn rows_already_in_target_are_skipped() {
    let (conn, mut state) = setup();
    add_tx(&conn, &state, "10.00", Some("EUR"));
    let usd = add_tx(&conn, &state, "20.00", Some("USD"));

    let report = currency::change_currency(&conn, &mut state, "USD", &usd_rates()).unwrap();
    assert_eq!(report.converted, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(transactions::get(&conn, &state, usd).unwrap().amount, d("20.00"));
}

#[test]
fn invoice_items_and_amount_convert() {
    let (conn, mut state) = setup();
    let id = invoice_with_items(&conn, &state, "2", None);
    assert_eq!(invoices::get(&conn, &state, id).unwrap().amount, d("130.00"));

    currency::change_currency(&conn, &mut state, "USD", &usd_rates()).unwrap();
    let inv = invoices::get(&conn, &state, id).unwrap();
    let prices: Vec<Decimal> = inv.items.iter().map(|i| i.unit_price).collect();
    assert_eq!(prices, vec![d("55.00"), d("33.00")]);
    let quantities: Vec<Decimal> = inv.items.iter().map(|i| i.quantity).collect();
    assert_eq!(quantities, vec![d("2"), d("1")]);
    assert_eq!(inv.amount, d("143.00"));
    assert_eq!(inv.currency_code.as_deref(), Some("USD"));
}

#[test]
fn invoice_amount_is_not_rebuilt_from_items() {
    let (conn, mut state) = setup();
    let id = invoice_with_items(&conn, &state, "1", Some("200.00"));

    currency::change_currency(&conn, &mut state, "USD", &usd_rates()).unwrap();
    let inv = invoices::get(&conn, &state, id).unwrap();
    assert_eq!(inv.amount, d("220.00"));
}

#[test]
fn missing_rate_changes_nothing() {
    let (conn, mut state) = setup();
    let id = add_tx(&conn, &state, "10.00", Some("EUR"));

    let err = currency::change_currency(&conn, &mut state, "JPY", &usd_rates()).unwrap_err();
    assert!(matches!(err, MoneyaError::MissingRate(_)));
    assert_eq!(state.currency, "EUR");
    assert_eq!(transactions::get(&conn, &state, id).unwrap().amount, d("10.00"));
    let notices = state.take_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Error);
}

#[test]
fn stale_plan_rolls_back_whole_apply() {
    let (conn, state) = setup();
    let owner = state.user_id().unwrap();
    let first = add_tx(&conn, &state, "10.00", Some("EUR"));
    let second = add_tx(&conn, &state, "20.00", Some("EUR"));

    let plan = plan_currency_sync(&conn, owner, "EUR", "USD", &usd_rates()).unwrap();
    assert_eq!(plan.conversions.len(), 2);

    conn.execute(
        "UPDATE transactions SET currency_code='GBP' WHERE id=?1",
        params![second],
    )
    .unwrap();

    let err = apply_plan(&conn, owner, &plan).unwrap_err();
    assert!(matches!(err, MoneyaError::Conflict(_)));
    let t = transactions::get(&conn, &state, first).unwrap();
    assert_eq!(t.amount, d("10.00"));
    assert_eq!(t.currency_code.as_deref(), Some("EUR"));
    let profile_ccy: String = conn
        .query_row("SELECT currency FROM profiles WHERE user_id=?1", params![owner], |r| r.get(0))
        .unwrap();
    assert_eq!(profile_ccy, "EUR");
}

#[test]
fn sync_updates_profile_currency() {
    let (conn, mut state) = setup();
    let owner = state.user_id().unwrap();
    currency::change_currency(&conn, &mut state, "usd", &usd_rates()).unwrap();
    let profile_ccy: String = conn
        .query_row("SELECT currency FROM profiles WHERE user_id=?1", params![owner], |r| r.get(0))
        .unwrap();
    assert_eq!(profile_ccy, "USD");
    assert!(state.cache.is_stale(View::Invoices));
}

#[test]
fn sync_without_session_is_rejected() {
    let conn = Connection::open_in_memory().unwrap();
    init_schema(&conn).unwrap();
    let mut state = AppState::default();
    let err = currency::change_currency(&conn, &mut state, "USD", &usd_rates()).unwrap_err();
    assert!(matches!(err, MoneyaError::NotAuthenticated));
}

/// Every time one transaction is converted, retag the user's other EUR rows
/// to GBP so their guarded update no longer matches.
fn retag_siblings_on_convert(conn: &Connection) {
    conn.execute_batch(
        "CREATE TRIGGER retag_siblings AFTER UPDATE OF currency_code ON transactions
         BEGIN
             UPDATE transactions SET currency_code='GBP'
             WHERE user_id=NEW.user_id AND id<>NEW.id AND currency_code='EUR';
         END;",
    )
    .unwrap();
}

#[test]
fn persistent_conflict_gives_up_after_max_attempts() {
    let (conn, state) = setup();
    let owner = state.user_id().unwrap();
    let first = add_tx(&conn, &state, "10.00", Some("EUR"));
    let second = add_tx(&conn, &state, "20.00", Some("EUR"));
    set_setting(&conn, "sync_max_attempts", "2").unwrap();
    retag_siblings_on_convert(&conn);
    state.take_notices();

    let err = currency::sync_currency(&conn, &state, "EUR", "USD", &usd_rates()).unwrap_err();
    assert!(matches!(err, MoneyaError::Conflict(_)));

    for (id, amount) in [(first, "10.00"), (second, "20.00")] {
        let t = transactions::get(&conn, &state, id).unwrap();
        assert_eq!(t.amount, d(amount));
        assert_eq!(t.currency_code.as_deref(), Some("EUR"));
    }
    let profile_ccy: String = conn
        .query_row("SELECT currency FROM profiles WHERE user_id=?1", params![owner], |r| r.get(0))
        .unwrap();
    assert_eq!(profile_ccy, "EUR");
    let notices = state.take_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Error);
    assert!(notices[0].message.starts_with("Currency conversion failed"));
}

#[test]
fn sync_succeeds_once_the_conflict_is_gone() {
    let (conn, state) = setup();
    let first = add_tx(&conn, &state, "10.00", Some("EUR"));
    let second = add_tx(&conn, &state, "20.00", Some("EUR"));
    retag_siblings_on_convert(&conn);
    assert!(matches!(
        currency::sync_currency(&conn, &state, "EUR", "USD", &usd_rates()).unwrap_err(),
        MoneyaError::Conflict(_)
    ));

    conn.execute_batch("DROP TRIGGER retag_siblings").unwrap();
    let report = currency::sync_currency(&conn, &state, "EUR", "USD", &usd_rates()).unwrap();
    assert_eq!(report.converted, 2);
    assert_eq!(report.attempts, 1);
    assert_eq!(transactions::get(&conn, &state, first).unwrap().amount, d("11.00"));
    assert_eq!(transactions::get(&conn, &state, second).unwrap().amount, d("22.00"));
}

#[test]
fn invalid_max_attempts_setting_is_rejected() {
    let (conn, state) = setup();
    add_tx(&conn, &state, "10.00", Some("EUR"));
    set_setting(&conn, "sync_max_attempts", "0").unwrap();
    let err = currency::sync_currency(&conn, &state, "EUR", "USD", &usd_rates()).unwrap_err();
    assert!(matches!(err, MoneyaError::Invalid(_)));
}

#[test]
fn amount_too_large_for_target_aborts_before_writing() {
    let (conn, mut state) = setup();
    let small = add_tx(&conn, &state, "10.00", Some("EUR"));
    let huge = add_tx(&conn, &state, "10000000000000000000000000", Some("EUR"));
    let rates = RateTable::with_rates([("IDR", Decimal::from(17000))]);

    let err = currency::change_currency(&conn, &mut state, "IDR", &rates).unwrap_err();
    assert!(matches!(err, MoneyaError::Invalid(_)));
    assert_eq!(state.currency, "EUR");
    assert_eq!(transactions::get(&conn, &state, small).unwrap().amount, d("10.00"));
    let t = transactions::get(&conn, &state, huge).unwrap();
    assert_eq!(t.currency_code.as_deref(), Some("EUR"));
}
