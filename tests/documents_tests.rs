// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::NaiveDate;
use moneya::commands::documents::NewDocument;
use moneya::commands::transactions::{self, TransactionFilter};
use moneya::commands::{auth, invoices, quotations};
use moneya::db::init_schema;
use moneya::models::{InvoiceStatus, LineItem, QuotationStatus, TransactionKind};
use moneya::state::{AppState, Language, View};
use moneya::MoneyaError;
use rusqlite::Connection;
use rust_decimal::Decimal;

fn setup() -> (Connection, AppState) {
    let conn = Connection::open_in_memory().unwrap();
    init_schema(&conn).unwrap();
    let mut state = AppState::new(Language::Fr, "EUR");
    auth::sign_up(&conn, &mut state, "lea@example.com", "Léa").unwrap();
    (conn, state)
}

fn doc(number: Option<&str>, amount: Option<i64>) -> NewDocument {
    NewDocument {
        number: number.map(str::to_string),
        client_id: None,
        amount: amount.map(Decimal::from),
        items: vec![LineItem {
            description: "Audit".into(),
            quantity: Decimal::from(2),
            unit_price: Decimal::from(40),
        }],
        currency_code: None,
        issue_date: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
        end_date: None,
        notes: None,
    }
}

fn paid_bookings(conn: &Connection, state: &AppState, number: &str) -> usize {
    let wanted = invoices::paid_description(number);
    transactions::list(conn, state, &TransactionFilter::default())
        .unwrap()
        .into_iter()
        .filter(|t| t.description == wanted)
        .count()
}

#[test]
fn numbers_follow_highest_suffix() {
    let (conn, state) = setup();
    let a = invoices::create(&conn, &state, doc(None, None), InvoiceStatus::Draft).unwrap();
    let b = invoices::create(&conn, &state, doc(None, None), InvoiceStatus::Draft).unwrap();
    assert_eq!(a.number, "INV-001");
    assert_eq!(b.number, "INV-002");

    invoices::create(&conn, &state, doc(Some("INV-010"), None), InvoiceStatus::Draft).unwrap();
    let c = invoices::create(&conn, &state, doc(None, None), InvoiceStatus::Draft).unwrap();
    assert_eq!(c.number, "INV-011");

    let q = quotations::create(&conn, &state, doc(None, None), QuotationStatus::Draft).unwrap();
    assert_eq!(q.number, "QUO-001");
}

#[test]
fn amount_defaults_to_item_total() {
    let (conn, state) = setup();
    let inv = invoices::create(&conn, &state, doc(None, None), InvoiceStatus::Draft).unwrap();
    assert_eq!(inv.amount, Decimal::from(80));
    assert_eq!(inv.currency_code.as_deref(), Some("EUR"));

    let explicit = invoices::create(&conn, &state, doc(None, Some(95)), InvoiceStatus::Draft).unwrap();
    assert_eq!(explicit.amount, Decimal::from(95));
}

#[test]
fn item_total_out_of_range_is_rejected() {
    let (conn, state) = setup();
    let mut huge = doc(None, None);
    huge.items[0].unit_price = Decimal::MAX;
    let err = invoices::create(&conn, &state, huge, InvoiceStatus::Draft).unwrap_err();
    assert!(matches!(err, MoneyaError::Invalid(_)));

    let next = invoices::create(&conn, &state, doc(None, None), InvoiceStatus::Draft).unwrap();
    assert_eq!(next.number, "INV-001");
}

#[test]
fn paying_an_invoice_books_one_income() {
    let (conn, state) = setup();
    let inv = invoices::create(&conn, &state, doc(None, Some(100)), InvoiceStatus::Sent).unwrap();
    assert_eq!(paid_bookings(&conn, &state, "INV-001"), 0);

    state.cache.mark_fresh(View::Transactions);
    invoices::set_status(&conn, &state, inv.id, InvoiceStatus::Paid).unwrap();
    assert!(state.cache.is_stale(View::Transactions));

    let booked: Vec<_> = transactions::list(&conn, &state, &TransactionFilter::default())
        .unwrap()
        .into_iter()
        .filter(|t| t.description == "Facture INV-001 payée")
        .collect();
    assert_eq!(booked.len(), 1);
    assert_eq!(booked[0].kind, TransactionKind::Income);
    assert_eq!(booked[0].amount, Decimal::from(100));
    assert_eq!(booked[0].category.as_deref(), Some(invoices::PAID_CATEGORY));
    assert_eq!(booked[0].currency_code.as_deref(), Some("EUR"));

    invoices::set_status(&conn, &state, inv.id, InvoiceStatus::Paid).unwrap();
    assert_eq!(paid_bookings(&conn, &state, "INV-001"), 1);
}

#[test]
fn invoice_created_paid_is_booked() {
    let (conn, state) = setup();
    invoices::create(&conn, &state, doc(None, Some(60)), InvoiceStatus::Paid).unwrap();
    assert_eq!(paid_bookings(&conn, &state, "INV-001"), 1);
}

#[test]
fn other_status_changes_do_not_book() {
    let (conn, state) = setup();
    let inv = invoices::create(&conn, &state, doc(None, None), InvoiceStatus::Draft).unwrap();
    invoices::set_status(&conn, &state, inv.id, InvoiceStatus::Overdue).unwrap();
    assert_eq!(paid_bookings(&conn, &state, &inv.number), 0);
}

#[test]
fn accepted_quotation_becomes_draft_invoice() {
    let (conn, state) = setup();
    let q = quotations::create(&conn, &state, doc(None, Some(120)), QuotationStatus::Accepted).unwrap();

    let inv = quotations::convert_to_invoice(&conn, &state, q.id).unwrap();
    assert_eq!(inv.status, InvoiceStatus::Draft);
    assert_eq!(inv.number, "INV-001");
    assert_eq!(inv.amount, Decimal::from(120));
    assert_eq!(inv.items, q.items);
    assert_eq!(inv.currency_code, q.currency_code);
    assert_eq!(inv.notes.as_deref(), Some("Devis QUO-001"));
}

#[test]
fn draft_quotation_cannot_be_invoiced() {
    let (conn, state) = setup();
    let q = quotations::create(&conn, &state, doc(None, None), QuotationStatus::Draft).unwrap();
    let err = quotations::convert_to_invoice(&conn, &state, q.id).unwrap_err();
    assert!(matches!(err, MoneyaError::Invalid(_)));
}

#[test]
fn unknown_client_is_rejected() {
    let (conn, state) = setup();
    let mut new = doc(None, None);
    new.client_id = Some(999);
    let err = invoices::create(&conn, &state, new, InvoiceStatus::Draft).unwrap_err();
    assert!(err.is_not_found());
}
