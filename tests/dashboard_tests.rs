// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::{Duration, NaiveDate, Utc};
use moneya::commands::calendar::{self, NewEvent};
use moneya::commands::documents::NewDocument;
use moneya::commands::tasks::{self, NewTask, TaskFilter};
use moneya::commands::{auth, dashboard, invoices};
use moneya::db::init_schema;
use moneya::models::{InvoiceStatus, TaskPriority, TaskStatus};
use moneya::state::AppState;
use moneya::utils::DateRange;
use rusqlite::{params, Connection};
use rust_decimal::Decimal;

fn setup() -> (Connection, AppState) {
    let conn = Connection::open_in_memory().unwrap();
    init_schema(&conn).unwrap();
    let mut state = AppState::default();
    let user = auth::sign_up(&conn, &mut state, "ana@example.com", "Ana").unwrap();
    for (kind, amount, ccy) in [
        ("income", "1000", "EUR"),
        ("expense", "-250.50", "EUR"),
        ("savings", "100", "EUR"),
        ("income", "40", "USD"),
    ] {
        conn.execute(
            "INSERT INTO transactions(user_id,kind,amount,description,date,currency_code) VALUES (?1,?2,?3,'x','2025-06-10',?4)",
            params![user.id, kind, amount, ccy],
        )
        .unwrap();
    }
    (conn, state)
}

fn task(title: &str, status: TaskStatus) -> NewTask {
    NewTask {
        title: title.into(),
        description: None,
        status,
        priority: TaskPriority::Medium,
        due_date: NaiveDate::from_ymd_opt(2025, 6, 30),
        client_id: None,
    }
}

#[test]
fn summary_totals_session_currency_only() {
    let (conn, state) = setup();
    let s = dashboard::summary(&conn, &state, &DateRange::default()).unwrap();
    assert_eq!(s.currency, "EUR");
    assert_eq!(s.income, Decimal::from(1000));
    assert_eq!(s.expense, "250.50".parse::<Decimal>().unwrap());
    assert_eq!(s.savings, Decimal::from(100));
    assert_eq!(s.net, "649.50".parse::<Decimal>().unwrap());
    assert_eq!(s.foreign_rows, 1);
}

#[test]
fn summary_counts_unpaid_tasks_and_events() {
    let (conn, state) = setup();
    for status in [InvoiceStatus::Sent, InvoiceStatus::Overdue, InvoiceStatus::Paid] {
        invoices::create(
            &conn,
            &state,
            NewDocument {
                number: None,
                client_id: None,
                amount: Some(Decimal::from(50)),
                items: Vec::new(),
                currency_code: None,
                issue_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
                end_date: None,
                notes: None,
            },
            status,
        )
        .unwrap();
    }
    tasks::create(&conn, &state, task("Send quote", TaskStatus::Todo)).unwrap();
    tasks::create(&conn, &state, task("Archive", TaskStatus::Done)).unwrap();
    let start = Utc::now().naive_utc() + Duration::days(1);
    calendar::create(
        &conn,
        &state,
        NewEvent {
            title: "Kickoff".into(),
            description: None,
            starts_at: start,
            ends_at: start + Duration::hours(1),
            client_id: None,
        },
    )
    .unwrap();

    let s = dashboard::summary(&conn, &state, &DateRange::default()).unwrap();
    assert_eq!(s.unpaid_invoices, 2);
    assert_eq!(s.unpaid_total, Decimal::from(100));
    assert_eq!(s.open_tasks, 1);
    assert_eq!(s.upcoming_events, 1);
}

#[test]
fn tasks_filter_and_complete() {
    let (conn, state) = setup();
    let t = tasks::create(&conn, &state, task("Invoice Acme", TaskStatus::Todo)).unwrap();
    tasks::create(&conn, &state, task("Call bank", TaskStatus::InProgress)).unwrap();

    let todo = tasks::list(
        &conn,
        &state,
        &TaskFilter {
            status: Some(TaskStatus::Todo),
            ..TaskFilter::default()
        },
    )
    .unwrap();
    assert_eq!(todo.len(), 1);

    let done = tasks::update(
        &conn,
        &state,
        t.id,
        tasks::TaskPatch {
            status: Some(TaskStatus::Done),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(done.status, TaskStatus::Done);
    assert_eq!(done.title, "Invoice Acme");
    assert!(tasks::create(&conn, &state, task("  ", TaskStatus::Todo)).is_err());
}
