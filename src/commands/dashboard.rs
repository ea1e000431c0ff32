// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::cli::date_range_args;
use crate::commands::transactions::{self, TransactionFilter};
use crate::commands::{calendar, invoices, tasks};
use crate::error::Result;
use crate::models::{InvoiceStatus, TaskStatus, TransactionKind};
use crate::state::{AppState, View};
use crate::utils::{fmt_money, maybe_print_json, pretty_table, DateRange};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub currency: String,
    pub income: Decimal,
    pub expense: Decimal,
    pub savings: Decimal,
    pub net: Decimal,
    pub unpaid_invoices: usize,
    pub unpaid_total: Decimal,
    pub open_tasks: usize,
    pub upcoming_events: usize,
    /// Rows tagged with a currency other than the session one. Their amounts
    /// are left out of the totals above.
    pub foreign_rows: usize,
}

/// Totals for the window. Only amounts in the session currency are summed;
/// a currency sync normally leaves nothing else behind.
pub fn summary(conn: &rusqlite::Connection, state: &AppState, range: &DateRange) -> Result<Summary> {
    let mut s = Summary {
        currency: state.currency.clone(),
        ..Summary::default()
    };
    let in_ccy = |c: Option<&str>| c.is_none_or(|c| c == state.currency);

    let filter = TransactionFilter {
        range: *range,
        ..TransactionFilter::default()
    };
    for t in transactions::list(conn, state, &filter)? {
        if !in_ccy(t.currency_code.as_deref()) {
            s.foreign_rows += 1;
            continue;
        }
        match t.kind {
            TransactionKind::Income => s.income += t.amount,
            TransactionKind::Expense => s.expense += t.amount.abs(),
            TransactionKind::Savings => s.savings += t.amount.abs(),
        }
    }
    s.net = s.income - s.expense - s.savings;

    for status in [InvoiceStatus::Sent, InvoiceStatus::Overdue] {
        let f = invoices::InvoiceFilter {
            status: Some(status),
            ..invoices::InvoiceFilter::default()
        };
        for inv in invoices::list(conn, state, &f)? {
            s.unpaid_invoices += 1;
            if in_ccy(inv.currency_code.as_deref()) {
                s.unpaid_total += inv.amount;
            } else {
                s.foreign_rows += 1;
            }
        }
    }

    s.open_tasks = tasks::list(conn, state, &tasks::TaskFilter::default())?
        .into_iter()
        .filter(|t| t.status != TaskStatus::Done)
        .count();

    let today = Utc::now().date_naive();
    let week = DateRange::new(Some(today), Some(today + Duration::days(7)));
    s.upcoming_events = calendar::list(conn, state, &week)?.len();

    state.cache.mark_fresh(View::Dashboard);
    Ok(s)
}

pub fn handle(conn: &rusqlite::Connection, state: &AppState, m: &clap::ArgMatches) -> anyhow::Result<()> {
    let s = summary(conn, state, &date_range_args(m)?)?;
    if !maybe_print_json(m.get_flag("json"), false, &s)? {
        let ccy = Some(s.currency.as_str());
        let rows = vec![
            vec!["Income".into(), fmt_money(&s.income, ccy)],
            vec!["Expenses".into(), fmt_money(&s.expense, ccy)],
            vec!["Savings".into(), fmt_money(&s.savings, ccy)],
            vec!["Net".into(), fmt_money(&s.net, ccy)],
            vec![
                "Unpaid invoices".into(),
                format!("{} ({})", s.unpaid_invoices, fmt_money(&s.unpaid_total, ccy)),
            ],
            vec!["Open tasks".into(), s.open_tasks.to_string()],
            vec!["Events next 7 days".into(), s.upcoming_events.to_string()],
        ];
        println!("{}", pretty_table(&["Metric", "Value"], rows));
        if s.foreign_rows > 0 {
            println!(
                "{} record(s) not in {} were left out of the totals.",
                s.foreign_rows, s.currency
            );
        }
    }
    Ok(())
}
