// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use crate::cli::{date_range_args, id_arg, opt_string};
use crate::commands::documents::{self, DocKind, DocumentPatch, NewDocument};
use crate::commands::transactions::{self, NewTransaction};
use crate::error::{MoneyaError, Result};
use crate::models::{Invoice, InvoiceStatus, TransactionKind};
use crate::state::{AppState, NoticeLevel, View};
use crate::utils::{
    decimal_at, delete_owned, fmt_money, items_at, maybe_print_json, parse_date, parse_decimal,
    pretty_table, require_client, update_owned, DateRange,
};

const COLUMNS: &str = "id, user_id, number, client_id, status, amount, items, currency_code, issue_date, due_date, notes";

pub const PAID_CATEGORY: &str = "Factures";

/// Description of the income transaction booked when an invoice is paid.
pub fn paid_description(number: &str) -> String {
    format!("Facture {} payée", number)
}

#[derive(Debug, Clone, Default)]
pub struct InvoicePatch {
    pub doc: DocumentPatch,
    pub status: Option<InvoiceStatus>,
}

#[derive(Debug, Clone, Default)]
pub struct InvoiceFilter {
    pub range: DateRange,
    pub status: Option<InvoiceStatus>,
    pub client_id: Option<i64>,
}

fn from_row(r: &Row<'_>) -> rusqlite::Result<Invoice> {
    Ok(Invoice {
        id: r.get(0)?,
        user_id: r.get(1)?,
        number: r.get(2)?,
        client_id: r.get(3)?,
        status: r.get(4)?,
        amount: decimal_at(r, 5)?,
        items: items_at(r, 6)?,
        currency_code: r.get(7)?,
        issue_date: r.get(8)?,
        due_date: r.get(9)?,
        notes: r.get(10)?,
    })
}

fn query(conn: &Connection, owner: i64, f: &InvoiceFilter) -> Result<Vec<Invoice>> {
    let (sql, args) = documents::list_query(
        DocKind::Invoice,
        COLUMNS,
        owner,
        &f.range,
        f.status.as_ref().map(InvoiceStatus::as_str),
        f.client_id,
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(args), from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn fetch(conn: &Connection, owner: i64, id: i64) -> Result<Invoice> {
    let sql = format!("SELECT {} FROM invoices WHERE id=?1 AND user_id=?2", COLUMNS);
    conn.query_row(&sql, params![id, owner], from_row)
        .optional()?
        .ok_or(MoneyaError::not_found("invoice", id))
}

pub fn all_for_owner(conn: &Connection, owner: i64) -> Result<Vec<Invoice>> {
    query(conn, owner, &InvoiceFilter::default())
}

pub fn list(conn: &Connection, state: &AppState, f: &InvoiceFilter) -> Result<Vec<Invoice>> {
    let rows = query(conn, state.user_id()?, f)?;
    state.cache.mark_fresh(View::Invoices);
    Ok(rows)
}

pub fn get(conn: &Connection, state: &AppState, id: i64) -> Result<Invoice> {
    fetch(conn, state.user_id()?, id)
}

pub fn create(
    conn: &Connection,
    state: &AppState,
    new: NewDocument,
    status: InvoiceStatus,
) -> Result<Invoice> {
    let owner = state.user_id()?;
    let tx = conn.unchecked_transaction()?;
    let id = documents::insert(&tx, DocKind::Invoice, owner, &new, status.as_str(), &state.currency)?;
    let inv = fetch(&tx, owner, id)?;
    let mut views = DocKind::Invoice.views().to_vec();
    if status == InvoiceStatus::Paid && record_payment(&tx, owner, &inv, &state.currency)? {
        views.push(View::Transactions);
    }
    tx.commit()?;
    state.cache.invalidate(&views);
    Ok(inv)
}

/// Books the income transaction for a paid invoice unless one with the same
/// description already exists. Returns whether a row was inserted.
fn record_payment(conn: &Connection, owner: i64, inv: &Invoice, fallback_ccy: &str) -> Result<bool> {
    let description = paid_description(&inv.number);
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM transactions WHERE user_id=?1 AND kind='income' AND description=?2 LIMIT 1",
            params![owner, description],
            |r| r.get(0),
        )
        .optional()?;
    if let Some(tid) = existing {
        log::debug!("invoice {} already booked as transaction {}", inv.number, tid);
        return Ok(false);
    }
    let currency = inv.currency_code.as_deref().unwrap_or(fallback_ccy);
    let tid = transactions::insert(
        conn,
        owner,
        &NewTransaction {
            kind: TransactionKind::Income,
            amount: inv.amount,
            category: Some(PAID_CATEGORY.to_string()),
            description,
            date: Utc::now().date_naive(),
            client_id: inv.client_id,
            currency_code: Some(currency.to_string()),
        },
        currency,
    )?;
    log::info!("invoice {} paid, booked income transaction {}", inv.number, tid);
    Ok(true)
}

/// Partial update. Setting the status to `paid` also books the matching
/// income transaction, at most once per invoice number.
pub fn update(conn: &Connection, state: &AppState, id: i64, patch: InvoicePatch) -> Result<Invoice> {
    let owner = state.user_id()?;
    let status = patch.status;
    let tx = conn.unchecked_transaction()?;
    require_client(&tx, owner, patch.doc.client_id)?;
    let mut sets = patch.doc.into_sets(DocKind::Invoice)?;
    if let Some(s) = status {
        sets.push(("status", Value::Text(s.as_str().to_string())));
    }
    update_owned(&tx, "invoices", "invoice", id, owner, sets)?;
    let inv = fetch(&tx, owner, id)?;
    let mut views = DocKind::Invoice.views().to_vec();
    if status == Some(InvoiceStatus::Paid) && record_payment(&tx, owner, &inv, &state.currency)? {
        views.push(View::Transactions);
    }
    tx.commit()?;
    state.cache.invalidate(&views);
    Ok(inv)
}

pub fn set_status(conn: &Connection, state: &AppState, id: i64, status: InvoiceStatus) -> Result<Invoice> {
    update(
        conn,
        state,
        id,
        InvoicePatch {
            status: Some(status),
            ..InvoicePatch::default()
        },
    )
}

pub fn delete(conn: &Connection, state: &AppState, id: i64) -> Result<()> {
    let owner = state.user_id()?;
    delete_owned(conn, "invoices", "invoice", id, owner)?;
    state.cache.invalidate(DocKind::Invoice.views());
    Ok(())
}

fn patch_from_args(sub: &clap::ArgMatches) -> anyhow::Result<InvoicePatch> {
    Ok(InvoicePatch {
        doc: DocumentPatch {
            client_id: sub.get_one::<i64>("client").copied(),
            amount: match sub.get_one::<String>("amount") {
                Some(a) => Some(parse_decimal(a)?),
                None => None,
            },
            items: documents::items_from_args(sub)?,
            issue_date: match sub.get_one::<String>("date") {
                Some(d) => Some(parse_date(d)?),
                None => None,
            },
            end_date: match sub.get_one::<String>("due") {
                Some(d) => Some(parse_date(d)?),
                None => None,
            },
            notes: opt_string(sub, "notes"),
        },
        status: match sub.get_one::<String>("status") {
            Some(s) => Some(s.parse()?),
            None => None,
        },
    })
}

fn print_list(data: Vec<Invoice>, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
        let rows = data
            .into_iter()
            .map(|i| {
                vec![
                    i.id.to_string(),
                    i.number,
                    i.issue_date.to_string(),
                    i.due_date.map(|d| d.to_string()).unwrap_or_default(),
                    i.status.to_string(),
                    fmt_money(&i.amount, i.currency_code.as_deref()),
                    i.items.len().to_string(),
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(&["ID", "Number", "Issued", "Due", "Status", "Amount", "Items"], rows)
        );
    }
    Ok(())
}

pub fn handle(conn: &Connection, state: &AppState, m: &clap::ArgMatches) -> anyhow::Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let patch = patch_from_args(sub)?;
            let new = NewDocument {
                number: opt_string(sub, "number"),
                client_id: patch.doc.client_id,
                amount: patch.doc.amount,
                items: patch.doc.items.unwrap_or_default(),
                currency_code: opt_string(sub, "currency"),
                issue_date: patch.doc.issue_date.unwrap_or_else(|| Utc::now().date_naive()),
                end_date: patch.doc.end_date,
                notes: patch.doc.notes,
            };
            let inv = create(conn, state, new, patch.status.unwrap_or(InvoiceStatus::Draft))?;
            state.notify(
                NoticeLevel::Success,
                format!(
                    "Created invoice {} for {}",
                    inv.number,
                    fmt_money(&inv.amount, inv.currency_code.as_deref())
                ),
            );
        }
        Some(("list", sub)) => {
            let f = InvoiceFilter {
                range: date_range_args(sub)?,
                status: match sub.get_one::<String>("status") {
                    Some(s) => Some(s.parse()?),
                    None => None,
                },
                client_id: sub.get_one::<i64>("client").copied(),
            };
            print_list(list(conn, state, &f)?, sub)?;
        }
        Some(("show", sub)) => {
            let inv = get(conn, state, id_arg(sub)?)?;
            println!("{}", serde_json::to_string_pretty(&inv)?);
        }
        Some(("edit", sub)) => {
            let inv = update(conn, state, id_arg(sub)?, patch_from_args(sub)?)?;
            state.notify(NoticeLevel::Success, format!("Updated invoice {}", inv.number));
        }
        Some(("pay", sub)) => {
            let inv = set_status(conn, state, id_arg(sub)?, InvoiceStatus::Paid)?;
            state.notify(
                NoticeLevel::Success,
                state.tr(
                    &format!("Facture {} marquée payée", inv.number),
                    &format!("Invoice {} marked paid", inv.number),
                ),
            );
        }
        Some(("rm", sub)) => {
            let id = id_arg(sub)?;
            delete(conn, state, id)?;
            state.notify(NoticeLevel::Success, format!("Removed invoice #{}", id));
        }
        _ => {}
    }
    Ok(())
}
