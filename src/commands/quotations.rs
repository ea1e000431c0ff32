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
use crate::commands::invoices;
use crate::error::{MoneyaError, Result};
use crate::models::{Invoice, InvoiceStatus, Quotation, QuotationStatus};
use crate::state::{AppState, NoticeLevel, View};
use crate::utils::{
    decimal_at, delete_owned, fmt_money, items_at, maybe_print_json, parse_date, parse_decimal,
    pretty_table, require_client, update_owned, DateRange,
};

const COLUMNS: &str = "id, user_id, number, client_id, status, amount, items, currency_code, issue_date, valid_until, notes";

#[derive(Debug, Clone, Default)]
pub struct QuotationPatch {
    pub doc: DocumentPatch,
    pub status: Option<QuotationStatus>,
}

#[derive(Debug, Clone, Default)]
pub struct QuotationFilter {
    pub range: DateRange,
    pub status: Option<QuotationStatus>,
    pub client_id: Option<i64>,
}

fn from_row(r: &Row<'_>) -> rusqlite::Result<Quotation> {
    Ok(Quotation {
        id: r.get(0)?,
        user_id: r.get(1)?,
        number: r.get(2)?,
        client_id: r.get(3)?,
        status: r.get(4)?,
        amount: decimal_at(r, 5)?,
        items: items_at(r, 6)?,
        currency_code: r.get(7)?,
        issue_date: r.get(8)?,
        valid_until: r.get(9)?,
        notes: r.get(10)?,
    })
}

fn query(conn: &Connection, owner: i64, f: &QuotationFilter) -> Result<Vec<Quotation>> {
    let (sql, args) = documents::list_query(
        DocKind::Quotation,
        COLUMNS,
        owner,
        &f.range,
        f.status.as_ref().map(QuotationStatus::as_str),
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

fn fetch(conn: &Connection, owner: i64, id: i64) -> Result<Quotation> {
    let sql = format!("SELECT {} FROM quotations WHERE id=?1 AND user_id=?2", COLUMNS);
    conn.query_row(&sql, params![id, owner], from_row)
        .optional()?
        .ok_or(MoneyaError::not_found("quotation", id))
}

pub fn all_for_owner(conn: &Connection, owner: i64) -> Result<Vec<Quotation>> {
    query(conn, owner, &QuotationFilter::default())
}

pub fn list(conn: &Connection, state: &AppState, f: &QuotationFilter) -> Result<Vec<Quotation>> {
    let rows = query(conn, state.user_id()?, f)?;
    state.cache.mark_fresh(View::Quotations);
    Ok(rows)
}

pub fn get(conn: &Connection, state: &AppState, id: i64) -> Result<Quotation> {
    fetch(conn, state.user_id()?, id)
}

pub fn create(
    conn: &Connection,
    state: &AppState,
    new: NewDocument,
    status: QuotationStatus,
) -> Result<Quotation> {
    let owner = state.user_id()?;
    let id = documents::insert(conn, DocKind::Quotation, owner, &new, status.as_str(), &state.currency)?;
    state.cache.invalidate(DocKind::Quotation.views());
    fetch(conn, owner, id)
}

pub fn update(
    conn: &Connection,
    state: &AppState,
    id: i64,
    patch: QuotationPatch,
) -> Result<Quotation> {
    let owner = state.user_id()?;
    require_client(conn, owner, patch.doc.client_id)?;
    let mut sets = patch.doc.into_sets(DocKind::Quotation)?;
    if let Some(s) = patch.status {
        sets.push(("status", Value::Text(s.as_str().to_string())));
    }
    update_owned(conn, "quotations", "quotation", id, owner, sets)?;
    state.cache.invalidate(DocKind::Quotation.views());
    fetch(conn, owner, id)
}

pub fn delete(conn: &Connection, state: &AppState, id: i64) -> Result<()> {
    let owner = state.user_id()?;
    delete_owned(conn, "quotations", "quotation", id, owner)?;
    state.cache.invalidate(DocKind::Quotation.views());
    Ok(())
}

/// Turns an accepted quotation into a draft invoice carrying the same client,
/// items, amount and currency.
pub fn convert_to_invoice(conn: &Connection, state: &AppState, id: i64) -> Result<Invoice> {
    let q = get(conn, state, id)?;
    if q.status != QuotationStatus::Accepted {
        return Err(MoneyaError::invalid(format!(
            "Quotation {} is {}, only accepted quotations can be invoiced",
            q.number, q.status
        )));
    }
    let inv = invoices::create(
        conn,
        state,
        NewDocument {
            number: None,
            client_id: q.client_id,
            amount: Some(q.amount),
            items: q.items,
            currency_code: q.currency_code,
            issue_date: Utc::now().date_naive(),
            end_date: None,
            notes: Some(format!("Devis {}", q.number)),
        },
        InvoiceStatus::Draft,
    )?;
    log::info!("quotation {} converted to invoice {}", q.number, inv.number);
    Ok(inv)
}

fn patch_from_args(sub: &clap::ArgMatches) -> anyhow::Result<QuotationPatch> {
    Ok(QuotationPatch {
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
            end_date: match sub.get_one::<String>("valid_until") {
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
            let q = create(conn, state, new, patch.status.unwrap_or(QuotationStatus::Draft))?;
            state.notify(
                NoticeLevel::Success,
                format!(
                    "Created quotation {} for {}",
                    q.number,
                    fmt_money(&q.amount, q.currency_code.as_deref())
                ),
            );
        }
        Some(("list", sub)) => {
            let f = QuotationFilter {
                range: date_range_args(sub)?,
                status: match sub.get_one::<String>("status") {
                    Some(s) => Some(s.parse()?),
                    None => None,
                },
                client_id: sub.get_one::<i64>("client").copied(),
            };
            let data = list(conn, state, &f)?;
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
                let rows = data
                    .into_iter()
                    .map(|q| {
                        vec![
                            q.id.to_string(),
                            q.number,
                            q.issue_date.to_string(),
                            q.valid_until.map(|d| d.to_string()).unwrap_or_default(),
                            q.status.to_string(),
                            fmt_money(&q.amount, q.currency_code.as_deref()),
                        ]
                    })
                    .collect();
                println!(
                    "{}",
                    pretty_table(&["ID", "Number", "Issued", "Valid until", "Status", "Amount"], rows)
                );
            }
        }
        Some(("show", sub)) => {
            let q = get(conn, state, id_arg(sub)?)?;
            println!("{}", serde_json::to_string_pretty(&q)?);
        }
        Some(("edit", sub)) => {
            let q = update(conn, state, id_arg(sub)?, patch_from_args(sub)?)?;
            state.notify(NoticeLevel::Success, format!("Updated quotation {}", q.number));
        }
        Some(("invoice", sub)) => {
            let inv = convert_to_invoice(conn, state, id_arg(sub)?)?;
            state.notify(NoticeLevel::Success, format!("Created invoice {}", inv.number));
        }
        Some(("rm", sub)) => {
            let id = id_arg(sub)?;
            delete(conn, state, id)?;
            state.notify(NoticeLevel::Success, format!("Removed quotation #{}", id));
        }
        _ => {}
    }
    Ok(())
}
