// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Pieces shared by invoices and quotations: numbering, line items, and the
//! columns both tables have in common.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::Value;
use rusqlite::{params, Connection};
use rust_decimal::Decimal;

use crate::error::{MoneyaError, Result};
use crate::models::LineItem;
use crate::state::View;
use crate::utils::{
    items_json, opt_text, parse_currency, parse_decimal, require_client, DateRange,
};

static NUMBER_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocKind {
    Invoice,
    Quotation,
}

impl DocKind {
    pub fn table(&self) -> &'static str {
        match self {
            DocKind::Invoice => "invoices",
            DocKind::Quotation => "quotations",
        }
    }

    pub fn entity(&self) -> &'static str {
        match self {
            DocKind::Invoice => "invoice",
            DocKind::Quotation => "quotation",
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            DocKind::Invoice => "INV",
            DocKind::Quotation => "QUO",
        }
    }

    /// `due_date` for invoices, `valid_until` for quotations.
    pub fn end_column(&self) -> &'static str {
        match self {
            DocKind::Invoice => "due_date",
            DocKind::Quotation => "valid_until",
        }
    }

    pub fn views(&self) -> &'static [View] {
        match self {
            DocKind::Invoice => &[View::Invoices, View::Dashboard],
            DocKind::Quotation => &[View::Quotations],
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewDocument {
    /// Generated as `PREFIX-NNN` when absent.
    pub number: Option<String>,
    pub client_id: Option<i64>,
    /// Defaults to the sum of the line items.
    pub amount: Option<Decimal>,
    pub items: Vec<LineItem>,
    pub currency_code: Option<String>,
    pub issue_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentPatch {
    pub client_id: Option<i64>,
    pub amount: Option<Decimal>,
    pub items: Option<Vec<LineItem>>,
    pub issue_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl DocumentPatch {
    pub(crate) fn into_sets(self, kind: DocKind) -> Result<Vec<(&'static str, Value)>> {
        let mut sets = Vec::new();
        if let Some(c) = self.client_id {
            sets.push(("client_id", Value::Integer(c)));
        }
        if let Some(a) = self.amount {
            sets.push(("amount", Value::Text(a.to_string())));
        }
        if let Some(items) = self.items {
            sets.push(("items", Value::Text(items_json(&items)?)));
        }
        if let Some(d) = self.issue_date {
            sets.push(("issue_date", Value::Text(d.to_string())));
        }
        if let Some(d) = self.end_date {
            sets.push((kind.end_column(), Value::Text(d.to_string())));
        }
        if self.notes.is_some() {
            sets.push(("notes", opt_text(self.notes)));
        }
        Ok(sets)
    }
}

/// Owner-scoped SELECT over a document table with the usual list filters.
pub(crate) fn list_query(
    kind: DocKind,
    columns: &str,
    owner: i64,
    range: &DateRange,
    status: Option<&str>,
    client_id: Option<i64>,
) -> (String, Vec<Value>) {
    let mut sql = format!("SELECT {} FROM {} WHERE user_id=?", columns, kind.table());
    let mut args = vec![Value::Integer(owner)];
    range.push_sql("issue_date", &mut sql, &mut args);
    if let Some(s) = status {
        sql.push_str(" AND status=?");
        args.push(Value::Text(s.to_string()));
    }
    if let Some(c) = client_id {
        sql.push_str(" AND client_id=?");
        args.push(Value::Integer(c));
    }
    sql.push_str(" ORDER BY issue_date DESC, id DESC");
    (sql, args)
}

pub fn items_total(items: &[LineItem]) -> Result<Decimal> {
    items
        .iter()
        .try_fold(Decimal::ZERO, |acc, item| {
            item.total().and_then(|t| acc.checked_add(t))
        })
        .ok_or_else(|| MoneyaError::invalid("Line item total is out of range"))
}

/// Next `PREFIX-NNN` after the highest numeric suffix the owner has used.
pub fn next_number(conn: &Connection, kind: DocKind, owner: i64) -> Result<String> {
    let sql = format!("SELECT number FROM {} WHERE user_id=?1", kind.table());
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![owner], |r| r.get::<_, String>(0))?;
    let mut max = 0u64;
    for row in rows {
        let number = row?;
        if let Some(cap) = NUMBER_SUFFIX.captures(&number) {
            if let Ok(n) = cap[1].parse::<u64>() {
                max = max.max(n);
            }
        }
    }
    Ok(format!("{}-{:03}", kind.prefix(), max + 1))
}

/// Inserts the shared columns plus `status`; returns the new row id.
pub(crate) fn insert(
    conn: &Connection,
    kind: DocKind,
    owner: i64,
    new: &NewDocument,
    status: &str,
    default_currency: &str,
) -> Result<i64> {
    require_client(conn, owner, new.client_id)?;
    let number = match new.number.as_deref().map(str::trim) {
        Some(n) if !n.is_empty() => n.to_string(),
        _ => next_number(conn, kind, owner)?,
    };
    let currency = match new.currency_code.as_deref() {
        Some(c) => parse_currency(c)?,
        None => default_currency.to_string(),
    };
    let amount = match new.amount {
        Some(a) => a,
        None => items_total(&new.items)?,
    };
    let sql = format!(
        "INSERT INTO {}(user_id, number, client_id, status, amount, items, currency_code, issue_date, {}, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        kind.table(),
        kind.end_column()
    );
    conn.execute(
        &sql,
        params![
            owner,
            number,
            new.client_id,
            status,
            amount.to_string(),
            items_json(&new.items)?,
            currency,
            new.issue_date,
            new.end_date,
            new.notes
        ],
    )?;
    let id = conn.last_insert_rowid();
    log::debug!("created {} {} ({}) for user {}", kind.entity(), id, number, owner);
    Ok(id)
}

/// Parses `description:quantity:unit_price`; the description may itself
/// contain colons.
pub fn parse_item(s: &str) -> anyhow::Result<LineItem> {
    let mut parts = s.rsplitn(3, ':');
    let price = parts.next().unwrap_or_default();
    let qty = parts.next();
    let desc = parts.next();
    match (desc, qty) {
        (Some(desc), Some(qty)) => Ok(LineItem {
            description: desc.trim().to_string(),
            quantity: parse_decimal(qty)?,
            unit_price: parse_decimal(price)?,
        }),
        _ => Err(anyhow::anyhow!(
            "Invalid item '{}', expected description:quantity:unit_price",
            s
        )),
    }
}

pub fn items_from_args(sub: &clap::ArgMatches) -> anyhow::Result<Option<Vec<LineItem>>> {
    match sub.get_many::<String>("item") {
        Some(vals) => Ok(Some(vals.map(|v| parse_item(v)).collect::<anyhow::Result<Vec<_>>>()?)),
        None => Ok(None),
    }
}
