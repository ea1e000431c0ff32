// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;

use crate::cli::{date_range_args, id_arg, opt_string};
use crate::error::{MoneyaError, Result};
use crate::models::{Transaction, TransactionKind};
use crate::state::{AppState, NoticeLevel, View};
use crate::utils::{
    decimal_at, delete_owned, fmt_money, maybe_print_json, opt_text, parse_currency,
    parse_date, parse_decimal, pretty_table, require_client, update_owned, DateRange,
};

const COLUMNS: &str =
    "id, user_id, kind, amount, category, description, date, client_id, currency_code";

const VIEWS: &[View] = &[View::Transactions, View::Dashboard];

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub category: Option<String>,
    pub description: String,
    pub date: NaiveDate,
    pub client_id: Option<i64>,
    /// Falls back to the session currency.
    pub currency_code: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TransactionPatch {
    pub kind: Option<TransactionKind>,
    pub amount: Option<Decimal>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub date: Option<NaiveDate>,
    pub client_id: Option<i64>,
}

impl TransactionPatch {
    fn into_sets(self) -> Vec<(&'static str, Value)> {
        let mut sets = Vec::new();
        if let Some(k) = self.kind {
            sets.push(("kind", Value::Text(k.as_str().to_string())));
        }
        if let Some(a) = self.amount {
            sets.push(("amount", Value::Text(a.to_string())));
        }
        if self.category.is_some() {
            sets.push(("category", opt_text(self.category)));
        }
        if let Some(d) = self.description {
            sets.push(("description", Value::Text(d)));
        }
        if let Some(d) = self.date {
            sets.push(("date", Value::Text(d.to_string())));
        }
        if let Some(c) = self.client_id {
            sets.push(("client_id", Value::Integer(c)));
        }
        sets
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub range: DateRange,
    pub kind: Option<TransactionKind>,
    pub client_id: Option<i64>,
    pub limit: Option<usize>,
}

fn from_row(r: &Row<'_>) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: r.get(0)?,
        user_id: r.get(1)?,
        kind: r.get(2)?,
        amount: decimal_at(r, 3)?,
        category: r.get(4)?,
        description: r.get(5)?,
        date: r.get(6)?,
        client_id: r.get(7)?,
        currency_code: r.get(8)?,
    })
}

fn query(conn: &Connection, owner: i64, f: &TransactionFilter) -> Result<Vec<Transaction>> {
    let mut sql = format!("SELECT {} FROM transactions WHERE user_id=?", COLUMNS);
    let mut args = vec![Value::Integer(owner)];
    f.range.push_sql("date", &mut sql, &mut args);
    if let Some(k) = f.kind {
        sql.push_str(" AND kind=?");
        args.push(Value::Text(k.as_str().to_string()));
    }
    if let Some(c) = f.client_id {
        sql.push_str(" AND client_id=?");
        args.push(Value::Integer(c));
    }
    sql.push_str(" ORDER BY date DESC, id DESC");
    if let Some(limit) = f.limit {
        sql.push_str(" LIMIT ?");
        args.push(Value::Integer(limit as i64));
    }
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(args), from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Every transaction the owner holds, oldest first.
pub fn all_for_owner(conn: &Connection, owner: i64) -> Result<Vec<Transaction>> {
    let mut rows = query(conn, owner, &TransactionFilter::default())?;
    rows.reverse();
    Ok(rows)
}

pub fn list(conn: &Connection, state: &AppState, f: &TransactionFilter) -> Result<Vec<Transaction>> {
    let rows = query(conn, state.user_id()?, f)?;
    state.cache.mark_fresh(View::Transactions);
    Ok(rows)
}

pub fn get(conn: &Connection, state: &AppState, id: i64) -> Result<Transaction> {
    let owner = state.user_id()?;
    let sql = format!("SELECT {} FROM transactions WHERE id=?1 AND user_id=?2", COLUMNS);
    conn.query_row(&sql, params![id, owner], from_row)
        .optional()?
        .ok_or(MoneyaError::not_found("transaction", id))
}

pub(crate) fn insert(conn: &Connection, owner: i64, new: &NewTransaction, currency: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO transactions(user_id, kind, amount, category, description, date, client_id, currency_code)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            owner,
            new.kind,
            new.amount.to_string(),
            new.category,
            new.description,
            new.date,
            new.client_id,
            currency
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn create(conn: &Connection, state: &AppState, new: NewTransaction) -> Result<Transaction> {
    let owner = state.user_id()?;
    require_client(conn, owner, new.client_id)?;
    let currency = match new.currency_code.as_deref() {
        Some(c) => parse_currency(c)?,
        None => state.currency.clone(),
    };
    let id = insert(conn, owner, &new, &currency)?;
    log::debug!("created {} transaction {} for user {}", new.kind, id, owner);
    state.cache.invalidate(VIEWS);
    get(conn, state, id)
}

pub fn update(
    conn: &Connection,
    state: &AppState,
    id: i64,
    patch: TransactionPatch,
) -> Result<Transaction> {
    let owner = state.user_id()?;
    require_client(conn, owner, patch.client_id)?;
    update_owned(conn, "transactions", "transaction", id, owner, patch.into_sets())?;
    state.cache.invalidate(VIEWS);
    get(conn, state, id)
}

pub fn delete(conn: &Connection, state: &AppState, id: i64) -> Result<()> {
    let owner = state.user_id()?;
    delete_owned(conn, "transactions", "transaction", id, owner)?;
    state.cache.invalidate(VIEWS);
    Ok(())
}

pub fn filter_from_args(sub: &clap::ArgMatches) -> anyhow::Result<TransactionFilter> {
    Ok(TransactionFilter {
        range: date_range_args(sub)?,
        kind: match sub.get_one::<String>("kind") {
            Some(k) => Some(k.parse()?),
            None => None,
        },
        client_id: sub.get_one::<i64>("client").copied(),
        limit: sub.get_one::<usize>("limit").copied(),
    })
}

pub fn handle(conn: &Connection, state: &AppState, m: &clap::ArgMatches) -> anyhow::Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let new = NewTransaction {
                kind: sub.get_one::<String>("kind").unwrap().parse()?,
                amount: parse_decimal(sub.get_one::<String>("amount").unwrap())?,
                category: opt_string(sub, "category"),
                description: opt_string(sub, "description").unwrap_or_default(),
                date: parse_date(sub.get_one::<String>("date").unwrap())?,
                client_id: sub.get_one::<i64>("client").copied(),
                currency_code: opt_string(sub, "currency"),
            };
            let t = create(conn, state, new)?;
            state.notify(
                NoticeLevel::Success,
                format!(
                    "Recorded {} {} on {} (#{})",
                    t.kind,
                    fmt_money(&t.amount, t.currency_code.as_deref()),
                    t.date,
                    t.id
                ),
            );
        }
        Some(("list", sub)) => {
            let data = list(conn, state, &filter_from_args(sub)?)?;
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
                let rows = data
                    .into_iter()
                    .map(|t| {
                        vec![
                            t.id.to_string(),
                            t.date.to_string(),
                            t.kind.to_string(),
                            fmt_money(&t.amount, None),
                            t.currency_code.unwrap_or_default(),
                            t.category.unwrap_or_default(),
                            t.description,
                        ]
                    })
                    .collect();
                println!(
                    "{}",
                    pretty_table(
                        &["ID", "Date", "Kind", "Amount", "CCY", "Category", "Description"],
                        rows,
                    )
                );
            }
        }
        Some(("edit", sub)) => {
            let patch = TransactionPatch {
                kind: match sub.get_one::<String>("kind") {
                    Some(k) => Some(k.parse()?),
                    None => None,
                },
                amount: match sub.get_one::<String>("amount") {
                    Some(a) => Some(parse_decimal(a)?),
                    None => None,
                },
                category: opt_string(sub, "category"),
                description: opt_string(sub, "description"),
                date: match sub.get_one::<String>("date") {
                    Some(d) => Some(parse_date(d)?),
                    None => None,
                },
                client_id: sub.get_one::<i64>("client").copied(),
            };
            let t = update(conn, state, id_arg(sub)?, patch)?;
            state.notify(NoticeLevel::Success, format!("Updated transaction #{}", t.id));
        }
        Some(("rm", sub)) => {
            let id = id_arg(sub)?;
            delete(conn, state, id)?;
            state.notify(NoticeLevel::Success, format!("Removed transaction #{}", id));
        }
        _ => {}
    }
    Ok(())
}
