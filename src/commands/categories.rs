// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::cli::id_arg;
use crate::error::{MoneyaError, Result};
use crate::models::{Category, TransactionKind};
use crate::prefs::Prefs;
use crate::state::{AppState, NoticeLevel, View};
use crate::utils::{delete_owned, maybe_print_json, pretty_table, update_owned};

pub const DEFAULT_CATEGORIES: &[(&str, TransactionKind)] = &[
    ("Factures", TransactionKind::Income),
    ("Ventes", TransactionKind::Income),
    ("Autres revenus", TransactionKind::Income),
    ("Loyer", TransactionKind::Expense),
    ("Logiciels", TransactionKind::Expense),
    ("Matériel", TransactionKind::Expense),
    ("Déplacements", TransactionKind::Expense),
    ("Autres dépenses", TransactionKind::Expense),
    ("Épargne", TransactionKind::Savings),
];

fn from_row(r: &Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: r.get(0)?,
        user_id: r.get(1)?,
        name: r.get(2)?,
        kind: r.get(3)?,
    })
}

pub fn list(
    conn: &Connection,
    state: &AppState,
    kind: Option<TransactionKind>,
) -> Result<Vec<Category>> {
    let owner = state.user_id()?;
    let mut stmt = conn.prepare(
        "SELECT id, user_id, name, kind FROM user_categories
         WHERE user_id=?1 AND (?2 IS NULL OR kind=?2)
         ORDER BY kind, name",
    )?;
    let rows = stmt.query_map(params![owner, kind], from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    state.cache.mark_fresh(View::Categories);
    Ok(out)
}

pub fn get(conn: &Connection, state: &AppState, id: i64) -> Result<Category> {
    let owner = state.user_id()?;
    conn.query_row(
        "SELECT id, user_id, name, kind FROM user_categories WHERE id=?1 AND user_id=?2",
        params![id, owner],
        from_row,
    )
    .optional()?
    .ok_or(MoneyaError::not_found("category", id))
}

pub fn create(
    conn: &Connection,
    state: &AppState,
    name: &str,
    kind: TransactionKind,
) -> Result<Category> {
    let owner = state.user_id()?;
    let name = name.trim();
    if name.is_empty() {
        return Err(MoneyaError::invalid("Category name is required"));
    }
    conn.execute(
        "INSERT INTO user_categories(user_id, name, kind) VALUES (?1, ?2, ?3)",
        params![owner, name, kind],
    )?;
    let id = conn.last_insert_rowid();
    state.cache.invalidate(&[View::Categories]);
    get(conn, state, id)
}

pub fn rename(conn: &Connection, state: &AppState, id: i64, name: &str) -> Result<Category> {
    let owner = state.user_id()?;
    let name = name.trim();
    if name.is_empty() {
        return Err(MoneyaError::invalid("Category name is required"));
    }
    update_owned(
        conn,
        "user_categories",
        "category",
        id,
        owner,
        vec![("name", Value::Text(name.to_string()))],
    )?;
    state.cache.invalidate(&[View::Categories]);
    get(conn, state, id)
}

pub fn delete(conn: &Connection, state: &AppState, id: i64) -> Result<()> {
    let owner = state.user_id()?;
    delete_owned(conn, "user_categories", "category", id, owner)?;
    state.cache.invalidate(&[View::Categories]);
    Ok(())
}

/// Seeds the default set once per user and device. The insert itself is
/// idempotent, so a stale local flag only costs a few no-op statements.
pub fn init_defaults(conn: &Connection, state: &AppState, prefs: &mut Prefs) -> Result<usize> {
    let owner = state.user_id()?;
    if prefs.categories_initialized_for(owner) {
        return Ok(0);
    }
    let tx = conn.unchecked_transaction()?;
    let mut added = 0;
    for (name, kind) in DEFAULT_CATEGORIES {
        added += tx.execute(
            "INSERT INTO user_categories(user_id, name, kind) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id, name, kind) DO NOTHING",
            params![owner, name, kind],
        )?;
    }
    tx.commit()?;
    prefs.mark_categories_initialized(owner);
    if added > 0 {
        log::info!("seeded {} default categories for user {}", added, owner);
        state.cache.invalidate(&[View::Categories]);
    }
    Ok(added)
}

pub fn handle(
    conn: &Connection,
    state: &AppState,
    prefs: &mut Prefs,
    m: &clap::ArgMatches,
) -> anyhow::Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let kind: TransactionKind = sub.get_one::<String>("kind").unwrap().parse()?;
            let c = create(conn, state, sub.get_one::<String>("name").unwrap(), kind)?;
            state.notify(NoticeLevel::Success, format!("Added category '{}' ({})", c.name, c.kind));
        }
        Some(("list", sub)) => {
            let kind = match sub.get_one::<String>("kind") {
                Some(k) => Some(k.parse::<TransactionKind>()?),
                None => None,
            };
            let data = list(conn, state, kind)?;
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
                let rows = data
                    .into_iter()
                    .map(|c| vec![c.id.to_string(), c.name, c.kind.to_string()])
                    .collect();
                println!("{}", pretty_table(&["ID", "Category", "Kind"], rows));
            }
        }
        Some(("rename", sub)) => {
            let c = rename(conn, state, id_arg(sub)?, sub.get_one::<String>("name").unwrap())?;
            state.notify(NoticeLevel::Success, format!("Renamed category to '{}'", c.name));
        }
        Some(("rm", sub)) => {
            let id = id_arg(sub)?;
            delete(conn, state, id)?;
            state.notify(NoticeLevel::Success, format!("Removed category #{}", id));
        }
        Some(("init", _)) => {
            let n = init_defaults(conn, state, prefs)?;
            state.notify(NoticeLevel::Info, format!("{} default categories added", n));
        }
        _ => {}
    }
    Ok(())
}
