// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::cli::{id_arg, opt_string};
use crate::error::{MoneyaError, Result};
use crate::models::Client;
use crate::state::{AppState, NoticeLevel, View};
use crate::utils::{delete_owned, maybe_print_json, opt_text, pretty_table, update_owned};

const COLUMNS: &str = "id, user_id, name, email, phone, company, address, notes";

#[derive(Debug, Clone, Default)]
pub struct NewClient {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ClientPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
}

impl ClientPatch {
    fn into_sets(self) -> Vec<(&'static str, Value)> {
        let mut sets = Vec::new();
        if let Some(v) = self.name {
            sets.push(("name", Value::Text(v)));
        }
        for (col, v) in [
            ("email", self.email),
            ("phone", self.phone),
            ("company", self.company),
            ("address", self.address),
            ("notes", self.notes),
        ] {
            if v.is_some() {
                sets.push((col, opt_text(v)));
            }
        }
        sets
    }
}

fn from_row(r: &Row<'_>) -> rusqlite::Result<Client> {
    Ok(Client {
        id: r.get(0)?,
        user_id: r.get(1)?,
        name: r.get(2)?,
        email: r.get(3)?,
        phone: r.get(4)?,
        company: r.get(5)?,
        address: r.get(6)?,
        notes: r.get(7)?,
    })
}

pub fn list(conn: &Connection, state: &AppState) -> Result<Vec<Client>> {
    let owner = state.user_id()?;
    let sql = format!(
        "SELECT {} FROM clients WHERE user_id=?1 ORDER BY name COLLATE NOCASE, id",
        COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![owner], from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    state.cache.mark_fresh(View::Clients);
    Ok(out)
}

pub fn get(conn: &Connection, state: &AppState, id: i64) -> Result<Client> {
    let owner = state.user_id()?;
    let sql = format!("SELECT {} FROM clients WHERE id=?1 AND user_id=?2", COLUMNS);
    conn.query_row(&sql, params![id, owner], from_row)
        .optional()?
        .ok_or(MoneyaError::not_found("client", id))
}

pub fn create(conn: &Connection, state: &AppState, new: NewClient) -> Result<Client> {
    let owner = state.user_id()?;
    let name = new.name.trim();
    if name.is_empty() {
        return Err(MoneyaError::invalid("Client name is required"));
    }
    conn.execute(
        "INSERT INTO clients(user_id, name, email, phone, company, address, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            owner,
            name,
            new.email,
            new.phone,
            new.company,
            new.address,
            new.notes
        ],
    )?;
    let id = conn.last_insert_rowid();
    log::debug!("created client {} for user {}", id, owner);
    state.cache.invalidate(&[View::Clients]);
    get(conn, state, id)
}

pub fn update(conn: &Connection, state: &AppState, id: i64, patch: ClientPatch) -> Result<Client> {
    let owner = state.user_id()?;
    if matches!(patch.name.as_deref(), Some(n) if n.trim().is_empty()) {
        return Err(MoneyaError::invalid("Client name is required"));
    }
    update_owned(conn, "clients", "client", id, owner, patch.into_sets())?;
    state.cache.invalidate(&[View::Clients]);
    get(conn, state, id)
}

pub fn delete(conn: &Connection, state: &AppState, id: i64) -> Result<()> {
    let owner = state.user_id()?;
    delete_owned(conn, "clients", "client", id, owner)?;
    state.cache.invalidate(&[
        View::Clients,
        View::Transactions,
        View::Invoices,
        View::Quotations,
    ]);
    Ok(())
}

pub fn handle(conn: &Connection, state: &AppState, m: &clap::ArgMatches) -> anyhow::Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let c = create(
                conn,
                state,
                NewClient {
                    name: sub.get_one::<String>("name").unwrap().to_string(),
                    email: opt_string(sub, "email"),
                    phone: opt_string(sub, "phone"),
                    company: opt_string(sub, "company"),
                    address: opt_string(sub, "address"),
                    notes: opt_string(sub, "notes"),
                },
            )?;
            state.notify(NoticeLevel::Success, format!("Added client '{}' (#{})", c.name, c.id));
        }
        Some(("list", sub)) => {
            let data = list(conn, state)?;
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
                let rows = data
                    .into_iter()
                    .map(|c| {
                        vec![
                            c.id.to_string(),
                            c.name,
                            c.company.unwrap_or_default(),
                            c.email.unwrap_or_default(),
                            c.phone.unwrap_or_default(),
                        ]
                    })
                    .collect();
                println!(
                    "{}",
                    pretty_table(&["ID", "Name", "Company", "Email", "Phone"], rows)
                );
            }
        }
        Some(("show", sub)) => {
            let c = get(conn, state, id_arg(sub)?)?;
            println!("{}", serde_json::to_string_pretty(&c)?);
        }
        Some(("edit", sub)) => {
            let c = update(
                conn,
                state,
                id_arg(sub)?,
                ClientPatch {
                    name: opt_string(sub, "name"),
                    email: opt_string(sub, "email"),
                    phone: opt_string(sub, "phone"),
                    company: opt_string(sub, "company"),
                    address: opt_string(sub, "address"),
                    notes: opt_string(sub, "notes"),
                },
            )?;
            state.notify(NoticeLevel::Success, format!("Updated client '{}'", c.name));
        }
        Some(("rm", sub)) => {
            let id = id_arg(sub)?;
            delete(conn, state, id)?;
            state.notify(NoticeLevel::Success, format!("Removed client #{}", id));
        }
        _ => {}
    }
    Ok(())
}
