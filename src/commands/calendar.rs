// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::NaiveDateTime;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use crate::cli::{date_range_args, id_arg, opt_string};
use crate::error::{MoneyaError, Result};
use crate::models::CalendarEvent;
use crate::state::{AppState, NoticeLevel, View};
use crate::utils::{
    delete_owned, maybe_print_json, opt_text, parse_datetime, pretty_table, require_client,
    update_owned, DateRange,
};

const COLUMNS: &str = "id, user_id, title, description, starts_at, ends_at, client_id";

const VIEWS: &[View] = &[View::CalendarEvents, View::Dashboard];

const DISPLAY_FMT: &str = "%Y-%m-%d %H:%M";

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub title: String,
    pub description: Option<String>,
    pub starts_at: NaiveDateTime,
    pub ends_at: NaiveDateTime,
    pub client_id: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct EventPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub starts_at: Option<NaiveDateTime>,
    pub ends_at: Option<NaiveDateTime>,
    pub client_id: Option<i64>,
}

impl EventPatch {
    fn into_sets(self) -> Vec<(&'static str, Value)> {
        let mut sets = Vec::new();
        if let Some(t) = self.title {
            sets.push(("title", Value::Text(t)));
        }
        if self.description.is_some() {
            sets.push(("description", opt_text(self.description)));
        }
        if let Some(s) = self.starts_at {
            sets.push(("starts_at", Value::Text(s.format("%Y-%m-%d %H:%M:%S").to_string())));
        }
        if let Some(e) = self.ends_at {
            sets.push(("ends_at", Value::Text(e.format("%Y-%m-%d %H:%M:%S").to_string())));
        }
        if let Some(c) = self.client_id {
            sets.push(("client_id", Value::Integer(c)));
        }
        sets
    }
}

fn from_row(r: &Row<'_>) -> rusqlite::Result<CalendarEvent> {
    Ok(CalendarEvent {
        id: r.get(0)?,
        user_id: r.get(1)?,
        title: r.get(2)?,
        description: r.get(3)?,
        starts_at: r.get(4)?,
        ends_at: r.get(5)?,
        client_id: r.get(6)?,
    })
}

fn check_span(starts_at: NaiveDateTime, ends_at: NaiveDateTime) -> Result<()> {
    if ends_at < starts_at {
        return Err(MoneyaError::invalid("Event ends before it starts"));
    }
    Ok(())
}

/// Events whose start day falls inside `range`, earliest first.
pub fn list(conn: &Connection, state: &AppState, range: &DateRange) -> Result<Vec<CalendarEvent>> {
    let owner = state.user_id()?;
    let mut sql = format!("SELECT {} FROM calendar_events WHERE user_id=?", COLUMNS);
    let mut args = vec![Value::Integer(owner)];
    range.push_sql("starts_at", &mut sql, &mut args);
    sql.push_str(" ORDER BY starts_at, id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(args), from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    state.cache.mark_fresh(View::CalendarEvents);
    Ok(out)
}

pub fn get(conn: &Connection, state: &AppState, id: i64) -> Result<CalendarEvent> {
    let owner = state.user_id()?;
    let sql = format!("SELECT {} FROM calendar_events WHERE id=?1 AND user_id=?2", COLUMNS);
    conn.query_row(&sql, params![id, owner], from_row)
        .optional()?
        .ok_or(MoneyaError::not_found("event", id))
}

pub fn create(conn: &Connection, state: &AppState, new: NewEvent) -> Result<CalendarEvent> {
    let owner = state.user_id()?;
    if new.title.trim().is_empty() {
        return Err(MoneyaError::invalid("Event title is required"));
    }
    check_span(new.starts_at, new.ends_at)?;
    require_client(conn, owner, new.client_id)?;
    conn.execute(
        "INSERT INTO calendar_events(user_id, title, description, starts_at, ends_at, client_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            owner,
            new.title.trim(),
            new.description,
            new.starts_at,
            new.ends_at,
            new.client_id
        ],
    )?;
    let id = conn.last_insert_rowid();
    log::debug!("created event {} for user {}", id, owner);
    state.cache.invalidate(VIEWS);
    get(conn, state, id)
}

/// The resulting span is checked against the stored bounds, so moving only
/// one end still cannot invert the event.
pub fn update(conn: &Connection, state: &AppState, id: i64, patch: EventPatch) -> Result<CalendarEvent> {
    let owner = state.user_id()?;
    let current = get(conn, state, id)?;
    check_span(
        patch.starts_at.unwrap_or(current.starts_at),
        patch.ends_at.unwrap_or(current.ends_at),
    )?;
    require_client(conn, owner, patch.client_id)?;
    update_owned(conn, "calendar_events", "event", id, owner, patch.into_sets())?;
    state.cache.invalidate(VIEWS);
    get(conn, state, id)
}

pub fn delete(conn: &Connection, state: &AppState, id: i64) -> Result<()> {
    let owner = state.user_id()?;
    delete_owned(conn, "calendar_events", "event", id, owner)?;
    state.cache.invalidate(VIEWS);
    Ok(())
}

pub fn handle(conn: &Connection, state: &AppState, m: &clap::ArgMatches) -> anyhow::Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let starts_at = parse_datetime(sub.get_one::<String>("start").unwrap())?;
            let ends_at = match sub.get_one::<String>("end") {
                Some(e) => parse_datetime(e)?,
                None => starts_at + chrono::Duration::hours(1),
            };
            let ev = create(
                conn,
                state,
                NewEvent {
                    title: sub.get_one::<String>("title").unwrap().to_string(),
                    description: opt_string(sub, "description"),
                    starts_at,
                    ends_at,
                    client_id: sub.get_one::<i64>("client").copied(),
                },
            )?;
            state.notify(
                NoticeLevel::Success,
                format!("Scheduled '{}' at {}", ev.title, ev.starts_at.format(DISPLAY_FMT)),
            );
        }
        Some(("list", sub)) => {
            let data = list(conn, state, &date_range_args(sub)?)?;
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
                let rows = data
                    .into_iter()
                    .map(|e| {
                        vec![
                            e.id.to_string(),
                            e.starts_at.format(DISPLAY_FMT).to_string(),
                            e.ends_at.format(DISPLAY_FMT).to_string(),
                            e.title,
                            e.description.unwrap_or_default(),
                        ]
                    })
                    .collect();
                println!(
                    "{}",
                    pretty_table(&["ID", "Start", "End", "Title", "Description"], rows)
                );
            }
        }
        Some(("edit", sub)) => {
            let patch = EventPatch {
                title: opt_string(sub, "title"),
                description: opt_string(sub, "description"),
                starts_at: match sub.get_one::<String>("start") {
                    Some(s) => Some(parse_datetime(s)?),
                    None => None,
                },
                ends_at: match sub.get_one::<String>("end") {
                    Some(e) => Some(parse_datetime(e)?),
                    None => None,
                },
                client_id: sub.get_one::<i64>("client").copied(),
            };
            let ev = update(conn, state, id_arg(sub)?, patch)?;
            state.notify(NoticeLevel::Success, format!("Updated event '{}'", ev.title));
        }
        Some(("rm", sub)) => {
            let id = id_arg(sub)?;
            delete(conn, state, id)?;
            state.notify(NoticeLevel::Success, format!("Removed event #{}", id));
        }
        _ => {}
    }
    Ok(())
}
