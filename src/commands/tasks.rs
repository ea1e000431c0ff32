// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use crate::cli::{date_range_args, id_arg, opt_string};
use crate::error::{MoneyaError, Result};
use crate::models::{Task, TaskPriority, TaskStatus};
use crate::state::{AppState, NoticeLevel, View};
use crate::utils::{
    delete_owned, maybe_print_json, opt_text, parse_date, pretty_table, require_client,
    update_owned, DateRange,
};

const COLUMNS: &str = "id, user_id, title, description, status, priority, due_date, client_id";

const VIEWS: &[View] = &[View::Tasks, View::Dashboard];

#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub due_date: Option<NaiveDate>,
    pub client_id: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub due_date: Option<NaiveDate>,
    pub client_id: Option<i64>,
}

impl TaskPatch {
    fn into_sets(self) -> Vec<(&'static str, Value)> {
        let mut sets = Vec::new();
        if let Some(t) = self.title {
            sets.push(("title", Value::Text(t)));
        }
        if self.description.is_some() {
            sets.push(("description", opt_text(self.description)));
        }
        if let Some(s) = self.status {
            sets.push(("status", Value::Text(s.as_str().to_string())));
        }
        if let Some(p) = self.priority {
            sets.push(("priority", Value::Text(p.as_str().to_string())));
        }
        if let Some(d) = self.due_date {
            sets.push(("due_date", Value::Text(d.to_string())));
        }
        if let Some(c) = self.client_id {
            sets.push(("client_id", Value::Integer(c)));
        }
        sets
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// Applies to the due date; tasks without one are excluded when set.
    pub range: DateRange,
    pub status: Option<TaskStatus>,
    pub client_id: Option<i64>,
}

fn from_row(r: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: r.get(0)?,
        user_id: r.get(1)?,
        title: r.get(2)?,
        description: r.get(3)?,
        status: r.get(4)?,
        priority: r.get(5)?,
        due_date: r.get(6)?,
        client_id: r.get(7)?,
    })
}

pub fn list(conn: &Connection, state: &AppState, f: &TaskFilter) -> Result<Vec<Task>> {
    let owner = state.user_id()?;
    let mut sql = format!("SELECT {} FROM tasks WHERE user_id=?", COLUMNS);
    let mut args = vec![Value::Integer(owner)];
    f.range.push_sql("due_date", &mut sql, &mut args);
    if let Some(s) = f.status {
        sql.push_str(" AND status=?");
        args.push(Value::Text(s.as_str().to_string()));
    }
    if let Some(c) = f.client_id {
        sql.push_str(" AND client_id=?");
        args.push(Value::Integer(c));
    }
    // undated tasks last
    sql.push_str(" ORDER BY due_date IS NULL, due_date, id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(args), from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    state.cache.mark_fresh(View::Tasks);
    Ok(out)
}

pub fn get(conn: &Connection, state: &AppState, id: i64) -> Result<Task> {
    let owner = state.user_id()?;
    let sql = format!("SELECT {} FROM tasks WHERE id=?1 AND user_id=?2", COLUMNS);
    conn.query_row(&sql, params![id, owner], from_row)
        .optional()?
        .ok_or(MoneyaError::not_found("task", id))
}

pub fn create(conn: &Connection, state: &AppState, new: NewTask) -> Result<Task> {
    let owner = state.user_id()?;
    if new.title.trim().is_empty() {
        return Err(MoneyaError::invalid("Task title is required"));
    }
    require_client(conn, owner, new.client_id)?;
    conn.execute(
        "INSERT INTO tasks(user_id, title, description, status, priority, due_date, client_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            owner,
            new.title.trim(),
            new.description,
            new.status,
            new.priority,
            new.due_date,
            new.client_id
        ],
    )?;
    let id = conn.last_insert_rowid();
    log::debug!("created task {} for user {}", id, owner);
    state.cache.invalidate(VIEWS);
    get(conn, state, id)
}

pub fn update(conn: &Connection, state: &AppState, id: i64, patch: TaskPatch) -> Result<Task> {
    let owner = state.user_id()?;
    require_client(conn, owner, patch.client_id)?;
    update_owned(conn, "tasks", "task", id, owner, patch.into_sets())?;
    state.cache.invalidate(VIEWS);
    get(conn, state, id)
}

pub fn delete(conn: &Connection, state: &AppState, id: i64) -> Result<()> {
    let owner = state.user_id()?;
    delete_owned(conn, "tasks", "task", id, owner)?;
    state.cache.invalidate(VIEWS);
    Ok(())
}

fn parse_opt<T: std::str::FromStr<Err = MoneyaError>>(
    sub: &clap::ArgMatches,
    name: &str,
) -> anyhow::Result<Option<T>> {
    match sub.get_one::<String>(name) {
        Some(v) => Ok(Some(v.parse()?)),
        None => Ok(None),
    }
}

pub fn handle(conn: &Connection, state: &AppState, m: &clap::ArgMatches) -> anyhow::Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let t = create(
                conn,
                state,
                NewTask {
                    title: sub.get_one::<String>("title").unwrap().to_string(),
                    description: opt_string(sub, "description"),
                    status: parse_opt(sub, "status")?.unwrap_or(TaskStatus::Todo),
                    priority: parse_opt(sub, "priority")?.unwrap_or(TaskPriority::Medium),
                    due_date: match sub.get_one::<String>("due") {
                        Some(d) => Some(parse_date(d)?),
                        None => None,
                    },
                    client_id: sub.get_one::<i64>("client").copied(),
                },
            )?;
            state.notify(NoticeLevel::Success, format!("Added task '{}' (#{})", t.title, t.id));
        }
        Some(("list", sub)) => {
            let f = TaskFilter {
                range: date_range_args(sub)?,
                status: parse_opt(sub, "status")?,
                client_id: sub.get_one::<i64>("client").copied(),
            };
            let data = list(conn, state, &f)?;
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
                let rows = data
                    .into_iter()
                    .map(|t| {
                        vec![
                            t.id.to_string(),
                            t.title,
                            t.status.to_string(),
                            t.priority.to_string(),
                            t.due_date.map(|d| d.to_string()).unwrap_or_default(),
                        ]
                    })
                    .collect();
                println!(
                    "{}",
                    pretty_table(&["ID", "Title", "Status", "Priority", "Due"], rows)
                );
            }
        }
        Some(("edit", sub)) => {
            let patch = TaskPatch {
                title: opt_string(sub, "title"),
                description: opt_string(sub, "description"),
                status: parse_opt(sub, "status")?,
                priority: parse_opt(sub, "priority")?,
                due_date: match sub.get_one::<String>("due") {
                    Some(d) => Some(parse_date(d)?),
                    None => None,
                },
                client_id: sub.get_one::<i64>("client").copied(),
            };
            let t = update(conn, state, id_arg(sub)?, patch)?;
            state.notify(NoticeLevel::Success, format!("Updated task '{}'", t.title));
        }
        Some(("done", sub)) => {
            let t = update(
                conn,
                state,
                id_arg(sub)?,
                TaskPatch {
                    status: Some(TaskStatus::Done),
                    ..TaskPatch::default()
                },
            )?;
            state.notify(NoticeLevel::Success, format!("Completed task '{}'", t.title));
        }
        Some(("rm", sub)) => {
            let id = id_arg(sub)?;
            delete(conn, state, id)?;
            state.notify(NoticeLevel::Success, format!("Removed task #{}", id));
        }
        _ => {}
    }
    Ok(())
}
