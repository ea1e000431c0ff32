// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime};
use comfy_table::{presets::UTF8_FULL, Cell, Table};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;

use crate::error::{MoneyaError, Result};
use crate::models::LineItem;

const UA: &str = concat!(
    "moneya/",
    env!("CARGO_PKG_VERSION"),
    " (+https://github.com/alphavelocity/moneya)"
);

pub const DEFAULT_RATES_URL: &str = "https://api.frankfurter.dev/v1/latest?base=EUR";
pub const DEFAULT_SYNC_ATTEMPTS: u32 = 3;

static CURRENCY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{3}$").unwrap());

pub fn http_client() -> Result<reqwest::blocking::Client> {
    let c = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(15))
        .user_agent(UA)
        .build()?;
    Ok(c)
}

pub fn parse_date(s: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", s))
}

pub fn parse_datetime(s: &str) -> anyhow::Result<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M"))
        .with_context(|| format!("Invalid date-time '{}', expected YYYY-MM-DD HH:MM", s))
}

pub fn parse_decimal(s: &str) -> anyhow::Result<Decimal> {
    s.trim()
        .parse::<Decimal>()
        .with_context(|| format!("Invalid decimal '{}'", s))
}

/// Normalises to upper case and checks for a three-letter ISO code.
pub fn parse_currency(s: &str) -> Result<String> {
    let code = s.trim().to_uppercase();
    if CURRENCY_RE.is_match(&code) {
        Ok(code)
    } else {
        Err(MoneyaError::invalid(format!("Invalid currency code '{}'", s.trim())))
    }
}

pub fn fmt_money(d: &Decimal, ccy: Option<&str>) -> String {
    match ccy {
        Some(c) => format!("{:.2} {}", d.round_dp(2), c),
        None => format!("{:.2}", d.round_dp(2)),
    }
}

pub fn pretty_table(headers: &[&str], rows: Vec<Vec<String>>) -> Table {
    let mut t = Table::new();
    t.load_preset(UTF8_FULL);
    t.set_header(headers.iter().map(|h| Cell::new(*h)));
    for r in rows {
        t.add_row(r.into_iter().map(Cell::new));
    }
    t
}

pub fn maybe_print_json<T: serde::Serialize>(
    json_flag: bool,
    jsonl_flag: bool,
    v: &T,
) -> anyhow::Result<bool> {
    if json_flag {
        println!("{}", serde_json::to_string_pretty(v)?);
        return Ok(true);
    }
    if jsonl_flag {
        let val = serde_json::to_value(v)?;
        if let Some(arr) = val.as_array() {
            for item in arr {
                println!("{}", serde_json::to_string(item)?);
            }
        } else {
            println!("{}", serde_json::to_string(&val)?);
        }
        return Ok(true);
    }
    Ok(false)
}

pub fn get_setting(conn: &Connection, key: &str) -> Result<Option<String>> {
    let v: Option<String> = conn
        .query_row("SELECT value FROM settings WHERE key=?1", params![key], |r| {
            r.get(0)
        })
        .optional()?;
    Ok(v)
}

pub fn set_setting(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        params![key, value],
    )?;
    Ok(())
}

pub fn rates_url(conn: &Connection) -> Result<String> {
    Ok(get_setting(conn, "rates_url")?.unwrap_or_else(|| DEFAULT_RATES_URL.to_string()))
}

pub fn sync_max_attempts(conn: &Connection) -> Result<u32> {
    match get_setting(conn, "sync_max_attempts")? {
        Some(s) => s
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| MoneyaError::invalid(format!("Invalid sync_max_attempts '{}'", s))),
        None => Ok(DEFAULT_SYNC_ATTEMPTS),
    }
}

pub fn decimal_at(r: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let s: String = r.get(idx)?;
    s.parse::<Decimal>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub fn items_at(r: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<LineItem>> {
    let s: String = r.get(idx)?;
    serde_json::from_str(&s)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub fn items_json(items: &[LineItem]) -> Result<String> {
    Ok(serde_json::to_string(items)?)
}

pub fn opt_text(v: Option<String>) -> Value {
    match v {
        Some(s) => Value::Text(s),
        None => Value::Null,
    }
}

/// Inclusive date window applied to a list query.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        DateRange { from, to }
    }

    /// Appends `AND substr(column,1,10) >= ?` style clauses.
    pub fn push_sql(&self, column: &str, sql: &mut String, args: &mut Vec<Value>) {
        if let Some(from) = self.from {
            sql.push_str(&format!(" AND substr({},1,10)>=?", column));
            args.push(Value::Text(from.to_string()));
        }
        if let Some(to) = self.to {
            sql.push_str(&format!(" AND substr({},1,10)<=?", column));
            args.push(Value::Text(to.to_string()));
        }
    }
}

pub fn exists_owned(conn: &Connection, table: &str, id: i64, owner: i64) -> Result<bool> {
    let sql = format!("SELECT 1 FROM {} WHERE id=?1 AND user_id=?2", table);
    let hit: Option<i64> = conn
        .query_row(&sql, params![id, owner], |r| r.get(0))
        .optional()?;
    Ok(hit.is_some())
}

/// A referenced client must belong to the same owner.
pub fn require_client(conn: &Connection, owner: i64, client_id: Option<i64>) -> Result<()> {
    if let Some(c) = client_id {
        if !exists_owned(conn, "clients", c, owner)? {
            return Err(MoneyaError::not_found("client", c));
        }
    }
    Ok(())
}

/// Writes only the given columns on a row the owner holds. Zero affected rows
/// means the row is missing or belongs to someone else.
pub fn update_owned(
    conn: &Connection,
    table: &str,
    entity: &'static str,
    id: i64,
    owner: i64,
    sets: Vec<(&str, Value)>,
) -> Result<()> {
    if sets.is_empty() {
        return if exists_owned(conn, table, id, owner)? {
            Ok(())
        } else {
            Err(MoneyaError::not_found(entity, id))
        };
    }
    let assignments: Vec<String> = sets
        .iter()
        .enumerate()
        .map(|(i, (col, _))| format!("{}=?{}", col, i + 1))
        .collect();
    let n = sets.len();
    let sql = format!(
        "UPDATE {} SET {} WHERE id=?{} AND user_id=?{}",
        table,
        assignments.join(", "),
        n + 1,
        n + 2
    );
    let mut args: Vec<Value> = sets.into_iter().map(|(_, v)| v).collect();
    args.push(Value::Integer(id));
    args.push(Value::Integer(owner));
    let changed = conn.execute(&sql, params_from_iter(args))?;
    if changed == 0 {
        return Err(MoneyaError::not_found(entity, id));
    }
    log::debug!("updated {} {} ({} columns)", entity, id, n);
    Ok(())
}

pub fn delete_owned(
    conn: &Connection,
    table: &str,
    entity: &'static str,
    id: i64,
    owner: i64,
) -> Result<()> {
    let sql = format!("DELETE FROM {} WHERE id=?1 AND user_id=?2", table);
    let changed = conn.execute(&sql, params![id, owner])?;
    if changed == 0 {
        return Err(MoneyaError::not_found(entity, id));
    }
    log::debug!("deleted {} {}", entity, id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_codes_are_normalised() {
        assert_eq!(parse_currency(" usd ").unwrap(), "USD");
        assert!(parse_currency("US").is_err());
        assert!(parse_currency("EURO").is_err());
    }

    #[test]
    fn date_range_appends_bounds() {
        let mut sql = String::from("SELECT * FROM t WHERE user_id=?");
        let mut args = vec![Value::Integer(1)];
        let range = DateRange::new(NaiveDate::from_ymd_opt(2025, 1, 1), None);
        range.push_sql("date", &mut sql, &mut args);
        assert!(sql.ends_with("AND substr(date,1,10)>=?"));
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn datetime_accepts_space_or_t() {
        assert_eq!(
            parse_datetime("2025-03-01 09:30").unwrap(),
            parse_datetime("2025-03-01T09:30").unwrap()
        );
    }

    #[test]
    fn sync_attempts_defaults_and_validates() {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_schema(&conn).unwrap();
        assert_eq!(sync_max_attempts(&conn).unwrap(), DEFAULT_SYNC_ATTEMPTS);
        set_setting(&conn, "sync_max_attempts", "0").unwrap();
        assert!(sync_max_attempts(&conn).is_err());
        set_setting(&conn, "sync_max_attempts", "5").unwrap();
        assert_eq!(sync_max_attempts(&conn).unwrap(), 5);
    }
}
