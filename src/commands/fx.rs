// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::BTreeMap;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Deserialize;

use crate::error::{MoneyaError, Result};
use crate::state::AppState;
use crate::utils::{http_client, parse_currency, parse_date, parse_decimal, pretty_table, rates_url};

pub const BASE_CURRENCY: &str = "EUR";

/// Currency code -> units of that currency per one EUR.
#[derive(Debug, Clone, PartialEq)]
pub struct RateTable {
    rates: BTreeMap<String, Decimal>,
}

impl Default for RateTable {
    fn default() -> Self {
        RateTable::new()
    }
}

impl RateTable {
    pub fn new() -> Self {
        let mut rates = BTreeMap::new();
        rates.insert(BASE_CURRENCY.to_string(), Decimal::ONE);
        RateTable { rates }
    }

    pub fn with_rates<'a>(pairs: impl IntoIterator<Item = (&'a str, Decimal)>) -> Self {
        let mut t = RateTable::new();
        for (code, rate) in pairs {
            t.insert(code, rate);
        }
        t
    }

    /// The base currency is pinned at 1 regardless of what the caller passes.
    pub fn insert(&mut self, code: &str, rate: Decimal) {
        let code = code.to_uppercase();
        if code == BASE_CURRENCY {
            return;
        }
        self.rates.insert(code, rate);
    }

    pub fn get(&self, code: &str) -> Option<Decimal> {
        self.rates.get(code).copied()
    }

    /// Rate usable as a divisor: present and strictly positive.
    pub fn rate(&self, code: &str) -> Result<Decimal> {
        match self.get(code) {
            Some(r) if r > Decimal::ZERO => Ok(r),
            _ => Err(MoneyaError::MissingRate(code.to_string())),
        }
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Decimal)> {
        self.rates.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Currency rounding: two places, halves away from zero.
pub fn round2(v: Decimal) -> Decimal {
    v.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Two-step conversion through the base currency.
pub fn convert(amount: Decimal, from: &str, to: &str, rates: &RateTable) -> Result<Decimal> {
    let r_from = rates.rate(from)?;
    let r_to = rates.rate(to)?;
    let converted = amount
        .checked_div(r_from)
        .and_then(|in_base| in_base.checked_mul(r_to))
        .ok_or_else(|| {
            MoneyaError::invalid(format!(
                "Amount {} {} is too large to convert to {}",
                amount, from, to
            ))
        })?;
    Ok(round2(converted))
}

/// Body of the exchange-rate endpoint. Frankfurter-style payloads carry no
/// `result` field and are treated as success.
#[derive(Debug, Deserialize)]
struct RatesPayload {
    result: Option<String>,
    base: Option<String>,
    date: Option<String>,
    #[serde(default)]
    rates: BTreeMap<String, f64>,
    error: Option<String>,
}

pub fn parse_rates_payload(body: &str) -> Result<(Option<NaiveDate>, RateTable)> {
    let p: RatesPayload = serde_json::from_str(body)?;
    if p.result.as_deref() == Some("error") {
        return Err(MoneyaError::RatesUnavailable(
            p.error.unwrap_or_else(|| "unknown error".to_string()),
        ));
    }
    let base = p.base.as_deref().unwrap_or(BASE_CURRENCY).to_uppercase();
    if base != BASE_CURRENCY {
        return Err(MoneyaError::RatesUnavailable(format!(
            "expected {} base, got {}",
            BASE_CURRENCY, base
        )));
    }
    let mut table = RateTable::new();
    for (code, rate) in p.rates {
        let d = rate
            .to_string()
            .parse::<Decimal>()
            .map_err(|_| MoneyaError::invalid(format!("Invalid rate '{}' for {}", rate, code)))?;
        table.insert(&code, d);
    }
    let date = p
        .date
        .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok());
    Ok((date, table))
}

pub fn fetch_rates(url: &str) -> Result<(Option<NaiveDate>, RateTable)> {
    let client = http_client()?;
    let resp = client.get(url).send()?;
    let status = resp.status();
    let body = resp.text()?;
    // error payloads come back with a 500, so parse before checking status
    match parse_rates_payload(&body) {
        Ok(parsed) => Ok(parsed),
        Err(err) if status.is_success() => Err(err),
        Err(MoneyaError::RatesUnavailable(msg)) => Err(MoneyaError::RatesUnavailable(msg)),
        Err(_) => Err(MoneyaError::RatesUnavailable(format!("HTTP {}", status))),
    }
}

pub fn store_rates(conn: &Connection, date: NaiveDate, table: &RateTable) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut n = 0;
    for (quote, rate) in table.iter() {
        n += tx.execute(
            "INSERT INTO fx_rates(date, base, quote, rate) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(date, base, quote) DO UPDATE SET rate=excluded.rate",
            params![date.to_string(), BASE_CURRENCY, quote, rate.to_string()],
        )?;
    }
    tx.commit()?;
    Ok(n)
}

/// Rates from the most recent day on or before `as_of`.
pub fn rates_on(conn: &Connection, as_of: NaiveDate) -> Result<Option<(NaiveDate, RateTable)>> {
    let day: Option<NaiveDate> = conn
        .query_row(
            "SELECT MAX(date) FROM fx_rates WHERE base=?1 AND date<=?2",
            params![BASE_CURRENCY, as_of.to_string()],
            |r| r.get(0),
        )
        .optional()?
        .flatten();
    let Some(day) = day else {
        return Ok(None);
    };
    let mut stmt =
        conn.prepare("SELECT quote, rate FROM fx_rates WHERE base=?1 AND date=?2")?;
    let mut rows = stmt.query(params![BASE_CURRENCY, day.to_string()])?;
    let mut table = RateTable::new();
    while let Some(r) = rows.next()? {
        let quote: String = r.get(0)?;
        let rate = crate::utils::decimal_at(r, 1)?;
        table.insert(&quote, rate);
    }
    Ok(Some((day, table)))
}

pub fn latest_rates(conn: &Connection) -> Result<Option<(NaiveDate, RateTable)>> {
    rates_on(conn, Utc::now().date_naive())
}

/// Fetches from the configured endpoint, caches, and returns the table.
pub fn refresh_rates(conn: &Connection) -> Result<RateTable> {
    let url = rates_url(conn)?;
    let (date, table) = fetch_rates(&url)?;
    let day = date.unwrap_or_else(|| Utc::now().date_naive());
    let n = store_rates(conn, day, &table)?;
    log::info!("stored {} rates for {} from {}", n, day, url);
    Ok(table)
}

pub fn handle(conn: &Connection, state: &AppState, m: &clap::ArgMatches) -> anyhow::Result<()> {
    match m.subcommand() {
        Some(("fetch", _)) => {
            let table = refresh_rates(conn).context("Fetch exchange rates")?;
            println!("Fetched {} rates (base {}).", table.len(), BASE_CURRENCY);
        }
        Some(("list", sub)) => {
            let as_of = match sub.get_one::<String>("date") {
                Some(d) => parse_date(d)?,
                None => Utc::now().date_naive(),
            };
            match rates_on(conn, as_of)? {
                Some((day, table)) => {
                    let rows = table
                        .iter()
                        .map(|(q, r)| vec![day.to_string(), q.to_string(), r.to_string()])
                        .collect();
                    println!("{}", pretty_table(&["Date", "Currency", "Per 1 EUR"], rows));
                }
                None => println!("No rates cached; run `moneya rates fetch`."),
            }
        }
        Some(("convert", sub)) => {
            let amount = parse_decimal(sub.get_one::<String>("amount").unwrap())?;
            let from = parse_currency(sub.get_one::<String>("from").unwrap())?;
            let to = match sub.get_one::<String>("to") {
                Some(t) => parse_currency(t)?,
                None => state.currency.clone(),
            };
            let (_, table) = latest_rates(conn)?
                .context("No rates cached; run `moneya rates fetch`")?;
            let res = convert(amount, &from, &to, &table)?;
            println!("{} {} -> {:.2} {}", amount, from, res, to);
        }
        _ => {}
    }
    Ok(())
}
