// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Rewrites stored amounts when the preferred currency changes.
//!
//! The work is split in two phases. [`plan_currency_sync`] reads every
//! monetary record the user owns and computes the converted values without
//! writing anything. [`apply_plan`] then writes the whole plan, plus the
//! profile currency, inside one SQLite transaction. Each row update is
//! guarded on the currency it was planned from, so a row changed in between
//! aborts the transaction instead of being converted twice. The sync re-plans
//! after such a conflict; rows already tagged with the new currency drop out
//! of the next plan, so only the unconverted remainder is touched.

use chrono::Utc;
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::commands::fx::{self, RateTable};
use crate::commands::{invoices, quotations, transactions};
use crate::error::{MoneyaError, Result};
use crate::models::{Invoice, LineItem, Quotation, Transaction};
use crate::state::{AppState, NoticeLevel, View};
use crate::utils::{items_json, parse_currency, sync_max_attempts};

/// What the converter needs from a stored monetary record.
pub trait Monetary {
    const TABLE: &'static str;
    /// Whether the table has an `items` column to rewrite.
    const HAS_ITEMS: bool;

    fn id(&self) -> i64;
    fn amount(&self) -> Decimal;
    fn items(&self) -> &[LineItem] {
        &[]
    }
    fn currency_code(&self) -> Option<&str>;
}

impl Monetary for Transaction {
    const TABLE: &'static str = "transactions";
    const HAS_ITEMS: bool = false;

    fn id(&self) -> i64 {
        self.id
    }
    fn amount(&self) -> Decimal {
        self.amount
    }
    fn currency_code(&self) -> Option<&str> {
        self.currency_code.as_deref()
    }
}

impl Monetary for Invoice {
    const TABLE: &'static str = "invoices";
    const HAS_ITEMS: bool = true;

    fn id(&self) -> i64 {
        self.id
    }
    fn amount(&self) -> Decimal {
        self.amount
    }
    fn items(&self) -> &[LineItem] {
        &self.items
    }
    fn currency_code(&self) -> Option<&str> {
        self.currency_code.as_deref()
    }
}

impl Monetary for Quotation {
    const TABLE: &'static str = "quotations";
    const HAS_ITEMS: bool = true;

    fn id(&self) -> i64 {
        self.id
    }
    fn amount(&self) -> Decimal {
        self.amount
    }
    fn items(&self) -> &[LineItem] {
        &self.items
    }
    fn currency_code(&self) -> Option<&str> {
        self.currency_code.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedConversion {
    pub table: &'static str,
    pub id: i64,
    /// The stored tag, `None` for legacy rows; the apply step matches on it.
    pub stored_currency: Option<String>,
    pub from_currency: String,
    pub old_amount: Decimal,
    pub new_amount: Decimal,
    /// Present only for tables with line items.
    pub items: Option<Vec<LineItem>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncPlan {
    pub old_currency: String,
    pub new_currency: String,
    pub conversions: Vec<PlannedConversion>,
    /// Rows already tagged with the target currency.
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SyncReport {
    pub converted: usize,
    pub skipped: usize,
    pub attempts: u32,
}

/// Converts one record. Source currency is the record's own tag, falling back
/// to `old` for rows that predate the tag. Items and the top-level amount are
/// converted independently; the amount is never rebuilt from the items.
pub fn plan_record<T: Monetary>(
    rec: &T,
    old: &str,
    new: &str,
    rates: &RateTable,
) -> Result<Option<PlannedConversion>> {
    let stored = rec.currency_code().map(str::to_string);
    let from = stored.clone().unwrap_or_else(|| old.to_string());
    if from == new {
        return Ok(None);
    }
    let new_amount = fx::convert(rec.amount(), &from, new, rates)?;
    let items = if T::HAS_ITEMS {
        let mut converted = Vec::with_capacity(rec.items().len());
        for item in rec.items() {
            converted.push(LineItem {
                description: item.description.clone(),
                quantity: item.quantity,
                unit_price: fx::convert(item.unit_price, &from, new, rates)?,
            });
        }
        Some(converted)
    } else {
        None
    };
    Ok(Some(PlannedConversion {
        table: T::TABLE,
        id: rec.id(),
        stored_currency: stored,
        from_currency: from,
        old_amount: rec.amount(),
        new_amount,
        items,
    }))
}

fn plan_all<T: Monetary>(
    records: &[T],
    old: &str,
    new: &str,
    rates: &RateTable,
    plan: &mut SyncPlan,
) -> Result<()> {
    for rec in records {
        match plan_record(rec, old, new, rates)? {
            Some(c) => plan.conversions.push(c),
            None => plan.skipped += 1,
        }
    }
    Ok(())
}

/// Reads every monetary record of `owner` and computes the conversions. Any
/// read failure or missing rate aborts here, before anything is written.
pub fn plan_currency_sync(
    conn: &Connection,
    owner: i64,
    old: &str,
    new: &str,
    rates: &RateTable,
) -> Result<SyncPlan> {
    rates.rate(new)?;
    let mut plan = SyncPlan {
        old_currency: old.to_string(),
        new_currency: new.to_string(),
        conversions: Vec::new(),
        skipped: 0,
    };
    plan_all(&transactions::all_for_owner(conn, owner)?, old, new, rates, &mut plan)?;
    plan_all(&invoices::all_for_owner(conn, owner)?, old, new, rates, &mut plan)?;
    plan_all(&quotations::all_for_owner(conn, owner)?, old, new, rates, &mut plan)?;
    Ok(plan)
}

/// Writes the plan atomically. A guarded update that matches no row rolls
/// everything back and yields [`MoneyaError::Conflict`].
pub fn apply_plan(conn: &Connection, owner: i64, plan: &SyncPlan) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    for c in &plan.conversions {
        let changed = match &c.items {
            Some(items) => tx.execute(
                &format!(
                    "UPDATE {} SET amount=?1, items=?2, currency_code=?3
                     WHERE id=?4 AND user_id=?5 AND currency_code IS ?6",
                    c.table
                ),
                params![
                    c.new_amount.to_string(),
                    items_json(items)?,
                    plan.new_currency,
                    c.id,
                    owner,
                    c.stored_currency
                ],
            )?,
            None => tx.execute(
                &format!(
                    "UPDATE {} SET amount=?1, currency_code=?2
                     WHERE id=?3 AND user_id=?4 AND currency_code IS ?5",
                    c.table
                ),
                params![
                    c.new_amount.to_string(),
                    plan.new_currency,
                    c.id,
                    owner,
                    c.stored_currency
                ],
            )?,
        };
        if changed != 1 {
            return Err(MoneyaError::Conflict(format!(
                "{} {} changed while converting",
                c.table, c.id
            )));
        }
    }
    tx.execute(
        "UPDATE profiles SET currency=?1, updated_at=datetime('now') WHERE user_id=?2",
        params![plan.new_currency, owner],
    )?;
    tx.commit()?;
    Ok(plan.conversions.len())
}

/// Converts every monetary record of the session user from `old` to `new`.
///
/// Does nothing at all, not even a notice, when the currencies match. On
/// success the transaction, invoice and quotation views are invalidated and
/// a notice reports the count; on failure an error notice is queued and the
/// error returned.
pub fn sync_currency(
    conn: &Connection,
    state: &AppState,
    old: &str,
    new: &str,
    rates: &RateTable,
) -> Result<SyncReport> {
    if old == new {
        return Ok(SyncReport::default());
    }
    let result = run_sync(conn, state, old, new, rates);
    match &result {
        Ok(report) => {
            state.cache.invalidate(&[
                View::Transactions,
                View::Invoices,
                View::Quotations,
                View::Dashboard,
                View::Profile,
            ]);
            state.notify(
                NoticeLevel::Success,
                state.tr(
                    &format!("{} enregistrements convertis en {}", report.converted, new),
                    &format!("{} records converted to {}", report.converted, new),
                ),
            );
        }
        Err(err) => state.notify(
            NoticeLevel::Error,
            format!(
                "{}: {}",
                state.tr("Échec de la conversion", "Currency conversion failed"),
                err
            ),
        ),
    }
    result
}

fn run_sync(
    conn: &Connection,
    state: &AppState,
    old: &str,
    new: &str,
    rates: &RateTable,
) -> Result<SyncReport> {
    let owner = state.user_id()?;
    let max_attempts = sync_max_attempts(conn)?;
    let ((converted, skipped), attempts) = retry_on_conflict(max_attempts, || {
        let plan = plan_currency_sync(conn, owner, old, new, rates)?;
        let converted = apply_plan(conn, owner, &plan)?;
        Ok((converted, plan.skipped))
    })?;
    log::info!(
        "currency sync {} -> {} for user {}: {} converted, {} skipped, attempt {}",
        old,
        new,
        owner,
        converted,
        skipped,
        attempts
    );
    Ok(SyncReport {
        converted,
        skipped,
        attempts,
    })
}

/// Reruns `run` while it fails with [`MoneyaError::Conflict`], at most
/// `max_attempts` times in total. Returns the value with the number of runs.
fn retry_on_conflict<T>(
    max_attempts: u32,
    mut run: impl FnMut() -> Result<T>,
) -> Result<(T, u32)> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match run() {
            Ok(value) => return Ok((value, attempt)),
            Err(MoneyaError::Conflict(msg)) if attempt < max_attempts => {
                log::warn!("currency sync conflict ({}), re-planning", msg);
            }
            Err(err) => return Err(err),
        }
    }
}

/// Switches the session currency, converting stored records first. The
/// session keeps its old currency if the conversion fails.
pub fn change_currency(
    conn: &Connection,
    state: &mut AppState,
    new: &str,
    rates: &RateTable,
) -> Result<SyncReport> {
    let new = parse_currency(new)?;
    let old = state.currency.clone();
    let report = sync_currency(conn, state, &old, &new, rates)?;
    state.currency = new;
    Ok(report)
}

fn rates_for_sync(conn: &Connection, refresh: bool) -> anyhow::Result<RateTable> {
    if refresh {
        return Ok(fx::refresh_rates(conn)?);
    }
    match fx::latest_rates(conn)? {
        Some((day, table)) if day == Utc::now().date_naive() => Ok(table),
        cached => match fx::refresh_rates(conn) {
            Ok(table) => Ok(table),
            Err(err) => match cached {
                Some((day, table)) => {
                    log::warn!("rate refresh failed ({}), using cached rates from {}", err, day);
                    Ok(table)
                }
                None => Err(err.into()),
            },
        },
    }
}

pub fn handle(
    conn: &Connection,
    state: &mut AppState,
    prefs: &mut crate::prefs::Prefs,
    m: &clap::ArgMatches,
) -> anyhow::Result<()> {
    match m.subcommand() {
        Some(("show", _)) => println!("{}", state.currency),
        Some(("set", sub)) => {
            let code = sub.get_one::<String>("code").unwrap();
            let rates = rates_for_sync(conn, sub.get_flag("refresh"))?;
            if sub.get_flag("dry_run") {
                let new = parse_currency(code)?;
                let plan = plan_currency_sync(conn, state.user_id()?, &state.currency, &new, &rates)?;
                println!("{}", serde_json::to_string_pretty(&plan)?);
                return Ok(());
            }
            change_currency(conn, state, code, &rates)?;
            prefs.dismiss_currency_popup(Utc::now());
        }
        Some(("dismiss", _)) => {
            prefs.dismiss_currency_popup(Utc::now());
        }
        _ => {}
    }
    Ok(())
}
