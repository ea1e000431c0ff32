// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{anyhow, Result};
use rusqlite::Connection;
use serde_json::json;

use crate::cli::date_range_args;
use crate::commands::transactions::{self, TransactionFilter};
use crate::state::{AppState, NoticeLevel};

pub fn handle(conn: &Connection, state: &AppState, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("transactions", sub)) => export_transactions(conn, state, sub),
        _ => Ok(()),
    }
}

fn export_transactions(conn: &Connection, state: &AppState, sub: &clap::ArgMatches) -> Result<()> {
    let fmt = sub.get_one::<String>("format").unwrap().trim().to_lowercase();
    let out = sub.get_one::<String>("out").unwrap().trim();

    let filter = TransactionFilter {
        range: date_range_args(sub)?,
        ..TransactionFilter::default()
    };
    let mut rows = transactions::list(conn, state, &filter)?;
    rows.reverse();

    match fmt.as_str() {
        "csv" => {
            let mut wtr = csv::Writer::from_path(out)?;
            wtr.write_record([
                "date",
                "kind",
                "amount",
                "currency",
                "category",
                "description",
                "client_id",
            ])?;
            for t in &rows {
                wtr.write_record([
                    t.date.to_string(),
                    t.kind.to_string(),
                    t.amount.to_string(),
                    t.currency_code.clone().unwrap_or_default(),
                    t.category.clone().unwrap_or_default(),
                    t.description.clone(),
                    t.client_id.map(|c| c.to_string()).unwrap_or_default(),
                ])?;
            }
            wtr.flush()?;
        }
        "json" => {
            let items: Vec<_> = rows
                .iter()
                .map(|t| {
                    json!({
                        "date": t.date, "kind": t.kind, "amount": t.amount.to_string(),
                        "currency": t.currency_code, "category": t.category,
                        "description": t.description, "client_id": t.client_id
                    })
                })
                .collect();
            std::fs::write(out, serde_json::to_string_pretty(&items)?)?;
        }
        other => return Err(anyhow!("Unknown format: {} (use csv|json)", other)),
    }
    state.notify(
        NoticeLevel::Success,
        format!("Exported {} transactions to {}", rows.len(), out),
    );
    Ok(())
}
