// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use moneya::commands::{auth, exporter};
use moneya::db::init_schema;
use moneya::state::AppState;
use moneya::cli;
use rusqlite::{params, Connection};
use serde_json::json;
use tempfile::tempdir;

fn base_conn() -> (Connection, AppState) {
    let conn = Connection::open_in_memory().unwrap();
    init_schema(&conn).unwrap();
    let mut state = AppState::default();
    let user = auth::sign_up(&conn, &mut state, "ana@example.com", "Ana").unwrap();
    conn.execute(
        "INSERT INTO transactions(user_id,kind,amount,category,description,date,currency_code) VALUES \
        (?1,'expense','-12.34','Logiciels','Licence','2025-01-02','EUR')",
        params![user.id],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO transactions(user_id,kind,amount,category,description,date,currency_code) VALUES \
        (?1,'income','800','Factures','Facture INV-001 payée','2025-01-05','EUR')",
        params![user.id],
    )
    .unwrap();
    (conn, state)
}

fn export(conn: &Connection, state: &AppState, args: &[&str]) -> anyhow::Result<()> {
    let mut argv = vec!["moneya", "export", "transactions"];
    argv.extend_from_slice(args);
    let matches = cli::build_cli().get_matches_from(argv);
    if let Some(("export", export_m)) = matches.subcommand() {
        exporter::handle(conn, state, export_m)
    } else {
        panic!("no export subcommand");
    }
}

#[test]
fn export_transactions_streams_pretty_json() {
    let (conn, state) = base_conn();
    let dir = tempdir().unwrap();
    let out_path = dir.path().join("export.json");
    let out_str = out_path.to_string_lossy().to_string();

    export(&conn, &state, &["--format", "json", "--out", &out_str, "--to", "2025-01-03"]).unwrap();

    let contents = std::fs::read_to_string(&out_path).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
    assert_eq!(
        parsed,
        json!([
            {
                "date": "2025-01-02",
                "kind": "expense",
                "amount": "-12.34",
                "currency": "EUR",
                "category": "Logiciels",
                "description": "Licence",
                "client_id": null
            }
        ])
    );
}

#[test]
fn export_transactions_writes_csv_oldest_first() {
    let (conn, state) = base_conn();
    let dir = tempdir().unwrap();
    let out_path = dir.path().join("export.csv");
    let out_str = out_path.to_string_lossy().to_string();

    export(&conn, &state, &["--format", "CSV", "--out", &out_str]).unwrap();

    let mut rdr = csv::Reader::from_path(&out_path).unwrap();
    let headers = rdr.headers().unwrap().clone();
    assert_eq!(&headers[0], "date");
    let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(&rows[0][0], "2025-01-02");
    assert_eq!(&rows[1][5], "Facture INV-001 payée");
    assert_eq!(state.take_notices().len(), 1);
}

#[test]
fn export_transactions_rejects_unknown_format() {
    let (conn, state) = base_conn();
    let dir = tempdir().unwrap();
    let out_path = dir.path().join("export.unknown");
    let out_str = out_path.to_string_lossy().to_string();

    assert!(export(&conn, &state, &["--format", "xml", "--out", &out_str]).is_err());
    assert!(!out_path.exists());
}
