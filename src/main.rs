// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use chrono::Utc;
use env_logger::Env;
use rusqlite::Connection;

use moneya::commands::{self, categories, profile};
use moneya::prefs::{prefs_path, Prefs};
use moneya::state::{AppState, NoticeLevel};
use moneya::{cli, db};

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("moneya=info")).init();

    let cli = cli::build_cli();
    let matches = cli.get_matches();

    let conn = db::open_or_init()?;
    let prefs_file = prefs_path()?;
    let mut prefs = Prefs::load(&prefs_file)?;
    let mut state = AppState::from_prefs(&conn, &prefs)?;

    let outcome = dispatch(&conn, &mut state, &mut prefs, &matches);
    if let Err(err) = &outcome {
        state.notify(NoticeLevel::Error, format!("{:#}", err));
    }

    for notice in state.take_notices() {
        match notice.level {
            NoticeLevel::Error => eprintln!("error: {}", notice.message),
            _ => println!("{}", notice.message),
        }
    }

    state.write_prefs(&mut prefs);
    profile::mirror_preferences(&conn, &state);
    if state.user.is_some() && prefs.currency_popup_due(Utc::now()) {
        println!(
            "{}",
            state.tr(
                "Astuce : `moneya currency set <CODE>` change votre devise ; `moneya currency dismiss` masque ce rappel.",
                "Tip: `moneya currency set <CODE>` changes your currency; `moneya currency dismiss` hides this reminder.",
            )
        );
    }
    prefs.save(&prefs_file)?;

    if outcome.is_err() {
        std::process::exit(1);
    }
    Ok(())
}

fn dispatch(
    conn: &Connection,
    state: &mut AppState,
    prefs: &mut Prefs,
    matches: &clap::ArgMatches,
) -> Result<()> {
    match matches.subcommand() {
        Some(("init", _)) => {
            println!("Database initialized at {}", db::db_path()?.display());
        }
        Some(("auth", sub)) => {
            commands::auth::handle(conn, state, sub)?;
            if state.user.is_some() {
                categories::init_defaults(conn, state, prefs)?;
            }
        }
        Some(("profile", sub)) => commands::profile::handle(conn, state, sub)?,
        Some(("client", sub)) => commands::clients::handle(conn, state, sub)?,
        Some(("tx", sub)) => commands::transactions::handle(conn, state, sub)?,
        Some(("invoice", sub)) => commands::invoices::handle(conn, state, sub)?,
        Some(("quote", sub)) => commands::quotations::handle(conn, state, sub)?,
        Some(("task", sub)) => commands::tasks::handle(conn, state, sub)?,
        Some(("event", sub)) => commands::calendar::handle(conn, state, sub)?,
        Some(("category", sub)) => categories::handle(conn, state, prefs, sub)?,
        Some(("currency", sub)) => commands::currency::handle(conn, state, prefs, sub)?,
        Some(("rates", sub)) => commands::fx::handle(conn, state, sub)?,
        Some(("dashboard", sub)) => commands::dashboard::handle(conn, state, sub)?,
        Some(("export", sub)) => commands::exporter::handle(conn, state, sub)?,
        Some(("prefs", sub)) => match sub.subcommand() {
            Some(("notifications", s)) => {
                prefs.notifications_permission =
                    Some(s.get_one::<String>("state").unwrap().trim().to_lowercase());
            }
            _ => println!("{}", serde_json::to_string_pretty(prefs)?),
        },
        _ => {
            cli::build_cli().print_help()?;
            println!();
        }
    }
    Ok(())
}
