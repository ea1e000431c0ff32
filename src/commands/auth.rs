// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Local identity. Credentials belong to the hosted auth provider; this module
//! only tracks which user the device is acting as.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{MoneyaError, Result};
use crate::models::User;
use crate::state::{AppState, NoticeLevel, View};

fn normalise_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(MoneyaError::invalid(format!("Invalid email '{}'", email))),
    }
}

fn find_user(conn: &Connection, email: &str) -> Result<Option<User>> {
    let user = conn
        .query_row(
            "SELECT id, email, name FROM users WHERE email=?1",
            params![email],
            |r| {
                Ok(User {
                    id: r.get(0)?,
                    email: r.get(1)?,
                    name: r.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(user)
}

/// Makes sure the dependent rows exist. Safe to call on every sign-in from
/// any number of devices: each insert is a no-op when the row is present.
pub fn ensure_profiles(conn: &Connection, user: &User, state: &AppState) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO profiles(user_id, display_name, currency, language) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(user_id) DO NOTHING",
        params![user.id, user.name, state.currency, state.language.code()],
    )?;
    tx.execute(
        "INSERT INTO profiles_private(user_id) VALUES (?1) ON CONFLICT(user_id) DO NOTHING",
        params![user.id],
    )?;
    tx.execute(
        "INSERT INTO subscriptions(user_id) VALUES (?1) ON CONFLICT(user_id) DO NOTHING",
        params![user.id],
    )?;
    tx.commit()?;
    Ok(())
}

/// Adopts the stored profile currency so records are created in it.
fn load_profile_currency(conn: &Connection, state: &mut AppState, user_id: i64) -> Result<()> {
    let ccy: Option<String> = conn
        .query_row(
            "SELECT currency FROM profiles WHERE user_id=?1",
            params![user_id],
            |r| r.get(0),
        )
        .optional()?;
    if let Some(c) = ccy {
        state.currency = c;
    }
    Ok(())
}

pub fn sign_up(conn: &Connection, state: &mut AppState, email: &str, name: &str) -> Result<User> {
    let email = normalise_email(email)?;
    if find_user(conn, &email)?.is_some() {
        return Err(MoneyaError::invalid(format!("An account already exists for {}", email)));
    }
    let name = match name.trim() {
        "" => email.split('@').next().unwrap_or_default().to_string(),
        n => n.to_string(),
    };
    conn.execute(
        "INSERT INTO users(email, name) VALUES (?1, ?2)",
        params![email, name],
    )?;
    let user = User {
        id: conn.last_insert_rowid(),
        email,
        name,
    };
    log::info!("registered user {} ({})", user.id, user.email);
    activate(conn, state, user)
}

pub fn sign_in(conn: &Connection, state: &mut AppState, email: &str) -> Result<User> {
    let email = normalise_email(email)?;
    let user = find_user(conn, &email)?
        .ok_or_else(|| MoneyaError::invalid(format!("No account for {}", email)))?;
    activate(conn, state, user)
}

fn activate(conn: &Connection, state: &mut AppState, user: User) -> Result<User> {
    ensure_profiles(conn, &user, state)?;
    load_profile_currency(conn, state, user.id)?;
    state.user = Some(user.clone());
    state.cache.invalidate(&[View::Profile, View::Dashboard]);
    Ok(user)
}

pub fn sign_out(state: &mut AppState) {
    if let Some(u) = state.user.take() {
        log::info!("signed out user {}", u.id);
    }
}

pub fn handle(conn: &Connection, state: &mut AppState, m: &clap::ArgMatches) -> anyhow::Result<()> {
    match m.subcommand() {
        Some(("signup", sub)) => {
            let email = sub.get_one::<String>("email").unwrap();
            let name = sub.get_one::<String>("name").map(String::as_str).unwrap_or("");
            let u = sign_up(conn, state, email, name)?;
            state.notify(NoticeLevel::Success, format!("Welcome, {}", u.name));
        }
        Some(("login", sub)) => {
            let u = sign_in(conn, state, sub.get_one::<String>("email").unwrap())?;
            state.notify(NoticeLevel::Success, format!("Signed in as {}", u.email));
        }
        Some(("logout", _)) => {
            sign_out(state);
            state.notify(NoticeLevel::Info, "Signed out");
        }
        Some(("whoami", _)) => match &state.user {
            Some(u) => println!("{} <{}> (#{})", u.name, u.email, u.id),
            None => println!("Not signed in"),
        },
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_normalised_and_checked() {
        assert_eq!(normalise_email(" Ana@Example.COM ").unwrap(), "ana@example.com");
        assert!(normalise_email("nobody").is_err());
        assert!(normalise_email("@example.com").is_err());
    }
}
