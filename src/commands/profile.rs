// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::Serialize;

use crate::cli::opt_string;
use crate::error::{MoneyaError, Result};
use crate::models::{PrivateProfile, Profile, Subscription};
use crate::state::{AppState, Language, NoticeLevel, View};
use crate::utils::opt_text;

#[derive(Debug, Clone, Serialize)]
pub struct ProfileView {
    pub profile: Profile,
    pub private: PrivateProfile,
    pub subscription: Option<Subscription>,
}

#[derive(Debug, Clone, Default)]
pub struct ProfilePatch {
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub company: Option<String>,
    pub vat_number: Option<String>,
}

pub fn get(conn: &Connection, state: &AppState) -> Result<ProfileView> {
    let owner = state.user_id()?;
    let profile = conn
        .query_row(
            "SELECT user_id, display_name, currency, language FROM profiles WHERE user_id=?1",
            params![owner],
            |r| {
                Ok(Profile {
                    user_id: r.get(0)?,
                    display_name: r.get(1)?,
                    currency: r.get(2)?,
                    language: r.get(3)?,
                })
            },
        )
        .optional()?
        .ok_or(MoneyaError::not_found("profile", owner))?;
    let private = conn
        .query_row(
            "SELECT user_id, phone, address, company, vat_number FROM profiles_private WHERE user_id=?1",
            params![owner],
            |r| {
                Ok(PrivateProfile {
                    user_id: r.get(0)?,
                    phone: r.get(1)?,
                    address: r.get(2)?,
                    company: r.get(3)?,
                    vat_number: r.get(4)?,
                })
            },
        )
        .optional()?
        .unwrap_or(PrivateProfile {
            user_id: owner,
            ..PrivateProfile::default()
        });
    let subscription = conn
        .query_row(
            "SELECT user_id, plan, status, renews_on FROM subscriptions WHERE user_id=?1",
            params![owner],
            |r| {
                Ok(Subscription {
                    user_id: r.get(0)?,
                    plan: r.get(1)?,
                    status: r.get(2)?,
                    renews_on: r.get(3)?,
                })
            },
        )
        .optional()?;
    state.cache.mark_fresh(View::Profile);
    Ok(ProfileView {
        profile,
        private,
        subscription,
    })
}

pub fn update(conn: &Connection, state: &AppState, patch: ProfilePatch) -> Result<ProfileView> {
    let owner = state.user_id()?;
    let tx = conn.unchecked_transaction()?;
    if let Some(name) = patch.display_name {
        let n = tx.execute(
            "UPDATE profiles SET display_name=?1, updated_at=datetime('now') WHERE user_id=?2",
            params![name.trim(), owner],
        )?;
        if n == 0 {
            return Err(MoneyaError::not_found("profile", owner));
        }
    }
    let mut sets: Vec<(&str, Value)> = Vec::new();
    for (col, v) in [
        ("phone", patch.phone),
        ("address", patch.address),
        ("company", patch.company),
        ("vat_number", patch.vat_number),
    ] {
        if v.is_some() {
            sets.push((col, opt_text(v)));
        }
    }
    if !sets.is_empty() {
        let assignments: Vec<String> = sets
            .iter()
            .enumerate()
            .map(|(i, (c, _))| format!("{}=?{}", c, i + 1))
            .collect();
        let sql = format!(
            "UPDATE profiles_private SET {} WHERE user_id=?{}",
            assignments.join(", "),
            sets.len() + 1
        );
        let mut args: Vec<Value> = sets.into_iter().map(|(_, v)| v).collect();
        args.push(Value::Integer(owner));
        if tx.execute(&sql, params_from_iter(args))? == 0 {
            return Err(MoneyaError::not_found("profile", owner));
        }
    }
    tx.commit()?;
    state.cache.invalidate(&[View::Profile]);
    get(conn, state)
}

/// Mirrors a preference into the profile row. The local value is the one
/// that counts, so failures are logged and swallowed.
pub fn mirror_preferences(conn: &Connection, state: &AppState) {
    let Ok(owner) = state.user_id() else {
        return;
    };
    if let Err(err) = conn.execute(
        "UPDATE profiles SET currency=?1, language=?2, updated_at=datetime('now') WHERE user_id=?3",
        params![state.currency, state.language.code(), owner],
    ) {
        log::warn!("could not mirror preferences for user {}: {}", owner, err);
    }
}

pub fn set_language(conn: &Connection, state: &mut AppState, lang: Language) {
    state.language = lang;
    mirror_preferences(conn, state);
    state.cache.invalidate(&[View::Profile]);
}

pub fn handle(conn: &Connection, state: &mut AppState, m: &clap::ArgMatches) -> anyhow::Result<()> {
    match m.subcommand() {
        Some(("show", sub)) => {
            let v = get(conn, state)?;
            if !crate::utils::maybe_print_json(sub.get_flag("json"), false, &v)? {
                let rows = vec![
                    vec!["Name".into(), v.profile.display_name],
                    vec!["Currency".into(), v.profile.currency],
                    vec!["Language".into(), v.profile.language],
                    vec!["Company".into(), v.private.company.unwrap_or_default()],
                    vec!["Phone".into(), v.private.phone.unwrap_or_default()],
                    vec!["Address".into(), v.private.address.unwrap_or_default()],
                    vec!["VAT".into(), v.private.vat_number.unwrap_or_default()],
                    vec![
                        "Plan".into(),
                        v.subscription
                            .map(|s| format!("{} ({})", s.plan, s.status))
                            .unwrap_or_default(),
                    ],
                ];
                println!("{}", crate::utils::pretty_table(&["Field", "Value"], rows));
            }
        }
        Some(("edit", sub)) => {
            update(
                conn,
                state,
                ProfilePatch {
                    display_name: opt_string(sub, "name"),
                    phone: opt_string(sub, "phone"),
                    address: opt_string(sub, "address"),
                    company: opt_string(sub, "company"),
                    vat_number: opt_string(sub, "vat"),
                },
            )?;
            state.notify(NoticeLevel::Success, "Profile updated");
        }
        Some(("language", sub)) => {
            let lang = Language::parse(sub.get_one::<String>("code").unwrap())?;
            set_language(conn, state, lang);
            state.notify(
                NoticeLevel::Success,
                state.tr("Langue mise à jour", "Language updated"),
            );
        }
        _ => {}
    }
    Ok(())
}
