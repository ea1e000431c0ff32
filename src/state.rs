// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Application state handed to every operation by reference: the signed-in
//! user, active language and currency, stale views, and pending notices.

use std::cell::RefCell;
use std::collections::BTreeSet;

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::error::{MoneyaError, Result};
use crate::models::User;
use crate::prefs::Prefs;

pub const DEFAULT_CURRENCY: &str = "EUR";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Language {
    #[default]
    Fr,
    En,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::Fr => "fr",
            Language::En => "en",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "fr" => Ok(Language::Fr),
            "en" => Ok(Language::En),
            other => Err(MoneyaError::invalid(format!("Unsupported language '{}'", other))),
        }
    }
}

/// List views whose cached contents a mutation can make stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum View {
    Clients,
    Transactions,
    Invoices,
    Quotations,
    Tasks,
    CalendarEvents,
    Categories,
    Profile,
    Dashboard,
}

#[derive(Debug, Default)]
pub struct ViewCache {
    stale: RefCell<BTreeSet<View>>,
}

impl ViewCache {
    pub fn invalidate(&self, views: &[View]) {
        let mut stale = self.stale.borrow_mut();
        for v in views {
            log::debug!("invalidate view {:?}", v);
            stale.insert(*v);
        }
    }

    pub fn is_stale(&self, view: View) -> bool {
        self.stale.borrow().contains(&view)
    }

    /// Called after a view has been re-read from the store.
    pub fn mark_fresh(&self, view: View) {
        self.stale.borrow_mut().remove(&view);
    }

    pub fn stale_views(&self) -> Vec<View> {
        self.stale.borrow().iter().copied().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NoticeLevel {
    Success,
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

#[derive(Debug)]
pub struct AppState {
    pub user: Option<User>,
    pub language: Language,
    pub currency: String,
    pub cache: ViewCache,
    notices: RefCell<Vec<Notice>>,
}

impl Default for AppState {
    fn default() -> Self {
        AppState::new(Language::default(), DEFAULT_CURRENCY)
    }
}

impl AppState {
    pub fn new(language: Language, currency: &str) -> Self {
        AppState {
            user: None,
            language,
            currency: currency.to_uppercase(),
            cache: ViewCache::default(),
            notices: RefCell::new(Vec::new()),
        }
    }

    /// Rebuilds state from device preferences. A stored session whose user
    /// no longer exists is dropped silently.
    pub fn from_prefs(conn: &Connection, prefs: &Prefs) -> Result<Self> {
        let language = match prefs.language.as_deref() {
            Some(code) => Language::parse(code).unwrap_or_default(),
            None => Language::default(),
        };
        let currency = prefs.currency.as_deref().unwrap_or(DEFAULT_CURRENCY);
        let mut state = AppState::new(language, currency);
        if let Some(uid) = prefs.session_user_id {
            state.user = conn
                .query_row(
                    "SELECT id, email, name FROM users WHERE id=?1",
                    params![uid],
                    |r| {
                        Ok(User {
                            id: r.get(0)?,
                            email: r.get(1)?,
                            name: r.get(2)?,
                        })
                    },
                )
                .optional()?;
        }
        Ok(state)
    }

    pub fn write_prefs(&self, prefs: &mut Prefs) {
        prefs.language = Some(self.language.code().to_string());
        prefs.currency = Some(self.currency.clone());
        prefs.session_user_id = self.user.as_ref().map(|u| u.id);
    }

    pub fn user_id(&self) -> Result<i64> {
        self.user
            .as_ref()
            .map(|u| u.id)
            .ok_or(MoneyaError::NotAuthenticated)
    }

    pub fn notify(&self, level: NoticeLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            NoticeLevel::Error => log::warn!("{}", message),
            _ => log::info!("{}", message),
        }
        self.notices.borrow_mut().push(Notice { level, message });
    }

    pub fn take_notices(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.notices.borrow_mut())
    }

    /// Picks the message matching the active language.
    pub fn tr<'a>(&self, fr: &'a str, en: &'a str) -> &'a str {
        match self.language {
            Language::Fr => fr,
            Language::En => en,
        }
    }
}
