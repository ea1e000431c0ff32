// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Device-local preferences. A soft cache only: nothing financial lives here.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::db::APP;

/// How long a dismissed currency popup stays hidden.
const POPUP_SNOOZE_DAYS: i64 = 7;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Prefs {
    pub language: Option<String>,
    pub currency: Option<String>,
    pub session_user_id: Option<i64>,
    pub currency_popup_dismissed_at: Option<DateTime<Utc>>,
    /// Users whose default categories have already been seeded on this device.
    pub categories_initialized: Vec<i64>,
    pub notifications_permission: Option<String>,
}

pub fn prefs_path() -> Result<PathBuf> {
    if let Ok(home) = std::env::var("MONEYA_HOME") {
        return Ok(Path::new(&home).join("prefs.json"));
    }
    let proj = ProjectDirs::from(APP.0, APP.1, APP.2)
        .context("Could not determine platform-specific config dir")?;
    Ok(proj.config_dir().join("prefs.json"))
}

impl Prefs {
    /// Missing file means defaults; a corrupt file is reset rather than fatal.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Prefs::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Read preferences at {}", path.display()))?;
        match serde_json::from_str(&raw) {
            Ok(p) => Ok(p),
            Err(err) => {
                log::warn!("ignoring unreadable preferences {}: {}", path.display(), err);
                Ok(Prefs::default())
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("Failed to create config dir")?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Write preferences at {}", path.display()))?;
        Ok(())
    }

    pub fn dismiss_currency_popup(&mut self, now: DateTime<Utc>) {
        self.currency_popup_dismissed_at = Some(now);
    }

    pub fn currency_popup_due(&self, now: DateTime<Utc>) -> bool {
        match self.currency_popup_dismissed_at {
            Some(at) => now - at >= Duration::days(POPUP_SNOOZE_DAYS),
            None => true,
        }
    }

    pub fn categories_initialized_for(&self, user_id: i64) -> bool {
        self.categories_initialized.contains(&user_id)
    }

    pub fn mark_categories_initialized(&mut self, user_id: i64) {
        if !self.categories_initialized_for(user_id) {
            self.categories_initialized.push(user_id);
        }
    }
}
