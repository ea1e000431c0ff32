// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use thiserror::Error;

/// Errors raised by the data layer.
///
/// `NotFound` is what an owner-scoped write reports when it touches zero rows,
/// which covers both "no such id" and "owned by someone else". Transport
/// failures stay in `Store`/`Http` so callers can tell them apart.
#[derive(Debug, Error)]
pub enum MoneyaError {
    #[error("Not signed in: run `moneya auth login` first")]
    NotAuthenticated,

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("{0}")]
    Invalid(String),

    #[error("No exchange rate for {0}")]
    MissingRate(String),

    #[error("Exchange rates unavailable: {0}")]
    RatesUnavailable(String),

    #[error("Concurrent modification: {0}")]
    Conflict(String),

    #[error(transparent)]
    Store(#[from] rusqlite::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MoneyaError>;

impl MoneyaError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        MoneyaError::Invalid(msg.into())
    }

    pub fn not_found(entity: &'static str, id: i64) -> Self {
        MoneyaError::NotFound { entity, id }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, MoneyaError::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_distinct_from_store_errors() {
        let err = MoneyaError::not_found("client", 7);
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "client 7 not found");

        let store = MoneyaError::from(rusqlite::Error::QueryReturnedNoRows);
        assert!(!store.is_not_found());
    }
}
