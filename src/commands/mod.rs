// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

pub mod auth;
pub mod profile;
pub mod clients;
pub mod categories;
pub mod transactions;
pub mod documents;
pub mod invoices;
pub mod quotations;
pub mod tasks;
pub mod calendar;
pub mod fx;
pub mod currency;
pub mod dashboard;
pub mod exporter;
