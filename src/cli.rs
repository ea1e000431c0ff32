// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};

use crate::utils::{parse_date, DateRange};

/// `--id`, trimmed before parsing so pasted values with spaces still work.
pub fn id_arg(sub: &ArgMatches) -> anyhow::Result<i64> {
    let raw = sub.get_one::<String>("id").context("--id is required")?;
    raw.trim()
        .parse::<i64>()
        .with_context(|| format!("Invalid id '{}'", raw))
}

/// Trimmed optional string; blank counts as absent.
pub fn opt_string(sub: &ArgMatches, name: &str) -> Option<String> {
    sub.try_get_one::<String>(name)
        .ok()
        .flatten()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

pub fn date_range_args(sub: &ArgMatches) -> anyhow::Result<DateRange> {
    let get = |name: &str| -> anyhow::Result<Option<chrono::NaiveDate>> {
        match sub.try_get_one::<String>(name).ok().flatten() {
            Some(s) => Ok(Some(parse_date(s)?)),
            None => Ok(None),
        }
    };
    Ok(DateRange::new(get("from")?, get("to")?))
}

fn opt(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name).long(name).help(help)
}

fn req(name: &'static str, help: &'static str) -> Arg {
    opt(name, help).required(true)
}

fn id() -> Arg {
    req("id", "Record id")
}

fn client() -> Arg {
    Arg::new("client")
        .long("client")
        .value_parser(value_parser!(i64))
        .help("Client id")
}

fn output_flags(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("json")
            .long("json")
            .action(ArgAction::SetTrue)
            .help("Print JSON"),
    )
    .arg(
        Arg::new("jsonl")
            .long("jsonl")
            .action(ArgAction::SetTrue)
            .help("Print one JSON object per line"),
    )
}

fn range_args(cmd: Command) -> Command {
    cmd.arg(opt("from", "Start date YYYY-MM-DD (inclusive)"))
        .arg(opt("to", "End date YYYY-MM-DD (inclusive)"))
}

fn document_args(cmd: Command, end_name: &'static str, end_help: &'static str) -> Command {
    cmd.arg(client())
        .arg(opt("amount", "Total amount (defaults to the sum of the items)"))
        .arg(
            Arg::new("item")
                .long("item")
                .action(ArgAction::Append)
                .help("Line item as description:quantity:unit_price (repeatable)"),
        )
        .arg(opt("date", "Issue date YYYY-MM-DD"))
        .arg(opt(end_name, end_help))
        .arg(opt("status", "Status"))
        .arg(opt("notes", "Notes"))
}

fn clients_cmd() -> Command {
    let fields = |c: Command| {
        c.arg(opt("email", "Email"))
            .arg(opt("phone", "Phone"))
            .arg(opt("company", "Company"))
            .arg(opt("address", "Postal address"))
            .arg(opt("notes", "Notes"))
    };
    Command::new("client")
        .about("Manage clients")
        .subcommand(fields(Command::new("add").arg(req("name", "Client name"))))
        .subcommand(output_flags(Command::new("list")))
        .subcommand(Command::new("show").arg(id()))
        .subcommand(fields(Command::new("edit").arg(id()).arg(opt("name", "Client name"))))
        .subcommand(Command::new("rm").arg(id()))
}

fn transactions_cmd() -> Command {
    let fields = |c: Command| {
        c.arg(opt("category", "Category name"))
            .arg(opt("description", "Description"))
            .arg(client())
    };
    Command::new("tx")
        .about("Record income, expenses and savings")
        .subcommand(fields(
            Command::new("add")
                .arg(req("kind", "income | expense | savings"))
                .arg(req("amount", "Amount"))
                .arg(req("date", "Date YYYY-MM-DD"))
                .arg(opt("currency", "Currency code (defaults to yours)")),
        ))
        .subcommand(output_flags(range_args(
            Command::new("list")
                .arg(opt("kind", "income | expense | savings"))
                .arg(client())
                .arg(
                    Arg::new("limit")
                        .long("limit")
                        .value_parser(value_parser!(usize))
                        .help("Max rows"),
                ),
        )))
        .subcommand(fields(
            Command::new("edit")
                .arg(id())
                .arg(opt("kind", "income | expense | savings"))
                .arg(opt("amount", "Amount"))
                .arg(opt("date", "Date YYYY-MM-DD")),
        ))
        .subcommand(Command::new("rm").arg(id()))
}

fn invoices_cmd() -> Command {
    Command::new("invoice")
        .about("Manage invoices")
        .subcommand(document_args(
            Command::new("add")
                .arg(opt("number", "Invoice number (auto INV-NNN)"))
                .arg(opt("currency", "Currency code (defaults to yours)")),
            "due",
            "Due date YYYY-MM-DD",
        ))
        .subcommand(output_flags(range_args(
            Command::new("list").arg(opt("status", "Status")).arg(client()),
        )))
        .subcommand(Command::new("show").arg(id()))
        .subcommand(document_args(Command::new("edit").arg(id()), "due", "Due date YYYY-MM-DD"))
        .subcommand(Command::new("pay").arg(id()).about("Mark paid and book the income"))
        .subcommand(Command::new("rm").arg(id()))
}

fn quotations_cmd() -> Command {
    Command::new("quote")
        .about("Manage quotations")
        .subcommand(document_args(
            Command::new("add")
                .arg(opt("number", "Quotation number (auto QUO-NNN)"))
                .arg(opt("currency", "Currency code (defaults to yours)")),
            "valid_until",
            "Valid until YYYY-MM-DD",
        ))
        .subcommand(output_flags(range_args(
            Command::new("list").arg(opt("status", "Status")).arg(client()),
        )))
        .subcommand(Command::new("show").arg(id()))
        .subcommand(document_args(
            Command::new("edit").arg(id()),
            "valid_until",
            "Valid until YYYY-MM-DD",
        ))
        .subcommand(
            Command::new("invoice")
                .arg(id())
                .about("Create a draft invoice from an accepted quotation"),
        )
        .subcommand(Command::new("rm").arg(id()))
}

fn tasks_cmd() -> Command {
    let fields = |c: Command| {
        c.arg(opt("description", "Description"))
            .arg(opt("status", "todo | in_progress | done"))
            .arg(opt("priority", "low | medium | high"))
            .arg(opt("due", "Due date YYYY-MM-DD"))
            .arg(client())
    };
    Command::new("task")
        .about("Manage tasks")
        .subcommand(fields(Command::new("add").arg(req("title", "Title"))))
        .subcommand(output_flags(range_args(
            Command::new("list")
                .arg(opt("status", "todo | in_progress | done"))
                .arg(client()),
        )))
        .subcommand(fields(Command::new("edit").arg(id()).arg(opt("title", "Title"))))
        .subcommand(Command::new("done").arg(id()))
        .subcommand(Command::new("rm").arg(id()))
}

fn calendar_cmd() -> Command {
    let fields = |c: Command| {
        c.arg(opt("description", "Description"))
            .arg(opt("end", "End YYYY-MM-DD HH:MM"))
            .arg(client())
    };
    Command::new("event")
        .about("Manage calendar events")
        .subcommand(fields(
            Command::new("add")
                .arg(req("title", "Title"))
                .arg(req("start", "Start YYYY-MM-DD HH:MM")),
        ))
        .subcommand(output_flags(range_args(Command::new("list"))))
        .subcommand(fields(
            Command::new("edit")
                .arg(id())
                .arg(opt("title", "Title"))
                .arg(opt("start", "Start YYYY-MM-DD HH:MM")),
        ))
        .subcommand(Command::new("rm").arg(id()))
}

fn categories_cmd() -> Command {
    Command::new("category")
        .about("Manage categories")
        .subcommand(
            Command::new("add")
                .arg(req("name", "Category name"))
                .arg(req("kind", "income | expense | savings")),
        )
        .subcommand(output_flags(
            Command::new("list").arg(opt("kind", "income | expense | savings")),
        ))
        .subcommand(Command::new("rename").arg(id()).arg(req("name", "New name")))
        .subcommand(Command::new("rm").arg(id()))
        .subcommand(Command::new("init").about("Add the default categories"))
}

pub fn build_cli() -> Command {
    Command::new("moneya")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Moneya: freelancer finances, invoicing and client management")
        .subcommand(Command::new("init").about("Create the database"))
        .subcommand(
            Command::new("auth")
                .about("Sign up, sign in and out")
                .subcommand(
                    Command::new("signup")
                        .arg(req("email", "Email"))
                        .arg(opt("name", "Display name")),
                )
                .subcommand(Command::new("login").arg(req("email", "Email")))
                .subcommand(Command::new("logout"))
                .subcommand(Command::new("whoami")),
        )
        .subcommand(
            Command::new("profile")
                .about("Show or edit your profile")
                .subcommand(Command::new("show").arg(
                    Arg::new("json").long("json").action(ArgAction::SetTrue),
                ))
                .subcommand(
                    Command::new("edit")
                        .arg(opt("name", "Display name"))
                        .arg(opt("phone", "Phone"))
                        .arg(opt("address", "Address"))
                        .arg(opt("company", "Company"))
                        .arg(opt("vat", "VAT number")),
                )
                .subcommand(
                    Command::new("language")
                        .arg(Arg::new("code").required(true).help("fr | en")),
                ),
        )
        .subcommand(clients_cmd())
        .subcommand(transactions_cmd())
        .subcommand(invoices_cmd())
        .subcommand(quotations_cmd())
        .subcommand(tasks_cmd())
        .subcommand(calendar_cmd())
        .subcommand(categories_cmd())
        .subcommand(
            Command::new("currency")
                .about("Show or change your currency")
                .subcommand(Command::new("show"))
                .subcommand(
                    Command::new("set")
                        .about("Change currency and convert every stored amount")
                        .arg(Arg::new("code").required(true).help("Currency code"))
                        .arg(
                            Arg::new("refresh")
                                .long("refresh")
                                .action(ArgAction::SetTrue)
                                .help("Fetch fresh rates first"),
                        )
                        .arg(
                            Arg::new("dry_run")
                                .long("dry-run")
                                .action(ArgAction::SetTrue)
                                .help("Print the conversion plan without writing"),
                        ),
                )
                .subcommand(Command::new("dismiss").about("Hide the currency reminder for a week")),
        )
        .subcommand(
            Command::new("rates")
                .about("Exchange rates (EUR base)")
                .subcommand(Command::new("fetch"))
                .subcommand(Command::new("list").arg(opt("date", "As of YYYY-MM-DD")))
                .subcommand(
                    Command::new("convert")
                        .arg(req("amount", "Amount"))
                        .arg(req("from", "From currency"))
                        .arg(opt("to", "To currency (defaults to yours)")),
                ),
        )
        .subcommand(output_flags(range_args(
            Command::new("dashboard").about("Totals and reminders"),
        )))
        .subcommand(
            Command::new("export").about("Export data").subcommand(range_args(
                Command::new("transactions")
                    .arg(req("format", "csv | json"))
                    .arg(req("out", "Output path")),
            )),
        )
        .subcommand(
            Command::new("prefs")
                .about("Device preferences")
                .subcommand(Command::new("show"))
                .subcommand(
                    Command::new("notifications")
                        .arg(req("state", "granted | denied | default")),
                ),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn blank_optional_values_are_absent() {
        let m = build_cli().get_matches_from(["moneya", "client", "add", "--name", "Acme", "--email", "  "]);
        let (_, client) = m.subcommand().unwrap();
        let (_, add) = client.subcommand().unwrap();
        assert_eq!(opt_string(add, "email"), None);
        assert_eq!(opt_string(add, "name").as_deref(), Some("Acme"));
        assert_eq!(opt_string(add, "not_an_arg"), None);
    }
}
