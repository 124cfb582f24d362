/*
 * aurforge - AUR helper with recursive dependency builds.
 * Copyright (C) 2025  aurforge contributors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use anyhow::{anyhow, Context, Result};
use chrono::SecondsFormat;
use clap::Parser;
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;
use console::Style;
use std::process::ExitCode;
use std::rc::Rc;

mod alpm_manager;
mod aur;
mod config;
mod error;
mod interrupt;
mod logging;
mod report;
#[cfg(test)]
mod testutil;

use alpm_manager::{AlpmManager, PackageDatabase};
use aur::{
    find_upgrades, AurClient, BuildOutcome, HttpDownloader, Makepkg, MetadataService,
    Orchestrator, OrchestratorSettings, PackageRecord,
};
use config::Config;
use error::AurforgeError;
use interrupt::Interrupt;
use report::Reporter;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\n",
    "Copyright (C) 2025  aurforge contributors\n",
    "License GPLv3+: GNU GPL version 3 or later <https://gnu.org/licenses/gpl.html>\n\n",
    "This is free software; you are free to change and redistribute it.\n",
    "There is NO WARRANTY, to the extent permitted by law."
);

/// The AUR RPC refuses shorter search terms
const MIN_QUERY_LEN: usize = 3;

/// Exit status after Ctrl-C, as a shell would report SIGINT
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(name = "aurforge")]
#[command(version = VERSION)]
#[command(long_version = LONG_VERSION)]
#[command(disable_version_flag = true)]
#[command(about = "Build AUR packages together with their AUR dependencies.")]
struct Cli {
    #[arg(short = 'C', long, help = "Don't use colors in output")]
    nocolor: bool,
    #[arg(short = 'V', long, help = "Don't check if packages were installed after build")]
    novalidation: bool,
    #[arg(short = 'i', long, help = "Show package info")]
    info: bool,
    #[arg(short = 's', long, help = "Search the AUR for matching strings")]
    search: bool,
    #[arg(short = 'u', long, help = "Upgrade installed AUR packages")]
    sysupgrade: bool,
    #[arg(short = 'S', long, help = "pacman-like output (category shown as 'aur')")]
    sync: bool,
    #[arg(short = 'd', long, help = "Don't check dependencies (may break makepkg)")]
    nodepcheck: bool,
    #[arg(short = 'w', long, help = "Don't install packages after building")]
    buildonly: bool,
    #[arg(long, help = "Bypass any confirmation prompts")]
    noconfirm: bool,
    #[arg(long = "version", help = "Print version")]
    show_version: bool,
    #[arg(value_name = "TARGETS")]
    targets: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if cli.show_version {
        println!("aurforge {}", LONG_VERSION);
        return ExitCode::SUCCESS;
    }

    let mut config = Config::load();
    if cli.nocolor {
        config.color = false;
    }
    if cli.novalidation {
        config.validate = false;
    }
    if cli.noconfirm {
        config.aur.noconfirm = true;
    }

    logging::init(&config.logging, config.color);
    let reporter = Reporter::new(config.color);

    match run(cli, config, reporter).await {
        Ok(code) => code,
        Err(e) => {
            reporter.error(format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: Config, reporter: Reporter) -> Result<ExitCode> {
    config.validate()?;

    if !cli.info && !cli.search && !cli.sysupgrade && cli.targets.is_empty() {
        use clap::CommandFactory;
        Cli::command().print_help()?;
        return Ok(ExitCode::SUCCESS);
    }

    let client: Rc<dyn MetadataService> = Rc::new(AurClient::new(&config.aur)?);

    if cli.search {
        // Installed markers are a nicety; search works without pacman's databases
        let database = AlpmManager::new(&config.database).ok();
        let db = database.as_ref().map(|d| d as &dyn PackageDatabase);
        return search(&*client, db, &cli.targets, cli.sync, reporter).await;
    }
    if cli.info {
        return show_info(&*client, &cli.targets, reporter).await;
    }

    let database: Rc<dyn PackageDatabase> = Rc::new(
        AlpmManager::new(&config.database).context("cannot open the pacman databases")?,
    );

    let mut targets = cli.targets.clone();
    if cli.sysupgrade {
        reporter.msg("Checking for AUR upgrades...");
        let upgrades = find_upgrades(&*database, &*client).await?;
        if upgrades.is_empty() {
            reporter.msg2("Nothing to do.");
        } else {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_header(vec!["Package", "Installed", "AUR"]);
            for upgrade in &upgrades {
                table.add_row(vec![&upgrade.name, &upgrade.installed, &upgrade.available]);
            }
            println!("{table}");
        }
        targets.extend(upgrades.into_iter().map(|u| u.name));
    }
    if targets.is_empty() {
        return Ok(ExitCode::SUCCESS);
    }

    let interrupt = Interrupt::new();
    interrupt.listen();

    let build_tool = Makepkg::locate(&config)?;
    let downloader = HttpDownloader::new(&config.aur, console::Term::stderr().is_term())?;
    let settings = OrchestratorSettings::from_config(&config, !cli.buildonly, !cli.nodepcheck);
    let mut orchestrator = Orchestrator::new(
        Rc::clone(&client),
        database,
        Box::new(downloader),
        Box::new(build_tool),
        settings,
        reporter,
        interrupt.clone(),
    );

    let mut failed = Vec::new();
    for target in &targets {
        let outcome = orchestrator.orchestrate(target, config.validate).await;
        if outcome.is_success() {
            continue;
        }
        if let BuildOutcome::Failure(AurforgeError::Interrupted) = outcome {
            reporter.error("Interrupted by user, aborting.");
            return Ok(ExitCode::from(EXIT_INTERRUPTED));
        }
        failed.push(target.as_str());
    }

    if !orchestrator.built().is_empty() {
        reporter.msg(format!("Built: {}", orchestrator.built().join(" ")));
    }
    if failed.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        reporter.error(format!("Failed to build: {}", failed.join(" ")));
        Ok(ExitCode::FAILURE)
    }
}

async fn search(
    client: &dyn MetadataService,
    database: Option<&dyn PackageDatabase>,
    terms: &[String],
    pacman_style: bool,
    reporter: Reporter,
) -> Result<ExitCode> {
    let query = terms.join(" ");
    if query.chars().count() < MIN_QUERY_LEN {
        return Err(anyhow!(
            "search query too short ({} characters minimum, AUR limitation)",
            MIN_QUERY_LEN
        ));
    }

    let mut results = client.search(&query).await?;
    results.sort_by(|a, b| a.name.cmp(&b.name));

    for record in &results {
        let installed = match database {
            Some(db) => db.installed_version(&record.name)?.is_some(),
            None => false,
        };
        println!("{}", search_line(record, installed, pacman_style, reporter));
        println!("    {}", record.description.as_deref().unwrap_or(""));
    }
    Ok(if results.is_empty() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// `category/name version (N votes) [installed] [out of date]`
fn search_line(
    record: &PackageRecord,
    installed: bool,
    pacman_style: bool,
    reporter: Reporter,
) -> String {
    let category = if pacman_style { "aur" } else { record.category() };
    let mut line = format!(
        "{}{} {} ({} votes)",
        reporter.paint(Style::new().magenta().bold(), format!("{}/", category)),
        reporter.paint(Style::new().bold(), &record.name),
        reporter.paint(Style::new().green().bold(), &record.version),
        record.num_votes
    );
    if installed {
        line.push_str(&format!(" {}", reporter.paint(Style::new().cyan().bold(), "[installed]")));
    }
    if record.is_out_of_date() {
        line.push_str(&format!(" {}", reporter.paint(Style::new().red().bold(), "[out of date]")));
    }
    line
}

async fn show_info(
    client: &dyn MetadataService,
    targets: &[String],
    reporter: Reporter,
) -> Result<ExitCode> {
    if targets.is_empty() {
        return Err(anyhow!("no package specified for info"));
    }

    let records = client.multiinfo(targets).await?;
    let mut missing = false;
    for target in targets {
        match records.iter().find(|r| &r.name == target) {
            Some(record) => {
                for (label, value) in info_lines(record) {
                    println!(
                        "{} : {}",
                        reporter.paint(Style::new().bold(), format!("{:<15}", label)),
                        value
                    );
                }
                println!();
            }
            None => {
                reporter.error(format!("Package '{}' not found.", target));
                missing = true;
            }
        }
    }
    Ok(if missing {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn info_lines(record: &PackageRecord) -> Vec<(&'static str, String)> {
    let timestamp = |t: Option<chrono::DateTime<chrono::Utc>>| {
        t.map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_else(|| "-".to_string())
    };
    let licenses = if record.license.is_empty() {
        "None".to_string()
    } else {
        record.license.join("  ")
    };

    vec![
        ("Repository", "aur".to_string()),
        ("Category", record.category().to_string()),
        ("Name", record.name.clone()),
        ("Version", record.version.clone()),
        ("URL", record.url.clone().unwrap_or_else(|| "None".to_string())),
        ("Licenses", licenses),
        ("Votes", record.num_votes.to_string()),
        (
            "Out of Date",
            if record.is_out_of_date() { "yes" } else { "no" }.to_string(),
        ),
        (
            "Maintainer",
            record
                .maintainer
                .clone()
                .unwrap_or_else(|| "orphan".to_string()),
        ),
        ("Last Updated", timestamp(record.last_modified_utc())),
        ("First Submitted", timestamp(record.first_submitted_utc())),
        (
            "Description",
            record.description.clone().unwrap_or_default(),
        ),
    ]
}
