use std::io::{self, Write};

use serde::Serialize;

use crate::app::{ClearResult, InfoResult, ProgressEvent, ProgressSink, ReportResult};
use crate::sync::SyncOutcome;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Console,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_sync(result: &SyncOutcome) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_report(result: &ReportResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_info(result: &InfoResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_clear(result: &ClearResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const RESET: &str = "\x1b[0m";

/// Streams progress lines to stderr and prints human-readable summaries.
pub struct ConsoleOutput;

impl ConsoleOutput {
    pub fn print_sync(result: &SyncOutcome) {
        if result.up_to_date {
            println!("{GREEN}Catalog is current (build {}){RESET}", result.build);
        } else {
            let previous = result
                .previous_build
                .map(|build| build.to_string())
                .unwrap_or_else(|| "none".to_string());
            println!(
                "{CYAN}New GW2 build {} (cached: {previous}){RESET}",
                result.build
            );
            println!(
                "{GREEN}Fetched {} group(s), {} categor(y/ies), {} achievement(s){RESET}",
                result.fetched.groups, result.fetched.categories, result.fetched.achievements
            );
        }
        if let Some(err) = &result.persist_error {
            println!("{YELLOW}Cache not saved: {err}{RESET}");
        }
        println!(
            "Cached: {} groups, {} categories, {} achievements",
            result.counts.groups, result.counts.categories, result.counts.achievements
        );
    }

    pub fn print_report(result: &ReportResult) {
        Self::print_sync(&result.sync);
        println!(
            "{GREEN}Wrote {} sheet(s), {} row(s) for {} user(s) to {}{RESET}",
            result.sheets,
            result.rows,
            result.users.len(),
            result.output
        );
        for failure in &result.failures {
            println!("{YELLOW}User {}: {}{RESET}", failure.user, failure.message);
        }
    }

    pub fn print_info(result: &InfoResult) {
        match result.build {
            Some(build) if result.cached => println!(
                "Build {build}: {} groups, {} categories, {} achievements",
                result.counts.groups, result.counts.categories, result.counts.achievements
            ),
            _ => println!("{YELLOW}No cached catalog{RESET}"),
        }
    }

    pub fn print_clear(result: &ClearResult) {
        if result.cleared {
            println!("{GREEN}Cache cleared{RESET}");
        } else {
            println!("Nothing to clear");
        }
    }
}

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        let mut stderr = io::stderr();
        let _ = match event.elapsed {
            Some(elapsed) => writeln!(
                stderr,
                "{CYAN}>>{RESET} {} ({:.1}s)",
                event.message,
                elapsed.as_secs_f64()
            ),
            None => writeln!(stderr, "{CYAN}>>{RESET} {}", event.message),
        };
    }
}
