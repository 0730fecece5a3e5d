//! Interactive console: pick a room from the live dropdowns, scrape it, or
//! print whatever is cached.

use std::io::{self, Write};
use std::process::ExitCode;
use std::time::Instant;

use anyhow::Context;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing::{error, warn};
use yansi::Paint;

use crate::cache::QueryResult;
use crate::portal::{OptionEntry, Selection, SelectionKind};
use crate::query::QueryService;
use crate::utils::fmt_duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MenuChoice {
    Scrape,
    ShowCache,
    Quit,
}

impl MenuChoice {
    fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "1" => Some(Self::Scrape),
            "2" => Some(Self::ShowCache),
            "3" | "q" | "quit" | "exit" => Some(Self::Quit),
            _ => None,
        }
    }
}

/// Run the menu on stdin/stdout until the user quits or input ends.
pub async fn run(queries: &QueryService) -> ExitCode {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut console = Console::new(stdin, io::stdout());
    match console.menu(queries).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = ?e, "console failed");
            ExitCode::FAILURE
        }
    }
}

struct Console<R, W> {
    lines: Lines<R>,
    out: W,
}

impl<R, W> Console<R, W>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    fn new(input: R, out: W) -> Self {
        Self {
            lines: input.lines(),
            out,
        }
    }

    /// Print `label` and read one line. `None` once input is exhausted.
    async fn prompt(&mut self, label: &str) -> io::Result<Option<String>> {
        write!(self.out, "{} ", label.bold())?;
        self.out.flush()?;
        let line = self.lines.next_line().await?;
        if line.is_none() {
            writeln!(self.out)?;
        }
        Ok(line)
    }

    async fn menu(&mut self, queries: &QueryService) -> anyhow::Result<()> {
        loop {
            writeln!(self.out)?;
            writeln!(self.out, "{}", "Electricity usage".cyan().bold())?;
            writeln!(self.out, "  1. Pick a room and scrape it")?;
            writeln!(self.out, "  2. Show cached data")?;
            writeln!(self.out, "  3. Quit")?;

            let Some(line) = self.prompt("Choose [1-3]:").await? else {
                return Ok(());
            };

            match MenuChoice::parse(&line) {
                Some(MenuChoice::Scrape) => {
                    if let Err(e) = self.scrape(queries).await {
                        warn!(error = ?e, "interactive scrape failed");
                        writeln!(self.out, "{} {e:#}", "Scrape failed:".red().bold())?;
                    }
                }
                Some(MenuChoice::ShowCache) => match queries.cache().read().await {
                    Some(result) => render_result(&mut self.out, &result)?,
                    None => writeln!(self.out, "{}", "Nothing cached yet.".yellow())?,
                },
                Some(MenuChoice::Quit) => return Ok(()),
                None => writeln!(self.out, "{}", "Please enter 1, 2 or 3.".red())?,
            }
        }
    }

    /// Let the user choose one of `options` by number or exact label.
    async fn pick<'a>(
        &mut self,
        kind: SelectionKind,
        options: &'a [OptionEntry],
    ) -> io::Result<Option<&'a OptionEntry>> {
        if options.is_empty() {
            writeln!(self.out, "{}", format!("No {kind} options available.").yellow())?;
            return Ok(None);
        }

        writeln!(self.out)?;
        for (i, option) in options.iter().enumerate() {
            writeln!(self.out, "  {:>3}. {}", (i + 1).dim(), option.text)?;
        }

        let label = format!("Select {kind} [1-{}]:", options.len());
        loop {
            let Some(line) = self.prompt(&label).await? else {
                return Ok(None);
            };
            if let Some(option) = match_choice(options, &line) {
                return Ok(Some(option));
            }
            writeln!(self.out, "{}", "No such option, try again.".red())?;
        }
    }

    async fn scrape(&mut self, queries: &QueryService) -> anyhow::Result<()> {
        let session = queries.portal().open_session()?;

        let entry = session
            .open_entry()
            .await
            .context("Failed to load building list")?;
        let Some(building) = self.pick(SelectionKind::Building, &entry.buildings).await? else {
            return Ok(());
        };

        let floors = session
            .select_building(&entry, &building.value)
            .await
            .context("Failed to load floor list")?;
        let Some(floor) = self.pick(SelectionKind::Floor, &floors.floors).await? else {
            return Ok(());
        };

        let rooms = session
            .select_floor(&floors, &floor.value)
            .await
            .context("Failed to load room list")?;
        let Some(room) = self.pick(SelectionKind::Room, &rooms.rooms).await? else {
            return Ok(());
        };

        let selection = Selection::new(&building.text, &floor.text, &room.text);
        writeln!(self.out, "Scraping {}...", selection.bold())?;

        let start = Instant::now();
        let result = queries
            .scrape_picked(&session, selection, &rooms, &room.value)
            .await?;

        writeln!(
            self.out,
            "{} {} records in {}",
            "Done:".green().bold(),
            result.records.len(),
            fmt_duration(start.elapsed())
        )?;
        render_result(&mut self.out, &result)?;
        Ok(())
    }
}

/// Match by 1-based index or by exact label.
fn match_choice<'a>(options: &'a [OptionEntry], input: &str) -> Option<&'a OptionEntry> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if let Ok(n) = input.parse::<usize>() {
        return n.checked_sub(1).and_then(|i| options.get(i));
    }
    options.iter().find(|o| o.text == input)
}

/// Print a cached or fresh result as a header plus a record table.
fn render_result<W: Write>(out: &mut W, result: &QueryResult) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "{} {}", "Room:".bold(), result.selection)?;
    writeln!(out, "{} {}", "Scraped at:".bold(), result.scrape_time_str())?;
    writeln!(
        out,
        "{} {}",
        "Remaining balance:".bold(),
        result.remaining_balance.as_deref().unwrap_or("unknown")
    )?;

    if result.records.is_empty() {
        writeln!(out, "{}", "No usage records in range.".yellow())?;
        return Ok(());
    }

    writeln!(
        out,
        "{}",
        format!("{:<12} {:<16} {:>10} {:>10}", "Date", "Meter", "Usage", "Price").underline()
    )?;
    for record in &result.records {
        writeln!(
            out,
            "{:<12} {:<16} {:>10} {:>10}",
            record.date, record.meter_name, record.usage, record.price
        )?;
    }
    writeln!(out, "{} records", result.records.len())?;
    Ok(())
}
