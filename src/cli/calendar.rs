use std::io::IsTerminal;

use ansi_term::{Colour, Style};
use anyhow::{anyhow, bail, Result};
use chrono::{Days, Local, NaiveDate};
use clap::Parser;

use crate::{
    daemon::storage::{entities::HabitEntity, habit_storage::HabitStorage},
    tracker::{HabitTracker, MonthLogs},
    utils::{
        percentage::completion_rate,
        time::{add_months, date_to_iso, days_in_month, first_day_of_month, month_start_end},
    },
};

const WEEKDAYS: [&str; 7] = ["Su", "Mo", "Tu", "We", "Th", "Fr", "Sa"];
const CELL_WIDTH: usize = 4;
/// A thousand years either way.
const MAX_OFFSET: i64 = 12_000;

#[derive(Debug, Parser)]
pub struct CalendarCommand {
    #[arg(long, help = "Habit id or name. All habits are shown by default")]
    habit: Option<String>,
    #[arg(
        long,
        value_parser = parse_month,
        conflicts_with = "offset",
        help = "Month to show, for example 2024-03"
    )]
    month: Option<NaiveDate>,
    #[arg(
        long,
        allow_negative_numbers = true,
        value_parser = clap::value_parser!(i32).range(-MAX_OFFSET..=MAX_OFFSET),
        help = "Month relative to the current one. -1 is the previous month"
    )]
    offset: Option<i32>,
}

fn parse_month(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(&format!("{}-01", value.trim()), "%Y-%m-%d")
        .map_err(|e| format!("Expected YYYY-MM: {e}"))
}

/// Cells of a month grid starting on Sunday. Days before the first of the month and after the
/// last one are `None`, and the total is always a multiple of seven.
pub fn month_grid_cells(month: NaiveDate) -> Vec<Option<NaiveDate>> {
    let (start, _) = month_start_end(month);
    let leading = first_day_of_month(month) as usize;
    let mut cells = vec![None; leading];
    cells.extend(
        (0..u64::from(days_in_month(month))).map(|day| start.checked_add_days(Days::new(day))),
    );
    while cells.len() % 7 != 0 {
        cells.push(None);
    }
    cells
}

pub fn render_month_header(month: NaiveDate) -> String {
    let (start, end) = month_start_end(month);
    format!(
        "{}\nShowing logs from {} to {}",
        start.format("%B %Y"),
        date_to_iso(start),
        date_to_iso(end)
    )
}

/// Renders one habit's month. Done days carry a check mark. `since` is the first day the habit
/// existed; scheduled days before it or after `today` are not counted in the summary.
pub fn render_month(
    habit: &HabitEntity,
    logs: &MonthLogs,
    today: NaiveDate,
    since: NaiveDate,
    colored: bool,
) -> String {
    let mut lines = vec![format!("{} ({})", habit.name, habit.schedule)];

    lines.push(
        WEEKDAYS
            .iter()
            .map(|d| format!("{d:>width$}", width = CELL_WIDTH - 1))
            .collect::<Vec<_>>()
            .join(" "),
    );

    for week in month_grid_cells(logs.start).chunks(7) {
        let line = week
            .iter()
            .map(|cell| render_cell(*cell, logs, today, colored))
            .collect::<String>();
        lines.push(line.trim_end().to_string());
    }

    let counted = logs
        .start
        .iter_days()
        .take_while(|d| *d <= logs.end && *d <= today)
        .filter(|d| *d >= since && habit.schedule.is_due_on(*d))
        .collect::<Vec<_>>();
    let done = counted.iter().filter(|d| logs.is_done(**d)).count();
    lines.push(match completion_rate(done, counted.len()) {
        Some(rate) => format!("Done {done} of {} scheduled days ({rate})", counted.len()),
        None => "Nothing scheduled yet".to_string(),
    });
    lines.join("\n")
}

fn render_cell(
    cell: Option<NaiveDate>,
    logs: &MonthLogs,
    today: NaiveDate,
    colored: bool,
) -> String {
    let Some(date) = cell else {
        return " ".repeat(CELL_WIDTH);
    };
    let done = logs.is_done(date);
    let text = format!(
        "{:>width$}{}",
        date.format("%-d").to_string(),
        if done { "✓" } else { " " },
        width = CELL_WIDTH - 1
    );
    if !colored {
        return text;
    }
    let style = match (done, date == today) {
        (true, true) => Colour::Green.bold().underline(),
        (true, false) => Colour::Green.normal(),
        (false, true) => Style::new().underline(),
        (false, false) => Style::new(),
    };
    style.paint(text).to_string()
}

/// Picks the month to show: an explicit month wins, then an offset from today's month.
fn resolve_month(
    today: NaiveDate,
    month: Option<NaiveDate>,
    offset: Option<i32>,
) -> Result<NaiveDate> {
    match (month, offset) {
        (Some(month), _) => Ok(month),
        (None, offset) => {
            let offset = offset.unwrap_or(0);
            add_months(today, offset)
                .ok_or_else(|| anyhow!("Can't show a calendar {offset} months away from {today}"))
        }
    }
}

/// Command to process `calendar` command. Prints the month grid of every selected habit.
pub async fn process_calendar_command<S: HabitStorage>(
    tracker: &HabitTracker<S>,
    CalendarCommand {
        habit,
        month,
        offset,
    }: CalendarCommand,
) -> Result<()> {
    let today = tracker.today();
    let month = resolve_month(today, month, offset)?;

    let habits = match habit {
        Some(query) => match tracker.find_habit(&query).await? {
            Some(habit) => vec![habit],
            None => bail!("No habit matches {query:?}"),
        },
        None => tracker.habits().await?,
    };

    println!("{}", render_month_header(month));
    if habits.is_empty() {
        println!("No habits yet. Add one with `habitrack add <name>`");
        return Ok(());
    }

    let colored = std::io::stdout().is_terminal();
    for habit in habits {
        let logs = tracker.habit_logs_for_month(&habit.id, month).await?;
        let since = habit.created_at.with_timezone(&Local).date_naive();
        println!();
        println!("{}", render_month(&habit, &logs, today, since, colored));
    }
    Ok(())
}
