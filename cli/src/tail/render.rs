//! Terminal rendering of the live-tail view

use super::state::{Phase, TailState};
use chrono::{DateTime, Utc};
use colored::Colorize;
use lens_shared::types::page::FilterKind;
use lens_shared::types::record::DisplayRecord;

/// Backtrace lines shown before a record is expanded.
pub const BACKTRACE_PREVIEW: usize = 3;

pub fn render(state: &TailState, now: DateTime<Utc>) -> String {
    let mut lines = vec![header(state)];

    if let Some(error) = &state.error {
        lines.push(format!("{} {}", "✗".red(), error.red()));
    }
    if state.has_new_entries {
        lines.push(format!(
            "{} New entries available. Type {} to load them.",
            "●".green(),
            "new".bold()
        ));
    }

    if state.records.is_empty() {
        lines.push(match state.phase {
            Phase::LoadingInitial => "Loading…".dimmed().to_string(),
            _ => "No queries captured yet.".dimmed().to_string(),
        });
    }

    for record in &state.records {
        lines.extend(render_record(
            record,
            state.expanded.contains(&record.id),
            state.settings.time_display.format(record.created_at, now),
        ));
    }

    lines.push(footer(state));
    lines.join("\n")
}

fn header(state: &TailState) -> String {
    let filter = match state.filter {
        FilterKind::All => "all".normal(),
        FilterKind::Slow => "slow".yellow(),
        FilterKind::Failed => "failed".red(),
    };
    let search = if state.search.is_empty() {
        String::new()
    } else {
        format!("  search: \"{}\"", state.search)
    };
    format!(
        "{}  filter: {}{}  showing {} of {}  auto-load: {}",
        "Lens".bold().cyan(),
        filter,
        search,
        state.records.len(),
        state.total,
        if state.settings.auto_load { "on" } else { "off" }
    )
}

fn footer(state: &TailState) -> String {
    match state.phase {
        Phase::LoadingMore => "Loading more…".dimmed().to_string(),
        _ if state.has_more => format!("Type {} for older queries.", "more".bold()),
        _ if !state.records.is_empty() => "End of log.".dimmed().to_string(),
        _ => String::new(),
    }
}

fn render_record(record: &DisplayRecord, expanded: bool, when: String) -> Vec<String> {
    let millis = record.content.duration_seconds * 1000.0;
    let duration = format!("{:>9.2}ms", millis);
    let duration = if record.content.is_slow() {
        duration.yellow()
    } else {
        duration.normal()
    };
    let marker = if record.error { "✗".red() } else { " ".normal() };

    let mut lines = vec![format!(
        "{} {} {} {}  {}",
        marker,
        format!("#{:<6}", record.id).dimmed(),
        duration,
        when.dimmed(),
        record.display_sql
    )];

    if let Some(message) = &record.content.error_message {
        lines.push(format!("          {}", message.red()));
    }
    if let Some(request) = &record.content.request {
        lines.push(format!("          {}", request.dimmed()));
    }

    let (shown, hidden) = if expanded {
        (record.backtrace_display.as_slice(), 0)
    } else {
        record.backtrace_preview(BACKTRACE_PREVIEW)
    };
    for frame in shown {
        lines.push(format!("          at {}", frame));
    }
    if hidden > 0 {
        lines.push(format!(
            "          … {} more (expand {})",
            hidden, record.id
        ));
    }
    lines
}
