use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Cell, CellAlignment, ContentArrangement, Table};
use is_terminal::IsTerminal;
use owo_colors::OwoColorize;

use crate::cleanup::CleanupReport;
use crate::identity::PreviewKey;
use crate::orchestrator::services::ServiceOutcome;
use crate::orchestrator::{PreviewHandle, PreviewStatus, SessionPreview};

fn outcome_text(outcome: ServiceOutcome) -> &'static str {
    match outcome {
        ServiceOutcome::Created => "created",
        ServiceOutcome::Started => "started",
        ServiceOutcome::AlreadyRunning => "running",
    }
}

fn dot(state: &str, use_color: bool) -> String {
    if !use_color {
        return format!("\u{25cf} {}", state);
    }
    match state {
        "created" | "started" | "running" | "responding" => {
            format!("{} {}", "\u{25cf}".green(), state.green())
        }
        "starting" => format!("{} {}", "\u{25cf}".yellow(), state.yellow()),
        "stopped" => format!("{} {}", "\u{25cf}".red(), state.red()),
        other => format!("\u{25cf} {}", other),
    }
}

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(
        headers
            .iter()
            .map(|h| Cell::new(h).set_alignment(CellAlignment::Left))
            .collect::<Vec<_>>(),
    );
    table
}

fn print_indented(table: &Table) {
    // Indent the table by 2 spaces
    for line in table.to_string().lines() {
        println!("  {}", line);
    }
}

pub fn print_start_summary(key: &PreviewKey, handle: &PreviewHandle) {
    let use_color = std::io::stdout().is_terminal();

    println!();
    if use_color {
        println!("  {} {} ({})", "previewrig".bold(), key.cyan(), key.slug().dimmed());
    } else {
        println!("  previewrig {} ({})", key, key.slug());
    }
    println!();

    let mut table = new_table(&["Service", "Container", "State"]);
    for (name, outcome) in &handle.services {
        table.add_row(vec![
            Cell::new(name),
            Cell::new(key.container_name(name)),
            Cell::new(dot(outcome_text(*outcome), use_color)),
        ]);
    }
    print_indented(&table);

    println!();
    if use_color {
        println!("  Preview: {}", handle.url.bold());
    } else {
        println!("  Preview: {}", handle.url);
    }
    println!();
}

pub fn print_status(key: &PreviewKey, status: &PreviewStatus) {
    let use_color = std::io::stdout().is_terminal();
    let state = match (status.running, status.is_responding) {
        (false, _) => "stopped",
        (true, false) => "starting",
        (true, true) => "responding",
    };
    println!("  {}  {}", key, dot(state, use_color));
    println!("  URL: {}", status.url.as_deref().unwrap_or("-"));
}

pub fn print_project_urls(project: &str, previews: &[SessionPreview]) {
    let use_color = std::io::stdout().is_terminal();
    if previews.is_empty() {
        println!("No previews found for project {}.", project);
        return;
    }

    let mut table = new_table(&["Session", "URL", "State", "Last activity"]);
    for preview in previews {
        let state = if preview.running { "running" } else { "stopped" };
        let last = preview
            .last_activity
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            Cell::new(&preview.session_id),
            Cell::new(preview.url.as_deref().unwrap_or("-")),
            Cell::new(dot(state, use_color)),
            Cell::new(last),
        ]);
    }
    print_indented(&table);
}

pub fn print_cleanup_report(report: &CleanupReport) {
    println!(
        "  cleaned {}, skipped {}, already stopped {}, failed {}",
        report.cleaned, report.skipped, report.already_stopped, report.failed
    );
}
