use comfy_table::{ContentArrangement, Table};
use crate::model::{AnalysisResult, Cause, CrashEvent, Payload, ScanResponse, Solution, NOTHING_FOUND};
use crate::render::{method_line, short_message};
use crate::{paint, TextFormat};

pub fn render_text(p: &Payload, fmt: TextFormat, full_messages: bool) -> String {
    if let Some(msg) = p.error_message() { return format!("{}\n", paint(&format!("Error: {}", msg), "1;31")); }
    match p {
        Payload::Scan(s) => scan_text(s, fmt, full_messages),
        Payload::Single(r) => result_text(r),
        Payload::Many(items) => items.iter().map(result_text).collect::<Vec<_>>().join("\n"),
        _ => format!("{}\n", NOTHING_FOUND),
    }
}

fn scan_text(s: &ScanResponse, fmt: TextFormat, full_messages: bool) -> String {
    let mut out = String::new();
    if s.crashes.is_empty() {
        out.push_str(&format!("{}\n", paint("No BSOD Events Found", "1;32")));
        out.push_str(&format!("{}\n", s.message.as_deref().unwrap_or("No blue screen errors were found in your system's Event Viewer.")));
        if let Some(w) = s.warning.as_deref() { out.push_str(&format!("{}\n", paint(&format!("Warning: {}", w), "33"))); }
        return out;
    }
    out.push_str(&format!("{}\n", paint(&format!("Found {} BSOD Events", s.crashes.len()), "1;36")));
    if let Some(w) = s.warning.as_deref() { out.push_str(&format!("{}\n", paint(&format!("Warning: {}", w), "33"))); }
    match fmt {
        TextFormat::Table => out.push_str(&crash_table(&s.crashes)),
        TextFormat::Lines => {
            for (i, c) in s.crashes.iter().enumerate() { out.push_str(&crash_lines(i + 1, c, full_messages)); }
        }
    }
    out
}

fn crash_table(crashes: &[CrashEvent]) -> String {
    let mut t = Table::new();
    t.set_content_arrangement(ContentArrangement::Dynamic);
    t.set_header(vec!["Date", "Error", "Source", "Event ID", "Description"]);
    for c in crashes {
        t.add_row(vec![
            c.date.clone().unwrap_or_else(|| "Unknown".to_string()),
            c.error_code.clone().unwrap_or_else(|| "Unknown Error".to_string()),
            c.display_source().to_string(),
            c.event_id.clone().unwrap_or_else(|| "Unknown".to_string()),
            c.description.clone().unwrap_or_else(|| "No details available".to_string()),
        ]);
    }
    format!("{}\n", t)
}

fn crash_lines(n: usize, c: &CrashEvent, full_messages: bool) -> String {
    let mut s = format!("[{}] {}\n", n, paint(c.error_code.as_deref().unwrap_or("Unknown Error"), "1;31"));
    s.push_str(&format!("    Date: {}\n", c.date.as_deref().unwrap_or("Unknown")));
    s.push_str(&format!("    Source: {}\n", c.display_source()));
    s.push_str(&format!("    Event ID: {}\n", c.event_id.as_deref().unwrap_or("Unknown")));
    s.push_str(&format!("    Description: {}\n", c.description.as_deref().unwrap_or("No details available")));
    if let Some(f) = c.dump_file.as_deref() { s.push_str(&format!("    Dump File: {}\n", f)); }
    if !c.parameters.is_empty() { s.push_str(&format!("    Parameters: {}\n", c.parameters.join(", "))); }
    if let Some(m) = c.event_message.as_deref() {
        let shown = if full_messages { m.to_string() } else { short_message(m).unwrap_or_else(|| m.to_string()) };
        s.push_str(&format!("    Event Details: {}\n", shown.replace('\n', " ")));
    }
    if !c.common_causes.is_empty() {
        s.push_str("    Possible Causes:\n");
        for cause in &c.common_causes { s.push_str(&format!("      - {}\n", cause)); }
    }
    s
}

fn result_text(r: &AnalysisResult) -> String {
    let mut s = String::new();
    if let Some(t) = r.title_line() { s.push_str(&format!("{}\n", paint(&t, "1;36"))); }
    if let Some(d) = r.description.as_deref() { s.push_str(&format!("{}\n", d)); }
    if let Some(m) = method_line(r) { s.push_str(&format!("{}\n", m)); }
    if let Some(d) = r.disclaimer.as_deref() { s.push_str(&format!("Note: {}\n", d)); }
    let causes = r.effective_causes();
    if !causes.is_empty() {
        s.push_str("Possible Causes:\n");
        for c in causes {
            match c {
                Cause::Plain(t) => s.push_str(&format!("  - {}\n", t)),
                Cause::Titled { title, description } => s.push_str(&format!("  - {}: {}\n", title, description.as_deref().unwrap_or(""))),
                Cause::Other => {}
            }
        }
    }
    if !r.solutions.is_empty() {
        s.push_str("Suggested Solutions:\n");
        for sol in &r.solutions {
            match sol {
                Solution::Plain(t) => s.push_str(&format!("  - {}\n", t)),
                Solution::Titled { title, description, steps } => {
                    s.push_str(&format!("  - {}: {}\n", title, description.as_deref().unwrap_or("")));
                    for (i, step) in steps.iter().enumerate() { s.push_str(&format!("      {}. {}\n", i + 1, step)); }
                }
                Solution::Other => {}
            }
        }
    }
    if let Some(t) = r.technical_details.as_deref() {
        s.push_str("Technical Details:\n");
        for line in t.lines() { s.push_str(&format!("  {}\n", line)); }
    }
    s
}
