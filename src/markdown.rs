use chrono::Local;
use crate::model::{AnalysisResult, Cause, Payload, Solution, NOTHING_FOUND};
use crate::render::{analyzed_at, method_line};

pub fn render_markdown(p: &Payload, request: &str) -> String {
    let mut s = String::new();
    s.push_str("# BSOD Analysis\n\n");
    s.push_str(&format!("Request: {}\n\n", request));
    s.push_str(&format!("Generated: {}\n\n", Local::now().format("%Y-%m-%d %H:%M")));
    if let Some(msg) = p.error_message() {
        s.push_str(&format!("> **Error:** {}\n", msg));
        return s;
    }
    match p {
        Payload::Scan(scan) => {
            if let Some(at) = scan.date_analyzed.and_then(analyzed_at) { s.push_str(&format!("Analyzed: {}\n\n", at)); }
            if let Some(w) = scan.warning.as_deref() { s.push_str(&format!("> **Warning:** {}\n\n", w)); }
            if scan.crashes.is_empty() {
                s.push_str("## No BSOD Events Found\n\n");
                s.push_str(&format!("{}\n", scan.message.as_deref().unwrap_or("No blue screen errors were found in your system's Event Viewer.")));
                return s;
            }
            s.push_str(&format!("## Found {} BSOD Events\n\n", scan.crashes.len()));
            for c in &scan.crashes {
                s.push_str(&format!("### {}\n", c.error_code.as_deref().unwrap_or("Unknown Error")));
                s.push_str(&format!("- Date: {}\n", c.date.as_deref().unwrap_or("Unknown")));
                s.push_str(&format!("- Source: {}\n", c.display_source()));
                s.push_str(&format!("- Event ID: {}\n", c.event_id.as_deref().unwrap_or("Unknown")));
                s.push_str(&format!("- Description: {}\n", c.description.as_deref().unwrap_or("No details available")));
                if let Some(f) = c.dump_file.as_deref() { s.push_str(&format!("- Dump File: `{}`\n", f)); }
                if !c.parameters.is_empty() { s.push_str(&format!("- Parameters: {}\n", c.parameters.join(", "))); }
                if let Some(m) = c.event_message.as_deref() { s.push_str(&format!("- Event Details: {}\n", m.replace('\n', " "))); }
                if !c.common_causes.is_empty() {
                    s.push_str("- Possible Causes:\n");
                    for cause in &c.common_causes { s.push_str(&format!("  - {}\n", cause)); }
                }
                s.push('\n');
            }
        }
        Payload::Single(r) => s.push_str(&result_markdown(r)),
        Payload::Many(items) => { for r in items { s.push_str(&result_markdown(r)); } }
        _ => s.push_str(&format!("{}\n", NOTHING_FOUND)),
    }
    s
}

fn result_markdown(r: &AnalysisResult) -> String {
    let mut s = String::new();
    if let Some(t) = r.title_line() { s.push_str(&format!("## {}\n\n", t)); }
    if let Some(d) = r.description.as_deref() { s.push_str(&format!("{}\n\n", d)); }
    if let Some(m) = method_line(r) { s.push_str(&format!("_{}_\n\n", m)); }
    if let Some(d) = r.disclaimer.as_deref() { s.push_str(&format!("> {}\n\n", d)); }
    let causes = r.effective_causes();
    if !causes.is_empty() {
        s.push_str("### Possible Causes\n");
        for c in causes {
            match c {
                Cause::Plain(t) => s.push_str(&format!("- {}\n", t)),
                Cause::Titled { title, description } => s.push_str(&format!("- **{}**: {}\n", title, description.as_deref().unwrap_or(""))),
                Cause::Other => {}
            }
        }
        s.push('\n');
    }
    if !r.solutions.is_empty() {
        s.push_str("### Suggested Solutions\n");
        for sol in &r.solutions {
            match sol {
                Solution::Plain(t) => s.push_str(&format!("- [ ] {}\n", t)),
                Solution::Titled { title, description, steps } => {
                    s.push_str(&format!("- [ ] **{}**: {}\n", title, description.as_deref().unwrap_or("")));
                    for (i, step) in steps.iter().enumerate() { s.push_str(&format!("  {}. {}\n", i + 1, step)); }
                }
                Solution::Other => {}
            }
        }
        s.push('\n');
    }
    if let Some(t) = r.technical_details.as_deref() { s.push_str(&format!("### Technical Details\n```\n{}\n```\n\n", t)); }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::classify;
    use serde_json::json;

    #[test]
    fn markdown_for_code_lookup() {
        let p = classify(&json!({"code": "0x7B", "name": "INACCESSIBLE_BOOT_DEVICE", "commonCauses": [{"title": "Storage", "description": "Controller changed"}], "solutions": ["Reset BIOS"]}));
        let md = render_markdown(&p, "code 0x7B");
        assert!(md.contains("## 0x7B - INACCESSIBLE_BOOT_DEVICE"));
        assert!(md.contains("- **Storage**: Controller changed"));
        assert!(md.contains("- [ ] Reset BIOS"));
    }

    #[test]
    fn markdown_for_empty_scan_and_error() {
        let md = render_markdown(&classify(&json!({"crashes": [], "warning": "limited"})), "scan");
        assert!(md.contains("## No BSOD Events Found"));
        assert!(md.contains("> **Warning:** limited"));
        let md = render_markdown(&classify(&json!({"success": false, "error": "denied"})), "scan");
        assert!(md.contains("> **Error:** denied"));
    }
}
