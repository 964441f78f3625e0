use std::fmt;
use chrono::{DateTime, Local};
use crate::model::{AnalysisResult, Cause, CrashEvent, Payload, ScanResponse, Solution, NOTHING_FOUND};

/// Event messages longer than this many characters collapse behind `[Show More]`.
pub const MESSAGE_CUTOFF: usize = 150;

const NO_EVENTS_DEFAULT: &str = "No blue screen errors were found in your system's Event Viewer.";

/// HTML that is safe to place into the page. Structure goes in through `raw`, values through `text`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Markup(String);

impl Markup {
    pub fn new() -> Self { Markup(String::new()) }

    pub fn raw(&mut self, s: &str) -> &mut Self { self.0.push_str(s); self }

    pub fn text(&mut self, s: &str) -> &mut Self { self.0.push_str(&html_escape(s)); self }

    pub fn append(&mut self, other: &Markup) -> &mut Self { self.0.push_str(&other.0); self }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Markup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

pub fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// First `MESSAGE_CUTOFF` characters plus an ellipsis, or None when the message is short enough.
pub fn short_message(msg: &str) -> Option<String> {
    if msg.chars().count() <= MESSAGE_CUTOFF { return None; }
    let mut s: String = msg.chars().take(MESSAGE_CUTOFF).collect();
    s.push_str("...");
    Some(s)
}

pub fn error_block(message: &str) -> Markup {
    let mut m = Markup::new();
    m.raw("<div class=\"error\">").text(message).raw("</div>");
    m
}

pub fn render_payload(p: &Payload) -> Markup {
    if let Some(msg) = p.error_message() { return error_block(&msg); }
    match p {
        Payload::Scan(s) => format_scan(s),
        Payload::Single(r) => format_result(r),
        Payload::Many(items) => {
            let mut m = Markup::new();
            for r in items { m.append(&format_result(r)); }
            m
        }
        _ => {
            let mut m = Markup::new();
            m.raw("<div>").text(NOTHING_FOUND).raw("</div>");
            m
        }
    }
}

fn warning_block(s: &ScanResponse) -> Markup {
    let mut m = Markup::new();
    if let Some(w) = s.warning.as_deref() {
        m.raw("<div class=\"warning-message\"><p><strong>Warning:</strong> ").text(w).raw("</p></div>");
    }
    m
}

pub fn analyzed_at(ts: f64) -> Option<String> {
    if !ts.is_finite() { return None; }
    let secs = ts.floor();
    let nanos = ((ts - secs) * 1e9) as u32;
    let secs = secs as i64;
    DateTime::from_timestamp(secs, nanos).map(|d| d.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
}

pub fn format_scan(s: &ScanResponse) -> Markup {
    let mut m = Markup::new();
    if s.crashes.is_empty() {
        m.raw("<div class=\"info-message\"><h3>No BSOD Events Found</h3><p>")
            .text(s.message.as_deref().unwrap_or(NO_EVENTS_DEFAULT))
            .raw("</p>")
            .append(&warning_block(s))
            .raw("<div class=\"scan-help\"><h4>Why might this happen?</h4><ul>")
            .raw("<li>Your system hasn't experienced any recent blue screens</li>")
            .raw("<li>Windows may have cleared the Event Viewer logs</li>")
            .raw("<li>The crash events might be stored in a different location</li>")
            .raw("</ul></div></div>");
        return m;
    }
    m.raw("<div class=\"scan-results\">")
        .raw(&format!("<h3>Found {} BSOD Events</h3>", s.crashes.len()));
    if let Some(at) = s.date_analyzed.and_then(analyzed_at) {
        m.raw("<p class=\"sub\">Analyzed ").text(&at).raw("</p>");
    }
    m.append(&warning_block(s)).raw("<div class=\"crash-history\">");
    for c in &s.crashes { m.append(&format_crash_event(c)); }
    m.raw("</div></div>");
    m
}

fn detail_line(m: &mut Markup, label: &str, value: &str) {
    m.raw("<p><strong>").text(label).raw(":</strong> ").text(value).raw("</p>");
}

pub fn format_crash_event(c: &CrashEvent) -> Markup {
    let mut m = Markup::new();
    m.raw("<div class=\"crash-item\"><h4>").text(c.error_code.as_deref().unwrap_or("Unknown Error")).raw("</h4><div class=\"crash-details\">");
    detail_line(&mut m, "Date", c.date.as_deref().unwrap_or("Unknown"));
    detail_line(&mut m, "Source", c.display_source());
    detail_line(&mut m, "Event ID", c.event_id.as_deref().unwrap_or("Unknown"));
    detail_line(&mut m, "Description", c.description.as_deref().unwrap_or("No details available"));
    if let Some(f) = c.dump_file.as_deref() { detail_line(&mut m, "Dump File", f); }
    if !c.parameters.is_empty() { detail_line(&mut m, "Parameters", &c.parameters.join(", ")); }
    if let Some(msg) = c.event_message.as_deref() {
        m.raw("<div class=\"event-message\"><p><strong>Event Details:</strong> ");
        match short_message(msg) {
            None => { m.raw("<span class=\"short-message\">").text(msg).raw("</span>"); }
            Some(short) => {
                m.raw("<span class=\"short-message\">").text(&short).raw("</span>")
                    .raw(" <span class=\"expand-message\" data-action=\"expand\">[Show More]</span>")
                    .raw("<span class=\"full-message\" style=\"display:none\">").text(msg)
                    .raw(" <span class=\"collapse-message\" data-action=\"collapse\">[Show Less]</span></span>");
            }
        }
        m.raw("</p></div>");
    }
    m.raw("</div>");
    if !c.common_causes.is_empty() {
        m.raw("<div class=\"crash-causes\"><h5>Possible Causes:</h5><ul>");
        for cause in &c.common_causes { m.raw("<li>").text(cause).raw("</li>"); }
        m.raw("</ul></div>");
    }
    m.raw("</div>");
    m
}

pub fn format_result(r: &AnalysisResult) -> Markup {
    let mut m = Markup::new();
    m.raw("<div class=\"result-card\">");
    if let Some(title) = r.title_line() { m.raw("<h3>").text(&title).raw("</h3>"); }
    if let Some(d) = r.description.as_deref() { m.raw("<p>").text(d).raw("</p>"); }
    if let Some(line) = method_line(r) { m.raw("<p class=\"sub\">").text(&line).raw("</p>"); }
    if let Some(d) = r.disclaimer.as_deref() { m.raw("<p class=\"disclaimer\"><em>").text(d).raw("</em></p>"); }
    let causes = r.effective_causes();
    if !causes.is_empty() {
        m.raw("<h4>Possible Causes:</h4><ul>");
        for c in causes {
            match c {
                Cause::Plain(s) => { m.raw("<li>").text(s).raw("</li>"); }
                Cause::Titled { title, description } => {
                    m.raw("<li><strong>").text(title).raw("</strong>: ").text(description.as_deref().unwrap_or("")).raw("</li>");
                }
                Cause::Other => {}
            }
        }
        m.raw("</ul>");
    }
    if !r.solutions.is_empty() {
        m.raw("<h4>Suggested Solutions:</h4><ul>");
        for s in &r.solutions {
            match s {
                Solution::Plain(t) => { m.raw("<li>").text(t).raw("</li>"); }
                Solution::Titled { title, description, steps } => {
                    m.raw("<li><strong>").text(title).raw("</strong>: ").text(description.as_deref().unwrap_or("")).raw("</li>");
                    if !steps.is_empty() {
                        m.raw("<ol style=\"margin-left: 20px\">");
                        for step in steps { m.raw("<li>").text(step).raw("</li>"); }
                        m.raw("</ol>");
                    }
                }
                Solution::Other => {}
            }
        }
        m.raw("</ul>");
    }
    if let Some(t) = r.technical_details.as_deref() {
        m.raw("<div class=\"technical-details\"><pre>").text(t).raw("</pre></div>");
    }
    m.raw("</div>");
    m
}

pub fn method_line(r: &AnalysisResult) -> Option<String> {
    let mut line = r.analysis_method.as_ref().map(|a| format!("Analysis method: {}", a));
    if r.valid_dump_format == Some(false) {
        let note = "Dump header could not be validated.";
        line = Some(match line { Some(l) => format!("{}. {}", l, note), None => note.to_string() });
    }
    line
}
