use crate::render::html_escape;
use crate::ui::{Console, Tab};
use crate::Theme;

const SCRIPT: &str = r#"document.addEventListener('DOMContentLoaded',()=>{
const tabs=document.querySelectorAll('.tab');
tabs.forEach(tab=>tab.addEventListener('click',()=>{tabs.forEach(t=>t.classList.remove('active'));tab.classList.add('active');document.querySelectorAll('.tab-content').forEach(c=>c.classList.remove('active'));const p=document.getElementById(tab.dataset.tab+'-tab');if(p)p.classList.add('active');}));
document.addEventListener('click',e=>{const a=e.target.dataset&&e.target.dataset.action;if(!a)return;const box=e.target.closest('.event-message');if(!box)return;
const s=box.querySelector('.short-message'),f=box.querySelector('.full-message'),x=box.querySelector('.expand-message');
if(a==='expand'){s.style.display='none';f.style.display='inline';x.style.display='none';}
if(a==='collapse'){f.style.display='none';s.style.display='inline';x.style.display='inline';}});
});"#;

fn tab_label(key: &str) -> String {
    match key {
        "dump" => "Upload Dump File".to_string(),
        "code" => "Enter Error Code".to_string(),
        "scan" => "Scan System".to_string(),
        other => other.to_string(),
    }
}

fn styles(theme: Theme) -> &'static str {
    match theme {
        Theme::Dark => ":root{--bg:#0a0e13;--fg:#ffffff;--muted:#c0c4cc;--card:#0d131a;--border:#243041;--accent:#3b82f6;--warn:#f59e0b;--err:#ef4444}",
        Theme::Light => ":root{--bg:#f7f9fc;--fg:#0b1220;--muted:#4b5563;--card:#ffffff;--border:#d1d5db;--accent:#0078d7;--warn:#b45309;--err:#b91c1c}",
    }
}

const BASE_CSS: &str = "body{margin:0;background:var(--bg);color:var(--fg);font-family:Segoe UI,system-ui,-apple-system,Arial,sans-serif} .container{max-width:960px;margin:0 auto;padding:24px} .title{font-size:22px;font-weight:600} .sub{color:var(--muted);font-size:13px} .tabs{display:flex;gap:8px;margin:16px 0} .tab{padding:8px 14px;border:1px solid var(--border);border-radius:8px;cursor:pointer;color:var(--muted)} .tab.active{color:var(--fg);border-color:var(--accent)} .tab-content{display:none;background:var(--card);border:1px solid var(--border);border-radius:10px;padding:16px} .tab-content.active{display:block} code{font-family:Consolas,monospace} .error{color:var(--err);border:1px solid var(--err);border-radius:8px;padding:12px} .warning-message{color:var(--warn)} .result-card,.crash-item,.info-message{background:var(--card);border:1px solid var(--border);border-radius:10px;padding:14px;margin-top:12px} .technical-details pre{white-space:pre-wrap;background:var(--bg);padding:10px;border-radius:6px} .expand-message,.collapse-message{color:var(--accent);cursor:pointer} .disclaimer{color:var(--muted)} #loading{margin-top:12px;color:var(--muted)}";

/// The whole analyzer page with the console's current state baked in.
pub fn render_page(console: &Console, theme: Theme) -> String {
    let st = console.state();
    let layout = console.layout();
    let mut s = String::new();
    s.push_str("<!doctype html><html lang=\"en\"><head><meta charset=\"utf-8\"><meta name=\"viewport\" content=\"width=device-width, initial-scale=1\"><title>BSOD Error Analyzer</title><style>");
    s.push_str(styles(theme));
    s.push(' ');
    s.push_str(BASE_CSS);
    s.push_str("</style></head><body><div class=\"container\">");
    s.push_str(&format!("<div class=\"title\">BSOD Error Analyzer</div><div class=\"sub\">Generated {}</div>", chrono::Local::now().format("%Y-%m-%d %H:%M")));
    s.push_str("<div class=\"tabs\">");
    for tab in &st.tabs {
        s.push_str(&format!("<div class=\"tab{}\" data-tab=\"{}\">{}</div>", if tab.active { " active" } else { "" }, html_escape(&tab.key), html_escape(&tab_label(&tab.key))));
    }
    s.push_str("</div>");
    for tab in &st.tabs { s.push_str(&panel(console, tab)); }
    let section_display = if st.results_visible { "block" } else { "none" };
    if layout.result_section {
        s.push_str(&format!("<div id=\"result-section\" style=\"display:{}\"><h2>Analysis Results</h2>", section_display));
        if layout.loading {
            s.push_str(&format!("<div id=\"loading\" style=\"display:{}\">Analyzing...</div>", if st.loading_visible { "block" } else { "none" }));
        }
        if layout.results_content {
            s.push_str("<div id=\"results-content\">");
            s.push_str(st.content.as_str());
            s.push_str("</div>");
        }
        s.push_str("</div>");
    }
    s.push_str("</div><script>");
    s.push_str(SCRIPT);
    s.push_str("</script></body></html>");
    s
}

/// Read-only summary of what was submitted from each panel.
fn panel(console: &Console, tab: &Tab) -> String {
    let st = console.state();
    let layout = console.layout();
    let id = tab.panel_id();
    let active = st.active_panel.as_deref() == Some(id.as_str());
    let mut s = format!("<div id=\"{}\" class=\"tab-content{}\">", html_escape(&id), if active { " active" } else { "" });
    match tab.key.as_str() {
        "dump" if layout.file_label => {
            let label = if st.file_label.is_empty() { "No dump file selected." } else { st.file_label.as_str() };
            s.push_str(&format!("<p id=\"file-name\">{}</p>", html_escape(label)));
        }
        "code" if layout.code_form => {
            if st.code_text.trim().is_empty() {
                s.push_str("<p>No error code entered.</p>");
            } else {
                s.push_str(&format!("<p>Error code: <code id=\"error-code\">{}</code></p>", html_escape(st.code_text.trim())));
            }
        }
        "scan" if layout.scan_button => {
            s.push_str("<p>Searches the Windows Event Viewer for recorded blue screen events.</p>");
        }
        _ => {}
    }
    s.push_str("</div>");
    s
}
