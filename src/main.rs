use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use anyhow::Context;
use clap::{ArgAction, ColorChoice, CommandFactory, Parser, ValueEnum};
use clap_complete::Shell;
use is_terminal::IsTerminal;
use serde::{Deserialize, Serialize};
mod client;
mod markdown;
mod model;
mod page;
mod render;
mod text;
mod ui;

use crate::client::HttpTransport;
use crate::model::CrashEvent;
use crate::ui::{Console, DragKind, Effect, FileRef, Layout, LoadingObserver, UiEvent};

static ENABLE_COLOR: OnceLock<bool> = OnceLock::new();

const DEFAULT_SERVER: &str = "http://127.0.0.1:5000";
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_CONFIG: &str = "BsodView.toml";

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum OutputFmt { Text, Json, Html }

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum TextFormat { Lines, Table }

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Theme { Dark, Light }

#[derive(Clone, Copy, Debug, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum LogLevel { Error, Warn, Info, Debug, Trace }

#[derive(Clone, Copy, Debug, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum LogFormat { Text, Json }

#[derive(Parser, Debug)]
#[command(
    name = "BsodView",
    about = "Blue screen (BSOD) analysis console",
    long_about = "Blue screen (BSOD) analysis console that sends dump files, error codes or Event Viewer scan requests to a BSOD analyzer server and renders the findings as text, JSON, Markdown or an HTML page.",
    after_long_help = "Examples:\n  BsodView --code 0x0000007B\n  BsodView --dump C:\\Windows\\Minidump\\041524-10968-01.dmp --output html\n  BsodView --scan --text-format table --csv-path crashes.csv\n  BsodView --server http://analyzer.local:5000 --scan --output json",
    color = ColorChoice::Auto
)]
struct Args {
    /// Dump file to upload for analysis; without a path, asks for one on the terminal
    #[arg(long, short = 'd', value_name = "PATH", num_args = 0..=1, conflicts_with_all = ["code", "scan"])]
    dump: Option<Option<String>>,
    /// BSOD error code or message to look up
    #[arg(long, short = 'c', conflicts_with_all = ["dump", "scan"])]
    code: Option<String>,
    /// Ask the server to scan the Event Viewer for BSOD events
    #[arg(long, default_value_t = false, conflicts_with_all = ["dump", "code"])]
    scan: bool,
    #[arg(long, default_value = DEFAULT_SERVER)]
    server: String,
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,
    #[arg(long, short = 'o', value_enum, default_value = "text")]
    output: OutputFmt,
    #[arg(long, value_enum, default_value = "lines")]
    text_format: TextFormat,
    #[arg(long, value_enum, default_value = "dark")]
    theme: Theme,
    #[arg(long)]
    html: Option<String>,
    #[arg(long)]
    md_path: Option<String>,
    #[arg(long, short = 'j')]
    json_path: Option<String>,
    /// Write the scanned crash list as CSV
    #[arg(long)]
    csv_path: Option<String>,
    /// Print event messages without the 150 character cutoff
    #[arg(long, default_value_t = false)]
    no_truncate: bool,
    #[arg(long, default_value_t = false)]
    no_open: bool,
    #[arg(long, default_value_t = false)]
    progress: bool,
    #[arg(long, short = 'C', default_value_t = false)]
    no_color: bool,
    #[arg(long, default_value_t = false)]
    force_color: bool,
    #[arg(short = 'q', long, default_value_t = false)]
    quiet: bool,
    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,
    #[arg(long)]
    log_level: Option<LogLevel>,
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
    #[arg(long)]
    log_path: Option<String>,
    #[arg(long)]
    config: Option<String>,
    #[arg(long, value_enum)]
    completions: Option<Shell>,
    #[arg(long)]
    completions_out: Option<String>,
    /// Exit with status 1 when the results show an error
    #[arg(long, default_value_t = false)]
    fail_on_error: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            dump: None,
            code: None,
            scan: false,
            server: DEFAULT_SERVER.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            output: OutputFmt::Text,
            text_format: TextFormat::Lines,
            theme: Theme::Dark,
            html: None,
            md_path: None,
            json_path: None,
            csv_path: None,
            no_truncate: false,
            no_open: false,
            progress: false,
            no_color: false,
            force_color: false,
            quiet: false,
            verbose: 0,
            log_level: None,
            log_format: None,
            log_path: None,
            config: None,
            completions: None,
            completions_out: None,
            fail_on_error: false,
        }
    }
}

#[derive(Deserialize, Default, Debug)]
struct AppConfig {
    server: Option<String>,
    timeout_secs: Option<u64>,
    output: Option<OutputFmt>,
    text_format: Option<TextFormat>,
    theme: Option<Theme>,
    html: Option<String>,
    md_path: Option<String>,
    json_path: Option<String>,
    csv_path: Option<String>,
    no_truncate: Option<bool>,
    no_open: Option<bool>,
    progress: Option<bool>,
    log_level: Option<LogLevel>,
    log_format: Option<LogFormat>,
    log_path: Option<String>,
    fail_on_error: Option<bool>,
}

/// Shows an indeterminate spinner while a request is in flight.
struct SpinnerObserver { pb: indicatif::ProgressBar }

impl LoadingObserver for SpinnerObserver {
    fn loading_changed(&self, visible: bool) {
        if visible {
            self.pb.set_message("Analyzing...");
            self.pb.enable_steady_tick(Duration::from_millis(120));
        } else {
            self.pb.finish_and_clear();
        }
    }
}

fn main() {
    let mut args = Args::parse();
    if let Some(sh) = args.completions {
        let mut cmd = Args::command();
        if let Some(path) = args.completions_out.as_ref() {
            if let Ok(mut f) = std::fs::File::create(path) { clap_complete::generate(sh, &mut cmd, "BsodView", &mut f); } else { clap_complete::generate(sh, &mut cmd, "BsodView", &mut std::io::stdout()); }
        } else {
            clap_complete::generate(sh, &mut cmd, "BsodView", &mut std::io::stdout());
        }
        return;
    }
    if let Some(cfg) = load_config(&args) { apply_config(&mut args, cfg); }
    init_logging(&args);
    let term = std::env::var("TERM").unwrap_or_default();
    let no_color_env = std::env::var_os("NO_COLOR").is_some();
    let color_default = std::io::stdout().is_terminal() && !no_color_env && term != "dumb";
    let enable_color = if args.force_color { true } else { color_default && !args.no_color };
    let _ = ENABLE_COLOR.set(enable_color);
    match run(&args) {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            log::error!("{:#}", e);
            eprintln!("{}", paint(&format!("error: {:#}", e), "1;31"));
            std::process::exit(1);
        }
    }
}

fn config_path(args: &Args) -> PathBuf {
    args.config.as_ref().map(PathBuf::from)
        .or_else(|| std::env::var_os("BSODVIEW_CONFIG").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG))
}

fn load_config(args: &Args) -> Option<AppConfig> {
    let p = config_path(args);
    let s = match std::fs::read_to_string(&p) {
        Ok(s) => s,
        Err(e) => {
            if args.config.is_some() { eprintln!("Failed to read config {}: {}", p.to_string_lossy(), e); }
            return None;
        }
    };
    match toml::from_str::<AppConfig>(&s) {
        Ok(cfg) => Some(cfg),
        Err(e) => { eprintln!("Failed to parse config {}: {}", p.to_string_lossy(), e); None }
    }
}

fn apply_config(args: &mut Args, cfg: AppConfig) {
    if args.server == DEFAULT_SERVER && let Some(v) = cfg.server { args.server = v; }
    if args.timeout_secs == DEFAULT_TIMEOUT_SECS && let Some(v) = cfg.timeout_secs { args.timeout_secs = v; }
    if args.output == OutputFmt::Text && let Some(v) = cfg.output { args.output = v; }
    if args.text_format == TextFormat::Lines && let Some(v) = cfg.text_format { args.text_format = v; }
    if args.theme == Theme::Dark && let Some(v) = cfg.theme { args.theme = v; }
    if args.html.is_none() { args.html = cfg.html; }
    if args.md_path.is_none() { args.md_path = cfg.md_path; }
    if args.json_path.is_none() { args.json_path = cfg.json_path; }
    if args.csv_path.is_none() { args.csv_path = cfg.csv_path; }
    if let Some(v) = cfg.no_truncate { args.no_truncate |= v; }
    if let Some(v) = cfg.no_open { args.no_open |= v; }
    if let Some(v) = cfg.progress { args.progress |= v; }
    if args.log_level.is_none() { args.log_level = cfg.log_level; }
    if args.log_format.is_none() { args.log_format = cfg.log_format; }
    if args.log_path.is_none() { args.log_path = cfg.log_path; }
    if let Some(v) = cfg.fail_on_error { args.fail_on_error |= v; }
}

fn init_logging(args: &Args) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
    if args.quiet {
        builder.filter_level(log::LevelFilter::Error);
    } else if let Some(lvl) = args.log_level {
        let f = match lvl { LogLevel::Error => log::LevelFilter::Error, LogLevel::Warn => log::LevelFilter::Warn, LogLevel::Info => log::LevelFilter::Info, LogLevel::Debug => log::LevelFilter::Debug, LogLevel::Trace => log::LevelFilter::Trace };
        builder.filter_level(f);
    } else if args.verbose > 0 {
        let f = if args.verbose >= 3 { log::LevelFilter::Trace } else if args.verbose == 2 { log::LevelFilter::Debug } else { log::LevelFilter::Info };
        builder.filter_level(f);
    }
    if let Some(fmt) = args.log_format {
        match fmt {
            LogFormat::Json => {
                builder.format(|buf, record| {
                    use std::io::Write;
                    let obj = serde_json::json!({
                        "ts": chrono::Local::now().to_rfc3339(),
                        "level": record.level().to_string(),
                        "target": record.target(),
                        "msg": record.args().to_string(),
                    });
                    writeln!(buf, "{}", obj)
                });
            }
            LogFormat::Text => {
                builder.format(|buf, record| {
                    use std::io::Write;
                    let ts = chrono::Local::now().format("%H:%M:%S");
                    writeln!(buf, "[{:<5} {}] {}", record.level(), ts, record.args())
                });
            }
        }
    }
    if let Some(path) = args.log_path.as_ref() {
        match std::fs::File::create(path) {
            Ok(f) => { builder.target(env_logger::Target::Pipe(Box::new(f))); }
            Err(e) => { eprintln!("Failed to open log file {}: {}", path, e); }
        }
    }
    builder.init();
}

/// The UI events a user would produce on the page to perform the requested action.
fn plan_events(args: &Args) -> Vec<UiEvent> {
    if let Some(dump) = args.dump.as_ref() {
        let mut ev = vec![UiEvent::TabClicked("dump".to_string())];
        match dump {
            Some(p) => ev.extend(drop_events(p)),
            None => ev.push(UiEvent::DropZoneClicked),
        }
        ev.push(UiEvent::SubmitDump);
        ev
    } else if let Some(c) = args.code.as_ref() {
        vec![UiEvent::TabClicked("code".to_string()), UiEvent::CodeInput(c.clone()), UiEvent::SubmitCode]
    } else if args.scan {
        vec![UiEvent::TabClicked("scan".to_string()), UiEvent::ScanClicked]
    } else {
        vec![]
    }
}

/// A path on the command line is dropped onto the drop zone; a path that is not a file is dragged away again.
fn drop_events(path: &str) -> Vec<UiEvent> {
    if Path::new(path).is_file() {
        vec![
            UiEvent::Drag(DragKind::Enter, vec![]),
            UiEvent::Drag(DragKind::Over, vec![]),
            UiEvent::Drag(DragKind::Drop, vec![FileRef::from_path(path)]),
        ]
    } else {
        log::warn!("Dump file not found: {}", path);
        vec![UiEvent::Drag(DragKind::Enter, vec![]), UiEvent::Drag(DragKind::Leave, vec![])]
    }
}

/// Terminal stand-in for the file picker: reads one path, blank means nothing chosen.
fn pick_files(input: &mut dyn BufRead) -> std::io::Result<Vec<FileRef>> {
    eprint!("Dump file path: ");
    let mut line = String::new();
    input.read_line(&mut line)?;
    let path = line.trim().trim_matches('"');
    Ok(if path.is_empty() { vec![] } else { vec![FileRef::from_path(path)] })
}

fn request_label(args: &Args, console: &Console) -> String {
    if args.dump.is_some() {
        match console.state().selected.first() {
            Some(f) => format!("dump file {}", f.path.display()),
            None => "dump file".to_string(),
        }
    } else if let Some(c) = args.code.as_ref() {
        format!("error code {}", c.trim())
    } else if args.scan {
        "system scan".to_string()
    } else {
        "none".to_string()
    }
}

fn run(args: &Args) -> anyhow::Result<i32> {
    let transport = HttpTransport::new(&args.server, Duration::from_secs(args.timeout_secs))
        .with_context(|| format!("cannot build HTTP client for {}", args.server))?;
    let mut console = Console::mount(Layout::default());
    console.bind();
    if args.progress && !args.quiet {
        console.set_observer(Box::new(SpinnerObserver { pb: indicatif::ProgressBar::new_spinner() }));
    }
    let events = plan_events(args);
    if events.is_empty() && args.output != OutputFmt::Html && args.html.is_none() {
        eprintln!("Nothing to analyze. Use --dump, --code or --scan.");
        return Ok(2);
    }
    for ev in events {
        for fx in console.handle(ev, &transport) {
            match fx {
                Effect::Alert(msg) => {
                    log::warn!("{}", msg);
                    eprintln!("{}", paint(&msg, "1;33"));
                    console.unmount();
                    return Ok(2);
                }
                Effect::OpenFilePicker => {
                    let picked = pick_files(&mut std::io::stdin().lock()).context("cannot read dump file path")?;
                    console.handle(UiEvent::FilesPicked(picked), &transport);
                }
                Effect::PreventDefault => {}
            }
        }
    }
    write_outputs(args, &console)?;
    let code = if args.fail_on_error && console.state().last_error.is_some() { 1 } else { 0 };
    console.unmount();
    log::debug!("Console {:?}, exit code {}", console.lifecycle(), code);
    Ok(code)
}

fn write_outputs(args: &Args, console: &Console) -> anyhow::Result<()> {
    let st = console.state();
    let html_target = args.html.clone().or_else(|| (args.output == OutputFmt::Html).then(|| "bsod-report.html".to_string()));
    if let Some(path) = html_target {
        let html = crate::page::render_page(console, args.theme);
        std::fs::write(&path, html).with_context(|| format!("HTML write failed for {}", path))?;
        if !args.no_open { open_file_default(PathBuf::from(&path)); }
        if !args.quiet { println!("{}", paint(&format!("HTML generated: {}", path), "1;36")); }
    }
    match args.output {
        OutputFmt::Text => {
            if !args.quiet {
                match (&st.last_payload, &st.last_error) {
                    (Some(p), _) => print!("{}", crate::text::render_text(p, args.text_format, args.no_truncate)),
                    (None, Some(e)) => println!("{}", paint(&format!("Error: {}", e), "1;31")),
                    (None, None) => {}
                }
            }
        }
        OutputFmt::Json => {
            let body = json_result(console);
            let pretty = serde_json::to_string_pretty(&body)?;
            if let Some(p) = args.json_path.as_ref() {
                std::fs::write(p, &pretty).with_context(|| format!("JSON write failed for {}", p))?;
                if !args.quiet { println!("{}", paint(&format!("JSON written: {}", p), "1;36")); }
            } else if !args.quiet { println!("{}", pretty); }
        }
        OutputFmt::Html => {}
    }
    if args.output != OutputFmt::Json && let Some(p) = args.json_path.as_ref() {
        std::fs::write(p, serde_json::to_vec_pretty(&json_result(console))?).with_context(|| format!("JSON write failed for {}", p))?;
        if !args.quiet { println!("{}", paint(&format!("JSON written: {}", p), "1;36")); }
    }
    if let Some(p) = args.md_path.as_ref() {
        let md = match (&st.last_payload, &st.last_error) {
            (Some(payload), _) => crate::markdown::render_markdown(payload, &request_label(args, console)),
            (None, Some(e)) => format!("# BSOD Analysis\n\nRequest: {}\n\n> **Error:** {}\n", request_label(args, console), e),
            (None, None) => format!("# BSOD Analysis\n\nRequest: {}\n", request_label(args, console)),
        };
        std::fs::write(p, md).with_context(|| format!("Markdown write failed for {}", p))?;
        if !args.quiet { println!("{}", paint(&format!("Markdown written: {}", p), "1;36")); }
    }
    if let Some(p) = args.csv_path.as_ref() {
        let crashes = st.last_payload.as_ref().map(|pl| pl.crashes()).unwrap_or(&[]);
        write_csv(p, crashes).with_context(|| format!("CSV write failed for {}", p))?;
        if !args.quiet { println!("{}", paint(&format!("CSV written: {} ({} rows)", p, crashes.len()), "1;36")); }
    }
    Ok(())
}

/// Raw server body on success, otherwise the error in the server's own failure shape.
fn json_result(console: &Console) -> serde_json::Value {
    let st = console.state();
    match (&st.last_body, &st.last_error) {
        (Some(body), _) => body.clone(),
        (None, Some(e)) => serde_json::json!({ "success": false, "error": e }),
        (None, None) => serde_json::Value::Null,
    }
}

fn write_csv(path: &str, crashes: &[CrashEvent]) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(["date", "error_code", "source", "event_id", "description", "dump_file", "parameters", "event_message"])?;
    for c in crashes {
        let params = c.parameters.join(" ");
        wtr.write_record([
            c.date.as_deref().unwrap_or(""),
            c.error_code.as_deref().unwrap_or(""),
            c.display_source(),
            c.event_id.as_deref().unwrap_or(""),
            c.description.as_deref().unwrap_or(""),
            c.dump_file.as_deref().unwrap_or(""),
            params.as_str(),
            c.event_message.as_deref().unwrap_or(""),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

pub(crate) fn paint(s: &str, code: &str) -> String {
    if *ENABLE_COLOR.get().unwrap_or(&false) { format!("\x1b[{}m{}\x1b[0m", code, s) } else { s.to_string() }
}

#[cfg(target_os = "windows")]
fn open_file_default(p: PathBuf) {
    let s = p.to_string_lossy().into_owned();
    let _ = std::process::Command::new("cmd").args(["/C", "start", "", &s]).spawn()
        .map_err(|e| log::error!("Failed to open file {}: {}", s, e));
}

#[cfg(not(target_os = "windows"))]
fn open_file_default(p: PathBuf) {
    let s = p.to_string_lossy().into_owned();
    let _ = std::process::Command::new("xdg-open").arg(&s).spawn().map_err(|e| log::error!("Failed to open file {}: {}", s, e));
}
