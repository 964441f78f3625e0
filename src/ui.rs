use std::path::PathBuf;
use serde_json::Value;
use crate::client::{dispatch, failure_message, ApiRequest, ClientError, Endpoint, Transport};
use crate::model::{classify, Payload};
use crate::render::{error_block, render_payload, Markup};

pub const BORDER_HIGHLIGHT: &str = "#0078d7";
pub const BORDER_IDLE: &str = "#ccc";
pub const NEED_DUMP: &str = "Please select a dump file to analyze.";
pub const NEED_CODE: &str = "Please enter a BSOD error code or message.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileRef {
    pub name: String,
    pub path: PathBuf,
}

impl FileRef {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path.file_name().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| path.to_string_lossy().into_owned());
        FileRef { name, path }
    }
}

/// Which host elements exist. Features whose elements are missing are never wired.
#[derive(Clone, Debug)]
pub struct Layout {
    pub tabs: Vec<String>,
    pub initial_tab: Option<String>,
    pub drop_zone: bool,
    pub file_input: bool,
    pub file_label: bool,
    pub result_section: bool,
    pub loading: bool,
    pub results_content: bool,
    pub dump_form: bool,
    pub code_form: bool,
    pub scan_button: bool,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            tabs: vec!["dump".to_string(), "code".to_string(), "scan".to_string()],
            initial_tab: Some("dump".to_string()),
            drop_zone: true,
            file_input: true,
            file_label: true,
            result_section: true,
            loading: true,
            results_content: true,
            dump_form: true,
            code_form: true,
            scan_button: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DragKind { Enter, Over, Leave, Drop }

#[derive(Clone, Debug)]
pub enum UiEvent {
    TabClicked(String),
    DropZoneClicked,
    FilesPicked(Vec<FileRef>),
    Drag(DragKind, Vec<FileRef>),
    CodeInput(String),
    SubmitDump,
    SubmitCode,
    ScanClicked,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    PreventDefault,
    Alert(String),
    OpenFilePicker,
}

pub trait LoadingObserver {
    fn loading_changed(&self, visible: bool);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle { Mounted, Bound, Unmounted }

#[derive(Clone, Debug, Default)]
struct Bindings {
    tabs: bool,
    drop_zone: bool,
    file_input: bool,
    dump_form: bool,
    code_form: bool,
    scan_button: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Tab {
    pub key: String,
    pub active: bool,
}

impl Tab {
    pub fn panel_id(&self) -> String { format!("{}-tab", self.key) }
}

#[derive(Clone, Debug)]
pub struct ViewState {
    pub tabs: Vec<Tab>,
    pub active_panel: Option<String>,
    pub border_color: &'static str,
    pub selected: Vec<FileRef>,
    pub file_label: String,
    pub code_text: String,
    pub results_visible: bool,
    pub loading_visible: bool,
    pub content: Markup,
    pub last_payload: Option<Payload>,
    pub last_body: Option<Value>,
    pub last_error: Option<String>,
}

/// The analyzer page as a component: mount, bind, feed events, unmount.
pub struct Console {
    layout: Layout,
    lifecycle: Lifecycle,
    bindings: Bindings,
    observer: Option<Box<dyn LoadingObserver>>,
    state: ViewState,
}

impl Console {
    pub fn mount(layout: Layout) -> Self {
        let initial = layout.initial_tab.clone();
        let tabs = layout.tabs.iter().map(|k| Tab { key: k.clone(), active: initial.as_deref() == Some(k.as_str()) }).collect();
        let state = ViewState {
            tabs,
            active_panel: initial.map(|k| format!("{}-tab", k)),
            border_color: BORDER_IDLE,
            selected: vec![],
            file_label: String::new(),
            code_text: String::new(),
            results_visible: false,
            loading_visible: false,
            content: Markup::new(),
            last_payload: None,
            last_body: None,
            last_error: None,
        };
        log::debug!("Mounted console with {} tabs", layout.tabs.len());
        Console { layout, lifecycle: Lifecycle::Mounted, bindings: Bindings::default(), observer: None, state }
    }

    pub fn bind(&mut self) {
        if self.lifecycle != Lifecycle::Mounted { return; }
        let l = &self.layout;
        self.bindings = Bindings {
            tabs: !l.tabs.is_empty(),
            drop_zone: l.drop_zone && l.file_input,
            file_input: l.file_input,
            dump_form: l.dump_form && l.file_input,
            code_form: l.code_form,
            scan_button: l.scan_button,
        };
        log::debug!("Bound console: {:?}", self.bindings);
        self.lifecycle = Lifecycle::Bound;
    }

    pub fn unmount(&mut self) {
        self.bindings = Bindings::default();
        self.observer = None;
        self.lifecycle = Lifecycle::Unmounted;
    }

    pub fn lifecycle(&self) -> Lifecycle { self.lifecycle }

    pub fn layout(&self) -> &Layout { &self.layout }

    pub fn state(&self) -> &ViewState { &self.state }

    pub fn set_observer(&mut self, obs: Box<dyn LoadingObserver>) { self.observer = Some(obs); }

    pub fn handle(&mut self, ev: UiEvent, t: &dyn Transport) -> Vec<Effect> {
        if self.lifecycle != Lifecycle::Bound {
            log::trace!("Ignoring {:?} while {:?}", ev, self.lifecycle);
            return vec![];
        }
        match ev {
            UiEvent::TabClicked(key) if self.bindings.tabs => { self.activate_tab(&key); vec![] }
            UiEvent::DropZoneClicked if self.bindings.drop_zone => vec![Effect::OpenFilePicker],
            UiEvent::FilesPicked(files) if self.bindings.file_input => { self.select_files(files); vec![] }
            UiEvent::Drag(kind, files) if self.bindings.drop_zone => { self.drag(kind, files); vec![Effect::PreventDefault] }
            UiEvent::CodeInput(text) if self.bindings.code_form => { self.state.code_text = text; vec![] }
            UiEvent::SubmitDump if self.bindings.dump_form => self.submit_dump(t),
            UiEvent::SubmitCode if self.bindings.code_form => self.submit_code(t),
            UiEvent::ScanClicked if self.bindings.scan_button => self.scan(t),
            other => { log::trace!("No binding for {:?}", other); vec![] }
        }
    }

    fn activate_tab(&mut self, key: &str) {
        if !self.state.tabs.iter().any(|t| t.key == key) {
            log::warn!("Ignoring click on unknown tab {}", key);
            return;
        }
        for tab in &mut self.state.tabs { tab.active = tab.key == key; }
        self.state.active_panel = Some(format!("{}-tab", key));
        log::debug!("Tab clicked: {}", key);
    }

    fn select_files(&mut self, files: Vec<FileRef>) {
        self.state.selected = files;
        self.update_file_label();
    }

    fn update_file_label(&mut self) {
        if !self.layout.file_label { return; }
        self.state.file_label = match self.state.selected.first() {
            Some(f) => format!("Selected file: {}", f.name),
            None => String::new(),
        };
    }

    fn drag(&mut self, kind: DragKind, files: Vec<FileRef>) {
        match kind {
            DragKind::Enter | DragKind::Over => self.state.border_color = BORDER_HIGHLIGHT,
            DragKind::Leave => self.state.border_color = BORDER_IDLE,
            DragKind::Drop => {
                self.state.border_color = BORDER_IDLE;
                if !files.is_empty() { self.select_files(files); }
            }
        }
        log::trace!("Drop zone {:?}, border {}", kind, self.state.border_color);
    }

    fn submit_dump(&mut self, t: &dyn Transport) -> Vec<Effect> {
        let Some(file) = self.state.selected.first().cloned() else {
            return vec![Effect::PreventDefault, Effect::Alert(NEED_DUMP.to_string())];
        };
        log::info!("Uploading dump file {}", file.name);
        self.run(Endpoint::AnalyzeDump, t, || {
            let mut req = ApiRequest::dump_from_path(&file.path)?;
            if let ApiRequest::AnalyzeDump { file_name, .. } = &mut req { *file_name = file.name.clone(); }
            Ok(req)
        });
        vec![Effect::PreventDefault]
    }

    fn submit_code(&mut self, t: &dyn Transport) -> Vec<Effect> {
        let code = self.state.code_text.trim().to_string();
        if code.is_empty() {
            return vec![Effect::PreventDefault, Effect::Alert(NEED_CODE.to_string())];
        }
        log::info!("Sending error code: {}", code);
        self.run(Endpoint::AnalyzeCode, t, || Ok(ApiRequest::AnalyzeCode { error_code: code }));
        vec![Effect::PreventDefault]
    }

    fn scan(&mut self, t: &dyn Transport) -> Vec<Effect> {
        log::info!("Starting system scan");
        self.run(Endpoint::ScanSystem, t, || Ok(ApiRequest::ScanSystem));
        vec![Effect::PreventDefault]
    }

    /// Loading is hidden once the request finishes, whatever the outcome.
    fn run(&mut self, ep: Endpoint, t: &dyn Transport, build: impl FnOnce() -> Result<ApiRequest, ClientError>) {
        self.show_loading();
        match build().and_then(|req| dispatch(t, &req)) {
            Ok(body) => self.display_results(body),
            Err(e) => {
                log::warn!("Request to {} failed: {}", ep.path(), e);
                self.show_error(&failure_message(ep, &e));
            }
        }
        self.hide_loading();
    }

    fn show_loading(&mut self) {
        if self.layout.result_section { self.state.results_visible = true; }
        if self.layout.results_content { self.state.content = Markup::new(); }
        self.state.last_payload = None;
        self.state.last_body = None;
        self.state.last_error = None;
        if self.layout.loading {
            self.state.loading_visible = true;
            if let Some(o) = &self.observer { o.loading_changed(true); }
        }
    }

    fn hide_loading(&mut self) {
        if !self.layout.loading { return; }
        self.state.loading_visible = false;
        if let Some(o) = &self.observer { o.loading_changed(false); }
    }

    fn show_error(&mut self, message: &str) {
        self.state.last_error = Some(message.to_string());
        if self.layout.results_content { self.state.content = error_block(message); }
        if self.layout.result_section { self.state.results_visible = true; }
    }

    fn display_results(&mut self, body: Value) {
        if !self.layout.results_content {
            log::error!("Results content element not found");
            return;
        }
        if self.layout.result_section { self.state.results_visible = true; }
        let payload = classify(&body);
        log::debug!("Classified response as {}", payload.kind());
        if let Some(msg) = payload.error_message() { self.state.last_error = Some(msg); }
        self.state.content = render_payload(&payload);
        self.state.last_payload = Some(payload);
        self.state.last_body = Some(body);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::FakeTransport;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn bound(layout: Layout) -> Console {
        let mut c = Console::mount(layout);
        c.bind();
        c
    }

    struct Recorder(Rc<RefCell<Vec<bool>>>);
    impl LoadingObserver for Recorder {
        fn loading_changed(&self, visible: bool) { self.0.borrow_mut().push(visible); }
    }

    #[test]
    fn tab_click_activates_one_tab_and_panel() {
        let t = FakeTransport::ok("{}");
        let mut c = bound(Layout::default());
        assert_eq!(c.state().active_panel.as_deref(), Some("dump-tab"));
        c.handle(UiEvent::TabClicked("scan".into()), &t);
        let active: Vec<&str> = c.state().tabs.iter().filter(|t| t.active).map(|t| t.key.as_str()).collect();
        assert_eq!(active, vec!["scan"]);
        assert_eq!(c.state().active_panel.as_deref(), Some("scan-tab"));
    }

    #[test]
    fn unknown_tab_keeps_current_selection() {
        let t = FakeTransport::ok("{}");
        let mut c = bound(Layout::default());
        c.handle(UiEvent::TabClicked("code".into()), &t);
        c.handle(UiEvent::TabClicked("history".into()), &t);
        let active: Vec<&str> = c.state().tabs.iter().filter(|t| t.active).map(|t| t.key.as_str()).collect();
        assert_eq!(active, vec!["code"]);
        assert_eq!(c.state().active_panel.as_deref(), Some("code-tab"));
    }

    #[test]
    fn drop_zone_click_opens_picker() {
        let t = FakeTransport::ok("{}");
        let mut c = bound(Layout::default());
        assert_eq!(c.handle(UiEvent::DropZoneClicked, &t), vec![Effect::OpenFilePicker]);
    }

    #[test]
    fn picking_and_clearing_updates_label() {
        let t = FakeTransport::ok("{}");
        let mut c = bound(Layout::default());
        c.handle(UiEvent::FilesPicked(vec![FileRef::from_path("/tmp/MEMORY.DMP")]), &t);
        assert_eq!(c.state().file_label, "Selected file: MEMORY.DMP");
        c.handle(UiEvent::FilesPicked(vec![]), &t);
        assert_eq!(c.state().file_label, "");
    }

    #[test]
    fn drag_highlights_and_drop_replaces_selection() {
        let t = FakeTransport::ok("{}");
        let mut c = bound(Layout::default());
        c.handle(UiEvent::FilesPicked(vec![FileRef::from_path("/tmp/old.dmp")]), &t);
        assert_eq!(c.handle(UiEvent::Drag(DragKind::Enter, vec![]), &t), vec![Effect::PreventDefault]);
        assert_eq!(c.state().border_color, BORDER_HIGHLIGHT);
        c.handle(UiEvent::Drag(DragKind::Leave, vec![]), &t);
        assert_eq!(c.state().border_color, BORDER_IDLE);
        c.handle(UiEvent::Drag(DragKind::Over, vec![]), &t);
        c.handle(UiEvent::Drag(DragKind::Drop, vec![]), &t);
        assert_eq!(c.state().border_color, BORDER_IDLE);
        assert_eq!(c.state().file_label, "Selected file: old.dmp");
        c.handle(UiEvent::Drag(DragKind::Drop, vec![FileRef::from_path("/tmp/new.dmp")]), &t);
        assert_eq!(c.state().selected[0].name, "new.dmp");
        assert_eq!(c.state().file_label, "Selected file: new.dmp");
    }

    #[test]
    fn dump_submit_without_file_alerts_and_sends_nothing() {
        let t = FakeTransport::ok("{}");
        let mut c = bound(Layout::default());
        let fx = c.handle(UiEvent::SubmitDump, &t);
        assert_eq!(fx, vec![Effect::PreventDefault, Effect::Alert(NEED_DUMP.to_string())]);
        assert!(t.sent.borrow().is_empty());
        assert!(!c.state().results_visible);
    }

    #[test]
    fn blank_code_alerts() {
        let t = FakeTransport::ok("{}");
        let mut c = bound(Layout::default());
        c.handle(UiEvent::CodeInput("   ".into()), &t);
        let fx = c.handle(UiEvent::SubmitCode, &t);
        assert!(fx.contains(&Effect::Alert(NEED_CODE.to_string())));
        assert!(t.sent.borrow().is_empty());
    }

    #[test]
    fn code_is_trimmed_before_sending() {
        let t = FakeTransport::ok(r#"{"code": "0x7B"}"#);
        let mut c = bound(Layout::default());
        c.handle(UiEvent::CodeInput("  0x0000007B  ".into()), &t);
        c.handle(UiEvent::SubmitCode, &t);
        let sent = t.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].endpoint(), Endpoint::AnalyzeCode);
        assert_eq!(sent[0].json_body(), Some(serde_json::json!({"errorCode": "0x0000007B"})));
    }

    #[test]
    fn code_lookup_renders_result_card() {
        let t = FakeTransport::ok(r#"{"code":"0x7B","hexCode":"0x0000007B","name":"INACCESSIBLE_BOOT_DEVICE","causes":["Bad driver"],"solutions":["Reinstall driver"]}"#);
        let mut c = bound(Layout::default());
        c.handle(UiEvent::CodeInput("0x7B".into()), &t);
        c.handle(UiEvent::SubmitCode, &t);
        let html = c.state().content.as_str();
        assert!(html.contains("0x7B (0x0000007B) - INACCESSIBLE_BOOT_DEVICE"));
        assert_eq!(html.matches("<li>Bad driver</li>").count(), 1);
        assert_eq!(html.matches("<li>Reinstall driver</li>").count(), 1);
        assert!(c.state().results_visible);
        assert!(!c.state().loading_visible);
    }

    #[test]
    fn server_error_status_is_reported() {
        let t = FakeTransport::status(500, "oops");
        let mut c = bound(Layout::default());
        c.handle(UiEvent::CodeInput("0x7B".into()), &t);
        c.handle(UiEvent::SubmitCode, &t);
        assert_eq!(c.state().content.as_str(), "<div class=\"error\">Error analyzing error code: Server error: 500</div>");
        assert_eq!(c.state().last_error.as_deref(), Some("Error analyzing error code: Server error: 500"));
    }

    #[test]
    fn empty_scan_shows_no_events() {
        let t = FakeTransport::ok(r#"{"crashes": []}"#);
        let mut c = bound(Layout::default());
        c.handle(UiEvent::ScanClicked, &t);
        let html = c.state().content.as_str();
        assert!(html.contains("No BSOD Events Found"));
        assert!(!html.contains("crash-item"));
        assert_eq!(t.sent.borrow()[0], ApiRequest::ScanSystem);
    }

    #[test]
    fn loading_is_always_hidden_afterwards() {
        let seen = Rc::new(RefCell::new(vec![]));
        let t = FakeTransport::unreachable("connection refused");
        let mut c = bound(Layout::default());
        c.set_observer(Box::new(Recorder(seen.clone())));
        c.handle(UiEvent::ScanClicked, &t);
        assert_eq!(*seen.borrow(), vec![true, false]);
        assert!(!c.state().loading_visible);
        assert_eq!(c.state().content.as_str(), "<div class=\"error\">Error scanning system: connection refused</div>");
    }

    #[test]
    fn unreadable_dump_routes_to_error_path() {
        let t = FakeTransport::ok("{}");
        let mut c = bound(Layout::default());
        c.handle(UiEvent::FilesPicked(vec![FileRef::from_path("/nonexistent/dir/none.dmp")]), &t);
        c.handle(UiEvent::SubmitDump, &t);
        assert!(t.sent.borrow().is_empty());
        assert!(c.state().content.as_str().starts_with("<div class=\"error\">Error analyzing dump file: "));
        assert!(!c.state().loading_visible);
    }

    #[test]
    fn dump_upload_sends_multipart_file() {
        let p = std::env::temp_dir().join("bsodview-ui-test.dmp");
        std::fs::write(&p, b"MDMP").unwrap();
        let t = FakeTransport::ok(r#"{"code": "MEMORY_MANAGEMENT"}"#);
        let mut c = bound(Layout::default());
        c.handle(UiEvent::FilesPicked(vec![FileRef::from_path(&p)]), &t);
        c.handle(UiEvent::SubmitDump, &t);
        assert_eq!(t.sent.borrow()[0], ApiRequest::AnalyzeDump { file_name: "bsodview-ui-test.dmp".into(), bytes: b"MDMP".to_vec() });
        assert!(c.state().content.as_str().contains("<h3>MEMORY_MANAGEMENT</h3>"));
        let _ = std::fs::remove_file(&p);
    }

    #[test]
    fn new_submission_resets_previous_error() {
        let bad = FakeTransport::status(404, "");
        let good = FakeTransport::ok(r#"{"crashes": []}"#);
        let mut c = bound(Layout::default());
        c.handle(UiEvent::ScanClicked, &bad);
        assert!(c.state().last_error.is_some());
        c.handle(UiEvent::ScanClicked, &good);
        assert!(c.state().last_error.is_none());
        assert!(!c.state().content.as_str().contains("class=\"error\""));
    }

    #[test]
    fn missing_elements_skip_their_features() {
        let t = FakeTransport::ok("{}");
        let layout = Layout { scan_button: false, drop_zone: false, file_label: false, ..Layout::default() };
        let mut c = bound(layout);
        assert!(c.handle(UiEvent::ScanClicked, &t).is_empty());
        assert!(c.handle(UiEvent::DropZoneClicked, &t).is_empty());
        c.handle(UiEvent::FilesPicked(vec![FileRef::from_path("/tmp/a.dmp")]), &t);
        assert_eq!(c.state().file_label, "");
        assert_eq!(c.state().selected.len(), 1);
        assert!(t.sent.borrow().is_empty());
    }

    #[test]
    fn events_before_bind_and_after_unmount_are_ignored() {
        let t = FakeTransport::ok("{}");
        let mut c = Console::mount(Layout::default());
        assert!(c.handle(UiEvent::DropZoneClicked, &t).is_empty());
        c.bind();
        assert_eq!(c.lifecycle(), Lifecycle::Bound);
        c.unmount();
        assert!(c.handle(UiEvent::ScanClicked, &t).is_empty());
        assert!(t.sent.borrow().is_empty());
        c.bind();
        assert_eq!(c.lifecycle(), Lifecycle::Unmounted);
    }
}
