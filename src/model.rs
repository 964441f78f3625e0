use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One BugCheck-style event reported by the server's Event Viewer scan.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct CrashEvent {
    #[serde(default, deserialize_with = "truthy_field")]
    pub error_code: Option<String>,
    #[serde(default, deserialize_with = "truthy_field")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "truthy_field")]
    pub event_source: Option<String>,
    #[serde(default, deserialize_with = "truthy_field")]
    pub source: Option<String>,
    #[serde(default, deserialize_with = "truthy_field")]
    pub event_id: Option<String>,
    #[serde(default, deserialize_with = "truthy_field")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "truthy_field")]
    pub dump_file: Option<String>,
    #[serde(default, deserialize_with = "text_list")]
    pub parameters: Vec<String>,
    #[serde(default, deserialize_with = "truthy_field")]
    pub event_message: Option<String>,
    #[serde(default, deserialize_with = "text_list")]
    pub common_causes: Vec<String>,
}

impl CrashEvent {
    pub fn display_source(&self) -> &str {
        self.event_source.as_deref().or(self.source.as_deref()).unwrap_or("Event Viewer")
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cause {
    Plain(String),
    Titled { title: String, description: Option<String> },
    /// Neither a string nor an object with a title; never rendered.
    Other,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Solution {
    Plain(String),
    Titled { title: String, description: Option<String>, steps: Vec<String> },
    Other,
}

impl From<&Value> for Cause {
    fn from(v: &Value) -> Self {
        match v {
            Value::String(s) => Cause::Plain(s.clone()),
            Value::Object(m) => match m.get("title").and_then(truthy_text) {
                Some(title) => Cause::Titled { title, description: m.get("description").and_then(truthy_text) },
                None => Cause::Other,
            },
            _ => Cause::Other,
        }
    }
}

impl From<&Value> for Solution {
    fn from(v: &Value) -> Self {
        match v {
            Value::String(s) => Solution::Plain(s.clone()),
            Value::Object(m) => match m.get("title").and_then(truthy_text) {
                Some(title) => Solution::Titled {
                    title,
                    description: m.get("description").and_then(truthy_text),
                    steps: m.get("steps").map(scalar_list).unwrap_or_default(),
                },
                None => Solution::Other,
            },
            _ => Solution::Other,
        }
    }
}

/// Result of a dump upload or an error-code lookup.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    #[serde(default, deserialize_with = "truthy_field")]
    pub code: Option<String>,
    #[serde(default, deserialize_with = "truthy_field")]
    pub hex_code: Option<String>,
    #[serde(default, deserialize_with = "truthy_field")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "truthy_field")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "causes_list")]
    pub causes: Vec<Cause>,
    #[serde(default, deserialize_with = "causes_list")]
    pub common_causes: Vec<Cause>,
    #[serde(default, deserialize_with = "solutions_list")]
    pub solutions: Vec<Solution>,
    #[serde(default, deserialize_with = "truthy_field")]
    pub technical_details: Option<String>,
    #[serde(default, deserialize_with = "truthy_field")]
    pub analysis_method: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub valid_dump_format: Option<bool>,
    #[serde(default, deserialize_with = "truthy_field")]
    pub disclaimer: Option<String>,
}

impl AnalysisResult {
    /// `causes` first, then `commonCauses`; the first non-empty list wins.
    pub fn effective_causes(&self) -> &[Cause] {
        if !self.causes.is_empty() { &self.causes } else { &self.common_causes }
    }

    /// "code (hex) - name", each part omitted when absent.
    pub fn title_line(&self) -> Option<String> {
        let code = self.code.as_deref()?;
        let mut s = code.to_string();
        if let Some(h) = self.hex_code.as_deref() { s.push_str(&format!(" ({})", h)); }
        if let Some(n) = self.name.as_deref() { s.push_str(&format!(" - {}", n)); }
        Some(s)
    }

    fn from_value(v: &Value) -> Self {
        if !v.is_object() { return AnalysisResult::default(); }
        serde_json::from_value(v.clone()).unwrap_or_default()
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ScanResponse {
    #[serde(default, deserialize_with = "truthy_field")]
    pub warning: Option<String>,
    #[serde(default, deserialize_with = "truthy_field")]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "crash_list")]
    pub crashes: Vec<CrashEvent>,
    #[serde(default, deserialize_with = "lenient")]
    pub date_analyzed: Option<f64>,
}

/// A server response after shape validation. Rendering only ever sees one of these.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Missing,
    Failure { error: Option<String> },
    Scan(ScanResponse),
    Single(AnalysisResult),
    Many(Vec<AnalysisResult>),
    Unrecognized,
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Missing => "missing",
            Payload::Failure { .. } => "failure",
            Payload::Scan(_) => "scan",
            Payload::Single(_) => "single",
            Payload::Many(_) => "many",
            Payload::Unrecognized => "unrecognized",
        }
    }

    /// Message shown in the error block, if this payload renders as one.
    pub fn error_message(&self) -> Option<String> {
        match self {
            Payload::Missing => Some(NO_DATA.to_string()),
            Payload::Failure { error } => Some(error.clone().unwrap_or_else(|| GENERIC_FAILURE.to_string())),
            _ => None,
        }
    }

    pub fn crashes(&self) -> &[CrashEvent] {
        match self { Payload::Scan(s) => &s.crashes, _ => &[] }
    }
}

pub const NO_DATA: &str = "No data received from server.";
pub const GENERIC_FAILURE: &str = "An error occurred.";
pub const NOTHING_FOUND: &str = "No relevant BSOD information found.";

/// First match wins: missing, explicit failure, scan, bare result, wrapped result, list.
pub fn classify(v: &Value) -> Payload {
    if !is_truthy(v) { return Payload::Missing; }
    if let Value::Object(m) = v {
        if m.get("success") == Some(&Value::Bool(false)) {
            return Payload::Failure { error: m.get("error").and_then(truthy_text) };
        }
        if m.contains_key("crashes") {
            return Payload::Scan(serde_json::from_value(v.clone()).unwrap_or_else(|e| {
                log::warn!("Scan response did not validate, rendering it as empty: {}", e);
                ScanResponse::default()
            }));
        }
        if m.get("code").is_some_and(is_truthy) { return Payload::Single(AnalysisResult::from_value(v)); }
        if let Some(r) = m.get("result") && is_truthy(r) { return Payload::Single(AnalysisResult::from_value(r)); }
    }
    if let Value::Array(items) = v && !items.is_empty() {
        return Payload::Many(items.iter().map(AnalysisResult::from_value).collect());
    }
    Payload::Unrecognized
}

fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Scalar as display text, or None when it would be falsy.
pub(crate) fn truthy_text(v: &Value) -> Option<String> {
    if !is_truthy(v) { return None; }
    scalar_text(v)
}

fn scalar_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn scalar_list(v: &Value) -> Vec<String> {
    match v { Value::Array(a) => a.iter().filter_map(scalar_text).collect(), _ => vec![] }
}

fn lenient<'de, D: Deserializer<'de>, T: DeserializeOwned>(d: D) -> Result<Option<T>, D::Error> {
    Ok(serde_json::from_value(Value::deserialize(d)?).ok())
}

fn truthy_field<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(truthy_text(&Value::deserialize(d)?))
}

fn text_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(scalar_list(&Value::deserialize(d)?))
}

fn causes_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Cause>, D::Error> {
    match Value::deserialize(d)? { Value::Array(a) => Ok(a.iter().map(Cause::from).collect()), _ => Ok(vec![]) }
}

fn solutions_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Solution>, D::Error> {
    match Value::deserialize(d)? { Value::Array(a) => Ok(a.iter().map(Solution::from).collect()), _ => Ok(vec![]) }
}

fn crash_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<CrashEvent>, D::Error> {
    match Value::deserialize(d)? {
        Value::Array(a) => Ok(a.into_iter().map(|c| if c.is_object() { serde_json::from_value(c).unwrap_or_default() } else { CrashEvent::default() }).collect()),
        _ => Ok(vec![]),
    }
}
