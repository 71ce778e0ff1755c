//! Canonical query strings for the list endpoints.
//!
//! Each endpoint has an explicit options struct. Encoding appends parameters
//! in a fixed per-endpoint order, so equal options always produce
//! byte-identical strings:
//!
//! | Endpoint   | Parameter order                                                     |
//! |------------|---------------------------------------------------------------------|
//! | `/workers` | `page, per_page`                                                    |
//! | `/tasks`   | `page, per_page, sort_by, order, status[]`                          |
//! | `/videos`  | `page, per_page, is_vr, sort_by, order, transcode_status[], codec[]` |
//! | `/logs`    | `page, per_page, start_time, end_time, sort_by, order, log_level[]` |
//!
//! Scalars are omitted when absent, empty, or zero. `is_vr` is the one
//! tri-state: `None` means "no filter" and `Some(false)` is sent as
//! `is_vr=false`. Multi-valued filters become repeated `key[]=value` pairs in
//! element order.
//!
//! Every struct also has a lenient `from_json` for loosely-typed option
//! objects: unknown keys are ignored, and a multi-valued option that is not
//! an array means "no filter".

use serde::de::DeserializeOwned;
use serde_json::Value;
use url::form_urlencoded;

use crate::log::LogLevel;
use crate::task::TaskStatus;
use crate::video::TranscodeStatus;

/// Sort direction for list endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

// ---------------------------------------------------------------------------
// Option structs
// ---------------------------------------------------------------------------

/// Options for `GET /api/v1/workers`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Options for `GET /api/v1/tasks`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub sort_by: Option<String>,
    pub order: Option<SortOrder>,
    pub status: Vec<TaskStatus>,
}

/// Options for `GET /api/v1/videos`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// `None` = any video, `Some(true)` = VR only, `Some(false)` = non-VR only.
    pub is_vr: Option<bool>,
    pub sort_by: Option<String>,
    pub order: Option<SortOrder>,
    pub transcode_status: Vec<TranscodeStatus>,
    pub codec: Vec<String>,
}

/// Options for `GET /api/v1/logs`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub sort_by: Option<String>,
    pub order: Option<SortOrder>,
    pub log_level: Vec<LogLevel>,
}

impl WorkerListQuery {
    const KEYS: &'static [&'static str] = &["page", "per_page"];

    pub fn to_query_string(&self) -> String {
        let mut params = ParamWriter::new();
        params.number("page", self.page);
        params.number("per_page", self.per_page);
        params.finish()
    }

    pub fn from_json(options: &Value) -> Self {
        report_unknown_keys("workers", options, Self::KEYS);
        Self {
            page: lenient_number(options.get("page")),
            per_page: lenient_number(options.get("per_page")),
        }
    }
}

impl TaskListQuery {
    const KEYS: &'static [&'static str] = &["page", "per_page", "sort_by", "order", "status"];

    pub fn to_query_string(&self) -> String {
        let mut params = ParamWriter::new();
        params.number("page", self.page);
        params.number("per_page", self.per_page);
        params.text("sort_by", self.sort_by.as_deref());
        params.text("order", self.order.map(SortOrder::as_str));
        params.list("status", self.status.iter().map(|s| s.as_str()));
        params.finish()
    }

    pub fn from_json(options: &Value) -> Self {
        report_unknown_keys("tasks", options, Self::KEYS);
        Self {
            page: lenient_number(options.get("page")),
            per_page: lenient_number(options.get("per_page")),
            sort_by: lenient_text(options.get("sort_by")),
            order: lenient_order(options.get("order")),
            status: lenient_list("status", options.get("status")),
        }
    }
}

impl VideoListQuery {
    const KEYS: &'static [&'static str] = &[
        "page",
        "per_page",
        "is_vr",
        "sort_by",
        "order",
        "transcode_status",
        "codec",
    ];

    pub fn to_query_string(&self) -> String {
        let mut params = ParamWriter::new();
        params.number("page", self.page);
        params.number("per_page", self.per_page);
        params.flag("is_vr", self.is_vr);
        params.text("sort_by", self.sort_by.as_deref());
        params.text("order", self.order.map(SortOrder::as_str));
        params.list(
            "transcode_status",
            self.transcode_status.iter().map(|s| s.as_str()),
        );
        params.list("codec", self.codec.iter().map(String::as_str));
        params.finish()
    }

    pub fn from_json(options: &Value) -> Self {
        report_unknown_keys("videos", options, Self::KEYS);
        Self {
            page: lenient_number(options.get("page")),
            per_page: lenient_number(options.get("per_page")),
            is_vr: lenient_flag(options.get("is_vr")),
            sort_by: lenient_text(options.get("sort_by")),
            order: lenient_order(options.get("order")),
            transcode_status: lenient_list("transcode_status", options.get("transcode_status")),
            codec: lenient_list("codec", options.get("codec")),
        }
    }
}

impl LogListQuery {
    const KEYS: &'static [&'static str] = &[
        "page",
        "per_page",
        "start_time",
        "end_time",
        "sort_by",
        "order",
        "log_level",
    ];

    pub fn to_query_string(&self) -> String {
        let mut params = ParamWriter::new();
        params.number("page", self.page);
        params.number("per_page", self.per_page);
        params.text("start_time", self.start_time.as_deref());
        params.text("end_time", self.end_time.as_deref());
        params.text("sort_by", self.sort_by.as_deref());
        params.text("order", self.order.map(SortOrder::as_str));
        params.list("log_level", self.log_level.iter().map(|l| l.as_str()));
        params.finish()
    }

    pub fn from_json(options: &Value) -> Self {
        report_unknown_keys("logs", options, Self::KEYS);
        Self {
            page: lenient_number(options.get("page")),
            per_page: lenient_number(options.get("per_page")),
            start_time: lenient_text(options.get("start_time")),
            end_time: lenient_text(options.get("end_time")),
            sort_by: lenient_text(options.get("sort_by")),
            order: lenient_order(options.get("order")),
            log_level: lenient_list("log_level", options.get("log_level")),
        }
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Appends `application/x-www-form-urlencoded` pairs, skipping empty values.
struct ParamWriter {
    inner: form_urlencoded::Serializer<'static, String>,
}

impl ParamWriter {
    fn new() -> Self {
        Self {
            inner: form_urlencoded::Serializer::new(String::new()),
        }
    }

    fn number(&mut self, key: &str, value: Option<u32>) {
        if let Some(n) = value.filter(|n| *n != 0) {
            self.inner.append_pair(key, &n.to_string());
        }
    }

    fn text(&mut self, key: &str, value: Option<&str>) {
        if let Some(s) = value.filter(|s| !s.is_empty()) {
            self.inner.append_pair(key, s);
        }
    }

    fn flag(&mut self, key: &str, value: Option<bool>) {
        if let Some(b) = value {
            self.inner.append_pair(key, if b { "true" } else { "false" });
        }
    }

    fn list<'a>(&mut self, key: &str, values: impl IntoIterator<Item = &'a str>) {
        let name = format!("{key}[]");
        for value in values {
            self.inner.append_pair(&name, value);
        }
    }

    fn finish(mut self) -> String {
        self.inner.finish()
    }
}

// ---------------------------------------------------------------------------
// Lenient parsing of loosely-typed option objects
// ---------------------------------------------------------------------------

fn report_unknown_keys(endpoint: &str, options: &Value, known: &[&str]) {
    if let Value::Object(map) = options {
        for key in map.keys().filter(|k| !known.contains(&k.as_str())) {
            tracing::debug!(endpoint, key = %key, "Ignoring unrecognised list option");
        }
    }
}

fn lenient_number(value: Option<&Value>) -> Option<u32> {
    let n = match value? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    n.filter(|n| *n != 0)
}

fn lenient_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn lenient_flag(value: Option<&Value>) -> Option<bool> {
    match value? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn lenient_order(value: Option<&Value>) -> Option<SortOrder> {
    match value?.as_str()?.to_ascii_lowercase().as_str() {
        "asc" => Some(SortOrder::Asc),
        "desc" => Some(SortOrder::Desc),
        _ => None,
    }
}

fn lenient_list<T: DeserializeOwned>(key: &str, value: Option<&Value>) -> Vec<T> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match serde_json::from_value(item.clone()) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::debug!(key, value = %item, "Ignoring unrecognised filter value");
                None
            }
        })
        .collect()
}
