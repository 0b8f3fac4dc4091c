//! Sniffy Common - Wire types for the auditor JSON API
//!
//! This crate contains the transaction model exactly as the auditor emits it,
//! the envelopes returned by its JSON endpoints and the payload format used
//! to submit emulated requests.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Failed to decode auditor payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown operator option: {0}")]
    UnknownOption(String),

    #[error("Unknown submit mode: {0}")]
    UnknownSubmitMode(String),
}

/// Ordered header list; multi-value headers are joined with `,`
pub type Headers = Vec<(String, String)>;

/// One captured request, optionally paired with its response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Server-assigned, monotonic identifier
    #[serde(rename = "Id", default)]
    pub id: i64,

    /// Capture time in unix seconds
    #[serde(rename = "Time", default)]
    pub time: i64,

    /// Request fields are flattened into the transaction object on the wire
    #[serde(flatten)]
    pub request: Request,

    /// Absent when proxying finished before a response was recorded
    #[serde(rename = "Response", default)]
    pub response: Option<Response>,
}

/// Request half of a transaction. Every string here is untrusted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Request {
    #[serde(default)]
    pub method: String,

    #[serde(rename = "URL", default)]
    pub url: RequestUrl,

    #[serde(default)]
    pub proto: String,

    #[serde(with = "header_map", default)]
    pub header: Headers,

    #[serde(default)]
    pub content_length: i64,

    #[serde(default)]
    pub transfer_encoding: Option<Vec<String>>,

    #[serde(default)]
    pub host: String,

    #[serde(default)]
    pub remote_addr: String,

    #[serde(rename = "TLSHandshakeDone", default)]
    pub tls: bool,
}

/// Request URL in raw and parsed form
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestUrl {
    #[serde(default)]
    pub raw: String,
    #[serde(default)]
    pub scheme: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub raw_query: String,
    #[serde(default)]
    pub fragment: String,
}

impl RequestUrl {
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            ..Self::default()
        }
    }

    /// Normalized form: the raw string when present, otherwise rebuilt from parts
    pub fn normalized(&self) -> String {
        if !self.raw.is_empty() {
            return self.raw.clone();
        }

        let mut out = String::new();
        if !self.scheme.is_empty() {
            out.push_str(&self.scheme);
            out.push_str("://");
        }
        out.push_str(&self.host);
        out.push_str(&self.path);
        if !self.raw_query.is_empty() {
            out.push('?');
            out.push_str(&self.raw_query);
        }
        if !self.fragment.is_empty() {
            out.push('#');
            out.push_str(&self.fragment);
        }
        out
    }
}

/// Response half of a transaction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Response {
    #[serde(default)]
    pub id: i64,

    #[serde(default)]
    pub time: i64,

    /// Full status line, e.g. "200 OK"
    #[serde(default)]
    pub status: String,

    #[serde(default)]
    pub status_code: u16,

    #[serde(default)]
    pub proto: String,

    #[serde(with = "header_map", default)]
    pub header: Headers,

    #[serde(default)]
    pub content_length: i64,

    #[serde(default)]
    pub transfer_encoding: Option<Vec<String>>,

    #[serde(rename = "Close", default)]
    pub closed: bool,
}

/// Envelope returned by the summary endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionBatch {
    /// Cursor to use for the next poll; authoritative
    pub since: i64,

    #[serde(rename = "rs", default, deserialize_with = "nullable::deserialize")]
    pub transactions: Vec<Transaction>,

    /// Transactions held in the moderation queue
    #[serde(rename = "queue", default, deserialize_with = "nullable::deserialize")]
    pub queued_ids: Vec<i64>,
}

impl TransactionBatch {
    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

/// Envelope returned by the detail endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionDetail {
    #[serde(rename = "r", default)]
    pub transaction: Option<Transaction>,
}

impl TransactionDetail {
    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(s)?)
    }
}

/// Named boolean settings of a proxy server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatorOption {
    #[serde(rename = "logrequests")]
    LogRequests,
    #[serde(rename = "interceptssl")]
    InterceptTls,
    #[serde(rename = "moderaterequests")]
    ModerateRequests,
}

impl OperatorOption {
    pub const ALL: [OperatorOption; 3] = [
        OperatorOption::LogRequests,
        OperatorOption::InterceptTls,
        OperatorOption::ModerateRequests,
    ];

    /// Name used by the toggle endpoint
    pub fn as_str(&self) -> &'static str {
        match self {
            OperatorOption::LogRequests => "logrequests",
            OperatorOption::InterceptTls => "interceptssl",
            OperatorOption::ModerateRequests => "moderaterequests",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            OperatorOption::LogRequests => "Log requests",
            OperatorOption::InterceptTls => "Intercept TLS",
            OperatorOption::ModerateRequests => "Moderate requests",
        }
    }
}

impl fmt::Display for OperatorOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperatorOption {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "logrequests" | "log-requests" => Ok(OperatorOption::LogRequests),
            "interceptssl" | "intercept-tls" | "intercepttls" => Ok(OperatorOption::InterceptTls),
            "moderaterequests" | "moderate-requests" => Ok(OperatorOption::ModerateRequests),
            other => Err(ProtocolError::UnknownOption(other.to_string())),
        }
    }
}

/// How the replay boundary should handle an emulated request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitMode {
    /// Fire-and-forget send
    Emulate,
    /// Send and surface the response to the operator
    View,
}

impl SubmitMode {
    /// Form field that marks which submit button was used
    pub fn field_name(&self) -> &'static str {
        match self {
            SubmitMode::Emulate => "submitemulate",
            SubmitMode::View => "submitview",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SubmitMode::Emulate => "Emulate",
            SubmitMode::View => "View",
        }
    }
}

impl FromStr for SubmitMode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "emulate" | "submitemulate" => Ok(SubmitMode::Emulate),
            "view" | "submitview" => Ok(SubmitMode::View),
            other => Err(ProtocolError::UnknownSubmitMode(other.to_string())),
        }
    }
}

/// Urlencoded form payload for the replay endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmulationPayload {
    fields: Vec<(String, String)>,
}

impl EmulationPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    /// Add a header field; the prefix lets the boundary tell headers from top-level fields
    pub fn push_header(&mut self, name: &str, value: impl Into<String>) {
        self.fields
            .push((format!("{}{}", constants::HEADER_FIELD_PREFIX, name), value.into()));
    }

    /// First value of a top-level field
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Header fields with the prefix stripped, in submission order
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().filter_map(|(k, v)| {
            k.strip_prefix(constants::HEADER_FIELD_PREFIX)
                .map(|name| (name, v.as_str()))
        })
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }
}

/// `name -> [values]` JSON objects as an ordered, flattened header list
mod header_map {
    use super::Headers;
    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::fmt;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum HeaderValue {
        One(String),
        Many(Vec<String>),
    }

    pub fn serialize<S>(headers: &Headers, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(headers.len()))?;
        for (name, value) in headers {
            map.serialize_entry(name, &[value])?;
        }
        map.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Headers, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct HeaderVisitor;

        impl<'de> Visitor<'de> for HeaderVisitor {
            type Value = Headers;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a header object or null")
            }

            fn visit_unit<E>(self) -> Result<Headers, E> {
                Ok(Vec::new())
            }

            fn visit_none<E>(self) -> Result<Headers, E> {
                Ok(Vec::new())
            }

            fn visit_some<D>(self, deserializer: D) -> Result<Headers, D::Error>
            where
                D: Deserializer<'de>,
            {
                deserializer.deserialize_map(self)
            }

            fn visit_map<A>(self, mut access: A) -> Result<Headers, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut headers = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, value)) = access.next_entry::<String, HeaderValue>()? {
                    let joined = match value {
                        HeaderValue::One(v) => v,
                        HeaderValue::Many(vs) => vs.join(","),
                    };
                    headers.push((name, joined));
                }
                Ok(headers)
            }
        }

        deserializer.deserialize_option(HeaderVisitor)
    }
}

/// Treats an explicit JSON `null` like a missing field
mod nullable {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de> + Default,
    {
        Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
    }
}

/// Constants for the auditor protocol
pub mod constants {
    /// Summary feed endpoint
    pub const GET_REQUESTS_PATH: &str = "/auditor/json/getrequests";

    /// Full transaction endpoint
    pub const GET_REQUEST_PATH: &str = "/auditor/json/getrequest";

    /// Replay endpoint
    pub const MAKE_REQUEST_PATH: &str = "/auditor/json/makerequest";

    /// Transaction log wipe endpoint
    pub const DELETE_REQUESTS_PATH: &str = "/auditor/json/deleterequests";

    /// Operator option toggle endpoint
    pub const TOGGLE_PATH: &str = "/auditor/json/toggle";

    /// Prefix that marks a header row in an emulation payload
    pub const HEADER_FIELD_PREFIX: &str = "HEADER:";

    /// Method select value that defers to the free-text override
    pub const CUSTOM_METHOD: &str = "custom";

    /// Cursor used for the first poll of a feed view
    pub const INITIAL_SINCE: i64 = 0;

    /// Default delay between polls
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

    /// Status shown when no response was recorded for a transaction
    pub const NO_RESPONSE_STATUS: &str = "No response recorded";

    /// Sentinel for response fields that have no value
    pub const NOT_AVAILABLE: &str = "N/A";
}
