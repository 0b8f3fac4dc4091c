//! Emulation builder: an editable copy of a captured request that can be
//! replayed through the proxy server.

use crate::api::{ApiError, AuditorApi};
use sniffy_common::{constants, EmulationPayload, SubmitMode, Transaction};

/// Methods offered in the method selector; anything else is a custom method
pub const STANDARD_METHODS: [&str; 9] = [
    "HEAD", "GET", "POST", "PUT", "DELETE", "TRACE", "OPTIONS", "CONNECT", "PATCH",
];

const DEFAULT_METHOD: &str = "GET";
const DEFAULT_PROTO: &str = "HTTP/1.1";

/// Errors turning a browser submission into a form
#[derive(Debug, thiserror::Error)]
pub enum EmulationError {
    #[error("Missing form field: {0}")]
    MissingField(&'static str),

    #[error("Custom method selected but no method given")]
    EmptyCustomMethod,

    #[error("No submit action in form")]
    MissingSubmitMode,

    #[error("Invalid source transaction id: {0}")]
    InvalidSource(String),
}

/// Method selector state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodChoice {
    Standard(String),
    Custom(String),
}

impl MethodChoice {
    /// Pick the selector entry for a method, falling back to the free-text override
    pub fn for_method(method: &str) -> Self {
        let upper = method.to_ascii_uppercase();
        if STANDARD_METHODS.contains(&upper.as_str()) {
            MethodChoice::Standard(upper)
        } else {
            MethodChoice::Custom(method.to_string())
        }
    }

    /// The method that will actually be sent
    pub fn effective(&self) -> &str {
        match self {
            MethodChoice::Standard(m) | MethodChoice::Custom(m) => m,
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, MethodChoice::Custom(_))
    }
}

/// One editable header row
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HeaderRow {
    pub name: String,
    pub value: String,
}

/// Editable request representation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmulationForm {
    /// Transaction this form was built from; 0 for a blank request
    pub source_id: i64,
    pub method: MethodChoice,
    pub url: String,
    pub proto: String,
    pub headers: Vec<HeaderRow>,
    pub host: String,
    pub body: String,
}

impl EmulationForm {
    /// Blank template for a new request
    pub fn blank() -> Self {
        Self {
            source_id: 0,
            method: MethodChoice::Standard(DEFAULT_METHOD.to_string()),
            url: String::new(),
            proto: DEFAULT_PROTO.to_string(),
            headers: Vec::new(),
            host: String::new(),
            body: String::new(),
        }
    }

    /// Pre-populate from a captured transaction
    pub fn from_transaction(tx: &Transaction) -> Self {
        let request = &tx.request;
        let mut form = Self {
            source_id: tx.id,
            method: MethodChoice::for_method(&request.method),
            url: request.url.normalized(),
            proto: request.proto.clone(),
            headers: Vec::with_capacity(request.header.len()),
            host: request.host.clone(),
            body: String::new(),
        };
        for (name, value) in &request.header {
            form.add_header_row(name.as_str(), value.as_str());
        }
        form
    }

    pub fn add_header_row(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push(HeaderRow {
            name: name.into(),
            value: value.into(),
        });
    }

    /// Build the replay payload. Header rows with an empty name are dropped.
    pub fn payload(&self, mode: SubmitMode) -> EmulationPayload {
        let mut payload = EmulationPayload::new();

        match &self.method {
            MethodChoice::Standard(method) => {
                payload.push("method", method.as_str());
                payload.push("methodcustom", "");
            }
            MethodChoice::Custom(method) => {
                payload.push("method", constants::CUSTOM_METHOD);
                payload.push("methodcustom", method.as_str());
            }
        }
        payload.push("url", self.url.as_str());
        payload.push("proto", self.proto.as_str());
        payload.push("host", self.host.as_str());
        payload.push("body", self.body.as_str());
        payload.push("emulate", self.source_id.to_string());
        payload.push(mode.field_name(), mode.label());

        for row in self.headers.iter().filter(|row| !row.name.is_empty()) {
            payload.push_header(&row.name, row.value.as_str());
        }

        payload
    }

    /// Parse a browser submission of the rendered form.
    ///
    /// Header rows arrive as repeated `header_name` / `header_value` pairs in
    /// document order; the submit button name selects the mode.
    pub fn from_submission(fields: &[(String, String)]) -> Result<(Self, SubmitMode), EmulationError> {
        let field = |name: &'static str| {
            fields
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        };

        let selected = field("method").ok_or(EmulationError::MissingField("method"))?;
        let method = if selected == constants::CUSTOM_METHOD {
            let custom = field("methodcustom").unwrap_or_default();
            let custom = custom.trim();
            if custom.is_empty() {
                return Err(EmulationError::EmptyCustomMethod);
            }
            MethodChoice::Custom(custom.to_string())
        } else {
            MethodChoice::for_method(&selected)
        };

        let source_id = match field("emulate") {
            Some(raw) if !raw.is_empty() => raw
                .parse()
                .map_err(|_| EmulationError::InvalidSource(raw.clone()))?,
            _ => 0,
        };

        let mode = [SubmitMode::View, SubmitMode::Emulate]
            .into_iter()
            .find(|mode| fields.iter().any(|(k, _)| k == mode.field_name()))
            .ok_or(EmulationError::MissingSubmitMode)?;

        let mut form = Self {
            source_id,
            method,
            url: field("url").ok_or(EmulationError::MissingField("url"))?,
            proto: field("proto").unwrap_or_else(|| DEFAULT_PROTO.to_string()),
            headers: Vec::new(),
            host: field("host").unwrap_or_default(),
            body: field("body").unwrap_or_default(),
        };

        let mut pending_name: Option<&str> = None;
        for (key, value) in fields {
            match key.as_str() {
                "header_name" => pending_name = Some(value),
                "header_value" => {
                    if let Some(name) = pending_name.take() {
                        form.add_header_row(name, value.as_str());
                    }
                }
                _ => {}
            }
        }

        Ok((form, mode))
    }
}

/// Result of a replay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmulationOutcome {
    pub mode: SubmitMode,
    /// Raw response body, only kept for `SubmitMode::View`
    pub response: Option<String>,
}

/// Submit a form to the replay boundary for the given proxy server
pub async fn submit(
    api: &dyn AuditorApi,
    proxy_server: &str,
    form: &EmulationForm,
    mode: SubmitMode,
) -> Result<EmulationOutcome, ApiError> {
    let payload = form.payload(mode);
    let body = api.submit(proxy_server, &payload).await?;

    tracing::info!(
        "Replayed {} {} via proxy server {} ({:?})",
        form.method.effective(),
        form.url,
        proxy_server,
        mode
    );

    Ok(EmulationOutcome {
        mode,
        response: match mode {
            SubmitMode::View => Some(body),
            SubmitMode::Emulate => None,
        },
    })
}
