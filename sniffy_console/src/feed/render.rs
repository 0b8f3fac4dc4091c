//! HTML fragments for feed rows, details and the emulation form
//!
//! Every public function here takes a [`Sanitized`] value; the private
//! helpers are only reached with fields of one.

use super::detail::{DetailView, ResponseView};
use super::sanitize::Sanitized;
use crate::emulate::{EmulationForm, STANDARD_METHODS};
use chrono::{DateTime, Local};
use sniffy_common::{constants, Headers, Transaction};
use std::fmt::Write;

/// Longest URL shown in a summary row before it is cut
pub const URL_DISPLAY_LIMIT: usize = 100;

/// What a summary row shows of a transaction
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryView {
    pub id: i64,
    pub time: i64,
    pub remote_addr: String,
    pub method: String,
    /// Normalized URL, truncated to [`URL_DISPLAY_LIMIT`]
    pub url: String,
}

impl SummaryView {
    pub fn new(tx: &Transaction) -> Self {
        Self {
            id: tx.id,
            time: tx.time,
            remote_addr: tx.request.remote_addr.clone(),
            method: tx.request.method.clone(),
            url: truncate(&tx.request.url.normalized(), URL_DISPLAY_LIMIT),
        }
    }
}

/// Presentation flags of a summary row
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowFlags {
    /// Held in the moderation queue
    pub queued: bool,
    /// Arrived after the initial load; gets a short highlight
    pub fresh: bool,
}

/// Cut on a char boundary, keeping `limit - 1` chars plus an ellipsis
fn truncate(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        return s.to_string();
    }
    let mut out: String = s.chars().take(limit - 1).collect();
    out.push_str("...");
    out
}

/// Wall-clock time of the operator's machine
fn clock_time(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .map(|t| t.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| secs.to_string())
}

fn full_time(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| secs.to_string())
}

pub fn summary_row(view: &Sanitized<SummaryView>, flags: RowFlags) -> String {
    let mut class = String::from("request");
    if flags.queued {
        class.push_str(" queued");
    }
    if flags.fresh {
        class.push_str(" fresh");
    }

    format!(
        r#"<tr class="{class}" id="tx-{id}" data-id="{id}"><td class="time">{time}</td><td>{remote}</td><td class="method">{method}</td><td class="url">{url}</td></tr>"#,
        class = class,
        id = view.id,
        time = clock_time(view.time),
        remote = view.remote_addr,
        method = view.method,
        url = view.url,
    )
}

pub fn detail_row(view: &Sanitized<DetailView>) -> String {
    let tx = &view.transaction;
    let request = &tx.request;

    let mut html = String::new();
    let _ = write!(
        html,
        r#"<tr class="detail" id="detail-{id}"><td colspan="4"><div class="detail-panes"><div class="pane"><h4>Request {id}</h4><table class="fields">"#,
        id = tx.id
    );
    field(&mut html, "Time", &full_time(tx.time));
    field(&mut html, "Method", &request.method);
    field(&mut html, "URL", &request.url.raw);
    field(&mut html, "Protocol", &request.proto);
    field(&mut html, "Host", &request.host);
    field(&mut html, "Remote address", &request.remote_addr);
    field(&mut html, "Content length", &request.content_length.to_string());
    field(
        &mut html,
        "Transfer encoding",
        &encoding_list(request.transfer_encoding.as_deref()),
    );
    field(&mut html, "TLS", if request.tls { "yes" } else { "no" });
    html.push_str("</table>");

    html.push_str("<h5>Headers</h5>");
    html.push_str(&headers_table(&request.header));
    if !view.params.is_empty() {
        html.push_str("<h5>Query parameters</h5>");
        html.push_str(&headers_table(&view.params));
    }
    html.push_str("</div>");

    response_pane(&mut html, &view.response);

    let _ = write!(
        html,
        r#"</div><button type="button" class="emulate" data-id="{}">Emulate</button></td></tr>"#,
        tx.id
    );
    html
}

fn response_pane(html: &mut String, response: &ResponseView) {
    let _ = write!(
        html,
        r#"<div class="pane"><h4>Response {}</h4><table class="fields">"#,
        response.id
    );
    if let Some(time) = response.time {
        field(html, "Time", &full_time(time));
    }
    field(html, "Status", &response.status);
    field(html, "Status code", &response.status_code.to_string());
    field(html, "Protocol", &response.proto);
    field(html, "Content length", &response.content_length);
    field(
        html,
        "Transfer encoding",
        &encoding_list(response.transfer_encoding.as_deref()),
    );
    field(html, "Closed", &response.closed);
    html.push_str("</table>");

    if !response.header.is_empty() {
        html.push_str("<h5>Headers</h5>");
        html.push_str(&headers_table(&response.header));
    }
    html.push_str("</div>");
}

fn field(html: &mut String, name: &str, value: &str) {
    let _ = write!(html, "<tr><th>{}</th><td>{}</td></tr>", name, value);
}

fn headers_table(headers: &Headers) -> String {
    let mut html = String::from(r#"<table class="headers">"#);
    for (name, value) in headers {
        let _ = write!(html, "<tr><th>{}</th><td>{}</td></tr>", name, value);
    }
    html.push_str("</table>");
    html
}

fn encoding_list(tokens: Option<&[String]>) -> String {
    match tokens {
        Some(tokens) if !tokens.is_empty() => tokens.join(", "),
        _ => String::new(),
    }
}

/// Editable request form; header rows submit as `header_name` / `header_value`
pub fn emulation_form(form: &Sanitized<EmulationForm>) -> String {
    let mut html = String::new();
    let _ = write!(
        html,
        r#"<form id="emulate-form" method="post" action="/api/emulate"><input type="hidden" name="emulate" value="{}"><label>Method <select name="method">"#,
        form.source_id
    );

    let selected = form.method.effective();
    for method in STANDARD_METHODS {
        let mark = if !form.method.is_custom() && method == selected {
            " selected"
        } else {
            ""
        };
        let _ = write!(html, r#"<option value="{0}"{1}>{0}</option>"#, method, mark);
    }
    let custom = if form.method.is_custom() { selected } else { "" };
    let _ = write!(
        html,
        r#"<option value="{}"{}>Custom</option></select></label> <input name="methodcustom" placeholder="Custom method" value="{}">"#,
        constants::CUSTOM_METHOD,
        if form.method.is_custom() { " selected" } else { "" },
        custom
    );

    let _ = write!(
        html,
        r#"<label>URL <input name="url" class="wide" value="{}"></label><label>Protocol <input name="proto" value="{}"></label>"#,
        form.url, form.proto
    );

    html.push_str(r#"<table class="header-rows"><tbody>"#);
    for row in &form.headers {
        let _ = write!(
            html,
            r#"<tr><td><input name="header_name" value="{}"></td><td><input name="header_value" class="wide" value="{}"></td><td><button type="button" class="remove-header">&times;</button></td></tr>"#,
            row.name, row.value
        );
    }
    html.push_str(r#"</tbody></table><button type="button" class="add-header">Add header</button>"#);

    let _ = write!(
        html,
        r#"<label>Host <input name="host" value="{}"></label><label>Body <textarea name="body">{}</textarea></label>"#,
        form.host, form.body
    );
    html.push_str(
        r#"<div class="actions"><input type="submit" name="submitemulate" value="Emulate"> <input type="submit" name="submitview" value="View"></div></form>"#,
    );
    html
}

/// Response body of a replay in view mode
pub fn replay_response(body: &Sanitized<String>) -> String {
    format!(r#"<pre class="replay-response">{}</pre>"#, &**body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::memory::transaction;
    use crate::feed::sanitize::Sanitize;
    use chrono::TimeZone;
    use sniffy_common::{RequestUrl, Response};

    #[test]
    fn test_truncate() {
        let long = "a".repeat(150);
        let cut = truncate(&long, URL_DISPLAY_LIMIT);
        assert_eq!(cut.len(), 102);
        assert!(cut.ends_with("..."));
        assert_eq!(truncate("short", URL_DISPLAY_LIMIT), "short");
        assert_eq!(truncate(&"é".repeat(100), URL_DISPLAY_LIMIT).chars().count(), 100);
    }

    #[test]
    fn test_summary_row() {
        let tx = transaction(7, 3661);
        let row = summary_row(
            &SummaryView::new(&tx).sanitize(),
            RowFlags {
                queued: true,
                fresh: false,
            },
        );

        assert!(row.starts_with(r#"<tr class="request queued" id="tx-7""#));
        let local = DateTime::from_timestamp(3661, 0)
            .unwrap()
            .with_timezone(&Local)
            .format("%H:%M:%S")
            .to_string();
        assert!(row.contains(&format!("<td class=\"time\">{}</td>", local)));
        assert!(row.contains("http:&#x2F;&#x2F;example.com&#x2F;7"));
    }

    #[test]
    fn test_clock_time_is_local() {
        let expected = Local
            .timestamp_opt(86_399, 0)
            .single()
            .unwrap()
            .format("%H:%M:%S")
            .to_string();
        assert_eq!(clock_time(86_399), expected);
        assert!(full_time(86_399).ends_with("23:59:59 UTC"));
        assert_eq!(clock_time(i64::MAX), i64::MAX.to_string());
    }

    #[test]
    fn test_summary_truncates_before_escaping() {
        let mut tx = transaction(1, 0);
        tx.request.url = RequestUrl::from_raw(format!("http://h/{}", "<".repeat(200)));

        let view = SummaryView::new(&tx);
        assert_eq!(view.url.chars().count(), 102);

        let row = summary_row(&view.sanitize(), RowFlags::default());
        assert!(!row.contains("&amp;lt;"));
        assert!(!row.contains("<<"));
    }

    #[test]
    fn test_detail_row_with_response() {
        let mut tx = transaction(4, 0);
        tx.request.url = RequestUrl::from_raw("http://example.com/s?q=rust&page=2");
        tx.request.header = vec![("Accept".to_string(), "text/html".to_string())];
        tx.response = Some(Response {
            id: 4,
            status: "200 OK".to_string(),
            status_code: 200,
            proto: "HTTP/1.1".to_string(),
            header: vec![("Server".to_string(), "<evil>".to_string())],
            ..Response::default()
        });

        let html = detail_row(&DetailView::new(tx).sanitize());
        assert!(html.starts_with(r#"<tr class="detail" id="detail-4">"#));
        assert!(html.contains("<th>Accept</th><td>text&#x2F;html</td>"));
        assert!(html.contains("Query parameters"));
        assert!(html.contains("<th>page</th><td>2</td>"));
        assert!(html.contains("<th>Status code</th><td>200</td>"));
        assert!(html.contains("&lt;evil&gt;"));
        assert!(!html.contains("<evil>"));
        assert!(html.contains(r#"class="emulate" data-id="4""#));
    }

    #[test]
    fn test_detail_row_placeholder() {
        let html = detail_row(&DetailView::new(transaction(2, 0)).sanitize());
        assert!(html.contains("<th>Status</th><td>No response recorded</td>"));
        assert!(html.contains("<th>Status code</th><td>0</td>"));
        assert!(html.contains("<th>Closed</th><td>N&#x2F;A</td>"));
        assert!(!html.contains("Query parameters"));
    }

    #[test]
    fn test_emulation_form_custom_method() {
        let mut form = EmulationForm::blank();
        form.method = crate::emulate::MethodChoice::Custom("PURGE".to_string());
        form.add_header_row("X-A", "\"quoted\"");

        let html = emulation_form(&form.sanitize());
        assert!(html.contains(r#"<option value="custom" selected>Custom</option>"#));
        assert!(html.contains(r#"name="methodcustom" placeholder="Custom method" value="PURGE""#));
        assert!(html.contains(r#"value="&quot;quoted&quot;""#));
        assert!(!html.contains(r#"<option value="GET" selected>"#));
    }

    #[test]
    fn test_emulation_form_standard_method() {
        let html = emulation_form(&EmulationForm::blank().sanitize());
        assert!(html.contains(r#"<option value="GET" selected>GET</option>"#));
        assert!(html.contains(r#"name="submitview""#));
        assert!(html.contains(r#"name="emulate" value="0""#));
    }
}
