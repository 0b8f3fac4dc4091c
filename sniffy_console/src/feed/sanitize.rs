//! HTML escaping of captured traffic
//!
//! Everything the auditor reports came off the wire and is attacker
//! controlled. The only way to obtain a [`Sanitized`] value is through
//! [`Sanitize::sanitize`], and the renderer only accepts `&Sanitized<_>`, so
//! unescaped data cannot reach a template and escaped data cannot be escaped
//! a second time.

use super::detail::{DetailView, ResponseView};
use super::render::SummaryView;
use crate::emulate::{EmulationForm, HeaderRow, MethodChoice};
use sniffy_common::{Headers, Request, RequestUrl, Response, Transaction};
use std::ops::Deref;

/// Escape the characters that are significant in HTML text and attributes.
///
/// Single pass over the input: an `&` produced by an entity is never
/// revisited. Not idempotent, `&lt;` becomes `&amp;lt;`.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '/' => out.push_str("&#x2F;"),
            c => out.push(c),
        }
    }
    out
}

/// A value whose every string field has been escaped exactly once
#[derive(Debug, Clone, PartialEq)]
pub struct Sanitized<T>(T);

impl<T> Sanitized<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for Sanitized<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

pub trait Sanitize: Sized {
    fn sanitize(self) -> Sanitized<Self>;
}

impl Sanitize for String {
    fn sanitize(self) -> Sanitized<Self> {
        Sanitized(escape(&self))
    }
}

impl Sanitize for Transaction {
    fn sanitize(mut self) -> Sanitized<Self> {
        escape_request(&mut self.request);
        if let Some(response) = self.response.as_mut() {
            escape_response(response);
        }
        Sanitized(self)
    }
}

impl Sanitize for SummaryView {
    fn sanitize(mut self) -> Sanitized<Self> {
        escape_in_place(&mut self.remote_addr);
        escape_in_place(&mut self.method);
        escape_in_place(&mut self.url);
        Sanitized(self)
    }
}

impl Sanitize for DetailView {
    fn sanitize(self) -> Sanitized<Self> {
        let DetailView {
            transaction,
            mut params,
            mut response,
        } = self;

        escape_headers(&mut params);
        escape_response_view(&mut response);

        Sanitized(DetailView {
            transaction: transaction.sanitize().into_inner(),
            params,
            response,
        })
    }
}

impl Sanitize for EmulationForm {
    fn sanitize(mut self) -> Sanitized<Self> {
        match &mut self.method {
            MethodChoice::Standard(m) | MethodChoice::Custom(m) => escape_in_place(m),
        }
        escape_in_place(&mut self.url);
        escape_in_place(&mut self.proto);
        escape_in_place(&mut self.host);
        escape_in_place(&mut self.body);
        for HeaderRow { name, value } in &mut self.headers {
            escape_in_place(name);
            escape_in_place(value);
        }
        Sanitized(self)
    }
}

fn escape_in_place(s: &mut String) {
    *s = escape(s);
}

fn escape_headers(headers: &mut Headers) {
    for (name, value) in headers.iter_mut() {
        escape_in_place(name);
        escape_in_place(value);
    }
}

fn escape_tokens(tokens: &mut Option<Vec<String>>) {
    if let Some(tokens) = tokens.as_mut() {
        tokens.iter_mut().for_each(escape_in_place);
    }
}

fn escape_url(url: &mut RequestUrl) {
    escape_in_place(&mut url.raw);
    escape_in_place(&mut url.scheme);
    escape_in_place(&mut url.host);
    escape_in_place(&mut url.path);
    escape_in_place(&mut url.raw_query);
    escape_in_place(&mut url.fragment);
}

fn escape_request(request: &mut Request) {
    escape_in_place(&mut request.method);
    escape_url(&mut request.url);
    escape_in_place(&mut request.proto);
    escape_headers(&mut request.header);
    escape_tokens(&mut request.transfer_encoding);
    escape_in_place(&mut request.host);
    escape_in_place(&mut request.remote_addr);
}

fn escape_response(response: &mut Response) {
    escape_in_place(&mut response.status);
    escape_in_place(&mut response.proto);
    escape_headers(&mut response.header);
    escape_tokens(&mut response.transfer_encoding);
}

fn escape_response_view(view: &mut ResponseView) {
    escape_in_place(&mut view.id);
    escape_in_place(&mut view.status);
    escape_in_place(&mut view.proto);
    escape_headers(&mut view.header);
    escape_in_place(&mut view.content_length);
    escape_tokens(&mut view.transfer_encoding);
    escape_in_place(&mut view.closed);
}
