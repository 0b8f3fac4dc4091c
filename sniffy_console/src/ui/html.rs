//! Embedded console shell and page fragments

use super::state::PageSummary;
use crate::feed::sanitize::Sanitized;
use crate::lifecycle::PageId;
use sniffy_common::OperatorOption;
use std::fmt::Write;

/// Interceptor page body; the feed table keeps its anchor row first
pub fn interceptor_page(
    proxy_server: &Sanitized<String>,
    options: &[(OperatorOption, bool)],
    paused: bool,
) -> String {
    let mut html = String::new();
    let _ = write!(
        html,
        r#"<section class="page interceptor"><div class="toolbar"><span class="ps">Proxy server {}</span>"#,
        &**proxy_server
    );
    let _ = write!(
        html,
        r#"<button id="pause">{}</button><button id="clearrequests">Clear</button><button id="showhideall">Show/hide all</button><button id="newrequest">New request</button><span class="options">"#,
        if paused { "Resume" } else { "Pause" }
    );
    for (option, enabled) in options {
        let _ = write!(
            html,
            r#"<button class="option-toggle{}" data-option="{}">{}</button>"#,
            if *enabled { " on" } else { "" },
            option.as_str(),
            option.label()
        );
    }
    html.push_str(
        r#"</span></div><table id="requests"><tbody><tr id="anchor"><th>Time</th><th>Remote address</th><th>Method</th><th>URL</th></tr></tbody></table></section>"#,
    );
    html
}

pub fn dashboard_page(proxy_server: &Sanitized<String>) -> String {
    format!(
        "<section class=\"page dashboard\"><h2>Dashboard</h2><p>Proxy server {ps}</p><p><a href=\"#!/auditor/interceptor?ps={ps}\">Open the interceptor</a></p></section>",
        ps = &**proxy_server
    )
}

pub fn unknown_page() -> &'static str {
    r##"<section class="page unknown"><p>Nothing here. Try the <a href="#!/auditor/interceptor">interceptor</a>.</p></section>"##
}

/// Fragment for a navigation result
pub fn page_fragment(
    page: &PageSummary,
    proxy_server: &Sanitized<String>,
    options: &[(OperatorOption, bool)],
) -> String {
    match page.page {
        Some(PageId::Interceptor) => interceptor_page(proxy_server, options, page.paused),
        Some(PageId::Dashboard) => dashboard_page(proxy_server),
        None => unknown_page().to_string(),
    }
}

pub const CONSOLE_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Sniffy Console</title>
    <style>
        * { box-sizing: border-box; margin: 0; padding: 0; }
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            background: #fafafa;
            color: #333;
            font-size: 14px;
        }

        /* Header */
        header {
            background: #fff;
            border-bottom: 1px solid #e0e0e0;
            padding: 0.75rem 1rem;
            display: flex;
            gap: 1rem;
            align-items: center;
            position: sticky;
            top: 0;
            z-index: 100;
        }
        h1 { font-size: 1.1rem; font-weight: 600; }
        header nav a { color: #2563eb; text-decoration: none; margin-right: 0.75rem; }
        .ws-dot { width: 8px; height: 8px; border-radius: 50%; background: #ef4444; display: inline-block; }
        .ws-dot.connected { background: #22c55e; }

        main { padding: 1rem; }
        .toolbar { display: flex; gap: 0.5rem; align-items: center; margin-bottom: 0.75rem; flex-wrap: wrap; }
        .toolbar .ps { font-weight: 600; margin-right: 0.5rem; }
        button {
            background: #fff;
            border: 1px solid #d0d0d0;
            padding: 0.35rem 0.7rem;
            border-radius: 4px;
            cursor: pointer;
            font-size: 0.85rem;
        }
        button.on { background: #dbeafe; border-color: #2563eb; }

        /* Feed */
        table#requests { width: 100%; border-collapse: collapse; background: #fff; }
        table#requests th { text-align: left; padding: 0.4rem 0.6rem; border-bottom: 2px solid #e0e0e0; }
        tr.request td { padding: 0.35rem 0.6rem; border-bottom: 1px solid #f0f0f0; cursor: pointer; }
        tr.request:hover { background: #f5f5f5; }
        tr.request.queued { background: #fef3c7; }
        tr.request.fresh { animation: fade 1.5s ease-out; }
        @keyframes fade { from { background: #bbf7d0; } to { background: transparent; } }
        td.url { font-family: 'SF Mono', Monaco, monospace; font-size: 0.8rem; word-break: break-all; }
        tr.detail > td { padding: 0.75rem; background: #f9fafb; }
        .detail-panes { display: flex; gap: 1.5rem; }
        .pane { flex: 1; min-width: 0; }
        .pane h4 { margin-bottom: 0.4rem; }
        .pane h5 { margin: 0.6rem 0 0.3rem; color: #666; }
        table.fields th, table.headers th { text-align: left; padding-right: 1rem; color: #666; font-weight: 500; vertical-align: top; }
        table.headers td { font-family: 'SF Mono', Monaco, monospace; font-size: 0.8rem; word-break: break-all; }

        /* Emulation */
        #modal { position: fixed; inset: 0; background: rgba(0,0,0,0.3); display: none; align-items: flex-start; justify-content: center; padding-top: 5vh; z-index: 200; }
        #modal.open { display: flex; }
        #modal .box { background: #fff; padding: 1rem; border-radius: 6px; width: min(900px, 95vw); max-height: 90vh; overflow: auto; }
        #emulate-form label { display: block; margin: 0.4rem 0; }
        #emulate-form input.wide, #emulate-form textarea { width: 100%; }
        #emulate-form textarea { min-height: 6rem; font-family: monospace; }
        .replay-response { margin-top: 1rem; background: #f5f5f5; padding: 0.75rem; white-space: pre-wrap; }
    </style>
</head>
<body>
    <header>
        <h1>Sniffy</h1>
        <nav>
            <a href="#!/auditor/dashboard">Dashboard</a>
            <a href="#!/auditor/interceptor">Interceptor</a>
        </nav>
        <span class="ws-dot" id="ws-dot"></span>
    </header>
    <main id="page"></main>
    <div id="modal"><div class="box"><button id="modal-close">Close</button><div id="modal-body"></div></div></div>

    <script>
        let generation = 0;
        let ws = null;

        async function post(url, body, type) {
            const opts = { method: 'POST' };
            if (body !== undefined) {
                opts.body = body;
                opts.headers = { 'Content-Type': type || 'application/json' };
            }
            const res = await fetch(url, opts);
            if (!res.ok) {
                const err = await res.json().catch(() => ({ error: `HTTP ${res.status}` }));
                throw new Error(err.error);
            }
            return res.json();
        }

        function anchor() { return document.getElementById('anchor'); }

        function insertRows(placement, rows) {
            const a = anchor();
            if (!a) return;
            for (const row of rows) {
                if (document.getElementById(`tx-${row.id}`)) continue;
                const tmp = document.createElement('tbody');
                tmp.innerHTML = row.html;
                const tr = tmp.firstElementChild;
                if (placement === 'after-anchor') a.after(tr);
                else a.parentElement.appendChild(tr);
                if (row.detail) showDetail(row.id, row.detail, row.detail_visible);
            }
        }

        function showDetail(id, html, visible) {
            let detail = document.getElementById(`detail-${id}`);
            if (!detail && html) {
                const row = document.getElementById(`tx-${id}`);
                if (!row) return;
                const tmp = document.createElement('tbody');
                tmp.innerHTML = html;
                detail = tmp.firstElementChild;
                row.after(detail);
            }
            if (detail) detail.hidden = !visible;
        }

        function clearRows() {
            document.querySelectorAll('table#requests tr:not(#anchor)').forEach(r => r.remove());
        }

        function reloadPrompt(e) {
            console.error(e);
            if (confirm('The console could not load this page. Reload?')) location.reload();
        }

        async function navigate() {
            const hash = location.hash || '#!/auditor/interceptor';
            try {
                const page = await post('/api/navigate', JSON.stringify({ hash }));
                generation = page.generation;
                document.getElementById('page').innerHTML = page.html;
                if (page.page === 'interceptor') {
                    const res = await fetch('/api/feed');
                    if (!res.ok) throw new Error(`HTTP ${res.status}`);
                    const feed = await res.json();
                    insertRows('append', feed.rows);
                }
            } catch (e) { reloadPrompt(e); }
        }

        function openModal(html) {
            document.getElementById('modal-body').innerHTML = html;
            document.getElementById('modal').classList.add('open');
        }

        function closeModal() {
            document.getElementById('modal').classList.remove('open');
            document.getElementById('modal-body').innerHTML = '';
        }

        async function openEmulation(id) {
            try {
                const res = await fetch(id === undefined ? '/api/emulate/new' : `/api/emulate/${id}`);
                if (!res.ok) throw new Error(`HTTP ${res.status}`);
                openModal(await res.text());
            } catch (e) { alert(`Could not open the request builder: ${e.message}`); }
        }

        document.addEventListener('click', async (event) => {
            const t = event.target;
            try {
                if (t.closest('tr.request')) {
                    const id = t.closest('tr.request').dataset.id;
                    const r = await post(`/api/rows/${id}/activate`);
                    if (!r.pending) showDetail(r.id, r.html, r.visible);
                } else if (t.id === 'pause') {
                    const r = await post('/api/feed/pause');
                    t.textContent = r.paused ? 'Resume' : 'Pause';
                } else if (t.id === 'clearrequests') {
                    t.disabled = true;
                    try { await post('/api/feed/clear'); clearRows(); } finally { t.disabled = false; }
                } else if (t.id === 'showhideall') {
                    await post('/api/feed/toggle-all');
                } else if (t.id === 'newrequest') {
                    await openEmulation();
                } else if (t.classList.contains('option-toggle')) {
                    const r = await post(`/api/options/${t.dataset.option}`);
                    t.classList.toggle('on', r.enabled);
                } else if (t.classList.contains('emulate')) {
                    await openEmulation(t.dataset.id);
                } else if (t.classList.contains('add-header')) {
                    const body = document.querySelector('table.header-rows tbody');
                    body.insertAdjacentHTML('beforeend', '<tr><td><input name="header_name"></td><td><input name="header_value" class="wide"></td><td><button type="button" class="remove-header">&times;</button></td></tr>');
                } else if (t.classList.contains('remove-header')) {
                    t.closest('tr').remove();
                } else if (t.id === 'modal-close') {
                    closeModal();
                }
            } catch (e) { alert(e.message); }
        });

        document.addEventListener('submit', async (event) => {
            if (event.target.id !== 'emulate-form') return;
            event.preventDefault();
            const data = new URLSearchParams(new FormData(event.target, event.submitter));
            try {
                const r = await post('/api/emulate', data.toString(), 'application/x-www-form-urlencoded');
                if (r.html) {
                    document.getElementById('modal-body').insertAdjacentHTML('beforeend', r.html);
                } else {
                    closeModal();
                    window.scrollTo(0, 0);
                }
            } catch (e) { alert(`Emulation failed: ${e.message}`); }
        });

        function connect() {
            const protocol = window.location.protocol === 'https:' ? 'wss:' : 'ws:';
            ws = new WebSocket(`${protocol}//${window.location.host}/ws`);
            ws.onopen = () => document.getElementById('ws-dot').classList.add('connected');
            ws.onclose = () => {
                document.getElementById('ws-dot').classList.remove('connected');
                setTimeout(connect, 2000);
            };
            ws.onerror = () => ws.close();
            ws.onmessage = (event) => {
                const msg = JSON.parse(event.data);
                if (msg.data.generation !== generation) return;
                if (msg.type === 'rows') {
                    insertRows(msg.data.placement, msg.data.rows);
                } else if (msg.type === 'detail') {
                    showDetail(msg.data.id, msg.data.html, msg.data.visible);
                } else if (msg.type === 'clear') {
                    clearRows();
                } else if (msg.type === 'state') {
                    const b = document.getElementById('pause');
                    if (b) b.textContent = msg.data.paused ? 'Resume' : 'Pause';
                }
            };
        }

        window.addEventListener('hashchange', navigate);
        connect();
        navigate();
    </script>
</body>
</html>
"##;
