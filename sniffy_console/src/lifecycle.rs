//! Page lifecycle: constructors keyed by page, teardowns owned by the visit
//!
//! Every navigation drains the teardowns registered by the previous page,
//! then runs the universal constructors followed by the constructors of the
//! page the hash resolves to.

use crate::feed::poll::PollHandle;
use crate::feed::FeedView;
use std::collections::HashMap;
use std::sync::Arc;
use url::form_urlencoded;

/// Logical pages of the console
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageId {
    Dashboard,
    Interceptor,
}

impl PageId {
    pub fn from_path(path: &str) -> Option<Self> {
        match path.trim_end_matches('/') {
            "/auditor/dashboard" => Some(PageId::Dashboard),
            "/auditor/interceptor" => Some(PageId::Interceptor),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PageId::Dashboard => "dashboard",
            PageId::Interceptor => "interceptor",
        }
    }
}

/// Parsed navigation hash, e.g. `#!/auditor/interceptor?ps=2`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub path: String,
    pub proxy_server: Option<String>,
}

impl Navigation {
    pub fn parse(hash: &str) -> Self {
        let hash = hash.trim_start_matches('#').trim_start_matches('!');
        let (path, query) = match hash.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (hash, None),
        };

        let proxy_server = query.and_then(|query| {
            form_urlencoded::parse(query.as_bytes())
                .find(|(k, _)| k == "ps")
                .map(|(_, v)| v.into_owned())
                .filter(|v| !v.is_empty())
        });

        Self {
            path: path.to_string(),
            proxy_server,
        }
    }

    pub fn page(&self) -> Option<PageId> {
        PageId::from_path(&self.path)
    }
}

type Teardown = Box<dyn FnOnce() + Send>;

/// Page constructor
pub type Constructor = Box<dyn Fn(&mut PageContext) + Send + Sync>;

/// State owned by the current page visit
pub struct PageContext {
    pub page: Option<PageId>,
    pub proxy_server: String,
    pub generation: u64,
    pub feed: Option<Arc<FeedView>>,
    pub poller: Option<PollHandle>,
    teardowns: Vec<Teardown>,
}

impl PageContext {
    fn new(page: Option<PageId>, proxy_server: String, generation: u64) -> Self {
        Self {
            page,
            proxy_server,
            generation,
            feed: None,
            poller: None,
            teardowns: Vec::new(),
        }
    }

    /// Run `f` when the operator leaves this page
    pub fn on_teardown(&mut self, f: impl FnOnce() + Send + 'static) {
        self.teardowns.push(Box::new(f));
    }

    fn teardown(&mut self) {
        let count = self.teardowns.len();
        for f in self.teardowns.drain(..) {
            f();
        }
        if count > 0 {
            tracing::debug!(
                "Ran {} teardowns for {:?}",
                count,
                self.page.map(|p| p.as_str())
            );
        }
    }
}

/// Registry of constructors and owner of the current page context
pub struct LifecycleManager {
    universal: Vec<Constructor>,
    pages: HashMap<PageId, Vec<Constructor>>,
    current: Option<PageContext>,
    generation: u64,
    default_proxy_server: String,
}

impl LifecycleManager {
    pub fn new(default_proxy_server: impl Into<String>) -> Self {
        Self {
            universal: Vec::new(),
            pages: HashMap::new(),
            current: None,
            generation: 0,
            default_proxy_server: default_proxy_server.into(),
        }
    }

    /// Constructor run on every navigation
    pub fn add_universal(&mut self, f: impl Fn(&mut PageContext) + Send + Sync + 'static) {
        self.universal.push(Box::new(f));
    }

    pub fn add_constructor(
        &mut self,
        page: PageId,
        f: impl Fn(&mut PageContext) + Send + Sync + 'static,
    ) {
        self.pages.entry(page).or_default().push(Box::new(f));
    }

    /// Leave the current page and build the one `hash` points at
    pub fn navigate(&mut self, hash: &str) -> &PageContext {
        self.leave();

        let nav = Navigation::parse(hash);
        let page = nav.page();
        if page.is_none() {
            tracing::debug!("No page registered for {}", nav.path);
        }

        self.generation += 1;
        let proxy_server = nav
            .proxy_server
            .unwrap_or_else(|| self.default_proxy_server.clone());
        let mut ctx = PageContext::new(page, proxy_server, self.generation);

        for f in &self.universal {
            f(&mut ctx);
        }
        if let Some(constructors) = page.and_then(|p| self.pages.get(&p)) {
            for f in constructors {
                f(&mut ctx);
            }
        }

        self.current.insert(ctx)
    }

    /// Run the current page's teardowns and drop its context
    pub fn leave(&mut self) {
        if let Some(mut ctx) = self.current.take() {
            ctx.teardown();
        }
    }

    pub fn current(&self) -> Option<&PageContext> {
        self.current.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn record(log: &Log, entry: impl Into<String>) {
        log.lock().unwrap().push(entry.into());
    }

    fn manager(log: &Log) -> LifecycleManager {
        let mut lm = LifecycleManager::new("1");

        let l = log.clone();
        lm.add_universal(move |ctx| {
            record(&l, format!("universal:{}", ctx.generation));
            let l = l.clone();
            ctx.on_teardown(move || record(&l, "universal-down"));
        });

        let l = log.clone();
        lm.add_constructor(PageId::Interceptor, move |ctx| {
            record(&l, format!("interceptor:{}", ctx.proxy_server));
            let l1 = l.clone();
            ctx.on_teardown(move || record(&l1, "down-1"));
            let l2 = l.clone();
            ctx.on_teardown(move || record(&l2, "down-2"));
        });

        let l = log.clone();
        lm.add_constructor(PageId::Interceptor, move |_| record(&l, "interceptor-second"));

        let l = log.clone();
        lm.add_constructor(PageId::Dashboard, move |_| record(&l, "dashboard"));

        lm
    }

    #[test]
    fn test_navigation_parse() {
        let nav = Navigation::parse("#!/auditor/interceptor?ps=3");
        assert_eq!(nav.path, "/auditor/interceptor");
        assert_eq!(nav.proxy_server.as_deref(), Some("3"));
        assert_eq!(nav.page(), Some(PageId::Interceptor));

        let nav = Navigation::parse("/auditor/dashboard");
        assert_eq!(nav.page(), Some(PageId::Dashboard));
        assert!(nav.proxy_server.is_none());

        assert_eq!(Navigation::parse("#!/auditor/nowhere?ps=").page(), None);
        assert!(Navigation::parse("#!/x?ps=").proxy_server.is_none());
    }

    #[test]
    fn test_navigation_decodes_proxy_server() {
        let nav = Navigation::parse("#!/auditor/interceptor?foo=1&ps=a%20b");
        assert_eq!(nav.proxy_server.as_deref(), Some("a b"));

        let nav = Navigation::parse("#!/auditor/interceptor?ps=%3Cb%3E&ps=other");
        assert_eq!(nav.proxy_server.as_deref(), Some("<b>"));
    }

    #[test]
    fn test_construct_order() {
        let log = Log::default();
        let mut lm = manager(&log);

        let ctx = lm.navigate("#!/auditor/interceptor?ps=2");
        assert_eq!(ctx.page, Some(PageId::Interceptor));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["universal:1", "interceptor:2", "interceptor-second"]
        );
    }

    #[test]
    fn test_teardowns_run_once_in_order() {
        let log = Log::default();
        let mut lm = manager(&log);

        lm.navigate("#!/auditor/interceptor");
        log.lock().unwrap().clear();

        lm.navigate("#!/auditor/dashboard");
        assert_eq!(
            *log.lock().unwrap(),
            vec!["universal-down", "down-1", "down-2", "universal:2", "dashboard"]
        );

        log.lock().unwrap().clear();
        lm.navigate("#!/auditor/dashboard");
        assert_eq!(
            *log.lock().unwrap(),
            vec!["universal-down", "universal:3", "dashboard"]
        );
    }

    #[test]
    fn test_unknown_path() {
        let log = Log::default();
        let mut lm = manager(&log);

        lm.navigate("#!/auditor/interceptor");
        log.lock().unwrap().clear();

        let ctx = lm.navigate("#!/somewhere/else");
        assert!(ctx.page.is_none());
        assert_eq!(ctx.proxy_server, "1");
        assert_eq!(
            *log.lock().unwrap(),
            vec!["universal-down", "down-1", "down-2", "universal:2"]
        );
    }

    #[test]
    fn test_leave() {
        let log = Log::default();
        let mut lm = manager(&log);

        lm.navigate("#!/auditor/dashboard");
        lm.leave();
        lm.leave();
        assert!(lm.current().is_none());
        assert_eq!(
            log.lock()
                .unwrap()
                .iter()
                .filter(|e| *e == "universal-down")
                .count(),
            1
        );
        assert_eq!(lm.generation(), 1);
    }
}
