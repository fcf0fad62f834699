use std::sync::Mutex;

use url::Url;

pub const HOME_ROUTE: &str = "/";
pub const LOGIN_ROUTE: &str = "/login";

/// The UI's side of a login: leaving for the identity provider and moving
/// between the console's own pages.
pub trait Navigator: Send + Sync {
    /// Full-page redirect. Nothing in the current page context runs after it;
    /// the flow resumes when the callback page loads.
    fn redirect(&self, url: &Url);

    /// In-app route change.
    fn navigate(&self, route: &str);
}

/// Opens the authorization URL in the system browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserNavigator;

impl Navigator for BrowserNavigator {
    fn redirect(&self, url: &Url) {
        if webbrowser::open(url.as_str()).is_err() {
            tracing::warn!("Could not open browser automatically. Please visit:\n{url}");
        }
    }

    fn navigate(&self, route: &str) {
        tracing::info!("Navigating to {route}");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationEvent {
    Redirect(String),
    Route(String),
}

/// Records navigation instead of performing it. Used by headless callers and
/// tests.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    events: Mutex<Vec<NavigationEvent>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<NavigationEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn last_route(&self) -> Option<String> {
        self.events().into_iter().rev().find_map(|e| match e {
            NavigationEvent::Route(r) => Some(r),
            NavigationEvent::Redirect(_) => None,
        })
    }

    fn record(&self, event: NavigationEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl Navigator for RecordingNavigator {
    fn redirect(&self, url: &Url) {
        self.record(NavigationEvent::Redirect(url.to_string()));
    }

    fn navigate(&self, route: &str) {
        self.record(NavigationEvent::Route(route.to_string()));
    }
}
