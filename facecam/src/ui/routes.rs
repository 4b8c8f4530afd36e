//! Route table of the built-in UI.
//!
use std::fmt;

/// Pages reachable through the navigation bar.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Page {
    WebcamDetection,
    ImageDetection,
}

impl Page {
    pub const ALL: [Page; 2] = [Page::WebcamDetection, Page::ImageDetection];

    /// Page shown for the empty path and for unknown paths.
    pub const ENTRY: Page = Page::WebcamDetection;

    pub fn path(&self) -> &'static str {
        match self {
            Page::WebcamDetection => "/webcam-detection",
            Page::ImageDetection => "/image-detection",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Page::WebcamDetection => "Webcam Detection",
            Page::ImageDetection => "Image Detection",
        }
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Outcome of matching a request path against the route table.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Route {
    Redirect(Page),
    Page(Page),
    /// No route matched, the entry page is shown instead.
    Fallback,
}

/// Match a request path. Trailing slashes are ignored.
pub fn resolve(path: &str) -> Route {
    let path = path.trim_end_matches('/');
    if path.is_empty() {
        return Route::Redirect(Page::ENTRY);
    }

    Page::ALL
        .into_iter()
        .find(|page| page.path() == path)
        .map(Route::Page)
        .unwrap_or(Route::Fallback)
}
