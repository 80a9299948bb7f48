//! Browser seam and selector cascades.
//!
//! The pipeline talks to a [`Launcher`] and the [`Page`]s it opens; the
//! Chromium implementation lives in [`puppeteer`]. DOM reads are done on the
//! page HTML with `scraper`, so the cascades below work on any page source.

pub mod puppeteer;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};

pub use puppeteer::{Chrome, ChromeTab, USER_AGENTS, puppeteer};

/// One browser page (tab).
#[async_trait]
pub trait Page: Send + Sync {
    /// Navigates and waits for the document to load.
    async fn goto(&self, url: &str) -> anyhow::Result<()>;

    async fn current_url(&self) -> anyhow::Result<String>;

    /// Full HTML of the current document.
    async fn content(&self) -> anyhow::Result<String>;

    /// Replaces the value of the first element matching `selector`.
    /// `Ok(false)` when nothing matches.
    async fn fill(&self, selector: &str, value: &str) -> anyhow::Result<bool>;

    /// `Ok(false)` when nothing matches.
    async fn click(&self, selector: &str) -> anyhow::Result<bool>;

    /// Focuses the first element matching `selector` and presses Enter.
    async fn press_enter(&self, selector: &str) -> anyhow::Result<bool>;

    async fn close(&self) -> anyhow::Result<()>;
}

/// Opens pages in one browser instance.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn open_page(&self) -> anyhow::Result<Box<dyn Page>>;
}

/// How a single field is read out of an element.
#[derive(Clone, Copy, Debug)]
pub enum Strategy {
    /// Trimmed text of the first descendant matching the selector.
    Text(&'static str),
    /// Attribute of the first descendant matching the selector.
    Attr(&'static str, &'static str),
}

impl Strategy {
    #[must_use]
    pub const fn selector(self) -> &'static str {
        match self {
            Self::Text(s) | Self::Attr(s, _) => s,
        }
    }
}

/// A compiled ordered list of strategies. Invalid selectors are dropped when
/// the cascade is built.
#[derive(Debug)]
pub struct Cascade {
    steps: Vec<(Strategy, Selector)>,
}

impl Cascade {
    #[must_use]
    pub fn new(strategies: &[Strategy]) -> Self {
        let steps = strategies
            .iter()
            .filter_map(|&strategy| match Selector::parse(strategy.selector()) {
                Ok(selector) => Some((strategy, selector)),
                Err(e) => {
                    tracing::warn!(target: "cascade", "bad selector {:?}: {e}", strategy.selector());
                    None
                }
            })
            .collect();
        Self { steps }
    }

    /// First non-empty value produced by the strategies, in order.
    #[must_use]
    pub fn first(&self, scope: ElementRef<'_>) -> Option<String> {
        self.first_matching(scope, |_| true)
    }

    /// Like [`Self::first`], skipping values rejected by `accept`.
    pub fn first_matching(
        &self,
        scope: ElementRef<'_>,
        mut accept: impl FnMut(&str) -> bool,
    ) -> Option<String> {
        for (strategy, selector) in &self.steps {
            for element in scope.select(selector) {
                let value = match *strategy {
                    Strategy::Text(_) => text_of(element),
                    Strategy::Attr(_, name) => {
                        element.attr(name).map(str::trim).unwrap_or_default().to_owned()
                    }
                };
                if !value.is_empty() && accept(&value) {
                    return Some(value);
                }
            }
        }
        None
    }

    /// Elements matched by the first strategy that matches at least one,
    /// together with that strategy's index.
    #[must_use]
    pub fn containers<'a>(&self, document: &'a Html) -> Option<(usize, Vec<ElementRef<'a>>)> {
        self.steps.iter().enumerate().find_map(|(idx, (_, selector))| {
            let found = document.select(selector).collect::<Vec<_>>();
            (!found.is_empty()).then_some((idx, found))
        })
    }

    #[must_use]
    pub fn strategy(&self, idx: usize) -> Option<Strategy> {
        self.steps.get(idx).map(|(s, _)| *s)
    }
}

/// Text content with runs of whitespace collapsed to one space.
#[must_use]
pub fn text_of(element: ElementRef<'_>) -> String {
    squash(&element.text().collect::<String>())
}

#[must_use]
pub fn squash(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Tries `selectors` in order against `page`, stopping at the first one the
/// action reports as matched.
pub async fn first_hit<'s, F, Fut>(
    selectors: &[&'s str],
    mut action: F,
) -> anyhow::Result<Option<&'s str>>
where
    F: FnMut(&'s str) -> Fut,
    Fut: Future<Output = anyhow::Result<bool>>,
{
    for &selector in selectors {
        if action(selector).await? {
            return Ok(Some(selector));
        }
    }
    Ok(None)
}
