use std::{ffi::OsStr, sync::Arc, time::Duration};

use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab, browser::tab::NoElementFound};
use rand::seq::IndexedRandom;
use tokio::{sync::Mutex, task::spawn_blocking};

use super::{Launcher, Page};

pub const USER_AGENTS: [&str; 4] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
];

pub fn puppeteer(headless: bool) -> anyhow::Result<Browser> {
    Browser::new(LaunchOptions {
        args: vec![
            OsStr::new("--disable-blink-features=AutomationControlled"),
            OsStr::new("--disable-dev-shm-usage"),
        ],
        headless,
        window_size: Some((1280, 720)),
        ..LaunchOptions::default()
    })
}

/// A fresh tab; every other tab of the browser is closed.
#[allow(clippy::significant_drop_tightening)]
pub fn first_tab(browser: &Browser) -> anyhow::Result<Arc<Tab>> {
    let tab = browser.new_tab()?;

    {
        let tabs_guard = browser
            .get_tabs()
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        for remain in &*tabs_guard {
            if !Arc::ptr_eq(&tab, remain) {
                remain.close(true)?;
            }
        }
    }

    Ok(tab)
}

/// A Chromium process. It is killed when this value is dropped.
pub struct Chrome {
    browser: Browser,
    timeout: Duration,
}

impl Chrome {
    /// `timeout` becomes the default wait of every tab opened later.
    pub fn launch(headless: bool, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            browser: puppeteer(headless)?,
            timeout,
        })
    }
}

#[async_trait]
impl Launcher for Chrome {
    async fn open_page(&self) -> anyhow::Result<Box<dyn Page>> {
        let tab = first_tab(&self.browser)?;
        tab.set_default_timeout(self.timeout);

        let user_agent = USER_AGENTS
            .choose(&mut rand::rng())
            .ok_or_else(|| anyhow::anyhow!("no UA available"))?;
        tracing::debug!(target: "launch", "choosing user-agent \x1b[1;36m{user_agent}\x1b[0m ...");
        tab.set_user_agent(user_agent, None, None)?;

        Ok(Box::new(ChromeTab {
            tab,
            busy: Arc::default(),
        }))
    }
}

/// Runs `f` on the blocking pool, one call at a time per `busy`.
///
/// The lock is held by the blocking closure itself, so a call whose future was
/// dropped (e.g. by a timeout) still finishes before the next one starts.
async fn exclusive<T, F>(busy: &Arc<Mutex<()>>, f: F) -> anyhow::Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    let guard = Arc::clone(busy).lock_owned().await;
    spawn_blocking(move || {
        let _guard = guard;
        f()
    })
    .await?
}

/// [`Page`] over a `headless_chrome` tab. Every call is blocking on the
/// DevTools connection, so it runs on the blocking pool.
pub struct ChromeTab {
    tab: Arc<Tab>,
    busy: Arc<Mutex<()>>,
}

impl ChromeTab {
    async fn with_tab<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Tab) -> anyhow::Result<T> + Send + 'static,
    {
        let tab = Arc::clone(&self.tab);
        exclusive(&self.busy, move || f(&tab)).await
    }

    /// Runs `f` on the first element matching `selector`; `Ok(false)` if none.
    async fn on_element<F>(&self, selector: &str, f: F) -> anyhow::Result<bool>
    where
        F: FnOnce(&Tab, &headless_chrome::Element<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        let selector = selector.to_owned();
        self.with_tab(move |tab| match tab.find_element(&selector) {
            Ok(element) => f(tab, &element).map(|()| true),
            Err(err) if err.is::<NoElementFound>() => Ok(false),
            Err(err) => Err(err),
        })
        .await
    }
}

#[async_trait]
impl Page for ChromeTab {
    async fn goto(&self, url: &str) -> anyhow::Result<()> {
        let url = url.to_owned();
        self.with_tab(move |tab| {
            tab.navigate_to(&url)?.wait_until_navigated()?;
            Ok(())
        })
        .await
    }

    async fn current_url(&self) -> anyhow::Result<String> {
        self.with_tab(|tab| Ok(tab.get_url())).await
    }

    async fn content(&self) -> anyhow::Result<String> {
        self.with_tab(Tab::get_content).await
    }

    async fn fill(&self, selector: &str, value: &str) -> anyhow::Result<bool> {
        let value = value.to_owned();
        self.on_element(selector, move |_, element| {
            element.call_js_fn("function(){this.value=''}", Vec::new(), false)?;
            element.click()?;
            element.type_into(&value)?;
            Ok(())
        })
        .await
    }

    async fn click(&self, selector: &str) -> anyhow::Result<bool> {
        self.on_element(selector, |_, element| {
            element.click()?;
            Ok(())
        })
        .await
    }

    async fn press_enter(&self, selector: &str) -> anyhow::Result<bool> {
        self.on_element(selector, |tab, element| {
            element.focus()?;
            tab.press_key("Enter")?;
            Ok(())
        })
        .await
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.with_tab(|tab| tab.close(true).map(drop)).await
    }
}
