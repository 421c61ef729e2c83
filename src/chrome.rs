//! Chrome DevTools Protocol によるブラウザセッション

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Element, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::ScraperConfig;
use crate::error::ScraperError;
use crate::traits::{BrowserSession, ScrollDirection, SessionFactory};

/// リストのスクロール（結果フィードがあればその中を1画面分）
const PAGINATE_SCRIPT: &str = r#"
    (function(dir) {
        var feed = document.querySelector("div[role='feed']");
        var target = feed || document.scrollingElement || document.body;
        var step = feed ? feed.clientHeight : window.innerHeight;
        target.scrollBy(0, step * dir);
        return true;
    })
"#;

pub struct ChromeSession {
    browser: Option<Browser>,
    page: Option<Page>,
    detail_page: Option<Page>,
    handler_task: Option<JoinHandle<()>>,
    poll_interval: Duration,
    debug: bool,
}

impl ChromeSession {
    /// ブラウザを起動して空のページを開く
    pub async fn launch(config: &ScraperConfig) -> Result<Self, ScraperError> {
        info!("Initializing browser...");

        let mut builder = BrowserConfig::builder().window_size(1280, 800);

        if let Some(path) = &config.chrome_executable {
            builder = builder.chrome_executable(path);
        }

        if !config.headless {
            builder = builder.with_head();
        }

        builder = builder
            .no_sandbox()
            .request_timeout(Duration::from_secs(60))
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu");

        if config.debug {
            builder = builder.arg("--enable-logging=stderr").arg("--v=1");
        }

        let browser_config = builder
            .build()
            .map_err(|e| ScraperError::BrowserInit(format!("ブラウザ設定エラー: {}", e)))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ScraperError::BrowserInit(e.to_string()))?;

        // ブラウザイベントハンドラをバックグラウンドで実行
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                debug!("Browser event: {:?}", event);
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler_task.abort();
                return Err(ScraperError::BrowserInit(e.to_string()));
            }
        };

        info!("Browser initialized successfully");
        Ok(Self {
            browser: Some(browser),
            page: Some(page),
            detail_page: None,
            handler_task: Some(handler_task),
            poll_interval: config.poll_interval,
            debug: config.debug,
        })
    }

    fn main_page(&self) -> Result<Page, ScraperError> {
        self.page
            .clone()
            .ok_or_else(|| ScraperError::BrowserInit("ブラウザが初期化されていません".into()))
    }

    /// 別タブが開いていればそちら
    fn active_page(&self) -> Result<Page, ScraperError> {
        match &self.detail_page {
            Some(page) => Ok(page.clone()),
            None => self.main_page(),
        }
    }

    async fn log_screenshot(&self, page: &Page, label: &str) {
        match page
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
        {
            Ok(screenshot) => {
                use base64::Engine;
                let encoded = base64::engine::general_purpose::STANDARD.encode(&screenshot);
                debug!("{} screenshot: data:image/png;base64,{}", label, encoded);
            }
            Err(e) => debug!("Failed to take screenshot: {}", e),
        }
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    type Element = Element;

    async fn navigate(&mut self, url: &str) -> Result<(), ScraperError> {
        let page = self.main_page()?;
        page.goto(url)
            .await
            .map_err(|e| ScraperError::Navigation(e.to_string()))?;
        Ok(())
    }

    async fn locate_elements(&mut self, selector: &str) -> Result<Vec<Element>, ScraperError> {
        let page = self.active_page()?;
        page.find_elements(selector)
            .await
            .map_err(|e| ScraperError::ElementNotFound(format!("{}: {}", selector, e)))
    }

    async fn attribute(
        &mut self,
        element: &Element,
        name: &str,
    ) -> Result<Option<String>, ScraperError> {
        element
            .attribute(name)
            .await
            .map_err(|e| ScraperError::ElementNotFound(format!("attribute {}: {}", name, e)))
    }

    async fn scroll_into_view(&mut self, element: &Element) -> Result<(), ScraperError> {
        element
            .scroll_into_view()
            .await
            .map_err(|e| ScraperError::ElementNotFound(format!("scroll into view: {}", e)))?;
        Ok(())
    }

    async fn paginate(&mut self, direction: ScrollDirection) -> Result<(), ScraperError> {
        let page = self.main_page()?;
        let dir = match direction {
            ScrollDirection::Down => 1,
            ScrollDirection::Up => -1,
        };
        page.evaluate(format!("{}({})", PAGINATE_SCRIPT, dir))
            .await
            .map_err(|e| ScraperError::JavaScript(e.to_string()))?;
        Ok(())
    }

    async fn wait_for_presence(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<bool, ScraperError> {
        let page = self.active_page()?;
        let literal = serde_json::to_string(selector)
            .map_err(|e| ScraperError::Config(format!("selector {}: {}", selector, e)))?;
        let script = format!("document.querySelector({}) !== null", literal);
        let start = Instant::now();

        loop {
            let found = match page.evaluate(script.as_str()).await {
                Ok(val) => val.into_value::<bool>().unwrap_or(false),
                Err(e) => {
                    // 遷移中はコンテキストが入れ替わるので失敗しうる
                    debug!("Presence check for {} failed: {}", selector, e);
                    false
                }
            };
            if found {
                debug!("{} present after {:?}", selector, start.elapsed());
                return Ok(true);
            }
            if start.elapsed() >= timeout {
                debug!("{} not present after {:?}", selector, timeout);
                if self.debug {
                    self.log_screenshot(&page, selector).await;
                }
                return Ok(false);
            }
            sleep(self.poll_interval).await;
        }
    }

    async fn current_markup(&mut self) -> Result<String, ScraperError> {
        let page = self.active_page()?;
        page.content()
            .await
            .map_err(|e| ScraperError::JavaScript(e.to_string()))
    }

    async fn go_back(&mut self) -> Result<(), ScraperError> {
        let page = self.main_page()?;
        page.evaluate("window.history.back()")
            .await
            .map_err(|e| ScraperError::Navigation(e.to_string()))?;
        Ok(())
    }

    async fn open_isolated_context(&mut self, element: &Element) -> Result<(), ScraperError> {
        let href = element
            .attribute("href")
            .await
            .map_err(|e| ScraperError::ElementNotFound(format!("href: {}", e)))?
            .ok_or_else(|| ScraperError::ElementNotFound("href".into()))?;

        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| ScraperError::BrowserInit("ブラウザが初期化されていません".into()))?;
        let page = browser
            .new_page(href.as_str())
            .await
            .map_err(|e| ScraperError::Navigation(e.to_string()))?;
        self.detail_page = Some(page);
        Ok(())
    }

    async fn close_isolated_context(&mut self) -> Result<(), ScraperError> {
        if let Some(page) = self.detail_page.take() {
            page.close()
                .await
                .map_err(|e| ScraperError::Navigation(format!("close tab: {}", e)))?;
        }
        Ok(())
    }

    async fn release(&mut self) -> Result<(), ScraperError> {
        if let Some(page) = self.detail_page.take() {
            if let Err(e) = page.close().await {
                debug!("Failed to close detail page: {}", e);
            }
        }
        self.page = None;

        let result = match self.browser.take() {
            Some(mut browser) => {
                let closed = browser.close().await;
                if let Err(e) = browser.wait().await {
                    debug!("Failed to wait for browser exit: {}", e);
                }
                closed
                    .map(|_| ())
                    .map_err(|e| ScraperError::BrowserInit(format!("ブラウザ終了エラー: {}", e)))
            }
            None => Ok(()),
        };

        if let Some(task) = self.handler_task.take() {
            task.abort();
        }
        info!("Browser closed");
        result
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        if self.browser.is_some() {
            warn!("Browser session dropped without release");
        }
        if let Some(task) = self.handler_task.take() {
            task.abort();
        }
    }
}

/// クエリごとに Chrome を起動する
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromeLauncher;

#[async_trait]
impl SessionFactory for ChromeLauncher {
    type Session = ChromeSession;

    async fn launch(&self, config: &ScraperConfig) -> Result<ChromeSession, ScraperError> {
        ChromeSession::launch(config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::{RunContext, ScrapeOrchestrator};
    use crate::sink::MemorySink;

    #[tokio::test]
    #[ignore] // 実環境テスト用: cargo test test_live_search -- --ignored --nocapture
    async fn test_live_search() {
        tracing_subscriber::fmt()
            .with_env_filter("info,places_scraper=debug")
            .init();

        let query = std::env::var("SEARCH_QUERY").unwrap_or_else(|_| "coffee Reykjavik".into());
        let config = ScraperConfig::new()
            .with_max_run_duration(Duration::from_secs(120))
            .with_debug(true);

        let session = ChromeSession::launch(&config)
            .await
            .expect("Failed to initialize browser");
        let mut sink = MemorySink::new();
        let summary = ScrapeOrchestrator::new(config)
            .run(session, &query, &mut sink, &RunContext::default())
            .await
            .expect("Scrape failed");

        println!("\n=== Scrape Result ===");
        println!("Records: {} ({:?})", summary.records_scraped, summary.outcome);
        for r in sink.records() {
            println!("  - {} / {:?} / {:?} / {}", r.name, r.phone, r.address, r.website);
        }
    }
}
