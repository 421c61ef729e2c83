//! テスト用のブラウザセッション
//!
//! 検索結果リストと詳細ページをメモリ上で再現する。

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{ScraperConfig, Selectors};
use crate::error::ScraperError;
use crate::listing::BusinessRecord;
use crate::traits::{BrowserSession, ResultSink, ScrollDirection, SessionFactory};

pub const SEARCH_BASE: &str = "https://maps.test/search/";

pub fn test_config() -> ScraperConfig {
    ScraperConfig::new()
        .with_base_url(SEARCH_BASE)
        .with_initial_list_timeout(Duration::ZERO)
        .with_detail_timeout(Duration::ZERO)
        .with_settle_timeout(Duration::ZERO)
        .with_poll_interval(Duration::from_millis(1))
        .with_sink_retry_backoff(Duration::from_millis(1))
        .with_batch_pause(Duration::ZERO)
}

/// 詳細ページのHTMLを組み立てる
pub fn detail_markup(name: &str, blocks: &[&str]) -> String {
    let rows: String = blocks
        .iter()
        .map(|b| format!(r#"<div class="rogA2c"><div>{}</div></div>"#, b))
        .collect();
    format!(
        r#"<html><body><h1 class="DUwDvf lfPIob">{}</h1>{}</body></html>"#,
        name, rows
    )
}

#[derive(Debug, Clone)]
pub struct FakeListing {
    pub label: Option<String>,
    pub href: Option<String>,
    /// `None` なら詳細ページが読み込まれない
    pub markup: Option<String>,
}

impl FakeListing {
    pub fn new(label: &str, blocks: &[&str]) -> Self {
        Self {
            label: Some(label.to_string()),
            href: Some(format!("https://maps.test/place/{}", label)),
            markup: Some(detail_markup(label, blocks)),
        }
    }

    pub fn without_href(mut self) -> Self {
        self.href = None;
        self
    }

    pub fn never_loads(mut self) -> Self {
        self.markup = None;
        self
    }

    pub fn with_href(mut self, href: &str) -> Self {
        self.href = Some(href.to_string());
        self
    }

    pub fn with_markup(mut self, markup: String) -> Self {
        self.markup = Some(markup);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Location {
    Blank,
    List,
    Detail(String),
}

/// テストから観測するための記録
#[derive(Debug, Default)]
pub struct FakeProbe {
    pub paginate_calls: usize,
    pub release_calls: usize,
    pub visited: Vec<String>,
    pub isolated_opened: usize,
    pub isolated_closed: usize,
}

#[derive(Debug, Clone)]
pub struct FakeElement {
    index: usize,
    label: Option<String>,
    href: Option<String>,
}

pub struct FakeSession {
    selectors: Selectors,
    listings: Vec<FakeListing>,
    visible: usize,
    loaded: usize,
    reload_visible: Option<usize>,
    growth: VecDeque<usize>,
    location: Location,
    isolated: Option<String>,
    list_available: bool,
    fail_navigation: HashSet<String>,
    fail_go_back: HashSet<String>,
    lose_list_on_restore_failure: bool,
    list_lost: bool,
    pub probe: Arc<Mutex<FakeProbe>>,
}

impl FakeSession {
    /// 最初に `initially_visible` 件を表示するリスト
    pub fn new(listings: Vec<FakeListing>, initially_visible: usize) -> Self {
        Self {
            selectors: Selectors::default(),
            visible: initially_visible.min(listings.len()),
            loaded: initially_visible.min(listings.len()),
            reload_visible: None,
            listings,
            growth: VecDeque::new(),
            location: Location::Blank,
            isolated: None,
            list_available: true,
            fail_navigation: HashSet::new(),
            fail_go_back: HashSet::new(),
            lose_list_on_restore_failure: false,
            list_lost: false,
            probe: Arc::new(Mutex::new(FakeProbe::default())),
        }
    }

    /// スクロールごとに増える件数
    pub fn with_growth(mut self, growth: &[usize]) -> Self {
        self.growth = growth.iter().copied().collect();
        self
    }

    /// 戻るたびにリストが先頭 `count` 件だけの描画に戻る。読み込み済みの分は
    /// スクロールごとに `count` 件ずつ再描画される
    pub fn with_reload_on_back(mut self, count: usize) -> Self {
        self.reload_visible = Some(count);
        self
    }

    pub fn with_list_unavailable(mut self) -> Self {
        self.list_available = false;
        self
    }

    pub fn with_failing_navigation(mut self, href: &str) -> Self {
        self.fail_navigation.insert(href.to_string());
        self
    }

    /// `href` の詳細ページから戻れない
    pub fn with_failing_go_back(mut self, href: &str, lose_list: bool) -> Self {
        self.fail_go_back.insert(href.to_string());
        self.lose_list_on_restore_failure = lose_list;
        self
    }

    /// リスト表示中の状態で開始する
    pub fn on_list(mut self) -> Self {
        self.location = Location::List;
        self
    }

    pub fn probe(&self) -> Arc<Mutex<FakeProbe>> {
        Arc::clone(&self.probe)
    }

    fn active(&self) -> Location {
        match &self.isolated {
            Some(href) => Location::Detail(href.clone()),
            None => self.location.clone(),
        }
    }

    fn markup_for(&self, href: &str) -> Option<&String> {
        self.listings
            .iter()
            .find(|l| l.href.as_deref() == Some(href))
            .and_then(|l| l.markup.as_ref())
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    type Element = FakeElement;

    async fn navigate(&mut self, url: &str) -> Result<(), ScraperError> {
        if self.fail_navigation.contains(url) {
            return Err(ScraperError::Navigation(format!("net::ERR_FAILED {}", url)));
        }
        if url.starts_with(SEARCH_BASE) {
            self.location = if self.list_available {
                Location::List
            } else {
                Location::Blank
            };
        } else {
            self.probe.lock().unwrap().visited.push(url.to_string());
            self.location = Location::Detail(url.to_string());
        }
        Ok(())
    }

    async fn locate_elements(&mut self, selector: &str) -> Result<Vec<FakeElement>, ScraperError> {
        if self.active() != Location::List || selector != self.selectors.listing || self.list_lost {
            return Ok(Vec::new());
        }
        Ok(self.listings[..self.visible]
            .iter()
            .enumerate()
            .map(|(index, l)| FakeElement {
                index,
                label: l.label.clone(),
                href: l.href.clone(),
            })
            .collect())
    }

    async fn attribute(
        &mut self,
        element: &FakeElement,
        name: &str,
    ) -> Result<Option<String>, ScraperError> {
        Ok(match name {
            "aria-label" => element.label.clone(),
            "href" => element.href.clone(),
            _ => None,
        })
    }

    async fn scroll_into_view(&mut self, element: &FakeElement) -> Result<(), ScraperError> {
        if element.index >= self.visible {
            return Err(ScraperError::ElementNotFound(format!("index {}", element.index)));
        }
        Ok(())
    }

    async fn paginate(&mut self, _direction: ScrollDirection) -> Result<(), ScraperError> {
        self.probe.lock().unwrap().paginate_calls += 1;
        if let Some(page) = self.reload_visible {
            if self.visible < self.loaded {
                self.visible = (self.visible + page).min(self.loaded);
                return Ok(());
            }
        }
        let grow = self.growth.pop_front().unwrap_or(0);
        self.visible = (self.visible + grow).min(self.listings.len());
        self.loaded = self.loaded.max(self.visible);
        Ok(())
    }

    async fn wait_for_presence(
        &mut self,
        selector: &str,
        _timeout: Duration,
    ) -> Result<bool, ScraperError> {
        Ok(match self.active() {
            Location::List => {
                selector == self.selectors.listing && !self.list_lost && self.visible > 0
            }
            Location::Detail(href) => {
                selector == self.selectors.detail_marker && self.markup_for(&href).is_some()
            }
            Location::Blank => false,
        })
    }

    async fn current_markup(&mut self) -> Result<String, ScraperError> {
        Ok(match self.active() {
            Location::Detail(href) => self.markup_for(&href).cloned().unwrap_or_default(),
            _ => "<html><body></body></html>".to_string(),
        })
    }

    async fn go_back(&mut self) -> Result<(), ScraperError> {
        if let Location::Detail(href) = &self.location {
            if self.fail_go_back.contains(href) {
                self.location = Location::List;
                self.list_lost = self.lose_list_on_restore_failure;
                return Err(ScraperError::Navigation("history.back failed".into()));
            }
        }
        self.location = Location::List;
        if let Some(count) = self.reload_visible {
            self.visible = self.visible.min(count);
        }
        Ok(())
    }

    async fn open_isolated_context(&mut self, element: &FakeElement) -> Result<(), ScraperError> {
        let href = element
            .href
            .clone()
            .ok_or_else(|| ScraperError::ElementNotFound("href".into()))?;
        if self.fail_navigation.contains(&href) {
            return Err(ScraperError::Navigation(format!("net::ERR_FAILED {}", href)));
        }
        let mut probe = self.probe.lock().unwrap();
        probe.visited.push(href.clone());
        probe.isolated_opened += 1;
        drop(probe);
        self.isolated = Some(href);
        Ok(())
    }

    async fn close_isolated_context(&mut self) -> Result<(), ScraperError> {
        self.probe.lock().unwrap().isolated_closed += 1;
        self.isolated = None;
        Ok(())
    }

    async fn release(&mut self) -> Result<(), ScraperError> {
        self.probe.lock().unwrap().release_calls += 1;
        Ok(())
    }
}

/// クエリごとに用意したセッションを順に返す
pub struct FakeFactory {
    sessions: Mutex<VecDeque<Result<FakeSession, ScraperError>>>,
}

impl FakeFactory {
    pub fn new(sessions: Vec<Result<FakeSession, ScraperError>>) -> Self {
        Self {
            sessions: Mutex::new(sessions.into_iter().collect()),
        }
    }
}

#[async_trait]
impl SessionFactory for FakeFactory {
    type Session = FakeSession;

    async fn launch(&self, _config: &ScraperConfig) -> Result<FakeSession, ScraperError> {
        self.sessions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ScraperError::BrowserInit("no more sessions".into())))
    }
}

/// 指定回数だけ失敗するシンク
#[derive(Debug, Default)]
pub struct FlakySink {
    pub failures_left: usize,
    pub written: Vec<BusinessRecord>,
    pub calls: usize,
}

impl FlakySink {
    pub fn failing(times: usize) -> Self {
        Self {
            failures_left: times,
            ..Default::default()
        }
    }
}

#[async_trait]
impl ResultSink for FlakySink {
    async fn append(&mut self, records: &[BusinessRecord]) -> Result<(), ScraperError> {
        self.calls += 1;
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(ScraperError::SinkWrite {
                pending: records.len(),
                message: "quota exceeded".into(),
            });
        }
        self.written.extend_from_slice(records);
        Ok(())
    }
}
