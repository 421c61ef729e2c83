use std::time::Duration;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// `-` `_` `.` `~` はエンコードしない
const QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// 詳細ページへの遷移方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetailNavigation {
    /// リンク先へ遷移し、履歴で戻る
    #[default]
    FollowLink,
    /// 別タブで開き、閉じて戻る
    IsolatedContext,
}

/// ページ上の要素セレクタ
#[derive(Debug, Clone)]
pub struct Selectors {
    /// 検索結果リストの各項目（aria-label と href を持つリンク）
    pub listing: String,
    /// 詳細ページ読み込み完了の目印
    pub detail_marker: String,
    /// 詳細ページの店名見出し
    pub detail_name: String,
    /// 連絡先情報の各行
    pub fact_rows: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            listing: "a.hfpxzc".to_string(),
            detail_marker: "h1.DUwDvf.lfPIob".to_string(),
            detail_name: "h1.DUwDvf".to_string(),
            fact_rows: "div.rogA2c".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScraperConfig {
    pub base_url: String,
    pub headless: bool,
    pub debug: bool,
    pub chrome_executable: Option<String>,
    pub selectors: Selectors,
    pub detail_navigation: DetailNavigation,
    /// 検索結果リスト初回表示の待機上限
    pub initial_list_timeout: Duration,
    /// 詳細ページ読み込みの待機上限
    pub detail_timeout: Duration,
    /// スクロール後に件数増加を待つ上限
    pub settle_timeout: Duration,
    pub poll_interval: Duration,
    /// 1クエリ全体の実行時間上限
    pub max_run_duration: Duration,
    pub stagnation_threshold: u32,
    pub sink_retries: u32,
    /// 書き込み再試行の初回待機（以降は倍々）
    pub sink_retry_backoff: Duration,
    /// バッチ実行時のクエリ間の待機
    pub batch_pause: Duration,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.google.com/maps/search/".to_string(),
            headless: true,
            debug: false,
            chrome_executable: std::env::var("CHROME_PATH")
                .or_else(|_| std::env::var("CHROMIUM_PATH"))
                .ok(),
            selectors: Selectors::default(),
            detail_navigation: DetailNavigation::default(),
            initial_list_timeout: Duration::from_secs(10),
            detail_timeout: Duration::from_secs(10),
            settle_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(250),
            max_run_duration: Duration::from_secs(30 * 60),
            stagnation_threshold: 3,
            sink_retries: 3,
            sink_retry_backoff: Duration::from_millis(1000),
            batch_pause: Duration::from_secs(5),
        }
    }
}

impl ScraperConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_chrome_executable(mut self, path: impl Into<String>) -> Self {
        self.chrome_executable = Some(path.into());
        self
    }

    pub fn with_selectors(mut self, selectors: Selectors) -> Self {
        self.selectors = selectors;
        self
    }

    pub fn with_detail_navigation(mut self, navigation: DetailNavigation) -> Self {
        self.detail_navigation = navigation;
        self
    }

    pub fn with_initial_list_timeout(mut self, timeout: Duration) -> Self {
        self.initial_list_timeout = timeout;
        self
    }

    pub fn with_detail_timeout(mut self, timeout: Duration) -> Self {
        self.detail_timeout = timeout;
        self
    }

    pub fn with_settle_timeout(mut self, timeout: Duration) -> Self {
        self.settle_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_run_duration(mut self, duration: Duration) -> Self {
        self.max_run_duration = duration;
        self
    }

    pub fn with_sink_retries(mut self, retries: u32) -> Self {
        self.sink_retries = retries;
        self
    }

    pub fn with_sink_retry_backoff(mut self, backoff: Duration) -> Self {
        self.sink_retry_backoff = backoff;
        self
    }

    pub fn with_stagnation_threshold(mut self, threshold: u32) -> Self {
        self.stagnation_threshold = threshold;
        self
    }

    pub fn with_batch_pause(mut self, pause: Duration) -> Self {
        self.batch_pause = pause;
        self
    }

    /// 検索クエリからリストページのURLを組み立てる（スペースは `+`）
    pub fn search_url(&self, query: &str) -> String {
        format!("{}{}/", self.base_url, encode_query(query))
    }
}

/// フォーム形式でのパーセントエンコード
pub fn encode_query(query: &str) -> String {
    query
        .split(' ')
        .map(|part| utf8_percent_encode(part, QUERY_ENCODE_SET).to_string())
        .collect::<Vec<_>>()
        .join("+")
}
