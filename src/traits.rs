use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::config::ScraperConfig;
use crate::error::ScraperError;
use crate::listing::BusinessRecord;

/// スクロール方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Down,
    Up,
}

/// ブラウザ操作の抽象
///
/// 1つの実行の中で逐次的にのみ使われる（`&mut self`）。
#[async_trait]
pub trait BrowserSession: Send {
    type Element: Send + Sync;

    /// URLへ遷移
    async fn navigate(&mut self, url: &str) -> Result<(), ScraperError>;

    /// セレクタに一致する要素を全て取得（0件は空Vec）
    async fn locate_elements(&mut self, selector: &str)
        -> Result<Vec<Self::Element>, ScraperError>;

    /// 要素の属性値
    async fn attribute(
        &mut self,
        element: &Self::Element,
        name: &str,
    ) -> Result<Option<String>, ScraperError>;

    async fn scroll_into_view(&mut self, element: &Self::Element) -> Result<(), ScraperError>;

    /// リストを1ページ分スクロールして次の結果を読み込ませる
    async fn paginate(&mut self, direction: ScrollDirection) -> Result<(), ScraperError>;

    /// セレクタの要素が現れるまで待機。タイムアウトなら `Ok(false)`
    async fn wait_for_presence(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<bool, ScraperError>;

    /// 現在アクティブなページのHTML
    async fn current_markup(&mut self) -> Result<String, ScraperError>;

    async fn go_back(&mut self) -> Result<(), ScraperError>;

    /// 要素のリンク先を別コンテキスト（タブ）で開き、以降の操作対象にする
    async fn open_isolated_context(&mut self, element: &Self::Element)
        -> Result<(), ScraperError>;

    async fn close_isolated_context(&mut self) -> Result<(), ScraperError>;

    /// リソース解放
    async fn release(&mut self) -> Result<(), ScraperError>;
}

/// セッションの起動（バッチでクエリごとに新しいブラウザを使う）
#[async_trait]
pub trait SessionFactory: Send + Sync {
    type Session: BrowserSession;

    async fn launch(&self, config: &ScraperConfig) -> Result<Self::Session, ScraperError>;
}

/// 結果の書き込み先
#[async_trait]
pub trait ResultSink: Send {
    async fn append(&mut self, records: &[BusinessRecord]) -> Result<(), ScraperError>;
}

/// 進捗通知（送りっぱなし）
pub trait ProgressChannel: Send + Sync {
    fn emit(&self, processed_count: usize);
}

impl ProgressChannel for mpsc::UnboundedSender<usize> {
    fn emit(&self, processed_count: usize) {
        // 受信側が閉じていても実行は続ける
        let _ = self.send(processed_count);
    }
}

impl ProgressChannel for watch::Sender<usize> {
    fn emit(&self, processed_count: usize) {
        self.send_replace(processed_count);
    }
}

/// 何もしない進捗通知
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressChannel for NoProgress {
    fn emit(&self, _processed_count: usize) {}
}

/// バッチ実行のクエリごとの状態報告
#[async_trait]
pub trait StatusReporter: Send {
    async fn report(&mut self, correlation_token: &str, status: &str)
        -> Result<(), ScraperError>;
}
