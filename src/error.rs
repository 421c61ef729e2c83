use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("ブラウザ初期化エラー: {0}")]
    BrowserInit(String),

    #[error("検索結果リストが表示されません: query={query}, waited={waited:?}")]
    InitialListTimeout { query: String, waited: Duration },

    #[error("ナビゲーションエラー: {0}")]
    Navigation(String),

    #[error("JavaScript実行エラー: {0}")]
    JavaScript(String),

    #[error("要素が見つかりません: {0}")]
    ElementNotFound(String),

    #[error("HTML解析エラー: {0}")]
    Parse(String),

    #[error("設定エラー: {0}")]
    Config(String),

    #[error("リスト復帰不能: {0}")]
    ContextLost(#[source] VisitError),

    #[error("書き込みエラー ({pending}件未保存): {message}")]
    SinkWrite { pending: usize, message: String },

    #[error("ファイル操作エラー: {0}")]
    FileIO(#[from] std::io::Error),

    #[error("CSVエラー: {0}")]
    Csv(#[from] csv::Error),
}

impl ScraperError {
    /// バッチのステータス欄に書く文字列
    pub fn status_label(&self) -> String {
        match self {
            ScraperError::InitialListTimeout { .. } => "Not found".to_string(),
            ScraperError::BrowserInit(_) => "WebDriver Error".to_string(),
            other => format!("Error: {}", other),
        }
    }
}

/// 1件の詳細ページ訪問の失敗
#[derive(Error, Debug)]
pub enum VisitError {
    #[error("詳細リンクがありません: {0}")]
    MissingLink(String),

    #[error("詳細ページの読み込みタイムアウト: {selector} ({waited:?})")]
    NavigationTimeout { selector: String, waited: Duration },

    #[error("要素が見つかりません: {0}")]
    ElementNotFound(String),

    #[error("ブラウザ操作エラー: {0}")]
    Browser(String),

    #[error("元のリストに戻れません: {message}")]
    ContextRestore { message: String },
}

impl VisitError {
    /// ログ用の種別名
    pub fn kind(&self) -> &'static str {
        match self {
            VisitError::MissingLink(_) => "missing_link",
            VisitError::NavigationTimeout { .. } => "navigation_timeout",
            VisitError::ElementNotFound(_) => "element_not_found",
            VisitError::Browser(_) => "browser",
            VisitError::ContextRestore { .. } => "context_restore",
        }
    }

    pub fn is_context_restore(&self) -> bool {
        matches!(self, VisitError::ContextRestore { .. })
    }
}

impl From<ScraperError> for VisitError {
    fn from(e: ScraperError) -> Self {
        match e {
            ScraperError::ElementNotFound(msg) => VisitError::ElementNotFound(msg),
            other => VisitError::Browser(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_labels() {
        let not_found = ScraperError::InitialListTimeout {
            query: "cafe".into(),
            waited: Duration::from_secs(10),
        };
        assert_eq!(not_found.status_label(), "Not found");
        assert_eq!(
            ScraperError::BrowserInit("no chrome".into()).status_label(),
            "WebDriver Error"
        );
        assert!(ScraperError::Navigation("x".into())
            .status_label()
            .starts_with("Error: "));
    }

    #[test]
    fn test_visit_error_from_scraper_error() {
        let e: VisitError = ScraperError::ElementNotFound("a.hfpxzc".into()).into();
        assert_eq!(e.kind(), "element_not_found");

        let e: VisitError = ScraperError::JavaScript("boom".into()).into();
        assert_eq!(e.kind(), "browser");
        assert!(!e.is_context_restore());
    }
}
