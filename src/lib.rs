//! スクレイパーライブラリ
//!
//! - 無限スクロール型の検索結果リストを最後まで巡回
//! - 各項目の詳細ページから連絡先（電話・住所・Plus Code・Webサイト）を分類
//! - 1件ごとにCSVへ書き込み、進捗を通知
//!
//! # 使用例
//!
//! ```rust,ignore
//! use places_scraper::{ScraperService, ScrapeRequest};
//! use tower::Service;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut service = ScraperService::new();
//!
//!     let request = ScrapeRequest::new("coffee in Reykjavik")
//!         .with_output_dir("./out")
//!         .with_headless(false);
//!
//!     let result = service.call(request).await.unwrap();
//!     println!("{} records: {:?}", result.summary.records_scraped, result.csv_path);
//! }
//! ```
//!
//! # エンジンを直接使う
//!
//! ```rust,ignore
//! use places_scraper::{ChromeSession, MemorySink, RunContext, ScrapeOrchestrator, ScraperConfig};
//!
//! let config = ScraperConfig::new().with_headless(true);
//! let session = ChromeSession::launch(&config).await?;
//! let mut sink = MemorySink::new();
//! let summary = ScrapeOrchestrator::new(config)
//!     .run(session, "dentists in Leeds", &mut sink, &RunContext::default())
//!     .await?;
//! ```

pub mod batch;
pub mod chrome;
pub mod config;
pub mod error;
pub mod listing;
pub mod parser;
pub mod service;
pub mod sink;
pub mod traits;

#[cfg(test)]
mod testing;

// 主要な型をリエクスポート
pub use chrome::{ChromeLauncher, ChromeSession};
pub use config::{DetailNavigation, ScraperConfig, Selectors};
pub use error::{ScraperError, VisitError};
pub use listing::{BusinessRecord, RunContext, RunOutcome, RunSummary, ScrapeOrchestrator};
pub use service::{ScrapeRequest, ScrapeResult, ScraperService};
pub use sink::{CsvFileSink, MemorySink, SinkMode};
pub use traits::{BrowserSession, ProgressChannel, ResultSink, SessionFactory, StatusReporter};
