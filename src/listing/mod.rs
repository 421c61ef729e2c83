//! 検索結果リストの巡回と連絡先の分類
//!
//! スキャン・重複除外・詳細ページ訪問・失敗時の回復・分類をまとめて
//! `ScrapeOrchestrator` が1クエリ分実行する。

mod classifier;
mod dedup;
mod orchestrator;
mod recovery;
mod scanner;
mod types;
mod visitor;

pub use classifier::{classify, is_location_code, is_phone, is_website};
pub use dedup::DedupTracker;
pub use orchestrator::{RunContext, ScrapeOrchestrator};
pub use recovery::{RecoveryDecision, RecoveryPolicy};
pub use scanner::ResultListScanner;
pub use types::{
    BusinessRecord, ClassifiedFields, ListingReference, RawDetailBlocks, RunOutcome, RunSummary,
    ScanState, ScanStep, NOT_AVAILABLE,
};
pub use visitor::DetailVisitor;
