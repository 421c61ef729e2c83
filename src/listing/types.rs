//! 検索結果リスト巡回の型定義

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 値が取れなかったときの表記
pub const NOT_AVAILABLE: &str = "Not available";

/// 検索結果リスト上の1項目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingReference {
    /// 表示ラベル（aria-label）。一意とは限らない
    pub identifier: String,
    pub detail_url: String,
    /// スキャン時のDOM上の位置
    pub position: usize,
}

/// 詳細ページから取り出した生テキスト
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawDetailBlocks {
    /// 詳細ページの見出し
    pub detail_name: Option<String>,
    pub blocks: Vec<String>,
}

/// 抽出結果の1レコード
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessRecord {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Phone number")]
    pub phone: Option<String>,
    #[serde(rename = "Address")]
    pub address: Option<String>,
    #[serde(rename = "Plus Code")]
    pub location_code: Option<String>,
    #[serde(rename = "Website")]
    pub website: String,
}

/// 分類器の出力
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedFields {
    pub phone: Option<String>,
    pub address: Option<String>,
    pub location_code: Option<String>,
    pub website: String,
}

impl BusinessRecord {
    pub fn new(name: impl Into<String>, fields: ClassifiedFields) -> Self {
        Self {
            name: name.into(),
            phone: fields.phone,
            address: fields.address,
            location_code: fields.location_code,
            website: fields.website,
        }
    }
}

/// スキャナの状態
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanState {
    pub last_observed_count: usize,
    pub stagnant_attempts: u32,
    pub cursor: usize,
}

/// 1回のスキャン結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanStep {
    pub references: Vec<ListingReference>,
    pub state: ScanState,
    pub exhausted: bool,
}

/// 実行の終わり方
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    /// リストを最後まで読んだ
    Exhausted,
    /// 外部から停止された
    Cancelled,
    /// 実行時間の上限に達した
    TimeBudgetExceeded,
}

/// 1クエリ分の実行サマリ
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub query: String,
    pub outcome: RunOutcome,
    pub records_scraped: usize,
    pub listings_skipped: usize,
    pub duplicates_skipped: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// 書き込みに失敗したまま残ったレコード
    pub unpersisted: Vec<BusinessRecord>,
}

impl RunSummary {
    pub fn is_fully_persisted(&self) -> bool {
        self.unpersisted.is_empty()
    }
}
