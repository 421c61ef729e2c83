//! 1クエリ分の巡回: スキャン → 重複除外 → 訪問 → 分類 → 書き込み → 進捗通知

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ScraperConfig;
use crate::error::ScraperError;
use crate::traits::{BrowserSession, NoProgress, ProgressChannel, ResultSink};

use super::classifier::classify;
use super::dedup::DedupTracker;
use super::recovery::{RecoveryDecision, RecoveryPolicy};
use super::scanner::ResultListScanner;
use super::types::{
    BusinessRecord, ListingReference, RawDetailBlocks, RunOutcome, RunSummary, ScanState,
    NOT_AVAILABLE,
};
use super::visitor::DetailVisitor;

/// エンジンの外側（UIなど）とのやりとり
///
/// 進捗は送りっぱなし、停止要求は項目と項目の間でのみ確認する。
#[derive(Clone)]
pub struct RunContext {
    pub progress: Arc<dyn ProgressChannel>,
    pub cancel: CancellationToken,
}

impl RunContext {
    pub fn new(progress: Arc<dyn ProgressChannel>, cancel: CancellationToken) -> Self {
        Self { progress, cancel }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new(Arc::new(NoProgress), CancellationToken::new())
    }
}

/// 実行中の集計
#[derive(Debug, Default)]
struct RunTally {
    records_scraped: usize,
    listings_skipped: usize,
    duplicates_skipped: usize,
    pending: Vec<BusinessRecord>,
}

pub struct ScrapeOrchestrator {
    config: ScraperConfig,
    scanner: ResultListScanner,
    visitor: DetailVisitor,
    recovery: RecoveryPolicy,
}

impl ScrapeOrchestrator {
    pub fn new(config: ScraperConfig) -> Self {
        Self {
            scanner: ResultListScanner::new(&config),
            visitor: DetailVisitor::new(&config),
            recovery: RecoveryPolicy::new(&config),
            config,
        }
    }

    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }

    /// セッションを受け取って1クエリ分を実行する
    ///
    /// どの経路で終わってもセッションは1回だけ解放される。
    pub async fn run<S, K>(
        &self,
        mut session: S,
        query: &str,
        sink: &mut K,
        ctx: &RunContext,
    ) -> Result<RunSummary, ScraperError>
    where
        S: BrowserSession,
        K: ResultSink + ?Sized,
    {
        let started_at = Utc::now();
        let mut tally = RunTally::default();

        let result = self.drive(&mut session, query, sink, ctx, &mut tally).await;

        self.flush_with_retry(sink, &mut tally.pending).await;

        info!("Closing browser...");
        if let Err(e) = session.release().await {
            warn!("Failed to release browser session: {}", e);
        }

        match result {
            Ok(outcome) => {
                info!(
                    "Finished scraping '{}': {:?}, {} records, {} skipped, {} duplicates",
                    query,
                    outcome,
                    tally.records_scraped,
                    tally.listings_skipped,
                    tally.duplicates_skipped
                );
                Ok(RunSummary {
                    query: query.to_string(),
                    outcome,
                    records_scraped: tally.records_scraped,
                    listings_skipped: tally.listings_skipped,
                    duplicates_skipped: tally.duplicates_skipped,
                    started_at,
                    finished_at: Utc::now(),
                    unpersisted: tally.pending,
                })
            }
            Err(e) => {
                error!("Scraping '{}' aborted: {}", query, e);
                if !tally.pending.is_empty() {
                    // 書き込めなかった分はログに残す
                    match serde_json::to_string(&tally.pending) {
                        Ok(json) => error!("Unpersisted records: {}", json),
                        Err(se) => error!("Failed to serialize unpersisted records: {}", se),
                    }
                }
                Err(e)
            }
        }
    }

    async fn drive<S, K>(
        &self,
        session: &mut S,
        query: &str,
        sink: &mut K,
        ctx: &RunContext,
        tally: &mut RunTally,
    ) -> Result<RunOutcome, ScraperError>
    where
        S: BrowserSession,
        K: ResultSink + ?Sized,
    {
        let deadline = Instant::now().checked_add(self.config.max_run_duration);
        let url = self.config.search_url(query);
        info!("Navigating to URL: {}", url);
        session.navigate(&url).await?;

        let listed = session
            .wait_for_presence(
                &self.config.selectors.listing,
                self.config.initial_list_timeout,
            )
            .await?;
        if !listed {
            return Err(ScraperError::InitialListTimeout {
                query: query.to_string(),
                waited: self.config.initial_list_timeout,
            });
        }

        let mut state = ScanState::default();
        let mut dedup = DedupTracker::new();

        loop {
            if let Some(outcome) = self.should_stop(ctx, deadline) {
                return Ok(outcome);
            }

            let step = self.scanner.scan(session, state).await?;
            state = step.state;
            if step.exhausted {
                return Ok(RunOutcome::Exhausted);
            }

            for reference in step.references {
                if let Some(outcome) = self.should_stop(ctx, deadline) {
                    return Ok(outcome);
                }

                if !dedup.is_new(&reference.identifier) {
                    debug!(
                        "Skipping already processed result: '{}' at {}",
                        reference.identifier, reference.position
                    );
                    tally.duplicates_skipped += 1;
                    continue;
                }
                dedup.mark_seen(&reference.identifier);

                match self.visitor.visit(session, &reference).await {
                    Ok(raw) => {
                        let record = build_record(&reference, raw);
                        info!(
                            "{}, {:?}, {:?}, {:?}, {}",
                            record.name,
                            record.phone,
                            record.address,
                            record.location_code,
                            record.website
                        );
                        tally.pending.push(record);
                        tally.records_scraped += 1;
                        self.flush(sink, &mut tally.pending).await;
                        ctx.progress.emit(tally.records_scraped);
                    }
                    Err(e) => match self.recovery.handle(session, &reference, e).await {
                        RecoveryDecision::Skip => tally.listings_skipped += 1,
                        RecoveryDecision::Abort(e) => return Err(ScraperError::ContextLost(e)),
                    },
                }
            }
        }
    }

    fn should_stop(&self, ctx: &RunContext, deadline: Option<Instant>) -> Option<RunOutcome> {
        if ctx.cancel.is_cancelled() {
            info!("Stop requested, ending scraping");
            return Some(RunOutcome::Cancelled);
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            warn!(
                "Run exceeded {:?}, ending scraping",
                self.config.max_run_duration
            );
            return Some(RunOutcome::TimeBudgetExceeded);
        }
        None
    }

    /// 溜まっているレコードを1回だけ書き込む。失敗したら次の機会まで保持
    async fn flush<K: ResultSink + ?Sized>(&self, sink: &mut K, pending: &mut Vec<BusinessRecord>) {
        if pending.is_empty() {
            return;
        }
        match sink.append(pending.as_slice()).await {
            Ok(()) => pending.clear(),
            Err(e) => warn!("Failed to write {} records, will retry: {}", pending.len(), e),
        }
    }

    /// 実行終了時の書き込み（指数バックオフで再試行）
    async fn flush_with_retry<K: ResultSink + ?Sized>(
        &self,
        sink: &mut K,
        pending: &mut Vec<BusinessRecord>,
    ) {
        let attempts = self.config.sink_retries.max(1);
        for attempt in 0..attempts {
            if pending.is_empty() {
                return;
            }
            match sink.append(pending.as_slice()).await {
                Ok(()) => {
                    info!("Wrote {} pending records", pending.len());
                    pending.clear();
                    return;
                }
                Err(e) => {
                    let backoff = backoff_for(self.config.sink_retry_backoff, attempt);
                    warn!(
                        "Write attempt {} failed, retrying in {:?}: {}",
                        attempt + 1,
                        backoff,
                        e
                    );
                    if attempt + 1 < attempts {
                        sleep(backoff).await;
                    }
                }
            }
        }
        if !pending.is_empty() {
            error!("{} records could not be written", pending.len());
        }
    }
}

fn backoff_for(initial: Duration, attempt: u32) -> Duration {
    initial.saturating_mul(2u32.saturating_pow(attempt))
}

/// 見出しがあればそれを店名に、なければスキャン時のラベルを使う
fn build_record(reference: &ListingReference, raw: RawDetailBlocks) -> BusinessRecord {
    let fields = classify(&raw.blocks);
    let name = match raw.detail_name {
        Some(heading) if !heading.is_empty() => {
            if heading != reference.identifier {
                debug!(
                    "Detail heading '{}' differs from result label '{}'",
                    heading, reference.identifier
                );
            }
            heading
        }
        _ if !reference.identifier.is_empty() => reference.identifier.clone(),
        _ => NOT_AVAILABLE.to_string(),
    };
    BusinessRecord::new(name, fields)
}
