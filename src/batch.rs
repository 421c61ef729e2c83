//! 複数クエリの一括実行
//!
//! クエリごとに新しいブラウザを起動し、結果は共通の書き込み先へ送る。
//! 検索結果が出ないなどクエリ単位の失敗は `StatusReporter` に報告して
//! 次のクエリへ進む。

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::error::ScraperError;
use crate::listing::{RunContext, RunSummary, ScrapeOrchestrator};
use crate::traits::{ResultSink, SessionFactory, StatusReporter};

/// 1件のクエリと、その報告先を特定するトークン
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryJob {
    pub query: String,
    pub correlation_token: String,
}

impl QueryJob {
    pub fn new(query: impl Into<String>, correlation_token: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            correlation_token: correlation_token.into(),
        }
    }
}

/// CSVの1列目をクエリとして読む
///
/// ヘッダを1行目として、トークンはシートの行番号。クエリが空の行は飛ばす。
#[derive(Debug, Clone)]
pub struct CsvQuerySource {
    path: PathBuf,
}

impl CsvQuerySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn jobs(&self) -> Result<Vec<QueryJob>, ScraperError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&self.path)?;

        let mut jobs = Vec::new();
        for (index, row) in reader.records().enumerate() {
            let row = row?;
            let query = row.get(0).map(str::trim).unwrap_or_default();
            if query.is_empty() {
                continue;
            }
            jobs.push(QueryJob::new(query, (index + 2).to_string()));
        }
        info!(
            "Retrieved {} search queries from {}",
            jobs.len(),
            self.path.display()
        );
        Ok(jobs)
    }
}

/// `token,status` の行を追記する
#[derive(Debug)]
pub struct CsvStatusReporter {
    path: PathBuf,
}

impl CsvStatusReporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl StatusReporter for CsvStatusReporter {
    async fn report(&mut self, correlation_token: &str, status: &str) -> Result<(), ScraperError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let needs_header = file.metadata()?.len() == 0;

        let mut writer = csv::Writer::from_writer(file);
        if needs_header {
            writer.write_record(["row", "status"])?;
        }
        writer.write_record([correlation_token, status])?;
        writer.flush()?;
        info!("Marked row {} as '{}'", correlation_token, status);
        Ok(())
    }
}

/// ログに出すだけ
#[derive(Debug, Default)]
pub struct LogStatusReporter;

#[async_trait]
impl StatusReporter for LogStatusReporter {
    async fn report(&mut self, correlation_token: &str, status: &str) -> Result<(), ScraperError> {
        warn!("Query {} finished with status '{}'", correlation_token, status);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct QueryFailure {
    pub correlation_token: String,
    pub query: String,
    pub status: String,
}

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub runs: Vec<RunSummary>,
    pub failures: Vec<QueryFailure>,
}

impl BatchSummary {
    pub fn total_records(&self) -> usize {
        self.runs.iter().map(|r| r.records_scraped).sum()
    }
}

pub struct BatchRunner<F> {
    factory: F,
    orchestrator: ScrapeOrchestrator,
}

impl<F: SessionFactory> BatchRunner<F> {
    pub fn new(factory: F, orchestrator: ScrapeOrchestrator) -> Self {
        Self {
            factory,
            orchestrator,
        }
    }

    pub async fn run<K, R>(
        &self,
        jobs: &[QueryJob],
        sink: &mut K,
        reporter: &mut R,
        ctx: &RunContext,
    ) -> BatchSummary
    where
        K: ResultSink + ?Sized,
        R: StatusReporter + ?Sized,
    {
        let config = self.orchestrator.config();
        let mut summary = BatchSummary::default();

        for (i, job) in jobs.iter().enumerate() {
            if ctx.cancel.is_cancelled() {
                info!("Stop requested, {} queries left unprocessed", jobs.len() - i);
                break;
            }
            info!(
                "Starting scraping for query: '{}' (row {})",
                job.query, job.correlation_token
            );

            let result = match self.factory.launch(config).await {
                Ok(session) => self.orchestrator.run(session, &job.query, sink, ctx).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(run) => summary.runs.push(run),
                Err(e) => {
                    let status = e.status_label();
                    error!("Query '{}' failed: {}", job.query, e);
                    if let Err(re) = reporter.report(&job.correlation_token, &status).await {
                        error!(
                            "Failed to report status for row {}: {}",
                            job.correlation_token, re
                        );
                    }
                    summary.failures.push(QueryFailure {
                        correlation_token: job.correlation_token.clone(),
                        query: job.query.clone(),
                        status,
                    });
                }
            }

            if i + 1 < jobs.len() && !config.batch_pause.is_zero() {
                tokio::select! {
                    _ = ctx.cancel.cancelled() => {}
                    _ = sleep(config.batch_pause) => {}
                }
            }
        }

        info!(
            "All search queries have been processed: {} ok, {} failed, {} records",
            summary.runs.len(),
            summary.failures.len(),
            summary.total_records()
        );
        summary
    }
}
