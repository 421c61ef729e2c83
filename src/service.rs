use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tower::Service;
use tracing::info;

use crate::chrome::ChromeLauncher;
use crate::config::{DetailNavigation, ScraperConfig};
use crate::error::ScraperError;
use crate::listing::{RunContext, RunSummary, ScrapeOrchestrator};
use crate::sink::{CsvFileSink, SinkMode};
use crate::traits::SessionFactory;

/// スクレイピングリクエスト
#[derive(Debug, Clone)]
pub struct ScrapeRequest {
    pub query: String,
    pub output_dir: PathBuf,
    pub headless: bool,
    pub navigation: DetailNavigation,
    pub sink_mode: SinkMode,
}

impl ScrapeRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            output_dir: PathBuf::from("."),
            headless: true,
            navigation: DetailNavigation::default(),
            sink_mode: SinkMode::default(),
        }
    }

    pub fn with_output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = path.into();
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_navigation(mut self, navigation: DetailNavigation) -> Self {
        self.navigation = navigation;
        self
    }

    pub fn with_sink_mode(mut self, mode: SinkMode) -> Self {
        self.sink_mode = mode;
        self
    }

    /// リクエストで指定された項目だけ上書きする
    pub fn apply_to(&self, base: ScraperConfig) -> ScraperConfig {
        base.with_headless(self.headless)
            .with_detail_navigation(self.navigation)
    }
}

impl From<ScrapeRequest> for ScraperConfig {
    fn from(req: ScrapeRequest) -> Self {
        req.apply_to(ScraperConfig::default())
    }
}

/// スクレイピング結果
#[derive(Debug)]
pub struct ScrapeResult {
    pub summary: RunSummary,
    pub csv_path: PathBuf,
}

/// tower::Serviceを実装したスクレイパーサービス
///
/// リクエストごとにブラウザを起動し、`{output_dir}/{query}_results.csv` へ書き出す。
pub struct ScraperService<F = ChromeLauncher> {
    factory: Arc<F>,
    base: ScraperConfig,
    ctx: RunContext,
}

impl ScraperService<ChromeLauncher> {
    pub fn new() -> Self {
        Self::with_factory(ChromeLauncher, ScraperConfig::default())
    }
}

impl Default for ScraperService<ChromeLauncher> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F> ScraperService<F> {
    pub fn with_factory(factory: F, base: ScraperConfig) -> Self {
        Self {
            factory: Arc::new(factory),
            base,
            ctx: RunContext::default(),
        }
    }

    /// 進捗通知と停止要求をつなぐ
    pub fn with_context(mut self, ctx: RunContext) -> Self {
        self.ctx = ctx;
        self
    }
}

impl<F> Clone for ScraperService<F> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
            base: self.base.clone(),
            ctx: self.ctx.clone(),
        }
    }
}

impl<F> Service<ScrapeRequest> for ScraperService<F>
where
    F: SessionFactory + Send + Sync + 'static,
{
    type Response = ScrapeResult;
    type Error = ScraperError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ScrapeRequest) -> Self::Future {
        info!("Scrape request received: query='{}'", req.query);

        let factory = Arc::clone(&self.factory);
        let config = req.apply_to(self.base.clone());
        let ctx = self.ctx.clone();

        Box::pin(async move {
            let mut sink = CsvFileSink::for_query(&req.output_dir, &req.query, req.sink_mode);
            let session = factory.launch(&config).await?;

            let summary = ScrapeOrchestrator::new(config)
                .run(session, &req.query, &mut sink, &ctx)
                .await?;

            let csv_path = sink.path().to_path_buf();
            info!(
                "Scrape finished: path={:?}, records={}, outcome={:?}",
                csv_path, summary.records_scraped, summary.outcome
            );

            Ok(ScrapeResult { summary, csv_path })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::{BusinessRecord, RunOutcome};
    use crate::testing::{test_config, FakeFactory, FakeListing, FakeSession};
    use tower::ServiceExt;

    #[test]
    fn test_scrape_request_builder() {
        let req = ScrapeRequest::new("vets in Turku")
            .with_output_dir("/tmp/out")
            .with_headless(false)
            .with_navigation(DetailNavigation::IsolatedContext)
            .with_sink_mode(SinkMode::Append);

        assert_eq!(req.query, "vets in Turku");
        assert_eq!(req.output_dir, PathBuf::from("/tmp/out"));
        assert!(!req.headless);
        assert_eq!(req.navigation, DetailNavigation::IsolatedContext);
        assert_eq!(req.sink_mode, SinkMode::Append);
    }

    #[test]
    fn test_scrape_request_to_config() {
        let req = ScrapeRequest::new("q")
            .with_headless(false)
            .with_navigation(DetailNavigation::IsolatedContext);
        let config: ScraperConfig = req.into();

        assert!(!config.headless);
        assert_eq!(config.detail_navigation, DetailNavigation::IsolatedContext);
        assert_eq!(config.stagnation_threshold, 3);
    }

    #[tokio::test]
    async fn test_service_writes_query_csv() {
        let dir = tempfile::tempdir().unwrap();
        let factory = FakeFactory::new(vec![Ok(FakeSession::new(
            vec![
                FakeListing::new("A", &["1 Main St", "5550100"]),
                FakeListing::new("B", &["2 Main St"]),
            ],
            2,
        ))]);
        let service = ScraperService::with_factory(factory, test_config());

        let result = service
            .oneshot(ScrapeRequest::new("bakery oslo").with_output_dir(dir.path()))
            .await
            .unwrap();

        assert_eq!(result.summary.records_scraped, 2);
        assert_eq!(result.summary.outcome, RunOutcome::Exhausted);
        assert!(result.csv_path.ends_with("bakery oslo_results.csv"));

        let mut reader = csv::Reader::from_path(&result.csv_path).unwrap();
        let rows: Vec<BusinessRecord> = reader.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].phone.as_deref(), Some("5550100"));
    }

    #[tokio::test]
    async fn test_service_propagates_launch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let factory = FakeFactory::new(vec![Err(ScraperError::BrowserInit("no chrome".into()))]);
        let service = ScraperService::with_factory(factory, test_config());

        let err = service
            .oneshot(ScrapeRequest::new("q").with_output_dir(dir.path()))
            .await
            .unwrap_err();
        assert_eq!(err.status_label(), "WebDriver Error");
    }
}
