//! places-scraper コマンド
//!
//! ```text
//! places-scraper run "coffee in Reykjavik" --output-dir ./out
//! places-scraper batch --input cities.csv --status status.csv
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use places_scraper::batch::{BatchRunner, CsvQuerySource, CsvStatusReporter};
use places_scraper::chrome::ChromeLauncher;
use places_scraper::config::{DetailNavigation, ScraperConfig};
use places_scraper::listing::{RunContext, ScrapeOrchestrator};
use places_scraper::service::{ScrapeRequest, ScraperService};
use places_scraper::sink::{CsvFileSink, SinkMode};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "places-scraper")]
#[command(about = "Collect business contact details from a scrolling search result list")]
struct Cli {
    /// デバッグログを出す
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// 1クエリを実行して `{query}_results.csv` に書き出す
    Run {
        query: String,

        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        #[command(flatten)]
        browser: BrowserArgs,
    },
    /// CSVの1列目のクエリを順に実行する
    Batch {
        #[arg(long)]
        input: PathBuf,

        /// 失敗したクエリの `row,status` を追記するCSV
        #[arg(long, default_value = "status.csv")]
        status: PathBuf,

        #[arg(long, default_value = "results.csv")]
        output: PathBuf,

        #[command(flatten)]
        browser: BrowserArgs,
    },
}

#[derive(Debug, Args)]
struct BrowserArgs {
    /// ブラウザを表示する
    #[arg(long)]
    headful: bool,

    /// 詳細ページを別タブで開く
    #[arg(long)]
    isolated: bool,

    /// 既存のCSVに追記する
    #[arg(long)]
    append: bool,

    #[arg(long, env = "CHROME_PATH")]
    chrome_path: Option<String>,

    /// 1クエリの実行時間上限（秒）
    #[arg(long, default_value_t = 1800)]
    max_run_secs: u64,
}

impl BrowserArgs {
    fn navigation(&self) -> DetailNavigation {
        if self.isolated {
            DetailNavigation::IsolatedContext
        } else {
            DetailNavigation::FollowLink
        }
    }

    fn sink_mode(&self) -> SinkMode {
        if self.append {
            SinkMode::Append
        } else {
            SinkMode::Rewrite
        }
    }

    fn config(&self, debug: bool) -> ScraperConfig {
        let mut config = ScraperConfig::new()
            .with_headless(!self.headful)
            .with_debug(debug)
            .with_detail_navigation(self.navigation())
            .with_max_run_duration(std::time::Duration::from_secs(self.max_run_secs));
        if let Some(path) = &self.chrome_path {
            config = config.with_chrome_executable(path.clone());
        }
        config
    }
}

/// 進捗表示タスクと Ctrl-C による停止要求をつなぐ
fn run_context() -> RunContext {
    let (tx, mut rx) = mpsc::unbounded_channel::<usize>();
    tokio::spawn(async move {
        while let Some(count) = rx.recv().await {
            info!("Scraped {} listings", count);
        }
    });

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Stop requested, finishing current listing");
            token.cancel();
        }
    });

    RunContext::new(Arc::new(tx), cancel)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ログ設定
    let default_filter = if cli.verbose {
        "info,places_scraper=debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let ctx = run_context();

    match cli.command {
        Commands::Run {
            query,
            output_dir,
            browser,
        } => {
            let service = ScraperService::with_factory(ChromeLauncher, browser.config(cli.verbose))
                .with_context(ctx);
            let request = ScrapeRequest::new(query.clone())
                .with_output_dir(output_dir)
                .with_headless(!browser.headful)
                .with_navigation(browser.navigation())
                .with_sink_mode(browser.sink_mode());

            let result = service
                .oneshot(request)
                .await
                .with_context(|| format!("scraping '{}' failed", query))?;

            println!(
                "{} records ({:?}) -> {}",
                result.summary.records_scraped,
                result.summary.outcome,
                result.csv_path.display()
            );
            if !result.summary.is_fully_persisted() {
                anyhow::bail!(
                    "{} records could not be written to {}",
                    result.summary.unpersisted.len(),
                    result.csv_path.display()
                );
            }
        }
        Commands::Batch {
            input,
            status,
            output,
            browser,
        } => {
            let jobs = CsvQuerySource::new(&input)
                .jobs()
                .with_context(|| format!("failed to read queries from {}", input.display()))?;
            let runner = BatchRunner::new(
                ChromeLauncher,
                ScrapeOrchestrator::new(browser.config(cli.verbose)),
            );
            let mut sink = CsvFileSink::new(&output, browser.sink_mode());
            let mut reporter = CsvStatusReporter::new(&status);

            let summary = runner.run(&jobs, &mut sink, &mut reporter, &ctx).await;

            println!(
                "{} queries ok, {} failed, {} records -> {}",
                summary.runs.len(),
                summary.failures.len(),
                summary.total_records(),
                output.display()
            );
        }
    }

    Ok(())
}
