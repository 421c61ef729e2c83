//! 検索結果リストの列挙とスクロールによる追加読み込み

use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::ScraperConfig;
use crate::error::ScraperError;
use crate::traits::{BrowserSession, ScrollDirection};

use super::types::{ListingReference, ScanState, ScanStep};

const LABEL_ATTRIBUTE: &str = "aria-label";
const LINK_ATTRIBUTE: &str = "href";

/// 検索結果リストのスキャナ
///
/// カーソルより後ろの項目を返し、全て返し終えたらスクロールする。
/// スクロールしても件数が増えない状態が `stagnation_threshold` 回続いたら
/// 終端とみなす。読み込みが途中で止まったリストと本当の終端は区別できない。
#[derive(Debug, Clone)]
pub struct ResultListScanner {
    selector: String,
    stagnation_threshold: u32,
    settle_timeout: Duration,
    poll_interval: Duration,
}

impl ResultListScanner {
    pub fn new(config: &ScraperConfig) -> Self {
        Self {
            selector: config.selectors.listing.clone(),
            stagnation_threshold: config.stagnation_threshold,
            settle_timeout: config.settle_timeout,
            poll_interval: config.poll_interval,
        }
    }

    pub async fn scan<S: BrowserSession>(
        &self,
        session: &mut S,
        state: ScanState,
    ) -> Result<ScanStep, ScraperError> {
        let mut state = state;
        let mut elements = session.locate_elements(&self.selector).await?;
        debug!("Found {} results (cursor={})", elements.len(), state.cursor);

        if state.cursor >= elements.len() {
            let previous = elements.len();
            session.paginate(ScrollDirection::Down).await?;
            elements = wait_for_growth(
                session,
                &self.selector,
                previous,
                self.settle_timeout,
                self.poll_interval,
            )
            .await?;

            if elements.len() > previous {
                info!("New results loaded after scrolling: {} -> {}", previous, elements.len());
                state.stagnant_attempts = 0;
            } else {
                state.stagnant_attempts += 1;
                debug!(
                    "No new results after scrolling ({}/{})",
                    state.stagnant_attempts, self.stagnation_threshold
                );
            }
            state.last_observed_count = elements.len();

            if state.stagnant_attempts >= self.stagnation_threshold {
                info!(
                    "No new results after {} scroll attempts, list exhausted at {} items",
                    state.stagnant_attempts,
                    elements.len()
                );
                return Ok(ScanStep {
                    references: Vec::new(),
                    state,
                    exhausted: true,
                });
            }
        }

        state.last_observed_count = elements.len();
        let mut references = Vec::new();
        for (position, element) in elements.iter().enumerate().skip(state.cursor) {
            match self.reference_for(session, element, position).await {
                Ok(Some(reference)) => references.push(reference),
                Ok(None) => {}
                Err(e) => warn!("Failed to read result at position {}: {}", position, e),
            }
        }
        state.cursor = state.cursor.max(elements.len());

        Ok(ScanStep {
            references,
            state,
            exhausted: false,
        })
    }

    async fn reference_for<S: BrowserSession>(
        &self,
        session: &mut S,
        element: &S::Element,
        position: usize,
    ) -> Result<Option<ListingReference>, ScraperError> {
        let identifier = session
            .attribute(element, LABEL_ATTRIBUTE)
            .await?
            .unwrap_or_default();

        match session.attribute(element, LINK_ATTRIBUTE).await? {
            Some(detail_url) if !detail_url.is_empty() => Ok(Some(ListingReference {
                identifier,
                detail_url,
                position,
            })),
            _ => {
                warn!(
                    "No href found for result at position {} ({}), skipping",
                    position, identifier
                );
                Ok(None)
            }
        }
    }
}

/// 件数が `previous` を超えるか `settle_timeout` が過ぎるまでリストを再取得する
pub(super) async fn wait_for_growth<S: BrowserSession>(
    session: &mut S,
    selector: &str,
    previous: usize,
    settle_timeout: Duration,
    poll_interval: Duration,
) -> Result<Vec<S::Element>, ScraperError> {
    let start = Instant::now();
    loop {
        let elements = session.locate_elements(selector).await?;
        if elements.len() > previous || start.elapsed() >= settle_timeout {
            return Ok(elements);
        }
        sleep(poll_interval).await;
    }
}
