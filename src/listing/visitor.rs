//! 1件の詳細ページ訪問

use std::time::Duration;

use tracing::{debug, warn};

use crate::config::{DetailNavigation, ScraperConfig, Selectors};
use crate::error::VisitError;
use crate::parser;
use crate::traits::{BrowserSession, ScrollDirection};

use super::scanner::wait_for_growth;
use super::types::{ListingReference, RawDetailBlocks};

/// 詳細ページへ入り、連絡先の行を取り出して、必ず元のリストへ戻る
#[derive(Debug, Clone)]
pub struct DetailVisitor {
    selectors: Selectors,
    navigation: DetailNavigation,
    detail_timeout: Duration,
    restore_timeout: Duration,
    settle_timeout: Duration,
    poll_interval: Duration,
    stagnation_threshold: u32,
}

impl DetailVisitor {
    pub fn new(config: &ScraperConfig) -> Self {
        Self {
            selectors: config.selectors.clone(),
            navigation: config.detail_navigation,
            detail_timeout: config.detail_timeout,
            restore_timeout: config.initial_list_timeout,
            settle_timeout: config.settle_timeout,
            poll_interval: config.poll_interval,
            stagnation_threshold: config.stagnation_threshold,
        }
    }

    /// 成否にかかわらずリストへの復帰を試み、復帰に失敗したら
    /// `VisitError::ContextRestore` を返す
    pub async fn visit<S: BrowserSession>(
        &self,
        session: &mut S,
        reference: &ListingReference,
    ) -> Result<RawDetailBlocks, VisitError> {
        let mut left_list = false;
        let result = self.enter_and_extract(session, reference, &mut left_list).await;

        if !left_list {
            return result;
        }

        match self.restore(session).await {
            Ok(()) => result,
            Err(message) => {
                let message = match &result {
                    Err(cause) => format!("{} (after: {})", message, cause),
                    Ok(_) => message,
                };
                Err(VisitError::ContextRestore { message })
            }
        }
    }

    async fn enter_and_extract<S: BrowserSession>(
        &self,
        session: &mut S,
        reference: &ListingReference,
        left_list: &mut bool,
    ) -> Result<RawDetailBlocks, VisitError> {
        if reference.detail_url.is_empty() {
            return Err(VisitError::MissingLink(reference.identifier.clone()));
        }

        let element = self.locate_source(session, reference).await?;
        session.scroll_into_view(&element).await?;

        match self.navigation {
            DetailNavigation::FollowLink => {
                *left_list = true;
                session
                    .navigate(&reference.detail_url)
                    .await
                    .map_err(|e| VisitError::Browser(e.to_string()))?;
            }
            DetailNavigation::IsolatedContext => {
                *left_list = true;
                session
                    .open_isolated_context(&element)
                    .await
                    .map_err(|e| VisitError::Browser(e.to_string()))?;
            }
        }

        let loaded = session
            .wait_for_presence(&self.selectors.detail_marker, self.detail_timeout)
            .await?;
        if !loaded {
            return Err(VisitError::NavigationTimeout {
                selector: self.selectors.detail_marker.clone(),
                waited: self.detail_timeout,
            });
        }

        let markup = session.current_markup().await?;
        let raw = parser::extract_detail(&markup, &self.selectors)?;
        debug!(
            "Extracted {} blocks from {} (heading={:?})",
            raw.blocks.len(),
            reference.detail_url,
            raw.detail_name
        );
        Ok(raw)
    }

    /// スキャン時の位置にある要素を取り直す。ラベルが変わっていれば
    /// ラベルで探し直す
    ///
    /// リストへ戻った直後はスキャン時より短く描画されていることがあるので、
    /// 位置に届くまでスクロールして読み込み直す（増えない状態が
    /// `stagnation_threshold` 回続いたら諦める）。
    async fn locate_source<S: BrowserSession>(
        &self,
        session: &mut S,
        reference: &ListingReference,
    ) -> Result<S::Element, VisitError> {
        let mut elements = session.locate_elements(&self.selectors.listing).await?;
        let mut stagnant_attempts = 0;

        loop {
            if let Some(index) = self.find_source(session, &elements, reference).await? {
                if index != reference.position {
                    debug!(
                        "Result '{}' moved from position {} to {}",
                        reference.identifier, reference.position, index
                    );
                }
                return Ok(elements.swap_remove(index));
            }
            if reference.position < elements.len()
                || stagnant_attempts >= self.stagnation_threshold
            {
                return Err(VisitError::ElementNotFound(format!(
                    "result '{}' at position {}",
                    reference.identifier, reference.position
                )));
            }

            let previous = elements.len();
            debug!(
                "Only {} results rendered, scrolling to reach position {}",
                previous, reference.position
            );
            session.paginate(ScrollDirection::Down).await?;
            elements = wait_for_growth(
                session,
                &self.selectors.listing,
                previous,
                self.settle_timeout,
                self.poll_interval,
            )
            .await?;
            if elements.len() > previous {
                stagnant_attempts = 0;
            } else {
                stagnant_attempts += 1;
            }
        }
    }

    async fn find_source<S: BrowserSession>(
        &self,
        session: &mut S,
        elements: &[S::Element],
        reference: &ListingReference,
    ) -> Result<Option<usize>, VisitError> {
        if let Some(element) = elements.get(reference.position) {
            let label = session.attribute(element, "aria-label").await?;
            if label.as_deref().unwrap_or_default() == reference.identifier {
                return Ok(Some(reference.position));
            }
        }

        for (index, element) in elements.iter().enumerate() {
            let label = session.attribute(element, "aria-label").await?;
            if label.as_deref().unwrap_or_default() == reference.identifier {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    async fn restore<S: BrowserSession>(&self, session: &mut S) -> Result<(), String> {
        match self.navigation {
            DetailNavigation::FollowLink => {
                session
                    .go_back()
                    .await
                    .map_err(|e| format!("navigate back failed: {}", e))?;
                let present = session
                    .wait_for_presence(&self.selectors.listing, self.restore_timeout)
                    .await
                    .map_err(|e| format!("result list check failed: {}", e))?;
                if !present {
                    warn!("Result list did not reappear after navigating back");
                    return Err(format!(
                        "result list not present after {:?}",
                        self.restore_timeout
                    ));
                }
                Ok(())
            }
            DetailNavigation::IsolatedContext => session
                .close_isolated_context()
                .await
                .map_err(|e| format!("closing detail tab failed: {}", e)),
        }
    }
}
