use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::ScraperConfig;
use crate::error::VisitError;
use crate::traits::BrowserSession;

use super::types::ListingReference;

/// 訪問失敗時の判断
#[derive(Debug)]
pub enum RecoveryDecision {
    /// この項目を飛ばして次へ
    Skip,
    /// 実行を中断
    Abort(VisitError),
}

/// 1件の失敗で実行全体を止めないための方針
#[derive(Debug, Clone)]
pub struct RecoveryPolicy {
    listing_selector: String,
    probe_timeout: Duration,
}

impl RecoveryPolicy {
    pub fn new(config: &ScraperConfig) -> Self {
        Self {
            listing_selector: config.selectors.listing.clone(),
            probe_timeout: config.initial_list_timeout,
        }
    }

    pub async fn handle<S: BrowserSession>(
        &self,
        session: &mut S,
        reference: &ListingReference,
        error: VisitError,
    ) -> RecoveryDecision {
        warn!(
            "An error occurred while processing result {} ('{}'): kind={}, {}",
            reference.position,
            reference.identifier,
            error.kind(),
            error
        );

        if !error.is_context_restore() {
            return RecoveryDecision::Skip;
        }

        // リストがまだ操作できるかを1回だけ確認する
        match session
            .wait_for_presence(&self.listing_selector, self.probe_timeout)
            .await
        {
            Ok(true) => {
                info!(
                    "Result list still available after restore failure at {}, continuing",
                    reference.position
                );
                RecoveryDecision::Skip
            }
            Ok(false) => {
                error!("Result list is gone after restore failure, aborting run");
                RecoveryDecision::Abort(error)
            }
            Err(e) => {
                error!("Result list probe failed ({}), aborting run", e);
                RecoveryDecision::Abort(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_config, FakeListing, FakeSession};

    fn reference() -> ListingReference {
        ListingReference {
            identifier: "A".into(),
            detail_url: "https://maps.test/place/A".into(),
            position: 0,
        }
    }

    #[tokio::test]
    async fn test_visit_errors_are_skipped() {
        let policy = RecoveryPolicy::new(&test_config());
        let mut session = FakeSession::new(vec![FakeListing::new("A", &[])], 1).on_list();

        let decision = policy
            .handle(
                &mut session,
                &reference(),
                VisitError::MissingLink("A".into()),
            )
            .await;
        assert!(matches!(decision, RecoveryDecision::Skip));
    }

    #[tokio::test]
    async fn test_restore_failure_with_live_list_continues() {
        let policy = RecoveryPolicy::new(&test_config());
        let mut session = FakeSession::new(vec![FakeListing::new("A", &[])], 1).on_list();

        let decision = policy
            .handle(
                &mut session,
                &reference(),
                VisitError::ContextRestore {
                    message: "back failed".into(),
                },
            )
            .await;
        assert!(matches!(decision, RecoveryDecision::Skip));
    }

    #[tokio::test]
    async fn test_restore_failure_without_list_aborts() {
        let policy = RecoveryPolicy::new(&test_config());
        // リストが表示されていない状態
        let mut session = FakeSession::new(vec![FakeListing::new("A", &[])], 1);

        let decision = policy
            .handle(
                &mut session,
                &reference(),
                VisitError::ContextRestore {
                    message: "back failed".into(),
                },
            )
            .await;
        match decision {
            RecoveryDecision::Abort(e) => assert!(e.is_context_restore()),
            other => panic!("expected abort, got {:?}", other),
        }
    }
}
