use std::sync::Arc;
use std::time::Instant;

use tracing::warn;

use crate::context::Context;
use crate::errors::{ServiceFailure, ServiceResult};
use crate::retry::RetryPolicy;
use crate::upstream::{SupplierDirectory, SupplierRecord, UpstreamError};

/// Supplier lookups against the injected directory capability. Applies the
/// context deadline to every attempt and retries idempotent reads once when
/// the failure class and the remaining budget allow it.
pub struct SupplierService {
    directory: Arc<dyn SupplierDirectory>,
    retry: RetryPolicy,
}

impl SupplierService {
    pub fn new(directory: Arc<dyn SupplierDirectory>, retry: RetryPolicy) -> Self {
        Self { directory, retry }
    }

    pub async fn fetch(&self, ctx: &Context, supplier_id: &str) -> ServiceResult<SupplierRecord> {
        let started = Instant::now();
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let Some(remaining) = ctx.deadline.checked_sub(started.elapsed()) else {
                return Err(deadline_exhausted());
            };
            match self.directory.fetch_supplier(supplier_id, remaining).await {
                Ok(rec) => return Ok(rec),
                Err(UpstreamError::Status(404)) => return Err(ServiceFailure::not_found("supplier")),
                Err(err) => {
                    let retryable = err.retryable();
                    let budget_left = ctx
                        .deadline
                        .checked_sub(started.elapsed() + self.retry.backoff_for(attempt))
                        .is_some();
                    if self.retry.should_retry(attempt, retryable) && budget_left {
                        warn!(
                            request_id = %ctx.request_id,
                            supplier_id,
                            attempt,
                            error = %err,
                            "supplier fetch failed, retrying"
                        );
                        self.retry.wait_before_retry(attempt).await;
                        continue;
                    }
                    return Err(classify(err));
                }
            }
        }
    }
}

fn deadline_exhausted() -> ServiceFailure {
    ServiceFailure::Upstream {
        message: "supplier directory deadline exceeded".to_string(),
        retryable: true,
    }
}

fn classify(err: UpstreamError) -> ServiceFailure {
    let retryable = err.retryable();
    match err {
        UpstreamError::Timeout => deadline_exhausted(),
        other => ServiceFailure::Upstream { message: other.to_string(), retryable },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct FlakyDirectory {
        calls: AtomicU32,
        fail_first: u32,
        failure: fn() -> UpstreamError,
    }

    impl FlakyDirectory {
        fn new(fail_first: u32, failure: fn() -> UpstreamError) -> Self {
            Self { calls: AtomicU32::new(0), fail_first, failure }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SupplierDirectory for FlakyDirectory {
        async fn fetch_supplier(
            &self,
            id: &str,
            _deadline: Duration,
        ) -> Result<SupplierRecord, UpstreamError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err((self.failure)());
            }
            Ok(SupplierRecord {
                supplier_id: id.to_string(),
                name: "Acme Components".to_string(),
                status: "active".to_string(),
            })
        }
    }

    fn ctx() -> Context {
        Context::new(Duration::from_secs(5))
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(2), true)
    }

    #[tokio::test]
    async fn retries_once_after_retryable_failure() {
        let dir = Arc::new(FlakyDirectory::new(1, || UpstreamError::Status(503)));
        let svc = SupplierService::new(dir.clone(), fast_retry());
        let rec = svc.fetch(&ctx(), "sup-1").await.expect("second attempt ok");
        assert_eq!(rec.supplier_id, "sup-1");
        assert_eq!(dir.calls(), 2);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_upstream_failure() {
        let dir = Arc::new(FlakyDirectory::new(u32::MAX, || UpstreamError::Timeout));
        let svc = SupplierService::new(dir.clone(), fast_retry());
        let err = svc.fetch(&ctx(), "sup-1").await.expect_err("keeps failing");
        assert!(matches!(err, ServiceFailure::Upstream { retryable: true, .. }));
        assert_eq!(dir.calls(), 2);
    }

    #[tokio::test]
    async fn missing_supplier_maps_to_not_found_without_retry() {
        let dir = Arc::new(FlakyDirectory::new(u32::MAX, || UpstreamError::Status(404)));
        let svc = SupplierService::new(dir.clone(), fast_retry());
        let err = svc.fetch(&ctx(), "nope").await.expect_err("404");
        assert!(matches!(err, ServiceFailure::NotFound(_)));
        assert_eq!(dir.calls(), 1);
    }

    #[tokio::test]
    async fn non_retryable_status_fails_fast() {
        let dir = Arc::new(FlakyDirectory::new(u32::MAX, || UpstreamError::Status(400)));
        let svc = SupplierService::new(dir.clone(), fast_retry());
        let err = svc.fetch(&ctx(), "sup-1").await.expect_err("400");
        assert!(matches!(err, ServiceFailure::Upstream { retryable: false, .. }));
        assert_eq!(dir.calls(), 1);
    }

    #[tokio::test]
    async fn disabled_retry_makes_a_single_attempt() {
        let dir = Arc::new(FlakyDirectory::new(1, || UpstreamError::Status(503)));
        let svc = SupplierService::new(dir.clone(), RetryPolicy::single_retry(false));
        let err = svc.fetch(&ctx(), "sup-1").await.expect_err("no retry");
        assert!(matches!(err, ServiceFailure::Upstream { .. }));
        assert_eq!(dir.calls(), 1);
    }
}
