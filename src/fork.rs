//! Fork Controller - Reset and Health of the Forked Node
//!
//! Resets re-fork from the upstream archive node, which is slow and flaky
//! under load, so they run under the patient `fork_reset_policy`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::node::{fork_reset_policy, NodeError, SharedNode};
use crate::retry::{RetryExecutor, RetryPolicyError};

/// Interval between readiness checks
const READY_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Per-check timeout on the health URL
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ForkController {
    node: SharedNode,
    retry: RetryExecutor<NodeError>,
    health_url: Option<String>,
    http: reqwest::Client,
    settle_delay: Duration,
    resets: AtomicU32,
    /// Failed reset attempts that were retried
    reset_retries: Arc<AtomicU32>,
}

impl ForkController {
    pub fn new(
        node: SharedNode,
        health_url: Option<String>,
        settle_delay: Duration,
    ) -> Result<Self, RetryPolicyError> {
        let reset_retries = Arc::new(AtomicU32::new(0));
        let retry = count_retries(RetryExecutor::new(fork_reset_policy())?, &reset_retries);

        Ok(Self {
            node,
            retry,
            health_url,
            http: reqwest::Client::new(),
            settle_delay,
            resets: AtomicU32::new(0),
            reset_retries,
        })
    }

    pub fn with_retry(mut self, retry: RetryExecutor<NodeError>) -> Self {
        self.retry = count_retries(retry, &self.reset_retries);
        self
    }

    pub fn node(&self) -> &SharedNode {
        &self.node
    }

    /// Successful resets so far
    pub fn resets(&self) -> u32 {
        self.resets.load(Ordering::Relaxed)
    }

    pub fn reset_retries(&self) -> u32 {
        self.reset_retries.load(Ordering::Relaxed)
    }

    /// Rewind the fork to `block`
    pub async fn reset_to_block(&self, block: u64) -> Result<(), NodeError> {
        debug!("Resetting fork to block {}", block);
        self.retry
            .run("anvil_reset", || self.node.reset(block))
            .await?;
        self.resets.fetch_add(1, Ordering::Relaxed);

        match self.node.block_number().await {
            Ok(head) if head == block => {}
            Ok(head) => warn!("Fork head is {} after reset to {}", head, block),
            Err(e) => warn!("Could not read fork head after reset: {}", e),
        }

        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }
        Ok(())
    }

    pub async fn current_block(&self) -> Result<u64, NodeError> {
        self.node.block_number().await
    }

    /// Poll until the node answers, or give up after `max_wait`
    pub async fn wait_until_ready(&self, max_wait: Duration) -> Result<(), NodeError> {
        let started = Instant::now();

        loop {
            match self.check_ready().await {
                Ok(()) => {
                    info!("✅ Fork node ready after {:?}", started.elapsed());
                    return Ok(());
                }
                Err(reason) => debug!("Fork node not ready: {}", reason),
            }

            if started.elapsed() >= max_wait {
                return Err(NodeError::Unavailable(max_wait));
            }

            let remaining = max_wait.saturating_sub(started.elapsed());
            tokio::time::sleep(READY_POLL_INTERVAL.min(remaining)).await;
        }
    }

    async fn check_ready(&self) -> Result<(), String> {
        match &self.health_url {
            Some(url) => {
                let response = self
                    .http
                    .get(url)
                    .timeout(HEALTH_CHECK_TIMEOUT)
                    .send()
                    .await
                    .map_err(|e| e.to_string())?;
                if response.status().is_success() {
                    Ok(())
                } else {
                    Err(format!("health endpoint returned {}", response.status()))
                }
            }
            None => self
                .node
                .block_number()
                .await
                .map(|_| ())
                .map_err(|e| e.to_string()),
        }
    }
}

fn count_retries(
    retry: RetryExecutor<NodeError>,
    counter: &Arc<AtomicU32>,
) -> RetryExecutor<NodeError> {
    let counter = counter.clone();
    retry.with_observer(Arc::new(move |_attempt, _err: &NodeError, _delay| {
        counter.fetch_add(1, Ordering::Relaxed);
    }))
}
