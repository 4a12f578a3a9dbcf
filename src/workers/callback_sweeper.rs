use crate::config::CallbackConfig;
use crate::services::CheckoutService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct CallbackSweeperConfig {
    /// How often expired callback state is purged.
    pub interval: Duration,
    /// How long an expired token keeps answering `Expired` before it is removed.
    pub retention: Duration,
}

impl Default for CallbackSweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            retention: Duration::from_secs(3600),
        }
    }
}

impl From<&CallbackConfig> for CallbackSweeperConfig {
    fn from(config: &CallbackConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.sweep_interval_secs),
            retention: config.retention(),
        }
    }
}

pub struct CallbackSweeper {
    checkout: Arc<CheckoutService>,
    config: CallbackSweeperConfig,
}

impl CallbackSweeper {
    pub fn new(checkout: Arc<CheckoutService>, config: CallbackSweeperConfig) -> Self {
        Self { checkout, config }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            retention_secs = self.config.retention.as_secs(),
            "callback sweeper worker started"
        );

        let mut ticker = tokio::time::interval(self.config.interval);
        // The first tick fires immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("callback sweeper worker stopping");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        warn!(error = %e, "callback sweep cycle failed");
                    }
                }
            }
        }

        info!("callback sweeper worker stopped");
    }

    pub async fn run_cycle(&self) -> anyhow::Result<usize> {
        Ok(self.checkout.sweep(self.config.retention).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::audit::InMemoryAuditLog;
    use crate::payments::callback::{CallbackStateStore, InMemoryCallbackStore};
    use crate::payments::factory::ProviderRegistry;
    use crate::payments::test_support::context;
    use crate::payments::types::ProviderName;

    fn sweeper(store: Arc<InMemoryCallbackStore>) -> CallbackSweeper {
        let checkout = CheckoutService::new(
            Arc::new(ProviderRegistry::new(ProviderName::Estpos)),
            store,
            Arc::new(InMemoryAuditLog::new()),
            Duration::ZERO,
        );
        CallbackSweeper::new(
            Arc::new(checkout),
            CallbackSweeperConfig {
                interval: Duration::from_secs(1),
                retention: Duration::ZERO,
            },
        )
    }

    #[tokio::test]
    async fn cycle_purges_expired_tokens() {
        let store = Arc::new(InMemoryCallbackStore::new(
            "https://pay.shop.example",
            Duration::ZERO,
        ));
        store
            .create(context(ProviderName::Estpos, "PAY-1", "S-1"))
            .await
            .unwrap();

        let purged = sweeper(store.clone()).run_cycle().await.unwrap();
        assert_eq!(purged, 1);
        assert!(store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_shutdown_signal() {
        let store = Arc::new(InMemoryCallbackStore::new(
            "https://pay.shop.example",
            Duration::from_secs(900),
        ));
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(sweeper(store).run(rx));

        tokio::time::advance(Duration::from_secs(3)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
