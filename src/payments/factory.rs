use crate::config::GatewayConfig;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentProvider;
use crate::payments::providers::{EstposProvider, PaylinkProvider, TurkpayProvider};
use crate::payments::types::ProviderName;
use crate::payments::utils::GatewayTransport;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Providers available to this process, built once at startup.
pub struct ProviderRegistry {
    providers: HashMap<ProviderName, Arc<dyn PaymentProvider>>,
    default_provider: ProviderName,
}

impl ProviderRegistry {
    pub fn new(default_provider: ProviderName) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider,
        }
    }

    /// Builds every enabled provider from its environment credentials.
    pub fn from_config(
        config: &GatewayConfig,
        transport: Arc<dyn GatewayTransport>,
    ) -> PaymentResult<Self> {
        let mut registry = Self::new(config.default_provider);
        for provider in &config.enabled_providers {
            let built: Arc<dyn PaymentProvider> = match provider {
                ProviderName::Estpos => Arc::new(EstposProvider::from_env(transport.clone())?),
                ProviderName::Paylink => Arc::new(PaylinkProvider::from_env(transport.clone())?),
                ProviderName::Turkpay => Arc::new(TurkpayProvider::from_env(transport.clone())?),
            };
            registry.register(built);
        }
        info!(
            providers = ?registry.list_available_providers(),
            default = %registry.default_provider,
            "payment providers registered"
        );
        Ok(registry)
    }

    pub fn register(&mut self, provider: Arc<dyn PaymentProvider>) -> &mut Self {
        self.providers.insert(provider.name(), provider);
        self
    }

    pub fn get(&self, provider: ProviderName) -> PaymentResult<Arc<dyn PaymentProvider>> {
        self.providers
            .get(&provider)
            .cloned()
            .ok_or_else(|| PaymentError::ValidationError {
                message: format!("provider {} is disabled", provider),
                field: Some("provider".to_string()),
            })
    }

    pub fn get_default_provider(&self) -> PaymentResult<Arc<dyn PaymentProvider>> {
        self.get(self.default_provider)
    }

    pub fn default_provider(&self) -> ProviderName {
        self.default_provider
    }

    pub fn list_available_providers(&self) -> Vec<ProviderName> {
        let mut names: Vec<ProviderName> = self.providers.keys().copied().collect();
        names.sort_by_key(|name| name.as_str());
        names
    }
}
