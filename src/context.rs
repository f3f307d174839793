use crate::config::AppConfig;
use crate::database::Database;
use crate::ledger::SignalLedger;
use crate::reference::ReferenceClient;
use anyhow::Result;

#[derive(Clone)]
pub struct AppContext {
    config: AppConfig,
}

impl AppContext {
    pub async fn initialize(config: AppConfig) -> Result<Self> {
        Ok(Self { config })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn database(&self) -> Result<Database> {
        Database::new(self.config.require_database_url()?).await
    }

    pub fn ledger(&self) -> SignalLedger {
        SignalLedger::new(self.config.data_dir.clone())
    }

    pub fn reference_client(&self) -> Result<ReferenceClient> {
        ReferenceClient::new(&self.config.reference_api_url, &self.config.api_key)
    }
}
