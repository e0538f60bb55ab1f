use std::sync::Arc;

use anyhow::{Context, Result};

use crate::{aliases::DbPool, api::fedapay::FedaPayClient, config::Config};

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub fedapay: FedaPayClient,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, db_pool: DbPool) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.fedapay.timeout)
            .build()
            .context("Failed to build HTTP client")?;
        let fedapay = FedaPayClient::new(http_client, &config.fedapay);

        Ok(Self {
            db_pool,
            fedapay,
            config: Arc::new(config),
        })
    }
}
