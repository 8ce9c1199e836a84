use anyhow::Context;
use clap::Args;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::llm::OpenAiConfig;
use crate::storage::StorageConfig;

#[derive(Debug, Args)]
pub struct DatabaseArgs {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: String,
    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,
}

impl DatabaseArgs {
    pub async fn connect(&self) -> anyhow::Result<PgPool> {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .connect(&self.database_url)
            .await
            .context("failed to connect to Postgres")
    }
}

#[derive(Debug, Args)]
pub struct StorageArgs {
    /// Base URL of the object storage service
    #[arg(long, env = "STORAGE_URL")]
    pub storage_url: String,
    #[arg(long, env = "STORAGE_SERVICE_KEY", hide_env_values = true)]
    pub storage_service_key: String,
    #[arg(long, env = "STORAGE_BUCKET", default_value = "shop-intakes")]
    pub storage_bucket: String,
}

impl StorageArgs {
    pub fn config(&self) -> StorageConfig {
        StorageConfig {
            base_url: self.storage_url.clone(),
            service_key: self.storage_service_key.clone(),
            bucket: self.storage_bucket.clone(),
        }
    }
}

#[derive(Debug, Args)]
pub struct CompletionArgs {
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: String,
    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4o-mini")]
    pub openai_model: String,
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub openai_base_url: String,
    #[arg(long, env = "OPENAI_TEMPERATURE", default_value_t = 0.2)]
    pub openai_temperature: f32,
}

impl CompletionArgs {
    pub fn config(&self) -> OpenAiConfig {
        OpenAiConfig {
            base_url: self.openai_base_url.clone(),
            api_key: self.openai_api_key.clone(),
            model: self.openai_model.clone(),
            temperature: self.openai_temperature,
        }
    }
}
