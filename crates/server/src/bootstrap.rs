use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use dealforge_agent::llm::{LlmError, OpenRouterClient};
use dealforge_agent::prompts::{PromptBuilder, PromptError};
use dealforge_agent::retriever::InMemoryRetriever;
use dealforge_agent::runner::{FlowRunner, RunnerConfig};
use dealforge_agent::steps::{StepConfig, StepContext};
use dealforge_core::config::{AppConfig, ConfigError, LoadOptions};
use dealforge_core::{CompanyProfile, ProfileError};
use dealforge_db::{connect, migrations, DbPool, SqlAlertRepository, SqlFlowRunRepository};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runner: FlowRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("company profile failed to load: {0}")]
    Profile(#[from] ProfileError),
    #[error("llm client setup failed: {0}")]
    Llm(#[from] LlmError),
    #[error("prompt templates failed to load: {0}")]
    Templates(#[from] PromptError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "bootstrap_start", "starting application bootstrap");

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "migrations_applied", "database migrations applied");

    let profile = CompanyProfile::load_from_path(&config.profile.path)?;
    info!(
        event_name = "profile_loaded",
        brand = %profile.identity.brand_name,
        services = profile.services.len(),
        "company profile loaded"
    );

    let llm = OpenRouterClient::from_config(&config.llm)?;

    // Service descriptions double as the proposal knowledge base until a
    // real document index is wired in.
    let retriever = InMemoryRetriever::with_documents(
        profile
            .services
            .iter()
            .map(|service| {
                (
                    format!("service:{}", service.name),
                    format!("{}\n{}", service.name, service.description),
                )
            })
            .collect(),
    );

    let ctx = StepContext {
        profile: Arc::new(profile),
        llm: Arc::new(llm),
        retriever: Arc::new(retriever),
        alerts: Arc::new(SqlAlertRepository::new(db_pool.clone())),
        prompts: PromptBuilder::new()?,
        config: StepConfig::from_app_config(&config),
    };
    let runner = FlowRunner::new(
        ctx,
        Arc::new(SqlFlowRunRepository::new(db_pool.clone())),
        RunnerConfig { step_max_retries: config.orchestrator.step_max_retries },
    );

    Ok(Application { config, db_pool, runner })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use dealforge_core::config::{ConfigOverrides, LoadOptions};

    use super::bootstrap;

    fn profile_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp profile");
        write!(
            file,
            r#"{{
                "identity": {{"brand_name": "Dealforge Consulting"}},
                "services": [
                    {{"name": "Cloud Migration", "description": "Lift and modernize workloads."}}
                ]
            }}"#
        )
        .expect("write profile");
        file
    }

    fn options(database_url: &str, profile_path: std::path::PathBuf) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                profile_path: Some(profile_path),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_applies_migrations_and_builds_runner() {
        let profile = profile_file();
        let app = bootstrap(options("sqlite::memory:?cache=shared", profile.path().to_path_buf()))
            .await
            .expect("bootstrap should succeed");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('flow_run', 'alert')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("expected baseline tables after bootstrap");
        assert_eq!(table_count, 2);

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_on_missing_profile() {
        let result = bootstrap(options(
            "sqlite::memory:?cache=shared",
            std::path::PathBuf::from("/nonexistent/profile.json"),
        ))
        .await;
        let message = result.err().expect("error").to_string();
        assert!(message.contains("company profile"));
    }
}
