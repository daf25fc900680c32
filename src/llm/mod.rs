pub mod narrative;

use crate::error::{Error, Result};
use crate::storage::repository;
use crate::storage::Database;

const DEFAULT_PROVIDER: &str = "bedrock";
const DEFAULT_MODEL: &str = "claude-sonnet-4-5";

/// Create the mixtape Agent that backs narrative generation, configured
/// from the warehouse's `llm_provider` / `llm_model` settings.
pub async fn narrative_agent(db: &Database) -> Result<mixtape_core::Agent> {
    let (provider, model) = db
        .reader()
        .call(|conn| {
            let provider = repository::get_config(conn, "llm_provider")?;
            let model = repository::get_config(conn, "llm_model")?;
            Ok::<(Option<String>, Option<String>), rusqlite::Error>((provider, model))
        })
        .await?;

    build_agent(
        provider.as_deref().unwrap_or(DEFAULT_PROVIDER),
        model.as_deref().unwrap_or(DEFAULT_MODEL),
    )
    .await
}

async fn build_agent(provider: &str, model_name: &str) -> Result<mixtape_core::Agent> {
    let wants_haiku = matches!(model_name, "claude-haiku-4-5" | "haiku");

    // Each arm needs its own builder call since the model types differ.
    match (provider, wants_haiku) {
        ("bedrock", true) => mixtape_core::Agent::builder()
            .bedrock(mixtape_core::ClaudeHaiku4_5)
            .build()
            .await
            .map_err(|e| Error::Llm(e.to_string())),
        ("bedrock", false) => mixtape_core::Agent::builder()
            .bedrock(mixtape_core::ClaudeSonnet4_5)
            .build()
            .await
            .map_err(|e| Error::Llm(e.to_string())),
        ("anthropic", true) => mixtape_core::Agent::builder()
            .anthropic_from_env(mixtape_core::ClaudeHaiku4_5)
            .build()
            .await
            .map_err(|e| Error::Llm(e.to_string())),
        ("anthropic", false) => mixtape_core::Agent::builder()
            .anthropic_from_env(mixtape_core::ClaudeSonnet4_5)
            .build()
            .await
            .map_err(|e| Error::Llm(e.to_string())),
        (other, _) => Err(Error::Config(format!("unknown llm_provider: {other}"))),
    }
}
