use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::date_util::strip_code_fences;
use crate::error::{Error, Result};
use crate::metrics::ReportDataSnapshot;

const PROMPT_VERSION: &str = "narrative-v1";

/// Turns an assembled snapshot into executive prose.
///
/// Generation may fail (model unreachable, unparseable response); callers
/// must fall back to [`fallback_narrative`] so a report never ships with an
/// empty narrative when facts exist.
#[async_trait]
pub trait NarrativeGenerator: Send + Sync {
    async fn generate(&self, snapshot: &ReportDataSnapshot) -> Result<String>;
}

/// Structured narrative returned by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct NarrativeResponse {
    headline: String,
    body: String,
}

/// LLM-backed narrative generation via a mixtape agent.
pub struct LlmNarrativeGenerator {
    agent: mixtape_core::Agent,
}

impl LlmNarrativeGenerator {
    pub fn new(agent: mixtape_core::Agent) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl NarrativeGenerator for LlmNarrativeGenerator {
    async fn generate(&self, snapshot: &ReportDataSnapshot) -> Result<String> {
        let facts_json = serde_json::to_string_pretty(&snapshot.facts).unwrap_or_default();
        let comparison = &snapshot.performance.comparison;

        let prompt = format!(
            r#"Write an executive summary of this brand-visibility report ({PROMPT_VERSION}).

Brand: {brand}
Period: {start} to {end}
Current visibility: {vis:.2} (previous {prev_vis:.2})
Current share of answer: {soa:.2} (previous {prev_soa:.2})

Detected findings (ordered by severity):
{facts_json}

Respond with ONLY a JSON object (no markdown, no code fences):
{{
  "headline": "One-sentence executive summary",
  "body": "2-4 short paragraphs covering what changed, why it matters, and the competitive picture"
}}"#,
            brand = snapshot.brand.name,
            start = snapshot.period_start,
            end = snapshot.period_end,
            vis = comparison.current.visibility,
            prev_vis = comparison.previous.visibility,
            soa = comparison.current.share_of_answer,
            prev_soa = comparison.previous.share_of_answer,
        );

        let response = self
            .agent
            .run(&prompt)
            .await
            .map_err(|e| Error::Llm(e.to_string()))?;
        let text = response.text().trim().to_string();
        let json_str = strip_code_fences(&text);
        let parsed: NarrativeResponse = serde_json::from_str(json_str).map_err(|e| {
            Error::Llm(format!("Failed to parse LLM response: {e}\nResponse: {text}"))
        })?;

        Ok(format!("{}\n\n{}", parsed.headline.trim(), parsed.body.trim()))
    }
}

/// Deterministic templated narrative assembled directly from the facts.
///
/// Used whenever LLM generation fails or is not configured. Guaranteed
/// non-empty, and every detected fact appears in it.
pub fn fallback_narrative(snapshot: &ReportDataSnapshot) -> String {
    let comparison = &snapshot.performance.comparison;
    let mut lines = vec![format!(
        "{} brand visibility report, {} to {}.",
        snapshot.brand.name, snapshot.period_start, snapshot.period_end
    )];
    lines.push(format!(
        "Visibility {:.2} (previous {:.2}), share of answer {:.2} (previous {:.2}), sentiment {:.2}.",
        comparison.current.visibility,
        comparison.previous.visibility,
        comparison.current.share_of_answer,
        comparison.previous.share_of_answer,
        comparison.current.sentiment,
    ));

    if snapshot.facts.is_empty() {
        lines.push(
            "No significant changes were detected against the previous period.".to_string(),
        );
    } else {
        lines.push("Key findings this period:".to_string());
        for fact in &snapshot.facts {
            lines.push(format!("- {}", fact.description));
        }
    }

    lines.join("\n")
}
