use crate::config::Settings;
use crate::domain::contract::LlmNarrative;
use crate::domain::narrative::Narrative;
use crate::domain::report::AnalysisReport;
use crate::narrative::error::{NarrativeDiagnosticsError, NarrativeStage};
use crate::narrative::{json, report_digest, NarrativeGenerator, Provider};
use anyhow::Context;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";
const DEFAULT_MAX_TOKENS: u32 = 1024;
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const REPAIR_ATTEMPTS: u32 = 1;

const TOOL_NAME_EMIT_NARRATIVE: &str = "emit_narrative";

#[derive(Debug, Clone)]
pub struct AnthropicNarrator {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicNarrator {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_anthropic_api_key()?.to_string();
        let base_url = settings
            .anthropic_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model = settings
            .anthropic_model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let max_tokens = settings.anthropic_max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
        let timeout_secs = settings
            .anthropic_timeout_secs
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
            model,
            max_tokens,
        })
    }

    async fn create_message(
        &self,
        req: CreateMessageRequest,
    ) -> anyhow::Result<(serde_json::Value, CreateMessageResponse)> {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_str(&self.api_key)?);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let res = self
            .http
            .post(url)
            .headers(headers)
            .json(&req)
            .send()
            .await
            .context("Anthropic request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Anthropic response body")?;
        if !status.is_success() {
            let raw_response_json = serde_json::from_str::<serde_json::Value>(&text).ok();
            return Err(NarrativeDiagnosticsError::new(
                Provider::Anthropic,
                NarrativeStage::Http,
                format!("status={status}"),
            )
            .with_output(text)
            .with_response(raw_response_json)
            .into());
        }

        let raw_json = serde_json::from_str::<serde_json::Value>(&text)
            .with_context(|| format!("failed to parse Anthropic response JSON: {text}"))?;
        let parsed = serde_json::from_value::<CreateMessageResponse>(raw_json.clone())
            .context("failed to decode Anthropic response into CreateMessageResponse")?;
        Ok((raw_json, parsed))
    }

    fn request(&self, max_tokens: u32, prompt: String) -> CreateMessageRequest {
        CreateMessageRequest {
            model: self.model.clone(),
            max_tokens,
            system: Some(Self::system_prompt()),
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
            tools: Some(Self::tools()),
            tool_choice: Some(Self::tool_choice()),
        }
    }

    fn tools() -> Vec<Tool> {
        let bullets = serde_json::json!({
            "type": "array",
            "minItems": 3,
            "maxItems": 3,
            "items": {"type": "string"}
        });
        let schema = serde_json::json!({
            "type": "object",
            "additionalProperties": false,
            "required": ["executive_summary", "strengths", "opportunities", "recommendations", "projection"],
            "properties": {
                "executive_summary": {"type": "string"},
                "strengths": bullets,
                "opportunities": bullets,
                "recommendations": bullets,
                "projection": {"type": "string"}
            }
        });

        vec![Tool {
            name: TOOL_NAME_EMIT_NARRATIVE,
            description: "Emit the sales report commentary as structured JSON",
            input_schema: schema,
        }]
    }

    fn tool_choice() -> ToolChoice {
        ToolChoice::Tool {
            name: TOOL_NAME_EMIT_NARRATIVE,
        }
    }

    fn system_prompt() -> String {
        [
            "You are a retail sales analyst writing commentary for a business owner.",
            "Use only the figures provided. Do not invent numbers.",
            "Return ONLY valid JSON with these keys:",
            "executive_summary (2-3 sentences), strengths (exactly 3 short lines),",
            "opportunities (exactly 3 short lines), recommendations (exactly 3 actionable lines),",
            "projection (1-2 sentences on the forecast and its confidence).",
            "No markdown. No extra keys.",
        ]
        .join("\n")
    }

    fn user_prompt(report: &AnalysisReport) -> String {
        format!(
            "Write the commentary for this sales analysis.\n\nFigures:\n{}",
            report_digest(report)
        )
    }

    fn repair_prompt(previous_output: &str) -> String {
        format!(
            "Your previous message was NOT valid JSON for the required schema.\n\n\
TASK: Output ONLY a single JSON object with keys executive_summary, strengths, opportunities, \
recommendations, projection.\n\
- strengths, opportunities and recommendations MUST each have exactly 3 non-empty strings.\n\
- Do NOT include any markdown, prose, or code fences.\n\n\
INVALID OUTPUT (for reference only; DO NOT copy verbatim):\n{previous_output}"
        )
    }

    fn response_text(res: &CreateMessageResponse) -> String {
        let mut out = String::new();
        for block in &res.content {
            if let ContentBlock::Text { text } = block {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(text);
            }
        }
        out
    }

    fn response_tool_narrative(res: &CreateMessageResponse) -> anyhow::Result<Option<LlmNarrative>> {
        for block in &res.content {
            if let ContentBlock::ToolUse { name, input, .. } = block {
                if name == TOOL_NAME_EMIT_NARRATIVE {
                    let parsed = serde_json::from_value::<LlmNarrative>(input.clone())
                        .context("failed to decode tool_use.input into LlmNarrative")?;
                    return Ok(Some(parsed));
                }
            }
        }
        Ok(None)
    }

    async fn try_parse_with_repairs(
        &self,
        generated_at: DateTime<Utc>,
        initial_text: String,
        initial_raw_json: serde_json::Value,
    ) -> anyhow::Result<Narrative> {
        let mut last_err = match json::parse_narrative(&initial_text, generated_at) {
            Ok(narrative) => return Ok(narrative),
            Err(err) => err,
        };
        let mut last_text = initial_text;
        let mut last_raw_json = initial_raw_json;

        for attempt in 1..=REPAIR_ATTEMPTS {
            let req = self.request(self.max_tokens, Self::repair_prompt(&last_text));
            let (raw_json, res) = self.create_message(req).await?;
            let text = match Self::response_tool_narrative(&res)? {
                Some(tool) => serde_json::to_string(&tool)?,
                None => Self::response_text(&res),
            };
            match json::parse_narrative(&text, generated_at) {
                Ok(narrative) => return Ok(narrative),
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "narrative still invalid after repair attempt");
                    last_err = err;
                    last_text = text;
                    last_raw_json = raw_json;
                }
            }
        }

        Err(NarrativeDiagnosticsError::new(
            Provider::Anthropic,
            NarrativeStage::Repair,
            format!("final_error={last_err}"),
        )
        .with_output(last_text)
        .with_response(Some(last_raw_json))
        .into())
    }
}

#[async_trait::async_trait]
impl NarrativeGenerator for AnthropicNarrator {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn generate(&self, report: &AnalysisReport) -> anyhow::Result<Narrative> {
        let prompt = Self::user_prompt(report);
        let (mut raw_json, mut res) = self
            .create_message(self.request(self.max_tokens, prompt.clone()))
            .await?;

        if matches!(res.stop_reason.as_deref(), Some("max_tokens")) {
            let bumped = self.max_tokens.saturating_mul(2).max(2048);
            tracing::warn!(
                from = self.max_tokens,
                to = bumped,
                "Anthropic stop_reason=max_tokens; retrying once with higher max_tokens"
            );
            let (rj, r) = self.create_message(self.request(bumped, prompt)).await?;
            raw_json = rj;
            res = r;
        }

        let generated_at = Utc::now();
        if let Some(tool) = Self::response_tool_narrative(&res)? {
            return tool.validate_and_into_narrative(generated_at).map_err(|err| {
                NarrativeDiagnosticsError::new(
                    Provider::Anthropic,
                    NarrativeStage::ToolOutput,
                    err.to_string(),
                )
                .with_response(Some(raw_json))
                .into()
            });
        }

        let text = Self::response_text(&res);
        self.try_parse_with_repairs(generated_at, text, raw_json)
            .await
    }
}

#[derive(Debug, Clone, Serialize)]
struct CreateMessageRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,

    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CreateMessageResponse {
    content: Vec<ContentBlock>,

    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct Tool {
    name: &'static str,
    description: &'static str,
    input_schema: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
enum ToolChoice {
    #[serde(rename = "tool")]
    Tool { name: &'static str },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "tool_use")]
    ToolUse {
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },

    #[serde(other)]
    Unknown,
}
