use crate::narrative::Provider;
use serde_json::Value;
use std::fmt;

const EXCERPT_CHARS: usize = 400;

/// Where in the narrator exchange things went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NarrativeStage {
    /// The provider answered with a non-success status.
    Http,
    /// The forced tool call came back, but its content failed the narrative contract.
    ToolOutput,
    /// Free-text output could not be turned into a narrative, even after repair prompts.
    Repair,
}

impl NarrativeStage {
    pub fn as_str(self) -> &'static str {
        match self {
            NarrativeStage::Http => "http",
            NarrativeStage::ToolOutput => "validate_tool_output",
            NarrativeStage::Repair => "parse_after_repair",
        }
    }
}

/// A narrator failure carrying the provider exchange, so a bad run can be replayed by hand.
#[derive(Debug, Clone)]
pub struct NarrativeDiagnosticsError {
    pub provider: Provider,
    pub stage: NarrativeStage,
    pub detail: String,
    pub raw_output: Option<String>,
    pub raw_response_json: Option<Value>,
}

impl NarrativeDiagnosticsError {
    pub fn new(provider: Provider, stage: NarrativeStage, detail: impl Into<String>) -> Self {
        Self {
            provider,
            stage,
            detail: detail.into(),
            raw_output: None,
            raw_response_json: None,
        }
    }

    pub fn with_output(mut self, raw_output: String) -> Self {
        self.raw_output = Some(raw_output);
        self
    }

    pub fn with_response(mut self, raw_response_json: Option<Value>) -> Self {
        self.raw_response_json = raw_response_json;
        self
    }

    /// The head of the model output, short enough for a log line.
    pub fn output_excerpt(&self) -> Option<String> {
        let raw = self.raw_output.as_deref()?;
        let mut chars = raw.chars();
        let head: String = chars.by_ref().take(EXCERPT_CHARS).collect();
        if chars.next().is_some() {
            Some(format!("{head}…"))
        } else {
            Some(head)
        }
    }
}

impl fmt::Display for NarrativeDiagnosticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "narrative generation failed (provider={:?}, stage={}): {}",
            self.provider,
            self.stage.as_str(),
            self.detail
        )
    }
}

impl std::error::Error for NarrativeDiagnosticsError {}
