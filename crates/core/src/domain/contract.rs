use crate::domain::narrative::Narrative;
use anyhow::ensure;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const BULLETS: usize = 3;
const MIN_TOTAL_CHARS: usize = 100;

/// The narrative as an LLM emits it, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmNarrative {
    pub executive_summary: String,
    pub strengths: Vec<String>,
    pub opportunities: Vec<String>,
    pub recommendations: Vec<String>,
    pub projection: String,
}

impl LlmNarrative {
    pub fn validate_and_into_narrative(
        self,
        generated_at: DateTime<Utc>,
    ) -> anyhow::Result<Narrative> {
        let executive_summary = self.executive_summary.trim().to_string();
        ensure!(
            !executive_summary.is_empty(),
            "executive_summary must be non-empty"
        );
        let projection = self.projection.trim().to_string();
        ensure!(!projection.is_empty(), "projection must be non-empty");

        let strengths = bullets("strengths", self.strengths)?;
        let opportunities = bullets("opportunities", self.opportunities)?;
        let recommendations = bullets("recommendations", self.recommendations)?;

        let total: usize = [&executive_summary, &projection]
            .into_iter()
            .chain(strengths.iter())
            .chain(opportunities.iter())
            .chain(recommendations.iter())
            .map(|s| s.chars().count())
            .sum();
        ensure!(
            total >= MIN_TOTAL_CHARS,
            "narrative is too short: {total} characters (minimum {MIN_TOTAL_CHARS})"
        );

        Ok(Narrative {
            generated_at,
            executive_summary,
            strengths,
            opportunities,
            recommendations,
            projection,
        })
    }
}

fn bullets(section: &str, lines: Vec<String>) -> anyhow::Result<[String; BULLETS]> {
    ensure!(
        lines.len() == BULLETS,
        "{section} must have exactly {BULLETS} lines (got {})",
        lines.len()
    );
    let trimmed: Vec<String> = lines.into_iter().map(|s| s.trim().to_string()).collect();
    ensure!(
        trimmed.iter().all(|s| !s.is_empty()),
        "{section} lines must be non-empty"
    );
    trimmed
        .try_into()
        .map_err(|_| anyhow::anyhow!("{section} must have exactly {BULLETS} lines"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> LlmNarrative {
        LlmNarrative {
            executive_summary: "  Revenue grew steadily across the quarter, led by beverages.  ".into(),
            strengths: vec![
                "Strong beverage demand".into(),
                "Loyal repeat customers".into(),
                "Stable average ticket".into(),
            ],
            opportunities: vec![
                "Bakery upsell".into(),
                "Weekend promotions".into(),
                "Bundle offers".into(),
            ],
            recommendations: vec![
                "Restock tea early".into(),
                "Review pricing".into(),
                "Track expiring stock".into(),
            ],
            projection: "Expect continued growth next month.".into(),
        }
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn accepts_and_trims_valid_output() {
        let n = sample().validate_and_into_narrative(at()).unwrap();
        assert!(n.executive_summary.starts_with("Revenue"));
        assert!(!n.executive_summary.ends_with(' '));
        assert_eq!(n.strengths[2], "Stable average ticket");
        assert_eq!(n.generated_at, at());
    }

    #[test]
    fn rejects_wrong_bullet_count() {
        let mut n = sample();
        n.opportunities.pop();
        let err = n.validate_and_into_narrative(at()).unwrap_err();
        assert!(err.to_string().contains("opportunities"));
    }

    #[test]
    fn rejects_blank_lines_and_short_text() {
        let mut blank = sample();
        blank.recommendations[1] = "   ".into();
        assert!(blank.validate_and_into_narrative(at()).is_err());

        let short = LlmNarrative {
            executive_summary: "ok".into(),
            strengths: vec!["a".into(), "b".into(), "c".into()],
            opportunities: vec!["d".into(), "e".into(), "f".into()],
            recommendations: vec!["g".into(), "h".into(), "i".into()],
            projection: "up".into(),
        };
        let err = short.validate_and_into_narrative(at()).unwrap_err();
        assert!(err.to_string().contains("too short"));
    }
}
