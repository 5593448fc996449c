use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Free-text commentary on an analysis report, as shown to the reader of the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Narrative {
    pub generated_at: DateTime<Utc>,
    pub executive_summary: String,
    pub strengths: [String; 3],
    pub opportunities: [String; 3],
    pub recommendations: [String; 3],
    pub projection: String,
}

impl Narrative {
    /// Plain-text rendering with one section per heading.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str("EXECUTIVE SUMMARY\n");
        out.push_str(&self.executive_summary);
        out.push('\n');
        for (title, bullets) in [
            ("STRENGTHS", &self.strengths),
            ("OPPORTUNITIES", &self.opportunities),
            ("RECOMMENDATIONS", &self.recommendations),
        ] {
            out.push('\n');
            out.push_str(title);
            out.push('\n');
            for (i, line) in bullets.iter().enumerate() {
                out.push_str(&format!("{}. {line}\n", i + 1));
            }
        }
        out.push_str("\nPROJECTION\n");
        out.push_str(&self.projection);
        out.push('\n');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn text_rendering_lists_numbered_bullets() {
        let n = Narrative {
            generated_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
            executive_summary: "Sales grew.".into(),
            strengths: ["a".into(), "b".into(), "c".into()],
            opportunities: ["d".into(), "e".into(), "f".into()],
            recommendations: ["g".into(), "h".into(), "i".into()],
            projection: "More growth.".into(),
        };
        let text = n.to_text();
        assert!(text.starts_with("EXECUTIVE SUMMARY\nSales grew.\n"));
        assert!(text.contains("STRENGTHS\n1. a\n2. b\n3. c\n"));
        assert!(text.contains("RECOMMENDATIONS\n1. g\n"));
        assert!(text.ends_with("PROJECTION\nMore growth.\n"));
    }
}
