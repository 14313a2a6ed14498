//! Structured feedback produced by the analysis step.
//!
//! Model output drifts from run to run: one answer uses `tips`, the next uses
//! `strengths`/`weaknesses`, a third mixes both. Each category is therefore a
//! tagged union of the shapes we know, plus an [`CategoryFeedback::Unstructured`]
//! variant that keeps whatever arrived verbatim. Accessors work on every
//! variant and degrade to empty values instead of failing, so a renderer can
//! always show *something* (or "no data").
//!
//! Serialising a [`FeedbackReport`] reproduces the JSON it was parsed from:
//! unknown top-level keys are kept in [`FeedbackReport::extra`] and
//! unrecognised categories in their raw form.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// An integer score in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct Score(u8);

impl Score {
    pub const MAX: u8 = 100;

    pub fn new(value: u64) -> Option<Self> {
        (value <= Self::MAX as u64).then_some(Score(value as u8))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn band(self) -> ScoreBand {
        ScoreBand::of(self)
    }

    fn from_json(value: Option<&Value>) -> Option<Self> {
        value.and_then(Value::as_u64).and_then(Score::new)
    }
}

impl TryFrom<u64> for Score {
    type Error = String;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Score::new(value).ok_or_else(|| format!("score {value} is outside 0..=100"))
    }
}

impl From<Score> for u64 {
    fn from(score: Score) -> Self {
        score.0 as u64
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/100", self.0)
    }
}

/// Coarse rating used for badges: above 69 is strong, above 39 is fair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreBand {
    Strong,
    Fair,
    Weak,
}

impl ScoreBand {
    pub fn of(score: Score) -> Self {
        match score.value() {
            70..=100 => ScoreBand::Strong,
            40..=69 => ScoreBand::Fair,
            _ => ScoreBand::Weak,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ScoreBand::Strong => "Strong",
            ScoreBand::Fair => "Fair",
            ScoreBand::Weak => "Needs work",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TipKind {
    Good,
    Improve,
}

/// One tagged remark, e.g. `{"type": "improve", "tip": "...", "explanation": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Tip {
    #[serde(rename = "type")]
    pub kind: TipKind,
    pub tip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl Tip {
    /// Read a tip field by field, ignoring keys it does not know.
    fn from_loose(value: &Value) -> Option<Self> {
        let kind = match value.get("type").and_then(Value::as_str)? {
            "good" => TipKind::Good,
            "improve" => TipKind::Improve,
            _ => return None,
        };
        Some(Tip {
            kind,
            tip: value.get("tip").and_then(Value::as_str)?.to_string(),
            explanation: value
                .get("explanation")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

/// Category expressed purely as a list of tips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TipsCategory {
    pub score: Score,
    pub tips: Vec<Tip>,
}

/// Category expressed as prose plus strength/weakness lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NarrativeCategory {
    pub score: Score,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strengths: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weaknesses: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<Vec<String>>,
}

/// Feedback for one of the four résumé categories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CategoryFeedback {
    Tips(TipsCategory),
    Narrative(NarrativeCategory),
    /// Anything else the model produced, kept as-is.
    Unstructured(Value),
}

impl CategoryFeedback {
    pub fn score(&self) -> Option<Score> {
        match self {
            CategoryFeedback::Tips(c) => Some(c.score),
            CategoryFeedback::Narrative(c) => Some(c.score),
            CategoryFeedback::Unstructured(v) => Score::from_json(v.get("score")),
        }
    }

    /// Tips in the category. On an unstructured payload extra keys are
    /// ignored and entries without a `type` and `tip` are skipped.
    pub fn tips(&self) -> Vec<Tip> {
        match self {
            CategoryFeedback::Tips(c) => c.tips.clone(),
            CategoryFeedback::Narrative(_) => Vec::new(),
            CategoryFeedback::Unstructured(v) => v
                .get("tips")
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(Tip::from_loose).collect())
                .unwrap_or_default(),
        }
    }

    /// Prose analysis; `analysis` wins over `summary`, empty strings count as absent.
    pub fn summary(&self) -> Option<&str> {
        let (analysis, summary) = match self {
            CategoryFeedback::Tips(_) => return None,
            CategoryFeedback::Narrative(c) => (c.analysis.as_deref(), c.summary.as_deref()),
            CategoryFeedback::Unstructured(v) => (
                v.get("analysis").and_then(Value::as_str),
                v.get("summary").and_then(Value::as_str),
            ),
        };
        analysis
            .filter(|s| !s.is_empty())
            .or(summary.filter(|s| !s.is_empty()))
    }

    pub fn strengths(&self) -> Vec<&str> {
        self.string_list("strengths", |c| c.strengths.as_deref())
    }

    pub fn weaknesses(&self) -> Vec<&str> {
        self.string_list("weaknesses", |c| c.weaknesses.as_deref())
    }

    pub fn recommendations(&self) -> Vec<&str> {
        self.string_list("recommendations", |c| c.recommendations.as_deref())
    }

    /// True when there is nothing at all to show for this category.
    pub fn is_empty(&self) -> bool {
        self.score().is_none()
            && self.tips().is_empty()
            && self.summary().is_none()
            && self.strengths().is_empty()
            && self.weaknesses().is_empty()
            && self.recommendations().is_empty()
    }

    fn string_list<'a>(
        &'a self,
        key: &str,
        typed: impl Fn(&'a NarrativeCategory) -> Option<&'a [String]>,
    ) -> Vec<&'a str> {
        match self {
            CategoryFeedback::Tips(_) => Vec::new(),
            CategoryFeedback::Narrative(c) => typed(c)
                .map(|items| items.iter().map(String::as_str).collect())
                .unwrap_or_default(),
            CategoryFeedback::Unstructured(v) => v
                .get(key)
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default(),
        }
    }
}

/// A single ATS suggestion: plain text or a tagged tip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AtsSuggestion {
    Text(String),
    Tip(Tip),
}

impl AtsSuggestion {
    pub fn text(&self) -> &str {
        match self {
            AtsSuggestion::Text(s) => s,
            AtsSuggestion::Tip(t) => &t.tip,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtsReport {
    pub score: Score,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tips: Option<Vec<AtsSuggestion>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<AtsSuggestion>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// ATS compatibility block. Models use either `tips` or `suggestions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AtsFeedback {
    Structured(AtsReport),
    Unstructured(Value),
}

impl AtsFeedback {
    pub fn score(&self) -> Option<Score> {
        match self {
            AtsFeedback::Structured(r) => Some(r.score),
            AtsFeedback::Unstructured(v) => Score::from_json(v.get("score")),
        }
    }

    /// Suggestion texts from the first non-empty of `tips` and `suggestions`.
    pub fn suggestions(&self) -> Vec<&str> {
        match self {
            AtsFeedback::Structured(r) => [r.tips.as_deref(), r.suggestions.as_deref()]
                .into_iter()
                .flatten()
                .find(|items| !items.is_empty())
                .map(|items| items.iter().map(AtsSuggestion::text).collect())
                .unwrap_or_default(),
            AtsFeedback::Unstructured(v) => ["tips", "suggestions"]
                .iter()
                .filter_map(|key| v.get(*key).and_then(Value::as_array))
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|item| {
                            item.as_str()
                                .or_else(|| item.get("tip").and_then(Value::as_str))
                        })
                        .collect::<Vec<_>>()
                })
                .find(|texts| !texts.is_empty())
                .unwrap_or_default(),
        }
    }
}

/// The four scored résumé categories, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    ToneAndStyle,
    Content,
    Structure,
    Skills,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::ToneAndStyle,
        Category::Content,
        Category::Structure,
        Category::Skills,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Category::ToneAndStyle => "Tone & Style",
            Category::Content => "Content",
            Category::Structure => "Structure",
            Category::Skills => "Skills",
        }
    }
}

/// Full structured review of one résumé.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone_and_style: Option<CategoryFeedback>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<CategoryFeedback>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structure: Option<CategoryFeedback>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skills: Option<CategoryFeedback>,
    #[serde(rename = "ATS", default, skip_serializing_if = "Option::is_none")]
    pub ats: Option<AtsFeedback>,
    /// Top-level keys we do not model (e.g. `overallScore`).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FeedbackReport {
    pub fn category(&self, category: Category) -> Option<&CategoryFeedback> {
        match category {
            Category::ToneAndStyle => self.tone_and_style.as_ref(),
            Category::Content => self.content.as_ref(),
            Category::Structure => self.structure.as_ref(),
            Category::Skills => self.skills.as_ref(),
        }
    }

    /// `overallScore` when the model supplied a valid one, otherwise the
    /// rounded mean of the category scores that are present.
    pub fn overall_score(&self) -> Option<Score> {
        if let Some(score) = Score::from_json(self.extra.get("overallScore")) {
            return Some(score);
        }
        let scores: Vec<u64> = Category::ALL
            .iter()
            .filter_map(|c| self.category(*c).and_then(CategoryFeedback::score))
            .map(u64::from)
            .collect();
        if scores.is_empty() {
            return None;
        }
        let n = scores.len() as u64;
        Score::new((scores.iter().sum::<u64>() + n / 2) / n)
    }

    pub fn ats_score(&self) -> Option<Score> {
        self.ats.as_ref().and_then(AtsFeedback::score)
    }

    pub fn ats_suggestions(&self) -> Vec<&str> {
        self.ats
            .as_ref()
            .map(AtsFeedback::suggestions)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "overallScore": 74,
            "toneAndStyle": {
                "score": 82,
                "tips": [
                    {"type": "good", "tip": "Confident voice", "explanation": "Active verbs throughout."},
                    {"type": "improve", "tip": "Trim adjectives"}
                ]
            },
            "content": {
                "score": 65,
                "analysis": "Solid experience, thin on metrics.",
                "strengths": ["Relevant roles"],
                "weaknesses": ["No numbers"],
                "recommendations": ["Quantify impact"]
            },
            "structure": {"score": 70, "summary": "Clear sections.", "tips": []},
            "skills": "Strong backend skills",
            "ATS": {"score": 58, "suggestions": ["Add keywords from the job description"]}
        })
    }

    #[test]
    fn known_shapes_are_recognised() {
        let report: FeedbackReport = serde_json::from_value(sample()).unwrap();
        assert!(matches!(report.tone_and_style, Some(CategoryFeedback::Tips(_))));
        assert!(matches!(report.content, Some(CategoryFeedback::Narrative(_))));
        // tips + summary together is not a known shape
        assert!(matches!(report.structure, Some(CategoryFeedback::Unstructured(_))));
        assert!(matches!(report.skills, Some(CategoryFeedback::Unstructured(_))));
        assert!(matches!(report.ats, Some(AtsFeedback::Structured(_))));
    }

    #[test]
    fn serialising_reproduces_the_source_json() {
        let original = sample();
        let report: FeedbackReport = serde_json::from_value(original.clone()).unwrap();
        assert_eq!(serde_json::to_value(&report).unwrap(), original);
    }

    #[test]
    fn accessors_degrade_on_unstructured_payloads() {
        let report: FeedbackReport = serde_json::from_value(sample()).unwrap();

        let structure = report.structure.as_ref().unwrap();
        assert_eq!(structure.score(), Score::new(70));
        assert_eq!(structure.summary(), Some("Clear sections."));
        assert!(structure.tips().is_empty());

        let skills = report.skills.as_ref().unwrap();
        assert_eq!(skills.score(), None);
        assert!(skills.is_empty());

        let content = report.content.as_ref().unwrap();
        assert_eq!(content.summary(), Some("Solid experience, thin on metrics."));
        assert_eq!(content.recommendations(), vec!["Quantify impact"]);
    }

    #[test]
    fn unstructured_tips_keep_entries_with_extra_keys() {
        let category: CategoryFeedback = serde_json::from_value(json!({
            "score": 70,
            "summary": "s",
            "tips": [
                {"type": "good", "tip": "kept"},
                {"type": "improve", "tip": "Add metrics", "priority": "high", "explanation": "Numbers sell"},
                {"type": "improve"},
                {"type": "meh", "tip": "unknown kind"},
                "bare string"
            ]
        }))
        .unwrap();
        assert!(matches!(category, CategoryFeedback::Unstructured(_)));

        let tips = category.tips();
        assert_eq!(tips.len(), 2);
        assert_eq!(tips[0].tip, "kept");
        assert_eq!(tips[1].kind, TipKind::Improve);
        assert_eq!(tips[1].tip, "Add metrics");
        assert_eq!(tips[1].explanation.as_deref(), Some("Numbers sell"));
    }

    #[test]
    fn out_of_range_score_falls_back_to_raw() {
        let value = json!({"score": 140, "tips": []});
        let category: CategoryFeedback = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(category, CategoryFeedback::Unstructured(value));
        assert_eq!(category.score(), None);
    }

    #[test]
    fn ats_first_non_empty_list_wins() {
        let ats: AtsFeedback = serde_json::from_value(json!({
            "score": 40,
            "tips": [],
            "suggestions": ["Use standard headings"]
        }))
        .unwrap();
        assert_eq!(ats.suggestions(), vec!["Use standard headings"]);

        let ats: AtsFeedback = serde_json::from_value(json!({
            "score": 40,
            "tips": [{"type": "improve", "tip": "Avoid tables"}],
            "suggestions": ["Use standard headings"]
        }))
        .unwrap();
        assert_eq!(ats.suggestions(), vec!["Avoid tables"]);

        let ats: AtsFeedback =
            serde_json::from_value(json!({"score": "high", "tips": [{"tip": "x"}, 3]})).unwrap();
        assert!(matches!(ats, AtsFeedback::Unstructured(_)));
        assert_eq!(ats.score(), None);
        assert_eq!(ats.suggestions(), vec!["x"]);
    }

    #[test]
    fn overall_score_prefers_model_value_then_mean() {
        let report: FeedbackReport = serde_json::from_value(sample()).unwrap();
        assert_eq!(report.overall_score(), Score::new(74));

        let report: FeedbackReport = serde_json::from_value(json!({
            "toneAndStyle": {"score": 80, "tips": []},
            "content": {"score": 61}
        }))
        .unwrap();
        assert_eq!(report.overall_score(), Score::new(71));

        assert_eq!(FeedbackReport::default().overall_score(), None);
    }

    #[test]
    fn score_bands() {
        assert_eq!(Score::new(70).unwrap().band(), ScoreBand::Strong);
        assert_eq!(Score::new(69).unwrap().band(), ScoreBand::Fair);
        assert_eq!(Score::new(40).unwrap().band(), ScoreBand::Fair);
        assert_eq!(Score::new(39).unwrap().band(), ScoreBand::Weak);
        assert!(Score::new(101).is_none());
        assert_eq!(Score::new(7).unwrap().to_string(), "7/100");
    }
}
