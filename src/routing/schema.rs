//! Structured output schema for classifier suggestions
//!
//! The classifier must answer with one JSON object carrying `route`,
//! `confidence`, `jobNumber` and `reason`. Any other keys it returns are
//! free-text fields and are passed through to the caller untouched.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::{Confidence, JobNumber, Route};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoutingSuggestion {
    /// Handling category, e.g. triage, update, wip, clarify, confirm
    #[schemars(with = "String")]
    pub route: Route,

    pub confidence: Confidence,

    /// Job number the classifier matched, if any
    #[serde(default)]
    pub job_number: Option<String>,

    /// Short explanation of the decision
    pub reason: String,

    #[serde(flatten)]
    #[schemars(skip)]
    pub extra: Map<String, Value>,
}

impl RoutingSuggestion {
    /// Reject suggestions that parsed but cannot be routed
    pub fn validate(&self) -> Result<(), String> {
        if self.route.as_str().is_empty() {
            return Err("route must not be empty".to_string());
        }
        Ok(())
    }

    /// The suggested job number in canonical form.
    ///
    /// Blank values and text that is not shaped like a job number count as
    /// "no suggestion".
    pub fn suggested_job(&self) -> Option<JobNumber> {
        self.job_number.as_deref().and_then(JobNumber::parse)
    }

    /// JSON schema appended to the classifier instruction
    pub fn json_schema() -> Value {
        let schema = schemars::schema_for!(RoutingSuggestion);
        serde_json::to_value(schema).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_minimal_suggestion() {
        let suggestion: RoutingSuggestion = serde_json::from_str(
            r#"{"route": "update", "confidence": "high", "jobNumber": "tow 023", "reason": "named job"}"#,
        )
        .unwrap();

        assert_eq!(suggestion.route, Route::Update);
        assert_eq!(suggestion.confidence, Confidence::High);
        assert_eq!(suggestion.suggested_job().unwrap().as_str(), "TOW 023");
        assert!(suggestion.extra.is_empty());
    }

    #[test]
    fn test_extra_fields_pass_through() {
        let suggestion: RoutingSuggestion = serde_json::from_str(
            r#"{"route": "feedback", "confidence": "medium", "jobNumber": null,
                "reason": "x", "summary": "Client loved it", "senderName": "Jo"}"#,
        )
        .unwrap();

        assert_eq!(suggestion.route, Route::Other("feedback".to_string()));
        assert_eq!(suggestion.extra["summary"], "Client loved it");
        assert!(suggestion.suggested_job().is_none());
    }

    #[test]
    fn test_missing_required_fields_fail() {
        assert!(serde_json::from_str::<RoutingSuggestion>(r#"{"confidence": "high"}"#).is_err());
        assert!(serde_json::from_str::<RoutingSuggestion>(r#"{"route": "triage"}"#).is_err());
        assert!(serde_json::from_str::<RoutingSuggestion>(
            r#"{"route": "triage", "confidence": "certain", "reason": "x"}"#
        )
        .is_err());
    }

    #[test]
    fn test_missing_reason_fails() {
        assert!(serde_json::from_str::<RoutingSuggestion>(
            r#"{"route": "update", "confidence": "high", "jobNumber": "TOW 023"}"#
        )
        .is_err());
    }

    #[test]
    fn test_blank_or_malformed_job_is_no_suggestion() {
        for raw in ["", "  ", "TBC", "TOW023"] {
            let suggestion = RoutingSuggestion {
                route: Route::Triage,
                confidence: Confidence::Low,
                job_number: Some(raw.to_string()),
                reason: String::new(),
                extra: Map::new(),
            };
            assert!(suggestion.suggested_job().is_none(), "{raw}");
        }
    }

    #[test]
    fn test_empty_route_is_invalid() {
        let suggestion: RoutingSuggestion =
            serde_json::from_str(r#"{"route": " ", "confidence": "low", "reason": "x"}"#).unwrap();
        assert!(suggestion.validate().is_err());
    }

    #[test]
    fn test_schema_generation() {
        let schema = RoutingSuggestion::json_schema();
        assert!(schema["properties"]["route"].is_object());
        assert!(schema["properties"]["confidence"].is_object());
        assert!(schema["properties"]["jobNumber"].is_object());
        assert!(schema["properties"]["reason"].is_object());

        let required = schema["required"].as_array().unwrap();
        assert!(required.contains(&serde_json::json!("reason")));
    }
}
