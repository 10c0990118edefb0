use serde::Deserialize;
use serde_json::json;

use crate::llm::provider::ResponseFormat;

/// Quality-control verdict on a candidate reply. Lives for one turn only.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Evaluation {
    pub is_acceptable: bool,
    pub feedback: String,
}

pub fn evaluation_format() -> ResponseFormat {
    ResponseFormat {
        name: "Evaluation".to_string(),
        schema: json!({
            "type": "object",
            "properties": {
                "is_acceptable": {"type": "boolean"},
                "feedback": {"type": "string"}
            },
            "required": ["is_acceptable", "feedback"],
            "additionalProperties": false
        }),
    }
}

/// Parses the evaluator's structured output. A fenced ```json block is
/// accepted since some providers wrap structured output in markdown.
pub fn parse_evaluation(content: &str) -> Result<Evaluation, String> {
    let body = strip_code_fence(content.trim());
    serde_json::from_str(body).map_err(|err| format!("{err} in {:?}", truncate(body, 200)))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::{Evaluation, evaluation_format, parse_evaluation};

    #[test]
    fn parses_plain_json_verdict() {
        let verdict =
            parse_evaluation(r#"{"is_acceptable": false, "feedback": "Too casual."}"#).expect("verdict");
        assert_eq!(
            verdict,
            Evaluation {
                is_acceptable: false,
                feedback: "Too casual.".to_string(),
            }
        );
    }

    #[test]
    fn parses_fenced_verdict() {
        let verdict = parse_evaluation("```json\n{\"is_acceptable\": true, \"feedback\": \"ok\"}\n```")
            .expect("verdict");
        assert!(verdict.is_acceptable);
        assert_eq!(verdict.feedback, "ok");
    }

    #[test]
    fn rejects_non_conformant_output() {
        assert!(parse_evaluation("Looks good to me!").is_err());
        assert!(parse_evaluation(r#"{"is_acceptable": "yes"}"#).is_err());
    }

    #[test]
    fn schema_requires_both_fields() {
        let format = evaluation_format();
        assert_eq!(format.name, "Evaluation");
        assert_eq!(
            format.schema["required"],
            serde_json::json!(["is_acceptable", "feedback"])
        );
    }
}
