//! Planning action handler.
//!
//! Turns numbered plan text into structured steps and vets a plan for
//! length and obviously destructive steps before anything executes it.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use keel_core::types::{ActionResult, Params};

use crate::error::ActionError;
use crate::handler::{required_str, ActionHandler};

/// Phrases that mark a plan step as potentially destructive.
pub const UNSAFE_KEYWORDS: [&str; 5] = [
    "delete all",
    "format",
    "remove system",
    "modify registry",
    "erase",
];

/// Matches `1. do x`, `2) do y`, `Step 3: do z`.
static STEP_LINE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    RegexBuilder::new(r"^(?:Step\s+)?(\d+)[.):]?\s+(.+)$")
        .case_insensitive(true)
        .build()
        .ok()
});

/// One numbered step of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub step_number: u32,
    pub description: String,
    #[serde(default)]
    pub completed: bool,
}

/// A step flagged by plan validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanIssue {
    pub step: usize,
    pub issue: String,
    pub severity: &'static str,
}

/// Parse every numbered line of `text` into a step. Other lines are skipped.
pub fn parse_plan(text: &str) -> Vec<PlanStep> {
    let Some(re) = STEP_LINE.as_ref() else {
        return Vec::new();
    };
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let caps = re.captures(line)?;
            let step_number = caps.get(1)?.as_str().parse().ok()?;
            Some(PlanStep {
                step_number,
                description: caps.get(2)?.as_str().trim().to_string(),
                completed: false,
            })
        })
        .collect()
}

/// Flag each step whose description contains an unsafe keyword.
///
/// Steps are numbered from 1 by position, not by their own step number.
pub fn find_unsafe_steps(descriptions: &[String]) -> Vec<PlanIssue> {
    let mut issues = Vec::new();
    for (i, desc) in descriptions.iter().enumerate() {
        let lowered = desc.to_lowercase();
        for keyword in UNSAFE_KEYWORDS {
            if lowered.contains(keyword) {
                issues.push(PlanIssue {
                    step: i + 1,
                    issue: format!("Step contains potentially unsafe operation: '{}'", keyword),
                    severity: "high",
                });
            }
        }
    }
    issues
}

/// Handler for `plan_parse` and `plan_validate`.
pub struct PlanningHandler {
    max_steps: usize,
}

impl PlanningHandler {
    pub fn new(max_steps: usize) -> Self {
        Self { max_steps }
    }

    fn parse(&self, params: &Params) -> Result<ActionResult, ActionError> {
        let text = required_str(params, "text", "Plan text is required")?;
        let steps = parse_plan(text);
        let count = steps.len();
        let steps = serde_json::to_value(&steps).map_err(keel_core::KeelError::from)?;

        Ok(ActionResult::ok(Params::new())
            .with_data("steps", steps)
            .with_data("step_count", count))
    }

    fn validate(&self, params: &Params) -> Result<ActionResult, ActionError> {
        let descriptions = step_descriptions(params.get("steps"))?;
        if descriptions.is_empty() {
            return Err(ActionError::InvalidParams("No steps provided".to_string()));
        }

        if descriptions.len() > self.max_steps {
            return Ok(ActionResult::failure(format!(
                "Plan has too many steps ({}). Maximum allowed: {}",
                descriptions.len(),
                self.max_steps
            ))
            .with_data(
                "suggestion",
                "Please simplify the task or break it into smaller sub-tasks",
            ));
        }

        let issues = find_unsafe_steps(&descriptions);
        if !issues.is_empty() {
            tracing::warn!(issues = issues.len(), "Plan flagged as unsafe");
            let issues = serde_json::to_value(&issues).map_err(keel_core::KeelError::from)?;
            return Ok(ActionResult::failure("Plan contains potentially unsafe steps")
                .with_data("issues", issues)
                .with_data(
                    "suggestion",
                    "Please review the highlighted steps and ensure they are safe to execute",
                ));
        }

        Ok(ActionResult::ok(Params::new())
            .with_data("message", "Plan is valid and safe to execute")
            .with_data("step_count", descriptions.len()))
    }
}

/// Steps may be given as strings or as `{"description": ...}` objects.
fn step_descriptions(steps: Option<&Value>) -> Result<Vec<String>, ActionError> {
    let steps = match steps {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(ActionError::InvalidParams(
                "steps must be a list".to_string(),
            ))
        }
    };

    Ok(steps
        .iter()
        .map(|step| match step {
            Value::String(s) => s.clone(),
            other => other
                .get("description")
                .and_then(|d| d.as_str())
                .unwrap_or_default()
                .to_string(),
        })
        .collect())
}

#[async_trait]
impl ActionHandler for PlanningHandler {
    fn name(&self) -> &str {
        "planning"
    }

    async fn execute(&self, action: &str, params: &Params) -> Result<ActionResult, ActionError> {
        match action {
            "plan_parse" => self.parse(params),
            "plan_validate" => self.validate(params),
            _ => Ok(ActionResult::failure(format!(
                "Unknown planning action: {}",
                action
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Params {
        match value {
            Value::Object(map) => map,
            _ => panic!("params must be an object"),
        }
    }

    #[test]
    fn test_parse_numbering_styles() {
        let text = "Here is the plan:\n\
                    1. Open the report\n\
                    2) Summarize section two\n\
                    Step 3: Email the summary\n\
                    step 4 Archive the file\n\
                    \n\
                    Good luck!";
        let steps = parse_plan(text);
        assert_eq!(steps.len(), 4);
        assert_eq!(steps[0].step_number, 1);
        assert_eq!(steps[0].description, "Open the report");
        assert_eq!(steps[1].description, "Summarize section two");
        assert_eq!(steps[2].step_number, 3);
        assert_eq!(steps[2].description, "Email the summary");
        assert_eq!(steps[3].description, "Archive the file");
        assert!(steps.iter().all(|s| !s.completed));
    }

    #[test]
    fn test_parse_ignores_unnumbered_text() {
        assert!(parse_plan("no steps\njust prose").is_empty());
        assert!(parse_plan("").is_empty());
    }

    #[test]
    fn test_find_unsafe_steps_case_insensitive() {
        let steps = vec![
            "Back up documents".to_string(),
            "Then FORMAT the drive".to_string(),
            "Delete all temp files and erase logs".to_string(),
        ];
        let issues = find_unsafe_steps(&steps);
        let flagged: Vec<usize> = issues.iter().map(|i| i.step).collect();
        assert_eq!(flagged, vec![2, 3, 3]);
        assert!(issues[0].issue.contains("'format'"));
    }

    #[tokio::test]
    async fn test_plan_parse_action() {
        let handler = PlanningHandler::new(10);
        let result = handler
            .execute("plan_parse", &params(json!({"text": "1. a\n2. b"})))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.data.get("step_count"), Some(&json!(2)));
        assert_eq!(
            result.data["steps"][1],
            json!({"step_number": 2, "description": "b", "completed": false})
        );
    }

    #[tokio::test]
    async fn test_plan_parse_requires_text() {
        let handler = PlanningHandler::new(10);
        let err = handler.execute("plan_parse", &Params::new()).await.unwrap_err();
        assert!(matches!(err, ActionError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn test_validate_safe_plan() {
        let handler = PlanningHandler::new(10);
        let result = handler
            .execute(
                "plan_validate",
                &params(json!({"steps": ["Open editor", {"description": "Write notes"}]})),
            )
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.data.get("step_count"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_validate_too_many_steps() {
        let handler = PlanningHandler::new(2);
        let result = handler
            .execute("plan_validate", &params(json!({"steps": ["a", "b", "c"]})))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("Plan has too many steps (3). Maximum allowed: 2")
        );
        assert!(result.suggestion().is_some());
    }

    #[tokio::test]
    async fn test_validate_flags_unsafe_steps() {
        let handler = PlanningHandler::new(10);
        let result = handler
            .execute(
                "plan_validate",
                &params(json!({"steps": [{"description": "Modify registry keys"}]})),
            )
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.data["issues"][0]["step"], json!(1));
        assert_eq!(result.data["issues"][0]["severity"], json!("high"));
    }

    #[tokio::test]
    async fn test_validate_requires_steps() {
        let handler = PlanningHandler::new(10);
        assert!(matches!(
            handler.execute("plan_validate", &Params::new()).await,
            Err(ActionError::InvalidParams(_))
        ));
        assert!(matches!(
            handler
                .execute("plan_validate", &params(json!({"steps": "1. a"})))
                .await,
            Err(ActionError::InvalidParams(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_planning_action() {
        let handler = PlanningHandler::new(10);
        let result = handler.execute("plan_task", &Params::new()).await.unwrap();
        assert!(!result.success);
    }
}
