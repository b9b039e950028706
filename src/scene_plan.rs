use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub description: String,
    pub search_keywords: String,
    #[serde(default = "default_scene_duration")]
    pub duration: f64,
}

fn default_scene_duration() -> f64 {
    crate::assembler::CLIP_SECONDS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenePlan {
    pub scenes: Vec<Scene>,
    #[serde(default)]
    pub total_duration: f64,
}

impl ScenePlan {
    /// Parses the first balanced `{...}` region of a free-form model reply.
    pub fn from_reply(text: &str) -> PipelineResult<Self> {
        let region = extract_json_object(text)
            .ok_or_else(|| PipelineError::PlanFormat("no JSON object in reply".to_string()))?;
        let mut plan: ScenePlan = serde_json::from_str(region)
            .map_err(|e| PipelineError::PlanFormat(e.to_string()))?;

        if plan.scenes.is_empty() {
            return Err(PipelineError::PlanFormat("plan contains no scenes".to_string()));
        }
        if let Some(idx) = plan.scenes.iter().position(|s| s.duration.is_nan() || s.duration <= 0.0) {
            return Err(PipelineError::PlanFormat(format!(
                "scene {} has a non-positive duration",
                idx + 1
            )));
        }
        if plan.total_duration <= 0.0 {
            plan.total_duration = plan.scenes.iter().map(|s| s.duration).sum();
        }
        Ok(plan)
    }

    /// Narration script: scene descriptions joined with spaces.
    pub fn script(&self) -> String {
        self.scenes
            .iter()
            .map(|s| s.description.trim())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Locates the first balanced `{...}` region, ignoring braces inside JSON
/// string literals.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
