use tracing::{info, warn};

use crate::api::TextService;
use crate::error::{PipelineError, PipelineResult};
use crate::keys::{CredentialSet, with_key_rotation};
use crate::scene_plan::ScenePlan;

pub const SCENE_COUNT: usize = 6;
pub const SCENE_SECONDS: u32 = 5;

fn director_prompt(prompt: &str) -> String {
    let total = SCENE_COUNT as u32 * SCENE_SECONDS;
    format!(
        "As an AI Director, create a detailed scene-by-scene plan for a video about: \"{prompt}\"\n\n\
         Return ONLY a JSON object with this exact structure:\n\
         {{\n  \"scenes\": [\n    {{\n      \"description\": \"A detailed description of what happens in this scene\",\n      \
         \"searchKeywords\": \"keywords for finding stock footage\",\n      \"duration\": {SCENE_SECONDS}\n    }}\n  ],\n  \
         \"totalDuration\": {total}\n}}\n\n\
         Create {SCENE_COUNT} scenes, each {SCENE_SECONDS} seconds long. Focus on visual, cinematic storytelling."
    )
}

fn translate_prompt(script: &str, language: &str) -> String {
    format!(
        "Translate the following script to {language}. Return ONLY the translated text, nothing else:\n\n{script}"
    )
}

/// Asks the text model for a shot list and parses it.
pub async fn plan_scenes(
    text: &dyn TextService,
    model: &str,
    prompt: &str,
    credentials: &CredentialSet,
) -> PipelineResult<ScenePlan> {
    let request = director_prompt(prompt);
    let request = request.as_str();

    let plan = with_key_rotation(credentials, "AI Director plan generation", |key| async move {
        let reply = text
            .generate_text(&key, model, request)
            .await?
            .filter(|t| !t.trim().is_empty())
            .ok_or(PipelineError::PlanEmpty)?;
        ScenePlan::from_reply(&reply)
    })
    .await?;

    info!(
        "Scene plan received: {} scenes, {:.1}s total",
        plan.scenes.len(),
        plan.total_duration
    );
    Ok(plan)
}

/// Translates `script`, returning it untouched if anything goes wrong.
pub async fn translate_script(
    text: &dyn TextService,
    model: &str,
    script: &str,
    language: &str,
    credentials: &CredentialSet,
) -> String {
    let request = translate_prompt(script, language);
    let request = request.as_str();

    let result = with_key_rotation(credentials, "Script translation", |key| async move {
        text.generate_text(&key, model, request).await
    })
    .await;

    match result {
        Ok(Some(translated)) if !translated.trim().is_empty() => translated.trim().to_string(),
        Ok(_) => {
            warn!("Translation to {} returned no text; keeping original script", language);
            script.to_string()
        }
        Err(err) => {
            warn!("Translation to {} failed: {}; keeping original script", language, err);
            script.to_string()
        }
    }
}
