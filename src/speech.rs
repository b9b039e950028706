use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::info;

use crate::api::{SpeechPayload, SpeechService};
use crate::error::{PipelineError, PipelineResult};
use crate::keys::{CredentialSet, with_key_rotation};
use crate::media::{AssetStore, MediaAsset, MediaKind};

const DEFAULT_PCM_RATE: u32 = 24_000;

/// Renders narration through the speech model and stores the audio.
pub async fn synthesize_speech(
    speech: &dyn SpeechService,
    store: &AssetStore,
    text: &str,
    voice_model: &str,
    credentials: &CredentialSet,
) -> PipelineResult<MediaAsset> {
    let payload = with_key_rotation(credentials, "Text-to-speech generation", |key| async move {
        speech
            .generate_speech(&key, voice_model, text)
            .await?
            .filter(|p| !p.data_base64.trim().is_empty())
            .ok_or(PipelineError::NoAudioContent)
    })
    .await?;

    let (extension, bytes) = decode_payload(&payload)?;
    info!("Voiceover decoded: {} bytes ({})", bytes.len(), extension);
    Ok(store.put(MediaKind::Audio, extension, bytes).await?)
}

/// Base64-decodes the payload; raw PCM gets a WAV header so ffmpeg can read it.
pub fn decode_payload(payload: &SpeechPayload) -> PipelineResult<(&'static str, Vec<u8>)> {
    let raw = STANDARD
        .decode(payload.data_base64.trim())
        .map_err(|e| PipelineError::AudioDecode(e.to_string()))?;
    if raw.is_empty() {
        return Err(PipelineError::NoAudioContent);
    }

    match payload.mime_type.as_deref().map(str::to_ascii_lowercase) {
        Some(mime) if mime.starts_with("audio/l16") || mime.starts_with("audio/pcm") => {
            let rate = pcm_rate(&mime).unwrap_or(DEFAULT_PCM_RATE);
            Ok(("wav", wrap_pcm_as_wav(&raw, rate, 1)))
        }
        Some(mime) if mime.contains("wav") => Ok(("wav", raw)),
        _ => Ok(("mp3", raw)),
    }
}

fn pcm_rate(mime: &str) -> Option<u32> {
    mime.split(';')
        .filter_map(|p| p.trim().strip_prefix("rate="))
        .find_map(|v| v.parse().ok())
}

fn wrap_pcm_as_wav(pcm: &[u8], sample_rate: u32, channels: u16) -> Vec<u8> {
    let bits_per_sample: u16 = 16;
    let block_align = channels * bits_per_sample / 8;
    let byte_rate = sample_rate * block_align as u32;
    let data_len = pcm.len() as u32;

    let mut out = Vec::with_capacity(44 + pcm.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&bits_per_sample.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.extend_from_slice(pcm);
    out
}
