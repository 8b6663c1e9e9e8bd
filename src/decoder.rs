//! Generate response decoder
//!
//! Turns the frames of a StreamGenerate response into a [`ModelOutput`].
//!
//! Offsets (all inside the JSON string at frame index 2):
//! - `[1]`            conversation metadata `[cid, rid]`
//! - `[4]`            candidate list
//! - candidate `[0]`  rcid, `[1][0]` text, `[22][0]` card text,
//!   `[37][0][0]` thoughts, `[12][1]` web images, `[12][7][0]` generated images
//!
//! Decoding is a pure function returning [`DecodeFailure`]; the caller
//! decides what the failure means for the session.

use crate::constants::ErrorCode;
use crate::error::GeminiError;
use crate::parsing::{
    extract_frames, extract_json, frame_body, get_array, get_path, get_str, is_truthy,
};
use crate::types::{Candidate, Cookies, GeneratedImage, ModelOutput, WebImage};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Where the remote error code sits in the first JSON line of a failed reply.
const ERROR_CODE_PATH: &[usize] = &[0, 5, 2, 0, 1, 0];

/// Attached to every decoded image so it can be fetched later.
#[derive(Debug, Clone, Default)]
pub struct ImageContext {
    pub proxy: Option<String>,
    pub cookies: Cookies,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeFailure {
    /// No frame carried a candidate list. `error_code` is the remote code,
    /// when the response reported one.
    NoBody { error_code: Option<i64> },
    /// A candidate announced generated images but no later frame delivered them.
    ImagesMissing { candidate_index: usize },
    /// The body was found but held no usable candidate.
    NoCandidates,
}

impl DecodeFailure {
    /// Whether the session is still usable after this failure.
    pub fn keeps_session(&self) -> bool {
        matches!(self, DecodeFailure::ImagesMissing { .. })
    }

    pub fn into_error(self, model_name: &str) -> GeminiError {
        match self {
            DecodeFailure::NoBody { error_code } => {
                match error_code.and_then(ErrorCode::from_code) {
                    Some(ErrorCode::UsageLimitExceeded) => GeminiError::UsageLimitExceeded(format!(
                        "Failed to generate contents. Usage limit of {model_name} model has exceeded."
                    )),
                    Some(ErrorCode::ModelInconsistent) => GeminiError::ModelInvalid(
                        "Failed to generate contents. The specified model is inconsistent with the chat history."
                            .to_string(),
                    ),
                    Some(ErrorCode::ModelHeaderInvalid) => GeminiError::ModelInvalid(
                        "Failed to generate contents. The specified model is not available."
                            .to_string(),
                    ),
                    Some(ErrorCode::IpTemporarilyBlocked) => GeminiError::TemporarilyBlocked(
                        "Failed to generate contents. Your IP address is temporarily blocked by Google."
                            .to_string(),
                    ),
                    Some(ErrorCode::TemporaryError) | None => GeminiError::Api(
                        "Failed to generate contents. Invalid response data received.".to_string(),
                    ),
                }
            }
            DecodeFailure::ImagesMissing { .. } => {
                GeminiError::ImageGeneration("Failed to parse generated images.".to_string())
            }
            DecodeFailure::NoCandidates => GeminiError::Api(
                "Failed to generate contents. No output data found in response.".to_string(),
            ),
        }
    }
}

/// Remote error code of a response that carried no body.
pub fn classify_failure(top_level: &Value) -> Option<i64> {
    get_path(top_level, ERROR_CODE_PATH).and_then(Value::as_i64)
}

fn card_content_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^http://googleusercontent\.com/card_content/\d+").unwrap())
}

fn image_placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"http://googleusercontent\.com/image_generation_content/\d+").unwrap()
    })
}

/// First frame whose embedded body has a candidate list.
fn find_body(frames: &[Value]) -> Option<(usize, Value)> {
    frames.iter().enumerate().find_map(|(i, frame)| {
        frame_body(frame)
            .filter(|body| get_path(body, &[4]).is_some())
            .map(|body| (i, body))
    })
}

/// Body of the first frame at or after `from` whose candidate
/// `candidate_index` carries a non-empty generated image list. A bare
/// marker (the placeholder the body frame announces) does not count.
fn find_image_body(frames: &[Value], from: usize, candidate_index: usize) -> Option<Value> {
    frames.iter().skip(from).find_map(|frame| {
        frame_body(frame)
            .filter(|body| !get_array(body, &[4, candidate_index, 12, 7, 0]).is_empty())
    })
}

fn web_images(candidate: &Value, ctx: &ImageContext) -> Vec<WebImage> {
    get_array(candidate, &[12, 1])
        .iter()
        .filter_map(|img| {
            let url = get_str(img, &[0, 0, 0])?;
            Some(WebImage {
                url: url.to_string(),
                title: get_str(img, &[7, 0]).unwrap_or_default().to_string(),
                alt: get_str(img, &[0, 4]).unwrap_or_default().to_string(),
                proxy: ctx.proxy.clone(),
            })
        })
        .collect()
}

fn non_empty_str<'v>(value: &'v Value, path: &[usize]) -> Option<&'v str> {
    get_str(value, path).filter(|s| !s.is_empty())
}

fn generated_images(image_candidate: &Value, ctx: &ImageContext) -> Vec<GeneratedImage> {
    get_array(image_candidate, &[12, 7, 0])
        .iter()
        .enumerate()
        .filter_map(|(img_index, img)| {
            let url = get_str(img, &[0, 3, 3])?;
            let title = match get_path(img, &[3, 6]) {
                Some(n) if is_truthy(img, &[3, 6]) => match n {
                    Value::String(s) => format!("[Generated Image {s}]"),
                    other => format!("[Generated Image {other}]"),
                },
                _ => "[Generated Image]".to_string(),
            };
            let alt_list = get_path(img, &[3, 5]).cloned().unwrap_or(Value::Null);
            let alt = non_empty_str(&alt_list, &[img_index])
                .or_else(|| non_empty_str(&alt_list, &[0]))
                .unwrap_or_default();
            Some(GeneratedImage {
                url: url.to_string(),
                title,
                alt: alt.to_string(),
                proxy: ctx.proxy.clone(),
                cookies: ctx.cookies.clone(),
            })
        })
        .collect()
}

fn decode_candidate(
    frames: &[Value],
    body_index: usize,
    candidate_index: usize,
    candidate: &Value,
    ctx: &ImageContext,
) -> Result<Option<Candidate>, DecodeFailure> {
    let Some(rcid) = non_empty_str(candidate, &[0]) else {
        return Ok(None);
    };

    let mut text = get_str(candidate, &[1, 0]).unwrap_or_default().to_string();
    if card_content_re().is_match(&text)
        && let Some(card) = non_empty_str(candidate, &[22, 0])
    {
        text = card.to_string();
    }

    let thoughts = get_str(candidate, &[37, 0, 0]).map(str::to_string);
    let web_images = web_images(candidate, ctx);

    let mut generated = Vec::new();
    if is_truthy(candidate, &[12, 7, 0]) {
        let image_body = find_image_body(frames, body_index, candidate_index)
            .ok_or(DecodeFailure::ImagesMissing { candidate_index })?;
        let image_candidate = get_path(&image_body, &[4, candidate_index])
            .cloned()
            .unwrap_or(Value::Null);
        if let Some(finished) = non_empty_str(&image_candidate, &[1, 0]) {
            text = image_placeholder_re()
                .replace(finished, "")
                .trim()
                .to_string();
        }
        generated = generated_images(&image_candidate, ctx);
    }

    Ok(Some(Candidate {
        rcid: rcid.to_string(),
        text,
        thoughts,
        web_images,
        generated_images: generated,
    }))
}

/// Decode already extracted frames.
pub fn try_decode(frames: &[Value], ctx: &ImageContext) -> Result<ModelOutput, DecodeFailure> {
    let (body_index, body) =
        find_body(frames).ok_or(DecodeFailure::NoBody { error_code: None })?;

    let mut candidates = Vec::new();
    for (candidate_index, candidate) in get_array(&body, &[4]).iter().enumerate() {
        if let Some(decoded) = decode_candidate(frames, body_index, candidate_index, candidate, ctx)? {
            candidates.push(decoded);
        }
    }

    let metadata = get_array(&body, &[1])
        .iter()
        .take(3)
        .map(|v| v.as_str().map(str::to_string))
        .collect();

    ModelOutput::new(metadata, candidates).ok_or(DecodeFailure::NoCandidates)
}

/// Decode a raw response body, classifying a missing body by its error code.
pub fn decode_response(text: &str, ctx: &ImageContext) -> Result<ModelOutput, DecodeFailure> {
    let frames = extract_frames(text);
    match try_decode(&frames, ctx) {
        Err(DecodeFailure::NoBody { .. }) => {
            let error_code = extract_json(text).ok().as_ref().and_then(classify_failure);
            Err(DecodeFailure::NoBody { error_code })
        }
        other => other,
    }
}
