//! Wire contract of the external sketch-to-image model.

use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ModelConfig;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ContractError {
    #[error("model response has no final image")]
    MissingFinalImage,

    #[error("model response is malformed: {0}")]
    Malformed(String),

    #[error("invalid model parameter: {0}")]
    InvalidParameter(String),
}

/// Output size requested from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "512x512")]
    Square512,
    #[serde(rename = "768x768")]
    Square768,
    #[default]
    #[serde(rename = "1024x1024")]
    Square1024,
}

/// Request body sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRequest {
    /// Sketch as a `data:` URI.
    pub image: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    pub resolution: Resolution,
    pub guidance_scale: f32,
    pub strength: f32,
}

impl ModelRequest {
    pub fn new(config: &ModelConfig, sketch: &[u8], mime: &str, prompt: &str) -> Self {
        Self {
            image: encode_data_uri(sketch, mime),
            prompt: prompt.to_string(),
            negative_prompt: config.negative_prompt.clone(),
            resolution: config.resolution,
            guidance_scale: config.guidance_scale,
            strength: config.strength,
        }
    }
}

/// A generated image the model makes available for download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDescriptor {
    pub url: String,
    #[serde(default)]
    pub content_type: Option<String>,
}

/// Response body returned by the model.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModelResponse {
    #[serde(default)]
    pub final_image: Option<ImageDescriptor>,
    /// Intermediate renders; never used as the result.
    #[serde(default)]
    pub previews: Vec<ImageDescriptor>,
}

impl ModelResponse {
    /// The image to persist as the job result.
    pub fn final_image(&self) -> Result<&ImageDescriptor, ContractError> {
        let image = self
            .final_image
            .as_ref()
            .ok_or(ContractError::MissingFinalImage)?;
        if image.url.trim().is_empty() {
            return Err(ContractError::Malformed("final_image.url is empty".into()));
        }
        Ok(image)
    }
}

/// `data:{mime};base64,{payload}`
pub fn encode_data_uri(bytes: &[u8], mime: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    format!("data:{mime};base64,{encoded}")
}
