use serde::{Deserialize, Serialize};

use crate::client::ChatClient;
use crate::error::{Result, WonderError};

pub const MAX_PROMPT_CHARS: usize = 1000;
pub const IMAGE_SIZES: [&str; 5] = ["256x256", "512x512", "1024x1024", "1792x1024", "1024x1792"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRequest {
    pub prompt: String,
    pub model: String,
    pub size: String,
    pub quality: String,
    pub style: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl ImageRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: "dall-e-3".to_string(),
            size: "1024x1024".to_string(),
            quality: "standard".to_string(),
            style: "natural".to_string(),
            user_id: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(WonderError::Validation("Prompt cannot be empty".to_string()));
        }
        if self.prompt.chars().count() > MAX_PROMPT_CHARS {
            return Err(WonderError::Validation(format!(
                "Prompt too long (max {MAX_PROMPT_CHARS} characters)"
            )));
        }
        if !IMAGE_SIZES.contains(&self.size.as_str()) {
            return Err(WonderError::Validation(format!(
                "Invalid size. Must be one of: {}",
                IMAGE_SIZES.join(", ")
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImageResult {
    pub id: String,
    pub image_url: String,
    #[serde(default)]
    pub revised_prompt: Option<String>,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub processing_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageAnalysisRequest {
    pub image_url: String,
    pub prompt: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl ImageAnalysisRequest {
    pub fn new(image_url: impl Into<String>) -> Self {
        Self {
            image_url: image_url.into(),
            prompt: "What do you see in this image?".to_string(),
            model: "gpt-4o-mini".to_string(),
            user_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImageAnalysis {
    pub id: String,
    pub analysis: String,
    pub image_url: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub processing_time: f64,
    #[serde(default)]
    pub tokens_used: u32,
}

impl ChatClient {
    pub async fn generate_image(&self, request: &ImageRequest) -> Result<ImageResult> {
        request.validate()?;
        let url = self.endpoint(&["api", "images", "generate"])?;
        self.post_json_once(url, &[], request).await
    }

    pub async fn analyze_image(&self, request: &ImageAnalysisRequest) -> Result<ImageAnalysis> {
        if request.image_url.trim().is_empty() {
            return Err(WonderError::Validation("Image URL cannot be empty".to_string()));
        }
        let url = self.endpoint(&["api", "images", "analyze"])?;
        self.post_json(url, &[], request).await
    }

    /// Model catalogue, passed through as JSON.
    pub async fn image_models(&self) -> Result<serde_json::Value> {
        let url = self.endpoint(&["api", "images", "models"])?;
        self.get_json(url, &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_rules() {
        assert!(ImageRequest::new("a lighthouse at dusk").validate().is_ok());
        assert!(ImageRequest::new("   ").validate().is_err());
        assert!(ImageRequest::new("x".repeat(MAX_PROMPT_CHARS + 1)).validate().is_err());

        let mut odd_size = ImageRequest::new("cat");
        odd_size.size = "800x600".to_string();
        assert!(matches!(odd_size.validate(), Err(WonderError::Validation(_))));
    }
}
