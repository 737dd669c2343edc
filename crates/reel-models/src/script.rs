//! Script document models.
//!
//! A script is produced upstream by the authoring chain and passed through to
//! the renderer as JSON. Fields the orchestrator does not interpret are kept in
//! flattened maps so an untouched beat serializes back to what was received.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Image `type` used for beats that reference an existing image.
pub const IMAGE_KIND_IMAGE: &str = "image";
/// Image `type` used for beats whose image is generated from a prompt.
pub const IMAGE_KIND_PROMPT: &str = "imagePrompt";
/// Media source `kind` for URL references.
pub const SOURCE_KIND_URL: &str = "url";

/// The full script handed to the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScriptDocument {
    /// Ordered narrated units
    #[serde(default)]
    pub beats: Vec<Beat>,

    /// Voice/speaker configuration (opaque to the orchestrator)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<Value>,

    /// Image generation configuration (opaque to the orchestrator)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_config: Option<Value>,

    /// Caption configuration; captions are on when a language is set
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "captionParams")]
    pub caption_config: Option<CaptionConfig>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ScriptDocument {
    /// True when there is nothing to narrate.
    pub fn is_empty(&self) -> bool {
        self.beats.is_empty()
    }

    /// Caption language when captions are enabled.
    pub fn caption_lang(&self) -> Option<&str> {
        self.caption_config
            .as_ref()
            .and_then(|c| c.lang.as_deref())
            .map(str::trim)
            .filter(|l| !l.is_empty())
    }

    /// Replace the image of every listed beat with the fallback reference.
    ///
    /// Indices past the end are ignored. Returns how many beats were changed.
    pub fn replace_beat_images<'a, I>(&mut self, indices: I, fallback_url: &str) -> usize
    where
        I: IntoIterator<Item = &'a usize>,
    {
        let mut replaced = 0;
        for &index in indices {
            if let Some(beat) = self.beats.get_mut(index) {
                beat.set_fallback_image(fallback_url);
                replaced += 1;
            }
        }
        replaced
    }

    /// Replace the image of every beat with the fallback reference.
    pub fn replace_all_images(&mut self, fallback_url: &str) {
        for beat in &mut self.beats {
            beat.set_fallback_image(fallback_url);
        }
    }
}

/// Caption settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CaptionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One narrated unit of a script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Beat {
    #[serde(default)]
    pub speaker: String,

    #[serde(default)]
    pub text: String,

    /// Prompt the renderer uses to generate this beat's image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_prompt: Option<String>,

    /// Explicit image source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<BeatImage>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Beat {
    /// All prompts attached to this beat, top-level first.
    pub fn image_prompts(&self) -> impl Iterator<Item = &str> {
        self.image_prompt
            .as_deref()
            .into_iter()
            .chain(self.image.as_ref().and_then(|i| i.prompt.as_deref()))
    }

    /// Whether the beat carries any image-related field.
    pub fn has_image(&self) -> bool {
        self.image_prompt.is_some() || self.image.is_some()
    }

    /// Drop every image field; speech is untouched.
    pub fn clear_image(&mut self) {
        self.image_prompt = None;
        self.image = None;
    }

    /// Point the beat at a known-safe image.
    pub fn set_fallback_image(&mut self, url: &str) {
        self.image_prompt = None;
        self.image = Some(BeatImage::from_url(url));
    }
}

/// Image attached to a beat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BeatImage {
    /// Source kind, e.g. `image` or `imagePrompt`
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<MediaSource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BeatImage {
    /// Image referencing a URL.
    pub fn from_url(url: &str) -> Self {
        Self {
            kind: IMAGE_KIND_IMAGE.to_string(),
            source: Some(MediaSource {
                kind: SOURCE_KIND_URL.to_string(),
                url: Some(url.to_string()),
                extra: Map::new(),
            }),
            prompt: None,
            extra: Map::new(),
        }
    }

    /// URL of the image, if it references one.
    pub fn url(&self) -> Option<&str> {
        self.source.as_ref().and_then(|s| s.url.as_deref())
    }
}

/// Where an image's bytes come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MediaSource {
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
