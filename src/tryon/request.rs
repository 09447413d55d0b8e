use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde_json::Value;

use crate::tryon::error::TryOnError;

pub const DEFAULT_SEED: i64 = 42;
pub const DEFAULT_NUM_SAMPLES: u8 = 1;
pub const MAX_NUM_SAMPLES: u8 = 4;

/// Inbound `POST /api/tryon` body as sent by the browser client.
///
/// Every field is optional at the wire level so that validation errors can be
/// reported with a specific message instead of a generic JSON rejection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TryOnRequestBody {
    #[serde(default)]
    pub model_image: Option<String>,
    #[serde(default)]
    pub garment_image: Option<String>,
    #[serde(default)]
    pub garment_photo_type: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub segmentation_free: Option<bool>,
    #[serde(default)]
    pub seed: Option<Value>,
    #[serde(default)]
    pub num_samples: Option<Value>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
}

impl TryOnRequestBody {
    pub fn caller_api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GarmentPhotoType {
    #[default]
    Auto,
    FlatLay,
    Model,
}

impl GarmentPhotoType {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "flat-lay" => Some(Self::FlatLay),
            "model" => Some(Self::Model),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::FlatLay => "flat-lay",
            Self::Model => "model",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Category {
    #[default]
    Auto,
    Top,
    Bottom,
    FullBody,
}

impl Category {
    /// Parses a user-facing label (`Auto`, `Top`, `Bottom`, `Full-body`) or
    /// the matching provider token (`tops`, `bottoms`, `one-pieces`),
    /// ignoring case.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "top" | "tops" => Some(Self::Top),
            "bottom" | "bottoms" => Some(Self::Bottom),
            "full-body" | "one-pieces" => Some(Self::FullBody),
            _ => None,
        }
    }

    pub fn provider_token(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Top => "tops",
            Self::Bottom => "bottoms",
            Self::FullBody => "one-pieces",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    Performance,
    #[default]
    Balanced,
    Quality,
}

impl RunMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "performance" => Some(Self::Performance),
            "balanced" => Some(Self::Balanced),
            "quality" => Some(Self::Quality),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Performance => "performance",
            Self::Balanced => "balanced",
            Self::Quality => "quality",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelVariant {
    Legacy,
    #[default]
    Current,
    Staging,
}

impl ModelVariant {
    pub const LEGACY_TOKEN: &'static str = "tryon-v1.5";

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            Self::LEGACY_TOKEN => Some(Self::Legacy),
            "tryon-v1.6" => Some(Self::Current),
            "tryon-staging" => Some(Self::Staging),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Legacy => Self::LEGACY_TOKEN,
            Self::Current => "tryon-v1.6",
            Self::Staging => "tryon-staging",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl InlineImage {
    pub fn new(mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime: mime.into(),
            bytes,
        }
    }

    /// Decodes `data:<mime>;base64,<payload>` or a bare base64 payload. For
    /// bare payloads the MIME type is sniffed from the decoded bytes.
    pub fn decode(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        if let Some(rest) = raw.strip_prefix("data:") {
            let Some((meta, payload)) = rest.split_once(',') else {
                return Err(String::from("data URI has no payload separator"));
            };
            let Some(mime) = meta.strip_suffix(";base64") else {
                return Err(String::from("data URI is not base64 encoded"));
            };
            let bytes = BASE64_STANDARD
                .decode(payload.trim().as_bytes())
                .map_err(|e| format!("base64 decode failed: {e}"))?;
            let mime = if mime.is_empty() {
                sniff_mime(bytes.as_slice())
            } else {
                mime.to_ascii_lowercase()
            };
            return Ok(Self { mime, bytes });
        }

        let bytes = BASE64_STANDARD
            .decode(raw.as_bytes())
            .map_err(|e| format!("base64 decode failed: {e}"))?;
        Ok(Self {
            mime: sniff_mime(bytes.as_slice()),
            bytes,
        })
    }

    pub fn to_data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime,
            BASE64_STANDARD.encode(self.bytes.as_slice())
        )
    }
}

fn sniff_mime(bytes: &[u8]) -> String {
    image::guess_format(bytes)
        .map(|format| format.to_mime_type().to_string())
        .unwrap_or_else(|_| String::from("application/octet-stream"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Inline(InlineImage),
    Remote(String),
}

impl ImageSource {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        if trimmed.starts_with("https://") || trimmed.starts_with("http://") {
            return Ok(Self::Remote(trimmed.to_string()));
        }
        let inline = InlineImage::decode(trimmed)?;
        if inline.bytes.is_empty() {
            return Err(String::from("image payload is empty"));
        }
        Ok(Self::Inline(inline))
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, Self::Inline(_))
    }

    /// Wire representation accepted by the provider.
    pub fn to_wire(&self) -> String {
        match self {
            Self::Inline(image) => image.to_data_uri(),
            Self::Remote(url) => url.clone(),
        }
    }
}

/// Validated submission. Built from [`TryOnRequestBody`] before any network
/// call is made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub model_image: ImageSource,
    pub garment_image: ImageSource,
    pub garment_photo_type: GarmentPhotoType,
    pub category: Category,
    pub mode: RunMode,
    pub segmentation_free: bool,
    pub seed: i64,
    pub num_samples: u8,
    pub model_variant: ModelVariant,
}

impl GenerationRequest {
    pub fn from_body(body: &TryOnRequestBody) -> Result<Self, TryOnError> {
        let model_raw = non_empty(body.model_image.as_deref());
        let garment_raw = non_empty(body.garment_image.as_deref());
        let (Some(model_raw), Some(garment_raw)) = (model_raw, garment_raw) else {
            return Err(TryOnError::BadRequest(String::from(
                "Missing model or garment image",
            )));
        };

        let model_image = ImageSource::parse(model_raw).map_err(|reason| {
            TryOnError::BadRequest(format!("Invalid model_image: {reason}"))
        })?;
        let garment_image = ImageSource::parse(garment_raw).map_err(|reason| {
            TryOnError::BadRequest(format!("Invalid garment_image: {reason}"))
        })?;

        let garment_photo_type = match non_empty(body.garment_photo_type.as_deref()) {
            Some(value) => GarmentPhotoType::parse(value).ok_or_else(|| {
                TryOnError::BadRequest(format!(
                    "Unsupported garment_photo_type '{value}'. Expected auto|flat-lay|model"
                ))
            })?,
            None => GarmentPhotoType::default(),
        };
        let category = match non_empty(body.category.as_deref()) {
            Some(value) => Category::from_label(value).ok_or_else(|| {
                TryOnError::BadRequest(format!(
                    "Unsupported category '{value}'. Expected Auto|Top|Bottom|Full-body"
                ))
            })?,
            None => Category::default(),
        };
        let mode = match non_empty(body.mode.as_deref()) {
            Some(value) => RunMode::parse(value).ok_or_else(|| {
                TryOnError::BadRequest(format!(
                    "Unsupported mode '{value}'. Expected performance|balanced|quality"
                ))
            })?,
            None => RunMode::default(),
        };
        let model_variant = match non_empty(body.model_name.as_deref()) {
            Some(value) => ModelVariant::parse(value).ok_or_else(|| {
                TryOnError::BadRequest(format!(
                    "Unsupported model_name '{value}'. Expected tryon-v1.5|tryon-v1.6|tryon-staging"
                ))
            })?,
            None => ModelVariant::default(),
        };

        let seed = match body.seed.as_ref() {
            Some(value) => parse_integer(value)
                .ok_or_else(|| TryOnError::BadRequest(String::from("Field 'seed' must be an integer")))?,
            None => DEFAULT_SEED,
        };
        let num_samples = match body.num_samples.as_ref() {
            Some(value) => {
                let parsed = parse_integer(value).ok_or_else(|| {
                    TryOnError::BadRequest(String::from("Field 'num_samples' must be an integer"))
                })?;
                u8::try_from(parsed)
                    .ok()
                    .filter(|n| (1..=MAX_NUM_SAMPLES).contains(n))
                    .ok_or_else(|| {
                        TryOnError::BadRequest(format!(
                            "Field 'num_samples' must be between 1 and {MAX_NUM_SAMPLES}"
                        ))
                    })?
            }
            None => DEFAULT_NUM_SAMPLES,
        };

        Ok(Self {
            model_image,
            garment_image,
            garment_photo_type,
            category,
            mode,
            segmentation_free: body.segmentation_free.unwrap_or(true),
            seed,
            num_samples,
            model_variant,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Accepts JSON integers and numeric strings. Strings may carry trailing
/// non-digits (`"12px"` parses as 12), floats are truncated.
fn parse_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            let (sign, digits) = match s.strip_prefix('-') {
                Some(rest) => (-1, rest),
                None => (1, s.strip_prefix('+').unwrap_or(s)),
            };
            let end = digits
                .char_indices()
                .find(|(_, c)| !c.is_ascii_digit())
                .map_or(digits.len(), |(idx, _)| idx);
            digits[..end].parse::<i64>().ok().map(|n| sign * n)
        }
        _ => None,
    }
}
