use serde::Serialize;

use crate::tryon::request::{GenerationRequest, ModelVariant};

/// Flat input block shared by both provider schemas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TryOnInputs {
    pub model_image: String,
    pub garment_image: String,
    pub garment_photo_type: &'static str,
    pub category: &'static str,
    pub mode: &'static str,
    pub segmentation_free: bool,
    pub seed: i64,
    pub num_samples: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ProviderPayload {
    /// Pre-v1.6 contract: inputs at the top level, no model selector.
    Flat(TryOnInputs),
    Nested {
        model_name: &'static str,
        inputs: TryOnInputs,
    },
}

impl ProviderPayload {
    /// Picks the schema for `variant`. The legacy variant keeps the flat shape
    /// for older provider contracts.
    pub fn for_variant(variant: ModelVariant, inputs: TryOnInputs) -> Self {
        match variant {
            ModelVariant::Legacy => Self::Flat(inputs),
            ModelVariant::Current | ModelVariant::Staging => Self::Nested {
                model_name: variant.as_str(),
                inputs,
            },
        }
    }
}

pub fn encode_inputs(request: &GenerationRequest) -> TryOnInputs {
    TryOnInputs {
        model_image: request.model_image.to_wire(),
        garment_image: request.garment_image.to_wire(),
        garment_photo_type: request.garment_photo_type.as_str(),
        category: request.category.provider_token(),
        mode: request.mode.as_str(),
        segmentation_free: request.segmentation_free,
        seed: request.seed,
        num_samples: request.num_samples,
    }
}

pub fn encode_payload(request: &GenerationRequest) -> ProviderPayload {
    ProviderPayload::for_variant(request.model_variant, encode_inputs(request))
}
