//! Selection of the decoder variant for an inference backend.

use ndarray::NdFloat;
use num::traits::AsPrimitive;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{
    config::DeltaCoder,
    decoder::{ConstrainedDecoder, DeltaDecoder, StandardDecoder},
};

/// The inference backend the decoded boxes are computed on.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Any backend with full slicing and broadcasting support.
    #[default]
    Default,
    /// The [ncnn](https://github.com/Tencent/ncnn) runtime.
    Ncnn,
}

impl Backend {
    /// Create the decoder that fits this backend.
    #[must_use]
    pub fn decoder<F>(self, coder: DeltaCoder) -> Box<dyn DeltaDecoder<F> + Send + Sync>
    where
        F: NdFloat,
        f32: AsPrimitive<F>,
    {
        match self {
            Backend::Default => Box::new(StandardDecoder::new(coder)),
            Backend::Ncnn => Box::new(ConstrainedDecoder::new(coder)),
        }
    }
}
