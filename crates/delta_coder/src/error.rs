//! See [`Error`].

use miette::Diagnostic;
use thiserror::Error;

/// Error types for this crate.
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("rois must have shape `[..., 4]`, got {shape:?}")]
    RoiShape { shape: Vec<usize> },

    #[error("deltas must have shape `[..., 4 * k]` with k > 0, got {shape:?}")]
    DeltaShape { shape: Vec<usize> },

    #[error(
        "rois with leading dimensions {rois:?} cannot be broadcast against deltas with leading \
            dimensions {deltas:?}"
    )]
    Broadcast {
        rois: Vec<usize>,
        deltas: Vec<usize>,
    },

    /// An intermediate tensor did not match the shape of the deltas it is combined with.
    ///
    /// The input shapes are validated before decoding, so this indicates a bug in a decoder.
    #[error("cannot expand a tensor of shape {from:?} to shape {to:?}")]
    Expand { from: Vec<usize>, to: Vec<usize> },

    #[error("Failed to reshape decoded boxes")]
    Shape(#[from] ndarray::ShapeError),

    #[error("`wh_ratio_clip` must lie in (0, 1), got {0}")]
    #[diagnostic(help("the usual value is 16 / 1000, which bounds the scale ratio to 62.5"))]
    InvalidWhRatioClip(f32),

    #[error("`ctr_clamp` must be finite and non-negative, got {0}")]
    InvalidCtrClamp(f32),

    #[error("`means` and `stds` must only contain finite values")]
    NonFiniteNormalization,

    #[error("`max_shape` must be finite and non-negative, got ({height}, {width})")]
    InvalidMaxShape { height: f32, width: f32 },

    /// IO error, this wraps a [`std::io::Error`]
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Deserialize error, this wraps a [`toml::de::Error`]
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),
}

/// Type alias for [`Result<T, Error>`].
pub type Result<T> = std::result::Result<T, Error>;
