//! Decoding of bounding box regression deltas.
//!
//! Detection heads predict boxes as offsets `(dx, dy, dw, dh)` relative to a set of reference
//! boxes (anchors or rois). This crate turns those offsets back into `(x1, y1, x2, y2)` boxes.
//!
//! Two decoders are provided, which produce the same boxes:
//!
//! - [`StandardDecoder`](decoder::StandardDecoder), for tensor backends with full broadcasting
//!   support
//! - [`ConstrainedDecoder`](decoder::ConstrainedDecoder), for backends where broadcast expansion
//!   is a costly custom operation
//!
//! Use [`Backend::decoder`](backend::Backend::decoder) to pick the right one.
//!
//! ## Example
//! ```
//! use delta_coder::prelude::*;
//! use ndarray::array;
//!
//! let coder = DeltaCoder::new(DeltaCoderConfig::default()).unwrap();
//! let decoder = Backend::Default.decoder::<f32>(coder);
//!
//! let rois = array![[0.0_f32, 0.0, 10.0, 10.0]].into_dyn();
//! let deltas = array![[0.0_f32, 0.0, 0.0, 0.0]].into_dyn();
//!
//! let boxes = decoder.decode(rois.view(), deltas.view()).unwrap();
//! assert_eq!(boxes, rois);
//! ```

pub mod backend;
pub mod clip;
pub mod config;
pub mod decoder;
mod error;

pub use error::{Error, Result};

#[allow(missing_docs)]
pub mod prelude {
    pub use crate::backend::Backend;
    pub use crate::clip::{BorderClip, ClampToImage, Corners};
    pub use crate::config::{Config, DeltaCoder, DeltaCoderConfig};
    pub use crate::decoder::{ConstrainedDecoder, DeltaDecoder, StandardDecoder};
    pub use crate::error::{Error, Result};
}
