use ndarray::{ArrayD, ArrayViewD, Axis, NdFloat};
use num::traits::AsPrimitive;

use super::{DeltaDecoder, Offsets, Priors, decode_priors, expand, num_groups, tile};
use crate::{
    clip::{BorderClip, ClampToImage},
    config::DeltaCoder,
    error::Result,
};

/// Decoder for tensor backends that support arbitrary slicing and broadcasting.
///
/// The means and stds are tiled over the groups only, and every roi center and size is
/// explicitly expanded to the width of the deltas before it is used.
#[derive(Debug, Clone)]
pub struct StandardDecoder<C = ClampToImage> {
    coder: DeltaCoder,
    clip: C,
}

impl StandardDecoder {
    /// Create a decoder that clips to the image borders using [`ClampToImage`].
    #[must_use]
    pub fn new(coder: DeltaCoder) -> Self {
        Self::with_clip(coder, ClampToImage)
    }
}

impl<C> StandardDecoder<C> {
    /// Create a decoder that uses a custom border clipping routine.
    #[must_use]
    pub fn with_clip(coder: DeltaCoder, clip: C) -> Self {
        Self { coder, clip }
    }

    #[must_use]
    pub fn coder(&self) -> &DeltaCoder {
        &self.coder
    }
}

impl<F, C> DeltaDecoder<F> for StandardDecoder<C>
where
    F: NdFloat,
    f32: AsPrimitive<F>,
    C: BorderClip<F>,
{
    fn decode(&self, rois: ArrayViewD<'_, F>, deltas: ArrayViewD<'_, F>) -> Result<ArrayD<F>> {
        let groups = num_groups(&rois, &deltas)?;
        tracing::trace!(
            rois = ?rois.shape(),
            deltas = ?deltas.shape(),
            groups,
            "decoding deltas"
        );

        // shape (1, ..., 1, 4 * groups)
        let mut norm_shape = vec![1; deltas.ndim()];
        norm_shape[deltas.ndim() - 1] = 4 * groups;

        let config = self.coder.config();
        let means = tile::<F>(config.means, &norm_shape);
        let stds = tile::<F>(config.stds, &norm_shape);
        let denorm = &deltas * &stds + &means;

        let offsets = Offsets::strided(&denorm);

        let roi_axis = Axis(rois.ndim() - 1);
        let x1 = rois.index_axis(roi_axis, 0);
        let y1 = rois.index_axis(roi_axis, 1);
        let x2 = rois.index_axis(roi_axis, 2);
        let y2 = rois.index_axis(roi_axis, 3);

        let half: F = 0.5_f32.as_();
        let px = ((&x1 + &x2) * half).insert_axis(roi_axis);
        let py = ((&y1 + &y2) * half).insert_axis(roi_axis);
        let pw = (&x2 - &x1).insert_axis(roi_axis);
        let ph = (&y2 - &y1).insert_axis(roi_axis);

        let priors = Priors {
            px: expand(px, &offsets.dx)?,
            py: expand(py, &offsets.dy)?,
            pw: expand(pw, &offsets.dw)?,
            ph: expand(ph, &offsets.dh)?,
        };

        decode_priors(&self.coder, &self.clip, priors, offsets, deltas.shape())
    }
}
