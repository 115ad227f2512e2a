//! Decoding of regression deltas into boxes.
//!
//! Both decoders implement the same transform, based on the one used by [mmdetection]:
//!
//! 1. denormalize the deltas using the configured means and stds
//! 2. split them into `dx, dy, dw, dh`, one column per group of four
//! 3. compute the center and size of every roi
//! 4. shift the centers by `dx * width` and `dy * height`
//! 5. scale the sizes by `exp(dw)` and `exp(dh)`, with `dw` and `dh` clamped to avoid overflow
//! 6. convert back to corners, optionally clipped to the image
//!
//! They only differ in how the intermediate tensors are sliced and broadcast, see
//! [`StandardDecoder`] and [`ConstrainedDecoder`].
//!
//! [mmdetection]: https://github.com/open-mmlab/mmdetection/blob/v2.20.0/mmdet/core/bbox/coder/delta_xywh_bbox_coder.py

mod constrained;
mod standard;

pub use constrained::ConstrainedDecoder;
pub use standard::StandardDecoder;

use ndarray::{Array, ArrayD, ArrayViewD, Axis, IxDyn, NdFloat, Slice};
use num::traits::{AsPrimitive, clamp, clamp_max};

use crate::{
    clip::BorderClip,
    config::DeltaCoder,
    error::{Error, Result},
};

/// Decodes deltas of shape `[..., 4 * k]` against rois of shape `[..., 4]`.
///
/// The rois are broadcast against the leading dimensions of the deltas, and against each of the
/// `k` groups of four deltas (e.g. one group per class). The decoded boxes have the same shape
/// as the deltas, in `(x1, y1, x2, y2)` order per group.
pub trait DeltaDecoder<F> {
    fn decode(&self, rois: ArrayViewD<'_, F>, deltas: ArrayViewD<'_, F>) -> Result<ArrayD<F>>;
}

/// Denormalized deltas, one tensor per coordinate.
pub(crate) struct Offsets<F> {
    pub dx: ArrayD<F>,
    pub dy: ArrayD<F>,
    pub dw: ArrayD<F>,
    pub dh: ArrayD<F>,
}

impl<F: Clone> Offsets<F> {
    /// Take every fourth column of `denorm`, which works for any number of groups.
    fn strided(denorm: &ArrayD<F>) -> Self {
        let column = |offset: isize| {
            denorm
                .slice_axis(last_axis(denorm), Slice::new(offset, None, 4))
                .to_owned()
        };

        Self {
            dx: column(0),
            dy: column(1),
            dw: column(2),
            dh: column(3),
        }
    }
}

/// Centers and sizes of the rois.
pub(crate) struct Priors<F> {
    pub px: ArrayD<F>,
    pub py: ArrayD<F>,
    pub pw: ArrayD<F>,
    pub ph: ArrayD<F>,
}

/// Validate the shapes of the inputs, returning the number of groups of four deltas.
pub(crate) fn num_groups<F>(rois: &ArrayViewD<'_, F>, deltas: &ArrayViewD<'_, F>) -> Result<usize> {
    let Some((&4, roi_leading)) = rois.shape().split_last() else {
        return Err(Error::RoiShape {
            shape: rois.shape().to_vec(),
        });
    };

    let (width, delta_leading) = match deltas.shape().split_last() {
        Some((&width, leading)) if width > 0 && width % 4 == 0 => (width, leading),
        _ => {
            return Err(Error::DeltaShape {
                shape: deltas.shape().to_vec(),
            });
        }
    };

    if !broadcasts_to(roi_leading, delta_leading) {
        return Err(Error::Broadcast {
            rois: roi_leading.to_vec(),
            deltas: delta_leading.to_vec(),
        });
    }

    Ok(width / 4)
}

/// Whether a tensor of shape `from` can be broadcast to shape `to`.
fn broadcasts_to(from: &[usize], to: &[usize]) -> bool {
    from.len() <= to.len()
        && from
            .iter()
            .rev()
            .zip(to.iter().rev())
            .all(|(&f, &t)| f == t || f == 1)
}

/// Repeat the four per-coordinate `values` along the last axis of a tensor with the given shape.
pub(crate) fn tile<F>(values: [f32; 4], shape: &[usize]) -> ArrayD<F>
where
    F: NdFloat,
    f32: AsPrimitive<F>,
{
    let last = shape.len() - 1;
    Array::from_shape_fn(IxDyn(shape), |index| values[index[last] % 4].as_())
}

/// Materialize the broadcast of `prior` to the shape of `like`.
pub(crate) fn expand<F: Clone>(prior: ArrayD<F>, like: &ArrayD<F>) -> Result<ArrayD<F>> {
    match prior.broadcast(like.raw_dim()) {
        Some(expanded) => Ok(expanded.to_owned()),
        None => Err(Error::Expand {
            from: prior.shape().to_vec(),
            to: like.shape().to_vec(),
        }),
    }
}

pub(crate) fn last_axis<F>(array: &ArrayD<F>) -> Axis {
    Axis(array.ndim() - 1)
}

pub(crate) fn last_dim<F>(array: &ArrayD<F>) -> usize {
    array.shape()[array.ndim() - 1]
}

/// Apply the offsets to the priors and assemble the boxes into a tensor of the given `shape`.
///
/// This is shared by all decoders, everything from clamping the offsets onwards is the same.
pub(crate) fn decode_priors<F, C>(
    coder: &DeltaCoder,
    clip: &C,
    priors: Priors<F>,
    offsets: Offsets<F>,
    shape: &[usize],
) -> Result<ArrayD<F>>
where
    F: NdFloat,
    f32: AsPrimitive<F>,
    C: BorderClip<F>,
{
    let Priors { px, py, pw, ph } = priors;
    let Offsets {
        dx,
        dy,
        mut dw,
        mut dh,
    } = offsets;

    let mut dx_width = &pw * &dx;
    let mut dy_height = &ph * &dy;

    let config = coder.config();
    let max_ratio: F = coder.max_ratio().as_();
    if config.add_ctr_clamp {
        let ctr_clamp: F = config.ctr_clamp.as_();
        dx_width.mapv_inplace(|v| clamp(v, -ctr_clamp, ctr_clamp));
        dy_height.mapv_inplace(|v| clamp(v, -ctr_clamp, ctr_clamp));
        dw.mapv_inplace(|v| clamp_max(v, max_ratio));
        dh.mapv_inplace(|v| clamp_max(v, max_ratio));
    } else {
        dw.mapv_inplace(|v| clamp(v, -max_ratio, max_ratio));
        dh.mapv_inplace(|v| clamp(v, -max_ratio, max_ratio));
    }

    let gw = &pw * &dw.mapv(F::exp);
    let gh = &ph * &dh.mapv(F::exp);

    let gx = px + &dx_width;
    let gy = py + &dy_height;

    let half: F = 0.5_f32.as_();
    let half_w = gw * half;
    let half_h = gh * half;

    let x1 = &gx - &half_w;
    let y1 = &gy - &half_h;
    let x2 = gx + &half_w;
    let y2 = gy + &half_h;

    let (x1, y1, x2, y2) = match coder.clip_shape() {
        Some(max_shape) => clip.clip(x1, y1, x2, y2, max_shape),
        None => (x1, y1, x2, y2),
    };

    // stacking on a new last axis keeps the four coordinates of each group together, but the
    // result is not in standard layout, so the reshape has to copy
    let boxes = ndarray::stack(
        Axis(x1.ndim()),
        &[x1.view(), y1.view(), x2.view(), y2.view()],
    )?;

    Ok(boxes.into_shape_clone(shape)?)
}
