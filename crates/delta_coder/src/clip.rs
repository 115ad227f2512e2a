//! Clipping of decoded boxes to the image borders.

use ndarray::{ArrayD, NdFloat};
use num::traits::{AsPrimitive, clamp};

/// The four corner coordinate tensors of a set of boxes: `(x1, y1, x2, y2)`.
pub type Corners<F> = (ArrayD<F>, ArrayD<F>, ArrayD<F>, ArrayD<F>);

/// Routine that constrains decoded box corners to an image of shape `(height, width)`.
///
/// The decoders take this as a parameter, so a backend that needs a different clipping
/// strategy can supply its own.
pub trait BorderClip<F> {
    fn clip(
        &self,
        x1: ArrayD<F>,
        y1: ArrayD<F>,
        x2: ArrayD<F>,
        y2: ArrayD<F>,
        max_shape: (f32, f32),
    ) -> Corners<F>;
}

/// Clamps x-coordinates into `[0, width]` and y-coordinates into `[0, height]`.
///
/// `NaN` coordinates are left as they are.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClampToImage;

impl<F> BorderClip<F> for ClampToImage
where
    F: NdFloat,
    f32: AsPrimitive<F>,
{
    fn clip(
        &self,
        x1: ArrayD<F>,
        y1: ArrayD<F>,
        x2: ArrayD<F>,
        y2: ArrayD<F>,
        max_shape: (f32, f32),
    ) -> Corners<F> {
        let (height, width) = max_shape;
        let (height, width): (F, F) = (height.as_(), width.as_());

        (
            clamp_upto(x1, width),
            clamp_upto(y1, height),
            clamp_upto(x2, width),
            clamp_upto(y2, height),
        )
    }
}

fn clamp_upto<F: NdFloat>(mut coords: ArrayD<F>, upper: F) -> ArrayD<F> {
    coords.mapv_inplace(|c| clamp(c, F::zero(), upper));
    coords
}
