use ndarray::{ArrayD, ArrayViewD, Axis, NdFloat, Slice};
use num::traits::AsPrimitive;

use super::{
    DeltaDecoder, Offsets, Priors, decode_priors, expand, last_axis, last_dim, num_groups, tile,
};
use crate::{
    clip::{BorderClip, ClampToImage},
    config::DeltaCoder,
    error::Result,
};

/// Decoder for backends with restricted operator support, such as [ncnn].
///
/// These backends implement broadcast expansion as a costly custom operation, so this decoder
/// avoids it where it can:
///
/// - the means and stds are tiled over the roi dimension as well as over the groups
/// - roi coordinates are sliced with length-1 ranges, keeping their rank
/// - with a single group the deltas are sliced as contiguous columns
/// - roi centers and sizes are only expanded if their width is not already 4
///
/// The decoded boxes are the same as those of [`StandardDecoder`](super::StandardDecoder).
///
/// [ncnn]: https://github.com/Tencent/ncnn
#[derive(Debug, Clone)]
pub struct ConstrainedDecoder<C = ClampToImage> {
    coder: DeltaCoder,
    clip: C,
}

impl ConstrainedDecoder {
    /// Create a decoder that clips to the image borders using [`ClampToImage`].
    #[must_use]
    pub fn new(coder: DeltaCoder) -> Self {
        Self::with_clip(coder, ClampToImage)
    }
}

impl<C> ConstrainedDecoder<C> {
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

impl<F, C> DeltaDecoder<F> for ConstrainedDecoder<C>
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
            "decoding deltas with constrained ops"
        );

        // shape (1, ..., num_rois, 4 * groups)
        let ndim = deltas.ndim();
        let mut norm_shape = vec![1; ndim];
        if ndim > 1 {
            norm_shape[ndim - 2] = deltas.shape()[ndim - 2];
        }
        norm_shape[ndim - 1] = 4 * groups;

        let config = self.coder.config();
        let means = tile::<F>(config.means, &norm_shape);
        let stds = tile::<F>(config.stds, &norm_shape);
        let denorm = &deltas * &stds + &means;

        let offsets = if last_dim(&denorm) == 4 {
            contiguous(&denorm)
        } else {
            Offsets::strided(&denorm)
        };

        let priors = priors(&rois, &offsets)?;

        decode_priors(&self.coder, &self.clip, priors, offsets, deltas.shape())
    }
}

/// Take the four columns of a single group as length-1 ranges.
fn contiguous<F: Clone>(denorm: &ArrayD<F>) -> Offsets<F> {
    let column = |offset: usize| {
        denorm
            .slice_axis(last_axis(denorm), Slice::from(offset..offset + 1))
            .to_owned()
    };

    Offsets {
        dx: column(0),
        dy: column(1),
        dw: column(2),
        dh: column(3),
    }
}

/// Compute the roi centers and sizes, expanding them only where the width differs from 4.
///
/// The guard for the heights checks the width of the (possibly already expanded) centers
/// instead of the heights. With four groups this leaves the heights at width 1, and they are
/// broadcast against `dy` and `dh` by the arithmetic in [`decode_priors`] instead.
fn priors<F>(rois: &ArrayViewD<'_, F>, offsets: &Offsets<F>) -> Result<Priors<F>>
where
    F: NdFloat,
    f32: AsPrimitive<F>,
{
    let roi_axis = Axis(rois.ndim() - 1);
    let x1 = rois.slice_axis(roi_axis, Slice::from(0..1));
    let y1 = rois.slice_axis(roi_axis, Slice::from(1..2));
    let x2 = rois.slice_axis(roi_axis, Slice::from(2..3));
    let y2 = rois.slice_axis(roi_axis, Slice::from(3..4));

    let half: F = 0.5_f32.as_();
    let mut px = (&x1 + &x2) * half;
    let mut py = (&y1 + &y2) * half;
    let mut pw = &x2 - &x1;
    let mut ph = &y2 - &y1;

    if last_dim(&px) != 4 {
        px = expand(px, &offsets.dx)?;
    }
    if last_dim(&py) != 4 {
        py = expand(py, &offsets.dy)?;
    }
    if last_dim(&pw) != 4 {
        pw = expand(pw, &offsets.dw)?;
    }
    if last_dim(&px) != 4 {
        ph = expand(ph, &offsets.dh)?;
    } else {
        tracing::trace!(shape = ?ph.shape(), "skipped expanding roi heights");
    }

    Ok(Priors { px, py, pw, ph })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::DeltaCoderConfig, decoder::StandardDecoder};
    use approx::assert_abs_diff_eq;
    use ndarray::{Array, Dimension, IxDyn, array};

    /// Deterministic rois of shape `[..., 4]` and deltas of shape `[..., 4 * groups]`.
    ///
    /// Some of the deltas are large enough to hit the ratio and center clamps.
    fn fixture(leading: &[usize], groups: usize) -> (ArrayD<f32>, ArrayD<f32>) {
        let mut roi_shape = leading.to_vec();
        roi_shape.push(4);
        let rois = Array::from_shape_fn(IxDyn(&roi_shape), |index| {
            let (coord, leading) = index.slice().split_last().unwrap();
            let seed = leading
                .iter()
                .enumerate()
                .map(|(axis, &i)| (axis + 1) * i * 7)
                .sum::<usize>() as f32;

            [seed, seed * 0.5 + 1.0, seed + 12.0, seed * 0.5 + 20.0][*coord]
        });

        let mut delta_shape = leading.to_vec();
        delta_shape.push(4 * groups);
        let deltas = Array::from_shape_fn(IxDyn(&delta_shape), |index| {
            let seed = index
                .slice()
                .iter()
                .enumerate()
                .map(|(axis, &i)| (axis + 3) * i)
                .sum::<usize>();

            ((seed * 37 % 23) as f32 - 11.0) * 0.45
        });

        (rois, deltas)
    }

    fn configs() -> Vec<DeltaCoderConfig> {
        vec![
            DeltaCoderConfig::default(),
            DeltaCoderConfig {
                means: [0.1, -0.1, 0.0, 0.0],
                stds: [0.1, 0.1, 0.2, 0.2],
                max_shape: Some((30.0, 40.0)),
                ..Default::default()
            },
            DeltaCoderConfig {
                add_ctr_clamp: true,
                ctr_clamp: 8.0,
                ..Default::default()
            },
        ]
    }

    fn assert_matches_standard(leading: &[usize], groups: usize) {
        let (rois, deltas) = fixture(leading, groups);

        for config in configs() {
            let coder = DeltaCoder::new(config).unwrap();
            let expected = StandardDecoder::new(coder.clone())
                .decode(rois.view(), deltas.view())
                .unwrap();
            let boxes = ConstrainedDecoder::new(coder)
                .decode(rois.view(), deltas.view())
                .unwrap();

            assert_eq!(boxes.shape(), deltas.shape());
            assert_abs_diff_eq!(boxes, expected, epsilon = 1e-5);
        }
    }

    #[test]
    fn zero_deltas_return_rois() {
        let coder = DeltaCoder::new(DeltaCoderConfig::default()).unwrap();
        let rois = array![[[0.0_f32, 0.0, 10.0, 10.0], [5.0, 2.5, 20.0, 30.0]]].into_dyn();
        let deltas = ArrayD::zeros(IxDyn(&[1, 2, 4]));

        let boxes = ConstrainedDecoder::new(coder)
            .decode(rois.view(), deltas.view())
            .unwrap();

        assert_eq!(boxes, rois);
    }

    #[test]
    fn log_two_doubles_the_size() {
        let ln2 = 2.0_f32.ln();
        let coder = DeltaCoder::new(DeltaCoderConfig::default()).unwrap();
        let rois = array![[0.0, 0.0, 10.0, 10.0]].into_dyn();
        let deltas = array![[0.0, 0.0, ln2, ln2]].into_dyn();

        let boxes = ConstrainedDecoder::new(coder)
            .decode(rois.view(), deltas.view())
            .unwrap();

        assert_abs_diff_eq!(
            boxes,
            array![[-5.0, -5.0, 15.0, 15.0]].into_dyn(),
            epsilon = 1e-5
        );
    }

    #[test]
    fn single_group_matches_standard() {
        assert_matches_standard(&[5], 1);
        assert_matches_standard(&[2, 5], 1);
    }

    #[test]
    fn multiple_groups_match_standard() {
        for groups in [2, 3, 5] {
            assert_matches_standard(&[5], groups);
            assert_matches_standard(&[2, 5], groups);
        }
    }

    #[test]
    fn unbatched_matches_standard() {
        assert_matches_standard(&[], 1);
        assert_matches_standard(&[], 2);
    }

    #[test]
    fn four_groups_match_standard() {
        assert_matches_standard(&[5], 4);
        assert_matches_standard(&[2, 5], 4);
    }

    #[test]
    fn four_groups_leave_roi_heights_unexpanded() {
        let (rois, deltas) = fixture(&[3], 4);
        let offsets = Offsets::strided(&deltas);

        let priors = priors(&rois.view(), &offsets).unwrap();

        assert_eq!(priors.px.shape(), &[3, 4]);
        assert_eq!(priors.py.shape(), &[3, 4]);
        assert_eq!(priors.pw.shape(), &[3, 4]);
        assert_eq!(priors.ph.shape(), &[3, 1]);
    }

    #[test]
    fn four_groups_with_rois_shared_over_batch() {
        let (batched_rois, deltas) = fixture(&[2, 3], 4);
        let rois = batched_rois.index_axis(Axis(0), 0).to_owned();

        let offsets = Offsets::strided(&deltas);
        let priors = priors(&rois.view(), &offsets).unwrap();
        assert_eq!(priors.px.shape(), &[2, 3, 4]);
        assert_eq!(priors.ph.shape(), &[3, 1]);

        for config in configs() {
            let coder = DeltaCoder::new(config).unwrap();
            let expected = StandardDecoder::new(coder.clone())
                .decode(rois.view(), deltas.view())
                .unwrap();
            let boxes = ConstrainedDecoder::new(coder)
                .decode(rois.view(), deltas.view())
                .unwrap();

            assert_eq!(boxes.shape(), &[2, 3, 16]);
            assert_abs_diff_eq!(boxes, expected, epsilon = 1e-5);
        }
    }

    #[test]
    fn other_group_counts_expand_everything() {
        for groups in [1, 2, 5] {
            let (rois, deltas) = fixture(&[3], groups);
            let offsets = if groups == 1 {
                contiguous(&deltas)
            } else {
                Offsets::strided(&deltas)
            };

            let priors = priors(&rois.view(), &offsets).unwrap();

            for prior in [&priors.px, &priors.py, &priors.pw, &priors.ph] {
                assert_eq!(prior.shape(), &[3, groups]);
            }
        }
    }

    #[test]
    fn contiguous_matches_strided_for_one_group() {
        let denorm = array![[1.0_f32, 2.0, 3.0, 4.0], [5.0, 6.0, 7.0, 8.0]].into_dyn();

        let contiguous = contiguous(&denorm);
        let strided = Offsets::strided(&denorm);

        assert_eq!(contiguous.dx, strided.dx);
        assert_eq!(contiguous.dy, strided.dy);
        assert_eq!(contiguous.dw, strided.dw);
        assert_eq!(contiguous.dh, strided.dh);
    }
}
