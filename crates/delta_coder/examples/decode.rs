//! Decodes a few per-class deltas on both backends.
//!
//! Pass a directory containing a `delta_coder.toml` to use its settings, otherwise the
//! defaults are used with a 480x640 image.

use std::path::Path;

use delta_coder::prelude::*;
use miette::Result;
use ndarray::array;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .init();

    let config = match std::env::args().nth(1) {
        Some(dir) => DeltaCoderConfig::load(Path::new(&dir))?,
        None => DeltaCoderConfig {
            stds: [0.1, 0.1, 0.2, 0.2],
            max_shape: Some((480.0, 640.0)),
            ..Default::default()
        },
    };
    let coder = DeltaCoder::new(config)?;

    // two rois, with deltas for two classes each
    let rois = array![[10.0_f32, 20.0, 110.0, 220.0], [300.0, 200.0, 420.0, 260.0]].into_dyn();
    let deltas = array![
        [0.5_f32, -0.25, 1.0, 0.5, 0.0, 0.0, -1.0, -1.0],
        [-2.0, 1.5, 0.25, 3.0, 1.0, 1.0, 40.0, -40.0]
    ]
    .into_dyn();

    for backend in [Backend::Default, Backend::Ncnn] {
        let boxes = backend
            .decoder::<f32>(coder.clone())
            .decode(rois.view(), deltas.view())?;

        tracing::info!(%backend, "decoded boxes:\n{boxes}");
    }

    Ok(())
}
