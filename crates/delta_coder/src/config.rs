//! Configuration of the delta decoders.
//!
//! A [`DeltaCoderConfig`] is the raw, deserializable form of the settings. It is validated once
//! into a [`DeltaCoder`], which is what the decoders hold on to.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use toml::{Table, Value};

use crate::error::{Error, Result};

/// Settings used to turn regression deltas back into boxes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DeltaCoderConfig {
    /// Per-coordinate offset that was subtracted from the deltas during normalization.
    pub means: [f32; 4],
    /// Per-coordinate scale that the deltas were divided by during normalization.
    pub stds: [f32; 4],
    /// The `(height, width)` of the image, used to clip the decoded boxes.
    pub max_shape: Option<(f32, f32)>,
    /// Maximum allowed width/height scale ratio.
    ///
    /// The log of this value bounds `dw` and `dh`, so the exponent cannot overflow.
    pub wh_ratio_clip: f32,
    /// Whether to clip the decoded boxes to the image borders.
    ///
    /// Has no effect if [`DeltaCoderConfig::max_shape`] is not set.
    pub clip_border: bool,
    /// Clamp the center shift in pixels instead of bounding `dw` and `dh` from below.
    pub add_ctr_clamp: bool,
    /// Maximum absolute center shift, only used when `add_ctr_clamp` is set.
    pub ctr_clamp: f32,
}

impl Default for DeltaCoderConfig {
    fn default() -> Self {
        Self {
            means: [0.0; 4],
            stds: [1.0; 4],
            max_shape: None,
            wh_ratio_clip: 16.0 / 1000.0,
            clip_border: true,
            add_ctr_clamp: false,
            ctr_clamp: 32.0,
        }
    }
}

impl Config for DeltaCoderConfig {
    const PATH: &'static str = "delta_coder.toml";
}

/// A validated [`DeltaCoderConfig`].
///
/// Construction fails on settings that would make decoding produce non-finite values, so the
/// decoders never have to check them per call.
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaCoder {
    config: DeltaCoderConfig,
    max_ratio: f32,
}

impl DeltaCoder {
    /// Validate the given config and derive the log-ratio bound from `wh_ratio_clip`.
    pub fn new(config: DeltaCoderConfig) -> Result<Self> {
        let DeltaCoderConfig {
            means,
            stds,
            max_shape,
            wh_ratio_clip,
            ctr_clamp,
            ..
        } = config;

        if !(wh_ratio_clip.is_finite() && wh_ratio_clip > 0.0 && wh_ratio_clip < 1.0) {
            return Err(Error::InvalidWhRatioClip(wh_ratio_clip));
        }

        if !ctr_clamp.is_finite() || ctr_clamp < 0.0 {
            return Err(Error::InvalidCtrClamp(ctr_clamp));
        }

        if !means.iter().chain(&stds).all(|v| v.is_finite()) {
            return Err(Error::NonFiniteNormalization);
        }

        if let Some((height, width)) = max_shape {
            let valid = |v: f32| v.is_finite() && v >= 0.0;
            if !valid(height) || !valid(width) {
                return Err(Error::InvalidMaxShape { height, width });
            }
        }

        let max_ratio = wh_ratio_clip.ln().abs();
        tracing::debug!(wh_ratio_clip, max_ratio, "created delta coder");

        Ok(Self { config, max_ratio })
    }

    /// The settings this coder was created from.
    #[must_use]
    pub fn config(&self) -> &DeltaCoderConfig {
        &self.config
    }

    /// `|ln(wh_ratio_clip)|`, the bound applied to `dw` and `dh` before exponentiation.
    #[must_use]
    pub fn max_ratio(&self) -> f32 {
        self.max_ratio
    }

    /// The `(height, width)` to clip to, if border clipping is enabled and a shape is known.
    #[must_use]
    pub fn clip_shape(&self) -> Option<(f32, f32)> {
        self.config.max_shape.filter(|_| self.config.clip_border)
    }
}

impl TryFrom<DeltaCoderConfig> for DeltaCoder {
    type Error = Error;

    fn try_from(config: DeltaCoderConfig) -> Result<Self> {
        Self::new(config)
    }
}

/// A configuration that lives in a TOML file.
pub trait Config: DeserializeOwned {
    /// Name of the file, relative to the config directory.
    const PATH: &'static str;

    /// Load the config from `dir`.
    fn load(dir: &Path) -> Result<Self> {
        let table = read_table(&dir.join(Self::PATH))?;
        Ok(Value::Table(table).try_into()?)
    }

    /// Load the config from `dir`, with the values from `overlay_dir` taking precedence.
    ///
    /// A missing overlay file is not an error, in that case this is the same as [`Config::load`].
    fn load_with_overlay(dir: &Path, overlay_dir: &Path) -> Result<Self> {
        let main = read_table(&dir.join(Self::PATH))?;

        let overlay_path = overlay_dir.join(Self::PATH);
        let table = if overlay_path.exists() {
            merge(main, read_table(&overlay_path)?)
        } else {
            main
        };

        Ok(Value::Table(table).try_into()?)
    }
}

fn read_table(path: &Path) -> Result<Table> {
    Ok(fs::read_to_string(path)?.parse()?)
}

/// Recursively merge `overlay` into `main`.
///
/// Nested tables are merged key by key, any other overlay value replaces the main one.
fn merge(mut main: Table, overlay: Table) -> Table {
    for (key, value) in overlay {
        let merged = match (main.remove(&key), value) {
            (Some(Value::Table(main_table)), Value::Table(overlay_table)) => {
                Value::Table(merge(main_table, overlay_table))
            }
            (_, value) => value,
        };

        main.insert(key, merged);
    }

    main
}
