//! The closed feature space dispatched by the pipeline.
//!
//! Every supported feature is a variant of [`Feature`] carrying its own
//! options struct, so an unknown feature kind cannot be expressed, let
//! alone dispatched.

pub mod time;

pub use time::{
    ChannelSelector, CrestFactorOptions, PeakOptions, RmsOptions, ZeroCrossingOptions,
};

use crate::loudness::{LufsOptions, LufsResult};
use serde::{Deserialize, Serialize};

/// Identifier for a feature variant, used as the registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    Rms,
    Peak,
    ZeroCrossing,
    CrestFactor,
    Lufs,
}

impl FeatureKind {
    /// Every kind, in registry order.
    pub const ALL: [FeatureKind; 5] = [
        FeatureKind::Rms,
        FeatureKind::Peak,
        FeatureKind::ZeroCrossing,
        FeatureKind::CrestFactor,
        FeatureKind::Lufs,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            FeatureKind::Rms => 0,
            FeatureKind::Peak => 1,
            FeatureKind::ZeroCrossing => 2,
            FeatureKind::CrestFactor => 3,
            FeatureKind::Lufs => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FeatureKind::Rms => "rms",
            FeatureKind::Peak => "peak",
            FeatureKind::ZeroCrossing => "zero_crossing",
            FeatureKind::CrestFactor => "crest_factor",
            FeatureKind::Lufs => "lufs",
        }
    }
}

/// A feature selection with its strongly-typed options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "feature", rename_all = "snake_case")]
pub enum Feature {
    Rms(RmsOptions),
    Peak(PeakOptions),
    ZeroCrossing(ZeroCrossingOptions),
    CrestFactor(CrestFactorOptions),
    Lufs(LufsOptions),
}

impl Feature {
    pub fn kind(&self) -> FeatureKind {
        match self {
            Feature::Rms(_) => FeatureKind::Rms,
            Feature::Peak(_) => FeatureKind::Peak,
            Feature::ZeroCrossing(_) => FeatureKind::ZeroCrossing,
            Feature::CrestFactor(_) => FeatureKind::CrestFactor,
            Feature::Lufs(_) => FeatureKind::Lufs,
        }
    }
}

impl Default for Feature {
    fn default() -> Self {
        Feature::Rms(RmsOptions::default())
    }
}

/// Value produced by one dispatched analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Scalar(f64),
    Loudness(LufsResult),
}

impl FeatureValue {
    /// The scalar payload, if this value carries one.
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            FeatureValue::Scalar(value) => Some(*value),
            FeatureValue::Loudness(_) => None,
        }
    }

    pub fn as_loudness(&self) -> Option<&LufsResult> {
        match self {
            FeatureValue::Loudness(result) => Some(result),
            FeatureValue::Scalar(_) => None,
        }
    }
}
