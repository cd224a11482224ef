//! K-weighting filter design (ITU-R BS.1770).
//!
//! Two cascaded sections: a high-frequency shelf (+4 dB above ~1.68 kHz)
//! and a high-pass (~38 Hz) removing DC and rumble. At 48 kHz the official
//! Annex 1 reference tables are used verbatim; every other rate gets an
//! analytically designed cascade normalized to 0 dB at 997 Hz, the
//! frequency the -0.691 offset in the loudness formula cancels.

use crate::dsp::{frequency_response, BiquadCoeffs};
use crate::error::{Error, Result};

/// Shelf center frequency in Hz.
const SHELF_F0: f64 = 1681.974_450_955_531_9;
/// Shelf gain in dB.
const SHELF_GAIN_DB: f64 = 3.999_843_853_97;
/// Shelf quality factor (~1/sqrt(2)).
const SHELF_Q: f64 = 0.707_175_236_955_419_3;

/// High-pass corner frequency in Hz.
const HIGHPASS_FC: f64 = 38.135_470_876_139_82;
/// High-pass quality factor.
const HIGHPASS_Q: f64 = 0.500_327_037_325_395_3;

/// Normalization reference frequency in Hz.
const REFERENCE_HZ: f64 = 997.0;

pub(crate) fn validate_sample_rate(sample_rate: f64) -> Result<()> {
    if !sample_rate.is_finite() || sample_rate <= 0.0 {
        return Err(Error::Config(format!(
            "sample_rate {sample_rate} must be a positive finite value"
        )));
    }
    if !(8000.0..=384000.0).contains(&sample_rate) {
        return Err(Error::Config(format!(
            "sample_rate {sample_rate} out of range (8000-384000 Hz)"
        )));
    }
    Ok(())
}

/// Design the two-stage K-weighting cascade for `sample_rate`.
pub(crate) fn design_k_weighting(sample_rate: f64) -> Result<[BiquadCoeffs; 2]> {
    validate_sample_rate(sample_rate)?;

    if sample_rate == 48000.0 {
        // Official reference coefficients, ITU-R BS.1770 Annex 1 Tables 1-2.
        // The standard applies its own normalization (~0.7 dB at 997 Hz).
        return Ok([
            BiquadCoeffs {
                b0: 1.535_124_859_586_97,
                b1: -2.691_696_189_406_38,
                b2: 1.198_392_810_852_85,
                a1: -1.690_659_293_182_41,
                a2: 0.732_480_774_215_85,
            },
            BiquadCoeffs {
                b0: 1.0,
                b1: -2.0,
                b2: 1.0,
                a1: -1.990_047_454_833_98,
                a2: 0.990_072_250_366_21,
            },
        ]);
    }

    // High-frequency shelf.
    let k = (core::f64::consts::PI * SHELF_F0 / sample_rate).tan();
    let vh = 10.0_f64.powf(SHELF_GAIN_DB / 20.0);
    let vb = vh.powf(0.499_666_774_155);
    let norm = 1.0 + k / SHELF_Q + k * k;

    let shelf = BiquadCoeffs {
        b0: (vh + vb * k / SHELF_Q + k * k) / norm,
        b1: 2.0 * (k * k - vh) / norm,
        b2: (vh - vb * k / SHELF_Q + k * k) / norm,
        a1: 2.0 * (k * k - 1.0) / norm,
        a2: (1.0 - k / SHELF_Q + k * k) / norm,
    };

    // High-pass.
    let k2 = (core::f64::consts::PI * HIGHPASS_FC / sample_rate).tan();
    let norm2 = 1.0 + k2 / HIGHPASS_Q + k2 * k2;

    let highpass = BiquadCoeffs {
        b0: 1.0,
        b1: -2.0,
        b2: 1.0,
        a1: 2.0 * (k2 * k2 - 1.0) / norm2,
        a2: (1.0 - k2 / HIGHPASS_Q + k2 * k2) / norm2,
    };

    // Unity gain at 997 Hz, applied to the shelf's feed-forward taps.
    let mut stages = [shelf, highpass];
    let gain = 1.0 / frequency_response(&stages, REFERENCE_HZ, sample_rate);
    stages[0].b0 *= gain;
    stages[0].b1 *= gain;
    stages[0].b2 *= gain;

    Ok(stages)
}
