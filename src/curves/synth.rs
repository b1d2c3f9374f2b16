//! EQ curve synthesis.
//!
//! Combines the tone, loudness-compensation and room-target tables into one
//! magnitude curve and turns it into a minimum-phase FIR impulse the engine
//! can convolve with.

use realfft::num_complex::Complex;
use realfft::RealFftPlanner;

use crate::config::LOUDNESS_REF_LEVEL;
use crate::curves::tables::CurveTables;
use crate::error::Result;

/// Snapshot of the settings one EQ synthesis runs from.
#[derive(Debug, Clone, PartialEq)]
pub struct EqSettings {
    /// Integer-rounded bass setting in dB.
    pub bass: f32,
    /// Integer-rounded treble setting in dB.
    pub treble: f32,
    /// Estimated listening level in dB SPL (level + reference).
    pub spl: f32,
    pub equal_loudness: bool,
    pub target: String,
}

impl Default for EqSettings {
    fn default() -> Self {
        Self {
            bass: 0.0,
            treble: 0.0,
            spl: LOUDNESS_REF_LEVEL,
            equal_loudness: false,
            target: "none".into(),
        }
    }
}

/// Sum the table rows selected by the settings into one magnitude curve (dB).
pub fn compose(tables: &CurveTables, settings: &EqSettings) -> Result<Vec<f32>> {
    let tone = tables.tone_curve(
        settings.bass.round() as i32,
        settings.treble.round() as i32,
    )?;

    // With equal loudness off the reference row applies, which is flat.
    let spl_index = if settings.equal_loudness {
        settings.spl.round() as i32
    } else {
        LOUDNESS_REF_LEVEL as i32
    };
    let loudness = tables.loudness_curve(spl_index);

    let target = tables.target_curve(&settings.target)?;

    Ok(tone
        .iter()
        .zip(loudness.iter())
        .zip(target.iter())
        .map(|((t, l), g)| t + l + g)
        .collect())
}

/// Convert a magnitude-dB half spectrum into a minimum-phase impulse.
///
/// The phase is recovered from the magnitude by folding the real cepstrum:
/// log-magnitude -> cepstrum -> causal fold -> exp -> impulse. For `m` input
/// bins the impulse has `2 * (m - 1)` taps with its energy packed at the
/// start, so filter swaps stay glitch-free at short latencies.
pub fn semispectrum_to_impulse(mag_db: &[f32]) -> Vec<f32> {
    debug_assert!(mag_db.len() >= 2, "need at least 2 spectrum bins");

    let m = mag_db.len();
    let n = 2 * (m - 1);

    let mut planner = RealFftPlanner::<f64>::new();
    let c2r = planner.plan_fft_inverse(n);
    let r2c = planner.plan_fft_forward(n);

    // log magnitude, floored to keep ln() finite on deep cuts
    let mut log_mag: Vec<Complex<f64>> = mag_db
        .iter()
        .map(|db| {
            let lin = 10f64.powf(f64::from(*db) / 20.0).max(1e-10);
            Complex::new(lin.ln(), 0.0)
        })
        .collect();

    // real cepstrum (inverse transform is unnormalized, divide by n)
    let mut cepstrum = c2r.make_output_vec();
    c2r.process(&mut log_mag, &mut cepstrum)
        .expect("cepstrum transform length mismatch");
    for c in cepstrum.iter_mut() {
        *c /= n as f64;
    }

    // fold onto the causal side: quefrencies 1..n/2 doubled, upper half zeroed
    let half = n / 2;
    for i in 1..half {
        cepstrum[i] *= 2.0;
        cepstrum[n - i] = 0.0;
    }

    // back to the frequency domain and exponentiate
    let mut spectrum = r2c.make_output_vec();
    r2c.process(&mut cepstrum, &mut spectrum)
        .expect("spectrum transform length mismatch");
    for bin in spectrum.iter_mut() {
        *bin = Complex::from_polar(bin.re.exp(), bin.im);
    }
    // DC and Nyquist bins must be purely real for the inverse transform
    spectrum[0].im = 0.0;
    spectrum[m - 1].im = 0.0;

    let mut impulse = c2r.make_output_vec();
    c2r.process(&mut spectrum, &mut impulse)
        .expect("impulse transform length mismatch");

    impulse.iter().map(|s| (*s / n as f64) as f32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curves::tables::write_test_tables;
    use approx::assert_relative_eq;
    use tempfile::tempdir;

    #[test]
    fn test_flat_curve_yields_delta() {
        let imp = semispectrum_to_impulse(&[0.0; 9]);
        assert_eq!(imp.len(), 16);
        assert_relative_eq!(imp[0], 1.0, epsilon = 1e-6);
        for s in &imp[1..] {
            assert!(s.abs() < 1e-6, "tail sample {s} not silent");
        }
    }

    #[test]
    fn test_flat_gain_scales_delta() {
        // +6.0206 dB is a factor of 2.0
        let imp = semispectrum_to_impulse(&[6.0206; 9]);
        assert_relative_eq!(imp[0], 2.0, epsilon = 1e-4);
    }

    #[test]
    fn test_energy_is_front_loaded() {
        // a gentle tilt: minimum phase packs energy at the start
        let mag: Vec<f32> = (0..65).map(|i| -6.0 * i as f32 / 64.0).collect();
        let imp = semispectrum_to_impulse(&mag);
        assert_eq!(imp.len(), 128);

        let front: f64 = imp[..32].iter().map(|s| f64::from(*s).powi(2)).sum();
        let tail: f64 = imp[32..].iter().map(|s| f64::from(*s).powi(2)).sum();
        assert!(front > tail, "front energy {front} <= tail {tail}");
    }

    #[test]
    fn test_compose_sums_tables() {
        let dir = tempdir().unwrap();
        let folder = write_test_tables(dir.path(), 4);
        let tables = CurveTables::load(&folder, 83.0).unwrap();

        // tone rows carry their dB value, loudness row 83 is 7.0 in the
        // test fixture, target +3.0-1.0 adds 3.0
        let settings = EqSettings {
            bass: 2.0,
            treble: -1.0,
            spl: 83.0,
            equal_loudness: false,
            target: "+3.0-1.0".into(),
        };
        let curve = compose(&tables, &settings).unwrap();
        assert_relative_eq!(curve[0], 2.0 - 1.0 + 7.0 + 3.0);
    }

    #[test]
    fn test_compose_equal_loudness_tracks_spl() {
        let dir = tempdir().unwrap();
        let folder = write_test_tables(dir.path(), 4);
        let tables = CurveTables::load(&folder, 83.0).unwrap();

        let quiet = EqSettings {
            spl: 63.0,
            equal_loudness: true,
            ..EqSettings::default()
        };
        let loud = EqSettings {
            spl: 83.0,
            equal_loudness: true,
            ..EqSettings::default()
        };

        // the fixture loudness rows fall with SPL: quieter -> more boost
        let q = compose(&tables, &quiet).unwrap();
        let l = compose(&tables, &loud).unwrap();
        assert!(q[0] > l[0]);
    }

    #[test]
    fn test_compose_rounds_fractional_tones() {
        let dir = tempdir().unwrap();
        let folder = write_test_tables(dir.path(), 4);
        let tables = CurveTables::load(&folder, 83.0).unwrap();

        let settings = EqSettings {
            bass: 2.4,
            treble: 0.0,
            ..EqSettings::default()
        };
        let curve = compose(&tables, &settings).unwrap();
        // row 2 selected, loudness reference row adds 7.0
        assert_relative_eq!(curve[0], 2.0 + 7.0);
    }

    #[test]
    fn test_compose_unknown_target_fails() {
        let dir = tempdir().unwrap();
        let folder = write_test_tables(dir.path(), 4);
        let tables = CurveTables::load(&folder, 83.0).unwrap();

        let settings = EqSettings {
            target: "bogus".into(),
            ..EqSettings::default()
        };
        assert!(compose(&tables, &settings).is_err());
    }
}
