//! Spectral band-power estimation
//!
//! Welch's power-spectral-density estimate (Hann window, 50% overlap,
//! constant detrend, one-sided density scaling) followed by trapezoidal
//! integration over three fixed frequency bands. Used for the BVP and
//! ACC-magnitude channels.

use realfft::num_complex::Complex;
use realfft::RealFftPlanner;

/// Fixed frequency bands (Hz): low, mid, high
pub const BAND_LOW: (f64, f64) = (0.04, 0.15);
pub const BAND_MID: (f64, f64) = (0.15, 0.4);
pub const BAND_HIGH: (f64, f64) = (0.4, 1.0);

/// Maximum Welch segment length; shorter signals use their full length
pub const MAX_SEGMENT_LEN: usize = 64;

/// Integrated power in each fixed band
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandPowers {
    pub low: f64,
    pub mid: f64,
    pub high: f64,
}

/// Compute integrated band powers for a finite-sample signal.
///
/// Returns `None` when the signal is too short to estimate a spectrum.
pub fn band_powers(signal: &[f64], fs: f64) -> Option<BandPowers> {
    let (freqs, psd) = welch_psd(signal, fs)?;

    Some(BandPowers {
        low: band_power(&freqs, &psd, BAND_LOW.0, BAND_LOW.1),
        mid: band_power(&freqs, &psd, BAND_MID.0, BAND_MID.1),
        high: band_power(&freqs, &psd, BAND_HIGH.0, BAND_HIGH.1),
    })
}

/// Welch PSD estimate over segments of `min(len, 64)` samples with 50% overlap.
///
/// Returns `(frequencies, density)` with `nperseg / 2 + 1` one-sided bins.
pub fn welch_psd(signal: &[f64], fs: f64) -> Option<(Vec<f64>, Vec<f64>)> {
    let n = signal.len();
    if n < 2 || fs <= 0.0 {
        return None;
    }

    let nperseg = n.min(MAX_SEGMENT_LEN);
    let step = (nperseg / 2).max(1);
    let nbins = nperseg / 2 + 1;

    let window = hann_window(nperseg);
    let win_sumsq: f64 = window.iter().map(|w| w * w).sum();
    let scale = 1.0 / (fs * win_sumsq);

    let mut planner = RealFftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(nperseg);

    let mut input = fft.make_input_vec();
    let mut output: Vec<Complex<f64>> = fft.make_output_vec();
    let mut psd = vec![0.0; nbins];
    let mut segments = 0usize;

    let mut start = 0;
    while start + nperseg <= n {
        let segment = &signal[start..start + nperseg];

        // Constant detrend, then taper
        let mean = segment.iter().sum::<f64>() / nperseg as f64;
        for (dst, (x, w)) in input.iter_mut().zip(segment.iter().zip(window.iter())) {
            *dst = (x - mean) * w;
        }

        if fft.process(&mut input, &mut output).is_err() {
            return None;
        }

        for (bin, value) in psd.iter_mut().zip(output.iter()) {
            *bin += (value.re * value.re + value.im * value.im) * scale;
        }
        segments += 1;
        start += step;
    }

    if segments == 0 {
        return None;
    }

    for bin in psd.iter_mut() {
        *bin /= segments as f64;
    }

    // One-sided spectrum: double every bin except DC and (for even nperseg) Nyquist
    let last = nbins - 1;
    for (idx, bin) in psd.iter_mut().enumerate() {
        if idx != 0 && !(nperseg % 2 == 0 && idx == last) {
            *bin *= 2.0;
        }
    }

    let freqs = (0..nbins).map(|k| k as f64 * fs / nperseg as f64).collect();
    Some((freqs, psd))
}

/// Trapezoidal integral of the density over `[lo, hi]` (inclusive bin mask)
pub fn band_power(freqs: &[f64], psd: &[f64], lo: f64, hi: f64) -> f64 {
    let selected: Vec<(f64, f64)> = freqs
        .iter()
        .zip(psd.iter())
        .filter(|(f, _)| **f >= lo && **f <= hi)
        .map(|(f, p)| (*f, *p))
        .collect();

    if selected.len() < 2 {
        return 0.0;
    }

    selected
        .windows(2)
        .map(|pair| (pair[1].0 - pair[0].0) * (pair[0].1 + pair[1].1) / 2.0)
        .sum()
}

/// Periodic Hann window of length `n`
fn hann_window(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / n as f64).cos())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, fs: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * std::f64::consts::PI * freq * i as f64 / fs).sin())
            .collect()
    }

    #[test]
    fn test_welch_bin_count() {
        let signal = sine(0.5, 4.0, 240);
        let (freqs, psd) = welch_psd(&signal, 4.0).unwrap();
        // nperseg = 64 → 33 one-sided bins up to fs/2
        assert_eq!(freqs.len(), 33);
        assert_eq!(psd.len(), 33);
        assert!((freqs[32] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_constant_signal_has_no_power() {
        let signal = vec![3.7; 240];
        let powers = band_powers(&signal, 4.0).unwrap();
        // Constant detrend removes the DC component entirely
        assert!(powers.low < 1e-12);
        assert!(powers.mid < 1e-12);
        assert!(powers.high < 1e-12);
    }

    #[test]
    fn test_sine_power_lands_in_its_band() {
        // 0.5 Hz sits inside the high band [0.4, 1.0]
        let signal = sine(0.5, 4.0, 240);
        let powers = band_powers(&signal, 4.0).unwrap();
        assert!(powers.high > powers.low * 10.0);
        assert!(powers.high > powers.mid * 10.0);
        assert!(powers.high > 0.0);
    }

    #[test]
    fn test_low_frequency_sine() {
        // 0.1 Hz sits inside the low band [0.04, 0.15]
        let signal = sine(0.1, 4.0, 240);
        let powers = band_powers(&signal, 4.0).unwrap();
        assert!(powers.low > powers.high);
    }

    #[test]
    fn test_short_signal_uses_full_length_segment() {
        let signal = sine(0.5, 4.0, 32);
        let (freqs, _) = welch_psd(&signal, 4.0).unwrap();
        assert_eq!(freqs.len(), 17);
    }

    #[test]
    fn test_too_short_signal_is_rejected() {
        assert!(welch_psd(&[1.0], 4.0).is_none());
        assert!(welch_psd(&[], 4.0).is_none());
    }
}
