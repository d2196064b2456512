//! Butterworth band-pass design and zero-phase (forward-backward) filtering.
//!
//! The design goes analog prototype → band-pass transform → bilinear
//! transform, all in zero/pole/gain form, and is stored as cascaded
//! second-order sections. Filtering pads both ends with an odd reflection and
//! seeds each section with its steady-state initial condition, so edge
//! transients stay out of the power estimate.

use num_complex::Complex64;
use std::f64::consts::PI;

/// One second-order section, `a[0]` normalized to 1.
#[derive(Clone, Debug, PartialEq)]
pub struct BiquadCoeffs {
    /// Numerator coefficients [b0, b1, b2]
    pub b: [f64; 3],
    /// Denominator coefficients [a0=1, a1, a2]
    pub a: [f64; 3],
}

impl BiquadCoeffs {
    /// Steady-state initial state of the transposed direct form II for a unit
    /// step input.
    fn lfilter_zi(&self) -> [f64; 2] {
        let [b0, b1, b2] = self.b;
        let [_, a1, a2] = self.a;
        let r0 = b1 - a1 * b0;
        let r1 = b2 - a2 * b0;
        let det = 1.0 + a1 + a2;
        [(r0 + r1) / det, ((1.0 + a1) * r1 - a2 * r0) / det]
    }

    fn dc_gain(&self) -> f64 {
        self.b.iter().sum::<f64>() / self.a.iter().sum::<f64>()
    }

    /// Complex response at normalized angular frequency `w` (radians/sample).
    fn response(&self, w: f64) -> Complex64 {
        let z1 = Complex64::from_polar(1.0, -w);
        let z2 = z1 * z1;
        let num = self.b[0] + z1 * self.b[1] + z2 * self.b[2];
        let den = self.a[0] + z1 * self.a[1] + z2 * self.a[2];
        num / den
    }
}

/// A digital Butterworth band-pass filter as a cascade of biquads.
#[derive(Clone, Debug, PartialEq)]
pub struct BandpassFilter {
    sections: Vec<BiquadCoeffs>,
}

impl BandpassFilter {
    /// Designs an order-`order` Butterworth band-pass for `[low_hz, high_hz]`
    /// at `sample_rate`. Band edges are normalized to Nyquist and clamped to
    /// `[0.01, 0.99]`; returns `None` when the clamped low edge is not below
    /// the high edge.
    pub fn design(sample_rate: f64, low_hz: f64, high_hz: f64, order: usize) -> Option<Self> {
        let nyquist = sample_rate / 2.0;
        if order == 0 || !(nyquist > 0.0) {
            return None;
        }
        let low = (low_hz / nyquist).clamp(0.01, 0.99);
        let high = (high_hz / nyquist).clamp(0.01, 0.99);
        if !(low < high) {
            return None;
        }
        Some(Self::from_normalized(low, high, order))
    }

    /// `low` and `high` are fractions of Nyquist, `0 < low < high < 1`.
    fn from_normalized(low: f64, high: f64, order: usize) -> Self {
        // Work at fs = 2 so that Nyquist is 1.
        let fs2 = 4.0;
        let warp = |w: f64| fs2 * (PI * w / 2.0).tan();
        let (w_lo, w_hi) = (warp(low), warp(high));
        let bw = w_hi - w_lo;
        let wo2 = w_lo * w_hi;

        // Analog band-pass poles from the low-pass prototype.
        let n = order as i32;
        let mut analog_poles = Vec::with_capacity(2 * order);
        for m in (-n + 1..n).step_by(2) {
            let proto = -Complex64::from_polar(1.0, PI * m as f64 / (2.0 * n as f64));
            let lp = proto * (bw / 2.0);
            let d = (lp * lp - wo2).sqrt();
            analog_poles.push(lp + d);
            analog_poles.push(lp - d);
        }

        // Bilinear transform. The `order` analog zeros at the origin land on
        // z = 1 and the zeros at infinity on z = -1.
        let digital_poles: Vec<Complex64> = analog_poles
            .iter()
            .map(|&p| (fs2 + p) / (fs2 - p))
            .collect();
        let denom: Complex64 = analog_poles.iter().map(|&p| fs2 - p).product();
        let gain = bw.powi(n) * (Complex64::new(fs2.powi(n), 0.0) / denom).re;

        let mut sections: Vec<BiquadCoeffs> = pair_poles(&digital_poles)
            .into_iter()
            .map(|a| BiquadCoeffs {
                b: [1.0, 0.0, -1.0],
                a,
            })
            .collect();
        if let Some(first) = sections.first_mut() {
            for b in first.b.iter_mut() {
                *b *= gain;
            }
        }

        Self { sections }
    }

    /// The second-order sections, in application order.
    pub fn sections(&self) -> &[BiquadCoeffs] {
        &self.sections
    }

    /// Edge padding used by [`BandpassFilter::filtfilt`].
    pub fn padlen(&self) -> usize {
        3 * (2 * self.sections.len() + 1)
    }

    /// Magnitude response at `freq_hz`.
    pub fn magnitude(&self, freq_hz: f64, sample_rate: f64) -> f64 {
        let w = 2.0 * PI * freq_hz / sample_rate;
        self.sections
            .iter()
            .map(|s| s.response(w))
            .product::<Complex64>()
            .norm()
    }

    /// Single forward pass with the given per-section state.
    fn run(&self, input: &[f64], state: &mut [[f64; 2]]) -> Vec<f64> {
        let mut signal = input.to_vec();
        for (section, z) in self.sections.iter().zip(state.iter_mut()) {
            let [b0, b1, b2] = section.b;
            let [_, a1, a2] = section.a;
            for x in signal.iter_mut() {
                let input = *x;
                let output = b0 * input + z[0];
                z[0] = b1 * input - a1 * output + z[1];
                z[1] = b2 * input - a2 * output;
                *x = output;
            }
        }
        signal
    }

    /// Causal filtering from rest.
    pub fn filter(&self, input: &[f64]) -> Vec<f64> {
        let mut state = vec![[0.0; 2]; self.sections.len()];
        self.run(input, &mut state)
    }

    // Per-section steady state for a unit step through the whole cascade.
    fn cascade_zi(&self) -> Vec<[f64; 2]> {
        let mut scale = 1.0;
        self.sections
            .iter()
            .map(|section| {
                let [z0, z1] = section.lfilter_zi();
                let zi = [z0 * scale, z1 * scale];
                scale *= section.dc_gain();
                zi
            })
            .collect()
    }

    /// Zero-phase filtering: forward, then backward over the result. Returns
    /// `None` if the input is not longer than [`BandpassFilter::padlen`].
    pub fn filtfilt(&self, input: &[f64]) -> Option<Vec<f64>> {
        let padlen = self.padlen();
        let n = input.len();
        if n <= padlen || input.iter().any(|v| !v.is_finite()) {
            return None;
        }

        let first = input[0];
        let last = input[n - 1];
        let mut extended = Vec::with_capacity(n + 2 * padlen);
        extended.extend((1..=padlen).rev().map(|i| 2.0 * first - input[i]));
        extended.extend_from_slice(input);
        extended.extend((1..=padlen).map(|i| 2.0 * last - input[n - 1 - i]));

        let zi = self.cascade_zi();
        let scaled = |x0: f64| -> Vec<[f64; 2]> {
            zi.iter().map(|z| [z[0] * x0, z[1] * x0]).collect()
        };

        let mut state = scaled(extended[0]);
        let mut forward = self.run(&extended, &mut state);

        forward.reverse();
        let mut state = scaled(forward[0]);
        let mut backward = self.run(&forward, &mut state);
        backward.reverse();

        Some(backward[padlen..padlen + n].to_vec())
    }
}

/// Groups poles into second-order denominators `[1, a1, a2]`. Complex poles go
/// with their conjugates, real poles with each other.
fn pair_poles(poles: &[Complex64]) -> Vec<[f64; 3]> {
    const TOL: f64 = 1e-12;
    let mut sections = Vec::new();
    let mut reals = Vec::new();

    for p in poles {
        if p.im > TOL {
            sections.push([1.0, -2.0 * p.re, p.norm_sqr()]);
        } else if p.im.abs() <= TOL {
            reals.push(p.re);
        }
    }
    for pair in reals.chunks(2) {
        match pair {
            [p1, p2] => sections.push([1.0, -(p1 + p2), p1 * p2]),
            [p] => sections.push([1.0, -p, 0.0]),
            _ => {}
        }
    }
    sections
}

/// Population variance (divides by `n`).
pub fn variance(signal: &[f64]) -> f64 {
    if signal.is_empty() {
        return 0.0;
    }
    let n = signal.len() as f64;
    let mean = signal.iter().sum::<f64>() / n;
    signal.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n
}

#[cfg(test)]
mod tests {
    use super::*;

    const FS: f64 = 250.0;

    fn beta() -> BandpassFilter {
        BandpassFilter::design(FS, 13.0, 30.0, 4).unwrap()
    }

    fn sine(freq: f64, amplitude: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| amplitude * (2.0 * PI * freq * i as f64 / FS).sin())
            .collect()
    }

    #[test]
    fn fourth_order_band_pass_has_four_sections() {
        let filter = beta();
        assert_eq!(filter.sections().len(), 4);
        assert_eq!(filter.padlen(), 27);
        for s in filter.sections() {
            // Every pole inside the unit circle.
            assert!(s.a[2] < 1.0 && s.a[2] > 0.0);
        }
    }

    #[test]
    fn band_edges_are_half_power() {
        let filter = beta();
        let edge = std::f64::consts::FRAC_1_SQRT_2;
        assert!((filter.magnitude(13.0, FS) - edge).abs() < 1e-6);
        assert!((filter.magnitude(30.0, FS) - edge).abs() < 1e-6);
        assert!(filter.magnitude(20.0, FS) > 0.98);
        assert!(filter.magnitude(0.0, FS) < 1e-9);
        assert!(filter.magnitude(2.0, FS) < 1e-3);
        assert!(filter.magnitude(80.0, FS) < 1e-2);
    }

    #[test]
    fn degenerate_bands_are_rejected() {
        assert!(BandpassFilter::design(FS, 30.0, 13.0, 4).is_none());
        // Both edges clamp to 0.99 of Nyquist.
        assert!(BandpassFilter::design(FS, 200.0, 300.0, 4).is_none());
        assert!(BandpassFilter::design(0.0, 13.0, 30.0, 4).is_none());
        assert!(BandpassFilter::design(FS, 13.0, 30.0, 0).is_none());
    }

    #[test]
    fn filtfilt_keeps_in_band_power() {
        let filter = beta();
        let x = sine(20.0, 10.0, 250);
        let y = filter.filtfilt(&x).unwrap();
        assert_eq!(y.len(), x.len());
        // Sine of amplitude 10 has variance 50.
        let v = variance(&y);
        assert!(v > 40.0 && v < 55.0, "variance {}", v);
    }

    #[test]
    fn filtfilt_rejects_out_of_band_power() {
        let filter = beta();
        let slow = filter.filtfilt(&sine(4.0, 10.0, 250)).unwrap();
        assert!(variance(&slow) < 1.0);
        let flat = filter.filtfilt(&vec![3.0; 250]).unwrap();
        assert!(variance(&flat) < 1e-9);
    }

    #[test]
    fn filtfilt_needs_more_than_padlen() {
        let filter = beta();
        assert!(filter.filtfilt(&[1.0; 27]).is_none());
        assert!(filter.filtfilt(&[1.0; 28]).is_some());
        let mut bad = vec![0.0; 100];
        bad[4] = f64::NAN;
        assert!(filter.filtfilt(&bad).is_none());
    }

    #[test]
    fn variance_is_population_variance() {
        assert_eq!(variance(&[]), 0.0);
        assert_eq!(variance(&[1.0, 3.0]), 1.0);
    }
}
