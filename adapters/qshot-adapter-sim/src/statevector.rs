//! Statevector simulation engine.

use num_complex::Complex64;
use rand::Rng;

/// A pure state of `num_qubits` qubits. Qubit `q` is bit `q` of the
/// amplitude index.
#[derive(Debug, Clone)]
pub struct Statevector {
    /// The state amplitudes (2^n complex numbers).
    amplitudes: Vec<Complex64>,
    num_qubits: usize,
}

impl Statevector {
    /// Create a new statevector initialized to |0...0⟩.
    pub fn new(num_qubits: usize) -> Self {
        let size = 1 << num_qubits;
        let mut amplitudes = vec![Complex64::new(0.0, 0.0); size];
        amplitudes[0] = Complex64::new(1.0, 0.0);
        Self {
            amplitudes,
            num_qubits,
        }
    }

    pub fn num_qubits(&self) -> usize {
        self.num_qubits
    }

    #[cfg(test)]
    pub(crate) fn amplitudes(&self) -> &[Complex64] {
        &self.amplitudes
    }

    // =========================================================================
    // Native gates
    // =========================================================================

    /// `RXY(θ, φ) = exp(-iθ/2 (cos φ X + sin φ Y))`
    pub fn apply_rxy(&mut self, qubit: usize, theta: f64, phi: f64) {
        let mask = 1 << qubit;
        let c = Complex64::new((theta / 2.0).cos(), 0.0);
        let s = (theta / 2.0).sin();
        // Off-diagonal entries: -i e^{∓iφ} sin(θ/2).
        let upper = Complex64::new(0.0, -1.0) * Complex64::from_polar(s, -phi);
        let lower = Complex64::new(0.0, -1.0) * Complex64::from_polar(s, phi);
        for i in 0..self.amplitudes.len() {
            if i & mask == 0 {
                let j = i | mask;
                let a = self.amplitudes[i];
                let b = self.amplitudes[j];
                self.amplitudes[i] = c * a + upper * b;
                self.amplitudes[j] = lower * a + c * b;
            }
        }
    }

    /// `RZ(θ) = diag(e^{-iθ/2}, e^{iθ/2})`
    pub fn apply_rz(&mut self, qubit: usize, theta: f64) {
        let mask = 1 << qubit;
        let phase_0 = Complex64::from_polar(1.0, -theta / 2.0);
        let phase_1 = Complex64::from_polar(1.0, theta / 2.0);
        for (i, amp) in self.amplitudes.iter_mut().enumerate() {
            if i & mask == 0 {
                *amp *= phase_0;
            } else {
                *amp *= phase_1;
            }
        }
    }

    /// `RZZ(θ) = exp(-iθ/2 Z⊗Z)`
    pub fn apply_rzz(&mut self, q1: usize, q2: usize, theta: f64) {
        let mask = (1 << q1) | (1 << q2);
        let even = Complex64::from_polar(1.0, -theta / 2.0);
        let odd = Complex64::from_polar(1.0, theta / 2.0);
        for (i, amp) in self.amplitudes.iter_mut().enumerate() {
            if (i & mask).count_ones() % 2 == 0 {
                *amp *= even;
            } else {
                *amp *= odd;
            }
        }
    }

    pub fn apply_cz(&mut self, q1: usize, q2: usize) {
        let mask = (1 << q1) | (1 << q2);
        for (i, amp) in self.amplitudes.iter_mut().enumerate() {
            if i & mask == mask {
                *amp = -*amp;
            }
        }
    }

    fn apply_x(&mut self, qubit: usize) {
        let mask = 1 << qubit;
        for i in 0..self.amplitudes.len() {
            if i & mask == 0 {
                self.amplitudes.swap(i, i | mask);
            }
        }
    }

    // =========================================================================
    // Measurement
    // =========================================================================

    /// Probability of reading 1 on `qubit`.
    pub fn probability_one(&self, qubit: usize) -> f64 {
        let mask = 1 << qubit;
        self.amplitudes
            .iter()
            .enumerate()
            .filter(|(i, _)| i & mask != 0)
            .map(|(_, a)| a.norm_sqr())
            .sum()
    }

    /// Measure `qubit` in the Z basis and collapse the state.
    pub fn measure<R: Rng + ?Sized>(&mut self, qubit: usize, rng: &mut R) -> bool {
        let p1 = self.probability_one(qubit).clamp(0.0, 1.0);
        let outcome = rng.r#gen::<f64>() < p1;
        let kept = if outcome { p1 } else { 1.0 - p1 };
        let norm = if kept > 0.0 { 1.0 / kept.sqrt() } else { 0.0 };

        let mask = 1 << qubit;
        for (i, amp) in self.amplitudes.iter_mut().enumerate() {
            if (i & mask != 0) == outcome {
                *amp *= norm;
            } else {
                *amp = Complex64::new(0.0, 0.0);
            }
        }
        outcome
    }

    /// Return `qubit` to |0⟩.
    pub fn reset<R: Rng + ?Sized>(&mut self, qubit: usize, rng: &mut R) {
        if self.measure(qubit, rng) {
            self.apply_x(qubit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::f64::consts::PI;

    fn approx_eq(a: Complex64, b: Complex64) -> bool {
        (a - b).norm() < 1e-10
    }

    #[test]
    fn test_initial_state() {
        let sv = Statevector::new(2);
        assert_eq!(sv.num_qubits(), 2);
        assert!(approx_eq(sv.amplitudes()[0], Complex64::new(1.0, 0.0)));
        assert!(approx_eq(sv.amplitudes()[3], Complex64::new(0.0, 0.0)));
    }

    #[test]
    fn test_rxy_pi_flips() {
        let mut sv = Statevector::new(1);
        sv.apply_rxy(0, PI, 0.0);
        assert!((sv.probability_one(0) - 1.0).abs() < 1e-10);
        // RX(π)|0⟩ = -i|1⟩
        assert!(approx_eq(sv.amplitudes()[1], Complex64::new(0.0, -1.0)));

        let mut sv = Statevector::new(1);
        sv.apply_rxy(0, PI, PI / 2.0);
        // RY(π)|0⟩ = |1⟩
        assert!(approx_eq(sv.amplitudes()[1], Complex64::new(1.0, 0.0)));
    }

    #[test]
    fn test_rzz_phase_by_parity() {
        let mut sv = Statevector::new(2);
        sv.apply_rxy(0, PI, PI / 2.0);
        sv.apply_rzz(0, 1, PI);
        // |01⟩ has odd parity: phase e^{iπ/2} = i
        assert!(approx_eq(sv.amplitudes()[1], Complex64::new(0.0, 1.0)));
    }

    #[test]
    fn test_cz_on_11() {
        let mut sv = Statevector::new(2);
        sv.apply_rxy(0, PI, PI / 2.0);
        sv.apply_rxy(1, PI, PI / 2.0);
        sv.apply_cz(0, 1);
        assert!(approx_eq(sv.amplitudes()[3], Complex64::new(-1.0, 0.0)));
    }

    #[test]
    fn test_measure_collapses() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut sv = Statevector::new(1);
        sv.apply_rxy(0, PI / 2.0, 0.0);
        let outcome = sv.measure(0, &mut rng);
        let expected = if outcome { 1.0 } else { 0.0 };
        assert!((sv.probability_one(0) - expected).abs() < 1e-10);
        // A second measurement agrees with the first.
        assert_eq!(sv.measure(0, &mut rng), outcome);
    }

    #[test]
    fn test_reset_returns_to_zero() {
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..20 {
            let mut sv = Statevector::new(1);
            sv.apply_rxy(0, PI / 2.0, 0.3);
            sv.reset(0, &mut rng);
            assert!(sv.probability_one(0) < 1e-10);
        }
    }
}
