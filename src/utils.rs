//! Collection of useful functions for simulating code performance
//!
//! # Examples
//!
//! ```
//! use rand::{rngs::StdRng, SeedableRng};
//! use sisodec::utils;
//!
//! let mut rng = StdRng::seed_from_u64(0);
//! let symbols = utils::random_symbols(2, 40, &mut rng);
//! let bits = utils::expand_bits(&symbols, 1);
//! let ptable = utils::bpsk_awgn_ptable(&bits, 10.0, &mut rng);
//! assert_eq!(ptable.rows(), 40);
//! ```

use rand::Rng;
use rand_distr::StandardNormal;

use crate::matrix::Matrix;

/// Returns given number of uniformly random symbols from a q-ary alphabet.
///
/// # Parameters
///
/// - `q`: Alphabet size.
///
/// - `num_symbols`: Number of random symbols to be generated.
///
/// - `rng`: Random number generator to be used.
pub fn random_symbols<R: Rng>(q: usize, num_symbols: usize, rng: &mut R) -> Vec<usize> {
    (0 .. num_symbols).map(|_| rng.random_range(0 .. q)).collect()
}

/// Expands each symbol into its bits, least-significant first.
///
/// # Parameters
///
/// - `symbols`: Symbols to be expanded.
///
/// - `bits_per_symbol`: Number of bits per symbol.
#[must_use]
pub fn expand_bits(symbols: &[usize], bits_per_symbol: usize) -> Vec<usize> {
    let mut bits = Vec::with_capacity(symbols.len() * bits_per_symbol);
    for &symbol in symbols {
        for j in 0 .. bits_per_symbol {
            bits.push((symbol >> j) & 1);
        }
    }
    bits
}

/// Returns bit-level likelihoods at a BPSK-AWGN channel output for given
/// transmitted bits.
///
/// # Parameters
///
/// - `bits`: Bits to be transmitted over the BPSK-AWGN channel.
///
/// - `es_over_n0_db`: Ratio (dB) of symbol energy to noise power spectral
///   density at the BPSK-AWGN channel output (if the BPSK symbols are `+1.0`
///   and `-1.0`, then the noise variance is
///   `0.5 / 10f64.powf(0.1 * es_over_n0_db)`).
///
/// - `rng`: Random number generator to be used.
///
/// # Returns
///
/// - `ptable`: One row per bit holding the likelihoods of having transmitted
///   `0` and `1`, normalised to unit sum.
pub fn bpsk_awgn_ptable<R: Rng>(bits: &[usize], es_over_n0_db: f64, rng: &mut R) -> Matrix<f64> {
    let es_over_n0 = 10f64.powf(0.1 * es_over_n0_db);
    let noise_var = 0.5 / es_over_n0;
    let mut ptable = Matrix::new(bits.len(), 2, 0.0);
    for (t, &bit) in bits.iter().enumerate() {
        let tx = if bit == 0 { 1.0 } else { -1.0 };
        let rx = tx + noise_var.sqrt() * rng.sample::<f64, _>(StandardNormal);
        let p0 = (-(rx - 1.0) * (rx - 1.0) / (2.0 * noise_var)).exp();
        let p1 = (-(rx + 1.0) * (rx + 1.0) / (2.0 * noise_var)).exp();
        let sum = p0 + p1;
        ptable[(t, 0)] = p0 / sum;
        ptable[(t, 1)] = p1 / sum;
    }
    ptable
}

/// Returns number of errors in a sequence with respect to a reference sequence.
///
/// # Parameters
///
/// - `seq`: Sequence in which errors must be counted.
///
/// - `ref_seq`: Reference sequence to which the given sequence is compared.
///
/// # Returns
///
/// - `err_count`: Number of positions in which the two sequences differ. If they are of different
///   lengths, then the longer sequence is effectively truncated to the length of the shorter one.
pub fn error_count<T: PartialEq>(seq: &[T], ref_seq: &[T]) -> usize {
    ref_seq
        .iter()
        .zip(seq.iter())
        .filter(|&(x, y)| x != y)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_random_symbols() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(random_symbols(2, 0, &mut rng).is_empty());
        let num_symbols = 10000;
        let symbols = random_symbols(4, num_symbols, &mut rng);
        assert!(symbols.iter().all(|&s| s < 4));
        for value in 0 .. 4 {
            let count = symbols.iter().filter(|&&s| s == value).count();
            assert!(count > 2200 && count < 2800, "count = {count}");
        }
    }

    #[test]
    fn test_expand_bits() {
        assert!(expand_bits(&[], 3).is_empty());
        assert_eq!(expand_bits(&[5, 2], 3), [1, 0, 1, 0, 1, 0]);
        assert_eq!(expand_bits(&[1, 0], 1), [1, 0]);
    }

    #[test]
    fn test_bpsk_awgn_ptable() {
        let mut rng = StdRng::seed_from_u64(1);
        let bits = random_symbols(2, 1000, &mut rng);
        let ptable = bpsk_awgn_ptable(&bits, 10.0, &mut rng);
        // rows are unit-sum pdfs
        for t in 0 .. ptable.rows() {
            let sum: f64 = ptable.row(t).iter().sum();
            assert!((sum - 1.0).abs() < 1e-12);
        }
        // at 10 dB, the vast majority of bits are sliced correctly
        let correct = bits
            .iter()
            .enumerate()
            .filter(|&(t, &bit)| ptable[(t, bit)] > 0.5)
            .count();
        assert!(correct > 980, "correct = {correct}");
    }

    #[test]
    fn test_error_count() {
        assert_eq!(error_count::<usize>(&[], &[1, 0]), 0);
        assert_eq!(error_count(&[1, 0], &[]), 0);
        // Longer `seq`
        let ref_seq = [1, 0, 0, 1, 1, 1, 0, 0];
        let seq = [1, 1, 0, 0, 1, 1, 0, 0, 0, 1];
        assert_eq!(error_count(&seq, &ref_seq), 2);
        // Shorter `seq`
        let ref_seq = [1, 0, 0, 1, 1, 1, 0, 0, 0, 1];
        let seq = [1, 1, 0, 0, 1, 1, 0, 0];
        assert_eq!(error_count(&seq, &ref_seq), 2);
    }
}
