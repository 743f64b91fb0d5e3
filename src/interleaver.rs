//! Interleaver for sequences of a given length

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::matrix::Matrix;
use crate::Error;

/// Interleaver for sequences of a given length
///
/// A fixed permutation, or a randomly drawn one that can be reseeded with
/// [`seed`](Self::seed) and advanced to a fresh permutation per block with
/// [`advance`](Self::advance).
#[derive(Debug)]
pub struct Interleaver {
    /// Length of input/output sequence
    pub(crate) length: usize,
    /// Input index for each output index (needed in interleaving)
    pub(crate) all_in_index_given_out_index: Vec<usize>,
    /// Output index for each input index (needed in deinterleaving)
    pub(crate) all_out_index_given_in_index: Vec<usize>,
    /// Permutation source for randomly constructed interleavers
    rng: Option<StdRng>,
}

impl Interleaver {
    /// Returns interleaver corresponding to a given permutation.
    ///
    /// # Parameters
    ///
    /// - `perm`: Permutation of integers in `[0, L)` for some positive integer `L`. If the
    ///   interleaver input is the sequence `x[0], x[1], ..., x[L-1]`, then its output is the
    ///   sequence `x[perm[0]], x[perm[1]], ..., x[perm[L-1]]`.
    ///
    /// # Errors
    ///
    /// Returns an error if `perm` is not a permutation of the integers in `[0, L)` for some
    /// positive integer `L`.
    pub fn new(perm: &[usize]) -> Result<Self, Error> {
        if perm.is_empty() {
            return Err(Error::InvalidConfig(
                "Permutation defining interleaver cannot be empty".to_string(),
            ));
        }
        let perm_vec = perm.to_vec();
        let mut perm_vec_sorted = perm.to_vec();
        perm_vec_sorted.sort_unstable();
        if !perm_vec_sorted.into_iter().eq(0 .. perm_vec.len()) {
            return Err(Error::InvalidConfig(format!(
                "Expected permutation of all integers in the range [0, {}), found {:?}",
                perm_vec.len(),
                perm_vec
            )));
        }
        Ok(Self::from_valid_perm(perm_vec, None))
    }

    /// Returns the identity interleaver for sequences of a given length.
    ///
    /// # Errors
    ///
    /// Returns an error if `length` is `0`.
    pub fn identity(length: usize) -> Result<Self, Error> {
        if length == 0 {
            return Err(Error::InvalidConfig(
                "Length of interleaver must be a positive integer".to_string(),
            ));
        }
        Ok(Self::from_valid_perm((0 .. length).collect(), None))
    }

    /// Returns random interleaver for sequences of a given length.
    ///
    /// # Parameters
    ///
    /// - `length`: Length of input/output sequence.
    ///
    /// # Errors
    ///
    /// Returns an error if `length` is `0`.
    pub fn random(length: usize) -> Result<Self, Error> {
        if length == 0 {
            return Err(Error::InvalidConfig(
                "Length of interleaver must be a positive integer".to_string(),
            ));
        }
        let mut rng = StdRng::from_os_rng();
        let mut perm_vec: Vec<usize> = (0 .. length).collect();
        perm_vec.shuffle(&mut rng);
        Ok(Self::from_valid_perm(perm_vec, Some(rng)))
    }

    /// Returns the sequence length.
    #[must_use]
    pub fn length(&self) -> usize {
        self.length
    }

    /// Reseeds the permutation source and redraws the permutation.
    ///
    /// Has no effect on interleavers built from an explicit permutation.
    pub fn seed(&mut self, seed: u32) {
        if self.rng.is_some() {
            self.rng = Some(StdRng::seed_from_u64(u64::from(seed)));
            self.advance();
        }
    }

    /// Advances to the permutation for the next block.
    ///
    /// Has no effect on interleavers built from an explicit permutation.
    pub fn advance(&mut self) {
        if let Some(rng) = self.rng.as_mut() {
            let mut perm_vec: Vec<usize> = (0 .. self.length).collect();
            perm_vec.shuffle(rng);
            let mut all_out_index_given_in_index: Vec<usize> = (0 .. self.length).collect();
            all_out_index_given_in_index.sort_by_key(|&k| perm_vec[k]);
            self.all_in_index_given_out_index = perm_vec;
            self.all_out_index_given_in_index = all_out_index_given_in_index;
        }
    }

    /// Generates interleaver output given its input.
    ///
    /// # Parameters
    ///
    /// - `input`: Interleaver input.
    ///
    /// - `output`: Buffer for interleaver output (any pre-existing contents will be cleared).
    ///
    /// # Errors
    ///
    /// Returns an error if `input.len()` is not equal to `self.length`.
    pub fn transform<T: Copy>(&self, input: &[T], output: &mut Vec<T>) -> Result<(), Error> {
        if input.len() != self.length {
            return Err(Error::ShapeMismatch(format!(
                "Invalid interleaver input length (expected {}, found {})",
                self.length,
                input.len()
            )));
        }
        output.clear();
        for out_index in 0 .. self.length {
            output.push(input[self.all_in_index_given_out_index[out_index]]);
        }
        Ok(())
    }

    /// Generates interleaver input given its output.
    ///
    /// # Parameters
    ///
    /// - `output`: Interleaver output.
    ///
    /// - `input`: Buffer for interleaver input (any pre-existing contents will be cleared).
    ///
    /// # Errors
    ///
    /// Returns an error if `output.len()` is not equal to `self.length`.
    pub fn inverse<T: Copy>(&self, output: &[T], input: &mut Vec<T>) -> Result<(), Error> {
        if output.len() != self.length {
            return Err(Error::ShapeMismatch(format!(
                "Invalid interleaver output length (expected {}, found {})",
                self.length,
                output.len()
            )));
        }
        input.clear();
        for in_index in 0 .. self.length {
            input.push(output[self.all_out_index_given_in_index[in_index]]);
        }
        Ok(())
    }

    /// Permutes the rows of a time-indexed probability matrix.
    ///
    /// # Errors
    ///
    /// Returns an error if the matrix does not have `self.length` rows.
    pub fn transform_matrix(&self, input: &Matrix<f64>, output: &mut Matrix<f64>) -> Result<(), Error> {
        self.check_matrix(input)?;
        output.resize(input.rows(), input.cols(), 0.0);
        for out_index in 0 .. self.length {
            let in_index = self.all_in_index_given_out_index[out_index];
            for c in 0 .. input.cols() {
                output[(out_index, c)] = input[(in_index, c)];
            }
        }
        Ok(())
    }

    /// Un-permutes the rows of a time-indexed probability matrix.
    ///
    /// # Errors
    ///
    /// Returns an error if the matrix does not have `self.length` rows.
    pub fn inverse_matrix(&self, output: &Matrix<f64>, input: &mut Matrix<f64>) -> Result<(), Error> {
        self.check_matrix(output)?;
        input.resize(output.rows(), output.cols(), 0.0);
        for in_index in 0 .. self.length {
            let out_index = self.all_out_index_given_in_index[in_index];
            for c in 0 .. output.cols() {
                input[(in_index, c)] = output[(out_index, c)];
            }
        }
        Ok(())
    }

    /// Checks that a matrix has one row per sequence element.
    fn check_matrix(&self, m: &Matrix<f64>) -> Result<(), Error> {
        if m.rows() == self.length {
            Ok(())
        } else {
            Err(Error::ShapeMismatch(format!(
                "Invalid matrix row count (expected {}, found {})",
                self.length,
                m.rows()
            )))
        }
    }

    /// Returns interleaver corresponding to a valid permutation.
    fn from_valid_perm(perm_vec: Vec<usize>, rng: Option<StdRng>) -> Self {
        let length = perm_vec.len();
        let all_in_index_given_out_index: Vec<usize> = perm_vec;
        let mut all_out_index_given_in_index: Vec<usize> = (0 .. length).collect();
        all_out_index_given_in_index.sort_by_key(|&k| all_in_index_given_out_index[k]);
        Self {
            length,
            all_in_index_given_out_index,
            all_out_index_given_in_index,
            rng,
        }
    }
}

/// Returns a seeded random permutation, for building reproducible interleavers.
#[must_use]
pub fn seeded_permutation(length: usize, seed: u64) -> Vec<usize> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut perm: Vec<usize> = (0 .. length).collect();
    perm.shuffle(&mut rng);
    perm
}

/// Returns a seeded random permutation that moves positions only within
/// residue classes of the given modulus.
///
/// Two input sequences that are such permutations of each other leave a
/// recursive encoder in the same end state when the modulus is the period of
/// its feedback register, so every parity set of a terminated turbo code
/// stays terminated.
#[must_use]
pub fn seeded_residue_permutation(length: usize, modulus: usize, seed: u64) -> Vec<usize> {
    let modulus = modulus.max(1);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut perm = vec![0; length];
    for class in 0 .. modulus.min(length) {
        let slots: Vec<usize> = (class .. length).step_by(modulus).collect();
        let mut values = slots.clone();
        values.shuffle(&mut rng);
        for (&slot, &value) in slots.iter().zip(values.iter()) {
            perm[slot] = value;
        }
    }
    perm
}

#[cfg(test)]
mod tests_of_interleaver {
    use super::*;

    #[test]
    fn test_new() {
        // Invalid input
        assert!(Interleaver::new(&[]).is_err());
        assert!(Interleaver::new(&[1, 2, 3, 4]).is_err());
        assert!(Interleaver::new(&[0, 1, 2, 4]).is_err());
        assert!(Interleaver::new(&[0, 0, 1, 2]).is_err());
        // Valid input
        let interleaver = Interleaver::new(&[0, 3, 2, 5, 4, 7, 6, 1]).unwrap();
        assert_eq!(interleaver.length, 8);
        assert_eq!(
            interleaver.all_in_index_given_out_index,
            [0, 3, 2, 5, 4, 7, 6, 1]
        );
        assert_eq!(
            interleaver.all_out_index_given_in_index,
            [0, 7, 2, 1, 4, 3, 6, 5]
        );
    }

    #[test]
    fn test_identity() {
        assert!(Interleaver::identity(0).is_err());
        let interleaver = Interleaver::identity(4).unwrap();
        let mut output = Vec::new();
        interleaver.transform(&['a', 'b', 'c', 'd'], &mut output).unwrap();
        assert_eq!(output, ['a', 'b', 'c', 'd']);
    }

    #[test]
    fn test_random() {
        // Invalid input
        assert!(Interleaver::random(0).is_err());
        // Valid input
        let length = 8;
        let interleaver = Interleaver::random(length).unwrap();
        let mut o2i = interleaver.all_in_index_given_out_index;
        o2i.sort_unstable();
        assert!(o2i == (0 .. length).collect::<Vec<usize>>());
    }

    #[test]
    fn test_seed_is_reproducible() {
        let mut first = Interleaver::random(16).unwrap();
        let mut second = Interleaver::random(16).unwrap();
        first.seed(42);
        second.seed(42);
        assert_eq!(
            first.all_in_index_given_out_index,
            second.all_in_index_given_out_index
        );
        // advancing draws a fresh permutation in lockstep
        first.advance();
        second.advance();
        assert_eq!(
            first.all_in_index_given_out_index,
            second.all_in_index_given_out_index
        );
    }

    #[test]
    fn test_seed_ignored_for_fixed_permutation() {
        let mut interleaver = Interleaver::new(&[0, 3, 2, 5, 4, 7, 6, 1]).unwrap();
        interleaver.seed(42);
        interleaver.advance();
        assert_eq!(
            interleaver.all_in_index_given_out_index,
            [0, 3, 2, 5, 4, 7, 6, 1]
        );
    }

    #[test]
    fn test_transform() {
        let interleaver = Interleaver::new(&[0, 3, 2, 5, 4, 7, 6, 1]).unwrap();
        let mut output = Vec::new();
        // Invalid input
        let input = ['a', 'b', 'c', 'd', 'e', 'f', 'g'];
        assert!(interleaver.transform(&input, &mut output).is_err());
        // Valid input
        let input = ['a', 'b', 'c', 'd', 'e', 'f', 'g', 'h'];
        for _ in 0 .. 2 {
            interleaver.transform(&input, &mut output).unwrap();
            assert_eq!(output, ['a', 'd', 'c', 'f', 'e', 'h', 'g', 'b']);
        }
    }

    #[test]
    fn test_inverse() {
        let interleaver = Interleaver::new(&[0, 3, 2, 5, 4, 7, 6, 1]).unwrap();
        let mut input = Vec::new();
        // Invalid output
        let output = ['a', 'd', 'c', 'f', 'e', 'h', 'g'];
        assert!(interleaver.inverse(&output, &mut input).is_err());
        // Valid output
        let output = ['a', 'd', 'c', 'f', 'e', 'h', 'g', 'b'];
        for _ in 0 .. 2 {
            interleaver.inverse(&output, &mut input).unwrap();
            assert_eq!(input, ['a', 'b', 'c', 'd', 'e', 'f', 'g', 'h']);
        }
    }

    #[test]
    fn test_round_trip_on_slices() {
        let mut interleaver = Interleaver::random(32).unwrap();
        interleaver.seed(7);
        let input: Vec<usize> = (0 .. 32).map(|i| i * 3 % 17).collect();
        let mut permuted = Vec::new();
        let mut recovered = Vec::new();
        interleaver.transform(&input, &mut permuted).unwrap();
        interleaver.inverse(&permuted, &mut recovered).unwrap();
        assert_eq!(recovered, input);
    }

    #[test]
    fn test_round_trip_on_matrices() {
        let mut interleaver = Interleaver::random(12).unwrap();
        interleaver.seed(3);
        let mut input = Matrix::new(12, 3, 0.0);
        for t in 0 .. 12 {
            for c in 0 .. 3 {
                input[(t, c)] = (t * 3 + c) as f64;
            }
        }
        let mut permuted = Matrix::new(0, 0, 0.0);
        let mut recovered = Matrix::new(0, 0, 0.0);
        interleaver.transform_matrix(&input, &mut permuted).unwrap();
        interleaver.inverse_matrix(&permuted, &mut recovered).unwrap();
        assert_eq!(recovered, input);
        // row permutation preserves row contents
        let mut row0: Vec<f64> = permuted.row(interleaver.all_out_index_given_in_index[0]).to_vec();
        row0.sort_by(f64::total_cmp);
        assert_eq!(row0, [0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_seeded_permutation() {
        let perm = seeded_permutation(16, 9);
        let again = seeded_permutation(16, 9);
        assert_eq!(perm, again);
        let mut sorted = perm.clone();
        sorted.sort_unstable();
        assert!(sorted.into_iter().eq(0 .. 16));
    }

    #[test]
    fn test_seeded_residue_permutation() {
        let perm = seeded_residue_permutation(20, 3, 4);
        assert_eq!(perm, seeded_residue_permutation(20, 3, 4));
        // a valid permutation that preserves index residues
        let mut sorted = perm.clone();
        sorted.sort_unstable();
        assert!(sorted.into_iter().eq(0 .. 20));
        for (slot, &value) in perm.iter().enumerate() {
            assert_eq!(slot % 3, value % 3);
        }
    }
}
