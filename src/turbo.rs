//! Turbo codec: parallel concatenation of one convolutional code over
//! multiple interleaved sets, decoded by iterated BCJR passes exchanging
//! extrinsic information

use crate::bcjr::{normalize_rows_max, Bcjr};
use crate::fsm::Fsm;
use crate::interleaver::Interleaver;
use crate::matrix::Matrix;
use crate::real::Real;
use crate::Error;

/// Turbo codec over an abstract constituent encoder
///
/// The constituent code is shared between all sets; set `s` encodes the
/// source permuted by interleaver `s` (the first interleaver is normally the
/// identity). Decoding runs a fixed number of iterations of the serial or
/// parallel schedule, then hard-decides the input posteriors.
///
/// The encoded symbol at each time step packs the data symbol with one
/// parity symbol per set: `data + K * (parity_0 + P * (parity_1 + ...))`,
/// where `K` is the input alphabet and `P` the per-set parity alphabet.
#[derive(Debug)]
pub struct Turbo<R: Real> {
    /// Constituent encoder
    encoder: Box<dyn Fsm>,
    /// Block length (including any tail)
    tau: usize,
    /// One interleaver per set
    interleavers: Vec<Interleaver>,
    /// Number of decoding iterations
    iterations: usize,
    /// Whether the trellis is terminated at the zero state
    end_at_zero: bool,
    /// Whether the sets are decoded on the parallel schedule
    parallel: bool,
    /// Whether the code is circular (tail-biting)
    circular: bool,
    /// Shared BCJR decoder
    bcjr: Bcjr<R>,
    /// Intrinsic source prior, `tau x K`
    rp: Matrix<f64>,
    /// Per-set interleaved source priors, `tau x K`
    r_set: Vec<Matrix<f64>>,
    /// Per-set branch priors, `tau x N`
    r_enc: Vec<Matrix<f64>>,
    /// Extrinsic priors: one matrix on the serial schedule, one per set on
    /// the parallel schedule
    ra: Vec<Matrix<f64>>,
    /// Input posteriors from the last decoding pass
    ri: Matrix<f64>,
    /// Interleaved extrinsic prior (work space)
    rai: Matrix<f64>,
    /// Interleaved input posteriors (work space)
    rii: Matrix<f64>,
    /// Interleaved extrinsic output (work space)
    rei: Matrix<f64>,
    /// Per-set start-state pdfs (circular decoding)
    ss: Vec<Vec<f64>>,
    /// Per-set end-state pdfs (circular decoding)
    se: Vec<Vec<f64>>,
    /// Whether channel information has been translated in
    translated: bool,
}

impl<R: Real> Turbo<R> {
    /// Returns a turbo codec for the given constituent encoder, block
    /// length, interleaver set and schedule flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the block length, set count or iteration count is
    /// zero, if any interleaver length differs from the block length, if the
    /// encoder's output alphabet is not a whole multiple of its input
    /// alphabet, or if zero-state termination is combined with a circular
    /// trellis.
    pub fn new(
        mut encoder: Box<dyn Fsm>,
        tau: usize,
        interleavers: Vec<Interleaver>,
        iterations: usize,
        end_at_zero: bool,
        parallel: bool,
        circular: bool,
    ) -> Result<Self, Error> {
        if interleavers.is_empty() {
            return Err(Error::InvalidConfig(
                "Turbo codec needs at least one interleaver set".to_string(),
            ));
        }
        if iterations == 0 {
            return Err(Error::InvalidConfig(
                "Turbo codec needs at least one decoding iteration".to_string(),
            ));
        }
        if end_at_zero && circular {
            return Err(Error::InvalidConfig(
                "Zero-state termination cannot be combined with a circular trellis".to_string(),
            ));
        }
        if encoder.num_outputs() % encoder.num_inputs() != 0 {
            return Err(Error::InvalidConfig(format!(
                "Encoder output alphabet ({}) must be a whole multiple of its input \
                alphabet ({})",
                encoder.num_outputs(),
                encoder.num_inputs()
            )));
        }
        if let Some(bad) = interleavers.iter().find(|i| i.length() != tau) {
            return Err(Error::InvalidConfig(format!(
                "Interleaver length ({}) must equal the block length ({tau})",
                bad.length()
            )));
        }
        let bcjr = Bcjr::new(encoder.as_mut(), tau)?;
        let mut this = Self {
            encoder,
            tau,
            interleavers,
            iterations,
            end_at_zero,
            parallel,
            circular,
            bcjr,
            rp: Matrix::new(0, 0, 0.0),
            r_set: Vec::new(),
            r_enc: Vec::new(),
            ra: Vec::new(),
            ri: Matrix::new(0, 0, 0.0),
            rai: Matrix::new(0, 0, 0.0),
            rii: Matrix::new(0, 0, 0.0),
            rei: Matrix::new(0, 0, 0.0),
            ss: Vec::new(),
            se: Vec::new(),
            translated: false,
        };
        this.seed(0);
        Ok(this)
    }

    /// Returns the number of parity sets.
    #[must_use]
    pub fn num_sets(&self) -> usize {
        self.interleavers.len()
    }

    /// Returns the block length (including any tail).
    #[must_use]
    pub fn block_length(&self) -> usize {
        self.tau
    }

    /// Returns the number of freely chosen source symbols per block.
    #[must_use]
    pub fn info_length(&self) -> usize {
        if self.end_at_zero {
            self.tau - self.encoder.mem_order()
        } else {
            self.tau
        }
    }

    /// Returns the input alphabet size of the constituent code.
    #[must_use]
    pub fn num_inputs(&self) -> usize {
        self.encoder.num_inputs()
    }

    /// Returns the parity alphabet size of one set.
    #[must_use]
    pub fn num_parity(&self) -> usize {
        self.encoder.num_outputs() / self.encoder.num_inputs()
    }

    /// Returns the encoded symbol alphabet size (data plus all parities).
    #[must_use]
    pub fn num_encoded(&self) -> usize {
        self.num_inputs() * self.num_parity().pow(u32::try_from(self.num_sets()).unwrap_or(u32::MAX))
    }

    /// Seeds all interleavers (offset per set, so sets stay decorrelated).
    pub fn seed(&mut self, seed: u32) {
        for (set, interleaver) in self.interleavers.iter_mut().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            interleaver.seed(seed.wrapping_add(set as u32));
        }
    }

    /// Encodes one source block, returning the encoded symbol sequence and
    /// the full input sequence (source plus any resolved tail symbols).
    ///
    /// Each randomly constructed interleaver advances to its next
    /// permutation here, so a decode following this call sees the same
    /// permutations.
    ///
    /// # Errors
    ///
    /// Returns an error if the source length is not
    /// [`info_length`](Self::info_length), or if a circular code has no
    /// circulation state for this block length.
    pub fn encode(&mut self, source: &[usize]) -> Result<(Vec<usize>, Vec<usize>), Error> {
        if source.len() != self.info_length() {
            return Err(Error::ShapeMismatch(format!(
                "Expected {} source symbols (found {})",
                self.info_length(),
                source.len()
            )));
        }
        let k = self.num_inputs();
        // full input sequence; tail symbols are resolved by the first set
        let mut full: Vec<Option<usize>> = source.iter().map(|&s| Some(s)).collect();
        full.resize(self.tau, None);
        let mut parity = Matrix::new(self.num_sets(), self.tau, 0usize);
        let mut permuted = Vec::with_capacity(self.tau);
        for set in 0 .. self.num_sets() {
            self.interleavers[set].advance();
            self.interleavers[set].transform(&full, &mut permuted)?;
            self.encoder.reset(0);
            // for a circular system, a first pass determines the end state,
            // from which the circulation state follows
            let mut cstate = 0;
            if self.circular {
                for &input in &permuted {
                    self.encoder.advance(input);
                }
                self.encoder.resetcircular()?;
                cstate = self.encoder.state();
            }
            for (t, &input) in permuted.iter().enumerate() {
                let output = self.encoder.step(input);
                parity[(set, t)] = output / k;
                // the systematic part resolves any tail symbol
                if set == 0 && input.is_none() {
                    full[t] = Some(output % k);
                }
            }
            if self.circular && self.encoder.state() != cstate {
                return Err(Error::InvalidConfig(format!(
                    "Set {set} failed to close the circular trellis"
                )));
            }
            if self.end_at_zero && self.encoder.state() != 0 {
                return Err(Error::InvalidConfig(format!(
                    "Set {set} does not terminate at the zero state; a terminated \
                    code needs termination-preserving interleavers"
                )));
            }
        }
        let resolved: Vec<usize> = full
            .iter()
            .map(|input| input.unwrap_or_default())
            .collect();
        let p = self.num_parity();
        let mut encoded = Vec::with_capacity(self.tau);
        for t in 0 .. self.tau {
            let mut symbol = resolved[t];
            let mut mul = k;
            for set in 0 .. self.num_sets() {
                symbol += parity[(set, t)] * mul;
                mul *= p;
            }
            encoded.push(symbol);
        }
        Ok((encoded, resolved))
    }

    /// Allocates the working matrices.
    fn allocate(&mut self) {
        let k = self.num_inputs();
        let n = self.encoder.num_outputs();
        let sets = self.num_sets();
        self.rp.resize(self.tau, k, 0.0);
        self.ri.resize(self.tau, k, 0.0);
        self.rai.resize(self.tau, k, 0.0);
        self.rii.resize(self.tau, k, 0.0);
        self.rei.resize(self.tau, k, 0.0);
        self.r_set = (0 .. sets).map(|_| Matrix::new(self.tau, k, 0.0)).collect();
        self.r_enc = (0 .. sets).map(|_| Matrix::new(self.tau, n, 0.0)).collect();
        let ra_count = if self.parallel { sets } else { 1 };
        self.ra = (0 .. ra_count).map(|_| Matrix::new(self.tau, k, 1.0)).collect();
        if self.circular {
            let m = self.encoder.num_states();
            self.ss = vec![vec![0.0; m]; sets];
            self.se = vec![vec![0.0; m]; sets];
        }
    }

    /// Resets the start- and end-state distributions for a fresh frame.
    fn reset(&mut self) {
        if self.circular {
            #[allow(clippy::cast_precision_loss)]
            let uniform = 1.0 / self.encoder.num_states() as f64;
            for set in 0 .. self.num_sets() {
                self.ss[set].iter_mut().for_each(|x| *x = uniform);
                self.se[set].iter_mut().for_each(|x| *x = uniform);
            }
        } else if self.end_at_zero {
            self.bcjr.set_start(0);
            self.bcjr.set_end(0);
        } else {
            self.bcjr.set_start(0);
            self.bcjr.set_end_equiprobable();
        }
    }

    /// Folds symbol-level channel likelihoods into the decoder's priors.
    ///
    /// # Parameters
    ///
    /// - `ptable`: `ptable[(j, s)]` is the likelihood of modulation symbol
    ///   `s` at modulation position `j`. Each time step spans the data
    ///   symbols followed by each set's parity symbols, so `ptable` must
    ///   have `tau * (sk + num_sets * sp)` rows, where `sk` and `sp` are the
    ///   modulation symbols per data and parity symbol respectively.
    ///
    /// # Errors
    ///
    /// Returns an error if the data or parity alphabet is not an integral
    /// power of the modulation alphabet, or on a row-count mismatch.
    pub fn translate(&mut self, ptable: &Matrix<f64>) -> Result<(), Error> {
        let modulation = ptable.cols();
        if modulation < 2 {
            return Err(Error::InvalidConfig(
                "Modulation alphabet must have at least two symbols".to_string(),
            ));
        }
        let k = self.num_inputs();
        let p = self.num_parity();
        let sk = integer_log(k, modulation).ok_or_else(|| {
            Error::InvalidConfig(format!(
                "Encoder input alphabet ({k}) must be an integral power of the \
                modulation alphabet ({modulation})"
            ))
        })?;
        let sp = integer_log(p, modulation).ok_or_else(|| {
            Error::InvalidConfig(format!(
                "Encoder parity alphabet ({p}) must be an integral power of the \
                modulation alphabet ({modulation})"
            ))
        })?;
        let s = sk + self.num_sets() * sp;
        if ptable.rows() != self.tau * s {
            return Err(Error::ShapeMismatch(format!(
                "Demodulation table should have {} rows (found {})",
                self.tau * s,
                ptable.rows()
            )));
        }
        if !self.translated {
            self.allocate();
        }
        // per-set parity likelihoods
        let mut parity = vec![Matrix::new(self.tau, p, 1.0); self.num_sets()];
        for t in 0 .. self.tau {
            // data symbols [set 0 only]
            for x in 0 .. k {
                let mut value = 1.0;
                let mut digits = x;
                for j in 0 .. sk {
                    value *= ptable[(t * s + j, digits % modulation)];
                    digits /= modulation;
                }
                self.rp[(t, x)] = value;
            }
            // parity symbols [all sets]
            for x in 0 .. p {
                let mut offset = sk;
                for par in parity.iter_mut() {
                    let mut value = 1.0;
                    let mut digits = x;
                    for j in 0 .. sp {
                        value *= ptable[(t * s + offset + j, digits % modulation)];
                        digits /= modulation;
                    }
                    par[(t, x)] = value;
                    offset += sp;
                }
            }
        }
        // a-priori extrinsic probabilities start flat
        for ra in &mut self.ra {
            ra.fill(1.0);
        }
        // intrinsic source prior, interleaved per set
        normalize_rows_max(&mut self.rp);
        for set in 0 .. self.num_sets() {
            self.interleavers[set].transform_matrix(&self.rp, &mut self.r_set[set])?;
        }
        // intrinsic branch priors
        for set in 0 .. self.num_sets() {
            for t in 0 .. self.tau {
                for x in 0 .. self.encoder.num_outputs() {
                    self.r_enc[set][(t, x)] = self.r_set[set][(t, x % k)] * parity[set][(t, x / k)];
                }
            }
            normalize_rows_max(&mut self.r_enc[set]);
        }
        self.reset();
        self.translated = true;
        Ok(())
    }

    /// Complete BCJR decoding cycle for one set: interleave the extrinsic
    /// prior, decode, extract the new extrinsic information, de-interleave.
    fn bcjr_wrap(&mut self, set: usize, ra_index: usize) -> Result<(), Error> {
        // for a circular trellis, reuse the boundary distributions stored on
        // the previous turn
        if self.circular {
            self.bcjr.set_start_pdf(&self.ss[set])?;
            self.bcjr.set_end_pdf(&self.se[set])?;
        }
        self.interleavers[set].transform_matrix(&self.ra[ra_index], &mut self.rai)?;
        self.bcjr
            .fdecode(&self.r_enc[set], Some(&self.rai), &mut self.rii)?;
        work_extrinsic(&self.rai, &self.rii, &self.r_set[set], &mut self.rei);
        self.interleavers[set].inverse_matrix(&self.rii, &mut self.ri)?;
        self.interleavers[set].inverse_matrix(&self.rei, &mut self.ra[ra_index])?;
        if self.circular {
            self.ss[set] = self.bcjr.get_start();
            self.se[set] = self.bcjr.get_end();
        }
        Ok(())
    }

    /// One iteration of the serial schedule: each set consumes the extrinsic
    /// output of the previous one; the last set's posterior survives.
    fn decode_serial(&mut self) -> Result<(), Error> {
        for set in 0 .. self.num_sets() {
            self.bcjr_wrap(set, 0)?;
            normalize_rows_max(&mut self.ra[0]);
        }
        normalize_rows_max(&mut self.ri);
        Ok(())
    }

    /// One iteration of the parallel schedule: every set decodes with its
    /// own prior, then the posteriors are fused.
    fn decode_parallel(&mut self) -> Result<(), Error> {
        for set in 0 .. self.num_sets() {
            self.bcjr_wrap(set, set)?;
        }
        // fuse the extrinsic information of all sets
        self.ri.fill(1.0);
        for set in 0 .. self.num_sets() {
            for t in 0 .. self.tau {
                for x in 0 .. self.num_inputs() {
                    self.ri[(t, x)] *= self.ra[set][(t, x)];
                }
            }
        }
        // the next-stage prior for each set excludes its own contribution
        for set in 0 .. self.num_sets() {
            for t in 0 .. self.tau {
                for x in 0 .. self.num_inputs() {
                    let own = self.ra[set][(t, x)];
                    self.ra[set][(t, x)] = if own > 0.0 { self.ri[(t, x)] / own } else { 0.0 };
                }
            }
        }
        // fold the channel information back in
        for t in 0 .. self.tau {
            for x in 0 .. self.num_inputs() {
                self.ri[(t, x)] *= self.rp[(t, x)];
            }
        }
        for set in 0 .. self.num_sets() {
            normalize_rows_max(&mut self.ra[set]);
        }
        normalize_rows_max(&mut self.ri);
        Ok(())
    }

    /// Runs the configured number of decoding iterations and hard-decides
    /// the input posteriors.
    ///
    /// # Errors
    ///
    /// Returns an error if called before [`translate`](Self::translate), or
    /// on numeric underflow in an inner decoding pass.
    pub fn decode(&mut self) -> Result<Vec<usize>, Error> {
        if !self.translated {
            return Err(Error::InvalidConfig(
                "Channel information must be translated in before decoding".to_string(),
            ));
        }
        for _ in 0 .. self.iterations {
            if self.parallel {
                self.decode_parallel()?;
            } else {
                self.decode_serial()?;
            }
        }
        Ok(hard_decision(&self.ri))
    }

    /// Returns the input posteriors from the last decoding pass.
    #[must_use]
    pub fn posteriors(&self) -> &Matrix<f64> {
        &self.ri
    }
}

/// Computes extrinsic probabilities.
///
/// `re = ri / (ra * r)` elementwise; wherever the posterior is zero the
/// extrinsic output is defined to be zero.
fn work_extrinsic(ra: &Matrix<f64>, ri: &Matrix<f64>, r: &Matrix<f64>, re: &mut Matrix<f64>) {
    re.resize(ri.rows(), ri.cols(), 0.0);
    for t in 0 .. ri.rows() {
        for x in 0 .. ri.cols() {
            re[(t, x)] = if ri[(t, x)] > 0.0 {
                ri[(t, x)] / (ra[(t, x)] * r[(t, x)])
            } else {
                0.0
            };
        }
    }
}

/// Decides the most probable input symbol at each time step; ties break to
/// the lowest index.
fn hard_decision(ri: &Matrix<f64>) -> Vec<usize> {
    let mut decoded = Vec::with_capacity(ri.rows());
    for t in 0 .. ri.rows() {
        let mut best = 0;
        for i in 1 .. ri.cols() {
            if ri[(t, i)] > ri[(t, best)] {
                best = i;
            }
        }
        decoded.push(best);
    }
    decoded
}

/// Returns `e` such that `base^e == value`, if one exists.
fn integer_log(value: usize, base: usize) -> Option<usize> {
    let mut power = 1;
    for e in 0 .. usize::BITS as usize {
        if power == value {
            return Some(e);
        }
        power = power.checked_mul(base)?;
        if power > value {
            return None;
        }
    }
    None
}

#[cfg(test)]
mod tests_of_turbo {
    use super::*;
    use crate::fsm::ConvCode;
    use float_eq::assert_float_eq;

    /// Builds a bit-level demodulation table from encoded symbols, with the
    /// given likelihood for the transmitted bit value.
    fn bit_ptable(encoded: &[usize], bits_per_symbol: usize, confidence: f64) -> Matrix<f64> {
        let mut ptable = Matrix::new(encoded.len() * bits_per_symbol, 2, 0.0);
        for (t, &symbol) in encoded.iter().enumerate() {
            for j in 0 .. bits_per_symbol {
                let bit = (symbol >> j) & 1;
                ptable[(t * bits_per_symbol + j, bit)] = confidence;
                ptable[(t * bits_per_symbol + j, 1 - bit)] = 1.0 - confidence;
            }
        }
        ptable
    }

    fn two_set_codec(
        tau: usize,
        iterations: usize,
        end_at_zero: bool,
        parallel: bool,
        circular: bool,
    ) -> Turbo<f64> {
        let encoder = Box::new(ConvCode::new(&[0o7, 0o5]).unwrap());
        // a terminated code needs the second set's interleaver to preserve
        // termination, so it only permutes within feedback-period residues
        let second = if end_at_zero {
            Interleaver::new(&crate::interleaver::seeded_residue_permutation(tau, 3, 1)).unwrap()
        } else {
            Interleaver::random(tau).unwrap()
        };
        let interleavers = vec![Interleaver::identity(tau).unwrap(), second];
        let mut codec = Turbo::new(
            encoder,
            tau,
            interleavers,
            iterations,
            end_at_zero,
            parallel,
            circular,
        )
        .unwrap();
        codec.seed(1);
        codec
    }

    #[test]
    fn test_new_rejects_bad_configuration() {
        let tau = 8;
        let encoder = || Box::new(ConvCode::new(&[0o7, 0o5]).unwrap());
        let identity = || vec![Interleaver::identity(tau).unwrap()];
        // no interleavers
        assert!(Turbo::<f64>::new(encoder(), tau, Vec::new(), 4, true, false, false).is_err());
        // no iterations
        assert!(Turbo::<f64>::new(encoder(), tau, identity(), 0, true, false, false).is_err());
        // terminated and circular at once
        assert!(Turbo::<f64>::new(encoder(), tau, identity(), 4, true, false, true).is_err());
        // interleaver length mismatch
        let short = vec![Interleaver::identity(4).unwrap()];
        assert!(Turbo::<f64>::new(encoder(), tau, short, 4, true, false, false).is_err());
        // valid
        assert!(Turbo::<f64>::new(encoder(), tau, identity(), 4, true, false, false).is_ok());
    }

    #[test]
    fn test_encode_geometry() {
        let mut codec = two_set_codec(12, 4, true, false, false);
        assert_eq!(codec.info_length(), 10);
        assert_eq!(codec.num_parity(), 2);
        assert_eq!(codec.num_encoded(), 8);
        let source = [1, 0, 1, 1, 0, 0, 1, 0, 1, 1];
        let (encoded, resolved) = codec.encode(&source).unwrap();
        assert_eq!(encoded.len(), 12);
        assert_eq!(resolved.len(), 12);
        assert_eq!(&resolved[.. 10], &source);
        // the data part of each encoded symbol is the resolved input
        for t in 0 .. 12 {
            assert_eq!(encoded[t] % 2, resolved[t]);
            assert!(encoded[t] < 8);
        }
        // wrong source length
        assert!(codec.encode(&source[.. 9]).is_err());
    }

    #[test]
    fn test_decode_requires_translate() {
        let mut codec = two_set_codec(8, 2, true, false, false);
        assert!(codec.decode().is_err());
    }

    #[test]
    fn test_noise_free_serial_decode() {
        let mut codec = two_set_codec(12, 4, true, false, false);
        let source = [1, 0, 1, 1, 0, 0, 1, 0, 1, 1];
        let (encoded, resolved) = codec.encode(&source).unwrap();
        let ptable = bit_ptable(&encoded, 3, 1.0);
        codec.translate(&ptable).unwrap();
        let decoded = codec.decode().unwrap();
        assert_eq!(decoded, resolved);
    }

    #[test]
    fn test_noise_free_parallel_decode() {
        let mut codec = two_set_codec(12, 4, true, true, false);
        let source = [0, 1, 1, 0, 1, 0, 0, 1, 1, 0];
        let (encoded, resolved) = codec.encode(&source).unwrap();
        let ptable = bit_ptable(&encoded, 3, 1.0);
        codec.translate(&ptable).unwrap();
        let decoded = codec.decode().unwrap();
        assert_eq!(decoded, resolved);
    }

    #[test]
    fn test_serial_decode_corrects_systematic_flips() {
        let tau = 64;
        let mut codec = two_set_codec(tau, 8, true, false, false);
        let source: Vec<usize> = (0 .. codec.info_length()).map(|i| (i * 7 + 1) % 2).collect();
        let (encoded, resolved) = codec.encode(&source).unwrap();
        let mut ptable = bit_ptable(&encoded, 3, 0.9);
        // flip the observed systematic bit at scattered positions
        for &t in &[5, 29, 53] {
            let bit = encoded[t] & 1;
            ptable[(t * 3, bit)] = 0.1;
            ptable[(t * 3, 1 - bit)] = 0.9;
        }
        codec.translate(&ptable).unwrap();
        let decoded = codec.decode().unwrap();
        assert_eq!(decoded, resolved);
    }

    #[test]
    fn test_circular_decode_converges_quickly() {
        // tau = 8 is coprime with the zero-input period of the feedback
        // register, so a circulation state exists
        let mut codec = two_set_codec(8, 2, false, false, true);
        let source = [1, 0, 1, 1, 0, 0, 1, 0];
        let (encoded, resolved) = codec.encode(&source).unwrap();
        assert_eq!(resolved, source);
        let ptable = bit_ptable(&encoded, 3, 1.0);
        codec.translate(&ptable).unwrap();
        let decoded = codec.decode().unwrap();
        assert_eq!(decoded, resolved);
    }

    #[test]
    fn test_translate_rejects_bad_shapes() {
        let mut codec = two_set_codec(8, 2, true, false, false);
        // wrong row count
        let ptable = Matrix::new(8, 2, 0.5);
        assert!(matches!(
            codec.translate(&ptable),
            Err(Error::ShapeMismatch(_))
        ));
        // degenerate modulation alphabet
        let ptable = Matrix::new(24, 1, 1.0);
        assert!(codec.translate(&ptable).is_err());
    }

    #[test]
    fn test_posteriors_are_normalised() {
        let mut codec = two_set_codec(16, 4, true, false, false);
        let source: Vec<usize> = (0 .. codec.info_length()).map(|i| i % 2).collect();
        let (encoded, _) = codec.encode(&source).unwrap();
        let ptable = bit_ptable(&encoded, 3, 0.8);
        codec.translate(&ptable).unwrap();
        codec.decode().unwrap();
        let ri = codec.posteriors();
        for t in 0 .. 16 {
            let max = ri.row(t).iter().fold(0.0f64, |acc, &x| acc.max(x));
            assert_float_eq!(max, 1.0, abs <= 1e-12);
        }
    }
}
