//! # Monte Carlo drivers for the decoders
//!
//! [`turbo_bpsk_awgn_sim`] measures the BER-versus-SNR performance of a
//! turbo codec over a BPSK-AWGN channel; [`ids_fba_sim`] measures the
//! symbol error rate of the lattice decoder over an insertion/deletion/
//! substitution channel. The parameters and results of a run are captured
//! in the [`SimParams`]/[`SimResults`] and [`IdsSimParams`]/[`IdsSimResults`]
//! structs, and [`run_bpsk_awgn_sims`] runs a batch of scenarios and saves
//! the results to a JSON file.
//!
//! # Examples
//!
//! ```
//! use sisodec::sim::{self, DecoderBackend, SimParams};
//!
//! let params = SimParams {
//!     num_info_bits_per_block: 40,
//!     es_over_n0_db: -1.0,
//!     backend: DecoderBackend::Real(4),
//!     num_block_errors_min: 2,
//!     num_blocks_per_run: 10,
//!     num_runs_min: 1,
//!     num_runs_max: 2,
//!     seed: 1,
//! };
//! let results = sim::turbo_bpsk_awgn_sim(&params)?;
//! assert!(results.num_blocks > 0);
//! # Ok::<(), sisodec::Error>(())
//! ```

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};

use crate::fba::{CodebookReceiver, Fba, GammaStorage};
use crate::fsm::{ConvCode, Fsm};
use crate::ids::IdsChannel;
use crate::interleaver::{seeded_residue_permutation, Interleaver};
use crate::logreal::LogReal;
use crate::matrix::Matrix;
use crate::real::Real;
use crate::turbo::Turbo;
use crate::{utils, Error};

/// Constituent code polynomials used by the simulation codec
const CODE_POLYNOMIALS: [usize; 2] = [0o13, 0o15];
/// Bits per encoded symbol for the simulation codec (data + two parities)
const BITS_PER_SYMBOL: usize = 3;

/// Enumeration of decoder metric backends
#[derive(Clone, Eq, Hash, PartialEq, Debug, Copy, Deserialize, Serialize)]
pub enum DecoderBackend {
    /// Plain double-precision metrics, with given number of turbo iterations
    Real(u32),
    /// Log-domain metrics, with given number of turbo iterations
    LogDomain(u32),
}

impl DecoderBackend {
    /// Returns the name of the variant.
    fn name(self) -> &'static str {
        match self {
            DecoderBackend::Real(_) => "real",
            DecoderBackend::LogDomain(_) => "log-domain",
        }
    }

    /// Returns the number of turbo iterations held in the variant.
    fn num_iter(self) -> u32 {
        match self {
            DecoderBackend::Real(n) | DecoderBackend::LogDomain(n) => n,
        }
    }
}

impl std::fmt::Display for DecoderBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} metrics, {} turbo iterations", self.name(), self.num_iter())
    }
}

/// Parameters for turbo codec simulation over a BPSK-AWGN channel
#[derive(Clone, PartialEq, Debug, Copy, Deserialize, Serialize)]
pub struct SimParams {
    /// Number of information bits per block
    pub num_info_bits_per_block: u32,
    /// Ratio (dB) of symbol energy to noise power spectral density at BPSK-AWGN channel output
    pub es_over_n0_db: f64,
    /// Decoder backend to be used
    pub backend: DecoderBackend,
    /// Desired minimum number of block errors
    pub num_block_errors_min: u32,
    /// Number of blocks to be transmitted per run
    pub num_blocks_per_run: u32,
    /// Minimum number of runs of blocks to be simulated
    pub num_runs_min: u32,
    /// Maximum number of runs of blocks to be simulated
    pub num_runs_max: u32,
    /// Seed for the noise and interleaver random sources
    pub seed: u64,
}

impl SimParams {
    /// Checks validity of simulation parameters.
    fn check(&self) -> Result<(), Error> {
        if self.num_info_bits_per_block == 0 {
            return Err(Error::InvalidConfig(
                "Number of information bits per block cannot be zero".to_string(),
            ));
        }
        if self.backend.num_iter() == 0 {
            return Err(Error::InvalidConfig(
                "Number of turbo iterations cannot be zero".to_string(),
            ));
        }
        if self.num_blocks_per_run == 0 {
            return Err(Error::InvalidConfig(
                "Number of blocks per run cannot be zero".to_string(),
            ));
        }
        if self.num_runs_min > self.num_runs_max {
            return Err(Error::InvalidConfig(format!(
                "Minimum number of runs ({}) exceeds maximum number of runs ({})",
                self.num_runs_min, self.num_runs_max,
            )));
        }
        Ok(())
    }

    /// Prints simulation parameters.
    fn print(&self) {
        eprintln!();
        eprintln!("{:?} information bits per block", self.num_info_bits_per_block);
        eprintln!("Es/N0 of {} dB", self.es_over_n0_db);
        eprintln!("{}", self.backend);
        eprintln!("Minimum of {} block errors", self.num_block_errors_min);
        eprintln!(
            "{} blocks per run, {} to {} runs",
            self.num_blocks_per_run, self.num_runs_min, self.num_runs_max
        );
    }
}

/// Results from turbo codec simulation over a BPSK-AWGN channel
#[derive(Clone, PartialEq, Debug, Copy, Deserialize, Serialize)]
pub struct SimResults {
    /// Simulation parameters
    pub params: SimParams,
    /// Number of blocks transmitted
    pub num_blocks: u32,
    /// Number of information bits transmitted
    pub num_info_bits: u32,
    /// Number of block errors
    pub num_block_errors: u32,
    /// Number of information bit errors
    pub num_info_bit_errors: u32,
    /// Number of frames discarded after a decoder underflow
    pub num_frames_discarded: u32,
}

impl SimResults {
    /// Returns initialized simulation results.
    #[must_use]
    fn new(params: &SimParams) -> Self {
        Self {
            params: *params,
            num_blocks: 0,
            num_info_bits: 0,
            num_block_errors: 0,
            num_info_bit_errors: 0,
            num_frames_discarded: 0,
        }
    }

    /// Returns block error rate.
    #[must_use]
    pub fn block_error_rate(&self) -> f64 {
        if self.num_blocks > 0 {
            f64::from(self.num_block_errors) / f64::from(self.num_blocks)
        } else {
            0.0
        }
    }

    /// Returns information bit error rate.
    #[must_use]
    pub fn info_bit_error_rate(&self) -> f64 {
        if self.num_info_bits > 0 {
            f64::from(self.num_info_bit_errors) / f64::from(self.num_info_bits)
        } else {
            0.0
        }
    }

    /// Prints progress message.
    fn print_progress_message(&self) {
        if self.run_complete() {
            eprint!(
                "\r{:5} bits/block, Es/N0 = {:6.3} dB: \
                 BER = {:9.4e}, BLER = {:9.4e} ({}/{}, {}/{})",
                self.params.num_info_bits_per_block,
                self.params.es_over_n0_db,
                self.info_bit_error_rate(),
                self.block_error_rate(),
                self.num_info_bit_errors,
                self.num_info_bits,
                self.num_block_errors,
                self.num_blocks,
            );
            if self.sim_complete() {
                eprintln!();
            }
        }
    }

    /// Returns `true` iff a run of blocks is now complete.
    fn run_complete(&self) -> bool {
        self.num_blocks % self.params.num_blocks_per_run == 0
    }

    /// Returns `true` iff the simulation is now complete.
    fn sim_complete(&self) -> bool {
        self.run_complete()
            && self.num_blocks >= self.params.num_runs_min * self.params.num_blocks_per_run
            && (self.num_block_errors >= self.params.num_block_errors_min
                || self.num_blocks >= self.params.num_runs_max * self.params.num_blocks_per_run)
    }

    /// Updates simulation results after a block.
    fn update_after_block(&mut self, num_info_bit_errors_this_block: u32) {
        self.num_blocks += 1;
        self.num_info_bits += self.params.num_info_bits_per_block;
        if num_info_bit_errors_this_block > 0 {
            self.num_block_errors += 1;
            self.num_info_bit_errors += num_info_bit_errors_this_block;
        }
    }
}

/// Runs simulation of a two-set turbo codec over a BPSK-AWGN channel.
///
/// Frames whose decode reports numeric underflow are discarded (counted in
/// the results) and the frame is retried with fresh noise.
///
/// # Parameters
///
/// - `params`: Parameters for the simulation.
///
/// # Returns
///
/// - `results`: Results from the simulation.
///
/// # Errors
///
/// Returns an error if the parameters are invalid or the codec cannot be
/// constructed for them.
pub fn turbo_bpsk_awgn_sim(params: &SimParams) -> Result<SimResults, Error> {
    params.check()?;
    match params.backend {
        DecoderBackend::Real(_) => turbo_bpsk_awgn_sim_inner::<f64>(params),
        DecoderBackend::LogDomain(_) => turbo_bpsk_awgn_sim_inner::<LogReal>(params),
    }
}

/// Backend-generic body of [`turbo_bpsk_awgn_sim`].
fn turbo_bpsk_awgn_sim_inner<R: Real>(params: &SimParams) -> Result<SimResults, Error> {
    let mut codec: Turbo<R> = simulation_codec(params)?;
    let mut rng = StdRng::seed_from_u64(params.seed);
    let num_info_bits = params.num_info_bits_per_block as usize;
    let mut results = SimResults::new(params);
    while !results.sim_complete() {
        let info_bits = utils::random_symbols(2, num_info_bits, &mut rng);
        let (encoded, _) = codec.encode(&info_bits)?;
        let code_bits = utils::expand_bits(&encoded, BITS_PER_SYMBOL);
        let ptable = utils::bpsk_awgn_ptable(&code_bits, params.es_over_n0_db, &mut rng);
        codec.translate(&ptable)?;
        match codec.decode() {
            Ok(decoded) => {
                let errors = utils::error_count(&decoded[.. num_info_bits], &info_bits);
                #[allow(clippy::cast_possible_truncation)]
                results.update_after_block(errors as u32);
                results.print_progress_message();
            }
            Err(Error::Underflow(_)) => {
                results.num_frames_discarded += 1;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(results)
}

/// Builds the simulation codec: rate-1/3, two sets, serial schedule,
/// terminated at zero.
fn simulation_codec<R: Real>(params: &SimParams) -> Result<Turbo<R>, Error> {
    let encoder = Box::new(ConvCode::new(&CODE_POLYNOMIALS)?);
    let tau = params.num_info_bits_per_block as usize + encoder.mem_order();
    // the second set's interleaver preserves feedback-period residues, so
    // both sets stay terminated at the zero state
    let period = encoder.feedback_period().ok_or_else(|| {
        Error::InvalidConfig("Feedback register of the simulation code is not cyclic".to_string())
    })?;
    let interleavers = vec![
        Interleaver::identity(tau)?,
        Interleaver::new(&seeded_residue_permutation(tau, period, params.seed))?,
    ];
    Turbo::new(
        encoder,
        tau,
        interleavers,
        params.backend.num_iter() as usize,
        true,
        false,
        false,
    )
}

/// Parameters for lattice decoder simulation over an IDS channel
#[derive(Clone, PartialEq, Debug, Copy, Deserialize, Serialize)]
pub struct IdsSimParams {
    /// Number of codewords (here, bits) per frame
    pub num_codewords: u32,
    /// Channel parameter applied to the deletion and insertion probabilities
    pub channel_parameter: f64,
    /// Number of frames to be transmitted
    pub num_frames: u32,
    /// Seed for the channel random source
    pub seed: u64,
}

/// Results from lattice decoder simulation over an IDS channel
#[derive(Clone, PartialEq, Debug, Copy, Deserialize, Serialize)]
pub struct IdsSimResults {
    /// Simulation parameters
    pub params: IdsSimParams,
    /// Number of frames decoded
    pub num_frames: u32,
    /// Number of symbols decoded
    pub num_symbols: u32,
    /// Number of symbol errors
    pub num_symbol_errors: u32,
    /// Number of frames discarded (drift outside the corridor or underflow)
    pub num_frames_discarded: u32,
}

impl IdsSimResults {
    /// Returns symbol error rate.
    #[must_use]
    pub fn symbol_error_rate(&self) -> f64 {
        if self.num_symbols > 0 {
            f64::from(self.num_symbol_errors) / f64::from(self.num_symbols)
        } else {
            0.0
        }
    }
}

/// Runs simulation of the lattice decoder over a binary IDS channel with
/// known frame boundaries.
///
/// # Errors
///
/// Returns an error if the parameters are invalid.
pub fn ids_fba_sim(params: &IdsSimParams) -> Result<IdsSimResults, Error> {
    if params.num_codewords == 0 || params.num_frames == 0 {
        return Err(Error::InvalidConfig(
            "Frame count and frame length must be positive".to_string(),
        ));
    }
    let n_blocks = params.num_codewords as usize;
    let mut channel = IdsChannel::new(2, false, true, true)?;
    channel.seed(params.seed);
    channel.set_parameter(params.channel_parameter)?;
    #[allow(clippy::cast_possible_wrap)]
    let xmax = channel.compute_xmax(n_blocks) as isize;
    #[allow(clippy::cast_possible_wrap)]
    let delta_max = channel.compute_i(1).min(2) as isize;
    let mut codebook = Matrix::new(2, 1, 0);
    codebook[(1, 0)] = 1;
    let receiver = CodebookReceiver::new(codebook, channel.metric_computer(1))?;
    let mut fba: Fba<f64, CodebookReceiver> = Fba::new(
        receiver,
        n_blocks,
        1,
        2,
        -xmax,
        xmax,
        -1,
        delta_max,
        GammaStorage::Global,
        true,
    )?;
    let width = 2 * xmax.unsigned_abs() + 1;
    let mut sof_prior = vec![0.0; width];
    sof_prior[xmax.unsigned_abs()] = 1.0;
    let eof_prior = vec![1.0 / width as f64; width];
    let mut rng = StdRng::seed_from_u64(params.seed ^ 0x5eed);
    let mut results = IdsSimResults {
        params: *params,
        num_frames: 0,
        num_symbols: 0,
        num_symbol_errors: 0,
        num_frames_discarded: 0,
    };
    let mut ptable = Matrix::new(0, 0, 0.0);
    let mut sof_post = Vec::new();
    let mut eof_post = Vec::new();
    while results.num_frames < params.num_frames {
        let source = utils::random_symbols(2, n_blocks, &mut rng);
        let rx = channel.transmit(&source);
        #[allow(clippy::cast_possible_wrap)]
        let drift = rx.len() as isize - n_blocks as isize;
        if drift.abs() > xmax {
            results.num_frames_discarded += 1;
            continue;
        }
        // place the received sequence at the zero-drift offset and pad to
        // the decoder's frame length
        let mut padded = vec![0; xmax.unsigned_abs()];
        padded.extend_from_slice(&rx);
        padded.resize(fba.frame_length(), 0);
        match fba.decode(
            &padded,
            &sof_prior,
            &eof_prior,
            None,
            &mut ptable,
            &mut sof_post,
            &mut eof_post,
        ) {
            Ok(()) => {
                let decoded: Vec<usize> = (0 .. n_blocks)
                    .map(|i| usize::from(ptable[(i, 1)] > ptable[(i, 0)]))
                    .collect();
                #[allow(clippy::cast_possible_truncation)]
                {
                    results.num_symbol_errors +=
                        utils::error_count(&decoded, &source) as u32;
                    results.num_symbols += n_blocks as u32;
                }
                results.num_frames += 1;
            }
            Err(Error::Underflow(_)) => {
                results.num_frames_discarded += 1;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(results)
}

/// Runs simulations of the turbo codec over a BPSK-AWGN channel and saves
/// results to a JSON file.
///
/// # Parameters
///
/// - `all_params`: Parameters for each simulation scenario of interest.
///
/// - `json_filename`: Name of the JSON file to which all simulation results must be written.
///
/// # Errors
///
/// Returns an error if creating or writing to the JSON file fails.
pub fn run_bpsk_awgn_sims(all_params: &[SimParams], json_filename: &str) -> Result<(), Error> {
    let mut all_results = Vec::with_capacity(all_params.len());
    for params in all_params {
        params.print();
        if let Ok(results) = turbo_bpsk_awgn_sim(params) {
            all_results.push(results);
        } else {
            eprintln!("WARNING: Invalid simulation parameters");
        }
    }
    save_all_sim_results_to_file(&all_results, json_filename)?;
    Ok(())
}

/// Saves all simulation results to a JSON file.
///
/// # Errors
///
/// Returns an error if creating or writing to the JSON file fails.
pub fn save_all_sim_results_to_file(
    all_results: &[SimResults],
    json_filename: &str,
) -> Result<(), Error> {
    let writer = BufWriter::new(File::create(json_filename)?);
    serde_json::to_writer_pretty(writer, all_results)?;
    Ok(())
}

/// Returns all simulation results from a JSON file.
///
/// # Errors
///
/// Returns an error if opening or reading from the JSON file fails.
pub fn all_sim_results_from_file(json_filename: &str) -> Result<Vec<SimResults>, Error> {
    let reader = BufReader::new(File::open(json_filename)?);
    let all_results = serde_json::from_reader(reader)?;
    Ok(all_results)
}

#[cfg(test)]
mod tests_of_sim {
    use super::*;

    fn quick_params() -> SimParams {
        SimParams {
            num_info_bits_per_block: 40,
            es_over_n0_db: 3.0,
            backend: DecoderBackend::Real(4),
            num_block_errors_min: 1,
            num_blocks_per_run: 5,
            num_runs_min: 1,
            num_runs_max: 1,
            seed: 1,
        }
    }

    #[test]
    fn test_params_check() {
        assert!(quick_params().check().is_ok());
        let mut params = quick_params();
        params.num_blocks_per_run = 0;
        assert!(params.check().is_err());
        let mut params = quick_params();
        params.num_runs_min = 3;
        params.num_runs_max = 2;
        assert!(params.check().is_err());
        let mut params = quick_params();
        params.backend = DecoderBackend::LogDomain(0);
        assert!(params.check().is_err());
    }

    #[test]
    fn test_turbo_sim_at_high_snr_is_error_free() {
        let results = turbo_bpsk_awgn_sim(&quick_params()).unwrap();
        assert_eq!(results.num_blocks, 5);
        assert_eq!(results.num_info_bits, 200);
        // at 3 dB a rate-1/3 turbo code makes no errors over five blocks
        assert_eq!(results.num_info_bit_errors, 0);
    }

    #[test]
    fn test_turbo_sim_log_domain_backend() {
        let mut params = quick_params();
        params.backend = DecoderBackend::LogDomain(4);
        let results = turbo_bpsk_awgn_sim(&params).unwrap();
        assert_eq!(results.num_blocks, 5);
        assert_eq!(results.num_info_bit_errors, 0);
    }

    #[test]
    fn test_ids_sim_noiseless_is_error_free() {
        let params = IdsSimParams {
            num_codewords: 32,
            channel_parameter: 0.0,
            num_frames: 3,
            seed: 5,
        };
        let results = ids_fba_sim(&params).unwrap();
        assert_eq!(results.num_frames, 3);
        assert_eq!(results.num_symbol_errors, 0);
        assert_eq!(results.num_frames_discarded, 0);
    }

    #[test]
    fn test_ids_sim_with_noise_completes() {
        let params = IdsSimParams {
            num_codewords: 24,
            channel_parameter: 0.02,
            num_frames: 4,
            seed: 9,
        };
        let results = ids_fba_sim(&params).unwrap();
        assert_eq!(results.num_frames, 4);
        assert!(results.symbol_error_rate() < 0.5);
    }

    #[test]
    fn test_results_accounting() {
        let mut results = SimResults::new(&quick_params());
        results.update_after_block(0);
        results.update_after_block(3);
        assert_eq!(results.num_blocks, 2);
        assert_eq!(results.num_block_errors, 1);
        assert_eq!(results.num_info_bit_errors, 3);
        assert!((results.block_error_rate() - 0.5).abs() < 1e-12);
        assert!((results.info_bit_error_rate() - 3.0 / 80.0).abs() < 1e-12);
    }

    #[test]
    fn test_save_and_load_results() {
        let results = vec![SimResults::new(&quick_params())];
        let path = std::env::temp_dir().join("sisodec_sim_results_test.json");
        let path = path.to_str().unwrap();
        save_all_sim_results_to_file(&results, path).unwrap();
        let loaded = all_sim_results_from_file(path).unwrap();
        assert_eq!(loaded, results);
        std::fs::remove_file(path).unwrap();
    }
}
