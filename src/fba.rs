//! Forward-backward decoder over a (time, drift) lattice for channels with
//! synchronisation drift
//!
//! The channel may insert, delete and substitute symbols, so the decoder
//! marginalises over all alignments of the transmitted frame against the
//! received one. State is the cumulative drift at each codeword boundary;
//! the per-codeword branch metric is delegated to a receiver implementing
//! [`LatticeReceiver`].

use crate::bcjr::normalize_rows_sum;
use crate::ids::MetricComputer;
use crate::matrix::Matrix;
use crate::real::Real;
use crate::Error;

/// Branch-metric storage policy
#[derive(Clone, Eq, PartialEq, Debug, Copy)]
pub enum GammaStorage {
    /// Precompute the full `(time, drift, symbol, delta)` table; the forward
    /// and backward passes can then run independently and in either order
    Global,
    /// Keep a single time slice, recomputed on demand inside each pass;
    /// halves memory at the cost of recomputation
    Local,
}

/// Per-codeword branch metric supplier for the lattice decoder
pub trait LatticeReceiver {
    /// Returns the codeword length in channel symbols.
    fn codeword_len(&self) -> usize;

    /// Returns the message alphabet size.
    fn num_symbols(&self) -> usize;

    /// Computes the probability that transmitting data symbol `d` at
    /// codeword index `i` produced the received segment `rx`, for every
    /// codeword-level drift change in `[delta_min, delta_max]`.
    ///
    /// `rx` starts at the entering-drift position and holds the longest
    /// segment any drift change can consume (possibly truncated at the end
    /// of the frame, in which case the unreachable entries of `out` must be
    /// zero).
    fn metric(
        &self,
        d: usize,
        i: usize,
        rx: &[usize],
        delta_min: isize,
        delta_max: isize,
        out: &mut [f64],
    );
}

/// Receiver mapping each data symbol to a fixed codeword
///
/// The codebook holds one `n`-symbol codeword per message symbol; reception
/// probabilities come from the channel's [`MetricComputer`].
#[derive(Clone, Debug)]
pub struct CodebookReceiver {
    /// Codeword table, one row per message symbol
    codebook: Matrix<usize>,
    /// Channel metric computer
    computer: MetricComputer,
}

impl CodebookReceiver {
    /// Returns a receiver for the given codebook and channel metric
    /// computer.
    ///
    /// # Errors
    ///
    /// Returns an error if the codebook is empty.
    pub fn new(codebook: Matrix<usize>, computer: MetricComputer) -> Result<Self, Error> {
        if codebook.rows() == 0 || codebook.cols() == 0 {
            return Err(Error::InvalidConfig(
                "Codebook must have at least one symbol and one codeword position".to_string(),
            ));
        }
        Ok(Self { codebook, computer })
    }
}

impl LatticeReceiver for CodebookReceiver {
    fn codeword_len(&self) -> usize {
        self.codebook.cols()
    }

    fn num_symbols(&self) -> usize {
        self.codebook.rows()
    }

    fn metric(
        &self,
        d: usize,
        _i: usize,
        rx: &[usize],
        delta_min: isize,
        delta_max: isize,
        out: &mut [f64],
    ) {
        self.computer
            .receive_pdf(self.codebook.row(d), rx, delta_min, delta_max, out);
    }
}

/// Forward-backward lattice decoder
///
/// Indexing convention for the received frame: element `0` corresponds to
/// the earliest position drift `drift_min` can reach, so the frame must be
/// padded to `n_blocks * n + drift_max - drift_min` symbols and the prior
/// drift pdfs are indexed over `[drift_min, drift_max]`.
#[derive(Clone, Debug)]
pub struct Fba<R: Real, C: LatticeReceiver> {
    /// Branch metric supplier
    receiver: C,
    /// Number of codewords per frame
    n_blocks: usize,
    /// Codeword length in channel symbols
    n: usize,
    /// Message alphabet size
    q: usize,
    /// Most negative drift at any codeword boundary
    drift_min: isize,
    /// Most positive drift at any codeword boundary
    drift_max: isize,
    /// Most negative drift change over one codeword
    delta_min: isize,
    /// Most positive drift change over one codeword
    delta_max: isize,
    /// Branch-metric storage policy
    storage: GammaStorage,
    /// Whether to scale metric rows by their maximum after each step
    normalize: bool,
    /// Forward metrics, `(n_blocks + 1) x width`
    alpha: Matrix<R>,
    /// Backward metrics, `(n_blocks + 1) x width`
    beta: Matrix<R>,
    /// Branch metrics, flat; one slice per time index when global, a single
    /// slice when local
    gamma: Vec<R>,
    /// Scratch buffer for receiver metrics over delta
    metric_out: Vec<f64>,
    /// Whether the working arrays have been allocated
    initialised: bool,
}

impl<R: Real, C: LatticeReceiver> Fba<R, C> {
    /// Returns a decoder for the given receiver, frame geometry and drift
    /// corridor. Working arrays are allocated lazily on the first decode.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame geometry is degenerate, the drift
    /// intervals do not contain zero, or the receiver disagrees with the
    /// declared geometry.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        receiver: C,
        n_blocks: usize,
        n: usize,
        q: usize,
        drift_min: isize,
        drift_max: isize,
        delta_min: isize,
        delta_max: isize,
        storage: GammaStorage,
        normalize: bool,
    ) -> Result<Self, Error> {
        if n_blocks == 0 || n == 0 {
            return Err(Error::InvalidConfig(
                "Frame must contain at least one codeword of at least one symbol".to_string(),
            ));
        }
        if q < 2 {
            return Err(Error::InvalidConfig(format!(
                "Message alphabet must have at least two symbols (found {q})"
            )));
        }
        if drift_min > 0 || drift_max < 0 {
            return Err(Error::InvalidConfig(format!(
                "Drift interval [{drift_min}, {drift_max}] must contain zero"
            )));
        }
        if delta_min > 0 || delta_max < 0 {
            return Err(Error::InvalidConfig(format!(
                "Per-codeword drift interval [{delta_min}, {delta_max}] must contain zero"
            )));
        }
        if receiver.codeword_len() != n || receiver.num_symbols() != q {
            return Err(Error::InvalidConfig(format!(
                "Receiver geometry ({} symbols of {} positions) disagrees with the \
                declared geometry ({q} symbols of {n} positions)",
                receiver.num_symbols(),
                receiver.codeword_len(),
            )));
        }
        Ok(Self {
            receiver,
            n_blocks,
            n,
            q,
            drift_min,
            drift_max,
            delta_min,
            delta_max,
            storage,
            normalize,
            alpha: Matrix::new(0, 0, R::zero()),
            beta: Matrix::new(0, 0, R::zero()),
            gamma: Vec::new(),
            metric_out: Vec::new(),
            initialised: false,
        })
    }

    /// Returns the drift corridor width.
    fn width(&self) -> usize {
        (self.drift_max - self.drift_min + 1).unsigned_abs()
    }

    /// Returns the per-codeword drift-change width.
    fn dwidth(&self) -> usize {
        (self.delta_max - self.delta_min + 1).unsigned_abs()
    }

    /// Returns the number of branch metric entries in one time slice.
    fn slice_size(&self) -> usize {
        self.width() * self.q * self.dwidth()
    }

    /// Returns the expected padded received-frame length.
    #[must_use]
    pub fn frame_length(&self) -> usize {
        self.n_blocks * self.n + (self.drift_max - self.drift_min).unsigned_abs()
    }

    /// Allocates the working arrays if not already allocated.
    fn ensure_allocated(&mut self) {
        if self.initialised {
            return;
        }
        let width = self.width();
        self.alpha.resize(self.n_blocks + 1, width, R::zero());
        self.beta.resize(self.n_blocks + 1, width, R::zero());
        let slices = match self.storage {
            GammaStorage::Global => self.n_blocks,
            GammaStorage::Local => 1,
        };
        self.gamma.clear();
        self.gamma.resize(slices * self.slice_size(), R::zero());
        self.metric_out.clear();
        self.metric_out.resize(self.dwidth(), 0.0);
        self.initialised = true;
    }

    /// Fills the branch-metric slice for time `i`.
    fn work_gamma(&mut self, i: usize, r: &[usize], app: Option<&Matrix<f64>>) {
        let width = self.width();
        let dwidth = self.dwidth();
        let q = self.q;
        let n = self.n;
        let (delta_min, delta_max) = (self.delta_min, self.delta_max);
        let offset = match self.storage {
            GammaStorage::Global => i * self.slice_size(),
            GammaStorage::Local => 0,
        };
        let Self {
            receiver,
            gamma,
            metric_out,
            ..
        } = self;
        let slice = &mut gamma[offset .. offset + width * q * dwidth];
        for x_idx in 0 .. width {
            // segment start in the padded frame for entering drift x; the
            // padding offset and the drift-index offset coincide
            let start = i * n + x_idx;
            let end = (start + n + delta_max.unsigned_abs()).min(r.len());
            let rx = &r[start .. end];
            for d in 0 .. q {
                receiver.metric(d, i, rx, delta_min, delta_max, metric_out);
                let app_factor = app.map_or(1.0, |app| app[(i, d)]);
                for (dx_idx, &value) in metric_out.iter().enumerate() {
                    slice[(x_idx * q + d) * dwidth + dx_idx] =
                        R::from_f64(value * app_factor);
                }
            }
        }
    }

    /// Returns the branch-metric slice for time `i` (must be current when
    /// the storage policy is local).
    fn gamma_slice(&self, i: usize) -> &[R] {
        let offset = match self.storage {
            GammaStorage::Global => i * self.slice_size(),
            GammaStorage::Local => 0,
        };
        &self.gamma[offset .. offset + self.slice_size()]
    }

    /// Forward step: fills `alpha[i]` from `alpha[i - 1]` and `gamma[i - 1]`.
    fn work_alpha(&mut self, i: usize) -> Result<(), Error> {
        let width = self.width();
        let dwidth = self.dwidth();
        let q = self.q;
        let (delta_min, delta_max) = (self.delta_min, self.delta_max);
        let offset = match self.storage {
            GammaStorage::Global => (i - 1) * self.slice_size(),
            GammaStorage::Local => 0,
        };
        let gamma = &self.gamma[offset .. offset + width * q * dwidth];
        self.alpha.row_mut(i).iter_mut().for_each(|x| *x = R::zero());
        #[allow(clippy::cast_possible_wrap)]
        let width_i = width as isize;
        for x1_idx in 0 .. width {
            let prev_alpha = self.alpha[(i - 1, x1_idx)];
            if prev_alpha.is_zero() {
                continue;
            }
            #[allow(clippy::cast_possible_wrap)]
            let x1 = x1_idx as isize;
            let x2min = (x1 + delta_min).max(0);
            let x2max = (x1 + delta_max).min(width_i - 1);
            for x2 in x2min ..= x2max {
                #[allow(clippy::cast_sign_loss)]
                let x2_idx = x2 as usize;
                #[allow(clippy::cast_sign_loss)]
                let dx_idx = (x2 - x1 - delta_min) as usize;
                let mut this_alpha = self.alpha[(i, x2_idx)];
                for d in 0 .. q {
                    this_alpha += prev_alpha * gamma[(x1_idx * q + d) * dwidth + dx_idx];
                }
                self.alpha[(i, x2_idx)] = this_alpha;
            }
        }
        if self.normalize {
            scale_row_by_max(self.alpha.row_mut(i)).map_err(|()| {
                Error::Underflow(format!("all-zero forward metrics at codeword {i}"))
            })?;
        }
        Ok(())
    }

    /// Backward step: fills `beta[i]` from `beta[i + 1]` and `gamma[i]`.
    fn work_beta(&mut self, i: usize) -> Result<(), Error> {
        let width = self.width();
        let dwidth = self.dwidth();
        let q = self.q;
        let (delta_min, delta_max) = (self.delta_min, self.delta_max);
        let offset = match self.storage {
            GammaStorage::Global => i * self.slice_size(),
            GammaStorage::Local => 0,
        };
        let gamma = &self.gamma[offset .. offset + width * q * dwidth];
        #[allow(clippy::cast_possible_wrap)]
        let width_i = width as isize;
        for x1_idx in 0 .. width {
            #[allow(clippy::cast_possible_wrap)]
            let x1 = x1_idx as isize;
            let x2min = (x1 + delta_min).max(0);
            let x2max = (x1 + delta_max).min(width_i - 1);
            let mut this_beta = R::zero();
            for x2 in x2min ..= x2max {
                #[allow(clippy::cast_sign_loss)]
                let x2_idx = x2 as usize;
                #[allow(clippy::cast_sign_loss)]
                let dx_idx = (x2 - x1 - delta_min) as usize;
                let next_beta = self.beta[(i + 1, x2_idx)];
                if next_beta.is_zero() {
                    continue;
                }
                for d in 0 .. q {
                    this_beta += next_beta * gamma[(x1_idx * q + d) * dwidth + dx_idx];
                }
            }
            self.beta[(i, x1_idx)] = this_beta;
        }
        if self.normalize {
            scale_row_by_max(self.beta.row_mut(i)).map_err(|()| {
                Error::Underflow(format!("all-zero backward metrics at codeword {i}"))
            })?;
        }
        Ok(())
    }

    /// Posterior message probabilities at codeword index `i`.
    fn work_message_app(&self, i: usize, ptable: &mut Matrix<f64>) {
        let width = self.width();
        let dwidth = self.dwidth();
        let q = self.q;
        let (delta_min, delta_max) = (self.delta_min, self.delta_max);
        let gamma = self.gamma_slice(i);
        #[allow(clippy::cast_possible_wrap)]
        let width_i = width as isize;
        for d in 0 .. q {
            let mut p = R::zero();
            for x1_idx in 0 .. width {
                let this_alpha = self.alpha[(i, x1_idx)];
                if this_alpha.is_zero() {
                    continue;
                }
                #[allow(clippy::cast_possible_wrap)]
                let x1 = x1_idx as isize;
                let x2min = (x1 + delta_min).max(0);
                let x2max = (x1 + delta_max).min(width_i - 1);
                for x2 in x2min ..= x2max {
                    #[allow(clippy::cast_sign_loss)]
                    let x2_idx = x2 as usize;
                    #[allow(clippy::cast_sign_loss)]
                    let dx_idx = (x2 - x1 - delta_min) as usize;
                    p += this_alpha
                        * self.beta[(i + 1, x2_idx)]
                        * gamma[(x1_idx * q + d) * dwidth + dx_idx];
                }
            }
            ptable[(i, d)] = p.to_f64();
        }
    }

    /// Posterior drift pdf at boundary `i` (normalised to unit sum).
    fn work_state_app(&self, i: usize) -> Result<Vec<f64>, Error> {
        let mut pdf: Vec<f64> = (0 .. self.width())
            .map(|x_idx| (self.alpha[(i, x_idx)] * self.beta[(i, x_idx)]).to_f64())
            .collect();
        let sum: f64 = pdf.iter().sum();
        if sum <= 0.0 {
            return Err(Error::Underflow(format!(
                "all-zero drift posterior at codeword boundary {i}"
            )));
        }
        pdf.iter_mut().for_each(|x| *x /= sum);
        Ok(pdf)
    }

    /// Checks decode input shapes.
    fn check_shapes(
        &self,
        r: &[usize],
        sof_prior: &[f64],
        eof_prior: &[f64],
        app: Option<&Matrix<f64>>,
    ) -> Result<(), Error> {
        if r.len() != self.frame_length() {
            return Err(Error::ShapeMismatch(format!(
                "Expected padded received frame of {} symbols (found {})",
                self.frame_length(),
                r.len()
            )));
        }
        if sof_prior.len() != self.width() || eof_prior.len() != self.width() {
            return Err(Error::ShapeMismatch(format!(
                "Expected drift priors of length {} (found {} and {})",
                self.width(),
                sof_prior.len(),
                eof_prior.len()
            )));
        }
        if let Some(app) = app {
            if app.rows() != self.n_blocks || app.cols() != self.q {
                return Err(Error::ShapeMismatch(format!(
                    "Expected a-priori matrix of shape {}x{} (found {}x{})",
                    self.n_blocks,
                    self.q,
                    app.rows(),
                    app.cols()
                )));
            }
        }
        Ok(())
    }

    /// Decodes one frame.
    ///
    /// # Parameters
    ///
    /// - `r`: Padded received frame (see the type docs for the indexing
    ///   convention).
    ///
    /// - `sof_prior` / `eof_prior`: Prior drift pdfs at the start and end of
    ///   the frame, indexed over `[drift_min, drift_max]`.
    ///
    /// - `app`: Optional per-codeword a-priori message probabilities.
    ///
    /// - `ptable`: Posterior message probabilities per codeword index
    ///   (result; resized as needed, rows normalised to unit sum).
    ///
    /// - `sof_post` / `eof_post`: Posterior drift pdfs at the frame
    ///   boundaries (results).
    ///
    /// # Errors
    ///
    /// Returns an error on shape mismatches or numeric underflow.
    #[allow(clippy::too_many_arguments)]
    pub fn decode(
        &mut self,
        r: &[usize],
        sof_prior: &[f64],
        eof_prior: &[f64],
        app: Option<&Matrix<f64>>,
        ptable: &mut Matrix<f64>,
        sof_post: &mut Vec<f64>,
        eof_post: &mut Vec<f64>,
    ) -> Result<(), Error> {
        self.check_shapes(r, sof_prior, eof_prior, app)?;
        self.ensure_allocated();
        // set the boundary drift distributions
        self.alpha.fill(R::zero());
        self.beta.fill(R::zero());
        for x_idx in 0 .. self.width() {
            self.alpha[(0, x_idx)] = R::from_f64(sof_prior[x_idx]);
            self.beta[(self.n_blocks, x_idx)] = R::from_f64(eof_prior[x_idx]);
        }
        if self.normalize {
            scale_row_by_max(self.alpha.row_mut(0))
                .map_err(|()| Error::Underflow("all-zero start-of-frame prior".to_string()))?;
            let n_blocks = self.n_blocks;
            scale_row_by_max(self.beta.row_mut(n_blocks))
                .map_err(|()| Error::Underflow("all-zero end-of-frame prior".to_string()))?;
        }
        ptable.resize(self.n_blocks, self.q, 0.0);
        match self.storage {
            GammaStorage::Global => {
                for i in 0 .. self.n_blocks {
                    self.work_gamma(i, r, app);
                }
                for i in 1 ..= self.n_blocks {
                    self.work_alpha(i)?;
                    self.work_beta(self.n_blocks - i)?;
                }
                for i in 0 .. self.n_blocks {
                    self.work_message_app(i, ptable);
                }
            }
            GammaStorage::Local => {
                // forward pass: gamma slices just-in-time
                for i in 1 ..= self.n_blocks {
                    self.work_gamma(i - 1, r, app);
                    self.work_alpha(i)?;
                }
                // backward pass: recompute each slice, fold results in as
                // soon as the matching beta row exists
                for i in (0 .. self.n_blocks).rev() {
                    self.work_gamma(i, r, app);
                    self.work_beta(i)?;
                    self.work_message_app(i, ptable);
                }
            }
        }
        normalize_rows_sum(ptable)?;
        *sof_post = self.work_state_app(0)?;
        *eof_post = self.work_state_app(self.n_blocks)?;
        Ok(())
    }

    /// Returns the posterior drift pdf at every codeword boundary of the
    /// last decoded frame (frame boundaries included), for seeding the next
    /// frame's start-of-frame prior in stream mode.
    ///
    /// # Errors
    ///
    /// Returns an error if called before a decode, or on numeric underflow.
    pub fn get_drift_pdf(&self) -> Result<Vec<Vec<f64>>, Error> {
        if !self.initialised {
            return Err(Error::InvalidConfig(
                "Drift pdf is only available after a decode".to_string(),
            ));
        }
        (0 ..= self.n_blocks).map(|i| self.work_state_app(i)).collect()
    }
}

/// Scales a metric row by its maximum; fails if the maximum is zero.
fn scale_row_by_max<R: Real>(row: &mut [R]) -> Result<(), ()> {
    let mut scale = row[0];
    for &x in row[1 ..].iter() {
        if x > scale {
            scale = x;
        }
    }
    if scale.is_zero() {
        return Err(());
    }
    let scale = scale.recip();
    row.iter_mut().for_each(|x| *x *= scale);
    Ok(())
}
