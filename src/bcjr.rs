//! MAP symbol-by-symbol trellis decoder (Bahl, Cocke, Jelinek, Raviv)

use crate::fsm::Fsm;
use crate::matrix::{Matrix, Matrix3};
use crate::real::Real;
use crate::trellis::Trellis;
use crate::Error;

/// MAP trellis decoder over an abstract finite-state encoder
///
/// Produces a-posteriori probabilities for the encoder's input and output
/// symbols via the forward/backward recursions. Internal state metrics are
/// held in the numeric backend `R`; all tables exchanged with the caller are
/// plain `f64` probability matrices indexed `(time, symbol)`.
///
/// The working matrices are allocated lazily on the first use after a shape
/// change, and the start/end state distributions must be set before
/// decoding. If the trellis is not defined as starting or ending at zero,
/// set the corresponding distribution as equiprobable.
#[derive(Clone, Debug)]
pub struct Bcjr<R: Real> {
    /// Transition tables for the encoder
    trellis: Trellis,
    /// Block length (including any tail)
    tau: usize,
    /// Forward state metrics, `(tau + 1) x M`
    alpha: Matrix<R>,
    /// Backward state metrics, `(tau + 1) x M`
    beta: Matrix<R>,
    /// Branch metrics, `tau x M x K`; time index is offset so that the
    /// metric for the transition into time `t` is held at `t - 1`
    gamma: Matrix3<R>,
    /// Whether the working matrices have been allocated
    initialised: bool,
}

impl<R: Real> Bcjr<R> {
    /// Returns a decoder for the given encoder and block length.
    ///
    /// The transition tables are built here so the encoder itself need not
    /// be kept; nothing else is allocated until the first decode.
    ///
    /// # Errors
    ///
    /// Returns an error if `tau` is zero or the encoder reports transitions
    /// outside its declared alphabets.
    pub fn new(encoder: &mut dyn Fsm, tau: usize) -> Result<Self, Error> {
        if tau == 0 {
            return Err(Error::InvalidConfig(
                "MAP decoder block size must be a positive integer".to_string(),
            ));
        }
        let trellis = Trellis::new(encoder)?;
        Ok(Self {
            trellis,
            tau,
            alpha: Matrix::new(0, 0, R::zero()),
            beta: Matrix::new(0, 0, R::zero()),
            gamma: Matrix3::new(0, 0, 0, R::zero()),
            initialised: false,
        })
    }

    /// Returns the block length.
    #[must_use]
    pub fn block_length(&self) -> usize {
        self.tau
    }

    /// Returns the number of input symbols per time step.
    #[must_use]
    pub fn num_inputs(&self) -> usize {
        self.trellis.num_inputs
    }

    /// Returns the number of output symbols per time step.
    #[must_use]
    pub fn num_outputs(&self) -> usize {
        self.trellis.num_outputs
    }

    /// Returns the number of encoder states.
    #[must_use]
    pub fn num_states(&self) -> usize {
        self.trellis.num_states
    }

    /// Allocates the working matrices if not already allocated.
    fn ensure_allocated(&mut self) {
        if self.initialised {
            return;
        }
        let m = self.trellis.num_states;
        let k = self.trellis.num_inputs;
        self.alpha.resize(self.tau + 1, m, R::zero());
        self.beta.resize(self.tau + 1, m, R::zero());
        self.gamma.resize(self.tau, m, k, R::zero());
        self.initialised = true;
    }

    /// Sets the start-state distribution as equiprobable.
    pub fn set_start_equiprobable(&mut self) {
        self.ensure_allocated();
        #[allow(clippy::cast_precision_loss)]
        let p = R::from_f64(1.0 / self.trellis.num_states as f64);
        self.alpha.row_mut(0).iter_mut().for_each(|x| *x = p);
    }

    /// Sets the start state as known.
    pub fn set_start(&mut self, state: usize) {
        debug_assert!(state < self.trellis.num_states);
        self.ensure_allocated();
        self.alpha.row_mut(0).iter_mut().for_each(|x| *x = R::zero());
        self.alpha[(0, state)] = R::one();
    }

    /// Sets the start-state distribution directly.
    ///
    /// # Errors
    ///
    /// Returns an error if `pdf` does not have one entry per state.
    pub fn set_start_pdf(&mut self, pdf: &[f64]) -> Result<(), Error> {
        self.check_state_pdf(pdf)?;
        self.ensure_allocated();
        for (m, &p) in pdf.iter().enumerate() {
            self.alpha[(0, m)] = R::from_f64(p);
        }
        Ok(())
    }

    /// Sets the end-state distribution as equiprobable.
    pub fn set_end_equiprobable(&mut self) {
        self.ensure_allocated();
        #[allow(clippy::cast_precision_loss)]
        let p = R::from_f64(1.0 / self.trellis.num_states as f64);
        let tau = self.tau;
        self.beta.row_mut(tau).iter_mut().for_each(|x| *x = p);
    }

    /// Sets the end state as known.
    pub fn set_end(&mut self, state: usize) {
        debug_assert!(state < self.trellis.num_states);
        self.ensure_allocated();
        let tau = self.tau;
        self.beta.row_mut(tau).iter_mut().for_each(|x| *x = R::zero());
        self.beta[(tau, state)] = R::one();
    }

    /// Sets the end-state distribution directly.
    ///
    /// # Errors
    ///
    /// Returns an error if `pdf` does not have one entry per state.
    pub fn set_end_pdf(&mut self, pdf: &[f64]) -> Result<(), Error> {
        self.check_state_pdf(pdf)?;
        self.ensure_allocated();
        let tau = self.tau;
        for (m, &p) in pdf.iter().enumerate() {
            self.beta[(tau, m)] = R::from_f64(p);
        }
        Ok(())
    }

    /// Returns the posterior distribution of the start state (valid after a
    /// decode).
    #[must_use]
    pub fn get_start(&self) -> Vec<f64> {
        debug_assert!(self.initialised);
        self.beta.row(0).iter().map(|x| x.to_f64()).collect()
    }

    /// Returns the posterior distribution of the end state (valid after a
    /// decode).
    #[must_use]
    pub fn get_end(&self) -> Vec<f64> {
        debug_assert!(self.initialised);
        self.alpha.row(self.tau).iter().map(|x| x.to_f64()).collect()
    }

    /// Decodes a block, producing posterior input and output probabilities.
    ///
    /// # Parameters
    ///
    /// - `r`: `r[(t, x)]` is the probability of receiving whatever we
    ///   received at time `t + 1`, having transmitted output symbol `x`.
    ///
    /// - `ri`: Posterior probability of each input symbol per time step
    ///   (result; resized as needed).
    ///
    /// - `ro`: Posterior probability of each output symbol per time step
    ///   (result; resized as needed).
    ///
    /// # Errors
    ///
    /// Returns an error if `r` has the wrong shape, if the start/end
    /// distributions were never set, or on numeric underflow (an impossible
    /// observation given the priors).
    pub fn decode(
        &mut self,
        r: &Matrix<f64>,
        ri: &mut Matrix<f64>,
        ro: &mut Matrix<f64>,
    ) -> Result<(), Error> {
        self.check_ready(r, None)?;
        self.work_gamma(r, None);
        self.work_alpha()?;
        self.work_beta()?;
        self.work_results(ri, Some(ro))
    }

    /// Decodes a block with per-time-step a-priori input probabilities
    /// multiplied into the branch metrics.
    ///
    /// # Errors
    ///
    /// As for [`decode`](Self::decode), plus a shape check on `app`.
    pub fn decode_with_app(
        &mut self,
        r: &Matrix<f64>,
        app: &Matrix<f64>,
        ri: &mut Matrix<f64>,
        ro: &mut Matrix<f64>,
    ) -> Result<(), Error> {
        self.check_ready(r, Some(app))?;
        self.work_gamma(r, Some(app));
        self.work_alpha()?;
        self.work_beta()?;
        self.work_results(ri, Some(ro))
    }

    /// Fast decode path returning only the input posteriors.
    ///
    /// # Errors
    ///
    /// As for [`decode`](Self::decode).
    pub fn fdecode(
        &mut self,
        r: &Matrix<f64>,
        app: Option<&Matrix<f64>>,
        ri: &mut Matrix<f64>,
    ) -> Result<(), Error> {
        self.check_ready(r, app)?;
        self.work_gamma(r, app);
        self.work_alpha()?;
        self.work_beta()?;
        self.work_results(ri, None)
    }

    /// Checks input shapes and decoder readiness.
    fn check_ready(&self, r: &Matrix<f64>, app: Option<&Matrix<f64>>) -> Result<(), Error> {
        if !self.initialised {
            return Err(Error::InvalidConfig(
                "Start/end state distributions must be set before decoding".to_string(),
            ));
        }
        if r.rows() != self.tau || r.cols() != self.trellis.num_outputs {
            return Err(Error::ShapeMismatch(format!(
                "Expected channel matrix of shape {}x{} (found {}x{})",
                self.tau,
                self.trellis.num_outputs,
                r.rows(),
                r.cols()
            )));
        }
        if let Some(app) = app {
            if app.rows() != self.tau || app.cols() != self.trellis.num_inputs {
                return Err(Error::ShapeMismatch(format!(
                    "Expected a-priori matrix of shape {}x{} (found {}x{})",
                    self.tau,
                    self.trellis.num_inputs,
                    app.rows(),
                    app.cols()
                )));
            }
        }
        Ok(())
    }

    /// Checks that a state pdf has one entry per state.
    fn check_state_pdf(&self, pdf: &[f64]) -> Result<(), Error> {
        if pdf.len() == self.trellis.num_states {
            Ok(())
        } else {
            Err(Error::ShapeMismatch(format!(
                "Expected state distribution of length {} (found {})",
                self.trellis.num_states,
                pdf.len()
            )))
        }
    }

    /// Computes the branch metric tensor from the channel matrix and the
    /// optional a-priori input probabilities.
    fn work_gamma(&mut self, r: &Matrix<f64>, app: Option<&Matrix<f64>>) {
        for t in 1 ..= self.tau {
            for mdash in 0 .. self.trellis.num_states {
                for i in 0 .. self.trellis.num_inputs {
                    let x = self.trellis.output(mdash, i);
                    let mut value = r[(t - 1, x)];
                    if let Some(app) = app {
                        value *= app[(t - 1, i)];
                    }
                    self.gamma[(t - 1, mdash, i)] = R::from_f64(value);
                }
            }
        }
    }

    /// Computes the forward state metrics; each row is scaled by its maximum
    /// to hold the dynamic range.
    fn work_alpha(&mut self) -> Result<(), Error> {
        for t in 1 ..= self.tau {
            for m in 0 .. self.trellis.num_states {
                self.alpha[(t, m)] = R::zero();
            }
            // tail conditions are handled by zeros in the gamma matrix
            for mdash in 0 .. self.trellis.num_states {
                for i in 0 .. self.trellis.num_inputs {
                    let m = self.trellis.next_state(mdash, i);
                    let delta = self.alpha[(t - 1, mdash)] * self.gamma[(t - 1, mdash, i)];
                    self.alpha[(t, m)] += delta;
                }
            }
            scale_row_by_max(self.alpha.row_mut(t))
                .map_err(|()| Error::Underflow(format!("all-zero forward metrics at time {t}")))?;
        }
        Ok(())
    }

    /// Computes the backward state metrics; each row is scaled by its
    /// maximum to hold the dynamic range.
    fn work_beta(&mut self) -> Result<(), Error> {
        for t in (0 .. self.tau).rev() {
            for m in 0 .. self.trellis.num_states {
                let mut value = R::zero();
                for i in 0 .. self.trellis.num_inputs {
                    let mdash = self.trellis.next_state(m, i);
                    value += self.beta[(t + 1, mdash)] * self.gamma[(t, m, i)];
                }
                self.beta[(t, m)] = value;
            }
            scale_row_by_max(self.beta.row_mut(t))
                .map_err(|()| Error::Underflow(format!("all-zero backward metrics at time {t}")))?;
        }
        Ok(())
    }

    /// Computes the posterior input (and optionally output) probabilities.
    ///
    /// The per-row scale factors introduced while working alpha and beta do
    /// not cancel against the received-sequence probability uniformly across
    /// time steps, so each posterior row is normalised to unit sum here.
    fn work_results(
        &mut self,
        ri: &mut Matrix<f64>,
        ro: Option<&mut Matrix<f64>>,
    ) -> Result<(), Error> {
        // probability of the received sequence
        let mut py = R::zero();
        for mdash in 0 .. self.trellis.num_states {
            py += self.alpha[(self.tau, mdash)] * self.beta[(self.tau, mdash)];
        }
        if py.is_zero() {
            return Err(Error::Underflow(
                "received sequence has zero probability under the given priors".to_string(),
            ));
        }
        let py_recip = py.recip();
        ri.resize(self.tau, self.trellis.num_inputs, 0.0);
        let mut ro = ro;
        if let Some(ro) = ro.as_deref_mut() {
            ro.resize(self.tau, self.trellis.num_outputs, 0.0);
        }
        for t in 1 ..= self.tau {
            for mdash in 0 .. self.trellis.num_states {
                for i in 0 .. self.trellis.num_inputs {
                    let m = self.trellis.next_state(mdash, i);
                    let sigma = self.alpha[(t - 1, mdash)]
                        * self.gamma[(t - 1, mdash, i)]
                        * self.beta[(t, m)];
                    let delta = (sigma * py_recip).to_f64();
                    ri[(t - 1, i)] += delta;
                    if let Some(ro) = ro.as_deref_mut() {
                        ro[(t - 1, self.trellis.output(mdash, i))] += delta;
                    }
                }
            }
        }
        normalize_rows_sum(ri)?;
        if let Some(ro) = ro {
            normalize_rows_sum(ro)?;
        }
        Ok(())
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

/// Normalises each row of a probability matrix by its maximum entry,
/// skipping all-zero rows.
pub fn normalize_rows_max(r: &mut Matrix<f64>) {
    for t in 0 .. r.rows() {
        let row = r.row_mut(t);
        let scale = row.iter().fold(0.0f64, |acc, &x| acc.max(x));
        if scale > 0.0 {
            row.iter_mut().for_each(|x| *x /= scale);
        }
    }
}

/// Normalises each row of a probability matrix to unit sum.
///
/// # Errors
///
/// Returns an underflow error for an all-zero row.
pub fn normalize_rows_sum(r: &mut Matrix<f64>) -> Result<(), Error> {
    for t in 0 .. r.rows() {
        let row = r.row_mut(t);
        let sum: f64 = row.iter().sum();
        if sum <= 0.0 {
            return Err(Error::Underflow(format!(
                "all-zero probability row at time {t}"
            )));
        }
        row.iter_mut().for_each(|x| *x /= sum);
    }
    Ok(())
}

#[cfg(test)]
mod tests_of_bcjr {
    use super::*;
    use crate::fsm::ConvCode;
    use crate::LogReal;
    use float_eq::assert_float_eq;

    /// Encodes from the zero state, tail included, returning output symbols.
    fn encode_with_tail(code: &mut ConvCode, info: &[usize]) -> Vec<usize> {
        code.reset(0);
        let mut out: Vec<usize> = info.iter().map(|&b| code.step(Some(b))).collect();
        for _ in 0 .. code.mem_order() {
            out.push(code.step(None));
        }
        assert_eq!(code.state(), 0);
        out
    }

    /// Builds a clean channel matrix observing exactly the given symbols.
    fn clean_channel_matrix(symbols: &[usize], num_outputs: usize) -> Matrix<f64> {
        let mut r = Matrix::new(symbols.len(), num_outputs, 0.0);
        for (t, &x) in symbols.iter().enumerate() {
            r[(t, x)] = 1.0;
        }
        r
    }

    fn argmax_row(row: &[f64]) -> usize {
        let mut best = 0;
        for (i, &x) in row.iter().enumerate().skip(1) {
            if x > row[best] {
                best = i;
            }
        }
        best
    }

    #[test]
    fn test_new_rejects_zero_block_length() {
        let mut code = ConvCode::new(&[0o7, 0o5]).unwrap();
        assert!(Bcjr::<f64>::new(&mut code, 0).is_err());
    }

    #[test]
    fn test_decode_requires_start_and_end() {
        let mut code = ConvCode::new(&[0o7, 0o5]).unwrap();
        let mut bcjr = Bcjr::<f64>::new(&mut code, 4).unwrap();
        let r = Matrix::new(4, 4, 0.25);
        let mut ri = Matrix::new(0, 0, 0.0);
        let mut ro = Matrix::new(0, 0, 0.0);
        assert!(bcjr.decode(&r, &mut ri, &mut ro).is_err());
    }

    #[test]
    fn test_decode_rejects_bad_shapes() {
        let mut code = ConvCode::new(&[0o7, 0o5]).unwrap();
        let mut bcjr = Bcjr::<f64>::new(&mut code, 4).unwrap();
        bcjr.set_start(0);
        bcjr.set_end_equiprobable();
        let mut ri = Matrix::new(0, 0, 0.0);
        let mut ro = Matrix::new(0, 0, 0.0);
        let r = Matrix::new(3, 4, 0.25);
        assert!(matches!(
            bcjr.decode(&r, &mut ri, &mut ro),
            Err(Error::ShapeMismatch(_))
        ));
        let r = Matrix::new(4, 4, 0.25);
        let app = Matrix::new(4, 3, 0.5);
        assert!(matches!(
            bcjr.decode_with_app(&r, &app, &mut ri, &mut ro),
            Err(Error::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_noiseless_decode_recovers_information() {
        let info = [1, 0, 1, 1, 0, 0, 1, 0];
        let mut code = ConvCode::new(&[0o7, 0o5]).unwrap();
        let symbols = encode_with_tail(&mut code, &info);
        let tau = symbols.len();
        let r = clean_channel_matrix(&symbols, code.num_outputs());
        let mut bcjr = Bcjr::<f64>::new(&mut code, tau).unwrap();
        bcjr.set_start(0);
        bcjr.set_end(0);
        let mut ri = Matrix::new(0, 0, 0.0);
        let mut ro = Matrix::new(0, 0, 0.0);
        bcjr.decode(&r, &mut ri, &mut ro).unwrap();
        for (t, &bit) in info.iter().enumerate() {
            assert_eq!(argmax_row(ri.row(t)), bit, "mismatch at time {t}");
            assert_float_eq!(ri[(t, bit)], 1.0, abs <= 1e-9);
        }
        // output posteriors concentrate on the transmitted symbols
        for (t, &x) in symbols.iter().enumerate() {
            assert_eq!(argmax_row(ro.row(t)), x);
        }
    }

    #[test]
    fn test_posterior_rows_sum_to_one() {
        let mut code = ConvCode::new(&[0o13, 0o15]).unwrap();
        let tau = 12;
        let mut bcjr = Bcjr::<f64>::new(&mut code, tau).unwrap();
        bcjr.set_start_equiprobable();
        bcjr.set_end_equiprobable();
        // strictly positive, deliberately unnormalised channel matrix
        let mut r = Matrix::new(tau, code.num_outputs(), 0.0);
        for t in 0 .. tau {
            for x in 0 .. code.num_outputs() {
                r[(t, x)] = 0.05 + ((t * 7 + x * 3) % 11) as f64;
            }
        }
        let mut ri = Matrix::new(0, 0, 0.0);
        let mut ro = Matrix::new(0, 0, 0.0);
        bcjr.decode(&r, &mut ri, &mut ro).unwrap();
        for t in 0 .. tau {
            assert_float_eq!(ri.row(t).iter().sum::<f64>(), 1.0, abs <= 1e-12);
            assert_float_eq!(ro.row(t).iter().sum::<f64>(), 1.0, abs <= 1e-12);
        }
    }

    #[test]
    fn test_fdecode_matches_decode() {
        let info = [0, 1, 1, 0, 1, 0];
        let mut code = ConvCode::new(&[0o7, 0o5]).unwrap();
        let symbols = encode_with_tail(&mut code, &info);
        let tau = symbols.len();
        let r = clean_channel_matrix(&symbols, code.num_outputs());
        let mut bcjr = Bcjr::<f64>::new(&mut code, tau).unwrap();
        bcjr.set_start(0);
        bcjr.set_end(0);
        let mut ri_full = Matrix::new(0, 0, 0.0);
        let mut ro = Matrix::new(0, 0, 0.0);
        bcjr.decode(&r, &mut ri_full, &mut ro).unwrap();
        let mut ri_fast = Matrix::new(0, 0, 0.0);
        bcjr.fdecode(&r, None, &mut ri_fast).unwrap();
        for t in 0 .. tau {
            for i in 0 .. code.num_inputs() {
                assert_float_eq!(ri_fast[(t, i)], ri_full[(t, i)], abs <= 1e-12);
            }
        }
    }

    #[test]
    fn test_log_domain_backend_matches_plain() {
        let info = [1, 1, 0, 1, 0, 0, 0, 1];
        let mut code = ConvCode::new(&[0o13, 0o15]).unwrap();
        let symbols = encode_with_tail(&mut code, &info);
        let tau = symbols.len();
        // mildly noisy channel matrix
        let mut r = Matrix::new(tau, code.num_outputs(), 0.02);
        for (t, &x) in symbols.iter().enumerate() {
            r[(t, x)] = 0.9;
        }
        let mut ri_plain = Matrix::new(0, 0, 0.0);
        let mut ri_log = Matrix::new(0, 0, 0.0);
        let mut ro = Matrix::new(0, 0, 0.0);
        let mut plain = Bcjr::<f64>::new(&mut code, tau).unwrap();
        plain.set_start(0);
        plain.set_end(0);
        plain.decode(&r, &mut ri_plain, &mut ro).unwrap();
        let mut log = Bcjr::<LogReal>::new(&mut code, tau).unwrap();
        log.set_start(0);
        log.set_end(0);
        log.decode(&r, &mut ri_log, &mut ro).unwrap();
        for t in 0 .. tau {
            for i in 0 .. code.num_inputs() {
                assert_float_eq!(ri_log[(t, i)], ri_plain[(t, i)], abs <= 1e-6);
            }
        }
    }

    #[test]
    fn test_underflow_is_reported() {
        let mut code = ConvCode::new(&[0o7, 0o5]).unwrap();
        let mut bcjr = Bcjr::<f64>::new(&mut code, 4).unwrap();
        bcjr.set_start(0);
        bcjr.set_end(0);
        // an all-zero channel row makes the observation impossible
        let mut r = Matrix::new(4, 4, 0.25);
        for x in 0 .. 4 {
            r[(2, x)] = 0.0;
        }
        let mut ri = Matrix::new(0, 0, 0.0);
        let mut ro = Matrix::new(0, 0, 0.0);
        assert!(matches!(
            bcjr.decode(&r, &mut ri, &mut ro),
            Err(Error::Underflow(_))
        ));
    }

    #[test]
    fn test_get_start_and_end_posteriors() {
        let info = [1, 0, 0, 1];
        let mut code = ConvCode::new(&[0o7, 0o5]).unwrap();
        let symbols = encode_with_tail(&mut code, &info);
        let tau = symbols.len();
        let r = clean_channel_matrix(&symbols, code.num_outputs());
        let mut bcjr = Bcjr::<f64>::new(&mut code, tau).unwrap();
        bcjr.set_start_equiprobable();
        bcjr.set_end_equiprobable();
        let mut ri = Matrix::new(0, 0, 0.0);
        bcjr.fdecode(&r, None, &mut ri).unwrap();
        // the clean observation pins both boundary states to zero
        let start = bcjr.get_start();
        let end = bcjr.get_end();
        assert_eq!(argmax_row(&start), 0);
        assert_eq!(argmax_row(&end), 0);
    }
}
