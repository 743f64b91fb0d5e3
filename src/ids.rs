//! q-ary insertion/deletion/substitution channel and its receiver metric computer

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::Error;

/// Residual probability allowed outside the drift corridor
const RESIDUAL_PR: f64 = 1e-12;
/// Gaussian tail argument corresponding to [`RESIDUAL_PR`]
const RESIDUAL_SIGMA: f64 = 7.13;

/// Receiver coefficient tables and the per-segment reception lattice
///
/// Given a candidate transmitted codeword and a received segment, computes
/// the probability of that reception by summing over all insertion, deletion
/// and substitution event sequences. The channel parameters are folded into
/// a coefficient table so the inner lattice loop is a single lookup and
/// multiplication.
#[derive(Clone, PartialEq, Debug)]
pub struct MetricComputer {
    /// Symbol alphabet size
    q: usize,
    /// Limit on insertions between two time steps
    i_limit: usize,
    /// Maximum drift allowed inside the lattice corridor
    xmax: usize,
    /// Coefficient for a pure deletion (`mu = -1`)
    rval: f64,
    /// Coefficients for `mu >= 0` insertions followed by a match (row 0) or
    /// substitution (row 1)
    rtable: [Vec<f64>; 2],
}

impl MetricComputer {
    /// Returns a computer for the given alphabet and corridor limits, with
    /// all event probabilities zero until [`precompute`](Self::precompute).
    #[must_use]
    pub fn new(q: usize, i_limit: usize, xmax: usize) -> Self {
        Self {
            q,
            i_limit,
            xmax,
            rval: 0.0,
            rtable: [vec![0.0; i_limit + 1], vec![0.0; i_limit + 1]],
        }
    }

    /// Returns the corridor drift limit.
    #[must_use]
    pub fn xmax(&self) -> usize {
        self.xmax
    }

    /// Recomputes the coefficient tables for the given channel parameters.
    ///
    /// Must be called whenever a channel parameter changes.
    pub fn precompute(&mut self, ps: f64, pd: f64, pi: f64) {
        self.rval = pd;
        #[allow(clippy::cast_precision_loss)]
        let q = self.q as f64;
        let insert = pi / q;
        let keep = 1.0 - pi - pd;
        for mu in 0 ..= self.i_limit {
            #[allow(clippy::cast_possible_truncation)]
            let run = insert.powi(mu as i32) * keep;
            self.rtable[0][mu] = run * (1.0 - ps);
            self.rtable[1][mu] = run * (ps / q);
        }
    }

    /// Returns the probability of receiving segment `rx` given that codeword
    /// `tx` was transmitted.
    #[must_use]
    pub fn receive(&self, tx: &[usize], rx: &[usize]) -> f64 {
        #[allow(clippy::cast_possible_wrap)]
        let delta = rx.len() as isize - tx.len() as isize;
        if delta.unsigned_abs() > self.xmax {
            return 0.0;
        }
        let terminal = self.run_lattice(tx, rx);
        terminal[drift_to_index(delta, self.xmax)]
    }

    /// Computes the reception probability for every codeword-level drift
    /// `delta` in `[delta_min, delta_max]` in one lattice sweep.
    ///
    /// `rx` must hold the longest segment any `delta` can consume
    /// (`tx.len() + delta_max` symbols, or fewer at the end of a frame, in
    /// which case the unreachable entries of `out` are zero).
    pub fn receive_pdf(
        &self,
        tx: &[usize],
        rx: &[usize],
        delta_min: isize,
        delta_max: isize,
        out: &mut [f64],
    ) {
        debug_assert_eq!(out.len(), (delta_max - delta_min + 1).unsigned_abs());
        let terminal = self.run_lattice(tx, rx);
        #[allow(clippy::cast_possible_wrap)]
        let rho = rx.len() as isize;
        #[allow(clippy::cast_possible_wrap)]
        let n = tx.len() as isize;
        for (slot, delta) in (delta_min ..= delta_max).enumerate() {
            out[slot] = if delta.unsigned_abs() > self.xmax || n + delta > rho {
                0.0
            } else {
                terminal[drift_to_index(delta, self.xmax)]
            };
        }
    }

    /// Runs the forward reception lattice, returning the terminal row over
    /// all drifts in the corridor.
    ///
    /// Cell `(j, y)` holds the probability that the first `j` codeword
    /// symbols produced the first `j + y` received symbols. Three event
    /// types feed each cell: `mu >= 0` insertions followed by a match or
    /// substitution (consuming `mu + 1` received symbols), or a pure
    /// deletion (consuming none).
    fn run_lattice(&self, tx: &[usize], rx: &[usize]) -> Vec<f64> {
        #[allow(clippy::cast_possible_wrap)]
        let xmax = self.xmax as isize;
        #[allow(clippy::cast_possible_wrap)]
        let i_limit = self.i_limit as isize;
        #[allow(clippy::cast_possible_wrap)]
        let rho = rx.len() as isize;
        let width = 2 * self.xmax + 1;
        let mut f_prev = vec![0.0f64; width];
        let mut f_this = vec![0.0f64; width];
        // drift before the first codeword symbol is zero by definition
        f_this[self.xmax] = 1.0;
        for (j, &tx_sym) in tx.iter().enumerate() {
            #[allow(clippy::cast_possible_wrap)]
            let j = j as isize + 1;
            std::mem::swap(&mut f_prev, &mut f_this);
            f_this.iter_mut().for_each(|x| *x = 0.0);
            // the event must fit the received sequence, and the limits on
            // insertions and deletions must be respected:
            //   j + y >= 0, j + y <= rho, y - a in [-1, i_limit]
            let ymin = (-xmax).max(-j);
            let ymax = xmax.min(rho - j);
            for y in ymin ..= ymax {
                let mut result = 0.0;
                let amin = (-xmax).max(1 - j).max(y - i_limit);
                let amax = xmax.min(y + 1);
                let mut amax_act = amax;
                // the topmost predecessor may be a pure deletion
                if amax == y + 1 {
                    result += f_prev[drift_to_index(amax, self.xmax)] * self.rval;
                    amax_act -= 1;
                }
                // predecessors requiring comparison of tx and rx symbols;
                // the received subsequence for (a, y) ends at index j + y - 1
                for a in amin ..= amax_act {
                    #[allow(clippy::cast_sign_loss)]
                    let err = usize::from(tx_sym != rx[(j + y - 1) as usize]);
                    #[allow(clippy::cast_sign_loss)]
                    let mu = (y - a) as usize;
                    result += f_prev[drift_to_index(a, self.xmax)] * self.rtable[err][mu];
                }
                f_this[drift_to_index(y, self.xmax)] = result;
            }
        }
        f_this
    }
}

/// Maps a signed drift into the corridor array index.
fn drift_to_index(drift: isize, xmax: usize) -> usize {
    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    let idx = drift + xmax as isize;
    debug_assert!(idx >= 0);
    #[allow(clippy::cast_sign_loss)]
    {
        idx as usize
    }
}

/// q-ary insertion/deletion/substitution channel
///
/// Each transmitted symbol is preceded by a geometric run of uniformly
/// random inserted symbols (parameter `pi`), then either deleted
/// (probability `pd`) or passed through the substitution law. The `vary_*`
/// flags select which event probabilities track [`set_parameter`](Self::set_parameter).
#[derive(Clone, Debug)]
pub struct IdsChannel {
    /// Symbol alphabet size
    q: usize,
    /// Symbol substitution probability
    ps: f64,
    /// Symbol deletion probability
    pd: f64,
    /// Symbol insertion probability
    pi: f64,
    /// Flag: `ps` tracks the channel parameter
    vary_ps: bool,
    /// Flag: `pd` tracks the channel parameter
    vary_pd: bool,
    /// Flag: `pi` tracks the channel parameter
    vary_pi: bool,
    /// Cap on the insertion run-length limit (0 means no cap)
    i_cap: usize,
    /// Random source for channel events
    rng: StdRng,
}

impl IdsChannel {
    /// Returns a channel over a `q`-ary alphabet with all event
    /// probabilities zero; the flags select which probabilities
    /// [`set_parameter`](Self::set_parameter) applies to.
    ///
    /// # Errors
    ///
    /// Returns an error if `q < 2`.
    pub fn new(q: usize, vary_ps: bool, vary_pd: bool, vary_pi: bool) -> Result<Self, Error> {
        if q < 2 {
            return Err(Error::InvalidConfig(format!(
                "Channel alphabet must have at least two symbols (found {q})"
            )));
        }
        Ok(Self {
            q,
            ps: 0.0,
            pd: 0.0,
            pi: 0.0,
            vary_ps,
            vary_pd,
            vary_pi,
            i_cap: 0,
            rng: StdRng::from_os_rng(),
        })
    }

    /// Reseeds the channel's random source.
    pub fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Returns the symbol alphabet size.
    #[must_use]
    pub fn num_symbols(&self) -> usize {
        self.q
    }

    /// Returns the substitution probability.
    #[must_use]
    pub fn ps(&self) -> f64 {
        self.ps
    }

    /// Returns the deletion probability.
    #[must_use]
    pub fn pd(&self) -> f64 {
        self.pd
    }

    /// Returns the insertion probability.
    #[must_use]
    pub fn pi(&self) -> f64 {
        self.pi
    }

    /// Sets the symbol-substitution probability.
    ///
    /// # Errors
    ///
    /// Returns an error if `ps` is outside `[0, 0.5]`.
    pub fn set_ps(&mut self, ps: f64) -> Result<(), Error> {
        if !(0.0 ..= 0.5).contains(&ps) {
            return Err(Error::InvalidConfig(format!(
                "Substitution probability must be in [0, 0.5] (found {ps})"
            )));
        }
        self.ps = ps;
        Ok(())
    }

    /// Sets the symbol-deletion probability.
    ///
    /// # Errors
    ///
    /// Returns an error if `pd` is outside `[0, 1)` or `pi + pd >= 1`.
    pub fn set_pd(&mut self, pd: f64) -> Result<(), Error> {
        if !(0.0 .. 1.0).contains(&pd) || self.pi + pd >= 1.0 {
            return Err(Error::InvalidConfig(format!(
                "Deletion probability must be in [0, 1) with pi + pd < 1 (found {pd})"
            )));
        }
        self.pd = pd;
        Ok(())
    }

    /// Sets the symbol-insertion probability.
    ///
    /// # Errors
    ///
    /// Returns an error if `pi` is outside `[0, 1)` or `pi + pd >= 1`.
    pub fn set_pi(&mut self, pi: f64) -> Result<(), Error> {
        if !(0.0 .. 1.0).contains(&pi) || pi + self.pd >= 1.0 {
            return Err(Error::InvalidConfig(format!(
                "Insertion probability must be in [0, 1) with pi + pd < 1 (found {pi})"
            )));
        }
        self.pi = pi;
        Ok(())
    }

    /// Sets the channel parameter, applied to every event probability whose
    /// `vary_*` flag is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting probabilities violate their ranges.
    pub fn set_parameter(&mut self, p: f64) -> Result<(), Error> {
        if self.vary_ps {
            self.set_ps(p)?;
        }
        if self.vary_pd {
            self.set_pd(p)?;
        }
        if self.vary_pi {
            self.set_pi(p)?;
        }
        Ok(())
    }

    /// Returns the substitution-law likelihood of receiving `rx` given `tx`.
    #[must_use]
    pub fn pdf(&self, tx: usize, rx: usize) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        if tx == rx {
            1.0 - self.ps
        } else {
            self.ps / self.q as f64
        }
    }

    /// Passes one symbol through the substitution law.
    pub fn corrupt(&mut self, sym: usize) -> usize {
        if self.rng.random::<f64>() < self.ps {
            // uniform over the other q - 1 symbols
            let other = self.rng.random_range(0 .. self.q - 1);
            if other >= sym {
                other + 1
            } else {
                other
            }
        } else {
            sym
        }
    }

    /// Transmits a frame through the channel, applying insertions, deletions
    /// and substitutions.
    ///
    /// The received frame length varies; `|rx.len() - tx.len()|` is the
    /// end-of-frame drift.
    pub fn transmit(&mut self, tx: &[usize]) -> Vec<usize> {
        // determine the event sequence first: the number of insertions
        // before each position, and whether the position itself survives
        let mut insertions = vec![0usize; tx.len()];
        let mut survives = vec![true; tx.len()];
        for i in 0 .. tx.len() {
            let mut p = self.rng.random::<f64>();
            while p < self.pi {
                insertions[i] += 1;
                p = self.rng.random::<f64>();
            }
            if p < self.pi + self.pd {
                survives[i] = false;
            }
        }
        let mut rx = Vec::with_capacity(tx.len() + insertions.iter().sum::<usize>());
        for (i, &sym) in tx.iter().enumerate() {
            for _ in 0 .. insertions[i] {
                let inserted = self.rng.random_range(0 .. self.q);
                rx.push(inserted);
            }
            if survives[i] {
                let corrupted = self.corrupt(sym);
                rx.push(corrupted);
            }
        }
        rx
    }

    /// Returns the practical limit on consecutive insertions for a block of
    /// `tau` symbols, from the residual-probability cut-off on the geometric
    /// insertion run.
    #[must_use]
    pub fn compute_i(&self, tau: usize) -> usize {
        if self.pi <= 0.0 {
            return 1;
        }
        #[allow(clippy::cast_precision_loss)]
        let raw = ((RESIDUAL_PR.ln() - (tau as f64).ln()) / self.pi.ln()).ceil() - 1.0;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let i_limit = (raw.max(1.0)) as usize;
        if self.i_cap > 0 {
            i_limit.min(self.i_cap)
        } else {
            i_limit
        }
    }

    /// Returns the practical limit on total drift over a block of `tau`
    /// symbols (Davey rule of thumb, sized for the same residual
    /// probability as [`compute_i`](Self::compute_i)).
    #[must_use]
    pub fn compute_xmax(&self, tau: usize) -> usize {
        let p = self.pi.max(self.pd);
        #[allow(clippy::cast_precision_loss)]
        let davey = (RESIDUAL_SIGMA * (tau as f64 * p * (1.0 - p)).sqrt()).ceil();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let xmax = davey as usize;
        xmax.max(self.compute_i(tau))
    }

    /// Returns a metric computer matched to this channel for codewords of
    /// `n` symbols.
    #[must_use]
    pub fn metric_computer(&self, n: usize) -> MetricComputer {
        let mut computer = MetricComputer::new(self.q, self.compute_i(n), self.compute_xmax(n));
        computer.precompute(self.ps, self.pd, self.pi);
        computer
    }

    /// Computes the likelihood of the received segment under this channel
    /// for every codeword-level drift change in `[delta_min, delta_max]`.
    ///
    /// Convenience wrapper that builds a metric computer matched to the
    /// codeword length per call; decoders hold a [`MetricComputer`] instead
    /// so the coefficient tables are built once.
    pub fn receive(
        &self,
        tx: &[usize],
        rx: &[usize],
        delta_min: isize,
        delta_max: isize,
        out: &mut [f64],
    ) {
        self.metric_computer(tx.len())
            .receive_pdf(tx, rx, delta_min, delta_max, out);
    }
}


#[cfg(test)]
mod tests_of_ids_channel {
    use super::*;
    use float_eq::assert_float_eq;

    #[test]
    fn test_new_and_parameter_validation() {
        assert!(IdsChannel::new(1, true, true, true).is_err());
        let mut channel = IdsChannel::new(2, false, true, true).unwrap();
        assert!(channel.set_ps(0.6).is_err());
        assert!(channel.set_pd(1.0).is_err());
        assert!(channel.set_pi(-0.1).is_err());
        channel.set_parameter(0.05).unwrap();
        assert_float_eq!(channel.ps(), 0.0, abs <= 1e-15);
        assert_float_eq!(channel.pd(), 0.05, abs <= 1e-15);
        assert_float_eq!(channel.pi(), 0.05, abs <= 1e-15);
    }

    #[test]
    fn test_pdf() {
        let mut channel = IdsChannel::new(4, true, false, false).unwrap();
        channel.set_ps(0.2).unwrap();
        assert_float_eq!(channel.pdf(1, 1), 0.8, abs <= 1e-15);
        assert_float_eq!(channel.pdf(1, 2), 0.05, abs <= 1e-15);
    }

    #[test]
    fn test_transmit_noiseless_is_identity() {
        let mut channel = IdsChannel::new(2, true, true, true).unwrap();
        channel.seed(1);
        let tx = [1, 0, 1, 1, 0, 0, 1];
        assert_eq!(channel.transmit(&tx), tx);
    }

    #[test]
    fn test_transmit_length_statistics() {
        let mut channel = IdsChannel::new(2, false, false, true).unwrap();
        channel.seed(7);
        channel.set_pi(0.2).unwrap();
        let tx = vec![0usize; 10_000];
        let rx = channel.transmit(&tx);
        // expected insertions per symbol: pi / (1 - pi) = 0.25
        let growth = rx.len() - tx.len();
        assert!(growth > 2_000 && growth < 3_000, "growth = {growth}");
    }

    #[test]
    fn test_corrupt_respects_alphabet() {
        let mut channel = IdsChannel::new(4, true, false, false).unwrap();
        channel.seed(3);
        channel.set_ps(0.5).unwrap();
        let mut changed = 0;
        for _ in 0 .. 2_000 {
            let rx = channel.corrupt(2);
            assert!(rx < 4);
            if rx != 2 {
                changed += 1;
            }
        }
        assert!(changed > 800 && changed < 1_200, "changed = {changed}");
    }

    #[test]
    fn test_channel_receive_matches_computer() {
        let mut channel = IdsChannel::new(2, true, true, true).unwrap();
        channel.set_parameter(0.05).unwrap();
        let tx = [1, 0, 1];
        let rx = [1, 0, 0, 1];
        let mut from_channel = vec![0.0; 3];
        channel.receive(&tx, &rx, -1, 1, &mut from_channel);
        let mut from_computer = vec![0.0; 3];
        channel
            .metric_computer(3)
            .receive_pdf(&tx, &rx, -1, 1, &mut from_computer);
        assert_eq!(from_channel, from_computer);
    }

    #[test]
    fn test_corridor_limits() {
        let mut channel = IdsChannel::new(2, false, true, true).unwrap();
        channel.set_parameter(0.05).unwrap();
        let i_limit = channel.compute_i(32);
        let xmax = channel.compute_xmax(32);
        assert!(i_limit >= 1);
        assert!(xmax >= i_limit);
        // zero-noise channel still has a non-degenerate corridor
        let quiet = IdsChannel::new(2, false, true, true).unwrap();
        assert_eq!(quiet.compute_i(32), 1);
        assert!(quiet.compute_xmax(32) >= 1);
    }
}
