//! Finite-state encoder abstraction and the recursive systematic convolutional code

use crate::Error;

/// Abstract finite-state encoder, as consumed by the trellis decoders
///
/// Input and output symbols are integers in `[0, num_inputs)` and
/// `[0, num_outputs)` respectively. A `None` input requests the next tail
/// symbol, i.e. whatever input drives the machine towards the zero state.
pub trait Fsm: std::fmt::Debug {
    /// Returns the number of defined states.
    fn num_states(&self) -> usize;

    /// Returns the number of valid input symbols per step.
    fn num_inputs(&self) -> usize;

    /// Returns the number of valid output symbols per step.
    fn num_outputs(&self) -> usize;

    /// Returns the memory order (length of tail).
    fn mem_order(&self) -> usize;

    /// Resets to the given state.
    fn reset(&mut self, state: usize);

    /// Resets to the circulation state for the input sequence just fed in
    /// from the zero state.
    ///
    /// # Errors
    ///
    /// Returns an error if no circulation state exists for the number of
    /// steps taken since the last reset.
    fn resetcircular(&mut self) -> Result<(), Error>;

    /// Returns the current state.
    fn state(&self) -> usize;

    /// Computes the output symbol for the given input and the present state,
    /// without advancing.
    fn output(&self, input: Option<usize>) -> usize;

    /// Feeds the given input and advances the state.
    fn advance(&mut self, input: Option<usize>);

    /// Feeds the given input and returns the corresponding output symbol.
    fn step(&mut self, input: Option<usize>) -> usize {
        let output = self.output(input);
        self.advance(input);
        output
    }
}

/// Recursive systematic convolutional encoder
///
/// Described by its generator polynomials: the first is the feedback
/// polynomial and also produces the systematic output, all subsequent ones
/// are feedforward and produce the parity outputs. Binary input; the output
/// symbol packs the systematic bit into the least-significant position, so
/// `output % num_inputs` recovers the input symbol and `output / num_inputs`
/// the parity bits.
#[derive(Clone, Debug)]
pub struct ConvCode {
    /// Code polynomials (feedback first)
    code_polynomials: Vec<usize>,
    /// Memory length
    memory_len: usize,
    /// Number of states
    num_states: usize,
    /// Current state (shift register)
    state: usize,
    /// Steps taken since the last reset (needed for circulation)
    steps: usize,
}

impl ConvCode {
    /// Returns the encoder corresponding to given code polynomials.
    ///
    /// # Parameters
    ///
    /// - `code_polynomials`: Integer representations of the generator
    ///   polynomials. Must have length `N` for a code of rate `1/N`. The
    ///   first element is taken as the feedback polynomial (this corresponds
    ///   to the systematic bit), and all subsequent ones as the feedforward
    ///   polynomials. For a code of constraint length `L`, the feedback
    ///   polynomial must be in the range `(2^(L-1), 2^L)`, and each
    ///   feedforward polynomial must be in the range `[1, 2^L)` and different
    ///   from the feedback polynomial.
    ///
    /// # Errors
    ///
    /// Returns an error if the polynomial list violates the constraints
    /// above.
    pub fn new(code_polynomials: &[usize]) -> Result<Self, Error> {
        let constraint_len = constraint_length(code_polynomials)?;
        Ok(Self {
            code_polynomials: code_polynomials.to_vec(),
            memory_len: constraint_len - 1,
            num_states: 1 << (constraint_len - 1),
            state: 0,
            steps: 0,
        })
    }

    /// Returns the input bit actually fed in (tail resolved against the
    /// present state).
    fn resolve_input(&self, input: Option<usize>) -> usize {
        match input {
            Some(bit) => bit,
            None => self.feedback_bit(0),
        }
    }

    /// Returns the feedback bit for the given input at the present state.
    fn feedback_bit(&self, input_bit: usize) -> usize {
        bitxor(self.augmented_state(input_bit) & self.code_polynomials[0])
    }

    /// Returns the register augmented on the left with the given bit.
    fn augmented_state(&self, bit: usize) -> usize {
        debug_assert!(bit < 2);
        bit * self.num_states + self.state
    }

    /// Returns the state reached from `state` after one zero-input step.
    fn next_state_zero_input(&self, state: usize) -> usize {
        let feedback = bitxor(state & self.code_polynomials[0]);
        (feedback * self.num_states + state) >> 1
    }

    /// Returns the period of the zero-input state map (the multiplicative
    /// order of the feedback register), if the map is cyclic.
    ///
    /// Interleavers that move positions only within residue classes of this
    /// period preserve the encoder's end state, which is what keeps every
    /// parity set of a terminated turbo code terminated.
    #[must_use]
    pub fn feedback_period(&self) -> Option<usize> {
        for period in 1 ..= self.num_states {
            let cyclic = (0 .. self.num_states).all(|start| {
                let mut state = start;
                for _ in 0 .. period {
                    state = self.next_state_zero_input(state);
                }
                state == start
            });
            if cyclic {
                return Some(period);
            }
        }
        None
    }
}

impl Fsm for ConvCode {
    fn num_states(&self) -> usize {
        self.num_states
    }

    fn num_inputs(&self) -> usize {
        2
    }

    fn num_outputs(&self) -> usize {
        1 << self.code_polynomials.len()
    }

    fn mem_order(&self) -> usize {
        self.memory_len
    }

    fn reset(&mut self, state: usize) {
        debug_assert!(state < self.num_states);
        self.state = state;
        self.steps = 0;
    }

    fn resetcircular(&mut self) -> Result<(), Error> {
        // The register update is linear over GF(2), so the end state starting
        // from s with input sequence u decomposes as z(s) ^ e0, where z is
        // the zero-input map and e0 the end state of the zero-state pass
        // just completed. The circulation state satisfies s = z(s) ^ e0.
        let tau = self.steps;
        let e0 = self.state;
        for s in 0 .. self.num_states {
            let mut z = s;
            for _ in 0 .. tau {
                z = self.next_state_zero_input(z);
            }
            if z ^ e0 == s {
                self.state = s;
                self.steps = 0;
                return Ok(());
            }
        }
        Err(Error::InvalidConfig(format!(
            "No circulation state exists for a block length of {tau} steps"
        )))
    }

    fn state(&self) -> usize {
        self.state
    }

    fn output(&self, input: Option<usize>) -> usize {
        let in_bit = self.resolve_input(input);
        let aug = self.augmented_state(self.feedback_bit(in_bit));
        let mut output = 0;
        for (n, &poly) in self.code_polynomials.iter().enumerate() {
            output |= bitxor(aug & poly) << n;
        }
        output
    }

    fn advance(&mut self, input: Option<usize>) {
        let in_bit = self.resolve_input(input);
        self.state = self.augmented_state(self.feedback_bit(in_bit)) >> 1;
        self.steps += 1;
    }
}

/// Returns constraint length corresponding to given code polynomials.
fn constraint_length(code_polynomials: &[usize]) -> Result<usize, Error> {
    if code_polynomials.len() < 2 {
        return Err(Error::InvalidConfig(
            "Expected at least two code polynomials".to_string(),
        ));
    }
    let feedback_poly = code_polynomials[0];
    if feedback_poly == 0 || feedback_poly & (feedback_poly - 1) == 0 {
        return Err(Error::InvalidConfig(
            "Feedback polynomial cannot be 0 or a power of 2".to_string(),
        ));
    }
    // OK to cast `u32` to `usize`: Numbers involved will always be small enough.
    let constraint_len = (usize::BITS - feedback_poly.leading_zeros()) as usize;
    let two_pow_constraint_len = 1 << constraint_len;
    if code_polynomials[1 ..]
        .iter()
        .any(|&x| x == 0 || x == feedback_poly || x >= two_pow_constraint_len)
    {
        return Err(Error::InvalidConfig(format!(
            "For constraint length of {constraint_len}, each feedforward polynomial \
            must be in the range [1, {two_pow_constraint_len}), and cannot equal the \
            feedback polynomial {feedback_poly}",
        )));
    }
    Ok(constraint_len)
}

/// Returns XOR of bits in the binary representation of given integer.
fn bitxor(num: usize) -> usize {
    (num.count_ones() % 2) as usize
}
