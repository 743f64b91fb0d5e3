//! Precomputed trellis transition tables

use crate::fsm::Fsm;
use crate::matrix::Matrix;
use crate::Error;

/// Transition tables for a finite-state encoder
///
/// Built once from the encoder so the decoders never need to keep a copy of
/// it; never mutated afterwards.
#[derive(Clone, PartialEq, Debug)]
pub struct Trellis {
    /// Number of states
    pub num_states: usize,
    /// Number of input symbols
    pub num_inputs: usize,
    /// Number of output symbols
    pub num_outputs: usize,
    /// Next state for every (state, input)
    next_state: Matrix<usize>,
    /// Output symbol for every (state, input)
    output: Matrix<usize>,
}

impl Trellis {
    /// Builds the transition tables by stepping the encoder through every
    /// (state, input) pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the encoder reports a transition outside its own
    /// declared state or output alphabet.
    pub fn new(encoder: &mut dyn Fsm) -> Result<Self, Error> {
        let num_states = encoder.num_states();
        let num_inputs = encoder.num_inputs();
        let num_outputs = encoder.num_outputs();
        let mut next_state = Matrix::new(num_states, num_inputs, 0);
        let mut output = Matrix::new(num_states, num_inputs, 0);
        for m in 0 .. num_states {
            for i in 0 .. num_inputs {
                encoder.reset(m);
                let x = encoder.step(Some(i));
                let mdash = encoder.state();
                if mdash >= num_states || x >= num_outputs {
                    return Err(Error::InvalidConfig(format!(
                        "Encoder transition ({m}, {i}) -> ({mdash}, {x}) leaves the \
                        declared alphabets ({num_states} states, {num_outputs} outputs)",
                    )));
                }
                next_state[(m, i)] = mdash;
                output[(m, i)] = x;
            }
        }
        encoder.reset(0);
        Ok(Self {
            num_states,
            num_inputs,
            num_outputs,
            next_state,
            output,
        })
    }

    /// Returns the state reached from state `m` on input `i`.
    #[must_use]
    pub fn next_state(&self, m: usize, i: usize) -> usize {
        self.next_state[(m, i)]
    }

    /// Returns the output symbol emitted from state `m` on input `i`.
    #[must_use]
    pub fn output(&self, m: usize, i: usize) -> usize {
        self.output[(m, i)]
    }
}

#[cfg(test)]
mod tests_of_trellis {
    use super::*;
    use crate::fsm::ConvCode;

    #[test]
    fn test_new() {
        let mut code = ConvCode::new(&[0o13, 0o15, 0o17]).unwrap();
        let trellis = Trellis::new(&mut code).unwrap();
        assert_eq!(trellis.num_states, 8);
        assert_eq!(trellis.num_inputs, 2);
        assert_eq!(trellis.num_outputs, 8);
        let correct_next_state_for_zero = [0, 4, 5, 1, 2, 6, 7, 3];
        let correct_next_state_for_one = [4, 0, 1, 5, 6, 2, 3, 7];
        let correct_output_for_zero = [0, 0, 2, 2, 6, 6, 4, 4];
        let correct_output_for_one = [7, 7, 5, 5, 1, 1, 3, 3];
        for m in 0 .. trellis.num_states {
            assert_eq!(trellis.next_state(m, 0), correct_next_state_for_zero[m]);
            assert_eq!(trellis.next_state(m, 1), correct_next_state_for_one[m]);
            assert_eq!(trellis.output(m, 0), correct_output_for_zero[m]);
            assert_eq!(trellis.output(m, 1), correct_output_for_one[m]);
        }
    }

    #[test]
    fn test_tables_cover_all_states() {
        let mut code = ConvCode::new(&[0o7, 0o5]).unwrap();
        let trellis = Trellis::new(&mut code).unwrap();
        // every state must be reachable: the two columns of next_state
        // together form a permutation-pair covering [0, M) twice
        let mut hits = vec![0; trellis.num_states];
        for m in 0 .. trellis.num_states {
            for i in 0 .. trellis.num_inputs {
                hits[trellis.next_state(m, i)] += 1;
            }
        }
        assert!(hits.iter().all(|&h| h == 2));
    }
}
