//! # Iterative soft-input/soft-output decoders
//!
//! This crate implements the decoding core of a communications-systems
//! research toolkit: trellis and lattice decoders that produce _a posteriori
//! probabilities_ (APPs) rather than hard decisions, and the iterative
//! wrappers that exchange those probabilities to approach channel capacity.
//!
//! Three decoders carry the essential content. The [`Bcjr`] struct is a MAP
//! symbol-by-symbol trellis decoder over any finite-state encoder
//! implementing the [`Fsm`] trait (the [`ConvCode`] recursive systematic
//! convolutional encoder is provided). The [`Turbo`] codec composes BCJR
//! passes over interleaved parity sets, exchanging extrinsic information for
//! a fixed number of iterations. The [`Fba`] struct generalises the
//! forward-backward recursions to channels with synchronisation drift
//! (insertions and deletions), tracking cumulative drift as lattice state;
//! its per-codeword metrics come from the [`IdsChannel`]'s receiver
//! ([`MetricComputer`]).
//!
//! All decoder arithmetic is generic over the [`Real`] backend: plain `f64`
//! for short blocks, or the log-domain [`LogReal`] representation when the
//! trellis is long enough for products of probabilities to underflow.
//!
//! # Examples
//!
//! ```
//! use sisodec::{ConvCode, Interleaver, Matrix, Turbo};
//!
//! // rate-1/3 turbo codec: two parity sets over a 4-state code; the second
//! // set's interleaver preserves termination by permuting within residue
//! // classes of the feedback period
//! let encoder = Box::new(ConvCode::new(&[0o7, 0o5])?);
//! let interleavers = vec![
//!     Interleaver::identity(12)?,
//!     Interleaver::new(&sisodec::seeded_residue_permutation(12, 3, 1))?,
//! ];
//! let mut codec: Turbo<f64> = Turbo::new(encoder, 12, interleavers, 4, true, false, false)?;
//!
//! // encode; the last two input symbols are tail symbols chosen by the encoder
//! let source = [1, 0, 1, 1, 0, 0, 1, 0, 1, 1];
//! let (encoded, resolved) = codec.encode(&source)?;
//!
//! // noise-free bit-level likelihoods: three bits per encoded symbol
//! let mut ptable = Matrix::new(encoded.len() * 3, 2, 0.0);
//! for (t, &symbol) in encoded.iter().enumerate() {
//!     for j in 0 .. 3 {
//!         ptable[(t * 3 + j, (symbol >> j) & 1)] = 1.0;
//!     }
//! }
//! codec.translate(&ptable)?;
//! assert_eq!(codec.decode()?, resolved);
//! # Ok::<(), sisodec::Error>(())
//! ```
//!
//! The [`sim`] module has Monte Carlo drivers measuring error rates over
//! BPSK-AWGN and insertion/deletion channels, and the [`utils`] module the
//! random sources and likelihood tables they are built from.

#![warn(
    clippy::complexity,
    clippy::pedantic,
    clippy::perf,
    clippy::style,
    clippy::suspicious,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_allocation,
    unused_import_braces,
    unused_qualifications
)]

mod bcjr;
mod common;
mod fba;
mod fsm;
mod ids;
mod interleaver;
mod logreal;
mod matrix;
mod real;
pub mod sim;
mod textio;
mod trellis;
mod turbo;
pub mod utils;

pub use bcjr::{normalize_rows_max, normalize_rows_sum, Bcjr};
pub use common::Error;
pub use fba::{CodebookReceiver, Fba, GammaStorage, LatticeReceiver};
pub use fsm::{ConvCode, Fsm};
pub use ids::{IdsChannel, MetricComputer};
pub use interleaver::{seeded_permutation, seeded_residue_permutation, Interleaver};
pub use logreal::LogReal;
pub use matrix::{Matrix, Matrix3};
pub use real::Real;
pub use textio::TurboSpec;
pub use trellis::Trellis;
pub use turbo::Turbo;
