//! Textual codec-configuration format
//!
//! The codec configuration is persisted as a list of values, one field per
//! line, preceded by `#`-prefixed comment lines naming the field. The
//! leading value is an explicit format version. This format is the stable
//! external interface; simulation results use JSON instead.

use std::io::{BufRead, Write};

use crate::fsm::ConvCode;
use crate::interleaver::Interleaver;
use crate::real::Real;
use crate::turbo::Turbo;
use crate::Error;

/// Current format version
const FORMAT_VERSION: u32 = 1;

/// Complete parameter list of a turbo codec
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct TurboSpec {
    /// Generator polynomials of the constituent code (feedback first)
    pub code_polynomials: Vec<usize>,
    /// Block length (including any tail)
    pub block_length: usize,
    /// Interleaver permutation per set
    pub permutations: Vec<Vec<usize>>,
    /// Whether the trellis is terminated at the zero state
    pub end_at_zero: bool,
    /// Whether the code is circular (tail-biting)
    pub circular: bool,
    /// Whether decoding uses the parallel schedule
    pub parallel: bool,
    /// Number of decoding iterations
    pub iterations: usize,
}

impl TurboSpec {
    /// Writes the configuration in the textual format.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn to_writer<W: Write>(&self, sink: &mut W) -> Result<(), Error> {
        writeln!(sink, "# format version")?;
        writeln!(sink, "{FORMAT_VERSION}")?;
        writeln!(sink, "# generator polynomials")?;
        writeln!(sink, "{}", join(&self.code_polynomials))?;
        writeln!(sink, "# block length")?;
        writeln!(sink, "{}", self.block_length)?;
        writeln!(sink, "# number of sets")?;
        writeln!(sink, "{}", self.permutations.len())?;
        for (set, perm) in self.permutations.iter().enumerate() {
            writeln!(sink, "# interleaver for set {set}")?;
            writeln!(sink, "{}", join(perm))?;
        }
        writeln!(sink, "# terminated at zero")?;
        writeln!(sink, "{}", u8::from(self.end_at_zero))?;
        writeln!(sink, "# circular")?;
        writeln!(sink, "{}", u8::from(self.circular))?;
        writeln!(sink, "# parallel decoding")?;
        writeln!(sink, "{}", u8::from(self.parallel))?;
        writeln!(sink, "# iterations")?;
        writeln!(sink, "{}", self.iterations)?;
        Ok(())
    }

    /// Reads a configuration in the textual format.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails, if the format version is not
    /// recognised, or if any field is missing or malformed.
    pub fn from_reader<R: BufRead>(source: &mut R) -> Result<Self, Error> {
        let mut lines = ValueLines::new(source)?;
        let version: u32 = lines.parse_one("format version")?;
        if version != FORMAT_VERSION {
            return Err(Error::InvalidConfig(format!(
                "Unsupported codec format version {version} (expected {FORMAT_VERSION})"
            )));
        }
        let code_polynomials = lines.parse_list("generator polynomials")?;
        let block_length: usize = lines.parse_one("block length")?;
        let num_sets: usize = lines.parse_one("number of sets")?;
        let mut permutations = Vec::with_capacity(num_sets);
        for set in 0 .. num_sets {
            permutations.push(lines.parse_list(&format!("interleaver for set {set}"))?);
        }
        let end_at_zero = lines.parse_flag("terminated at zero")?;
        let circular = lines.parse_flag("circular")?;
        let parallel = lines.parse_flag("parallel decoding")?;
        let iterations: usize = lines.parse_one("iterations")?;
        Ok(Self {
            code_polynomials,
            block_length,
            permutations,
            end_at_zero,
            circular,
            parallel,
            iterations,
        })
    }

    /// Builds the codec this configuration describes; all the normal
    /// construction-time validation applies.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter violates the codec's invariants.
    pub fn build<R: Real>(&self) -> Result<Turbo<R>, Error> {
        let encoder = Box::new(ConvCode::new(&self.code_polynomials)?);
        let interleavers = self
            .permutations
            .iter()
            .map(|perm| Interleaver::new(perm))
            .collect::<Result<Vec<_>, _>>()?;
        Turbo::new(
            encoder,
            self.block_length,
            interleavers,
            self.iterations,
            self.end_at_zero,
            self.parallel,
            self.circular,
        )
    }
}

/// Joins values with single spaces.
fn join(values: &[usize]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Iterator over the value lines of the textual format, skipping comments
/// and blank lines
struct ValueLines {
    lines: std::vec::IntoIter<String>,
}

impl ValueLines {
    fn new<R: BufRead>(source: &mut R) -> Result<Self, Error> {
        let mut lines = Vec::new();
        for line in source.lines() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            lines.push(trimmed.to_string());
        }
        Ok(Self {
            lines: lines.into_iter(),
        })
    }

    fn next_line(&mut self, field: &str) -> Result<String, Error> {
        self.lines
            .next()
            .ok_or_else(|| Error::InvalidConfig(format!("Missing field: {field}")))
    }

    fn parse_one<T: std::str::FromStr>(&mut self, field: &str) -> Result<T, Error> {
        let line = self.next_line(field)?;
        line.parse()
            .map_err(|_| Error::InvalidConfig(format!("Malformed value for {field}: {line:?}")))
    }

    fn parse_list(&mut self, field: &str) -> Result<Vec<usize>, Error> {
        let line = self.next_line(field)?;
        line.split_whitespace()
            .map(|token| {
                token.parse().map_err(|_| {
                    Error::InvalidConfig(format!("Malformed value for {field}: {token:?}"))
                })
            })
            .collect()
    }

    fn parse_flag(&mut self, field: &str) -> Result<bool, Error> {
        match self.parse_one::<u8>(field)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(Error::InvalidConfig(format!(
                "Malformed flag for {field}: {other}"
            ))),
        }
    }
}
