//! Terminal reporting of a query outcome.
//!
//! A value is written to stdout; warnings and errors go to stderr. A value
//! accompanied by warnings is a failure: the value may be incomplete, so it is
//! not printed as a result.

use std::io::Write;
use std::process::ExitCode;

use serde::Serialize;
use tracing::{debug, error};

use crate::cli::Format;
use crate::error::Error;
use crate::model::Value;
use crate::query::QueryOutcome;

/// Final decision of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// A clean value was reported.
    Success,
    /// An error or warnings were reported.
    Failure,
}

impl Verdict {
    /// Process exit code for this verdict.
    #[must_use]
    pub const fn exit_code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
        }
    }

    /// Returns `true` for [`Verdict::Success`].
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl From<Verdict> for ExitCode {
    fn from(verdict: Verdict) -> Self {
        Self::from(verdict.exit_code())
    }
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum JsonReport<'a> {
    Success { data: &'a Value },
    Warnings { warnings: &'a [String], data: &'a Value },
    Error { error: String },
}

/// Writes outcomes to a pair of output streams.
#[derive(Debug)]
pub struct ResultReporter<O, E> {
    format: Format,
    out: O,
    err: E,
}

impl ResultReporter<std::io::Stdout, std::io::Stderr> {
    /// A reporter writing to the process's stdout and stderr.
    #[must_use]
    pub fn stdio(format: Format) -> Self {
        Self::new(format, std::io::stdout(), std::io::stderr())
    }
}

impl<O: Write, E: Write> ResultReporter<O, E> {
    /// Creates a reporter writing values to `out` and diagnostics to `err`.
    #[must_use]
    pub const fn new(format: Format, out: O, err: E) -> Self {
        Self { format, out, err }
    }

    /// Consumes the reporter, returning its streams.
    pub fn into_parts(self) -> (O, E) {
        (self.out, self.err)
    }

    /// Reports `outcome` and returns the verdict.
    ///
    /// A failure to write the report itself is logged and yields
    /// [`Verdict::Failure`].
    pub fn report(&mut self, outcome: QueryOutcome) -> Verdict {
        let verdict = match outcome {
            QueryOutcome::Value(value) => match self.write_value(&value) {
                Ok(()) => Verdict::Success,
                Err(e) => {
                    error!(error = %e, "failed to write result");
                    Verdict::Failure
                }
            },
            QueryOutcome::Warnings { value, warnings } => {
                self.write_warnings(&value, warnings);
                Verdict::Failure
            }
            QueryOutcome::Error(err) => self.report_error(&Error::Query(err)),
        };
        debug!(exit_code = verdict.exit_code(), "outcome reported");
        verdict
    }

    /// Reports a failure that happened outside the query, such as a
    /// configuration error. Always returns [`Verdict::Failure`].
    pub fn report_error(&mut self, failure: &Error) -> Verdict {
        let written = match self.format {
            Format::Text => writeln!(self.err, "error: {failure}"),
            Format::Json => write_json(
                &mut self.err,
                &JsonReport::Error {
                    error: failure.to_string(),
                },
            ),
        };
        if let Err(e) = written {
            error!(error = %e, "failed to write error report");
        }
        Verdict::Failure
    }

    fn write_value(&mut self, value: &Value) -> std::io::Result<()> {
        match self.format {
            Format::Text => {
                writeln!(self.out, "Result:")?;
                writeln!(self.out, "{value}")?;
            }
            Format::Json => write_json(&mut self.out, &JsonReport::Success { data: value })?,
        }
        self.out.flush()
    }

    fn write_warnings(&mut self, value: &Value, warnings: Vec<String>) {
        let written = match self.format {
            Format::Text => writeln!(self.err, "{}", Error::WarningsPresent { warnings }),
            Format::Json => write_json(
                &mut self.err,
                &JsonReport::Warnings {
                    warnings: &warnings,
                    data: value,
                },
            ),
        };
        if let Err(e) = written {
            error!(error = %e, "failed to write warnings");
        }
    }
}

fn write_json<W: Write>(writer: &mut W, report: &JsonReport<'_>) -> std::io::Result<()> {
    serde_json::to_writer(&mut *writer, report)?;
    writeln!(writer)
}
