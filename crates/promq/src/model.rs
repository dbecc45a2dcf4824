//! Query result model.
//!
//! Mirrors the `data` object of the Prometheus HTTP API: a `resultType` tag
//! and a `result` payload. Types serialize back to the same wire shape, which
//! is what the JSON output format prints. `Display` renders the Prometheus
//! text conventions (`up{job="x"} => 1 @[1435781451.781]`).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Label holding the metric name.
pub const METRIC_NAME_LABEL: &str = "__name__";

/// A set of labels identifying a series.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metric(BTreeMap<String, String>);

impl Metric {
    /// Creates an empty label set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a label, builder style.
    #[must_use]
    pub fn label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// The metric name, if present.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.0.get(METRIC_NAME_LABEL).map(String::as_str)
    }

    /// Value of a label.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<String> = self
            .0
            .iter()
            .filter(|(name, _)| name.as_str() != METRIC_NAME_LABEL)
            .map(|(name, value)| format!("{name}={}", quote(value)))
            .collect();

        match (self.name(), labels.is_empty()) {
            (Some(name), true) => write!(f, "{name}"),
            (None, true) => write!(f, "{{}}"),
            (name, false) => write!(f, "{}{{{}}}", name.unwrap_or(""), labels.join(", ")),
        }
    }
}

/// A timestamped value. On the wire: `[<unix seconds>, "<value>"]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "(f64, String)", into = "(f64, String)")]
pub struct SamplePair {
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
    /// Sample value; may be NaN or infinite.
    pub value: f64,
}

impl SamplePair {
    /// Creates a sample pair.
    #[must_use]
    pub const fn new(timestamp_ms: i64, value: f64) -> Self {
        Self {
            timestamp_ms,
            value,
        }
    }
}

impl TryFrom<(f64, String)> for SamplePair {
    type Error = String;

    fn try_from((seconds, raw): (f64, String)) -> Result<Self, Self::Error> {
        let value = raw
            .parse::<f64>()
            .map_err(|e| format!("invalid sample value {raw:?}: {e}"))?;
        Ok(Self {
            timestamp_ms: seconds_to_millis(seconds),
            value,
        })
    }
}

impl From<SamplePair> for (f64, String) {
    fn from(pair: SamplePair) -> Self {
        (
            millis_to_seconds(pair.timestamp_ms),
            FormatValue(pair.value).to_string(),
        )
    }
}

impl fmt::Display for SamplePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @[{}]",
            FormatValue(self.value),
            millis_to_seconds(self.timestamp_ms)
        )
    }
}

/// A string result. On the wire: `[<unix seconds>, "<string>"]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, String)", into = "(f64, String)")]
pub struct StringValue {
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
    /// The string.
    pub value: String,
}

impl From<(f64, String)> for StringValue {
    fn from((seconds, value): (f64, String)) -> Self {
        Self {
            timestamp_ms: seconds_to_millis(seconds),
            value,
        }
    }
}

impl From<StringValue> for (f64, String) {
    fn from(s: StringValue) -> Self {
        (millis_to_seconds(s.timestamp_ms), s.value)
    }
}

/// One element of an instant vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Series labels.
    pub metric: Metric,
    /// The sample.
    pub value: SamplePair,
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} => {}", self.metric, self.value)
    }
}

/// One series of a range result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleStream {
    /// Series labels.
    pub metric: Metric,
    /// Samples in time order.
    #[serde(default)]
    pub values: Vec<SamplePair>,
}

impl fmt::Display for SampleStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} =>", self.metric)?;
        write_lines(f, self.values.iter())
    }
}

/// A decoded query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resultType", content = "result", rename_all = "lowercase")]
pub enum Value {
    /// A single number.
    Scalar(SamplePair),
    /// A single string.
    String(StringValue),
    /// One sample per series at the evaluation time.
    Vector(Vec<Sample>),
    /// Several samples per series.
    Matrix(Vec<SampleStream>),
}

impl Value {
    /// The wire name of the result type.
    #[must_use]
    pub const fn result_type(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "scalar",
            Self::String(_) => "string",
            Self::Vector(_) => "vector",
            Self::Matrix(_) => "matrix",
        }
    }

    /// Number of series (1 for scalars and strings).
    #[must_use]
    pub fn series_count(&self) -> usize {
        match self {
            Self::Scalar(_) | Self::String(_) => 1,
            Self::Vector(samples) => samples.len(),
            Self::Matrix(streams) => streams.len(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(pair) => write!(f, "scalar: {pair}"),
            Self::String(s) => write!(f, "{}", s.value),
            Self::Vector(samples) => write_lines(f, samples.iter()),
            Self::Matrix(streams) => {
                let mut sorted: Vec<&SampleStream> = streams.iter().collect();
                sorted.sort_by(|a, b| a.metric.cmp(&b.metric));
                write_lines(f, sorted.into_iter())
            }
        }
    }
}

fn write_lines<T: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    items: impl Iterator<Item = T>,
) -> fmt::Result {
    for (i, item) in items.enumerate() {
        if i > 0 {
            writeln!(f)?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

/// Double-quotes a label value the way Prometheus prints it (`\n`, `\x01`, `\u0085`).
fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{7}' => out.push_str("\\a"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{b}' => out.push_str("\\v"),
            c if c.is_ascii_control() => out.push_str(&format!("\\x{:02x}", u32::from(c))),
            c if c.is_control() && u32::from(c) <= 0xFFFF => {
                out.push_str(&format!("\\u{:04x}", u32::from(c)));
            }
            c if c.is_control() => out.push_str(&format!("\\U{:08x}", u32::from(c))),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Renders a sample value the way Prometheus does (`NaN`, `+Inf`, `-Inf`).
struct FormatValue(f64);

impl fmt::Display for FormatValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.0;
        if v.is_nan() {
            write!(f, "NaN")
        } else if v.is_infinite() {
            write!(f, "{}Inf", if v > 0.0 { "+" } else { "-" })
        } else {
            write!(f, "{v}")
        }
    }
}

fn seconds_to_millis(seconds: f64) -> i64 {
    (seconds * 1000.0).round() as i64
}

fn millis_to_seconds(millis: i64) -> f64 {
    millis as f64 / 1000.0
}
