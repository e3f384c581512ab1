//! Line-oriented trace record format.
//!
//! One record per evaluated connection:
//!
//! ```text
//! ['dos'],['neptune'],0.000412,3,normal=0.081200;dos=0.930000;neptune=0.770000;
//! ```
//!
//! Fields are separated by `,`. Label sets are a bracketed list of quoted
//! tokens separated by `*`, so they never contain the field separator. The
//! fifth field is a list of `node=score` pairs, each terminated by `;`.

use std::fmt;
use std::io::BufRead;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{Error, NORMAL};

const FIELD_SEPARATOR: char = ',';
const LABEL_SEPARATOR: char = '*';
const PAIR_TERMINATOR: char = ';';
const RECORD_FIELDS: usize = 5;

static LABEL_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").unwrap());

/// Whether `name` can appear as a label or node name in a trace record.
pub fn is_valid_label(name: &str) -> bool {
    LABEL_TOKEN.is_match(name)
}

/// Ordered set of labels. Keeps first-insertion order so output is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSet {
    labels: Vec<String>,
}

impl LabelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The `{"normal"}` set.
    pub fn normal() -> Self {
        let mut set = Self::new();
        set.insert(NORMAL);
        set
    }

    /// Insert a label; returns false if it was already present.
    pub fn insert(&mut self, label: &str) -> bool {
        if self.contains(label) {
            return false;
        }
        self.labels.push(label.to_string());
        true
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    /// True if the two sets share at least one label.
    pub fn intersects(&self, other: &LabelSet) -> bool {
        self.labels.iter().any(|l| other.contains(l))
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(|s| s.as_str())
    }

    /// Parse the bracketed wire form, e.g. `['dos'*'smurf']`.
    ///
    /// A legacy `u` prefix before a quoted token (`[u'dos']`) is accepted.
    pub fn parse(text: &str) -> Result<Self, String> {
        let inner = text
            .trim()
            .strip_prefix('[')
            .and_then(|t| t.strip_suffix(']'))
            .ok_or_else(|| format!("label set {:?} is not bracketed", text))?;

        let mut set = LabelSet::new();
        if inner.trim().is_empty() {
            return Ok(set);
        }

        for part in inner.split(LABEL_SEPARATOR) {
            let token = parse_quoted(part.trim())?;
            set.insert(token);
        }
        Ok(set)
    }
}

impl<'a> FromIterator<&'a str> for LabelSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut set = LabelSet::new();
        for label in iter {
            set.insert(label);
        }
        set
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, label) in self.labels.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", LABEL_SEPARATOR)?;
            }
            write!(f, "'{}'", label)?;
        }
        write!(f, "]")
    }
}

fn parse_quoted(token: &str) -> Result<&str, String> {
    let unprefixed = token.strip_prefix('u').unwrap_or(token);
    let quote = unprefixed
        .chars()
        .next()
        .filter(|c| *c == '\'' || *c == '"')
        .ok_or_else(|| format!("label {:?} is not quoted", token))?;

    let body = unprefixed[1..]
        .strip_suffix(quote)
        .ok_or_else(|| format!("label {:?} has an unterminated quote", token))?;

    if !is_valid_label(body) {
        return Err(format!("label {:?} contains invalid characters", body));
    }
    Ok(body)
}

/// The outcome of driving one connection through the cascade.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationTrace {
    /// Labels flagged on the connection itself. May be empty (implicitly normal).
    pub truth: LabelSet,
    /// Labels produced by the cascade. Never empty for evaluator output.
    pub predicted: LabelSet,
    /// Sum of all scoring call durations, in seconds.
    pub elapsed_secs: f64,
    /// Number of cascade levels visited (1..=3).
    pub layers: u8,
    /// Raw score of every visited node, in visit order.
    pub scores: Vec<(String, f64)>,
}

impl EvaluationTrace {
    /// True label set with the empty set read as `{"normal"}`.
    pub fn effective_truth(&self) -> LabelSet {
        if self.truth.is_empty() {
            LabelSet::normal()
        } else {
            self.truth.clone()
        }
    }

    /// Whether the true and predicted sets share a label.
    pub fn is_correct(&self) -> bool {
        self.effective_truth().intersects(&self.predicted)
    }

    /// Score recorded for `node`, if it was visited.
    pub fn score(&self, node: &str) -> Option<f64> {
        self.scores
            .iter()
            .find(|(name, _)| name == node)
            .map(|(_, score)| *score)
    }

    /// Parse one record. `line` is only used for error context.
    pub fn parse_line(record: &str, line: usize) -> Result<Self, Error> {
        parse_record(record).map_err(|reason| Error::DataFormat {
            line,
            record: record.to_string(),
            reason,
        })
    }
}

impl FromStr for EvaluationTrace {
    type Err = Error;

    /// Parse a standalone record, reported as line 1 on failure.
    fn from_str(record: &str) -> Result<Self, Self::Err> {
        Self::parse_line(record, 1)
    }
}

impl fmt::Display for EvaluationTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{truth}{sep}{pred}{sep}{elapsed:.6}{sep}{layers}{sep}",
            truth = self.truth,
            pred = self.predicted,
            elapsed = self.elapsed_secs,
            layers = self.layers,
            sep = FIELD_SEPARATOR,
        )?;
        for (node, score) in &self.scores {
            write!(f, "{}={:.6}{}", node, score, PAIR_TERMINATOR)?;
        }
        Ok(())
    }
}

fn parse_record(record: &str) -> Result<EvaluationTrace, String> {
    let fields: Vec<&str> = record.split(FIELD_SEPARATOR).collect();
    if fields.len() != RECORD_FIELDS {
        return Err(format!(
            "expected {} fields, found {}",
            RECORD_FIELDS,
            fields.len()
        ));
    }

    let truth = LabelSet::parse(fields[0])?;
    let predicted = LabelSet::parse(fields[1])?;
    if predicted.is_empty() {
        return Err("predicted label set is empty".to_string());
    }

    let elapsed_secs: f64 = fields[2]
        .trim()
        .parse()
        .map_err(|_| format!("elapsed time {:?} is not a number", fields[2]))?;
    if !elapsed_secs.is_finite() || elapsed_secs < 0.0 {
        return Err(format!("elapsed time {} is not a valid duration", elapsed_secs));
    }

    let layers: u8 = fields[3]
        .trim()
        .parse()
        .map_err(|_| format!("layer count {:?} is not an integer", fields[3]))?;
    if !(1..=3).contains(&layers) {
        return Err(format!("layer count {} is outside 1..=3", layers));
    }

    let scores = parse_scores(fields[4])?;

    Ok(EvaluationTrace {
        truth,
        predicted,
        elapsed_secs,
        layers,
        scores,
    })
}

fn parse_scores(field: &str) -> Result<Vec<(String, f64)>, String> {
    let mut scores = Vec::new();
    for pair in field.trim().split(PAIR_TERMINATOR) {
        if pair.is_empty() {
            continue;
        }
        let (node, score) = pair
            .split_once('=')
            .ok_or_else(|| format!("score pair {:?} is missing '='", pair))?;
        if !is_valid_label(node) {
            return Err(format!("score pair {:?} has an invalid node name", pair));
        }
        let score: f64 = score
            .parse()
            .map_err(|_| format!("score {:?} for node {} is not a number", score, node))?;
        if !(0.0..=1.0).contains(&score) {
            return Err(format!("score {} for node {} is outside [0, 1]", score, node));
        }
        scores.push((node.to_string(), score));
    }
    Ok(scores)
}

/// Iterator over trace records read from a line-oriented source.
///
/// Blank lines are skipped. Every malformed record is reported with its
/// 1-based line number; the iterator never silently drops a record.
pub struct TraceReader<R> {
    reader: R,
    line: usize,
    buf: Vec<u8>,
}

impl<R: BufRead> TraceReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: 0,
            buf: Vec::new(),
        }
    }
}

impl<R: BufRead> Iterator for TraceReader<R> {
    type Item = Result<EvaluationTrace, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {
                    self.line += 1;
                    let text = match std::str::from_utf8(&self.buf) {
                        Ok(text) => text,
                        Err(_) => {
                            let lossy = String::from_utf8_lossy(&self.buf);
                            return Some(Err(Error::DataFormat {
                                line: self.line,
                                record: lossy.trim_end_matches(['\n', '\r']).to_string(),
                                reason: "record is not valid UTF-8".to_string(),
                            }));
                        }
                    };
                    let record = text.trim_end_matches(['\n', '\r']);
                    if record.trim().is_empty() {
                        continue;
                    }
                    return Some(EvaluationTrace::parse_line(record, self.line));
                }
                Err(e) => return Some(Err(Error::Io(e))),
            }
        }
    }
}
