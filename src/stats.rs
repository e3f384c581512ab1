//! Aggregate statistics over evaluation traces.
//!
//! A [`Tally`] is folded over a trace stream in one left-to-right pass and
//! then turned into an [`AggregateReport`]. Nothing is kept between runs.
//!
//! Misclassified records are split three ways:
//! - `false_normal`: predicted `normal`, but the connection was an attack
//! - `false_malicious`: the connection was normal, but an attack was predicted
//! - `mislabeled_attack`: an attack, but not one of the true attack labels

use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::{Error, EvaluationTrace, NORMAL};

/// Number of cascade levels a trace can report.
pub const LAYERS: usize = 3;

/// Header row of the raw time sample export.
pub const SAMPLES_HEADER: &str = "Layer,Time";

/// Running counters for one pass over a trace stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tally {
    pub total: u64,
    pub normal: u64,
    pub malicious: u64,
    pub correct: u64,
    pub incorrect: u64,
    pub false_normal: u64,
    pub false_malicious: u64,
    pub mislabeled_attack: u64,
    /// Traces per layers-traversed value (index 0 = one layer).
    pub layer_counts: [u64; LAYERS],
    /// Summed elapsed time per layers-traversed value.
    pub layer_secs: [f64; LAYERS],
    pub total_secs: f64,
    samples: Option<Vec<(u8, f64)>>,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    /// A tally that also keeps every `(layer, elapsed)` sample.
    pub fn with_samples() -> Self {
        Self {
            samples: Some(Vec::new()),
            ..Self::default()
        }
    }

    /// Fold a fallible trace stream into a tally, stopping at the first error.
    pub fn from_traces<I>(traces: I, keep_samples: bool) -> Result<Self, Error>
    where
        I: IntoIterator<Item = Result<EvaluationTrace, Error>>,
    {
        let init = if keep_samples {
            Self::with_samples()
        } else {
            Self::new()
        };
        traces.into_iter().try_fold(init, |mut tally, trace| {
            tally.record(&trace?)?;
            Ok(tally)
        })
    }

    /// Count one trace.
    pub fn record(&mut self, trace: &EvaluationTrace) -> Result<(), Error> {
        let layer = trace.layers as usize;
        if !(1..=LAYERS).contains(&layer) {
            return Err(Error::DataFormat {
                line: self.total as usize + 1,
                record: trace.to_string(),
                reason: format!("layer count {} is outside 1..={}", trace.layers, LAYERS),
            });
        }

        let truth = trace.effective_truth();
        let truly_normal = truth.contains(NORMAL);

        self.total += 1;
        if truly_normal {
            self.normal += 1;
        } else {
            self.malicious += 1;
        }

        if truth.intersects(&trace.predicted) {
            self.correct += 1;
        } else {
            self.incorrect += 1;
            if trace.predicted.contains(NORMAL) {
                self.false_normal += 1;
            } else if truly_normal {
                self.false_malicious += 1;
            } else {
                self.mislabeled_attack += 1;
            }
        }

        self.layer_counts[layer - 1] += 1;
        self.layer_secs[layer - 1] += trace.elapsed_secs;
        self.total_secs += trace.elapsed_secs;

        if let Some(samples) = self.samples.as_mut() {
            samples.push((trace.layers, trace.elapsed_secs));
        }
        Ok(())
    }

    /// Kept samples, if this tally was created with them.
    pub fn samples(&self) -> Option<&[(u8, f64)]> {
        self.samples.as_deref()
    }

    /// Compute the report. Every average must have a non-zero denominator.
    pub fn finish(&self) -> Result<AggregateReport, Error> {
        let average_secs = average(self.total_secs, self.total, "the trace batch is empty")?;

        let mut layers = Vec::with_capacity(LAYERS);
        for (idx, (&count, &secs)) in self.layer_counts.iter().zip(&self.layer_secs).enumerate() {
            let layer = idx as u8 + 1;
            let average_secs = average(
                secs,
                count,
                &format!("no trace traversed {} layer(s); layer {} has no average time", layer, layer),
            )?;
            layers.push(LayerStats {
                layer,
                count,
                total_secs: secs,
                average_secs,
            });
        }

        Ok(AggregateReport {
            total: self.total,
            normal: self.normal,
            malicious: self.malicious,
            correct: self.correct,
            incorrect: self.incorrect,
            correct_ratio: self.correct as f64 / self.total as f64,
            incorrect_ratio: self.incorrect as f64 / self.total as f64,
            false_normal: self.false_normal,
            false_malicious: self.false_malicious,
            mislabeled_attack: self.mislabeled_attack,
            total_secs: self.total_secs,
            average_secs,
            layers,
        })
    }
}

fn average(sum: f64, count: u64, context: &str) -> Result<f64, Error> {
    if count == 0 {
        return Err(Error::Arithmetic(context.to_string()));
    }
    Ok(sum / count as f64)
}

/// Timing for traces that traversed a given number of layers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerStats {
    pub layer: u8,
    pub count: u64,
    pub total_secs: f64,
    pub average_secs: f64,
}

/// Aggregate quality and timing figures for one trace batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateReport {
    pub total: u64,
    pub normal: u64,
    pub malicious: u64,
    pub correct: u64,
    pub incorrect: u64,
    pub correct_ratio: f64,
    pub incorrect_ratio: f64,
    pub false_normal: u64,
    pub false_malicious: u64,
    pub mislabeled_attack: u64,
    pub total_secs: f64,
    pub average_secs: f64,
    pub layers: Vec<LayerStats>,
}

impl AggregateReport {
    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for AggregateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total: {}", self.total)?;
        writeln!(f, "Normal: {}", self.normal)?;
        writeln!(f, "Malicious: {}", self.malicious)?;
        writeln!(f, "Correct: {} ({:.6})", self.correct, self.correct_ratio)?;
        writeln!(f, "Incorrect: {} ({:.6})", self.incorrect, self.incorrect_ratio)?;
        writeln!(f, "Marked as Malicious but Normal: {}", self.false_malicious)?;
        writeln!(f, "Marked as Normal but is Malicious: {}", self.false_normal)?;
        writeln!(f, "Misidentified attack: {}", self.mislabeled_attack)?;
        for layer in &self.layers {
            let unit = if layer.layer == 1 { "layer" } else { "layers" };
            writeln!(f, "Traversed down {} {}: {}", layer.layer, unit, layer.count)?;
        }
        writeln!(f, "Total time: {:.6}", self.total_secs)?;
        writeln!(f, "Average time: {:.6}", self.average_secs)?;
        for layer in &self.layers {
            writeln!(f, "Layer {} Average Time: {:.6}", layer.layer, layer.average_secs)?;
        }
        Ok(())
    }
}

/// Write raw `(layer, time)` samples as a two-column table.
///
/// One header row, then one row per sample grouped by layer 1, 2, 3 and in
/// stream order within each layer.
pub fn write_samples<W: Write>(mut out: W, samples: &[(u8, f64)]) -> io::Result<()> {
    writeln!(out, "{}", SAMPLES_HEADER)?;
    for layer in 1..=LAYERS as u8 {
        for (_, secs) in samples.iter().filter(|(l, _)| *l == layer) {
            writeln!(out, "{},{:.6}", layer, secs)?;
        }
    }
    out.flush()
}

/// Write raw samples to a file at `path`, replacing any existing file.
pub fn write_samples_file<P: AsRef<Path>>(path: P, samples: &[(u8, f64)]) -> Result<(), Error> {
    let file = File::create(path)?;
    write_samples(BufWriter::new(file), samples)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LabelSet;

    fn trace(truth: &[&str], predicted: &[&str], secs: f64, layers: u8) -> EvaluationTrace {
        EvaluationTrace {
            truth: truth.iter().copied().collect(),
            predicted: predicted.iter().copied().collect(),
            elapsed_secs: secs,
            layers,
            scores: vec![],
        }
    }

    fn batch() -> Vec<EvaluationTrace> {
        vec![
            trace(&["normal"], &["normal"], 0.001, 1),
            trace(&["normal"], &["smurf"], 0.003, 3),
            trace(&["dos", "neptune"], &["neptune"], 0.004, 3),
            trace(&["probe"], &["normal"], 0.002, 2),
            trace(&["dos"], &["neptune"], 0.005, 3),
        ]
    }

    fn tally(traces: &[EvaluationTrace]) -> Tally {
        let mut t = Tally::new();
        for tr in traces {
            t.record(tr).unwrap();
        }
        t
    }

    #[test]
    fn test_counts() {
        let t = tally(&batch());
        assert_eq!(t.total, 5);
        assert_eq!(t.normal, 2);
        assert_eq!(t.malicious, 3);
        assert_eq!(t.correct, 2);
        assert_eq!(t.incorrect, 3);
        assert_eq!(t.false_normal, 1);
        assert_eq!(t.false_malicious, 1);
        assert_eq!(t.mislabeled_attack, 1);
        assert_eq!(t.layer_counts, [1, 1, 3]);
    }

    #[test]
    fn test_empty_truth_counts_as_normal() {
        let mut t = Tally::new();
        t.record(&EvaluationTrace {
            truth: LabelSet::new(),
            predicted: LabelSet::normal(),
            elapsed_secs: 0.0,
            layers: 1,
            scores: vec![],
        })
        .unwrap();
        assert_eq!(t.normal, 1);
        assert_eq!(t.correct, 1);
    }

    #[test]
    fn test_report_averages() {
        let report = tally(&batch()).finish().unwrap();
        assert!((report.total_secs - 0.015).abs() < 1e-12);
        assert!((report.average_secs - 0.003).abs() < 1e-12);
        assert!((report.correct_ratio - 0.4).abs() < 1e-12);
        assert_eq!(report.layers[2].count, 3);
        assert!((report.layers[2].average_secs - 0.004).abs() < 1e-12);
        assert!((report.layers[1].average_secs - 0.002).abs() < 1e-12);
    }

    #[test]
    fn test_empty_layer_is_arithmetic_error() {
        let t = tally(&[trace(&["normal"], &["normal"], 0.001, 1)]);
        let err = t.finish().unwrap_err();
        match err {
            Error::Arithmetic(msg) => assert!(msg.contains("layer 2")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_bad_layer_rejected() {
        let mut t = Tally::new();
        assert!(t.record(&trace(&["normal"], &["normal"], 0.001, 0)).is_err());
        assert!(t.record(&trace(&["normal"], &["normal"], 0.001, 4)).is_err());
        assert_eq!(t.total, 0);
    }

    #[test]
    fn test_from_traces_propagates_error() {
        let items: Vec<Result<EvaluationTrace, Error>> = vec![
            Ok(trace(&["normal"], &["normal"], 0.001, 1)),
            Err(Error::DataFormat {
                line: 2,
                record: "x".into(),
                reason: "bad".into(),
            }),
            Ok(trace(&["normal"], &["normal"], 0.001, 1)),
        ];
        let err = Tally::from_traces(items, false).unwrap_err();
        assert!(matches!(err, Error::DataFormat { line: 2, .. }));
    }

    #[test]
    fn test_samples_only_when_requested() {
        let items = batch().into_iter().map(Ok);
        let plain = Tally::from_traces(items.clone(), false).unwrap();
        assert!(plain.samples().is_none());

        let with = Tally::from_traces(items, true).unwrap();
        assert_eq!(with.samples().unwrap().len(), 5);
        assert_eq!(with.finish().unwrap(), plain.finish().unwrap());
    }

    #[test]
    fn test_write_samples_grouped_by_layer() {
        let samples = vec![(3, 0.003), (1, 0.001), (3, 0.0045), (2, 0.002)];
        let mut out = Vec::new();
        write_samples(&mut out, &samples).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "Layer,Time\n1,0.001000\n2,0.002000\n3,0.003000\n3,0.004500\n"
        );
    }

    #[test]
    fn test_display_report() {
        let text = tally(&batch()).finish().unwrap().to_string();
        assert!(text.contains("Total: 5\n"));
        assert!(text.contains("Correct: 2 (0.400000)\n"));
        assert!(text.contains("Marked as Normal but is Malicious: 1\n"));
        assert!(text.contains("Traversed down 1 layer: 1\n"));
        assert!(text.contains("Traversed down 3 layers: 3\n"));
        assert!(text.contains("Layer 3 Average Time: 0.004000\n"));
    }

    #[test]
    fn test_json_report() {
        let json = tally(&batch()).finish().unwrap().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["total"], 5);
        assert_eq!(value["layers"][2]["count"], 3);
    }
}
