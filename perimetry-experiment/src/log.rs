//! Append-only trial and false-positive records and their text sinks.
//!
//! Layout of the results sink:
//!
//! ```text
//! 12.734                                   completion time, seconds
//! 1,(0, 0, 0),True,2.104,0.312,False       index,position,responded,rt,latency,fixating
//! ```
//!
//! Booleans use the capitalised spelling the downstream analysis scripts
//! compare against.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufWriter, Write};
use std::path::Path;

use perimetry_core::{
    Classification, FalsePositiveRecord, PerimetryError, Position, Result, TrialRecord,
};
use tracing::debug;

use crate::threshold::ThresholdEntry;

pub const RESULTS_FILE: &str = "stimulus_results.txt";
pub const FALSE_POSITIVES_FILE: &str = "false_positives.txt";
pub const RUN_INFO_FILE: &str = "test_info.txt";
pub const THRESHOLDS_FILE: &str = "thresholds.json";

/// Arrival-ordered record of one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrialLog {
    trials: Vec<TrialRecord>,
    false_positives: Vec<FalsePositiveRecord>,
}

/// Aggregate counts for the end-of-run report.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RunSummary {
    pub trials: usize,
    pub hits: usize,
    pub timeouts: usize,
    /// Trials still pending when the run stopped.
    pub unresolved: usize,
    pub false_positives: usize,
    /// Mean hit latency in seconds.
    pub mean_latency: Option<f64>,
}

impl RunSummary {
    pub fn hit_rate(&self) -> f64 {
        if self.trials == 0 {
            0.0
        } else {
            self.hits as f64 / self.trials as f64
        }
    }
}

/// Labels written to the run-info sink.
#[derive(Debug, Clone, PartialEq)]
pub struct RunInfo {
    pub stimulus_label: String,
    pub canvas_label: String,
    /// Seconds.
    pub response_time_limit: f64,
}

impl TrialLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a pending record and returns its 1-based index.
    pub fn open_trial(&mut self, position: Position) -> usize {
        let index = self.trials.len() + 1;
        self.trials.push(TrialRecord::pending(index, position));
        index
    }

    /// Index of the most recently opened trial.
    pub fn current_index(&self) -> Option<usize> {
        self.trials.last().map(|t| t.index)
    }

    pub fn get(&self, index: usize) -> Option<&TrialRecord> {
        index.checked_sub(1).and_then(|i| self.trials.get(i))
    }

    /// Resolves trial `index`. `Ok(false)` means it had already been resolved
    /// and nothing changed.
    pub fn classify(&mut self, index: usize, outcome: Classification) -> Result<bool> {
        let record = index
            .checked_sub(1)
            .and_then(|i| self.trials.get_mut(i))
            .ok_or(PerimetryError::UnknownTrial(index))?;
        Ok(record.classify(outcome))
    }

    pub fn record_false_positive(&mut self, record: FalsePositiveRecord) {
        self.false_positives.push(record);
    }

    pub fn trials(&self) -> &[TrialRecord] {
        &self.trials
    }

    pub fn false_positives(&self) -> &[FalsePositiveRecord] {
        &self.false_positives
    }

    pub fn summary(&self) -> RunSummary {
        let hits: Vec<f64> = self
            .trials
            .iter()
            .filter(|t| t.responded)
            .map(|t| t.latency_since_onset)
            .collect();
        let unresolved = self.trials.iter().filter(|t| !t.is_classified()).count();
        let mean_latency = if hits.is_empty() {
            None
        } else {
            Some(hits.iter().sum::<f64>() / hits.len() as f64)
        };
        RunSummary {
            trials: self.trials.len(),
            hits: hits.len(),
            timeouts: self.trials.len() - hits.len() - unresolved,
            unresolved,
            false_positives: self.false_positives.len(),
            mean_latency,
        }
    }

    pub fn write_results<W: Write>(&self, w: &mut W, completion_secs: f64) -> Result<()> {
        writeln!(w, "{completion_secs}")?;
        for trial in &self.trials {
            writeln!(w, "{}", results_line(trial))?;
        }
        Ok(())
    }

    pub fn write_false_positives<W: Write>(&self, w: &mut W) -> Result<()> {
        for fp in &self.false_positives {
            writeln!(w, "{}", fp.time_since_start)?;
        }
        Ok(())
    }

    /// Writes every sink and flushes them.
    pub fn flush<W: Write>(
        &self,
        sinks: &mut LogSinks<W>,
        completion_secs: f64,
        info: &RunInfo,
        thresholds: &[ThresholdEntry],
    ) -> Result<()> {
        self.write_results(&mut sinks.results, completion_secs)?;
        self.write_false_positives(&mut sinks.false_positives)?;
        write_run_info(&mut sinks.run_info, info)?;
        serde_json::to_writer_pretty(&mut sinks.thresholds, thresholds)
            .map_err(std::io::Error::from)?;
        writeln!(sinks.thresholds)?;
        sinks.flush()?;
        debug!(
            trials = self.trials.len(),
            false_positives = self.false_positives.len(),
            "trial log flushed"
        );
        Ok(())
    }
}

pub fn write_run_info<W: Write>(w: &mut W, info: &RunInfo) -> Result<()> {
    writeln!(
        w,
        "{}, {}, {}",
        info.stimulus_label, info.canvas_label, info.response_time_limit
    )?;
    Ok(())
}

fn flag(b: bool) -> &'static str {
    if b { "True" } else { "False" }
}

fn parse_flag(s: &str) -> Option<bool> {
    match s {
        "True" | "true" => Some(true),
        "False" | "false" => Some(false),
        _ => None,
    }
}

pub fn results_line(trial: &TrialRecord) -> String {
    format!(
        "{},{},{},{},{},{}",
        trial.index,
        trial.position,
        flag(trial.responded),
        trial.response_time_since_start,
        trial.latency_since_onset,
        flag(trial.was_fixating)
    )
}

/// Reads one trial line written by [`TrialLog::write_results`].
pub fn parse_results_line(line: &str) -> Result<TrialRecord> {
    let malformed = |reason: &str| PerimetryError::MalformedResults {
        line: line.to_string(),
        reason: reason.to_string(),
    };

    let (index, rest) = line
        .trim()
        .split_once(',')
        .ok_or_else(|| malformed("missing fields"))?;
    let index = index
        .parse::<usize>()
        .map_err(|_| malformed("index is not an integer"))?;

    let close = rest
        .find(')')
        .ok_or_else(|| malformed("position is not parenthesised"))?;
    let position = rest[..=close]
        .parse::<Position>()
        .map_err(|e| malformed(&e.to_string()))?;

    let fields: Vec<&str> = rest[close + 1..]
        .trim_start_matches(',')
        .split(',')
        .map(str::trim)
        .collect();
    let [responded, rt, latency, fixating] = fields.as_slice() else {
        return Err(malformed("expected four fields after the position"));
    };

    let responded = parse_flag(responded).ok_or_else(|| malformed("bad responded flag"))?;
    let was_fixating = parse_flag(fixating).ok_or_else(|| malformed("bad fixation flag"))?;
    let rt = rt
        .parse::<f64>()
        .map_err(|_| malformed("response time is not a number"))?;
    let latency = latency
        .parse::<f64>()
        .map_err(|_| malformed("latency is not a number"))?;

    Ok(TrialRecord::finalized(
        index,
        position,
        responded,
        rt,
        latency,
        was_fixating,
    ))
}

/// Reads a whole results sink: the completion time and every trial.
pub fn read_results<R: BufRead>(reader: R) -> Result<(f64, Vec<TrialRecord>)> {
    let mut lines = reader.lines();
    let header = lines.next().transpose()?.unwrap_or_default();
    let completion = header
        .trim()
        .parse::<f64>()
        .map_err(|_| PerimetryError::MalformedResults {
            line: header.clone(),
            reason: "completion time is not a number".to_string(),
        })?;
    let mut trials = Vec::new();
    for line in lines {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        trials.push(parse_results_line(&line)?);
    }
    Ok((completion, trials))
}

/// The four output destinations of a run.
#[derive(Debug)]
pub struct LogSinks<W: Write> {
    pub results: W,
    pub false_positives: W,
    pub run_info: W,
    pub thresholds: W,
}

impl<W: Write> LogSinks<W> {
    pub fn flush(&mut self) -> std::io::Result<()> {
        self.results.flush()?;
        self.false_positives.flush()?;
        self.run_info.flush()?;
        self.thresholds.flush()
    }
}

impl LogSinks<BufWriter<File>> {
    /// Opens the sinks under `raw_dir`. Text sinks append, matching the
    /// behaviour analysts expect when a run folder is reused.
    pub fn open(raw_dir: &Path) -> Result<Self> {
        let append = |name: &str| {
            let path = raw_dir.join(name);
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map(BufWriter::new)
                .map_err(|source| PerimetryError::SinkUnavailable { path, source })
        };
        let thresholds_path = raw_dir.join(THRESHOLDS_FILE);
        let thresholds = File::create(&thresholds_path)
            .map(BufWriter::new)
            .map_err(|source| PerimetryError::SinkUnavailable {
                path: thresholds_path,
                source,
            })?;
        Ok(Self {
            results: append(RESULTS_FILE)?,
            false_positives: append(FALSE_POSITIVES_FILE)?,
            run_info: append(RUN_INFO_FILE)?,
            thresholds,
        })
    }
}

impl LogSinks<Vec<u8>> {
    pub fn in_memory() -> Self {
        Self {
            results: Vec::new(),
            false_positives: Vec::new(),
            run_info: Vec::new(),
            thresholds: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(rt: f64, latency: f64, fixating: bool) -> Classification {
        Classification::Hit {
            response_time_since_start: rt,
            latency,
            was_fixating: fixating,
        }
    }

    #[test]
    fn indices_are_one_based_and_sequential() {
        let mut log = TrialLog::new();
        assert_eq!(log.current_index(), None);
        assert_eq!(log.open_trial(Position::new(0.0, 0.0, 0.0)), 1);
        assert_eq!(log.open_trial(Position::new(1.0, 0.0, 0.0)), 2);
        assert_eq!(log.current_index(), Some(2));
        assert_eq!(log.get(1).unwrap().position, Position::new(0.0, 0.0, 0.0));
        assert!(log.get(0).is_none());
    }

    #[test]
    fn second_classification_is_refused() {
        let mut log = TrialLog::new();
        let idx = log.open_trial(Position::new(0.0, 0.0, 0.0));
        assert!(log.classify(idx, hit(1.5, 0.25, true)).unwrap());
        assert!(!log.classify(idx, Classification::TimedOut).unwrap());
        assert!(log.get(idx).unwrap().responded);
        assert!(matches!(
            log.classify(7, Classification::TimedOut),
            Err(PerimetryError::UnknownTrial(7))
        ));
    }

    #[test]
    fn summary_counts_each_outcome() {
        let mut log = TrialLog::new();
        for _ in 0..4 {
            log.open_trial(Position::new(0.0, 0.0, 0.0));
        }
        log.classify(1, hit(1.0, 0.2, true)).unwrap();
        log.classify(2, hit(2.0, 0.4, false)).unwrap();
        log.classify(3, Classification::TimedOut).unwrap();
        log.record_false_positive(FalsePositiveRecord {
            time_since_start: 3.0,
            time_since_last_onset: 0.6,
        });

        let summary = log.summary();
        assert_eq!(summary.trials, 4);
        assert_eq!(summary.hits, 2);
        assert_eq!(summary.timeouts, 1);
        assert_eq!(summary.unresolved, 1);
        assert_eq!(summary.false_positives, 1);
        assert!((summary.mean_latency.unwrap() - 0.3).abs() < 1e-9);
        assert_eq!(summary.hit_rate(), 0.5);
    }

    #[test]
    fn results_line_reads_back() {
        let mut log = TrialLog::new();
        let idx = log.open_trial(Position::new(-0.25, 0.5, 0.1));
        log.classify(idx, hit(4.125, 0.3172, true)).unwrap();
        let record = log.get(idx).unwrap().clone();

        let line = results_line(&record);
        assert_eq!(line, "1,(-0.25, 0.5, 0.1),True,4.125,0.3172,True");
        assert_eq!(parse_results_line(&line).unwrap(), record);
    }

    #[test]
    fn garbage_results_lines_are_rejected() {
        for bad in [
            "",
            "x,(0, 0, 0),True,1,1,True",
            "1,0,0,0,True,1,1,True",
            "1,(0, 0, 0),Maybe,1,1,True",
            "1,(0, 0, 0),True,1,True",
        ] {
            assert!(
                matches!(
                    parse_results_line(bad),
                    Err(PerimetryError::MalformedResults { .. })
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn flush_writes_every_sink() {
        let mut log = TrialLog::new();
        let origin = Position::new(0.0, 0.0, 0.0);
        log.open_trial(origin);
        log.classify(1, Classification::TimedOut).unwrap();
        log.record_false_positive(FalsePositiveRecord {
            time_since_start: 1.25,
            time_since_last_onset: 0.5,
        });

        let mut sinks = LogSinks::in_memory();
        let info = RunInfo {
            stimulus_label: "Dot".to_string(),
            canvas_label: "Hemisphere".to_string(),
            response_time_limit: 1.5,
        };
        let thresholds = [ThresholdEntry {
            position: origin,
            threshold: 1.0,
        }];
        log.flush(&mut sinks, 9.5, &info, &thresholds).unwrap();

        let results = String::from_utf8(sinks.results).unwrap();
        assert_eq!(results, "9.5\n1,(0, 0, 0),False,0,0,False\n");
        assert_eq!(String::from_utf8(sinks.false_positives).unwrap(), "1.25\n");
        assert_eq!(
            String::from_utf8(sinks.run_info).unwrap(),
            "Dot, Hemisphere, 1.5\n"
        );
        let snapshot: Vec<ThresholdEntry> = serde_json::from_slice(&sinks.thresholds).unwrap();
        assert_eq!(snapshot, thresholds);

        let (completion, trials) = read_results(results.as_bytes()).unwrap();
        assert_eq!(completion, 9.5);
        assert_eq!(trials.len(), 1);
        assert!(!trials[0].responded);
    }

    #[test]
    fn unwritable_directory_reports_sink_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        assert!(matches!(
            LogSinks::open(&missing),
            Err(PerimetryError::SinkUnavailable { .. })
        ));
    }
}
