//! Checkpoint-by-checkpoint comparison of two evaluation summaries

use std::fmt;
use std::path::Path;

use crate::error::{Error, Result};
use crate::evaluation::AggregateStats;

#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointComparison {
    pub index: usize,
    pub reference_mean: f64,
    pub candidate_mean: f64,
    /// `|candidate - reference|` in units of the larger std
    pub deviation: f64,
    pub within_tolerance: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub checkpoints: Vec<CheckpointComparison>,
    /// Checkpoints present on only one side
    pub unmatched: usize,
    pub tolerance: f64,
}

impl Comparison {
    pub fn matched(&self) -> usize {
        self.checkpoints.iter().filter(|c| c.within_tolerance).count()
    }

    pub fn is_match(&self) -> bool {
        self.unmatched == 0 && self.checkpoints.iter().all(|c| c.within_tolerance)
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in &self.checkpoints {
            writeln!(
                f,
                "{:>4}  {:>12.3}  {:>12.3}  {:>8.3}  {}",
                c.index,
                c.reference_mean,
                c.candidate_mean,
                c.deviation,
                if c.within_tolerance { "ok" } else { "DIFF" }
            )?;
        }
        write!(
            f,
            "{}/{} checkpoints within {} std, {} unmatched",
            self.matched(),
            self.checkpoints.len(),
            self.tolerance,
            self.unmatched
        )
    }
}

/// Pair checkpoints by index; a pair matches when the means differ by at most
/// `tolerance` times the larger of the two stds
pub fn compare(
    reference: &AggregateStats,
    candidate: &AggregateStats,
    tolerance: f64,
) -> Result<Comparison> {
    check_shape("reference", reference)?;
    check_shape("candidate", candidate)?;
    if tolerance.is_nan() || tolerance < 0.0 {
        return Err(Error::config(format!("tolerance must be non-negative, got {tolerance}")));
    }

    let checkpoints = reference
        .means
        .iter()
        .zip(&reference.stds)
        .zip(candidate.means.iter().zip(&candidate.stds))
        .enumerate()
        .map(|(index, ((&ref_mean, &ref_std), (&cand_mean, &cand_std)))| {
            let diff = (cand_mean - ref_mean).abs();
            let scale = ref_std.max(cand_std);
            let (deviation, within_tolerance) = if scale > 0.0 {
                (diff / scale, diff <= tolerance * scale)
            } else {
                (if diff == 0.0 { 0.0 } else { f64::INFINITY }, diff == 0.0)
            };
            CheckpointComparison {
                index,
                reference_mean: ref_mean,
                candidate_mean: cand_mean,
                deviation,
                within_tolerance,
            }
        })
        .collect::<Vec<_>>();

    Ok(Comparison {
        unmatched: reference.len().abs_diff(candidate.len()),
        checkpoints,
        tolerance,
    })
}

fn check_shape(side: &str, stats: &AggregateStats) -> Result<()> {
    if stats.means.len() != stats.stds.len() {
        return Err(Error::config(format!(
            "{side} has {} means but {} stds",
            stats.means.len(),
            stats.stds.len()
        )));
    }
    Ok(())
}

/// Read an `AggregateStats` document written with [`save_stats`]
pub fn load_stats(path: &Path) -> Result<AggregateStats> {
    let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&text).map_err(|e| Error::ConfigParse {
        path: Some(path.to_path_buf()),
        message: e.to_string(),
    })
}

pub fn save_stats(stats: &AggregateStats, path: &Path) -> Result<()> {
    let text = serde_yaml::to_string(stats).map_err(|e| Error::parse(e.to_string()))?;
    std::fs::write(path, text).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}
