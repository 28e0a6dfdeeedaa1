//! Conflict detection and resolution.
//!
//! Two versions derived from a common ancestor conflict where the lines each
//! of them edited overlap. Edited lines are located by diffing the ancestor
//! against each version, and overlap is judged on ancestor line numbers so
//! that earlier insertions or deletions on one side do not shift the other.
//! Replaced and deleted lines occupy their ancestor span. Inserted lines
//! occupy the ancestor lines they were inserted in front of, one per line.
//! Reported ranges are in the current version's line numbers.

use crate::callback::{ConfirmationChoice, ConfirmationHandler};
use crate::error::{GuardianError, GuardianResult};
use serde::{Deserialize, Serialize};
use tracing::debug;
use vguard_snapshot::{DiffEngine, Hunk};

/// Confidence given to the heuristic for pure insertions.
const INSERTION_CONFIDENCE: f64 = 0.5;

/// What kind of edits collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictKind {
    /// Lines rewritten in place on both sides.
    Content,
    /// Lines inserted or removed on both sides.
    Structural,
    /// A mix of in-place and structural edits.
    Both,
}

/// An overlapping edited region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    /// First line of the region, 1-based.
    pub start_line: usize,
    /// Last line of the region, inclusive.
    pub end_line: usize,
    /// The current version's text for the region.
    pub current: String,
    /// The incoming version's text for the region.
    pub incoming: String,
    pub kind: ConflictKind,
    /// Both sides only added lines; nothing from the ancestor was touched.
    pub insertion_only: bool,
}

impl Conflict {
    /// Conflict-marker rendering of both sides.
    pub fn markers(&self) -> String {
        format!(
            "<<<<<<< current\n{}=======\n{}>>>>>>> incoming\n",
            with_trailing_newline(&self.current),
            with_trailing_newline(&self.incoming)
        )
    }
}

/// An externally suggested resolution, scored by its producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionHint {
    pub text: String,
    pub confidence: f64,
}

impl SuggestionHint {
    pub fn new(text: impl Into<String>, confidence: f64) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// A proposed resolution of a file's conflicts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictResolution {
    pub path: String,
    pub conflicts: Vec<Conflict>,
    pub suggested_resolution: String,
    /// In `[0, 1]`.
    pub confidence: f64,
    /// Settled by the confirmation handler rather than automatically.
    #[serde(default)]
    pub confirmed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Current,
    Incoming,
}

/// One side's edit, placed on the ancestor's 1-based lines.
#[derive(Debug, Clone, Copy)]
struct Touched {
    side: Side,
    start: usize,
    end: usize,
    hunk: Hunk,
}

impl Touched {
    fn is(&self, side: Side) -> bool {
        self.side == side
    }

    /// How many lines this edit shifts everything after it by.
    fn shift(&self) -> isize {
        self.hunk.new_len as isize - self.hunk.old_len as isize
    }
}

/// Detects and resolves conflicting edits.
#[derive(Debug, Clone, Copy)]
pub struct ConflictResolver {
    threshold: f64,
}

impl ConflictResolver {
    /// A resolver that accepts resolutions at or above `threshold`.
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: clamp_confidence(threshold),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Find the regions where `current` and `incoming` both edited `ancestor`.
    ///
    /// Edits to disjoint line ranges never conflict, even when adjacent.
    pub fn detect(&self, ancestor: &str, current: &str, incoming: &str) -> Vec<Conflict> {
        let ours: Vec<Touched> = touched_ranges(Side::Current, ancestor, current).collect();
        let mut touched: Vec<Touched> = ours
            .iter()
            .copied()
            .chain(touched_ranges(Side::Incoming, ancestor, incoming))
            .collect();
        touched.sort_by_key(|t| (t.start, t.end));

        let lines = Lines {
            current: current.lines().collect(),
            incoming: incoming.lines().collect(),
        };

        let mut conflicts = Vec::new();
        let mut cluster: Vec<Touched> = Vec::new();
        let mut cluster_end = 0;

        for range in touched {
            if !cluster.is_empty() && range.start > cluster_end {
                conflicts.extend(build_conflict(&cluster, &ours, &lines));
                cluster.clear();
            }
            cluster_end = if cluster.is_empty() {
                range.end
            } else {
                cluster_end.max(range.end)
            };
            cluster.push(range);
        }
        conflicts.extend(build_conflict(&cluster, &ours, &lines));

        debug!(conflicts = conflicts.len(), "Detected conflicts");
        conflicts
    }

    /// Propose a resolution.
    ///
    /// A hint is attached as-is with its own confidence. Without one, pure
    /// insertions take the incoming text at a confidence below the default
    /// threshold, and every other conflict is left as conflict markers with
    /// confidence 0.
    pub fn resolve(
        &self,
        path: &str,
        conflicts: Vec<Conflict>,
        hint: Option<SuggestionHint>,
    ) -> ConflictResolution {
        if let Some(hint) = hint {
            return ConflictResolution {
                path: path.to_string(),
                conflicts,
                suggested_resolution: hint.text,
                confidence: clamp_confidence(hint.confidence),
                confirmed: false,
            };
        }

        let mut confidence: f64 = 1.0;
        let mut suggested = String::new();
        for conflict in &conflicts {
            if conflict.insertion_only {
                suggested.push_str(&with_trailing_newline(&conflict.incoming));
                confidence = confidence.min(INSERTION_CONFIDENCE);
            } else {
                suggested.push_str(&conflict.markers());
                confidence = 0.0;
            }
        }

        ConflictResolution {
            path: path.to_string(),
            conflicts,
            suggested_resolution: suggested,
            confidence,
            confirmed: false,
        }
    }

    /// Whether a resolution can be applied without asking anyone.
    pub fn is_confident(&self, resolution: &ConflictResolution) -> bool {
        resolution.confidence >= self.threshold
    }

    /// Settle a low-confidence resolution with the host's handler.
    ///
    /// Confident resolutions are returned unchanged. Without a handler, or
    /// when the handler skips any conflict, the still-open conflicts are
    /// returned as [`GuardianError::ConflictUnresolved`].
    pub fn confirm(
        &self,
        resolution: ConflictResolution,
        handler: Option<&dyn ConfirmationHandler>,
    ) -> GuardianResult<ConflictResolution> {
        if self.is_confident(&resolution) {
            return Ok(resolution);
        }

        let Some(handler) = handler else {
            return Err(GuardianError::ConflictUnresolved {
                path: resolution.path,
                conflicts: resolution.conflicts,
            });
        };

        let mut text = String::new();
        let mut skipped = Vec::new();
        for conflict in &resolution.conflicts {
            match handler.confirm(&resolution.path, conflict) {
                ConfirmationChoice::KeepCurrent => {
                    text.push_str(&with_trailing_newline(&conflict.current))
                }
                ConfirmationChoice::TakeIncoming => {
                    text.push_str(&with_trailing_newline(&conflict.incoming))
                }
                ConfirmationChoice::Custom(custom) => {
                    text.push_str(&with_trailing_newline(&custom))
                }
                ConfirmationChoice::Skip => skipped.push(conflict.clone()),
            }
        }

        if !skipped.is_empty() {
            return Err(GuardianError::ConflictUnresolved {
                path: resolution.path,
                conflicts: skipped,
            });
        }

        Ok(ConflictResolution {
            suggested_resolution: text,
            confidence: 1.0,
            confirmed: true,
            ..resolution
        })
    }
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_CONFLICT_THRESHOLD)
    }
}

/// Inclusive ancestor ranges each hunk touches.
fn touched_ranges(side: Side, ancestor: &str, edited: &str) -> impl Iterator<Item = Touched> {
    DiffEngine::hunks(ancestor, edited)
        .into_iter()
        .map(move |hunk| {
            let start = hunk.old_start + 1;
            let len = if hunk.is_insertion() {
                hunk.new_len
            } else {
                hunk.old_len
            };
            Touched {
                side,
                start,
                end: hunk.old_start + len,
                hunk,
            }
        })
}

struct Lines<'a> {
    current: Vec<&'a str>,
    incoming: Vec<&'a str>,
}

fn build_conflict(cluster: &[Touched], ours: &[Touched], lines: &Lines<'_>) -> Option<Conflict> {
    let first = cluster
        .iter()
        .filter(|t| t.is(Side::Current))
        .min_by_key(|t| t.hunk.new_start)?;
    let last = cluster
        .iter()
        .filter(|t| t.is(Side::Current))
        .max_by_key(|t| (t.hunk.new_start, t.hunk.new_len))?;
    if !cluster.iter().any(|t| t.is(Side::Incoming)) {
        return None;
    }

    let (start_line, end_line) = current_range(cluster, ours, first, last)?;

    let all_content = cluster.iter().all(|t| t.hunk.old_len == t.hunk.new_len);
    let all_structural = cluster.iter().all(|t| t.hunk.old_len != t.hunk.new_len);
    let kind = match (all_content, all_structural) {
        (true, _) => ConflictKind::Content,
        (_, true) => ConflictKind::Structural,
        _ => ConflictKind::Both,
    };

    Some(Conflict {
        start_line,
        end_line,
        current: side_text(cluster, Side::Current, &lines.current),
        incoming: side_text(cluster, Side::Incoming, &lines.incoming),
        kind,
        insertion_only: cluster.iter().all(|t| t.hunk.is_insertion()),
    })
}

/// The cluster's extent in the current version's line numbers.
///
/// Ancestor lines outside the current side's own edits are unchanged in the
/// current version, so they map across by the shift of the edits before them.
fn current_range(
    cluster: &[Touched],
    ours: &[Touched],
    first: &Touched,
    last: &Touched,
) -> Option<(usize, usize)> {
    let cluster_start = cluster.iter().map(|t| t.start).min()?;
    let cluster_end = cluster.iter().map(|t| t.end).max()?;
    let own_start = cluster.iter().filter(|t| t.is(Side::Current)).map(|t| t.start).min()?;
    let own_end = cluster.iter().filter(|t| t.is(Side::Current)).map(|t| t.end).max()?;

    let shift_before: isize = ours
        .iter()
        .filter(|t| t.end < cluster_start)
        .map(Touched::shift)
        .sum();
    let shift_within: isize = cluster
        .iter()
        .filter(|t| t.is(Side::Current))
        .map(Touched::shift)
        .sum();
    let map = |line: usize, shift: isize| (line as isize + shift).max(1) as usize;

    let start = if cluster_start < own_start {
        map(cluster_start, shift_before)
    } else {
        first.hunk.new_start + 1
    };
    let end = if cluster_end > own_end {
        map(cluster_end, shift_before + shift_within)
    } else {
        last.hunk.new_start + last.hunk.new_len
    };
    Some((start, end.max(start)))
}

/// The lines one side wrote within the cluster.
fn side_text(cluster: &[Touched], side: Side, lines: &[&str]) -> String {
    let mut text = String::new();
    for touched in cluster.iter().filter(|t| t.is(side)) {
        let hunk = touched.hunk;
        for line in lines.iter().skip(hunk.new_start).take(hunk.new_len) {
            text.push_str(line);
            text.push('\n');
        }
    }
    text
}

fn with_trailing_newline(text: &str) -> String {
    if text.is_empty() || text.ends_with('\n') {
        text.to_string()
    } else {
        format!("{text}\n")
    }
}

fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}
