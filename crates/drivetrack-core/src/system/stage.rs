//! # Stage Progression
//!
//! The fixed, totally ordered pipeline every drive moves through:
//!
//! ```text
//! group-formation -> mentor-allotment -> synopsis -> checkpoints -> result -> completed
//!       <-----------------<-----------------<-----------<-----------<
//!                          (regress, one step at a time)
//! ```
//!
//! ## Readiness
//!
//! | Stage | Ready when |
//! |-------|------------|
//! | group-formation | grouped students >= participating students |
//! | mentor-allotment | no group lacks a mentor |
//! | synopsis | approved synopses == total groups |
//! | checkpoints, result | always (administrative decision) |
//!
//! `progress` honours readiness unless forced; `regress` is never gated.
//! The status patches of the two directions are not inverses of each other;
//! see [`StageMachine::regress`] for the reset table.

use crate::{
    Drive, Group, GroupId, StageConfig, StageStatus, StudentId, Synopsis, SynopsisStatus,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// =============================================================================
// STAGE ENUM
// =============================================================================

/// Pipeline stages of a drive, in order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    #[default]
    GroupFormation,
    MentorAllotment,
    Synopsis,
    Checkpoints,
    Result,
    Completed,
}

impl Stage {
    /// Every stage in pipeline order.
    pub const ALL: [Stage; 6] = [
        Stage::GroupFormation,
        Stage::MentorAllotment,
        Stage::Synopsis,
        Stage::Checkpoints,
        Stage::Result,
        Stage::Completed,
    ];

    /// Wire name of the stage.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::GroupFormation => "group-formation",
            Stage::MentorAllotment => "mentor-allotment",
            Stage::Synopsis => "synopsis",
            Stage::Checkpoints => "checkpoints",
            Stage::Result => "result",
            Stage::Completed => "completed",
        }
    }

    /// Human-readable stage name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Stage::GroupFormation => "Group Formation",
            Stage::MentorAllotment => "Mentor Allotment",
            Stage::Synopsis => "Synopsis",
            Stage::Checkpoints => "Checkpoints",
            Stage::Result => "Results",
            Stage::Completed => "Completed",
        }
    }

    /// Position in the pipeline, starting at 0.
    #[must_use]
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Get the next stage, if any.
    #[must_use]
    pub fn next(&self) -> Option<Stage> {
        Self::ALL.get(self.index().saturating_add(1)).copied()
    }

    /// Get the previous stage, if any.
    #[must_use]
    pub fn previous(&self) -> Option<Stage> {
        self.index()
            .checked_sub(1)
            .and_then(|i| Self::ALL.get(i).copied())
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| format!("unknown stage '{}'", s))
    }
}

// =============================================================================
// READINESS METRICS
// =============================================================================

/// Aggregate counts used by the readiness predicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessMetrics {
    /// Participating students of the drive.
    pub total_students: usize,
    /// Distinct students that lead or belong to a group (rejected members excluded).
    pub grouped_students: usize,
    pub total_groups: usize,
    pub groups_without_mentor: usize,
    /// Groups of the drive with an approved synopsis.
    pub approved_synopses: usize,
}

impl ReadinessMetrics {
    /// Compute metrics from a snapshot of a drive's records.
    ///
    /// Groups and synopses of other drives are ignored. A group counts once
    /// towards `approved_synopses` however many approved records it holds.
    #[must_use]
    pub fn collect(drive: &Drive, groups: &[Group], synopses: &[Synopsis]) -> Self {
        let groups: Vec<&Group> = groups.iter().filter(|g| g.drive == drive.id).collect();

        let grouped: BTreeSet<&StudentId> = groups.iter().flat_map(|g| g.students()).collect();
        let group_ids: BTreeSet<&GroupId> = groups.iter().map(|g| &g.id).collect();

        Self {
            total_students: drive.participating_students.len(),
            grouped_students: grouped.len(),
            total_groups: groups.len(),
            groups_without_mentor: groups.iter().filter(|g| !g.is_assigned()).count(),
            approved_synopses: synopses
                .iter()
                .filter(|s| s.drive == drive.id && s.status == SynopsisStatus::Approved)
                .filter(|s| group_ids.contains(&s.group))
                .map(|s| &s.group)
                .collect::<BTreeSet<_>>()
                .len(),
        }
    }

    /// Participating students not yet in a group.
    #[must_use]
    pub fn ungrouped_students(&self) -> usize {
        self.total_students.saturating_sub(self.grouped_students)
    }
}

/// Outcome of a readiness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    NotReady(String),
}

impl Readiness {
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready)
    }
}

// =============================================================================
// STATUS PATCHES
// =============================================================================

/// What a transition does to the checkpoint sub-stage list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CheckpointPatch {
    #[default]
    Unchanged,
    /// First checkpoint becomes active; the others are untouched.
    ActivateFirst,
    CompleteAll,
    ResetAll,
}

/// Status changes of one transition, applied together with the stage change.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagePatch {
    /// Single-stage entries to set. Missing entries are skipped on apply.
    pub entries: Vec<(Stage, StageStatus)>,
    pub checkpoints: CheckpointPatch,
}

impl StagePatch {
    fn set(mut self, stage: Stage, status: StageStatus) -> Self {
        self.entries.push((stage, status));
        self
    }

    fn checkpoints(mut self, patch: CheckpointPatch) -> Self {
        self.checkpoints = patch;
        self
    }

    /// Apply the patch to a stage configuration.
    pub fn apply(&self, config: &mut StageConfig) {
        for (stage, status) in &self.entries {
            if let Some(entry) = config.entry_mut(*stage) {
                entry.status = *status;
            }
        }

        match self.checkpoints {
            CheckpointPatch::Unchanged => {}
            CheckpointPatch::ActivateFirst => {
                if let Some(first) = config.checkpoints.first_mut() {
                    first.status = StageStatus::Active;
                }
            }
            CheckpointPatch::CompleteAll => {
                for checkpoint in &mut config.checkpoints {
                    checkpoint.status = StageStatus::Completed;
                }
            }
            CheckpointPatch::ResetAll => {
                for checkpoint in &mut config.checkpoints {
                    checkpoint.status = StageStatus::NotStarted;
                }
            }
        }
    }
}

// =============================================================================
// TRANSITIONS
// =============================================================================

/// Result of a progress or regress request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The drive moved exactly one stage.
    Moved {
        previous: Stage,
        current: Stage,
        patch: StagePatch,
    },
    /// Nothing changed.
    Blocked { stage: Stage, reason: String },
}

impl Transition {
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        matches!(self, Transition::Blocked { .. })
    }
}

/// Summary of where a drive stands in the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageReport {
    pub current: Stage,
    pub next: Option<Stage>,
    pub ready: bool,
    pub reason: Option<String>,
    pub metrics: ReadinessMetrics,
}

// =============================================================================
// STAGE MACHINE
// =============================================================================

/// Stage Machine - pure transition logic over a drive snapshot.
pub struct StageMachine;

impl StageMachine {
    /// Evaluate the exit criteria of `stage`.
    #[must_use]
    pub fn readiness(stage: Stage, metrics: &ReadinessMetrics) -> Readiness {
        match stage {
            Stage::GroupFormation => {
                if metrics.grouped_students >= metrics.total_students {
                    Readiness::Ready
                } else {
                    Readiness::NotReady(format!(
                        "Not all students are grouped ({} of {} grouped)",
                        metrics.grouped_students, metrics.total_students
                    ))
                }
            }
            Stage::MentorAllotment => {
                if metrics.groups_without_mentor == 0 {
                    Readiness::Ready
                } else {
                    Readiness::NotReady(format!(
                        "{} group(s) still have no assigned mentor",
                        metrics.groups_without_mentor
                    ))
                }
            }
            Stage::Synopsis => {
                if metrics.approved_synopses == metrics.total_groups {
                    Readiness::Ready
                } else {
                    Readiness::NotReady(format!(
                        "Only {} of {} synopses are approved",
                        metrics.approved_synopses, metrics.total_groups
                    ))
                }
            }
            Stage::Checkpoints | Stage::Result => Readiness::Ready,
            Stage::Completed => Readiness::NotReady("Drive is already completed".to_string()),
        }
    }

    /// Move forward one stage, gated by readiness unless `force` is set.
    #[must_use]
    pub fn progress(drive: &Drive, metrics: &ReadinessMetrics, force: bool) -> Transition {
        let current = drive.current_stage;
        let Some(next) = current.next() else {
            return Transition::Blocked {
                stage: current,
                reason: "Drive is already completed".to_string(),
            };
        };

        if !force {
            if let Readiness::NotReady(reason) = Self::readiness(current, metrics) {
                return Transition::Blocked {
                    stage: current,
                    reason,
                };
            }
        }

        let mut patch = StagePatch::default()
            .set(current, StageStatus::Completed)
            .set(next, StageStatus::Active);
        if current == Stage::Checkpoints {
            patch = patch.checkpoints(CheckpointPatch::CompleteAll);
        } else if next == Stage::Checkpoints {
            patch = patch.checkpoints(CheckpointPatch::ActivateFirst);
        }

        Transition::Moved {
            previous: current,
            current: next,
            patch,
        }
    }

    /// Move back one stage. Never gated; blocked only at the first stage.
    ///
    /// | From -> To | Status patch |
    /// |---|---|
    /// | mentor-allotment -> group-formation | group formation active, mentor allotment not started |
    /// | synopsis -> mentor-allotment | mentor allotment active, synopsis not started, checkpoints reset |
    /// | checkpoints -> synopsis | synopsis active, checkpoints reset |
    /// | result -> checkpoints | result not started, first checkpoint active |
    /// | completed -> result | result active |
    ///
    /// Group and mentor data is never undone.
    #[must_use]
    pub fn regress(drive: &Drive) -> Transition {
        let current = drive.current_stage;
        let Some(previous) = current.previous() else {
            return Transition::Blocked {
                stage: current,
                reason: "Already at the first stage".to_string(),
            };
        };

        let patch = match current {
            Stage::MentorAllotment => StagePatch::default()
                .set(Stage::GroupFormation, StageStatus::Active)
                .set(Stage::MentorAllotment, StageStatus::NotStarted),
            Stage::Synopsis => StagePatch::default()
                .set(Stage::MentorAllotment, StageStatus::Active)
                .set(Stage::Synopsis, StageStatus::NotStarted)
                .checkpoints(CheckpointPatch::ResetAll),
            Stage::Checkpoints => StagePatch::default()
                .set(Stage::Synopsis, StageStatus::Active)
                .checkpoints(CheckpointPatch::ResetAll),
            Stage::Result => StagePatch::default()
                .set(Stage::Result, StageStatus::NotStarted)
                .checkpoints(CheckpointPatch::ActivateFirst),
            Stage::Completed => StagePatch::default().set(Stage::Result, StageStatus::Active),
            Stage::GroupFormation => StagePatch::default(),
        };

        Transition::Moved {
            previous: current,
            current: previous,
            patch,
        }
    }

    /// Apply a transition to an in-memory drive. Returns false when blocked.
    pub fn apply(drive: &mut Drive, transition: &Transition) -> bool {
        match transition {
            Transition::Moved { current, patch, .. } => {
                drive.current_stage = *current;
                patch.apply(&mut drive.stages);
                true
            }
            Transition::Blocked { .. } => false,
        }
    }

    /// Rewrite every status so it agrees with `current_stage`: earlier stages
    /// completed, the current one active, later ones not started.
    pub fn realign(drive: &mut Drive) {
        let current = drive.current_stage;
        for stage in Stage::ALL {
            let status = match stage.cmp(&current) {
                std::cmp::Ordering::Less => StageStatus::Completed,
                std::cmp::Ordering::Equal => StageStatus::Active,
                std::cmp::Ordering::Greater => StageStatus::NotStarted,
            };
            if let Some(entry) = drive.stages.entry_mut(stage) {
                entry.status = status;
            }
        }

        match current.cmp(&Stage::Checkpoints) {
            std::cmp::Ordering::Less => {
                for checkpoint in &mut drive.stages.checkpoints {
                    checkpoint.status = StageStatus::NotStarted;
                }
            }
            std::cmp::Ordering::Greater => {
                for checkpoint in &mut drive.stages.checkpoints {
                    checkpoint.status = StageStatus::Completed;
                }
            }
            std::cmp::Ordering::Equal => {
                let any_active = drive
                    .stages
                    .checkpoints
                    .iter()
                    .any(|c| c.status == StageStatus::Active);
                if !any_active {
                    if let Some(first_open) = drive
                        .stages
                        .checkpoints
                        .iter_mut()
                        .find(|c| c.status != StageStatus::Completed)
                    {
                        first_open.status = StageStatus::Active;
                    }
                }
            }
        }
    }

    /// Describe the drive's position and whether it may progress.
    #[must_use]
    pub fn report(drive: &Drive, metrics: ReadinessMetrics) -> StageReport {
        let readiness = Self::readiness(drive.current_stage, &metrics);
        let (ready, reason) = match readiness {
            Readiness::Ready => (true, None),
            Readiness::NotReady(reason) => (false, Some(reason)),
        };
        StageReport {
            current: drive.current_stage,
            next: drive.current_stage.next(),
            ready,
            reason,
            metrics,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
