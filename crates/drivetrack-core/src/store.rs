//! # Record Store
//!
//! The collaborator interface the workflows read and write through, plus the
//! in-memory implementation.
//!
//! All fallible operations return `Result<T, TrackError>` so in-memory and
//! persistent backends behave uniformly. Listings are returned in ascending
//! id order.
//!
//! ## Conditional writes
//!
//! `assign_if_capacity` and `save_drive_stage` re-check their precondition
//! against the stored state in the same write that applies the change. A
//! capacity ledger or drive snapshot taken earlier can go stale; these two
//! calls are where that is caught.

use crate::allotment::AllotmentEngine;
use crate::system::{Stage, StagePatch};
use crate::{
    Drive, DriveId, Group, GroupId, MentorAssignment, MentorId, Submission, SubmissionId, Synopsis,
    SynopsisId, TrackError,
};
use std::collections::BTreeMap;

// =============================================================================
// DRIVESTORE TRAIT
// =============================================================================

pub trait DriveStore {
    fn get_drive(&self, id: &DriveId) -> Result<Option<Drive>, TrackError>;

    /// Insert or replace a drive.
    fn put_drive(&mut self, drive: Drive) -> Result<(), TrackError>;

    fn list_drives(&self) -> Result<Vec<Drive>, TrackError>;

    fn get_group(&self, id: &GroupId) -> Result<Option<Group>, TrackError>;

    /// Insert or replace a group.
    fn put_group(&mut self, group: Group) -> Result<(), TrackError>;

    /// All groups of a drive.
    fn list_groups(&self, drive: &DriveId) -> Result<Vec<Group>, TrackError>;

    /// Insert or replace a synopsis.
    fn put_synopsis(&mut self, synopsis: Synopsis) -> Result<(), TrackError>;

    /// All synopses of a drive.
    fn list_synopses(&self, drive: &DriveId) -> Result<Vec<Synopsis>, TrackError>;

    /// Insert or replace a submission.
    fn put_submission(&mut self, submission: Submission) -> Result<(), TrackError>;

    /// All submissions of a drive.
    fn list_submissions(&self, drive: &DriveId) -> Result<Vec<Submission>, TrackError>;

    /// Assign a mentor to a group if the mentor still has capacity.
    ///
    /// Counts the mentor's other groups in the drive and writes the assignment
    /// as one atomic step. Returns the updated group.
    fn assign_if_capacity(
        &mut self,
        group: &GroupId,
        assignment: MentorAssignment,
    ) -> Result<Group, TrackError>;

    /// Remove a group's mentor. Returns the updated group.
    fn clear_group_assignment(&mut self, group: &GroupId) -> Result<Group, TrackError>;

    /// Move a drive from `expected` to `stage` and apply `patch`.
    ///
    /// Fails with `Conflict` if the stored stage is no longer `expected`.
    fn save_drive_stage(
        &mut self,
        drive: &DriveId,
        expected: Stage,
        stage: Stage,
        patch: &StagePatch,
    ) -> Result<Drive, TrackError>;

    // -------------------------------------------------------------------------
    // Provided helpers
    // -------------------------------------------------------------------------

    /// Get a drive or fail with `DriveNotFound`.
    fn require_drive(&self, id: &DriveId) -> Result<Drive, TrackError> {
        self.get_drive(id)?
            .ok_or_else(|| TrackError::DriveNotFound(id.clone()))
    }

    /// Get a group or fail with `GroupNotFound`.
    fn require_group(&self, id: &GroupId) -> Result<Group, TrackError> {
        self.get_group(id)?
            .ok_or_else(|| TrackError::GroupNotFound(id.clone()))
    }

    /// Groups of a drive without a mentor.
    fn list_unassigned_groups(&self, drive: &DriveId) -> Result<Vec<Group>, TrackError> {
        Ok(self
            .list_groups(drive)?
            .into_iter()
            .filter(|g| !g.is_assigned())
            .collect())
    }

    fn count_assigned_groups_for_mentor(
        &self,
        drive: &DriveId,
        mentor: &MentorId,
    ) -> Result<usize, TrackError> {
        Ok(self
            .list_groups(drive)?
            .iter()
            .filter(|g| g.assigned_mentor() == Some(mentor))
            .count())
    }

    /// Number of groups held by every mentor that holds at least one.
    fn assigned_counts(&self, drive: &DriveId) -> Result<BTreeMap<MentorId, usize>, TrackError> {
        Ok(count_by_mentor(&self.list_groups(drive)?))
    }
}

/// Tally groups per assigned mentor.
#[must_use]
pub fn count_by_mentor(groups: &[Group]) -> BTreeMap<MentorId, usize> {
    let mut counts = BTreeMap::new();
    for mentor in groups.iter().filter_map(|g| g.assigned_mentor()) {
        let slot = counts.entry(mentor.clone()).or_insert(0usize);
        *slot = slot.saturating_add(1);
    }
    counts
}

/// Number of groups in `groups`, other than `group`, assigned to `mentor`.
#[must_use]
pub fn held_by_others(groups: &[Group], group: &GroupId, mentor: &MentorId) -> usize {
    groups
        .iter()
        .filter(|g| &g.id != group && g.assigned_mentor() == Some(mentor))
        .count()
}

// =============================================================================
// MEMORY STORE
// =============================================================================

/// In-memory store. Uses `BTreeMap` exclusively for deterministic ordering.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    drives: BTreeMap<DriveId, Drive>,
    groups: BTreeMap<GroupId, Group>,
    synopses: BTreeMap<SynopsisId, Synopsis>,
    submissions: BTreeMap<SubmissionId, Submission>,
}

impl MemoryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DriveStore for MemoryStore {
    fn get_drive(&self, id: &DriveId) -> Result<Option<Drive>, TrackError> {
        Ok(self.drives.get(id).cloned())
    }

    fn put_drive(&mut self, drive: Drive) -> Result<(), TrackError> {
        self.drives.insert(drive.id.clone(), drive);
        Ok(())
    }

    fn list_drives(&self) -> Result<Vec<Drive>, TrackError> {
        Ok(self.drives.values().cloned().collect())
    }

    fn get_group(&self, id: &GroupId) -> Result<Option<Group>, TrackError> {
        Ok(self.groups.get(id).cloned())
    }

    fn put_group(&mut self, group: Group) -> Result<(), TrackError> {
        self.groups.insert(group.id.clone(), group);
        Ok(())
    }

    fn list_groups(&self, drive: &DriveId) -> Result<Vec<Group>, TrackError> {
        Ok(self
            .groups
            .values()
            .filter(|g| &g.drive == drive)
            .cloned()
            .collect())
    }

    fn put_synopsis(&mut self, synopsis: Synopsis) -> Result<(), TrackError> {
        self.synopses.insert(synopsis.id.clone(), synopsis);
        Ok(())
    }

    fn list_synopses(&self, drive: &DriveId) -> Result<Vec<Synopsis>, TrackError> {
        Ok(self
            .synopses
            .values()
            .filter(|s| &s.drive == drive)
            .cloned()
            .collect())
    }

    fn put_submission(&mut self, submission: Submission) -> Result<(), TrackError> {
        self.submissions.insert(submission.id.clone(), submission);
        Ok(())
    }

    fn list_submissions(&self, drive: &DriveId) -> Result<Vec<Submission>, TrackError> {
        Ok(self
            .submissions
            .values()
            .filter(|s| &s.drive == drive)
            .cloned()
            .collect())
    }

    fn assign_if_capacity(
        &mut self,
        group: &GroupId,
        assignment: MentorAssignment,
    ) -> Result<Group, TrackError> {
        let mut target = self.require_group(group)?;
        let drive = self.require_drive(&target.drive)?;
        let held = held_by_others(&self.list_groups(&drive.id)?, group, &assignment.mentor);

        AllotmentEngine::assign_one(&drive, &mut target, assignment, held)?;
        self.groups.insert(target.id.clone(), target.clone());
        Ok(target)
    }

    fn clear_group_assignment(&mut self, group: &GroupId) -> Result<Group, TrackError> {
        let mut target = self.require_group(group)?;
        AllotmentEngine::unassign(&mut target)?;
        self.groups.insert(target.id.clone(), target.clone());
        Ok(target)
    }

    fn save_drive_stage(
        &mut self,
        drive: &DriveId,
        expected: Stage,
        stage: Stage,
        patch: &StagePatch,
    ) -> Result<Drive, TrackError> {
        let target = self
            .drives
            .get_mut(drive)
            .ok_or_else(|| TrackError::DriveNotFound(drive.clone()))?;
        if target.current_stage != expected {
            return Err(TrackError::Conflict(format!(
                "drive {} is at {}, expected {}",
                drive, target.current_stage, expected
            )));
        }
        target.current_stage = stage;
        patch.apply(&mut target.stages);
        Ok(target.clone())
    }
}

// =============================================================================
// TESTS
// =============================================================================
