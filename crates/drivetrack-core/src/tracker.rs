//! # Tracker
//!
//! The workflows of the system, and the session object that runs them
//! against a storage backend.
//!
//! Every workflow is a free function over `&mut S where S: DriveStore`, so it
//! can be driven by any store. `Tracker` owns one backend and forwards to
//! them. Time is an explicit argument; nothing here reads the clock.
//!
//! ## Storage Backends
//!
//! - `InMemory`: `MemoryStore` (fast, volatile)
//! - `Persistent`: `RedbStore` (disk-backed, ACID)

use crate::allotment::{AllotmentEngine, FailedAllotment, MentorCapacityLedger, PlannedAssignment};
use crate::formats::Snapshot;
use crate::grouping::{check_new_group, plan_auto_groups, rank_preferences};
use crate::storage::RedbStore;
use crate::store::{DriveStore, MemoryStore};
use crate::system::{ReadinessMetrics, StageMachine, StageReport, Transition};
use crate::{
    Drive, DriveId, Group, GroupId, GroupStatus, MentorAssignment, MentorId, Stage, StageConfig,
    StudentId, Submission, Synopsis, SynopsisStatus, Timestamp, TrackError, UserId,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

// =============================================================================
// REPORTS
// =============================================================================

/// Outcome of one bulk allotment run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllotmentReport {
    pub allotted: Vec<PlannedAssignment>,
    pub failed_groups: Vec<FailedAllotment>,
}

impl AllotmentReport {
    #[must_use]
    pub fn allotted_count(&self) -> usize {
        self.allotted.len()
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failed_groups.len()
    }

    #[must_use]
    pub fn message(&self) -> String {
        format!(
            "{} groups allotted mentors successfully (timestamp-based, first-come-first-served)",
            self.allotted_count()
        )
    }
}

/// A stage request and the drive as it stands afterwards.
///
/// A blocked transition leaves `drive` exactly as it was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageChange {
    pub transition: Transition,
    pub drive: Drive,
}

/// Auto-groups written by one `auto_group` run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoGroupReport {
    pub created: Vec<Group>,
    pub students_grouped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupCounts {
    pub total: usize,
    pub with_mentor: usize,
    pub active: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentCounts {
    pub total: usize,
    pub in_groups: usize,
    pub unregistered: usize,
}

/// Headline numbers of a drive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveStats {
    pub name: String,
    pub current_stage: Stage,
    pub groups: GroupCounts,
    pub students: StudentCounts,
}

/// Where a drive stands, with its stage annotations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveProgress {
    pub report: StageReport,
    pub stages: StageConfig,
}

/// Records written by a snapshot import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub drives: usize,
    pub groups: usize,
    pub synopses: usize,
    pub submissions: usize,
}

// =============================================================================
// ALLOTMENT WORKFLOWS
// =============================================================================

/// Allot mentors to every unassigned group of a drive.
///
/// Capacity is derived from the current assignments, the engine plans the
/// run, and each planned assignment is written through the store's
/// conditional write. An assignment the store rejects for capacity or a
/// vanished record is reported as failed; storage errors abort the run.
pub fn auto_allot<S: DriveStore + ?Sized>(
    store: &mut S,
    drive_id: &DriveId,
    admin: &UserId,
    now: Timestamp,
) -> Result<AllotmentReport, TrackError> {
    let drive = store.require_drive(drive_id)?;
    let ledger = MentorCapacityLedger::build(&drive, &store.assigned_counts(drive_id)?);
    let candidates = store.list_unassigned_groups(drive_id)?;

    let plan = AllotmentEngine::allot(&drive, ledger, &candidates)?;

    let mut report = AllotmentReport {
        allotted: Vec::with_capacity(plan.assigned_count()),
        failed_groups: plan.failed_groups,
    };

    for planned in plan.assignments {
        let assignment = MentorAssignment {
            mentor: planned.mentor.clone(),
            assigned_at: now,
            assigned_by: admin.clone(),
        };
        match store.assign_if_capacity(&planned.group_id, assignment) {
            Ok(_) => report.allotted.push(planned),
            Err(
                TrackError::CapacityExceeded { .. }
                | TrackError::MentorNotFound(_)
                | TrackError::GroupNotFound(_),
            ) => {
                let failed = candidates
                    .iter()
                    .find(|g| g.id == planned.group_id)
                    .map(FailedAllotment::for_group)
                    .unwrap_or_else(|| FailedAllotment {
                        group_id: planned.group_id.clone(),
                        group_name: planned.group_name.clone(),
                        preferences: Vec::new(),
                    });
                report.failed_groups.push(failed);
            }
            Err(e) => return Err(e),
        }
    }

    Ok(report)
}

/// Assign `mentor` to a group by hand.
///
/// The mentor's load is counted inside the store's write, never cached.
pub fn assign_mentor<S: DriveStore + ?Sized>(
    store: &mut S,
    group_id: &GroupId,
    mentor: &MentorId,
    admin: &UserId,
    now: Timestamp,
) -> Result<Group, TrackError> {
    let assignment = MentorAssignment {
        mentor: mentor.clone(),
        assigned_at: now,
        assigned_by: admin.clone(),
    };
    store.assign_if_capacity(group_id, assignment)
}

/// Remove the mentor of a group. Allowed in every drive stage.
pub fn unassign_mentor<S: DriveStore + ?Sized>(
    store: &mut S,
    group_id: &GroupId,
) -> Result<Group, TrackError> {
    store.clear_group_assignment(group_id)
}

// =============================================================================
// STAGE WORKFLOWS
// =============================================================================

/// Readiness metrics of a drive, read fresh from the store.
pub fn readiness_metrics<S: DriveStore + ?Sized>(
    store: &S,
    drive: &Drive,
) -> Result<ReadinessMetrics, TrackError> {
    let groups = store.list_groups(&drive.id)?;
    let synopses = store.list_synopses(&drive.id)?;
    Ok(ReadinessMetrics::collect(drive, &groups, &synopses))
}

/// Advance a drive one stage, gated on readiness unless `force` is set.
pub fn progress_stage<S: DriveStore + ?Sized>(
    store: &mut S,
    drive_id: &DriveId,
    force: bool,
) -> Result<StageChange, TrackError> {
    let drive = store.require_drive(drive_id)?;
    let metrics = readiness_metrics(&*store, &drive)?;
    let transition = StageMachine::progress(&drive, &metrics, force);
    commit_transition(store, drive, transition)
}

/// Move a drive one stage back. Never gated.
pub fn regress_stage<S: DriveStore + ?Sized>(
    store: &mut S,
    drive_id: &DriveId,
) -> Result<StageChange, TrackError> {
    let drive = store.require_drive(drive_id)?;
    let transition = StageMachine::regress(&drive);
    commit_transition(store, drive, transition)
}

fn commit_transition<S: DriveStore + ?Sized>(
    store: &mut S,
    drive: Drive,
    transition: Transition,
) -> Result<StageChange, TrackError> {
    let drive = match &transition {
        Transition::Moved {
            previous,
            current,
            patch,
        } => store.save_drive_stage(&drive.id, *previous, *current, patch)?,
        Transition::Blocked { .. } => drive,
    };
    Ok(StageChange { transition, drive })
}

pub fn drive_progress<S: DriveStore + ?Sized>(
    store: &S,
    drive_id: &DriveId,
) -> Result<DriveProgress, TrackError> {
    let drive = store.require_drive(drive_id)?;
    let metrics = readiness_metrics(store, &drive)?;
    Ok(DriveProgress {
        report: StageMachine::report(&drive, metrics),
        stages: drive.stages,
    })
}

// =============================================================================
// GROUP WORKFLOWS
// =============================================================================

/// Create a group after admission checks against its drive.
pub fn create_group<S: DriveStore + ?Sized>(
    store: &mut S,
    group: Group,
) -> Result<Group, TrackError> {
    let drive = store.require_drive(&group.drive)?;
    if store.get_group(&group.id)?.is_some() {
        return Err(TrackError::Conflict(format!("group {} already exists", group.id)));
    }
    let existing = store.list_groups(&drive.id)?;
    check_new_group(&drive, &existing, &group)?;
    store.put_group(group.clone())?;
    Ok(group)
}

/// Replace a group's mentor preferences with an ordered selection.
pub fn set_preferences<S: DriveStore + ?Sized>(
    store: &mut S,
    group_id: &GroupId,
    selection: &[MentorId],
) -> Result<Group, TrackError> {
    let mut group = store.require_group(group_id)?;
    let drive = store.require_drive(&group.drive)?;
    group.mentor_preferences = rank_preferences(&drive, &group, selection)?;
    store.put_group(group.clone())?;
    Ok(group)
}

/// Participating students of a drive that are in no group.
pub fn remaining_students<S: DriveStore + ?Sized>(
    store: &S,
    drive_id: &DriveId,
) -> Result<Vec<StudentId>, TrackError> {
    let drive = store.require_drive(drive_id)?;
    let groups = store.list_groups(drive_id)?;
    Ok(crate::grouping::remaining_students(&drive, &groups))
}

/// Pack every remaining student of a drive into auto-groups.
///
/// Existing groups are never replaced: an auto-group id held by a group of
/// another drive fails the run with `Conflict` before anything is written.
pub fn auto_group<S: DriveStore + ?Sized>(
    store: &mut S,
    drive_id: &DriveId,
    now: Timestamp,
) -> Result<AutoGroupReport, TrackError> {
    let drive = store.require_drive(drive_id)?;
    let groups = store.list_groups(drive_id)?;
    let plan = plan_auto_groups(&drive, &groups, now);

    for group in &plan.groups {
        if store.get_group(&group.id)?.is_some() {
            return Err(TrackError::Conflict(format!("group {} already exists", group.id)));
        }
    }
    for group in &plan.groups {
        store.put_group(group.clone())?;
    }
    Ok(AutoGroupReport {
        created: plan.groups,
        students_grouped: plan.students_grouped,
    })
}

/// Record a synopsis submission or review.
///
/// A group holds one synopsis: a later record for the same group updates it
/// and keeps its id. The group needs an assigned mentor. A `submitted` record
/// (re)submits; any other status is a review, allowed only while the stored
/// synopsis is `submitted` or `under-review`.
pub fn record_synopsis<S: DriveStore + ?Sized>(
    store: &mut S,
    mut synopsis: Synopsis,
) -> Result<Synopsis, TrackError> {
    let group = store.require_group(&synopsis.group)?;
    if group.drive != synopsis.drive {
        return Err(TrackError::InvalidRecord(format!(
            "group {} does not belong to drive {}",
            group.id, synopsis.drive
        )));
    }
    if !group.is_assigned() {
        return Err(TrackError::InvalidRecord(
            "Group must have an assigned mentor before submitting synopsis".to_string(),
        ));
    }

    let existing = store
        .list_synopses(&synopsis.drive)?
        .into_iter()
        .find(|s| s.group == synopsis.group);

    if synopsis.status != SynopsisStatus::Submitted {
        match &existing {
            Some(current) if current.status.is_reviewable() => {
                synopsis.submitted_at = current.submitted_at;
            }
            Some(current) => {
                return Err(TrackError::InvalidRecord(format!(
                    "Cannot review synopsis with status: {}",
                    current.status.as_str()
                )));
            }
            None => {
                return Err(TrackError::InvalidRecord(format!(
                    "group {} has no synopsis to review",
                    group.id
                )));
            }
        }
    }
    if let Some(previous) = existing {
        synopsis.id = previous.id;
    }

    store.put_synopsis(synopsis.clone())?;
    Ok(synopsis)
}

/// Record a group's deliverable for a checkpoint or a generic kind.
///
/// A group keeps one submission per target: a second submission for the same
/// target replaces the first and keeps its id.
pub fn record_submission<S: DriveStore + ?Sized>(
    store: &mut S,
    mut submission: Submission,
) -> Result<Submission, TrackError> {
    let group = store.require_group(&submission.group)?;
    let drive = store.require_drive(&submission.drive)?;
    if group.drive != drive.id {
        return Err(TrackError::InvalidRecord(format!(
            "group {} does not belong to drive {}",
            group.id, drive.id
        )));
    }
    submission.validate(&drive)?;

    let existing = store
        .list_submissions(&drive.id)?
        .into_iter()
        .find(|s| s.group == submission.group && s.target == submission.target);
    if let Some(previous) = existing {
        submission.id = previous.id;
    }

    store.put_submission(submission.clone())?;
    Ok(submission)
}

// =============================================================================
// DRIVE WORKFLOWS
// =============================================================================

/// Create a drive. Its stage annotations are aligned with its current stage.
pub fn create_drive<S: DriveStore + ?Sized>(
    store: &mut S,
    mut drive: Drive,
) -> Result<Drive, TrackError> {
    drive.validate()?;
    if store.get_drive(&drive.id)?.is_some() {
        return Err(TrackError::Conflict(format!("drive {} already exists", drive.id)));
    }
    StageMachine::realign(&mut drive);
    store.put_drive(drive.clone())?;
    Ok(drive)
}

pub fn drive_stats<S: DriveStore + ?Sized>(
    store: &S,
    drive_id: &DriveId,
) -> Result<DriveStats, TrackError> {
    let drive = store.require_drive(drive_id)?;
    let groups = store.list_groups(drive_id)?;
    let metrics = ReadinessMetrics::collect(&drive, &groups, &[]);

    Ok(DriveStats {
        name: drive.name,
        current_stage: drive.current_stage,
        groups: GroupCounts {
            total: groups.len(),
            with_mentor: groups.iter().filter(|g| g.is_assigned()).count(),
            active: groups
                .iter()
                .filter(|g| g.status == GroupStatus::Active)
                .count(),
        },
        students: StudentCounts {
            total: metrics.total_students,
            in_groups: metrics.grouped_students,
            unregistered: metrics.ungrouped_students(),
        },
    })
}

// =============================================================================
// SNAPSHOTS
// =============================================================================

/// Every record of the store.
pub fn export_snapshot<S: DriveStore + ?Sized>(store: &S) -> Result<Snapshot, TrackError> {
    let drives = store.list_drives()?;
    let mut snapshot = Snapshot::default();
    for drive in &drives {
        snapshot.groups.extend(store.list_groups(&drive.id)?);
        snapshot.synopses.extend(store.list_synopses(&drive.id)?);
        snapshot.submissions.extend(store.list_submissions(&drive.id)?);
    }
    snapshot.drives = drives;
    Ok(snapshot)
}

/// Write every record of a validated snapshot, replacing records with the
/// same ids.
pub fn import_snapshot<S: DriveStore + ?Sized>(
    store: &mut S,
    snapshot: Snapshot,
) -> Result<ImportSummary, TrackError> {
    snapshot.validate()?;
    let summary = ImportSummary {
        drives: snapshot.drives.len(),
        groups: snapshot.groups.len(),
        synopses: snapshot.synopses.len(),
        submissions: snapshot.submissions.len(),
    };

    for mut drive in snapshot.drives {
        StageMachine::realign(&mut drive);
        store.put_drive(drive)?;
    }
    for group in snapshot.groups {
        store.put_group(group)?;
    }
    for synopsis in snapshot.synopses {
        store.put_synopsis(synopsis)?;
    }
    for submission in snapshot.submissions {
        store.put_submission(submission)?;
    }
    Ok(summary)
}

// =============================================================================
// TRACKER (SESSION)
// =============================================================================

/// Storage backend for a Tracker.
#[derive(Debug)]
pub enum StorageBackend {
    /// In-memory store (fast, volatile).
    InMemory(MemoryStore),
    /// Disk-backed store using redb (ACID, persistent).
    Persistent(RedbStore),
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::InMemory(MemoryStore::new())
    }
}

/// A Tracker owns a store and runs the workflows against it.
#[derive(Debug, Default)]
pub struct Tracker {
    backend: StorageBackend,
}

impl Tracker {
    /// Create a tracker with an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tracker with persistent redb storage at `path`.
    pub fn with_redb(path: impl AsRef<Path>) -> Result<Self, TrackError> {
        Ok(Self {
            backend: StorageBackend::Persistent(RedbStore::open(path)?),
        })
    }

    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self.backend, StorageBackend::Persistent(_))
    }

    /// Read access to the underlying store.
    #[must_use]
    pub fn store(&self) -> &dyn DriveStore {
        match &self.backend {
            StorageBackend::InMemory(store) => store,
            StorageBackend::Persistent(redb) => redb,
        }
    }

    fn store_mut(&mut self) -> &mut dyn DriveStore {
        match &mut self.backend {
            StorageBackend::InMemory(store) => store,
            StorageBackend::Persistent(redb) => redb,
        }
    }

    // =========================================================================
    // DRIVES
    // =========================================================================

    pub fn create_drive(&mut self, drive: Drive) -> Result<Drive, TrackError> {
        create_drive(self.store_mut(), drive)
    }

    pub fn drive(&self, id: &DriveId) -> Result<Drive, TrackError> {
        self.store().require_drive(id)
    }

    pub fn drives(&self) -> Result<Vec<Drive>, TrackError> {
        self.store().list_drives()
    }

    pub fn drive_stats(&self, id: &DriveId) -> Result<DriveStats, TrackError> {
        drive_stats(self.store(), id)
    }

    pub fn drive_progress(&self, id: &DriveId) -> Result<DriveProgress, TrackError> {
        drive_progress(self.store(), id)
    }

    pub fn progress_stage(&mut self, id: &DriveId, force: bool) -> Result<StageChange, TrackError> {
        progress_stage(self.store_mut(), id, force)
    }

    pub fn regress_stage(&mut self, id: &DriveId) -> Result<StageChange, TrackError> {
        regress_stage(self.store_mut(), id)
    }

    // =========================================================================
    // GROUPS
    // =========================================================================

    pub fn create_group(&mut self, group: Group) -> Result<Group, TrackError> {
        create_group(self.store_mut(), group)
    }

    pub fn group(&self, id: &GroupId) -> Result<Group, TrackError> {
        self.store().require_group(id)
    }

    pub fn groups(&self, drive: &DriveId) -> Result<Vec<Group>, TrackError> {
        self.store().require_drive(drive)?;
        self.store().list_groups(drive)
    }

    pub fn set_preferences(
        &mut self,
        group: &GroupId,
        selection: &[MentorId],
    ) -> Result<Group, TrackError> {
        set_preferences(self.store_mut(), group, selection)
    }

    pub fn remaining_students(&self, drive: &DriveId) -> Result<Vec<StudentId>, TrackError> {
        remaining_students(self.store(), drive)
    }

    pub fn auto_group(
        &mut self,
        drive: &DriveId,
        now: Timestamp,
    ) -> Result<AutoGroupReport, TrackError> {
        auto_group(self.store_mut(), drive, now)
    }

    pub fn record_synopsis(&mut self, synopsis: Synopsis) -> Result<Synopsis, TrackError> {
        record_synopsis(self.store_mut(), synopsis)
    }

    pub fn record_submission(&mut self, submission: Submission) -> Result<Submission, TrackError> {
        record_submission(self.store_mut(), submission)
    }

    pub fn submissions(&self, drive: &DriveId) -> Result<Vec<Submission>, TrackError> {
        self.store().require_drive(drive)?;
        self.store().list_submissions(drive)
    }

    // =========================================================================
    // MENTORS
    // =========================================================================

    pub fn auto_allot(
        &mut self,
        drive: &DriveId,
        admin: &UserId,
        now: Timestamp,
    ) -> Result<AllotmentReport, TrackError> {
        auto_allot(self.store_mut(), drive, admin, now)
    }

    pub fn assign_mentor(
        &mut self,
        group: &GroupId,
        mentor: &MentorId,
        admin: &UserId,
        now: Timestamp,
    ) -> Result<Group, TrackError> {
        assign_mentor(self.store_mut(), group, mentor, admin, now)
    }

    pub fn unassign_mentor(&mut self, group: &GroupId) -> Result<Group, TrackError> {
        unassign_mentor(self.store_mut(), group)
    }

    // =========================================================================
    // SNAPSHOTS
    // =========================================================================

    pub fn export_snapshot(&self) -> Result<Snapshot, TrackError> {
        export_snapshot(self.store())
    }

    pub fn import_snapshot(&mut self, snapshot: Snapshot) -> Result<ImportSummary, TrackError> {
        import_snapshot(self.store_mut(), snapshot)
    }
}

// =============================================================================
// TESTS
// =============================================================================
