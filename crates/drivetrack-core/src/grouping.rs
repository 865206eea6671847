//! # Auto-Grouping
//!
//! Finds participating students that are in no group yet and packs them,
//! in drive order, into groups of `max_group_size`. The first student of each
//! chunk leads; the rest join as accepted members. Auto-groups carry no
//! mentor preferences, so allotment places them by fallback.
//!
//! Also holds the admission checks for leader-created groups and their
//! mentor preference lists.

use crate::primitives::{AUTO_GROUP_PREFIX, MAX_MENTOR_PREFERENCES};
use crate::{
    Drive, Group, GroupId, Member, MentorId, MentorPreference, StudentId, Timestamp, TrackError,
};
use std::collections::BTreeSet;

/// Participating students of `drive` that lead or belong to no group.
///
/// Rejected members do not count as grouped. Drive order is preserved.
#[must_use]
pub fn remaining_students(drive: &Drive, groups: &[Group]) -> Vec<StudentId> {
    let grouped: BTreeSet<&StudentId> = groups
        .iter()
        .filter(|g| g.drive == drive.id)
        .flat_map(|g| g.students())
        .collect();

    drive
        .participating_students
        .iter()
        .filter(|s| !grouped.contains(s))
        .cloned()
        .collect()
}

/// Groups to create for the remaining students.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AutoGroupPlan {
    pub groups: Vec<Group>,
    pub students_grouped: usize,
}

/// Plan auto-groups for every remaining student of `drive`.
///
/// Numbering continues after the drive's existing auto-groups and skips any
/// id already held by a group of the drive, so repeated runs never reuse a
/// name or id.
#[must_use]
pub fn plan_auto_groups(drive: &Drive, groups: &[Group], now: Timestamp) -> AutoGroupPlan {
    let remaining = remaining_students(drive, groups);
    let chunk_size = (drive.max_group_size as usize).max(1);

    let existing_auto = groups
        .iter()
        .filter(|g| g.drive == drive.id && g.name.starts_with(AUTO_GROUP_PREFIX))
        .count();
    let taken: BTreeSet<&GroupId> = groups.iter().map(|g| &g.id).collect();

    let mut seq = existing_auto;
    let mut planned = Vec::new();
    for chunk in remaining.chunks(chunk_size) {
        let Some((leader, members)) = chunk.split_first() else {
            continue;
        };
        let id = loop {
            seq = seq.saturating_add(1);
            let candidate = GroupId::new(format!("{}-auto-{}", drive.id, seq));
            if !taken.contains(&candidate) {
                break candidate;
            }
        };
        let mut group = Group::new(
            id,
            drive.id.clone(),
            format!("{}-{}", AUTO_GROUP_PREFIX, seq),
            leader.clone(),
            now,
        );
        group.members = members.iter().cloned().map(Member::accepted).collect();
        planned.push(group);
    }

    AutoGroupPlan {
        groups: planned,
        students_grouped: remaining.len(),
    }
}

// =============================================================================
// ADMISSION
// =============================================================================

/// Check a new group against the drive and its existing groups.
///
/// The group must be valid, belong to `drive`, and none of its students may
/// already be grouped in the drive.
pub fn check_new_group(drive: &Drive, existing: &[Group], group: &Group) -> Result<(), TrackError> {
    group.validate()?;
    if group.drive != drive.id {
        return Err(TrackError::InvalidRecord(format!(
            "group {} does not belong to drive {}",
            group.id, drive.id
        )));
    }
    if existing.iter().any(|g| g.id == group.id) {
        return Err(TrackError::Conflict(format!("group {} already exists", group.id)));
    }

    let grouped: BTreeSet<&StudentId> = existing
        .iter()
        .filter(|g| g.drive == drive.id)
        .flat_map(|g| g.students())
        .collect();
    if let Some(student) = group.students().find(|s| grouped.contains(s)) {
        return Err(TrackError::InvalidRecord(format!(
            "student {} is already part of a group in this drive",
            student
        )));
    }

    let unknown = group
        .mentor_preferences
        .iter()
        .find(|p| !drive.has_mentor(&p.mentor));
    if let Some(pref) = unknown {
        return Err(TrackError::MentorNotFound(pref.mentor.clone()));
    }
    Ok(())
}

/// Turn an ordered mentor selection into ranked preferences.
///
/// Duplicates are dropped keeping the first occurrence; ranks follow the
/// remaining order starting at 1. Once a mentor is assigned, the selection
/// may only restate that mentor as first choice.
pub fn rank_preferences(
    drive: &Drive,
    group: &Group,
    selection: &[MentorId],
) -> Result<Vec<MentorPreference>, TrackError> {
    if let (Some(assigned), Some(first)) = (group.assigned_mentor(), selection.first())
        && assigned != first
    {
        return Err(TrackError::InvalidRecord(
            "Mentor already assigned; cannot change selection".to_string(),
        ));
    }
    if selection.len() > MAX_MENTOR_PREFERENCES {
        return Err(TrackError::InvalidRecord(format!(
            "You can select up to {} mentor preferences",
            MAX_MENTOR_PREFERENCES
        )));
    }

    let mut seen = BTreeSet::new();
    let ordered: Vec<&MentorId> = selection.iter().filter(|m| seen.insert(*m)).collect();

    if ordered.iter().any(|m| !drive.has_mentor(m)) {
        return Err(TrackError::InvalidRecord(
            "Selected mentor is not part of this drive".to_string(),
        ));
    }

    Ok(ordered
        .into_iter()
        .zip(1u8..)
        .map(|(mentor, rank)| MentorPreference::new(mentor.clone(), rank))
        .collect())
}

// =============================================================================
// TESTS
// =============================================================================
