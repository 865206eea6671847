//! # Mentor Allotment
//!
//! Greedy, deterministic, preference-aware assignment of mentors to groups.
//!
//! ## Rule
//!
//! 1. Candidate groups are processed in ascending `created_at` order. The sort
//!    is stable, so groups with identical timestamps keep their input order.
//! 2. A group takes its best-ranked preferred mentor that still has capacity.
//! 3. Otherwise it takes the first mentor, in drive mentor order, that still
//!    has capacity.
//! 4. Otherwise it is reported as a failed allotment and processing continues.
//!
//! The engine only computes. Writing the assignments back is the caller's job
//! (see `Tracker::auto_allot`), which re-checks capacity at write time.

use crate::primitives::MAX_ALLOTMENT_BATCH;
use crate::{Drive, Group, GroupId, MentorAssignment, MentorId, TrackError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// CAPACITY LEDGER
// =============================================================================

/// Remaining capacity per mentor, in drive mentor order.
///
/// Built fresh for every allotment run and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MentorCapacityLedger {
    entries: Vec<(MentorId, u32)>,
}

impl MentorCapacityLedger {
    /// Build the ledger from the number of groups each mentor already holds.
    ///
    /// Capacity is `max_groups_per_mentor - assigned`, clamped at zero.
    /// Mentors missing from `assigned` hold no groups.
    #[must_use]
    pub fn build(drive: &Drive, assigned: &BTreeMap<MentorId, usize>) -> Self {
        let entries = drive
            .mentors
            .iter()
            .map(|mentor| {
                let held = assigned.get(mentor).copied().unwrap_or(0);
                let held = u32::try_from(held).unwrap_or(u32::MAX);
                (mentor.clone(), drive.max_groups_per_mentor.saturating_sub(held))
            })
            .collect();
        Self { entries }
    }

    /// Build a ledger from explicit entries. Order is preserved.
    #[must_use]
    pub fn from_entries(entries: Vec<(MentorId, u32)>) -> Self {
        Self { entries }
    }

    /// Remaining capacity of `mentor`, or `None` if it is not in the ledger.
    #[must_use]
    pub fn remaining(&self, mentor: &MentorId) -> Option<u32> {
        self.entries
            .iter()
            .find(|(m, _)| m == mentor)
            .map(|(_, cap)| *cap)
    }

    /// Consume one slot of `mentor`. Returns false if it has none left.
    pub fn take(&mut self, mentor: &MentorId) -> bool {
        match self.entries.iter_mut().find(|(m, _)| m == mentor) {
            Some((_, cap)) if *cap > 0 => {
                *cap -= 1;
                true
            }
            _ => false,
        }
    }

    /// First mentor in ledger order with capacity left.
    #[must_use]
    pub fn first_available(&self) -> Option<&MentorId> {
        self.entries
            .iter()
            .find(|(_, cap)| *cap > 0)
            .map(|(m, _)| m)
    }
}

// =============================================================================
// PLAN
// =============================================================================

/// How a planned assignment was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum AssignmentSource {
    /// The group's preference with this rank.
    Preference { rank: u8 },
    /// No preferred mentor had capacity.
    Fallback,
}

/// One assignment computed by an allotment run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedAssignment {
    pub group_id: GroupId,
    pub group_name: String,
    pub mentor: MentorId,
    pub source: AssignmentSource,
}

/// A group that could not be placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedAllotment {
    pub group_id: GroupId,
    pub group_name: String,
    /// The group's preferences, in rank order.
    pub preferences: Vec<MentorId>,
}

/// Output of [`AllotmentEngine::allot`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AllotmentPlan {
    /// Assignments in processing order.
    pub assignments: Vec<PlannedAssignment>,
    /// Unplaced groups in processing order.
    pub failed_groups: Vec<FailedAllotment>,
    /// Ledger state after the run.
    pub remaining: MentorCapacityLedger,
}

impl AllotmentPlan {
    #[must_use]
    pub fn assigned_count(&self) -> usize {
        self.assignments.len()
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failed_groups.len()
    }
}

impl FailedAllotment {
    #[must_use]
    pub fn for_group(group: &Group) -> Self {
        Self {
            group_id: group.id.clone(),
            group_name: group.name.clone(),
            preferences: group
                .ranked_preferences()
                .into_iter()
                .map(|p| p.mentor)
                .collect(),
        }
    }
}

// =============================================================================
// ENGINE
// =============================================================================

/// Allotment Engine - pure functions over in-memory snapshots.
pub struct AllotmentEngine;

impl AllotmentEngine {
    /// Plan mentor assignments for `candidates` against `ledger`.
    ///
    /// Candidates that already have a mentor are ignored. Every candidate must
    /// belong to `drive`.
    pub fn allot(
        drive: &Drive,
        mut ledger: MentorCapacityLedger,
        candidates: &[Group],
    ) -> Result<AllotmentPlan, TrackError> {
        if candidates.len() > MAX_ALLOTMENT_BATCH {
            return Err(TrackError::InvalidRecord(format!(
                "allotment batch of {} groups exceeds maximum {}",
                candidates.len(),
                MAX_ALLOTMENT_BATCH
            )));
        }
        if let Some(stray) = candidates.iter().find(|g| g.drive != drive.id) {
            return Err(TrackError::InvalidRecord(format!(
                "group {} does not belong to drive {}",
                stray.id, drive.id
            )));
        }

        let mut ordered: Vec<&Group> = candidates.iter().filter(|g| !g.is_assigned()).collect();
        // Stable: equal timestamps keep input order.
        ordered.sort_by_key(|g| g.created_at);

        let mut assignments = Vec::new();
        let mut failed_groups = Vec::new();

        for group in ordered {
            match Self::choose(&mut ledger, group) {
                Some((mentor, source)) => assignments.push(PlannedAssignment {
                    group_id: group.id.clone(),
                    group_name: group.name.clone(),
                    mentor,
                    source,
                }),
                None => failed_groups.push(FailedAllotment::for_group(group)),
            }
        }

        Ok(AllotmentPlan {
            assignments,
            failed_groups,
            remaining: ledger,
        })
    }

    /// Pick a mentor for one group and consume its slot.
    fn choose(
        ledger: &mut MentorCapacityLedger,
        group: &Group,
    ) -> Option<(MentorId, AssignmentSource)> {
        for pref in group.ranked_preferences() {
            if ledger.take(&pref.mentor) {
                return Some((pref.mentor, AssignmentSource::Preference { rank: pref.rank }));
            }
        }

        let fallback = ledger.first_available()?.clone();
        if ledger.take(&fallback) {
            Some((fallback, AssignmentSource::Fallback))
        } else {
            None
        }
    }

    /// Check a manual assignment of `mentor` to `group`.
    ///
    /// `held_by_mentor` is the number of OTHER groups of the drive currently
    /// assigned to `mentor`. It must be read at call time, never cached.
    pub fn check_assignment(
        drive: &Drive,
        group: &Group,
        mentor: &MentorId,
        held_by_mentor: usize,
    ) -> Result<(), TrackError> {
        if group.drive != drive.id {
            return Err(TrackError::InvalidRecord(format!(
                "group {} does not belong to drive {}",
                group.id, drive.id
            )));
        }
        if !drive.has_mentor(mentor) {
            return Err(TrackError::MentorNotFound(mentor.clone()));
        }
        if held_by_mentor >= drive.max_groups_per_mentor as usize {
            return Err(TrackError::CapacityExceeded {
                mentor: mentor.clone(),
                max: drive.max_groups_per_mentor,
            });
        }
        Ok(())
    }

    /// Check and apply a manual assignment to `group` in memory.
    pub fn assign_one(
        drive: &Drive,
        group: &mut Group,
        assignment: MentorAssignment,
        held_by_mentor: usize,
    ) -> Result<(), TrackError> {
        Self::check_assignment(drive, group, &assignment.mentor, held_by_mentor)?;
        group.assign(assignment);
        Ok(())
    }

    /// Remove the mentor of `group`. Allowed in every drive stage.
    pub fn unassign(group: &mut Group) -> Result<MentorAssignment, TrackError> {
        if !group.is_assigned() {
            return Err(TrackError::NotAssigned(group.id.clone()));
        }
        group
            .clear_assignment()
            .ok_or_else(|| TrackError::NotAssigned(group.id.clone()))
    }
}

// =============================================================================
// TESTS
// =============================================================================
