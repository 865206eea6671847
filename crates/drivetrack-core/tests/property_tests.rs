//! # Property-Based Tests
//!
//! Capacity, fairness, preference priority and determinism of allotment,
//! and the one-step movement rules of the stage machine.

use drivetrack_core::tracker::{assign_mentor, auto_allot};
use drivetrack_core::{
    AllotmentEngine, AssignmentSource, Drive, DriveId, DriveStore, Group, GroupId, MemoryStore,
    MentorCapacityLedger, MentorId, MentorPreference, ReadinessMetrics, Stage, StageMachine,
    StudentId, Timestamp, Transition, UserId,
};
use proptest::collection::vec;
use proptest::prelude::*;
use std::collections::BTreeMap;

// =============================================================================
// GENERATORS
// =============================================================================

/// (created_at, preference mentor indices) per group.
fn group_specs(mentors: usize) -> impl Strategy<Value = Vec<(i64, Vec<usize>)>> {
    vec((0i64..20, vec(0..mentors, 0..=3)), 0..25)
}

fn build_drive(mentors: usize, max: u32) -> Drive {
    let mut drive = Drive::new(DriveId::new("d1"), "Property Drive", max);
    drive.mentors = (0..mentors).map(|i| MentorId::new(format!("m{i}"))).collect();
    drive
}

fn build_groups(specs: &[(i64, Vec<usize>)]) -> Vec<Group> {
    specs
        .iter()
        .enumerate()
        .map(|(i, (at, prefs))| {
            let mut group = Group::new(
                GroupId::new(format!("g{i:03}")),
                DriveId::new("d1"),
                format!("Group {i}"),
                StudentId::new(format!("s{i}")),
                Timestamp(*at),
            );
            let mut seen = Vec::new();
            for idx in prefs {
                if !seen.contains(idx) {
                    seen.push(*idx);
                }
            }
            group.mentor_preferences = seen
                .iter()
                .zip(1u8..)
                .map(|(idx, rank)| MentorPreference::new(MentorId::new(format!("m{idx}")), rank))
                .collect();
            group
        })
        .collect()
}

fn stage_strategy() -> impl Strategy<Value = Stage> {
    prop::sample::select(Stage::ALL.to_vec())
}

// =============================================================================
// ALLOTMENT PROPERTIES
// =============================================================================

proptest! {
    /// No mentor ever ends up above capacity, whatever mix of bulk and manual
    /// assignments runs.
    #[test]
    fn capacity_never_exceeded(
        mentors in 1usize..5,
        max in 1u32..4,
        specs in group_specs(4),
        manual in vec((0usize..25, 0usize..5), 0..10),
    ) {
        let drive = build_drive(mentors, max);
        let groups = build_groups(&specs);
        let mut store = MemoryStore::new();
        store.put_drive(drive.clone()).expect("drive");
        for group in &groups {
            store.put_group(group.clone()).expect("group");
        }

        let admin = UserId::new("admin");
        for (g, m) in &manual {
            if let Some(group) = groups.get(*g) {
                let _ = assign_mentor(
                    &mut store,
                    &group.id,
                    &MentorId::new(format!("m{m}")),
                    &admin,
                    Timestamp(0),
                );
            }
        }
        auto_allot(&mut store, &drive.id, &admin, Timestamp(1)).expect("allot");

        for mentor in &drive.mentors {
            let held = store
                .count_assigned_groups_for_mentor(&drive.id, mentor)
                .expect("count");
            prop_assert!(held <= max as usize);
        }
    }

    /// An earlier group is never beaten to a mentor by a later one.
    #[test]
    fn earlier_groups_considered_first(
        mentors in 1usize..4,
        max in 1u32..3,
        specs in group_specs(3),
    ) {
        let drive = build_drive(mentors, max);
        let groups = build_groups(&specs);
        let ledger = MentorCapacityLedger::build(&drive, &BTreeMap::new());
        let plan = AllotmentEngine::allot(&drive, ledger, &groups).expect("allot");

        let created: BTreeMap<&GroupId, Timestamp> =
            groups.iter().map(|g| (&g.id, g.created_at)).collect();
        let times: Vec<Timestamp> = plan
            .assignments
            .iter()
            .map(|a| created[&a.group_id])
            .collect();
        prop_assert!(times.windows(2).all(|w| w[0] <= w[1]));

        // A failed group means every mentor was full when it came up, so no
        // assignment can follow it.
        if let Some(first_failed) = plan.failed_groups.first() {
            let failed_at = created[&first_failed.group_id];
            prop_assert!(plan
                .assignments
                .iter()
                .all(|a| created[&a.group_id] <= failed_at));
        }
    }

    /// When the top-ranked mentor still has room, the group gets it.
    #[test]
    fn rank_one_wins_when_available(
        mentors in 1usize..4,
        max in 1u32..3,
        specs in group_specs(3),
    ) {
        let drive = build_drive(mentors, max);
        let groups = build_groups(&specs);
        let mut ordered: Vec<&Group> = groups.iter().collect();
        ordered.sort_by_key(|g| g.created_at);

        let ledger = MentorCapacityLedger::build(&drive, &BTreeMap::new());
        let plan = AllotmentEngine::allot(&drive, ledger, &groups).expect("allot");
        let chosen: BTreeMap<&GroupId, (&MentorId, AssignmentSource)> = plan
            .assignments
            .iter()
            .map(|a| (&a.group_id, (&a.mentor, a.source)))
            .collect();

        // Replay capacity in processing order.
        let mut remaining: BTreeMap<MentorId, u32> =
            drive.mentors.iter().map(|m| (m.clone(), max)).collect();
        for group in ordered {
            let top = group.ranked_preferences().into_iter().next();
            if let Some(top) = top
                && remaining.get(&top.mentor).copied().unwrap_or(0) > 0
            {
                let (mentor, source) = chosen.get(&group.id).copied().expect("assigned");
                prop_assert_eq!(mentor, &top.mentor);
                prop_assert_eq!(source, AssignmentSource::Preference { rank: 1 });
            }
            if let Some((mentor, _)) = chosen.get(&group.id)
                && let Some(slot) = remaining.get_mut(*mentor)
            {
                *slot = slot.saturating_sub(1);
            }
        }
    }

    /// Identical input gives identical plans.
    #[test]
    fn allot_deterministic(
        mentors in 1usize..4,
        max in 1u32..3,
        specs in group_specs(3),
    ) {
        let drive = build_drive(mentors, max);
        let groups = build_groups(&specs);

        let run = || {
            let ledger = MentorCapacityLedger::build(&drive, &BTreeMap::new());
            AllotmentEngine::allot(&drive, ledger, &groups).expect("allot")
        };
        let first = run();
        let second = run();

        prop_assert_eq!(first.assignments, second.assignments);
        prop_assert_eq!(first.failed_groups, second.failed_groups);
    }
}

// =============================================================================
// STAGE PROPERTIES
// =============================================================================

proptest! {
    /// Forced progress moves exactly one stage until completed.
    #[test]
    fn forced_progress_moves_one(stage in stage_strategy()) {
        let mut drive = build_drive(1, 1);
        drive.current_stage = stage;
        let transition = StageMachine::progress(&drive, &ReadinessMetrics::default(), true);

        match stage.next() {
            Some(next) => {
                let moved = matches!(transition, Transition::Moved { current, .. } if current == next);
                prop_assert!(moved);
            }
            None => prop_assert!(transition.is_blocked()),
        }
    }

    /// Neither direction ever moves more than one position.
    #[test]
    fn no_skips(
        stage in stage_strategy(),
        total_students in 0usize..10,
        grouped_students in 0usize..10,
        total_groups in 0usize..5,
        groups_without_mentor in 0usize..5,
        approved_synopses in 0usize..5,
        force in any::<bool>(),
    ) {
        let mut drive = build_drive(1, 1);
        drive.current_stage = stage;
        let metrics = ReadinessMetrics {
            total_students,
            grouped_students,
            total_groups,
            groups_without_mentor,
            approved_synopses,
        };

        for transition in [
            StageMachine::progress(&drive, &metrics, force),
            StageMachine::regress(&drive),
        ] {
            let mut moved = drive.clone();
            StageMachine::apply(&mut moved, &transition);
            prop_assert!(moved.current_stage.index().abs_diff(stage.index()) <= 1);
        }
    }

    /// Regress at group formation leaves the drive untouched.
    #[test]
    fn regress_floor(max in 1u32..5) {
        let drive = build_drive(2, max);
        let transition = StageMachine::regress(&drive);
        prop_assert!(transition.is_blocked());

        let mut after = drive.clone();
        prop_assert!(!StageMachine::apply(&mut after, &transition));
        prop_assert_eq!(after, drive);
    }
}
