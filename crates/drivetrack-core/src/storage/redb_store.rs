//! # redb-backed Drive Storage
//!
//! A disk-backed `DriveStore` using the redb embedded database.
//!
//! Records are stored postcard-encoded, one table per record kind, keyed by
//! their string id. redb gives us:
//! - ACID transactions
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! ## Conditional writes
//!
//! `assign_if_capacity` and `save_drive_stage` read, check and write inside a
//! single write transaction. redb serializes write transactions, so two
//! assignments racing for a mentor's last slot cannot both commit.

use crate::allotment::AllotmentEngine;
use crate::store::{DriveStore, held_by_others};
use crate::system::{Stage, StagePatch};
use crate::{Drive, DriveId, Group, GroupId, MentorAssignment, Submission, Synopsis, TrackError};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;

type Records = TableDefinition<'static, &'static str, &'static [u8]>;

/// Table for drives: DriveId -> serialized Drive bytes
const DRIVES: Records = TableDefinition::new("drives");

/// Table for groups: GroupId -> serialized Group bytes
const GROUPS: Records = TableDefinition::new("groups");

/// Table for synopses: SynopsisId -> serialized Synopsis bytes
const SYNOPSES: Records = TableDefinition::new("synopses");

/// Table for submissions: SubmissionId -> serialized Submission bytes
const SUBMISSIONS: Records = TableDefinition::new("submissions");

fn storage_err(e: impl std::fmt::Display) -> TrackError {
    TrackError::Storage(e.to_string())
}

fn encode<T: Serialize>(record: &T) -> Result<Vec<u8>, TrackError> {
    postcard::to_allocvec(record).map_err(|e| TrackError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, TrackError> {
    postcard::from_bytes(bytes).map_err(|e| TrackError::Serialization(e.to_string()))
}

/// Decode every value of a table, in key order.
fn decode_all<T, R>(table: &R) -> Result<Vec<T>, TrackError>
where
    T: DeserializeOwned,
    R: ReadableTable<&'static str, &'static [u8]>,
{
    let mut records = Vec::new();
    for entry in table.iter().map_err(storage_err)? {
        let (_, value) = entry.map_err(storage_err)?;
        records.push(decode(value.value())?);
    }
    Ok(records)
}

/// A disk-backed drive store using redb.
pub struct RedbStore {
    db: Database,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TrackError> {
        let db = Database::create(path.as_ref()).map_err(storage_err)?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(storage_err)?;
            for table in [DRIVES, GROUPS, SYNOPSES, SUBMISSIONS] {
                let _ = write_txn.open_table(table).map_err(storage_err)?;
            }
            write_txn.commit().map_err(storage_err)?;
        }

        Ok(Self { db })
    }

    /// Number of stored groups across all drives.
    pub fn group_count(&self) -> Result<usize, TrackError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(GROUPS).map_err(storage_err)?;
        Ok(table.len().map_err(storage_err)? as usize)
    }

    fn get_record<T: DeserializeOwned>(
        &self,
        table: Records,
        key: &str,
    ) -> Result<Option<T>, TrackError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(table).map_err(storage_err)?;
        match table.get(key).map_err(storage_err)? {
            Some(data) => Ok(Some(decode(data.value())?)),
            None => Ok(None),
        }
    }

    fn put_record<T: Serialize>(
        &mut self,
        table: Records,
        key: &str,
        record: &T,
    ) -> Result<(), TrackError> {
        let bytes = encode(record)?;
        let write_txn = self.db.begin_write().map_err(storage_err)?;
        {
            let mut table = write_txn.open_table(table).map_err(storage_err)?;
            table.insert(key, bytes.as_slice()).map_err(storage_err)?;
        }
        write_txn.commit().map_err(storage_err)?;
        Ok(())
    }

    fn all_records<T: DeserializeOwned>(&self, table: Records) -> Result<Vec<T>, TrackError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(table).map_err(storage_err)?;
        decode_all(&table)
    }
}

impl DriveStore for RedbStore {
    fn get_drive(&self, id: &DriveId) -> Result<Option<Drive>, TrackError> {
        self.get_record(DRIVES, id.as_str())
    }

    fn put_drive(&mut self, drive: Drive) -> Result<(), TrackError> {
        self.put_record(DRIVES, drive.id.as_str(), &drive)
    }

    fn list_drives(&self) -> Result<Vec<Drive>, TrackError> {
        self.all_records(DRIVES)
    }

    fn get_group(&self, id: &GroupId) -> Result<Option<Group>, TrackError> {
        self.get_record(GROUPS, id.as_str())
    }

    fn put_group(&mut self, group: Group) -> Result<(), TrackError> {
        self.put_record(GROUPS, group.id.as_str(), &group)
    }

    fn list_groups(&self, drive: &DriveId) -> Result<Vec<Group>, TrackError> {
        let groups: Vec<Group> = self.all_records(GROUPS)?;
        Ok(groups.into_iter().filter(|g| &g.drive == drive).collect())
    }

    fn put_synopsis(&mut self, synopsis: Synopsis) -> Result<(), TrackError> {
        self.put_record(SYNOPSES, synopsis.id.as_str(), &synopsis)
    }

    fn list_synopses(&self, drive: &DriveId) -> Result<Vec<Synopsis>, TrackError> {
        let synopses: Vec<Synopsis> = self.all_records(SYNOPSES)?;
        Ok(synopses.into_iter().filter(|s| &s.drive == drive).collect())
    }

    fn put_submission(&mut self, submission: Submission) -> Result<(), TrackError> {
        self.put_record(SUBMISSIONS, submission.id.as_str(), &submission)
    }

    fn list_submissions(&self, drive: &DriveId) -> Result<Vec<Submission>, TrackError> {
        let submissions: Vec<Submission> = self.all_records(SUBMISSIONS)?;
        Ok(submissions.into_iter().filter(|s| &s.drive == drive).collect())
    }

    fn assign_if_capacity(
        &mut self,
        group: &GroupId,
        assignment: MentorAssignment,
    ) -> Result<Group, TrackError> {
        let write_txn = self.db.begin_write().map_err(storage_err)?;

        let updated = {
            let drives = write_txn.open_table(DRIVES).map_err(storage_err)?;
            let mut groups = write_txn.open_table(GROUPS).map_err(storage_err)?;

            let mut target: Group = match groups.get(group.as_str()).map_err(storage_err)? {
                Some(data) => decode(data.value())?,
                None => return Err(TrackError::GroupNotFound(group.clone())),
            };
            let drive: Drive = match drives.get(target.drive.as_str()).map_err(storage_err)? {
                Some(data) => decode(data.value())?,
                None => return Err(TrackError::DriveNotFound(target.drive.clone())),
            };

            let siblings: Vec<Group> = decode_all(&groups)?
                .into_iter()
                .filter(|g: &Group| g.drive == drive.id)
                .collect();
            let held = held_by_others(&siblings, group, &assignment.mentor);

            AllotmentEngine::assign_one(&drive, &mut target, assignment, held)?;

            let bytes = encode(&target)?;
            groups
                .insert(group.as_str(), bytes.as_slice())
                .map_err(storage_err)?;
            target
        };

        write_txn.commit().map_err(storage_err)?;
        Ok(updated)
    }

    fn clear_group_assignment(&mut self, group: &GroupId) -> Result<Group, TrackError> {
        let write_txn = self.db.begin_write().map_err(storage_err)?;

        let updated = {
            let mut groups = write_txn.open_table(GROUPS).map_err(storage_err)?;
            let mut target: Group = match groups.get(group.as_str()).map_err(storage_err)? {
                Some(data) => decode(data.value())?,
                None => return Err(TrackError::GroupNotFound(group.clone())),
            };

            AllotmentEngine::unassign(&mut target)?;

            let bytes = encode(&target)?;
            groups
                .insert(group.as_str(), bytes.as_slice())
                .map_err(storage_err)?;
            target
        };

        write_txn.commit().map_err(storage_err)?;
        Ok(updated)
    }

    fn save_drive_stage(
        &mut self,
        drive: &DriveId,
        expected: Stage,
        stage: Stage,
        patch: &StagePatch,
    ) -> Result<Drive, TrackError> {
        let write_txn = self.db.begin_write().map_err(storage_err)?;

        let updated = {
            let mut drives = write_txn.open_table(DRIVES).map_err(storage_err)?;
            let mut target: Drive = match drives.get(drive.as_str()).map_err(storage_err)? {
                Some(data) => decode(data.value())?,
                None => return Err(TrackError::DriveNotFound(drive.clone())),
            };
            if target.current_stage != expected {
                return Err(TrackError::Conflict(format!(
                    "drive {} is at {}, expected {}",
                    drive, target.current_stage, expected
                )));
            }

            target.current_stage = stage;
            patch.apply(&mut target.stages);

            let bytes = encode(&target)?;
            drives
                .insert(drive.as_str(), bytes.as_slice())
                .map_err(storage_err)?;
            target
        };

        write_txn.commit().map_err(storage_err)?;
        Ok(updated)
    }
}

// =============================================================================
// TESTS
// =============================================================================
