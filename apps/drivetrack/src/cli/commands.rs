//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.
//!
//! With the `redb` backend every command writes straight through to the
//! database. With the `file` backend the snapshot file is loaded into memory
//! and written back after any command that changes records.

use crate::api::{self, AppState};
use crate::config::{Backend, Config};
use crate::now;
use drivetrack_core::{
    DriveId, GroupId, MentorId, Snapshot, Stage, StageChange, TrackError, Tracker, Transition,
    UserId, primitives::MAGIC_BYTES, snapshot_from_bytes, snapshot_to_bytes,
};
use std::path::{Path, PathBuf};

// =============================================================================
// FILE LIMITS
// =============================================================================

/// Maximum snapshot file size for seeding (64 MB).
const MAX_SEED_FILE_SIZE: u64 = 64 * 1024 * 1024;

fn validate_file_size(path: &Path, max_size: u64) -> Result<(), TrackError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| TrackError::Io(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(TrackError::Serialization(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Resolve an input path and make sure it is a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, TrackError> {
    let canonical = path.canonicalize().map_err(|e| {
        TrackError::Io(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(TrackError::Io(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }
    Ok(canonical)
}

/// Resolve the parent directory of an output path.
fn validate_output_path(path: &Path) -> Result<PathBuf, TrackError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        TrackError::Io(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(TrackError::Io(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| TrackError::Io("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

// =============================================================================
// STORE LOCATION
// =============================================================================

/// Where the CLI reads and writes records.
#[derive(Debug, Clone)]
pub struct StoreLocation {
    pub database: PathBuf,
    pub backend: Backend,
}

/// Open the tracker at `store`. A missing snapshot file starts empty.
pub fn load_or_create_tracker(store: &StoreLocation) -> Result<Tracker, TrackError> {
    match store.backend {
        Backend::Redb => Tracker::with_redb(&store.database),
        Backend::File => {
            let mut tracker = Tracker::new();
            if store.database.exists() {
                let data = std::fs::read(&store.database)
                    .map_err(|e| TrackError::Io(format!("Read db: {}", e)))?;
                tracker.import_snapshot(decode_snapshot(&data)?)?;
            }
            Ok(tracker)
        }
    }
}

/// Write an in-memory tracker back to its snapshot file.
pub fn save_tracker(tracker: &Tracker, store: &StoreLocation) -> Result<(), TrackError> {
    if tracker.is_persistent() {
        return Ok(());
    }
    let data = snapshot_to_bytes(&tracker.export_snapshot()?)?;
    std::fs::write(&store.database, &data).map_err(|e| TrackError::Io(format!("Write db: {}", e)))
}

/// Parse a snapshot, binary when it starts with the magic bytes, JSON otherwise.
pub fn decode_snapshot(data: &[u8]) -> Result<Snapshot, TrackError> {
    if data.starts_with(MAGIC_BYTES) {
        return snapshot_from_bytes(data);
    }
    let snapshot: Snapshot = serde_json::from_slice(data)
        .map_err(|e| TrackError::Serialization(format!("Invalid JSON snapshot: {}", e)))?;
    snapshot.validate()?;
    Ok(snapshot)
}

/// Open, run `op`, and save when the backend needs it.
fn with_tracker<T>(
    store: &StoreLocation,
    op: impl FnOnce(&mut Tracker) -> Result<T, TrackError>,
) -> Result<T, TrackError> {
    let mut tracker = load_or_create_tracker(store)?;
    let out = op(&mut tracker)?;
    save_tracker(&tracker, store)?;
    Ok(out)
}

fn print_json(value: &impl serde::Serialize) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_default()
    );
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server. The file backend is saved on shutdown.
pub async fn cmd_server(store: &StoreLocation, config: &Config) -> Result<(), TrackError> {
    let tracker = load_or_create_tracker(store)?;

    println!("drivetrack server starting...");
    println!();
    println!("Configuration:");
    println!("  Host:     {}", config.server.host);
    println!("  Port:     {}", config.server.port);
    println!("  Backend:  {}", store.backend);
    println!("  Database: {:?}", store.database);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = api::run_server(&addr, AppState::new(tracker), &config.security).await?;

    let tracker = state.tracker.read().await;
    save_tracker(&tracker, store)
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Without a drive, list drives. With one, show its stats and readiness.
pub fn cmd_status(
    store: &StoreLocation,
    json_mode: bool,
    drive: Option<&str>,
) -> Result<(), TrackError> {
    let tracker = load_or_create_tracker(store)?;

    let Some(drive) = drive else {
        let drives = tracker.drives()?;
        if json_mode {
            print_json(&drives);
            return Ok(());
        }
        println!("drivetrack Status");
        println!("=================");
        println!("Database: {:?}", store.database);
        println!("Backend:  {}", store.backend);
        println!();
        if drives.is_empty() {
            println!("No drives");
        }
        for d in &drives {
            println!(
                "{:<24} {:<32} {}",
                d.id.as_str(),
                d.name,
                d.current_stage.name()
            );
        }
        return Ok(());
    };

    let id = DriveId::new(drive);
    let stats = tracker.drive_stats(&id)?;
    let progress = tracker.drive_progress(&id)?;

    if json_mode {
        print_json(&serde_json::json!({
            "stats": stats,
            "progress": progress,
        }));
        return Ok(());
    }

    println!("Drive: {} ({})", stats.name, id);
    println!("Stage: {}", stats.current_stage.name());
    println!();
    println!(
        "Groups:   {} total, {} with mentor, {} active",
        stats.groups.total, stats.groups.with_mentor, stats.groups.active
    );
    println!(
        "Students: {} total, {} in groups, {} unregistered",
        stats.students.total, stats.students.in_groups, stats.students.unregistered
    );
    println!();
    match (&progress.report.next, &progress.report.reason) {
        (None, _) => println!("Terminal stage reached"),
        (Some(next), None) => println!("Ready to progress to {}", next.name()),
        (Some(next), Some(reason)) => {
            println!("Not ready to progress to {}: {}", next.name(), reason);
        }
    }

    Ok(())
}

// =============================================================================
// INIT / SEED / EXPORT COMMANDS
// =============================================================================

/// Initialize a new database.
pub fn cmd_init(store: &StoreLocation, force: bool) -> Result<(), TrackError> {
    if store.database.exists() {
        if !force {
            return Err(TrackError::Io(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(&store.database)
            .map_err(|e| TrackError::Io(format!("Remove db: {}", e)))?;
    }

    let tracker = load_or_create_tracker(store)?;
    save_tracker(&tracker, store)?;
    println!(
        "Initialized new {} database at {:?}",
        store.backend, store.database
    );
    Ok(())
}

/// Import a snapshot file into the store.
pub fn cmd_seed(store: &StoreLocation, json_mode: bool, input: &Path) -> Result<(), TrackError> {
    let validated_path = validate_file_path(input)?;
    validate_file_size(&validated_path, MAX_SEED_FILE_SIZE)?;

    let data = std::fs::read(&validated_path)
        .map_err(|e| TrackError::Io(format!("Read file: {}", e)))?;
    let snapshot = decode_snapshot(&data)?;

    tracing::info!("Seeding from {:?}", validated_path);
    let summary = with_tracker(store, |tracker| tracker.import_snapshot(snapshot))?;

    if json_mode {
        print_json(&summary);
    } else {
        println!(
            "Imported {} drives, {} groups, {} synopses, {} submissions",
            summary.drives, summary.groups, summary.synopses, summary.submissions
        );
    }
    Ok(())
}

/// Export every record.
pub fn cmd_export(store: &StoreLocation, output: &Path, format: &str) -> Result<(), TrackError> {
    let validated_output = validate_output_path(output)?;
    let tracker = load_or_create_tracker(store)?;
    let snapshot = tracker.export_snapshot()?;

    let data = match format {
        "json" => serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| TrackError::Serialization(e.to_string()))?,
        "binary" => snapshot_to_bytes(&snapshot)?,
        _ => {
            return Err(TrackError::Serialization(format!(
                "Unknown format: {}. Use: json, binary",
                format
            )));
        }
    };

    std::fs::write(&validated_output, &data)
        .map_err(|e| TrackError::Io(format!("Write file: {}", e)))?;

    println!(
        "Exported {} records ({} bytes) to {:?}",
        snapshot.record_count(),
        data.len(),
        validated_output
    );
    Ok(())
}

// =============================================================================
// MENTOR COMMANDS
// =============================================================================

/// Bulk allotment for a drive.
pub fn cmd_allot(
    store: &StoreLocation,
    json_mode: bool,
    drive: &str,
    admin: &str,
) -> Result<(), TrackError> {
    let drive_id = DriveId::new(drive);
    let admin = UserId::new(admin);
    let report = with_tracker(store, |tracker| tracker.auto_allot(&drive_id, &admin, now()))?;

    tracing::info!(
        drive = %drive_id,
        allotted = report.allotted_count(),
        failed = report.failed_count(),
        "Auto allotment finished"
    );

    if json_mode {
        print_json(&report);
        return Ok(());
    }

    println!("{}", report.message());
    for a in &report.allotted {
        println!("  {} -> {} ({:?})", a.group_name, a.mentor, a.source);
    }
    if !report.failed_groups.is_empty() {
        println!();
        println!("{} groups could not be allotted:", report.failed_count());
        for f in &report.failed_groups {
            println!("  {} ({})", f.group_name, f.group_id);
        }
    }
    Ok(())
}

/// Manual assignment.
pub fn cmd_assign(
    store: &StoreLocation,
    json_mode: bool,
    group: &str,
    mentor: &str,
    admin: &str,
) -> Result<(), TrackError> {
    let group_id = GroupId::new(group);
    let mentor = MentorId::new(mentor);
    let admin = UserId::new(admin);
    let group = with_tracker(store, |tracker| {
        tracker.assign_mentor(&group_id, &mentor, &admin, now())
    })?;

    if json_mode {
        print_json(&group);
    } else {
        println!("Assigned {} to {} ({})", mentor, group.name, group.id);
    }
    Ok(())
}

pub fn cmd_unassign(store: &StoreLocation, json_mode: bool, group: &str) -> Result<(), TrackError> {
    let group_id = GroupId::new(group);
    let group = with_tracker(store, |tracker| tracker.unassign_mentor(&group_id))?;

    if json_mode {
        print_json(&group);
    } else {
        println!("Mentor unassigned from {} ({})", group.name, group.id);
    }
    Ok(())
}

// =============================================================================
// STAGE COMMANDS
// =============================================================================

pub fn cmd_progress(
    store: &StoreLocation,
    json_mode: bool,
    drive: &str,
    force: bool,
) -> Result<(), TrackError> {
    let drive_id = DriveId::new(drive);
    let change = with_tracker(store, |tracker| tracker.progress_stage(&drive_id, force))?;
    report_stage_change(&change, json_mode, true)
}

pub fn cmd_regress(store: &StoreLocation, json_mode: bool, drive: &str) -> Result<(), TrackError> {
    let drive_id = DriveId::new(drive);
    let change = with_tracker(store, |tracker| tracker.regress_stage(&drive_id))?;
    report_stage_change(&change, json_mode, false)
}

/// Print a stage change. A blocked change is an error, so the exit status is 1.
fn report_stage_change(
    change: &StageChange,
    json_mode: bool,
    forward: bool,
) -> Result<(), TrackError> {
    match &change.transition {
        Transition::Moved {
            previous, current, ..
        } => {
            tracing::info!(
                drive = %change.drive.id,
                previous = previous.as_str(),
                current = current.as_str(),
                "Drive stage changed"
            );
            if json_mode {
                print_json(&serde_json::json!({
                    "previousStage": previous,
                    "currentStage": current,
                    "stages": change.drive.stages,
                }));
            } else {
                println!("{}: {} -> {}", change.drive.id, previous.name(), current.name());
            }
            Ok(())
        }
        Transition::Blocked { stage, reason } => {
            let hint = if forward && *stage != Stage::Completed {
                " (use --force to override)"
            } else {
                ""
            };
            Err(TrackError::InvalidRecord(format!(
                "{} at stage {}: {}{}",
                change.drive.id,
                stage.name(),
                reason,
                hint
            )))
        }
    }
}

// =============================================================================
// GROUPING COMMANDS
// =============================================================================

pub fn cmd_remaining(store: &StoreLocation, json_mode: bool, drive: &str) -> Result<(), TrackError> {
    let tracker = load_or_create_tracker(store)?;
    let students = tracker.remaining_students(&DriveId::new(drive))?;

    if json_mode {
        print_json(&students);
        return Ok(());
    }
    println!("{} students without a group", students.len());
    for s in &students {
        println!("  {}", s);
    }
    Ok(())
}

pub fn cmd_auto_group(store: &StoreLocation, json_mode: bool, drive: &str) -> Result<(), TrackError> {
    let drive_id = DriveId::new(drive);
    let report = with_tracker(store, |tracker| tracker.auto_group(&drive_id, now()))?;

    if json_mode {
        print_json(&report);
        return Ok(());
    }
    if report.created.is_empty() {
        println!("All students are already grouped");
    } else {
        println!(
            "{} auto-groups created for {} remaining students",
            report.created.len(),
            report.students_grouped
        );
        for g in &report.created {
            println!("  {} ({})", g.name, g.id);
        }
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
