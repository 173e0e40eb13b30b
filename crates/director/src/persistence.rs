use std::collections::HashMap;
use std::fmt::Display;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::atomic_io::write_text_atomic;
use crate::math::Vec3;
use crate::record::EntityRecord;
use crate::worker::PoolSnapshot;

pub const SAVE_VERSION: u32 = 1;
const SAVE_EXTENSION: &str = "save.json";

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("save slot name must be non-empty and free of path separators, got {0:?}")]
    InvalidSlot(String),
    #[error("no save at {}", path.display())]
    Missing { path: PathBuf },
    #[error("read save '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("write save '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("encode save json: {source}")]
    Encode {
        #[source]
        source: serde_json::Error,
    },
    #[error("parse save json: {source}")]
    Parse {
        #[source]
        source: serde_json::Error,
    },
    #[error("parse save json at {path}: {source}")]
    ParseAt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("validation failed at {path}: {message}")]
    Invalid { path: String, message: String },
    #[error("background worker did not acknowledge the pause")]
    WorkerUnavailable,
}

/// Everything needed to rebuild the background population.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaveState {
    pub save_version: u32,
    pub background: Vec<EntityRecord>,
    pub ready_for_promotion: Vec<EntityRecord>,
    pub demoted_names: Vec<String>,
}

impl SaveState {
    pub fn new(pool: PoolSnapshot, demoted_names: Vec<String>) -> Self {
        Self {
            save_version: SAVE_VERSION,
            background: pool.background,
            ready_for_promotion: pool.ready_for_promotion,
            demoted_names,
        }
    }

    pub fn into_parts(self) -> (PoolSnapshot, Vec<String>) {
        (
            PoolSnapshot {
                background: self.background,
                ready_for_promotion: self.ready_for_promotion,
            },
            self.demoted_names,
        )
    }
}

pub fn save_path(save_dir: &Path, slot: &str, index: u32) -> Result<PathBuf, PersistenceError> {
    if slot.is_empty() || slot.contains(['/', '\\']) || slot == "." || slot == ".." {
        return Err(PersistenceError::InvalidSlot(slot.to_string()));
    }
    Ok(save_dir.join(format!("{slot}_{index}.{SAVE_EXTENSION}")))
}

pub fn write_save(path: &Path, state: &SaveState) -> Result<(), PersistenceError> {
    let json = serde_json::to_string_pretty(state)
        .map_err(|source| PersistenceError::Encode { source })?;
    write_text_atomic(path, &json).map_err(|source| PersistenceError::Write {
        path: path.to_path_buf(),
        source,
    })
}

pub fn read_save(path: &Path) -> Result<SaveState, PersistenceError> {
    let raw = fs::read_to_string(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            PersistenceError::Missing {
                path: path.to_path_buf(),
            }
        } else {
            PersistenceError::Read {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    let state = parse_save_json(&raw)?;
    validate_save(&state)?;
    Ok(state)
}

pub fn parse_save_json(raw: &str) -> Result<SaveState, PersistenceError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize::<_, SaveState>(&mut deserializer).map_err(|error| {
        let path = error.path().to_string();
        let source = error.into_inner();
        if path.is_empty() || path == "." {
            PersistenceError::Parse { source }
        } else {
            PersistenceError::ParseAt { path, source }
        }
    })
}

fn invalid(path: impl Into<String>, message: impl Into<String>) -> PersistenceError {
    PersistenceError::Invalid {
        path: path.into(),
        message: message.into(),
    }
}

fn expected_actual(
    path: impl Into<String>,
    expected: impl Display,
    actual: impl Display,
) -> PersistenceError {
    invalid(path, format!("expected {expected}, got {actual}"))
}

fn check_finite(path: &str, value: Vec3) -> Result<(), PersistenceError> {
    if value.is_finite() {
        return Ok(());
    }
    Err(expected_actual(
        path,
        "finite vector",
        format!("({}, {}, {})", value.x, value.y, value.z),
    ))
}

pub fn validate_save(state: &SaveState) -> Result<(), PersistenceError> {
    if state.save_version != SAVE_VERSION {
        return Err(expected_actual(
            "save_version",
            SAVE_VERSION,
            state.save_version,
        ));
    }

    let mut seen: HashMap<&str, String> = HashMap::new();
    let groups = [
        ("background", &state.background),
        ("ready_for_promotion", &state.ready_for_promotion),
    ];
    for (group, records) in groups {
        for (index, record) in records.iter().enumerate() {
            let base = format!("{group}[{index}]");
            if record.unique_name.trim().is_empty() {
                return Err(expected_actual(
                    format!("{base}.unique_name"),
                    "non-empty name",
                    "empty string",
                ));
            }
            if let Some(first) = seen.insert(record.unique_name.as_str(), base.clone()) {
                return Err(invalid(
                    format!("{base}.unique_name"),
                    format!(
                        "duplicate unique_name {:?} (first seen at {first}.unique_name)",
                        record.unique_name
                    ),
                ));
            }
            check_finite(&format!("{base}.location"), record.location)?;
            check_finite(&format!("{base}.scale"), record.scale)?;
            check_finite(&format!("{base}.spawn_location"), record.spawn_location)?;
            check_finite(&format!("{base}.target_location"), record.target_location)?;
            if !record.rotation.is_finite() {
                return Err(expected_actual(
                    format!("{base}.rotation"),
                    "finite rotation",
                    format!("{:?}", record.rotation),
                ));
            }
            for (point_index, point) in record.path.iter().enumerate() {
                check_finite(&format!("{base}.path[{point_index}]"), *point)?;
            }
        }
    }
    Ok(())
}
