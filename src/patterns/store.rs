//! Pattern store: load-time validation and immutable lookup

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use super::profile::{RecoilStep, WeaponParams, WeaponProfile};

/// Conversion factor applied to raw pattern offsets before sensitivity division
const SENSITIVITY_MULTIPLIER: f64 = 2.45;

/// The weapons document: one [`WeaponParams`] entry per supported weapon
#[derive(Debug, Clone, Deserialize)]
pub struct WeaponsDocument {
    pub weapons: Vec<WeaponParams>,
}

impl WeaponsDocument {
    pub fn from_file(path: &Path) -> Result<Self, LoadError> {
        let raw = std::fs::read_to_string(path).map_err(|source| LoadError::Document {
            path: path.to_path_buf(),
            reason: source.to_string(),
        })?;
        serde_json::from_str(&raw).map_err(|source| LoadError::Document {
            path: path.to_path_buf(),
            reason: source.to_string(),
        })
    }
}

/// Pattern and weapon-document load failures.
///
/// `Document` is fatal to the load; every other variant is scoped to one
/// weapon and leaves the rest of the store usable.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("weapons document {path} unusable: {reason}")]
    Document { path: PathBuf, reason: String },

    #[error("weapon '{weapon}': pattern file {path} not readable: {reason}")]
    PatternFile {
        weapon: String,
        path: PathBuf,
        reason: String,
    },

    #[error("weapon '{weapon}': line {line} is not `dx,dy,interval_ms`: {reason}")]
    BadRow {
        weapon: String,
        line: usize,
        reason: String,
    },

    #[error("weapon '{weapon}': line {line} has a negative interval")]
    NegativeInterval { weapon: String, line: usize },

    #[error("weapon '{weapon}': expected {expected} pattern rows, found {actual}")]
    RowCount {
        weapon: String,
        expected: usize,
        actual: usize,
    },

    #[error("weapon '{weapon}': duplicate weapon id in document")]
    DuplicateId { weapon: String },
}

/// Immutable per-weapon table built once at startup.
///
/// Shared read access only after construction; no interior mutability.
pub struct PatternStore {
    weapons: HashMap<String, Arc<WeaponProfile>>,
    /// Telemetry weapon name -> weapon id
    aliases: HashMap<String, String>,
}

impl PatternStore {
    /// Build the store from the weapons document and the pattern directory.
    ///
    /// A malformed pattern or parameter set fails only that weapon; the
    /// failures are returned alongside the store for reporting.
    pub fn load(
        doc: WeaponsDocument,
        patterns_dir: &Path,
        game_sensitivity: f64,
    ) -> (Self, Vec<LoadError>) {
        let mut weapons = HashMap::new();
        let mut aliases = HashMap::new();
        let mut failures = Vec::new();

        for params in doc.weapons {
            if weapons.contains_key(&params.id) {
                failures.push(LoadError::DuplicateId {
                    weapon: params.id.clone(),
                });
                continue;
            }

            let path = patterns_dir.join(format!("{}.csv", params.id));
            let raw = match load_pattern_file(&params.id, &path, game_sensitivity) {
                Ok(raw) => raw,
                Err(e) => {
                    failures.push(e);
                    continue;
                }
            };

            if raw.len() != params.length {
                failures.push(LoadError::RowCount {
                    weapon: params.id.clone(),
                    expected: params.length,
                    actual: raw.len(),
                });
                continue;
            }

            let profile = Arc::new(WeaponProfile::new(params, raw));
            for name in &profile.telemetry_names {
                aliases.insert(name.clone(), profile.id.clone());
            }
            debug!(
                weapon = %profile.id,
                rows = profile.length,
                subdivision = profile.subdivision,
                steps = profile.resolved_pattern().len(),
                "weapon profile loaded"
            );
            weapons.insert(profile.id.clone(), profile);
        }

        if weapons.is_empty() {
            warn!("no weapon profiles loaded");
        } else {
            let mut ids: Vec<&str> = weapons.keys().map(String::as_str).collect();
            ids.sort_unstable();
            info!(count = weapons.len(), weapons = %ids.join(", "), "pattern store ready");
        }

        (Self { weapons, aliases }, failures)
    }

    pub fn get(&self, weapon_id: &str) -> Option<&Arc<WeaponProfile>> {
        self.weapons.get(weapon_id)
    }

    /// Map a telemetry weapon name to its profile, if supported
    pub fn resolve_telemetry_name(&self, name: &str) -> Option<&Arc<WeaponProfile>> {
        self.aliases.get(name).and_then(|id| self.weapons.get(id))
    }

    pub fn contains(&self, weapon_id: &str) -> bool {
        self.weapons.contains_key(weapon_id)
    }

    pub fn len(&self) -> usize {
        self.weapons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weapons.is_empty()
    }
}

/// Parse one pattern file: `dx,dy,interval_ms` per line, sensitivity applied.
///
/// A single bad row fails the whole file; the caller scopes that failure to
/// this weapon alone.
fn load_pattern_file(
    weapon: &str,
    path: &Path,
    game_sensitivity: f64,
) -> Result<Vec<RecoilStep>, LoadError> {
    let raw = std::fs::read_to_string(path).map_err(|source| LoadError::PatternFile {
        weapon: weapon.to_string(),
        path: path.to_path_buf(),
        reason: source.to_string(),
    })?;

    let mut pattern = Vec::new();

    // Pattern exports sometimes carry a BOM
    for (line_no, line) in raw.trim_start_matches('\u{feff}').lines().enumerate() {
        let line_no = line_no + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != 3 {
            return Err(LoadError::BadRow {
                weapon: weapon.to_string(),
                line: line_no,
                reason: format!("{} fields", fields.len()),
            });
        }

        let parse = |field: &str| -> Result<f64, LoadError> {
            field.parse::<f64>().map_err(|e| LoadError::BadRow {
                weapon: weapon.to_string(),
                line: line_no,
                reason: e.to_string(),
            })
        };

        let dx = parse(fields[0])? * SENSITIVITY_MULTIPLIER / game_sensitivity;
        let dy = parse(fields[1])? * SENSITIVITY_MULTIPLIER / game_sensitivity;
        let interval_ms = (parse(fields[2])? * 10.0).round() / 10.0;

        if interval_ms < 0.0 {
            return Err(LoadError::NegativeInterval {
                weapon: weapon.to_string(),
                line: line_no,
            });
        }

        pattern.push(RecoilStep {
            dx,
            dy,
            interval_ms,
        });
    }

    Ok(pattern)
}
