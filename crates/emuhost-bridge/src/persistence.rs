//! Per-device NVRAM file naming and bulk save/load.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use emuhost_engine::{BiosSelection, Machine};

use crate::error::BridgeError;

/// Builds the file key of a device from its tag, the software mounted in its owner chain and
/// the BIOS selection.
///
/// ```
/// use emuhost_bridge::persistence::derive_key;
/// use emuhost_engine::BiosSelection;
///
/// let bios = BiosSelection { selected: 3, default: 1 };
/// assert_eq!(derive_key(":cart:sram", Some("tetris"), bios), "_2/tetris/cart_sram");
/// assert_eq!(derive_key(":nvram", None, BiosSelection::default()), "nvram");
/// ```
pub fn derive_key(tag: &str, software: Option<&str>, bios: BiosSelection) -> String {
    let mut segments = Vec::with_capacity(3);
    if bios.selected != 0 && bios.selected != bios.default {
        segments.push(format!("_{}", bios.selected - 1));
    }
    if let Some(software) = software {
        segments.push(path_segment(software));
    }
    segments.push(path_segment(tag.strip_prefix(':').unwrap_or(tag)));
    segments.join("/")
}

/// Maps a name onto a single path component that stays inside the NVRAM directory.
fn path_segment(name: &str) -> String {
    let segment = name.replace(&[':', '/', '\\'][..], "_");
    if segment.chars().all(|c| c == '.') {
        // "", "." and ".." would name the directory itself or its parent.
        return "_".repeat(segment.len().max(1));
    }
    segment
}

/// Software mounted in the device at `tag` or its nearest owner.
fn owning_software(machine: &dyn Machine, tag: &str) -> Option<String> {
    let mut seen = HashSet::new();
    let mut current = machine.device(tag);
    while let Some(device) = current {
        if device.software.is_some() {
            return device.software;
        }
        if !seen.insert(device.tag.clone()) {
            break;
        }
        current = device.owner.and_then(|owner| machine.device(&owner));
    }
    None
}

/// File key of the NVRAM device at `tag`.
pub fn filename_key(machine: &dyn Machine, tag: &str) -> String {
    derive_key(tag, owning_software(machine, tag).as_deref(), machine.bios())
}

/// File keys of every NVRAM device, in device-tree order.
pub fn filenames(machine: &dyn Machine) -> Vec<String> {
    machine
        .nvram_tags()
        .iter()
        .map(|tag| filename_key(machine, tag))
        .collect()
}

#[derive(Debug, Default)]
pub struct PersistenceReport {
    /// Keys written (save) or restored (load).
    pub completed: Vec<String>,
    /// Keys reset to defaults during load.
    pub reset: Vec<String>,
    /// Keys whose device had nothing to save.
    pub skipped: Vec<String>,
    pub failed: Vec<BridgeError>,
}

impl PersistenceReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

fn nvram_path(dir: &Path, key: &str) -> PathBuf {
    key.split('/').fold(dir.to_path_buf(), |path, segment| path.join(segment))
}

/// Saves every NVRAM device under `dir`. Failures are collected per device.
pub fn save_all(machine: &mut dyn Machine, dir: &Path) -> PersistenceReport {
    let mut report = PersistenceReport::default();

    for tag in machine.nvram_tags() {
        let key = filename_key(&*machine, &tag);
        let Some(nvram) = machine.nvram(&tag) else {
            report.failed.push(BridgeError::UnknownDevice(tag));
            continue;
        };
        if !nvram.can_save() {
            report.skipped.push(key);
            continue;
        }

        let path = nvram_path(dir, &key);
        let result = (|| {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = BufWriter::new(File::create(&path)?);
            nvram.save(&mut out)?;
            out.flush()
        })();

        match result {
            Ok(()) => {
                tracing::debug!(%tag, path = %path.display(), "saved nvram");
                report.completed.push(key);
            }
            Err(source) => {
                tracing::warn!(
                    %tag,
                    path = %path.display(),
                    error = %source,
                    "failed to save nvram"
                );
                report.failed.push(BridgeError::Io { key, source });
            }
        }
    }

    report
}

/// Restores every NVRAM device from `dir`, resetting the ones with no usable file.
pub fn load_all(machine: &mut dyn Machine, dir: &Path) -> PersistenceReport {
    let mut report = PersistenceReport::default();

    for tag in machine.nvram_tags() {
        let key = filename_key(&*machine, &tag);
        let Some(nvram) = machine.nvram(&tag) else {
            report.failed.push(BridgeError::UnknownDevice(tag));
            continue;
        };

        let path = nvram_path(dir, &key);
        let file = if nvram.backup_enabled() {
            File::open(&path).ok()
        } else {
            None
        };
        let Some(file) = file else {
            nvram.reset();
            report.reset.push(key);
            continue;
        };

        match nvram.load(&mut BufReader::new(file)) {
            Ok(()) => {
                tracing::debug!(%tag, path = %path.display(), "loaded nvram");
                report.completed.push(key);
            }
            Err(source) => {
                tracing::warn!(
                    %tag,
                    path = %path.display(),
                    error = %source,
                    "failed to load nvram"
                );
                nvram.reset();
                report.reset.push(key.clone());
                report.failed.push(BridgeError::Io { key, source });
            }
        }
    }

    report
}
