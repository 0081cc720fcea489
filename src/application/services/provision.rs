//! Instance provisioning: immutable timestamped snapshots of the working
//! tree, one per deployment attempt.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;

/// Version-control metadata directory excluded from every snapshot.
const VCS_METADATA_DIR: &str = ".git";

/// Materialize a new instance directory from `work_tree` under
/// `instances_root`, named by a millisecond timestamp. A collision within
/// the same millisecond bumps the name until it is unused, so instance names
/// stay monotonically increasing.
///
/// # Errors
///
/// Returns an error when the destination cannot be created or any entry
/// cannot be copied.
pub fn provision_instance(work_tree: &Path, instances_root: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(instances_root)
        .with_context(|| format!("creating instances root {}", instances_root.display()))?;

    let mut stamp = Utc::now().timestamp_millis();
    let dest = loop {
        let candidate = instances_root.join(stamp.to_string());
        if !candidate.exists() {
            break candidate;
        }
        stamp += 1;
    };
    std::fs::create_dir(&dest)
        .with_context(|| format!("creating instance dir {}", dest.display()))?;
    copy_tree(work_tree, &dest)?;
    Ok(dest)
}

fn copy_tree(src: &Path, dest: &Path) -> Result<()> {
    let entries =
        std::fs::read_dir(src).with_context(|| format!("reading {}", src.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("reading {}", src.display()))?;
        let name = entry.file_name();
        if name == VCS_METADATA_DIR {
            continue;
        }
        let from = entry.path();
        let to = dest.join(&name);
        let kind = entry
            .file_type()
            .with_context(|| format!("inspecting {}", from.display()))?;
        if kind.is_dir() {
            std::fs::create_dir(&to)
                .with_context(|| format!("creating {}", to.display()))?;
            copy_tree(&from, &to)?;
        } else if kind.is_file() {
            std::fs::copy(&from, &to)
                .with_context(|| format!("copying {} to {}", from.display(), to.display()))?;
        }
        // Symlinks and other special entries are not part of a source snapshot.
    }
    Ok(())
}
