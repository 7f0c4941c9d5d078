//! Downloadable archive assembly for batch artifacts.
//!
//! A batch's artifacts live either in its `plys/` subdirectory (video
//! batches) or directly in the workspace root (single-image batches). The
//! packager prefers the subdirectory when it exists, flattens every entry to
//! its bare filename (frame stems are unique within one batch by
//! construction), and treats zero matching artifacts as a valid, empty
//! archive.
#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions, clippy::multiple_crate_versions)]

mod error;

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use plyforge_workspace::{ARTIFACT_EXTENSION, OUTPUTS_DIR_NAME};
use tracing::info;
use uuid::Uuid;
use walkdir::WalkDir;
use zip::ZipWriter;
use zip::write::FileOptions;

pub use error::{ArchiveError, ArchiveResult};

/// Assemble the downloadable archive for one batch workspace.
///
/// Returns the path of the written archive,
/// `<workspace>/<batch_id>.zip`. Selection rule, in order: if the
/// frame-outputs subdirectory exists, every artifact file found under it
/// (recursively); otherwise the artifact files directly in the workspace
/// root. Entries are stored flat under their bare filenames.
///
/// # Errors
///
/// Returns [`ArchiveError::BatchNotFound`] when the workspace directory does
/// not exist (nothing is written in that case), and IO/zip errors when
/// collection or encoding fails.
pub fn package_batch(workspace: &Path, batch_id: Uuid) -> ArchiveResult<PathBuf> {
    if !workspace.is_dir() {
        return Err(ArchiveError::BatchNotFound { batch_id });
    }

    let artifacts = collect_artifacts(workspace)?;
    let archive_path = workspace.join(format!("{batch_id}.zip"));
    write_archive(&archive_path, &artifacts)?;

    info!(
        batch_id = %batch_id,
        entries = artifacts.len(),
        archive = %archive_path.display(),
        "packaged batch artifacts"
    );
    Ok(archive_path)
}

/// Locate the artifact files the archive will contain, in a deterministic
/// order.
fn collect_artifacts(workspace: &Path) -> ArchiveResult<Vec<PathBuf>> {
    let outputs_dir = workspace.join(OUTPUTS_DIR_NAME);
    let mut artifacts = if outputs_dir.is_dir() {
        collect_recursive(&outputs_dir)?
    } else {
        collect_flat(workspace)?
    };
    artifacts.sort();
    Ok(artifacts)
}

fn collect_recursive(dir: &Path) -> ArchiveResult<Vec<PathBuf>> {
    let mut artifacts = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry =
            entry.map_err(|source| ArchiveError::walkdir("collect.walk", dir, source))?;
        if entry.file_type().is_file() && has_artifact_extension(entry.path()) {
            artifacts.push(entry.into_path());
        }
    }
    Ok(artifacts)
}

fn collect_flat(dir: &Path) -> ArchiveResult<Vec<PathBuf>> {
    let mut artifacts = Vec::new();
    let entries =
        fs::read_dir(dir).map_err(|source| ArchiveError::io("collect.read_dir", dir, source))?;
    for entry in entries {
        let entry =
            entry.map_err(|source| ArchiveError::io("collect.read_dir_entry", dir, source))?;
        let path = entry.path();
        if path.is_file() && has_artifact_extension(&path) {
            artifacts.push(path);
        }
    }
    Ok(artifacts)
}

fn has_artifact_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(ARTIFACT_EXTENSION))
}

fn write_archive(archive_path: &Path, artifacts: &[PathBuf]) -> ArchiveResult<()> {
    let file = File::create(archive_path)
        .map_err(|source| ArchiveError::io("write.create_archive", archive_path, source))?;
    let mut writer = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for artifact in artifacts {
        let name = artifact
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        writer
            .start_file(name, options)
            .map_err(|source| ArchiveError::zip("write.start_entry", artifact, source))?;
        let mut input = File::open(artifact)
            .map_err(|source| ArchiveError::io("write.open_artifact", artifact, source))?;
        io::copy(&mut input, &mut writer)
            .map_err(|source| ArchiveError::io("write.copy_artifact", artifact, source))?;
    }

    writer
        .finish()
        .map_err(|source| ArchiveError::zip("write.finish", archive_path, source))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn entry_names(archive_path: &Path) -> BTreeSet<String> {
        let file = File::open(archive_path).expect("open archive");
        let archive = ZipArchive::new(file).expect("decode archive");
        archive.file_names().map(str::to_string).collect()
    }

    #[test]
    fn video_batch_entries_are_bare_filenames() -> ArchiveResult<()> {
        let temp = TempDir::new().expect("tempdir");
        let workspace = temp.path();
        let outputs = workspace.join(OUTPUTS_DIR_NAME);
        fs::create_dir_all(outputs.join("nested")).expect("outputs dir");
        fs::write(outputs.join("a.ply"), b"cloud-a").expect("artifact a");
        fs::write(outputs.join("nested/b.ply"), b"cloud-b").expect("artifact b");
        fs::write(outputs.join("scratch.txt"), b"notes").expect("non-artifact");

        let batch_id = Uuid::new_v4();
        let archive_path = package_batch(workspace, batch_id)?;

        assert_eq!(archive_path, workspace.join(format!("{batch_id}.zip")));
        let names = entry_names(&archive_path);
        assert_eq!(
            names,
            BTreeSet::from(["a.ply".to_string(), "b.ply".to_string()])
        );
        Ok(())
    }

    #[test]
    fn single_image_batch_collects_workspace_root() -> ArchiveResult<()> {
        let temp = TempDir::new().expect("tempdir");
        let workspace = temp.path();
        fs::write(workspace.join("portrait.ply"), b"cloud").expect("artifact");
        fs::write(workspace.join("portrait.png"), b"pixels").expect("source image");

        let archive_path = package_batch(workspace, Uuid::new_v4())?;
        assert_eq!(
            entry_names(&archive_path),
            BTreeSet::from(["portrait.ply".to_string()])
        );
        Ok(())
    }

    #[test]
    fn unknown_batch_fails_without_writing() {
        let temp = TempDir::new().expect("tempdir");
        let workspace = temp.path().join("missing-batch");
        let batch_id = Uuid::new_v4();

        let err = package_batch(&workspace, batch_id).expect_err("packaging should fail");
        assert!(matches!(
            err,
            ArchiveError::BatchNotFound { batch_id: id } if id == batch_id
        ));
        assert!(!workspace.exists(), "no filesystem writes on failure");
    }

    #[test]
    fn zero_artifacts_still_produce_a_valid_empty_archive() -> ArchiveResult<()> {
        let temp = TempDir::new().expect("tempdir");
        let archive_path = package_batch(temp.path(), Uuid::new_v4())?;
        assert!(entry_names(&archive_path).is_empty());
        Ok(())
    }

    #[test]
    fn repackaging_excludes_the_previous_archive() -> ArchiveResult<()> {
        let temp = TempDir::new().expect("tempdir");
        let workspace = temp.path();
        fs::write(workspace.join("frame.ply"), b"cloud").expect("artifact");

        let batch_id = Uuid::new_v4();
        package_batch(workspace, batch_id)?;
        let archive_path = package_batch(workspace, batch_id)?;
        assert_eq!(
            entry_names(&archive_path),
            BTreeSet::from(["frame.ply".to_string()])
        );
        Ok(())
    }
}
