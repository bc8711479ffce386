//! On-disk run store.
//!
//! Layout: `<root>/<run_id>/{manifest.json, checkpoints.jsonl, weights.safetensors}`.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::types::{CheckpointRecord, RunManifest};
use crate::{ResultsError, ResultsResult, compute_run_id};

const MANIFEST: &str = "manifest.json";
const CHECKPOINTS: &str = "checkpoints.jsonl";
const WEIGHTS: &str = "weights.safetensors";

#[derive(Clone, Debug)]
pub struct RunStore {
    root: PathBuf,
}

impl RunStore {
    /// Store rooted at `root`, creating the directory if needed.
    pub fn new(root: PathBuf) -> ResultsResult<Self> {
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Open an existing store without creating anything on disk.
    pub fn open(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root
    }

    /// Fresh run id stamped with the current UTC time.
    pub fn new_run_id(config: &serde_json::Value) -> (String, String) {
        let timestamp = chrono::Utc::now().to_rfc3339();
        (compute_run_id(config, &timestamp), timestamp)
    }

    fn file(&self, run_id: &str, name: &str) -> PathBuf {
        self.root.join(run_id).join(name)
    }

    /// Read a run file, mapping a missing file to `RunNotFound`.
    fn read(&self, run_id: &str, name: &str) -> ResultsResult<String> {
        let path = self.file(run_id, name);
        if !path.is_file() {
            return Err(ResultsError::RunNotFound {
                run_id: run_id.to_owned(),
            });
        }
        Ok(fs::read_to_string(path)?)
    }

    pub fn has_run(&self, run_id: &str) -> bool {
        self.file(run_id, MANIFEST).is_file()
    }

    /// Where a run's weights live; the run directory is created on demand.
    pub fn weights_path(&self, run_id: &str) -> ResultsResult<PathBuf> {
        fs::create_dir_all(self.root.join(run_id))?;
        Ok(self.file(run_id, WEIGHTS))
    }

    /// Write the manifest and the checkpoint history, replacing earlier copies.
    pub fn save_run(
        &self,
        manifest: &RunManifest,
        checkpoints: &[CheckpointRecord],
    ) -> ResultsResult<()> {
        fs::create_dir_all(self.root.join(&manifest.run_id))?;

        fs::write(
            self.file(&manifest.run_id, MANIFEST),
            serde_json::to_string_pretty(manifest)?,
        )?;

        let mut out = BufWriter::new(File::create(self.file(&manifest.run_id, CHECKPOINTS))?);
        for record in checkpoints {
            serde_json::to_writer(&mut out, record)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
        Ok(())
    }

    pub fn load_manifest(&self, run_id: &str) -> ResultsResult<RunManifest> {
        Ok(serde_json::from_str(&self.read(run_id, MANIFEST)?)?)
    }

    pub fn load_checkpoints(&self, run_id: &str) -> ResultsResult<Vec<CheckpointRecord>> {
        self.read(run_id, CHECKPOINTS)?
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(ResultsError::from))
            .collect()
    }

    /// All readable runs, oldest first. Directories without a valid manifest
    /// are skipped.
    pub fn list_runs(&self) -> ResultsResult<Vec<RunManifest>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let run_id = entry.file_name().to_string_lossy().into_owned();
            match self.load_manifest(&run_id) {
                Ok(m) => runs.push(m),
                Err(e) => tracing::debug!(run_id = %run_id, error = %e, "skipping run directory"),
            }
        }
        runs.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(runs)
    }
}
