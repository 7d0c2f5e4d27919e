//! Per-step artifact directories under `.migrator/steps/<step>/`.
//!
//! Each step snapshots the files it touched, the prompts and completions it
//! exchanged, the raw test report, and a `meta.json` summary that `migrator
//! report` later assembles into `report.yaml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::types::{StepName, TestDiff};
use crate::io::layout::MigratorPaths;

/// Paths inside one step's artifact directory.
#[derive(Debug, Clone)]
pub struct StepPaths {
    pub dir: PathBuf,
    /// Post-step copies of the files the step touched, keyed by repo-relative
    /// path.
    pub files_dir: PathBuf,
    pub prompts_dir: PathBuf,
    pub completions_dir: PathBuf,
    pub test_report_path: PathBuf,
    pub test_log_path: PathBuf,
    pub meta_path: PathBuf,
}

impl StepPaths {
    pub fn new(paths: &MigratorPaths, step: StepName) -> Self {
        let dir = paths.step_dir(step);
        Self {
            files_dir: dir.join("files"),
            prompts_dir: dir.join("prompts"),
            completions_dir: dir.join("completions"),
            test_report_path: dir.join("test-report.json"),
            test_log_path: dir.join("test.log"),
            meta_path: dir.join("meta.json"),
            dir,
        }
    }

    pub fn file_path(&self, relpath: &str) -> PathBuf {
        self.files_dir.join(relpath)
    }

    pub fn prompt_path(&self, relpath: &str) -> PathBuf {
        self.prompts_dir.join(format!("{relpath}.md"))
    }

    pub fn completion_path(&self, relpath: &str) -> PathBuf {
        self.completions_dir.join(format!("{relpath}.md"))
    }
}

/// Summary of one completed step, persisted as `meta.json`.
///
/// Carries everything `migrator report` needs, so assembling `report.yaml`
/// never re-parses raw test reports.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepMeta {
    pub step: StepName,
    /// Repo-relative paths of the files this step rewrote, sorted.
    pub files: Vec<String>,
    /// Status changes relative to the premig baseline.
    pub test_diffs: Vec<TestDiff>,
    /// Total number of tests collected in this step's run.
    pub tests_total: usize,
    pub duration_ms: u64,
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
}

/// Copy the current working-tree content of `relpath` into the step's
/// `files/` directory.
pub fn snapshot_file(step: &StepPaths, root: &Path, relpath: &str) -> Result<()> {
    let src = root.join(relpath);
    let dst = step.file_path(relpath);
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create snapshot dir {}", parent.display()))?;
    }
    fs::copy(&src, &dst)
        .with_context(|| format!("snapshot {} to {}", src.display(), dst.display()))?;
    Ok(())
}

/// Read a previously snapshotted file back, if the step captured it.
pub fn read_snapshot(step: &StepPaths, relpath: &str) -> Result<Option<String>> {
    let path = step.file_path(relpath);
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(&path)
        .with_context(|| format!("read snapshot {}", path.display()))?;
    Ok(Some(contents))
}

pub fn write_prompt(step: &StepPaths, relpath: &str, prompt: &str) -> Result<()> {
    write_artifact(&step.prompt_path(relpath), prompt)
}

pub fn write_completion(step: &StepPaths, relpath: &str, completion: &str) -> Result<()> {
    write_artifact(&step.completion_path(relpath), completion)
}

fn write_artifact(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create artifact dir {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

pub fn write_meta(step: &StepPaths, meta: &StepMeta) -> Result<()> {
    let mut contents = serde_json::to_string_pretty(meta).context("serialize step meta")?;
    contents.push('\n');
    fs::write(&step.meta_path, contents)
        .with_context(|| format!("write {}", step.meta_path.display()))
}

pub fn read_meta(step: &StepPaths) -> Result<StepMeta> {
    let contents = fs::read_to_string(&step.meta_path)
        .with_context(|| format!("read {}", step.meta_path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("parse {}", step.meta_path.display()))
}

/// Read a step's meta if the step has completed, `None` otherwise.
pub fn try_read_meta(step: &StepPaths) -> Result<Option<StepMeta>> {
    if !step.meta_path.exists() {
        return Ok(None);
    }
    read_meta(step).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TestStatus;

    fn step_paths(root: &Path) -> StepPaths {
        StepPaths::new(&MigratorPaths::new(root), StepName::Llmmig)
    }

    #[test]
    fn snapshot_preserves_nested_relative_paths() {
        let temp = tempfile::tempdir().expect("tempdir");
        let step = step_paths(temp.path());
        fs::create_dir_all(temp.path().join("src/pkg")).expect("mkdir");
        fs::write(temp.path().join("src/pkg/client.py"), "import httpx\n").expect("write");

        snapshot_file(&step, temp.path(), "src/pkg/client.py").expect("snapshot");

        let back = read_snapshot(&step, "src/pkg/client.py").expect("read");
        assert_eq!(back.as_deref(), Some("import httpx\n"));
        assert!(step.files_dir.join("src/pkg/client.py").is_file());
    }

    #[test]
    fn missing_snapshot_reads_as_none() {
        let temp = tempfile::tempdir().expect("tempdir");
        let step = step_paths(temp.path());
        assert_eq!(read_snapshot(&step, "src/absent.py").expect("read"), None);
    }

    #[test]
    fn prompt_and_completion_land_in_parallel_trees() {
        let temp = tempfile::tempdir().expect("tempdir");
        let step = step_paths(temp.path());

        write_prompt(&step, "src/client.py", "rewrite this").expect("prompt");
        write_completion(&step, "src/client.py", "```python\n```\n").expect("completion");

        assert!(step.prompts_dir.join("src/client.py.md").is_file());
        assert!(step.completions_dir.join("src/client.py.md").is_file());
    }

    #[test]
    fn meta_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let step = step_paths(temp.path());
        fs::create_dir_all(&step.dir).expect("mkdir");

        let meta = StepMeta {
            step: StepName::Llmmig,
            files: vec!["src/client.py".to_string()],
            test_diffs: vec![TestDiff {
                test: "tests/test_client.py::test_get".to_string(),
                before: Some(TestStatus::Passed),
                after: Some(TestStatus::Failed),
            }],
            tests_total: 12,
            duration_ms: 4321,
            prompt_tokens: Some(900),
            completion_tokens: Some(350),
        };
        write_meta(&step, &meta).expect("write");

        assert_eq!(read_meta(&step).expect("read"), meta);
        assert_eq!(try_read_meta(&step).expect("try"), Some(meta));
    }

    #[test]
    fn absent_meta_is_none() {
        let temp = tempfile::tempdir().expect("tempdir");
        let step = step_paths(temp.path());
        assert_eq!(try_read_meta(&step).expect("try"), None);
    }
}
