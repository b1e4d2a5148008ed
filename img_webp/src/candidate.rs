//! Conversion candidates, output path derivation and selection rules.

use crate::error::{ConvertError, Result};
use serde::{Deserialize, Serialize};
use shared_utils::{display_name, has_extension};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Source extensions that can be converted (compared case-insensitively).
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

pub const WEBP_EXTENSION: &str = "webp";

/// Default upper bound on how many files one batch may contain.
pub const DEFAULT_MAX_FILES: usize = 5;

pub fn is_supported_image(path: &Path) -> bool {
    has_extension(path, SUPPORTED_EXTENSIONS)
}

/// Lifecycle of one candidate inside a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    Pending,
    Estimating,
    Converting,
    Done,
    Failed,
    Skipped,
}

impl CandidateStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CandidateStatus::Done | CandidateStatus::Failed | CandidateStatus::Skipped
        )
    }

    /// Whether `self -> next` is a legal step of the lifecycle.
    pub fn can_transition_to(self, next: CandidateStatus) -> bool {
        use CandidateStatus::*;
        match (self, next) {
            (Pending, Estimating | Converting | Skipped) => true,
            (Estimating | Converting, Done | Failed | Skipped) => true,
            _ => false,
        }
    }
}

/// One selected file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub path: PathBuf,
    pub size: u64,
    pub is_dir: bool,
}

impl Candidate {
    pub fn new(path: impl Into<PathBuf>, size: u64, is_dir: bool) -> Self {
        Self {
            path: path.into(),
            size,
            is_dir,
        }
    }

    /// Build a candidate from filesystem metadata.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let meta = fs::metadata(&path)?;
        Ok(Self {
            size: if meta.is_dir() { 0 } else { meta.len() },
            is_dir: meta.is_dir(),
            path,
        })
    }

    /// Like [`Candidate::from_path`], but an unreadable path still yields a
    /// candidate (size 0, not a directory). Its I/O error then surfaces as a
    /// per-file failure when the file is processed.
    pub fn discover(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::from_path(&path) {
            Ok(candidate) => candidate,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Cannot stat selected file");
                Self::new(path, 0, false)
            }
        }
    }

    pub fn name(&self) -> String {
        display_name(&self.path)
    }

    pub fn is_supported(&self) -> bool {
        !self.is_dir && is_supported_image(&self.path)
    }
}

/// `{dir}/{stem}.webp` next to the input. The extension is replaced, never
/// appended; a name without an extension gets `.webp` added.
pub fn webp_output_path(input: &Path) -> Result<PathBuf> {
    let output = input.with_extension(WEBP_EXTENSION);
    if output == input {
        return Err(ConvertError::OutputPathCollision(input.to_path_buf()));
    }
    Ok(output)
}

/// What to do when the destination already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Replace the existing file.
    #[default]
    Overwrite,
    /// Leave the existing file and record the candidate as skipped.
    Skip,
    /// Write to `{stem}-1.webp`, `{stem}-2.webp`, ...
    Rename,
}

/// Destination decided for one candidate before dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputPlan {
    Write(PathBuf),
    Skip(String),
}

/// Resolves destinations for one batch. Paths handed out are remembered so
/// two candidates sharing a stem (`a.png`, `a.jpg`) never race on one file
/// under `Skip` or `Rename`.
#[derive(Debug)]
pub struct OutputPlanner {
    policy: CollisionPolicy,
    claimed: HashSet<PathBuf>,
}

impl OutputPlanner {
    pub fn new(policy: CollisionPolicy) -> Self {
        Self {
            policy,
            claimed: HashSet::new(),
        }
    }

    pub fn plan(&mut self, input: &Path) -> Result<OutputPlan> {
        let output = webp_output_path(input)?;
        let taken = |p: &Path, claimed: &HashSet<PathBuf>| p.exists() || claimed.contains(p);

        let plan = match self.policy {
            CollisionPolicy::Overwrite => OutputPlan::Write(output),
            CollisionPolicy::Skip => {
                if taken(&output, &self.claimed) {
                    OutputPlan::Skip("Output file exists".to_string())
                } else {
                    OutputPlan::Write(output)
                }
            }
            CollisionPolicy::Rename => {
                let mut candidate = output.clone();
                let stem = output
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_default();
                let mut n = 1;
                while taken(&candidate, &self.claimed) {
                    candidate = output.with_file_name(format!("{}-{}.{}", stem, n, WEBP_EXTENSION));
                    n += 1;
                }
                OutputPlan::Write(candidate)
            }
        };

        if let OutputPlan::Write(ref path) = plan {
            self.claimed.insert(path.clone());
        }
        Ok(plan)
    }
}

/// Reject empty selections and selections above `max_files`.
pub fn validate_selection(count: usize, max_files: usize) -> Result<()> {
    if count == 0 {
        return Err(ConvertError::NoFilesSelected);
    }
    if count > max_files {
        return Err(ConvertError::SelectionLimitExceeded {
            selected: count,
            max: max_files,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    #[test]
    fn test_supported_extensions_case_insensitive() {
        assert!(is_supported_image(Path::new("a.png")));
        assert!(is_supported_image(Path::new("a.JPG")));
        assert!(is_supported_image(Path::new("a.JpEg")));
        assert!(!is_supported_image(Path::new("a.webp")));
        assert!(!is_supported_image(Path::new("a.txt")));
        assert!(!is_supported_image(Path::new("png")));
    }

    #[test]
    fn test_directory_never_supported() {
        let dir = Candidate::new("/tmp/photos.png", 0, true);
        assert!(!dir.is_supported());
    }

    #[test]
    fn test_discover_reads_metadata() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.png");
        std::fs::write(&file, b"12345").unwrap();

        let found = Candidate::discover(&file);
        assert_eq!(found.size, 5);
        assert!(!found.is_dir);
        assert!(Candidate::discover(dir.path()).is_dir);
    }

    #[test]
    fn test_discover_keeps_missing_file() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("gone.png");

        let candidate = Candidate::discover(&missing);
        assert_eq!(candidate, Candidate::new(missing, 0, false));
        assert!(candidate.is_supported());
    }

    #[test]
    fn test_output_path_replaces_extension() {
        assert_eq!(
            webp_output_path(Path::new("/img/cat.png")).unwrap(),
            PathBuf::from("/img/cat.webp")
        );
        assert_eq!(
            webp_output_path(Path::new("/img/archive.tar.JPG")).unwrap(),
            PathBuf::from("/img/archive.tar.webp")
        );
    }

    #[test]
    fn test_output_path_rejects_identity() {
        assert!(matches!(
            webp_output_path(Path::new("/img/cat.webp")),
            Err(ConvertError::OutputPathCollision(_))
        ));
    }

    #[test]
    fn test_status_transitions() {
        use CandidateStatus::*;
        assert!(Pending.can_transition_to(Converting));
        assert!(Pending.can_transition_to(Skipped));
        assert!(Converting.can_transition_to(Done));
        assert!(Estimating.can_transition_to(Failed));
        assert!(!Done.can_transition_to(Converting));
        assert!(!Pending.can_transition_to(Done));
        assert!(Failed.is_terminal());
        assert!(!Converting.is_terminal());
    }

    #[test]
    fn test_validate_selection() {
        assert!(matches!(
            validate_selection(0, 5),
            Err(ConvertError::NoFilesSelected)
        ));
        assert!(validate_selection(5, 5).is_ok());
        assert!(matches!(
            validate_selection(6, 5),
            Err(ConvertError::SelectionLimitExceeded { selected: 6, max: 5 })
        ));
    }

    #[test]
    fn test_planner_overwrite_keeps_existing_path() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.webp"), b"old").unwrap();

        let mut planner = OutputPlanner::new(CollisionPolicy::Overwrite);
        assert_eq!(
            planner.plan(&dir.path().join("a.png")).unwrap(),
            OutputPlan::Write(dir.path().join("a.webp"))
        );
    }

    #[test]
    fn test_planner_skip_existing_and_claimed() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.webp"), b"old").unwrap();

        let mut planner = OutputPlanner::new(CollisionPolicy::Skip);
        assert!(matches!(
            planner.plan(&dir.path().join("a.png")).unwrap(),
            OutputPlan::Skip(_)
        ));
        assert_eq!(
            planner.plan(&dir.path().join("b.png")).unwrap(),
            OutputPlan::Write(dir.path().join("b.webp"))
        );
        assert!(matches!(
            planner.plan(&dir.path().join("b.jpg")).unwrap(),
            OutputPlan::Skip(_)
        ));
    }

    #[test]
    fn test_planner_rename() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.webp"), b"old").unwrap();

        let mut planner = OutputPlanner::new(CollisionPolicy::Rename);
        assert_eq!(
            planner.plan(&dir.path().join("a.png")).unwrap(),
            OutputPlan::Write(dir.path().join("a-1.webp"))
        );
        assert_eq!(
            planner.plan(&dir.path().join("a.jpg")).unwrap(),
            OutputPlan::Write(dir.path().join("a-2.webp"))
        );
    }

    proptest! {
        #[test]
        fn prop_output_differs_only_in_extension(
            dir in "[a-z]{1,6}(/[a-z]{1,6}){0,2}",
            stem in "[A-Za-z0-9_]{1,10}",
            ext in prop::sample::select(vec!["png", "PNG", "jpg", "Jpg", "jpeg", "JPEG"]),
        ) {
            let input = PathBuf::from(&dir).join(format!("{}.{}", stem, ext));
            let output = webp_output_path(&input).unwrap();

            prop_assert_ne!(&output, &input);
            prop_assert_eq!(output.parent(), input.parent());
            prop_assert_eq!(output.file_stem(), input.file_stem());
            prop_assert_eq!(output.extension().and_then(|e| e.to_str()), Some("webp"));
        }
    }
}
