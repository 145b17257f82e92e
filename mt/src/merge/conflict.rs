//! Structured extraction of merge conflicts
//!
//! Turns a conflicting merge attempt into data: per-file marker spans parsed
//! from the marked working file, plus the clean per-side blob contents read
//! from the index stages so callers can render a real diff instead of
//! re-parsing marker soup.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::git::GitDriver;

use super::MergeError;

/// Content of one side of a conflicted file.
///
/// `Binary` stands in for blobs that are not UTF-8 text; `Absent` marks a
/// side that has no blob at all (delete/modify or rename conflicts) and is
/// distinct from an empty file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "kebab-case")]
pub enum BlobContent {
    Text(String),
    Binary,
    Absent,
}

impl BlobContent {
    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Binary)
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// The text, if this side is ordinary text content
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// One conflict-marker span in a marked working file.
///
/// Line numbers are 1-based and refer to the marker lines themselves
/// (`<<<<<<<`, `=======`, `>>>>>>>`). Diff3-style base sections (`|||||||`)
/// are recorded when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictMarker {
    pub start_line: usize,
    pub separator_line: usize,
    pub end_line: usize,
    pub base_line: Option<usize>,
}

impl ConflictMarker {
    /// Lines holding the "ours" section, as a half-open 1-based range
    pub fn ours_lines(&self) -> std::ops::Range<usize> {
        self.start_line + 1..self.base_line.unwrap_or(self.separator_line)
    }

    /// Lines holding the "theirs" section, as a half-open 1-based range
    pub fn theirs_lines(&self) -> std::ops::Range<usize> {
        self.separator_line + 1..self.end_line
    }
}

/// One file path under conflict within a single branch's merge attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictFile {
    /// Path relative to the repository root
    pub path: String,

    /// Marker spans found in the working file, in file order
    pub markers: Vec<ConflictMarker>,

    /// The file as it exists on the base branch at the point of conflict
    pub ours: BlobContent,

    /// The file as it exists on the incoming branch
    pub theirs: BlobContent,
}

/// Locate conflict-marker spans in file content.
///
/// Pure function over the text; tolerates diff3 base sections and ignores
/// stray separator-looking lines outside a `<<<<<<<`/`>>>>>>>` pair.
pub fn parse_markers(content: &str) -> Vec<ConflictMarker> {
    let mut markers = Vec::new();

    let mut start_line: Option<usize> = None;
    let mut base_line: Option<usize> = None;
    let mut separator_line: Option<usize> = None;

    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim_end_matches('\r');

        if line.starts_with("<<<<<<<") {
            start_line = Some(line_no);
            base_line = None;
            separator_line = None;
        } else if line.starts_with("|||||||") && start_line.is_some() && separator_line.is_none() {
            base_line = Some(line_no);
        } else if line == "=======" && start_line.is_some() && separator_line.is_none() {
            separator_line = Some(line_no);
        } else if line.starts_with(">>>>>>>") {
            if let (Some(start), Some(separator)) = (start_line, separator_line) {
                markers.push(ConflictMarker {
                    start_line: start,
                    separator_line: separator,
                    end_line: line_no,
                    base_line,
                });
            }
            start_line = None;
            base_line = None;
            separator_line = None;
        }
    }

    markers
}

fn classify(text: String) -> BlobContent {
    // NUL bytes survive lossy decoding and replacement characters mark
    // undecodable sequences; either means the blob is not text
    if text.contains('\0') || text.contains('\u{FFFD}') {
        BlobContent::Binary
    } else {
        BlobContent::Text(text)
    }
}

/// Read one side of a conflicted path from the index.
///
/// Stage 2 is "ours" (the base branch), stage 3 is "theirs" (the incoming
/// branch). A side with no stage entry is absent, which is how delete/modify
/// and rename conflicts show up.
async fn read_stage(
    driver: &dyn GitDriver,
    repo_root: &Path,
    stage: u8,
    path: &str,
) -> Result<BlobContent, MergeError> {
    let rev = format!(":{}:{}", stage, path);
    let output = driver.run(repo_root, &["show", &rev]).await?;

    if !output.success {
        debug!(%path, stage, "conflict::read_stage: no blob at stage");
        return Ok(BlobContent::Absent);
    }

    Ok(classify(output.stdout))
}

/// Build [`ConflictFile`] records for the paths git reports as unmerged
pub(crate) async fn extract_conflicts(
    driver: &dyn GitDriver,
    repo_root: &Path,
    paths: &[String],
) -> Result<Vec<ConflictFile>, MergeError> {
    let mut conflicts = Vec::with_capacity(paths.len());

    for path in paths {
        let markers = match tokio::fs::read(repo_root.join(path)).await {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(text) => parse_markers(&text),
                // Binary working file carries no textual markers
                Err(_) => Vec::new(),
            },
            // Deleted on one side; nothing on disk to scan
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(MergeError::Io(e)),
        };

        let ours = read_stage(driver, repo_root, 2, path).await?;
        let theirs = read_stage(driver, repo_root, 3, path).await?;

        debug!(%path, markers = markers.len(), "conflict::extract_conflicts: extracted");

        conflicts.push(ConflictFile {
            path: path.clone(),
            markers,
            ours,
            theirs,
        });
    }

    Ok(conflicts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_hunk() {
        let content = "\
fn main() {
<<<<<<< HEAD
    println!(\"ours\");
=======
    println!(\"theirs\");
>>>>>>> feature
}
";
        let markers = parse_markers(content);
        assert_eq!(markers.len(), 1);

        let marker = &markers[0];
        assert_eq!(marker.start_line, 2);
        assert_eq!(marker.separator_line, 4);
        assert_eq!(marker.end_line, 6);
        assert_eq!(marker.base_line, None);
        assert_eq!(marker.ours_lines(), 3..4);
        assert_eq!(marker.theirs_lines(), 5..6);
    }

    #[test]
    fn test_parse_two_hunks() {
        let content = "\
<<<<<<< HEAD
a
=======
b
>>>>>>> other
middle
<<<<<<< HEAD
c
=======
d
>>>>>>> other
";
        let markers = parse_markers(content);
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0].start_line, 1);
        assert_eq!(markers[0].end_line, 5);
        assert_eq!(markers[1].start_line, 7);
        assert_eq!(markers[1].end_line, 11);
    }

    #[test]
    fn test_parse_diff3_base_section() {
        let content = "\
<<<<<<< HEAD
ours
||||||| merged common ancestors
base
=======
theirs
>>>>>>> other
";
        let markers = parse_markers(content);
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].base_line, Some(3));
        // Ours stops at the base section, not the separator
        assert_eq!(markers[0].ours_lines(), 2..3);
        assert_eq!(markers[0].theirs_lines(), 6..7);
    }

    #[test]
    fn test_parse_ignores_stray_separator() {
        // A lone ======= (say, a Markdown underline) is not a conflict
        let content = "Title\n=======\nbody\n";
        assert!(parse_markers(content).is_empty());
    }

    #[test]
    fn test_parse_no_markers() {
        assert!(parse_markers("plain content\n").is_empty());
    }

    #[test]
    fn test_classify_text() {
        assert_eq!(classify("hello".to_string()), BlobContent::Text("hello".to_string()));
    }

    #[test]
    fn test_classify_binary() {
        assert_eq!(classify("he\0llo".to_string()), BlobContent::Binary);
        assert_eq!(classify("bad \u{FFFD} bytes".to_string()), BlobContent::Binary);
    }

    #[test]
    fn test_absent_is_not_empty_text() {
        assert_ne!(BlobContent::Absent, BlobContent::Text(String::new()));
        assert!(BlobContent::Absent.is_absent());
        assert!(BlobContent::Text(String::new()).as_text().is_some());
    }

    #[test]
    fn test_conflict_file_serializes() {
        let file = ConflictFile {
            path: "src/main.rs".to_string(),
            markers: vec![ConflictMarker {
                start_line: 1,
                separator_line: 3,
                end_line: 5,
                base_line: None,
            }],
            ours: BlobContent::Text("a\n".to_string()),
            theirs: BlobContent::Absent,
        };

        let json = serde_json::to_string(&file).unwrap();
        assert!(json.contains("\"src/main.rs\""));
        assert!(json.contains("absent"));
    }
}
