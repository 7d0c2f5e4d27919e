//! Resolution of skip markers against the pre-migration snapshot.
//!
//! The llmmig prompt lets the model elide unchanged regions with a marker
//! line. This module splices the elided original lines back in by anchoring
//! each marker between its neighbouring migrated lines and locating the same
//! lines in the original file.

use crate::core::completion::SKIP_MARKER;

/// Result of merging one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub merged: String,
    /// Markers whose anchors could not be located in the original. These are
    /// left in place (they are valid Python comments) and reported upstream.
    pub unresolved_markers: usize,
}

/// Replace every skip-marker line in `migrated` with the original lines that
/// lie between its anchors.
///
/// Anchors are the nearest non-marker lines above and below the marker.
/// Lookup is monotonic: each anchor is searched for at or after the position
/// where the previous region ended, so repeated lines resolve in order.
pub fn merge_skipped_regions(original: &str, migrated: &str) -> MergeOutcome {
    let orig: Vec<&str> = original.lines().collect();
    let migr: Vec<&str> = migrated.lines().collect();

    let mut out: Vec<String> = Vec::with_capacity(orig.len().max(migr.len()));
    let mut unresolved = 0usize;
    let mut cursor = 0usize;

    for (idx, line) in migr.iter().enumerate() {
        if line.trim() != SKIP_MARKER {
            out.push((*line).to_string());
            // Keep the cursor aligned with the original so later regions
            // resolve after this line's occurrence.
            if let Some(pos) = find_line(&orig, line, cursor) {
                cursor = pos + 1;
            }
            continue;
        }

        let above = migr[..idx].iter().rev().find(|l| l.trim() != SKIP_MARKER);
        let below = migr[idx + 1..].iter().find(|l| l.trim() != SKIP_MARKER);

        let start = match above {
            Some(anchor) => match find_line(&orig, anchor, cursor.saturating_sub(1)) {
                Some(pos) => pos + 1,
                None => {
                    unresolved += 1;
                    out.push((*line).to_string());
                    continue;
                }
            },
            // Marker at the top of the file: region starts at the beginning.
            None => 0,
        };

        let end = match below {
            Some(anchor) => match find_line(&orig, anchor, start) {
                Some(pos) => pos,
                None => {
                    unresolved += 1;
                    out.push((*line).to_string());
                    continue;
                }
            },
            // Marker at the bottom: region runs to the end of the original.
            None => orig.len(),
        };

        for orig_line in &orig[start..end] {
            out.push((*orig_line).to_string());
        }
        cursor = end;
    }

    let mut merged = out.join("\n");
    merged.push('\n');
    MergeOutcome {
        merged,
        unresolved_markers: unresolved,
    }
}

fn find_line(lines: &[&str], needle: &str, from: usize) -> Option<usize> {
    lines
        .iter()
        .enumerate()
        .skip(from)
        .find(|(_, line)| **line == needle)
        .map(|(pos, _)| pos)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGINAL: &str = "import toml\n\
                            \n\
                            def load(path):\n\
                            \x20   with open(path) as f:\n\
                            \x20       return toml.load(f)\n\
                            \n\
                            def helper():\n\
                            \x20   return 42\n";

    #[test]
    fn splices_elided_region_between_anchors() {
        let migrated = "import tomli\n\
                        \n\
                        def load(path):\n\
                        \x20   with open(path, 'rb') as f:\n\
                        \x20       return tomli.load(f)\n\
                        \n\
                        # <migrator:skipped>\n\
                        \x20   return 42\n";

        let outcome = merge_skipped_regions(ORIGINAL, migrated);
        assert_eq!(outcome.unresolved_markers, 0);
        assert!(outcome.merged.contains("def helper():"));
        assert!(outcome.merged.contains("import tomli"));
        assert!(!outcome.merged.contains(SKIP_MARKER));
    }

    #[test]
    fn marker_at_end_takes_rest_of_original() {
        let migrated = "import tomli\n\n# <migrator:skipped>\n";
        let outcome = merge_skipped_regions(ORIGINAL, migrated);
        assert_eq!(outcome.unresolved_markers, 0);
        assert!(outcome.merged.contains("def helper():"));
        assert!(outcome.merged.contains("def load(path):"));
    }

    #[test]
    fn marker_at_start_takes_leading_lines() {
        let original = "# header\n# license\nimport toml\n";
        let migrated = "# <migrator:skipped>\nimport tomli\n";
        // The anchor below ("import tomli") does not exist in the original,
        // so the marker stays unresolved rather than guessing a region.
        let outcome = merge_skipped_regions(original, migrated);
        assert_eq!(outcome.unresolved_markers, 1);
        assert!(outcome.merged.contains(SKIP_MARKER));

        let migrated = "# <migrator:skipped>\nimport toml\n";
        let outcome = merge_skipped_regions(original, migrated);
        assert_eq!(outcome.unresolved_markers, 0);
        assert_eq!(outcome.merged, "# header\n# license\nimport toml\n");
    }

    #[test]
    fn unmatched_anchor_leaves_marker_in_place() {
        let migrated = "nothing like the original\n# <migrator:skipped>\nalso unknown\n";
        let outcome = merge_skipped_regions(ORIGINAL, migrated);
        assert_eq!(outcome.unresolved_markers, 1);
        assert!(outcome.merged.contains(SKIP_MARKER));
    }

    #[test]
    fn repeated_anchor_lines_resolve_monotonically() {
        let original = "a\nx1\nb\na\nx2\nb\n";
        let migrated = "a\n# <migrator:skipped>\nb\na\n# <migrator:skipped>\nb\n";
        let outcome = merge_skipped_regions(original, migrated);
        assert_eq!(outcome.unresolved_markers, 0);
        assert_eq!(outcome.merged, "a\nx1\nb\na\nx2\nb\n");
    }
}
