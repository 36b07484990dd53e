use anyhow::Result;
use std::collections::BTreeSet;
use std::path::Path;

use super::walker::{ProjectWalker, ScanLimits};
use super::FileStructure;
use crate::context::AnalysisContext;

const SOURCE_DIR_NAMES: &[&str] = &["src", "lib", "app", "cmd", "pkg", "internal", "source"];
const TEST_DIR_NAMES: &[&str] = &["test", "tests", "spec", "specs", "__tests__", "testdata", "e2e"];

pub struct StructureAnalyzer {
    limits: ScanLimits,
}

impl StructureAnalyzer {
    pub fn new(limits: ScanLimits) -> Self {
        Self { limits }
    }

    pub fn analyze(&self, ctx: &AnalysisContext, root: &Path) -> Result<FileStructure> {
        let outcome = ProjectWalker::new(root, &self.limits).walk(ctx)?;

        let mut structure = FileStructure {
            total_files: outcome.files.len(),
            total_dirs: outcome.dirs.len(),
            truncated: outcome.truncated,
            ..FileStructure::default()
        };

        for file in &outcome.files {
            structure.total_size += file.size;
            structure.max_depth = structure.max_depth.max(file.depth);
            let extension = file
                .extension()
                .map(|e| e.to_ascii_lowercase())
                .unwrap_or_else(|| "(none)".to_string());
            *structure.extension_counts.entry(extension).or_insert(0) += 1;
        }

        let mut source_dirs = BTreeSet::new();
        let mut test_dirs = BTreeSet::new();
        for dir in &outcome.dirs {
            let name = dir.rsplit('/').next().unwrap_or(dir);
            if !dir.contains('/') {
                structure.top_level_dirs.push(dir.clone());
            }
            if SOURCE_DIR_NAMES.contains(&name) && dir.matches('/').count() <= 1 {
                source_dirs.insert(dir.clone());
            }
            if TEST_DIR_NAMES.contains(&name) {
                test_dirs.insert(dir.clone());
            }
        }
        structure.source_dirs = source_dirs.into_iter().collect();
        structure.test_dirs = test_dirs.into_iter().collect();

        Ok(structure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn summarises_layout() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("src/handlers")).unwrap();
        fs::create_dir_all(root.join("tests")).unwrap();
        fs::write(root.join("src/main.rs"), "fn main() {}\n").unwrap();
        fs::write(root.join("src/handlers/user.rs"), "pub fn user() {}\n").unwrap();
        fs::write(root.join("tests/api.rs"), "#[test]\nfn t() {}\n").unwrap();
        fs::write(root.join("README"), "hello").unwrap();

        let structure = StructureAnalyzer::new(ScanLimits::default())
            .analyze(&AnalysisContext::new(), root)
            .unwrap();

        assert_eq!(structure.total_files, 4);
        assert_eq!(structure.total_dirs, 3);
        assert_eq!(structure.max_depth, 3);
        assert_eq!(structure.top_level_dirs, vec!["src", "tests"]);
        assert_eq!(structure.source_dirs, vec!["src"]);
        assert_eq!(structure.test_dirs, vec!["tests"]);
        assert_eq!(structure.extension_counts.get("rs"), Some(&3));
        assert_eq!(structure.extension_counts.get("(none)"), Some(&1));
    }
}
