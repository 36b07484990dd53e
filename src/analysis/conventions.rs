use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use super::language::extensions_for;
use super::walker::{ProjectWalker, ScanLimits};
use super::{CodingConventions, Indentation, LanguageInfo, LineEnding};
use crate::context::AnalysisContext;

const MAX_SAMPLED_FILES: usize = 20;

const FORMATTER_CONFIGS: &[&str] = &[
    ".editorconfig",
    "rustfmt.toml",
    ".rustfmt.toml",
    ".prettierrc",
    ".prettierrc.json",
    ".prettierrc.yml",
    "prettier.config.js",
    ".clang-format",
    ".black",
    ".isort.cfg",
];

const LINTER_CONFIGS: &[&str] = &[
    "clippy.toml",
    ".clippy.toml",
    ".eslintrc",
    ".eslintrc.js",
    ".eslintrc.json",
    "eslint.config.js",
    ".flake8",
    ".pylintrc",
    "ruff.toml",
    ".golangci.yml",
    ".golangci.yaml",
    ".rubocop.yml",
];

pub struct ConventionAnalyzer {
    limits: ScanLimits,
}

impl ConventionAnalyzer {
    pub fn new(limits: ScanLimits) -> Self {
        Self { limits }
    }

    pub fn analyze(
        &self,
        ctx: &AnalysisContext,
        root: &Path,
        languages: &[LanguageInfo],
    ) -> Result<CodingConventions> {
        let mut conventions = CodingConventions {
            primary_language: languages.first().map(|l| l.name.clone()),
            formatter_configs: present(root, FORMATTER_CONFIGS),
            linter_configs: present(root, LINTER_CONFIGS),
            ..CodingConventions::default()
        };

        let Some(primary) = languages.first() else {
            return Ok(conventions);
        };
        let extensions = extensions_for(&primary.name);
        if extensions.is_empty() {
            return Ok(conventions);
        }

        let outcome = ProjectWalker::new(root, &self.limits).walk(ctx)?;
        let samples = outcome
            .files
            .iter()
            .filter(|f| f.size <= self.limits.max_file_size)
            .filter(|f| {
                f.extension()
                    .map(|e| extensions.contains(&e.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .take(MAX_SAMPLED_FILES);

        let mut stats = SampleStats::default();
        for file in samples {
            ctx.check()?;
            let content = fs::read_to_string(&file.path)
                .with_context(|| format!("failed to read {}", file.relative))?;
            stats.add(&content);
            conventions.files_sampled += 1;
        }

        conventions.indentation = stats.indentation();
        conventions.line_ending = stats.line_ending();
        conventions.max_line_length = stats.max_line_length;
        conventions.naming_style = stats.naming_style();

        Ok(conventions)
    }
}

fn present(root: &Path, candidates: &[&str]) -> Vec<String> {
    candidates
        .iter()
        .filter(|c| root.join(c).is_file())
        .map(|c| c.to_string())
        .collect()
}

#[derive(Default)]
struct SampleStats {
    tab_lines: usize,
    space_widths: HashMap<usize, usize>,
    lf: usize,
    crlf: usize,
    max_line_length: usize,
    snake_case: usize,
    camel_case: usize,
}

impl SampleStats {
    fn add(&mut self, content: &str) {
        let crlf = content.matches("\r\n").count();
        self.crlf += crlf;
        self.lf += content.matches('\n').count() - crlf;

        let mut previous_indent = 0;
        for line in content.lines() {
            self.max_line_length = self.max_line_length.max(line.chars().count());
            if line.trim().is_empty() {
                continue;
            }

            if line.starts_with('\t') {
                self.tab_lines += 1;
            } else {
                let indent = line.len() - line.trim_start_matches(' ').len();
                if indent > previous_indent {
                    *self.space_widths.entry(indent - previous_indent).or_insert(0) += 1;
                }
                previous_indent = indent;
            }

            for word in line.split(|c: char| !(c.is_alphanumeric() || c == '_')) {
                if word.len() < 4 || word.starts_with(|c: char| c.is_ascii_digit()) {
                    continue;
                }
                let has_lower_start = word.starts_with(|c: char| c.is_ascii_lowercase());
                if has_lower_start && word.contains('_') {
                    self.snake_case += 1;
                } else if has_lower_start && word.chars().any(|c| c.is_ascii_uppercase()) {
                    self.camel_case += 1;
                }
            }
        }
    }

    fn indentation(&self) -> Indentation {
        let space_lines: usize = self.space_widths.values().sum();
        if self.tab_lines == 0 && space_lines == 0 {
            return Indentation::Unknown;
        }
        if self.tab_lines > space_lines * 2 {
            return Indentation::Tabs;
        }
        if space_lines > self.tab_lines * 2 {
            let width = self
                .space_widths
                .iter()
                .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
                .map(|(width, _)| *width)
                .unwrap_or(4);
            return Indentation::Spaces(width);
        }
        Indentation::Mixed
    }

    fn line_ending(&self) -> LineEnding {
        match (self.lf, self.crlf) {
            (0, 0) => LineEnding::Unknown,
            (_, 0) => LineEnding::Lf,
            (0, _) => LineEnding::Crlf,
            _ => LineEnding::Mixed,
        }
    }

    fn naming_style(&self) -> Option<String> {
        if self.snake_case == 0 && self.camel_case == 0 {
            return None;
        }
        let style = if self.snake_case >= self.camel_case {
            "snake_case"
        } else {
            "camelCase"
        };
        Some(style.to_string())
    }
}
