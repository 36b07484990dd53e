use anyhow::Result;
use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::debug;

use super::walker::{run_blocking, ProjectWalker, ScanLimits, WalkedFile};
use super::LanguageInfo;
use crate::context::AnalysisContext;

enum Matcher {
    FileName(&'static [&'static str]),
    Extension(&'static [&'static str]),
    Shebang(&'static [&'static str]),
}

/// `None` marks files that are recognised but never counted (lock files).
struct LanguageRule {
    matcher: Matcher,
    language: Option<&'static str>,
}

const fn rule(matcher: Matcher, language: &'static str) -> LanguageRule {
    LanguageRule {
        matcher,
        language: Some(language),
    }
}

// Evaluated top to bottom; the first match wins.
static LANGUAGE_RULES: &[LanguageRule] = &[
    LanguageRule {
        matcher: Matcher::FileName(&[
            "Cargo.lock",
            "package-lock.json",
            "yarn.lock",
            "pnpm-lock.yaml",
            "poetry.lock",
            "Pipfile.lock",
            "go.sum",
            "composer.lock",
            "Gemfile.lock",
        ]),
        language: None,
    },
    rule(Matcher::FileName(&["Dockerfile", "Containerfile"]), "Dockerfile"),
    rule(Matcher::FileName(&["Makefile", "GNUmakefile", "makefile"]), "Makefile"),
    rule(Matcher::FileName(&["CMakeLists.txt"]), "CMake"),
    rule(Matcher::FileName(&["go.mod"]), "Go Module"),
    rule(Matcher::FileName(&["Gemfile", "Rakefile"]), "Ruby"),
    rule(Matcher::Extension(&["rs"]), "Rust"),
    rule(Matcher::Extension(&["go"]), "Go"),
    rule(Matcher::Extension(&["py", "pyi"]), "Python"),
    rule(Matcher::Extension(&["ts", "tsx", "mts", "cts"]), "TypeScript"),
    rule(Matcher::Extension(&["js", "jsx", "mjs", "cjs"]), "JavaScript"),
    rule(Matcher::Extension(&["java"]), "Java"),
    rule(Matcher::Extension(&["kt", "kts"]), "Kotlin"),
    rule(Matcher::Extension(&["scala", "sc"]), "Scala"),
    rule(Matcher::Extension(&["c", "h"]), "C"),
    rule(Matcher::Extension(&["cc", "cpp", "cxx", "hpp", "hh", "hxx"]), "C++"),
    rule(Matcher::Extension(&["cs"]), "C#"),
    rule(Matcher::Extension(&["swift"]), "Swift"),
    rule(Matcher::Extension(&["rb"]), "Ruby"),
    rule(Matcher::Extension(&["php"]), "PHP"),
    rule(Matcher::Extension(&["dart"]), "Dart"),
    rule(Matcher::Extension(&["ex", "exs"]), "Elixir"),
    rule(Matcher::Extension(&["zig"]), "Zig"),
    rule(Matcher::Extension(&["lua"]), "Lua"),
    rule(Matcher::Extension(&["sh", "bash", "zsh"]), "Shell"),
    rule(Matcher::Extension(&["sql"]), "SQL"),
    rule(Matcher::Extension(&["html", "htm"]), "HTML"),
    rule(Matcher::Extension(&["css", "scss", "sass", "less"]), "CSS"),
    rule(Matcher::Extension(&["vue"]), "Vue"),
    rule(Matcher::Extension(&["svelte"]), "Svelte"),
    rule(Matcher::Extension(&["md", "markdown"]), "Markdown"),
    rule(Matcher::Extension(&["json"]), "JSON"),
    rule(Matcher::Extension(&["toml"]), "TOML"),
    rule(Matcher::Extension(&["yaml", "yml"]), "YAML"),
    rule(Matcher::Shebang(&["python"]), "Python"),
    rule(Matcher::Shebang(&["node", "deno"]), "JavaScript"),
    rule(Matcher::Shebang(&["bash", "/sh", "zsh"]), "Shell"),
    rule(Matcher::Shebang(&["ruby"]), "Ruby"),
];

enum Classification {
    Language(String),
    Skipped,
    Unknown,
}

fn classify(path: &Path, file_name: &str) -> Classification {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    let mut shebang: Option<Option<String>> = None;

    for rule in LANGUAGE_RULES {
        let matched = match &rule.matcher {
            Matcher::FileName(names) => names.contains(&file_name),
            Matcher::Extension(exts) => extension
                .as_deref()
                .map(|ext| exts.contains(&ext))
                .unwrap_or(false),
            Matcher::Shebang(needles) => {
                if extension.is_some() {
                    false
                } else {
                    let line = shebang.get_or_insert_with(|| read_shebang(path));
                    line.as_deref()
                        .map(|l| needles.iter().any(|n| l.contains(n)))
                        .unwrap_or(false)
                }
            }
        };

        if matched {
            return match rule.language {
                Some(language) => Classification::Language(language.to_string()),
                None => Classification::Skipped,
            };
        }
    }

    match tokei::LanguageType::from_path(path, &tokei::Config::default()) {
        Some(language) => Classification::Language(language.name().to_string()),
        None => Classification::Unknown,
    }
}

fn read_shebang(path: &Path) -> Option<String> {
    let file = fs::File::open(path).ok()?;
    let mut line = String::new();
    BufReader::new(file).read_line(&mut line).ok()?;
    line.starts_with("#!").then(|| line.trim().to_string())
}

/// Language name for a single file, if the rule table or tokei knows it.
pub fn language_for_path(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    match classify(path, file_name) {
        Classification::Language(name) => Some(name),
        _ => None,
    }
}

/// Extensions the rule table associates with `language`.
pub fn extensions_for(language: &str) -> Vec<&'static str> {
    LANGUAGE_RULES
        .iter()
        .filter(|r| r.language == Some(language))
        .filter_map(|r| match r.matcher {
            Matcher::Extension(exts) => Some(exts),
            _ => None,
        })
        .flatten()
        .copied()
        .collect()
}

#[derive(Clone)]
pub struct LanguageDetector {
    limits: ScanLimits,
}

impl LanguageDetector {
    pub fn new(limits: ScanLimits) -> Self {
        Self { limits }
    }

    pub async fn detect(&self, ctx: &AnalysisContext, path: &Path) -> Result<Vec<LanguageInfo>> {
        let detector = self.clone();
        run_blocking(ctx, path, move |ctx, path| detector.scan(ctx, path)).await
    }

    /// Walks and reads the tree on the calling thread.
    pub fn scan(&self, ctx: &AnalysisContext, path: &Path) -> Result<Vec<LanguageInfo>> {
        let outcome = ProjectWalker::new(path, &self.limits).walk(ctx)?;

        let mut stats: HashMap<String, (usize, usize)> = HashMap::new();
        for file in &outcome.files {
            ctx.check()?;
            let language = match classify(&file.path, file.file_name()) {
                Classification::Language(language) => language,
                Classification::Skipped | Classification::Unknown => continue,
            };
            let lines = self.count_lines(file);
            let entry = stats.entry(language).or_insert((0, 0));
            entry.0 += 1;
            entry.1 += lines;
        }

        let total_lines: usize = stats.values().map(|(_, lines)| lines).sum();
        let mut results: Vec<LanguageInfo> = stats
            .into_iter()
            .map(|(name, (file_count, line_count))| LanguageInfo {
                name,
                file_count,
                line_count,
                percentage: percentage(line_count, total_lines),
            })
            .collect();

        results.sort_by(|a, b| {
            b.line_count
                .cmp(&a.line_count)
                .then_with(|| a.name.cmp(&b.name))
        });

        Ok(results)
    }

    fn count_lines(&self, file: &WalkedFile) -> usize {
        if file.size > self.limits.max_file_size {
            return 0;
        }
        match fs::read(&file.path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).lines().count(),
            Err(e) => {
                debug!(file = %file.relative, error = %e, "unreadable file counted without lines");
                0
            }
        }
    }
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64 / total as f64 * 10_000.0).round() / 100.0
}
