use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use super::walker::{ProjectWalker, ScanLimits};
use super::{AnalysisResult, CodeContext, IssueContext, IssueKind};
use crate::context::AnalysisContext;

const MAX_KEY_FILES: usize = 20;
const MAX_KEYWORDS: usize = 15;
const MAX_RELEVANT_FILES: usize = 20;

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "when", "into", "are", "was", "were",
    "has", "have", "not", "but", "can", "should", "would", "could", "will", "there", "their",
    "what", "which", "while", "after", "before", "then", "than", "also", "only", "just", "some",
    "does", "doesn", "didn", "isn", "get", "got", "use", "using", "used", "like", "need", "want",
    "please", "issue", "problem", "error", "expected", "actual", "steps", "reproduce",
];

/// The issue being worked on, as handed over by the review workflow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssueData {
    pub number: Option<u64>,
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

/// Summary of everything gathered so far, handed to downstream prompt builders.
pub fn build_code_context(result: &AnalysisResult) -> CodeContext {
    let primary_language = result.primary_language().map(|l| l.name.clone());

    let mut key_files: Vec<String> = Vec::new();
    for file in result
        .project_info
        .entry_points
        .iter()
        .chain(result.project_info.config_files.iter())
    {
        if key_files.len() >= MAX_KEY_FILES {
            break;
        }
        if !key_files.contains(file) {
            key_files.push(file.clone());
        }
    }

    let frameworks = result
        .frameworks
        .iter()
        .map(|f| f.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let mut summary = format!(
        "{} is a {:?} project",
        result.project_info.name, result.project_info.project_type
    );
    if let Some(language) = &primary_language {
        summary.push_str(&format!(" written mostly in {}", language));
    }
    if !frameworks.is_empty() {
        summary.push_str(&format!(" using {}", frameworks));
    }
    summary.push_str(&format!(
        ", with {} files and {} direct dependencies.",
        result.file_structure.total_files,
        result.dependencies.direct().count()
    ));

    CodeContext {
        primary_language,
        key_files,
        summary,
    }
}

pub fn build_issue_context(
    ctx: &AnalysisContext,
    root: &Path,
    limits: &ScanLimits,
    issue: &IssueData,
) -> Result<IssueContext> {
    if issue.title.trim().is_empty() && issue.body.trim().is_empty() {
        bail!("issue has neither a title nor a body");
    }

    let text = format!("{}\n{}", issue.title, issue.body);
    let keywords = extract_keywords(&text);
    let outcome = ProjectWalker::new(root, limits).walk(ctx)?;

    let mentioned_files: Vec<String> = outcome
        .files
        .iter()
        .filter(|f| text.contains(&f.relative) || mentions_file_name(&text, f.file_name()))
        .map(|f| f.relative.clone())
        .collect();

    let mut scored: Vec<(usize, &str)> = outcome
        .files
        .iter()
        .filter_map(|f| {
            let path = f.relative.to_lowercase();
            let hits = keywords.iter().filter(|k| path.contains(k.as_str())).count();
            (hits > 0).then_some((hits, f.relative.as_str()))
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));

    Ok(IssueContext {
        issue_number: issue.number,
        kind: classify_issue(issue),
        keywords,
        mentioned_files,
        relevant_files: scored
            .into_iter()
            .take(MAX_RELEVANT_FILES)
            .map(|(_, path)| path.to_string())
            .collect(),
    })
}

fn mentions_file_name(text: &str, file_name: &str) -> bool {
    file_name.contains('.')
        && text
            .split(|c: char| c.is_whitespace() || matches!(c, '`' | '"' | '\'' | '(' | ')' | ','))
            .any(|token| token == file_name)
}

fn extract_keywords(text: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut keywords = Vec::new();
    for word in text.split(|c: char| !(c.is_alphanumeric() || c == '_')) {
        let word = word.to_lowercase();
        if word.len() < 3
            || word.chars().all(|c| c.is_ascii_digit())
            || STOP_WORDS.contains(&word.as_str())
        {
            continue;
        }
        if seen.insert(word.clone()) {
            keywords.push(word);
        }
        if keywords.len() >= MAX_KEYWORDS {
            break;
        }
    }
    keywords
}

fn classify_issue(issue: &IssueData) -> IssueKind {
    let by_label = issue.labels.iter().find_map(|label| {
        let label = label.to_lowercase();
        if label.contains("bug") || label.contains("defect") {
            Some(IssueKind::Bug)
        } else if label.contains("feature") || label.contains("enhancement") {
            Some(IssueKind::Feature)
        } else if label.contains("doc") {
            Some(IssueKind::Documentation)
        } else if label.contains("refactor") || label.contains("cleanup") {
            Some(IssueKind::Refactor)
        } else {
            None
        }
    });
    if let Some(kind) = by_label {
        return kind;
    }

    let title = issue.title.to_lowercase();
    if ["crash", "bug", "broken", "fails", "panic", "fix"]
        .iter()
        .any(|w| title.contains(w))
    {
        IssueKind::Bug
    } else if ["add", "support", "feature", "implement", "allow"]
        .iter()
        .any(|w| title.contains(w))
    {
        IssueKind::Feature
    } else if ["docs", "documentation", "readme", "typo"]
        .iter()
        .any(|w| title.contains(w))
    {
        IssueKind::Documentation
    } else if ["refactor", "cleanup", "simplify"]
        .iter()
        .any(|w| title.contains(w))
    {
        IssueKind::Refactor
    } else {
        IssueKind::Other
    }
}
