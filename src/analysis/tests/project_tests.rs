use crate::analysis::{HeuristicDetectors, ProjectDetectors, ProjectInfoDetector, ProjectType};
use crate::config::AnalyzerConfig;
use crate::context::AnalysisContext;
use std::fs;
use tempfile::TempDir;

#[tokio::test]
async fn test_go_project_info() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("go.mod"), "module example.com/hello\n\ngo 1.21\n").unwrap();
    fs::write(temp_dir.path().join("main.go"), "package main\n\nfunc main() {}\n").unwrap();
    fs::create_dir_all(temp_dir.path().join("cmd/worker")).unwrap();
    fs::write(
        temp_dir.path().join("cmd/worker/main.go"),
        "package main\n\nfunc main() {}\n",
    )
    .unwrap();

    let info = ProjectInfoDetector::new()
        .detect(&AnalysisContext::new(), temp_dir.path())
        .await
        .unwrap();

    assert_eq!(info.project_type, ProjectType::Go);
    assert_eq!(info.name, "example.com/hello");
    assert_eq!(info.build_system.as_deref(), Some("go"));
    assert!(info.config_files.contains(&"go.mod".to_string()));
    assert!(info.entry_points.contains(&"main.go".to_string()));
    assert!(info.entry_points.contains(&"cmd/worker/main.go".to_string()));
}

#[tokio::test]
async fn test_rust_manifest_fields() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("Cargo.toml"),
        "[package]\nname = \"scout\"\nversion = \"0.3.1\"\ndescription = \"finds things\"\n",
    )
    .unwrap();
    fs::create_dir_all(temp_dir.path().join("src")).unwrap();
    fs::write(temp_dir.path().join("src/main.rs"), "fn main() {}\n").unwrap();

    let info = ProjectInfoDetector::new()
        .detect(&AnalysisContext::new(), temp_dir.path())
        .await
        .unwrap();

    assert_eq!(info.project_type, ProjectType::Rust);
    assert_eq!(info.name, "scout");
    assert_eq!(info.version.as_deref(), Some("0.3.1"));
    assert_eq!(info.description.as_deref(), Some("finds things"));
    assert_eq!(info.entry_points, vec!["src/main.rs".to_string()]);
}

#[tokio::test]
async fn test_marker_priority_and_package_main() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("package.json"),
        r#"{ "name": "web", "main": "./lib/entry.js" }"#,
    )
    .unwrap();
    fs::write(temp_dir.path().join("requirements.txt"), "flask\n").unwrap();
    fs::create_dir_all(temp_dir.path().join("lib")).unwrap();
    fs::write(temp_dir.path().join("lib/entry.js"), "module.exports = {};\n").unwrap();

    let info = ProjectInfoDetector::new()
        .detect(&AnalysisContext::new(), temp_dir.path())
        .await
        .unwrap();

    assert_eq!(info.project_type, ProjectType::Node);
    assert_eq!(info.name, "web");
    assert!(info.config_files.contains(&"requirements.txt".to_string()));
    assert!(info.entry_points.contains(&"lib/entry.js".to_string()));
}

#[tokio::test]
async fn test_package_bin_targets_are_entry_points() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("package.json"),
        r#"{ "name": "cli", "bin": { "cli": "./bin/cli.js", "gone": "./bin/missing.js" } }"#,
    )
    .unwrap();
    fs::create_dir_all(temp_dir.path().join("bin")).unwrap();
    fs::write(temp_dir.path().join("bin/cli.js"), "#!/usr/bin/env node\n").unwrap();

    let info = ProjectInfoDetector::new()
        .detect(&AnalysisContext::new(), temp_dir.path())
        .await
        .unwrap();
    assert_eq!(info.entry_points, vec!["bin/cli.js".to_string()]);

    // The single-path form names the package's only executable.
    fs::write(
        temp_dir.path().join("package.json"),
        r#"{ "name": "cli", "bin": "bin/cli.js" }"#,
    )
    .unwrap();
    let info = ProjectInfoDetector::new()
        .scan(&AnalysisContext::new(), temp_dir.path())
        .unwrap();
    assert_eq!(info.entry_points, vec!["bin/cli.js".to_string()]);
}

#[tokio::test]
async fn test_csproj_is_reported_as_config_file() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("App.csproj"),
        "<Project Sdk=\"Microsoft.NET.Sdk\"></Project>\n",
    )
    .unwrap();
    fs::write(temp_dir.path().join("Program.cs"), "class Program {}\n").unwrap();

    let info = ProjectInfoDetector::new()
        .detect(&AnalysisContext::new(), temp_dir.path())
        .await
        .unwrap();

    assert_eq!(info.project_type, ProjectType::Dotnet);
    assert_eq!(info.build_system.as_deref(), Some("dotnet"));
    assert_eq!(info.config_files, vec!["App.csproj".to_string()]);
    assert_eq!(info.entry_points, vec!["Program.cs".to_string()]);
}

#[tokio::test]
async fn test_unknown_project_falls_back_to_directory_name() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("plain-dir");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("notes.md"), "# notes\n").unwrap();

    let info = ProjectInfoDetector::new()
        .detect(&AnalysisContext::new(), &root)
        .await
        .unwrap();

    assert_eq!(info.project_type, ProjectType::Unknown);
    assert_eq!(info.name, "plain-dir");
    assert!(info.entry_points.is_empty());
}

#[tokio::test]
async fn test_heuristic_detectors_share_scan_limits() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("main.py"), "print('hi')\n").unwrap();
    fs::create_dir_all(temp_dir.path().join("generated")).unwrap();
    fs::write(temp_dir.path().join("generated/big.py"), "x = 1\n".repeat(50)).unwrap();

    let mut config = AnalyzerConfig::new(temp_dir.path());
    config.ignore_patterns.push("generated".to_string());
    let detectors = HeuristicDetectors::new(&config);

    let languages = detectors
        .detect_languages(&AnalysisContext::new(), temp_dir.path())
        .await
        .unwrap();

    assert_eq!(languages.len(), 1);
    assert_eq!(languages[0].name, "Python");
    assert_eq!(languages[0].file_count, 1);
    assert_eq!(languages[0].line_count, 1);
}
