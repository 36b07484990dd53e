use crate::analysis::{DependencyAnalyzer, ProjectInfo, ProjectInfoDetector};
use crate::context::AnalysisContext;
use std::fs;
use tempfile::TempDir;

fn setup_test_project() -> TempDir {
    let temp_dir = TempDir::new().unwrap();

    fs::write(
        temp_dir.path().join("Cargo.toml"),
        r#"[package]
        name = "test_project"
        version = "0.1.0"

        [dependencies]
        serde = "1.0"
        tokio = { version = "1.0", features = ["full"] }

        [dev-dependencies]
        tempfile = "3.2"
        "#,
    )
    .unwrap();

    fs::write(
        temp_dir.path().join("package.json"),
        r#"{
            "name": "test-project",
            "version": "1.0.0",
            "dependencies": {
                "react": "^17.0.0",
                "express": "^4.17.1"
            },
            "devDependencies": {
                "jest": "^27.0.0"
            }
        }"#,
    )
    .unwrap();

    fs::write(
        temp_dir.path().join("requirements.txt"),
        "# runtime\nrequests==2.26.0\nflask>=2.0.0\n-r extra.txt\n",
    )
    .unwrap();

    fs::write(temp_dir.path().join("Cargo.lock"), "# generated\n").unwrap();

    temp_dir
}

async fn analyze(temp_dir: &TempDir) -> anyhow::Result<crate::analysis::DependencyInfo> {
    let ctx = AnalysisContext::new();
    let info = ProjectInfoDetector::new().detect(&ctx, temp_dir.path()).await?;
    DependencyAnalyzer::new()
        .analyze(&ctx, temp_dir.path(), &info)
        .await
}

#[tokio::test]
async fn test_rust_dependencies() {
    let temp_dir = setup_test_project();
    let deps = analyze(&temp_dir).await.unwrap();

    let rust_deps: Vec<_> = deps
        .dependencies
        .iter()
        .filter(|d| d.source == "crates.io")
        .collect();

    assert!(rust_deps.iter().any(|d| d.name == "serde" && d.version == "1.0"));
    assert!(rust_deps.iter().any(|d| d.name == "tokio" && d.version == "1.0"));
    assert!(rust_deps.iter().any(|d| d.name == "tempfile" && d.is_dev));
    assert!(deps.package_managers.contains(&"cargo".to_string()));
    assert_eq!(deps.lock_files, vec!["Cargo.lock".to_string()]);
}

#[tokio::test]
async fn test_node_dependencies() {
    let temp_dir = setup_test_project();
    let deps = analyze(&temp_dir).await.unwrap();

    let node_deps: Vec<_> = deps
        .dependencies
        .iter()
        .filter(|d| d.source == "npm")
        .collect();

    assert!(node_deps.iter().any(|d| d.name == "react" && !d.is_dev));
    assert!(node_deps.iter().any(|d| d.name == "express" && !d.is_dev));
    assert!(node_deps.iter().any(|d| d.name == "jest" && d.is_dev));
    assert_eq!(deps.dev().count(), 2);
}

#[tokio::test]
async fn test_python_dependencies() {
    let temp_dir = setup_test_project();
    let deps = analyze(&temp_dir).await.unwrap();

    let python_deps: Vec<_> = deps
        .dependencies
        .iter()
        .filter(|d| d.source == "pip")
        .collect();

    assert_eq!(python_deps.len(), 2);
    assert!(python_deps
        .iter()
        .any(|d| d.name == "requests" && d.version == "2.26.0"));
    assert!(python_deps.iter().any(|d| d.name == "flask"));
}

#[tokio::test]
async fn test_go_module_requirements() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("go.mod"),
        "module example.com/svc\n\ngo 1.21\n\nrequire github.com/gin-gonic/gin v1.9.1\n\nrequire (\n\tgolang.org/x/text v0.14.0 // indirect\n)\n",
    )
    .unwrap();

    let deps = analyze(&temp_dir).await.unwrap();

    assert_eq!(deps.package_managers, vec!["go modules".to_string()]);
    assert_eq!(deps.direct().count(), 2);
    assert_eq!(deps.dev().count(), 0);
    assert!(deps
        .direct()
        .any(|d| d.name == "golang.org/x/text" && d.version == "v0.14.0"));
}

#[tokio::test]
async fn test_only_reported_manifests_are_parsed() {
    let temp_dir = setup_test_project();
    let info = ProjectInfo {
        config_files: vec!["requirements.txt".to_string()],
        ..ProjectInfo::default()
    };

    let deps = DependencyAnalyzer::new()
        .analyze(&AnalysisContext::new(), temp_dir.path(), &info)
        .await
        .unwrap();

    assert_eq!(deps.package_managers, vec!["pip".to_string()]);
    assert!(deps.dependencies.iter().all(|d| d.source == "pip"));
}

#[tokio::test]
async fn test_malformed_manifest_fails_the_phase() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("package.json"), "{ \"name\": ").unwrap();

    let err = analyze(&temp_dir).await.unwrap_err();
    assert!(format!("{:#}", err).contains("package.json"));
}
