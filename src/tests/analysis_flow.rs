use super::{ScriptedDetectors, TestUtils};
use crate::analysis::ProjectType;
use crate::context::AnalysisContext;
use crate::error::Phase;
use crate::orchestrator::Analyzer;
use pretty_assertions::assert_eq;
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[tokio::test]
async fn test_cold_go_analysis() {
    let utils = TestUtils::new();
    let project = TestUtils::create_go_project();
    let analyzer = Analyzer::new(utils.config(project.path())).unwrap();

    let result = analyzer
        .analyze_project(&AnalysisContext::new(), project.path())
        .await
        .unwrap();

    assert_eq!(result.project_info.project_type, ProjectType::Go);
    assert!(result.project_info.entry_points.contains(&"main.go".to_string()));

    let go = result
        .languages
        .iter()
        .find(|l| l.name == "Go")
        .expect("Go should be detected");
    assert_eq!(go.file_count, 1);
    assert_eq!(go.line_count, 7);

    assert!(!result.degraded);
    assert!(result.phase_errors.is_empty());
    assert_eq!(result.file_structure.total_files, 2);
    assert_eq!(result.dependencies.package_managers, vec!["go modules".to_string()]);
    assert_eq!(result.conventions.primary_language.as_deref(), Some("Go"));

    let code_context = result.code_context.as_ref().expect("code context is built");
    assert_eq!(code_context.primary_language.as_deref(), Some("Go"));
    assert!(code_context.key_files.contains(&"main.go".to_string()));
    assert!(result.issue_context.is_none());

    let cache = analyzer.cache().expect("cache enabled by default");
    assert!(cache.contains_in_memory(project.path()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_concurrent_stage_leaves_runtime_worker_free() {
    let utils = TestUtils::new();
    let project = TestUtils::create_go_project();
    let analyzer = Arc::new(Analyzer::new(utils.config(project.path()).without_cache()).unwrap());

    let root = project.path().to_path_buf();
    let worker = Arc::clone(&analyzer);
    let analysis =
        tokio::spawn(async move { worker.analyze_project(&AnalysisContext::new(), &root).await });
    // Runs on the only worker while detection is in flight.
    let ticker = tokio::spawn(async { tokio::task::yield_now().await });

    ticker.await.unwrap();
    let result = analysis.await.unwrap().unwrap();
    assert_eq!(result.project_info.project_type, ProjectType::Go);
    assert!(result.languages.iter().any(|l| l.name == "Go"));
}

#[tokio::test]
async fn test_second_call_is_served_from_cache() {
    let utils = TestUtils::new();
    let project = TestUtils::create_go_project();
    let config = utils.config(project.path());
    let detectors = ScriptedDetectors::new(&config);
    let calls = Arc::clone(&detectors.calls);
    let analyzer = Analyzer::with_detectors(config, detectors).unwrap();
    let ctx = AnalysisContext::new();

    let first = analyzer.analyze_project(&ctx, project.path()).await.unwrap();
    let second = analyzer.analyze_project(&ctx, project.path()).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_disk_tier_serves_after_memory_wipe() {
    let utils = TestUtils::new();
    let project = TestUtils::create_go_project();
    let config = utils.config(project.path());
    let detectors = ScriptedDetectors::new(&config);
    let calls = Arc::clone(&detectors.calls);
    let analyzer = Analyzer::with_detectors(config, detectors).unwrap();
    let ctx = AnalysisContext::new();

    let first = analyzer.analyze_project(&ctx, project.path()).await.unwrap();
    analyzer.cache().unwrap().clear_memory();
    let second = analyzer.analyze_project(&ctx, project.path()).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_disabled_cache_always_recomputes() {
    let utils = TestUtils::new();
    let project = TestUtils::create_go_project();
    let config = utils.config(project.path()).without_cache();
    let detectors = ScriptedDetectors::new(&config);
    let calls = Arc::clone(&detectors.calls);
    let analyzer = Analyzer::with_detectors(config, detectors).unwrap();
    let ctx = AnalysisContext::new();

    analyzer.analyze_project(&ctx, project.path()).await.unwrap();
    analyzer.analyze_project(&ctx, project.path()).await.unwrap();

    assert!(analyzer.cache().is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_sequential_failure_degrades_without_caching() {
    let utils = TestUtils::new();
    let project = TestUtils::create_broken_node_project();
    let analyzer = Analyzer::new(utils.config(project.path())).unwrap();

    let result = analyzer
        .analyze_project(&AnalysisContext::new(), project.path())
        .await
        .expect("sequential failures are not fatal");

    assert!(result.degraded);
    assert_eq!(result.phase_errors.len(), 1);
    assert_eq!(result.phase_errors[0].phase, Phase::Dependencies);
    assert!(result.phase_errors[0].message.contains("package.json"));

    // Later phases still ran.
    assert_eq!(result.project_info.project_type, ProjectType::Node);
    assert_eq!(result.file_structure.total_files, 2);
    assert!(result.code_context.is_some());

    let cache = analyzer.cache().unwrap();
    assert!(!cache.contains_in_memory(project.path()));
    assert!(cache.get(project.path()).is_none());
}

#[tokio::test]
async fn test_scripted_dependency_failure_keeps_concurrent_output() {
    let utils = TestUtils::new();
    let project = TestUtils::create_go_project();
    let config = utils.config(project.path());
    let mut detectors = ScriptedDetectors::new(&config);
    detectors.fail = Some(Phase::Dependencies);
    let analyzer = Analyzer::with_detectors(config, detectors).unwrap();

    let result = analyzer
        .analyze_project(&AnalysisContext::new(), project.path())
        .await
        .unwrap();

    assert!(result.degraded);
    assert!(result.dependencies.dependencies.is_empty());
    assert!(result.languages.iter().any(|l| l.name == "Go"));
    assert!(!analyzer.cache().unwrap().contains_in_memory(project.path()));
}
