use super::{failed_phases, ScriptedDetectors, TestUtils};
use crate::config::AnalyzerConfig;
use crate::context::AnalysisContext;
use crate::error::{AnalysisError, Phase};
use crate::orchestrator::Analyzer;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[tokio::test]
async fn test_missing_project_root() {
    let utils = TestUtils::new();
    let missing = PathBuf::from("/nonexistent/path/for/analysis");
    let analyzer = Analyzer::new(utils.config(&missing)).unwrap();

    let err = analyzer
        .analyze_project(&AnalysisContext::new(), &missing)
        .await
        .unwrap_err();

    assert!(matches!(err, AnalysisError::ProjectNotFound(ref p) if p == &missing));
    assert_eq!(analyzer.cache().unwrap().memory_len(), 0);
}

#[tokio::test]
async fn test_file_as_project_root() {
    let utils = TestUtils::new();
    let project = TestUtils::create_go_project();
    let file = project.path().join("main.go");
    let analyzer = Analyzer::new(utils.config(&file)).unwrap();

    let err = analyzer
        .analyze_project(&AnalysisContext::new(), &file)
        .await
        .unwrap_err();
    assert!(matches!(err, AnalysisError::NotADirectory(_)));
}

#[tokio::test]
async fn test_concurrent_failure_is_fatal() {
    let utils = TestUtils::new();
    let project = TestUtils::create_go_project();
    let config = utils.config(project.path());
    let mut detectors = ScriptedDetectors::new(&config);
    detectors.fail = Some(Phase::Languages);
    let analyzer = Analyzer::with_detectors(config, detectors).unwrap();

    let err = analyzer
        .analyze_project(&AnalysisContext::new(), project.path())
        .await
        .unwrap_err();

    assert_eq!(failed_phases(&err), vec![Phase::Languages]);
    assert!(err.to_string().contains("scripted languages failure"));
    assert!(!err.is_cancellation());
    assert!(!analyzer.cache().unwrap().contains_in_memory(project.path()));
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let utils = TestUtils::new();
    let project = TestUtils::create_go_project();
    let analyzer = Analyzer::new(utils.config(project.path())).unwrap();
    let ctx = AnalysisContext::new();
    ctx.cancel();

    let err = analyzer
        .analyze_project(&ctx, project.path())
        .await
        .unwrap_err();
    assert!(matches!(err, AnalysisError::Cancelled));
}

#[tokio::test]
async fn test_expired_deadline() {
    let utils = TestUtils::new();
    let project = TestUtils::create_go_project();
    let analyzer = Analyzer::new(utils.config(project.path())).unwrap();
    let ctx = AnalysisContext::with_timeout(Duration::ZERO);

    let err = analyzer
        .analyze_project(&ctx, project.path())
        .await
        .unwrap_err();
    assert!(matches!(err, AnalysisError::DeadlineExceeded));
    assert!(err.is_cancellation());
}

#[tokio::test]
async fn test_cancellation_mid_detection_aborts_call() {
    let utils = TestUtils::new();
    let project = TestUtils::create_go_project();
    let config = utils.config(project.path());
    let mut detectors = ScriptedDetectors::new(&config);
    detectors.cancel_during = Some(Phase::Frameworks);
    let analyzer = Analyzer::with_detectors(config, detectors).unwrap();

    let err = analyzer
        .analyze_project(&AnalysisContext::new(), project.path())
        .await
        .unwrap_err();

    assert!(err.is_cancellation());
    assert!(failed_phases(&err).contains(&Phase::Frameworks));
    assert!(!analyzer.cache().unwrap().contains_in_memory(project.path()));
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let mut config = AnalyzerConfig::new(".");
    config.max_workers = 0;
    assert!(matches!(
        Analyzer::new(config),
        Err(AnalysisError::InvalidConfig(_))
    ));

    let mut config = AnalyzerConfig::new(".");
    config.ignore_patterns.push("[unclosed".to_string());
    assert!(matches!(
        Analyzer::new(config),
        Err(AnalysisError::InvalidConfig(_))
    ));
}

#[tokio::test]
async fn test_unreadable_sample_degrades_conventions() {
    let utils = TestUtils::new();
    let project = TestUtils::create_go_project();
    // Invalid UTF-8 cannot be read as text for sampling.
    fs::write(project.path().join("broken.go"), [0xff, 0xfe, 0x00, 0x0a]).unwrap();
    let analyzer = Analyzer::new(utils.config(project.path())).unwrap();

    let result = analyzer
        .analyze_project(&AnalysisContext::new(), project.path())
        .await
        .unwrap();

    assert!(result.degraded);
    assert!(result
        .phase_errors
        .iter()
        .any(|e| e.phase == Phase::Conventions));
    assert!(!analyzer.cache().unwrap().contains_in_memory(project.path()));
}
