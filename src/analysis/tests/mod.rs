mod dependency_tests;
mod project_tests;
