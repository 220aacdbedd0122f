//! YAML loader for suite files.
//!
//! A suite file declares one test class: mock rules, a default response and
//! test cases with declared assertions. Loaded suites implement
//! [`TestClassDef`] so the runner treats them like classes registered in code.

use crate::config::CONFIG_FILE_NAME;
use crate::lifecycle::{TestClassDef, TestContext, TestError, TestInfo, TestInstance, TestOutcome};
use crate::mock::{ConfigurationError, MockMatcher};
use crate::types::{Assertion, MockRuleSpec, SuiteFile, SuiteTestCase, render_template};
use glob::glob;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yml::Error),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),
    #[error("invalid mock rule #{index}: {source}")]
    MockRule {
        index: usize,
        #[source]
        source: ConfigurationError,
    },
    #[error("invalid regex '{pattern}' in test '{test}': {source}")]
    InvalidRegex {
        test: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Discover suite files in a directory using patterns.
///
/// # Errors
/// Returns an error if glob pattern is invalid.
pub fn discover_suite_files(
    dir: &Path,
    patterns: &[String],
    exclude_patterns: &[String],
) -> Result<Vec<PathBuf>, LoaderError> {
    let mut files = Vec::new();
    let mut seen = HashSet::new();

    for pattern in patterns {
        let full_pattern = dir.join(pattern);
        let pattern_str = full_pattern.to_string_lossy();

        for path in glob(&pattern_str)?.flatten() {
            let relative = path.strip_prefix(dir).unwrap_or(&path);
            let relative_str = relative.to_string_lossy();

            // Glob matching for wildcard patterns, substring match for plain ones like "target/"
            let excluded = exclude_patterns.iter().any(|ex| {
                if ex.contains('*') || ex.contains('?') || ex.contains('[') {
                    glob::Pattern::new(ex)
                        .map_or_else(|_| relative_str.contains(ex), |p| p.matches(&relative_str))
                } else {
                    relative_str.contains(ex)
                }
            });

            if !excluded && path.is_file() && seen.insert(path.clone()) {
                files.push(path);
            }
        }
    }

    // Sort by path for deterministic order
    files.sort();
    Ok(files)
}

/// Whether an explicitly named file should be loaded as a suite.
#[must_use]
pub fn is_suite_file(path: &Path) -> bool {
    let is_yaml = path
        .extension()
        .is_some_and(|ext| ext == "yaml" || ext == "yml");
    let is_config = path
        .file_name()
        .is_some_and(|name| name == CONFIG_FILE_NAME);
    is_yaml && !is_config
}

/// Load and validate a suite file.
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - YAML parsing fails
/// - Validation fails (empty name or prompt, duplicate test names, bad mock rules or regexes)
pub fn load_suite_file<P: AsRef<Path>>(path: P) -> Result<YamlSuite, LoaderError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let suite: SuiteFile = serde_yml::from_str(&content)?;

    validate_suite(&suite)?;
    let matcher = build_matcher(&suite)?;

    let infos = suite.tests.iter().map(test_info).collect();
    tracing::debug!(
        path = %path.display(),
        suite = %suite.name,
        tests = suite.tests.len(),
        "suite loaded"
    );

    Ok(YamlSuite {
        name: suite.name,
        source: path.to_path_buf(),
        matcher,
        cases: suite.tests,
        infos,
    })
}

fn validate_suite(suite: &SuiteFile) -> Result<(), LoaderError> {
    if suite.name.trim().is_empty() {
        return Err(LoaderError::Validation("suite name cannot be empty".into()));
    }

    let mut names = HashSet::new();
    for case in &suite.tests {
        validate_test_case(case)?;
        if !names.insert(case.name.as_str()) {
            return Err(LoaderError::Validation(format!(
                "duplicate test name '{}'",
                case.name
            )));
        }
    }

    for (index, rule) in suite.mocks.iter().enumerate() {
        if rule.exact.is_some() == rule.pattern.is_some() {
            return Err(LoaderError::Validation(format!(
                "mock rule #{index} must set exactly one of 'exact' or 'pattern'"
            )));
        }
    }
    Ok(())
}

/// Validate a single test case.
fn validate_test_case(case: &SuiteTestCase) -> Result<(), LoaderError> {
    if case.name.trim().is_empty() {
        return Err(LoaderError::Validation("test name cannot be empty".into()));
    }
    if case.prompt.is_empty() {
        return Err(LoaderError::Validation(format!(
            "test '{}' prompt cannot be empty",
            case.name
        )));
    }

    // Templated patterns are only known per parameter set
    for assertion in &case.assertions {
        if let Assertion::Regex(a) = assertion {
            if a.pattern.contains("{{") {
                continue;
            }
            Regex::new(&a.pattern).map_err(|e| LoaderError::InvalidRegex {
                test: case.name.clone(),
                pattern: a.pattern.clone(),
                source: e,
            })?;
        }
    }
    Ok(())
}

fn build_matcher(suite: &SuiteFile) -> Result<MockMatcher, LoaderError> {
    let mut matcher = MockMatcher::new();
    for (index, MockRuleSpec { exact, pattern, response }) in suite.mocks.iter().enumerate() {
        let registered = match (exact, pattern) {
            (Some(prompt), _) => matcher.add_exact(prompt.clone(), response.clone()).map(|_| ()),
            (None, Some(pattern)) => matcher.add_pattern(pattern, response.clone()).map(|_| ()),
            (None, None) => Ok(()),
        };
        registered.map_err(|source| LoaderError::MockRule { index, source })?;
    }
    if let Some(default) = &suite.default_response {
        matcher.set_default(default.clone());
    }
    Ok(matcher)
}

fn test_info(case: &SuiteTestCase) -> TestInfo {
    TestInfo {
        name: case.name.clone(),
        tags: case.tags.clone(),
        parameter_sets: case.parametrize.clone(),
        skip: case.skip.clone(),
    }
}

/// A test class loaded from a suite file.
#[derive(Debug, Clone)]
pub struct YamlSuite {
    name: String,
    source: PathBuf,
    matcher: MockMatcher,
    cases: Vec<SuiteTestCase>,
    infos: Vec<TestInfo>,
}

impl YamlSuite {
    /// Mock rules declared by the suite, before any call.
    #[must_use]
    pub const fn matcher(&self) -> &MockMatcher {
        &self.matcher
    }

    #[must_use]
    pub fn cases(&self) -> &[SuiteTestCase] {
        &self.cases
    }
}

impl TestClassDef for YamlSuite {
    fn name(&self) -> &str {
        &self.name
    }

    fn source(&self) -> Option<&Path> {
        Some(self.source.as_path())
    }

    fn tests(&self) -> &[TestInfo] {
        &self.infos
    }

    fn instantiate(&self) -> Box<dyn TestInstance + '_> {
        Box::new(SuiteInstance {
            cases: &self.cases,
            matcher: self.matcher.clone(),
        })
    }
}

struct SuiteInstance<'s> {
    cases: &'s [SuiteTestCase],
    matcher: MockMatcher,
}

impl TestInstance for SuiteInstance<'_> {
    /// Every test starts with an empty call log.
    fn setup(&mut self) -> TestOutcome {
        self.matcher.reset();
        Ok(())
    }

    fn teardown(&mut self) -> TestOutcome {
        Ok(())
    }

    fn call(&mut self, index: usize, ctx: &mut TestContext<'_>) -> TestOutcome {
        let case = self
            .cases
            .get(index)
            .ok_or_else(|| TestError::other(format!("no test at index {index}")))?;
        let params = ctx.params().cloned().unwrap_or_default();

        let prompt = render_template(&case.prompt, &params);
        let mut kwargs = case.kwargs.clone();
        kwargs.extend(params.clone());

        let response = self.matcher.resolve_with(&prompt, &kwargs)?;
        ctx.record_usage(&response);

        let engine = ctx.engine();
        for assertion in &case.assertions {
            engine
                .evaluate(&assertion.render(&params), &response)?
                .into_result()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assertion::AssertionEngine;
    use crate::lifecycle::execute_test;
    use crate::types::{TestResult as RunResult, TestStatus};
    use std::fs;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    const MATH_SUITE: &str = r#"
name: MathAgent
mocks:
  - exact: "What is 2+2?"
    response: { content: "The answer is 4", tokens_used: 20 }
  - pattern: "capital"
    response: "I can help with geography questions"
default_response: "I don't know"
tests:
  - name: exact_answer
    prompt: "What is 2+2?"
    tags: [math]
    assertions:
      - type: contains
        value: "4"
      - type: tokens
        max: 50
  - name: parametrized
    prompt: "What is {{input}}?"
    parametrize:
      - { input: "2+2", expected: "4" }
      - { input: "3+3", expected: "6" }
    assertions:
      - type: contains
        value: "{{expected}}"
  - name: later
    skip: "not implemented"
    prompt: "x"
"#;

    fn write_suite(dir: &Path, name: &str, content: &str) -> std::io::Result<PathBuf> {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)?;
        Ok(path)
    }

    fn run_suite(suite: &YamlSuite) -> Vec<RunResult> {
        let engine = AssertionEngine::default();
        let mut instance = suite.instantiate();
        let mut results = Vec::new();
        for (index, info) in suite.tests().iter().enumerate() {
            results.extend(execute_test(suite.name(), index, info, instance.as_mut(), &engine));
        }
        results
    }

    #[test]
    fn test_discover_suite_files() -> TestResult {
        let dir = TempDir::new()?;
        write_suite(dir.path(), "b.agent-test.yaml", "name: B")?;
        write_suite(dir.path(), "nested/a.agent-test.yml", "name: A")?;
        write_suite(dir.path(), "target/c.agent-test.yaml", "name: C")?;
        write_suite(dir.path(), "notes.yaml", "x: 1")?;

        let files = discover_suite_files(
            dir.path(),
            &["**/*.agent-test.yaml".into(), "**/*.agent-test.yml".into()],
            &["target/".into()],
        )?;

        let names: Vec<_> = files
            .iter()
            .filter_map(|p| p.strip_prefix(dir.path()).ok())
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(names, ["b.agent-test.yaml", "nested/a.agent-test.yml"]);
        Ok(())
    }

    #[test]
    fn test_discover_glob_exclude() -> TestResult {
        let dir = TempDir::new()?;
        write_suite(dir.path(), "keep.agent-test.yaml", "name: K")?;
        write_suite(dir.path(), "drafts/skip.agent-test.yaml", "name: S")?;

        let files = discover_suite_files(
            dir.path(),
            &["**/*.agent-test.yaml".into()],
            &["drafts/*".into()],
        )?;
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("keep.agent-test.yaml"));
        Ok(())
    }

    #[test]
    fn test_is_suite_file() {
        assert!(is_suite_file(Path::new("x/suite.agent-test.yaml")));
        assert!(is_suite_file(Path::new("other.yml")));
        assert!(!is_suite_file(Path::new("agent-test.config.yaml")));
        assert!(!is_suite_file(Path::new("main.rs")));
    }

    #[test]
    fn test_load_suite_file() -> TestResult {
        let dir = TempDir::new()?;
        let path = write_suite(dir.path(), "math.agent-test.yaml", MATH_SUITE)?;

        let suite = load_suite_file(&path)?;
        assert_eq!(suite.name(), "MathAgent");
        assert_eq!(suite.source(), Some(path.as_path()));
        assert_eq!(suite.tests().len(), 3);
        assert_eq!(suite.tests()[1].parameter_sets.len(), 2);
        assert_eq!(suite.tests()[2].skip.as_deref(), Some("not implemented"));
        assert_eq!(suite.matcher().rule_count(), 2);
        assert!(suite.matcher().has_default());
        Ok(())
    }

    #[test]
    fn test_run_loaded_suite() -> TestResult {
        let dir = TempDir::new()?;
        let path = write_suite(dir.path(), "math.agent-test.yaml", MATH_SUITE)?;
        let suite = load_suite_file(&path)?;

        let results = run_suite(&suite);
        let summary: Vec<_> = results
            .iter()
            .map(|r| (r.test_name(), r.status()))
            .collect();
        assert_eq!(
            summary,
            [
                ("exact_answer", TestStatus::Passed),
                ("parametrized[0]", TestStatus::Passed),
                // "What is 3+3?" falls through to the default response
                ("parametrized[1]", TestStatus::Failed),
                ("later", TestStatus::Skipped),
            ]
        );
        assert_eq!(results[0].metrics().map(|m| m.tokens), Some(20));
        assert!(results[2].message().is_some_and(|m| m.contains("'6'")));
        Ok(())
    }

    #[test]
    fn test_unmatched_prompt_without_default_is_error() -> TestResult {
        let dir = TempDir::new()?;
        let path = write_suite(
            dir.path(),
            "s.agent-test.yaml",
            "name: S\ntests:\n  - name: t\n    prompt: nothing matches\n",
        )?;
        let results = run_suite(&load_suite_file(&path)?);
        assert_eq!(results[0].status(), TestStatus::Error);
        Ok(())
    }

    #[test]
    fn test_validation_errors() -> TestResult {
        let dir = TempDir::new()?;
        let cases = [
            ("empty_prompt", "name: S\ntests:\n  - name: t\n    prompt: \"\"\n"),
            (
                "duplicate",
                "name: S\ntests:\n  - name: t\n    prompt: a\n  - name: t\n    prompt: b\n",
            ),
            (
                "both_keys",
                "name: S\nmocks:\n  - exact: a\n    pattern: b\n    response: r\n",
            ),
            ("neither_key", "name: S\nmocks:\n  - response: r\n"),
            ("empty_name", "name: \"\"\n"),
        ];
        for (file, content) in cases {
            let path = write_suite(dir.path(), &format!("{file}.agent-test.yaml"), content)?;
            let result = load_suite_file(&path);
            assert!(
                matches!(result, Err(LoaderError::Validation(_))),
                "{file} should fail validation"
            );
        }
        Ok(())
    }

    #[test]
    fn test_invalid_mock_pattern() -> TestResult {
        let dir = TempDir::new()?;
        let path = write_suite(
            dir.path(),
            "bad.agent-test.yaml",
            "name: S\nmocks:\n  - pattern: \"[invalid\"\n    response: r\n",
        )?;
        let result = load_suite_file(&path);
        assert!(matches!(
            result,
            Err(LoaderError::MockRule {
                index: 0,
                source: ConfigurationError::InvalidPattern { .. }
            })
        ));
        Ok(())
    }

    #[test]
    fn test_invalid_assertion_regex() -> TestResult {
        let dir = TempDir::new()?;
        let path = write_suite(
            dir.path(),
            "bad.agent-test.yaml",
            concat!(
                "name: S\ntests:\n  - name: t\n    prompt: p\n    assertions:\n",
                "      - type: regex\n        pattern: \"(unclosed\"\n",
            ),
        )?;
        let result = load_suite_file(&path);
        assert!(matches!(result, Err(LoaderError::InvalidRegex { .. })));
        Ok(())
    }

    #[test]
    fn test_unknown_assertion_type_rejected() -> TestResult {
        let dir = TempDir::new()?;
        let path = write_suite(
            dir.path(),
            "bad.agent-test.yaml",
            concat!(
                "name: S\ntests:\n  - name: t\n    prompt: p\n    assertions:\n",
                "      - type: telepathy\n",
            ),
        )?;
        assert!(matches!(load_suite_file(&path), Err(LoaderError::Yaml(_))));
        Ok(())
    }
}
