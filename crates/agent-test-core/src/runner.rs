//! Test runner: discovery, execution and aggregation.

use crate::assertion::AssertionEngine;
use crate::config::{ConfigError, ConfigOverrides, apply_overrides, load_config, validate_config};
use crate::lifecycle::{ClassDescriptor, TestClassDef, TestInfo, execute_expansion, execute_test};
use crate::loader::{LoaderError, discover_suite_files, is_suite_file, load_suite_file};
use crate::types::{AgentTestConfig, TestResult, TestStatus, TestSummary};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::mpsc;

/// Progress events emitted during test execution.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Discovery finished and execution is starting.
    RunStarted {
        suite_name: String,
        class_count: usize,
    },
    /// A class is about to run its selected tests.
    ClassStarted {
        class_name: String,
        test_count: usize,
    },
    /// One result is available (one per parametrized expansion).
    TestCompleted { result: TestResult },
    /// All selected tests of a class have run.
    ClassCompleted {
        class_name: String,
        passed: usize,
        failed: usize,
    },
}

/// Sender for progress events.
pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;

/// What to discover and run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Every registered class; no files.
    Registry,
    /// A directory or a single file.
    Path(PathBuf),
}

impl Scope {
    #[must_use]
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }
}

/// Errors that abort discovery.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("scope not found: {0}")]
    ScopeNotFound(PathBuf),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Loader error: {0}")]
    Loader(#[from] LoaderError),
    #[error("failed to load suite {}: {source}", path.display())]
    Suite {
        path: PathBuf,
        #[source]
        source: LoaderError,
    },
}

/// Errors that can occur during test execution.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),
    #[error("not a file: {0}")]
    NotAFile(PathBuf),
    #[error("class '{0}' not found in scope")]
    ClassNotFound(String),
    #[error("test '{test}' not found in class '{class}'")]
    TestNotFound { class: String, test: String },
    #[error("test '{class}::{test}' has {count} parameter sets; select one with '{test}[i]'")]
    AmbiguousTest {
        class: String,
        test: String,
        count: usize,
    },
}

/// Configuration for the test runner.
#[derive(Debug, Clone, Default)]
pub struct RunnerConfig {
    /// Substring matched against `Class::test`.
    pub filter: Option<String>,
    /// A test runs only if it carries every listed tag.
    pub tags: Vec<String>,
    pub overrides: ConfigOverrides,
}

impl RunnerConfig {
    fn selects(&self, class_name: &str, info: &TestInfo) -> bool {
        let name_ok = self
            .filter
            .as_deref()
            .is_none_or(|f| format!("{class_name}::{}", info.name).contains(f));
        let tags_ok = self.tags.iter().all(|t| info.tags.contains(t));
        name_ok && tags_ok
    }
}

/// Scope root with its normalized path, used to match registered classes.
#[derive(Debug, Clone)]
enum ScopeRoot {
    All,
    Dir(PathBuf),
    File(PathBuf),
}

impl ScopeRoot {
    fn contains(&self, class: &dyn TestClassDef) -> bool {
        match self {
            Self::All => true,
            Self::Dir(dir) => class
                .source()
                .is_some_and(|src| resolve_source(src, dir).starts_with(dir)),
            Self::File(file) => class
                .source()
                .is_some_and(|src| resolve_source(src, file) == *file),
        }
    }
}

fn normalize(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Resolve a declared source path against the scope root.
///
/// `file!()` paths are relative to the workspace root rather than the working
/// directory, so a relative source is tried against each ancestor of `root`
/// before the working directory.
fn resolve_source(src: &Path, root: &Path) -> PathBuf {
    if src.is_relative() {
        if let Some(found) = root
            .ancestors()
            .find_map(|base| base.join(src).canonicalize().ok())
        {
            return found;
        }
    }
    normalize(src)
}

/// Lazy, restartable sequence of discovered classes.
///
/// Registered classes in scope come first, in registration order, followed by
/// suite files in path order. Each file is parsed when reached. Cloning yields
/// an independent iterator starting from the current position.
#[derive(Clone)]
pub struct Discovery<'r> {
    registered: std::slice::Iter<'r, ClassDescriptor>,
    root: ScopeRoot,
    files: std::vec::IntoIter<PathBuf>,
}

impl Iterator for Discovery<'_> {
    type Item = Result<ClassDescriptor, DiscoveryError>;

    fn next(&mut self) -> Option<Self::Item> {
        for class in self.registered.by_ref() {
            if self.root.contains(class.as_ref()) {
                return Some(Ok(Arc::clone(class)));
            }
        }

        let path = self.files.next()?;
        Some(match load_suite_file(&path) {
            Ok(suite) => Ok(Arc::new(suite) as ClassDescriptor),
            Err(source) => Err(DiscoveryError::Suite { path, source }),
        })
    }
}

/// Discovers and runs test classes.
#[derive(Default)]
pub struct TestRunner {
    registry: Vec<ClassDescriptor>,
    config: RunnerConfig,
    progress: Option<ProgressSender>,
}

impl TestRunner {
    #[must_use]
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            registry: Vec::new(),
            config,
            progress: None,
        }
    }

    /// Send progress events to `tx`.
    #[must_use]
    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Add a class to the registry. Registration order is run order.
    pub fn register(&mut self, class: impl Into<ClassDescriptor>) -> &mut Self {
        self.registry.push(class.into());
        self
    }

    #[must_use]
    pub fn registered(&self) -> &[ClassDescriptor] {
        &self.registry
    }

    fn send(&self, event: ProgressEvent) {
        if let Some(tx) = &self.progress {
            let _ = tx.send(event);
        }
    }

    /// Configuration that applies to `scope`, with overrides applied.
    ///
    /// # Errors
    /// Returns an error if the config file is invalid or an override is out of range.
    pub fn scope_config(&self, scope: &Scope) -> Result<AgentTestConfig, ConfigError> {
        let base = match scope {
            Scope::Registry => AgentTestConfig::default(),
            Scope::Path(path) if path.is_dir() => load_config(path)?,
            Scope::Path(path) => {
                let parent = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or_else(|| Path::new("."));
                load_config(parent)?
            }
        };
        let config = apply_overrides(base, &self.config.overrides);
        validate_config(&config)?;
        Ok(config)
    }

    /// Discover classes within `scope`.
    ///
    /// # Errors
    /// Returns an error if the scope does not exist, its config is invalid, or
    /// the suite file patterns are invalid. Errors in individual suite files
    /// are reported by the iterator when the file is reached.
    pub fn discover(&self, scope: &Scope) -> Result<Discovery<'_>, DiscoveryError> {
        let config = self.scope_config(scope)?;
        self.discover_with(scope, &config)
    }

    fn discover_with(
        &self,
        scope: &Scope,
        config: &AgentTestConfig,
    ) -> Result<Discovery<'_>, DiscoveryError> {
        let (root, files) = match scope {
            Scope::Registry => (ScopeRoot::All, Vec::new()),
            Scope::Path(path) if path.is_dir() => {
                let files =
                    discover_suite_files(path, &config.test_patterns, &config.exclude_patterns)?;
                (ScopeRoot::Dir(normalize(path)), files)
            }
            Scope::Path(path) if path.is_file() => {
                let files = if is_suite_file(path) {
                    vec![path.clone()]
                } else {
                    Vec::new()
                };
                (ScopeRoot::File(normalize(path)), files)
            }
            Scope::Path(path) => return Err(DiscoveryError::ScopeNotFound(path.clone())),
        };

        Ok(Discovery {
            registered: self.registry.iter(),
            root,
            files: files.into_iter(),
        })
    }

    /// Discover everything in `scope`, then run it.
    ///
    /// # Errors
    /// Returns an error if configuration or discovery fails; no test runs in
    /// that case. Test failures are reported in the summary, never as errors.
    pub fn run_all(&self, scope: &Scope) -> Result<TestSummary, RunnerError> {
        let started = Instant::now();
        let started_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();

        let config = self.scope_config(scope)?;
        let classes = self
            .discover_with(scope, &config)?
            .collect::<Result<Vec<_>, _>>()?;

        let suite_name = config
            .suite_name
            .clone()
            .unwrap_or_else(|| default_suite_name(scope));
        let engine = AssertionEngine::new(config.assertion_config());

        tracing::info!(suite = %suite_name, classes = classes.len(), "run started");
        self.send(ProgressEvent::RunStarted {
            suite_name: suite_name.clone(),
            class_count: classes.len(),
        });

        let mut results = Vec::new();
        for class in &classes {
            results.extend(self.run_class(class.as_ref(), &engine));
        }

        let summary = TestSummary::new(suite_name, started_at, results, started.elapsed());
        let counts = summary.counts();
        tracing::info!(
            suite = summary.suite_name(),
            passed = counts.passed,
            failed = counts.failed,
            skipped = counts.skipped,
            errors = counts.errors,
            "run finished"
        );
        Ok(summary)
    }

    /// Run every selected test of one class against a single instance.
    fn run_class(&self, class: &dyn TestClassDef, engine: &AssertionEngine) -> Vec<TestResult> {
        let selected: Vec<(usize, &TestInfo)> = class
            .tests()
            .iter()
            .enumerate()
            .filter(|(_, info)| self.config.selects(class.name(), info))
            .collect();
        if selected.is_empty() {
            return Vec::new();
        }

        self.send(ProgressEvent::ClassStarted {
            class_name: class.name().to_string(),
            test_count: selected.len(),
        });

        let mut instance = class.instantiate();
        let mut results = Vec::new();
        for (index, info) in selected {
            for result in execute_test(class.name(), index, info, instance.as_mut(), engine) {
                self.send(ProgressEvent::TestCompleted {
                    result: result.clone(),
                });
                results.push(result);
            }
        }

        self.send(ProgressEvent::ClassCompleted {
            class_name: class.name().to_string(),
            passed: results
                .iter()
                .filter(|r| r.status() == TestStatus::Passed)
                .count(),
            failed: results.iter().filter(|r| r.is_failure()).count(),
        });
        results
    }

    /// Run every class found in a single file.
    ///
    /// # Errors
    /// Returns `RunnerError::NotAFile` if `path` is not a file, otherwise as
    /// [`TestRunner::run_all`].
    pub fn run_file(&self, path: &Path) -> Result<TestSummary, RunnerError> {
        if !path.is_file() {
            return Err(RunnerError::NotAFile(path.to_path_buf()));
        }
        self.run_all(&Scope::Path(path.to_path_buf()))
    }

    /// Run one test through the full lifecycle.
    ///
    /// `name[i]` selects one parameter set of a parametrized test; a bare name
    /// on a parametrized test is rejected. Filters and tags do not apply.
    ///
    /// # Errors
    /// Returns an error if discovery fails or the class or test is unknown.
    pub fn run_test(
        &self,
        scope: &Scope,
        class_name: &str,
        test_name: &str,
    ) -> Result<TestResult, RunnerError> {
        let config = self.scope_config(scope)?;
        let mut discovery = self.discover_with(scope, &config)?;
        let class = loop {
            match discovery.next() {
                Some(Ok(class)) if class.name() == class_name => break class,
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => return Err(RunnerError::ClassNotFound(class_name.to_string())),
            }
        };

        let not_found = || RunnerError::TestNotFound {
            class: class_name.to_string(),
            test: test_name.to_string(),
        };
        let (base, set) = split_expansion(test_name);
        let (index, info) = class
            .tests()
            .iter()
            .enumerate()
            .find(|(_, info)| info.name == base)
            .ok_or_else(not_found)?;

        let engine = AssertionEngine::new(config.assertion_config());
        let mut instance = class.instantiate();
        let result = match set {
            Some(set) => {
                execute_expansion(class.name(), index, info, set, instance.as_mut(), &engine)
                    .ok_or_else(not_found)?
            }
            None if info.is_parametrized() && info.skip.is_none() => {
                return Err(RunnerError::AmbiguousTest {
                    class: class_name.to_string(),
                    test: base.to_string(),
                    count: info.parameter_sets.len(),
                });
            }
            None => execute_test(class.name(), index, info, instance.as_mut(), &engine)
                .into_iter()
                .next()
                .ok_or_else(not_found)?,
        };

        self.send(ProgressEvent::TestCompleted {
            result: result.clone(),
        });
        Ok(result)
    }
}

/// Split `name[3]` into `("name", Some(3))`.
fn split_expansion(name: &str) -> (&str, Option<usize>) {
    name.strip_suffix(']')
        .and_then(|rest| rest.rsplit_once('['))
        .and_then(|(base, index)| index.parse().ok().map(|i| (base, Some(i))))
        .unwrap_or((name, None))
}

fn default_suite_name(scope: &Scope) -> String {
    match scope {
        Scope::Registry => "registry".to_string(),
        Scope::Path(path) => normalize(path)
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{AgentTest, TestClass, TestDescriptor, TestError, TestOutcome};
    use crate::mock::{MockMatcher, mock_llm_response};
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[derive(Default)]
    struct MathAgent {
        mock: MockMatcher,
    }

    impl AgentTest for MathAgent {
        fn setup(&mut self) -> TestOutcome {
            self.mock = MockMatcher::new();
            self.mock.add_exact("What is 2+2?", "The answer is 4")?;
            self.mock.set_default("I don't know");
            Ok(())
        }
    }

    fn math_class() -> TestClass<MathAgent> {
        TestClass::with_default("MathAgent")
            .test(
                TestDescriptor::new("test_basic_math", |agent: &mut MathAgent, ctx| {
                    let response = agent.mock.resolve("What is 2+2?")?;
                    ctx.record_usage(&response);
                    ctx.engine().assert_contains(&response.content, "4")?;
                    Ok(())
                })
                .tag("math"),
            )
            .test(TestDescriptor::new(
                "test_unknown",
                |agent: &mut MathAgent, ctx| {
                    let response = agent.mock.resolve("Random question")?;
                    ctx.engine().assert_contains(&response.content, "42")?;
                    Ok(())
                },
            ))
            .test(
                TestDescriptor::new("test_later", |_: &mut MathAgent, _| {
                    Err(TestError::other("must not run"))
                })
                .skip("not implemented"),
            )
            .test(
                TestDescriptor::new("test_param", |agent: &mut MathAgent, ctx| {
                    let prompt = ctx.param_str("prompt")?;
                    let response = agent.mock.resolve(prompt)?;
                    ctx.engine().assert_contains(&response.content, ctx.param_str("expected")?)?;
                    Ok(())
                })
                .tag("math")
                .parametrize([
                    json!({"prompt": "What is 2+2?", "expected": "4"}),
                    json!({"prompt": "What is 3+3?", "expected": "6"}),
                ]),
            )
    }

    #[derive(Default)]
    struct Declared;

    impl AgentTest for Declared {}

    #[derive(Default)]
    struct ScenarioAgent {
        mock: MockMatcher,
    }

    impl AgentTest for ScenarioAgent {
        fn setup(&mut self) -> TestOutcome {
            self.mock = MockMatcher::new();
            self.mock.add_response(
                "What is 2+2?",
                mock_llm_response("The answer is 4").with_tokens(20),
            )?;
            Ok(())
        }
    }

    const SUITE: &str = r#"
name: YamlAgent
mocks:
  - exact: "hello"
    response: "Hello there"
tests:
  - name: greets
    prompt: "hello"
    assertions:
      - type: contains
        value: "hello"
"#;

    #[test]
    fn test_end_to_end_registry() -> TestResult {
        let mut runner = TestRunner::default();
        runner.register(math_class().into_descriptor());

        let summary = runner.run_all(&Scope::Registry)?;
        let names: Vec<_> = summary
            .results()
            .iter()
            .map(|r| (r.test_name(), r.status()))
            .collect();
        assert_eq!(
            names,
            [
                ("test_basic_math", TestStatus::Passed),
                ("test_unknown", TestStatus::Failed),
                ("test_later", TestStatus::Skipped),
                ("test_param[0]", TestStatus::Passed),
                ("test_param[1]", TestStatus::Failed),
            ]
        );
        assert_eq!(summary.suite_name(), "registry");
        assert_eq!(summary.counts().passed, 2);
        assert_eq!(summary.counts().failed, 2);
        assert_eq!(summary.counts().skipped, 1);
        assert!(!summary.is_success());
        assert!(summary.wall_duration() >= summary.test_duration());
        assert!(summary.started_at().ends_with('Z'));

        let first = &summary.results()[0];
        assert_eq!(first.metrics().map(|m| m.tokens), Some(100));
        assert_eq!(first.tags(), ["math"]);
        Ok(())
    }

    #[test]
    fn test_filter_and_tags() -> TestResult {
        let mut runner = TestRunner::new(RunnerConfig {
            tags: vec!["math".into()],
            ..RunnerConfig::default()
        });
        runner.register(math_class().into_descriptor());
        let summary = runner.run_all(&Scope::Registry)?;
        assert_eq!(summary.results().len(), 3);

        let mut runner = TestRunner::new(RunnerConfig {
            filter: Some("MathAgent::test_unk".into()),
            ..RunnerConfig::default()
        });
        runner.register(math_class().into_descriptor());
        let summary = runner.run_all(&Scope::Registry)?;
        assert_eq!(summary.results().len(), 1);
        assert_eq!(summary.results()[0].test_name(), "test_unknown");
        Ok(())
    }

    #[test]
    fn test_directory_scope() -> TestResult {
        let dir = TempDir::new()?;
        fs::write(dir.path().join("b.agent-test.yaml"), SUITE.replace("YamlAgent", "B"))?;
        fs::write(dir.path().join("a.agent-test.yaml"), SUITE.replace("YamlAgent", "A"))?;
        let in_scope = dir.path().join("math_tests.rs");
        fs::write(&in_scope, "// declared here")?;

        let mut runner = TestRunner::default();
        runner.register(math_class().source(in_scope).into_descriptor());
        runner.register(math_class().source("elsewhere/other.rs").into_descriptor());

        let classes: Vec<String> = runner
            .discover(&Scope::path(dir.path()))?
            .map(|c| c.map(|c| c.name().to_string()))
            .collect::<Result<_, _>>()?;
        assert_eq!(classes, ["MathAgent", "A", "B"]);

        let summary = runner.run_all(&Scope::path(dir.path()))?;
        assert_eq!(summary.results().len(), 7);
        Ok(())
    }

    #[test]
    fn test_source_from_file_macro() -> TestResult {
        let src_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("src");
        let mut runner = TestRunner::default();
        runner.register(
            TestClass::<Declared>::with_default("Declared")
                .source(file!())
                .test(TestDescriptor::new("test_ok", |_: &mut Declared, _| Ok(())))
                .into_descriptor(),
        );

        let summary = runner.run_all(&Scope::path(&src_dir))?;
        assert_eq!(summary.results().len(), 1);
        assert_eq!(summary.results()[0].full_name(), "Declared::test_ok");

        let summary = runner.run_file(&src_dir.join("runner.rs"))?;
        assert_eq!(summary.results().len(), 1);

        let summary = runner.run_file(&src_dir.join("lib.rs"))?;
        assert!(summary.results().is_empty());
        Ok(())
    }

    #[test]
    fn test_token_count_and_failed_answer() -> TestResult {
        let mut runner = TestRunner::default();
        runner.register(
            TestClass::<ScenarioAgent>::with_default("ScenarioAgent")
                .test(TestDescriptor::new(
                    "test_tokens",
                    |agent: &mut ScenarioAgent, ctx| {
                        let response = agent.mock.resolve("What is 2+2?")?;
                        ctx.record_usage(&response);
                        ctx.engine().assert_equals(&response.tokens_used, &20)?;
                        Ok(())
                    },
                ))
                .test(TestDescriptor::new(
                    "test_wrong_answer",
                    |agent: &mut ScenarioAgent, ctx| {
                        let response = agent.mock.resolve("What is 2+2?")?;
                        ctx.engine().assert_contains(&response.content, "5")?;
                        Ok(())
                    },
                ))
                .into_descriptor(),
        );

        let summary = runner.run_all(&Scope::Registry)?;
        let [tokens, wrong] = summary.results() else {
            return Err("expected two results".into());
        };
        assert_eq!(tokens.status(), TestStatus::Passed);
        assert_eq!(tokens.metrics().map(|m| m.tokens), Some(20));
        assert_eq!(wrong.status(), TestStatus::Failed);
        assert!(wrong.message().is_some_and(|m| m.contains("'5'")));
        assert_eq!(summary.counts().passed, 1);
        assert_eq!(summary.counts().failed, 1);
        Ok(())
    }

    #[test]
    fn test_discovery_is_lazy_and_restartable() -> TestResult {
        let dir = TempDir::new()?;
        fs::write(dir.path().join("a.agent-test.yaml"), SUITE)?;
        fs::write(dir.path().join("z.agent-test.yaml"), "name: [not, valid")?;

        let runner = TestRunner::default();
        let mut discovery = runner.discover(&Scope::path(dir.path()))?;
        let restart = discovery.clone();

        let first = discovery.next().ok_or("expected a class")??;
        assert_eq!(first.name(), "YamlAgent");
        assert!(matches!(discovery.next(), Some(Err(DiscoveryError::Suite { .. }))));
        assert!(discovery.next().is_none());

        assert_eq!(restart.count(), 2);
        Ok(())
    }

    #[test]
    fn test_discovery_error_aborts_run() -> TestResult {
        let dir = TempDir::new()?;
        fs::write(dir.path().join("a.agent-test.yaml"), SUITE)?;
        fs::write(
            dir.path().join("b.agent-test.yaml"),
            "name: Bad\ntests:\n  - name: t\n    prompt: \"\"\n",
        )?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let runner = TestRunner::default().with_progress(tx);
        let result = runner.run_all(&Scope::path(dir.path()));
        assert!(matches!(
            result,
            Err(RunnerError::Discovery(DiscoveryError::Suite { .. }))
        ));
        // Nothing ran
        assert!(rx.try_recv().is_err());
        Ok(())
    }

    #[test]
    fn test_missing_scope() {
        let runner = TestRunner::default();
        let result = runner.discover(&Scope::path("/definitely/not/here"));
        assert!(matches!(result, Err(DiscoveryError::ScopeNotFound(_))));
    }

    #[test]
    fn test_scope_config_applies() -> TestResult {
        let dir = TempDir::new()?;
        fs::write(
            dir.path().join("agent-test.config.yaml"),
            "suite-name: Greeters\ncase-sensitive: true\n",
        )?;
        fs::write(dir.path().join("a.agent-test.yaml"), SUITE)?;

        let summary = TestRunner::default().run_all(&Scope::path(dir.path()))?;
        assert_eq!(summary.suite_name(), "Greeters");
        // "Hello there" does not contain "hello" case-sensitively
        assert_eq!(summary.counts().failed, 1);

        let runner = TestRunner::new(RunnerConfig {
            overrides: ConfigOverrides {
                case_sensitive: Some(false),
                ..ConfigOverrides::default()
            },
            ..RunnerConfig::default()
        });
        let summary = runner.run_all(&Scope::path(dir.path()))?;
        assert!(summary.is_success());
        Ok(())
    }

    #[test]
    fn test_invalid_override_is_config_error() {
        let runner = TestRunner::new(RunnerConfig {
            overrides: ConfigOverrides {
                similarity_threshold: Some(2.0),
                ..ConfigOverrides::default()
            },
            ..RunnerConfig::default()
        });
        let result = runner.run_all(&Scope::Registry);
        assert!(matches!(
            result,
            Err(RunnerError::Config(ConfigError::ThresholdOutOfRange { .. }))
        ));
    }

    #[test]
    fn test_run_file() -> TestResult {
        let dir = TempDir::new()?;
        let path = dir.path().join("a.agent-test.yaml");
        fs::write(&path, SUITE)?;

        let runner = TestRunner::default();
        let summary = runner.run_file(&path)?;
        assert_eq!(summary.results().len(), 1);
        assert_eq!(summary.suite_name(), "a.agent-test.yaml");

        assert!(matches!(
            runner.run_file(dir.path()),
            Err(RunnerError::NotAFile(_))
        ));
        Ok(())
    }

    #[test]
    fn test_run_test_selection() -> TestResult {
        let mut runner = TestRunner::default();
        runner.register(math_class().into_descriptor());
        let scope = Scope::Registry;

        let result = runner.run_test(&scope, "MathAgent", "test_basic_math")?;
        assert_eq!(result.status(), TestStatus::Passed);

        let result = runner.run_test(&scope, "MathAgent", "test_param[1]")?;
        assert_eq!(result.test_name(), "test_param[1]");
        assert_eq!(result.status(), TestStatus::Failed);

        assert!(matches!(
            runner.run_test(&scope, "MathAgent", "test_param"),
            Err(RunnerError::AmbiguousTest { count: 2, .. })
        ));
        assert!(matches!(
            runner.run_test(&scope, "MathAgent", "test_param[9]"),
            Err(RunnerError::TestNotFound { .. })
        ));
        assert!(matches!(
            runner.run_test(&scope, "MathAgent", "nope"),
            Err(RunnerError::TestNotFound { .. })
        ));
        assert!(matches!(
            runner.run_test(&scope, "Nobody", "x"),
            Err(RunnerError::ClassNotFound(_))
        ));

        let skipped = runner.run_test(&scope, "MathAgent", "test_later")?;
        assert_eq!(skipped.status(), TestStatus::Skipped);
        Ok(())
    }

    #[test]
    fn test_progress_events() -> TestResult {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut runner = TestRunner::default().with_progress(tx);
        runner.register(math_class().into_descriptor());
        runner.run_all(&Scope::Registry)?;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(matches!(
            events.first(),
            Some(ProgressEvent::RunStarted { class_count: 1, .. })
        ));
        assert!(matches!(
            events.get(1),
            Some(ProgressEvent::ClassStarted { test_count: 4, .. })
        ));
        let completed = events
            .iter()
            .filter(|e| matches!(e, ProgressEvent::TestCompleted { .. }))
            .count();
        assert_eq!(completed, 5);
        assert!(matches!(
            events.last(),
            Some(ProgressEvent::ClassCompleted {
                passed: 2,
                failed: 2,
                ..
            })
        ));
        Ok(())
    }

    #[test]
    fn test_split_expansion() {
        assert_eq!(split_expansion("t[3]"), ("t", Some(3)));
        assert_eq!(split_expansion("t"), ("t", None));
        assert_eq!(split_expansion("t[x]"), ("t[x]", None));
    }
}
