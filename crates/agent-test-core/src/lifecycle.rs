//! Test registration and the per-test execution lifecycle.
//!
//! A test class is a value type `T: AgentTest` plus a list of named bodies.
//! The runner instantiates each class once and drives every test through
//! [`execute_test`]:
//!
//! 1. a skipped test yields one `Skipped` result and nothing else runs;
//! 2. a parametrized test expands into `name[0]`, `name[1]`, ... and each
//!    expansion goes through steps 3 to 6 on its own;
//! 3. `setup()`; a failure yields `Error` and the body is not run;
//! 4. the body, timed;
//! 5. `Ok` is `Passed`, an assertion failure is `Failed`, anything else
//!    (including a panic) is `Error`;
//! 6. `teardown()` always runs.

use crate::adapter::AdapterError;
use crate::assertion::{AssertionEngine, AssertionError, AssertionFailure};
use crate::mock::{ConfigurationError, MockResponse, ResolveError};
use crate::types::{Params, TestMetrics, TestResult, TestStatus};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Everything a test body, `setup` or `teardown` can fail with.
///
/// Only `Assertion` classifies a test as failed; every other variant is an
/// error in the test itself.
#[derive(Error, Debug)]
pub enum TestError {
    #[error(transparent)]
    Assertion(#[from] AssertionFailure),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error("invalid assertion: {0}")]
    InvalidAssertion(String),
    #[error("missing parameter '{0}'")]
    MissingParam(String),
    #[error("test panicked: {0}")]
    Panicked(String),
    #[error("{0}")]
    Other(String),
}

impl From<AssertionError> for TestError {
    fn from(err: AssertionError) -> Self {
        match err {
            AssertionError::Failed(failure) => Self::Assertion(failure),
            other => Self::InvalidAssertion(other.to_string()),
        }
    }
}

impl TestError {
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    #[must_use]
    pub const fn is_assertion(&self) -> bool {
        matches!(self, Self::Assertion(_))
    }
}

pub type TestOutcome = Result<(), TestError>;

/// Per-instance hooks run around every test of a class.
pub trait AgentTest {
    fn setup(&mut self) -> TestOutcome {
        Ok(())
    }

    fn teardown(&mut self) -> TestOutcome {
        Ok(())
    }
}

/// What a test body can see and record.
#[derive(Debug)]
pub struct TestContext<'a> {
    params: Option<&'a Params>,
    engine: &'a AssertionEngine,
    metrics: Option<TestMetrics>,
}

impl<'a> TestContext<'a> {
    #[must_use]
    pub const fn new(engine: &'a AssertionEngine, params: Option<&'a Params>) -> Self {
        Self {
            params,
            engine,
            metrics: None,
        }
    }

    /// Parameter set of the current expansion.
    #[must_use]
    pub const fn params(&self) -> Option<&'a Params> {
        self.params
    }

    /// # Errors
    /// Returns `TestError::MissingParam` if the key is absent.
    pub fn param(&self, key: &str) -> Result<&'a serde_json::Value, TestError> {
        self.params
            .and_then(|p| p.get(key))
            .ok_or_else(|| TestError::MissingParam(key.to_string()))
    }

    /// # Errors
    /// Returns `TestError::MissingParam` if the key is absent or not a string.
    pub fn param_str(&self, key: &str) -> Result<&'a str, TestError> {
        self.param(key)?
            .as_str()
            .ok_or_else(|| TestError::MissingParam(key.to_string()))
    }

    #[must_use]
    pub const fn engine(&self) -> &'a AssertionEngine {
        self.engine
    }

    /// Add the usage figures of a response to this test's metrics.
    pub fn record_usage(&mut self, response: &MockResponse) {
        self.record_metrics(TestMetrics {
            cost: response.cost,
            tokens: response.tokens_used,
            latency: response.latency,
        });
    }

    pub fn record_metrics(&mut self, metrics: TestMetrics) {
        self.metrics.get_or_insert_with(TestMetrics::default).add(metrics);
    }

    #[must_use]
    pub const fn metrics(&self) -> Option<TestMetrics> {
        self.metrics
    }
}

type TestBody<T> = Arc<dyn Fn(&mut T, &mut TestContext<'_>) -> TestOutcome + Send + Sync>;

/// Registration data of one test, independent of its body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestInfo {
    pub name: String,
    pub tags: Vec<String>,
    pub parameter_sets: Vec<Params>,
    /// Skip reason.
    pub skip: Option<String>,
}

impl TestInfo {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Names of the results this test produces when run.
    #[must_use]
    pub fn expanded_names(&self) -> Vec<String> {
        if self.skip.is_some() || self.parameter_sets.is_empty() {
            vec![self.name.clone()]
        } else {
            (0..self.parameter_sets.len())
                .map(|i| expansion_name(&self.name, i))
                .collect()
        }
    }

    #[must_use]
    pub const fn is_parametrized(&self) -> bool {
        !self.parameter_sets.is_empty()
    }
}

fn expansion_name(name: &str, index: usize) -> String {
    format!("{name}[{index}]")
}

/// Convert a JSON value into a parameter set.
///
/// Objects are used as-is; any other value is bound to the key `value`.
#[must_use]
pub fn param_set(value: serde_json::Value) -> Params {
    match value {
        serde_json::Value::Object(map) => map,
        other => {
            let mut params = Params::new();
            params.insert("value".to_string(), other);
            params
        }
    }
}

/// A test body together with its registration data.
pub struct TestDescriptor<T> {
    info: TestInfo,
    body: TestBody<T>,
}

impl<T> TestDescriptor<T> {
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut T, &mut TestContext<'_>) -> TestOutcome + Send + Sync + 'static,
    {
        Self {
            info: TestInfo::new(name),
            body: Arc::new(body),
        }
    }

    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.info.tags.push(tag.into());
        self
    }

    #[must_use]
    pub fn skip(mut self, reason: impl Into<String>) -> Self {
        self.info.skip = Some(reason.into());
        self
    }

    #[must_use]
    pub fn parametrize<I>(mut self, sets: I) -> Self
    where
        I: IntoIterator<Item = serde_json::Value>,
    {
        self.info
            .parameter_sets
            .extend(sets.into_iter().map(param_set));
        self
    }
}

/// A type-erased test class.
pub trait TestClassDef: Send + Sync {
    fn name(&self) -> &str;

    /// File the class was declared in, used for path scopes.
    fn source(&self) -> Option<&Path>;

    fn tests(&self) -> &[TestInfo];

    /// Create the one instance shared by every test of a run.
    fn instantiate(&self) -> Box<dyn TestInstance + '_>;
}

/// A live class instance.
pub trait TestInstance {
    /// # Errors
    /// Returns the setup failure.
    fn setup(&mut self) -> TestOutcome;

    /// # Errors
    /// Returns the teardown failure.
    fn teardown(&mut self) -> TestOutcome;

    /// Run the body of test `index` (position in [`TestClassDef::tests`]).
    ///
    /// # Errors
    /// Returns whatever the body returns.
    fn call(&mut self, index: usize, ctx: &mut TestContext<'_>) -> TestOutcome;
}

pub type ClassDescriptor = Arc<dyn TestClassDef>;

/// A test class declared in Rust.
pub struct TestClass<T> {
    name: String,
    source: Option<PathBuf>,
    factory: Box<dyn Fn() -> T + Send + Sync>,
    infos: Vec<TestInfo>,
    bodies: Vec<TestBody<T>>,
}

impl<T: AgentTest + 'static> TestClass<T> {
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            source: None,
            factory: Box::new(factory),
            infos: Vec::new(),
            bodies: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_default(name: impl Into<String>) -> Self
    where
        T: Default,
    {
        Self::new(name, T::default)
    }

    /// Declaring file, usually `file!()`.
    ///
    /// A relative path is resolved against the ancestors of the scope being
    /// run, so workspace-relative `file!()` paths match path scopes.
    #[must_use]
    pub fn source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(path.into());
        self
    }

    /// Append a test. Declaration order is run order.
    #[must_use]
    pub fn test(mut self, descriptor: TestDescriptor<T>) -> Self {
        self.infos.push(descriptor.info);
        self.bodies.push(descriptor.body);
        self
    }

    #[must_use]
    pub fn into_descriptor(self) -> ClassDescriptor {
        Arc::new(self)
    }
}

impl<T: AgentTest + 'static> TestClassDef for TestClass<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    fn tests(&self) -> &[TestInfo] {
        &self.infos
    }

    fn instantiate(&self) -> Box<dyn TestInstance + '_> {
        Box::new(ClassInstance {
            bodies: &self.bodies,
            value: (self.factory)(),
        })
    }
}

struct ClassInstance<'c, T> {
    bodies: &'c [TestBody<T>],
    value: T,
}

impl<T: AgentTest> TestInstance for ClassInstance<'_, T> {
    fn setup(&mut self) -> TestOutcome {
        self.value.setup()
    }

    fn teardown(&mut self) -> TestOutcome {
        self.value.teardown()
    }

    fn call(&mut self, index: usize, ctx: &mut TestContext<'_>) -> TestOutcome {
        let body = self
            .bodies
            .get(index)
            .ok_or_else(|| TestError::other(format!("no test at index {index}")))?;
        body(&mut self.value, ctx)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

fn guarded(f: impl FnOnce() -> TestOutcome) -> TestOutcome {
    catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(TestError::Panicked(panic_message(payload.as_ref()))))
}

/// Run one test of a class and return its results.
///
/// Skipped tests yield one result; parametrized tests yield one result per
/// parameter set. Never fails: every problem is classified into a result.
pub fn execute_test(
    class_name: &str,
    index: usize,
    info: &TestInfo,
    instance: &mut dyn TestInstance,
    engine: &AssertionEngine,
) -> Vec<TestResult> {
    if let Some(reason) = &info.skip {
        return vec![skipped(class_name, info.name.clone(), info, reason)];
    }

    if info.parameter_sets.is_empty() {
        return vec![invoke(class_name, index, info, instance, engine, None)];
    }

    info.parameter_sets
        .iter()
        .enumerate()
        .map(|(set, params)| invoke(class_name, index, info, instance, engine, Some((set, params))))
        .collect()
}

/// Run a single expansion `name[set]` of a parametrized test.
///
/// Returns `None` if `set` is out of range.
pub fn execute_expansion(
    class_name: &str,
    index: usize,
    info: &TestInfo,
    set: usize,
    instance: &mut dyn TestInstance,
    engine: &AssertionEngine,
) -> Option<TestResult> {
    let params = info.parameter_sets.get(set)?;
    if let Some(reason) = &info.skip {
        return Some(skipped(class_name, expansion_name(&info.name, set), info, reason));
    }
    Some(invoke(class_name, index, info, instance, engine, Some((set, params))))
}

fn skipped(class_name: &str, name: String, info: &TestInfo, reason: &str) -> TestResult {
    tracing::debug!(class = class_name, test = %name, "test skipped");
    TestResult::new(class_name, name, TestStatus::Skipped)
        .with_message(Some(reason.to_string()))
        .with_tags(&info.tags)
}

fn invoke(
    class_name: &str,
    index: usize,
    info: &TestInfo,
    instance: &mut dyn TestInstance,
    engine: &AssertionEngine,
    expansion: Option<(usize, &Params)>,
) -> TestResult {
    let name = expansion.map_or_else(
        || info.name.clone(),
        |(set, _)| expansion_name(&info.name, set),
    );
    let params = expansion.map(|(_, p)| p);

    if let Err(e) = guarded(|| instance.setup()) {
        if let Err(teardown) = guarded(|| instance.teardown()) {
            tracing::warn!(
                class = class_name,
                test = %name,
                error = %teardown,
                "teardown failed after setup failure"
            );
        }
        tracing::debug!(class = class_name, test = %name, "setup failed");
        return TestResult::new(class_name, name, TestStatus::Error)
            .with_message(Some(format!("setup failed: {e}")))
            .with_tags(&info.tags)
            .with_params(params.cloned());
    }

    let mut ctx = TestContext::new(engine, params);
    let start = Instant::now();
    let outcome = guarded(|| instance.call(index, &mut ctx));
    let duration: Duration = start.elapsed();

    let (mut status, mut message) = match outcome {
        Ok(()) => (TestStatus::Passed, None),
        Err(e) if e.is_assertion() => (TestStatus::Failed, Some(e.to_string())),
        Err(e) => (TestStatus::Error, Some(e.to_string())),
    };

    if let Err(e) = guarded(|| instance.teardown()) {
        match message {
            Some(existing) => message = Some(format!("{existing}; teardown failed: {e}")),
            None => {
                status = TestStatus::Error;
                message = Some(format!("teardown failed: {e}"));
            }
        }
    }

    tracing::debug!(
        class = class_name,
        test = %name,
        status = %status,
        duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        "test finished"
    );

    TestResult::new(class_name, name, status)
        .with_duration(duration)
        .with_message(message)
        .with_metrics(ctx.metrics())
        .with_tags(&info.tags)
        .with_params(params.cloned())
}
