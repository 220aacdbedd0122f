//! Core data types for agent-test.

use crate::mock::{Kwargs, MockResponse, ResponseSource};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;

/// Parameter set bound to one parametrized execution.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// Outcome of one test execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
    Error,
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "PASSED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Skipped => write!(f, "SKIPPED"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// Usage figures recorded by a test body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TestMetrics {
    pub cost: f64,
    pub tokens: u64,
    /// Seconds.
    pub latency: f64,
}

impl TestMetrics {
    /// Accumulate another set of figures into this one.
    pub fn add(&mut self, other: Self) {
        self.cost += other.cost;
        self.tokens += other.tokens;
        self.latency += other.latency;
    }
}

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Result of a single test invocation.
#[derive(Debug, Clone, Serialize)]
pub struct TestResult {
    class_name: String,
    test_name: String,
    status: TestStatus,
    #[serde(rename = "duration_secs", serialize_with = "serialize_secs")]
    duration: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metrics: Option<TestMetrics>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Params>,
}

impl TestResult {
    pub(crate) fn new(class_name: &str, test_name: String, status: TestStatus) -> Self {
        Self {
            class_name: class_name.to_string(),
            test_name,
            status,
            duration: Duration::ZERO,
            message: None,
            metrics: None,
            tags: Vec::new(),
            params: None,
        }
    }

    pub(crate) const fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub(crate) fn with_message(mut self, message: Option<String>) -> Self {
        self.message = message;
        self
    }

    pub(crate) const fn with_metrics(mut self, metrics: Option<TestMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub(crate) fn with_tags(mut self, tags: &[String]) -> Self {
        self.tags = tags.to_vec();
        self
    }

    pub(crate) fn with_params(mut self, params: Option<Params>) -> Self {
        self.params = params;
        self
    }

    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Test name; `name[i]` for parametrized executions.
    #[must_use]
    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    /// `Class::test` form used by filters and reporters.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}::{}", self.class_name, self.test_name)
    }

    #[must_use]
    pub const fn status(&self) -> TestStatus {
        self.status
    }

    /// Time spent in the test body only.
    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }

    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    #[must_use]
    pub const fn metrics(&self) -> Option<&TestMetrics> {
        self.metrics.as_ref()
    }

    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    #[must_use]
    pub const fn params(&self) -> Option<&Params> {
        self.params.as_ref()
    }

    /// Failed or errored.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self.status, TestStatus::Failed | TestStatus::Error)
    }
}

/// Per-status counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub errors: u32,
}

impl StatusCounts {
    fn from_results(results: &[TestResult]) -> Self {
        let count = |status: TestStatus| {
            u32::try_from(results.iter().filter(|r| r.status == status).count())
                .unwrap_or(u32::MAX)
        };
        Self {
            passed: count(TestStatus::Passed),
            failed: count(TestStatus::Failed),
            skipped: count(TestStatus::Skipped),
            errors: count(TestStatus::Error),
        }
    }

    #[must_use]
    pub const fn total(&self) -> u32 {
        self.passed
            .saturating_add(self.failed)
            .saturating_add(self.skipped)
            .saturating_add(self.errors)
    }
}

/// Aggregate of one `run_*` call.
#[derive(Debug, Clone, Serialize)]
pub struct TestSummary {
    suite_name: String,
    /// ISO-8601 UTC.
    started_at: String,
    counts: StatusCounts,
    #[serde(rename = "wall_duration_secs", serialize_with = "serialize_secs")]
    wall_duration: Duration,
    #[serde(rename = "test_duration_secs", serialize_with = "serialize_secs")]
    test_duration: Duration,
    results: Vec<TestResult>,
}

impl TestSummary {
    pub(crate) fn new(
        suite_name: String,
        started_at: String,
        results: Vec<TestResult>,
        wall_duration: Duration,
    ) -> Self {
        let test_duration = results.iter().map(TestResult::duration).sum();
        Self {
            suite_name,
            started_at,
            counts: StatusCounts::from_results(&results),
            wall_duration: wall_duration.max(test_duration),
            test_duration,
            results,
        }
    }

    #[must_use]
    pub fn suite_name(&self) -> &str {
        &self.suite_name
    }

    #[must_use]
    pub fn started_at(&self) -> &str {
        &self.started_at
    }

    #[must_use]
    pub const fn counts(&self) -> StatusCounts {
        self.counts
    }

    #[must_use]
    pub fn results(&self) -> &[TestResult] {
        &self.results
    }

    /// Sum of test durations plus runner overhead.
    #[must_use]
    pub const fn wall_duration(&self) -> Duration {
        self.wall_duration
    }

    /// Sum of test body durations.
    #[must_use]
    pub const fn test_duration(&self) -> Duration {
        self.test_duration
    }

    /// No failures and no errors.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.counts.failed == 0 && self.counts.errors == 0
    }

    /// Failed and errored results in run order.
    pub fn failures(&self) -> impl Iterator<Item = &TestResult> {
        self.results.iter().filter(|r| r.is_failure())
    }
}

// ---------------------------------------------------------------------------
// Suite file format
// ---------------------------------------------------------------------------

/// Expectation for pattern assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternExpect {
    #[default]
    Present,
    Absent,
}

/// Text formats recognized by format assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextFormat {
    Json,
    Yaml,
    Markdown,
    Html,
    Xml,
}

impl fmt::Display for TextFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "JSON"),
            Self::Yaml => write!(f, "YAML"),
            Self::Markdown => write!(f, "Markdown"),
            Self::Html => write!(f, "HTML"),
            Self::Xml => write!(f, "XML"),
        }
    }
}

/// A contains assertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContainsAssertion {
    #[serde(default)]
    pub desc: Option<String>,
    pub value: String,
    #[serde(default)]
    pub expect: PatternExpect,
    /// Overrides the configured case sensitivity.
    #[serde(default)]
    pub case_sensitive: Option<bool>,
}

/// Trimmed text equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EqualsAssertion {
    #[serde(default)]
    pub desc: Option<String>,
    pub value: String,
}

/// A regex assertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegexAssertion {
    #[serde(default)]
    pub desc: Option<String>,
    pub pattern: String,
    #[serde(default)]
    pub expect: PatternExpect,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimilarityAssertion {
    #[serde(default)]
    pub desc: Option<String>,
    pub expected: String,
    #[serde(default)]
    pub threshold: Option<f64>,
}

/// JSON validity, optionally against a schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JsonAssertion {
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub schema: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FormatAssertion {
    #[serde(default)]
    pub desc: Option<String>,
    pub format: TextFormat,
}

/// Upper bound on a measured figure (seconds for latency, currency for cost).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitAssertion {
    #[serde(default)]
    pub desc: Option<String>,
    pub max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokensAssertion {
    #[serde(default)]
    pub desc: Option<String>,
    pub max: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoPiiAssertion {
    #[serde(default)]
    pub desc: Option<String>,
}

/// Grounding of the output in source documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroundedAssertion {
    #[serde(default)]
    pub desc: Option<String>,
    pub sources: Vec<String>,
    #[serde(default)]
    pub threshold: Option<f64>,
}

/// Union type for all declared assertion types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Assertion {
    Contains(ContainsAssertion),
    Equals(EqualsAssertion),
    Regex(RegexAssertion),
    Similarity(SimilarityAssertion),
    Json(JsonAssertion),
    Format(FormatAssertion),
    Latency(LimitAssertion),
    Cost(LimitAssertion),
    Tokens(TokensAssertion),
    NoPii(NoPiiAssertion),
    Grounded(GroundedAssertion),
}

impl Assertion {
    /// Get the assertion type name as a string.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Contains(_) => "contains",
            Self::Equals(_) => "equals",
            Self::Regex(_) => "regex",
            Self::Similarity(_) => "similarity",
            Self::Json(_) => "json",
            Self::Format(_) => "format",
            Self::Latency(_) => "latency",
            Self::Cost(_) => "cost",
            Self::Tokens(_) => "tokens",
            Self::NoPii(_) => "no_pii",
            Self::Grounded(_) => "grounded",
        }
    }

    #[must_use]
    pub fn desc(&self) -> Option<&str> {
        match self {
            Self::Contains(a) => a.desc.as_deref(),
            Self::Equals(a) => a.desc.as_deref(),
            Self::Regex(a) => a.desc.as_deref(),
            Self::Similarity(a) => a.desc.as_deref(),
            Self::Json(a) => a.desc.as_deref(),
            Self::Format(a) => a.desc.as_deref(),
            Self::Latency(a) | Self::Cost(a) => a.desc.as_deref(),
            Self::Tokens(a) => a.desc.as_deref(),
            Self::NoPii(a) => a.desc.as_deref(),
            Self::Grounded(a) => a.desc.as_deref(),
        }
    }

    /// Get the display name (desc if available, otherwise the type name).
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.desc().unwrap_or_else(|| self.type_name())
    }

    /// Substitute `{{key}}` placeholders in every text field.
    #[must_use]
    pub fn render(&self, params: &Params) -> Self {
        let r = |text: &str| render_template(text, params);
        match self {
            Self::Contains(a) => Self::Contains(ContainsAssertion {
                value: r(&a.value),
                ..a.clone()
            }),
            Self::Equals(a) => Self::Equals(EqualsAssertion {
                value: r(&a.value),
                ..a.clone()
            }),
            Self::Regex(a) => Self::Regex(RegexAssertion {
                pattern: r(&a.pattern),
                ..a.clone()
            }),
            Self::Similarity(a) => Self::Similarity(SimilarityAssertion {
                expected: r(&a.expected),
                ..a.clone()
            }),
            Self::Grounded(a) => Self::Grounded(GroundedAssertion {
                sources: a.sources.iter().map(|s| r(s)).collect(),
                ..a.clone()
            }),
            other => other.clone(),
        }
    }
}

fn placeholder_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{([^{}]+)\}\}").ok()).as_ref()
}

/// Replace `{{key}}` with the matching parameter.
///
/// String parameters are inserted verbatim, other values in their JSON form.
/// Unknown keys are left untouched. The text is scanned once, so placeholders
/// inside inserted values are not expanded.
#[must_use]
pub fn render_template(text: &str, params: &Params) -> String {
    let Some(re) = placeholder_regex() else {
        return text.to_string();
    };
    re.replace_all(text, |caps: &Captures<'_>| match params.get(&caps[1]) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => caps[0].to_string(),
    })
    .into_owned()
}

/// Response in a suite file: a bare string or a full response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseSpec {
    Text(String),
    Full(MockResponse),
}

impl From<ResponseSpec> for ResponseSource {
    fn from(spec: ResponseSpec) -> Self {
        match spec {
            ResponseSpec::Text(content) => Self::from(content),
            ResponseSpec::Full(response) => Self::Literal(response),
        }
    }
}

/// A mock rule in a suite file. Exactly one of `exact`/`pattern` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MockRuleSpec {
    #[serde(default)]
    pub exact: Option<String>,
    #[serde(default)]
    pub pattern: Option<String>,
    pub response: ResponseSpec,
}

/// A test case definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuiteTestCase {
    pub name: String,
    #[serde(default)]
    pub desc: Option<String>,
    pub prompt: String,
    #[serde(default)]
    pub kwargs: Kwargs,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Skip reason.
    #[serde(default)]
    pub skip: Option<String>,
    #[serde(default)]
    pub parametrize: Vec<Params>,
    #[serde(default)]
    pub assertions: Vec<Assertion>,
}

/// A suite file: one declarative test class.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuiteFile {
    pub name: String,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub mocks: Vec<MockRuleSpec>,
    #[serde(default)]
    pub default_response: Option<ResponseSpec>,
    #[serde(default)]
    pub tests: Vec<SuiteTestCase>,
}

/// Configuration from `agent-test.config.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentTestConfig {
    /// Suite name for reports (default: name of the scope directory).
    #[serde(rename = "suite-name", default)]
    pub suite_name: Option<String>,

    /// Suite file patterns (default: `["**/*.agent-test.yaml", "**/*.agent-test.yml"]`).
    #[serde(rename = "test-patterns", default = "default_test_patterns")]
    pub test_patterns: Vec<String>,

    /// Exclude patterns (default: `["target/", "node_modules/"]`).
    #[serde(rename = "exclude-patterns", default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,

    /// Case-sensitive containment checks (default: false).
    #[serde(rename = "case-sensitive", default)]
    pub case_sensitive: bool,

    /// Default similarity pass threshold (default: 0.8).
    #[serde(rename = "similarity-threshold", default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Default grounding pass threshold (default: 0.7).
    #[serde(rename = "grounding-threshold", default = "default_grounding_threshold")]
    pub grounding_threshold: f64,
}

fn default_test_patterns() -> Vec<String> {
    vec![
        "**/*.agent-test.yaml".to_string(),
        "**/*.agent-test.yml".to_string(),
    ]
}

fn default_exclude_patterns() -> Vec<String> {
    vec!["target/".to_string(), "node_modules/".to_string()]
}

const fn default_similarity_threshold() -> f64 {
    0.8
}

const fn default_grounding_threshold() -> f64 {
    0.7
}

impl Default for AgentTestConfig {
    fn default() -> Self {
        Self {
            suite_name: None,
            test_patterns: default_test_patterns(),
            exclude_patterns: default_exclude_patterns(),
            case_sensitive: false,
            similarity_threshold: default_similarity_threshold(),
            grounding_threshold: default_grounding_threshold(),
        }
    }
}
