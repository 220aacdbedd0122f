//! Mock LLM response matching.
//!
//! A [`MockMatcher`] resolves a prompt to a [`MockResponse`] without any network
//! call. Rules are grouped into tiers that are always consulted in the same order:
//!
//! | Tier       | Key                      | Within the tier      |
//! |------------|--------------------------|----------------------|
//! | `Exact`    | full string equality     | first registered wins |
//! | `Pattern`  | regex search             | first registered wins |
//! | `Function` | predicate `(prompt, kwargs)` | first registered wins |
//! | `Default`  | single replaceable slot  | -                    |
//!
//! Every call to [`MockMatcher::resolve_with`] appends exactly one [`CallRecord`].

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use time::OffsetDateTime;

/// Keyword arguments passed along with a prompt.
pub type Kwargs = serde_json::Map<String, serde_json::Value>;

/// Boxed error returned by user-supplied predicates.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

type Producer = Arc<dyn Fn(&str, &Kwargs) -> MockResponse + Send + Sync>;
type Predicate = Arc<dyn Fn(&str, &Kwargs) -> Result<bool, BoxError> + Send + Sync>;

/// Errors raised while registering a rule.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("exact-match prompt cannot be empty")]
    EmptyExactPrompt,
    #[error("invalid regex pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Errors raised while resolving a prompt.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("no mock rule matches prompt '{prompt}' and no default response is set")]
    NoMatch { prompt: String },
    #[error("function rule #{rule} failed for prompt '{prompt}': {source}")]
    Matcher {
        prompt: String,
        rule: usize,
        #[source]
        source: BoxError,
    },
}

/// Simulated model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MockResponse {
    pub content: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_tokens")]
    pub tokens_used: u64,
    #[serde(default = "default_cost")]
    pub cost: f64,
    /// Simulated latency in seconds.
    #[serde(default = "default_latency")]
    pub latency: f64,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

fn default_model() -> String {
    "mock-model".to_string()
}

const fn default_tokens() -> u64 {
    100
}

const fn default_cost() -> f64 {
    0.01
}

const fn default_latency() -> f64 {
    0.5
}

impl MockResponse {
    /// Create a response with default usage figures.
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: default_model(),
            tokens_used: default_tokens(),
            cost: default_cost(),
            latency: default_latency(),
            metadata: serde_json::Map::new(),
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub const fn with_tokens(mut self, tokens_used: u64) -> Self {
        self.tokens_used = tokens_used;
        self
    }

    #[must_use]
    pub const fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    #[must_use]
    pub const fn with_latency(mut self, latency: f64) -> Self {
        self.latency = latency;
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Shorthand for [`MockResponse::new`].
#[must_use]
pub fn mock_llm_response(content: impl Into<String>) -> MockResponse {
    MockResponse::new(content)
}

/// Where a rule's response comes from.
#[derive(Clone)]
pub enum ResponseSource {
    /// A pre-built response, cloned on every match.
    Literal(MockResponse),
    /// Invoked with `(prompt, kwargs)` on every match.
    Producer(Producer),
}

impl ResponseSource {
    /// Wrap a closure as a producer.
    pub fn producer<F>(f: F) -> Self
    where
        F: Fn(&str, &Kwargs) -> MockResponse + Send + Sync + 'static,
    {
        Self::Producer(Arc::new(f))
    }

    fn produce(&self, prompt: &str, kwargs: &Kwargs) -> MockResponse {
        match self {
            Self::Literal(response) => response.clone(),
            Self::Producer(f) => f(prompt, kwargs),
        }
    }
}

impl fmt::Debug for ResponseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(response) => f.debug_tuple("Literal").field(response).finish(),
            Self::Producer(_) => f.write_str("Producer(..)"),
        }
    }
}

impl From<MockResponse> for ResponseSource {
    fn from(response: MockResponse) -> Self {
        Self::Literal(response)
    }
}

impl From<&str> for ResponseSource {
    fn from(content: &str) -> Self {
        Self::Literal(MockResponse::new(content))
    }
}

impl From<String> for ResponseSource {
    fn from(content: String) -> Self {
        Self::Literal(MockResponse::new(content))
    }
}

/// Matcher tier, ranked by specificity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatcherTier {
    Exact,
    Pattern,
    Function,
    Default,
}

impl fmt::Display for MatcherTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::Pattern => write!(f, "pattern"),
            Self::Function => write!(f, "function"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[derive(Clone)]
enum RuleKey {
    Exact(String),
    Pattern(Regex),
    Function(Predicate),
}

/// One entry of the rule table.
#[derive(Clone)]
pub struct MockRule {
    key: RuleKey,
    source: ResponseSource,
}

impl MockRule {
    /// Tier this rule belongs to.
    #[must_use]
    pub const fn tier(&self) -> MatcherTier {
        match self.key {
            RuleKey::Exact(_) => MatcherTier::Exact,
            RuleKey::Pattern(_) => MatcherTier::Pattern,
            RuleKey::Function(_) => MatcherTier::Function,
        }
    }

    /// The literal prompt or regex source, if the rule has one.
    #[must_use]
    pub fn key_text(&self) -> Option<&str> {
        match &self.key {
            RuleKey::Exact(prompt) => Some(prompt),
            RuleKey::Pattern(re) => Some(re.as_str()),
            RuleKey::Function(_) => None,
        }
    }
}

impl fmt::Debug for MockRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockRule")
            .field("tier", &self.tier())
            .field("key", &self.key_text())
            .field("source", &self.source)
            .finish()
    }
}

/// Audit entry for one resolution.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub prompt: String,
    pub kwargs: Kwargs,
    /// Tier that produced the response; `None` when resolution failed.
    pub tier: Option<MatcherTier>,
    pub response: Option<MockResponse>,
    pub timestamp: OffsetDateTime,
}

/// Deterministic prompt-to-response resolver.
///
/// Single-threaded by contract: `resolve_with` takes `&mut self` to append to
/// the call log.
#[derive(Debug, Clone, Default)]
pub struct MockMatcher {
    rules: Vec<MockRule>,
    default: Option<ResponseSource>,
    calls: Vec<CallRecord>,
}

impl MockMatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an exact-match rule.
    ///
    /// The prompt is compared byte for byte; nothing is trimmed.
    ///
    /// # Errors
    /// Returns `ConfigurationError::EmptyExactPrompt` if `prompt` is empty.
    pub fn add_exact(
        &mut self,
        prompt: impl Into<String>,
        source: impl Into<ResponseSource>,
    ) -> Result<&mut Self, ConfigurationError> {
        let prompt = prompt.into();
        if prompt.is_empty() {
            return Err(ConfigurationError::EmptyExactPrompt);
        }
        self.rules.push(MockRule {
            key: RuleKey::Exact(prompt),
            source: source.into(),
        });
        Ok(self)
    }

    /// Alias for [`MockMatcher::add_exact`].
    ///
    /// # Errors
    /// Returns `ConfigurationError::EmptyExactPrompt` if `prompt` is empty.
    pub fn add_response(
        &mut self,
        prompt: impl Into<String>,
        source: impl Into<ResponseSource>,
    ) -> Result<&mut Self, ConfigurationError> {
        self.add_exact(prompt, source)
    }

    /// Register a regex rule. Matching searches anywhere in the prompt.
    ///
    /// # Errors
    /// Returns `ConfigurationError::InvalidPattern` if the regex does not compile.
    pub fn add_pattern(
        &mut self,
        pattern: &str,
        source: impl Into<ResponseSource>,
    ) -> Result<&mut Self, ConfigurationError> {
        let re = Regex::new(pattern).map_err(|e| ConfigurationError::InvalidPattern {
            pattern: pattern.to_string(),
            source: e,
        })?;
        self.rules.push(MockRule {
            key: RuleKey::Pattern(re),
            source: source.into(),
        });
        Ok(self)
    }

    /// Register a predicate rule.
    pub fn add_function<F>(&mut self, predicate: F, source: impl Into<ResponseSource>) -> &mut Self
    where
        F: Fn(&str, &Kwargs) -> Result<bool, BoxError> + Send + Sync + 'static,
    {
        self.rules.push(MockRule {
            key: RuleKey::Function(Arc::new(predicate)),
            source: source.into(),
        });
        self
    }

    /// Set or replace the default response.
    pub fn set_default(&mut self, source: impl Into<ResponseSource>) -> &mut Self {
        self.default = Some(source.into());
        self
    }

    /// Resolve a prompt with no kwargs.
    ///
    /// # Errors
    /// See [`MockMatcher::resolve_with`].
    pub fn resolve(&mut self, prompt: &str) -> Result<MockResponse, ResolveError> {
        self.resolve_with(prompt, &Kwargs::new())
    }

    /// Resolve a prompt against the rule table.
    ///
    /// # Errors
    /// - `ResolveError::Matcher` if a function predicate fails
    /// - `ResolveError::NoMatch` if nothing matches and no default is set
    pub fn resolve_with(
        &mut self,
        prompt: &str,
        kwargs: &Kwargs,
    ) -> Result<MockResponse, ResolveError> {
        let outcome = self.select(prompt, kwargs);

        let (tier, response) = match &outcome {
            Ok((tier, response)) => (Some(*tier), Some(response.clone())),
            Err(_) => (None, None),
        };
        self.calls.push(CallRecord {
            prompt: prompt.to_string(),
            kwargs: kwargs.clone(),
            tier,
            response,
            timestamp: OffsetDateTime::now_utc(),
        });

        match outcome {
            Ok((tier, response)) => {
                tracing::debug!(%tier, prompt, "mock rule matched");
                Ok(response)
            }
            Err(e) => {
                tracing::debug!(error = %e, "mock resolution failed");
                Err(e)
            }
        }
    }

    fn select(
        &self,
        prompt: &str,
        kwargs: &Kwargs,
    ) -> Result<(MatcherTier, MockResponse), ResolveError> {
        let exact = self.rules.iter().find(|rule| match &rule.key {
            RuleKey::Exact(key) => key == prompt,
            _ => false,
        });
        if let Some(rule) = exact {
            return Ok((MatcherTier::Exact, rule.source.produce(prompt, kwargs)));
        }

        let pattern = self.rules.iter().find(|rule| match &rule.key {
            RuleKey::Pattern(re) => re.is_match(prompt),
            _ => false,
        });
        if let Some(rule) = pattern {
            return Ok((MatcherTier::Pattern, rule.source.produce(prompt, kwargs)));
        }

        for (index, rule) in self.rules.iter().enumerate() {
            let RuleKey::Function(predicate) = &rule.key else {
                continue;
            };
            let matched = predicate(prompt, kwargs).map_err(|source| ResolveError::Matcher {
                prompt: prompt.to_string(),
                rule: index,
                source,
            })?;
            if matched {
                return Ok((MatcherTier::Function, rule.source.produce(prompt, kwargs)));
            }
        }

        self.default.as_ref().map_or_else(
            || {
                Err(ResolveError::NoMatch {
                    prompt: prompt.to_string(),
                })
            },
            |source| Ok((MatcherTier::Default, source.produce(prompt, kwargs))),
        )
    }

    /// Number of resolutions attempted so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.len()
    }

    /// Most recent resolution, if any.
    #[must_use]
    pub fn last_call(&self) -> Option<&CallRecord> {
        self.calls.last()
    }

    /// Full call log in call order.
    #[must_use]
    pub fn calls(&self) -> &[CallRecord] {
        &self.calls
    }

    /// Clear the call log. Rules are kept.
    pub fn reset(&mut self) {
        self.calls.clear();
    }

    /// Registered rules in insertion order (the default slot excluded).
    #[must_use]
    pub fn rules(&self) -> &[MockRule] {
        &self.rules
    }

    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub const fn has_default(&self) -> bool {
        self.default.is_some()
    }
}
