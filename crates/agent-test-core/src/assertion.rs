//! Assertion evaluation engine.
//!
//! Every check comes in two forms: `check_*` returns an [`AssertionVerdict`]
//! whatever the outcome, `assert_*` turns a failing verdict into an
//! [`AssertionFailure`] so test bodies can propagate it with `?`.

use crate::mock::MockResponse;
use crate::types::{Assertion, PatternExpect, TextFormat};
use quick_xml::Reader;
use quick_xml::events::Event;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A hard assertion that did not hold.
#[derive(Error, Debug, Clone)]
#[error("{verdict}")]
pub struct AssertionFailure {
    pub verdict: AssertionVerdict,
}

/// Errors that can occur during assertion evaluation.
#[derive(Error, Debug)]
pub enum AssertionError {
    #[error(transparent)]
    Failed(#[from] AssertionFailure),
    #[error("invalid regex pattern '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("invalid JSON schema: {0}")]
    InvalidSchema(String),
}

/// Category of a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssertionKind {
    Content,
    Format,
    Performance,
    Safety,
}

impl fmt::Display for AssertionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Content => write!(f, "content"),
            Self::Format => write!(f, "format"),
            Self::Performance => write!(f, "performance"),
            Self::Safety => write!(f, "safety"),
        }
    }
}

/// Structured outcome of one check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssertionVerdict {
    pub passed: bool,
    pub explanation: String,
    pub kind: AssertionKind,
    /// Name of the check, e.g. `contains` or `latency`.
    pub check: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl fmt::Display for AssertionVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outcome = if self.passed { "passed" } else { "failed" };
        write!(f, "{} {outcome}: {}", self.check, self.explanation)
    }
}

impl AssertionVerdict {
    fn new(passed: bool, kind: AssertionKind, check: &'static str, explanation: String) -> Self {
        Self {
            passed,
            explanation,
            kind,
            check,
            score: None,
        }
    }

    const fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    /// Convert a failing verdict into an error.
    ///
    /// # Errors
    /// Returns `AssertionFailure` if the verdict did not pass.
    pub fn into_result(self) -> Result<Self, AssertionFailure> {
        if self.passed {
            Ok(self)
        } else {
            Err(AssertionFailure { verdict: self })
        }
    }
}

/// Scores how closely an output matches an expected text, in `[0, 1]`.
pub trait SimilarityBackend: fmt::Debug + Send + Sync {
    fn score(&self, output: &str, expected: &str) -> f64;
}

/// Word-overlap similarity.
///
/// The score is the fraction of distinct expected tokens that also occur in
/// the output. An empty expected text scores 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalOverlap;

impl SimilarityBackend for LexicalOverlap {
    #[allow(clippy::cast_precision_loss)]
    fn score(&self, output: &str, expected: &str) -> f64 {
        let expected = tokens(expected);
        if expected.is_empty() {
            return 1.0;
        }
        let output = tokens(output);
        let shared = expected.intersection(&output).count();
        shared as f64 / expected.len() as f64
    }
}

/// Lower-cased whitespace tokens with punctuation trimmed from both ends.
fn tokens(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|word| {
            word.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|word| !word.is_empty())
        .collect()
}

/// Named regexes that flag personal data.
#[derive(Debug, Clone)]
pub struct PiiPatternSet {
    patterns: Vec<(String, Regex)>,
}

const DEFAULT_PII_PATTERNS: &[(&str, &str)] = &[
    ("email", r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b"),
    ("phone", r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b"),
    ("ssn", r"\b\d{3}-\d{2}-\d{4}\b"),
    ("credit_card", r"\b\d{4}[-\s]?\d{4}[-\s]?\d{4}[-\s]?\d{4}\b"),
];

impl Default for PiiPatternSet {
    fn default() -> Self {
        let patterns = DEFAULT_PII_PATTERNS
            .iter()
            .filter_map(|(name, pattern)| {
                Regex::new(pattern)
                    .ok()
                    .map(|re| ((*name).to_string(), re))
            })
            .collect();
        Self { patterns }
    }
}

impl PiiPatternSet {
    /// A set with no patterns.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    /// Add a named pattern.
    ///
    /// # Errors
    /// Returns `AssertionError::InvalidRegex` if the pattern is invalid.
    pub fn with_pattern(mut self, name: &str, pattern: &str) -> Result<Self, AssertionError> {
        let re = Regex::new(pattern).map_err(|e| AssertionError::InvalidRegex {
            pattern: pattern.to_string(),
            source: e,
        })?;
        self.patterns.push((name.to_string(), re));
        Ok(self)
    }

    /// Names of every class found in `text`, in registration order.
    #[must_use]
    pub fn scan(&self, text: &str) -> Vec<&str> {
        self.patterns
            .iter()
            .filter(|(_, re)| re.is_match(text))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.patterns.iter().map(|(name, _)| name.as_str()).collect()
    }
}

/// Defaults shared by every check of one engine.
#[derive(Debug, Clone)]
pub struct AssertionConfig {
    pub case_sensitive: bool,
    pub similarity_threshold: f64,
    pub grounding_threshold: f64,
    pub pii: PiiPatternSet,
    pub similarity: Arc<dyn SimilarityBackend>,
}

impl Default for AssertionConfig {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            similarity_threshold: 0.8,
            grounding_threshold: 0.7,
            pii: PiiPatternSet::default(),
            similarity: Arc::new(LexicalOverlap),
        }
    }
}

/// How a length is compared with the expected value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthMode {
    Exact,
    Min,
    Max,
}

/// Evaluates checks against agent output.
#[derive(Debug, Clone, Default)]
pub struct AssertionEngine {
    config: AssertionConfig,
}

impl AssertionEngine {
    #[must_use]
    pub const fn new(config: AssertionConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &AssertionConfig {
        &self.config
    }

    // -- content ----------------------------------------------------------

    /// Substring test using the configured case sensitivity.
    #[must_use]
    pub fn check_contains(&self, output: &str, expected: &str) -> AssertionVerdict {
        self.check_contains_with(output, expected, PatternExpect::Present, None)
    }

    #[must_use]
    pub fn check_not_contains(&self, output: &str, unexpected: &str) -> AssertionVerdict {
        self.check_contains_with(output, unexpected, PatternExpect::Absent, None)
    }

    /// Substring test with explicit expectation and case sensitivity.
    #[must_use]
    pub fn check_contains_with(
        &self,
        output: &str,
        needle: &str,
        expect: PatternExpect,
        case_sensitive: Option<bool>,
    ) -> AssertionVerdict {
        let case_sensitive = case_sensitive.unwrap_or(self.config.case_sensitive);
        let found = if case_sensitive {
            output.contains(needle)
        } else {
            output.to_lowercase().contains(&needle.to_lowercase())
        };

        match expect {
            PatternExpect::Present => AssertionVerdict::new(
                found,
                AssertionKind::Content,
                "contains",
                if found {
                    format!("output contains '{needle}'")
                } else {
                    format!("expected output to contain '{needle}'; output: {output}")
                },
            ),
            PatternExpect::Absent => AssertionVerdict::new(
                !found,
                AssertionKind::Content,
                "not_contains",
                if found {
                    format!("expected output not to contain '{needle}'; output: {output}")
                } else {
                    format!("output does not contain '{needle}'")
                },
            ),
        }
    }

    /// Equality of the trimmed texts.
    #[must_use]
    pub fn check_text_equals(&self, output: &str, expected: &str) -> AssertionVerdict {
        let (output, expected) = (output.trim(), expected.trim());
        let passed = output == expected;
        AssertionVerdict::new(
            passed,
            AssertionKind::Content,
            "equals",
            if passed {
                "output equals expected text".to_string()
            } else {
                format!("expected '{expected}', got '{output}'")
            },
        )
    }

    /// Raw equality for arbitrary values.
    #[must_use]
    pub fn check_equals<T: PartialEq + fmt::Debug + ?Sized>(
        &self,
        actual: &T,
        expected: &T,
    ) -> AssertionVerdict {
        let passed = actual == expected;
        AssertionVerdict::new(
            passed,
            AssertionKind::Content,
            "equals",
            if passed {
                format!("{actual:?} equals expected value")
            } else {
                format!("expected {expected:?}, got {actual:?}")
            },
        )
    }

    /// Compile `pattern` with the configured case sensitivity.
    fn compile(&self, pattern: &str) -> Result<Regex, AssertionError> {
        RegexBuilder::new(pattern)
            .case_insensitive(!self.config.case_sensitive)
            .build()
            .map_err(|e| AssertionError::InvalidRegex {
                pattern: pattern.to_string(),
                source: e,
            })
    }

    /// Regex search using the configured case sensitivity.
    ///
    /// # Errors
    /// Returns `AssertionError::InvalidRegex` if the pattern is invalid.
    pub fn check_regex(
        &self,
        output: &str,
        pattern: &str,
        expect: PatternExpect,
    ) -> Result<AssertionVerdict, AssertionError> {
        let re = self.compile(pattern)?;

        let found = re.is_match(output);
        let verdict = match expect {
            PatternExpect::Present => AssertionVerdict::new(
                found,
                AssertionKind::Content,
                "regex",
                if found {
                    format!("output matches /{pattern}/")
                } else {
                    format!("output does not match /{pattern}/; output: {output}")
                },
            ),
            PatternExpect::Absent => AssertionVerdict::new(
                !found,
                AssertionKind::Content,
                "regex",
                if found {
                    format!("output unexpectedly matches /{pattern}/; output: {output}")
                } else {
                    format!("output does not match /{pattern}/")
                },
            ),
        };
        Ok(verdict)
    }

    /// Every item matches `pattern`.
    ///
    /// # Errors
    /// Returns `AssertionError::InvalidRegex` if the pattern is invalid.
    pub fn check_all_match<S: AsRef<str>>(
        &self,
        items: &[S],
        pattern: &str,
    ) -> Result<AssertionVerdict, AssertionError> {
        let re = self.compile(pattern)?;
        let mismatch = items
            .iter()
            .enumerate()
            .find(|(_, item)| !re.is_match(item.as_ref()));

        Ok(match mismatch {
            None => AssertionVerdict::new(
                true,
                AssertionKind::Content,
                "all_match",
                format!("all {} items match /{pattern}/", items.len()),
            ),
            Some((index, item)) => AssertionVerdict::new(
                false,
                AssertionKind::Content,
                "all_match",
                format!("item {index} does not match /{pattern}/: {}", item.as_ref()),
            ),
        })
    }

    /// At least one item matches `pattern`. An empty list never matches.
    ///
    /// # Errors
    /// Returns `AssertionError::InvalidRegex` if the pattern is invalid.
    pub fn check_any_match<S: AsRef<str>>(
        &self,
        items: &[S],
        pattern: &str,
    ) -> Result<AssertionVerdict, AssertionError> {
        let re = self.compile(pattern)?;
        let found = items.iter().position(|item| re.is_match(item.as_ref()));

        Ok(match found {
            Some(index) => AssertionVerdict::new(
                true,
                AssertionKind::Content,
                "any_match",
                format!("item {index} matches /{pattern}/"),
            ),
            None => {
                let listed: Vec<&str> = items.iter().map(S::as_ref).collect();
                AssertionVerdict::new(
                    false,
                    AssertionKind::Content,
                    "any_match",
                    format!("no item matches /{pattern}/ in {listed:?}"),
                )
            }
        })
    }

    /// Similarity score against `threshold` (or the configured default).
    #[must_use]
    pub fn check_similarity(
        &self,
        output: &str,
        expected: &str,
        threshold: Option<f64>,
    ) -> AssertionVerdict {
        let threshold = threshold.unwrap_or(self.config.similarity_threshold);
        let score = self.config.similarity.score(output, expected);
        let passed = score >= threshold;
        AssertionVerdict::new(
            passed,
            AssertionKind::Content,
            "similarity",
            if passed {
                format!("similarity {score:.2} >= {threshold:.2}")
            } else {
                format!(
                    "similarity {score:.2} < {threshold:.2}; expected: {expected}; actual: {output}"
                )
            },
        )
        .with_score(score)
    }

    // -- format -----------------------------------------------------------

    /// Output parses as JSON.
    #[must_use]
    pub fn check_json(&self, output: &str) -> AssertionVerdict {
        match serde_json::from_str::<serde_json::Value>(output) {
            Ok(_) => AssertionVerdict::new(
                true,
                AssertionKind::Format,
                "json",
                "output is valid JSON".to_string(),
            ),
            Err(e) => AssertionVerdict::new(
                false,
                AssertionKind::Format,
                "json",
                format!("invalid JSON: {e}"),
            ),
        }
    }

    /// Output parses as JSON and validates against `schema`.
    ///
    /// # Errors
    /// Returns `AssertionError::InvalidSchema` if the schema itself is invalid.
    pub fn check_json_schema(
        &self,
        output: &str,
        schema: &serde_json::Value,
    ) -> Result<AssertionVerdict, AssertionError> {
        let validator = jsonschema::validator_for(schema)
            .map_err(|e| AssertionError::InvalidSchema(e.to_string()))?;

        let value: serde_json::Value = match serde_json::from_str(output) {
            Ok(value) => value,
            Err(e) => {
                return Ok(AssertionVerdict::new(
                    false,
                    AssertionKind::Format,
                    "json_schema",
                    format!("invalid JSON: {e}"),
                ));
            }
        };

        if validator.is_valid(&value) {
            return Ok(AssertionVerdict::new(
                true,
                AssertionKind::Format,
                "json_schema",
                "output matches schema".to_string(),
            ));
        }

        let errors: Vec<String> = validator.iter_errors(&value).map(|e| e.to_string()).collect();
        Ok(AssertionVerdict::new(
            false,
            AssertionKind::Format,
            "json_schema",
            format!("schema validation failed: {}", errors.join("; ")),
        ))
    }

    /// Output looks like the given format.
    ///
    /// JSON, YAML and XML are parsed; Markdown and HTML use marker heuristics.
    #[must_use]
    pub fn check_format(&self, output: &str, format: TextFormat) -> AssertionVerdict {
        let problem = match format {
            TextFormat::Json => serde_json::from_str::<serde_json::Value>(output)
                .err()
                .map(|e| format!("invalid JSON: {e}")),
            TextFormat::Yaml => serde_yml::from_str::<serde_yml::Value>(output)
                .err()
                .map(|e| format!("invalid YAML: {e}")),
            TextFormat::Markdown => (!["#", "**", "*", "-", "```"]
                .iter()
                .any(|marker| output.contains(marker)))
            .then(|| "output does not appear to be Markdown".to_string()),
            TextFormat::Html => (!(output.contains('<') && output.contains('>')))
                .then(|| "output does not appear to be HTML".to_string()),
            TextFormat::Xml => xml_problem(output).map(|e| format!("invalid XML: {e}")),
        };

        match problem {
            None => AssertionVerdict::new(
                true,
                AssertionKind::Format,
                "format",
                format!("output is valid {format}"),
            ),
            Some(explanation) => {
                AssertionVerdict::new(false, AssertionKind::Format, "format", explanation)
            }
        }
    }

    /// Length of a list against an expected value.
    #[must_use]
    pub fn check_length<T>(
        &self,
        items: &[T],
        expected: usize,
        mode: LengthMode,
    ) -> AssertionVerdict {
        let actual = items.len();
        let (passed, relation) = match mode {
            LengthMode::Exact => (actual == expected, ""),
            LengthMode::Min => (actual >= expected, ">= "),
            LengthMode::Max => (actual <= expected, "<= "),
        };
        AssertionVerdict::new(
            passed,
            AssertionKind::Content,
            "length",
            format!("length {actual}, expected {relation}{expected}"),
        )
    }

    // -- performance ------------------------------------------------------

    /// Latency in seconds; passes when `measured <= max`.
    #[must_use]
    pub fn check_latency(&self, measured: f64, max: f64) -> AssertionVerdict {
        let passed = measured <= max;
        AssertionVerdict::new(
            passed,
            AssertionKind::Performance,
            "latency",
            format!(
                "latency {measured:.4}s {} max {max:.4}s",
                if passed { "<=" } else { ">" }
            ),
        )
        .with_score(measured)
    }

    /// Cost; passes when `measured <= max`.
    #[must_use]
    pub fn check_cost(&self, measured: f64, max: f64) -> AssertionVerdict {
        let passed = measured <= max;
        AssertionVerdict::new(
            passed,
            AssertionKind::Performance,
            "cost",
            format!(
                "cost ${measured:.4} {} max ${max:.4}",
                if passed { "<=" } else { ">" }
            ),
        )
        .with_score(measured)
    }

    /// Token count; passes when `measured <= max`.
    #[must_use]
    pub fn check_tokens(&self, measured: u64, max: u64) -> AssertionVerdict {
        let passed = measured <= max;
        AssertionVerdict::new(
            passed,
            AssertionKind::Performance,
            "tokens",
            format!(
                "{measured} tokens {} max {max}",
                if passed { "<=" } else { ">" }
            ),
        )
    }

    // -- safety -----------------------------------------------------------

    /// No configured PII class occurs in the output.
    #[must_use]
    pub fn check_no_pii(&self, output: &str) -> AssertionVerdict {
        let found = self.config.pii.scan(output);
        if found.is_empty() {
            AssertionVerdict::new(
                true,
                AssertionKind::Safety,
                "no_pii",
                "no PII detected".to_string(),
            )
        } else {
            AssertionVerdict::new(
                false,
                AssertionKind::Safety,
                "no_pii",
                format!("PII detected in output: {}", found.join(", ")),
            )
        }
    }

    /// Fraction of output sentences grounded in `sources`.
    ///
    /// A sentence counts as grounded when more than half of its tokens occur
    /// in the sources. This is a lexical heuristic: paraphrases are missed and
    /// a fabricated sentence built from source words passes.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn check_grounded<S: AsRef<str>>(
        &self,
        output: &str,
        sources: &[S],
        threshold: Option<f64>,
    ) -> AssertionVerdict {
        let threshold = threshold.unwrap_or(self.config.grounding_threshold);
        let source_tokens: HashSet<String> = sources
            .iter()
            .flat_map(|doc| tokens(doc.as_ref()))
            .collect();

        let sentences: Vec<HashSet<String>> = output
            .split(['.', '!', '?'])
            .map(tokens)
            .filter(|words| !words.is_empty())
            .collect();

        let grounded = sentences
            .iter()
            .filter(|words| {
                let overlap = words.intersection(&source_tokens).count();
                overlap as f64 / words.len() as f64 > 0.5
            })
            .count();

        let ratio = if sentences.is_empty() {
            0.0
        } else {
            grounded as f64 / sentences.len() as f64
        };
        let passed = ratio >= threshold;

        AssertionVerdict::new(
            passed,
            AssertionKind::Safety,
            "grounded",
            format!(
                "{grounded}/{} sentences grounded (ratio {ratio:.2}, threshold {threshold:.2})",
                sentences.len()
            ),
        )
        .with_score(ratio)
    }

    // -- hard forms -------------------------------------------------------

    /// # Errors
    /// Returns `AssertionFailure` if `output` does not contain `expected`.
    pub fn assert_contains(
        &self,
        output: &str,
        expected: &str,
    ) -> Result<AssertionVerdict, AssertionFailure> {
        self.check_contains(output, expected).into_result()
    }

    /// # Errors
    /// Returns `AssertionFailure` if `output` contains `unexpected`.
    pub fn assert_not_contains(
        &self,
        output: &str,
        unexpected: &str,
    ) -> Result<AssertionVerdict, AssertionFailure> {
        self.check_not_contains(output, unexpected).into_result()
    }

    /// # Errors
    /// Returns `AssertionFailure` if the trimmed texts differ.
    pub fn assert_text_equals(
        &self,
        output: &str,
        expected: &str,
    ) -> Result<AssertionVerdict, AssertionFailure> {
        self.check_text_equals(output, expected).into_result()
    }

    /// # Errors
    /// Returns `AssertionFailure` if the values differ.
    pub fn assert_equals<T: PartialEq + fmt::Debug + ?Sized>(
        &self,
        actual: &T,
        expected: &T,
    ) -> Result<AssertionVerdict, AssertionFailure> {
        self.check_equals(actual, expected).into_result()
    }

    /// # Errors
    /// Returns `AssertionError::InvalidRegex` for a bad pattern, or
    /// `AssertionError::Failed` if the expectation does not hold.
    pub fn assert_regex(
        &self,
        output: &str,
        pattern: &str,
        expect: PatternExpect,
    ) -> Result<AssertionVerdict, AssertionError> {
        Ok(self.check_regex(output, pattern, expect)?.into_result()?)
    }

    /// # Errors
    /// Returns `AssertionError::InvalidRegex` for a bad pattern, or
    /// `AssertionError::Failed` naming the first item that does not match.
    pub fn assert_all_match<S: AsRef<str>>(
        &self,
        items: &[S],
        pattern: &str,
    ) -> Result<AssertionVerdict, AssertionError> {
        Ok(self.check_all_match(items, pattern)?.into_result()?)
    }

    /// # Errors
    /// Returns `AssertionError::InvalidRegex` for a bad pattern, or
    /// `AssertionError::Failed` if no item matches.
    pub fn assert_any_match<S: AsRef<str>>(
        &self,
        items: &[S],
        pattern: &str,
    ) -> Result<AssertionVerdict, AssertionError> {
        Ok(self.check_any_match(items, pattern)?.into_result()?)
    }

    /// # Errors
    /// Returns `AssertionFailure` if the score is below the threshold.
    pub fn assert_similarity(
        &self,
        output: &str,
        expected: &str,
        threshold: Option<f64>,
    ) -> Result<AssertionVerdict, AssertionFailure> {
        self.check_similarity(output, expected, threshold).into_result()
    }

    /// # Errors
    /// Returns `AssertionFailure` if `output` is not valid JSON.
    pub fn assert_json(&self, output: &str) -> Result<AssertionVerdict, AssertionFailure> {
        self.check_json(output).into_result()
    }

    /// # Errors
    /// Returns `AssertionError::InvalidSchema` for a bad schema, or
    /// `AssertionError::Failed` if the output does not validate.
    pub fn assert_json_schema(
        &self,
        output: &str,
        schema: &serde_json::Value,
    ) -> Result<AssertionVerdict, AssertionError> {
        Ok(self.check_json_schema(output, schema)?.into_result()?)
    }

    /// # Errors
    /// Returns `AssertionFailure` if `output` is not in `format`.
    pub fn assert_format(
        &self,
        output: &str,
        format: TextFormat,
    ) -> Result<AssertionVerdict, AssertionFailure> {
        self.check_format(output, format).into_result()
    }

    /// # Errors
    /// Returns `AssertionFailure` if the length check does not hold.
    pub fn assert_length<T>(
        &self,
        items: &[T],
        expected: usize,
        mode: LengthMode,
    ) -> Result<AssertionVerdict, AssertionFailure> {
        self.check_length(items, expected, mode).into_result()
    }

    /// # Errors
    /// Returns `AssertionFailure` if `measured > max`.
    pub fn assert_latency(
        &self,
        measured: f64,
        max: f64,
    ) -> Result<AssertionVerdict, AssertionFailure> {
        self.check_latency(measured, max).into_result()
    }

    /// # Errors
    /// Returns `AssertionFailure` if `measured > max`.
    pub fn assert_cost(
        &self,
        measured: f64,
        max: f64,
    ) -> Result<AssertionVerdict, AssertionFailure> {
        self.check_cost(measured, max).into_result()
    }

    /// # Errors
    /// Returns `AssertionFailure` if `measured > max`.
    pub fn assert_tokens(
        &self,
        measured: u64,
        max: u64,
    ) -> Result<AssertionVerdict, AssertionFailure> {
        self.check_tokens(measured, max).into_result()
    }

    /// # Errors
    /// Returns `AssertionFailure` naming every PII class found.
    pub fn assert_no_pii(&self, output: &str) -> Result<AssertionVerdict, AssertionFailure> {
        self.check_no_pii(output).into_result()
    }

    /// # Errors
    /// Returns `AssertionFailure` if the grounding ratio is below the threshold.
    pub fn assert_grounded<S: AsRef<str>>(
        &self,
        output: &str,
        sources: &[S],
        threshold: Option<f64>,
    ) -> Result<AssertionVerdict, AssertionFailure> {
        self.check_grounded(output, sources, threshold).into_result()
    }

    /// Ad-hoc check.
    ///
    /// # Errors
    /// Returns `AssertionFailure` carrying `explanation` if `condition` is false.
    pub fn ensure(
        &self,
        condition: bool,
        explanation: impl Into<String>,
    ) -> Result<(), AssertionFailure> {
        AssertionVerdict::new(condition, AssertionKind::Content, "ensure", explanation.into())
            .into_result()
            .map(|_| ())
    }

    /// Evaluate a declared assertion against a response.
    ///
    /// # Errors
    /// Returns an error only when the assertion itself is invalid; a failed
    /// check is reported through the verdict.
    pub fn evaluate(
        &self,
        assertion: &Assertion,
        response: &MockResponse,
    ) -> Result<AssertionVerdict, AssertionError> {
        let output = response.content.as_str();
        let verdict = match assertion {
            Assertion::Contains(a) => {
                self.check_contains_with(output, &a.value, a.expect, a.case_sensitive)
            }
            Assertion::Equals(a) => self.check_text_equals(output, &a.value),
            Assertion::Regex(a) => self.check_regex(output, &a.pattern, a.expect)?,
            Assertion::Similarity(a) => self.check_similarity(output, &a.expected, a.threshold),
            Assertion::Json(a) => match &a.schema {
                Some(schema) => self.check_json_schema(output, schema)?,
                None => self.check_json(output),
            },
            Assertion::Format(a) => self.check_format(output, a.format),
            Assertion::Latency(a) => self.check_latency(response.latency, a.max),
            Assertion::Cost(a) => self.check_cost(response.cost, a.max),
            Assertion::Tokens(a) => self.check_tokens(response.tokens_used, a.max),
            Assertion::NoPii(_) => self.check_no_pii(output),
            Assertion::Grounded(a) => self.check_grounded(output, &a.sources, a.threshold),
        };
        Ok(verdict)
    }
}

/// First well-formedness problem in an XML document, if any.
///
/// The document must hold exactly one root element with balanced tags.
fn xml_problem(output: &str) -> Option<String> {
    let mut reader = Reader::from_str(output);
    reader.config_mut().trim_text(true);

    let mut depth = 0usize;
    let mut roots = 0usize;
    loop {
        match reader.read_event() {
            Ok(Event::Start(_)) => {
                if depth == 0 {
                    roots += 1;
                }
                depth += 1;
            }
            Ok(Event::Empty(_)) if depth == 0 => roots += 1,
            Ok(Event::End(_)) => depth = depth.saturating_sub(1),
            Ok(Event::Text(text)) if depth == 0 && !text.iter().all(u8::is_ascii_whitespace) => {
                return Some("text outside the root element".to_string());
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Some(e.to_string()),
        }
    }

    match roots {
        0 => Some("no root element".to_string()),
        1 if depth > 0 => Some("unclosed element".to_string()),
        1 => None,
        _ => Some("more than one root element".to_string()),
    }
}
