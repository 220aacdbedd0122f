//! Core library for the agent-test runner.
//!
//! This crate provides the pieces needed to test LLM-backed agents without
//! calling a provider:
//! - Mock LLM matching (exact, pattern, function, default)
//! - Provider-shaped mock clients
//! - Assertion evaluation (content, format, performance, safety)
//! - Test registration and the setup/body/teardown lifecycle
//! - YAML suite loading and test discovery

pub mod adapter;
pub mod assertion;
pub mod config;
pub mod lifecycle;
pub mod loader;
pub mod mock;
pub mod runner;
pub mod types;

pub use adapter::{
    AdapterError, AnthropicMessage, AnthropicMessagesMock, ChatCompletion, ChatMessage,
    ContentBlock, LiteLlmMock, MessageContent, OpenAiChatMock, last_user_message,
};
pub use assertion::{
    AssertionConfig, AssertionEngine, AssertionError, AssertionFailure, AssertionKind,
    AssertionVerdict, LengthMode, LexicalOverlap, PiiPatternSet, SimilarityBackend,
};
pub use config::{
    CONFIG_FILE_NAME, ConfigError, ConfigOverrides, apply_overrides, load_config,
    validate_config,
};
pub use lifecycle::{
    AgentTest, ClassDescriptor, TestClass, TestClassDef, TestContext, TestDescriptor, TestError,
    TestInfo, TestInstance, TestOutcome, execute_expansion, execute_test, param_set,
};
pub use loader::{LoaderError, YamlSuite, discover_suite_files, is_suite_file, load_suite_file};
pub use mock::{
    BoxError, CallRecord, ConfigurationError, Kwargs, MatcherTier, MockMatcher, MockResponse,
    MockRule, ResolveError, ResponseSource, mock_llm_response,
};
pub use runner::{
    Discovery, DiscoveryError, ProgressEvent, ProgressSender, RunnerConfig, RunnerError, Scope,
    TestRunner,
};
pub use types::*;
