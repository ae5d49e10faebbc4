/*!
 * # doctrans - layout-preserving document translation
 *
 * A Rust library for translating paginated documents between languages while
 * preserving the original visual layout, with every request tracked as a
 * durable, resumable background job.
 *
 * ## Features
 *
 * - Extract positioned text blocks from paginated documents
 * - Batch translation units under provider capacity limits
 * - Translate through pluggable backends:
 *   - Ollama (local LLM server)
 *   - OpenAI API
 *   - Anthropic API
 * - Reassemble translated text at the original positions with font
 *   shrinking, reflow and bounded overflow
 * - Durable job state machine with atomic claims, lease recovery,
 *   cooperative cancellation and progress broadcast
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `document`: Paginated document model, layout extraction, reassembly
 * - `translation`: Batching of translation units
 * - `providers`: Client implementations for the translation backends:
 *   - `providers::ollama`: Ollama API client
 *   - `providers::openai`: OpenAI API client
 *   - `providers::anthropic`: Anthropic API client
 *   - `providers::mock`: scripted in-process backend
 * - `jobs`: Job records, store, queue and the orchestrator
 * - `storage`: Content-addressed artifact store
 * - `database`: SQLite connection and schema management
 * - `language_utils`: ISO language code utilities
 * - `errors`: Custom error types for the pipeline
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod database;
pub mod document;
pub mod errors;
pub mod jobs;
pub mod language_utils;
pub mod providers;
pub mod storage;
pub mod translation;

// Re-export main types for easier usage
pub use app_config::{Config, ProviderKind};
pub use document::{LayoutExtractor, PagedDocument, Reassembler, TranslationUnit};
pub use errors::{AppError, ExtractError, ProviderError, ReassembleError};
pub use jobs::{Job, JobState, Orchestrator, ProgressEvent};
pub use language_utils::{get_language_name, language_codes_match, validate_language_pair};
pub use storage::{ArtifactRef, ArtifactStore, FsArtifactStore};
pub use translation::{Batch, BatchLimits, UnitBatcher};
