//! Error Types
//!
//! This module defines the error types used throughout the pipeline.
//!
//! # Overview
//!
//! Errors fall into two families:
//! - [`PipelineError`]: configuration-time failures. These are returned to the
//!   caller immediately and are never deferred to frame execution.
//! - [`ContextError`]: graphics-context failures raised by a
//!   [`GraphicsContext`](crate::renderer::device::GraphicsContext) binding.
//!   The output device recovers from these per frame and reports them through
//!   an [`ErrorReporter`]; they never reach the caller of `draw`.
//!
//! Degradations that are neither (an exhausted light pool, an unrecognised
//! renderable) are reported as warnings and the frame continues.
//!
//! # Usage
//!
//! ```rust,ignore
//! use saga::errors::{PipelineError, Result};
//!
//! fn configure() -> Result<()> {
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use thiserror::Error;

/// The main error type for configuration-time failures.
#[derive(Error, Debug)]
pub enum PipelineError {
    // ========================================================================
    // Scene Graph Configuration
    // ========================================================================
    /// A node with more than one parent was found on the path from a
    /// viewpoint (or background) up to the scene root.
    #[error("Shared node {node} found on the {path} path; the ascent to a unique root is ambiguous")]
    SharedNodeOnViewPath {
        /// Debug representation of the offending node key
        node: String,
        /// Which path was being resolved ("viewpoint" or "background")
        path: &'static str,
    },

    /// A node that is not marked as shared was given a second parent.
    #[error("Node {0} already has a parent and is not marked as shared")]
    AlreadyParented(String),

    /// Children were attached to a node that cannot hold them.
    #[error("Node {0} is a leaf and cannot have children")]
    NotAGroup(String),

    /// Attaching would make a node its own ancestor.
    #[error("Attaching {child} under {parent} would create a cycle")]
    WouldCreateCycle {
        /// Debug representation of the child key
        child: String,
        /// Debug representation of the parent key
        parent: String,
    },

    /// A node key did not resolve to a node in the graph.
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// An orientation axis of zero length was supplied.
    #[error("Zero-length {0} axis")]
    ZeroLengthAxis(&'static str),

    // ========================================================================
    // Pipeline Configuration
    // ========================================================================
    /// More layers were requested than were supplied.
    #[error("Invalid layer count: {requested} requested but only {available} supplied")]
    InvalidLayerCount {
        /// Number of layers requested
        requested: usize,
        /// Number of layers available in the supplied slice
        available: usize,
    },

    /// The state-sort priority list is not a permutation of all state slots.
    #[error("Invalid state sort priority: {0}")]
    InvalidStatePriority(String),

    /// Depth-sort quantisation width outside `1..=24`.
    #[error("Invalid depth sort bit count: {0} (expected 1..=24)")]
    InvalidDepthBits(u32),

    /// Settings could not be parsed.
    #[error("Invalid settings: {0}")]
    InvalidSettings(#[from] serde_json::Error),
}

/// Failures raised by a graphics-context binding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    /// The device layer was interrupted, typically by a shutdown race.
    /// Treated as a terminate signal rather than an error.
    #[error("Graphics context interrupted")]
    Interrupted,

    /// The context was lost and could not be recovered this frame.
    #[error("Graphics context lost")]
    Lost,

    /// The context could not be used this frame.
    #[error("Graphics context failure: {0}")]
    Failed(String),

    /// The platform does not support a requested capability.
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl ContextError {
    /// Whether the root cause is a benign interruption that should be
    /// suppressed rather than reported.
    #[inline]
    #[must_use]
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

/// Alias for `Result<T, PipelineError>`.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Outcome of a stage invocation.
///
/// Termination is cooperative: a stage that observes the halt flag returns
/// [`StageStatus::Halted`] at the next safe point without emitting output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Completed,
    Halted,
}

impl StageStatus {
    #[inline]
    #[must_use]
    pub fn is_halted(self) -> bool {
        matches!(self, Self::Halted)
    }
}

// ============================================================================
// Error Reporting Channel
// ============================================================================

/// Channel through which stages report non-fatal problems.
///
/// One reporter is owned by the pipeline orchestrator and handed to every
/// stage at construction time.
pub trait ErrorReporter: Send + Sync {
    /// A degradation that does not affect the rest of the frame.
    fn warning(&self, message: &str);

    /// A failure that aborted part or all of the current frame.
    fn error(&self, message: &str, cause: Option<&dyn std::error::Error>);
}

/// Reporter that forwards everything to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn warning(&self, message: &str) {
        log::warn!("{message}");
    }

    fn error(&self, message: &str, cause: Option<&dyn std::error::Error>) {
        match cause {
            Some(err) => log::error!("{message}: {err}"),
            None => log::error!("{message}"),
        }
    }
}

/// Shared handle to a reporter.
pub type SharedReporter = Arc<dyn ErrorReporter>;

/// Returns the default reporter.
#[must_use]
pub fn default_reporter() -> SharedReporter {
    Arc::new(LogReporter)
}
