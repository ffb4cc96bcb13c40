//! # Error types used by the modvisor runtime.
//!
//! This module defines the three main error enums:
//!
//! - [`TimerError`] errors raised by the timer facade.
//! - [`DeployError`] errors raised while resolving modules and deploying verticles.
//! - [`RepoError`] errors raised by a module repository during install.
//!
//! All types provide `as_label` helpers for logs/metrics.
//! [`RepoError`] additionally has `is_transient()`: a transient install failure
//! means the next configured repository should be tried.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// # Errors produced by the timer facade.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    /// `stop()` was invoked from the timer's own dispatch thread.
    ///
    /// A firing task must not join the thread it is running on.
    #[error("timer stop() must not be called from a timer task")]
    StopFromTimerTask,

    /// The timer has already been stopped; no further events are accepted.
    #[error("timer already stopped")]
    Stopped,
}

impl TimerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TimerError::StopFromTimerTask => "timer_stop_from_task",
            TimerError::Stopped => "timer_stopped",
        }
    }
}

/// # Errors produced by module resolution and deployment.
///
/// These map onto the platform's failure taxonomy: validation errors are
/// reported synchronously with no state change; configuration and resolution
/// errors fail a deployment before anything is inserted into the tree;
/// runtime errors roll back the partially created deployment.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum DeployError {
    /// A deployment operation was invoked outside a worker context.
    #[error("deployment operations must run on a worker thread")]
    NotWorkerContext,

    /// A request argument failed validation; nothing was changed.
    #[error("invalid deployment request: {reason}")]
    Validation {
        /// What was wrong with the request.
        reason: String,
    },

    /// The module manifest could not be read or parsed.
    #[error("failed to read module config {}: {reason}", .path.display())]
    BadConfig {
        /// Path of the offending `mod.json`.
        path: PathBuf,
        /// Parse or I/O failure description.
        reason: String,
    },

    /// The module is a library: its manifest has no `main` entry.
    #[error("module '{module}' is not runnable: mod.json has no \"main\" field")]
    MissingMain {
        /// The module that was asked to run.
        module: String,
    },

    /// No language factory is registered for the main's extension and no
    /// `default` factory exists.
    #[error("no verticle factory for extension '{extension}' and no default registered")]
    FactoryNotFound {
        /// Extension extracted from `main` (or `default`).
        extension: String,
    },

    /// Dependency resolution failed; the accumulated warnings explain why.
    #[error("failed to resolve module '{module}': {}", .warnings.join("; "))]
    ResolutionFailed {
        /// The module whose include graph could not be resolved.
        module: String,
        /// Warnings accumulated while walking the include graph.
        warnings: Vec<String>,
    },

    /// The module directory is absent and every configured repository failed.
    #[error("failed to install module '{module}'")]
    InstallFailed {
        /// The module that could not be installed.
        module: String,
    },

    /// The module is not present under the module root.
    #[error("module '{module}' is not installed")]
    ModuleNotInstalled {
        /// The absent module.
        module: String,
    },

    /// No deployment is registered under the given name.
    #[error("no deployment with name '{name}'")]
    DeploymentNotFound {
        /// The unknown deployment name.
        name: String,
    },

    /// A verticle instance failed while starting; the deployment was rolled back.
    #[error("verticle '{main}' failed to start: {reason}")]
    InstanceFailed {
        /// The verticle main that failed.
        main: String,
        /// Failure description from the factory or the verticle itself.
        reason: String,
    },

    /// The deployment machinery itself failed unexpectedly.
    #[error("internal deployment failure: {reason}")]
    Internal {
        /// What broke.
        reason: String,
    },
}

impl DeployError {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            DeployError::NotWorkerContext => "deploy_not_worker_context",
            DeployError::Validation { .. } => "deploy_validation",
            DeployError::BadConfig { .. } => "deploy_bad_config",
            DeployError::MissingMain { .. } => "deploy_missing_main",
            DeployError::FactoryNotFound { .. } => "deploy_factory_not_found",
            DeployError::ResolutionFailed { .. } => "deploy_resolution_failed",
            DeployError::InstallFailed { .. } => "deploy_install_failed",
            DeployError::ModuleNotInstalled { .. } => "deploy_module_not_installed",
            DeployError::DeploymentNotFound { .. } => "deploy_not_found",
            DeployError::InstanceFailed { .. } => "deploy_instance_failed",
            DeployError::Internal { .. } => "deploy_internal",
        }
    }
}

/// # Errors produced by a module repository during install.
///
/// Each variant is a non-fatal signal: the resolver iterates to the next
/// configured repository and only fails once all are exhausted.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum RepoError {
    /// The download did not complete within the caller-imposed timeout.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The timeout the caller imposed.
        timeout: Duration,
    },

    /// Transport-level failure (connection refused, truncated body, ...).
    #[error("transport error: {reason}")]
    Transport { reason: String },

    /// The archive was fetched but could not be unpacked into a module.
    #[error("malformed module archive: {reason}")]
    Malformed { reason: String },

    /// The repository does not carry the requested module.
    #[error("module not found in repository")]
    NotFound,
}

impl RepoError {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            RepoError::Timeout { .. } => "repo_timeout",
            RepoError::Transport { .. } => "repo_transport",
            RepoError::Malformed { .. } => "repo_malformed",
            RepoError::NotFound => "repo_not_found",
        }
    }

    /// Indicates whether trying the next repository makes sense.
    ///
    /// Every current failure mode is transient from the resolver's point of
    /// view; the method exists so callers don't hard-code that assumption.
    pub fn is_transient(&self) -> bool {
        true
    }
}
