//! Plugin runtime error taxonomy.

use emporium_core::error::{AppError, ErrorKind};
use emporium_entity::audit::CleanupPhase;
use thiserror::Error;

/// Why persisted handler source could not be turned into a callable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// Source is empty or whitespace only.
    #[error("handler source is empty")]
    Empty,
    /// Source contains nothing but comments (e.g. `// test`).
    #[error("handler source is a placeholder with no code")]
    Placeholder,
    /// Source failed to parse.
    #[error("syntax error{}: {message}", line.map(|l| format!(" at line {l}")).unwrap_or_default())]
    Syntax {
        /// Parser message.
        message: String,
        /// 1-based line, when known.
        line: Option<usize>,
    },
    /// Source parsed but does not define the required entry point.
    #[error("missing entry point: expected `fn {expected}` taking {arity} parameters")]
    MissingEntryPoint {
        /// Function name.
        expected: String,
        /// Required parameter count.
        arity: usize,
    },
}

/// Errors raised by the plugin runtime.
#[derive(Debug, Error)]
pub enum PluginError {
    /// Handler source could not be loaded.
    #[error("failed to load handler: {0}")]
    Load(#[from] LoadError),

    /// A loaded handler failed or timed out while running.
    #[error("handler '{handler}' of plugin '{plugin_id}' failed: {message}")]
    HandlerRuntime {
        /// Owning plugin.
        plugin_id: String,
        /// Handler label.
        handler: String,
        /// Failure description.
        message: String,
    },

    /// Uninstall blocked by installed dependents.
    #[error("plugin '{plugin_id}' is required by: {}", dependents.join(", "))]
    DependencyConflict {
        /// Plugin being removed.
        plugin_id: String,
        /// Installed plugins declaring it as a dependency.
        dependents: Vec<String>,
    },

    /// Uninstall blocked by live routes or services.
    #[error("plugin '{plugin_id}' is in use by: {}", resources.join(", "))]
    InUse {
        /// Plugin being removed.
        plugin_id: String,
        /// Live resources registered by the plugin.
        resources: Vec<String>,
    },

    /// Uninstall blocked because the manifest marks the plugin critical.
    #[error("plugin '{plugin_id}' is marked critical; use force to uninstall")]
    Critical {
        /// Plugin being removed.
        plugin_id: String,
    },

    /// The pre-uninstall backup could not be written.
    #[error("backup of plugin '{plugin_id}' failed: {message}")]
    Backup {
        /// Plugin being removed.
        plugin_id: String,
        /// Failure description.
        message: String,
    },

    /// A single cleanup step failed.
    #[error("cleanup of {resource} failed during {phase}: {message}")]
    Cleanup {
        /// Pipeline phase.
        phase: CleanupPhase,
        /// Resource the step operated on.
        resource: String,
        /// Failure description.
        message: String,
    },

    /// The plugin does not exist or is already uninstalled.
    #[error("plugin '{0}' is not installed")]
    NotInstalled(String),

    /// A plugin with this ID is already installed.
    #[error("plugin '{0}' is already installed")]
    AlreadyInstalled(String),

    /// Another uninstall of the same plugin is running.
    #[error("uninstall of plugin '{0}' is already in progress")]
    UninstallInProgress(String),

    /// A declared dependency is not installed.
    #[error("plugin '{plugin_id}' depends on '{dependency}', which is not installed")]
    MissingDependency {
        /// Plugin being installed.
        plugin_id: String,
        /// Missing dependency.
        dependency: String,
    },

    /// A declared dependency is installed but disabled.
    #[error("plugin '{plugin_id}' depends on '{dependency}', which is not enabled")]
    DependencyDisabled {
        /// Plugin being enabled.
        plugin_id: String,
        /// Disabled dependency.
        dependency: String,
    },

    /// A store or storage collaborator failed.
    #[error(transparent)]
    Store(#[from] AppError),
}

impl PluginError {
    /// Application error kind this error maps to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Store(inner) => inner.kind,
            Self::Load(_) | Self::MissingDependency { .. } => ErrorKind::Validation,
            Self::DependencyConflict { .. }
            | Self::InUse { .. }
            | Self::Critical { .. }
            | Self::AlreadyInstalled(_)
            | Self::UninstallInProgress(_)
            | Self::DependencyDisabled { .. } => ErrorKind::Conflict,
            Self::NotInstalled(_) => ErrorKind::NotFound,
            Self::HandlerRuntime { .. } | Self::Cleanup { .. } => ErrorKind::Plugin,
            Self::Backup { .. } => ErrorKind::Internal,
        }
    }
}

impl From<PluginError> for AppError {
    fn from(err: PluginError) -> Self {
        match err {
            PluginError::Store(inner) => inner,
            other => AppError::with_source(other.kind(), other.to_string(), other),
        }
    }
}

/// A handler or listener that was skipped during dispatch.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct HandlerFailure {
    /// Owning plugin.
    pub plugin_id: String,
    /// Registration ID.
    pub handler_id: i64,
    /// Registration label.
    pub handler: String,
    /// Why it was skipped.
    pub message: String,
}

/// Result alias for runtime operations.
pub type PluginResult<T> = Result<T, PluginError>;
