use std::fmt;

use thiserror::Error;
use treespace_core_types::RequestId;

/// Result type alias using TreespaceError
pub type Result<T> = std::result::Result<T, TreespaceError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Each kind maps to a stable error code that callers (REST front ends,
/// config validators, tests) can match on without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Lookup
    NotFound,
    AlreadyExists,

    // Schema
    SchemaComposition,
    SchemaViolation,

    // Query parsing
    Syntax,
    VariableNotFound,
    ParserAborted,
    InvalidPath,

    // Mutation
    Forbidden,
    ValidationFailed,

    // Serializer binding
    BindingConflict,

    // Integration/IO
    Config,
    Io,
    Serialization,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::NotFound => "ERR_NOT_FOUND",
            ExErrorKind::AlreadyExists => "ERR_ALREADY_EXISTS",
            ExErrorKind::SchemaComposition => "ERR_SCHEMA_COMPOSITION",
            ExErrorKind::SchemaViolation => "ERR_SCHEMA_VIOLATION",
            ExErrorKind::Syntax => "ERR_SYNTAX",
            ExErrorKind::VariableNotFound => "ERR_VARIABLE_NOT_FOUND",
            ExErrorKind::ParserAborted => "ERR_PARSER_ABORTED",
            ExErrorKind::InvalidPath => "ERR_INVALID_PATH",
            ExErrorKind::Forbidden => "ERR_FORBIDDEN",
            ExErrorKind::ValidationFailed => "ERR_VALIDATION_FAILED",
            ExErrorKind::BindingConflict => "ERR_BINDING_CONFLICT",
            ExErrorKind::Config => "ERR_CONFIG",
            ExErrorKind::Io => "ERR_IO",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }
}

/// Canonical structured error type
///
/// Carries the classification plus whatever context the failing operation
/// had at hand. `details` preserves the ordered diagnostic list of
/// aggregate failures.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    treespace: Option<String>,
    path: Option<String>,
    request_id: Option<RequestId>,
    message: String,
    details: Vec<String>,
}

impl ExError {
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            treespace: None,
            path: None,
            request_id: None,
            message: String::new(),
            details: Vec::new(),
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add treespace context
    pub fn with_treespace(mut self, name: impl Into<String>) -> Self {
        self.treespace = Some(name.into());
        self
    }

    /// Add data or schema path context
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Attach the ordered list of underlying diagnostics
    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }

    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    pub fn treespace(&self) -> Option<&str> {
        self.treespace.as_deref()
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> &[String] {
        &self.details
    }
}

impl fmt::Display for ExError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(treespace) = &self.treespace {
            write!(f, " (treespace: {})", treespace)?;
        }
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {}

// ========== End Error Facility ==========

/// One syntax problem found while parsing a query string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxDiagnostic {
    /// Byte offset into the query string
    pub offset: usize,
    pub message: String,
}

impl SyntaxDiagnostic {
    pub fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

impl fmt::Display for SyntaxDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "offset {}: {}", self.offset, self.message)
    }
}

/// One incompatibility found while composing modules into a schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompositionConflict {
    /// The same module name appears twice in the descriptor list
    DuplicateModule { name: String },
    /// No module with this name (and revision, when given) is available
    UnresolvedModule {
        name: String,
        revision: Option<String>,
    },
    /// Two modules define the same schema path incompatibly
    ConflictingDefinition {
        path: String,
        existing_module: String,
        module: String,
        reason: String,
    },
    /// A single module lists the same child name twice under one parent
    DuplicateNode { path: String, module: String },
    /// A leaf refers to a type that is neither builtin nor a visible typedef
    UnknownType {
        path: String,
        type_name: String,
        module: String,
    },
    /// A list's key leaf is missing or is not a leaf
    MissingListKey {
        path: String,
        key: String,
        module: String,
    },
}

impl fmt::Display for CompositionConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompositionConflict::DuplicateModule { name } => {
                write!(f, "module '{}' listed more than once", name)
            }
            CompositionConflict::UnresolvedModule { name, revision } => match revision {
                Some(rev) => write!(f, "module '{}@{}' could not be resolved", name, rev),
                None => write!(f, "module '{}' could not be resolved", name),
            },
            CompositionConflict::ConflictingDefinition {
                path,
                existing_module,
                module,
                reason,
            } => write!(
                f,
                "{}: definition in '{}' conflicts with '{}': {}",
                path, module, existing_module, reason
            ),
            CompositionConflict::DuplicateNode { path, module } => {
                write!(f, "{}: defined twice in module '{}'", path, module)
            }
            CompositionConflict::UnknownType {
                path,
                type_name,
                module,
            } => write!(
                f,
                "{}: unknown type '{}' in module '{}'",
                path, type_name, module
            ),
            CompositionConflict::MissingListKey { path, key, module } => write!(
                f,
                "{}: list key '{}' is not a leaf child in module '{}'",
                path, key, module
            ),
        }
    }
}

/// Error taxonomy for treespace operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TreespaceError {
    // ===== Registry =====
    #[error("Treespace not found: {name}")]
    TreespaceNotFound { name: String },

    #[error("Treespace already registered: {name}")]
    TreespaceAlreadyRegistered { name: String },

    // ===== Schema =====
    /// Aggregate of every conflict detected while composing modules
    #[error("{summary}")]
    SchemaComposition {
        summary: String,
        conflicts: Vec<CompositionConflict>,
    },

    #[error("Schema violation at {path}: {reason}")]
    SchemaViolation { path: String, reason: String },

    // ===== Query parsing =====
    /// Aggregate of every syntax error found in one parse pass
    #[error("{summary}")]
    Parser {
        summary: String,
        diagnostics: Vec<SyntaxDiagnostic>,
    },

    #[error("Variable not found: ${name}")]
    VariableNotFound { name: String },

    /// Internal parser invariant escape; never used for user syntax mistakes
    #[error("Parsing stopped: {reason}")]
    StopParsing {
        reason: String,
        diagnostics: Vec<SyntaxDiagnostic>,
    },

    #[error("Invalid path {path}: {reason}")]
    InvalidPath { path: String, reason: String },

    // ===== Data =====
    #[error("Path not found: {path}")]
    NotFound { path: String },

    // ===== Authorization =====
    #[error("Authorization rejected by hook '{hook}': {reason}")]
    AuthorizationRejected { reason: String, hook: String },

    #[error("Validation hook '{hook}' rejected {path}: {reason}")]
    ValidationRejected {
        path: String,
        reason: String,
        hook: String,
    },

    // ===== Serializer binding =====
    #[error("Serializer binding already declared for {binding}")]
    DuplicateSerializerBinding { binding: String },

    #[error("Serializer args specified for {binding}, but its serializer does not accept args")]
    SerializerArgsNotAccepted { binding: String },

    // ===== Generic =====
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("I/O error: {message}")]
    Io { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl TreespaceError {
    /// Build the aggregate parser error for a query string
    pub fn parser(query: &str, diagnostics: Vec<SyntaxDiagnostic>) -> Self {
        let summary = format!(
            "Error parsing query '{}': {} syntax error{}",
            query,
            diagnostics.len(),
            if diagnostics.len() == 1 { "" } else { "s" }
        );
        TreespaceError::Parser {
            summary,
            diagnostics,
        }
    }

    /// Build the aggregate composition error
    pub fn composition(conflicts: Vec<CompositionConflict>) -> Self {
        let summary = format!(
            "Schema composition failed with {} conflict{}",
            conflicts.len(),
            if conflicts.len() == 1 { "" } else { "s" }
        );
        TreespaceError::SchemaComposition { summary, conflicts }
    }

    /// Human-readable one-line summary
    pub fn summary(&self) -> String {
        self.to_string()
    }

    /// Underlying diagnostics in detection order; empty for single errors
    pub fn details(&self) -> Vec<String> {
        match self {
            TreespaceError::Parser { diagnostics, .. }
            | TreespaceError::StopParsing { diagnostics, .. } => {
                diagnostics.iter().map(ToString::to_string).collect()
            }
            TreespaceError::SchemaComposition { conflicts, .. } => {
                conflicts.iter().map(ToString::to_string).collect()
            }
            _ => Vec::new(),
        }
    }

    pub fn kind(&self) -> ExErrorKind {
        match self {
            TreespaceError::TreespaceNotFound { .. } | TreespaceError::NotFound { .. } => {
                ExErrorKind::NotFound
            }
            TreespaceError::TreespaceAlreadyRegistered { .. } => ExErrorKind::AlreadyExists,
            TreespaceError::SchemaComposition { .. } => ExErrorKind::SchemaComposition,
            TreespaceError::SchemaViolation { .. } => ExErrorKind::SchemaViolation,
            TreespaceError::Parser { .. } => ExErrorKind::Syntax,
            TreespaceError::VariableNotFound { .. } => ExErrorKind::VariableNotFound,
            TreespaceError::StopParsing { .. } => ExErrorKind::ParserAborted,
            TreespaceError::InvalidPath { .. } => ExErrorKind::InvalidPath,
            TreespaceError::AuthorizationRejected { .. } => ExErrorKind::Forbidden,
            TreespaceError::ValidationRejected { .. } => ExErrorKind::ValidationFailed,
            TreespaceError::DuplicateSerializerBinding { .. }
            | TreespaceError::SerializerArgsNotAccepted { .. } => ExErrorKind::BindingConflict,
            TreespaceError::Serialization { .. } => ExErrorKind::Serialization,
            TreespaceError::InvalidConfig { .. } => ExErrorKind::Config,
            TreespaceError::Io { .. } => ExErrorKind::Io,
            TreespaceError::Internal { .. } => ExErrorKind::Internal,
        }
    }
}

impl From<serde_json::Error> for TreespaceError {
    fn from(err: serde_json::Error) -> Self {
        TreespaceError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for TreespaceError {
    fn from(err: std::io::Error) -> Self {
        TreespaceError::Io {
            message: err.to_string(),
        }
    }
}

/// Conversion from TreespaceError to the canonical ExError
impl From<TreespaceError> for ExError {
    fn from(err: TreespaceError) -> Self {
        let base = ExError::new(err.kind())
            .with_message(err.to_string())
            .with_details(err.details());
        match err {
            TreespaceError::TreespaceNotFound { name }
            | TreespaceError::TreespaceAlreadyRegistered { name } => base.with_treespace(name),
            TreespaceError::SchemaViolation { path, .. }
            | TreespaceError::InvalidPath { path, .. }
            | TreespaceError::NotFound { path } => base.with_path(path),
            TreespaceError::AuthorizationRejected { hook, reason } => base
                .with_op("authorize")
                .with_message(format!("rejected by '{}': {}", hook, reason)),
            TreespaceError::ValidationRejected { path, .. } => base.with_op("validate").with_path(path),
            TreespaceError::Parser { .. }
            | TreespaceError::StopParsing { .. }
            | TreespaceError::VariableNotFound { .. } => base.with_op("parse"),
            TreespaceError::SchemaComposition { .. } => base.with_op("compose"),
            _ => base,
        }
    }
}

impl From<&TreespaceError> for ExError {
    fn from(err: &TreespaceError) -> Self {
        err.clone().into()
    }
}
