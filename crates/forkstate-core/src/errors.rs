use forkstate_core_types::RequestId;
use thiserror::Error;

use crate::model::EntityKey;

/// Result type alias for pure kernel operations
pub type Result<T> = std::result::Result<T, StateError>;

/// Result type alias for operations that cross the storage boundary
pub type ExResult<T> = std::result::Result<T, ExError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Each kind maps to a stable error code usable for programmatic handling,
/// tests, and responses to collaborators consuming the state interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Integrity
    /// Snapshot content fails schema validation
    ValidationError,
    /// Duplicate entity key within a change set, dangling reference, taken name
    ConstraintViolation,
    /// Mutating a sealed change set, or sealing a working change set
    ImmutabilityViolation,
    /// Referenced version / commit / change / working commit does not exist
    NotFound,
    /// Inheritance chain or commit edge would close a cycle
    CycleDetected,

    // Input
    InvalidInput,

    // Integration/IO
    Io,
    Serialization,
    Persistence,
    Concurrency,
    Config,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::ValidationError => "ERR_VALIDATION",
            ExErrorKind::ConstraintViolation => "ERR_CONSTRAINT_VIOLATION",
            ExErrorKind::ImmutabilityViolation => "ERR_IMMUTABILITY_VIOLATION",
            ExErrorKind::NotFound => "ERR_NOT_FOUND",
            ExErrorKind::CycleDetected => "ERR_CYCLE_DETECTED",
            ExErrorKind::InvalidInput => "ERR_INVALID_INPUT",
            ExErrorKind::Io => "ERR_IO",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Persistence => "ERR_PERSISTENCE",
            ExErrorKind::Concurrency => "ERR_CONCURRENCY",
            ExErrorKind::Config => "ERR_CONFIG",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }
}

/// Canonical structured error type
///
/// Classification fields for programmatic handling plus context for debugging.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    entity_id: Option<String>,
    version_id: Option<String>,
    request_id: Option<RequestId>,
    message: String,
    source: Option<Box<ExError>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            entity_id: None,
            version_id: None,
            request_id: None,
            message: String::new(),
            source: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add entity ID context (entity, commit, change set or change id)
    pub fn with_entity_id(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    /// Add version ID context
    pub fn with_version_id(mut self, id: impl Into<String>) -> Self {
        self.version_id = Some(id.into());
        self
    }

    /// Add request ID context
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Get the operation context, if any
    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    /// Get the entity ID context, if any
    pub fn entity_id(&self) -> Option<&str> {
        self.entity_id.as_deref()
    }

    /// Get the version ID context, if any
    pub fn version_id(&self) -> Option<&str> {
        self.version_id.as_deref()
    }

    /// Get the request ID context, if any
    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the source error, if any
    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(entity_id) = &self.entity_id {
            write!(f, " (entity_id: {})", entity_id)?;
        }
        if let Some(version_id) = &self.version_id {
            write!(f, " (version_id: {})", version_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// Domain error taxonomy for state operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateError {
    // ===== Lookup Errors =====
    #[error("Version not found: {version_id}")]
    VersionNotFound { version_id: String },

    #[error("Version {version_id} references missing working commit {commit_id}")]
    WorkingCommitMissing {
        version_id: String,
        commit_id: String,
    },

    #[error("Commit not found: {commit_id}")]
    CommitNotFound { commit_id: String },

    #[error("Change not found: {change_id}")]
    ChangeNotFound { change_id: String },

    #[error("Change set not found: {change_set_id}")]
    ChangeSetNotFound { change_set_id: String },

    #[error("Entity {entity} not found in version {version_id}")]
    EntityNotFound {
        entity: EntityKey,
        version_id: String,
    },

    // ===== Constraint Errors =====
    #[error("Change set {change_set_id} already holds an element for {entity}")]
    DuplicateEntityInChangeSet {
        change_set_id: String,
        entity: EntityKey,
    },

    #[error("Entity {entity} already exists in version {version_id}")]
    EntityAlreadyExists {
        entity: EntityKey,
        version_id: String,
    },

    /// Tracked and untracked storage must hold disjoint entity sets
    #[error("Entity {entity} is {existing} in version {version_id}")]
    TrackingConflict {
        entity: EntityKey,
        version_id: String,
        existing: &'static str,
    },

    #[error("Version name already taken: {name}")]
    VersionNameTaken { name: String },

    #[error("Schema {schema_key} is reserved for internal bookkeeping")]
    ReservedSchema { schema_key: String },

    // ===== Immutability Errors =====
    #[error("Change set {change_set_id} is immutable")]
    ChangeSetImmutable { change_set_id: String },

    #[error("Change set {change_set_id} is the working change set of version {version_id}")]
    SealWorkingChangeSet {
        change_set_id: String,
        version_id: String,
    },

    // ===== Graph Errors =====
    #[error("Inheritance cycle through version {version_id}")]
    InheritanceCycle { version_id: String },

    #[error("Commit edge {parent_id} -> {child_id} is invalid: {reason}")]
    InvalidCommitEdge {
        parent_id: String,
        child_id: String,
        reason: String,
    },

    // ===== Validation Errors =====
    #[error("Snapshot for {schema_key}@{schema_version} failed validation: {reason}")]
    SchemaValidation {
        schema_key: String,
        schema_version: String,
        reason: String,
    },

    #[error("No stored schema for {schema_key}@{schema_version}")]
    UnknownSchema {
        schema_key: String,
        schema_version: String,
    },

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    // ===== Internal Errors =====
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl From<StateError> for ExError {
    fn from(err: StateError) -> Self {
        let message = err.to_string();
        match err {
            StateError::VersionNotFound { version_id } => {
                ExError::new(ExErrorKind::NotFound).with_version_id(version_id)
            }
            StateError::WorkingCommitMissing {
                version_id,
                commit_id,
            } => ExError::new(ExErrorKind::NotFound)
                .with_version_id(version_id)
                .with_entity_id(commit_id),
            StateError::CommitNotFound { commit_id } => {
                ExError::new(ExErrorKind::NotFound).with_entity_id(commit_id)
            }
            StateError::ChangeNotFound { change_id } => {
                ExError::new(ExErrorKind::NotFound).with_entity_id(change_id)
            }
            StateError::ChangeSetNotFound { change_set_id } => {
                ExError::new(ExErrorKind::NotFound).with_entity_id(change_set_id)
            }
            StateError::EntityNotFound { entity, version_id } => {
                ExError::new(ExErrorKind::NotFound)
                    .with_entity_id(entity.entity_id)
                    .with_version_id(version_id)
            }
            StateError::DuplicateEntityInChangeSet { entity, .. } => {
                ExError::new(ExErrorKind::ConstraintViolation).with_entity_id(entity.entity_id)
            }
            StateError::EntityAlreadyExists { entity, version_id }
            | StateError::TrackingConflict {
                entity, version_id, ..
            } => ExError::new(ExErrorKind::ConstraintViolation)
                .with_entity_id(entity.entity_id)
                .with_version_id(version_id),
            StateError::VersionNameTaken { .. } => {
                ExError::new(ExErrorKind::ConstraintViolation)
            }
            StateError::ReservedSchema { .. } | StateError::InvalidInput { .. } => {
                ExError::new(ExErrorKind::InvalidInput)
            }
            StateError::ChangeSetImmutable { change_set_id } => {
                ExError::new(ExErrorKind::ImmutabilityViolation).with_entity_id(change_set_id)
            }
            StateError::SealWorkingChangeSet {
                change_set_id,
                version_id,
            } => ExError::new(ExErrorKind::ImmutabilityViolation)
                .with_entity_id(change_set_id)
                .with_version_id(version_id),
            StateError::InheritanceCycle { version_id } => {
                ExError::new(ExErrorKind::CycleDetected).with_version_id(version_id)
            }
            StateError::InvalidCommitEdge { child_id, .. } => {
                ExError::new(ExErrorKind::ConstraintViolation).with_entity_id(child_id)
            }
            StateError::SchemaValidation { .. } | StateError::UnknownSchema { .. } => {
                ExError::new(ExErrorKind::ValidationError)
            }
            StateError::Serialization { .. } => ExError::new(ExErrorKind::Serialization),
            StateError::Internal { .. } => ExError::new(ExErrorKind::Internal),
        }
        .with_message(message)
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ExError {
    fn from(err: serde_json::Error) -> Self {
        StateError::from(err).into()
    }
}
