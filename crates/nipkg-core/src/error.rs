use std::fmt;
use std::io;
use std::path::PathBuf;

pub type Result<T, E = PackageError> = std::result::Result<T, E>;

/// A dependency that could not be satisfied by what is installed in the
/// target context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmetDependency {
    pub package_id: String,
    pub constraint: String,
    pub installed: Option<String>,
}

impl fmt::Display for UnmetDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.installed {
            Some(installed) => write!(
                f,
                "{} {} (installed {installed})",
                self.package_id, self.constraint
            ),
            None => write!(f, "{} {} (not installed)", self.package_id, self.constraint),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidContextName,
    ContextDoesNotExist,
    InvalidEntryPoint,
    InvalidManifest,
    ArchiveExtractionFailed,
    IsolationBoundaryCreationFailed,
    DependencyUnsatisfied,
    InvalidPackageId,
    PackageNotInstalled,
    PackageAlreadyInstalled,
    RegistrationFailed,
    ChecksumMismatch,
    Store,
    Io,
}

#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("invalid context name '{name}': {reason}")]
    InvalidContextName { name: String, reason: &'static str },

    #[error("context '{context}' does not exist")]
    ContextDoesNotExist { context: String },

    #[error("invalid manifest: entry point '{entry_point}' is not of the form 'TypeName, ModuleName'")]
    InvalidEntryPoint { entry_point: String },

    #[error("invalid manifest: {reason}")]
    InvalidManifest { reason: String },

    #[error("failed to extract package archive {}: {reason}", archive.display())]
    ArchiveExtractionFailed { archive: PathBuf, reason: String },

    #[error("failed to create isolation boundary for '{package_id}': {reason}")]
    IsolationBoundaryCreationFailed { package_id: String, reason: String },

    #[error("package '{package_id}' has unsatisfied dependencies: {}", join_unmet(unmet))]
    DependencyUnsatisfied {
        package_id: String,
        unmet: Vec<UnmetDependency>,
    },

    #[error("'{package_id}' is not a valid package id for context '{context}'")]
    InvalidPackageId { context: String, package_id: String },

    #[error("package '{package_id}' is not installed")]
    PackageNotInstalled { package_id: String },

    #[error("package '{package_id}' is already installed at version {version}")]
    PackageAlreadyInstalled { package_id: String, version: String },

    #[error("registration hook of '{package_id}' failed: {reason}")]
    RegistrationFailed { package_id: String, reason: String },

    #[error("checksum mismatch for {}: expected {expected}, got {actual}", archive.display())]
    ChecksumMismatch {
        archive: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("state store error at {}: {reason}", path.display())]
    Store { path: PathBuf, reason: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl PackageError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn invalid_manifest(reason: impl Into<String>) -> Self {
        Self::InvalidManifest {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidContextName { .. } => ErrorKind::InvalidContextName,
            Self::ContextDoesNotExist { .. } => ErrorKind::ContextDoesNotExist,
            Self::InvalidEntryPoint { .. } => ErrorKind::InvalidEntryPoint,
            Self::InvalidManifest { .. } => ErrorKind::InvalidManifest,
            Self::ArchiveExtractionFailed { .. } => ErrorKind::ArchiveExtractionFailed,
            Self::IsolationBoundaryCreationFailed { .. } => {
                ErrorKind::IsolationBoundaryCreationFailed
            }
            Self::DependencyUnsatisfied { .. } => ErrorKind::DependencyUnsatisfied,
            Self::InvalidPackageId { .. } => ErrorKind::InvalidPackageId,
            Self::PackageNotInstalled { .. } => ErrorKind::PackageNotInstalled,
            Self::PackageAlreadyInstalled { .. } => ErrorKind::PackageAlreadyInstalled,
            Self::RegistrationFailed { .. } => ErrorKind::RegistrationFailed,
            Self::ChecksumMismatch { .. } => ErrorKind::ChecksumMismatch,
            Self::Store { .. } => ErrorKind::Store,
            Self::Io { .. } => ErrorKind::Io,
        }
    }

    /// Stable numeric code surfaced to outer tooling.
    pub fn code(&self) -> u32 {
        match self.kind() {
            ErrorKind::InvalidContextName => 1,
            ErrorKind::ContextDoesNotExist => 2,
            ErrorKind::InvalidEntryPoint => 3,
            ErrorKind::InvalidManifest => 4,
            ErrorKind::ArchiveExtractionFailed => 5,
            ErrorKind::IsolationBoundaryCreationFailed => 6,
            ErrorKind::DependencyUnsatisfied => 7,
            ErrorKind::InvalidPackageId => 8,
            ErrorKind::PackageNotInstalled => 9,
            ErrorKind::PackageAlreadyInstalled => 10,
            ErrorKind::RegistrationFailed => 11,
            ErrorKind::ChecksumMismatch => 12,
            ErrorKind::Store => 13,
            ErrorKind::Io => 14,
        }
    }

    /// Unsatisfied dependencies can resolve once the dependency itself is
    /// installed; everything else aborts the operation for good.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::DependencyUnsatisfied { .. })
    }
}

fn join_unmet(unmet: &[UnmetDependency]) -> String {
    unmet
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
