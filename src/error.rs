//! Module system error types

use crate::ident::ModuleIdentifier;
use std::path::PathBuf;
use thiserror::Error;

/// Type alias for module system results
pub type Result<T> = std::result::Result<T, ModuleError>;

/// Errors that can occur in the module system
#[derive(Error, Debug)]
pub enum ModuleError {
    /// No module with the given identifier exists in the loader
    #[error("Module not found: {id}")]
    ModuleNotFound {
        /// Identifier that could not be resolved
        id: ModuleIdentifier,
    },

    /// A finder returned a spec whose identifier differs from the request
    #[error("Module finder returned '{found}' for a request of '{requested}'")]
    NameMismatch {
        /// Identifier that was requested
        requested: ModuleIdentifier,
        /// Identifier the finder actually produced
        found: ModuleIdentifier,
    },

    /// A second module was published into an already-resolved registry entry
    #[error("Module already defined: {id}")]
    DuplicateDefinition {
        /// Identifier of the entry that was already resolved
        id: ModuleIdentifier,
    },

    /// A textual module identifier could not be parsed
    #[error("Invalid module identifier: {text:?}")]
    InvalidIdentifier {
        /// The offending text
        text: String,
    },

    /// A module descriptor violated the document constraints
    #[error("Invalid module descriptor at byte {position}: {message}")]
    InvalidDescriptor {
        /// What was wrong
        message: String,
        /// Byte offset into the document
        position: u64,
    },

    /// An administrative operation was attempted without the redefine capability
    #[error("Permission denied: {operation}")]
    PermissionDenied {
        /// The rejected operation
        operation: String,
    },

    /// I/O error while reading module content
    #[error("IO error reading {}: {source}", path.display())]
    Io {
        /// Path that failed to read
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}
