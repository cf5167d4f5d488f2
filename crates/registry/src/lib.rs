//! Compiled-unit registry for keel manifests.
//!
//! This crate holds the class, definition, and node declarations produced by
//! parsing manifests, resolves references to them across nested namespaces,
//! autoloads units on demand, and decides when compiled state is stale.
//!
//! # Modules
//!
//! - [`declaration`] - Declaration bodies, kinds, and provenance
//! - [`namespace`] - Canonical names and namespace candidate search
//! - [`registry`] - The [`TypeRegistry`] itself
//! - [`stamp`] - Timestamp-based change detection for watched files
//! - [`loader`] - Autoloader and parsed-unit seams
//! - [`config`] - Per-environment settings
//! - [`error`] - Error types

pub mod config;
pub mod declaration;
pub mod error;
pub mod loader;
pub mod namespace;
pub mod registry;
pub mod stamp;
mod version;

pub use config::RegistryConfig;
pub use declaration::{
	ClassBody, Declaration, DeclarationBody, DeclarationKind, Definition, NodeName, NodeSelector, RegistryTag, SourceLocation,
};
pub use error::{ConfigError, DuplicateDeclaration, MergeConflict, RegistryError, Result, VersionError};
pub use loader::{Instantiate, NoopLoader, TypeLoader};
pub use namespace::{canonicalize, resolve_namespaces};
pub use registry::{LookupOptions, TypeRegistry};
pub use stamp::{AlwaysStaleFile, FileTimeout, StampedFile, WatchedFile};
