use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::declaration::{DeclarationKind, SourceLocation};

/// Errors produced by the type registry.
#[derive(Debug, Error)]
pub enum RegistryError {
	/// A declaration collided with one already registered.
	#[error(transparent)]
	Duplicate(#[from] DuplicateDeclaration),

	/// A reopened class could not absorb the incoming body.
	#[error("{conflict}{}", .location.suffix())]
	Merge {
		conflict: MergeConflict,
		/// Where the incoming class body was declared.
		location: SourceLocation,
	},

	#[error("unable to set config_version: {0}")]
	Version(#[from] VersionError),

	/// The autoloader failed while producing a declaration.
	#[error("failed to autoload {kind} '{name}': {message}")]
	Load { kind: DeclarationKind, name: String, message: String },

	/// Blocking work could not be scheduled or joined.
	#[error("worker failure: {0}")]
	Worker(String),
}

/// A declaration whose name is already taken in the registry.
///
/// `kind == existing_kind` is a plain redefinition; anything else is a kind
/// mismatch between classes and definitions.
#[derive(Debug, Clone)]
pub struct DuplicateDeclaration {
	/// Canonical name of the incoming declaration.
	pub name: String,
	pub kind: DeclarationKind,
	pub existing_kind: DeclarationKind,
	pub location: SourceLocation,
	pub existing_location: SourceLocation,
	/// Environment of the registry that owns the existing declaration.
	pub environment: Option<Arc<str>>,
}

impl DuplicateDeclaration {
	/// Returns true when the same name was declared twice as the same kind.
	pub fn is_redefinition(&self) -> bool {
		self.kind == self.existing_kind
	}

	fn message(&self) -> String {
		let name = &self.name;
		let prior = self.existing_location.suffix();
		let here = self.location.suffix();
		match (self.kind, self.existing_kind) {
			(DeclarationKind::Class, DeclarationKind::Definition) => {
				format!("Definition '{name}' is already defined{prior}; cannot be redefined as a class{here}")
			}
			(DeclarationKind::Definition, DeclarationKind::Class) => {
				format!("'{name}' is already defined{prior} as a class; cannot redefine as a definition{here}")
			}
			(DeclarationKind::Definition, DeclarationKind::Definition) => {
				format!("Definition '{name}' is already defined{prior}; cannot be redefined{here}")
			}
			(kind, _) => format!("{} '{name}' is already defined{prior}; cannot redefine{here}", kind.title()),
		}
	}
}

impl std::fmt::Display for DuplicateDeclaration {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.message())
	}
}

impl std::error::Error for DuplicateDeclaration {}

/// Reasons a reopened class refuses an incoming body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeConflict {
	#[error("{name} is not a class; cannot add code to it")]
	NotAClass { name: String },

	#[error("Cannot have code outside of a class/node/define because 'freeze_main' is enabled")]
	FrozenMain,

	#[error("Cannot merge classes with different parent classes ({name} => {existing} vs. {name} => {incoming})")]
	ParentMismatch { name: String, existing: String, incoming: String },
}

/// Failures while running the configured version command.
#[derive(Debug, Error)]
pub enum VersionError {
	#[error("version command is empty")]
	Empty,

	#[error("could not execute '{command}': {source}")]
	Spawn {
		command: String,
		#[source]
		source: std::io::Error,
	},

	#[error("'{command}' exited with {}: {stderr}", .status.map_or_else(|| "a signal".to_owned(), |code| format!("status {code}")))]
	Exit { command: String, status: Option<i32>, stderr: String },

	#[error("'{command}' did not finish within {timeout:?}")]
	Timeout { command: String, timeout: Duration },
}

/// Failures while reading registry configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed to read {}: {source}", .path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to parse registry configuration: {0}")]
	Parse(#[from] toml::de::Error),
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
