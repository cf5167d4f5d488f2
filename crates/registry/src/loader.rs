//! Seams to the collaborators around the registry: the autoloader that finds
//! and parses not-yet-registered units, and parsed units awaiting import.

use std::sync::Arc;

use crate::declaration::{Declaration, DeclarationKind};
use crate::error::Result;
use crate::registry::TypeRegistry;

/// Locates and parses the source unit for a fully qualified name.
///
/// Implementations insert whatever they parse through `registry.add` (so the
/// usual duplicate checks apply) and return the declaration registered under
/// `fqname`, if any. The registry never holds its lock while calling this, so
/// re-entrant insertion is safe.
pub trait TypeLoader: Send + Sync {
	/// `kind` is either [`DeclarationKind::Class`] or [`DeclarationKind::Definition`].
	fn try_load(&self, registry: &TypeRegistry, kind: DeclarationKind, fqname: &str) -> Result<Option<Arc<Declaration>>>;
}

/// Loader for registries without a module path; never finds anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLoader;

impl TypeLoader for NoopLoader {
	fn try_load(&self, _registry: &TypeRegistry, _kind: DeclarationKind, _fqname: &str) -> Result<Option<Arc<Declaration>>> {
		Ok(None)
	}
}

/// A parsed manifest that can produce declarations.
pub trait Instantiate {
	/// Produces the unit's declarations in source order.
	fn instantiate(&self, module: &str) -> Vec<Declaration>;
}

impl Instantiate for [Declaration] {
	fn instantiate(&self, _module: &str) -> Vec<Declaration> {
		self.to_vec()
	}
}

impl Instantiate for Vec<Declaration> {
	fn instantiate(&self, module: &str) -> Vec<Declaration> {
		self.as_slice().instantiate(module)
	}
}
