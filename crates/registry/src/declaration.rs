//! Declarations held by the type registry.
//!
//! A [`Declaration`] wraps one of three bodies: a reopenable [`ClassBody`], a
//! parameterized [`Definition`], or a [`NodeSelector`]. Only class bodies are
//! mutable after construction; the registry appends to them when a class is
//! declared again.

use std::path::PathBuf;
use std::sync::Arc;

use regex::{Regex, RegexBuilder};

use crate::error::MergeConflict;
use crate::namespace::canonicalize;

/// The three declaration namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclarationKind {
	Class,
	Definition,
	Node,
}

impl DeclarationKind {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Class => "class",
			Self::Definition => "definition",
			Self::Node => "node",
		}
	}

	/// Capitalized label used at the start of error messages.
	pub(crate) const fn title(self) -> &'static str {
		match self {
			Self::Class => "Class",
			Self::Definition => "Definition",
			Self::Node => "Node",
		}
	}
}

impl std::fmt::Display for DeclarationKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Where a declaration was written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceLocation {
	pub file: Option<PathBuf>,
	pub line: Option<u32>,
}

impl SourceLocation {
	pub fn new(file: impl Into<PathBuf>, line: u32) -> Self {
		Self {
			file: Some(file.into()),
			line: Some(line),
		}
	}

	pub fn is_known(&self) -> bool {
		self.file.is_some() || self.line.is_some()
	}

	/// Renders `" at file:line"`, or an empty string when nothing is known.
	pub fn suffix(&self) -> String {
		if self.is_known() { format!(" at {self}") } else { String::new() }
	}
}

impl std::fmt::Display for SourceLocation {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match (&self.file, self.line) {
			(Some(file), Some(line)) => write!(f, "{}:{line}", file.display()),
			(Some(file), None) => write!(f, "{}", file.display()),
			(None, Some(line)) => write!(f, "line {line}"),
			(None, None) => f.write_str("unknown location"),
		}
	}
}

/// Non-owning back-reference from a declaration to the registry that accepted it.
///
/// Only used to give error messages and logs their environment context. It
/// never keeps the registry alive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryTag {
	pub id: u64,
	pub environment: Arc<str>,
}

/// Body of a class. Reopening a class appends to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassBody {
	pub name: String,
	pub parent: Option<String>,
	pub doc: Option<String>,
	/// Opaque body statements in declaration order.
	pub code: Vec<String>,
}

impl ClassBody {
	pub fn new(name: &str) -> Self {
		Self {
			name: canonicalize(name),
			..Self::default()
		}
	}

	pub fn inherits(mut self, parent: &str) -> Self {
		self.parent = Some(canonicalize(parent));
		self
	}

	pub fn doc(mut self, doc: impl Into<String>) -> Self {
		self.doc = Some(doc.into());
		self
	}

	pub fn code(mut self, statement: impl Into<String>) -> Self {
		self.code.push(statement.into());
		self
	}

	/// Absorbs a reopened declaration of the same class.
	///
	/// Nothing is modified when an error is returned.
	pub fn merge(&mut self, other: ClassBody, freeze_main: bool) -> Result<(), MergeConflict> {
		if freeze_main && self.name.is_empty() {
			return Err(MergeConflict::FrozenMain);
		}
		if let (Some(existing), Some(incoming)) = (&self.parent, &other.parent)
			&& existing != incoming
		{
			return Err(MergeConflict::ParentMismatch {
				name: self.name.clone(),
				existing: existing.clone(),
				incoming: incoming.clone(),
			});
		}

		if self.parent.is_none() {
			self.parent = other.parent;
		}
		if let Some(doc) = other.doc {
			self.doc.get_or_insert_with(String::new).push_str(&doc);
		}
		self.code.extend(other.code);
		Ok(())
	}
}

/// A parameterized, non-mergeable resource template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Definition {
	pub name: String,
	pub params: Vec<String>,
	pub code: Vec<String>,
}

impl Definition {
	pub fn new(name: &str) -> Self {
		Self {
			name: canonicalize(name),
			..Self::default()
		}
	}

	pub fn param(mut self, name: impl Into<String>) -> Self {
		self.params.push(name.into());
		self
	}

	pub fn code(mut self, statement: impl Into<String>) -> Self {
		self.code.push(statement.into());
		self
	}
}

/// How a node selector matches host names.
#[derive(Debug, Clone)]
pub enum NodeName {
	/// Matches one canonical host name.
	Exact(String),
	/// Matches any canonical host name the regex accepts.
	Pattern(Regex),
}

impl NodeName {
	pub fn exact(name: &str) -> Self {
		Self::Exact(canonicalize(name))
	}

	/// Compiles a case-insensitive pattern; host names are matched in
	/// canonical (lowercase) form.
	pub fn pattern(source: &str) -> Result<Self, regex::Error> {
		RegexBuilder::new(source).case_insensitive(true).build().map(Self::Pattern)
	}

	pub fn is_pattern(&self) -> bool {
		matches!(self, Self::Pattern(_))
	}

	/// Map key: the canonical name, or `/source/` for patterns with the
	/// source kept verbatim.
	pub fn key(&self) -> String {
		match self {
			Self::Exact(name) => name.clone(),
			Self::Pattern(regex) => format!("/{}/", regex.as_str()),
		}
	}

	/// Tests an already canonicalized host name.
	pub fn matches(&self, canonical: &str) -> bool {
		match self {
			Self::Exact(name) => name == canonical,
			Self::Pattern(regex) => regex.is_match(canonical),
		}
	}
}

#[derive(Debug, Clone)]
pub struct NodeSelector {
	pub name: NodeName,
	pub parent: Option<String>,
	pub code: Vec<String>,
}

impl NodeSelector {
	pub fn new(name: NodeName) -> Self {
		Self {
			name,
			parent: None,
			code: Vec::new(),
		}
	}

	pub fn inherits(mut self, parent: &str) -> Self {
		self.parent = Some(canonicalize(parent));
		self
	}

	pub fn code(mut self, statement: impl Into<String>) -> Self {
		self.code.push(statement.into());
		self
	}
}

#[derive(Debug, Clone)]
pub enum DeclarationBody {
	Class(ClassBody),
	Definition(Definition),
	Node(NodeSelector),
}

/// A named compiled unit plus its provenance.
#[derive(Debug, Clone)]
pub struct Declaration {
	pub body: DeclarationBody,
	pub location: SourceLocation,
	pub(crate) registry: Option<RegistryTag>,
}

impl Declaration {
	pub fn new(body: DeclarationBody) -> Self {
		Self {
			body,
			location: SourceLocation::default(),
			registry: None,
		}
	}

	/// Records the file and line the declaration came from.
	pub fn at(mut self, file: impl Into<PathBuf>, line: u32) -> Self {
		self.location = SourceLocation::new(file, line);
		self
	}

	pub fn kind(&self) -> DeclarationKind {
		match self.body {
			DeclarationBody::Class(_) => DeclarationKind::Class,
			DeclarationBody::Definition(_) => DeclarationKind::Definition,
			DeclarationBody::Node(_) => DeclarationKind::Node,
		}
	}

	/// Canonical registry key.
	pub fn name(&self) -> String {
		match &self.body {
			DeclarationBody::Class(class) => class.name.clone(),
			DeclarationBody::Definition(definition) => definition.name.clone(),
			DeclarationBody::Node(node) => node.name.key(),
		}
	}

	pub fn location(&self) -> &SourceLocation {
		&self.location
	}

	/// The registry that accepted this declaration, if any.
	pub fn registry(&self) -> Option<&RegistryTag> {
		self.registry.as_ref()
	}

	pub fn as_class(&self) -> Option<&ClassBody> {
		match &self.body {
			DeclarationBody::Class(class) => Some(class),
			_ => None,
		}
	}

	pub fn as_definition(&self) -> Option<&Definition> {
		match &self.body {
			DeclarationBody::Definition(definition) => Some(definition),
			_ => None,
		}
	}

	pub fn as_node(&self) -> Option<&NodeSelector> {
		match &self.body {
			DeclarationBody::Node(node) => Some(node),
			_ => None,
		}
	}
}

impl From<ClassBody> for Declaration {
	fn from(body: ClassBody) -> Self {
		Self::new(DeclarationBody::Class(body))
	}
}

impl From<Definition> for Declaration {
	fn from(body: Definition) -> Self {
		Self::new(DeclarationBody::Definition(body))
	}
}

impl From<NodeSelector> for Declaration {
	fn from(body: NodeSelector) -> Self {
		Self::new(DeclarationBody::Node(body))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn class_merge_appends_code_and_docs() {
		let mut base = ClassBody::new("Apache").doc("web ").code("package");
		base.merge(ClassBody::new("apache").doc("server").code("service"), false).unwrap();

		assert_eq!(base.name, "apache");
		assert_eq!(base.code, vec!["package", "service"]);
		assert_eq!(base.doc.as_deref(), Some("web server"));
	}

	#[test]
	fn class_merge_keeps_whichever_parent_is_declared() {
		let mut base = ClassBody::new("apache");
		base.merge(ClassBody::new("apache").inherits("Base"), false).unwrap();
		assert_eq!(base.parent.as_deref(), Some("base"));

		base.merge(ClassBody::new("apache"), false).unwrap();
		assert_eq!(base.parent.as_deref(), Some("base"));
	}

	#[test]
	fn class_merge_rejects_different_parents() {
		let mut base = ClassBody::new("apache").inherits("a").code("one");
		let err = base.merge(ClassBody::new("apache").inherits("b").code("two"), false).unwrap_err();

		assert_eq!(
			err,
			MergeConflict::ParentMismatch {
				name: "apache".into(),
				existing: "a".into(),
				incoming: "b".into(),
			}
		);
		assert_eq!(base.code, vec!["one"]);
	}

	#[test]
	fn frozen_main_refuses_merge() {
		let mut main = ClassBody::new("");
		assert_eq!(main.merge(ClassBody::new("").code("x"), true), Err(MergeConflict::FrozenMain));
		assert!(main.merge(ClassBody::new("").code("x"), false).is_ok());
	}

	#[test]
	fn pattern_key_and_match() {
		let node = NodeName::pattern("^web\\d+$").unwrap();
		assert!(node.is_pattern());
		assert_eq!(node.key(), "/^web\\d+$/");
		assert!(node.matches("web01"));
		assert!(!node.matches("db01"));
	}

	#[test]
	fn pattern_key_keeps_source_case() {
		let upper = NodeName::pattern("^Web\\d+$").unwrap();
		assert_eq!(upper.key(), "/^Web\\d+$/");
		assert_ne!(upper.key(), NodeName::pattern("^web\\d+$").unwrap().key());
		assert!(upper.matches("web01"));
	}

	#[test]
	fn location_suffix() {
		assert_eq!(SourceLocation::new("site.pp", 4).suffix(), " at site.pp:4");
		assert_eq!(SourceLocation::default().suffix(), "");
	}
}
