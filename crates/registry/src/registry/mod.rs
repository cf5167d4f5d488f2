//! The compiled-unit registry.
//!
//! # Purpose
//!
//! [`TypeRegistry`] holds every class, definition, and node declaration of one
//! environment. It resolves names across nested namespaces, autoloads units
//! it has not seen yet, and tells the compiler when its contents are stale.
//!
//! # Mental Model
//!
//! 1. **Import:** a parsed unit is fed through [`TypeRegistry::import_declarations`],
//!    which calls [`TypeRegistry::add`] for each declaration in source order.
//! 2. **Lookup:** [`TypeRegistry::find_class`] and [`TypeRegistry::find_definition`]
//!    walk the candidates from [`resolve_namespaces`], innermost first,
//!    falling through to the [`TypeLoader`] on a miss.
//! 3. **Staleness:** before a compile pass, [`TypeRegistry::requires_recompilation`]
//!    polls the watch set; if anything changed the caller clears and re-imports.
//!
//! # Invariants
//!
//! - Class and definition names share one namespace; only class-on-class
//!   redeclaration is allowed, and it merges.
//!   - Enforced in: `RegistryState::insert_class`, `RegistryState::insert_definition`.
//!   - Tested by: `tests::kind_conflicts_are_rejected`.
//! - A name confirmed absent by the loader is not autoloaded again until [`TypeRegistry::clear`].
//!   - Enforced in: [`TypeRegistry::find_class`] via `find_or_load`.
//!   - Tested by: `tests::negative_cache_suppresses_second_autoload`.
//! - At most one thread autoloads a given name at a time; the others wait and
//!   then see its result.
//!   - Enforced in: `TypeRegistry::claim_load`.
//!   - Tested by: `tests::concurrent_autoload_of_one_name_loads_once`.
//! - An exact node name beats every pattern; among patterns the first registered wins.
//!   - Enforced in: [`TypeRegistry::find_node`].
//!   - Tested by: `tests::first_registered_pattern_wins`, `tests::exact_node_beats_patterns`.
//!
//! # Concurrency
//!
//! One `parking_lot::RwLock` guards the declaration maps, the node order, the
//! watch set, the negative cache, and the parse-failed flag as a single
//! consistency domain. The loader runs with no lock held, serialized per name
//! by a separate in-flight table and condvar. Watched files are polled from a
//! snapshot of the watch set taken outside the lock.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::ThreadId;
use std::time::{SystemTime, UNIX_EPOCH};

use keel_worker::TaskClass;
use parking_lot::{Condvar, Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info, trace, warn};

use crate::config::RegistryConfig;
use crate::declaration::{ClassBody, Declaration, DeclarationBody, DeclarationKind, RegistryTag, SourceLocation};
use crate::error::{DuplicateDeclaration, MergeConflict, RegistryError, Result};
use crate::loader::{Instantiate, NoopLoader, TypeLoader};
use crate::namespace::{SEPARATOR, canonicalize, resolve_namespaces};
use crate::stamp::WatchedFile;
use crate::version::run_version_command;

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

/// Options for [`TypeRegistry::find_class`] and [`TypeRegistry::find_definition`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LookupOptions {
	/// Treat the name as already fully qualified and skip namespace search.
	pub assume_fqname: bool,
}

impl LookupOptions {
	pub const fn fully_qualified() -> Self {
		Self { assume_fqname: true }
	}
}

type DeclarationMap = FxHashMap<String, Arc<Declaration>>;

/// What the registry already knows about a lookup candidate.
enum Known {
	Found(Arc<Declaration>),
	Absent,
	Unknown,
}

#[derive(Debug, Default)]
struct RegistryState {
	classes: DeclarationMap,
	definitions: DeclarationMap,
	nodes: DeclarationMap,
	/// Nodes in registration order, for pattern matching.
	node_order: Vec<Arc<Declaration>>,
	watched: FxHashMap<PathBuf, Arc<WatchedFile>>,
	/// Fully qualified names the loader has confirmed absent.
	not_found: FxHashSet<String>,
	parse_failed: bool,
}

impl RegistryState {
	fn map(&self, kind: DeclarationKind) -> &DeclarationMap {
		match kind {
			DeclarationKind::Class => &self.classes,
			DeclarationKind::Definition => &self.definitions,
			DeclarationKind::Node => &self.nodes,
		}
	}

	fn lookup(&self, kind: DeclarationKind, name: &str) -> Option<Arc<Declaration>> {
		self.map(kind).get(name).cloned()
	}

	fn dupe_check(&self, existing_kind: DeclarationKind, incoming: &Declaration, name: &str) -> std::result::Result<(), DuplicateDeclaration> {
		let Some(existing) = self.map(existing_kind).get(name) else {
			return Ok(());
		};
		Err(DuplicateDeclaration {
			name: name.to_owned(),
			kind: incoming.kind(),
			existing_kind,
			location: incoming.location.clone(),
			existing_location: existing.location.clone(),
			environment: existing.registry.as_ref().map(|tag| Arc::clone(&tag.environment)),
		})
	}

	fn insert_class(&mut self, mut declaration: Declaration, tag: RegistryTag) -> Result<Arc<Declaration>> {
		let name = declaration.name();
		self.dupe_check(DeclarationKind::Class, &declaration, &name)?;
		self.dupe_check(DeclarationKind::Definition, &declaration, &name)?;

		declaration.registry = Some(tag);
		let declaration = Arc::new(declaration);
		self.classes.insert(name, Arc::clone(&declaration));
		Ok(declaration)
	}

	fn insert_definition(&mut self, mut declaration: Declaration, tag: RegistryTag) -> Result<Arc<Declaration>> {
		let name = declaration.name();
		self.dupe_check(DeclarationKind::Class, &declaration, &name)?;
		self.dupe_check(DeclarationKind::Definition, &declaration, &name)?;

		declaration.registry = Some(tag);
		let declaration = Arc::new(declaration);
		self.definitions.insert(name, Arc::clone(&declaration));
		Ok(declaration)
	}

	fn insert_node(&mut self, mut declaration: Declaration, tag: RegistryTag) -> Result<Arc<Declaration>> {
		let name = declaration.name();
		self.dupe_check(DeclarationKind::Node, &declaration, &name)?;

		declaration.registry = Some(tag);
		let declaration = Arc::new(declaration);
		self.nodes.insert(name, Arc::clone(&declaration));
		self.node_order.push(Arc::clone(&declaration));
		Ok(declaration)
	}
}

/// Registry of compiled declarations for one environment.
///
/// Declarations are handed out as `Arc` snapshots. Reopening a class replaces
/// the stored entry with the merged body; handles obtained earlier keep the
/// body they were created with.
pub struct TypeRegistry {
	tag: RegistryTag,
	config: RegistryConfig,
	loader: Arc<dyn TypeLoader>,
	state: RwLock<RegistryState>,
	/// Names being autoloaded right now, keyed to the loading thread.
	loading: Mutex<FxHashMap<String, ThreadId>>,
	load_done: Condvar,
	version: Mutex<Option<Arc<str>>>,
	created_at: SystemTime,
}

impl TypeRegistry {
	/// Creates a registry that never autoloads.
	pub fn new(config: RegistryConfig) -> Self {
		Self::with_loader(config, Arc::new(NoopLoader))
	}

	pub fn with_loader(config: RegistryConfig, loader: Arc<dyn TypeLoader>) -> Self {
		let tag = RegistryTag {
			id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
			environment: Arc::from(config.environment.as_str()),
		};
		Self {
			tag,
			config,
			loader,
			state: RwLock::new(RegistryState::default()),
			loading: Mutex::new(FxHashMap::default()),
			load_done: Condvar::new(),
			version: Mutex::new(None),
			created_at: SystemTime::now(),
		}
	}

	/// Identity stamped onto every declaration this registry accepts.
	pub fn tag(&self) -> &RegistryTag {
		&self.tag
	}

	pub fn config(&self) -> &RegistryConfig {
		&self.config
	}

	pub fn environment(&self) -> &str {
		&self.tag.environment
	}

	/// Registers a declaration.
	///
	/// Redeclaring an existing class merges the new body into it and returns the
	/// merged class. Every other name collision is a [`DuplicateDeclaration`].
	pub fn add(&self, declaration: Declaration) -> Result<Arc<Declaration>> {
		let mut state = self.state.write();
		self.add_locked(&mut state, declaration)
	}

	fn add_locked(&self, state: &mut RegistryState, mut declaration: Declaration) -> Result<Arc<Declaration>> {
		if let DeclarationBody::Class(incoming) = &mut declaration.body
			&& let Some(existing) = state.classes.get_mut(&incoming.name)
		{
			let incoming = std::mem::take(incoming);
			return self.merge_class(existing, incoming, declaration.location);
		}

		let kind = declaration.kind();
		let tag = self.tag.clone();
		let added = match kind {
			DeclarationKind::Class => state.insert_class(declaration, tag),
			DeclarationKind::Definition => state.insert_definition(declaration, tag),
			DeclarationKind::Node => state.insert_node(declaration, tag),
		}?;
		debug!(environment = %self.tag.environment, %kind, name = %added.name(), "registered declaration");
		Ok(added)
	}

	fn merge_class(&self, existing: &mut Arc<Declaration>, incoming: ClassBody, location: SourceLocation) -> Result<Arc<Declaration>> {
		let name = incoming.name.clone();
		let target = Arc::make_mut(existing);
		let DeclarationBody::Class(class) = &mut target.body else {
			return Err(RegistryError::Merge {
				conflict: MergeConflict::NotAClass { name },
				location,
			});
		};
		class
			.merge(incoming, self.config.freeze_main)
			.map_err(|conflict| RegistryError::Merge { conflict, location })?;

		debug!(environment = %self.tag.environment, class = %name, "merged reopened class");
		Ok(Arc::clone(existing))
	}

	/// Registers every declaration of a parsed unit, in order.
	///
	/// The first failing insertion marks the registry as parse-failed and is
	/// returned; declarations before it stay registered.
	pub fn import_declarations<U>(&self, unit: &U, module: &str) -> Result<Vec<Arc<Declaration>>>
	where
		U: Instantiate + ?Sized,
	{
		let declarations = unit.instantiate(module);
		let mut imported = Vec::with_capacity(declarations.len());
		for declaration in declarations {
			match self.add(declaration) {
				Ok(added) => imported.push(added),
				Err(err) => {
					warn!(environment = %self.tag.environment, module, error = %err, "import failed");
					self.set_parse_failed(true);
					return Err(err);
				}
			}
		}
		Ok(imported)
	}

	/// Direct lookup by canonical name, without namespace search or autoload.
	pub fn get(&self, kind: DeclarationKind, name: &str) -> Option<Arc<Declaration>> {
		self.state.read().lookup(kind, &canonicalize(name))
	}

	/// Resolves a class name as seen from `namespaces`, autoloading on a miss.
	///
	/// `Ok(None)` means the class is undefined; deciding whether that is an
	/// error is left to the caller.
	pub fn find_class<S: AsRef<str>>(&self, namespaces: &[S], name: &str, options: LookupOptions) -> Result<Option<Arc<Declaration>>> {
		self.find_or_load(DeclarationKind::Class, namespaces, name, options)
	}

	/// Resolves a definition name as seen from `namespaces`, autoloading on a miss.
	pub fn find_definition<S: AsRef<str>>(&self, namespaces: &[S], name: &str, options: LookupOptions) -> Result<Option<Arc<Declaration>>> {
		self.find_or_load(DeclarationKind::Definition, namespaces, name, options)
	}

	fn find_or_load<S: AsRef<str>>(
		&self,
		kind: DeclarationKind,
		namespaces: &[S],
		name: &str,
		options: LookupOptions,
	) -> Result<Option<Arc<Declaration>>> {
		let search_space = if options.assume_fqname {
			vec![canonicalize(name.strip_prefix(SEPARATOR).unwrap_or(name))]
		} else {
			resolve_namespaces(namespaces, name)
		};

		for fqname in search_space {
			match self.known(kind, &fqname) {
				Known::Found(found) => return Ok(Some(found)),
				Known::Absent => continue,
				Known::Unknown => {}
			}

			let Some(_slot) = self.claim_load(&fqname) else {
				trace!(%kind, candidate = %fqname, "already loading on this thread; skipping");
				continue;
			};
			// Another thread may have loaded the name while this one waited.
			match self.known(kind, &fqname) {
				Known::Found(found) => return Ok(Some(found)),
				Known::Absent => continue,
				Known::Unknown => {}
			}

			let loaded = self.loader.try_load(self, kind, &fqname)?;
			trace!(%kind, candidate = %fqname, found = loaded.is_some(), "autoload attempt");

			let mut state = self.state.write();
			match loaded {
				Some(found) => {
					state.not_found.remove(&fqname);
					return Ok(Some(found));
				}
				None => {
					state.not_found.insert(fqname);
				}
			}
		}
		Ok(None)
	}

	fn known(&self, kind: DeclarationKind, fqname: &str) -> Known {
		let state = self.state.read();
		if let Some(found) = state.lookup(kind, fqname) {
			return Known::Found(found);
		}
		if state.not_found.contains(fqname) {
			debug!(%kind, name = %fqname, "not attempting to load; missing during a prior lookup");
			return Known::Absent;
		}
		Known::Unknown
	}

	/// Waits until no other thread is loading `fqname`, then marks it as
	/// loading on this thread until the returned slot drops.
	///
	/// Returns `None` when this thread already holds the slot, i.e. the loader
	/// looked the same name up again while loading it.
	fn claim_load(&self, fqname: &str) -> Option<LoadSlot<'_>> {
		let current = std::thread::current().id();
		let mut loading = self.loading.lock();
		loop {
			match loading.get(fqname).copied() {
				None => break,
				Some(owner) if owner == current => return None,
				Some(_) => self.load_done.wait(&mut loading),
			}
		}
		loading.insert(fqname.to_owned(), current);
		Some(LoadSlot {
			registry: self,
			fqname: fqname.to_owned(),
		})
	}

	/// Finds the node for a host name: an exact match first, then the first
	/// registered pattern that matches.
	pub fn find_node(&self, name: &str) -> Option<Arc<Declaration>> {
		let name = canonicalize(name);
		let state = self.state.read();
		if let Some(node) = state.nodes.get(&name)
			&& node.as_node().is_some_and(|selector| !selector.name.is_pattern())
		{
			return Some(Arc::clone(node));
		}
		state
			.node_order
			.iter()
			.find(|node| node.as_node().is_some_and(|selector| selector.name.is_pattern() && selector.name.matches(&name)))
			.cloned()
	}

	/// True if a node is registered under exactly this name; patterns are not consulted.
	pub fn node_exists(&self, name: &str) -> bool {
		self.state.read().nodes.contains_key(&canonicalize(name))
	}

	pub fn has_nodes(&self) -> bool {
		!self.state.read().nodes.is_empty()
	}

	/// Registered classes, sorted by name.
	pub fn classes(&self) -> Vec<Arc<Declaration>> {
		sorted_values(&self.state.read().classes)
	}

	/// Registered definitions, sorted by name.
	pub fn definitions(&self) -> Vec<Arc<Declaration>> {
		sorted_values(&self.state.read().definitions)
	}

	/// Registered nodes, in registration order.
	pub fn nodes(&self) -> Vec<Arc<Declaration>> {
		self.state.read().node_order.clone()
	}

	/// Starts watching `path`, replacing any existing watcher for it.
	///
	/// The watcher records the file's current stamp as its baseline before it
	/// is installed.
	pub fn watch_file(&self, path: impl Into<PathBuf>, always_stale: bool) -> Arc<WatchedFile> {
		let path = path.into();
		let watcher = Arc::new(WatchedFile::new(path.clone(), self.config.file_timeout(), always_stale));
		self.state.write().watched.insert(path, Arc::clone(&watcher));
		watcher
	}

	pub fn is_watching(&self, path: &Path) -> bool {
		self.state.read().watched.contains_key(path)
	}

	/// True if any watched file reports a change.
	pub fn is_stale(&self) -> bool {
		let watched: Vec<Arc<WatchedFile>> = self.state.read().watched.values().cloned().collect();
		watched.iter().any(|file| file.changed())
	}

	/// True if the last parse failed or any watched file changed.
	pub fn requires_recompilation(&self) -> bool {
		self.parse_failed() || self.is_stale()
	}

	pub fn parse_failed(&self) -> bool {
		self.state.read().parse_failed
	}

	pub fn set_parse_failed(&self, failed: bool) {
		self.state.write().parse_failed = failed;
	}

	/// Drops every declaration, watcher, and negative-cache entry and resets
	/// the parse-failed flag, starting a fresh parse pass.
	///
	/// The cached version survives.
	pub fn clear(&self) {
		*self.state.write() = RegistryState::default();
		info!(environment = %self.tag.environment, "cleared type registry");
	}

	/// Returns the registry version, computing it on first use.
	///
	/// With no version command configured this is the registry's creation time
	/// in whole seconds. Failures are not cached.
	pub fn version(&self) -> Result<Arc<str>> {
		let mut cached = self.version.lock();
		if let Some(version) = cached.as_ref() {
			return Ok(Arc::clone(version));
		}

		let command = self.config.config_version.trim();
		let version: Arc<str> = if command.is_empty() {
			let secs = self.created_at.duration_since(UNIX_EPOCH).map_or(0, |elapsed| elapsed.as_secs());
			Arc::from(secs.to_string())
		} else {
			let run = run_version_command(command.to_owned(), self.config.version_timeout());
			let output = keel_worker::block_on(TaskClass::Process, run)
				.map_err(|err| RegistryError::Worker(err.to_string()))?
				.inspect_err(|err| {
					warn!(environment = %self.tag.environment, command, error = %err, "version command failed");
				})?;
			Arc::from(output)
		};

		info!(environment = %self.tag.environment, version = %version, "resolved registry version");
		*cached = Some(Arc::clone(&version));
		Ok(version)
	}

	/// [`Self::requires_recompilation`] on the blocking pool.
	///
	/// A check that cannot be scheduled runs inline; one that panics counts as stale.
	pub async fn requires_recompilation_async(self: &Arc<Self>) -> bool {
		let registry = Arc::clone(self);
		match keel_worker::spawn_blocking(TaskClass::IoBlocking, move || registry.requires_recompilation()) {
			Ok(handle) => handle.await.unwrap_or_else(|err| {
				warn!(environment = %self.tag.environment, error = %err, "staleness check failed; assuming stale");
				true
			}),
			Err(err) => {
				warn!(environment = %self.tag.environment, error = %err, "cannot schedule staleness check; running inline");
				self.requires_recompilation()
			}
		}
	}

	/// [`Self::version`] on the blocking pool.
	pub async fn version_async(self: &Arc<Self>) -> Result<Arc<str>> {
		let registry = Arc::clone(self);
		let handle = keel_worker::spawn_blocking(TaskClass::Process, move || registry.version())
			.map_err(|err| RegistryError::Worker(err.to_string()))?;
		handle.await.map_err(|err| RegistryError::Worker(err.to_string()))?
	}
}

/// Marks a name as being autoloaded; wakes waiters when dropped.
struct LoadSlot<'a> {
	registry: &'a TypeRegistry,
	fqname: String,
}

impl Drop for LoadSlot<'_> {
	fn drop(&mut self) {
		self.registry.loading.lock().remove(&self.fqname);
		self.registry.load_done.notify_all();
	}
}

fn sorted_values(map: &DeclarationMap) -> Vec<Arc<Declaration>> {
	let mut entries: Vec<(&String, &Arc<Declaration>)> = map.iter().collect();
	entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
	entries.into_iter().map(|(_, declaration)| Arc::clone(declaration)).collect()
}

impl fmt::Debug for TypeRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = self.state.read();
		f.debug_struct("TypeRegistry")
			.field("tag", &self.tag)
			.field("classes", &state.classes.len())
			.field("definitions", &state.definitions.len())
			.field("nodes", &state.nodes.len())
			.field("watched", &state.watched.len())
			.field("parse_failed", &state.parse_failed)
			.finish_non_exhaustive()
	}
}

impl fmt::Display for TypeRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let names = |declarations: Vec<Arc<Declaration>>| declarations.iter().map(|declaration| declaration.name()).collect::<Vec<_>>();
		write!(
			f,
			"TypeRegistry({}) {{ classes: {:?}, definitions: {:?}, nodes: {:?} }}",
			self.tag.environment,
			names(self.classes()),
			names(self.definitions()),
			names(self.nodes()),
		)
	}
}
