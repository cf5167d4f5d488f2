//! Namespace resolution.
//!
//! Names are case-insensitive and `::`-separated. A bare name referenced from
//! inside `a::b` is searched as `a::b::name`, then `a::name`, then `name`.

use rustc_hash::FxHashSet;

/// Separator between namespace segments, and the root-qualifier prefix.
pub const SEPARATOR: &str = "::";

/// Lowercases a name for use as a registry key.
pub fn canonicalize(name: &str) -> String {
	name.to_lowercase()
}

/// Produces the ordered, de-duplicated list of fully qualified candidates for
/// `name` as seen from each of `namespaces`.
///
/// A leading `::` bypasses the search and yields the single stripped name. The
/// empty name always refers to the top-level container `""`. An empty
/// namespace list searches from the top level.
pub fn resolve_namespaces<S: AsRef<str>>(namespaces: &[S], name: &str) -> Vec<String> {
	let name = canonicalize(name);
	if let Some(qualified) = name.strip_prefix(SEPARATOR) {
		return vec![qualified.to_owned()];
	}
	if name.is_empty() {
		return vec![String::new()];
	}

	let mut scopes: Vec<String> = namespaces.iter().map(|namespace| canonicalize(namespace.as_ref())).collect();
	if scopes.is_empty() {
		scopes.push(String::new());
	}

	let mut candidates = Vec::new();
	for namespace in &scopes {
		let mut segments: Vec<&str> = namespace.split(SEPARATOR).filter(|segment| !segment.is_empty()).collect();
		while !segments.is_empty() {
			candidates.push(format!("{}{SEPARATOR}{name}", segments.join(SEPARATOR)));
			segments.pop();
		}
		candidates.push(name.clone());
	}

	let mut seen = FxHashSet::default();
	candidates.retain(|candidate| seen.insert(candidate.clone()));
	candidates
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use rstest::rstest;

	use super::*;

	#[rstest]
	#[case::innermost_first(&["a::b"], "c", &["a::b::c", "a::c", "c"])]
	#[case::root_qualified(&["a::b"], "::x", &["x"])]
	#[case::root_qualified_nested(&["a"], "::X::Y", &["x::y"])]
	#[case::empty_name(&["a::b"], "", &[""])]
	#[case::top_level_namespace(&[""], "c", &["c"])]
	#[case::lowercased(&["Foo::Bar"], "Baz", &["foo::bar::baz", "foo::baz", "baz"])]
	#[case::qualified_name(&["a"], "b::c", &["a::b::c", "b::c"])]
	#[case::several_namespaces(&["a::b", "a::d"], "c", &["a::b::c", "a::c", "c", "a::d::c"])]
	#[case::no_namespaces(&[], "c", &["c"])]
	fn candidate_order(#[case] namespaces: &[&str], #[case] name: &str, #[case] expected: &[&str]) {
		assert_eq!(resolve_namespaces(namespaces, name), expected);
	}
}
