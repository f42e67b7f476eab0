// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Role inheritance graphs.
//!
//! Each grouping type (`g`, `g2`, ...) owns one [`DefaultRoleManager`]. Edges
//! `member -> role` live in a per-domain partition so inheritance never crosses tenants.
//! Reachability is an iterative breadth-first walk with a visited set, so cyclic policy
//! data terminates, and `max_hierarchy_level` bounds how many hops are followed.
//! Optional [`MatchingFn`]s let stored role names and domains act as patterns.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::config::DEFAULT_MAX_HIERARCHY_LEVEL;
use crate::model::PolicyRow;

/// Domain used when a query or edge names none.
pub const DEFAULT_DOMAIN: &str = "";

/// Role graph operations used by matcher role predicates and the RBAC API.
pub trait RoleManager: Send + Sync {
	/// Inserts `name1 -> name2`. Returns `false` if the edge already existed.
	fn add_link(&mut self, name1: &str, name2: &str, domain: Option<&str>) -> bool;

	/// Removes `name1 -> name2`. Returns `false` if there was no such edge.
	fn delete_link(&mut self, name1: &str, name2: &str, domain: Option<&str>) -> bool;

	/// Whether `name2` is `name1` or reachable from it.
	fn has_link(&self, name1: &str, name2: &str, domain: Option<&str>) -> bool;

	/// [`RoleManager::has_link`] over several domains; true if any domain links the names.
	fn has_link_in_domains(&self, name1: &str, name2: &str, domains: &[&str]) -> bool {
		if domains.is_empty() {
			return self.has_link(name1, name2, None);
		}
		domains
			.iter()
			.any(|domain| self.has_link(name1, name2, Some(*domain)))
	}

	/// Roles `name` holds directly.
	fn get_roles(&self, name: &str, domain: Option<&str>) -> Vec<String>;

	/// Roles `name` holds directly or through inheritance.
	fn get_implicit_roles(&self, name: &str, domain: Option<&str>) -> Vec<String>;

	/// Direct members of `role`.
	fn get_users(&self, role: &str, domain: Option<&str>) -> Vec<String>;

	/// Everything that reaches `role`.
	fn get_implicit_users(&self, role: &str, domain: Option<&str>) -> Vec<String>;

	/// Drops every edge in every domain.
	fn clear(&mut self);
}

/// Resolves the role manager behind a grouping type during matcher evaluation.
pub trait RoleLookup {
	fn role_manager(&self, ptype: &str) -> Option<&dyn RoleManager>;
}

/// Role managers keyed by grouping type.
pub type RoleManagers = BTreeMap<String, DefaultRoleManager>;

impl RoleLookup for RoleManagers {
	fn role_manager(&self, ptype: &str) -> Option<&dyn RoleManager> {
		self.get(ptype).map(|rm| rm as &dyn RoleManager)
	}
}

/// Decides whether a concrete `name` is covered by a stored `pattern`, for example
/// `keyMatch2("/book/1", "/book/:id")`.
pub type MatchingFn = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;

#[derive(Debug, Clone, Default)]
struct DomainGraph {
	/// member -> roles
	roles: BTreeMap<String, BTreeSet<String>>,
	/// role -> members
	members: BTreeMap<String, BTreeSet<String>>,
}

impl DomainGraph {
	fn is_empty(&self) -> bool {
		self.roles.is_empty()
	}
}

#[derive(Clone, Copy)]
enum Direction {
	/// member -> role
	Up,
	/// role -> member
	Down,
}

impl Direction {
	fn edges(self, graph: &DomainGraph) -> &BTreeMap<String, BTreeSet<String>> {
		match self {
			Direction::Up => &graph.roles,
			Direction::Down => &graph.members,
		}
	}
}

/// Per-domain role graphs.
///
/// With a matching function, stored names act as patterns: a query for `/book/1`
/// follows the edges of every stored name the function says covers it. A domain
/// matching function does the same for domains, so rows stored under a domain pattern
/// such as `*` apply to every domain it covers.
#[derive(Clone)]
pub struct DefaultRoleManager {
	domains: HashMap<String, DomainGraph>,
	max_hierarchy_level: usize,
	matching_fn: Option<MatchingFn>,
	domain_matching_fn: Option<MatchingFn>,
}

impl fmt::Debug for DefaultRoleManager {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DefaultRoleManager")
			.field("domains", &self.domains)
			.field("max_hierarchy_level", &self.max_hierarchy_level)
			.field("matching_fn", &self.matching_fn.is_some())
			.field("domain_matching_fn", &self.domain_matching_fn.is_some())
			.finish()
	}
}

impl Default for DefaultRoleManager {
	fn default() -> Self {
		Self::new(DEFAULT_MAX_HIERARCHY_LEVEL)
	}
}

impl DefaultRoleManager {
	pub fn new(max_hierarchy_level: usize) -> Self {
		Self {
			domains: HashMap::new(),
			max_hierarchy_level,
			matching_fn: None,
			domain_matching_fn: None,
		}
	}

	/// Builds a graph from grouping rows: `[member, role]` or `[member, role, domain]`.
	pub fn from_rows<'a>(
		rows: impl IntoIterator<Item = &'a PolicyRow>,
		max_hierarchy_level: usize,
	) -> Self {
		let mut manager = Self::new(max_hierarchy_level);
		for row in rows {
			manager.add_row(row);
		}
		manager
	}

	/// Adds the edge described by a grouping row. Rows of any other shape are ignored;
	/// role definitions never declare more than three fields.
	pub fn add_row(&mut self, row: &[String]) -> bool {
		match row {
			[member, role] => self.add_link(member, role, None),
			[member, role, domain] => self.add_link(member, role, Some(domain.as_str())),
			_ => false,
		}
	}

	/// Removes the edge described by a grouping row.
	pub fn delete_row(&mut self, row: &[String]) -> bool {
		match row {
			[member, role] => self.delete_link(member, role, None),
			[member, role, domain] => self.delete_link(member, role, Some(domain.as_str())),
			_ => false,
		}
	}

	pub fn max_hierarchy_level(&self) -> usize {
		self.max_hierarchy_level
	}

	/// Treats stored role and member names as patterns for `matching_fn`.
	pub fn set_matching_fn(&mut self, matching_fn: Option<MatchingFn>) {
		self.matching_fn = matching_fn;
	}

	/// Treats stored domains as patterns for `domain_matching_fn`.
	pub fn set_domain_matching_fn(&mut self, domain_matching_fn: Option<MatchingFn>) {
		self.domain_matching_fn = domain_matching_fn;
	}

	pub fn has_matching_fn(&self) -> bool {
		self.matching_fn.is_some()
	}

	pub fn has_domain_matching_fn(&self) -> bool {
		self.domain_matching_fn.is_some()
	}

	/// Domains in which `name` has at least one role, sorted.
	pub fn get_domains(&self, name: &str) -> Vec<String> {
		let mut domains: Vec<String> = self
			.domains
			.iter()
			.filter(|(_, graph)| graph.roles.keys().any(|key| self.name_matches(name, key)))
			.map(|(domain, _)| domain.clone())
			.collect();
		domains.sort_unstable();
		domains
	}

	/// Total number of edges across all domains.
	pub fn link_count(&self) -> usize {
		self
			.domains
			.values()
			.flat_map(|graph| graph.roles.values())
			.map(BTreeSet::len)
			.sum()
	}

	fn name_matches(&self, name: &str, pattern: &str) -> bool {
		name == pattern
			|| self
				.matching_fn
				.as_ref()
				.is_some_and(|matches| matches(name, pattern))
	}

	/// Graphs consulted for a query in `domain`.
	fn graphs(&self, domain: Option<&str>) -> Vec<&DomainGraph> {
		let domain = domain.unwrap_or(DEFAULT_DOMAIN);
		match &self.domain_matching_fn {
			None => self.domains.get(domain).into_iter().collect(),
			Some(matches) => self
				.domains
				.iter()
				.filter(|(stored, _)| stored.as_str() == domain || matches(domain, stored))
				.map(|(_, graph)| graph)
				.collect(),
		}
	}

	/// Names one hop from `name`, across `graphs`.
	fn neighbours<'a>(
		&self,
		graphs: &[&'a DomainGraph],
		direction: Direction,
		name: &str,
	) -> BTreeSet<&'a str> {
		let mut found = BTreeSet::new();
		for graph in graphs {
			let edges = direction.edges(graph);
			match &self.matching_fn {
				None => {
					if let Some(next) = edges.get(name) {
						found.extend(next.iter().map(String::as_str));
					}
				}
				Some(_) => {
					for (key, next) in edges {
						if self.name_matches(name, key) {
							found.extend(next.iter().map(String::as_str));
						}
					}
				}
			}
		}
		found
	}

	/// Breadth-first walk from `start`, calling `visit` for each newly reached node until
	/// it returns `true`. Nodes at depth `max_hierarchy_level` are not expanded.
	fn walk<'a>(
		&self,
		graphs: &[&'a DomainGraph],
		direction: Direction,
		start: &'a str,
		mut visit: impl FnMut(&str) -> bool,
	) -> bool {
		let mut visited: HashSet<&str> = HashSet::new();
		let mut queue: VecDeque<(&str, usize)> = VecDeque::new();
		visited.insert(start);
		queue.push_back((start, 0));

		while let Some((name, depth)) = queue.pop_front() {
			if depth >= self.max_hierarchy_level {
				continue;
			}
			for neighbour in self.neighbours(graphs, direction, name) {
				if visited.insert(neighbour) {
					if visit(neighbour) {
						return true;
					}
					queue.push_back((neighbour, depth + 1));
				}
			}
		}
		false
	}

	fn direct(&self, direction: Direction, name: &str, domain: Option<&str>) -> Vec<String> {
		let graphs = self.graphs(domain);
		self
			.neighbours(&graphs, direction, name)
			.into_iter()
			.map(str::to_string)
			.collect()
	}

	fn reachable(&self, direction: Direction, name: &str, domain: Option<&str>) -> Vec<String> {
		let graphs = self.graphs(domain);
		let mut found = BTreeSet::new();
		self.walk(&graphs, direction, name, |next| {
			found.insert(next.to_string());
			false
		});
		found.into_iter().collect()
	}
}

impl RoleManager for DefaultRoleManager {
	fn add_link(&mut self, name1: &str, name2: &str, domain: Option<&str>) -> bool {
		let domain = domain.unwrap_or(DEFAULT_DOMAIN);
		let graph = self.domains.entry(domain.to_string()).or_default();
		let added = graph
			.roles
			.entry(name1.to_string())
			.or_default()
			.insert(name2.to_string());
		if added {
			graph
				.members
				.entry(name2.to_string())
				.or_default()
				.insert(name1.to_string());
			trace!(member = %name1, role = %name2, domain = %domain, "role link added");
		}
		added
	}

	fn delete_link(&mut self, name1: &str, name2: &str, domain: Option<&str>) -> bool {
		let domain = domain.unwrap_or(DEFAULT_DOMAIN);
		let Some(graph) = self.domains.get_mut(domain) else {
			return false;
		};

		let removed = match graph.roles.get_mut(name1) {
			Some(roles) => {
				let removed = roles.remove(name2);
				if roles.is_empty() {
					graph.roles.remove(name1);
				}
				removed
			}
			None => false,
		};
		if removed {
			if let Some(members) = graph.members.get_mut(name2) {
				members.remove(name1);
				if members.is_empty() {
					graph.members.remove(name2);
				}
			}
			trace!(member = %name1, role = %name2, domain = %domain, "role link deleted");
		}
		if graph.is_empty() {
			self.domains.remove(domain);
		}
		removed
	}

	fn has_link(&self, name1: &str, name2: &str, domain: Option<&str>) -> bool {
		if self.name_matches(name1, name2) {
			return true;
		}
		let graphs = self.graphs(domain);
		if graphs.is_empty() {
			return false;
		}
		self.walk(&graphs, Direction::Up, name1, |role| {
			self.name_matches(role, name2)
		})
	}

	fn get_roles(&self, name: &str, domain: Option<&str>) -> Vec<String> {
		self.direct(Direction::Up, name, domain)
	}

	fn get_implicit_roles(&self, name: &str, domain: Option<&str>) -> Vec<String> {
		self.reachable(Direction::Up, name, domain)
	}

	fn get_users(&self, role: &str, domain: Option<&str>) -> Vec<String> {
		self.direct(Direction::Down, role, domain)
	}

	fn get_implicit_users(&self, role: &str, domain: Option<&str>) -> Vec<String> {
		self.reachable(Direction::Down, role, domain)
	}

	fn clear(&mut self) {
		self.domains.clear();
	}
}
