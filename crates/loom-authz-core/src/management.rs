// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Policy and role management on [`Enforcer`].
//!
//! The unnamed forms act on `p` and `g`; the `named` forms take a policy type. Batch
//! forms validate every row before storing any of them. Adding an existing row or
//! removing a missing one is a no-op that reports `false`.

use std::collections::HashSet;

use tracing::debug;

use crate::enforcer::Enforcer;
use crate::error::{PolicyError, Result};
use crate::model::{PolicyRow, Section};
use crate::rbac::RoleManager;

fn to_row<I, S>(values: I) -> PolicyRow
where
	I: IntoIterator<Item = S>,
	S: Into<String>,
{
	values.into_iter().map(Into::into).collect()
}

fn to_rows<R, I, S>(rows: R) -> Vec<PolicyRow>
where
	R: IntoIterator<Item = I>,
	I: IntoIterator<Item = S>,
	S: Into<String>,
{
	rows.into_iter().map(to_row).collect()
}

fn to_values<I, S>(values: I) -> Vec<String>
where
	I: IntoIterator<Item = S>,
	S: Into<String>,
{
	values.into_iter().map(Into::into).collect()
}

impl Enforcer {
	fn expect_section(&self, ptype: &str, section: Section) -> Result<()> {
		if self.model.section_of(ptype) == Some(section) {
			Ok(())
		} else {
			Err(PolicyError::UnknownPolicyType(ptype.to_string()).into())
		}
	}

	fn rows_of(&self, ptype: &str, section: Section) -> Vec<PolicyRow> {
		if self.model.section_of(ptype) != Some(section) {
			return Vec::new();
		}
		self
			.model
			.rows(ptype)
			.map(|rows| rows.to_vec())
			.unwrap_or_default()
	}

	// Row-level primitives. These are what the concurrent wrapper drives: validation and
	// dedupe run under a shared lock, the mutation under an exclusive one.

	/// Validates `rows` against `ptype` and returns those not yet stored, deduplicated.
	pub fn missing_rules(&self, ptype: &str, rows: &[PolicyRow]) -> Result<Vec<PolicyRow>> {
		let mut seen = HashSet::new();
		let mut missing = Vec::new();
		for row in rows {
			self.model.check_row(ptype, row)?;
			if !self.model.has_row(ptype, row) && seen.insert(row.clone()) {
				missing.push(row.clone());
			}
		}
		Ok(missing)
	}

	/// Returns the subset of `rows` currently stored under `ptype`, deduplicated.
	pub fn present_rules(&self, ptype: &str, rows: &[PolicyRow]) -> Result<Vec<PolicyRow>> {
		if self.model.section_of(ptype).is_none() {
			return Err(PolicyError::UnknownPolicyType(ptype.to_string()).into());
		}
		let mut seen = HashSet::new();
		Ok(rows
			.iter()
			.filter(|row| self.model.has_row(ptype, row) && seen.insert((*row).clone()))
			.cloned()
			.collect())
	}

	/// Rows of `ptype` matching a field filter; empty values match anything.
	pub fn filtered_rules(
		&self,
		ptype: &str,
		field_index: usize,
		values: &[String],
	) -> Result<Vec<PolicyRow>> {
		Ok(self.model.filtered_rows(ptype, field_index, values)?)
	}

	/// Stores rows and updates role graphs when `ptype` is a grouping type.
	/// Returns the rows that were actually added.
	pub fn add_rules(&mut self, ptype: &str, rows: Vec<PolicyRow>) -> Result<Vec<PolicyRow>> {
		let added = self.model.add_rows(ptype, rows)?;
		self.link_rows(ptype, &added, true);
		if !added.is_empty() {
			self.touch();
			debug!(ptype = %ptype, count = added.len(), "rules added");
		}
		Ok(added)
	}

	/// Removes rows, returning those that were present.
	pub fn remove_rules(&mut self, ptype: &str, rows: &[PolicyRow]) -> Result<Vec<PolicyRow>> {
		let removed = self.model.remove_rows(ptype, rows)?;
		self.link_rows(ptype, &removed, false);
		if !removed.is_empty() {
			self.touch();
			debug!(ptype = %ptype, count = removed.len(), "rules removed");
		}
		Ok(removed)
	}

	/// Removes every row matching a field filter, returning them.
	pub fn remove_filtered_rules(
		&mut self,
		ptype: &str,
		field_index: usize,
		values: &[String],
	) -> Result<Vec<PolicyRow>> {
		let removed = self.model.remove_filtered_rows(ptype, field_index, values)?;
		self.link_rows(ptype, &removed, false);
		if !removed.is_empty() {
			self.touch();
			debug!(ptype = %ptype, count = removed.len(), field_index, "filtered rules removed");
		}
		Ok(removed)
	}

	fn link_rows(&mut self, ptype: &str, rows: &[PolicyRow], add: bool) {
		if !self.config.auto_build_role_links || rows.is_empty() {
			return;
		}
		let Some(manager) = self.role_managers.get_mut(ptype) else {
			return;
		};
		for row in rows {
			if add {
				manager.add_row(row);
			} else {
				manager.delete_row(row);
			}
		}
	}

	/// Rebuilds every role graph from the stored grouping rows.
	pub fn build_role_links(&mut self) {
		self.role_managers = self.role_managers_for(&self.model);
		self.touch();
		debug!(graphs = self.role_managers.len(), "role links rebuilt");
	}

	/// Drops every policy and grouping row and every role link.
	pub fn clear_policy(&mut self) {
		self.model.clear_policy();
		for manager in self.role_managers.values_mut() {
			manager.clear();
		}
		self.touch();
	}

	// Policy queries.

	pub fn get_policy(&self) -> Vec<PolicyRow> {
		self.rows_of("p", Section::Policy)
	}

	pub fn get_named_policy(&self, ptype: &str) -> Vec<PolicyRow> {
		self.rows_of(ptype, Section::Policy)
	}

	pub fn get_filtered_policy<I, S>(&self, field_index: usize, values: I) -> Result<Vec<PolicyRow>>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.get_filtered_named_policy("p", field_index, values)
	}

	pub fn get_filtered_named_policy<I, S>(
		&self,
		ptype: &str,
		field_index: usize,
		values: I,
	) -> Result<Vec<PolicyRow>>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.expect_section(ptype, Section::Policy)?;
		self.filtered_rules(ptype, field_index, &to_values(values))
	}

	pub fn has_policy<I, S>(&self, row: I) -> bool
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.has_named_policy("p", row)
	}

	pub fn has_named_policy<I, S>(&self, ptype: &str, row: I) -> bool
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.model.section_of(ptype) == Some(Section::Policy) && self.model.has_row(ptype, &to_row(row))
	}

	// Policy edits.

	pub fn add_policy<I, S>(&mut self, row: I) -> Result<bool>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.add_named_policy("p", row)
	}

	pub fn add_named_policy<I, S>(&mut self, ptype: &str, row: I) -> Result<bool>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.expect_section(ptype, Section::Policy)?;
		Ok(!self.add_rules(ptype, vec![to_row(row)])?.is_empty())
	}

	/// Adds rows as a unit. Returns `true` if at least one row was new.
	pub fn add_policies<R, I, S>(&mut self, rows: R) -> Result<bool>
	where
		R: IntoIterator<Item = I>,
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.add_named_policies("p", rows)
	}

	pub fn add_named_policies<R, I, S>(&mut self, ptype: &str, rows: R) -> Result<bool>
	where
		R: IntoIterator<Item = I>,
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.expect_section(ptype, Section::Policy)?;
		Ok(!self.add_rules(ptype, to_rows(rows))?.is_empty())
	}

	pub fn remove_policy<I, S>(&mut self, row: I) -> Result<bool>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.remove_named_policy("p", row)
	}

	pub fn remove_named_policy<I, S>(&mut self, ptype: &str, row: I) -> Result<bool>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.expect_section(ptype, Section::Policy)?;
		Ok(!self.remove_rules(ptype, &[to_row(row)])?.is_empty())
	}

	/// Removes rows. Returns `true` if at least one row was present.
	pub fn remove_policies<R, I, S>(&mut self, rows: R) -> Result<bool>
	where
		R: IntoIterator<Item = I>,
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.remove_named_policies("p", rows)
	}

	pub fn remove_named_policies<R, I, S>(&mut self, ptype: &str, rows: R) -> Result<bool>
	where
		R: IntoIterator<Item = I>,
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.expect_section(ptype, Section::Policy)?;
		Ok(!self.remove_rules(ptype, &to_rows(rows))?.is_empty())
	}

	pub fn remove_filtered_policy<I, S>(&mut self, field_index: usize, values: I) -> Result<bool>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.remove_filtered_named_policy("p", field_index, values)
	}

	pub fn remove_filtered_named_policy<I, S>(
		&mut self,
		ptype: &str,
		field_index: usize,
		values: I,
	) -> Result<bool>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.expect_section(ptype, Section::Policy)?;
		Ok(!self
			.remove_filtered_rules(ptype, field_index, &to_values(values))?
			.is_empty())
	}

	// Grouping queries and edits.

	pub fn get_grouping_policy(&self) -> Vec<PolicyRow> {
		self.rows_of("g", Section::Role)
	}

	pub fn get_named_grouping_policy(&self, ptype: &str) -> Vec<PolicyRow> {
		self.rows_of(ptype, Section::Role)
	}

	pub fn get_filtered_grouping_policy<I, S>(
		&self,
		field_index: usize,
		values: I,
	) -> Result<Vec<PolicyRow>>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.get_filtered_named_grouping_policy("g", field_index, values)
	}

	pub fn get_filtered_named_grouping_policy<I, S>(
		&self,
		ptype: &str,
		field_index: usize,
		values: I,
	) -> Result<Vec<PolicyRow>>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.expect_section(ptype, Section::Role)?;
		self.filtered_rules(ptype, field_index, &to_values(values))
	}

	pub fn has_grouping_policy<I, S>(&self, row: I) -> bool
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.has_named_grouping_policy("g", row)
	}

	pub fn has_named_grouping_policy<I, S>(&self, ptype: &str, row: I) -> bool
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.model.section_of(ptype) == Some(Section::Role) && self.model.has_row(ptype, &to_row(row))
	}

	pub fn add_grouping_policy<I, S>(&mut self, row: I) -> Result<bool>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.add_named_grouping_policy("g", row)
	}

	pub fn add_named_grouping_policy<I, S>(&mut self, ptype: &str, row: I) -> Result<bool>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.expect_section(ptype, Section::Role)?;
		Ok(!self.add_rules(ptype, vec![to_row(row)])?.is_empty())
	}

	pub fn add_grouping_policies<R, I, S>(&mut self, rows: R) -> Result<bool>
	where
		R: IntoIterator<Item = I>,
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.add_named_grouping_policies("g", rows)
	}

	pub fn add_named_grouping_policies<R, I, S>(&mut self, ptype: &str, rows: R) -> Result<bool>
	where
		R: IntoIterator<Item = I>,
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.expect_section(ptype, Section::Role)?;
		Ok(!self.add_rules(ptype, to_rows(rows))?.is_empty())
	}

	pub fn remove_grouping_policy<I, S>(&mut self, row: I) -> Result<bool>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.remove_named_grouping_policy("g", row)
	}

	pub fn remove_named_grouping_policy<I, S>(&mut self, ptype: &str, row: I) -> Result<bool>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.expect_section(ptype, Section::Role)?;
		Ok(!self.remove_rules(ptype, &[to_row(row)])?.is_empty())
	}

	pub fn remove_grouping_policies<R, I, S>(&mut self, rows: R) -> Result<bool>
	where
		R: IntoIterator<Item = I>,
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.remove_named_grouping_policies("g", rows)
	}

	pub fn remove_named_grouping_policies<R, I, S>(&mut self, ptype: &str, rows: R) -> Result<bool>
	where
		R: IntoIterator<Item = I>,
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.expect_section(ptype, Section::Role)?;
		Ok(!self.remove_rules(ptype, &to_rows(rows))?.is_empty())
	}

	pub fn remove_filtered_grouping_policy<I, S>(
		&mut self,
		field_index: usize,
		values: I,
	) -> Result<bool>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.remove_filtered_named_grouping_policy("g", field_index, values)
	}

	pub fn remove_filtered_named_grouping_policy<I, S>(
		&mut self,
		ptype: &str,
		field_index: usize,
		values: I,
	) -> Result<bool>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.expect_section(ptype, Section::Role)?;
		Ok(!self
			.remove_filtered_rules(ptype, field_index, &to_values(values))?
			.is_empty())
	}

	// RBAC API over `g`. Queries against a model without `g` return nothing.

	pub fn get_roles_for_user(&self, name: &str, domain: Option<&str>) -> Vec<String> {
		self
			.role_managers
			.get("g")
			.map(|rm| rm.get_roles(name, domain))
			.unwrap_or_default()
	}

	pub fn get_implicit_roles_for_user(&self, name: &str, domain: Option<&str>) -> Vec<String> {
		self
			.role_managers
			.get("g")
			.map(|rm| rm.get_implicit_roles(name, domain))
			.unwrap_or_default()
	}

	pub fn get_users_for_role(&self, role: &str, domain: Option<&str>) -> Vec<String> {
		self
			.role_managers
			.get("g")
			.map(|rm| rm.get_users(role, domain))
			.unwrap_or_default()
	}

	pub fn get_implicit_users_for_role(&self, role: &str, domain: Option<&str>) -> Vec<String> {
		self
			.role_managers
			.get("g")
			.map(|rm| rm.get_implicit_users(role, domain))
			.unwrap_or_default()
	}

	/// Whether `name` holds `role` directly.
	pub fn has_role_for_user(&self, name: &str, role: &str, domain: Option<&str>) -> bool {
		self
			.get_roles_for_user(name, domain)
			.iter()
			.any(|r| r == role)
	}

	pub fn add_role_for_user(&mut self, user: &str, role: &str, domain: Option<&str>) -> Result<bool> {
		self.add_grouping_policy(grouping_row(user, role, domain))
	}

	pub fn delete_role_for_user(
		&mut self,
		user: &str,
		role: &str,
		domain: Option<&str>,
	) -> Result<bool> {
		self.remove_grouping_policy(grouping_row(user, role, domain))
	}

	/// Removes every role `user` holds, in `domain` when given.
	pub fn delete_roles_for_user(&mut self, user: &str, domain: Option<&str>) -> Result<bool> {
		match domain {
			Some(domain) => self.remove_filtered_grouping_policy(0, [user, "", domain]),
			None => self.remove_filtered_grouping_policy(0, [user]),
		}
	}

	/// Policy rows whose subject is `user`.
	pub fn get_permissions_for_user(&self, user: &str) -> Vec<PolicyRow> {
		self
			.get_policy()
			.into_iter()
			.filter(|row| row.first().map(String::as_str) == Some(user))
			.collect()
	}

	/// Policy rows granted to `user` or any role it inherits.
	///
	/// With a domain, roles are resolved in that domain and only rows whose second field
	/// equals it are returned (the `p = sub, dom, obj, act` layout).
	pub fn get_implicit_permissions_for_user(
		&self,
		user: &str,
		domain: Option<&str>,
	) -> Vec<PolicyRow> {
		let mut subjects: HashSet<String> = self
			.get_implicit_roles_for_user(user, domain)
			.into_iter()
			.collect();
		subjects.insert(user.to_string());

		self
			.get_policy()
			.into_iter()
			.filter(|row| row.first().is_some_and(|sub| subjects.contains(sub)))
			.filter(|row| match domain {
				Some(domain) => row.get(1).map(String::as_str) == Some(domain),
				None => true,
			})
			.collect()
	}
}

fn grouping_row(user: &str, role: &str, domain: Option<&str>) -> PolicyRow {
	let mut row = vec![user.to_string(), role.to_string()];
	if let Some(domain) = domain {
		row.push(domain.to_string());
	}
	row
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::EnforcerConfig;
	use crate::error::AuthzError;
	use crate::model::PolicySet;
	use proptest::prelude::*;

	const RBAC_MODEL: &str = r#"
[request_definition]
r = sub, obj, act

[policy_definition]
p = sub, obj, act
p2 = sub, act

[role_definition]
g = _, _
g2 = _, _

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act
"#;

	const DOMAIN_MODEL: &str = r#"
[request_definition]
r = sub, dom, obj, act

[policy_definition]
p = sub, dom, obj, act

[role_definition]
g = _, _, _

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = g(r.sub, p.sub, r.dom) && r.dom == p.dom && r.obj == p.obj && r.act == p.act
"#;

	fn enforcer() -> Enforcer {
		Enforcer::from_text(RBAC_MODEL, EnforcerConfig::default()).unwrap()
	}

	#[test]
	fn add_policy_is_idempotent() {
		let mut e = enforcer();
		assert!(e.add_policy(["alice", "data1", "read"]).unwrap());
		assert!(!e.add_policy(["alice", "data1", "read"]).unwrap());
		assert_eq!(e.get_policy().len(), 1);
		assert!(e.has_policy(["alice", "data1", "read"]));
	}

	#[test]
	fn arity_mismatch_rejects_call() {
		let mut e = enforcer();
		assert!(matches!(
			e.add_policy(["alice", "data1"]),
			Err(AuthzError::Policy(PolicyError::Arity { .. }))
		));
	}

	#[test]
	fn named_policy_types_are_checked() {
		let mut e = enforcer();
		assert!(e.add_named_policy("p2", ["alice", "read"]).unwrap());
		assert_eq!(e.get_named_policy("p2").len(), 1);
		assert!(e.get_policy().is_empty());
		assert!(matches!(
			e.add_named_policy("g", ["alice", "admin"]),
			Err(AuthzError::Policy(PolicyError::UnknownPolicyType(_)))
		));
		assert!(matches!(
			e.add_named_grouping_policy("p", ["alice", "admin", "x"]),
			Err(AuthzError::Policy(PolicyError::UnknownPolicyType(_)))
		));
		assert!(e.get_named_policy("p9").is_empty());
	}

	#[test]
	fn batch_add_is_all_or_nothing() {
		let mut e = enforcer();
		let err = e
			.add_policies(vec![vec!["a", "d", "read"], vec!["b", "d"]])
			.unwrap_err();
		assert!(matches!(err, AuthzError::Policy(PolicyError::Arity { .. })));
		assert!(e.get_policy().is_empty());

		assert!(e
			.add_policies(vec![vec!["a", "d", "read"], vec!["b", "d", "read"]])
			.unwrap());
		assert!(!e.add_policies(vec![vec!["a", "d", "read"]]).unwrap());
		assert!(e
			.remove_policies(vec![vec!["a", "d", "read"], vec!["z", "z", "z"]])
			.unwrap());
		assert_eq!(e.get_policy(), vec![vec!["b", "d", "read"]]);
	}

	#[test]
	fn filtered_queries_and_removal() {
		let mut e = enforcer();
		e.add_policies(vec![
			vec!["alice", "data1", "read"],
			vec!["alice", "data2", "write"],
			vec!["bob", "data1", "read"],
		])
		.unwrap();

		assert_eq!(e.get_filtered_policy(0, ["alice"]).unwrap().len(), 2);
		assert_eq!(e.get_filtered_policy(1, ["data1", "read"]).unwrap().len(), 2);
		assert!(e.get_filtered_policy(2, ["read", "x"]).is_err());

		assert!(e.remove_filtered_policy(0, ["alice"]).unwrap());
		assert!(!e.remove_filtered_policy(0, ["alice"]).unwrap());
		assert_eq!(e.get_policy(), vec![vec!["bob", "data1", "read"]]);
	}

	#[test]
	fn grouping_edits_update_role_graph() {
		let mut e = enforcer();
		e.add_policy(["admin", "data1", "read"]).unwrap();
		assert!(e.add_grouping_policy(["alice", "admin"]).unwrap());
		assert!(e.enforce(&["alice", "data1", "read"]).unwrap());
		assert!(e.has_grouping_policy(["alice", "admin"]));

		assert!(e.remove_grouping_policy(["alice", "admin"]).unwrap());
		assert!(!e.enforce(&["alice", "data1", "read"]).unwrap());

		e.add_named_grouping_policy("g2", ["x", "y"]).unwrap();
		assert_eq!(e.get_named_grouping_policy("g2").len(), 1);
		assert!(e.role_manager("g2").unwrap().has_link("x", "y", None));
	}

	#[test]
	fn manual_role_links_when_auto_build_is_off() {
		let config = EnforcerConfig::default().with_auto_build_role_links(false);
		let mut e = Enforcer::from_text(RBAC_MODEL, config).unwrap();
		e.add_policy(["admin", "data1", "read"]).unwrap();
		e.add_grouping_policy(["alice", "admin"]).unwrap();
		assert!(!e.enforce(&["alice", "data1", "read"]).unwrap());

		e.build_role_links();
		assert!(e.enforce(&["alice", "data1", "read"]).unwrap());
	}

	#[test]
	fn rbac_queries() {
		let mut e = enforcer();
		e.add_role_for_user("alice", "admin", None).unwrap();
		e.add_role_for_user("admin", "staff", None).unwrap();
		e.add_role_for_user("bob", "staff", None).unwrap();
		e.add_policies(vec![
			vec!["alice", "data1", "read"],
			vec!["admin", "data2", "write"],
			vec!["staff", "data3", "read"],
		])
		.unwrap();

		assert_eq!(e.get_roles_for_user("alice", None), vec!["admin"]);
		assert_eq!(
			e.get_implicit_roles_for_user("alice", None),
			vec!["admin", "staff"]
		);
		assert_eq!(e.get_users_for_role("staff", None), vec!["admin", "bob"]);
		assert_eq!(
			e.get_implicit_users_for_role("staff", None),
			vec!["admin", "alice", "bob"]
		);
		assert!(e.has_role_for_user("alice", "admin", None));
		assert!(!e.has_role_for_user("alice", "staff", None));

		assert_eq!(
			e.get_permissions_for_user("alice"),
			vec![vec!["alice", "data1", "read"]]
		);
		assert_eq!(e.get_implicit_permissions_for_user("alice", None).len(), 3);

		assert!(e.delete_role_for_user("alice", "admin", None).unwrap());
		assert!(!e.delete_role_for_user("alice", "admin", None).unwrap());
		assert!(e.get_roles_for_user("alice", None).is_empty());

		assert!(e.delete_roles_for_user("bob", None).unwrap());
		assert!(e.get_users_for_role("staff", None) == vec!["admin"]);
	}

	#[test]
	fn domain_scoped_roles() {
		let mut e = Enforcer::from_text(DOMAIN_MODEL, EnforcerConfig::default()).unwrap();
		e.add_policy(["admin", "tenant1", "data1", "read"]).unwrap();
		e.add_policy(["admin", "tenant2", "data2", "read"]).unwrap();
		e.add_role_for_user("alice", "admin", Some("tenant1")).unwrap();

		assert!(e.enforce(&["alice", "tenant1", "data1", "read"]).unwrap());
		assert!(!e.enforce(&["alice", "tenant2", "data2", "read"]).unwrap());
		assert_eq!(
			e.get_implicit_permissions_for_user("alice", Some("tenant1")),
			vec![vec!["admin", "tenant1", "data1", "read"]]
		);
		assert!(e.get_roles_for_user("alice", Some("tenant2")).is_empty());

		assert!(e.delete_roles_for_user("alice", Some("tenant1")).unwrap());
		assert!(!e.enforce(&["alice", "tenant1", "data1", "read"]).unwrap());
	}

	#[test]
	fn clear_policy_drops_rows_and_links() {
		let mut e = enforcer();
		e.load_policy_set(
			&PolicySet::new()
				.with_rule("p", ["admin", "data1", "read"])
				.with_rule("g", ["alice", "admin"]),
		)
		.unwrap();
		assert!(e.enforce(&["alice", "data1", "read"]).unwrap());
		e.clear_policy();
		assert!(e.get_policy().is_empty());
		assert!(e.get_grouping_policy().is_empty());
		assert!(e.get_roles_for_user("alice", None).is_empty());
	}

	#[test]
	fn low_level_helpers_dedupe() {
		let mut e = enforcer();
		e.add_policy(["a", "b", "c"]).unwrap();
		let rows = vec![
			vec!["a".to_string(), "b".to_string(), "c".to_string()],
			vec!["x".to_string(), "y".to_string(), "z".to_string()],
			vec!["x".to_string(), "y".to_string(), "z".to_string()],
		];
		assert_eq!(e.missing_rules("p", &rows).unwrap(), vec![rows[1].clone()]);
		assert_eq!(e.present_rules("p", &rows).unwrap(), vec![rows[0].clone()]);
		assert!(e.present_rules("q", &rows).is_err());
	}

	proptest! {
		#[test]
		fn repeated_adds_keep_one_row(times in 1usize..8, sub in "[a-z]{1,6}") {
			let mut e = enforcer();
			for _ in 0..times {
				e.add_policy([sub.as_str(), "data", "read"]).unwrap();
			}
			prop_assert_eq!(e.get_policy().len(), 1);
		}
	}
}
