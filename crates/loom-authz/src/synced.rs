// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Concurrent enforcer with persistence and hot reload.
//!
//! All state lives behind one `RwLock<Enforcer>`. Decisions take the read lock for the
//! duration of the call and never wait on I/O. Writers first take an async gate that
//! serializes them (and the reload task) against each other, do their validation and
//! adapter I/O while readers keep running, and only then take the write lock for the
//! in-memory change. A reload builds its snapshot off to the side and swaps it in under
//! the write lock, so a decision sees either the old policy or the new one, never a mix.

use std::sync::Arc;
use std::time::Duration;

use loom_authz_core::{
	Arity, Decision, EnforceContext, Enforcer, EvalError, Model, PolicyError, PolicyRow,
	PolicySet, Section,
};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::adapter::Adapter;
use crate::cached::CachedEnforcer;
use crate::config::AuthzConfig;
use crate::error::{AdapterError, ConfigError, Error, Result};
use crate::reload::ReloadHandle;
use crate::watcher::{PolicyChange, Watcher};

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

fn grouping_row(user: &str, role: &str, domain: Option<&str>) -> PolicyRow {
	let mut row = vec![user.to_string(), role.to_string()];
	if let Some(domain) = domain {
		row.push(domain.to_string());
	}
	row
}

fn expect_section(enforcer: &Enforcer, ptype: &str, section: Section) -> Result<()> {
	if enforcer.model().section_of(ptype) == Some(section) {
		Ok(())
	} else {
		Err(Error::Authz(
			PolicyError::UnknownPolicyType(ptype.to_string()).into(),
		))
	}
}

/// Incremental persistence treats an unsupported operation as nothing to do.
fn skip_unsupported(result: std::result::Result<(), AdapterError>) -> Result<()> {
	match result {
		Err(AdapterError::Unsupported(op)) => {
			debug!(operation = op, "adapter does not persist incremental edits, skipping");
			Ok(())
		}
		other => Ok(other?),
	}
}

pub(crate) struct Inner {
	enforcer: RwLock<Enforcer>,
	write_gate: tokio::sync::Mutex<()>,
	adapter: Option<Arc<dyn Adapter>>,
	watcher: Option<Arc<dyn Watcher>>,
	auto_save: bool,
	reload: Mutex<Option<ReloadHandle>>,
}

impl Inner {
	fn persisting_adapter(&self) -> Option<&Arc<dyn Adapter>> {
		if self.auto_save {
			self.adapter.as_ref()
		} else {
			None
		}
	}

	fn notify(&self, change: PolicyChange) {
		if let Some(watcher) = &self.watcher {
			watcher.update(&change);
		}
	}

	/// Replaces every row from the adapter. Returns `false` without swapping when
	/// `cancelled` reports true after loading.
	#[instrument(level = "debug", skip_all)]
	pub(crate) async fn reload<F>(&self, cancelled: F) -> Result<bool>
	where
		F: Fn() -> bool,
	{
		let _gate = self.write_gate.lock().await;
		let adapter = self.adapter.as_ref().ok_or(Error::NoAdapter)?;
		let policy = adapter.load_policy().await?;

		let snapshot = self.enforcer.read().build_snapshot(&policy)?;
		if cancelled() {
			return Ok(false);
		}

		let rows = snapshot.len();
		self.enforcer.write().install_snapshot(snapshot);
		info!(rows, "policy loaded");
		Ok(true)
	}
}

/// Builder for [`SyncedEnforcer`].
pub struct SyncedEnforcerBuilder {
	model: Model,
	config: AuthzConfig,
	adapter: Option<Arc<dyn Adapter>>,
	watcher: Option<Arc<dyn Watcher>>,
}

impl SyncedEnforcerBuilder {
	pub fn config(mut self, config: AuthzConfig) -> Self {
		self.config = config;
		self
	}

	pub fn adapter(mut self, adapter: Arc<dyn Adapter>) -> Self {
		self.adapter = Some(adapter);
		self
	}

	pub fn watcher(mut self, watcher: Arc<dyn Watcher>) -> Self {
		self.watcher = Some(watcher);
		self
	}

	/// Compiles the model, loads the adapter's policy when there is an adapter, and
	/// starts auto-reload when configured.
	pub async fn build(self) -> Result<SyncedEnforcer> {
		let mut enforcer = Enforcer::new(self.model, self.config.enforcer.clone())?;
		if let Some(adapter) = &self.adapter {
			let policy = adapter.load_policy().await?;
			enforcer.load_policy_set(&policy)?;
		}

		let synced = SyncedEnforcer {
			inner: Arc::new(Inner {
				enforcer: RwLock::new(enforcer),
				write_gate: tokio::sync::Mutex::new(()),
				adapter: self.adapter,
				watcher: self.watcher,
				auto_save: self.config.auto_save,
				reload: Mutex::new(None),
			}),
		};

		if let Some(interval) = self.config.auto_reload_interval {
			synced.start_auto_reload(interval).await?;
		}
		Ok(synced)
	}

	/// [`SyncedEnforcerBuilder::build`], wrapped in a decision cache sized by the
	/// config's `cache` settings.
	pub async fn build_cached(self) -> Result<CachedEnforcer> {
		let cache = self.config.cache;
		Ok(CachedEnforcer::new(self.build().await?, cache))
	}
}

/// A shareable enforcer. Clones refer to the same state.
#[derive(Clone)]
pub struct SyncedEnforcer {
	inner: Arc<Inner>,
}

impl std::fmt::Debug for SyncedEnforcer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SyncedEnforcer")
			.field("has_adapter", &self.inner.adapter.is_some())
			.field("has_watcher", &self.inner.watcher.is_some())
			.field("auto_save", &self.inner.auto_save)
			.field("auto_reloading", &self.is_auto_reloading())
			.finish()
	}
}

impl SyncedEnforcer {
	pub fn builder(model: Model) -> SyncedEnforcerBuilder {
		SyncedEnforcerBuilder {
			model,
			config: AuthzConfig::default(),
			adapter: None,
			watcher: None,
		}
	}

	/// Wraps an existing enforcer without storage or notifications.
	pub fn new(enforcer: Enforcer) -> Self {
		Self {
			inner: Arc::new(Inner {
				enforcer: RwLock::new(enforcer),
				write_gate: tokio::sync::Mutex::new(()),
				adapter: None,
				watcher: None,
				auto_save: false,
				reload: Mutex::new(None),
			}),
		}
	}

	/// Runs `f` against one consistent view of the policy.
	pub fn read<R>(&self, f: impl FnOnce(&Enforcer) -> R) -> R {
		f(&self.inner.enforcer.read())
	}

	// Decisions.

	pub fn enforce<V>(&self, request: &[V]) -> Result<bool>
	where
		V: Clone + Into<Value>,
	{
		Ok(self.inner.enforcer.read().enforce(request)?)
	}

	pub fn enforce_ex<V>(&self, request: &[V]) -> Result<Decision>
	where
		V: Clone + Into<Value>,
	{
		Ok(self.inner.enforcer.read().enforce_ex(request)?)
	}

	pub fn enforce_with_matcher<V>(&self, matcher: &str, request: &[V]) -> Result<Decision>
	where
		V: Clone + Into<Value>,
	{
		Ok(self
			.inner
			.enforcer
			.read()
			.enforce_with_matcher(matcher, request)?)
	}

	/// Decides a request with the definitions named by `context`.
	pub fn enforce_with_context<V>(&self, context: &EnforceContext, request: &[V]) -> Result<Decision>
	where
		V: Clone + Into<Value>,
	{
		Ok(self
			.inner
			.enforcer
			.read()
			.enforce_with_context(context, request)?)
	}

	pub fn batch_enforce<R, V>(&self, requests: &[R]) -> Result<Vec<bool>>
	where
		R: AsRef<[V]>,
		V: Clone + Into<Value>,
	{
		Ok(self.inner.enforcer.read().batch_enforce(requests)?)
	}

	/// Fail-closed decision: any evaluation error is logged and denied.
	pub fn is_allowed<V>(&self, request: &[V]) -> bool
	where
		V: Clone + Into<Value>,
	{
		match self.enforce(request) {
			Ok(allowed) => allowed,
			Err(e) => {
				warn!(error = %e, "authorization check failed, denying");
				false
			}
		}
	}

	/// Registers a matcher function and recompiles the matcher.
	pub fn add_function<F>(&self, name: &str, arity: Arity, func: F) -> Result<()>
	where
		F: Fn(&[Value]) -> std::result::Result<Value, EvalError> + Send + Sync + 'static,
	{
		Ok(self.inner.enforcer.write().add_function(name, arity, func)?)
	}

	/// Treats stored names of grouping type `ptype` as patterns matched by `matches`.
	pub fn add_named_matching_fn<F>(&self, ptype: &str, matches: F) -> Result<()>
	where
		F: Fn(&str, &str) -> bool + Send + Sync + 'static,
	{
		Ok(self
			.inner
			.enforcer
			.write()
			.add_named_matching_fn(ptype, matches)?)
	}

	/// Treats stored domains of grouping type `ptype` as patterns matched by `matches`.
	pub fn add_named_domain_matching_fn<F>(&self, ptype: &str, matches: F) -> Result<()>
	where
		F: Fn(&str, &str) -> bool + Send + Sync + 'static,
	{
		Ok(self
			.inner
			.enforcer
			.write()
			.add_named_domain_matching_fn(ptype, matches)?)
	}

	/// Revision of the in-memory policy. See [`Enforcer::revision`].
	pub fn revision(&self) -> u64 {
		self.inner.enforcer.read().revision()
	}

	// Queries.

	pub fn policy_set(&self) -> PolicySet {
		self.inner.enforcer.read().policy_set()
	}

	pub fn get_policy(&self) -> Vec<PolicyRow> {
		self.inner.enforcer.read().get_policy()
	}

	pub fn get_named_policy(&self, ptype: &str) -> Vec<PolicyRow> {
		self.inner.enforcer.read().get_named_policy(ptype)
	}

	pub fn get_filtered_policy<I, S>(&self, field_index: usize, values: I) -> Result<Vec<PolicyRow>>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Ok(self
			.inner
			.enforcer
			.read()
			.get_filtered_policy(field_index, values)?)
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
		Ok(self
			.inner
			.enforcer
			.read()
			.get_filtered_named_policy(ptype, field_index, values)?)
	}

	pub fn get_grouping_policy(&self) -> Vec<PolicyRow> {
		self.inner.enforcer.read().get_grouping_policy()
	}

	pub fn get_named_grouping_policy(&self, ptype: &str) -> Vec<PolicyRow> {
		self.inner.enforcer.read().get_named_grouping_policy(ptype)
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
		Ok(self
			.inner
			.enforcer
			.read()
			.get_filtered_grouping_policy(field_index, values)?)
	}

	pub fn has_policy<I, S>(&self, row: I) -> bool
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.inner.enforcer.read().has_policy(row)
	}

	pub fn has_named_policy<I, S>(&self, ptype: &str, row: I) -> bool
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.inner.enforcer.read().has_named_policy(ptype, row)
	}

	pub fn has_grouping_policy<I, S>(&self, row: I) -> bool
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.inner.enforcer.read().has_grouping_policy(row)
	}

	pub fn has_named_grouping_policy<I, S>(&self, ptype: &str, row: I) -> bool
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.inner.enforcer.read().has_named_grouping_policy(ptype, row)
	}

	pub fn get_roles_for_user(&self, name: &str, domain: Option<&str>) -> Vec<String> {
		self.inner.enforcer.read().get_roles_for_user(name, domain)
	}

	pub fn get_implicit_roles_for_user(&self, name: &str, domain: Option<&str>) -> Vec<String> {
		self
			.inner
			.enforcer
			.read()
			.get_implicit_roles_for_user(name, domain)
	}

	pub fn get_users_for_role(&self, role: &str, domain: Option<&str>) -> Vec<String> {
		self.inner.enforcer.read().get_users_for_role(role, domain)
	}

	pub fn get_implicit_users_for_role(&self, role: &str, domain: Option<&str>) -> Vec<String> {
		self
			.inner
			.enforcer
			.read()
			.get_implicit_users_for_role(role, domain)
	}

	pub fn has_role_for_user(&self, name: &str, role: &str, domain: Option<&str>) -> bool {
		self
			.inner
			.enforcer
			.read()
			.has_role_for_user(name, role, domain)
	}

	pub fn get_permissions_for_user(&self, user: &str) -> Vec<PolicyRow> {
		self.inner.enforcer.read().get_permissions_for_user(user)
	}

	pub fn get_implicit_permissions_for_user(
		&self,
		user: &str,
		domain: Option<&str>,
	) -> Vec<PolicyRow> {
		self
			.inner
			.enforcer
			.read()
			.get_implicit_permissions_for_user(user, domain)
	}

	// Edits. Each returns `true` when it changed something.

	pub async fn add_policy<I, S>(&self, row: I) -> Result<bool>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.add_rules("p", Section::Policy, vec![to_row(row)]).await
	}

	pub async fn add_named_policy<I, S>(&self, ptype: &str, row: I) -> Result<bool>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.add_rules(ptype, Section::Policy, vec![to_row(row)]).await
	}

	pub async fn add_policies<R, I, S>(&self, rows: R) -> Result<bool>
	where
		R: IntoIterator<Item = I>,
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.add_rules("p", Section::Policy, to_rows(rows)).await
	}

	pub async fn add_named_policies<R, I, S>(&self, ptype: &str, rows: R) -> Result<bool>
	where
		R: IntoIterator<Item = I>,
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.add_rules(ptype, Section::Policy, to_rows(rows)).await
	}

	pub async fn remove_policy<I, S>(&self, row: I) -> Result<bool>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.remove_rules("p", Section::Policy, vec![to_row(row)]).await
	}

	pub async fn remove_named_policy<I, S>(&self, ptype: &str, row: I) -> Result<bool>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.remove_rules(ptype, Section::Policy, vec![to_row(row)]).await
	}

	pub async fn remove_policies<R, I, S>(&self, rows: R) -> Result<bool>
	where
		R: IntoIterator<Item = I>,
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.remove_rules("p", Section::Policy, to_rows(rows)).await
	}

	pub async fn remove_named_policies<R, I, S>(&self, ptype: &str, rows: R) -> Result<bool>
	where
		R: IntoIterator<Item = I>,
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.remove_rules(ptype, Section::Policy, to_rows(rows)).await
	}

	pub async fn remove_filtered_policy<I, S>(&self, field_index: usize, values: I) -> Result<bool>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self
			.remove_filtered("p", Section::Policy, field_index, to_row(values))
			.await
	}

	pub async fn remove_filtered_named_policy<I, S>(
		&self,
		ptype: &str,
		field_index: usize,
		values: I,
	) -> Result<bool>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self
			.remove_filtered(ptype, Section::Policy, field_index, to_row(values))
			.await
	}

	pub async fn add_grouping_policy<I, S>(&self, row: I) -> Result<bool>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.add_rules("g", Section::Role, vec![to_row(row)]).await
	}

	pub async fn add_named_grouping_policy<I, S>(&self, ptype: &str, row: I) -> Result<bool>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.add_rules(ptype, Section::Role, vec![to_row(row)]).await
	}

	pub async fn add_grouping_policies<R, I, S>(&self, rows: R) -> Result<bool>
	where
		R: IntoIterator<Item = I>,
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.add_rules("g", Section::Role, to_rows(rows)).await
	}

	pub async fn add_named_grouping_policies<R, I, S>(&self, ptype: &str, rows: R) -> Result<bool>
	where
		R: IntoIterator<Item = I>,
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.add_rules(ptype, Section::Role, to_rows(rows)).await
	}

	pub async fn remove_grouping_policy<I, S>(&self, row: I) -> Result<bool>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.remove_rules("g", Section::Role, vec![to_row(row)]).await
	}

	pub async fn remove_named_grouping_policy<I, S>(&self, ptype: &str, row: I) -> Result<bool>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.remove_rules(ptype, Section::Role, vec![to_row(row)]).await
	}

	pub async fn remove_grouping_policies<R, I, S>(&self, rows: R) -> Result<bool>
	where
		R: IntoIterator<Item = I>,
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.remove_rules("g", Section::Role, to_rows(rows)).await
	}

	pub async fn remove_named_grouping_policies<R, I, S>(
		&self,
		ptype: &str,
		rows: R,
	) -> Result<bool>
	where
		R: IntoIterator<Item = I>,
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.remove_rules(ptype, Section::Role, to_rows(rows)).await
	}

	pub async fn remove_filtered_grouping_policy<I, S>(
		&self,
		field_index: usize,
		values: I,
	) -> Result<bool>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self
			.remove_filtered("g", Section::Role, field_index, to_row(values))
			.await
	}

	pub async fn remove_filtered_named_grouping_policy<I, S>(
		&self,
		ptype: &str,
		field_index: usize,
		values: I,
	) -> Result<bool>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self
			.remove_filtered(ptype, Section::Role, field_index, to_row(values))
			.await
	}

	pub async fn add_role_for_user(&self, user: &str, role: &str, domain: Option<&str>) -> Result<bool> {
		self
			.add_rules("g", Section::Role, vec![grouping_row(user, role, domain)])
			.await
	}

	pub async fn delete_role_for_user(
		&self,
		user: &str,
		role: &str,
		domain: Option<&str>,
	) -> Result<bool> {
		self
			.remove_rules("g", Section::Role, vec![grouping_row(user, role, domain)])
			.await
	}

	/// Removes every role `user` holds, in `domain` when given.
	pub async fn delete_roles_for_user(&self, user: &str, domain: Option<&str>) -> Result<bool> {
		let values = match domain {
			Some(domain) => vec![user.to_string(), String::new(), domain.to_string()],
			None => vec![user.to_string()],
		};
		self.remove_filtered("g", Section::Role, 0, values).await
	}

	/// Drops every row in memory. Storage is untouched until [`SyncedEnforcer::save_policy`].
	pub async fn clear_policy(&self) {
		let _gate = self.inner.write_gate.lock().await;
		self.inner.enforcer.write().clear_policy();
		debug!("policy cleared");
	}

	/// Rebuilds every role graph from the stored grouping rows.
	pub async fn build_role_links(&self) {
		let _gate = self.inner.write_gate.lock().await;
		self.inner.enforcer.write().build_role_links();
	}

	// Storage.

	/// Replaces every row with the adapter's contents. On failure the current policy
	/// stays in effect.
	pub async fn load_policy(&self) -> Result<()> {
		self.inner.reload(|| false).await.map(|_| ())
	}

	/// Writes every row through the adapter.
	#[instrument(level = "debug", skip_all)]
	pub async fn save_policy(&self) -> Result<()> {
		let gate = self.inner.write_gate.lock().await;
		let adapter = self.inner.adapter.as_ref().ok_or(Error::NoAdapter)?;
		let policy = self.inner.enforcer.read().policy_set();
		adapter.save_policy(&policy).await?;
		info!(rows = policy.len(), "policy saved");
		drop(gate);

		self.inner.notify(PolicyChange::Saved);
		Ok(())
	}

	/// Reloads from the adapter every `interval` in a background task, replacing any
	/// task already running. Must be called within a Tokio runtime.
	/// A zero interval is rejected.
	pub async fn start_auto_reload(&self, interval: Duration) -> Result<()> {
		if interval.is_zero() {
			return Err(ConfigError::InvalidValue {
				key: "auto_reload_interval".to_string(),
				message: "must be greater than zero".to_string(),
			}
			.into());
		}
		if self.inner.adapter.is_none() {
			return Err(Error::NoAdapter);
		}
		let previous = self.inner.reload.lock().take();
		if let Some(previous) = previous {
			previous.stop().await;
		}

		let handle = ReloadHandle::spawn(Arc::downgrade(&self.inner), interval);
		let replaced = self.inner.reload.lock().replace(handle);
		if let Some(replaced) = replaced {
			replaced.stop().await;
		}
		Ok(())
	}

	/// Stops the reload task and waits for it to exit. A reload in flight is discarded.
	pub async fn stop_auto_reload(&self) {
		let handle = self.inner.reload.lock().take();
		if let Some(handle) = handle {
			handle.stop().await;
		}
	}

	pub fn is_auto_reloading(&self) -> bool {
		self.inner
			.reload
			.lock()
			.as_ref()
			.is_some_and(ReloadHandle::is_running)
	}

	/// Period of the running reload task, if any.
	pub fn auto_reload_interval(&self) -> Option<Duration> {
		self.inner.reload.lock().as_ref().map(ReloadHandle::interval)
	}

	async fn add_rules(&self, ptype: &str, section: Section, rows: Vec<PolicyRow>) -> Result<bool> {
		let gate = self.inner.write_gate.lock().await;
		let missing = {
			let enforcer = self.inner.enforcer.read();
			expect_section(&enforcer, ptype, section)?;
			enforcer.missing_rules(ptype, &rows)?
		};
		if missing.is_empty() {
			return Ok(false);
		}

		if let Some(adapter) = self.inner.persisting_adapter() {
			skip_unsupported(adapter.add_policies(ptype, &missing).await)?;
		}

		let added = self.inner.enforcer.write().add_rules(ptype, missing)?;
		drop(gate);

		if added.is_empty() {
			return Ok(false);
		}
		self.inner.notify(PolicyChange::AddedRules {
			ptype: ptype.to_string(),
			rows: added,
		});
		Ok(true)
	}

	async fn remove_rules(
		&self,
		ptype: &str,
		section: Section,
		rows: Vec<PolicyRow>,
	) -> Result<bool> {
		let gate = self.inner.write_gate.lock().await;
		let present = {
			let enforcer = self.inner.enforcer.read();
			expect_section(&enforcer, ptype, section)?;
			enforcer.present_rules(ptype, &rows)?
		};
		if present.is_empty() {
			return Ok(false);
		}

		if let Some(adapter) = self.inner.persisting_adapter() {
			skip_unsupported(adapter.remove_policies(ptype, &present).await)?;
		}

		let removed = self.inner.enforcer.write().remove_rules(ptype, &present)?;
		drop(gate);

		if removed.is_empty() {
			return Ok(false);
		}
		self.inner.notify(PolicyChange::RemovedRules {
			ptype: ptype.to_string(),
			rows: removed,
		});
		Ok(true)
	}

	async fn remove_filtered(
		&self,
		ptype: &str,
		section: Section,
		field_index: usize,
		values: Vec<String>,
	) -> Result<bool> {
		let gate = self.inner.write_gate.lock().await;
		let matching = {
			let enforcer = self.inner.enforcer.read();
			expect_section(&enforcer, ptype, section)?;
			enforcer.filtered_rules(ptype, field_index, &values)?
		};
		if matching.is_empty() {
			return Ok(false);
		}

		if let Some(adapter) = self.inner.persisting_adapter() {
			skip_unsupported(
				adapter
					.remove_filtered_policy(ptype, field_index, &values)
					.await,
			)?;
		}

		let removed = self
			.inner
			.enforcer
			.write()
			.remove_filtered_rules(ptype, field_index, &values)?;
		drop(gate);

		if removed.is_empty() {
			return Ok(false);
		}
		self.inner.notify(PolicyChange::RemovedFiltered {
			ptype: ptype.to_string(),
			field_index,
			values,
		});
		Ok(true)
	}
}
