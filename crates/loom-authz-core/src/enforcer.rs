// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Single-threaded decision engine.
//!
//! An [`Enforcer`] owns one model, its rows and the role graphs derived from them. It
//! performs no locking or I/O; `loom-authz` wraps it for concurrent use.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::config::{DefaultDecision, EnforcerConfig};
use crate::effect::{Effect, EffectKind, Effector};
use crate::error::{EvalError, ModelError, PolicyError, Result};
use crate::matcher::{Arity, CompiledMatcher, EvaluationContext, FunctionRegistry};
use crate::model::{Model, PolicyRow, PolicySet, Section, EFFECT_TOKEN};
use crate::rbac::{DefaultRoleManager, MatchingFn, RoleManagers};

/// Result of one authorization request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
	pub allowed: bool,
	/// The row that determined the outcome; empty when nothing decided it.
	pub explain: Vec<PolicyRow>,
}

/// Names the request, policy, effect and matcher definitions one decision uses.
///
/// The default context is `r`, `p`, `e` and `m`. A model may declare further sets such
/// as `r2`, `p2`, `e2` and `m2` and pick one per request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EnforceContext {
	pub r_type: String,
	pub p_type: String,
	pub e_type: String,
	pub m_type: String,
}

impl EnforceContext {
	/// The context whose keys all end in `suffix`: `new("2")` is `r2`, `p2`, `e2`, `m2`.
	pub fn new(suffix: &str) -> Self {
		Self {
			r_type: format!("r{suffix}"),
			p_type: format!("p{suffix}"),
			e_type: format!("e{suffix}"),
			m_type: format!("m{suffix}"),
		}
	}
}

impl Default for EnforceContext {
	fn default() -> Self {
		Self::new("")
	}
}

impl fmt::Display for EnforceContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"{}/{}/{}/{}",
			self.r_type, self.p_type, self.e_type, self.m_type
		)
	}
}

/// A context resolved against the model: compiled matcher, effector and column layout.
#[derive(Debug, Clone)]
struct Plan {
	context: EnforceContext,
	matcher: CompiledMatcher,
	effector: Effector,
	eft_index: Option<usize>,
	request_len: usize,
}

impl Plan {
	fn build(
		model: &Model,
		functions: &FunctionRegistry,
		context: &EnforceContext,
		default_decision: DefaultDecision,
	) -> Result<Self> {
		let missing = |section: Section, key: &str| ModelError::MissingKey {
			section: section.header().to_string(),
			key: key.to_string(),
		};

		let request = model
			.get(Section::Request, &context.r_type)
			.ok_or_else(|| missing(Section::Request, &context.r_type))?;
		let policy = model
			.get(Section::Policy, &context.p_type)
			.ok_or_else(|| missing(Section::Policy, &context.p_type))?;
		let effect = model
			.get(Section::Effect, &context.e_type)
			.ok_or_else(|| missing(Section::Effect, &context.e_type))?;
		let kind = EffectKind::parse(effect.value()).ok_or_else(|| ModelError::UnsupportedEffect {
			section: Section::Effect.header().to_string(),
			key: context.e_type.clone(),
			formula: effect.value().to_string(),
		})?;
		if model.get(Section::Matcher, &context.m_type).is_none() {
			return Err(missing(Section::Matcher, &context.m_type).into());
		}

		let matcher = CompiledMatcher::compile_named(
			model,
			functions,
			&context.m_type,
			&context.r_type,
			&context.p_type,
		)?;

		Ok(Self {
			context: context.clone(),
			matcher,
			effector: Effector::new(kind, default_decision),
			eft_index: policy.token_index(EFFECT_TOKEN),
			request_len: request.tokens().len(),
		})
	}
}

/// Matching functions registered for one grouping type.
#[derive(Clone, Default)]
struct RoleMatching {
	name: Option<MatchingFn>,
	domain: Option<MatchingFn>,
}

impl RoleMatching {
	fn apply(&self, manager: &mut DefaultRoleManager) {
		manager.set_matching_fn(self.name.clone());
		manager.set_domain_matching_fn(self.domain.clone());
	}
}

/// Rows and role graphs built off to the side, ready to replace an enforcer's state.
#[derive(Debug, Clone)]
pub struct PolicySnapshot {
	model: Model,
	role_managers: RoleManagers,
}

impl PolicySnapshot {
	pub fn model(&self) -> &Model {
		&self.model
	}

	/// Number of policy and grouping rows in the snapshot.
	pub fn len(&self) -> usize {
		self.model.policy_set().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[derive(Clone)]
pub struct Enforcer {
	pub(crate) model: Model,
	functions: FunctionRegistry,
	/// The default context first, then every other complete `r*`/`p*`/`e*`/`m*` set.
	plans: Vec<Plan>,
	pub(crate) role_managers: RoleManagers,
	role_matching: BTreeMap<String, RoleMatching>,
	pub(crate) config: EnforcerConfig,
	revision: u64,
}

impl fmt::Debug for Enforcer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Enforcer")
			.field("model", &self.model)
			.field("plans", &self.plans)
			.field("role_managers", &self.role_managers)
			.field(
				"role_matching",
				&self.role_matching.keys().collect::<Vec<_>>(),
			)
			.field("config", &self.config)
			.field("revision", &self.revision)
			.finish_non_exhaustive()
	}
}

impl Enforcer {
	/// Builds an enforcer, compiling the matcher and role graphs for any rows already in
	/// `model`. Fails if the model is invalid or the matcher does not compile.
	pub fn new(model: Model, config: EnforcerConfig) -> Result<Self> {
		model.validate()?;

		let functions = FunctionRegistry::with_builtins();
		let plans = build_plans(&model, &functions, config.default_decision)?;
		let role_managers = build_role_managers(&model, config.max_hierarchy_level);

		info!(
			effect = ?plans[0].effector.kind(),
			contexts = plans.len(),
			default_decision = %config.default_decision,
			max_hierarchy_level = config.max_hierarchy_level,
			"enforcer initialized"
		);

		Ok(Self {
			model,
			functions,
			plans,
			role_managers,
			role_matching: BTreeMap::new(),
			config,
			revision: 0,
		})
	}

	/// Parses a model from text and builds an enforcer over it.
	pub fn from_text(text: &str, config: EnforcerConfig) -> Result<Self> {
		Self::new(Model::from_text(text)?, config)
	}

	pub fn model(&self) -> &Model {
		&self.model
	}

	pub fn config(&self) -> &EnforcerConfig {
		&self.config
	}

	pub fn effector(&self) -> &Effector {
		&self.plans[0].effector
	}

	pub fn matcher(&self) -> &CompiledMatcher {
		&self.plans[0].matcher
	}

	/// Counter bumped by every change that can alter a decision: row and role edits,
	/// reloads, and function registration. Equal revisions decide identically.
	pub fn revision(&self) -> u64 {
		self.revision
	}

	pub(crate) fn touch(&mut self) {
		self.revision = self.revision.wrapping_add(1);
	}

	/// Role graph for a grouping type.
	pub fn role_manager(&self, ptype: &str) -> Option<&DefaultRoleManager> {
		self.role_managers.get(ptype)
	}

	/// Registers a matcher function and recompiles every matcher.
	pub fn add_function<F>(&mut self, name: &str, arity: Arity, func: F) -> Result<()>
	where
		F: Fn(&[Value]) -> std::result::Result<Value, EvalError> + Send + Sync + 'static,
	{
		let mut functions = self.functions.clone();
		functions.register(name, arity, func);
		let plans = build_plans(&self.model, &functions, self.config.default_decision)?;
		self.functions = functions;
		self.plans = plans;
		self.touch();
		debug!(function = %name, "matcher function registered");
		Ok(())
	}

	/// Lets stored names of grouping type `ptype` act as patterns, so that for example
	/// `g2, /book/:id, book_group` links every `/book/...` object to `book_group`.
	/// `matches(name, pattern)` decides whether a concrete name is covered.
	pub fn add_named_matching_fn<F>(&mut self, ptype: &str, matches: F) -> Result<()>
	where
		F: Fn(&str, &str) -> bool + Send + Sync + 'static,
	{
		self.set_role_matching(ptype, |matching| matching.name = Some(Arc::new(matches)))
	}

	/// Lets stored domains of grouping type `ptype` act as patterns, so that rows stored
	/// under a domain pattern apply to every domain it covers.
	pub fn add_named_domain_matching_fn<F>(&mut self, ptype: &str, matches: F) -> Result<()>
	where
		F: Fn(&str, &str) -> bool + Send + Sync + 'static,
	{
		self.set_role_matching(ptype, |matching| matching.domain = Some(Arc::new(matches)))
	}

	fn set_role_matching(
		&mut self,
		ptype: &str,
		update: impl FnOnce(&mut RoleMatching),
	) -> Result<()> {
		if self.model.section_of(ptype) != Some(Section::Role) {
			return Err(PolicyError::UnknownPolicyType(ptype.to_string()).into());
		}
		let matching = self.role_matching.entry(ptype.to_string()).or_default();
		update(matching);
		if let Some(manager) = self.role_managers.get_mut(ptype) {
			matching.apply(manager);
		}
		self.touch();
		debug!(ptype = %ptype, "role matching function registered");
		Ok(())
	}

	fn apply_role_matching(&self, role_managers: &mut RoleManagers) {
		for (ptype, matching) in &self.role_matching {
			if let Some(manager) = role_managers.get_mut(ptype) {
				matching.apply(manager);
			}
		}
	}

	/// Role graphs for the rows in `model`, with this enforcer's matching functions.
	pub(crate) fn role_managers_for(&self, model: &Model) -> RoleManagers {
		let mut role_managers = build_role_managers(model, self.config.max_hierarchy_level);
		self.apply_role_matching(&mut role_managers);
		role_managers
	}

	/// Decides a request. See [`Enforcer::enforce_ex`].
	pub fn enforce<V>(&self, request: &[V]) -> Result<bool>
	where
		V: Clone + Into<Value>,
	{
		Ok(self.enforce_ex(request)?.allowed)
	}

	/// Decides a request and returns the row that determined the outcome.
	///
	/// Rows are evaluated in stored order and evaluation stops as soon as the effect
	/// formula cannot change its answer. Any evaluation error aborts the request;
	/// callers should treat an error as a denial.
	#[instrument(level = "debug", skip(self, request), fields(request_len = request.len()))]
	pub fn enforce_ex<V>(&self, request: &[V]) -> Result<Decision>
	where
		V: Clone + Into<Value>,
	{
		let values: Vec<Value> = request.iter().cloned().map(Into::into).collect();
		let plan = &self.plans[0];
		self.decide(plan, &plan.matcher, &values)
	}

	/// Decides a request with the definitions named by `context`.
	///
	/// Contexts whose keys share a suffix are compiled with the enforcer; any other
	/// combination is compiled for this call.
	#[instrument(level = "debug", skip(self, context, request), fields(context = %context))]
	pub fn enforce_with_context<V>(&self, context: &EnforceContext, request: &[V]) -> Result<Decision>
	where
		V: Clone + Into<Value>,
	{
		let values: Vec<Value> = request.iter().cloned().map(Into::into).collect();
		match self.plans.iter().find(|plan| plan.context == *context) {
			Some(plan) => self.decide(plan, &plan.matcher, &values),
			None => {
				let plan = Plan::build(
					&self.model,
					&self.functions,
					context,
					self.config.default_decision,
				)?;
				self.decide(&plan, &plan.matcher, &values)
			}
		}
	}

	/// Decides a request with an ad-hoc matcher formula instead of the model's `m`.
	pub fn enforce_with_matcher<V>(&self, matcher: &str, request: &[V]) -> Result<Decision>
	where
		V: Clone + Into<Value>,
	{
		let compiled = CompiledMatcher::compile_source(matcher, &self.model, &self.functions)?;
		let values: Vec<Value> = request.iter().cloned().map(Into::into).collect();
		self.decide(&self.plans[0], &compiled, &values)
	}

	/// Decides several requests against the same state. The first error aborts the batch.
	pub fn batch_enforce<R, V>(&self, requests: &[R]) -> Result<Vec<bool>>
	where
		R: AsRef<[V]>,
		V: Clone + Into<Value>,
	{
		requests
			.iter()
			.map(|request| self.enforce(request.as_ref()))
			.collect()
	}

	fn decide(&self, plan: &Plan, matcher: &CompiledMatcher, request: &[Value]) -> Result<Decision> {
		if request.len() != plan.request_len {
			return Err(EvalError::RequestArity {
				expected: plan.request_len,
				actual: request.len(),
			}
			.into());
		}

		let rows = self.model.rows(&plan.context.p_type)?;
		let mut stream = plan.effector.stream();
		let mut evaluated = 0usize;

		for (index, row) in rows.iter().enumerate() {
			evaluated += 1;
			let ctx = EvaluationContext::new(request, row, &self.role_managers);
			if !matcher.evaluate(&ctx)? {
				continue;
			}
			let effect = match plan.eft_index {
				Some(idx) => Effect::from_column(&row[idx]),
				None => Effect::Allow,
			};
			if stream.push(index, effect) {
				break;
			}
		}

		let verdict = stream.finish();
		let explain = verdict
			.deciding_row
			.and_then(|idx| rows.get(idx))
			.map(|row| vec![row.clone()])
			.unwrap_or_default();

		debug!(
			allowed = verdict.allowed,
			defaulted = verdict.defaulted,
			rows = rows.len(),
			evaluated,
			"authorization decision"
		);

		Ok(Decision {
			allowed: verdict.allowed,
			explain,
		})
	}

	/// Validates `set` and builds rows and role graphs for it without touching `self`.
	pub fn build_snapshot(&self, set: &PolicySet) -> Result<PolicySnapshot> {
		let mut model = self.model.definition_only();
		model.load_policy_set(set)?;
		let role_managers = self.role_managers_for(&model);
		Ok(PolicySnapshot {
			model,
			role_managers,
		})
	}

	/// Replaces rows and role graphs with a prepared snapshot. Matching functions
	/// registered since the snapshot was built are applied to it.
	pub fn install_snapshot(&mut self, snapshot: PolicySnapshot) {
		let mut role_managers = snapshot.role_managers;
		self.apply_role_matching(&mut role_managers);
		self.model = snapshot.model;
		self.role_managers = role_managers;
		self.touch();
	}

	/// Replaces every row with `set`. On error the current state is kept.
	pub fn load_policy_set(&mut self, set: &PolicySet) -> Result<()> {
		let snapshot = self.build_snapshot(set)?;
		self.install_snapshot(snapshot);
		Ok(())
	}

	/// Copies the current rows out.
	pub fn policy_set(&self) -> PolicySet {
		self.model.policy_set()
	}
}

/// The default context, then every other matcher whose suffix also names a request,
/// policy and effect definition.
fn build_plans(
	model: &Model,
	functions: &FunctionRegistry,
	default_decision: DefaultDecision,
) -> Result<Vec<Plan>> {
	let mut plans = vec![Plan::build(
		model,
		functions,
		&EnforceContext::default(),
		default_decision,
	)?];
	for matcher in model.assertions(Section::Matcher) {
		let suffix = &matcher.key()[1..];
		if suffix.is_empty() {
			continue;
		}
		let context = EnforceContext::new(suffix);
		let complete = model.get(Section::Request, &context.r_type).is_some()
			&& model.get(Section::Policy, &context.p_type).is_some()
			&& model.get(Section::Effect, &context.e_type).is_some();
		if complete {
			plans.push(Plan::build(model, functions, &context, default_decision)?);
		}
	}
	Ok(plans)
}

/// One role graph per grouping definition, built from its rows.
fn build_role_managers(model: &Model, max_hierarchy_level: usize) -> RoleManagers {
	model
		.assertions(Section::Role)
		.map(|assertion| {
			(
				assertion.key().to_string(),
				DefaultRoleManager::from_rows(assertion.rows(), max_hierarchy_level),
			)
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::DefaultDecision;
	use crate::error::{AuthzError, CompileError};
	use crate::rbac::RoleManager;
	use proptest::prelude::*;
	use serde_json::json;

	const RBAC_MODEL: &str = r#"
[request_definition]
r = sub, obj, act

[policy_definition]
p = sub, obj, act

[role_definition]
g = _, _

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act
"#;

	const DENY_MODEL: &str = r#"
[request_definition]
r = sub, obj, act

[policy_definition]
p = sub, obj, act, eft

[role_definition]
g = _, _

[policy_effect]
e = !some(where (p.eft == deny))

[matchers]
m = g(r.sub, p.sub) && keyMatch(r.obj, p.obj) && r.act == p.act
"#;

	const PRIORITY_MODEL: &str = r#"
[request_definition]
r = sub, obj, act

[policy_definition]
p = priority, sub, obj, act, eft

[role_definition]
g = _, _

[policy_effect]
e = priority(p.eft) || deny

[matchers]
m = g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act
"#;

	fn rbac() -> Enforcer {
		let mut e = Enforcer::from_text(RBAC_MODEL, EnforcerConfig::default()).unwrap();
		e.add_policy(["admin", "data1", "read"]).unwrap();
		e.add_grouping_policy(["alice", "admin"]).unwrap();
		e
	}

	#[test]
	fn role_inherited_permission_is_explained() {
		let e = rbac();
		let decision = e.enforce_ex(&["alice", "data1", "read"]).unwrap();
		assert_eq!(
			decision,
			Decision {
				allowed: true,
				explain: vec![vec!["admin".to_string(), "data1".to_string(), "read".to_string()]],
			}
		);

		let decision = e.enforce_ex(&["bob", "data1", "read"]).unwrap();
		assert_eq!(
			decision,
			Decision {
				allowed: false,
				explain: vec![],
			}
		);
	}

	#[test]
	fn removed_policy_no_longer_allows() {
		let mut e = rbac();
		assert!(e.remove_policy(["admin", "data1", "read"]).unwrap());
		let decision = e.enforce_ex(&["alice", "data1", "read"]).unwrap();
		assert!(!decision.allowed);
		assert!(decision.explain.is_empty());
	}

	#[test]
	fn empty_policy_uses_default_decision() {
		let e = Enforcer::from_text(RBAC_MODEL, EnforcerConfig::default()).unwrap();
		assert!(!e.enforce(&["alice", "data1", "read"]).unwrap());

		let config = EnforcerConfig::default().with_default_decision(DefaultDecision::Allow);
		let e = Enforcer::from_text(RBAC_MODEL, config).unwrap();
		assert!(e.enforce(&["alice", "data1", "read"]).unwrap());
	}

	#[test]
	fn request_arity_is_checked() {
		let e = rbac();
		let err = e.enforce(&["alice", "data1"]).unwrap_err();
		assert!(matches!(
			err,
			AuthzError::Eval(EvalError::RequestArity {
				expected: 3,
				actual: 2
			})
		));
	}

	#[test]
	fn deny_override_with_allow_default() {
		let config = EnforcerConfig::default().with_default_decision(DefaultDecision::Allow);
		let mut e = Enforcer::from_text(DENY_MODEL, config).unwrap();
		e.add_policy(["alice", "/data/*", "read", "allow"]).unwrap();
		e.add_policy(["alice", "/data/secret", "read", "deny"]).unwrap();

		assert!(e.enforce(&["alice", "/data/public", "read"]).unwrap());
		let denied = e.enforce_ex(&["alice", "/data/secret", "read"]).unwrap();
		assert!(!denied.allowed);
		assert_eq!(denied.explain[0][3], "deny");
		assert!(e.enforce(&["bob", "/other", "write"]).unwrap());
	}

	#[test]
	fn priority_orders_rows() {
		let mut e = Enforcer::from_text(PRIORITY_MODEL, EnforcerConfig::default()).unwrap();
		e.add_policy(["10", "admin", "data1", "read", "allow"]).unwrap();
		e.add_policy(["1", "alice", "data1", "read", "deny"]).unwrap();
		e.add_grouping_policy(["alice", "admin"]).unwrap();
		e.add_grouping_policy(["bob", "admin"]).unwrap();

		let decision = e.enforce_ex(&["alice", "data1", "read"]).unwrap();
		assert!(!decision.allowed);
		assert_eq!(decision.explain[0][0], "1");
		assert!(e.enforce(&["bob", "data1", "read"]).unwrap());
	}

	#[test]
	fn json_request_values() {
		let text = RBAC_MODEL.replace(
			"g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act",
			"r.sub.owner == p.sub && r.obj == p.obj && r.act == p.act",
		);
		let mut e = Enforcer::from_text(&text, EnforcerConfig::default()).unwrap();
		e.add_policy(["alice", "data1", "read"]).unwrap();
		let request = [json!({"owner": "alice"}), json!("data1"), json!("read")];
		assert!(e.enforce(&request).unwrap());
	}

	#[test]
	fn evaluation_errors_surface() {
		let text = RBAC_MODEL.replace(
			"g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act",
			"regexMatch(r.obj, p.obj)",
		);
		let mut e = Enforcer::from_text(&text, EnforcerConfig::default()).unwrap();
		e.add_policy(["alice", "(", "read"]).unwrap();
		assert!(matches!(
			e.enforce(&["alice", "data1", "read"]),
			Err(AuthzError::Eval(EvalError::InvalidRegex { .. }))
		));
	}

	#[test]
	fn unknown_function_fails_construction() {
		let text = RBAC_MODEL.replace("g(r.sub, p.sub)", "isOwner(r.sub, p.sub)");
		assert!(matches!(
			Enforcer::from_text(&text, EnforcerConfig::default()),
			Err(AuthzError::Compile(CompileError::UnknownFunction(_)))
		));
	}

	#[test]
	fn custom_function_recompiles_matcher() {
		let mut e = rbac();
		e.add_function("always", Arity::Exact(0), |_| Ok(Value::Bool(true)))
			.unwrap();
		let decision = e
			.enforce_with_matcher("always() && r.act == p.act", &["bob", "x", "read"])
			.unwrap();
		assert!(decision.allowed);
		assert!(matches!(
			e.enforce_with_matcher("never()", &["bob", "x", "read"]),
			Err(AuthzError::Compile(CompileError::UnknownFunction(_)))
		));
	}

	#[test]
	fn batch_enforce_preserves_order() {
		let e = rbac();
		let results = e
			.batch_enforce(&[
				vec!["alice", "data1", "read"],
				vec!["bob", "data1", "read"],
				vec!["admin", "data1", "read"],
			])
			.unwrap();
		assert_eq!(results, vec![true, false, true]);
	}

	#[test]
	fn snapshot_swap_replaces_rows_and_roles() {
		let mut e = rbac();
		let set = PolicySet::new()
			.with_rule("p", ["staff", "data2", "write"])
			.with_rule("g", ["bob", "staff"]);
		let snapshot = e.build_snapshot(&set).unwrap();
		assert_eq!(snapshot.len(), 2);
		assert!(e.enforce(&["alice", "data1", "read"]).unwrap());

		e.install_snapshot(snapshot);
		assert!(!e.enforce(&["alice", "data1", "read"]).unwrap());
		assert!(e.enforce(&["bob", "data2", "write"]).unwrap());
		assert!(e.role_manager("g").unwrap().has_link("bob", "staff", None));
	}

	#[test]
	fn invalid_snapshot_leaves_state_untouched() {
		let mut e = rbac();
		let set = PolicySet::new().with_rule("p", ["too", "short"]);
		assert!(e.load_policy_set(&set).is_err());
		assert!(e.enforce(&["alice", "data1", "read"]).unwrap());
		assert_eq!(e.policy_set().len(), 2);
	}

	const CONTEXT_MODEL: &str = r#"
[request_definition]
r = sub, obj, act
r2 = sub, owner

[policy_definition]
p = sub, obj, act
p2 = sub, owner, eft

[role_definition]
g = _, _

[policy_effect]
e = some(where (p.eft == allow))
e2 = !some(where (p2.eft == deny))

[matchers]
m = g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act
m2 = r2.sub == p2.sub && r2.owner == p2.owner
"#;

	const PATTERN_MODEL: &str = r#"
[request_definition]
r = sub, obj, act

[policy_definition]
p = sub, obj, act

[role_definition]
g = _, _
g2 = _, _

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = g(r.sub, p.sub) && g2(r.obj, p.obj) && r.act == p.act
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

	fn patterned() -> Enforcer {
		let mut e = Enforcer::from_text(PATTERN_MODEL, EnforcerConfig::default()).unwrap();
		e.add_policy(["alice", "book_group", "read"]).unwrap();
		e.add_named_grouping_policy("g2", ["/book/:id", "book_group"])
			.unwrap();
		e
	}

	#[test]
	fn context_selects_definition_set() {
		let mut e = Enforcer::from_text(CONTEXT_MODEL, EnforcerConfig::default()).unwrap();
		e.add_policy(["alice", "data1", "read"]).unwrap();
		e.add_named_policy("p2", ["alice", "bob", "allow"]).unwrap();
		e.add_named_policy("p2", ["alice", "alice", "deny"]).unwrap();

		let second = EnforceContext::new("2");
		assert!(e.enforce_with_context(&second, &["alice", "bob"]).unwrap().allowed);
		assert!(!e.enforce_with_context(&second, &["alice", "carol"]).unwrap().allowed);
		let denied = e.enforce_with_context(&second, &["alice", "alice"]).unwrap();
		assert!(!denied.allowed);
		assert_eq!(denied.explain[0][2], "deny");

		let first = EnforceContext::default();
		assert!(e.enforce_with_context(&first, &["alice", "data1", "read"]).unwrap().allowed);
		assert!(matches!(
			e.enforce_with_context(&second, &["alice", "data1", "read"]),
			Err(AuthzError::Eval(EvalError::RequestArity {
				expected: 2,
				actual: 3
			}))
		));
	}

	#[test]
	fn mixed_context_is_compiled_on_demand() {
		let mut e = Enforcer::from_text(CONTEXT_MODEL, EnforcerConfig::default()).unwrap();
		e.add_named_policy("p2", ["alice", "bob", "allow"]).unwrap();
		e.add_named_policy("p2", ["alice", "bob", "deny"]).unwrap();

		let mixed = EnforceContext {
			e_type: "e".to_string(),
			..EnforceContext::new("2")
		};
		assert!(e.enforce_with_context(&mixed, &["alice", "bob"]).unwrap().allowed);
		assert!(!e
			.enforce_with_context(&EnforceContext::new("2"), &["alice", "bob"])
			.unwrap()
			.allowed);
	}

	#[test]
	fn unknown_context_is_rejected() {
		let e = rbac();
		assert!(matches!(
			e.enforce_with_context(&EnforceContext::new("3"), &["alice", "data1", "read"]),
			Err(AuthzError::Model(ModelError::MissingKey { .. }))
		));
	}

	#[test]
	fn named_matching_fn_links_patterned_names() {
		let mut e = patterned();
		assert!(!e.enforce(&["alice", "/book/1", "read"]).unwrap());

		e.add_named_matching_fn("g2", crate::matcher::key_match2)
			.unwrap();
		assert!(e.enforce(&["alice", "/book/1", "read"]).unwrap());
		assert!(!e.enforce(&["alice", "/book/1/pages", "read"]).unwrap());
		assert!(!e.enforce(&["alice", "/pen/1", "read"]).unwrap());
		assert!(!e.enforce(&["bob", "/book/1", "read"]).unwrap());
	}

	#[test]
	fn matching_fn_survives_reload_and_rebuild() {
		let mut e = patterned();
		e.add_named_matching_fn("g2", crate::matcher::key_match2)
			.unwrap();

		let set = PolicySet::new()
			.with_rule("p", ["bob", "pen_group", "write"])
			.with_rule("g2", ["/pen/:id", "pen_group"]);
		e.load_policy_set(&set).unwrap();
		assert!(e.enforce(&["bob", "/pen/7", "write"]).unwrap());

		e.build_role_links();
		assert!(e.enforce(&["bob", "/pen/7", "write"]).unwrap());
		assert!(e.role_manager("g2").unwrap().has_matching_fn());
		assert!(!e.role_manager("g").unwrap().has_matching_fn());
	}

	#[test]
	fn domain_matching_fn_applies_wildcard_domains() {
		let mut e = Enforcer::from_text(DOMAIN_MODEL, EnforcerConfig::default()).unwrap();
		e.add_policy(["admin", "domain1", "data1", "read"]).unwrap();
		e.add_grouping_policy(["alice", "admin", "*"]).unwrap();
		assert!(!e.enforce(&["alice", "domain1", "data1", "read"]).unwrap());

		e.add_named_domain_matching_fn("g", crate::matcher::key_match)
			.unwrap();
		assert!(e.enforce(&["alice", "domain1", "data1", "read"]).unwrap());
		assert!(!e.enforce(&["alice", "domain2", "data1", "read"]).unwrap());
	}

	#[test]
	fn matching_fn_requires_grouping_type() {
		let mut e = rbac();
		for ptype in ["p", "g9"] {
			assert!(matches!(
				e.add_named_matching_fn(ptype, |a: &str, b: &str| a == b),
				Err(AuthzError::Policy(PolicyError::UnknownPolicyType(_)))
			));
		}
	}

	#[test]
	fn revision_moves_only_on_effective_changes() {
		let mut e = rbac();
		let start = e.revision();

		assert!(!e.add_policy(["admin", "data1", "read"]).unwrap());
		assert!(!e.remove_policy(["nobody", "data1", "read"]).unwrap());
		assert_eq!(e.revision(), start);

		assert!(e.add_policy(["admin", "data2", "read"]).unwrap());
		let added = e.revision();
		assert!(added > start);

		e.add_function("always", Arity::Exact(0), |_| Ok(Value::Bool(true)))
			.unwrap();
		let registered = e.revision();
		assert!(registered > added);

		e.load_policy_set(&PolicySet::new()).unwrap();
		assert!(e.revision() > registered);
	}

	proptest! {
		#[test]
		fn enforcement_is_deterministic(
			sub in "(alice|bob|admin)",
			obj in "(data1|data2)",
			act in "(read|write)",
		) {
			let e = rbac();
			let first = e.enforce_ex(&[sub.as_str(), obj.as_str(), act.as_str()]).unwrap();
			let second = e.clone().enforce_ex(&[sub.as_str(), obj.as_str(), act.as_str()]).unwrap();
			prop_assert_eq!(first, second);
		}
	}
}
