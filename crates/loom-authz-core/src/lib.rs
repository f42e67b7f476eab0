// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core authorization engine for Loom.
//!
//! This crate decides whether a request (subject, object, action and any extra
//! attributes) is allowed by evaluating a configurable policy model. It combines
//! role hierarchies with attribute matching, expressed as a boolean matcher formula
//! over policy rows. It is synchronous and lock-free; `loom-authz` adds concurrent
//! access, persistence and hot reload on top.
//!
//! # Overview
//!
//! - [`Model`]: the request, policy, role, effect and matcher definitions plus the
//!   rows stored against them
//! - [`DefaultRoleManager`]: per-domain role graphs with bounded, cycle-safe traversal
//! - [`matcher`]: the matcher compiler, interpreter and built-in predicate registry
//! - [`Effector`]: folds matched rows into a decision (allow-override, deny-override,
//!   allow-and-deny, priority)
//! - [`Enforcer`]: runs decisions and manages rows and roles
//!
//! # Example
//!
//! ```
//! use loom_authz_core::{Enforcer, EnforcerConfig};
//!
//! let model = r#"
//! [request_definition]
//! r = sub, obj, act
//!
//! [policy_definition]
//! p = sub, obj, act
//!
//! [role_definition]
//! g = _, _
//!
//! [policy_effect]
//! e = some(where (p.eft == allow))
//!
//! [matchers]
//! m = g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act
//! "#;
//!
//! let mut enforcer = Enforcer::from_text(model, EnforcerConfig::default()).unwrap();
//! enforcer.add_policy(["admin", "data1", "read"]).unwrap();
//! enforcer.add_grouping_policy(["alice", "admin"]).unwrap();
//!
//! let decision = enforcer.enforce_ex(&["alice", "data1", "read"]).unwrap();
//! assert!(decision.allowed);
//! assert_eq!(decision.explain, vec![vec!["admin", "data1", "read"]]);
//!
//! assert!(!enforcer.enforce(&["bob", "data1", "read"]).unwrap());
//! ```

pub mod config;
pub mod effect;
pub mod enforcer;
pub mod error;
mod management;
pub mod matcher;
pub mod model;
pub mod rbac;

pub use config::{DefaultDecision, EnforcerConfig, DEFAULT_MAX_HIERARCHY_LEVEL};
pub use effect::{Effect, EffectKind, Effector, Verdict};
pub use enforcer::{Decision, EnforceContext, Enforcer, PolicySnapshot};
pub use error::{AuthzError, CompileError, EvalError, ModelError, PolicyError, Result};
pub use matcher::{Arity, CompiledMatcher, EvaluationContext, FunctionRegistry};
pub use model::{Assertion, Model, PolicyRow, PolicySet, Section};
pub use rbac::{DefaultRoleManager, MatchingFn, RoleLookup, RoleManager, RoleManagers, DEFAULT_DOMAIN};
