// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use loom_authz::{MemoryAdapter, Model, SyncedEnforcer};
use proptest::prelude::*;

const MODEL: &str = r#"
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

#[derive(Debug, Clone)]
enum Edit {
	AddPolicy(String, String),
	RemovePolicy(String, String),
	AddRole(String, String),
	DeleteRoles(String),
	RemoveObject(String),
}

fn edit() -> impl Strategy<Value = Edit> {
	let name = "[a-c]";
	prop_oneof![
		(name, name).prop_map(|(s, o)| Edit::AddPolicy(s, o)),
		(name, name).prop_map(|(s, o)| Edit::RemovePolicy(s, o)),
		(name, name).prop_map(|(u, r)| Edit::AddRole(u, r)),
		name.prop_map(Edit::DeleteRoles),
		name.prop_map(Edit::RemoveObject),
	]
}

proptest! {
	// With auto-save, incremental writes keep storage equal to the in-memory policy.
	#[test]
	fn storage_tracks_memory(edits in proptest::collection::vec(edit(), 0..24)) {
		tokio_test::block_on(async {
			let adapter = Arc::new(MemoryAdapter::new());
			let enforcer = SyncedEnforcer::builder(Model::from_text(MODEL).unwrap())
				.adapter(adapter.clone())
				.build()
				.await
				.unwrap();

			for edit in &edits {
				match edit {
					Edit::AddPolicy(s, o) => {
						enforcer.add_policy([s.as_str(), o.as_str(), "read"]).await.unwrap();
					}
					Edit::RemovePolicy(s, o) => {
						enforcer.remove_policy([s.as_str(), o.as_str(), "read"]).await.unwrap();
					}
					Edit::AddRole(u, r) => {
						enforcer.add_role_for_user(u, r, None).await.unwrap();
					}
					Edit::DeleteRoles(u) => {
						enforcer.delete_roles_for_user(u, None).await.unwrap();
					}
					Edit::RemoveObject(o) => {
						enforcer.remove_filtered_policy(1, [o.as_str()]).await.unwrap();
					}
				}
			}

			assert_eq!(adapter.snapshot().as_set(), enforcer.policy_set().as_set());
		});
	}
}
