// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Permission resolution over the role → menu graph.
//!
//! A user's permissions are either the admin sentinel (any held role has
//! `is_admin`) or the union of `perms` over the non-disabled menus reachable
//! through their roles. The same graph drives the navigation tree shown in
//! the admin UI.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::models::{EntityId, Menu, RouterNode};
use crate::storage::{AuthDatabase, DbResult, PermissionCache, UserGraph};

/// String form of the admin sentinel.
pub const ALL_PERMISSIONS: &str = "*";

// =============================================================================
// PermissionSet
// =============================================================================

/// Effective permissions of a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionSet {
    /// Admin sentinel: every permission, including ones not yet defined.
    All,
    Granted(BTreeSet<String>),
}

impl PermissionSet {
    pub fn empty() -> Self {
        PermissionSet::Granted(BTreeSet::new())
    }

    pub fn is_all(&self) -> bool {
        matches!(self, PermissionSet::All)
    }

    pub fn contains(&self, permission: &str) -> bool {
        match self {
            PermissionSet::All => true,
            PermissionSet::Granted(perms) => perms.contains(permission),
        }
    }

    /// Whether the set satisfies a route requirement.
    ///
    /// An empty requirement is always satisfied; otherwise holding any one
    /// of the required permissions is enough.
    pub fn satisfies(&self, required: &[&str]) -> bool {
        required.is_empty() || required.iter().any(|p| self.contains(p))
    }

    /// Sorted permission strings, `["*"]` for the sentinel.
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            PermissionSet::All => vec![ALL_PERMISSIONS.to_string()],
            PermissionSet::Granted(perms) => perms.iter().cloned().collect(),
        }
    }
}

impl FromIterator<String> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        PermissionSet::Granted(iter.into_iter().collect())
    }
}

impl Serialize for PermissionSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_vec().serialize(serializer)
    }
}

// =============================================================================
// Resolution
// =============================================================================

/// Effective permissions of the user in `graph`.
pub fn effective_permissions(graph: &UserGraph) -> PermissionSet {
    if graph.is_admin() {
        return PermissionSet::All;
    }
    graph
        .menus
        .values()
        .filter(|menu| !menu.disabled)
        .filter_map(|menu| menu.perms.as_deref())
        .map(str::trim)
        .filter(|perm| !perm.is_empty())
        .map(str::to_string)
        .collect()
}

/// Build the navigation tree.
///
/// Roots are the `visible` menus whose parent is absent or not itself
/// visible. Children of a node are the `all` menus pointing at it, expanded
/// recursively. Siblings are ordered by `order` with ties keeping their
/// input order.
pub fn build_menu_tree(all: &[Menu], visible: &[Menu]) -> Vec<RouterNode> {
    let visible_ids: HashSet<EntityId> = visible.iter().map(|m| m.id).collect();

    let mut children_of: HashMap<EntityId, Vec<&Menu>> = HashMap::new();
    for menu in all {
        if let Some(parent_id) = menu.parent_id {
            children_of.entry(parent_id).or_default().push(menu);
        }
    }

    let roots: Vec<&Menu> = visible
        .iter()
        .filter(|m| m.parent_id.is_none_or(|p| !visible_ids.contains(&p)))
        .collect();

    let mut expanded = HashSet::new();
    build_level(&roots, &children_of, &mut expanded)
}

fn build_level(
    menus: &[&Menu],
    children_of: &HashMap<EntityId, Vec<&Menu>>,
    expanded: &mut HashSet<EntityId>,
) -> Vec<RouterNode> {
    let mut nodes = Vec::with_capacity(menus.len());
    for menu in menus {
        // Guards against a corrupted parent chain looping forever
        if !expanded.insert(menu.id) {
            continue;
        }
        let mut node = RouterNode::from(*menu);
        if let Some(children) = children_of.get(&menu.id) {
            node.children = build_level(children, children_of, expanded);
        }
        nodes.push(node);
    }
    nodes.sort_by_key(|node| node.meta.order);
    nodes
}

/// The menus a user may navigate to.
///
/// Admins see every enabled directory and page; everyone else sees the
/// enabled menus reachable through their roles.
pub fn visible_menus(graph: &UserGraph, all_menus: &[Menu]) -> Vec<Menu> {
    if graph.is_admin() {
        all_menus
            .iter()
            .filter(|m| !m.disabled && m.menu_type.is_navigable())
            .cloned()
            .collect()
    } else {
        graph.menus.values().filter(|m| !m.disabled).cloned().collect()
    }
}

// =============================================================================
// PermissionResolver
// =============================================================================

/// Resolves permissions and menu trees, optionally through a cache.
#[derive(Clone)]
pub struct PermissionResolver {
    db: Arc<AuthDatabase>,
    cache: Option<Arc<PermissionCache>>,
}

impl PermissionResolver {
    pub fn new(db: Arc<AuthDatabase>, cache: Option<Arc<PermissionCache>>) -> Self {
        Self { db, cache }
    }

    /// Effective permissions, served from the cache when fresh.
    pub fn permissions(&self, graph: &UserGraph) -> PermissionSet {
        let user_id = graph.user.id;
        if let Some(cached) = self.cache.as_ref().and_then(|c| c.get(user_id)) {
            return cached;
        }
        let permissions = effective_permissions(graph);
        if let Some(cache) = &self.cache {
            cache.put(user_id, permissions.clone(), graph.cache_generation);
        }
        permissions
    }

    /// Navigation tree for the user in `graph`.
    pub fn menu_tree(&self, graph: &UserGraph) -> DbResult<Vec<RouterNode>> {
        let menus = if graph.is_admin() {
            visible_menus(graph, &self.db.list_menus()?)
        } else {
            visible_menus(graph, &[])
        };
        Ok(build_menu_tree(&menus, &menus))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MenuType, Role, User};
    use std::collections::BTreeMap;

    fn menu(id: EntityId, parent: Option<EntityId>, order: i32) -> Menu {
        let mut m = Menu::new(format!("Menu {id}"), format!("menu{id}"), MenuType::Page).with_order(order);
        m.id = id;
        m.parent_id = parent;
        m
    }

    fn graph(roles: Vec<Role>, menus: Vec<Menu>) -> UserGraph {
        let mut user = User::new("13800001111", "Alice", "h");
        user.id = 1;
        UserGraph {
            user,
            roles,
            menus: menus.into_iter().map(|m| (m.id, m)).collect::<BTreeMap<_, _>>(),
            cache_generation: 0,
        }
    }

    fn admin_role() -> Role {
        let mut role = Role::new("admin", "Admin");
        role.is_admin = true;
        role
    }

    fn assert_sorted(nodes: &[RouterNode]) {
        assert!(nodes.windows(2).all(|w| w[0].meta.order <= w[1].meta.order));
        for node in nodes {
            assert_sorted(&node.children);
        }
    }

    #[test]
    fn admin_short_circuits_to_sentinel() {
        let g = graph(vec![Role::new("editor", "Editor"), admin_role()], vec![]);
        let perms = effective_permissions(&g);
        assert!(perms.is_all());
        assert!(perms.contains("anything.at.all"));
        assert_eq!(perms.to_vec(), vec!["*"]);
    }

    #[test]
    fn union_skips_disabled_and_empty_perms() {
        let mut disabled = menu(3, None, 0).with_perms("doc.delete");
        disabled.disabled = true;
        let g = graph(
            vec![Role::new("editor", "Editor")],
            vec![
                menu(1, None, 0).with_perms("doc.edit"),
                menu(2, None, 0).with_perms("  "),
                disabled,
                menu(4, None, 0),
                menu(5, None, 0).with_perms("doc.view"),
            ],
        );
        let perms = effective_permissions(&g);
        assert_eq!(perms.to_vec(), vec!["doc.edit", "doc.view"]);
    }

    #[test]
    fn satisfies_needs_any_required_permission() {
        let perms = PermissionSet::from_iter(["doc.edit".to_string()]);
        assert!(perms.satisfies(&[]));
        assert!(perms.satisfies(&["doc.edit", "doc.delete"]));
        assert!(!perms.satisfies(&["doc.delete"]));
        assert!(PermissionSet::All.satisfies(&["doc.delete"]));
        assert!(!PermissionSet::empty().satisfies(&["doc.edit"]));
    }

    #[test]
    fn tree_nests_and_sorts_every_level() {
        let menus = vec![
            menu(1, None, 2),
            menu(2, None, 1),
            menu(3, Some(1), 5),
            menu(4, Some(1), 3),
            menu(5, Some(4), 0),
        ];
        let tree = build_menu_tree(&menus, &menus);

        assert_eq!(tree.iter().map(|n| n.id).collect::<Vec<_>>(), vec![2, 1]);
        let children: Vec<_> = tree[1].children.iter().map(|n| n.id).collect();
        assert_eq!(children, vec![4, 3]);
        assert_eq!(tree[1].children[0].children[0].id, 5);
        assert_sorted(&tree);
    }

    #[test]
    fn equal_orders_keep_input_order() {
        let menus = vec![menu(9, None, 1), menu(3, None, 1), menu(5, None, 0)];
        let tree = build_menu_tree(&menus, &menus);
        assert_eq!(tree.iter().map(|n| n.id).collect::<Vec<_>>(), vec![5, 9, 3]);
    }

    #[test]
    fn orphaned_visible_menus_become_roots() {
        let all = vec![menu(1, None, 0), menu(2, Some(1), 0), menu(3, Some(2), 0)];
        let visible = vec![menu(2, Some(1), 0), menu(3, Some(2), 0)];
        let tree = build_menu_tree(&all, &visible);

        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].id, 2);
        assert_eq!(tree[0].children[0].id, 3);
    }

    #[test]
    fn rebuilding_is_stable() {
        let menus = vec![menu(1, None, 3), menu(2, Some(1), 2), menu(3, Some(1), 1), menu(4, None, 0)];
        let first = build_menu_tree(&menus, &menus);
        let second = build_menu_tree(&menus, &menus);
        assert_eq!(first, second);
    }

    #[test]
    fn admins_see_enabled_navigable_menus_only() {
        let mut hidden_action = menu(3, Some(1), 0);
        hidden_action.menu_type = MenuType::Action;
        let mut disabled = menu(4, None, 0);
        disabled.disabled = true;
        let all = vec![menu(1, None, 0), menu(2, Some(1), 0), hidden_action, disabled];

        let g = graph(vec![admin_role()], vec![]);
        let ids: Vec<_> = visible_menus(&g, &all).iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn non_admins_see_role_menus() {
        let mut disabled = menu(2, None, 0);
        disabled.disabled = true;
        let g = graph(vec![Role::new("editor", "Editor")], vec![menu(1, None, 0), disabled]);
        let all = vec![menu(1, None, 0), menu(7, None, 0)];
        let ids: Vec<_> = visible_menus(&g, &all).iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn resolver_caches_per_user() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(AuthDatabase::open(&dir.path().join("test.redb")).unwrap());
        let cache = Arc::new(PermissionCache::new(8, std::time::Duration::from_secs(60)));
        let resolver = PermissionResolver::new(db, Some(cache.clone()));

        let g = graph(vec![Role::new("editor", "Editor")], vec![menu(1, None, 0).with_perms("doc.edit")]);
        assert!(resolver.permissions(&g).contains("doc.edit"));
        assert_eq!(cache.get(1), Some(PermissionSet::from_iter(["doc.edit".to_string()])));
    }

    #[test]
    fn revoked_permission_is_not_restored_by_an_older_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(PermissionCache::new(8, std::time::Duration::from_secs(60)));
        let db = Arc::new(
            AuthDatabase::open(&dir.path().join("test.redb"))
                .unwrap()
                .with_permission_cache(cache.clone()),
        );
        let resolver = PermissionResolver::new(db.clone(), Some(cache));

        let delete = db
            .create_menu(Menu::new("Delete", "delete", MenuType::Action).with_perms("doc.delete"))
            .unwrap();
        let mut role = Role::new("editor", "Editor");
        role.menu_ids.insert(delete.id);
        let mut role = db.create_role(role).unwrap();
        let mut user = User::new("13800001111", "Alice", "h");
        user.role_ids.insert(role.id);
        let user = db.create_user(user).unwrap();

        let stale = db.load_user_graph(user.id).unwrap().unwrap();
        role.menu_ids.clear();
        db.put_role(&role).unwrap();

        // A request still holding the old snapshot finishes after the revoke
        assert!(resolver.permissions(&stale).contains("doc.delete"));

        let fresh = db.load_user_graph(user.id).unwrap().unwrap();
        assert!(fresh.menus.is_empty());
        assert!(!resolver.permissions(&fresh).contains("doc.delete"));
    }
}
