//! Row-to-tree denormalization.
//!
//! Authorization and identity queries join Subject×Role×Permission×Resource
//! and come back as one flat row per (subject, role, resource, action)
//! combination. The functions here collapse those rows into nested trees in
//! a single pass, without re-querying.
//!
//! `group_adjacent` documents a precondition: input rows must already be
//! contiguous by the group key (ordered query output). Because unsorted
//! input would silently produce fragmented groups, every entry point sorts
//! defensively (stable) by the group key before the merge pass.

use serde::Serialize;
use uuid::Uuid;

/// One flat row of the subject permission join, ordered by
/// `(subject_id, role_id, resource)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRow {
    pub subject_id: Uuid,
    pub role_id: Uuid,
    pub role_name: String,
    pub role_deleted: bool,
    pub resource: String,
    pub action: String,
}

/// One flat row of the role permission join, ordered by `role_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePermissionRow {
    pub role_id: Uuid,
    pub role_name: String,
    pub resource: String,
    pub action: String,
}

/// One flat row of the resource permission join, ordered by `resource_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePermissionRow {
    pub resource_id: Uuid,
    pub resource: String,
    pub action: String,
}

/// Actions granted on a single resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceGrant {
    pub resource: String,
    pub actions: Vec<String>,
}

/// A role and the resource grants it bundles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleGrant {
    pub role_id: Uuid,
    pub role_name: String,
    pub resources: Vec<ResourceGrant>,
}

/// Fully resolved permissions of one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubjectGrants {
    pub subject_id: Uuid,
    pub roles: Vec<RoleGrant>,
}

/// Permission listing for one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourcePermissions {
    pub resource_id: Uuid,
    pub resource: String,
    pub actions: Vec<String>,
}

/// One merged group: the first row of the group plus the collected values.
///
/// Scalar fields are read off `head`, mirroring how ordered join output
/// repeats them on every row of the group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group<R, V> {
    pub head: R,
    pub values: Vec<V>,
}

/// Merge rows that share a group key, collecting one value per row.
///
/// Precondition: rows contiguous by `key` (ordered query output). Input is
/// sorted defensively (stable) first, so out-of-order rows still land in the
/// right group instead of silently fragmenting.
pub fn group_adjacent<R, K, V>(
    rows: &[R],
    key: impl Fn(&R) -> K,
    collect: impl Fn(&R) -> V,
) -> Vec<Group<R, V>>
where
    R: Clone,
    K: Ord,
{
    let mut order: Vec<usize> = (0..rows.len()).collect();
    order.sort_by(|&a, &b| key(&rows[a]).cmp(&key(&rows[b])));

    let mut groups: Vec<Group<R, V>> = Vec::new();
    let mut current_key: Option<K> = None;

    for index in order {
        let row = &rows[index];
        let row_key = key(row);
        if current_key.as_ref() != Some(&row_key) {
            groups.push(Group {
                head: row.clone(),
                values: Vec::new(),
            });
            current_key = Some(row_key);
        }
        if let Some(group) = groups.last_mut() {
            group.values.push(collect(row));
        }
    }

    groups
}

/// Collapse subject permission rows into subject → role → resource → actions.
///
/// The subject level is an adjacent merge; the role level merges by linear
/// search, so rows with the same role id join the first occurrence even when
/// they are not adjacent. Rows whose role is flagged deleted are consumed
/// from the stream but contribute nothing.
#[must_use]
pub fn subject_tree(rows: &[PermissionRow]) -> Vec<SubjectGrants> {
    let mut order: Vec<usize> = (0..rows.len()).collect();
    order.sort_by(|&a, &b| rows[a].subject_id.cmp(&rows[b].subject_id));

    let mut subjects: Vec<SubjectGrants> = Vec::new();

    for index in order {
        let row = &rows[index];

        if subjects.last().map(|s| s.subject_id) != Some(row.subject_id) {
            subjects.push(SubjectGrants {
                subject_id: row.subject_id,
                roles: Vec::new(),
            });
        }

        if row.role_deleted {
            continue;
        }

        let Some(subject) = subjects.last_mut() else {
            continue;
        };

        let role_index = subject
            .roles
            .iter()
            .position(|role| role.role_id == row.role_id)
            .unwrap_or_else(|| {
                subject.roles.push(RoleGrant {
                    role_id: row.role_id,
                    role_name: row.role_name.clone(),
                    resources: Vec::new(),
                });
                subject.roles.len() - 1
            });

        push_action(
            &mut subject.roles[role_index].resources,
            &row.resource,
            &row.action,
        );
    }

    subjects
}

/// Collapse role permission rows into role → resource → actions.
#[must_use]
pub fn role_tree(rows: &[RolePermissionRow]) -> Vec<RoleGrant> {
    let mut order: Vec<usize> = (0..rows.len()).collect();
    order.sort_by(|&a, &b| rows[a].role_id.cmp(&rows[b].role_id));

    let mut roles: Vec<RoleGrant> = Vec::new();

    for index in order {
        let row = &rows[index];
        if roles.last().map(|r| r.role_id) != Some(row.role_id) {
            roles.push(RoleGrant {
                role_id: row.role_id,
                role_name: row.role_name.clone(),
                resources: Vec::new(),
            });
        }
        if let Some(role) = roles.last_mut() {
            push_action(&mut role.resources, &row.resource, &row.action);
        }
    }

    roles
}

/// Collapse resource permission rows into resource → actions.
#[must_use]
pub fn resource_tree(rows: &[ResourcePermissionRow]) -> Vec<ResourcePermissions> {
    let mut order: Vec<usize> = (0..rows.len()).collect();
    order.sort_by(|&a, &b| rows[a].resource_id.cmp(&rows[b].resource_id));

    let mut resources: Vec<ResourcePermissions> = Vec::new();

    for index in order {
        let row = &rows[index];
        if resources.last().map(|r| r.resource_id) != Some(row.resource_id) {
            resources.push(ResourcePermissions {
                resource_id: row.resource_id,
                resource: row.resource.clone(),
                actions: Vec::new(),
            });
        }
        if let Some(resource) = resources.last_mut() {
            resource.actions.push(row.action.clone());
        }
    }

    resources
}

fn push_action(resources: &mut Vec<ResourceGrant>, resource: &str, action: &str) {
    if let Some(grant) = resources.iter_mut().find(|g| g.resource == resource) {
        grant.actions.push(action.to_string());
        return;
    }
    resources.push(ResourceGrant {
        resource: resource.to_string(),
        actions: vec![action.to_string()],
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Flat {
        id: i64,
        a: &'static str,
    }

    fn permission_row(
        subject: Uuid,
        role: Uuid,
        role_name: &str,
        deleted: bool,
        resource: &str,
        action: &str,
    ) -> PermissionRow {
        PermissionRow {
            subject_id: subject,
            role_id: role,
            role_name: role_name.to_string(),
            role_deleted: deleted,
            resource: resource.to_string(),
            action: action.to_string(),
        }
    }

    #[test]
    fn group_adjacent_merges_sorted_rows() {
        let rows = vec![
            Flat { id: 1, a: "x" },
            Flat { id: 1, a: "y" },
            Flat { id: 2, a: "z" },
        ];
        let groups = group_adjacent(&rows, |r| r.id, |r| r.a);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].head.id, 1);
        assert_eq!(groups[0].values, vec!["x", "y"]);
        assert_eq!(groups[1].head.id, 2);
        assert_eq!(groups[1].values, vec!["z"]);
    }

    #[test]
    fn group_adjacent_sorts_defensively() {
        // Out-of-order input would fragment groups in a pure adjacency merge.
        let rows = vec![
            Flat { id: 2, a: "z" },
            Flat { id: 1, a: "x" },
            Flat { id: 2, a: "w" },
            Flat { id: 1, a: "y" },
        ];
        let groups = group_adjacent(&rows, |r| r.id, |r| r.a);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].values, vec!["x", "y"]);
        assert_eq!(groups[1].values, vec!["z", "w"]);
    }

    #[test]
    fn group_adjacent_empty_input() {
        let groups = group_adjacent(&Vec::<Flat>::new(), |r| r.id, |r| r.a);
        assert!(groups.is_empty());
    }

    #[test]
    fn subject_tree_three_levels() {
        let subject = Uuid::new_v4();
        let role = Uuid::new_v4();
        let rows = vec![
            permission_row(subject, role, "admin", false, "OAUTH2_global", "*"),
            permission_row(subject, role, "admin", false, "OAUTH2_role", "create"),
            permission_row(subject, role, "admin", false, "OAUTH2_role", "select"),
        ];

        let tree = subject_tree(&rows);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].subject_id, subject);
        assert_eq!(tree[0].roles.len(), 1);

        let grants = &tree[0].roles[0].resources;
        assert_eq!(grants.len(), 2);
        assert_eq!(grants[0].resource, "OAUTH2_global");
        assert_eq!(grants[0].actions, vec!["*"]);
        assert_eq!(grants[1].resource, "OAUTH2_role");
        assert_eq!(grants[1].actions, vec!["create", "select"]);
    }

    #[test]
    fn subject_tree_merges_non_adjacent_roles() {
        // Role level is a linear-search merge: a role reappearing after
        // another role still folds into its first occurrence.
        let subject = Uuid::new_v4();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let rows = vec![
            permission_row(subject, first, "editor", false, "OAUTH2_role", "update"),
            permission_row(subject, second, "viewer", false, "OAUTH2_role", "select"),
            permission_row(subject, first, "editor", false, "OAUTH2_user", "update"),
        ];

        let tree = subject_tree(&rows);
        assert_eq!(tree[0].roles.len(), 2);

        let editor = tree[0]
            .roles
            .iter()
            .find(|r| r.role_name == "editor")
            .expect("editor role");
        assert_eq!(editor.resources.len(), 2);
    }

    #[test]
    fn subject_tree_skips_deleted_roles() {
        let subject = Uuid::new_v4();
        let live = Uuid::new_v4();
        let dead = Uuid::new_v4();
        let rows = vec![
            permission_row(subject, dead, "ghost", true, "OAUTH2_global", "*"),
            permission_row(subject, live, "viewer", false, "OAUTH2_role", "select"),
        ];

        let tree = subject_tree(&rows);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].roles.len(), 1);
        assert_eq!(tree[0].roles[0].role_name, "viewer");
    }

    #[test]
    fn subject_tree_all_roles_deleted_keeps_empty_subject() {
        // The subject still appears; a deleted role grants nothing.
        let subject = Uuid::new_v4();
        let rows = vec![permission_row(
            subject,
            Uuid::new_v4(),
            "ghost",
            true,
            "OAUTH2_global",
            "*",
        )];
        let tree = subject_tree(&rows);
        assert_eq!(tree.len(), 1);
        assert!(tree[0].roles.is_empty());
    }

    #[test]
    fn role_tree_two_levels() {
        let role = Uuid::new_v4();
        let rows = vec![
            RolePermissionRow {
                role_id: role,
                role_name: "viewer".to_string(),
                resource: "OAUTH2_role".to_string(),
                action: "select".to_string(),
            },
            RolePermissionRow {
                role_id: role,
                role_name: "viewer".to_string(),
                resource: "OAUTH2_user".to_string(),
                action: "select".to_string(),
            },
        ];
        let tree = role_tree(&rows);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].resources.len(), 2);
    }

    #[test]
    fn resource_tree_collects_actions() {
        let id = Uuid::new_v4();
        let actions = ["*", "create", "update", "delete", "select"];
        let rows: Vec<ResourcePermissionRow> = actions
            .iter()
            .map(|action| ResourcePermissionRow {
                resource_id: id,
                resource: "OAUTH2_user".to_string(),
                action: (*action).to_string(),
            })
            .collect();

        let tree = resource_tree(&rows);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].actions, actions);
    }
}
