//! Project membership graph: role assignments, the "at least one manager"
//! invariant, and project-tree consistency.
//!
//! Everything here is evaluated against rows the caller has already loaded
//! (and locked) inside the mutation's transaction.

use std::collections::{HashMap, VecDeque};

use crate::error::CoreError;
use crate::permissions::PermissionSet;
use crate::types::{ActorId, ProjectId};

// ---------------------------------------------------------------------------
// Role assignments
// ---------------------------------------------------------------------------

/// One `(project, actor, role)` assignment with the role's permission keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGrant {
    pub project_id: ProjectId,
    pub actor_id: ActorId,
    pub role: String,
    pub permissions: Vec<String>,
}

/// Union of the permission keys `actor` holds on exactly `project`.
///
/// Ancestors and descendants are not consulted.
pub fn effective_permissions(
    grants: &[RoleGrant],
    actor: ActorId,
    project: ProjectId,
) -> PermissionSet {
    grants
        .iter()
        .filter(|g| g.actor_id == actor && g.project_id == project)
        .flat_map(|g| g.permissions.iter().cloned())
        .collect()
}

/// [`effective_permissions`] of one actor for every project it has a grant on.
pub fn permissions_by_project(
    grants: &[RoleGrant],
    actor: ActorId,
) -> HashMap<ProjectId, PermissionSet> {
    grants
        .iter()
        .filter(|g| g.actor_id == actor)
        .map(|g| g.project_id)
        .map(|project| (project, effective_permissions(grants, actor, project)))
        .collect()
}

// ---------------------------------------------------------------------------
// Manager invariant
// ---------------------------------------------------------------------------

/// The current role of one member of a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRole {
    pub actor_id: ActorId,
    pub role: String,
}

/// A pending mutation of a project's assignment set.
///
/// An actor holds at most one role per project, so `Assign` on an existing
/// member replaces its role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignmentChange {
    Assign { actor_id: ActorId, role: String },
    Remove { actor_id: ActorId },
}

impl AssignmentChange {
    pub fn actor_id(&self) -> ActorId {
        match self {
            AssignmentChange::Assign { actor_id, .. } | AssignmentChange::Remove { actor_id } => {
                *actor_id
            }
        }
    }
}

/// Apply `change` to `current` and return the resulting member list.
pub fn apply_change(current: &[MemberRole], change: &AssignmentChange) -> Vec<MemberRole> {
    let mut next: Vec<MemberRole> = current
        .iter()
        .filter(|m| m.actor_id != change.actor_id())
        .cloned()
        .collect();
    if let AssignmentChange::Assign { actor_id, role } = change {
        next.push(MemberRole {
            actor_id: *actor_id,
            role: role.clone(),
        });
    }
    next
}

/// Reject `change` if it would leave the project without a manager.
///
/// `current` must be the live assignment set, read under a row lock.
pub fn ensure_manager_remains(
    current: &[MemberRole],
    change: &AssignmentChange,
    manager_role: &str,
) -> Result<(), CoreError> {
    let next = apply_change(current, change);
    if next.iter().any(|m| m.role == manager_role) {
        return Ok(());
    }
    Err(CoreError::validation(
        "role",
        format!("A project must keep at least one member with the '{manager_role}' role"),
    ))
}

// ---------------------------------------------------------------------------
// Project tree
// ---------------------------------------------------------------------------

/// A project and its parent pointer, as stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectNode {
    pub id: ProjectId,
    pub parent_id: Option<ProjectId>,
}

/// Materialised position of a project in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreePosition {
    pub id: ProjectId,
    /// Ancestor ids, root first. Empty for roots.
    pub path: Vec<ProjectId>,
    pub depth: i32,
}

/// Validate moving `project` under `new_parent`.
///
/// `new_parent_path` is the materialised ancestor path of `new_parent`
/// (root first). A project may not become its own ancestor.
pub fn validate_parent_change(
    project: ProjectId,
    new_parent: Option<ProjectId>,
    new_parent_path: &[ProjectId],
) -> Result<(), CoreError> {
    let Some(parent) = new_parent else {
        return Ok(());
    };
    if parent == project || new_parent_path.contains(&project) {
        return Err(CoreError::validation(
            "parent_project",
            format!("Project {project} cannot be moved below itself or one of its descendants"),
        ));
    }
    Ok(())
}

/// Recompute the positions of `root` and all of its descendants.
///
/// `root_path` is the ancestor path of `root` itself; `nodes` must contain
/// the subtree (extra nodes are ignored). The result is ordered top-down and
/// is the same no matter how often it is recomputed.
pub fn rebuild_subtree(
    root: ProjectId,
    root_path: &[ProjectId],
    nodes: &[ProjectNode],
) -> Vec<TreePosition> {
    let mut children: HashMap<ProjectId, Vec<ProjectId>> = HashMap::new();
    for node in nodes {
        if let Some(parent) = node.parent_id {
            children.entry(parent).or_default().push(node.id);
        }
    }
    for ids in children.values_mut() {
        ids.sort_unstable();
    }

    let mut positions = Vec::new();
    let mut queue = VecDeque::from([(root, root_path.to_vec())]);
    while let Some((id, path)) = queue.pop_front() {
        // A corrupt cycle would otherwise loop forever.
        if path.contains(&id) {
            continue;
        }
        let mut child_path = path.clone();
        child_path.push(id);
        for child in children.get(&id).into_iter().flatten() {
            queue.push_back((*child, child_path.clone()));
        }
        positions.push(TreePosition {
            id,
            depth: path.len() as i32,
            path,
        });
    }
    positions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::{ROLE_OBSERVER, ROLE_PROJECT_MANAGER, ROLE_PROJECT_MEMBER};
    use assert_matches::assert_matches;

    fn member(actor_id: ActorId, role: &str) -> MemberRole {
        MemberRole {
            actor_id,
            role: role.to_string(),
        }
    }

    fn grant(project_id: ProjectId, actor_id: ActorId, perms: &[&str]) -> RoleGrant {
        RoleGrant {
            project_id,
            actor_id,
            role: "custom".into(),
            permissions: perms.iter().map(|p| p.to_string()).collect(),
        }
    }

    // -----------------------------------------------------------------------
    // Effective permissions
    // -----------------------------------------------------------------------

    #[test]
    fn test_effective_permissions_exact_project_only() {
        let grants = vec![
            grant(1, 10, &["view_task", "change_task"]),
            grant(2, 10, &["delete_task"]),
            grant(1, 11, &["delete_task"]),
        ];
        let perms = effective_permissions(&grants, 10, 1);
        assert!(perms.contains("view_task"));
        assert!(perms.contains("change_task"));
        assert!(!perms.contains("delete_task"));
    }

    #[test]
    fn test_permissions_by_project_groups_per_project() {
        let grants = vec![grant(1, 10, &["view_task"]), grant(2, 10, &["add_task"])];
        let map = permissions_by_project(&grants, 10);
        assert_eq!(map.len(), 2);
        assert!(map[&2].contains("add_task"));
        assert!(permissions_by_project(&grants, 99).is_empty());
    }

    #[test]
    fn test_permissions_by_project_matches_effective_permissions() {
        let grants = vec![
            grant(1, 10, &["view_task"]),
            grant(1, 11, &["delete_task"]),
            grant(3, 10, &["change_task"]),
        ];
        let map = permissions_by_project(&grants, 10);
        for project in [1, 3] {
            assert_eq!(map[&project], effective_permissions(&grants, 10, project));
        }
    }

    // -----------------------------------------------------------------------
    // Manager invariant
    // -----------------------------------------------------------------------

    #[test]
    fn test_removing_last_manager_rejected() {
        let current = vec![
            member(1, ROLE_PROJECT_MANAGER),
            member(2, ROLE_PROJECT_MEMBER),
        ];
        let result = ensure_manager_remains(
            &current,
            &AssignmentChange::Remove { actor_id: 1 },
            ROLE_PROJECT_MANAGER,
        );
        assert_matches!(result, Err(CoreError::Validation { field: "role", .. }));
    }

    #[test]
    fn test_demoting_last_manager_rejected() {
        let current = vec![member(1, ROLE_PROJECT_MANAGER)];
        let change = AssignmentChange::Assign {
            actor_id: 1,
            role: ROLE_OBSERVER.into(),
        };
        assert!(ensure_manager_remains(&current, &change, ROLE_PROJECT_MANAGER).is_err());
    }

    #[test]
    fn test_removing_one_of_two_managers_allowed() {
        let current = vec![
            member(1, ROLE_PROJECT_MANAGER),
            member(2, ROLE_PROJECT_MANAGER),
        ];
        let change = AssignmentChange::Remove { actor_id: 2 };
        assert!(ensure_manager_remains(&current, &change, ROLE_PROJECT_MANAGER).is_ok());
    }

    #[test]
    fn test_first_assignment_must_be_manager() {
        let to_member = AssignmentChange::Assign {
            actor_id: 1,
            role: ROLE_PROJECT_MEMBER.into(),
        };
        assert!(ensure_manager_remains(&[], &to_member, ROLE_PROJECT_MANAGER).is_err());

        let to_manager = AssignmentChange::Assign {
            actor_id: 1,
            role: ROLE_PROJECT_MANAGER.into(),
        };
        assert!(ensure_manager_remains(&[], &to_manager, ROLE_PROJECT_MANAGER).is_ok());
    }

    #[test]
    fn test_any_sequence_keeps_a_manager() {
        let changes = vec![
            AssignmentChange::Assign {
                actor_id: 2,
                role: ROLE_PROJECT_MEMBER.into(),
            },
            AssignmentChange::Remove { actor_id: 1 },
            AssignmentChange::Assign {
                actor_id: 2,
                role: ROLE_PROJECT_MANAGER.into(),
            },
            AssignmentChange::Remove { actor_id: 1 },
            AssignmentChange::Assign {
                actor_id: 2,
                role: ROLE_OBSERVER.into(),
            },
        ];
        let mut current = vec![member(1, ROLE_PROJECT_MANAGER)];
        for change in &changes {
            if ensure_manager_remains(&current, change, ROLE_PROJECT_MANAGER).is_ok() {
                current = apply_change(&current, change);
            }
            assert!(current.iter().any(|m| m.role == ROLE_PROJECT_MANAGER));
        }
        assert_eq!(current, vec![member(2, ROLE_PROJECT_MANAGER)]);
    }

    // -----------------------------------------------------------------------
    // Tree
    // -----------------------------------------------------------------------

    #[test]
    fn test_parent_change_rejects_self() {
        assert!(validate_parent_change(5, Some(5), &[]).is_err());
    }

    #[test]
    fn test_parent_change_rejects_descendant() {
        // 7's ancestors are [1, 5]: moving 5 below 7 would create a cycle.
        assert!(validate_parent_change(5, Some(7), &[1, 5]).is_err());
        assert!(validate_parent_change(5, Some(7), &[1, 2]).is_ok());
        assert!(validate_parent_change(5, None, &[]).is_ok());
    }

    #[test]
    fn test_rebuild_subtree_computes_paths() {
        let nodes = vec![
            ProjectNode { id: 2, parent_id: Some(1) },
            ProjectNode { id: 3, parent_id: Some(2) },
            ProjectNode { id: 4, parent_id: Some(2) },
            ProjectNode { id: 9, parent_id: None },
        ];
        let positions = rebuild_subtree(2, &[1], &nodes);
        assert_eq!(
            positions,
            vec![
                TreePosition { id: 2, path: vec![1], depth: 1 },
                TreePosition { id: 3, path: vec![1, 2], depth: 2 },
                TreePosition { id: 4, path: vec![1, 2], depth: 2 },
            ]
        );
    }

    #[test]
    fn test_rebuild_subtree_is_idempotent() {
        let nodes = vec![
            ProjectNode { id: 1, parent_id: None },
            ProjectNode { id: 2, parent_id: Some(1) },
        ];
        let first = rebuild_subtree(1, &[], &nodes);
        let second = rebuild_subtree(1, &[], &nodes);
        assert_eq!(first, second);
        assert_eq!(first[0].depth, 0);
    }

    #[test]
    fn test_rebuild_subtree_survives_cycles() {
        let nodes = vec![
            ProjectNode { id: 1, parent_id: Some(2) },
            ProjectNode { id: 2, parent_id: Some(1) },
        ];
        let positions = rebuild_subtree(1, &[], &nodes);
        assert_eq!(positions.len(), 2);
    }
}
