//! Decision engine.
//!
//! `Engine::can` composes the policy layers into a single decision for one
//! `(actor, operation, entity)` triple:
//!
//! 1. Superusers are allowed outright, except that the DSS invariants (the
//!    flag never changes, no move across a container boundary) still apply.
//! 2. Lifecycle guard: edits of trashed entities and illegal trash / restore /
//!    hard-delete transitions are rejected before anything else.
//! 3. Permission guard: creation rules, or global permission OR project role
//!    OR privilege override for existing entities. Skipped in a trusted
//!    context.
//! 4. Lock guard: edits of lockable entities locked by someone else.
//! 5. DSS guard: the container policy narrows whatever survived.
//!
//! The first failing guard wins and its error carries the reason.

use std::collections::HashMap;

use crate::dss::{self, DssContainer, DssOperation};
use crate::entity::{Capability, EditKind, EntityState, EntityType};
use crate::error::CoreError;
use crate::locking::{self, LockRecord};
use crate::permissions::{has_global_permission, permission_key, Action, Actor, PermissionSet};
use crate::privilege::{self, PrivilegeAxis, PrivilegeOverride, PrivilegeValue};
use crate::soft_delete::{self, Transition};
use crate::config::EngineConfig;
use crate::trusted::TrustedContext;
use crate::types::{ProjectId, Timestamp};

/// `Ok(())` is Allow; `Err` is a typed rejection.
pub type Decision = Result<(), CoreError>;

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// A pending move of a project in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentChange {
    pub old_parent: Option<ProjectId>,
    pub new_parent: Option<ProjectId>,
}

/// What the caller is about to do to the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    View,
    Edit(EditKind),
    Trash,
    Restore,
    Delete,
    AddToProject(ProjectId),
    RemoveFromProject(ProjectId),
    ChangeParent(ParentChange),
    ManagePrivileges,
}

impl Operation {
    /// Operations that change the entity and are therefore blocked by the
    /// trash and by foreign locks.
    pub fn is_edit(&self) -> bool {
        matches!(
            self,
            Operation::Edit(_)
                | Operation::AddToProject(_)
                | Operation::RemoveFromProject(_)
                | Operation::ChangeParent(_)
        )
    }

    /// Projects, besides the entity's own, whose role permissions the
    /// decision needs.
    pub fn referenced_projects(&self) -> Vec<ProjectId> {
        match self {
            Operation::AddToProject(p) | Operation::RemoveFromProject(p) => vec![*p],
            Operation::ChangeParent(change) => change
                .old_parent
                .into_iter()
                .chain(change.new_parent)
                .collect(),
            _ => Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Everything the engine needs, loaded by the caller inside the mutation's
/// transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessSnapshot {
    pub actor: Actor,
    pub entity: EntityState,
    /// The actor's role permissions per project (entity projects plus the
    /// operation's referenced projects). Missing projects grant nothing.
    pub project_permissions: HashMap<ProjectId, PermissionSet>,
    /// The actor's override row on the entity, if any.
    pub privilege: Option<PrivilegeOverride>,
    /// All stored lock rows for the entity.
    pub locks: Vec<LockRecord>,
    /// The entity's DSS container, when it is DSS-backed.
    pub container: Option<DssContainer>,
}

impl AccessSnapshot {
    pub fn new(actor: Actor, entity: EntityState) -> Self {
        Self {
            actor,
            entity,
            project_permissions: HashMap::new(),
            privilege: None,
            locks: Vec::new(),
            container: None,
        }
    }

    pub fn with_project_permissions<I, S>(mut self, project: ProjectId, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.project_permissions
            .entry(project)
            .or_default()
            .extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn with_privilege(mut self, privilege: PrivilegeOverride) -> Self {
        self.privilege = Some(privilege);
        self
    }

    pub fn with_locks(mut self, locks: Vec<LockRecord>) -> Self {
        self.locks = locks;
        self
    }

    pub fn with_container(mut self, container: DssContainer) -> Self {
        self.container = Some(container);
        self
    }

    fn project_grants(&self, project: ProjectId, key: &str) -> bool {
        self.project_permissions
            .get(&project)
            .is_some_and(|perms| perms.contains(key))
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

struct Request<'a> {
    snapshot: &'a AccessSnapshot,
    op: Operation,
    trusted: &'a TrustedContext,
    now: Timestamp,
}

type Guard = fn(&Engine, &Request<'_>) -> Decision;

/// Guards in evaluation order.
const PIPELINE: &[(&str, Guard)] = &[
    ("lifecycle", lifecycle_guard),
    ("permission", permission_guard),
    ("lock", lock_guard),
    ("dss", dss_guard),
];

/// The decision engine. Cheap to clone; holds only configuration.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Decide whether `snapshot.actor` may perform `op` on `snapshot.entity`.
    ///
    /// Superusers skip every guard except [`dss::check_invariants`].
    pub fn can(
        &self,
        snapshot: &AccessSnapshot,
        op: Operation,
        trusted: &TrustedContext,
        now: Timestamp,
    ) -> Decision {
        if snapshot.actor.is_superuser {
            return dss_invariants(&snapshot.entity, op);
        }
        let request = Request {
            snapshot,
            op,
            trusted,
            now,
        };
        PIPELINE
            .iter()
            .try_for_each(|(_, guard)| guard(self, &request))
    }
}

// ---------------------------------------------------------------------------
// Guards
// ---------------------------------------------------------------------------

fn lifecycle_guard(_engine: &Engine, req: &Request<'_>) -> Decision {
    let entity = &req.snapshot.entity;
    if req.op.is_edit() {
        return soft_delete::ensure_editable(entity);
    }
    let transition = match req.op {
        Operation::Trash => Transition::Trash,
        Operation::Restore => Transition::Restore,
        Operation::Delete => Transition::HardDelete,
        _ => return Ok(()),
    };
    soft_delete::check_transition(entity, transition).map(|_| ())
}

fn permission_guard(_engine: &Engine, req: &Request<'_>) -> Decision {
    if req.trusted.is_trusted() {
        return Ok(());
    }
    let snapshot = req.snapshot;
    let entity = &snapshot.entity;

    match req.op {
        Operation::Create => check_create(snapshot),
        Operation::View => check_action(snapshot, Action::View),
        Operation::Edit(_) => check_action(snapshot, Action::Edit),
        Operation::Trash => check_action(snapshot, Action::Trash),
        Operation::Restore => check_action(snapshot, Action::Restore),
        Operation::Delete => check_action(snapshot, Action::Delete),
        Operation::AddToProject(project) => {
            ensure_project_scoped(entity)?;
            check_action(snapshot, Action::Edit)?;
            if has_global_permission(&snapshot.actor, entity.entity_type(), Action::Add, true)
                || snapshot.project_grants(project, &permission_key(Action::Add, entity.entity_type()))
            {
                return Ok(());
            }
            Err(CoreError::denied(format!(
                "You are not allowed to add a {} to project {project}",
                entity.entity_type()
            )))
        }
        Operation::RemoveFromProject(project) => {
            ensure_project_scoped(entity)?;
            if !entity.project_ids.contains(&project) {
                return Err(CoreError::validation(
                    "projects",
                    format!("{} is not part of project {project}", entity.entity),
                ));
            }
            check_action(snapshot, Action::Edit)
        }
        Operation::ChangeParent(change) => check_parent_change(snapshot, change),
        Operation::ManagePrivileges => {
            if privilege::effective(snapshot.privilege.as_ref(), PrivilegeAxis::FullAccess) {
                return Ok(());
            }
            Err(CoreError::denied(format!(
                "Only actors with full access may manage privileges of {}",
                entity.entity
            )))
        }
    }
}

fn lock_guard(engine: &Engine, req: &Request<'_>) -> Decision {
    let snapshot = req.snapshot;
    if !req.op.is_edit() || !snapshot.entity.has(Capability::Lockable) {
        return Ok(());
    }
    locking::ensure_not_locked_by_other(
        &snapshot.locks,
        snapshot.actor.id,
        req.now,
        &engine.config.locks,
    )
}

fn dss_guard(_engine: &Engine, req: &Request<'_>) -> Decision {
    let entity = &req.snapshot.entity;
    if !entity.has(Capability::DssOverridable) {
        return Ok(());
    }

    let Some(attrs) = entity.dss_attrs() else {
        return dss_invariants(entity, req.op);
    };

    let op = match req.op {
        Operation::Create => DssOperation::Create {
            imported: attrs.imported,
        },
        Operation::Edit(kind) => DssOperation::Edit(kind),
        Operation::AddToProject(_) | Operation::RemoveFromProject(_) => {
            DssOperation::Edit(EditKind::MetadataOnly)
        }
        Operation::Trash => DssOperation::Trash,
        Operation::Restore => DssOperation::Restore,
        Operation::Delete => DssOperation::Delete,
        Operation::View | Operation::ChangeParent(_) | Operation::ManagePrivileges => {
            return Ok(())
        }
    };

    let container = req
        .snapshot
        .container
        .as_ref()
        .filter(|c| c.id == attrs.container_id)
        .ok_or_else(|| {
            CoreError::Internal(format!(
                "DSS container {} of {} was not loaded",
                attrs.container_id, entity.entity
            ))
        })?;
    dss::check(container, attrs, op)
}

fn dss_invariants(entity: &EntityState, op: Operation) -> Decision {
    match op {
        Operation::Edit(kind) if entity.has(Capability::DssOverridable) => {
            dss::check_invariants(entity.dss_attrs(), kind)
        }
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Permission helpers
// ---------------------------------------------------------------------------

fn ensure_project_scoped(entity: &EntityState) -> Decision {
    if entity.entity_type() == EntityType::Project || !entity.has(Capability::ProjectScoped) {
        return Err(CoreError::validation(
            "projects",
            format!("{} cannot be linked to projects", entity.entity_type()),
        ));
    }
    Ok(())
}

fn check_create(snapshot: &AccessSnapshot) -> Decision {
    let entity = &snapshot.entity;
    let entity_type = entity.entity_type();
    let projects = &entity.project_ids;

    if has_global_permission(&snapshot.actor, entity_type, Action::Add, !projects.is_empty()) {
        return Ok(());
    }
    if projects.is_empty() {
        return Err(CoreError::denied(format!(
            "You are not allowed to create a {entity_type} without a project"
        )));
    }
    let key = permission_key(Action::Add, entity_type);
    match projects.iter().find(|p| !snapshot.project_grants(**p, &key)) {
        Some(project) => Err(CoreError::denied(format!(
            "You are not allowed to add a {entity_type} to project {project}"
        ))),
        None => Ok(()),
    }
}

/// Global permission OR privilege override OR project role, with an
/// axis-specific override DENY vetoing the project role.
fn check_action(snapshot: &AccessSnapshot, action: Action) -> Decision {
    let entity = &snapshot.entity;
    let entity_type = entity.entity_type();

    if has_global_permission(
        &snapshot.actor,
        entity_type,
        action,
        !entity.project_ids.is_empty(),
    ) {
        return Ok(());
    }

    let verdict = PrivilegeAxis::for_action(action)
        .map(|axis| privilege::evaluate(snapshot.privilege.as_ref(), axis))
        .unwrap_or_default();
    match verdict {
        PrivilegeValue::Allow => return Ok(()),
        PrivilegeValue::Deny => {
            return Err(CoreError::denied(format!(
                "The '{action}' privilege on {} is denied for you",
                entity.entity
            )))
        }
        PrivilegeValue::Neutral => {}
    }

    let key = permission_key(action, entity_type);
    if entity
        .project_ids
        .iter()
        .any(|p| snapshot.project_grants(*p, &key))
    {
        return Ok(());
    }

    Err(CoreError::denied(format!(
        "You do not have permission to {action} {}",
        entity.entity
    )))
}

fn check_parent_change(snapshot: &AccessSnapshot, change: ParentChange) -> Decision {
    let entity = &snapshot.entity;
    if entity.entity_type() != EntityType::Project {
        return Err(CoreError::validation(
            "parent_project",
            format!("{} has no parent project", entity.entity_type()),
        ));
    }
    let actor = &snapshot.actor;
    let change_parent = permission_key(Action::ChangeParent, EntityType::Project);
    let add_project = permission_key(Action::Add, EntityType::Project);
    let global_change_parent =
        has_global_permission(actor, EntityType::Project, Action::ChangeParent, true);

    if !global_change_parent && !snapshot.project_grants(entity.entity.id, &change_parent) {
        return Err(CoreError::denied(format!(
            "You are not allowed to change the parent of project {}",
            entity.entity.id
        )));
    }
    if let Some(old) = change.old_parent {
        if !global_change_parent && !snapshot.project_grants(old, &change_parent) {
            return Err(CoreError::denied(format!(
                "You are not allowed to move projects out of project {old}"
            )));
        }
    }
    let may_add = match change.new_parent {
        Some(new) => {
            has_global_permission(actor, EntityType::Project, Action::Add, true)
                || snapshot.project_grants(new, &add_project)
        }
        None => has_global_permission(actor, EntityType::Project, Action::Add, false),
    };
    if !may_add {
        let target = change
            .new_parent
            .map(|p| format!("project {p}"))
            .unwrap_or_else(|| "the top level".to_string());
        return Err(CoreError::denied(format!(
            "You are not allowed to add projects to {target}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dss::ReadWriteSetting;
    use crate::entity::{EntityRef, EntityType};
    use crate::roles::{default_permissions, ROLE_PROJECT_MANAGER, ROLE_PROJECT_MEMBER};
    use assert_matches::assert_matches;
    use chrono::{Duration, TimeZone};

    fn now() -> Timestamp {
        chrono::Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn engine() -> Engine {
        Engine::default()
    }

    fn task(id: i64) -> EntityState {
        EntityState::new(EntityRef::new(EntityType::Task, id), 1)
    }

    fn can(snapshot: &AccessSnapshot, op: Operation) -> Decision {
        engine().can(snapshot, op, &TrustedContext::none(), now())
    }

    fn lock(entity: &EntityState, owner_id: i64, acquired_at: Timestamp) -> LockRecord {
        LockRecord {
            entity: entity.entity,
            owner_id,
            acquired_at,
            webdav: false,
        }
    }

    const EDIT: Operation = Operation::Edit(EditKind::Fields);

    // -----------------------------------------------------------------------
    // Superuser
    // -----------------------------------------------------------------------

    #[test]
    fn test_superuser_always_allowed() {
        let entity = task(1).trashed();
        let snapshot = AccessSnapshot::new(Actor::superuser(9), entity.clone())
            .with_locks(vec![lock(&entity, 2, now())]);
        for op in [
            Operation::Create,
            Operation::View,
            EDIT,
            Operation::Trash,
            Operation::Restore,
            Operation::Delete,
            Operation::ManagePrivileges,
        ] {
            assert!(can(&snapshot, op).is_ok(), "{op:?}");
        }
    }

    #[test]
    fn test_superuser_still_bound_by_dss_invariants() {
        let entity = dss_file(1, false);
        let snapshot = AccessSnapshot::new(Actor::superuser(9), entity)
            .with_container(container(1, ReadWriteSetting::ReadOnly));
        let cross = Operation::Edit(EditKind::Move {
            target_container: Some(2),
        });
        assert_matches!(
            can(&snapshot, cross),
            Err(CoreError::Validation { field: "directory", .. })
        );
        assert_matches!(
            can(&snapshot, Operation::Edit(EditKind::ToggleDssFlag)),
            Err(CoreError::Validation { field: "is_dss", .. })
        );
        // The container mode itself does not bind superusers.
        assert!(can(&snapshot, EDIT).is_ok());
        let same = Operation::Edit(EditKind::Move {
            target_container: Some(1),
        });
        assert!(can(&snapshot, same).is_ok());
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    #[test]
    fn test_create_without_project_needs_global_or_without_project_key() {
        let snapshot = AccessSnapshot::new(Actor::new(2), task(0));
        assert_matches!(can(&snapshot, Operation::Create), Err(CoreError::PermissionDenied(_)));

        let snapshot = AccessSnapshot::new(
            Actor::new(2).with_permissions(["add_task_without_project"]),
            task(0),
        );
        assert!(can(&snapshot, Operation::Create).is_ok());
    }

    #[test]
    fn test_create_in_projects_needs_add_on_every_project() {
        let entity = task(0).with_projects([10, 11]);
        let partial = AccessSnapshot::new(Actor::new(2), entity.clone())
            .with_project_permissions(10, ["add_task"]);
        let err = can(&partial, Operation::Create).unwrap_err();
        assert!(err.to_string().contains("project 11"));

        let full = partial.with_project_permissions(11, ["add_task"]);
        assert!(can(&full, Operation::Create).is_ok());
    }

    #[test]
    fn test_without_project_key_does_not_cover_project_bound_create() {
        let snapshot = AccessSnapshot::new(
            Actor::new(2).with_permissions(["add_task_without_project"]),
            task(0).with_projects([10]),
        );
        assert!(can(&snapshot, Operation::Create).is_err());
    }

    #[test]
    fn test_subproject_creation_needs_add_on_parent() {
        let sub = EntityState::new(EntityRef::new(EntityType::Project, 0), 2).with_projects([5]);
        let denied = AccessSnapshot::new(Actor::new(2), sub.clone());
        assert!(can(&denied, Operation::Create).is_err());

        let allowed = AccessSnapshot::new(Actor::new(2), sub)
            .with_project_permissions(5, default_permissions(ROLE_PROJECT_MANAGER));
        assert!(can(&allowed, Operation::Create).is_ok());
    }

    // -----------------------------------------------------------------------
    // Existing entities
    // -----------------------------------------------------------------------

    #[test]
    fn test_no_grant_is_permission_denied() {
        let snapshot = AccessSnapshot::new(Actor::new(2), task(1));
        assert_matches!(can(&snapshot, Operation::View), Err(CoreError::PermissionDenied(_)));
    }

    #[test]
    fn test_project_role_grants_access() {
        let snapshot = AccessSnapshot::new(Actor::new(2), task(1).with_projects([3]))
            .with_project_permissions(3, default_permissions(ROLE_PROJECT_MEMBER));
        assert!(can(&snapshot, Operation::View).is_ok());
        assert!(can(&snapshot, EDIT).is_ok());
        assert!(can(&snapshot, Operation::Trash).is_ok());
    }

    #[test]
    fn test_override_deny_vetoes_project_role() {
        let entity = task(1).with_projects([3]);
        let mut row = PrivilegeOverride::neutral(entity.entity, 2);
        row.set(PrivilegeAxis::View, PrivilegeValue::Deny);
        let snapshot = AccessSnapshot::new(Actor::new(2), entity)
            .with_project_permissions(3, default_permissions(ROLE_PROJECT_MEMBER))
            .with_privilege(row);
        assert_matches!(can(&snapshot, Operation::View), Err(CoreError::PermissionDenied(_)));
        assert!(can(&snapshot, EDIT).is_ok());
    }

    #[test]
    fn test_override_deny_does_not_veto_global_permission() {
        let entity = task(1);
        let mut row = PrivilegeOverride::neutral(entity.entity, 2);
        row.set(PrivilegeAxis::View, PrivilegeValue::Deny);
        let snapshot =
            AccessSnapshot::new(Actor::new(2).with_permissions(["view_task"]), entity)
                .with_privilege(row);
        assert!(can(&snapshot, Operation::View).is_ok());
    }

    #[test]
    fn test_trashed_entity_never_editable() {
        let entity = task(1).trashed();
        let snapshot = AccessSnapshot::new(Actor::new(1).with_permissions(["change_task"]), entity.clone())
            .with_privilege(PrivilegeOverride::owner(entity.entity, 1));
        assert_matches!(
            can(&snapshot, EDIT),
            Err(CoreError::Validation { field: "deleted", .. })
        );
        assert!(can(&snapshot, Operation::AddToProject(4)).is_err());
    }

    #[test]
    fn test_trash_and_restore_use_their_own_axes() {
        let entity = task(1);
        let mut row = PrivilegeOverride::neutral(entity.entity, 2);
        row.set(PrivilegeAxis::Edit, PrivilegeValue::Allow);
        let snapshot = AccessSnapshot::new(Actor::new(2), entity.clone()).with_privilege(row.clone());
        assert!(can(&snapshot, Operation::Trash).is_err());

        row.set(PrivilegeAxis::Trash, PrivilegeValue::Allow);
        let snapshot = AccessSnapshot::new(Actor::new(2), entity.clone()).with_privilege(row.clone());
        assert!(can(&snapshot, Operation::Trash).is_ok());

        let trashed = AccessSnapshot::new(Actor::new(2), entity.trashed()).with_privilege(row);
        assert!(can(&trashed, Operation::Restore).is_err());
        let restorer = AccessSnapshot::new(
            Actor::new(2).with_permissions(["restore_task"]),
            task(1).trashed(),
        );
        assert!(can(&restorer, Operation::Restore).is_ok());
    }

    #[test]
    fn test_hard_delete_requires_trash_first() {
        let owner = |entity: EntityState| {
            let row = PrivilegeOverride::owner(entity.entity, 1);
            AccessSnapshot::new(Actor::new(1), entity).with_privilege(row)
        };
        assert_matches!(
            can(&owner(task(1)), Operation::Delete),
            Err(CoreError::Validation { field: "deleted", .. })
        );
        assert!(can(&owner(task(1).trashed()), Operation::Delete).is_ok());
    }

    #[test]
    fn test_hard_delete_with_global_delete_permission() {
        let snapshot = AccessSnapshot::new(
            Actor::new(5).with_permissions(["delete_task"]),
            task(1).trashed(),
        );
        assert!(can(&snapshot, Operation::Delete).is_ok());
    }

    // -----------------------------------------------------------------------
    // Locks
    // -----------------------------------------------------------------------

    #[test]
    fn test_foreign_lock_blocks_edit_only() {
        let entity = task(1);
        let snapshot = AccessSnapshot::new(Actor::new(2), entity.clone())
            .with_privilege(PrivilegeOverride::participant(entity.entity, 2))
            .with_locks(vec![lock(&entity, 1, now())]);
        assert_matches!(
            can(&snapshot, EDIT),
            Err(CoreError::LockConflict { holder_id: 1, .. })
        );
        assert!(can(&snapshot, Operation::View).is_ok());
    }

    #[test]
    fn test_own_lock_does_not_block_edit() {
        let entity = task(1);
        let snapshot = AccessSnapshot::new(Actor::new(1), entity.clone())
            .with_privilege(PrivilegeOverride::owner(entity.entity, 1))
            .with_locks(vec![lock(&entity, 1, now())]);
        assert!(can(&snapshot, EDIT).is_ok());
    }

    #[test]
    fn test_expired_lock_does_not_block_edit() {
        let entity = task(1);
        let snapshot = AccessSnapshot::new(Actor::new(2), entity.clone())
            .with_privilege(PrivilegeOverride::participant(entity.entity, 2))
            .with_locks(vec![lock(&entity, 1, now() - Duration::minutes(31))]);
        assert!(can(&snapshot, EDIT).is_ok());
    }

    #[test]
    fn test_permission_checked_before_lock() {
        let entity = task(1);
        let snapshot = AccessSnapshot::new(Actor::new(2), entity.clone())
            .with_locks(vec![lock(&entity, 1, now())]);
        assert_matches!(can(&snapshot, EDIT), Err(CoreError::PermissionDenied(_)));
    }

    // -----------------------------------------------------------------------
    // Project links and parents
    // -----------------------------------------------------------------------

    #[test]
    fn test_add_to_project_needs_edit_and_add_on_target() {
        let entity = task(1);
        let base = AccessSnapshot::new(Actor::new(1), entity.clone())
            .with_privilege(PrivilegeOverride::owner(entity.entity, 1));
        assert!(can(&base, Operation::AddToProject(7)).is_err());

        let allowed = base.with_project_permissions(7, ["add_task"]);
        assert!(can(&allowed, Operation::AddToProject(7)).is_ok());
    }

    #[test]
    fn test_remove_from_unlinked_project_is_validation_error() {
        let entity = task(1).with_projects([3]);
        let snapshot = AccessSnapshot::new(Actor::new(1), entity.clone())
            .with_privilege(PrivilegeOverride::owner(entity.entity, 1));
        assert!(can(&snapshot, Operation::RemoveFromProject(3)).is_ok());
        assert_matches!(
            can(&snapshot, Operation::RemoveFromProject(4)),
            Err(CoreError::Validation { field: "projects", .. })
        );
    }

    #[test]
    fn test_change_parent_requirements() {
        let project = EntityState::new(EntityRef::new(EntityType::Project, 5), 1).with_projects([5]);
        let change = Operation::ChangeParent(ParentChange {
            old_parent: Some(1),
            new_parent: Some(2),
        });
        let manager = default_permissions(ROLE_PROJECT_MANAGER);

        let only_self = AccessSnapshot::new(Actor::new(3), project.clone())
            .with_project_permissions(5, manager.clone());
        assert!(can(&only_self, change).unwrap_err().to_string().contains("out of project 1"));

        let self_and_old = only_self.with_project_permissions(1, manager.clone());
        assert!(can(&self_and_old, change).unwrap_err().to_string().contains("project 2"));

        let all = self_and_old.with_project_permissions(2, ["add_project"]);
        assert!(can(&all, change).is_ok());
    }

    #[test]
    fn test_change_parent_only_for_projects() {
        let snapshot = AccessSnapshot::new(Actor::new(1), task(1));
        let change = Operation::ChangeParent(ParentChange {
            old_parent: None,
            new_parent: Some(2),
        });
        assert_matches!(
            can(&snapshot, change),
            Err(CoreError::Validation { field: "parent_project", .. })
        );
    }

    #[test]
    fn test_referenced_projects() {
        let change = Operation::ChangeParent(ParentChange {
            old_parent: Some(1),
            new_parent: Some(2),
        });
        assert_eq!(change.referenced_projects(), vec![1, 2]);
        assert_eq!(Operation::AddToProject(4).referenced_projects(), vec![4]);
        assert!(Operation::View.referenced_projects().is_empty());
    }

    // -----------------------------------------------------------------------
    // Privilege management
    // -----------------------------------------------------------------------

    #[test]
    fn test_only_full_access_manages_privileges() {
        let entity = task(1);
        let participant = AccessSnapshot::new(Actor::new(2), entity.clone())
            .with_privilege(PrivilegeOverride::participant(entity.entity, 2));
        assert!(can(&participant, Operation::ManagePrivileges).is_err());

        let owner = AccessSnapshot::new(Actor::new(1), entity.clone())
            .with_privilege(PrivilegeOverride::owner(entity.entity, 1));
        assert!(can(&owner, Operation::ManagePrivileges).is_ok());
    }

    // -----------------------------------------------------------------------
    // DSS narrowing
    // -----------------------------------------------------------------------

    fn dss_file(container_id: i64, imported: bool) -> EntityState {
        EntityState::new(EntityRef::new(EntityType::File, 3), 1).with_dss(container_id, imported)
    }

    fn container(id: i64, setting: ReadWriteSetting) -> DssContainer {
        DssContainer {
            id,
            path: format!("/dss/{id}"),
            read_write_setting: setting,
        }
    }

    fn owner_snapshot(entity: EntityState, setting: ReadWriteSetting) -> AccessSnapshot {
        let row = PrivilegeOverride::owner(entity.entity, 1);
        let container = container(entity.dss.map(|d| d.container_id).unwrap_or(0), setting);
        AccessSnapshot::new(Actor::new(1).with_permissions(["add_file"]), entity)
            .with_privilege(row)
            .with_container(container)
    }

    #[test]
    fn test_read_only_container_rejects_new_file() {
        let snapshot = owner_snapshot(dss_file(1, false), ReadWriteSetting::ReadOnly);
        assert_matches!(
            can(&snapshot, Operation::Create),
            Err(CoreError::Validation { field: "container", .. })
        );
    }

    #[test]
    fn test_only_new_container_distinguishes_imported() {
        let imported = owner_snapshot(dss_file(1, true), ReadWriteSetting::ReadWriteOnlyNew);
        assert!(can(&imported, EDIT).is_err());
        let created = owner_snapshot(dss_file(1, false), ReadWriteSetting::ReadWriteOnlyNew);
        assert!(can(&created, EDIT).is_ok());
    }

    #[test]
    fn test_cross_container_move_rejected_despite_full_access() {
        let snapshot = owner_snapshot(dss_file(1, true), ReadWriteSetting::ReadOnly);
        let op = Operation::Edit(EditKind::Move {
            target_container: Some(2),
        });
        assert_matches!(
            can(&snapshot, op),
            Err(CoreError::Validation { field: "directory", .. })
        );
    }

    #[test]
    fn test_dss_never_turns_reject_into_allow() {
        let entity = dss_file(1, false);
        let snapshot = AccessSnapshot::new(Actor::new(4), entity)
            .with_container(container(1, ReadWriteSetting::ReadWriteAll));
        assert_matches!(can(&snapshot, EDIT), Err(CoreError::PermissionDenied(_)));
    }

    #[test]
    fn test_missing_container_is_internal_error() {
        let entity = dss_file(1, false);
        let row = PrivilegeOverride::owner(entity.entity, 1);
        let snapshot = AccessSnapshot::new(Actor::new(1), entity).with_privilege(row);
        assert_matches!(can(&snapshot, EDIT), Err(CoreError::Internal(_)));
    }

    #[test]
    fn test_plain_file_cannot_enter_container() {
        let entity = EntityState::new(EntityRef::new(EntityType::File, 3), 1);
        let row = PrivilegeOverride::owner(entity.entity, 1);
        let snapshot = AccessSnapshot::new(Actor::new(1), entity).with_privilege(row);
        let op = Operation::Edit(EditKind::Move {
            target_container: Some(1),
        });
        assert!(can(&snapshot, op).is_err());
        let plain_move = Operation::Edit(EditKind::Move {
            target_container: None,
        });
        assert!(can(&snapshot, plain_move).is_ok());
    }

    // -----------------------------------------------------------------------
    // Trusted context
    // -----------------------------------------------------------------------

    #[test]
    fn test_trusted_import_bypasses_permissions_not_dss() {
        let trusted = TrustedContext::import(50, "scan");
        let imported = dss_file(1, true);
        let snapshot = AccessSnapshot::new(Actor::new(50), imported)
            .with_container(container(1, ReadWriteSetting::ReadOnly));
        assert!(engine().can(&snapshot, Operation::Create, &trusted, now()).is_ok());
        assert!(engine().can(&snapshot, EDIT, &trusted, now()).is_err());
    }

    #[test]
    fn test_trusted_import_still_respects_locks() {
        let trusted = TrustedContext::import(50, "scan");
        let entity = task(1);
        let snapshot = AccessSnapshot::new(Actor::new(50), entity.clone())
            .with_locks(vec![lock(&entity, 1, now())]);
        assert!(engine().can(&snapshot, EDIT, &trusted, now()).is_err());
    }

    // -----------------------------------------------------------------------
    // End-to-end walk through a task's life
    // -----------------------------------------------------------------------

    #[test]
    fn test_task_collaboration_walkthrough() {
        let entity = task(1);
        let u1 = Actor::new(1).with_permissions(["add_task_without_project"]);
        let u2 = Actor::new(2);

        // U1 creates T and holds the creation lock.
        let create = AccessSnapshot::new(u1.clone(), task(0));
        assert!(can(&create, Operation::Create).is_ok());
        let locks = vec![lock(&entity, 1, now())];

        // U2 was assigned and received view+edit, but U1's lock blocks the edit.
        let mut u2_row = PrivilegeOverride::participant(entity.entity, 2);
        let u2_view = AccessSnapshot::new(u2.clone(), entity.clone())
            .with_privilege(u2_row.clone())
            .with_locks(locks);
        assert!(can(&u2_view, EDIT).unwrap_err().is_retryable());

        // U1 releases; U2's edit now succeeds.
        let released = u2_view.clone().with_locks(Vec::new());
        assert!(can(&released, EDIT).is_ok());

        // U1 denies U2's view; edit stays allowed.
        u2_row.set(PrivilegeAxis::View, PrivilegeValue::Deny);
        let denied = released.with_privilege(u2_row);
        assert!(can(&denied, Operation::View).is_err());
        assert!(can(&denied, EDIT).is_ok());
    }
}
