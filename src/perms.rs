//! Authorization decisions for every mutating operation.
//!
//! Pure functions over (actor, target, action); no I/O. For file and URL
//! deletion the target is the entity's owner.

use crate::models::User;

/// The superuser is always id 0; it is seeded from config and never stored.
pub const SUPERUSER_ID: i32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    EditUser,
    ResetToken,
    DeleteUser,
    DeleteFile,
    DeleteUrl,
    RestoreFile,
    /// Granting or toggling admin status, or creating an admin account.
    SetAdmin,
}

/// Whether `actor` may perform `action` against `target`.
///
/// Precedence:
/// 1. non-admins act only on themselves and their own entities;
/// 2. the superuser can only be edited/reset/deleted by itself;
/// 3. admins cannot act on other admins, superuser excepted, with a
///    carve-out for acting on one's own account;
/// 4. admin status changes are reserved for the superuser.
#[must_use]
pub fn can_modify(actor: &User, target: &User, action: Action) -> bool {
    let is_self = actor.id == target.id;

    if action == Action::SetAdmin {
        return actor.id == SUPERUSER_ID;
    }

    if !actor.is_admin {
        return is_self
            && matches!(
                action,
                Action::EditUser
                    | Action::ResetToken
                    | Action::DeleteUser
                    | Action::DeleteFile
                    | Action::DeleteUrl
            );
    }

    if target.id == SUPERUSER_ID
        && !is_self
        && matches!(
            action,
            Action::EditUser | Action::ResetToken | Action::DeleteUser
        )
    {
        return false;
    }

    if target.is_admin && !is_self {
        return actor.id == SUPERUSER_ID;
    }

    true
}
