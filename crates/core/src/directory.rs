//! Read-only view of the user directory.

use async_trait::async_trait;

use crate::domain::user::{Role, User, UserId};
use crate::store::StoreError;

/// Lookups the routing engine needs from the user directory.
///
/// Methods take `&mut self` so a store transaction can implement them over
/// its own connection; "not found" is `Ok(None)`.
#[async_trait]
pub trait Directory: Send {
    async fn user_by_id(&mut self, id: UserId) -> Result<Option<User>, StoreError>;

    async fn user_by_username(&mut self, username: &str) -> Result<Option<User>, StoreError>;

    /// Users holding any of `roles`, in ascending id order.
    async fn users_with_role(&mut self, roles: &[Role]) -> Result<Vec<User>, StoreError>;

    async fn manager_of(&mut self, user: &User) -> Result<Option<User>, StoreError> {
        match user.manager_id {
            Some(manager_id) => self.user_by_id(manager_id).await,
            None => Ok(None),
        }
    }
}
