use uuid::Uuid;

use crate::auth::claims::{Claims, Role};
use crate::error::ApiError;

/// Allows the operation only when the caller's role is in the allowed set.
pub fn require_role(claims: &Claims, allowed: &[Role]) -> Result<(), ApiError> {
    if allowed.contains(&claims.role) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!(
            "role {} is not allowed to perform this operation",
            claims.role
        )))
    }
}

/// Owner-or-admin check for prescription mutation and deletion.
pub fn require_owner(claims: &Claims, doctor_id: Uuid) -> Result<(), ApiError> {
    if claims.role == Role::Admin || claims.sub == doctor_id {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "you do not own this prescription".into(),
        ))
    }
}
