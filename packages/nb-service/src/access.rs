use uuid::Uuid;

use crate::{Error, Result};

pub(crate) fn require_user(user_id: &str) -> Result<&str> {
	let user_id = user_id.trim();

	if user_id.is_empty() {
		return Err(Error::InvalidRequest { message: "user_id is required.".to_string() });
	}

	Ok(user_id)
}

pub(crate) fn ensure_owner(owner_id: &str, user_id: &str, entity: &str, id: Uuid) -> Result<()> {
	if owner_id != user_id {
		return Err(Error::Ownership {
			message: format!("{entity} {id} is not owned by the caller."),
		});
	}

	Ok(())
}
