//! Resolves the calling user from request headers.

use std::{collections::HashMap, net::SocketAddr};

use axum::http::{HeaderMap, header::AUTHORIZATION};
use color_eyre::{Result, eyre};

use nb_config::Security;

pub const USER_ID_HEADER: &str = "X-NB-User-Id";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthState {
	/// Trusts the user id header; only allowed on loopback binds.
	Off,
	/// Bearer token to user id.
	StaticKeys { users_by_token: HashMap<String, String> },
}
impl AuthState {
	pub fn from_config(security: &Security, http_bind: &str) -> Result<Self> {
		match security.auth_mode.trim() {
			nb_config::AUTH_MODE_OFF => {
				enforce_loopback_for_off_mode(http_bind)?;

				Ok(Self::Off)
			},
			nb_config::AUTH_MODE_STATIC_KEYS => {
				let users_by_token = security
					.auth_keys
					.iter()
					.map(|key| (key.token.clone(), key.user_id.clone()))
					.collect();

				Ok(Self::StaticKeys { users_by_token })
			},
			other => Err(eyre::eyre!(
				"security.auth_mode must be one of off or static_keys, got {other}."
			)),
		}
	}

	/// The caller's user id, or `None` when the request carries no valid credentials.
	pub fn authenticate(&self, headers: &HeaderMap) -> Option<String> {
		match self {
			Self::Off => header_str(headers, USER_ID_HEADER)
				.map(str::trim)
				.filter(|user_id| !user_id.is_empty())
				.map(str::to_string),
			Self::StaticKeys { users_by_token } => {
				let token = header_str(headers, AUTHORIZATION.as_str())?
					.trim()
					.strip_prefix("Bearer ")?
					.trim();

				users_by_token.get(token).cloned()
			},
		}
	}
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
	headers.get(name).and_then(|value| value.to_str().ok())
}

fn enforce_loopback_for_off_mode(http_bind: &str) -> Result<()> {
	let bind_addr: SocketAddr = http_bind.parse().map_err(|err| {
		eyre::eyre!(
			"service.http_bind must be a valid socket address when security.auth_mode=off: {err}"
		)
	})?;

	if !bind_addr.ip().is_loopback() {
		return Err(eyre::eyre!(
			"service.http_bind must be a loopback address when security.auth_mode=off."
		));
	}

	Ok(())
}
