mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, Generation, LlmProviderConfig, Postgres, Providers, Questions, Security, SecurityAuthKey,
	Service, Storage,
};

use std::{collections::HashSet, fs, path::Path};

pub const STORAGE_BACKEND_POSTGRES: &str = "postgres";
pub const STORAGE_BACKEND_MEMORY: &str = "memory";
pub const AUTH_MODE_OFF: &str = "off";
pub const AUTH_MODE_STATIC_KEYS: &str = "static_keys";

const MAX_QUESTION_COUNT: u32 = 50;

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;
	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.service.instance_id.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.instance_id must be non-empty.".to_string(),
		});
	}

	match cfg.storage.backend.as_str() {
		STORAGE_BACKEND_MEMORY => {},
		STORAGE_BACKEND_POSTGRES => {
			let Some(postgres) = cfg.storage.postgres.as_ref() else {
				return Err(Error::Validation {
					message: "storage.postgres is required when storage.backend is postgres."
						.to_string(),
				});
			};

			if postgres.dsn.trim().is_empty() {
				return Err(Error::Validation {
					message: "storage.postgres.dsn must be non-empty.".to_string(),
				});
			}
			if postgres.pool_max_conns == 0 {
				return Err(Error::Validation {
					message: "storage.postgres.pool_max_conns must be greater than zero."
						.to_string(),
				});
			}
		},
		_ => {
			return Err(Error::Validation {
				message: "storage.backend must be one of postgres or memory.".to_string(),
			});
		},
	}

	let llm = &cfg.providers.llm;

	for (label, value) in [
		("providers.llm.provider_id", &llm.provider_id),
		("providers.llm.api_base", &llm.api_base),
		("providers.llm.api_key", &llm.api_key),
		("providers.llm.model", &llm.model),
	] {
		if value.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
	}

	if !llm.temperature.is_finite() || !(0.0..=2.0).contains(&llm.temperature) {
		return Err(Error::Validation {
			message: "providers.llm.temperature must be in the range 0.0-2.0.".to_string(),
		});
	}
	if llm.max_tokens == 0 {
		return Err(Error::Validation {
			message: "providers.llm.max_tokens must be greater than zero.".to_string(),
		});
	}
	if llm.timeout_ms == Some(0) {
		return Err(Error::Validation {
			message: "providers.llm.timeout_ms must be greater than zero when set.".to_string(),
		});
	}
	if llm.default_headers.values().any(|value| !value.is_string()) {
		return Err(Error::Validation {
			message: "providers.llm.default_headers values must be strings.".to_string(),
		});
	}
	if cfg.generation.language.trim().is_empty() {
		return Err(Error::Validation {
			message: "generation.language must be non-empty.".to_string(),
		});
	}
	if cfg.questions.max_count == 0 || cfg.questions.max_count > MAX_QUESTION_COUNT {
		return Err(Error::Validation {
			message: format!("questions.max_count must be in the range 1-{MAX_QUESTION_COUNT}."),
		});
	}

	validate_security(&cfg.security)
}

fn validate_security(security: &Security) -> Result<()> {
	match security.auth_mode.as_str() {
		AUTH_MODE_OFF => return Ok(()),
		AUTH_MODE_STATIC_KEYS => {},
		_ => {
			return Err(Error::Validation {
				message: "security.auth_mode must be one of off or static_keys.".to_string(),
			});
		},
	}

	if security.auth_keys.is_empty() {
		return Err(Error::Validation {
			message: "security.auth_keys must be non-empty when security.auth_mode is static_keys."
				.to_string(),
		});
	}

	let mut token_ids = HashSet::new();
	let mut tokens = HashSet::new();

	for key in &security.auth_keys {
		for (label, value) in
			[("token_id", &key.token_id), ("token", &key.token), ("user_id", &key.user_id)]
		{
			if value.trim().is_empty() {
				return Err(Error::Validation {
					message: format!("security.auth_keys.{label} must be non-empty."),
				});
			}
		}

		if !token_ids.insert(key.token_id.as_str()) {
			return Err(Error::Validation {
				message: "token_id must be unique across security.auth_keys.".to_string(),
			});
		}
		if !tokens.insert(key.token.as_str()) {
			return Err(Error::Validation {
				message: "token must be unique across security.auth_keys.".to_string(),
			});
		}
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	let api_base = cfg.providers.llm.api_base.trim().trim_end_matches('/').to_string();

	cfg.providers.llm.api_base = api_base;
	cfg.service.instance_id = cfg.service.instance_id.trim().to_string();
	cfg.generation.language = cfg.generation.language.trim().to_string();

	if cfg.storage.backend == STORAGE_BACKEND_MEMORY {
		cfg.storage.postgres = None;
	}

	for key in &mut cfg.security.auth_keys {
		key.token = key.token.trim().to_string();
		key.user_id = key.user_id.trim().to_string();
	}
}
