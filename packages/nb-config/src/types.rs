use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub generation: Generation,
	#[serde(default)]
	pub questions: Questions,
	pub security: Security,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
	/// Name this process claims pending generations under. Instances sharing one database need
	/// distinct names; a restarted instance must keep its name to recover its own leftovers.
	#[serde(default = "default_instance_id")]
	pub instance_id: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Storage {
	/// Either "postgres" or "memory".
	pub backend: String,
	pub postgres: Option<Postgres>,
	/// Marks notes left pending by a previous process as failed on startup.
	#[serde(default = "default_true")]
	pub recover_pending_on_start: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Providers {
	pub llm: LlmProviderConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	#[serde(default = "default_max_tokens")]
	pub max_tokens: u32,
	/// Transport-level request timeout. Unset means the request may run as long as the provider
	/// needs.
	pub timeout_ms: Option<u64>,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Generation {
	/// Language the generated notes and questions are written in.
	pub language: String,
}
impl Default for Generation {
	fn default() -> Self {
		Self { language: "Chinese".to_string() }
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Questions {
	pub max_count: u32,
}
impl Default for Questions {
	fn default() -> Self {
		Self { max_count: 10 }
	}
}

#[derive(Clone, Debug, Deserialize)]
pub struct Security {
	pub bind_localhost_only: bool,
	/// Either "off" (caller id taken from a header) or "static_keys".
	pub auth_mode: String,
	#[serde(default)]
	pub auth_keys: Vec<SecurityAuthKey>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SecurityAuthKey {
	pub token_id: String,
	pub token: String,
	pub user_id: String,
}

fn default_true() -> bool {
	true
}

fn default_instance_id() -> String {
	"nb-api".to_string()
}

fn default_max_tokens() -> u32 {
	2_000
}
