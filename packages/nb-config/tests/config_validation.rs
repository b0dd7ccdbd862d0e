use std::{
	env, fs,
	path::PathBuf,
	sync::atomic::{AtomicU64, Ordering},
	time::{SystemTime, UNIX_EPOCH},
};

use toml::Value;

use nb_config::{Config, Error, SecurityAuthKey};

const SAMPLE_CONFIG_TEMPLATE_TOML: &str = include_str!("fixtures/sample_config.template.toml");

fn sample_toml() -> String {
	SAMPLE_CONFIG_TEMPLATE_TOML.to_string()
}

fn sample_toml_with(section: &str, key: &str, value: Value) -> String {
	let mut root: Value =
		toml::from_str(SAMPLE_CONFIG_TEMPLATE_TOML).expect("Failed to parse template config.");
	let mut table = root.as_table_mut().expect("Template config must be a table.");

	for part in section.split('.') {
		table = table
			.get_mut(part)
			.and_then(Value::as_table_mut)
			.unwrap_or_else(|| panic!("Template config must include [{section}]."));
	}

	table.insert(key.to_string(), value);

	toml::to_string(&root).expect("Failed to render template config.")
}

fn write_temp_config(payload: String) -> PathBuf {
	static COUNTER: AtomicU64 = AtomicU64::new(0);

	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("System time must be valid.")
		.as_nanos();
	let ordinal = COUNTER.fetch_add(1, Ordering::SeqCst);
	let pid = std::process::id();
	let mut path = env::temp_dir();

	path.push(format!("nb_config_test_{nanos}_{pid}_{ordinal}.toml"));

	fs::write(&path, payload).expect("Failed to write test config.");

	path
}

fn load_payload(payload: String) -> nb_config::Result<Config> {
	let path = write_temp_config(payload);
	let result = nb_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	result
}

fn base_config() -> Config {
	toml::from_str(&sample_toml()).expect("Failed to parse test config.")
}

fn auth_key(token_id: &str, token: &str, user_id: &str) -> SecurityAuthKey {
	SecurityAuthKey {
		token_id: token_id.to_string(),
		token: token.to_string(),
		user_id: user_id.to_string(),
	}
}

#[test]
fn sample_config_loads_and_normalizes() {
	let cfg = load_payload(sample_toml()).expect("Expected sample config to load.");

	assert_eq!(cfg.providers.llm.api_base, "https://api.deepseek.com");
	assert_eq!(cfg.providers.llm.timeout_ms, None);
	assert_eq!(cfg.questions.max_count, 10);
	assert!(cfg.storage.recover_pending_on_start);
	assert_eq!(cfg.service.instance_id, "nb-api-1");
}

#[test]
fn optional_sections_fall_back_to_defaults() {
	let mut root: Value = toml::from_str(&sample_toml()).expect("Failed to parse template.");
	let table = root.as_table_mut().expect("Template config must be a table.");

	table.remove("generation");
	table.remove("questions");
	table
		.get_mut("service")
		.and_then(Value::as_table_mut)
		.expect("Template config must include [service].")
		.remove("instance_id");

	let cfg = load_payload(toml::to_string(&root).expect("Failed to render config."))
		.expect("Expected config without optional sections to load.");

	assert_eq!(cfg.generation.language, "Chinese");
	assert_eq!(cfg.questions.max_count, 10);
	assert_eq!(cfg.service.instance_id, "nb-api");
	assert_eq!(cfg.providers.llm.max_tokens, 2_000);
}

#[test]
fn instance_id_must_be_non_empty() {
	let payload = sample_toml_with("service", "instance_id", Value::String(" ".to_string()));
	let err = load_payload(payload).expect_err("Expected instance_id validation error.");

	assert!(
		err.to_string().contains("service.instance_id must be non-empty."),
		"Unexpected error: {err}"
	);
}

#[test]
fn missing_config_file_reports_read_error() {
	let path = env::temp_dir().join("nb_config_test_does_not_exist.toml");
	let err = nb_config::load(&path).expect_err("Expected read error.");

	assert!(matches!(err, Error::ReadConfig { .. }), "Unexpected error: {err}");
}

#[test]
fn malformed_config_reports_parse_error() {
	let err =
		load_payload("[service\nhttp_bind = ".to_string()).expect_err("Expected parse error.");

	assert!(matches!(err, Error::ParseConfig { .. }), "Unexpected error: {err}");
}

#[test]
fn storage_backend_must_be_known() {
	let payload = sample_toml_with("storage", "backend", Value::String("sqlite".to_string()));
	let err = load_payload(payload).expect_err("Expected storage backend validation error.");

	assert!(
		err.to_string().contains("storage.backend must be one of postgres or memory."),
		"Unexpected error: {err}"
	);
}

#[test]
fn memory_backend_drops_postgres_section() {
	let payload = sample_toml_with("storage", "backend", Value::String("memory".to_string()));
	let cfg = load_payload(payload).expect("Expected memory backend config to load.");

	assert!(cfg.storage.postgres.is_none());
}

#[test]
fn postgres_backend_requires_postgres_section() {
	let mut cfg = base_config();

	cfg.storage.postgres = None;

	let err = nb_config::validate(&cfg).expect_err("Expected postgres section validation error.");

	assert!(
		err.to_string().contains("storage.postgres is required"),
		"Unexpected error: {err}"
	);
}

#[test]
fn llm_api_key_must_be_non_empty() {
	let payload = sample_toml_with("providers.llm", "api_key", Value::String("  ".to_string()));
	let err = load_payload(payload).expect_err("Expected api_key validation error.");

	assert!(
		err.to_string().contains("providers.llm.api_key must be non-empty."),
		"Unexpected error: {err}"
	);
}

#[test]
fn llm_timeout_must_be_positive_when_set() {
	let payload = sample_toml_with("providers.llm", "timeout_ms", Value::Integer(0));
	let err = load_payload(payload).expect_err("Expected timeout validation error.");

	assert!(
		err.to_string().contains("providers.llm.timeout_ms must be greater than zero when set."),
		"Unexpected error: {err}"
	);
}

#[test]
fn llm_temperature_must_be_in_range() {
	let mut cfg = base_config();

	cfg.providers.llm.temperature = 3.5;

	let err = nb_config::validate(&cfg).expect_err("Expected temperature validation error.");

	assert!(err.to_string().contains("providers.llm.temperature"), "Unexpected error: {err}");
}

#[test]
fn default_header_values_must_be_strings() {
	let mut cfg = base_config();

	cfg.providers.llm.default_headers.insert("X-Retry".to_string(), serde_json::json!(3));

	let err = nb_config::validate(&cfg).expect_err("Expected header validation error.");

	assert!(
		err.to_string().contains("providers.llm.default_headers values must be strings."),
		"Unexpected error: {err}"
	);
}

#[test]
fn question_count_must_be_bounded() {
	let payload = sample_toml_with("questions", "max_count", Value::Integer(0));
	let err = load_payload(payload).expect_err("Expected max_count validation error.");

	assert!(err.to_string().contains("questions.max_count"), "Unexpected error: {err}");
}

#[test]
fn auth_mode_must_be_known() {
	let mut cfg = base_config();

	cfg.security.auth_mode = "jwt".to_string();

	let err = nb_config::validate(&cfg).expect_err("Expected auth_mode validation error.");

	assert!(
		err.to_string().contains("security.auth_mode must be one of off or static_keys."),
		"Unexpected error: {err}"
	);
}

#[test]
fn static_keys_require_at_least_one_key() {
	let mut cfg = base_config();

	cfg.security.auth_keys.clear();

	let err = nb_config::validate(&cfg).expect_err("Expected auth_keys validation error.");

	assert!(err.to_string().contains("security.auth_keys must be non-empty"), "Unexpected: {err}");
}

#[test]
fn auth_keys_require_unique_token_ids() {
	let mut cfg = base_config();

	cfg.security.auth_keys =
		vec![auth_key("k1", "secret-1", "user-1"), auth_key("k1", "secret-2", "user-2")];

	let err =
		nb_config::validate(&cfg).expect_err("Expected duplicate token_id validation error.");

	assert!(
		err.to_string().contains("token_id must be unique across security.auth_keys."),
		"Unexpected error: {err}"
	);
}

#[test]
fn auth_keys_require_unique_tokens() {
	let mut cfg = base_config();

	cfg.security.auth_keys =
		vec![auth_key("k1", "shared", "user-1"), auth_key("k2", "shared", "user-2")];

	let err = nb_config::validate(&cfg).expect_err("Expected duplicate token validation error.");

	assert!(
		err.to_string().contains("token must be unique across security.auth_keys."),
		"Unexpected error: {err}"
	);
}

#[test]
fn auth_mode_off_ignores_keys() {
	let mut cfg = base_config();

	cfg.security.auth_mode = "off".to_string();
	cfg.security.auth_keys.clear();

	nb_config::validate(&cfg).expect("Expected auth_mode=off to validate without keys.");
}
