use std::sync::Arc;

use color_eyre::eyre;

use nb_config::Config;
use nb_service::NoteService;
use nb_storage::{Store, db::Db, memory::MemoryStore, pg::PgStore};

use crate::auth::AuthState;

#[derive(Clone)]
pub struct AppState {
	pub service: NoteService,
	pub auth: Arc<AuthState>,
}
impl AppState {
	pub async fn new(config: Config) -> color_eyre::Result<Self> {
		let auth = AuthState::from_config(&config.security, &config.service.http_bind)?;
		let store = open_store(&config).await?;
		let recover = config.storage.recover_pending_on_start;
		let service = NoteService::new(config, store);

		if recover {
			service.recover_pending().await?;
		}

		Ok(Self::with_service(service, auth))
	}

	pub fn with_service(service: NoteService, auth: AuthState) -> Self {
		Self { service, auth: Arc::new(auth) }
	}
}

async fn open_store(config: &Config) -> color_eyre::Result<Arc<dyn Store>> {
	match config.storage.backend.as_str() {
		nb_config::STORAGE_BACKEND_MEMORY => {
			tracing::warn!("Using the in-memory store; data is lost on restart.");

			Ok(Arc::new(MemoryStore::new()))
		},
		nb_config::STORAGE_BACKEND_POSTGRES => {
			let postgres = config.storage.postgres.as_ref().ok_or_else(|| {
				eyre::eyre!("storage.postgres is required when storage.backend is postgres.")
			})?;
			let db = Db::connect(postgres).await?;

			db.ensure_schema().await?;

			Ok(Arc::new(PgStore::new(db)))
		},
		other => Err(eyre::eyre!("Unsupported storage.backend {other}.")),
	}
}
