use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::{Result, schema};

const SCHEMA_LOCK_ID: i64 = 6_211_904;

pub struct Db {
	pub pool: PgPool,
}
impl Db {
	pub async fn connect(cfg: &nb_config::Postgres) -> Result<Self> {
		let pool =
			PgPoolOptions::new().max_connections(cfg.pool_max_conns).connect(&cfg.dsn).await?;

		Ok(Self { pool })
	}

	pub async fn ensure_schema(&self) -> Result<()> {
		// The advisory lock is transaction scoped so it is released with the connection's work.
		let mut tx = self.pool.begin().await?;

		sqlx::query("SELECT pg_advisory_xact_lock($1)")
			.bind(SCHEMA_LOCK_ID)
			.execute(&mut *tx)
			.await?;

		for statement in schema::statements() {
			sqlx::query(statement).execute(&mut *tx).await?;
		}

		tx.commit().await?;

		Ok(())
	}
}
