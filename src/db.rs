use sqlx::{postgres::PgPoolOptions, PgPool};

pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;

        let db = Self { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    /// Create tables and indexes if they do not exist yet.
    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!("Database schema ready");
        Ok(())
    }
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS chat_exchanges (
        id UUID PRIMARY KEY,
        user_id TEXT NOT NULL,
        user_message TEXT NOT NULL,
        assistant_reply TEXT NOT NULL,
        response_type TEXT NOT NULL,
        payload JSONB NOT NULL,
        confidence DOUBLE PRECISION NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_chat_exchanges_user_created
        ON chat_exchanges (user_id, created_at)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS dealer_applications (
        id UUID PRIMARY KEY,
        dealership_name TEXT NOT NULL,
        contact_name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        phone TEXT NOT NULL,
        locations JSONB NOT NULL DEFAULT '[]'::jsonb,
        staff_capacity TEXT,
        inventory_range TEXT,
        db_connection JSONB NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        rejection_reason TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_dealer_applications_status_created
        ON dealer_applications (status, created_at DESC)
    "#,
];
