//! Startup schema setup for the five banner relations.
//!
//! `banner.content` carries a UNIQUE constraint so concurrent creates with
//! identical content cannot produce duplicate rows. `banner_feature` is keyed
//! on `banner_id` alone: a banner has at most one feature association.
//! Junction rows are removed by the cascade deleter, not by `ON DELETE`.

use sqlx::PgPool;

/// Run all migrations. Idempotent, executed at every startup.
pub async fn run(pool: &PgPool) -> Result<(), sqlx::Error> {
    tracing::info!("running banner schema migrations");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS banner (
            id BIGSERIAL PRIMARY KEY,
            content TEXT NOT NULL UNIQUE,
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS feature (
            id BIGINT PRIMARY KEY,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            used_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tag (
            id BIGINT PRIMARY KEY,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            used_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS banner_feature (
            banner_id BIGINT PRIMARY KEY REFERENCES banner(id),
            feature_id BIGINT NOT NULL REFERENCES feature(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS banner_tag (
            banner_id BIGINT NOT NULL REFERENCES banner(id),
            tag_id BIGINT NOT NULL REFERENCES tag(id),
            PRIMARY KEY (banner_id, tag_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
