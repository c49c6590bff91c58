//! Banner repository - the relational access layer.
//!
//! Banners are reachable only through the pair of junction tables
//! (`banner_feature`, `banner_tag`); a banner without a matching feature and
//! tag association is invisible to filtered reads. All writes run inside one
//! transaction and roll back wholesale on any step failure, including the
//! caller dropping the future mid-flight.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Transaction};

/// Banner record from database
#[derive(Debug, Clone, FromRow)]
pub struct Banner {
    pub id: i64,
    pub content: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for a banner that does not exist yet. The id is generated on
/// insert, or reused when a row with the same content already exists.
#[derive(Debug, Clone)]
pub struct NewBanner {
    pub content: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields rewritten by an update, addressed by banner id.
#[derive(Debug, Clone)]
pub struct BannerUpdate {
    pub id: i64,
    pub content: String,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

/// Feature dimension row. The id is supplied by the caller, not generated.
#[derive(Debug, Clone)]
pub struct Feature {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub used_at: DateTime<Utc>,
}

/// Tag dimension row. The id is supplied by the caller, not generated.
#[derive(Debug, Clone)]
pub struct Tag {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub used_at: DateTime<Utc>,
}

/// Read-path filter. Zero means "filter omitted" for `feature_id` and
/// `tag_id`; a zero `limit` returns all matches and ignores `offset`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BannerFilter {
    pub feature_id: i64,
    pub tag_id: i64,
    pub limit: i64,
    pub offset: i64,
}

/// A banner together with its complete current tag association set,
/// independent of which tag was used to filter.
#[derive(Debug, Clone)]
pub struct BannerWithTags {
    pub banner: Banner,
    pub tag_ids: Vec<i64>,
}

/// Database error type.
///
/// NotFound conditions are per-entity so callers can choose a precise
/// response; everything from the store itself is wrapped with the failing
/// operation's name.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("{op}: {source}")]
    Sqlx {
        op: &'static str,
        source: sqlx::Error,
    },

    #[error("banner not found")]
    BannerNotFound,

    #[error("banner-feature relation not found")]
    BannerFeatureNotFound,

    #[error("banner-tag relation not found")]
    BannerTagNotFound,
}

impl DbError {
    fn wrap(op: &'static str) -> impl FnOnce(sqlx::Error) -> DbError {
        move |source| DbError::Sqlx { op, source }
    }
}

const ENSURE_FEATURE: &str =
    "INSERT INTO feature (id, created_at, used_at) VALUES ($1, $2, $3) ON CONFLICT (id) DO NOTHING";
const ENSURE_TAG: &str =
    "INSERT INTO tag (id, created_at, used_at) VALUES ($1, $2, $3) ON CONFLICT (id) DO NOTHING";

/// Create-if-absent by caller-supplied id. Shared by the feature and tag
/// paths; existing rows are reused untouched.
async fn ensure_dimension(
    tx: &mut Transaction<'_, Postgres>,
    insert: &'static str,
    id: i64,
    created_at: DateTime<Utc>,
    used_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(insert)
        .bind(id)
        .bind(created_at)
        .bind(used_at)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Compose the filtered list query as a fold over optional predicates.
///
/// Each present filter contributes an inner join, so a banner missing either
/// association is excluded. Ordering is banner id ascending; pagination is
/// meaningless without a deterministic order.
fn list_query(filter: &BannerFilter) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(
        "SELECT b.id, b.content, b.is_active, b.created_at, b.updated_at FROM banner b",
    );

    if filter.feature_id != 0 {
        qb.push(" INNER JOIN banner_feature f ON f.banner_id = b.id AND f.feature_id = ");
        qb.push_bind(filter.feature_id);
    }

    if filter.tag_id != 0 {
        qb.push(" INNER JOIN banner_tag t ON t.banner_id = b.id AND t.tag_id = ");
        qb.push_bind(filter.tag_id);
    }

    qb.push(" ORDER BY b.id");

    if filter.limit != 0 {
        qb.push(" LIMIT ");
        qb.push_bind(filter.limit);
        qb.push(" OFFSET ");
        qb.push_bind(filter.offset);
    }

    qb
}

/// Banner repository
pub struct BannerRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> BannerRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Resolve the content of one banner matching the feature/tag pair.
    ///
    /// Both ids are required. When several banners satisfy the join any one
    /// may be returned; zero matches is `BannerNotFound`, distinct from
    /// infrastructure failures.
    pub async fn content(&self, feature_id: i64, tag_id: i64) -> Result<String, DbError> {
        const OP: &str = "db.banners.content";

        let content: Option<String> = sqlx::query_scalar(
            r#"
            SELECT b.content FROM banner b
            INNER JOIN banner_feature f ON f.banner_id = b.id AND f.feature_id = $1
            INNER JOIN banner_tag t ON t.banner_id = b.id AND t.tag_id = $2
            LIMIT 1
            "#,
        )
        .bind(feature_id)
        .bind(tag_id)
        .fetch_optional(self.pool)
        .await
        .map_err(DbError::wrap(OP))?;

        content.ok_or(DbError::BannerNotFound)
    }

    /// List banners under the optional filters, with each banner's complete
    /// tag set.
    ///
    /// The tag sets are fetched in a single `ANY($1)` query instead of one
    /// query per banner; the join that filtered by tag id would otherwise
    /// hide a banner's remaining tags.
    pub async fn list(&self, filter: &BannerFilter) -> Result<Vec<BannerWithTags>, DbError> {
        const OP: &str = "db.banners.list";

        let mut query = list_query(filter);
        let banners: Vec<Banner> = query
            .build_query_as()
            .fetch_all(self.pool)
            .await
            .map_err(DbError::wrap(OP))?;

        if banners.is_empty() {
            return Err(DbError::BannerNotFound);
        }

        let ids: Vec<i64> = banners.iter().map(|b| b.id).collect();
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT banner_id, tag_id FROM banner_tag WHERE banner_id = ANY($1) ORDER BY banner_id, tag_id",
        )
        .bind(&ids)
        .fetch_all(self.pool)
        .await
        .map_err(DbError::wrap(OP))?;

        let mut tags_by_banner: HashMap<i64, Vec<i64>> = HashMap::new();
        for (banner_id, tag_id) in rows {
            tags_by_banner.entry(banner_id).or_default().push(tag_id);
        }

        Ok(banners
            .into_iter()
            .map(|banner| {
                let tag_ids = tags_by_banner.remove(&banner.id).unwrap_or_default();
                BannerWithTags { banner, tag_ids }
            })
            .collect())
    }

    /// Create a banner with its feature and tag associations, reusing any
    /// entity that already exists. Returns the banner id, new or reused.
    ///
    /// The banner upsert rides the UNIQUE constraint on `content`, so two
    /// concurrent creates with identical content converge on one row instead
    /// of racing a check-then-insert.
    pub async fn create(
        &self,
        draft: &NewBanner,
        feature: &Feature,
        tags: &[Tag],
    ) -> Result<i64, DbError> {
        const OP: &str = "db.banners.create";

        let mut tx = self.pool.begin().await.map_err(DbError::wrap(OP))?;

        let banner_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO banner (content, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (content) DO UPDATE SET content = EXCLUDED.content
            RETURNING id
            "#,
        )
        .bind(&draft.content)
        .bind(draft.is_active)
        .bind(draft.created_at)
        .bind(draft.updated_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(DbError::wrap(OP))?;

        ensure_dimension(&mut tx, ENSURE_FEATURE, feature.id, feature.created_at, feature.used_at)
            .await
            .map_err(DbError::wrap(OP))?;

        // Keyed on banner_id alone: repointing keeps the at-most-one-feature
        // invariant when the banner already had a different feature.
        sqlx::query(
            r#"
            INSERT INTO banner_feature (banner_id, feature_id)
            VALUES ($1, $2)
            ON CONFLICT (banner_id) DO UPDATE SET feature_id = EXCLUDED.feature_id
            "#,
        )
        .bind(banner_id)
        .bind(feature.id)
        .execute(&mut *tx)
        .await
        .map_err(DbError::wrap(OP))?;

        for tag in tags {
            ensure_dimension(&mut tx, ENSURE_TAG, tag.id, tag.created_at, tag.used_at)
                .await
                .map_err(DbError::wrap(OP))?;

            sqlx::query(
                "INSERT INTO banner_tag (banner_id, tag_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(banner_id)
            .bind(tag.id)
            .execute(&mut *tx)
            .await
            .map_err(DbError::wrap(OP))?;
        }

        tx.commit().await.map_err(DbError::wrap(OP))?;
        Ok(banner_id)
    }

    /// Update a banner's payload, repoint its feature association and replace
    /// its entire tag set with the supplied one.
    pub async fn update(
        &self,
        update: &BannerUpdate,
        feature_id: i64,
        tag_ids: &[i64],
    ) -> Result<(), DbError> {
        const OP: &str = "db.banners.update";

        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(DbError::wrap(OP))?;

        let res = sqlx::query(
            "UPDATE banner SET content = $1, is_active = $2, updated_at = $3 WHERE id = $4",
        )
        .bind(&update.content)
        .bind(update.is_active)
        .bind(update.updated_at)
        .bind(update.id)
        .execute(&mut *tx)
        .await
        .map_err(DbError::wrap(OP))?;

        if res.rows_affected() == 0 {
            return Err(DbError::BannerNotFound);
        }

        ensure_dimension(&mut tx, ENSURE_FEATURE, feature_id, now, now)
            .await
            .map_err(DbError::wrap(OP))?;

        let res = sqlx::query("UPDATE banner_feature SET feature_id = $1 WHERE banner_id = $2")
            .bind(feature_id)
            .bind(update.id)
            .execute(&mut *tx)
            .await
            .map_err(DbError::wrap(OP))?;

        if res.rows_affected() == 0 {
            // A banner created through this layer always has its feature row,
            // but repair a missing association instead of silently skipping.
            sqlx::query("INSERT INTO banner_feature (banner_id, feature_id) VALUES ($1, $2)")
                .bind(update.id)
                .bind(feature_id)
                .execute(&mut *tx)
                .await
                .map_err(DbError::wrap(OP))?;
        }

        // Full replacement, not a diff: clear the set, then insert the new one.
        sqlx::query("DELETE FROM banner_tag WHERE banner_id = $1")
            .bind(update.id)
            .execute(&mut *tx)
            .await
            .map_err(DbError::wrap(OP))?;

        for &tag_id in tag_ids {
            ensure_dimension(&mut tx, ENSURE_TAG, tag_id, now, now)
                .await
                .map_err(DbError::wrap(OP))?;

            sqlx::query("INSERT INTO banner_tag (banner_id, tag_id) VALUES ($1, $2)")
                .bind(update.id)
                .bind(tag_id)
                .execute(&mut *tx)
                .await
                .map_err(DbError::wrap(OP))?;
        }

        tx.commit().await.map_err(DbError::wrap(OP))?;
        Ok(())
    }

    /// Delete a banner and its association rows in dependency order.
    ///
    /// A banner may legitimately have no tags or no feature association left,
    /// so a zero count on the junction deletes is tolerated. A zero count on
    /// the banner row itself is `BannerNotFound` and rolls everything back.
    pub async fn delete(&self, banner_id: i64) -> Result<(), DbError> {
        const OP: &str = "db.banners.delete";

        let mut tx = self.pool.begin().await.map_err(DbError::wrap(OP))?;

        if let Err(err) = delete_rows(
            &mut tx,
            "DELETE FROM banner_tag WHERE banner_id = $1",
            banner_id,
            DbError::BannerTagNotFound,
        )
        .await
        {
            match err {
                DbError::BannerTagNotFound => {
                    tracing::debug!(banner_id, "banner had no tag associations");
                }
                other => return Err(other),
            }
        }

        if let Err(err) = delete_rows(
            &mut tx,
            "DELETE FROM banner_feature WHERE banner_id = $1",
            banner_id,
            DbError::BannerFeatureNotFound,
        )
        .await
        {
            match err {
                DbError::BannerFeatureNotFound => {
                    tracing::debug!(banner_id, "banner had no feature association");
                }
                other => return Err(other),
            }
        }

        delete_rows(
            &mut tx,
            "DELETE FROM banner WHERE id = $1",
            banner_id,
            DbError::BannerNotFound,
        )
        .await?;

        tx.commit().await.map_err(DbError::wrap(OP))?;
        Ok(())
    }
}

/// One delete statement with an affected-row check; `missing` is returned
/// when nothing was deleted.
async fn delete_rows(
    tx: &mut Transaction<'_, Postgres>,
    sql: &'static str,
    id: i64,
    missing: DbError,
) -> Result<(), DbError> {
    const OP: &str = "db.banners.delete";

    let res = sqlx::query(sql)
        .bind(id)
        .execute(&mut **tx)
        .await
        .map_err(DbError::wrap(OP))?;

    if res.rows_affected() == 0 {
        return Err(missing);
    }

    Ok(())
}


#[cfg(test)]
mod integration_tests {
    //! End-to-end repository behavior against a real database.
    //! Run with: DATABASE_URL=postgres://... cargo test -p bannerd-server -- --ignored

    use super::*;
    use crate::db::{create_pool, migrations};
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    async fn test_pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = create_pool(&url).await.expect("pool creation failed");
        migrations::run(&pool).await.expect("migrations failed");
        pool
    }

    /// Ids and content markers unique across runs against a shared database.
    fn unique_marker() -> i64 {
        static COUNTER: AtomicI64 = AtomicI64::new(0);
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock before epoch")
            .as_nanos() as i64;
        nanos.wrapping_add(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    fn draft(content: &str) -> NewBanner {
        let now = Utc::now();
        NewBanner {
            content: content.to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn feature(id: i64) -> Feature {
        let now = Utc::now();
        Feature {
            id,
            created_at: now,
            used_at: now,
        }
    }

    fn tag(id: i64) -> Tag {
        let now = Utc::now();
        Tag {
            id,
            created_at: now,
            used_at: now,
        }
    }

    fn tags(ids: &[i64]) -> Vec<Tag> {
        ids.iter().map(|&id| tag(id)).collect()
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn create_with_identical_content_reuses_row() {
        let pool = test_pool().await;
        let repo = BannerRepo::new(&pool);
        let marker = unique_marker();
        let content = format!("idempotent-{marker}");

        let first = repo
            .create(&draft(&content), &feature(marker), &tags(&[marker + 1]))
            .await
            .expect("first create failed");
        let second = repo
            .create(&draft(&content), &feature(marker), &tags(&[marker + 1]))
            .await
            .expect("second create failed");

        assert_eq!(first, second);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM banner WHERE content = $1")
            .bind(&content)
            .fetch_one(&pool)
            .await
            .expect("count failed");
        assert_eq!(count, 1);
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn filters_select_matching_banners() {
        let pool = test_pool().await;
        let repo = BannerRepo::new(&pool);
        let m = unique_marker();
        let (f1, f2, t1, t2) = (m, m + 1, m + 2, m + 3);

        let a = repo
            .create(&draft(&format!("combinatorics-a-{m}")), &feature(f1), &tags(&[t1, t2]))
            .await
            .expect("create a failed");
        let b = repo
            .create(&draft(&format!("combinatorics-b-{m}")), &feature(f2), &tags(&[t1]))
            .await
            .expect("create b failed");

        let by_feature = repo
            .list(&BannerFilter {
                feature_id: f1,
                ..Default::default()
            })
            .await
            .expect("feature filter failed");
        assert_eq!(
            by_feature.iter().map(|r| r.banner.id).collect::<Vec<_>>(),
            vec![a]
        );

        let by_tag = repo
            .list(&BannerFilter {
                tag_id: t1,
                ..Default::default()
            })
            .await
            .expect("tag filter failed");
        let mut ids: Vec<i64> = by_tag.iter().map(|r| r.banner.id).collect();
        ids.sort_unstable();
        let mut expected = vec![a, b];
        expected.sort_unstable();
        assert_eq!(ids, expected);

        let by_both = repo
            .list(&BannerFilter {
                feature_id: f1,
                tag_id: t2,
                ..Default::default()
            })
            .await
            .expect("combined filter failed");
        assert_eq!(
            by_both.iter().map(|r| r.banner.id).collect::<Vec<_>>(),
            vec![a]
        );
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn tag_sets_are_complete_regardless_of_filter() {
        let pool = test_pool().await;
        let repo = BannerRepo::new(&pool);
        let m = unique_marker();
        let (f, t1, t2, t3) = (m, m + 1, m + 2, m + 3);

        repo.create(&draft(&format!("tagset-{m}")), &feature(f), &tags(&[t1, t2, t3]))
            .await
            .expect("create failed");

        // Filtering on one tag must not hide the banner's other tags.
        let rows = repo
            .list(&BannerFilter {
                feature_id: f,
                tag_id: t2,
                ..Default::default()
            })
            .await
            .expect("list failed");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].tag_ids, vec![t1, t2, t3]);
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn pagination_returns_the_second_of_three() {
        let pool = test_pool().await;
        let repo = BannerRepo::new(&pool);
        let m = unique_marker();
        let f = m;

        let mut ids = Vec::new();
        for i in 0..3 {
            let id = repo
                .create(&draft(&format!("page-{m}-{i}")), &feature(f), &tags(&[m + 1]))
                .await
                .expect("create failed");
            ids.push(id);
        }
        ids.sort_unstable();

        let page = repo
            .list(&BannerFilter {
                feature_id: f,
                limit: 1,
                offset: 1,
                ..Default::default()
            })
            .await
            .expect("paged list failed");
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].banner.id, ids[1]);
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn update_replaces_tag_set() {
        let pool = test_pool().await;
        let repo = BannerRepo::new(&pool);
        let m = unique_marker();
        let (f, t1, t2, t3) = (m, m + 1, m + 2, m + 3);

        let id = repo
            .create(&draft(&format!("replace-{m}")), &feature(f), &tags(&[t1, t2]))
            .await
            .expect("create failed");

        let update = BannerUpdate {
            id,
            content: format!("replace-{m}-v2"),
            is_active: false,
            updated_at: Utc::now(),
        };
        repo.update(&update, f, &[t3]).await.expect("update failed");

        let rows = repo
            .list(&BannerFilter {
                feature_id: f,
                ..Default::default()
            })
            .await
            .expect("list failed");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].banner.content, format!("replace-{m}-v2"));
        assert!(!rows[0].banner.is_active);
        assert_eq!(rows[0].tag_ids, vec![t3]);
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn update_recreates_missing_feature_association() {
        let pool = test_pool().await;
        let repo = BannerRepo::new(&pool);
        let m = unique_marker();
        let (f, t) = (m, m + 1);

        let id = repo
            .create(&draft(&format!("repair-{m}")), &feature(f), &tags(&[t]))
            .await
            .expect("create failed");

        // Simulate a banner that lost its feature row; the repointing UPDATE
        // then affects zero rows and the insert branch must take over.
        sqlx::query("DELETE FROM banner_feature WHERE banner_id = $1")
            .bind(id)
            .execute(&pool)
            .await
            .expect("association delete failed");

        let update = BannerUpdate {
            id,
            content: format!("repair-{m}-v2"),
            is_active: true,
            updated_at: Utc::now(),
        };
        repo.update(&update, f, &[t]).await.expect("update failed");

        let feature_id: i64 =
            sqlx::query_scalar("SELECT feature_id FROM banner_feature WHERE banner_id = $1")
                .bind(id)
                .fetch_one(&pool)
                .await
                .expect("association lookup failed");
        assert_eq!(feature_id, f);

        let content = repo.content(f, t).await.expect("content failed");
        assert_eq!(content, format!("repair-{m}-v2"));
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn update_missing_banner_reports_not_found() {
        let pool = test_pool().await;
        let repo = BannerRepo::new(&pool);
        let m = unique_marker();

        let update = BannerUpdate {
            id: -m,
            content: format!("ghost-{m}"),
            is_active: true,
            updated_at: Utc::now(),
        };
        let err = repo.update(&update, m, &[m + 1]).await.unwrap_err();
        assert!(matches!(err, DbError::BannerNotFound));
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn delete_cascades_associations() {
        let pool = test_pool().await;
        let repo = BannerRepo::new(&pool);
        let m = unique_marker();
        let (f, t) = (m, m + 1);

        let id = repo
            .create(&draft(&format!("cascade-{m}")), &feature(f), &tags(&[t]))
            .await
            .expect("create failed");

        repo.delete(id).await.expect("delete failed");

        let err = repo
            .list(&BannerFilter {
                feature_id: f,
                tag_id: t,
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::BannerNotFound));

        let remaining: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM banner_tag WHERE banner_id = $1")
                .bind(id)
                .fetch_one(&pool)
                .await
                .expect("count failed");
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn delete_missing_banner_reports_not_found() {
        let pool = test_pool().await;
        let repo = BannerRepo::new(&pool);

        let err = repo.delete(-unique_marker()).await.unwrap_err();
        assert!(matches!(err, DbError::BannerNotFound));
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn content_distinguishes_not_found_from_empty() {
        let pool = test_pool().await;
        let repo = BannerRepo::new(&pool);
        let m = unique_marker();

        let err = repo.content(m, m + 1).await.unwrap_err();
        assert!(matches!(err, DbError::BannerNotFound));

        repo.create(&draft(&format!("served-{m}")), &feature(m), &tags(&[m + 1]))
            .await
            .expect("create failed");
        let content = repo.content(m, m + 1).await.expect("content failed");
        assert_eq!(content, format!("served-{m}"));
    }
}
