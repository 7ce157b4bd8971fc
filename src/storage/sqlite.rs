use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{
    Sqlite, SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions,
};
use sqlx::QueryBuilder;
use std::str::FromStr;
use tracing::{debug, info, warn};

use super::{
    Attribute, ContentFilter, ContentOrder, FaqCategory, FaqHighlight, Highlight,
    HighlightedContent, ParentFilter, PatientAttribute, RelatedChanges, RelatedDiff, RelatedItem,
    RelatedItemsList, RelatedSync, Storage, StudySession, Tag, TagCategory, ORDER_STEP,
};
use crate::config::DatabaseConfig;
use crate::content::{
    Answer, Article, Author, ContentItem, ContentKind, ContentReference, Patient, PatientStory,
    Question,
};
use crate::error::{StorageError, StorageResult};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed storage implementation
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Create a private in-memory database (one pinned connection).
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_content(
        &self,
        kind: ContentKind,
        filter: &ContentFilter,
        id: Option<i64>,
    ) -> StorageResult<Vec<ContentItem>> {
        let mut query = build_content_query(kind, filter, id);

        let items = match kind {
            ContentKind::Patient => query
                .build_query_as::<PatientRow>()
                .fetch_all(&self.pool)
                .await?
                .into_iter()
                .map(|r| ContentItem::Patient(r.into()))
                .collect(),
            ContentKind::PatientStory => query
                .build_query_as::<PatientStoryRow>()
                .fetch_all(&self.pool)
                .await?
                .into_iter()
                .map(|r| ContentItem::PatientStory(r.into()))
                .collect(),
            ContentKind::Question => query
                .build_query_as::<QuestionRow>()
                .fetch_all(&self.pool)
                .await?
                .into_iter()
                .map(|r| ContentItem::Question(r.into()))
                .collect(),
            ContentKind::Answer => query
                .build_query_as::<AnswerRow>()
                .fetch_all(&self.pool)
                .await?
                .into_iter()
                .map(|r| ContentItem::Answer(r.into()))
                .collect(),
            ContentKind::Article => query
                .build_query_as::<ArticleRow>()
                .fetch_all(&self.pool)
                .await?
                .into_iter()
                .map(|r| ContentItem::Article(r.into()))
                .collect(),
        };

        Ok(items)
    }
}

/// Per-kind table layout used to build content queries.
struct ContentTable {
    name: &'static str,
    select: &'static str,
    parent: Option<&'static str>,
    title: &'static str,
    order: &'static str,
}

fn content_table(kind: ContentKind) -> ContentTable {
    match kind {
        ContentKind::Patient => ContentTable {
            name: "patients",
            select: "SELECT t.id AS id, t.name AS name, t.published AS published FROM patients t",
            parent: None,
            title: "t.name",
            order: "t.name",
        },
        ContentKind::PatientStory => ContentTable {
            name: "patient_stories",
            select: "SELECT t.id AS id, t.patient_id AS patient_id, t.title AS title, \
                     t.sort_order AS sort_order, t.published AS published, t.content AS content \
                     FROM patient_stories t",
            parent: Some("t.patient_id"),
            title: "t.title",
            order: "t.sort_order",
        },
        ContentKind::Question => ContentTable {
            name: "questions",
            select: "SELECT t.id AS id, t.text AS text, t.published AS published FROM questions t",
            parent: None,
            title: "t.text",
            order: "t.text",
        },
        ContentKind::Answer => ContentTable {
            name: "answers",
            select: "SELECT t.id AS id, t.question_id AS question_id, t.author_id AS author_id, \
                     au.name AS author_name, t.text AS text, t.sort_order AS sort_order, \
                     t.published AS published \
                     FROM answers t LEFT JOIN authors au ON au.id = t.author_id",
            parent: Some("t.question_id"),
            title: "au.name",
            order: "t.sort_order",
        },
        ContentKind::Article => ContentTable {
            name: "articles",
            select: "SELECT t.id AS id, t.parent_id AS parent_id, t.title AS title, \
                     t.description AS description, t.content AS content, \
                     t.sort_order AS sort_order, t.published AS published FROM articles t",
            parent: Some("t.parent_id"),
            title: "t.title",
            order: "t.sort_order",
        },
    }
}

fn build_content_query(
    kind: ContentKind,
    filter: &ContentFilter,
    id: Option<i64>,
) -> QueryBuilder<'static, Sqlite> {
    let table = content_table(kind);
    let mut query = QueryBuilder::<Sqlite>::new(table.select);
    query.push(" WHERE 1 = 1");

    if let Some(id) = id {
        query.push(" AND t.id = ").push_bind(id);
    }
    if filter.published_only {
        query.push(" AND t.published = 1");
    }
    if let Some(parent) = table.parent {
        match filter.parent {
            ParentFilter::Any => {}
            ParentFilter::TopLevel => {
                query.push(format!(" AND {} IS NULL", parent));
            }
            ParentFilter::Parent(parent_id) => {
                query.push(format!(" AND {} = ", parent)).push_bind(parent_id);
            }
        }
    }

    let order = match filter.order_by {
        ContentOrder::Title => table.title,
        ContentOrder::Order => table.order,
        ContentOrder::Id => "t.id",
    };
    query.push(format!(" ORDER BY {}, t.id", order));

    query
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn create_patient(&self, patient: &Patient) -> StorageResult<Patient> {
        let result = sqlx::query("INSERT INTO patients (name, published) VALUES (?, ?)")
            .bind(&patient.name)
            .bind(patient.published)
            .execute(&self.pool)
            .await?;

        Ok(Patient {
            id: result.last_insert_rowid(),
            ..patient.clone()
        })
    }

    async fn create_patient_story(&self, story: &PatientStory) -> StorageResult<PatientStory> {
        let result = sqlx::query(
            r#"
            INSERT INTO patient_stories (patient_id, title, sort_order, published, content)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(story.patient_id)
        .bind(&story.title)
        .bind(story.order)
        .bind(story.published)
        .bind(&story.content)
        .execute(&self.pool)
        .await?;

        Ok(PatientStory {
            id: result.last_insert_rowid(),
            ..story.clone()
        })
    }

    async fn create_question(&self, question: &Question) -> StorageResult<Question> {
        let result = sqlx::query("INSERT INTO questions (text, published) VALUES (?, ?)")
            .bind(&question.text)
            .bind(question.published)
            .execute(&self.pool)
            .await?;

        Ok(Question {
            id: result.last_insert_rowid(),
            ..question.clone()
        })
    }

    async fn create_author(&self, author: &Author) -> StorageResult<Author> {
        let result = sqlx::query(
            r#"
            INSERT INTO authors (patient_id, provider, name, description)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(author.patient_id)
        .bind(author.provider)
        .bind(&author.name)
        .bind(&author.description)
        .execute(&self.pool)
        .await?;

        Ok(Author {
            id: result.last_insert_rowid(),
            ..author.clone()
        })
    }

    async fn create_answer(&self, answer: &Answer) -> StorageResult<Answer> {
        let result = sqlx::query(
            r#"
            INSERT INTO answers (question_id, author_id, text, sort_order, published)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(answer.question_id)
        .bind(answer.author_id)
        .bind(&answer.text)
        .bind(answer.order)
        .bind(answer.published)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        match self
            .get_content(ContentReference::new(ContentKind::Answer, id))
            .await?
        {
            Some(ContentItem::Answer(stored)) => Ok(stored),
            _ => Err(StorageError::Query {
                message: format!("Inserted answer {} could not be read back", id),
            }),
        }
    }

    async fn create_article(&self, article: &Article) -> StorageResult<Article> {
        let result = sqlx::query(
            r#"
            INSERT INTO articles (parent_id, title, description, content, sort_order, published)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(article.parent_id)
        .bind(&article.title)
        .bind(&article.description)
        .bind(&article.content)
        .bind(article.order)
        .bind(article.published)
        .execute(&self.pool)
        .await?;

        Ok(Article {
            id: result.last_insert_rowid(),
            ..article.clone()
        })
    }

    async fn get_content(&self, reference: ContentReference) -> StorageResult<Option<ContentItem>> {
        let items = self
            .fetch_content(reference.kind, &ContentFilter::all(), Some(reference.id))
            .await?;
        Ok(items.into_iter().next())
    }

    async fn query_content(
        &self,
        kind: ContentKind,
        filter: &ContentFilter,
    ) -> StorageResult<Vec<ContentItem>> {
        self.fetch_content(kind, filter, None).await
    }

    async fn delete_content(&self, reference: ContentReference) -> StorageResult<()> {
        let table = content_table(reference.kind);
        sqlx::query(&format!("DELETE FROM {} WHERE id = ?", table.name))
            .bind(reference.id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn create_attribute(&self, attribute: &Attribute) -> StorageResult<Attribute> {
        let result =
            sqlx::query("INSERT INTO attributes (name, sort_order, published) VALUES (?, ?, ?)")
                .bind(&attribute.name)
                .bind(attribute.order)
                .bind(attribute.published)
                .execute(&self.pool)
                .await?;

        Ok(Attribute {
            id: result.last_insert_rowid(),
            ..attribute.clone()
        })
    }

    async fn set_patient_attribute(
        &self,
        patient_id: i64,
        attribute_id: i64,
        value: &str,
        order: i64,
    ) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO patient_attributes (patient_id, attribute_id, value, sort_order)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (patient_id, attribute_id)
            DO UPDATE SET value = excluded.value, sort_order = excluded.sort_order
            "#,
        )
        .bind(patient_id)
        .bind(attribute_id)
        .bind(value)
        .bind(order)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_patient_attributes(
        &self,
        patient_ids: &[i64],
    ) -> StorageResult<Vec<PatientAttribute>> {
        if patient_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT pa.patient_id AS patient_id, pa.attribute_id AS attribute_id,
                   attr.name AS name, pa.value AS value, pa.sort_order AS sort_order
            FROM patient_attributes pa
            JOIN attributes attr ON attr.id = pa.attribute_id
            WHERE attr.published = 1 AND pa.patient_id IN (
            "#,
        );
        let mut ids = query.separated(", ");
        for id in patient_ids {
            ids.push_bind(*id);
        }
        ids.push_unseparated(")");
        query.push(" ORDER BY pa.patient_id, pa.sort_order, attr.sort_order, pa.id");

        let rows: Vec<PatientAttributeRow> =
            query.build_query_as().fetch_all(&self.pool).await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn create_tag_category(&self, category: &TagCategory) -> StorageResult<TagCategory> {
        let result = sqlx::query(
            "INSERT INTO tag_categories (name, sort_order, published) VALUES (?, ?, ?)",
        )
        .bind(&category.name)
        .bind(category.order)
        .bind(category.published)
        .execute(&self.pool)
        .await?;

        Ok(TagCategory {
            id: result.last_insert_rowid(),
            ..category.clone()
        })
    }

    async fn delete_tag_category(&self, id: i64) -> StorageResult<()> {
        sqlx::query("DELETE FROM tag_categories WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn get_tag_categories(&self) -> StorageResult<Vec<TagCategory>> {
        let rows: Vec<TagCategoryRow> = sqlx::query_as(
            r#"
            SELECT id, name, sort_order, published
            FROM tag_categories
            ORDER BY sort_order ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn create_tag(&self, tag: &Tag) -> StorageResult<Tag> {
        let result = sqlx::query(
            r#"
            INSERT INTO tags (name, published, warning, sort_order, category_id)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&tag.name)
        .bind(tag.published)
        .bind(tag.warning)
        .bind(tag.order)
        .bind(tag.category_id)
        .execute(&self.pool)
        .await?;

        Ok(Tag {
            id: result.last_insert_rowid(),
            ..tag.clone()
        })
    }

    async fn get_tags(&self) -> StorageResult<Vec<Tag>> {
        let rows: Vec<TagRow> = sqlx::query_as(
            r#"
            SELECT id, name, published, warning, sort_order, category_id
            FROM tags
            ORDER BY sort_order ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn tag_content(&self, tag_id: i64, reference: ContentReference) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO tagged_content (tag_id, content_kind, object_id)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(tag_id)
        .bind(reference.kind.tag())
        .bind(reference.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_content_tags(&self, reference: ContentReference) -> StorageResult<Vec<Tag>> {
        let rows: Vec<TagRow> = sqlx::query_as(
            r#"
            SELECT t.id AS id, t.name AS name, t.published AS published, t.warning AS warning,
                   t.sort_order AS sort_order, t.category_id AS category_id
            FROM tagged_content tc
            JOIN tags t ON t.id = tc.tag_id
            WHERE tc.content_kind = ? AND tc.object_id = ?
            ORDER BY tc.id ASC
            "#,
        )
        .bind(reference.kind.tag())
        .bind(reference.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn get_tagged_references(&self, tag_id: i64) -> StorageResult<Vec<ContentReference>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT content_kind, object_id
            FROM tagged_content
            WHERE tag_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(tag_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(kind, id)| parse_stored_reference(&kind, id))
            .collect())
    }

    async fn get_or_create_related_list(&self, name: &str) -> StorageResult<RelatedItemsList> {
        let mut tx = self.pool.begin().await?;

        let created = sqlx::query(
            "INSERT INTO related_lists (name) VALUES (?) ON CONFLICT (name) DO NOTHING",
        )
        .bind(name)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        let row: RelatedListRow = sqlx::query_as("SELECT id, name FROM related_lists WHERE name = ?")
            .bind(name)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        if created {
            debug!(list = %name, list_id = row.id, "Created related list");
        }

        Ok(RelatedItemsList {
            id: row.id,
            name: row.name,
        })
    }

    async fn get_related_items(&self, list_id: i64) -> StorageResult<Vec<RelatedItem>> {
        let rows: Vec<RelatedItemRow> = sqlx::query_as(
            r#"
            SELECT id, list_id, content_kind, object_id, sort_order
            FROM related_items
            WHERE list_id = ?
            ORDER BY sort_order ASC, id ASC
            "#,
        )
        .bind(list_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().filter_map(related_item_from_row).collect())
    }

    async fn apply_related_changes(
        &self,
        list_id: i64,
        changes: &RelatedChanges,
    ) -> StorageResult<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        write_related_changes(&mut tx, list_id, changes).await?;
        tx.commit().await?;

        Ok(())
    }

    async fn sync_related_items(
        &self,
        list_id: i64,
        target: &RelatedSync,
    ) -> StorageResult<RelatedDiff> {
        let mut tx = self.pool.begin().await?;

        // No-op write: takes the database write lock before the members are read.
        sqlx::query("UPDATE related_lists SET name = name WHERE id = ?")
            .bind(list_id)
            .execute(&mut *tx)
            .await?;

        let rows: Vec<RelatedItemRow> = sqlx::query_as(
            r#"
            SELECT id, list_id, content_kind, object_id, sort_order
            FROM related_items
            WHERE list_id = ?
            ORDER BY sort_order ASC, id ASC
            "#,
        )
        .bind(list_id)
        .fetch_all(&mut *tx)
        .await?;
        let members: Vec<RelatedItem> = rows.into_iter().filter_map(related_item_from_row).collect();

        let (changes, diff) = target.plan(&members);
        write_related_changes(&mut tx, list_id, &changes).await?;
        tx.commit().await?;

        debug!(
            list_id,
            added = diff.added.len(),
            removed = diff.removed.len(),
            reordered = diff.reordered.len(),
            "Synced related list"
        );
        Ok(diff)
    }

    async fn delete_related_list(&self, list_id: i64) -> StorageResult<()> {
        sqlx::query("DELETE FROM related_lists WHERE id = ?")
            .bind(list_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn create_faq_category(&self, category: &FaqCategory) -> StorageResult<FaqCategory> {
        let mut tx = self.pool.begin().await?;

        let order = if category.order == 0 {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM faq_categories")
                .fetch_one(&mut *tx)
                .await?;
            (count + 1) * ORDER_STEP
        } else {
            category.order
        };

        let result = sqlx::query(
            "INSERT INTO faq_categories (name, sort_order, published) VALUES (?, ?, ?)",
        )
        .bind(&category.name)
        .bind(order)
        .bind(category.published)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(FaqCategory {
            id: result.last_insert_rowid(),
            order,
            ..category.clone()
        })
    }

    async fn get_faq_category(&self, id: i64) -> StorageResult<Option<FaqCategory>> {
        let row: Option<FaqCategoryRow> = sqlx::query_as(
            "SELECT id, name, sort_order, published FROM faq_categories WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn get_faq_categories(&self, published_only: bool) -> StorageResult<Vec<FaqCategory>> {
        let rows: Vec<FaqCategoryRow> = sqlx::query_as(
            r#"
            SELECT id, name, sort_order, published
            FROM faq_categories
            WHERE published = 1 OR ? = 0
            ORDER BY sort_order ASC, id ASC
            "#,
        )
        .bind(published_only)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn add_question_to_category(
        &self,
        category_id: i64,
        question_id: i64,
        order: i64,
    ) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO faq_category_questions (category_id, question_id, sort_order)
            VALUES (?, ?, ?)
            ON CONFLICT (category_id, question_id) DO UPDATE SET sort_order = excluded.sort_order
            "#,
        )
        .bind(category_id)
        .bind(question_id)
        .bind(order)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_category_questions(&self, category_id: i64) -> StorageResult<Vec<Question>> {
        let rows: Vec<QuestionRow> = sqlx::query_as(
            r#"
            SELECT q.id AS id, q.text AS text, q.published AS published
            FROM faq_category_questions cq
            JOIN questions q ON q.id = cq.question_id
            WHERE cq.category_id = ?
            ORDER BY cq.sort_order ASC, cq.id ASC
            "#,
        )
        .bind(category_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn create_faq_highlight(&self, highlight: &FaqHighlight) -> StorageResult<FaqHighlight> {
        let result = sqlx::query(
            r#"
            INSERT INTO faq_highlights (question_id, title, content, sort_order, published)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(highlight.question_id)
        .bind(&highlight.title)
        .bind(&highlight.content)
        .bind(highlight.order)
        .bind(highlight.published)
        .execute(&self.pool)
        .await?;

        Ok(FaqHighlight {
            id: result.last_insert_rowid(),
            ..highlight.clone()
        })
    }

    async fn get_faq_highlights(&self, question_id: i64) -> StorageResult<Vec<FaqHighlight>> {
        let rows: Vec<FaqHighlightRow> = sqlx::query_as(
            r#"
            SELECT id, question_id, title, content, sort_order, published
            FROM faq_highlights
            WHERE question_id = ? AND published = 1
            ORDER BY sort_order ASC, id ASC
            "#,
        )
        .bind(question_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn create_study_session(&self, session: &StudySession) -> StorageResult<StudySession> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO study_sessions (persona, high_agency_version, integrated_content_version, start)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&session.persona)
        .bind(session.high_agency_version)
        .bind(session.integrated_content_version)
        .bind(session.start.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(StudySession {
            id: result.last_insert_rowid(),
            ..session.clone()
        })
    }

    async fn get_study_session(&self, id: i64) -> StorageResult<Option<StudySession>> {
        let row: Option<StudySessionRow> = sqlx::query_as(
            r#"
            SELECT id, persona, high_agency_version, integrated_content_version, start
            FROM study_sessions
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn delete_study_session(&self, id: i64) -> StorageResult<()> {
        sqlx::query("DELETE FROM study_sessions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn create_highlight(&self, session_id: i64) -> StorageResult<Highlight> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO highlights (session_id, created_at, updated_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(session_id)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(Highlight {
            id: result.last_insert_rowid(),
            session_id,
            content_id: None,
            text: None,
            deleted: false,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_highlight(&self, id: i64) -> StorageResult<Option<Highlight>> {
        let row: Option<HighlightRow> = sqlx::query_as(
            r#"
            SELECT id, session_id, content_id, text, deleted, created_at, updated_at
            FROM highlights
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn update_highlight(&self, highlight: &Highlight) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE highlights
            SET content_id = ?, text = ?, deleted = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(highlight.content_id)
        .bind(&highlight.text)
        .bind(highlight.deleted)
        .bind(highlight.updated_at.to_rfc3339())
        .bind(highlight.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::Query {
                message: format!("Highlight {} does not exist", highlight.id),
            });
        }

        Ok(())
    }

    async fn get_or_create_highlighted_content(
        &self,
        session_id: i64,
        content_id: &str,
    ) -> StorageResult<HighlightedContent> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO highlighted_content (session_id, content_id)
            VALUES (?, ?)
            ON CONFLICT (session_id, content_id) DO NOTHING
            "#,
        )
        .bind(session_id)
        .bind(content_id)
        .execute(&mut *tx)
        .await?;

        let row: HighlightedContentRow = sqlx::query_as(
            r#"
            SELECT id, session_id, content_id, content
            FROM highlighted_content
            WHERE session_id = ? AND content_id = ?
            "#,
        )
        .bind(session_id)
        .bind(content_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(row.into())
    }

    async fn get_highlighted_content(&self, id: i64) -> StorageResult<Option<HighlightedContent>> {
        let row: Option<HighlightedContentRow> = sqlx::query_as(
            "SELECT id, session_id, content_id, content FROM highlighted_content WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn update_highlighted_content(&self, id: i64, content: &str) -> StorageResult<()> {
        sqlx::query("UPDATE highlighted_content SET content = ? WHERE id = ?")
            .bind(content)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

/// Stored kind columns are plain text; rows with an unknown kind are skipped.
/// Apply removals, then reorders, then inserts on an open transaction.
async fn write_related_changes(
    conn: &mut SqliteConnection,
    list_id: i64,
    changes: &RelatedChanges,
) -> StorageResult<()> {
    for item_id in &changes.remove {
        sqlx::query("DELETE FROM related_items WHERE id = ? AND list_id = ?")
            .bind(item_id)
            .bind(list_id)
            .execute(&mut *conn)
            .await?;
    }

    for (item_id, order) in &changes.reorder {
        sqlx::query("UPDATE related_items SET sort_order = ? WHERE id = ? AND list_id = ?")
            .bind(order)
            .bind(item_id)
            .bind(list_id)
            .execute(&mut *conn)
            .await?;
    }

    for reference in &changes.insert {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM related_items WHERE list_id = ?")
            .bind(list_id)
            .fetch_one(&mut *conn)
            .await?;

        sqlx::query(
            r#"
            INSERT OR IGNORE INTO related_items (list_id, content_kind, object_id, sort_order)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(list_id)
        .bind(reference.kind.tag())
        .bind(reference.id)
        .bind((count + 1) * ORDER_STEP)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

fn related_item_from_row(row: RelatedItemRow) -> Option<RelatedItem> {
    let reference = parse_stored_reference(&row.content_kind, row.object_id)?;
    Some(RelatedItem {
        id: row.id,
        list_id: row.list_id,
        reference,
        order: row.sort_order,
    })
}

fn parse_stored_reference(kind: &str, id: i64) -> Option<ContentReference> {
    match kind.parse::<ContentKind>() {
        Ok(kind) => Some(ContentReference::new(kind, id)),
        Err(e) => {
            warn!(kind = %kind, object_id = id, error = %e, "Skipping row with unknown content kind");
            None
        }
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

// Internal row types for SQLx mapping
#[derive(sqlx::FromRow)]
struct PatientRow {
    id: i64,
    name: String,
    published: bool,
}

impl From<PatientRow> for Patient {
    fn from(row: PatientRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            published: row.published,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PatientStoryRow {
    id: i64,
    patient_id: i64,
    title: String,
    sort_order: i64,
    published: bool,
    content: Option<String>,
}

impl From<PatientStoryRow> for PatientStory {
    fn from(row: PatientStoryRow) -> Self {
        Self {
            id: row.id,
            patient_id: row.patient_id,
            title: row.title,
            order: row.sort_order,
            published: row.published,
            content: row.content,
        }
    }
}

#[derive(sqlx::FromRow)]
struct QuestionRow {
    id: i64,
    text: String,
    published: bool,
}

impl From<QuestionRow> for Question {
    fn from(row: QuestionRow) -> Self {
        Self {
            id: row.id,
            text: row.text,
            published: row.published,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AnswerRow {
    id: i64,
    question_id: i64,
    author_id: Option<i64>,
    author_name: Option<String>,
    text: Option<String>,
    sort_order: i64,
    published: bool,
}

impl From<AnswerRow> for Answer {
    fn from(row: AnswerRow) -> Self {
        Self {
            id: row.id,
            question_id: row.question_id,
            author_id: row.author_id,
            author_name: row.author_name,
            text: row.text,
            order: row.sort_order,
            published: row.published,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ArticleRow {
    id: i64,
    parent_id: Option<i64>,
    title: String,
    description: Option<String>,
    content: Option<String>,
    sort_order: i64,
    published: bool,
}

impl From<ArticleRow> for Article {
    fn from(row: ArticleRow) -> Self {
        Self {
            id: row.id,
            parent_id: row.parent_id,
            title: row.title,
            description: row.description,
            content: row.content,
            order: row.sort_order,
            published: row.published,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PatientAttributeRow {
    patient_id: i64,
    attribute_id: i64,
    name: String,
    value: String,
    sort_order: i64,
}

impl From<PatientAttributeRow> for PatientAttribute {
    fn from(row: PatientAttributeRow) -> Self {
        Self {
            patient_id: row.patient_id,
            attribute_id: row.attribute_id,
            name: row.name,
            value: row.value,
            order: row.sort_order,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TagCategoryRow {
    id: i64,
    name: String,
    sort_order: i64,
    published: bool,
}

impl From<TagCategoryRow> for TagCategory {
    fn from(row: TagCategoryRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            order: row.sort_order,
            published: row.published,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TagRow {
    id: i64,
    name: String,
    published: bool,
    warning: bool,
    sort_order: i64,
    category_id: Option<i64>,
}

impl From<TagRow> for Tag {
    fn from(row: TagRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            published: row.published,
            warning: row.warning,
            order: row.sort_order,
            category_id: row.category_id,
        }
    }
}

#[derive(sqlx::FromRow)]
struct RelatedListRow {
    id: i64,
    name: String,
}

#[derive(sqlx::FromRow)]
struct RelatedItemRow {
    id: i64,
    list_id: i64,
    content_kind: String,
    object_id: i64,
    sort_order: i64,
}

#[derive(sqlx::FromRow)]
struct FaqCategoryRow {
    id: i64,
    name: String,
    sort_order: i64,
    published: bool,
}

impl From<FaqCategoryRow> for FaqCategory {
    fn from(row: FaqCategoryRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            order: row.sort_order,
            published: row.published,
        }
    }
}

#[derive(sqlx::FromRow)]
struct FaqHighlightRow {
    id: i64,
    question_id: i64,
    title: Option<String>,
    content: Option<String>,
    sort_order: i64,
    published: bool,
}

impl From<FaqHighlightRow> for FaqHighlight {
    fn from(row: FaqHighlightRow) -> Self {
        Self {
            id: row.id,
            question_id: row.question_id,
            title: row.title,
            content: row.content,
            order: row.sort_order,
            published: row.published,
        }
    }
}

#[derive(sqlx::FromRow)]
struct StudySessionRow {
    id: i64,
    persona: Option<String>,
    high_agency_version: bool,
    integrated_content_version: bool,
    start: String,
}

impl From<StudySessionRow> for StudySession {
    fn from(row: StudySessionRow) -> Self {
        Self {
            id: row.id,
            persona: row.persona,
            high_agency_version: row.high_agency_version,
            integrated_content_version: row.integrated_content_version,
            start: parse_timestamp(&row.start),
        }
    }
}

#[derive(sqlx::FromRow)]
struct HighlightRow {
    id: i64,
    session_id: i64,
    content_id: Option<i64>,
    text: Option<String>,
    deleted: bool,
    created_at: String,
    updated_at: String,
}

impl From<HighlightRow> for Highlight {
    fn from(row: HighlightRow) -> Self {
        Self {
            id: row.id,
            session_id: row.session_id,
            content_id: row.content_id,
            text: row.text,
            deleted: row.deleted,
            created_at: parse_timestamp(&row.created_at),
            updated_at: parse_timestamp(&row.updated_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct HighlightedContentRow {
    id: i64,
    session_id: i64,
    content_id: String,
    content: Option<String>,
}

impl From<HighlightedContentRow> for HighlightedContent {
    fn from(row: HighlightedContentRow) -> Self {
        Self {
            id: row.id,
            session_id: row.session_id,
            content_id: row.content_id,
            content: row.content,
        }
    }
}
