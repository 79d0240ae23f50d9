//! SurrealDB implementation of the counter store.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use serde::Deserialize;
use surrealdb::{
    Surreal,
    engine::local::{Db, Mem, SurrealKv},
};
use tracing::{info, instrument, warn};

use crate::base::types::{Aggregate, BotError, ReactionEvent, Res, Void};

use super::{DbClient, GenericDbClient, TOP_REACTIONS_LIMIT, rank};

// Statements.

const NAMESPACE: &str = "beebot";
const DATABASE: &str = "reactions";

const INITIALIZE: &str = r#"
BEGIN TRANSACTION;
REMOVE TABLE IF EXISTS reactions;
DEFINE TABLE reactions SCHEMAFULL;
DEFINE FIELD from_user ON reactions TYPE string;
DEFINE FIELD to_user ON reactions TYPE string;
DEFINE FIELD reaction ON reactions TYPE string;
DEFINE FIELD counter ON reactions TYPE int;
UPSERT schema:reactions SET version = 1;
COMMIT TRANSACTION;
"#;

const SCHEMA_VERSION: &str = "SELECT VALUE version FROM schema:reactions;";

const INSERT: &str = "CREATE reactions CONTENT $row;";

// Extra methods on `DbClient` applied by the surreal implementation.

impl DbClient {
    /// Opens the file-backed counter store at `path`.
    ///
    /// The counter log is created when the store is new, and dropped and
    /// recreated when `reset` is set.
    pub async fn surreal(path: &Path, reset: bool) -> Res<Self> {
        let client = SurrealDbClient::open(path).await?;

        if reset || !client.is_initialized().await? {
            info!("Initializing counter store at `{}` ...", path.display());
            client.initialize().await?;
        }

        Ok(Self { inner: Arc::new(client) })
    }

    /// Creates an initialized in-memory counter store.
    pub async fn surreal_memory() -> Res<Self> {
        let client = SurrealDbClient::memory().await?;
        client.initialize().await?;

        Ok(Self { inner: Arc::new(client) })
    }

    /// Creates an in-memory counter store without creating the counter log.
    pub async fn surreal_memory_uninitialized() -> Res<Self> {
        let client = SurrealDbClient::memory().await?;

        Ok(Self { inner: Arc::new(client) })
    }
}

// Structs.

/// A grouped total as returned by SurrealDB.
#[derive(Debug, Deserialize)]
struct GroupedRow {
    #[serde(alias = "to_user", alias = "from_user", alias = "reaction")]
    subject: String,
    total: i64,
}

impl From<GroupedRow> for Aggregate {
    fn from(row: GroupedRow) -> Self {
        Aggregate::new(row.subject, row.total)
    }
}

/// The column a grouped query sums over.
#[derive(Debug, Clone, Copy)]
enum GroupBy {
    Recipient,
    Giver,
    Reaction,
}

impl GroupBy {
    fn column(self) -> &'static str {
        match self {
            GroupBy::Recipient => "to_user",
            GroupBy::Giver => "from_user",
            GroupBy::Reaction => "reaction",
        }
    }

    fn statement(self, filtered: bool) -> String {
        let column = self.column();
        let filter = if filtered { " WHERE reaction = $reaction" } else { "" };

        format!("SELECT {column}, math::sum(counter) AS total FROM reactions{filter} GROUP BY {column};")
    }
}

/// SurrealDB counter store.
#[derive(Clone)]
pub struct SurrealDbClient {
    db: Surreal<Db>,
    /// Location of the store on disk; `None` for in-memory stores.
    path: Option<PathBuf>,
}

impl SurrealDbClient {
    /// Opens (or creates) the store at `path`.
    #[instrument(name = "SurrealDbClient::open", skip_all)]
    pub async fn open(path: &Path) -> Res<Self> {
        let db = Surreal::new::<SurrealKv>(path.to_string_lossy().into_owned())
            .await
            .map_err(|e| BotError::StorageUnavailable(format!("cannot open `{}`: {e}", path.display())))?;

        Self::select_database(&db).await?;

        Ok(Self { db, path: Some(path.to_path_buf()) })
    }

    /// Creates an empty in-memory store.
    pub async fn memory() -> Res<Self> {
        let db = Surreal::new::<Mem>(()).await.map_err(|e| BotError::StorageUnavailable(e.to_string()))?;

        Self::select_database(&db).await?;

        Ok(Self { db, path: None })
    }

    async fn select_database(db: &Surreal<Db>) -> Void {
        db.use_ns(NAMESPACE)
            .use_db(DATABASE)
            .await
            .map_err(|e| BotError::StorageUnavailable(e.to_string()))?;

        Ok(())
    }

    /// Fails if the backing store has disappeared from disk.
    fn ensure_available(&self) -> Void {
        if let Some(path) = &self.path
            && !path.exists()
        {
            return Err(BotError::StorageUnavailable(format!("can't find the database at `{}`", path.display())).into());
        }

        Ok(())
    }

    /// Runs one grouped-sum query.
    ///
    /// The schema marker is read in the same round trip so an uninitialized
    /// store is reported instead of an empty result.
    async fn grouped(&self, group_by: GroupBy, reaction: Option<&str>) -> Res<Vec<Aggregate>> {
        self.ensure_available()?;

        let statement = format!("{SCHEMA_VERSION}{}", group_by.statement(reaction.is_some()));
        let mut query = self.db.query(statement);

        if let Some(reaction) = reaction {
            query = query.bind(("reaction", reaction.to_string()));
        }

        let mut response = query.await.map_err(|e| BotError::StorageWriteFailure(e.to_string()))?;

        let version: Vec<i64> = response.take(0).map_err(|e| BotError::StorageWriteFailure(e.to_string()))?;
        if version.is_empty() {
            return Err(BotError::StorageUnavailable("the counter store is not initialized".into()).into());
        }

        let rows: Vec<GroupedRow> = response.take(1).map_err(|e| BotError::StorageWriteFailure(e.to_string()))?;

        Ok(rows.into_iter().map(Aggregate::from).collect())
    }
}

#[async_trait]
impl GenericDbClient for SurrealDbClient {
    #[instrument(skip(self))]
    async fn initialize(&self) -> Void {
        self.db
            .query(INITIALIZE)
            .await
            .and_then(|response| response.check())
            .map_err(|e| BotError::StorageWriteFailure(format!("cannot create the counter store: {e}")))?;

        info!("Counter store initialized.");

        Ok(())
    }

    async fn is_initialized(&self) -> Res<bool> {
        self.ensure_available()?;

        let mut response = self.db.query(SCHEMA_VERSION).await.map_err(|e| BotError::StorageWriteFailure(e.to_string()))?;
        let version: Vec<i64> = response.take(0).map_err(|e| BotError::StorageWriteFailure(e.to_string()))?;

        Ok(!version.is_empty())
    }

    #[instrument(skip(self))]
    async fn insert(&self, event: &ReactionEvent) -> Void {
        self.ensure_available()?;

        let result = self.db.query(INSERT).bind(("row", event.clone())).await.and_then(|response| response.check());

        if let Err(e) = result {
            warn!("Insert was rolled back: {}", e);
            return Err(BotError::StorageWriteFailure(e.to_string()).into());
        }

        Ok(())
    }

    async fn sum_by_recipient(&self, reaction: Option<&str>) -> Res<Vec<Aggregate>> {
        Ok(rank(self.grouped(GroupBy::Recipient, reaction).await?, None))
    }

    async fn sum_by_giver(&self, reaction: Option<&str>) -> Res<Vec<Aggregate>> {
        Ok(rank(self.grouped(GroupBy::Giver, reaction).await?, None))
    }

    async fn sum_by_reaction(&self) -> Res<Vec<Aggregate>> {
        Ok(rank(self.grouped(GroupBy::Reaction, None).await?, Some(TOP_REACTIONS_LIMIT)))
    }

    async fn top_for_reaction(&self, reaction: &str, limit: Option<usize>) -> Res<Vec<Aggregate>> {
        Ok(rank(self.grouped(GroupBy::Recipient, Some(reaction)).await?, limit))
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use crate::base::types::is_storage_unavailable;

    use super::*;

    fn subjects(rows: &[Aggregate]) -> Vec<(&str, i64)> {
        rows.iter().map(|r| (r.subject.as_str(), r.total)).collect()
    }

    #[test]
    fn statements_group_by_the_right_column() {
        assert_eq!(
            GroupBy::Recipient.statement(true),
            "SELECT to_user, math::sum(counter) AS total FROM reactions WHERE reaction = $reaction GROUP BY to_user;"
        );
        assert_eq!(GroupBy::Reaction.statement(false), "SELECT reaction, math::sum(counter) AS total FROM reactions GROUP BY reaction;");
    }

    #[tokio::test]
    async fn removal_compensates_addition() {
        let db = DbClient::surreal_memory().await.unwrap();

        db.insert(&ReactionEvent::added("A", "B", "thumbsup")).await.unwrap();
        db.insert(&ReactionEvent::added("C", "B", "thumbsup")).await.unwrap();
        db.insert(&ReactionEvent::removed("A", "B", "thumbsup")).await.unwrap();

        let rows = db.sum_by_recipient(Some("thumbsup")).await.unwrap();
        assert_eq!(subjects(&rows), [("B", 1)]);

        let givers = db.sum_by_giver(Some("thumbsup")).await.unwrap();
        let mut givers = subjects(&givers);
        givers.sort();
        assert_eq!(givers, [("A", 0), ("C", 1)]);
    }

    #[tokio::test]
    async fn empty_store_returns_empty_lists() {
        let db = DbClient::surreal_memory().await.unwrap();

        assert!(db.sum_by_recipient(None).await.unwrap().is_empty());
        assert!(db.sum_by_giver(None).await.unwrap().is_empty());
        assert!(db.sum_by_reaction().await.unwrap().is_empty());
        assert!(db.top_for_reaction("tada", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn uninitialized_store_is_not_the_same_as_empty() {
        let db = DbClient::surreal_memory_uninitialized().await.unwrap();

        assert!(!db.is_initialized().await.unwrap());

        let err = db.sum_by_reaction().await.unwrap_err();
        assert!(is_storage_unavailable(&err));

        db.initialize().await.unwrap();
        assert!(db.is_initialized().await.unwrap());
        assert!(db.sum_by_reaction().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn initialize_truncates_the_log() {
        let db = DbClient::surreal_memory().await.unwrap();
        db.insert(&ReactionEvent::added("A", "B", "tada")).await.unwrap();

        db.initialize().await.unwrap();

        assert!(db.sum_by_reaction().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reactions_are_limited_to_ten() {
        let db = DbClient::surreal_memory().await.unwrap();

        for i in 0..12 {
            for _ in 0..=i {
                db.insert(&ReactionEvent::added("A", "B", format!("emoji{i}"))).await.unwrap();
            }
        }

        let rows = db.sum_by_reaction().await.unwrap();
        assert_eq!(rows.len(), 10);
        assert_eq!(rows[0].subject, "emoji11");
        assert_eq!(rows[0].total, 12);
        assert!(rows.windows(2).all(|w| w[0].total >= w[1].total));
    }

    #[tokio::test]
    async fn top_for_reaction_limits_and_orders() {
        let db = DbClient::surreal_memory().await.unwrap();

        for (i, user) in ["U1", "U2", "U3", "U4", "U5", "U6", "U7"].iter().enumerate() {
            for _ in 0..=i {
                db.insert(&ReactionEvent::added("G", *user, "star")).await.unwrap();
            }
        }
        db.insert(&ReactionEvent::added("G", "U1", "other")).await.unwrap();

        let top = db.top_for_reaction("star", Some(5)).await.unwrap();
        assert_eq!(subjects(&top), [("U7", 7), ("U6", 6), ("U5", 5), ("U4", 4), ("U3", 3)]);

        let all = db.top_for_reaction("star", None).await.unwrap();
        assert_eq!(all.len(), 7);
        assert_eq!(all.last().unwrap().total, 1);
    }

    #[tokio::test]
    async fn file_store_is_created_on_first_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reactions.db");

        let db = DbClient::surreal(&path, false).await.unwrap();
        assert!(path.exists());
        assert!(db.is_initialized().await.unwrap());

        db.insert(&ReactionEvent::added("A", "B", "fire")).await.unwrap();
        assert_eq!(subjects(&db.sum_by_reaction().await.unwrap()), [("fire", 1)]);
    }

    #[tokio::test]
    async fn missing_file_store_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reactions.db");
        let db = DbClient::surreal(&path, false).await.unwrap();

        std::fs::remove_dir_all(&path).unwrap();

        let err = db.insert(&ReactionEvent::added("A", "B", "fire")).await.unwrap_err();
        assert!(is_storage_unavailable(&err));
    }
}
