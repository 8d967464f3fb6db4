use async_trait::async_trait;
use bson::{doc, Bson, Document};
use futures::TryStreamExt;
use mongodb::options::{
    ClientOptions, FindOneOptions, FindOptions, ReadConcern, ReadPreference, SelectionCriteria, ServerApi,
    ServerApiVersion, WriteConcern,
};
use mongodb::{Client, ClientSession, Collection, Database, IndexModel};

use crate::index::IndexSpec;
use crate::models::Restaurant;
use crate::query::{QueryOptions, ScanType};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("MongoDB error: {0}")]
    MongoDB(#[from] mongodb::error::Error),

    #[error("Failed to decode document: {0}")]
    Decode(#[from] bson::de::Error),

    #[error("Insert worker failed: {0}")]
    Worker(String),

    #[error("Index DDL cannot run while a transaction is open on the collection")]
    TransactionOpen,
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Read path used by the HTTP layer
#[async_trait]
pub trait RestaurantRepository: Send + Sync {
    /// At most one record matching `filter`
    async fn find_one(&self, filter: Document, options: &QueryOptions)
        -> Result<Option<Restaurant>>;

    /// Every record matching `filter`, bounded by `options.limit`
    async fn find_many(&self, filter: Document, options: &QueryOptions) -> Result<Vec<Restaurant>>;

    /// Run an aggregation pipeline (managed search queries)
    async fn aggregate(
        &self,
        pipeline: Vec<Document>,
        options: &QueryOptions,
    ) -> Result<Vec<Restaurant>>;
}

/// Write path used by the collection preparer
///
/// Everything except index DDL runs against an open transaction.
#[async_trait]
pub trait InstallTarget: Send + Sync + 'static {
    type Transaction: Send + 'static;

    async fn begin(&self) -> Result<Self::Transaction>;
    async fn count(&self, txn: &mut Self::Transaction) -> Result<u64>;
    async fn clear(&self, txn: &mut Self::Transaction) -> Result<u64>;
    async fn insert_many(&self, txn: &mut Self::Transaction, records: &[Restaurant])
        -> Result<u64>;
    /// Drop every index, then create `indexes`; `false` if any step failed
    async fn rebuild_indexes(&self, indexes: &[IndexSpec]) -> Result<bool>;
    async fn commit(&self, txn: Self::Transaction) -> Result<()>;
    async fn abort(&self, txn: Self::Transaction) -> Result<()>;
}

/// Thin façade over the MongoDB driver for one collection
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    database: Database,
    collection: Collection<Restaurant>,
}

impl MongoStore {
    /// Connect, select database and collection, and ping the deployment
    pub async fn connect(uri: &str, database: &str, collection: &str) -> Result<Self> {
        let mut options = ClientOptions::parse(uri).await?;
        options.server_api = Some(ServerApi::builder().version(ServerApiVersion::V1).build());
        options.app_name = Some("menuscan".to_string());

        let client = Client::with_options(options)?;
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await?;
        tracing::info!(database, collection, "Successfully connected to MongoDB");

        Ok(Self::with_client(client, database, collection))
    }

    /// Wrap an existing client
    pub fn with_client(client: Client, database: &str, collection: &str) -> Self {
        let database = client.database(database);
        let collection = database.collection(collection);
        Self {
            client,
            database,
            collection,
        }
    }

    pub fn collection_name(&self) -> &str {
        self.collection.name()
    }

    /// Number of documents currently in the collection
    pub async fn count_documents(&self) -> Result<u64> {
        Ok(self.collection.count_documents(doc! {}).await?)
    }

    /// Execution plan of a find with `filter`, honoring the scan type's hint
    pub async fn explain_find(&self, filter: &Document, scan_type: &ScanType) -> Result<Document> {
        let mut find = doc! { "find": self.collection_name(), "filter": filter.clone() };
        if let Some(hint) = scan_type.hint_bson() {
            find.insert("hint", hint);
        }
        let command = doc! {
            "explain": find,
            "verbosity": "allPlansExecution",
        };
        self.run_on_primary(command).await
    }

    /// Execution plan of an aggregation
    pub async fn explain_aggregate(&self, pipeline: &[Document]) -> Result<Document> {
        let command = doc! {
            "explain": {
                "aggregate": self.collection_name(),
                "pipeline": pipeline.to_vec(),
                "cursor": {},
            },
            "verbosity": "queryPlanner",
        };
        self.run_on_primary(command).await
    }

    async fn run_on_primary(&self, command: Document) -> Result<Document> {
        Ok(self
            .database
            .run_command(command)
            .selection_criteria(SelectionCriteria::ReadPreference(ReadPreference::Primary))
            .await?)
    }

    /// Log the plan; a failed explain never fails the query it describes
    fn log_plan(&self, plan: Result<Document>) {
        match plan {
            Ok(plan) => {
                let json = Bson::Document(plan).into_relaxed_extjson();
                let pretty = serde_json::to_string_pretty(&json).unwrap_or_default();
                tracing::info!(collection = %self.collection_name(), "Execution plan:\n{}", pretty);
            }
            Err(e) => tracing::warn!("Failed to explain query: {}", e),
        }
    }

    /// Every index except the mandatory `_id_`
    async fn secondary_indexes(&self) -> Result<Vec<IndexModel>> {
        let cursor = self.collection.list_indexes().await?;
        let models: Vec<IndexModel> = cursor.try_collect().await?;
        Ok(models
            .into_iter()
            .filter(|m| {
                m.options.as_ref().and_then(|o| o.name.as_deref()) != Some("_id_")
            })
            .collect())
    }

    async fn restore_indexes(&self, previous: Vec<IndexModel>) {
        // Clear whatever part of the new set was built
        if let Err(e) = self.collection.drop_indexes().await {
            tracing::warn!("Failed to drop partial index set: {}", e);
        }
        if previous.is_empty() {
            return;
        }
        match self.collection.create_indexes(previous).await {
            Ok(result) => tracing::info!(indexes = ?result.index_names, "Previous indexes restored"),
            Err(e) => tracing::error!("Failed to restore previous indexes: {}", e),
        }
    }

    pub async fn shutdown(self) {
        self.client.shutdown().await;
    }
}

#[async_trait]
impl RestaurantRepository for MongoStore {
    async fn find_one(
        &self,
        filter: Document,
        options: &QueryOptions,
    ) -> Result<Option<Restaurant>> {
        if options.explain {
            self.log_plan(self.explain_find(&filter, &options.scan_type).await);
        }

        let find_options = FindOneOptions::builder()
            .hint(options.scan_type.hint())
            .build();
        let found = self
            .collection
            .find_one(filter)
            .with_options(find_options)
            .await?;
        if found.is_none() {
            tracing::debug!(collection = %self.collection_name(), "No document matched the query");
        }
        Ok(found)
    }

    async fn find_many(&self, filter: Document, options: &QueryOptions) -> Result<Vec<Restaurant>> {
        if options.explain {
            self.log_plan(self.explain_find(&filter, &options.scan_type).await);
        }

        let find_options = FindOptions::builder()
            .limit(options.limit)
            .hint(options.scan_type.hint())
            .build();
        let cursor = self
            .collection
            .find(filter)
            .with_options(find_options)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn aggregate(
        &self,
        pipeline: Vec<Document>,
        options: &QueryOptions,
    ) -> Result<Vec<Restaurant>> {
        if options.explain {
            self.log_plan(self.explain_aggregate(&pipeline).await);
        }

        let cursor = self.collection.aggregate(pipeline).await?;
        let documents: Vec<Document> = cursor.try_collect().await?;
        documents
            .into_iter()
            .map(|d| bson::from_document(d).map_err(StoreError::from))
            .collect()
    }
}

#[async_trait]
impl InstallTarget for MongoStore {
    type Transaction = ClientSession;

    async fn begin(&self) -> Result<ClientSession> {
        let mut session = self.client.start_session().await?;
        session
            .start_transaction()
            .read_concern(ReadConcern::majority())
            .write_concern(WriteConcern::majority())
            .await?;
        Ok(session)
    }

    async fn count(&self, txn: &mut ClientSession) -> Result<u64> {
        Ok(self
            .collection
            .count_documents(doc! {})
            .session(&mut *txn)
            .await?)
    }

    async fn clear(&self, txn: &mut ClientSession) -> Result<u64> {
        let result = self
            .collection
            .delete_many(doc! {})
            .session(&mut *txn)
            .await?;
        Ok(result.deleted_count)
    }

    async fn insert_many(&self, txn: &mut ClientSession, records: &[Restaurant]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }
        let result = self
            .collection
            .insert_many(records)
            .session(&mut *txn)
            .await?;
        Ok(result.inserted_ids.len() as u64)
    }

    async fn rebuild_indexes(&self, indexes: &[IndexSpec]) -> Result<bool> {
        let previous = self.secondary_indexes().await?;

        if let Err(e) = self.collection.drop_indexes().await {
            tracing::warn!("Failed to drop indexes: {}", e);
            return Ok(false);
        }

        let models: Vec<_> = indexes.iter().map(IndexSpec::to_model).collect();
        match self.collection.create_indexes(models).await {
            Ok(result) => {
                tracing::info!(indexes = ?result.index_names, "Indexes created");
                Ok(true)
            }
            Err(e) => {
                tracing::warn!("Failed to create indexes: {}", e);
                self.restore_indexes(previous).await;
                Ok(false)
            }
        }
    }

    async fn commit(&self, mut txn: ClientSession) -> Result<()> {
        txn.commit_transaction().await?;
        Ok(())
    }

    async fn abort(&self, mut txn: ClientSession) -> Result<()> {
        txn.abort_transaction().await?;
        Ok(())
    }
}
