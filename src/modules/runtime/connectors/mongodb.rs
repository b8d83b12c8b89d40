//! MongoDB document-store connector
//!
//! `query` takes the collection as its statement and a filter object as its
//! first argument. `execute` takes one of `insert`, `update` or `delete` with
//! the collection as its first argument.

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{doc, Bson, Document};
use futures::TryStreamExt;
use mongodb::error::{Error as MongoError, ErrorKind as MongoErrorKind, WriteFailure};
use mongodb::error::UNKNOWN_TRANSACTION_COMMIT_RESULT;
use mongodb::options::{ClientOptions, Credential, FindOptions};
use mongodb::{Client, ClientSession, Collection, Database};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use unibase_core::{ConnectorConfig, ErrorKind, Result, UnibaseError};
use unibase_types::{ConnectorKind, Record, Records};

use super::slot::{ensure_open, HandleSlot};
use super::traits::{Connector, Isolation, Transaction};
use crate::cancel::with_cancel;
use crate::retry::{execute_with_retry, RetryPolicy};

const MAX_COMMIT_ATTEMPTS: u32 = 3;

/// Server error codes meaning the caller lacks rights
const UNAUTHORIZED_CODES: &[i32] = &[13, 18];

/// Duplicate key
const DUPLICATE_KEY_CODE: i32 = 11000;

#[derive(Clone)]
struct MongoHandle {
    client: Client,
    db: Database,
}

/// MongoDB connector
pub struct MongoConnector {
    config: ConnectorConfig,
    uri: String,
    retry: RetryPolicy,
    slot: HandleSlot<MongoHandle>,
}

impl MongoConnector {
    pub fn new(config: ConnectorConfig) -> Result<Self> {
        super::expect_kind(&config, ConnectorKind::Document)?;
        config.validate()?;

        Ok(Self {
            uri: connection_uri(&config)?,
            config,
            retry: RetryPolicy::default(),
            slot: HandleSlot::new(),
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    async fn open(&self) -> Result<MongoHandle> {
        let mut options = ClientOptions::parse(self.uri.as_str())
            .await
            .map_err(|e| mongo_error(e, ErrorKind::Configuration, "invalid document store address"))?;
        options.app_name = options.app_name.or_else(|| Some("unibase".to_string()));
        options.max_pool_size = Some(self.config.pool.max_open());
        options.min_pool_size = Some(self.config.pool.max_idle());
        options.max_idle_time = Some(self.config.pool.idle_timeout());
        options.connect_timeout = Some(self.config.timeout());
        options.server_selection_timeout = Some(self.config.timeout());
        options.credential = credential(&self.config);

        let client = Client::with_options(options)
            .map_err(|e| mongo_error(e, ErrorKind::Configuration, "document store client creation failed"))?;

        let db = match self.config.database.as_deref() {
            Some(name) => client.database(name),
            None => client.default_database().ok_or_else(|| {
                UnibaseError::configuration("document connector requires 'database'")
            })?,
        };

        Ok(MongoHandle { client, db })
    }
}

/// Option naming the database that holds the user's credentials
const AUTH_SOURCE_OPTION: &str = "authSource";

/// Direct `mongodb://host:port` when a port is configured, otherwise
/// `mongodb+srv://host` discovery. Options become URI query parameters.
/// Credentials never appear in the URI; see [`credential`].
fn connection_uri(config: &ConnectorConfig) -> Result<String> {
    let host = config.require_host()?;
    let address = match config.port {
        Some(port) => format!("mongodb://{}:{}", host, port),
        None => format!("mongodb+srv://{}", host),
    };

    let mut uri = format!("{}/{}", address, config.database.as_deref().unwrap_or(""));
    let params: Vec<String> = config
        .options
        .iter()
        .filter(|(k, _)| k.as_str() != AUTH_SOURCE_OPTION)
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    if !params.is_empty() {
        uri.push('?');
        uri.push_str(&params.join("&"));
    }
    Ok(uri)
}

fn credential(config: &ConnectorConfig) -> Option<Credential> {
    let username = config.username.clone()?;
    Some(
        Credential::builder()
            .username(username)
            .password(config.password.clone())
            .source(config.option(AUTH_SOURCE_OPTION).map(str::to_string))
            .build(),
    )
}

fn mongo_error(err: MongoError, fallback: ErrorKind, message: impl Into<String>) -> UnibaseError {
    let kind = match err.kind.as_ref() {
        MongoErrorKind::Authentication { .. } => ErrorKind::Permission,
        MongoErrorKind::Command(cmd) if UNAUTHORIZED_CODES.contains(&cmd.code) => {
            ErrorKind::Permission
        }
        MongoErrorKind::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => ErrorKind::Timeout,
        MongoErrorKind::Io(_)
        | MongoErrorKind::ServerSelection { .. }
        | MongoErrorKind::ConnectionPoolCleared { .. }
        | MongoErrorKind::DnsResolve { .. }
        | MongoErrorKind::Shutdown => ErrorKind::Connection,
        MongoErrorKind::InvalidArgument { .. } => ErrorKind::Query,
        MongoErrorKind::BsonDeserialization(_) | MongoErrorKind::BsonSerialization(_) => {
            ErrorKind::Query
        }
        MongoErrorKind::Write(WriteFailure::WriteError(w)) if w.code == DUPLICATE_KEY_CODE => {
            ErrorKind::Execution
        }
        MongoErrorKind::Transaction { .. } => ErrorKind::Transaction,
        _ => fallback,
    };
    UnibaseError::wrap(kind, message, err)
}

/// Convert a BSON value into plain JSON
pub(crate) fn bson_to_json(bson: Bson) -> Value {
    match bson {
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(dt) => Value::String(
            chrono::DateTime::from_timestamp_millis(dt.timestamp_millis())
                .map(|d| d.to_rfc3339())
                .unwrap_or_else(|| dt.to_string()),
        ),
        Bson::Document(doc) => Value::Object(
            doc.into_iter()
                .map(|(key, value)| (key, bson_to_json(value)))
                .collect(),
        ),
        Bson::Array(arr) => Value::Array(arr.into_iter().map(bson_to_json).collect()),
        Bson::Decimal128(d) => Value::String(d.to_string()),
        other => bson::from_bson(other).unwrap_or(Value::Null),
    }
}

fn document_to_record(doc: Document) -> Record {
    doc.into_iter()
        .map(|(key, value)| (key, bson_to_json(value)))
        .collect()
}

fn json_to_document(value: &Value, what: &str) -> Result<Document> {
    if !value.is_object() {
        return Err(UnibaseError::query(format!("{} must be a JSON object", what)));
    }
    bson::to_document(value)
        .map_err(|e| UnibaseError::wrap(ErrorKind::Query, format!("invalid {}", what), e))
}

/// Filters address `_id` by its hex form; match stored ObjectIds too
fn filter_document(value: &Value) -> Result<Document> {
    let mut filter = json_to_document(value, "filter")?;
    if let Some(Bson::String(id)) = filter.get("_id") {
        if let Ok(oid) = ObjectId::parse_str(id) {
            filter.insert("_id", oid);
        }
    }
    Ok(filter)
}

fn collection_arg<'a>(args: &'a [Value], command: &str) -> Result<&'a str> {
    match args.first() {
        Some(Value::String(name)) if !name.trim().is_empty() => Ok(name),
        _ => Err(UnibaseError::execution(format!(
            "{} requires a collection name as its first argument",
            command
        ))),
    }
}

/// A validated `find`
#[derive(Debug)]
struct FindRequest {
    collection: String,
    filter: Document,
    options: FindOptions,
}

impl FindRequest {
    fn parse(statement: &str, args: &[Value]) -> Result<Self> {
        if statement.trim().is_empty() {
            return Err(UnibaseError::query("query requires a collection name"));
        }
        let filter = match args.first() {
            Some(value) => filter_document(value)?,
            None => return Err(UnibaseError::query("query requires a filter argument")),
        };

        let mut options = FindOptions::default();
        if let Some(extra) = args.get(1).filter(|v| !v.is_null()) {
            let extra = json_to_document(extra, "find options")?;
            if let Ok(projection) = extra.get_document("projection") {
                options.projection = Some(projection.clone());
            }
            if let Ok(sort) = extra.get_document("sort") {
                options.sort = Some(sort.clone());
            }
            options.limit = integer(&extra, "limit");
            options.skip = integer(&extra, "skip").map(|n| n.max(0) as u64);
        }

        Ok(Self {
            collection: statement.to_string(),
            filter,
            options,
        })
    }
}

fn integer(doc: &Document, key: &str) -> Option<i64> {
    match doc.get(key)? {
        Bson::Int32(n) => Some(i64::from(*n)),
        Bson::Int64(n) => Some(*n),
        Bson::Double(n) => Some(*n as i64),
        _ => None,
    }
}

/// A validated mutation
#[derive(Debug)]
enum WriteRequest {
    Insert {
        collection: String,
        documents: Vec<Document>,
    },
    Update {
        collection: String,
        filter: Document,
        update: Document,
    },
    Delete {
        collection: String,
        filter: Document,
    },
}

impl WriteRequest {
    fn parse(statement: &str, args: &[Value]) -> Result<Self> {
        let command = statement.trim().to_lowercase();
        match command.as_str() {
            "insert" => {
                let collection = collection_arg(args, "insert")?.to_string();
                let documents = match args.get(1) {
                    Some(Value::Array(items)) if !items.is_empty() => items
                        .iter()
                        .map(|item| json_to_document(item, "document"))
                        .collect::<Result<Vec<_>>>()?,
                    Some(value @ Value::Object(_)) => vec![json_to_document(value, "document")?],
                    _ => {
                        return Err(UnibaseError::execution(
                            "insert requires a document or a non-empty array of documents",
                        ))
                    }
                };
                Ok(Self::Insert {
                    collection,
                    documents,
                })
            }
            "update" => {
                let collection = collection_arg(args, "update")?.to_string();
                let (Some(filter), Some(update)) = (args.get(1), args.get(2)) else {
                    return Err(UnibaseError::execution(
                        "update requires a collection, a filter and an update document",
                    ));
                };
                let update = json_to_document(update, "update")?;
                if update.is_empty() {
                    return Err(UnibaseError::execution("update document is empty"));
                }
                Ok(Self::Update {
                    collection,
                    filter: filter_document(filter)?,
                    update: wrap_update(update),
                })
            }
            "delete" => {
                let collection = collection_arg(args, "delete")?.to_string();
                let Some(filter) = args.get(1) else {
                    return Err(UnibaseError::execution(
                        "delete requires a collection and a filter",
                    ));
                };
                Ok(Self::Delete {
                    collection,
                    filter: filter_document(filter)?,
                })
            }
            other => Err(UnibaseError::unsupported(format!(
                "unsupported document command: {}",
                other
            ))),
        }
    }

    fn collection(&self) -> &str {
        match self {
            Self::Insert { collection, .. }
            | Self::Update { collection, .. }
            | Self::Delete { collection, .. } => collection,
        }
    }
}

/// Plain field maps become `$set`; operator documents pass through
fn wrap_update(update: Document) -> Document {
    if update.keys().any(|k| k.starts_with('$')) {
        update
    } else {
        doc! { "$set": update }
    }
}

async fn run_find(db: &Database, request: FindRequest) -> Result<Records> {
    let collection: Collection<Document> = db.collection(&request.collection);
    let cursor = collection
        .find(request.filter, request.options)
        .await
        .map_err(|e| mongo_error(e, ErrorKind::Query, "find failed"))?;
    let docs: Vec<Document> = cursor
        .try_collect()
        .await
        .map_err(|e| mongo_error(e, ErrorKind::Query, "reading find results failed"))?;
    Ok(docs.into_iter().map(document_to_record).collect())
}

async fn run_write(db: &Database, request: WriteRequest) -> Result<u64> {
    let collection: Collection<Document> = db.collection(request.collection());
    let affected = match request {
        WriteRequest::Insert { documents, .. } => collection
            .insert_many(documents, None)
            .await
            .map(|r| r.inserted_ids.len() as u64),
        WriteRequest::Update { filter, update, .. } => collection
            .update_many(filter, update, None)
            .await
            .map(|r| r.modified_count),
        WriteRequest::Delete { filter, .. } => collection
            .delete_many(filter, None)
            .await
            .map(|r| r.deleted_count),
    };
    affected.map_err(|e| mongo_error(e, ErrorKind::Execution, "document write failed"))
}

#[async_trait]
impl Connector for MongoConnector {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Document
    }

    async fn connect(&self, cancel: &CancellationToken) -> Result<()> {
        self.slot
            .get_or_connect(|| async {
                let handle = self.open().await?;
                execute_with_retry(
                    || async {
                        handle
                            .db
                            .run_command(doc! { "ping": 1 }, None)
                            .await
                            .map(|_| ())
                            .map_err(|e| mongo_error(e, ErrorKind::Connection, "document store ping failed"))
                    },
                    &self.retry,
                    cancel,
                )
                .await?;
                info!(database = %handle.db.name(), "document connector ready");
                Ok(handle)
            })
            .await
            .map(|_| ())
    }

    async fn close(&self) -> Result<()> {
        if let Some(handle) = self.slot.close().await {
            let MongoHandle { client, db } = handle;
            drop(db);
            // Open scopes are abandoned; their sessions fail from here on
            client.shutdown_immediate().await;
            info!("document connector closed");
        }
        Ok(())
    }

    async fn query(
        &self,
        cancel: &CancellationToken,
        statement: &str,
        args: &[Value],
    ) -> Result<Records> {
        let request = FindRequest::parse(statement, args)?;
        let handle = self.slot.get().await?;
        debug!(collection = %request.collection, "document find");
        with_cancel(cancel, run_find(&handle.db, request)).await
    }

    async fn execute(
        &self,
        cancel: &CancellationToken,
        statement: &str,
        args: &[Value],
    ) -> Result<u64> {
        let request = WriteRequest::parse(statement, args)?;
        let handle = self.slot.get().await?;
        debug!(command = statement, collection = %request.collection(), "document write");
        with_cancel(cancel, run_write(&handle.db, request)).await
    }

    async fn ping(&self, cancel: &CancellationToken) -> Result<()> {
        let handle = self.slot.get().await?;
        with_cancel(cancel, async {
            handle
                .db
                .run_command(doc! { "ping": 1 }, None)
                .await
                .map(|_| ())
                .map_err(|e| mongo_error(e, ErrorKind::Connection, "document store ping failed"))
        })
        .await
    }

    async fn begin_transaction(&self, cancel: &CancellationToken) -> Result<Box<dyn Transaction>> {
        let handle = self.slot.get().await?;
        let session = with_cancel(cancel, async {
            let mut session = handle
                .client
                .start_session(None)
                .await
                .map_err(|e| mongo_error(e, ErrorKind::Transaction, "failed to start session"))?;
            session
                .start_transaction(None)
                .await
                .map_err(|e| mongo_error(e, ErrorKind::Transaction, "failed to start transaction"))?;
            Ok(session)
        })
        .await?;

        Ok(Box::new(MongoSession {
            session,
            db: handle.db,
            aborted: false,
            parent: self.slot.close_signal(),
        }))
    }
}

/// Multi-document transaction bound to one client session.
///
/// The first failed operation aborts the server-side transaction; every
/// later call on the scope fails.
pub struct MongoSession {
    session: ClientSession,
    db: Database,
    aborted: bool,
    parent: CancellationToken,
}

impl MongoSession {
    fn ensure_usable(&self) -> Result<()> {
        ensure_open(&self.parent)?;
        if self.aborted {
            return Err(UnibaseError::transaction(
                "transaction was aborted after a failed operation",
            ));
        }
        Ok(())
    }

    async fn abort_after(&mut self, err: UnibaseError) -> UnibaseError {
        self.aborted = true;
        if let Err(abort_err) = self.session.abort_transaction().await {
            warn!(error = %abort_err, "aborting document transaction failed");
        }
        err
    }

    async fn find(&mut self, request: FindRequest) -> Result<Records> {
        let collection: Collection<Document> = self.db.collection(&request.collection);
        let mut cursor = collection
            .find_with_session(request.filter, request.options, &mut self.session)
            .await
            .map_err(|e| mongo_error(e, ErrorKind::Query, "find failed"))?;

        let mut records = Records::new();
        while let Some(doc) = cursor.next(&mut self.session).await {
            let doc = doc.map_err(|e| mongo_error(e, ErrorKind::Query, "reading find results failed"))?;
            records.push(document_to_record(doc));
        }
        Ok(records)
    }

    async fn write(&mut self, request: WriteRequest) -> Result<u64> {
        let collection: Collection<Document> = self.db.collection(request.collection());
        let session = &mut self.session;
        let affected = match request {
            WriteRequest::Insert { documents, .. } => collection
                .insert_many_with_session(documents, None, session)
                .await
                .map(|r| r.inserted_ids.len() as u64),
            WriteRequest::Update { filter, update, .. } => collection
                .update_many_with_session(filter, update, None, session)
                .await
                .map(|r| r.modified_count),
            WriteRequest::Delete { filter, .. } => collection
                .delete_many_with_session(filter, None, session)
                .await
                .map(|r| r.deleted_count),
        };
        affected.map_err(|e| mongo_error(e, ErrorKind::Execution, "document write failed"))
    }
}

#[async_trait]
impl Transaction for MongoSession {
    fn isolation(&self) -> Isolation {
        Isolation::Session
    }

    async fn query(
        &mut self,
        cancel: &CancellationToken,
        statement: &str,
        args: &[Value],
    ) -> Result<Records> {
        self.ensure_usable()?;
        let request = FindRequest::parse(statement, args)?;
        let result = with_cancel(cancel, self.find(request)).await;
        match result {
            Ok(records) => Ok(records),
            Err(err) => Err(self.abort_after(err).await),
        }
    }

    async fn execute(
        &mut self,
        cancel: &CancellationToken,
        statement: &str,
        args: &[Value],
    ) -> Result<u64> {
        self.ensure_usable()?;
        let request = WriteRequest::parse(statement, args)?;
        let result = with_cancel(cancel, self.write(request)).await;
        match result {
            Ok(affected) => Ok(affected),
            Err(err) => Err(self.abort_after(err).await),
        }
    }

    async fn commit(mut self: Box<Self>, cancel: &CancellationToken) -> Result<()> {
        self.ensure_usable()?;
        with_cancel(cancel, async move {
            let mut attempt = 1;
            loop {
                match self.session.commit_transaction().await {
                    Ok(()) => return Ok(()),
                    Err(e)
                        if e.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT)
                            && attempt < MAX_COMMIT_ATTEMPTS =>
                    {
                        debug!(attempt, "retrying document transaction commit");
                        attempt += 1;
                    }
                    Err(e) => return Err(mongo_error(e, ErrorKind::Transaction, "commit failed")),
                }
            }
        })
        .await
    }

    async fn rollback(mut self: Box<Self>, cancel: &CancellationToken) -> Result<()> {
        if self.aborted {
            return Ok(());
        }
        with_cancel(cancel, async move {
            self.session
                .abort_transaction()
                .await
                .map_err(|e| mongo_error(e, ErrorKind::Transaction, "rollback failed"))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(port: Option<u16>) -> ConnectorConfig {
        let mut config = ConnectorConfig::new(ConnectorKind::Document);
        config.host = Some("db.example.com".to_string());
        config.port = port;
        config.username = Some("app".to_string());
        config.password = Some("pw".to_string());
        config.database = Some("shop".to_string());
        config
    }

    #[test]
    fn test_connection_uri_direct_and_srv() {
        assert_eq!(
            connection_uri(&config(Some(27017))).unwrap(),
            "mongodb://db.example.com:27017/shop"
        );
        assert_eq!(
            connection_uri(
                &config(None)
                    .with_option("retryWrites", "true")
                    .with_option("authSource", "admin")
            )
            .unwrap(),
            "mongodb+srv://db.example.com/shop?retryWrites=true"
        );
    }

    #[test]
    fn test_credential_kept_out_of_uri() {
        let mut cfg = config(Some(27017)).with_option("authSource", "admin");
        cfg.password = Some("p@ss/w#rd:1".to_string());
        assert!(!connection_uri(&cfg).unwrap().contains("p@ss"));

        let cred = credential(&cfg).unwrap();
        assert_eq!(cred.username.as_deref(), Some("app"));
        assert_eq!(cred.password.as_deref(), Some("p@ss/w#rd:1"));
        assert_eq!(cred.source.as_deref(), Some("admin"));

        cfg.username = None;
        assert!(credential(&cfg).is_none());
    }

    #[test]
    fn test_find_requires_filter() {
        let err = FindRequest::parse("orders", &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Query);

        let err = FindRequest::parse("orders", &[json!("status")]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Query);
    }

    #[test]
    fn test_find_options() {
        let request = FindRequest::parse(
            "orders",
            &[
                json!({"status": "open"}),
                json!({"limit": 5, "skip": 10, "projection": {"total": 1}}),
            ],
        )
        .unwrap();
        assert_eq!(request.collection, "orders");
        assert_eq!(request.filter, doc! { "status": "open" });
        assert_eq!(request.options.limit, Some(5));
        assert_eq!(request.options.skip, Some(10));
        assert_eq!(request.options.projection, Some(doc! { "total": 1_i64 }));
    }

    #[test]
    fn test_filter_converts_object_id() {
        let hex = "65a1f0c2e4b0a1b2c3d4e5f6";
        let filter = filter_document(&json!({"_id": hex})).unwrap();
        assert_eq!(filter.get_object_id("_id").unwrap().to_hex(), hex);

        let filter = filter_document(&json!({"_id": "not-an-oid"})).unwrap();
        assert_eq!(filter.get_str("_id").unwrap(), "not-an-oid");
    }

    #[test]
    fn test_write_request_validation() {
        let insert = WriteRequest::parse("insert", &[json!("users"), json!([{"a": 1}, {"a": 2}])])
            .unwrap();
        assert!(matches!(insert, WriteRequest::Insert { ref documents, .. } if documents.len() == 2));

        let err = WriteRequest::parse("insert", &[json!("users")]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Execution);

        let err = WriteRequest::parse("update", &[json!("users"), json!({"a": 1})]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Execution);

        let err = WriteRequest::parse("delete", &[json!(42), json!({})]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Execution);

        let err = WriteRequest::parse("upsert", &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn test_update_wrapped_in_set() {
        let request = WriteRequest::parse(
            "update",
            &[json!("users"), json!({"name": "Ann"}), json!({"age": 31})],
        )
        .unwrap();
        match request {
            WriteRequest::Update { update, .. } => {
                assert_eq!(update, doc! { "$set": { "age": 31_i64 } })
            }
            other => panic!("unexpected request {:?}", other),
        }

        let operators = wrap_update(doc! { "$inc": { "visits": 1 } });
        assert_eq!(operators, doc! { "$inc": { "visits": 1 } });
    }

    #[test]
    fn test_bson_to_json() {
        let oid = ObjectId::new();
        let value = bson_to_json(Bson::Document(doc! {
            "_id": oid,
            "tags": ["a", "b"],
            "n": 3,
        }));
        assert_eq!(value["_id"], json!(oid.to_hex()));
        assert_eq!(value["tags"], json!(["a", "b"]));
        assert_eq!(value["n"], json!(3));
    }

    #[tokio::test]
    async fn test_query_before_connect() {
        let connector = MongoConnector::new(config(Some(27017))).unwrap();
        let err = connector
            .query(&CancellationToken::new(), "orders", &[json!({})])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[tokio::test]
    #[ignore] // Requires a running MongoDB replica set on localhost:27017
    async fn test_mongodb_transaction_commit_and_rollback() {
        let mut config = ConnectorConfig::new(ConnectorKind::Document);
        config.host = Some("localhost".to_string());
        config.port = Some(27017);
        config.database = Some("unibase_test".to_string());

        let connector = MongoConnector::new(config).unwrap();
        let cancel = CancellationToken::new();
        connector.connect(&cancel).await.unwrap();
        connector
            .execute(&cancel, "delete", &[json!("items"), json!({})])
            .await
            .unwrap();

        let mut tx = connector.begin_transaction(&cancel).await.unwrap();
        assert_eq!(tx.isolation(), Isolation::Session);
        tx.execute(&cancel, "insert", &[json!("items"), json!({"sku": "a"})])
            .await
            .unwrap();
        tx.rollback(&cancel).await.unwrap();
        let rows = connector.query(&cancel, "items", &[json!({})]).await.unwrap();
        assert!(rows.is_empty());

        let mut tx = connector.begin_transaction(&cancel).await.unwrap();
        tx.execute(&cancel, "insert", &[json!("items"), json!({"sku": "b"})])
            .await
            .unwrap();
        tx.commit(&cancel).await.unwrap();
        let rows = connector.query(&cancel, "items", &[json!({})]).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["sku"], json!("b"));

        let mut open_scope = connector.begin_transaction(&cancel).await.unwrap();
        open_scope
            .execute(&cancel, "insert", &[json!("items"), json!({"sku": "c"})])
            .await
            .unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(5), connector.close())
            .await
            .expect("close must not wait for the open scope")
            .unwrap();
        let err = open_scope
            .execute(&cancel, "insert", &[json!("items"), json!({"sku": "d"})])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }
}
