use crate::error::{AppResult, GatewayError};
use crate::models::{DatabaseConfig, QueryRequest, ResultSet};
use crate::modules::marshal::{ResultMarshaler, RowLayout};
use rusqlite::{params_from_iter, Batch, Connection, InterruptHandle, Statement};
use std::ops::Deref;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

/// Bounded pool of SQLite connections to one database file.
///
/// Connections are opened lazily up to `max_size`; the semaphore permit travels with the
/// checked-out connection so capacity frees up only once it is back in `idle`.
pub struct ConnectionPool {
    path: PathBuf,
    busy_timeout: Duration,
    max_size: usize,
    idle: Mutex<Vec<Connection>>,
    permits: Arc<Semaphore>,
    opened: AtomicUsize,
}

/// A checked-out connection. Returns to the pool on drop.
pub struct PooledConnection {
    pool: Arc<ConnectionPool>,
    conn: Option<Connection>,
    _permit: OwnedSemaphorePermit,
}

impl ConnectionPool {
    /// Open the pool and eagerly open one connection so a bad path fails at startup
    pub fn open(config: &DatabaseConfig) -> AppResult<Arc<Self>> {
        let max_size = config.pool_size.max(1);
        let pool = Arc::new(Self {
            path: config.path.clone(),
            busy_timeout: Duration::from_millis(config.busy_timeout_ms),
            max_size,
            idle: Mutex::new(Vec::with_capacity(max_size)),
            permits: Arc::new(Semaphore::new(max_size)),
            opened: AtomicUsize::new(0),
        });

        let conn = pool.connect()?;
        pool.lock_idle().push(conn);
        info!(
            "Database opened: {} (pool size {})",
            pool.path.display(),
            max_size
        );
        Ok(pool)
    }

    fn connect(&self) -> rusqlite::Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        debug!("Opened pooled connection #{}", self.opened.load(Ordering::SeqCst));
        Ok(conn)
    }

    fn lock_idle(&self) -> std::sync::MutexGuard<'_, Vec<Connection>> {
        // A panic while holding the lock cannot leave the Vec half-updated
        self.idle.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub async fn acquire(self: &Arc<Self>) -> Result<PooledConnection, GatewayError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| GatewayError::Internal(format!("Connection pool closed: {}", e)))?;

        let idle = self.lock_idle().pop();
        let conn = match idle {
            Some(conn) => conn,
            None => self
                .connect()
                .map_err(|e| GatewayError::Execution(e.to_string()))?,
        };

        Ok(PooledConnection {
            pool: Arc::clone(self),
            conn: Some(conn),
            _permit: permit,
        })
    }

    /// Connections opened over the pool's lifetime
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn idle_count(&self) -> usize {
        self.lock_idle().len()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn
            .as_ref()
            .expect("pooled connection used after release")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.lock_idle().push(conn);
        }
    }
}

/// Shared between the request future and the blocking worker
type InterruptSlot = Arc<Mutex<Option<InterruptHandle>>>;

/// Interrupts the running statement when the request future is dropped mid-query.
///
/// The worker empties the slot before it releases the connection, so an interrupt can only
/// reach the statement it was armed for, never a later user of the same connection.
struct InterruptOnDrop(InterruptSlot);

impl InterruptOnDrop {
    fn arm(handle: InterruptHandle) -> Self {
        Self(Arc::new(Mutex::new(Some(handle))))
    }

    fn slot(&self) -> InterruptSlot {
        Arc::clone(&self.0)
    }
}

fn disarm(slot: &InterruptSlot) {
    slot.lock().unwrap_or_else(|e| e.into_inner()).take();
}

impl Drop for InterruptOnDrop {
    fn drop(&mut self) {
        let mut slot = self.0.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = slot.take() {
            debug!("Query abandoned by caller, interrupting");
            handle.interrupt();
        }
    }
}

/// Executes caller-supplied SQL against the shared pool
pub struct QueryGateway {
    pool: Arc<ConnectionPool>,
    marshaler: ResultMarshaler,
    executions: AtomicU64,
}

impl QueryGateway {
    pub fn open(config: &DatabaseConfig) -> AppResult<Self> {
        let pool = ConnectionPool::open(config)?;
        Ok(Self::with_pool(pool, ResultMarshaler::new(config.blob_encoding)))
    }

    pub fn with_pool(pool: Arc<ConnectionPool>, marshaler: ResultMarshaler) -> Self {
        Self {
            pool,
            marshaler,
            executions: AtomicU64::new(0),
        }
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Statements handed to SQLite so far, successful or not
    pub fn executions(&self) -> u64 {
        self.executions.load(Ordering::SeqCst)
    }

    pub async fn execute(&self, request: QueryRequest) -> Result<ResultSet, GatewayError> {
        let conn = self.pool.acquire().await?;
        let interrupt = InterruptOnDrop::arm(conn.get_interrupt_handle());
        let slot = interrupt.slot();
        let marshaler = self.marshaler;
        self.executions.fetch_add(1, Ordering::SeqCst);

        let result = tokio::task::spawn_blocking(move || {
            let result = run_query(&conn, &marshaler, &request);
            disarm(&slot);
            drop(conn);
            result
        })
        .await
        .map_err(|e| GatewayError::Internal(format!("Query task failed: {}", e)))?;
        drop(interrupt);

        result
    }
}

/// Prepare exactly one statement from `sql`.
///
/// Whitespace and comments after the first statement are fine. Any further statement is an
/// error, raised before anything has run.
fn prepare_single<'conn>(
    conn: &'conn Connection,
    sql: &str,
) -> Result<Option<Statement<'conn>>, GatewayError> {
    let mut batch = Batch::new(conn, sql);
    let Some(stmt) = batch.next()? else {
        return Ok(None);
    };
    if batch.next()?.is_some() {
        return Err(GatewayError::Execution(
            "Only one SQL statement may be executed per query".to_string(),
        ));
    }
    Ok(Some(stmt))
}

/// Prepare, bind, step every row, then finalize. The statement and cursor are dropped
/// before the connection goes back to the pool on both exits.
fn run_query(
    conn: &Connection,
    marshaler: &ResultMarshaler,
    request: &QueryRequest,
) -> Result<ResultSet, GatewayError> {
    let Some(mut stmt) = prepare_single(conn, &request.sql)? else {
        debug!("Query text holds no statement");
        return Ok(ResultSet::new(Vec::new().into(), Vec::new()));
    };
    let columns: Vec<(String, Option<String>)> = stmt
        .columns()
        .iter()
        .map(|c| (c.name().to_string(), c.decl_type().map(str::to_string)))
        .collect();
    let layout = RowLayout::new(columns);

    let mut rows = stmt.query(params_from_iter(request.params.iter()))?;
    let mut result_rows = Vec::new();
    while let Some(row) = rows.next()? {
        result_rows.push(marshaler.marshal_row(&layout, row)?);
    }
    Ok(ResultSet::new(layout.columns(), result_rows))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::Scalar;
    use crate::modules::marshal::BlobEncoding;

    pub(crate) fn temp_db_config() -> DatabaseConfig {
        let path = std::env::temp_dir().join(format!("gateway-test-{}.db", uuid::Uuid::new_v4()));
        DatabaseConfig {
            path,
            ..DatabaseConfig::default()
        }
    }

    fn request(sql: &str, params: Vec<Scalar>) -> QueryRequest {
        QueryRequest {
            sql: sql.to_string(),
            params,
        }
    }

    async fn books_gateway() -> QueryGateway {
        let gateway = QueryGateway::open(&temp_db_config()).unwrap();
        gateway
            .execute(request(
                "CREATE TABLE books (id INTEGER PRIMARY KEY, title TEXT, author TEXT, year INTEGER, rating REAL, cover BLOB, available BOOLEAN)",
                vec![],
            ))
            .await
            .unwrap();
        gateway
    }

    #[tokio::test]
    async fn test_insert_and_select_with_params() {
        let gateway = books_gateway().await;
        let inserted = gateway
            .execute(request(
                "INSERT INTO books (title, author, year, rating, available) VALUES (?, ?, ?, ?, ?)",
                vec![
                    Scalar::Text("Dune".into()),
                    Scalar::Text("Herbert".into()),
                    Scalar::Integer(1965),
                    Scalar::Float(4.5),
                    Scalar::Boolean(true),
                ],
            ))
            .await
            .unwrap();
        assert!(inserted.is_empty());

        let result = gateway
            .execute(request(
                "SELECT id, title, year, rating, available, cover FROM books WHERE author = ?",
                vec![Scalar::Text("Herbert".into())],
            ))
            .await
            .unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(
            result.columns(),
            &["id", "title", "year", "rating", "available", "cover"]
        );
        let row = &result.rows()[0];
        assert_eq!(row.get("id"), Some(&Scalar::Integer(1)));
        assert_eq!(row.get("title"), Some(&Scalar::Text("Dune".into())));
        assert_eq!(row.get("year"), Some(&Scalar::Integer(1965)));
        assert_eq!(row.get("rating"), Some(&Scalar::Float(4.5)));
        assert_eq!(row.get("available"), Some(&Scalar::Boolean(true)));
        assert_eq!(row.get("cover"), Some(&Scalar::Null));
    }

    #[tokio::test]
    async fn test_params_bind_in_order() {
        let gateway = books_gateway().await;
        let result = gateway
            .execute(request(
                "SELECT ? AS first, ? AS second, ? AS third",
                vec![Scalar::Integer(1), Scalar::Text("b".into()), Scalar::Null],
            ))
            .await
            .unwrap();
        assert_eq!(
            result.rows()[0].values(),
            &[Scalar::Integer(1), Scalar::Text("b".into()), Scalar::Null]
        );
    }

    #[tokio::test]
    async fn test_zero_rows_is_empty_not_null() {
        let gateway = books_gateway().await;
        let result = gateway
            .execute(request("SELECT * FROM books", vec![]))
            .await
            .unwrap();
        assert!(result.is_empty());
        assert_eq!(serde_json::to_string(&result).unwrap(), "[]");
    }

    #[tokio::test]
    async fn test_every_row_has_same_keys() {
        let gateway = books_gateway().await;
        for (title, year) in [("A", Scalar::Integer(1)), ("B", Scalar::Null), ("C", Scalar::Float(2.5))] {
            gateway
                .execute(request(
                    "INSERT INTO books (title, year) VALUES (?, ?)",
                    vec![Scalar::Text(title.into()), year],
                ))
                .await
                .unwrap();
        }

        let result = gateway
            .execute(request("SELECT title, year FROM books ORDER BY id", vec![]))
            .await
            .unwrap();
        assert_eq!(result.len(), 3);
        for row in result.rows() {
            assert_eq!(row.columns(), &["title", "year"]);
        }
        assert_eq!(
            serde_json::to_string(&result).unwrap(),
            r#"[{"title":"A","year":1},{"title":"B","year":null},{"title":"C","year":2.5}]"#
        );
    }

    #[tokio::test]
    async fn test_key_order_follows_select_list() {
        let gateway = books_gateway().await;
        gateway
            .execute(request(
                "INSERT INTO books (title, author, year) VALUES ('Emma', 'Austen', 1815)",
                vec![],
            ))
            .await
            .unwrap();

        let result = gateway
            .execute(request("SELECT year, title, author FROM books", vec![]))
            .await
            .unwrap();
        assert_eq!(
            serde_json::to_string(&result).unwrap(),
            r#"[{"year":1815,"title":"Emma","author":"Austen"}]"#
        );
    }

    #[tokio::test]
    async fn test_text_round_trip() {
        let gateway = books_gateway().await;
        let text = "naïve café — 日本語 🚀\nline two";
        gateway
            .execute(request(
                "INSERT INTO books (title) VALUES (?)",
                vec![Scalar::Text(text.into())],
            ))
            .await
            .unwrap();
        let result = gateway
            .execute(request("SELECT title FROM books", vec![]))
            .await
            .unwrap();
        assert_eq!(result.rows()[0].get("title"), Some(&Scalar::Text(text.into())));
    }

    #[tokio::test]
    async fn test_binary_blob_is_reinterpreted_as_text() {
        let gateway = books_gateway().await;
        gateway
            .execute(request(
                "INSERT INTO books (cover) VALUES (X'41FF42')",
                vec![],
            ))
            .await
            .unwrap();
        let result = gateway
            .execute(request("SELECT cover FROM books", vec![]))
            .await
            .unwrap();
        assert_eq!(
            result.rows()[0].get("cover"),
            Some(&Scalar::Text("A\u{FFFD}B".into()))
        );
    }

    #[tokio::test]
    async fn test_base64_blob_mode() {
        let config = DatabaseConfig {
            blob_encoding: BlobEncoding::Base64,
            ..temp_db_config()
        };
        let gateway = QueryGateway::open(&config).unwrap();
        let result = gateway
            .execute(request("SELECT X'00FF10' AS payload", vec![]))
            .await
            .unwrap();
        assert_eq!(
            result.rows()[0].get("payload"),
            Some(&Scalar::Text("AP8Q".into()))
        );
    }

    #[tokio::test]
    async fn test_execution_errors() {
        let gateway = books_gateway().await;

        let err = gateway
            .execute(request("SELECT * FROM missing_table", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Execution(_)));
        assert!(err.to_string().contains("missing_table"));

        let err = gateway
            .execute(request("SELEC 1", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Execution(_)));

        let err = gateway
            .execute(request("SELECT ?", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Execution(_)));

        let err = gateway
            .execute(request("SELECT 1; SELECT 2", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Execution(_)));
    }

    #[tokio::test]
    async fn test_second_statement_is_rejected_before_running() {
        let gateway = books_gateway().await;
        let err = gateway
            .execute(request(
                "INSERT INTO books (title) VALUES ('a'); INSERT INTO books (title) VALUES ('b')",
                vec![],
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Execution(_)));
        assert!(err.to_string().contains("one SQL statement"));

        let count = gateway
            .execute(request("SELECT count(*) AS n FROM books", vec![]))
            .await
            .unwrap();
        assert_eq!(count.rows()[0].get("n"), Some(&Scalar::Integer(0)));
    }

    #[tokio::test]
    async fn test_trailing_semicolon_and_comment_are_allowed() {
        let gateway = books_gateway().await;
        let result = gateway
            .execute(request("SELECT 1 AS one;  -- done\n", vec![]))
            .await
            .unwrap();
        assert_eq!(result.rows()[0].get("one"), Some(&Scalar::Integer(1)));

        let result = gateway.execute(request("  ", vec![])).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_constraint_violation() {
        let gateway = books_gateway().await;
        gateway
            .execute(request("INSERT INTO books (id, title) VALUES (1, 'a')", vec![]))
            .await
            .unwrap();
        let err = gateway
            .execute(request("INSERT INTO books (id, title) VALUES (1, 'b')", vec![]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("UNIQUE"));
    }

    #[tokio::test]
    async fn test_connections_released_after_failures() {
        let mut config = temp_db_config();
        config.pool_size = 2;
        let gateway = QueryGateway::open(&config).unwrap();

        for _ in 0..10 {
            let _ = gateway
                .execute(request("SELECT * FROM nope", vec![]))
                .await;
            gateway
                .execute(request("SELECT 1", vec![]))
                .await
                .unwrap();
        }
        assert_eq!(gateway.executions(), 20);
        assert!(gateway.pool().opened() <= 2);
        assert_eq!(gateway.pool().idle_count(), gateway.pool().opened());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_queries_share_pool() {
        let mut config = temp_db_config();
        config.pool_size = 4;
        let gateway = Arc::new(QueryGateway::open(&config).unwrap());

        let mut tasks = Vec::new();
        for i in 0..16i64 {
            let gateway = gateway.clone();
            tasks.push(tokio::spawn(async move {
                gateway
                    .execute(request("SELECT ? * 2 AS doubled", vec![Scalar::Integer(i)]))
                    .await
            }));
        }
        for (i, task) in tasks.into_iter().enumerate() {
            let result = task.await.unwrap().unwrap();
            assert_eq!(
                result.rows()[0].get("doubled"),
                Some(&Scalar::Integer(i as i64 * 2))
            );
        }
        assert!(gateway.pool().opened() <= gateway.pool().max_size());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_abandoned_query_is_interrupted() {
        let gateway = QueryGateway::open(&temp_db_config()).unwrap();
        let slow = request(
            "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 200000000) SELECT count(*) AS n FROM c",
            vec![],
        );

        let outcome = tokio::time::timeout(Duration::from_millis(200), gateway.execute(slow)).await;
        assert!(outcome.is_err());

        // The interrupted worker hands its connection back promptly
        let mut returned = false;
        for _ in 0..100 {
            if gateway.pool().idle_count() == gateway.pool().opened() {
                returned = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(returned);

        let result = gateway
            .execute(request("SELECT 1 AS one", vec![]))
            .await
            .unwrap();
        assert_eq!(result.rows()[0].get("one"), Some(&Scalar::Integer(1)));
    }

    #[test]
    fn test_open_fails_for_unreachable_path() {
        let config = DatabaseConfig {
            path: std::env::temp_dir()
                .join(format!("missing-dir-{}", uuid::Uuid::new_v4()))
                .join("data.db"),
            ..DatabaseConfig::default()
        };
        assert!(QueryGateway::open(&config).is_err());
    }
}
