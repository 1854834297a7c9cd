//! Client - Convenience queue client
//!
//! Every method runs in its own transaction scope. Use
//! [`Client::transaction`] or [`Client::begin`] when several operations must
//! commit or roll back together.

use std::sync::Arc;

use futures::future::BoxFuture;
use pgq_engine::Engine;
use pgq_types::{Delay, Error, Message, MessageId, QueueInfo, QueueMetrics, Result, Value};
use serde::Serialize;
use tracing::info;

use crate::bound::BoundClient;
use crate::config::ClientConfig;
use crate::scope;

/// Queue client that opens one transaction per call
#[derive(Clone)]
pub struct Client {
    /// Engine backend
    engine: Arc<dyn Engine>,
    config: Arc<ClientConfig>,
}

impl Client {
    /// Create a new client on the given engine with default configuration
    pub fn new(engine: impl Engine + 'static) -> Self {
        Self::with_engine(Arc::new(engine))
    }

    /// Create a new client with an Arc engine
    pub fn with_engine(engine: Arc<dyn Engine>) -> Self {
        info!("Initializing pgq client");
        Self {
            engine,
            config: Arc::new(ClientConfig::default()),
        }
    }

    /// Replace the configuration after validating it
    pub fn with_config(mut self, config: ClientConfig) -> Result<Self> {
        config.validate()?;
        self.config = Arc::new(config);
        Ok(self)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Get a reference to the engine
    pub fn engine(&self) -> &dyn Engine {
        self.engine.as_ref()
    }

    /// Open a transaction and return a client bound to it.
    ///
    /// The caller must `commit` it; dropping it discards its operations.
    pub async fn begin(&self) -> Result<BoundClient> {
        scope::begin(self.engine.as_ref(), Arc::clone(&self.config)).await
    }

    /// Run `f` atomically: commit when it returns `Ok`, roll back otherwise.
    ///
    /// ```ignore
    /// let ids = client
    ///     .transaction(|tx| Box::pin(async move {
    ///         let a = tx.send("orders", json!({"id": 1}), None).await?;
    ///         let b = tx.send("audit", json!({"order": 1}), None).await?;
    ///         Ok::<_, pgq_types::Error>((a, b))
    ///     }))
    ///     .await?;
    /// ```
    pub async fn transaction<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut BoundClient) -> BoxFuture<'c, std::result::Result<T, E>>,
        E: From<Error>,
    {
        scope::run(self.engine.as_ref(), Arc::clone(&self.config), f).await
    }

    // ==================== Message Operations ====================

    /// Enqueue one message
    pub async fn send(
        &self,
        queue: &str,
        payload: Value,
        delay: Option<Delay>,
    ) -> Result<MessageId> {
        let mut tx = self.begin().await?;
        let outcome = tx.send(queue, payload, delay).await;
        scope::settle(tx, outcome).await
    }

    /// Serialize `payload` and enqueue it
    pub async fn send_json<T: Serialize>(
        &self,
        queue: &str,
        payload: &T,
        delay: Option<Delay>,
    ) -> Result<MessageId> {
        let mut tx = self.begin().await?;
        let outcome = tx.send_json(queue, payload, delay).await;
        scope::settle(tx, outcome).await
    }

    /// Enqueue several messages in one round trip
    pub async fn send_batch(
        &self,
        queue: &str,
        payloads: Vec<Value>,
        delay: Option<Delay>,
    ) -> Result<Vec<MessageId>> {
        let mut tx = self.begin().await?;
        let outcome = tx.send_batch(queue, payloads, delay).await;
        scope::settle(tx, outcome).await
    }

    pub async fn send_batch_json<T: Serialize>(
        &self,
        queue: &str,
        payloads: &[T],
        delay: Option<Delay>,
    ) -> Result<Vec<MessageId>> {
        let mut tx = self.begin().await?;
        let outcome = tx.send_batch_json(queue, payloads, delay).await;
        scope::settle(tx, outcome).await
    }

    /// Read up to `limit` visible messages, hiding them for `vt` seconds
    pub async fn read(
        &self,
        queue: &str,
        vt: i32,
        limit: i32,
        filter: Option<Value>,
    ) -> Result<Vec<Message>> {
        let mut tx = self.begin().await?;
        let outcome = tx.read(queue, vt, limit, filter).await;
        scope::settle(tx, outcome).await
    }

    pub async fn read_default(&self, queue: &str) -> Result<Vec<Message>> {
        let mut tx = self.begin().await?;
        let outcome = tx.read_default(queue).await;
        scope::settle(tx, outcome).await
    }

    /// Read, waiting up to `max_poll_seconds` for a message to appear.
    ///
    /// Holds a transaction (and its connection) for the whole wait.
    pub async fn read_with_poll(
        &self,
        queue: &str,
        vt: i32,
        limit: i32,
        max_poll_seconds: i32,
        poll_interval_ms: i32,
        filter: Option<Value>,
    ) -> Result<Vec<Message>> {
        let mut tx = self.begin().await?;
        let outcome = tx
            .read_with_poll(queue, vt, limit, max_poll_seconds, poll_interval_ms, filter)
            .await;
        scope::settle(tx, outcome).await
    }

    pub async fn read_with_poll_default(&self, queue: &str) -> Result<Vec<Message>> {
        let mut tx = self.begin().await?;
        let outcome = tx.read_with_poll_default(queue).await;
        scope::settle(tx, outcome).await
    }

    /// Read and delete the oldest visible message
    pub async fn pop(&self, queue: &str) -> Result<Vec<Message>> {
        let mut tx = self.begin().await?;
        let outcome = tx.pop(queue).await;
        scope::settle(tx, outcome).await
    }

    pub async fn delete_message(&self, queue: &str, msg_id: MessageId) -> Result<bool> {
        let mut tx = self.begin().await?;
        let outcome = tx.delete_message(queue, msg_id).await;
        scope::settle(tx, outcome).await
    }

    pub async fn delete_batch(
        &self,
        queue: &str,
        msg_ids: Vec<MessageId>,
    ) -> Result<Vec<MessageId>> {
        let mut tx = self.begin().await?;
        let outcome = tx.delete_batch(queue, msg_ids).await;
        scope::settle(tx, outcome).await
    }

    pub async fn purge_queue(&self, queue: &str) -> Result<i64> {
        let mut tx = self.begin().await?;
        let outcome = tx.purge_queue(queue).await;
        scope::settle(tx, outcome).await
    }

    pub async fn archive(&self, queue: &str, msg_id: MessageId) -> Result<bool> {
        let mut tx = self.begin().await?;
        let outcome = tx.archive(queue, msg_id).await;
        scope::settle(tx, outcome).await
    }

    pub async fn archive_batch(
        &self,
        queue: &str,
        msg_ids: Vec<MessageId>,
    ) -> Result<Vec<MessageId>> {
        let mut tx = self.begin().await?;
        let outcome = tx.archive_batch(queue, msg_ids).await;
        scope::settle(tx, outcome).await
    }

    pub async fn set_visibility(
        &self,
        queue: &str,
        msg_id: MessageId,
        vt_offset: i32,
    ) -> Result<Message> {
        let mut tx = self.begin().await?;
        let outcome = tx.set_visibility(queue, msg_id, vt_offset).await;
        scope::settle(tx, outcome).await
    }

    // ==================== Queue Operations ====================

    pub async fn create_queue(&self, queue: &str) -> Result<()> {
        let mut tx = self.begin().await?;
        let outcome = tx.create_queue(queue).await;
        scope::settle(tx, outcome).await
    }

    pub async fn create_partitioned_queue(&self, queue: &str) -> Result<()> {
        let mut tx = self.begin().await?;
        let outcome = tx.create_partitioned_queue(queue).await;
        scope::settle(tx, outcome).await
    }

    pub async fn create_partitioned_queue_with(
        &self,
        queue: &str,
        partition_interval: &str,
        retention_interval: &str,
    ) -> Result<()> {
        let mut tx = self.begin().await?;
        let outcome = tx
            .create_partitioned_queue_with(queue, partition_interval, retention_interval)
            .await;
        scope::settle(tx, outcome).await
    }

    pub async fn create_unlogged_queue(&self, queue: &str) -> Result<()> {
        let mut tx = self.begin().await?;
        let outcome = tx.create_unlogged_queue(queue).await;
        scope::settle(tx, outcome).await
    }

    pub async fn drop_queue(&self, queue: &str) -> Result<bool> {
        let mut tx = self.begin().await?;
        let outcome = tx.drop_queue(queue).await;
        scope::settle(tx, outcome).await
    }

    pub async fn detach_archive(&self, queue: &str) -> Result<()> {
        let mut tx = self.begin().await?;
        let outcome = tx.detach_archive(queue).await;
        scope::settle(tx, outcome).await
    }

    pub async fn list_queues(&self) -> Result<Vec<QueueInfo>> {
        let mut tx = self.begin().await?;
        let outcome = tx.list_queues().await;
        scope::settle(tx, outcome).await
    }

    pub async fn metrics(&self, queue: &str) -> Result<QueueMetrics> {
        let mut tx = self.begin().await?;
        let outcome = tx.metrics(queue).await;
        scope::settle(tx, outcome).await
    }

    pub async fn metrics_all(&self) -> Result<Vec<QueueMetrics>> {
        let mut tx = self.begin().await?;
        let outcome = tx.metrics_all().await;
        scope::settle(tx, outcome).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgq_engine::{Clock, ManualClock, MemoryEngine};
    use serde_json::json;
    use std::time::Duration;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "pgq_core=debug,pgq_engine=debug".into()),
            )
            .with_test_writer()
            .try_init();
    }

    fn create_test_client() -> Client {
        init_tracing();
        Client::new(MemoryEngine::new())
    }

    #[tokio::test]
    async fn test_send_read_delete_drop_lifecycle() {
        let client = create_test_client();
        client.create_queue("q1").await.unwrap();

        let m1 = client.send("q1", json!({"a": 1}), None).await.unwrap();

        let read = client.read("q1", 30, 1, None).await.unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].msg_id, m1);
        assert_eq!(read[0].message, json!({"a": 1}));
        assert_eq!(read[0].read_ct, 1);

        assert!(client.delete_message("q1", m1).await.unwrap());
        assert!(client.read("q1", 30, 1, None).await.unwrap().is_empty());
        assert!(client.drop_queue("q1").await.unwrap());
        assert!(!client.drop_queue("q1").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_twice() {
        let client = create_test_client();
        client.create_queue("jobs").await.unwrap();
        let id = client.send("jobs", json!({}), None).await.unwrap();

        assert!(client.delete_message("jobs", id).await.unwrap());
        assert!(!client.delete_message("jobs", id).await.unwrap());
    }

    #[tokio::test]
    async fn test_batch_ids_ascend_and_total_survives_removal() {
        let client = create_test_client();
        client.create_queue("q2").await.unwrap();

        let ids = client
            .send_batch("q2", vec![json!({"n": 1}), json!({"n": 2}), json!({"n": 3})], None)
            .await
            .unwrap();
        assert_eq!(ids.len(), 3);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));

        let deleted = client.delete_batch("q2", ids[..2].to_vec()).await.unwrap();
        assert_eq!(deleted, ids[..2].to_vec());
        let archived = client.archive_batch("q2", vec![ids[2], 999]).await.unwrap();
        assert_eq!(archived, vec![ids[2]]);

        let metrics = client.metrics("q2").await.unwrap();
        assert!(metrics.total_messages >= 3);
        assert_eq!(metrics.queue_length, 0);
        assert_eq!(metrics.newest_msg_age_sec, None);
    }

    #[tokio::test]
    async fn test_empty_batches_are_not_errors() {
        let client = create_test_client();
        client.create_queue("jobs").await.unwrap();

        assert!(client.send_batch("jobs", vec![], None).await.unwrap().is_empty());
        assert!(client.delete_batch("jobs", vec![]).await.unwrap().is_empty());
        assert!(client.archive_batch("jobs", vec![]).await.unwrap().is_empty());
        assert_eq!(client.metrics("jobs").await.unwrap().total_messages, 0);
    }

    #[tokio::test]
    async fn test_failure_kinds_are_distinguished() {
        let client = create_test_client();

        let err = client.send("nowhere", json!({}), None).await.unwrap_err();
        assert!(err.is_engine());

        let err = client.metrics("nowhere").await.unwrap_err();
        assert!(err.is_protocol());
    }

    #[tokio::test]
    async fn test_idempotent_create_by_ignoring_duplicate() {
        let client = create_test_client();
        client.create_queue("jobs").await.unwrap();

        let err = client.create_queue("jobs").await.unwrap_err();
        assert!(err.is_duplicate_queue());

        match client.create_queue("jobs").await {
            Err(e) if e.is_duplicate_queue() => {}
            other => panic!("expected duplicate queue, got {other:?}"),
        }
        assert_eq!(client.list_queues().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_visibility_deadline_round_trip() {
        init_tracing();
        let clock = Arc::new(ManualClock::starting_now());
        let client = Client::new(MemoryEngine::with_clock(clock.clone()));
        client.create_queue("jobs").await.unwrap();
        client.send("jobs", json!({"job": "resize"}), None).await.unwrap();

        assert_eq!(client.read("jobs", 10, 1, None).await.unwrap().len(), 1);
        assert!(client.read("jobs", 10, 1, None).await.unwrap().is_empty());

        clock.advance(chrono::Duration::seconds(10));
        let again = client.read("jobs", 10, 1, None).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].read_ct, 2);
    }

    #[tokio::test]
    async fn test_delayed_send() {
        init_tracing();
        let clock = Arc::new(ManualClock::starting_now());
        let client = Client::new(MemoryEngine::with_clock(clock.clone()));
        client.create_queue("jobs").await.unwrap();

        client.send("jobs", json!({"later": 1}), Some(Delay::Seconds(60))).await.unwrap();
        let at = clock.now() + chrono::Duration::seconds(120);
        client.send("jobs", json!({"later": 2}), Some(Delay::At(at))).await.unwrap();
        assert!(client.read("jobs", 30, 10, None).await.unwrap().is_empty());

        clock.advance(chrono::Duration::seconds(60));
        let ready = client.read("jobs", 30, 10, None).await.unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].message, json!({"later": 1}));
    }

    #[tokio::test]
    async fn test_read_filter_requires_equal_nested_values() {
        let client = create_test_client();
        client.create_queue("jobs").await.unwrap();
        client.send("jobs", json!({"tags": ["a", "b"]}), None).await.unwrap();

        let none = client
            .read("jobs", 30, 10, Some(json!({"tags": "b"})))
            .await
            .unwrap();
        assert!(none.is_empty());

        let some = client
            .read("jobs", 30, 10, Some(json!({"tags": ["b"]})))
            .await
            .unwrap();
        assert_eq!(some.len(), 1);
    }

    #[tokio::test]
    async fn test_set_visibility() {
        let client = create_test_client();
        client.create_queue("jobs").await.unwrap();
        let id = client.send("jobs", json!({}), None).await.unwrap();
        client.read("jobs", 300, 1, None).await.unwrap();

        let message = client.set_visibility("jobs", id, -1).await.unwrap();
        assert_eq!(message.msg_id, id);
        assert_eq!(client.read("jobs", 30, 1, None).await.unwrap().len(), 1);

        let err = client.set_visibility("jobs", 404, 10).await.unwrap_err();
        assert!(err.is_protocol());
    }

    #[tokio::test]
    async fn test_pop_removes_message() {
        let client = create_test_client();
        client.create_queue("jobs").await.unwrap();
        assert!(client.pop("jobs").await.unwrap().is_empty());

        let id = client.send("jobs", json!({"x": 1}), None).await.unwrap();
        let popped = client.pop("jobs").await.unwrap();
        assert_eq!(popped.len(), 1);
        assert_eq!(popped[0].msg_id, id);
        assert!(!client.delete_message("jobs", id).await.unwrap());
    }

    #[tokio::test]
    async fn test_archive_and_purge() {
        let engine = MemoryEngine::new();
        let client = Client::new(engine.clone());
        client.create_queue("jobs").await.unwrap();
        let id = client.send("jobs", json!({"keep": true}), None).await.unwrap();
        client.send("jobs", json!({}), None).await.unwrap();
        client.send("jobs", json!({}), None).await.unwrap();

        assert!(client.archive("jobs", id).await.unwrap());
        assert!(!client.archive("jobs", id).await.unwrap());
        assert_eq!(engine.archived("jobs")[0].message, json!({"keep": true}));

        assert_eq!(client.purge_queue("jobs").await.unwrap(), 2);
        assert_eq!(client.purge_queue("jobs").await.unwrap(), 0);

        client.detach_archive("jobs").await.unwrap();
        assert!(engine.is_archive_detached("jobs"));
    }

    #[tokio::test]
    async fn test_queue_modes_in_listing() {
        let client = create_test_client();
        client.create_queue("plain").await.unwrap();
        client.create_unlogged_queue("fast").await.unwrap();
        client
            .create_partitioned_queue_with("parted", "10000", "100000")
            .await
            .unwrap();

        let queues = client.list_queues().await.unwrap();
        let flags: Vec<(&str, bool, bool)> = queues
            .iter()
            .map(|q| (q.queue_name.as_str(), q.is_partitioned, q.is_unlogged))
            .collect();
        assert_eq!(
            flags,
            vec![
                ("fast", false, true),
                ("parted", true, false),
                ("plain", false, false)
            ]
        );
        assert_eq!(client.metrics_all().await.unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_on_empty_queue_waits_full_budget() {
        let client = create_test_client();
        client.create_queue("idle").await.unwrap();

        let started = tokio::time::Instant::now();
        let messages = client
            .read_with_poll("idle", 30, 1, 1, 100, None)
            .await
            .unwrap();
        let waited = started.elapsed();

        assert!(messages.is_empty());
        assert!(waited >= Duration::from_secs(1));
        assert!(waited < Duration::from_millis(1200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_returns_once_message_arrives() {
        let client = create_test_client();
        client.create_queue("jobs").await.unwrap();

        let producer = client.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            producer.send("jobs", json!({"ready": true}), None).await.unwrap();
        });

        let started = tokio::time::Instant::now();
        let messages = client
            .read_with_poll("jobs", 30, 5, 10, 100, None)
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_transaction_is_atomic_across_queues() {
        let client = create_test_client();
        client.create_queue("orders").await.unwrap();
        client.create_queue("audit").await.unwrap();

        let result: std::result::Result<(), Error> = client
            .transaction(|tx| {
                Box::pin(async move {
                    tx.send("orders", json!({"id": 1}), None).await?;
                    tx.send("audit", json!({"order": 1}), None).await?;
                    tx.send("missing", json!({}), None).await?;
                    Ok(())
                })
            })
            .await;
        assert!(result.unwrap_err().is_undefined_queue());
        assert!(client.read("orders", 0, 10, None).await.unwrap().is_empty());
        assert!(client.read("audit", 0, 10, None).await.unwrap().is_empty());

        client
            .transaction(|tx| {
                Box::pin(async move {
                    tx.send("orders", json!({"id": 2}), None).await?;
                    tx.send("audit", json!({"order": 2}), None).await?;
                    Ok::<_, Error>(())
                })
            })
            .await
            .unwrap();
        assert_eq!(client.read("orders", 0, 10, None).await.unwrap().len(), 1);
        assert_eq!(client.read("audit", 0, 10, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_nested_transaction_reuses_outer_scope() {
        let client = create_test_client();
        client.create_queue("jobs").await.unwrap();

        // Inner success is rolled back with the outer scope
        let result: std::result::Result<(), Error> = client
            .transaction(|outer| {
                Box::pin(async move {
                    outer
                        .transaction(|inner| {
                            Box::pin(async move {
                                inner.send("jobs", json!({"step": "inner"}), None).await?;
                                Ok::<_, Error>(())
                            })
                        })
                        .await?;
                    Err(Error::Config("abort outer".to_string()))
                })
            })
            .await;
        assert!(result.is_err());
        assert!(client.read("jobs", 0, 10, None).await.unwrap().is_empty());

        // Inner and outer commit together
        client
            .transaction(|outer| {
                Box::pin(async move {
                    outer.send("jobs", json!({"step": "outer"}), None).await?;
                    outer
                        .transaction(|inner| {
                            Box::pin(async move {
                                inner.send("jobs", json!({"step": "inner"}), None).await
                            })
                        })
                        .await?;
                    Ok::<_, Error>(())
                })
            })
            .await
            .unwrap();
        assert_eq!(client.read("jobs", 0, 10, None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_inner_failure_caught_by_outer_scope() {
        let client = create_test_client();
        client.create_queue("jobs").await.unwrap();

        // A caller error leaves the shared transaction usable; inner effects commit
        client
            .transaction(|outer| {
                Box::pin(async move {
                    let inner = outer
                        .transaction(|inner| {
                            Box::pin(async move {
                                inner.send("jobs", json!({"step": "inner"}), None).await?;
                                Err::<(), _>(Error::Config("inner gave up".to_string()))
                            })
                        })
                        .await;
                    assert!(matches!(inner, Err(Error::Config(_))));
                    Ok::<_, Error>(())
                })
            })
            .await
            .unwrap();
        assert_eq!(client.read("jobs", 0, 10, None).await.unwrap().len(), 1);

        // An engine error aborts the shared transaction; the outer commit fails
        let err = client
            .transaction(|outer| {
                Box::pin(async move {
                    outer.send("jobs", json!({"step": "outer"}), None).await?;
                    let inner = outer
                        .transaction(|inner| {
                            Box::pin(async move {
                                inner.send("missing", json!({}), None).await
                            })
                        })
                        .await;
                    assert!(inner.unwrap_err().is_undefined_queue());
                    Ok::<_, Error>(())
                })
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(pgq_types::error::IN_FAILED_TRANSACTION));
        assert_eq!(client.read("jobs", 0, 10, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_explicit_begin_and_drop_discards() {
        let client = create_test_client();
        client.create_queue("jobs").await.unwrap();

        {
            let mut tx = client.begin().await.unwrap();
            tx.send("jobs", json!({}), None).await.unwrap();
        }
        assert!(client.read("jobs", 0, 10, None).await.unwrap().is_empty());

        let mut tx = client.begin().await.unwrap();
        tx.send("jobs", json!({}), None).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(client.read("jobs", 0, 10, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_with_config_validates() {
        let client = create_test_client();
        let bad = ClientConfig {
            read_limit: 0,
            ..Default::default()
        };
        assert!(matches!(client.clone().with_config(bad), Err(Error::Config(_))));

        let good = ClientConfig {
            read_limit: 3,
            ..Default::default()
        };
        let client = client.with_config(good).unwrap();
        assert_eq!(client.config().read_limit, 3);
    }
}
