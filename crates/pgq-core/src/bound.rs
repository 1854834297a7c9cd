//! Bound client
//!
//! A client pinned to one open transaction. Every method runs on that same
//! transaction, so several operations can be composed into one atomic unit.
//! Nothing becomes visible to other observers until [`BoundClient::commit`].

use std::sync::Arc;

use futures::future::BoxFuture;
use pgq_engine::Transaction;
use pgq_types::{Delay, Message, MessageId, QueueInfo, QueueMetrics, Result, Value};
use serde::Serialize;

use crate::config::ClientConfig;
use crate::ops;

/// Queue client bound to one open transaction
pub struct BoundClient {
    tx: Box<dyn Transaction>,
    config: Arc<ClientConfig>,
}

impl BoundClient {
    /// Wrap an already open transaction
    pub fn new(tx: Box<dyn Transaction>, config: Arc<ClientConfig>) -> Self {
        Self { tx, config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Commit every operation issued through this client
    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await
    }

    /// Discard every operation issued through this client
    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await
    }

    /// Run `f` inside the transaction this client is already bound to.
    ///
    /// No new transaction is opened: the block commits or rolls back with the
    /// enclosing scope. A failure is returned as is; when it escapes the
    /// enclosing block, the enclosing scope rolls back.
    pub async fn transaction<T, E, F>(&mut self, f: F) -> std::result::Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut BoundClient) -> BoxFuture<'c, std::result::Result<T, E>>,
    {
        f(self).await
    }

    // ==================== Message Operations ====================

    /// Enqueue one message
    pub async fn send(
        &mut self,
        queue: &str,
        payload: Value,
        delay: Option<Delay>,
    ) -> Result<MessageId> {
        ops::send(self.tx.as_mut(), queue, payload, delay).await
    }

    /// Serialize `payload` and enqueue it
    pub async fn send_json<T: Serialize>(
        &mut self,
        queue: &str,
        payload: &T,
        delay: Option<Delay>,
    ) -> Result<MessageId> {
        let payload = serde_json::to_value(payload)?;
        self.send(queue, payload, delay).await
    }

    /// Enqueue several messages in one round trip
    pub async fn send_batch(
        &mut self,
        queue: &str,
        payloads: Vec<Value>,
        delay: Option<Delay>,
    ) -> Result<Vec<MessageId>> {
        ops::send_batch(self.tx.as_mut(), queue, payloads, delay).await
    }

    /// Serialize each payload and enqueue them in one round trip
    pub async fn send_batch_json<T: Serialize>(
        &mut self,
        queue: &str,
        payloads: &[T],
        delay: Option<Delay>,
    ) -> Result<Vec<MessageId>> {
        let payloads = payloads
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        self.send_batch(queue, payloads, delay).await
    }

    pub async fn read(
        &mut self,
        queue: &str,
        vt: i32,
        limit: i32,
        filter: Option<Value>,
    ) -> Result<Vec<Message>> {
        ops::read(self.tx.as_mut(), queue, vt, limit, filter).await
    }

    /// Read with the configured visibility window and limit
    pub async fn read_default(&mut self, queue: &str) -> Result<Vec<Message>> {
        let (vt, limit) = (self.config.visibility_timeout_secs, self.config.read_limit);
        self.read(queue, vt, limit, None).await
    }

    pub async fn read_with_poll(
        &mut self,
        queue: &str,
        vt: i32,
        limit: i32,
        max_poll_seconds: i32,
        poll_interval_ms: i32,
        filter: Option<Value>,
    ) -> Result<Vec<Message>> {
        ops::read_with_poll(
            self.tx.as_mut(),
            queue,
            vt,
            limit,
            max_poll_seconds,
            poll_interval_ms,
            filter,
        )
        .await
    }

    /// Polling read with every parameter taken from the configuration
    pub async fn read_with_poll_default(&mut self, queue: &str) -> Result<Vec<Message>> {
        let config = Arc::clone(&self.config);
        self.read_with_poll(
            queue,
            config.visibility_timeout_secs,
            config.read_limit,
            config.poll_max_wait_secs,
            config.poll_interval_ms,
            None,
        )
        .await
    }

    pub async fn pop(&mut self, queue: &str) -> Result<Vec<Message>> {
        ops::pop(self.tx.as_mut(), queue).await
    }

    pub async fn delete_message(&mut self, queue: &str, msg_id: MessageId) -> Result<bool> {
        ops::delete_message(self.tx.as_mut(), queue, msg_id).await
    }

    pub async fn delete_batch(
        &mut self,
        queue: &str,
        msg_ids: Vec<MessageId>,
    ) -> Result<Vec<MessageId>> {
        ops::delete_batch(self.tx.as_mut(), queue, msg_ids).await
    }

    pub async fn purge_queue(&mut self, queue: &str) -> Result<i64> {
        ops::purge_queue(self.tx.as_mut(), queue).await
    }

    pub async fn archive(&mut self, queue: &str, msg_id: MessageId) -> Result<bool> {
        ops::archive(self.tx.as_mut(), queue, msg_id).await
    }

    pub async fn archive_batch(
        &mut self,
        queue: &str,
        msg_ids: Vec<MessageId>,
    ) -> Result<Vec<MessageId>> {
        ops::archive_batch(self.tx.as_mut(), queue, msg_ids).await
    }

    pub async fn set_visibility(
        &mut self,
        queue: &str,
        msg_id: MessageId,
        vt_offset: i32,
    ) -> Result<Message> {
        ops::set_visibility(self.tx.as_mut(), queue, msg_id, vt_offset).await
    }

    // ==================== Queue Operations ====================

    pub async fn create_queue(&mut self, queue: &str) -> Result<()> {
        ops::create_queue(self.tx.as_mut(), queue).await
    }

    /// Create a partitioned queue with the configured intervals
    pub async fn create_partitioned_queue(&mut self, queue: &str) -> Result<()> {
        let config = Arc::clone(&self.config);
        self.create_partitioned_queue_with(
            queue,
            &config.partition_interval,
            &config.retention_interval,
        )
        .await
    }

    pub async fn create_partitioned_queue_with(
        &mut self,
        queue: &str,
        partition_interval: &str,
        retention_interval: &str,
    ) -> Result<()> {
        ops::create_partitioned_queue(
            self.tx.as_mut(),
            queue,
            partition_interval,
            retention_interval,
        )
        .await
    }

    pub async fn create_unlogged_queue(&mut self, queue: &str) -> Result<()> {
        ops::create_unlogged_queue(self.tx.as_mut(), queue).await
    }

    pub async fn drop_queue(&mut self, queue: &str) -> Result<bool> {
        ops::drop_queue(self.tx.as_mut(), queue).await
    }

    pub async fn detach_archive(&mut self, queue: &str) -> Result<()> {
        ops::detach_archive(self.tx.as_mut(), queue).await
    }

    pub async fn list_queues(&mut self) -> Result<Vec<QueueInfo>> {
        ops::list_queues(self.tx.as_mut()).await
    }

    pub async fn metrics(&mut self, queue: &str) -> Result<QueueMetrics> {
        ops::metrics(self.tx.as_mut(), queue).await
    }

    pub async fn metrics_all(&mut self) -> Result<Vec<QueueMetrics>> {
        ops::metrics_all(self.tx.as_mut()).await
    }
}
