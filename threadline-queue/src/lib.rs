//! AMQP plumbing for the hashtag job and result queues.
//!
//! One [`QueueConnection`] per process holds a single channel in publisher
//! confirm mode. Publishers encode JSON bodies with `text/plain` content type
//! (what downstream consumers already expect); consumers hand out
//! [`QueueDelivery`] values that are settled explicitly with a
//! [`Disposition`]. Reconnecting is the caller's job (see the worker's
//! supervisor loop).
use futures::StreamExt;
use lapin::acker::Acker;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    BasicRejectOptions, ConfirmSelectOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer};
use serde::Serialize;
use threadline_common::{Result, ThreadlineError};

pub const CONTENT_TYPE: &str = "text/plain";

fn transport(context: &str, err: lapin::Error) -> ThreadlineError {
    ThreadlineError::Transport(format!("{context}: {err}"))
}

pub struct QueueConnection {
    connection: Connection,
    channel: Channel,
}

impl QueueConnection {
    pub async fn connect(uri: &str) -> Result<Self> {
        let connection = Connection::connect(uri, ConnectionProperties::default())
            .await
            .map_err(|e| transport("failed to connect to broker", e))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| transport("failed to create channel", e))?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| transport("failed to enable publisher confirms", e))?;

        tracing::info!(channel_id = channel.id(), "queue.connected");
        Ok(Self {
            connection,
            channel,
        })
    }

    /// Declare a non-durable queue (the job/result queues are not persisted).
    pub async fn declare(&self, queue: &str) -> Result<()> {
        self.channel
            .queue_declare(queue, QueueDeclareOptions::default(), FieldTable::default())
            .await
            .map_err(|e| transport(&format!("failed to declare queue {queue}"), e))?;
        tracing::debug!(queue, "queue.declared");
        Ok(())
    }

    pub fn publisher(&self, queue: &str) -> QueuePublisher {
        QueuePublisher {
            channel: self.channel.clone(),
            queue: queue.to_string(),
        }
    }

    /// Start consuming with manual acks and the given prefetch window.
    pub async fn consumer(&self, queue: &str, tag: &str, prefetch: u16) -> Result<QueueConsumer> {
        self.channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await
            .map_err(|e| transport("failed to set prefetch", e))?;

        let inner = self
            .channel
            .basic_consume(
                queue,
                tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| transport(&format!("failed to consume {queue}"), e))?;

        tracing::info!(queue, tag, prefetch, "queue.consuming");
        Ok(QueueConsumer { inner })
    }

    pub async fn close(self) -> Result<()> {
        self.channel
            .close(200, "bye")
            .await
            .map_err(|e| transport("failed to close channel", e))?;
        self.connection
            .close(200, "bye")
            .await
            .map_err(|e| transport("failed to close connection", e))
    }
}

/// Serialize a message body for the wire.
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(message).map_err(|e| ThreadlineError::Decode(e.to_string()))
}

pub fn message_properties() -> BasicProperties {
    BasicProperties::default().with_content_type(CONTENT_TYPE.into())
}

#[derive(Clone)]
pub struct QueuePublisher {
    channel: Channel,
    queue: String,
}

impl QueuePublisher {
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Publish to the default exchange and wait for the broker's confirm.
    pub async fn publish_json<T: Serialize>(&self, message: &T) -> Result<()> {
        let payload = encode(message)?;

        let confirm = self
            .channel
            .basic_publish(
                "",
                &self.queue,
                BasicPublishOptions::default(),
                &payload,
                message_properties(),
            )
            .await
            .map_err(|e| transport("failed to publish message", e))?
            .await
            .map_err(|e| transport("failed to confirm message", e))?;

        if confirm.is_nack() {
            return Err(ThreadlineError::Transport(format!(
                "broker refused message on {}",
                self.queue
            )));
        }

        tracing::debug!(queue = %self.queue, bytes = payload.len(), "queue.published");
        Ok(())
    }
}

pub struct QueueConsumer {
    inner: Consumer,
}

impl QueueConsumer {
    /// Next delivery; `None` once the broker cancels the consumer or the
    /// channel closes.
    pub async fn next(&mut self) -> Option<Result<QueueDelivery>> {
        let item = self.inner.next().await?;
        Some(
            item.map(|d| QueueDelivery {
                delivery_tag: d.delivery_tag,
                redelivered: d.redelivered,
                payload: d.data,
                acker: d.acker,
            })
            .map_err(|e| transport("consumer stream failed", e)),
        )
    }
}

/// How a consumed message leaves the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Processed; remove it.
    Ack,
    /// Unprocessable; drop it without redelivery.
    Reject,
    /// Not processed this time; hand it back to the broker.
    Requeue,
}

pub struct QueueDelivery {
    pub delivery_tag: u64,
    pub redelivered: bool,
    pub payload: Vec<u8>,
    acker: Acker,
}

impl QueueDelivery {
    pub async fn settle(&self, disposition: Disposition) -> Result<()> {
        let res = match disposition {
            Disposition::Ack => self.acker.ack(BasicAckOptions::default()).await,
            Disposition::Reject => {
                self.acker
                    .reject(BasicRejectOptions { requeue: false })
                    .await
            }
            Disposition::Requeue => {
                self.acker
                    .nack(BasicNackOptions {
                        multiple: false,
                        requeue: true,
                    })
                    .await
            }
        };
        res.map_err(|e| transport("failed to settle delivery", e))?;
        tracing::trace!(delivery_tag = self.delivery_tag, ?disposition, "queue.settled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Job<'a> {
        #[serde(rename = "_id")]
        id: &'a str,
        keyword: &'a str,
    }

    #[test]
    fn bodies_are_plain_json() {
        let body = encode(&Job {
            id: "h1",
            keyword: "golang",
        })
        .unwrap();
        assert_eq!(body, br#"{"_id":"h1","keyword":"golang"}"#);
    }

    #[test]
    fn properties_carry_text_plain() {
        let props = message_properties();
        assert_eq!(
            props.content_type().as_ref().map(|s| s.as_str()),
            Some(CONTENT_TYPE)
        );
    }
}
