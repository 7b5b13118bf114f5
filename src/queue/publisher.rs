//! Order Publisher
//!
//! Publishes encoded orders to the `incoming_order` queue with persistent
//! delivery, so submitted orders survive a broker restart alongside the
//! durable queue itself.

use lapin::options::BasicPublishOptions;
use lapin::{BasicProperties, Channel, Connection};
use tracing::debug;

use super::{declare_queues, ORDER_QUEUE};
use crate::codec::{self, CodecError, OrderMessage};

const PERSISTENT_DELIVERY: u8 = 2;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("broker error: {0}")]
    Broker(#[from] lapin::Error),
}

pub struct OrderPublisher {
    channel: Channel,
}

impl OrderPublisher {
    pub async fn new(connection: &Connection) -> Result<Self, lapin::Error> {
        let channel = connection.create_channel().await?;
        declare_queues(&channel).await?;
        Ok(Self { channel })
    }

    /// Encode and publish one order to the work queue.
    pub async fn publish(&self, message: &OrderMessage) -> Result<(), PublishError> {
        let payload = codec::encode(message)?;
        self.channel
            .basic_publish(
                "",
                ORDER_QUEUE,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default().with_delivery_mode(PERSISTENT_DELIVERY),
            )
            .await?
            .await?;

        debug!(
            queue = ORDER_QUEUE,
            order_id = ?message.order_id,
            symbol = %message.security_symbol,
            "Published order"
        );
        Ok(())
    }
}
