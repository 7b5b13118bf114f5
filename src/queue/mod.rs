//! Queue Glue
//!
//! RabbitMQ plumbing shared by the engine-side consumer and the
//! submitter-side publisher. Orders travel through the durable
//! `incoming_order` queue; messages the engine gives up on are routed to
//! the durable `incoming_order.dead` companion queue via the default
//! exchange.

pub mod consumer;
pub mod publisher;

pub use consumer::{Disposition, OrderConsumer};
pub use publisher::OrderPublisher;

use lapin::options::QueueDeclareOptions;
use lapin::types::{AMQPValue, FieldTable};
use lapin::{Channel, Connection, ConnectionProperties};
use tracing::debug;

use crate::config::QueueConfig;

/// Work queue the engine consumes.
pub const ORDER_QUEUE: &str = "incoming_order";
/// Parking lot for messages the engine could not process.
pub const DEAD_LETTER_QUEUE: &str = "incoming_order.dead";

/// Open a broker connection.
pub async fn connect(config: &QueueConfig) -> Result<Connection, lapin::Error> {
    let connection =
        Connection::connect(&config.amqp_uri(), ConnectionProperties::default()).await?;
    debug!(host = %config.host, port = config.port, "Connected to order queue broker");
    Ok(connection)
}

/// Declare the work queue and its dead-letter companion.
///
/// Both the consumer and every publisher declare with identical arguments;
/// RabbitMQ rejects mismatched re-declarations, which keeps the topology
/// consistent across processes.
pub async fn declare_queues(channel: &Channel) -> Result<(), lapin::Error> {
    let durable = QueueDeclareOptions {
        durable: true,
        ..QueueDeclareOptions::default()
    };

    channel
        .queue_declare(DEAD_LETTER_QUEUE, durable, FieldTable::default())
        .await?;

    let mut arguments = FieldTable::default();
    arguments.insert(
        "x-dead-letter-exchange".into(),
        AMQPValue::LongString("".into()),
    );
    arguments.insert(
        "x-dead-letter-routing-key".into(),
        AMQPValue::LongString(DEAD_LETTER_QUEUE.into()),
    );
    channel.queue_declare(ORDER_QUEUE, durable, arguments).await?;

    Ok(())
}
