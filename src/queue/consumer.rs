//! Queue Consumer
//!
//! Blocking subscriber to the `incoming_order` queue. Prefetch is pinned to
//! one so exactly one message is in flight per engine process, and every
//! delivery is settled manually: acknowledged only after the handler reports
//! success, returned for redelivery on transient failure, or parked on the
//! dead-letter queue when unrecoverable.

use std::future::Future;

use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions,
};
use lapin::types::FieldTable;
use lapin::{Channel, Connection};
use tracing::{info, warn};

use super::{declare_queues, ORDER_QUEUE};

/// What to do with a delivery once the handler has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Processing committed; remove the message from the queue.
    Ack,
    /// Transient failure; return the message for redelivery.
    Requeue,
    /// Unrecoverable; route the message to the dead-letter queue.
    DeadLetter,
}

pub struct OrderConsumer {
    channel: Channel,
}

impl OrderConsumer {
    pub async fn new(connection: &Connection) -> Result<Self, lapin::Error> {
        let channel = connection.create_channel().await?;
        channel.basic_qos(1, BasicQosOptions::default()).await?;
        declare_queues(&channel).await?;
        Ok(Self { channel })
    }

    /// Consume the order queue until interrupted.
    ///
    /// The receive is cancelled cooperatively on ctrl-c: a delivery that is
    /// already being handled is settled before the loop returns, and an
    /// unsettled prefetched message is requeued by the broker when the
    /// channel closes.
    pub async fn run<F, Fut>(
        &self,
        consumer_tag: &str,
        mut handler: F,
    ) -> Result<(), lapin::Error>
    where
        F: FnMut(Vec<u8>) -> Fut,
        Fut: Future<Output = Disposition>,
    {
        let mut consumer = self
            .channel
            .basic_consume(
                ORDER_QUEUE,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;
        info!(queue = ORDER_QUEUE, consumer_tag, "Consuming order queue");

        loop {
            tokio::select! {
                delivery = consumer.next() => {
                    let Some(delivery) = delivery else {
                        warn!(queue = ORDER_QUEUE, "Order queue consumer stream closed");
                        return Ok(());
                    };
                    self.settle(delivery?, &mut handler).await?;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupt received, stopping order consumer");
                    return Ok(());
                }
            }
        }
    }

    async fn settle<F, Fut>(
        &self,
        mut delivery: Delivery,
        handler: &mut F,
    ) -> Result<(), lapin::Error>
    where
        F: FnMut(Vec<u8>) -> Fut,
        Fut: Future<Output = Disposition>,
    {
        let payload = std::mem::take(&mut delivery.data);

        match handler(payload).await {
            Disposition::Ack => delivery.ack(BasicAckOptions::default()).await,
            Disposition::Requeue => {
                delivery
                    .nack(BasicNackOptions {
                        requeue: true,
                        ..BasicNackOptions::default()
                    })
                    .await
            }
            Disposition::DeadLetter => {
                delivery
                    .nack(BasicNackOptions {
                        requeue: false,
                        ..BasicNackOptions::default()
                    })
                    .await
            }
        }
    }
}
