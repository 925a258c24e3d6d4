// MQTT transport - forwards vehicle publishes into the ingest channel
use crate::domain::event::InboundMessage;
use crate::infrastructure::config::MqttSettings;
use anyhow::Context;
use chrono::Utc;
use rumqttc::{
    AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet, Publish, QoS,
};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Subscribed,
    Receiving,
}

/// What the transport loop does with one result of `EventLoop::poll`
#[derive(Debug, PartialEq)]
enum Step {
    /// A (re)connect was acknowledged; subscriptions do not survive it
    Resubscribe,
    Forward(Publish),
    /// Connection error while still forwarding; rumqttc reconnects on the next poll
    Reconnect,
    Stop,
    Ignore,
}

impl Step {
    fn next_state(&self) -> Option<ConnectionState> {
        match self {
            Step::Resubscribe => Some(ConnectionState::Subscribed),
            Step::Forward(_) => Some(ConnectionState::Receiving),
            Step::Reconnect => Some(ConnectionState::Connecting),
            Step::Stop => Some(ConnectionState::Disconnected),
            Step::Ignore => None,
        }
    }
}

/// Publishes are dropped once forwarding stopped; a connection error then
/// ends the loop instead of reconnecting.
fn classify(polled: Result<Event, ConnectionError>, forwarding: bool) -> Step {
    match polled {
        Ok(Event::Incoming(Packet::ConnAck(_))) => Step::Resubscribe,
        Ok(Event::Incoming(Packet::Publish(publish))) if forwarding => Step::Forward(publish),
        Ok(Event::Outgoing(Outgoing::Disconnect)) => Step::Stop,
        Ok(_) => Step::Ignore,
        Err(_) if forwarding => Step::Reconnect,
        Err(_) => Step::Stop,
    }
}

/// Handle kept by the host to release the subscription once ingest drained
#[derive(Clone)]
pub struct MqttHandle {
    client: AsyncClient,
    topic: String,
}

impl MqttHandle {
    pub async fn release(&self) -> Result<(), rumqttc::ClientError> {
        self.client.unsubscribe(self.topic.as_str()).await?;
        self.client.disconnect().await
    }
}

pub struct MqttSource {
    client: AsyncClient,
    eventloop: EventLoop,
    topic: String,
    reconnect_delay: Duration,
    state: ConnectionState,
}

impl MqttSource {
    /// Connect and subscribe; fails if the broker is unreachable at startup
    pub async fn connect(settings: &MqttSettings) -> anyhow::Result<(Self, MqttHandle)> {
        let mut options = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
        options.set_keep_alive(Duration::from_secs(settings.keep_alive_secs));

        let (client, eventloop) = AsyncClient::new(options, 64);
        let mut source = Self {
            client: client.clone(),
            eventloop,
            topic: settings.topic.clone(),
            reconnect_delay: Duration::from_millis(settings.reconnect_delay_ms),
            state: ConnectionState::Disconnected,
        };

        source.transition(ConnectionState::Connecting);
        loop {
            let event = source.eventloop.poll().await.with_context(|| {
                format!(
                    "Failed to connect to MQTT broker {}:{}",
                    settings.host, settings.port
                )
            })?;
            if let Event::Incoming(Packet::ConnAck(_)) = event {
                source.subscribe()?;
                source.transition(ConnectionState::Subscribed);
                break;
            }
        }

        let handle = MqttHandle {
            client,
            topic: settings.topic.clone(),
        };
        Ok((source, handle))
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state != next {
            tracing::info!(from = ?self.state, to = ?next, "MQTT connection state changed");
            self.state = next;
        }
    }

    fn subscribe(&self) -> Result<(), rumqttc::ClientError> {
        self.client.try_subscribe(self.topic.as_str(), QoS::AtMostOnce)
    }

    /// Drive the connection. After `shutdown` fires no more messages are
    /// forwarded (dropping the sender ends the ingest loop), but the event
    /// loop keeps running until the handle disconnects.
    pub async fn run(
        mut self,
        tx: mpsc::Sender<InboundMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut tx = Some(tx);

        loop {
            tokio::select! {
                _ = shutdown.changed(), if tx.is_some() => {
                    tracing::info!("MQTT source stops forwarding");
                    tx = None;
                }
                polled = self.eventloop.poll() => {
                    if let Err(e) = &polled {
                        tracing::warn!(error = %e, "MQTT connection error");
                    }
                    let step = classify(polled, tx.is_some());
                    if step == Step::Resubscribe {
                        if let Err(e) = self.subscribe() {
                            tracing::error!(
                                error = %e,
                                topic = %self.topic,
                                "Failed to subscribe"
                            );
                            continue;
                        }
                    }
                    if let Some(next) = step.next_state() {
                        self.transition(next);
                    }

                    match step {
                        Step::Forward(publish) => {
                            let Some(sender) = &tx else {
                                continue;
                            };
                            let message = InboundMessage {
                                topic: publish.topic,
                                payload: publish.payload.to_vec(),
                                received_at: Utc::now(),
                            };
                            if sender.send(message).await.is_err() {
                                tracing::warn!("Ingest loop gone, no longer forwarding");
                                tx = None;
                            }
                        }
                        Step::Reconnect => tokio::time::sleep(self.reconnect_delay).await,
                        Step::Stop => break,
                        Step::Resubscribe | Step::Ignore => {}
                    }
                }
            }
        }
    }
}
