//! ==============================================================================
//! connection.rs - broker session lifecycle
//! ==============================================================================
//!
//! purpose:
//!     owns the MQTT session: connect, subscribe, reconnect, teardown.
//!     state machine: Disconnected -> Connecting -> Connected ->
//!     (Reconnecting | Disconnected).
//!
//!     subscriptions are re-issued on every ConnAck because the broker is
//!     not assumed to keep them across a reconnect. every Publish packet is
//!     funneled into the hub no matter which state transition is in flight.
//!
//! relationships:
//!     - uses: hub.rs (message funnel), config.rs (broker settings)
//!     - used by: main.rs (start/stop), server.rs (state for /api/status)
//!
//! ==============================================================================

use crate::config::{MqttConfig, TopicsConfig};
use crate::hub::WaterHub;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// connectivity as surfaced to the presentation layer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// random-suffixed client id so parallel instances never collide
fn client_id(prefix: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}", prefix, &suffix[..8])
}

pub struct ConnectionManager {
    client: AsyncClient,
    state: Arc<RwLock<ConnectionState>>,
    running: Arc<AtomicBool>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// connect to the broker and start the event-loop task. the task retries
    /// indefinitely on transport errors; it only ends on `stop()`.
    pub fn start(mqtt: &MqttConfig, topics: &TopicsConfig, hub: Arc<WaterHub>) -> Self {
        let mut options = MqttOptions::new(client_id(&mqtt.client_id_prefix), &mqtt.host, mqtt.port);
        options.set_keep_alive(Duration::from_secs(mqtt.keep_alive_secs));
        if let (Some(user), Some(pass)) = (&mqtt.username, &mqtt.password) {
            options.set_credentials(user, pass);
        }

        let (client, mut eventloop) = AsyncClient::new(options, 100);
        let state = Arc::new(RwLock::new(ConnectionState::Connecting));
        let running = Arc::new(AtomicBool::new(true));

        let primary_pattern = hub.router().primary_pattern();
        let diagnostic_wildcard = topics.diagnostic_wildcard;
        let task_client = client.clone();
        let task_state = state.clone();
        let task_running = running.clone();

        let poll_task = tokio::spawn(async move {
            loop {
                if !task_running.load(Ordering::Relaxed) {
                    break;
                }
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        *task_state.write().await = ConnectionState::Connected;
                        info!("connected to broker, subscribing to {}", primary_pattern);
                        if let Err(e) = task_client
                            .subscribe(&primary_pattern, QoS::AtMostOnce)
                            .await
                        {
                            warn!("failed to subscribe to {}: {}", primary_pattern, e);
                        }
                        if diagnostic_wildcard {
                            if let Err(e) = task_client.subscribe("#", QoS::AtMostOnce).await {
                                warn!("failed to subscribe to diagnostic wildcard: {}", e);
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        hub.handle_message(&publish.topic, &publish.payload).await;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        if !task_running.load(Ordering::Relaxed) {
                            break;
                        }
                        let mut state = task_state.write().await;
                        if *state == ConnectionState::Connected {
                            *state = ConnectionState::Reconnecting;
                        }
                        drop(state);
                        warn!("broker connection error, retrying: {}", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
            *task_state.write().await = ConnectionState::Disconnected;
        });

        Self {
            client,
            state,
            running,
            poll_task: Mutex::new(Some(poll_task)),
        }
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// unconditional teardown: end the poll task and release the session
    pub async fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
        if let Err(e) = self.client.disconnect().await {
            warn!("broker disconnect failed: {}", e);
        }
        if let Some(task) = self.poll_task.lock().await.take() {
            // the poll loop exits on the next event or error; don't wait
            // longer than a keep-alive turnaround for it
            if tokio::time::timeout(Duration::from_secs(2), task).await.is_err() {
                warn!("poll task did not end in time");
            }
        }
        *self.state.write().await = ConnectionState::Disconnected;
    }
}
