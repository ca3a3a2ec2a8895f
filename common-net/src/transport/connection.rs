use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use super::{ChannelStatus, ConnectionSettings, TransportError, TransportErrorKind, TransportKind};
use crate::message::{BroadcastMessage, ChannelConfig, ClientFrame, ReplyStatus, ServerFrame};

type StatusSender = Arc<watch::Sender<ChannelStatus>>;

struct Route {
    join_ref: u64,
    status: StatusSender,
    inbound: mpsc::UnboundedSender<BroadcastMessage>,
}

#[derive(Clone, Default)]
struct Routes(Arc<Mutex<HashMap<String, Route>>>);

impl Routes {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Route>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove_if_current(&self, topic: &str, join_ref: u64) {
        let mut routes = self.lock();
        if routes.get(topic).is_some_and(|route| route.join_ref == join_ref) {
            routes.remove(topic);
        }
    }
}

/// Moves `status` from `from` to `to`, reporting whether it did.
fn transition(status: &watch::Sender<ChannelStatus>, from: &[ChannelStatus], to: ChannelStatus) -> bool {
    status.send_if_modified(|current| {
        if from.contains(current) {
            *current = to;
            true
        } else {
            false
        }
    })
}

/// One logical connection to the relay.
pub struct Connection {
    kind: TransportKind,
    outbound: mpsc::UnboundedSender<ClientFrame>,
    routes: Routes,
    refs: Arc<AtomicU64>,
    settings: ConnectionSettings,
    heartbeat: Option<JoinHandle<()>>,
}

impl Connection {
    /// Wires a connection over an outbound/inbound frame pipe. Must be called
    /// inside a tokio runtime.
    pub fn from_pipes(
        kind: TransportKind,
        outbound: mpsc::UnboundedSender<ClientFrame>,
        inbound: mpsc::UnboundedReceiver<ServerFrame>,
        settings: ConnectionSettings,
    ) -> Self {
        let routes = Routes::default();
        let refs = Arc::new(AtomicU64::new(1));

        tokio::spawn(dispatch(kind, inbound, routes.clone()));

        let heartbeat = settings.heartbeat_interval.map(|period| {
            tokio::spawn(heartbeat(outbound.clone(), refs.clone(), period))
        });

        Self {
            kind,
            outbound,
            routes,
            refs,
            settings,
            heartbeat,
        }
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Creates an unsubscribed channel. One live subscription per topic per
    /// connection; a second subscribe on the same topic replaces the route.
    pub fn channel(&self, topic: impl Into<String>, config: ChannelConfig) -> Channel {
        let (status_tx, status_rx) = watch::channel(ChannelStatus::Idle);
        Channel {
            topic: topic.into(),
            config,
            outbound: self.outbound.clone(),
            routes: self.routes.clone(),
            refs: self.refs.clone(),
            join_timeout: self.settings.join_timeout,
            status_tx: Arc::new(status_tx),
            status_rx,
            inbound: None,
            join_ref: None,
            timeout_task: None,
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(task) = self.heartbeat.take() {
            task.abort();
        }
    }
}

async fn heartbeat(outbound: mpsc::UnboundedSender<ClientFrame>, refs: Arc<AtomicU64>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    // first tick fires immediately
    interval.tick().await;
    loop {
        interval.tick().await;
        let reference = refs.fetch_add(1, Ordering::Relaxed);
        if outbound.send(ClientFrame::Heartbeat { reference }).is_err() {
            break;
        }
    }
}

async fn dispatch(kind: TransportKind, mut inbound: mpsc::UnboundedReceiver<ServerFrame>, routes: Routes) {
    while let Some(frame) = inbound.recv().await {
        match frame {
            ServerFrame::JoinReply {
                topic,
                reference,
                status,
                reason,
            } => {
                let routes = routes.lock();
                let Some(route) = routes.get(&topic).filter(|route| route.join_ref == reference) else {
                    debug!(%topic, reference, "transport: join reply for unknown subscription");
                    continue;
                };
                match status {
                    ReplyStatus::Ok => {
                        if transition(&route.status, &[ChannelStatus::Joining], ChannelStatus::Joined) {
                            info!(%topic, "transport: channel joined");
                        }
                    }
                    ReplyStatus::Error => {
                        if transition(&route.status, &[ChannelStatus::Joining], ChannelStatus::ChannelError) {
                            warn!(%topic, reason = reason.as_deref().unwrap_or("unknown"), "transport: channel join rejected");
                        }
                    }
                }
            }
            ServerFrame::Broadcast {
                topic,
                event,
                payload,
            } => {
                let routes = routes.lock();
                match routes.get(&topic) {
                    Some(route) => {
                        let _ = route.inbound.send(BroadcastMessage { event, payload });
                    }
                    None => debug!(%topic, %event, "transport: broadcast for unsubscribed topic"),
                }
            }
            ServerFrame::Ack { topic, reference } => {
                debug!(%topic, reference, "transport: broadcast acknowledged");
            }
            ServerFrame::HeartbeatReply { .. } => {}
            ServerFrame::Error { topic, reason } => {
                warn!(topic = topic.as_deref().unwrap_or("-"), %reason, "transport: relay reported error");
            }
        }
    }

    warn!(?kind, "transport: connection closed");
    // dropping the routes closes every channel's inbound queue
    for (topic, route) in routes.lock().drain() {
        if transition(
            &route.status,
            &[ChannelStatus::Joining, ChannelStatus::Joined],
            ChannelStatus::ChannelError,
        ) {
            warn!(%topic, "transport: channel lost with connection");
        }
    }
}

/// A topic subscription on a [`Connection`].
pub struct Channel {
    topic: String,
    config: ChannelConfig,
    outbound: mpsc::UnboundedSender<ClientFrame>,
    routes: Routes,
    refs: Arc<AtomicU64>,
    join_timeout: Duration,
    status_tx: StatusSender,
    status_rx: watch::Receiver<ChannelStatus>,
    inbound: Option<mpsc::UnboundedReceiver<BroadcastMessage>>,
    join_ref: Option<u64>,
    timeout_task: Option<JoinHandle<()>>,
}

impl Channel {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn status(&self) -> ChannelStatus {
        *self.status_rx.borrow()
    }

    pub fn status_watch(&self) -> watch::Receiver<ChannelStatus> {
        self.status_rx.clone()
    }

    /// Sends the join and arms the join timeout. Joining an already joining
    /// or joined channel is a no-op.
    pub fn subscribe(&mut self) -> Result<(), TransportError> {
        if matches!(self.status(), ChannelStatus::Joining | ChannelStatus::Joined) {
            return Ok(());
        }
        self.release();

        let join_ref = self.refs.fetch_add(1, Ordering::Relaxed);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        self.routes.lock().insert(
            self.topic.clone(),
            Route {
                join_ref,
                status: self.status_tx.clone(),
                inbound: inbound_tx,
            },
        );
        self.status_tx.send_replace(ChannelStatus::Joining);
        self.inbound = Some(inbound_rx);
        self.join_ref = Some(join_ref);

        let join = ClientFrame::Join {
            topic: self.topic.clone(),
            config: self.config.clone(),
            reference: join_ref,
        };
        if self.outbound.send(join).is_err() {
            self.routes.remove_if_current(&self.topic, join_ref);
            self.status_tx.send_replace(ChannelStatus::ChannelError);
            return Err(TransportError::new(
                TransportErrorKind::ConnectionClosed,
                "connection closed before join",
            ));
        }

        self.timeout_task = Some(tokio::spawn(join_timeout(
            self.topic.clone(),
            join_ref,
            self.join_timeout,
            self.status_tx.clone(),
            self.routes.clone(),
            self.outbound.clone(),
        )));
        debug!(topic = %self.topic, join_ref, "transport: join sent");
        Ok(())
    }

    /// Resolves once the pending join (if any) has an outcome.
    pub async fn wait_until_settled(&self) -> ChannelStatus {
        let mut rx = self.status_rx.clone();
        loop {
            let status = *rx.borrow_and_update();
            if status.is_settled() {
                return status;
            }
            if rx.changed().await.is_err() {
                return *rx.borrow();
            }
        }
    }

    /// Queues a broadcast; returns the ack reference when acks are enabled.
    pub fn send_broadcast(
        &self,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<Option<u64>, TransportError> {
        if !self.status().is_joined() {
            return Err(TransportError::new(
                TransportErrorKind::NotJoined,
                format!("channel {} is not joined", self.topic),
            ));
        }

        let reference = self
            .config
            .broadcast
            .ack
            .then(|| self.refs.fetch_add(1, Ordering::Relaxed));
        self.outbound
            .send(ClientFrame::Broadcast {
                topic: self.topic.clone(),
                event: event.to_string(),
                payload,
                reference,
            })
            .map_err(|_| {
                TransportError::new(TransportErrorKind::ConnectionClosed, "connection closed")
            })?;
        Ok(reference)
    }

    /// Next inbound broadcast, `None` once unsubscribed or disconnected.
    pub async fn recv(&mut self) -> Option<BroadcastMessage> {
        match self.inbound.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    pub fn unsubscribe(&mut self) {
        if self.release() {
            debug!(topic = %self.topic, "transport: channel left");
        }
        self.status_tx.send_replace(ChannelStatus::Closed);
    }

    fn release(&mut self) -> bool {
        if let Some(task) = self.timeout_task.take() {
            task.abort();
        }
        self.inbound = None;
        let Some(join_ref) = self.join_ref.take() else {
            return false;
        };
        self.routes.remove_if_current(&self.topic, join_ref);
        let _ = self.outbound.send(ClientFrame::Leave {
            topic: self.topic.clone(),
            reference: join_ref,
        });
        true
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.release();
    }
}

async fn join_timeout(
    topic: String,
    join_ref: u64,
    after: Duration,
    status: StatusSender,
    routes: Routes,
    outbound: mpsc::UnboundedSender<ClientFrame>,
) {
    tokio::time::sleep(after).await;
    if transition(&status, &[ChannelStatus::Joining], ChannelStatus::TimedOut) {
        warn!(%topic, timeout_ms = after.as_millis() as u64, "transport: channel join timed out");
        routes.remove_if_current(&topic, join_ref);
        let _ = outbound.send(ClientFrame::Leave {
            topic,
            reference: join_ref,
        });
    }
}
