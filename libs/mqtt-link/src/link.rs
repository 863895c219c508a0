use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use kpi_api::{BrokerEvent, BusError, EventStream, Publisher, RawMessage, Subscriber};

use crate::config::MqttConfig;
use crate::error::LinkError;
use crate::packet::{self, Connect, Packet, Publish, SUBACK_FAILURE};

const CONNACK_TIMEOUT: Duration = Duration::from_secs(10);
const READ_CHUNK: usize = 4096;

enum Command {
    Publish(Publish),
    Subscribe(String),
}

// ═══════════════════════════════════════════════════════════════
//  Handles
// ═══════════════════════════════════════════════════════════════

/// Handle запущенной задачи MQTT соединения.
///
/// Реализует [`Publisher`] и [`Subscriber`]; входящий трафик приходит в
/// [`MqttEvents`], возвращённый [`MqttLink::start`].
pub struct MqttLink {
    commands: mpsc::Sender<Command>,
    subscriptions: Arc<Mutex<Vec<String>>>,
    token: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Входящая сторона [`MqttLink`].
pub struct MqttEvents {
    rx: mpsc::Receiver<BrokerEvent>,
}

impl MqttLink {
    /// Запустить задачу соединения. Подключается в фоне и переподключается
    /// до [`shutdown`](Self::shutdown).
    pub fn start(config: MqttConfig) -> (Self, MqttEvents) {
        let (command_tx, command_rx) = mpsc::channel(config.outbound_buffer.max(1));
        let (event_tx, event_rx) = mpsc::channel(config.inbound_buffer.max(1));
        let subscriptions = Arc::new(Mutex::new(Vec::new()));
        let token = CancellationToken::new();

        let worker = LinkTask {
            config,
            commands: command_rx,
            subscriptions: subscriptions.clone(),
            events: event_tx,
            token: token.clone(),
        };
        let task = tokio::spawn(worker.run());

        let link = Self {
            commands: command_tx,
            subscriptions,
            token,
            task: Mutex::new(Some(task)),
        };
        (link, MqttEvents { rx: event_rx })
    }

    /// Отправить DISCONNECT (если подключены) и дождаться завершения задачи.
    pub async fn shutdown(&self) {
        self.token.cancel();
        let task = lock(&self.task).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "mqtt link task failed");
            }
        }
    }
}

impl Publisher for MqttLink {
    fn publish(&self, topic: &str, payload: Vec<u8>) {
        match self.commands.try_send(Command::Publish(Publish::qos0(topic, payload))) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!(%topic, "outbound queue full, dropping publish");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!(%topic, "mqtt link stopped, dropping publish");
            }
        }
    }
}

impl Subscriber for MqttLink {
    fn subscribe(&self, topic: &str)
        -> Pin<Box<dyn Future<Output = Result<(), BusError>> + Send + '_>>
    {
        let topic = topic.to_owned();
        Box::pin(async move {
            {
                let mut subscriptions = lock(&self.subscriptions);
                if !subscriptions.contains(&topic) {
                    subscriptions.push(topic.clone());
                }
            }
            self.commands
                .send(Command::Subscribe(topic))
                .await
                .map_err(|_| BusError::Closed)
        })
    }
}

impl EventStream for MqttEvents {
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Option<BrokerEvent>> + Send + '_>> {
        Box::pin(self.rx.recv())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("mqtt link lock poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Connection task
// ═══════════════════════════════════════════════════════════════

struct LinkTask {
    config: MqttConfig,
    commands: mpsc::Receiver<Command>,
    subscriptions: Arc<Mutex<Vec<String>>>,
    events: mpsc::Sender<BrokerEvent>,
    token: CancellationToken,
}

impl LinkTask {
    async fn run(mut self) {
        let addr = self.config.addr();
        loop {
            let mut connected = false;
            match self.session(&mut connected).await {
                Ok(()) => break,
                Err(e) => {
                    tracing::warn!(%addr, error = %e, "mqtt session ended");
                    if connected {
                        self.emit(BrokerEvent::Disconnected { code: 1 }).await;
                    }
                }
            }

            tokio::select! {
                _ = time::sleep(self.config.reconnect_delay) => {}
                _ = self.token.cancelled() => break,
            }
            tracing::info!(%addr, "reconnecting to broker");
        }

        // Listener may already be gone at shutdown.
        let _ = self.events.try_send(BrokerEvent::Disconnected { code: 0 });
        tracing::info!(%addr, "mqtt link stopped");
    }

    /// Одно TCP соединение. `Ok(())` означает локальную остановку.
    async fn session(&mut self, connected: &mut bool) -> Result<(), LinkError> {
        let addr = self.config.addr();
        let stream = tokio::select! {
            stream = TcpStream::connect(&addr) => stream?,
            _ = self.token.cancelled() => return Ok(()),
        };
        stream.set_nodelay(true)?;

        let (read_half, writer) = stream.into_split();
        let (packet_tx, mut packets) = mpsc::channel(self.config.inbound_buffer.max(1));
        let reader = tokio::spawn(read_packets(read_half, packet_tx));

        let mut session = Session::new(writer);
        let result = self.drive(&mut session, &mut packets, connected).await;
        reader.abort();
        result
    }

    async fn drive(
        &mut self,
        session: &mut Session,
        packets: &mut mpsc::Receiver<Result<Packet, LinkError>>,
        connected: &mut bool,
    ) -> Result<(), LinkError> {
        session.send(&Packet::Connect(self.connect_packet())).await?;

        let ack = tokio::select! {
            ack = time::timeout(CONNACK_TIMEOUT, packets.recv()) => ack,
            _ = self.token.cancelled() => return Ok(()),
        };
        let code = match ack {
            Err(_) => return Err(LinkError::Timeout("CONNACK")),
            Ok(None) => return Err(LinkError::ConnectionClosed),
            Ok(Some(Err(e))) => return Err(e),
            Ok(Some(Ok(Packet::ConnAck { code, .. }))) => code,
            Ok(Some(Ok(other))) => {
                return Err(LinkError::Malformed(format!("expected CONNACK, got {other:?}")));
            }
        };
        self.emit(BrokerEvent::Connected { code }).await;
        if code != 0 {
            return Err(LinkError::ConnectionRefused(code));
        }
        *connected = true;
        tracing::info!(addr = %self.config.addr(), client_id = %self.config.client_id, "mqtt session established");

        let topics = lock(&self.subscriptions).clone();
        session.subscribe(topics).await?;

        let mut ping = ping_interval(self.config.keep_alive);
        loop {
            tokio::select! {
                packet = packets.recv() => {
                    match packet {
                        Some(packet) => self.on_packet(session, packet?).await?,
                        None => return Err(LinkError::ConnectionClosed),
                    }
                }
                command = self.commands.recv() => {
                    match command {
                        Some(Command::Publish(publish)) => {
                            session.send(&Packet::Publish(publish)).await?;
                        }
                        Some(Command::Subscribe(topic)) => session.subscribe(vec![topic]).await?,
                        None => {
                            session.close().await;
                            return Ok(());
                        }
                    }
                }
                _ = next_ping(&mut ping) => {
                    if session.awaiting_pong {
                        return Err(LinkError::Timeout("PINGRESP"));
                    }
                    session.send(&Packet::PingReq).await?;
                    session.awaiting_pong = true;
                }
                _ = self.token.cancelled() => {
                    session.close().await;
                    return Ok(());
                }
            }
        }
    }

    async fn on_packet(&self, session: &mut Session, packet: Packet) -> Result<(), LinkError> {
        match packet {
            Packet::Publish(publish) => {
                match (publish.qos, publish.packet_id) {
                    (1, Some(packet_id)) => session.send(&Packet::PubAck { packet_id }).await?,
                    (2, _) => tracing::debug!(topic = %publish.topic, "QoS 2 delivery is not acknowledged"),
                    _ => {}
                }
                self.emit(BrokerEvent::Message(RawMessage::new(publish.topic, publish.payload)))
                    .await;
            }
            Packet::SubAck { packet_id, return_codes } => {
                let topics = session.pending.remove(&packet_id).unwrap_or_default();
                for (topic, code) in topics.into_iter().zip(return_codes) {
                    if code == SUBACK_FAILURE {
                        tracing::warn!(%topic, "broker rejected subscription");
                        session.subscribed.remove(&topic);
                    } else {
                        self.emit(BrokerEvent::Subscribed { topic }).await;
                    }
                }
            }
            Packet::PingResp => session.awaiting_pong = false,
            Packet::PubAck { packet_id } => {
                tracing::debug!(packet_id, "ignoring PUBACK for a QoS 0 link");
            }
            Packet::Disconnect => return Err(LinkError::ConnectionClosed),
            other => {
                return Err(LinkError::Malformed(format!("unexpected {other:?} from broker")));
            }
        }
        Ok(())
    }

    /// Forward to the listener; a dropped listener stops the link.
    async fn emit(&self, event: BrokerEvent) {
        if self.events.send(event).await.is_err() {
            tracing::debug!("event listener dropped, stopping mqtt link");
            self.token.cancel();
        }
    }

    fn connect_packet(&self) -> Connect {
        Connect {
            client_id: self.config.client_id.clone(),
            keep_alive: self.config.keep_alive_secs(),
            clean_session: true,
            username: self.config.username.clone(),
            password: self.config.password.clone(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Per-connection state
// ═══════════════════════════════════════════════════════════════

struct Session {
    writer: OwnedWriteHalf,
    out: BytesMut,
    subscribed: HashSet<String>,
    /// SUBSCRIBE packet id → topics awaiting SUBACK.
    pending: HashMap<u16, Vec<String>>,
    next_packet_id: u16,
    awaiting_pong: bool,
}

impl Session {
    fn new(writer: OwnedWriteHalf) -> Self {
        Self {
            writer,
            out: BytesMut::with_capacity(READ_CHUNK),
            subscribed: HashSet::new(),
            pending: HashMap::new(),
            next_packet_id: 0,
            awaiting_pong: false,
        }
    }

    async fn send(&mut self, packet: &Packet) -> Result<(), LinkError> {
        self.out.clear();
        packet::encode(packet, &mut self.out)?;
        self.writer.write_all(&self.out).await?;
        Ok(())
    }

    /// SUBSCRIBE (QoS 0) на topic'и, ещё не подписанные в этой сессии.
    async fn subscribe(&mut self, topics: Vec<String>) -> Result<(), LinkError> {
        let fresh: Vec<String> = topics
            .into_iter()
            .filter(|t| !self.subscribed.contains(t))
            .collect();
        if fresh.is_empty() {
            return Ok(());
        }

        let packet_id = self.packet_id();
        self.subscribed.extend(fresh.iter().cloned());
        let packet = Packet::Subscribe {
            packet_id,
            topics: fresh.iter().map(|t| (t.clone(), 0)).collect(),
        };
        self.pending.insert(packet_id, fresh);
        self.send(&packet).await
    }

    fn packet_id(&mut self) -> u16 {
        // Zero is not a valid packet identifier.
        self.next_packet_id = self.next_packet_id.checked_add(1).unwrap_or(1);
        self.next_packet_id
    }

    async fn close(&mut self) {
        if let Err(e) = self.send(&Packet::Disconnect).await {
            tracing::debug!(error = %e, "DISCONNECT not delivered");
        }
        let _ = self.writer.shutdown().await;
    }
}

fn ping_interval(keep_alive: Duration) -> Option<Interval> {
    if keep_alive.is_zero() {
        return None;
    }
    let mut interval = time::interval_at(Instant::now() + keep_alive, keep_alive);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(interval)
}

async fn next_ping(ping: &mut Option<Interval>) {
    match ping {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Socket → packets. Ends on EOF, read error or a malformed packet.
async fn read_packets(mut reader: OwnedReadHalf, packets: mpsc::Sender<Result<Packet, LinkError>>) {
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    loop {
        loop {
            match packet::decode(&buf) {
                Ok(Some((packet, used))) => {
                    buf.advance(used);
                    if packets.send(Ok(packet)).await.is_err() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let _ = packets.send(Err(e)).await;
                    return;
                }
            }
        }

        buf.reserve(READ_CHUNK);
        match reader.read_buf(&mut buf).await {
            Ok(0) => return,
            Ok(_) => {}
            Err(e) => {
                let _ = packets.send(Err(e.into())).await;
                return;
            }
        }
    }
}
