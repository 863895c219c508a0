//! In-process брокер.
//!
//! Именованные topic'и, у каждого список bounded mpsc подписчиков.
//! Реализует трейты `kpi-api`, чтобы worker работал без сетевого брокера
//! (replay из файла, тесты).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::mpsc;

use kpi_api::{BrokerEvent, BusError, EventStream, Publisher, RawMessage, Subscriber};

// ═══════════════════════════════════════════════════════════════
//  MessageBus
// ═══════════════════════════════════════════════════════════════

/// Имя topic'а → sender'ы подписчиков.
///
/// `publish` никогда не ждёт: при полном канале сообщение отбрасывается с
/// warning, закрытый канал удаляется. [`MessageBus::send`] ждёт места в
/// канале и не теряет сообщения.
pub struct MessageBus {
    topics: RwLock<HashMap<String, Vec<mpsc::Sender<BrokerEvent>>>>,
    buffer: usize,
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("topics", &self.topic_names())
            .field("buffer", &self.buffer)
            .finish()
    }
}

impl MessageBus {
    /// `buffer`: ёмкость канала каждой сессии этой шины.
    pub fn new(buffer: usize) -> Arc<Self> {
        Arc::new(Self {
            topics: RwLock::new(HashMap::new()),
            buffer: buffer.max(1),
        })
    }

    /// Открыть сессию: [`BusSession`] для подписки и [`BusStream`], в
    /// который приходят её сообщения.
    ///
    /// Поток начинается с `Connected { code: 0 }` и заканчивается, когда
    /// сессия удалена и шина [закрыта](Self::close).
    pub fn connect(self: &Arc<Self>) -> (BusSession, BusStream) {
        let (tx, rx) = mpsc::channel(self.buffer);
        // Fresh channel with capacity >= 1; cannot be full.
        let _ = tx.try_send(BrokerEvent::Connected { code: 0 });
        (
            BusSession {
                bus: Arc::clone(self),
                tx,
            },
            BusStream { rx },
        )
    }

    /// Доставить всем подписчикам topic'а, ожидая места в каналах.
    pub async fn send(&self, message: RawMessage) {
        let senders = self
            .read_topics()
            .get(&message.topic)
            .cloned()
            .unwrap_or_default();
        if senders.is_empty() {
            tracing::debug!(topic = %message.topic, "no subscribers, message discarded");
            return;
        }
        for tx in senders {
            if tx.send(BrokerEvent::Message(message.clone())).await.is_err() {
                tracing::debug!(topic = %message.topic, "subscriber closed during send");
            }
        }
    }

    /// Удалить все подписки. Потоки завершатся после вычитывания и удаления
    /// сессий.
    pub fn close(&self) {
        self.write_topics().clear();
    }

    pub fn topic_names(&self) -> Vec<String> {
        self.read_topics().keys().cloned().collect()
    }

    fn add_subscriber(&self, topic: &str, tx: mpsc::Sender<BrokerEvent>) {
        self.write_topics()
            .entry(topic.to_string())
            .or_default()
            .push(tx);
    }

    fn read_topics(&self) -> RwLockReadGuard<'_, HashMap<String, Vec<mpsc::Sender<BrokerEvent>>>> {
        match self.topics.read() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("bus read lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_topics(
        &self,
    ) -> RwLockWriteGuard<'_, HashMap<String, Vec<mpsc::Sender<BrokerEvent>>>> {
        match self.topics.write() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("bus write lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl Publisher for MessageBus {
    fn publish(&self, topic: &str, payload: Vec<u8>) {
        let mut topics = self.write_topics();
        let Some(subs) = topics.get_mut(topic) else {
            tracing::debug!(%topic, "no subscribers, message discarded");
            return;
        };

        let message = RawMessage::new(topic, payload);
        subs.retain(|tx| match tx.try_send(BrokerEvent::Message(message.clone())) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(%topic, "subscriber channel full, dropping");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }
}

// ═══════════════════════════════════════════════════════════════
//  BusSession / BusStream
// ═══════════════════════════════════════════════════════════════

/// Handle подписок одной сессии. Умеет и публиковать в шину.
pub struct BusSession {
    bus: Arc<MessageBus>,
    tx: mpsc::Sender<BrokerEvent>,
}

impl Subscriber for BusSession {
    fn subscribe(
        &self,
        topic: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), BusError>> + Send + '_>> {
        let topic = topic.to_string();
        Box::pin(async move {
            if self.tx.is_closed() {
                return Err(BusError::Closed);
            }
            self.bus.add_subscriber(&topic, self.tx.clone());
            self.tx
                .send(BrokerEvent::Subscribed { topic })
                .await
                .map_err(|_| BusError::Closed)
        })
    }
}

impl Publisher for BusSession {
    fn publish(&self, topic: &str, payload: Vec<u8>) {
        self.bus.publish(topic, payload);
    }
}

/// Поток событий одной сессии.
pub struct BusStream {
    rx: mpsc::Receiver<BrokerEvent>,
}

impl EventStream for BusStream {
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Option<BrokerEvent>> + Send + '_>> {
        Box::pin(async { self.rx.recv().await })
    }
}
