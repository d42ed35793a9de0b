use crate::types::{NewsError, Result};
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const COMMAND_CAPACITY: usize = 1024;

pub type ClientId = u64;

/// Messages serialized through the hub task.
enum Command {
    Register {
        queue: mpsc::Sender<String>,
        reply: oneshot::Sender<ClientId>,
    },
    Unregister(ClientId),
    Broadcast(String),
    Relay { from: ClientId, message: String },
    ClientCount(oneshot::Sender<usize>),
}

/// Connection registry. Only the hub task touches it; everything else talks
/// to it through a `HubHandle`.
struct Hub {
    clients: HashMap<ClientId, mpsc::Sender<String>>,
    next_id: ClientId,
}

impl Hub {
    fn new() -> Self {
        Self {
            clients: HashMap::new(),
            next_id: 0,
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        info!("Broadcast hub started");
        while let Some(command) = commands.recv().await {
            match command {
                Command::Register { queue, reply } => {
                    let id = self.next_id;
                    self.next_id += 1;
                    self.clients.insert(id, queue);
                    debug!("Client {} registered ({} connected)", id, self.clients.len());
                    // A requester that went away just leaves a client the next broadcast prunes.
                    let _ = reply.send(id);
                }
                Command::Unregister(id) => {
                    // Dropping the sender closes the client's queue.
                    if self.clients.remove(&id).is_some() {
                        debug!("Client {} unregistered ({} connected)", id, self.clients.len());
                    }
                }
                Command::Broadcast(message) => self.broadcast(message, None),
                Command::Relay { from, message } => self.broadcast(message, Some(from)),
                Command::ClientCount(reply) => {
                    let _ = reply.send(self.clients.len());
                }
            }
        }
        info!("Broadcast hub stopped");
    }

    fn broadcast(&mut self, message: String, except: Option<ClientId>) {
        let mut dropped = Vec::new();
        for (id, queue) in self.clients.iter().filter(|(id, _)| Some(**id) != except) {
            if let Err(e) = queue.try_send(message.clone()) {
                warn!("Dropping client {}: {}", id, e);
                dropped.push(*id);
            }
        }
        for id in dropped {
            self.clients.remove(&id);
        }
        debug!("Broadcast delivered to {} clients", self.clients.len());
    }
}

/// Cloneable access to a running hub.
#[derive(Clone)]
pub struct HubHandle {
    commands: mpsc::Sender<Command>,
    queue_capacity: usize,
}

impl HubHandle {
    /// Spawn the hub task. It stops once every handle is dropped.
    pub fn spawn(queue_capacity: usize) -> (Self, JoinHandle<()>) {
        let (commands, receiver) = mpsc::channel(COMMAND_CAPACITY);
        let task = tokio::spawn(Hub::new().run(receiver));
        (
            Self {
                commands,
                queue_capacity,
            },
            task,
        )
    }

    /// Register a new client with a fresh outbound queue.
    pub async fn register(&self) -> Result<(ClientId, mpsc::Receiver<String>)> {
        let (queue, receiver) = mpsc::channel(self.queue_capacity);
        let id = self.register_queue(queue).await?;
        Ok((id, receiver))
    }

    /// Register a client whose outbound queue the caller already owns.
    pub async fn register_queue(&self, queue: mpsc::Sender<String>) -> Result<ClientId> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Register { queue, reply }).await?;
        response.await.map_err(|_| NewsError::HubClosed)
    }

    pub async fn unregister(&self, id: ClientId) -> Result<()> {
        self.send(Command::Unregister(id)).await
    }

    /// Queue `message` for every registered client. Clients whose queue is
    /// full or closed are removed.
    pub async fn broadcast(&self, message: impl Into<String>) -> Result<()> {
        self.send(Command::Broadcast(message.into())).await
    }

    /// Like `broadcast`, but skips the client `from`.
    pub async fn relay(&self, from: ClientId, message: impl Into<String>) -> Result<()> {
        self.send(Command::Relay {
            from,
            message: message.into(),
        })
        .await
    }

    pub async fn client_count(&self) -> Result<usize> {
        let (reply, response) = oneshot::channel();
        self.send(Command::ClientCount(reply)).await?;
        response.await.map_err(|_| NewsError::HubClosed)
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).await.map_err(|_| NewsError::HubClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::error::TryRecvError;

    #[tokio::test]
    async fn test_broadcast_reaches_every_client() {
        let (hub, _task) = HubHandle::spawn(4);
        let (_, mut first) = hub.register().await.unwrap();
        let (_, mut second) = hub.register().await.unwrap();

        hub.broadcast("hello").await.unwrap();
        assert_eq!(first.recv().await.as_deref(), Some("hello"));
        assert_eq!(second.recv().await.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_relay_skips_sender() {
        let (hub, _task) = HubHandle::spawn(4);
        let (sender_id, mut sender) = hub.register().await.unwrap();
        let (_, mut other) = hub.register().await.unwrap();

        hub.relay(sender_id, "hi").await.unwrap();
        assert_eq!(other.recv().await.as_deref(), Some("hi"));
        // Commands are serialized, so the relay has been handled by now.
        assert_eq!(hub.client_count().await.unwrap(), 2);
        assert!(matches!(sender.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_full_queue_drops_only_that_client() {
        let (hub, _task) = HubHandle::spawn(4);

        let (full_queue, mut full) = mpsc::channel(1);
        full_queue.try_send("pending".to_string()).unwrap();
        hub.register_queue(full_queue).await.unwrap();
        let (_, mut healthy_a) = hub.register().await.unwrap();
        let (_, mut healthy_b) = hub.register().await.unwrap();

        hub.broadcast("M").await.unwrap();
        assert_eq!(hub.client_count().await.unwrap(), 2);
        assert_eq!(healthy_a.recv().await.as_deref(), Some("M"));
        assert_eq!(healthy_b.recv().await.as_deref(), Some("M"));

        // The dropped client keeps what it had and then sees its queue closed.
        assert_eq!(full.recv().await.as_deref(), Some("pending"));
        assert_eq!(full.recv().await, None);
    }

    #[tokio::test]
    async fn test_unregister_closes_queue() {
        let (hub, _task) = HubHandle::spawn(4);
        let (id, mut queue) = hub.register().await.unwrap();

        hub.unregister(id).await.unwrap();
        assert_eq!(queue.recv().await, None);
        assert_eq!(hub.client_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_closed_client_is_pruned_on_broadcast() {
        let (hub, _task) = HubHandle::spawn(4);
        let (_, queue) = hub.register().await.unwrap();
        drop(queue);

        hub.broadcast("gone").await.unwrap();
        assert_eq!(hub.client_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_unregister_is_ignored() {
        let (hub, _task) = HubHandle::spawn(4);
        let (_, mut queue) = hub.register().await.unwrap();

        hub.unregister(9999).await.unwrap();
        assert_eq!(hub.client_count().await.unwrap(), 1);
        assert!(matches!(queue.try_recv(), Err(TryRecvError::Empty)));
    }
}
