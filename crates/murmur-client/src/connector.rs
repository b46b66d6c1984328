//! WebSocket connection to the relay.
//!
//! The session lives behind a `tokio::sync::Mutex` owned by this connection:
//! the reader task feeds it relay frames, user commands encode through it,
//! and a single writer task drains one ordered outbound queue. Hashing,
//! compression and image work run on the blocking pool with the lock
//! released.

use futures::{SinkExt, StreamExt};
use murmur_core::{ClientId, FileControl, InnerMessage, MurmurError, MurmurResult};
use murmur_transfer::{
    inline_images, Pacer, PreparedTransfer, ReceivedFiles, SelectedFile, TransferSummary,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::session::{ClientSession, SessionEvent};

const OUTBOUND_QUEUE: usize = 1024;
const EVENT_QUEUE: usize = 1024;

/// What `send_files` ended up sending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentFiles {
    /// Every file was a small image: one inline `image` message.
    Inline { images: usize },
    /// A volume transfer with this id.
    Transfer { file_id: String, volumes: usize },
}

/// One peer as listed by `/peers`.
#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub client: ClientId,
    pub name: Option<String>,
    pub ready: bool,
}

pub struct Connection {
    session: Arc<Mutex<ClientSession>>,
    outbound: mpsc::Sender<String>,
    events: mpsc::Sender<SessionEvent>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

fn transport_closed() -> MurmurError {
    MurmurError::Transport("connection closed".into())
}

fn blocking_failed(e: tokio::task::JoinError) -> MurmurError {
    MurmurError::Other(anyhow::anyhow!("blocking task failed: {e}"))
}

/// Connect to `url` and start the handshake. Events, starting with
/// `Ready` and `Joined`, arrive on the returned receiver.
pub async fn connect(
    url: &str,
    session: ClientSession,
) -> MurmurResult<(Connection, mpsc::Receiver<SessionEvent>)> {
    let (ws, _) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| MurmurError::Transport(format!("connect {url}: {e}")))?;
    info!(url, "connected to relay");
    let (mut sink, mut stream) = ws.split();

    let (out_tx, mut out_rx) = mpsc::channel::<String>(OUTBOUND_QUEUE);
    let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);
    let session = Arc::new(Mutex::new(session));

    let writer = tokio::spawn(async move {
        while let Some(wire) = out_rx.recv().await {
            if let Err(e) = sink.send(Message::text(wire)).await {
                warn!(error = %e, "write to relay failed");
                break;
            }
        }
        let _ = sink.close().await;
    });

    let reader = {
        let session = session.clone();
        let outbound = out_tx.clone();
        let events = event_tx.clone();
        tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                let text = match msg {
                    Ok(Message::Text(text)) => text.as_str().to_owned(),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!(error = %e, "relay connection error");
                        break;
                    }
                };
                let (result, replies) = {
                    let mut session = session.lock().await;
                    let result = session.handle_frame(&text);
                    (result, session.take_outbound())
                };
                for wire in replies {
                    if outbound.send(wire).await.is_err() {
                        break;
                    }
                }
                match result {
                    Ok(batch) => {
                        for event in batch {
                            let _ = events.send(event).await;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "closing connection");
                        break;
                    }
                }
            }
            session.lock().await.teardown();
            let _ = events.send(SessionEvent::Disconnected).await;
            info!("disconnected from relay");
        })
    };

    Ok((
        Connection {
            session,
            outbound: out_tx,
            events: event_tx,
            reader,
            writer,
        },
        event_rx,
    ))
}

impl Connection {
    async fn push(&self, wire: String) -> MurmurResult<()> {
        self.outbound.send(wire).await.map_err(|_| transport_closed())
    }

    async fn send_message(&self, target: Option<&str>, message: &InnerMessage) -> MurmurResult<()> {
        let wire = self.session.lock().await.encode_for(target, message)?;
        self.push(wire).await
    }

    pub async fn client_id(&self) -> Option<ClientId> {
        self.session.lock().await.client_id().map(str::to_string)
    }

    pub async fn send_text(&self, text: &str) -> MurmurResult<()> {
        self.send_message(None, &InnerMessage::Text(text.to_string()))
            .await
    }

    pub async fn send_private_text(&self, target: &str, text: &str) -> MurmurResult<()> {
        self.send_message(Some(target), &InnerMessage::TextPrivate(text.to_string()))
            .await
    }

    /// Send files to the room, or privately to `target`. Small images go
    /// inline; anything else becomes a paced volume transfer.
    pub async fn send_files(
        &self,
        paths: Vec<PathBuf>,
        target: Option<ClientId>,
    ) -> MurmurResult<SentFiles> {
        let target = target.as_deref();
        let (config, user_name) = {
            let session = self.session.lock().await;
            session.ensure_routable(target)?;
            (session.transfer_config().clone(), session.user_name().to_string())
        };

        let files = tokio::task::spawn_blocking(move || {
            paths
                .iter()
                .map(|p| SelectedFile::read(p))
                .collect::<MurmurResult<Vec<_>>>()
        })
        .await
        .map_err(blocking_failed)??;

        let inline_config = config.clone();
        let (files, inline) = tokio::task::spawn_blocking(move || {
            let inline = inline_images(&files, &inline_config);
            (files, inline)
        })
        .await
        .map_err(blocking_failed)?;
        if let Some(payload) = inline? {
            let images = payload.images.len();
            let message = match target {
                Some(_) => InnerMessage::ImagePrivate(payload),
                None => InnerMessage::Image(payload),
            };
            self.send_message(target, &message).await?;
            return Ok(SentFiles::Inline { images });
        }

        let prepared_config = config.clone();
        let prepared = tokio::task::spawn_blocking(move || {
            PreparedTransfer::prepare(files, &prepared_config, Some(&user_name))
        })
        .await
        .map_err(blocking_failed)??;

        let file_id = prepared.file_id().to_string();
        let volumes = prepared.total_volumes();
        self.session
            .lock()
            .await
            .transfers_mut()
            .register_outgoing(&prepared.start, target.map(str::to_string))?;
        let _ = self
            .events
            .send(SessionEvent::TransferProgress {
                file_id: file_id.clone(),
                done: 0,
                total: volumes,
            })
            .await;

        let pacer = Pacer::from_config(&config);
        pacer
            .run(prepared.into_messages(), |control| self.send_control(control, target))
            .await?;
        info!(file_id = %file_id, volumes, "transfer queued");
        let _ = self
            .events
            .send(SessionEvent::TransferComplete {
                file_id: file_id.clone(),
            })
            .await;
        Ok(SentFiles::Transfer { file_id, volumes })
    }

    async fn send_control(&self, control: FileControl, target: Option<&str>) -> MurmurResult<()> {
        let file_id = control.file_id().to_string();
        let (wire, progress) = {
            let mut session = self.session.lock().await;
            let progress = session.transfers_mut().record_sent(&control);
            let message = control.into_message(target.is_some());
            (session.encode_for(target, &message)?, progress)
        };
        self.push(wire).await?;
        if let Some((done, total)) = progress {
            let _ = self
                .events
                .send(SessionEvent::TransferProgress {
                    file_id,
                    done,
                    total,
                })
                .await;
        }
        Ok(())
    }

    /// Verify a completed incoming transfer and write it under `dir`.
    pub async fn save(&self, file_id: &str, dir: &Path) -> MurmurResult<Vec<PathBuf>> {
        let record = self.session.lock().await.transfers_mut().take_completed(file_id)?;
        let dir = dir.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let files: ReceivedFiles = record.reconstruct()?;
            files.write_to(&dir)
        })
        .await
        .map_err(blocking_failed)?
    }

    pub async fn discard(&self, file_id: &str) -> bool {
        self.session.lock().await.transfers_mut().discard(file_id)
    }

    pub async fn peers(&self) -> Vec<PeerInfo> {
        let session = self.session.lock().await;
        let mut peers: Vec<PeerInfo> = session
            .peers()
            .map(|(client, state)| PeerInfo {
                client: client.clone(),
                name: state.name.clone(),
                ready: state.has_shared_secret(),
            })
            .collect();
        peers.sort_by(|a, b| a.client.cmp(&b.client));
        peers
    }

    pub async fn transfers(&self) -> Vec<TransferSummary> {
        self.session.lock().await.transfers().summaries()
    }

    /// Leave the room and close the socket.
    pub async fn close(self) {
        let leave = self.session.lock().await.leave();
        match leave {
            Ok(wire) => {
                let _ = self.outbound.send(wire).await;
            }
            Err(e) => debug!(error = %e, "no leave frame sent"),
        }
        self.reader.abort();
        drop(self.outbound);
        let _ = self.writer.await;
        self.session.lock().await.teardown();
    }
}
