//! Scripted in-memory fountain for the engine tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use fountain_engine::{
    BoxFuture, ConnectionManager, ConnectionState, ConnectionStatus, Connector, EngineConfig,
    FountainClient, Link, Notifications, ShutdownHandle, TransportError, TransportResult,
};
use fountain_protocol::{CommandCode, Frame};
use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub const DEVICE_ID: u64 = 0x0000_A1B2_C3D4;
pub const SERIAL: &str = "W5SN20240100042";
pub const RSSI: i16 = -61;

/// Pump state block: on, normal mode, one hour of runtime, 80 % filter.
pub const STATE_BLOCK: [u8; 12] = [1, 1, 0, 0, 0, 0, 0, 0, 0x0E, 0x10, 80, 1];

/// Settings block: smart 3/3, LED on at 60 % from 08:00 to 22:00, DND off
/// from 22:00 to 08:00, unlocked.
pub const CONFIG_BLOCK: [u8; 14] = [
    3, 3, 1, 60, 0x01, 0xE0, 0x05, 0x28, 0, 0x05, 0x28, 0x01, 0xE0, 0,
];

/// What the simulated device does.
#[derive(Debug, Default)]
pub struct Script {
    /// Connect attempts to fail before one succeeds.
    pub failing_connects: usize,
    /// Commands the device never answers.
    pub silent: HashSet<CommandCode>,
    /// Send every reply twice.
    pub duplicate_replies: bool,
    /// Raw bytes pushed right before the reply to a command.
    pub push_before: HashMap<CommandCode, Vec<u8>>,
    /// Report "not initialized" on synchronize.
    pub not_initialized: bool,
    /// Stop answering anything.
    pub mute: bool,
    /// Reject every write.
    pub fail_writes: bool,
    /// Hold replies until this many are buffered, then send them in reverse
    /// order. Zero or one disables batching.
    pub reverse_batch: usize,
}

struct Inner {
    script: Mutex<Script>,
    connects: Mutex<Vec<Instant>>,
    written: Mutex<Vec<(u64, Frame)>>,
    disconnects: AtomicUsize,
    link: Mutex<Option<Arc<SimLink>>>,
}

/// The simulated fountain, also acting as the connector.
#[derive(Clone)]
pub struct SimFountain {
    inner: Arc<Inner>,
}

impl SimFountain {
    pub fn new() -> Self {
        Self::with_script(Script::default())
    }

    pub fn with_script(script: Script) -> Self {
        Self {
            inner: Arc::new(Inner {
                script: Mutex::new(script),
                connects: Mutex::new(Vec::new()),
                written: Mutex::new(Vec::new()),
                disconnects: AtomicUsize::new(0),
                link: Mutex::new(None),
            }),
        }
    }

    pub fn script(&self) -> MutexGuard<'_, Script> {
        self.inner.script.lock().unwrap()
    }

    /// Times of every connect attempt.
    pub fn connects(&self) -> Vec<Instant> {
        self.inner.connects.lock().unwrap().clone()
    }

    /// Every frame written, tagged with the connect attempt it was written
    /// on (1-based).
    pub fn written(&self) -> Vec<(u64, Frame)> {
        self.inner.written.lock().unwrap().clone()
    }

    pub fn written_codes(&self, link: u64) -> Vec<CommandCode> {
        self.written()
            .into_iter()
            .filter(|(id, _)| *id == link)
            .map(|(_, frame)| frame.code)
            .collect()
    }

    pub fn disconnects(&self) -> usize {
        self.inner.disconnects.load(Ordering::SeqCst)
    }

    /// Ends the notification stream of the current link.
    pub fn drop_link(&self) {
        if let Some(link) = self.inner.link.lock().unwrap().as_ref() {
            link.tx.lock().unwrap().take();
        }
    }

    /// Sends raw bytes as an unsolicited notification.
    pub fn push(&self, bytes: Vec<u8>) {
        if let Some(link) = self.inner.link.lock().unwrap().as_ref() {
            link.send_all(vec![bytes]);
        }
    }
}

impl Connector for SimFountain {
    fn connect(&self) -> BoxFuture<'_, TransportResult<Arc<dyn Link>>> {
        Box::pin(async move {
            let id = {
                let mut connects = self.inner.connects.lock().unwrap();
                connects.push(Instant::now());
                connects.len() as u64
            };

            {
                let mut script = self.inner.script.lock().unwrap();
                if script.failing_connects > 0 {
                    script.failing_connects -= 1;
                    return Err(TransportError::connect("device out of range"));
                }
            }

            let (tx, rx) = mpsc::unbounded_channel();
            let link = Arc::new(SimLink {
                id,
                inner: self.inner.clone(),
                tx: Mutex::new(Some(tx)),
                rx: Mutex::new(Some(rx)),
                batch: Mutex::new(Vec::new()),
            });
            *self.inner.link.lock().unwrap() = Some(link.clone());
            Ok(link as Arc<dyn Link>)
        })
    }
}

struct SimLink {
    id: u64,
    inner: Arc<Inner>,
    tx: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<Vec<u8>>>>,
    batch: Mutex<Vec<Vec<u8>>>,
}

impl SimLink {
    fn send_all(&self, chunks: Vec<Vec<u8>>) {
        if let Some(tx) = self.tx.lock().unwrap().as_ref() {
            for chunk in chunks {
                let _ = tx.send(chunk);
            }
        }
    }

    fn respond(&self, frame: &Frame) -> Vec<Vec<u8>> {
        let script = self.inner.script.lock().unwrap();
        if script.mute || script.silent.contains(&frame.code) {
            return Vec::new();
        }

        let mut out = Vec::new();
        if let Some(push) = script.push_before.get(&frame.code) {
            out.push(push.clone());
        }
        if let Some(payload) = reply_payload(frame.code, &script) {
            let bytes = Frame::reply(frame.code, frame.seq, payload).encode().unwrap();
            out.push(bytes.clone());
            if script.duplicate_replies {
                out.push(bytes);
            }
        }

        if script.reverse_batch > 1 {
            let mut batch = self.batch.lock().unwrap();
            batch.extend(out);
            if batch.len() < script.reverse_batch {
                return Vec::new();
            }
            return batch.drain(..).rev().collect();
        }
        out
    }
}

impl Link for SimLink {
    fn write(&self, data: Vec<u8>) -> BoxFuture<'_, TransportResult<()>> {
        Box::pin(async move {
            let frame = Frame::decode(&data).unwrap();
            self.inner
                .written
                .lock()
                .unwrap()
                .push((self.id, frame.clone()));

            if self.inner.script.lock().unwrap().fail_writes {
                return Err(TransportError::write("GATT write rejected"));
            }

            let replies = self.respond(&frame);
            self.send_all(replies);
            Ok(())
        })
    }

    fn subscribe(&self) -> BoxFuture<'_, TransportResult<Notifications>> {
        Box::pin(async move {
            let rx = self
                .rx
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| TransportError::subscribe("already subscribed"))?;
            let stream = futures_util::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|chunk| (chunk, rx))
            });
            Ok(stream.boxed())
        })
    }

    fn disconnect(&self) -> BoxFuture<'_, TransportResult<()>> {
        Box::pin(async move {
            self.tx.lock().unwrap().take();
            self.inner.disconnects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn rssi(&self) -> BoxFuture<'_, Option<i16>> {
        Box::pin(async { Some(RSSI) })
    }
}

fn reply_payload(code: CommandCode, script: &Script) -> Option<Vec<u8>> {
    let payload = match code {
        CommandCode::Battery => vec![0x0F, 0xA0, 80],
        CommandCode::Identifiers => {
            let mut payload = vec![0, 0];
            payload.extend_from_slice(&DEVICE_ID.to_be_bytes()[2..]);
            payload.extend_from_slice(SERIAL.as_bytes());
            payload
        }
        CommandCode::Synchronize => vec![u8::from(!script.not_initialized)],
        CommandCode::Firmware => vec![1, 35],
        CommandCode::State => STATE_BLOCK.to_vec(),
        CommandCode::Config => CONFIG_BLOCK.to_vec(),
        CommandCode::Status => status_payload(&STATE_BLOCK, 600),
        CommandCode::SetMode | CommandCode::SetConfig | CommandCode::ResetFilter => vec![1],
        CommandCode::Initialize | CommandCode::SetDateTime => return None,
    };
    Some(payload)
}

/// Full status report payload.
pub fn status_payload(state: &[u8; 12], runtime_today_secs: u32) -> Vec<u8> {
    let mut payload = state.to_vec();
    payload.extend_from_slice(&runtime_today_secs.to_be_bytes());
    payload.extend_from_slice(&CONFIG_BLOCK[..13]);
    payload
}

/// Engine config with short command timeouts.
pub fn test_config() -> EngineConfig {
    EngineConfig::default().with_command_timeout(Duration::from_secs(2))
}

pub struct Harness {
    pub sim: SimFountain,
    pub client: FountainClient,
    pub shutdown: ShutdownHandle,
    pub status: watch::Receiver<ConnectionStatus>,
    pub task: JoinHandle<()>,
}

pub fn start(sim: &SimFountain, config: EngineConfig) -> Harness {
    let manager = ConnectionManager::new(sim.clone(), config).unwrap();
    Harness {
        sim: sim.clone(),
        client: manager.client(),
        shutdown: manager.shutdown_handle(),
        status: manager.subscribe(),
        task: tokio::spawn(manager.run()),
    }
}

impl Harness {
    pub async fn wait_for(&mut self, f: impl FnMut(&ConnectionStatus) -> bool) -> ConnectionStatus {
        let status = tokio::time::timeout(Duration::from_secs(600), self.status.wait_for(f))
            .await
            .expect("timed out waiting for connection state")
            .expect("connection manager dropped");
        *status
    }

    pub async fn wait_for_state(&mut self, state: ConnectionState) -> ConnectionStatus {
        self.wait_for(|status| status.state == state).await
    }
}
