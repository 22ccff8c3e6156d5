//! Output sinks receiving live subprocess output.

use async_trait::async_trait;
use gxp_protocol::ipc::Event;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::Sender;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Append-only destination for tool output.
///
/// Chunks arrive in the order they were read from the subprocess pipes.
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn append(&self, chunk: &[u8]) -> std::io::Result<()>;
}

/// Keeps all output in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contents(&self) -> Vec<u8> {
        self.buffer.lock().await.clone()
    }

    /// Output decoded as UTF-8, with invalid sequences replaced.
    pub async fn text(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock().await).into_owned()
    }
}

#[async_trait]
impl OutputSink for MemorySink {
    async fn append(&self, chunk: &[u8]) -> std::io::Result<()> {
        self.buffer.lock().await.extend_from_slice(chunk);
        Ok(())
    }
}

/// Appends output to a log file.
#[derive(Debug)]
pub struct FileSink {
    file: Mutex<File>,
}

impl FileSink {
    /// Open `path` for appending, creating it if needed.
    pub async fn open(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

#[async_trait]
impl OutputSink for FileSink {
    async fn append(&self, chunk: &[u8]) -> std::io::Result<()> {
        let mut file = self.file.lock().await;
        file.write_all(chunk).await?;
        file.flush().await
    }
}

/// Forwards output to the UI as [`Event::TaskOutput`] events.
///
/// A multi-byte character split across two chunks is held back until it is
/// complete, so events always carry whole characters.
#[derive(Debug)]
pub struct EventSink {
    task_id: Uuid,
    events_tx: Sender<Event>,
    pending: Mutex<Vec<u8>>,
}

impl EventSink {
    pub fn new(task_id: Uuid, events_tx: Sender<Event>) -> Self {
        Self {
            task_id,
            events_tx,
            pending: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl OutputSink for EventSink {
    async fn append(&self, chunk: &[u8]) -> std::io::Result<()> {
        let content = {
            let mut pending = self.pending.lock().await;
            pending.extend_from_slice(chunk);
            take_complete_utf8(&mut pending)
        };

        if !content.is_empty() {
            // A closed UI channel must not fail the tool run
            let _ = self
                .events_tx
                .send(Event::TaskOutput {
                    task_id: self.task_id,
                    content,
                })
                .await;
        }
        Ok(())
    }
}

/// Drains the decodable prefix of `buf`, leaving an incomplete trailing
/// character in place. Each invalid sequence becomes one U+FFFD.
fn take_complete_utf8(buf: &mut Vec<u8>) -> String {
    let mut text = String::new();
    let mut start = 0;
    loop {
        match std::str::from_utf8(&buf[start..]) {
            Ok(valid) => {
                text.push_str(valid);
                start = buf.len();
                break;
            }
            Err(e) => {
                let valid_end = start + e.valid_up_to();
                text.push_str(&String::from_utf8_lossy(&buf[start..valid_end]));
                match e.error_len() {
                    Some(len) => {
                        text.push(char::REPLACEMENT_CHARACTER);
                        start = valid_end + len;
                    }
                    None => {
                        start = valid_end;
                        break;
                    }
                }
            }
        }
    }
    buf.drain(..start);
    text
}

/// Writes every chunk to several sinks, in order.
///
/// A sink that fails is logged once and skipped from then on; the others
/// keep receiving output. Only when every sink has failed does `append`
/// return an error.
#[derive(Clone, Default)]
pub struct TeeSink {
    branches: Vec<TeeBranch>,
}

#[derive(Clone)]
struct TeeBranch {
    sink: Arc<dyn OutputSink>,
    failed: Arc<AtomicBool>,
}

impl TeeBranch {
    fn new(sink: Arc<dyn OutputSink>) -> Self {
        Self {
            sink,
            failed: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl TeeSink {
    pub fn new(sinks: Vec<Arc<dyn OutputSink>>) -> Self {
        Self {
            branches: sinks.into_iter().map(TeeBranch::new).collect(),
        }
    }

    pub fn with(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.branches.push(TeeBranch::new(sink));
        self
    }
}

#[async_trait]
impl OutputSink for TeeSink {
    async fn append(&self, chunk: &[u8]) -> std::io::Result<()> {
        let mut last_error = None;
        let mut delivered = false;

        for (index, branch) in self.branches.iter().enumerate() {
            if branch.failed.load(Ordering::Relaxed) {
                continue;
            }
            match branch.sink.append(chunk).await {
                Ok(()) => delivered = true,
                Err(e) => {
                    tracing::warn!(sink = index, error = %e, "output sink failed, skipping it");
                    branch.failed.store(true, Ordering::Relaxed);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if !delivered => Err(e),
            _ => Ok(()),
        }
    }
}
