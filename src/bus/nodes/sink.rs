//! MediaSink — streams media data to an output, chunk by chunk.
//!
//! The sink owns a dedicated long-lived streaming thread, separate from
//! the node's mailbox thread. The streaming thread waits on a binary
//! gate; while the gate is open it copies one fixed-size chunk from the
//! current input stream to the output per iteration and broadcasts
//! progress. Stop/Pause/Start control packets mutate the gate and the
//! playing flag; swapping the input closes the previous stream first,
//! and the stream mutex makes each read+write atomic relative to
//! reassignment.

use crate::bus::node::{NodeBehavior, NodeCtx};
use crate::bus::packet::{Notification, Packet, PacketKind, PacketTag};
use crate::bus::registry::Registry;
use crate::codec::Encoder;
use crate::config::SinkConfig;
use crate::error::{MediaBusError, Result};
use crate::stream::MediaStream;
use crate::sync::lock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

/// Default number of bytes read from input and written to output at a time.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// A binary gate the streaming thread waits on while paused.
struct Gate {
    open: Mutex<bool>,
    cv: Condvar,
}

impl Gate {
    fn new() -> Self {
        Self {
            open: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    fn set(&self) {
        *lock(&self.open) = true;
        self.cv.notify_all();
    }

    fn clear(&self) {
        *lock(&self.open) = false;
    }

    fn wait(&self) {
        let mut open = lock(&self.open);
        while !*open {
            open = self
                .cv
                .wait(open)
                .unwrap_or_else(|e| e.into_inner());
        }
    }
}

struct SinkStreams {
    input: Option<Box<dyn MediaStream>>,
    output: Option<Box<dyn MediaStream>>,
}

struct SinkShared {
    streams: Mutex<SinkStreams>,
    gate: Gate,
    playing: AtomicBool,
    running: AtomicBool,
    size: AtomicU64,
    chunk_size: usize,
}

enum ChunkOutcome {
    /// No input assigned.
    NoInput,
    /// Bytes copied (zero means end of input).
    Sent(usize),
}

impl SinkShared {
    /// Swaps the input stream, closing the previous one first. Opens the
    /// new stream if needed; a `None` input closes the gate.
    fn set_input(&self, stream: Option<Box<dyn MediaStream>>) -> Result<()> {
        let mut streams = lock(&self.streams);
        if let Some(mut old) = streams.input.take() {
            let _ = old.close();
        }
        match stream {
            Some(mut s) => {
                if !s.is_open() {
                    s.open()?;
                }
                streams.input = Some(s);
                if self.playing.load(Ordering::SeqCst) {
                    self.gate.set();
                }
            }
            None => self.gate.clear(),
        }
        Ok(())
    }

    /// Reads one chunk from the input and writes it to the output. The
    /// streams lock is held for the whole copy, so reassignment can never
    /// interleave with it.
    fn send_chunk(&self, buf: &mut [u8]) -> Result<ChunkOutcome> {
        let mut streams = lock(&self.streams);
        let Some(input) = streams.input.as_mut() else {
            return Ok(ChunkOutcome::NoInput);
        };
        let n = input.read(buf)?;
        if n > 0 {
            let output = streams
                .output
                .as_mut()
                .ok_or_else(|| MediaBusError::Stream("sink has no output stream".into()))?;
            let mut written = 0;
            while written < n {
                written += output.write(&buf[written..n])?;
            }
        }
        Ok(ChunkOutcome::Sent(n))
    }

    fn start_streaming(&self) {
        self.playing.store(true, Ordering::SeqCst);
        self.gate.set();
    }

    fn stop_streaming(&self) {
        self.playing.store(false, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        self.gate.set();
    }

    fn pause_streaming(&self) {
        self.gate.clear();
    }
}

/// The streaming thread body.
fn stream_loop(shared: Arc<SinkShared>, ctx: NodeCtx) {
    let mut count: u64 = 0;
    let mut buf = vec![0u8; shared.chunk_size];
    while shared.running.load(Ordering::SeqCst) {
        shared.gate.wait();
        if !shared.running.load(Ordering::SeqCst) {
            break;
        }
        match shared.send_chunk(&mut buf) {
            Ok(ChunkOutcome::NoInput) => {
                tracing::warn!(node = %ctx.name(), "no media, pausing");
                shared.gate.clear();
            }
            Ok(ChunkOutcome::Sent(n)) => {
                count += n as u64;
                ctx.send(PacketKind::StreamProgress {
                    value: count,
                    max: shared.size.load(Ordering::SeqCst),
                });
                if n == 0 {
                    let _ = shared.set_input(None);
                    ctx.send(PacketKind::Notify(Notification::PlaybackComplete));
                    count = 0;
                }
            }
            Err(e) => {
                // Stream I/O failures take the same path as handler
                // faults: Exception broadcast, then the node dies.
                tracing::error!(node = %ctx.name(), error = %e, "streaming failed");
                ctx.send(PacketKind::Exception {
                    message: e.to_string(),
                });
                ctx.kill();
                break;
            }
        }
    }
    tracing::debug!(node = %ctx.name(), "streaming thread exited");
}

/// A node that relays raw media data to an output stream and broadcasts
/// playback status.
pub struct MediaSink {
    shared: Arc<SinkShared>,
    encoder: Option<Arc<dyn Encoder>>,
    worker_started: bool,
}

impl MediaSink {
    /// Creates a sink writing to `output`, opening it if necessary.
    pub fn new(output: Box<dyn MediaStream>) -> Result<Self> {
        Self::with_chunk_size(output, DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(mut output: Box<dyn MediaStream>, chunk_size: usize) -> Result<Self> {
        if !output.is_open() {
            output.open()?;
        }
        Ok(Self {
            shared: Arc::new(SinkShared {
                streams: Mutex::new(SinkStreams {
                    input: None,
                    output: Some(output),
                }),
                gate: Gate::new(),
                playing: AtomicBool::new(true),
                running: AtomicBool::new(true),
                size: AtomicU64::new(0),
                chunk_size,
            }),
            encoder: None,
            worker_started: false,
        })
    }

    pub fn from_config(output: Box<dyn MediaStream>, config: &SinkConfig) -> Result<Self> {
        Self::with_chunk_size(output, config.chunk_size)
    }

    /// Routes incoming media through `encoder` before streaming it.
    pub fn with_encoder(mut self, encoder: Arc<dyn Encoder>) -> Self {
        self.encoder = Some(encoder);
        self
    }

    /// Spawns the streaming thread. Runs once, on the guaranteed first
    /// packet.
    fn on_kickstart(&mut self, ctx: &NodeCtx, _pkt: &Packet) -> Result<()> {
        if self.worker_started {
            return Ok(());
        }
        self.worker_started = true;
        let shared = Arc::clone(&self.shared);
        let worker_ctx = ctx.clone();
        std::thread::Builder::new()
            .name(format!("{}-stream", ctx.name()))
            .spawn(move || stream_loop(shared, worker_ctx))?;
        Ok(())
    }

    /// Changes the media object currently being streamed.
    fn on_media(&mut self, _ctx: &NodeCtx, pkt: &Packet) -> Result<()> {
        let PacketKind::Media(media) = pkt.kind() else {
            return Ok(());
        };
        let mut stream = media.stream()?;
        stream.open()?;
        let stream = match &self.encoder {
            Some(enc) => enc.encode(stream, &media.metadata())?,
            None => stream,
        };
        self.shared
            .size
            .store(stream.size().unwrap_or(0), Ordering::SeqCst);
        self.shared.set_input(Some(stream))?;
        self.shared.start_streaming();
        Ok(())
    }

    fn on_start(&mut self, _ctx: &NodeCtx, _pkt: &Packet) -> Result<()> {
        self.shared.start_streaming();
        Ok(())
    }

    fn on_stop(&mut self, ctx: &NodeCtx, _pkt: &Packet) -> Result<()> {
        tracing::debug!(node = %ctx.name(), "stopping streaming thread");
        self.shared.stop_streaming();
        Ok(())
    }

    fn on_pause(&mut self, ctx: &NodeCtx, _pkt: &Packet) -> Result<()> {
        tracing::debug!(node = %ctx.name(), "pausing streaming");
        self.shared.pause_streaming();
        Ok(())
    }
}

impl NodeBehavior for MediaSink {
    fn name(&self) -> &str {
        "media-sink"
    }

    fn registry() -> Registry<Self> {
        Registry::builder()
            .on("kickstart", &[PacketTag::Kickstart], Self::on_kickstart)
            .on("media", &[PacketTag::Media], Self::on_media)
            .on("start", &[PacketTag::Start], Self::on_start)
            .on("stop", &[PacketTag::Stop], Self::on_stop)
            .on("pause", &[PacketTag::Pause], Self::on_pause)
            .build()
    }

    fn on_kill(&mut self, ctx: &NodeCtx) {
        tracing::debug!(node = %ctx.name(), "killing streaming thread");
        self.shared.stop_streaming();
    }
}
