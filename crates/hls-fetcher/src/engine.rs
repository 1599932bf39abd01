// HLS Fetch Engine: one task that owns the playlist, the download cursor,
// the segment cache and the pending requests.
//
// Reloads, downloads, consumer commands and cancellation are multiplexed
// with a biased `select!`; nothing here is shared behind a lock.

use crate::cache::{CachedSegment, ReadySegment, SegmentCache};
use crate::config::{HlsConfig, RetentionPolicy};
use crate::error::HlsError;
use crate::events::{EngineEvent, EnginePhase};
use crate::playlist::{load_media_playlist, resolve_uri};
use crate::retry::{RetryAction, retry_with_backoff};
use crate::scheduler::{ReloadPlan, download_delay, reload_plan};
use crate::storage::{SegmentStore, segment_file_name};
use crate::transport::Transport;
use crate::waiters::{Reply, WaiterRegistry};
use bytes::Bytes;
use futures::future::OptionFuture;
use m3u8_playlist::{CursorStep, PlaylistDocument, Segment, SegmentCursor};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

const EVENT_CHANNEL_CAPACITY: usize = 64;

type ReloadFuture = Pin<Box<dyn Future<Output = Result<Bytes, HlsError>> + Send>>;
type DownloadFuture = Pin<Box<dyn Future<Output = Result<PathBuf, HlsError>> + Send>>;

enum Command {
    GetSegment { sequence: u64, reply: Reply },
    NotifyConsumed { sequence: u64 },
}

struct DownloadJob {
    segment: Segment,
    future: DownloadFuture,
}

/// Cloneable access to a running [`FetchEngine`].
#[derive(Debug, Clone)]
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<Command>,
    token: CancellationToken,
    events: broadcast::Sender<EngineEvent>,
    phase: watch::Receiver<EnginePhase>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GetSegment { sequence, .. } => {
                f.debug_struct("GetSegment").field("sequence", sequence).finish()
            }
            Self::NotifyConsumed { sequence } => f
                .debug_struct("NotifyConsumed")
                .field("sequence", sequence)
                .finish(),
        }
    }
}

impl EngineHandle {
    /// Resolves with `sequence` or, failing that, the smallest cached
    /// sequence above it. Suspends until a qualifying download completes.
    ///
    /// Fails with [`HlsError::EndOfStream`] once the stream is exhausted and
    /// nothing at or above `sequence` is cached, and with
    /// [`HlsError::Stopped`] when the engine shuts down first.
    pub async fn get_segment(&self, sequence: u64) -> Result<ReadySegment, HlsError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::GetSegment { sequence, reply })
            .map_err(|_| HlsError::Stopped)?;
        response.await.map_err(|_| HlsError::Stopped)?
    }

    /// Tells the engine the consumer is done with `sequence`.
    pub fn notify_consumed(&self, sequence: u64) {
        let _ = self.commands.send(Command::NotifyConsumed { sequence });
    }

    /// Cancels reloads and downloads and shuts the engine task down.
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn phase(&self) -> EnginePhase {
        *self.phase.borrow()
    }

    /// Waits until the engine reports `phase`.
    pub async fn wait_for_phase(&self, phase: EnginePhase) -> Result<(), HlsError> {
        let mut watcher = self.phase.clone();
        watcher
            .wait_for(|current| *current == phase)
            .await
            .map(|_| ())
            .map_err(|_| HlsError::Stopped)
    }
}

/// A running fetch engine: the spawned task plus a handle to it.
#[derive(Debug)]
pub struct FetchEngine {
    handle: EngineHandle,
    task: JoinHandle<()>,
}

impl FetchEngine {
    /// Loads `root_url` (descending into a variant if it is a master
    /// playlist) and spawns the engine task.
    ///
    /// Start-up fetches are retried per `config.retry`. Structural problems
    /// such as a malformed playlist, no variants or a master pointing to
    /// another master are returned here; later failures are absorbed.
    pub async fn spawn(
        root_url: &str,
        config: HlsConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn SegmentStore>,
    ) -> Result<Self, HlsError> {
        config.validate()?;
        let root =
            Url::parse(root_url).map_err(|e| HlsError::invalid_url(root_url, e.to_string()))?;

        let token = CancellationToken::new();
        let (phase_tx, phase_rx) = watch::channel(EnginePhase::Idle);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        let media =
            load_media_playlist(transport.as_ref(), root, &config, &token, &phase_tx).await?;
        info!(
            url = %media.url,
            segments = media.document.segment_count(),
            end_of_stream = media.document.end_of_stream(),
            "Media playlist loaded"
        );

        let engine = EngineTask {
            waiters: WaiterRegistry::new(config.waiter_mode),
            config,
            transport,
            store,
            playlist_url: media.url,
            document: media.document,
            cursor: SegmentCursor::new(),
            cache: SegmentCache::default(),
            last_downloaded: None,
            last_consumed: None,
            exhausted: false,
            finished: false,
            token: token.clone(),
            events: events.clone(),
            phase: phase_tx,
        };
        let task = tokio::spawn(engine.run(commands_rx));

        Ok(Self {
            handle: EngineHandle {
                commands: commands_tx,
                token,
                events,
                phase: phase_rx,
            },
            task,
        })
    }

    /// [`spawn`](Self::spawn) followed by waiting for the first segment.
    pub async fn start(
        root_url: &str,
        config: HlsConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn SegmentStore>,
    ) -> Result<(Self, ReadySegment), HlsError> {
        let engine = Self::spawn(root_url, config, transport, store).await?;
        match engine.handle.get_segment(0).await {
            Ok(first) => Ok((engine, first)),
            Err(err) => {
                engine.stop();
                Err(err)
            }
        }
    }

    pub fn handle(&self) -> &EngineHandle {
        &self.handle
    }

    pub fn stop(&self) {
        self.handle.stop();
    }

    /// Waits for the engine task to exit. Call [`stop`](Self::stop) first
    /// unless every handle has been dropped.
    pub async fn join(self) {
        let Self { handle, task } = self;
        drop(handle);
        if let Err(e) = task.await {
            warn!(error = %e, "Fetch engine task failed");
        }
    }
}

struct EngineTask {
    config: HlsConfig,
    transport: Arc<dyn Transport>,
    store: Arc<dyn SegmentStore>,
    playlist_url: Url,
    document: PlaylistDocument,
    cursor: SegmentCursor,
    cache: SegmentCache,
    waiters: WaiterRegistry,
    last_downloaded: Option<Segment>,
    last_consumed: Option<u64>,
    /// No segment is left to download.
    exhausted: bool,
    /// End of stream has been announced.
    finished: bool,
    token: CancellationToken,
    events: broadcast::Sender<EngineEvent>,
    phase: watch::Sender<EnginePhase>,
}

impl EngineTask {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        info!(url = %self.playlist_url, "Fetch engine started");
        self.set_phase(EnginePhase::Streaming);

        let mut reload = self.schedule_reload();
        let mut download: Option<DownloadJob> = None;

        loop {
            if download.is_none() && !self.exhausted {
                download = self.next_download();
            }
            if self.exhausted && download.is_none() && !self.finished {
                self.finish();
            }

            tokio::select! {
                biased;

                _ = self.token.cancelled() => {
                    info!("Fetch engine stop requested");
                    break;
                }

                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        debug!("All engine handles dropped");
                        break;
                    }
                },

                Some(result) = OptionFuture::from(reload.as_mut()) => {
                    self.on_reload(result);
                    reload = self.schedule_reload();
                }

                Some(result) = OptionFuture::from(download.as_mut().map(|job| &mut job.future)) => {
                    if let Some(job) = download.take() {
                        self.on_download(job.segment, result).await;
                    }
                }
            }
        }

        self.shutdown().await;
    }

    fn set_phase(&self, phase: EnginePhase) {
        let previous = self.phase.send_replace(phase);
        if previous != phase {
            debug!(?previous, ?phase, "Engine phase changed");
        }
    }

    fn emit(&self, event: EngineEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn schedule_reload(&mut self) -> Option<ReloadFuture> {
        match reload_plan(&mut self.document) {
            ReloadPlan::Never => {
                trace!("Playlist ended, no further reloads");
                None
            }
            ReloadPlan::After(delay) => {
                debug!(delay_ms = delay.as_millis() as u64, "Playlist reload scheduled");
                let transport = Arc::clone(&self.transport);
                let url = self.playlist_url.clone();
                Some(Box::pin(async move {
                    tokio::time::sleep(delay).await;
                    transport.fetch_playlist(&url).await
                }))
            }
        }
    }

    fn on_reload(&mut self, result: Result<Bytes, HlsError>) {
        let content = match result {
            Ok(content) => content,
            Err(err) => {
                warn!(url = %self.playlist_url, error = %err, "Playlist reload failed");
                return;
            }
        };

        match self.document.update(content) {
            Ok(true) => {
                debug!(
                    first = ?self.document.first_sequence(),
                    last = ?self.document.last_sequence(),
                    "Playlist refreshed"
                );
                self.emit(EngineEvent::PlaylistRefreshed {
                    first_sequence: self.document.first_sequence(),
                    last_sequence: self.document.last_sequence(),
                    end_of_stream: self.document.end_of_stream(),
                });
            }
            Ok(false) => {
                self.emit(EngineEvent::PlaylistUnchanged {
                    attempts: self.document.reload_attempts(),
                });
            }
            Err(err) => {
                warn!(url = %self.playlist_url, error = %err, "Ignoring malformed playlist reload");
            }
        }
    }

    fn buffer_full(&self) -> bool {
        match self.config.max_buffered_ahead {
            Some(limit) => self.cache.count_after(self.last_consumed) >= limit,
            None => false,
        }
    }

    fn next_download(&mut self) -> Option<DownloadJob> {
        if self.buffer_full() {
            trace!(consumed = ?self.last_consumed, "Fetch-ahead limit reached");
            return None;
        }

        let segment = match self.cursor.step(&self.document) {
            CursorStep::Segment(segment) => segment.clone(),
            CursorStep::Finished => {
                self.exhausted = true;
                return None;
            }
            CursorStep::Gap => {
                if self.document.end_of_stream() {
                    self.skip_gap_in_ended_playlist();
                }
                return None;
            }
        };

        let sequence = segment.sequence_number;
        let delay = download_delay(
            &self.cache,
            sequence,
            self.last_downloaded.as_ref(),
            self.document.end_of_stream(),
        );
        debug!(sequence, delay_ms = delay.as_millis() as u64, "Segment download scheduled");
        let future = self.download_future(&segment, delay);
        Some(DownloadJob { segment, future })
    }

    /// An ended playlist will never fill a gap: jump to the next known
    /// segment or give up.
    fn skip_gap_in_ended_playlist(&mut self) {
        let next = self.cursor.next_sequence();
        let following = self
            .document
            .segments()
            .map(|segment| segment.sequence_number)
            .find(|sequence| next.is_none_or(|next| *sequence > next));
        match following {
            Some(sequence) => {
                warn!(from = ?next, to = sequence, "Skipping missing segments in ended playlist");
                self.cursor.seek(sequence);
            }
            None => self.exhausted = true,
        }
    }

    fn download_future(&self, segment: &Segment, delay: Duration) -> DownloadFuture {
        let url = match resolve_uri(&self.playlist_url, &segment.file_uri) {
            Ok(url) => url,
            Err(err) => return Box::pin(async move { Err(err) }),
        };
        let name = segment_file_name(segment.sequence_number, &segment.file_uri);
        let transport = Arc::clone(&self.transport);
        let store = Arc::clone(&self.store);
        let retry = self.config.retry.clone();
        let token = self.token.clone();

        Box::pin(async move {
            tokio::time::sleep(delay).await;
            let data = retry_with_backoff(&retry, &token, |_| {
                let transport = Arc::clone(&transport);
                let url = url.clone();
                async move { RetryAction::from(transport.fetch_segment(&url).await) }
            })
            .await?;
            store.store(&name, data).await
        })
    }

    async fn on_download(&mut self, segment: Segment, result: Result<PathBuf, HlsError>) {
        let sequence = segment.sequence_number;
        match result {
            Ok(path) => {
                debug!(sequence, path = %path.display(), "Segment downloaded");
                self.cache.insert(CachedSegment {
                    sequence_number: sequence,
                    local_path: path.clone(),
                    segment: segment.clone(),
                });
                self.emit(EngineEvent::SegmentDownloaded { sequence, path });
                self.evict_after_download(sequence).await;
                self.waiters.resolve_ready(&self.cache);
                self.last_downloaded = Some(segment);
            }
            Err(HlsError::Cancelled) => {}
            Err(err) => {
                warn!(sequence, uri = %segment.file_uri, error = %err, "Skipping segment");
                self.emit(EngineEvent::SegmentSkipped {
                    sequence,
                    reason: err.to_string(),
                });
            }
        }
        // The cursor is past everything below this.
        self.document.discard_before(sequence);
    }

    async fn evict_after_download(&mut self, downloaded: u64) {
        let bound = match self.config.retention {
            RetentionPolicy::Unlimited => None,
            RetentionPolicy::DownloadWindow { keep } => downloaded.checked_sub(keep),
            RetentionPolicy::PlaybackWindow { keep } => downloaded
                .checked_sub(keep)
                .zip(self.last_consumed.and_then(|c| c.checked_sub(keep)))
                .map(|(window, consumed)| window.min(consumed)),
        };
        if let Some(bound) = bound {
            self.evict_through(bound).await;
        }
    }

    async fn evict_through(&mut self, sequence: u64) {
        for cached in self.cache.evict_through(sequence) {
            if let Err(err) = self.store.remove(&cached.local_path).await {
                warn!(
                    sequence = cached.sequence_number,
                    path = %cached.local_path.display(),
                    error = %err,
                    "Failed to remove evicted segment"
                );
            }
            debug!(sequence = cached.sequence_number, "Segment evicted");
            self.emit(EngineEvent::SegmentEvicted {
                sequence: cached.sequence_number,
            });
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::GetSegment { sequence, reply } => {
                if let Some(cached) = self.cache.lookup(sequence) {
                    if cached.sequence_number != sequence {
                        debug!(
                            requested = sequence,
                            served = cached.sequence_number,
                            "Serving next available segment"
                        );
                    }
                    let _ = reply.send(Ok(ReadySegment::from(cached)));
                } else if self.finished {
                    let _ = reply.send(Err(HlsError::EndOfStream));
                } else {
                    debug!(sequence, cached = self.cache.len(), "Waiting for segment");
                    self.waiters.register(sequence, reply);
                }
            }
            Command::NotifyConsumed { sequence } => {
                let consumed = self.last_consumed.map_or(sequence, |c| c.max(sequence));
                self.last_consumed = Some(consumed);
                trace!(sequence, consumed, "Consumer progress");
                if let RetentionPolicy::PlaybackWindow { keep } = self.config.retention
                    && let Some(bound) = consumed.checked_sub(keep)
                {
                    self.evict_through(bound).await;
                }
            }
        }
    }

    fn finish(&mut self) {
        self.set_phase(EnginePhase::Draining);
        self.waiters.resolve_ready(&self.cache);
        self.waiters.fail_all(HlsError::EndOfStream);
        info!(cached = self.cache.len(), "End of stream reached");
        self.emit(EngineEvent::EndOfStream);
        self.finished = true;
        self.set_phase(EnginePhase::Stopped);
    }

    async fn shutdown(mut self) {
        self.waiters.fail_all(HlsError::Stopped);
        if self.config.cleanup_on_stop {
            let cached = self.cache.drain();
            let count = cached.len();
            for entry in cached {
                if let Err(err) = self.store.remove(&entry.local_path).await {
                    warn!(
                        path = %entry.local_path.display(),
                        error = %err,
                        "Failed to remove cached segment"
                    );
                }
            }
            debug!(count, "Removed cached segments");
        }
        self.set_phase(EnginePhase::Stopped);
        info!("Fetch engine stopped");
    }
}
