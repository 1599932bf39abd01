// Sequential playback cursor: pulls segments in order from the engine and
// acknowledges each one once it has been handed to the output.

use crate::error::Result;
use hls_fetcher::{EngineHandle, HlsError, ReadySegment};
use std::io::Write;
use tracing::{debug, info, warn};

pub struct Player<W> {
    handle: EngineHandle,
    output: W,
    realtime: bool,
}

impl<W: Write> Player<W> {
    pub fn new(handle: EngineHandle, output: W, realtime: bool) -> Self {
        Self {
            handle,
            output,
            realtime,
        }
    }

    /// Plays from `first` until the end of the stream. Returns the number of
    /// segments played.
    pub async fn run(&mut self, first: ReadySegment) -> Result<u64> {
        let mut current = first;
        let mut played = 0u64;
        loop {
            self.play(&current).await?;
            played += 1;
            self.handle.notify_consumed(current.sequence_number);

            let wanted = current.sequence_number + 1;
            current = match self.handle.get_segment(wanted).await {
                Ok(next) => next,
                Err(HlsError::EndOfStream) => {
                    info!(played, "Playback finished");
                    return Ok(played);
                }
                Err(err) => return Err(err.into()),
            };
            if current.sequence_number != wanted {
                warn!(
                    wanted,
                    got = current.sequence_number,
                    "Segments missing, skipping ahead"
                );
            }
        }
    }

    async fn play(&mut self, segment: &ReadySegment) -> Result<()> {
        if segment.segment.discontinuity {
            debug!(sequence = segment.sequence_number, "Discontinuity");
        }
        writeln!(self.output, "{}", segment.path.display())?;
        self.output.flush()?;
        if self.realtime {
            tokio::time::sleep(segment.segment.duration()).await;
        }
        Ok(())
    }
}
