// Pending `get_segment` requests that the cache could not serve yet.

use crate::cache::{ReadySegment, SegmentCache};
use crate::config::WaiterMode;
use crate::error::HlsError;
use std::collections::BTreeMap;
use tokio::sync::oneshot;
use tracing::{debug, trace};

pub(crate) type Reply = oneshot::Sender<Result<ReadySegment, HlsError>>;

#[derive(Debug)]
pub(crate) enum WaiterRegistry {
    PerRequest(BTreeMap<u64, Vec<Reply>>),
    SingleCursor(Option<(u64, Reply)>),
}

impl WaiterRegistry {
    pub fn new(mode: WaiterMode) -> Self {
        match mode {
            WaiterMode::PerRequest => Self::PerRequest(BTreeMap::new()),
            WaiterMode::SingleCursor => Self::SingleCursor(None),
        }
    }

    pub fn register(&mut self, sequence: u64, reply: Reply) {
        match self {
            Self::PerRequest(waiters) => {
                waiters.entry(sequence).or_default().push(reply);
            }
            Self::SingleCursor(slot) => {
                if let Some((previous, superseded)) = slot.replace((sequence, reply)) {
                    debug!(previous, sequence, "Waiter superseded");
                    let _ = superseded.send(Err(HlsError::WaiterSuperseded));
                }
            }
        }
        trace!(sequence, pending = self.len(), "Waiter registered");
    }

    /// Hands a cached segment to every waiter that can now be served.
    /// Returns how many were resolved.
    pub fn resolve_ready(&mut self, cache: &SegmentCache) -> usize {
        match self {
            Self::PerRequest(waiters) => {
                let mut resolved = 0;
                while let Some(entry) = waiters.first_entry() {
                    let Some(cached) = cache.lookup(*entry.key()) else {
                        // Keys are ordered; nothing larger can be served either.
                        break;
                    };
                    let ready = ReadySegment::from(cached);
                    for reply in entry.remove() {
                        let _ = reply.send(Ok(ready.clone()));
                        resolved += 1;
                    }
                }
                resolved
            }
            Self::SingleCursor(slot) => {
                let Some(cached) = slot.as_ref().and_then(|(seq, _)| cache.lookup(*seq)) else {
                    return 0;
                };
                let ready = ReadySegment::from(cached);
                match slot.take() {
                    Some((_, reply)) => {
                        let _ = reply.send(Ok(ready));
                        1
                    }
                    None => 0,
                }
            }
        }
    }

    pub fn fail_all(&mut self, err: HlsError) {
        let pending = self.len();
        match self {
            Self::PerRequest(waiters) => {
                for reply in std::mem::take(waiters).into_values().flatten() {
                    let _ = reply.send(Err(err.clone()));
                }
            }
            Self::SingleCursor(slot) => {
                if let Some((_, reply)) = slot.take() {
                    let _ = reply.send(Err(err));
                }
            }
        }
        if pending > 0 {
            debug!(pending, "Failed pending waiters");
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::PerRequest(waiters) => waiters.values().map(Vec::len).sum(),
            Self::SingleCursor(slot) => usize::from(slot.is_some()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachedSegment;
    use m3u8_playlist::Segment;
    use std::path::PathBuf;

    fn cache_of(sequences: &[u64]) -> SegmentCache {
        let mut cache = SegmentCache::default();
        for &sequence in sequences {
            cache.insert(CachedSegment {
                sequence_number: sequence,
                local_path: PathBuf::from(format!("{sequence}.ts")),
                segment: Segment {
                    sequence_number: sequence,
                    file_uri: format!("{sequence}.ts"),
                    duration_seconds: 2.0,
                    title: String::new(),
                    discontinuity: false,
                    is_last_in_stream: false,
                },
            });
        }
        cache
    }

    #[test]
    fn per_request_waiters_resolve_independently() {
        let mut registry = WaiterRegistry::new(WaiterMode::PerRequest);
        let (tx_a, mut rx_a) = oneshot::channel();
        let (tx_b, mut rx_b) = oneshot::channel();
        let (tx_c, mut rx_c) = oneshot::channel();
        registry.register(5, tx_a);
        registry.register(5, tx_b);
        registry.register(9, tx_c);

        assert_eq!(registry.resolve_ready(&cache_of(&[6])), 2);
        assert_eq!(rx_a.try_recv().unwrap().unwrap().sequence_number, 6);
        assert_eq!(rx_b.try_recv().unwrap().unwrap().sequence_number, 6);
        assert!(rx_c.try_recv().is_err());
        assert_eq!(registry.len(), 1);

        assert_eq!(registry.resolve_ready(&cache_of(&[6, 9])), 1);
        assert_eq!(rx_c.try_recv().unwrap().unwrap().sequence_number, 9);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn single_cursor_supersedes_previous_waiter() {
        let mut registry = WaiterRegistry::new(WaiterMode::SingleCursor);
        let (tx_old, mut rx_old) = oneshot::channel();
        let (tx_new, mut rx_new) = oneshot::channel();
        registry.register(1, tx_old);
        registry.register(2, tx_new);

        assert!(matches!(
            rx_old.try_recv().unwrap(),
            Err(HlsError::WaiterSuperseded)
        ));
        assert_eq!(registry.resolve_ready(&cache_of(&[1])), 0);
        assert_eq!(registry.resolve_ready(&cache_of(&[2])), 1);
        assert_eq!(rx_new.try_recv().unwrap().unwrap().sequence_number, 2);
    }

    #[test]
    fn fail_all_settles_everyone() {
        let mut registry = WaiterRegistry::new(WaiterMode::PerRequest);
        let (tx_a, mut rx_a) = oneshot::channel();
        let (tx_b, mut rx_b) = oneshot::channel();
        registry.register(1, tx_a);
        registry.register(2, tx_b);
        registry.fail_all(HlsError::EndOfStream);
        assert!(matches!(rx_a.try_recv().unwrap(), Err(HlsError::EndOfStream)));
        assert!(matches!(rx_b.try_recv().unwrap(), Err(HlsError::EndOfStream)));
        assert_eq!(registry.len(), 0);
    }
}
