// Start-up playlist resolution: root fetch, variant descent and URI joining.

use crate::config::HlsConfig;
use crate::error::HlsError;
use crate::events::EnginePhase;
use crate::retry::{RetryAction, retry_with_backoff};
use crate::transport::Transport;
use m3u8_playlist::PlaylistDocument;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

/// A media playlist ready to stream from.
#[derive(Debug)]
pub(crate) struct MediaPlaylist {
    pub url: Url,
    pub document: PlaylistDocument,
}

/// Resolves a playlist or segment URI against the playlist it appeared in.
pub fn resolve_uri(base: &Url, uri: &str) -> Result<Url, HlsError> {
    base.join(uri)
        .map_err(|e| HlsError::invalid_url(uri, e.to_string()))
}

pub(crate) async fn fetch_document(
    transport: &dyn Transport,
    url: &Url,
    config: &HlsConfig,
    token: &CancellationToken,
) -> Result<PlaylistDocument, HlsError> {
    debug!(url = %url, "Fetching playlist");
    let content = retry_with_backoff(&config.retry, token, |_| async move {
        RetryAction::from(transport.fetch_playlist(url).await)
    })
    .await?;
    Ok(PlaylistDocument::parse(content)?)
}

/// Loads `root`, descending one level if it is a master playlist.
pub(crate) async fn load_media_playlist(
    transport: &dyn Transport,
    root: Url,
    config: &HlsConfig,
    token: &CancellationToken,
    phase: &watch::Sender<EnginePhase>,
) -> Result<MediaPlaylist, HlsError> {
    phase.send_replace(EnginePhase::Loading);
    let document = fetch_document(transport, &root, config, token).await?;
    if !document.is_master() {
        return Ok(MediaPlaylist {
            url: root,
            document,
        });
    }

    let variant =
        document.select_variant_with(config.preferred_bitrate, config.variant_selection)?;
    let variant_url = resolve_uri(&root, &variant.uri)?;
    info!(
        bandwidth = variant.bandwidth,
        preferred = config.preferred_bitrate,
        url = %variant_url,
        "Selected variant"
    );
    phase.send_replace(EnginePhase::MasterSelected);

    phase.send_replace(EnginePhase::Loading);
    let media = fetch_document(transport, &variant_url, config, token).await?;
    if media.is_master() {
        return Err(HlsError::unsupported_playlist(format!(
            "variant {variant_url} is itself a master playlist"
        )));
    }
    Ok(MediaPlaylist {
        url: variant_url,
        document: media,
    })
}
