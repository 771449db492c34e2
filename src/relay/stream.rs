//! Streamed body relay for both legs.

use std::time::Duration;

use axum::body::Body;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::sync::watch;

use crate::relay::error::RelayError;
use crate::relay::upstream::BodyStream;

struct BodyRelay {
    body: BodyStream,
    target: String,
    bytes: u64,
}

/// Forward upstream body chunks as they arrive.
///
/// With an idle limit, a chunk that takes longer than the limit ends the
/// stream with [`RelayError::IdleTimeout`]. Any error ends the stream, which
/// truncates the downstream response; nothing is retried or synthesized.
/// Dropping the returned stream drops the upstream body and its connection.
pub fn relay_body(
    body: BodyStream,
    idle: Option<Duration>,
    target: String,
) -> impl Stream<Item = Result<Bytes, RelayError>> + Send + 'static {
    let state = BodyRelay {
        body,
        target,
        bytes: 0,
    };

    futures_util::stream::unfold(Some(state), move |state| async move {
        let mut state = state?;

        let next = match idle {
            Some(limit) => match tokio::time::timeout(limit, state.body.next()).await {
                Ok(next) => next,
                Err(_) => Some(Err(RelayError::IdleTimeout(limit))),
            },
            None => state.body.next().await,
        };

        match next {
            Some(Ok(chunk)) => {
                state.bytes += chunk.len() as u64;
                Some((Ok(chunk), Some(state)))
            }
            Some(Err(err)) => {
                tracing::warn!(
                    target_url = %state.target,
                    bytes_relayed = state.bytes,
                    category = err.category(),
                    error = %err,
                    "Response body relay failed; downstream response truncated"
                );
                Some((Err(err), None))
            }
            None => {
                tracing::debug!(
                    target_url = %state.target,
                    bytes_relayed = state.bytes,
                    "Response body relayed"
                );
                None
            }
        }
    })
}

/// Stream the inbound request body upstream.
///
/// Every chunk handed to the upstream ticks `progress`. The sender is
/// dropped once the body is exhausted, which closes the channel.
pub fn upload_body(
    body: Body,
    progress: watch::Sender<()>,
) -> impl Stream<Item = Result<Bytes, axum::Error>> + Send + 'static {
    futures_util::stream::unfold(
        Some((body.into_data_stream(), progress)),
        |state| async move {
            let (mut body, progress) = state?;
            match body.next().await {
                Some(Ok(chunk)) => {
                    progress.send_replace(());
                    Some((Ok(chunk), Some((body, progress))))
                }
                Some(Err(err)) => Some((Err(err), None)),
                None => None,
            }
        },
    )
}

/// Resolves when the upstream has gone `limit` without showing progress.
///
/// While the request body is uploading, the clock restarts on every chunk.
/// After the upload finishes, or for a request without a body, the upstream
/// gets `limit` to answer.
pub async fn response_deadline(limit: Duration, progress: Option<watch::Receiver<()>>) {
    if let Some(mut progress) = progress {
        loop {
            match tokio::time::timeout(limit, progress.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) => break,
                Err(_) => return,
            }
        }
    }
    tokio::time::sleep(limit).await;
}
