use futures_util::{Stream, StreamExt};
use memoh_core::error::Result;
use memoh_core::StreamEvent;
use tracing::warn;

use crate::channel::ChannelAdapter;
use crate::types::StreamTarget;

/// Implements §4.6's per-inbound-message flow, steps 2-5. Step 1
/// (translating the platform payload into a `ChatRequest`) happens in the
/// caller, which is the only party that knows the platform's wire shape.
pub async fn drive_stream<S>(adapter: &dyn ChannelAdapter, target: StreamTarget, events: S)
where
    S: Stream<Item = Result<StreamEvent>> + Unpin,
{
    if let Err(e) = adapter.processing_started(&target).await {
        warn!(channel = adapter.name(), error = %e, "processing_started failed");
    }

    let mut stream = match adapter.open_stream(target.clone()).await {
        Ok(s) => s,
        Err(e) => {
            warn!(channel = adapter.name(), error = %e, "open_stream failed");
            let _ = adapter.processing_failed(&target, &e).await;
            return;
        }
    };

    let mut events = Box::pin(events);
    let mut failure = None;

    while let Some(event) = events.next().await {
        match event {
            Ok(evt) => {
                if let Err(e) = stream.forward(&evt).await {
                    warn!(channel = adapter.name(), error = %e, "forward failed");
                }
            }
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }

    match failure {
        Some(e) => {
            let _ = adapter.processing_failed(&target, &e).await;
        }
        None => {
            let _ = adapter.processing_completed(&target).await;
        }
    }
    let _ = stream.close().await;
}
