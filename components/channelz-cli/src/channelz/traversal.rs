//! Cursor traversal engine
//!
//! Every channelz listing is cursor-paginated: the client asks for entities at or above
//! a start id and the server answers with a page plus an `end` marker. [`traverse`]
//! walks such a listing to the end, handing each item to a visitor in server order.
//!
//! Two things vary per listing and are carried explicitly by [`TraversalPolicy`]:
//!
//! - how the cursor advances between pages ([`CursorAdvance`]),
//! - what an RPC failure does to the traversal ([`ErrorPolicy`]).
//!
//! Servers and server sockets advance by one and abort on the first error. Top channels
//! track the highest id seen and retry failed pages with a growing timeout until the
//! command is cancelled.

// Local crates
use crate::channelz::client::ChannelzError;
use crate::models::models::{Identified, Page};

// External crates
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Default base timeout of the retrying top-channel listing.
pub const DEFAULT_RETRY_BASE_TIMEOUT: Duration = Duration::from_secs(5);

/// How the start cursor moves after a page that did not carry `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorAdvance {
    /// `cursor + 1` regardless of the ids returned. Relies on the server filtering by
    /// id threshold over a dense id space.
    Increment,
    /// `max(cursor, highest id seen) + 1`. Tolerates sparse or out of order ids.
    TrackMaxId,
}

impl CursorAdvance {
    fn next(self, cursor: i64, highest_seen: Option<i64>) -> i64 {
        match self {
            Self::Increment => cursor + 1,
            Self::TrackMaxId => highest_seen.map_or(cursor, |id| id.max(cursor)) + 1,
        }
    }
}

/// What a failed page fetch does to the traversal.
#[derive(Debug, Clone)]
pub enum ErrorPolicy {
    /// Propagate the first error and stop.
    Abort,
    /// Re-issue the same page with a timeout of `base * (retries + 1)`, forever, until
    /// `cancel` fires. The token is checked before every attempt.
    RetryWithGrowingTimeout {
        base: Duration,
        cancel: CancellationToken,
    },
}

impl ErrorPolicy {
    /// Per-attempt timeout for the given retry count.
    pub fn attempt_timeout(base: Duration, retries: u32) -> Duration {
        base.saturating_mul(retries.saturating_add(1))
    }
}

#[derive(Debug, Clone)]
pub struct TraversalPolicy {
    pub advance: CursorAdvance,
    pub on_error: ErrorPolicy,
}

impl TraversalPolicy {
    pub fn servers() -> Self {
        Self {
            advance: CursorAdvance::Increment,
            on_error: ErrorPolicy::Abort,
        }
    }

    pub fn server_sockets() -> Self {
        Self {
            advance: CursorAdvance::Increment,
            on_error: ErrorPolicy::Abort,
        }
    }

    pub fn top_channels(base: Duration, cancel: CancellationToken) -> Self {
        Self {
            advance: CursorAdvance::TrackMaxId,
            on_error: ErrorPolicy::RetryWithGrowingTimeout { base, cancel },
        }
    }
}

/// Bookkeeping returned by a finished traversal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraversalSummary {
    pub pages: usize,
    pub items: usize,
    pub retries: u32,
    /// Set when a retrying traversal stopped because its token was cancelled. Items
    /// visited before that point have already been handed to the visitor.
    pub cancelled: bool,
}

/// Walk a paginated listing until the server reports `end`.
///
/// `fetch` receives the start cursor and the per-attempt timeout chosen by the policy.
/// Visitor errors always abort, whatever the policy says about fetch errors.
#[instrument(name = "channelz_traversal::traverse", skip_all, level = "debug")]
pub async fn traverse<E, F, V>(
    policy: &TraversalPolicy,
    mut fetch: F,
    mut visit: V,
) -> Result<TraversalSummary, ChannelzError>
where
    E: Identified,
    F: AsyncFnMut(i64, Option<Duration>) -> Result<Page<E>, ChannelzError>,
    V: AsyncFnMut(E) -> Result<(), ChannelzError>,
{
    let mut summary = TraversalSummary::default();
    let mut cursor: i64 = 0;

    loop {
        let page = match &policy.on_error {
            ErrorPolicy::Abort => fetch(cursor, None).await?,
            ErrorPolicy::RetryWithGrowingTimeout { base, cancel } => {
                if cancel.is_cancelled() {
                    tracing::warn!(
                        cursor,
                        retries = summary.retries,
                        "Traversal cancelled before completion"
                    );
                    summary.cancelled = true;
                    return Ok(summary);
                }

                let limit = ErrorPolicy::attempt_timeout(*base, summary.retries);
                match tokio::time::timeout(limit, fetch(cursor, Some(limit))).await {
                    Ok(Ok(page)) => page,
                    Ok(Err(e)) => {
                        summary.retries += 1;
                        tracing::warn!(
                            error = %e,
                            cursor,
                            attempt_timeout = ?limit,
                            retries = summary.retries,
                            "Page fetch failed, retrying with a longer timeout"
                        );
                        continue;
                    }
                    Err(_) => {
                        summary.retries += 1;
                        tracing::warn!(
                            cursor,
                            attempt_timeout = ?limit,
                            retries = summary.retries,
                            "Page fetch timed out, retrying with a longer timeout"
                        );
                        continue;
                    }
                }
            }
        };

        summary.pages += 1;
        let end = page.end;
        let mut highest_seen: Option<i64> = None;

        for item in page.items {
            let id = item.id();
            highest_seen = Some(highest_seen.map_or(id, |seen| seen.max(id)));
            summary.items += 1;
            visit(item).await?;
        }

        if end {
            break;
        }

        let next = policy.advance.next(cursor, highest_seen);
        tracing::trace!(cursor, next, "Advancing traversal cursor");
        cursor = next;
    }

    tracing::debug!(
        pages = summary.pages,
        items = summary.items,
        retries = summary.retries,
        "Traversal complete"
    );
    Ok(summary)
}
