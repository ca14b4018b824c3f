//! Reading one page from an ordered event sequence.

use chrono::{DateTime, Utc};
use futures_util::{Stream, TryStreamExt};

use crate::core::RDFEvent;
use crate::Result;

/// Events of one page and whether the source ran dry while filling it.
#[derive(Debug, Clone)]
pub struct Page {
    pub events: Vec<RDFEvent>,
    pub exhausted: bool,
}

impl Page {
    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.events.last().map(|e| e.timestamp)
    }

    /// Cursor for the following page; `None` once the source is exhausted.
    pub fn next_cursor(&self) -> Option<DateTime<Utc>> {
        if self.exhausted {
            None
        } else {
            self.last_timestamp()
        }
    }
}

/// Read up to `limit` events from `events`, which must yield `timestamp >= since`
/// in ascending order.
///
/// A page never ends inside a group of equal timestamps: once the limit is
/// reached, events sharing the last timestamp are still taken, and the page
/// closes at the first event with a different one. Because every cursor is
/// issued at such a boundary, events stamped exactly `since` were served by the
/// previous page and are skipped here.
pub async fn read_page<S>(mut events: S, since: Option<DateTime<Utc>>, limit: usize) -> Result<Page>
where
    S: Stream<Item = Result<RDFEvent>> + Unpin,
{
    let mut page: Vec<RDFEvent> = Vec::new();

    while let Some(event) = events.try_next().await? {
        if since == Some(event.timestamp) {
            continue;
        }

        if page.len() >= limit {
            if let Some(last) = page.last() {
                if last.timestamp != event.timestamp {
                    return Ok(Page { events: page, exhausted: false });
                }
            }
        }

        page.push(event);
    }

    Ok(Page { events: page, exhausted: true })
}
