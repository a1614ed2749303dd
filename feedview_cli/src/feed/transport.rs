//! Network side of a feed session
//!
//! The session never awaits I/O. It hands requests to a `FeedTransport`, and
//! results come back as `FeedEvent`s on the dispatch channel.

use super::backfill::{BackfillFetcher, BackfillPage, BackfillRequest};
use super::live::{LiveEvent, LiveFeedSubscriber, LiveRequest};
use anyhow::Result;
use feedview_common::FeedError;
use tokio::sync::mpsc;

/// Capacity of the dispatch channel
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Inbound events consumed by the dispatch loop
#[derive(Debug)]
pub enum FeedEvent {
    /// Something happened on live connection `generation`
    Live { generation: u64, event: LiveEvent },
    /// A backfill request issued during `epoch` completed
    Backfill {
        epoch: u64,
        result: Result<BackfillPage, FeedError>,
    },
}

/// I/O capabilities a session drives
pub trait FeedTransport {
    /// Open the live connection, replacing any current one
    fn open_live(&mut self, request: LiveRequest);

    /// Close the live connection
    fn close_live(&mut self);

    /// Start one backfill request; its result arrives as `FeedEvent::Backfill`
    fn fetch_older(&mut self, request: BackfillRequest);
}

/// Transport backed by the capture backend's WebSocket and HTTP endpoints
pub struct NetworkTransport {
    live: LiveFeedSubscriber,
    backfill: BackfillFetcher,
    events: mpsc::Sender<FeedEvent>,
}

impl NetworkTransport {
    pub fn new(server_url: &str, ws_url: &str, events: mpsc::Sender<FeedEvent>) -> Result<Self> {
        let live = LiveFeedSubscriber::new(ws_url, events.clone());
        let backfill = BackfillFetcher::new(server_url)?;
        tracing::debug!("Live feed at {}, backfill at {}", live.url(), backfill.url());

        Ok(Self {
            live,
            backfill,
            events,
        })
    }
}

impl FeedTransport for NetworkTransport {
    fn open_live(&mut self, request: LiveRequest) {
        self.live.open(request);
    }

    fn close_live(&mut self) {
        if self.live.is_open() {
            tracing::debug!("Closing live feed");
        }
        self.live.close();
    }

    fn fetch_older(&mut self, request: BackfillRequest) {
        let fetcher = self.backfill.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            let result = fetcher.fetch_older(&request).await;
            let _ = events
                .send(FeedEvent::Backfill {
                    epoch: request.epoch,
                    result,
                })
                .await;
        });
    }
}
