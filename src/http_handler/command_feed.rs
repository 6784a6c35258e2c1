use super::flight_server::HttpFlightServer;
use crate::command::{Command, LockedCommandBuffer};
use crate::{error, event, info, warn};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(serde::Deserialize)]
struct CommandBatch {
    commands: Vec<serde_json::Value>,
}

/// Server-sent event stream delivering newly dispatched commands of one flight.
pub struct CommandFeed {
    inbox: Arc<LockedCommandBuffer>,
    flight_id: Uuid,
}

impl CommandFeed {
    pub const EVENT_NAME: &'static str = "command.new";

    pub(crate) fn new(inbox: Arc<LockedCommandBuffer>, flight_id: Uuid) -> Self { Self { inbox, flight_id } }

    /// Parses one `command.new` payload and queues its commands as received.
    /// Commands that fail to parse are skipped. Returns how many were queued.
    pub(crate) fn accept(&self, data: &str, now: DateTime<Utc>) -> usize {
        let batch: CommandBatch = match serde_json::from_str(data) {
            Ok(batch) => batch,
            Err(e) => {
                warn!("Unparsable command event: {e}");
                return 0;
            }
        };
        let commands: Vec<Command> = batch
            .commands
            .into_iter()
            .filter_map(|raw| match serde_json::from_value::<Command>(raw) {
                Ok(mut c) => {
                    c.mark_received(now);
                    Some(c)
                }
                Err(e) => {
                    warn!("Skipping malformed command: {e}");
                    None
                }
            })
            .collect();
        let count = commands.len();
        self.inbox.extend(commands);
        count
    }

    /// Follows the stream until `cancel` fires. Reconnects are handled by the
    /// event source itself.
    pub async fn run(self, server: &HttpFlightServer, cancel: CancellationToken) {
        let client = server.client();
        let url = format!("{}/command/subscribe/{}", client.url(), self.flight_id);
        let mut source = match EventSource::new(client.client().get(url)) {
            Ok(source) => source,
            Err(e) => {
                error!("Cannot open command stream: {e}");
                return;
            }
        };
        loop {
            let next = tokio::select! {
                () = cancel.cancelled() => break,
                next = source.next() => next,
            };
            match next {
                None => break,
                Some(Ok(Event::Open)) => info!("Command stream for flight {} open.", self.flight_id),
                Some(Ok(Event::Message(msg))) if msg.event == Self::EVENT_NAME => {
                    let count = self.accept(&msg.data, Utc::now());
                    event!("Received {count} commands.");
                }
                Some(Ok(Event::Message(msg))) => event!("Ignoring stream event {}.", msg.event),
                Some(Err(e)) => warn!("Command stream error: {e}"),
            }
        }
        source.close();
    }
}
