use crate::command::LockedCommandBuffer;
use crate::http_handler::FlightServer;
use crate::{event, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Posts completed commands back to the server.
///
/// Delivery is best effort: a batch that fails to send is logged and
/// dropped.
pub struct CommandReporter {
    server: Arc<dyn FlightServer>,
    flight_id: Uuid,
    reports: Arc<LockedCommandBuffer>,
}

impl CommandReporter {
    pub const REPORT_PERIOD: Duration = Duration::from_millis(500);

    pub(crate) fn new(server: Arc<dyn FlightServer>, flight_id: Uuid, reports: Arc<LockedCommandBuffer>) -> Self {
        Self { server, flight_id, reports }
    }

    /// Sends everything queued so far. Returns the number of commands in
    /// the batch, sent or not.
    pub async fn report_once(&self) -> usize {
        let batch = self.reports.swap();
        if batch.is_empty() {
            return 0;
        }
        match self.server.report_command_responses(self.flight_id, &batch).await {
            Ok(()) => event!("Reported {} command responses.", batch.len()),
            Err(e) => warn!("Dropping {} command responses: {e}", batch.len()),
        }
        batch.len()
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(Self::REPORT_PERIOD);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            self.report_once().await;
        }
        // last responses of a shutdown still go out
        self.report_once().await;
    }
}
