use crate::command::{Command, CommandKind, LockedCommandBuffer};
use crate::measurement_sink::{MeasurementBuffer, MeasurementsByPart, PartMeasurements};
use crate::rocket::{MeasurementRow, PartError, PartIndex, Rocket, topological_order};
use crate::{error, event, warn};
use chrono::{DateTime, Utc};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// The control loop.
///
/// Owns the rocket and drives every part in dependency order. Everything
/// that depends only on the rocket's structure (execution order, accepted
/// command kinds, sink buffers) is computed once in [`FlightExecutor::new`].
pub struct FlightExecutor {
    rocket: Rocket,
    order: Vec<PartIndex>,
    /// `position[part]` is the slot of `part` in `order`.
    position: Vec<usize>,
    capabilities: Vec<&'static [CommandKind]>,
    sinks: Vec<Arc<MeasurementBuffer>>,
    commands: Arc<LockedCommandBuffer>,
    reports: Arc<LockedCommandBuffer>,
    min_frame_time: Duration,
}

/// Outcome of routing one command to its target.
enum Route {
    To(PartIndex),
    Rejected(String),
}

impl FlightExecutor {
    pub(crate) fn new(
        rocket: Rocket,
        commands: Arc<LockedCommandBuffer>,
        reports: Arc<LockedCommandBuffer>,
        min_frame_time: Duration,
    ) -> Self {
        let order = topological_order(rocket.dependency_graph());
        let mut position = vec![0; rocket.len()];
        for (slot, part) in order.iter().enumerate() {
            position[*part] = slot;
        }
        let capabilities = rocket.parts().map(|(_, part)| part.accepted_commands()).collect();
        let sinks = rocket.parts().filter_map(|(_, part)| part.measurement_buffer()).collect();
        Self { rocket, order, position, capabilities, sinks, commands, reports, min_frame_time }
    }

    pub fn rocket(&self) -> &Rocket { &self.rocket }

    pub fn execution_order(&self) -> &[PartIndex] { &self.order }

    fn route(&self, command: &Command) -> Route {
        let Some(target) = command.part_id() else {
            return Route::Rejected(String::from("Command has no target part"));
        };
        let Some(index) = self.rocket.index_of(target) else {
            return Route::Rejected(format!("Unknown part {target}"));
        };
        if self.capabilities[index].contains(&command.kind()) {
            Route::To(index)
        } else {
            let name = self.rocket.part(index).meta().name();
            Route::Rejected(format!("Part {name} does not accept {}", command.type_tag()))
        }
    }

    /// Runs one pass over all parts.
    pub fn run_tick(&mut self, now: DateTime<Utc>, iteration: u64) {
        let mut routed: Vec<Vec<Command>> = (0..self.rocket.len()).map(|_| Vec::new()).collect();
        let mut requeue = Vec::new();
        let mut finished = Vec::new();

        for c in self.commands.swap() {
            self.dispatch(c, now, None, &mut routed, &mut requeue, &mut finished);
        }

        for slot in 0..self.order.len() {
            let index = self.order[slot];
            let mut commands = std::mem::take(&mut routed[index]);
            let part = self.rocket.part_mut(index);
            if commands.is_empty() && !part.meta().update_due(now) {
                continue;
            }
            let outcome = isolate(|| part.update(&mut commands, now, iteration));
            part.meta_mut().set_last_update(now);
            match outcome {
                Ok(emitted) => {
                    for c in &mut commands {
                        if c.is_fresh() {
                            c.fail("Part did not process the command for an unknown reason", now);
                        }
                    }
                    for mut c in emitted {
                        c.set_create_time(now);
                        c.set_issuer(index);
                        self.dispatch(c, now, Some(slot), &mut routed, &mut requeue, &mut finished);
                    }
                }
                Err(e) => error!("Part {} failed to update: {e}", self.rocket.part(index).meta().name()),
            }
            for c in commands {
                if c.is_terminal() { finished.push(c) } else { requeue.push(c) }
            }
        }

        let measurements = self.collect_measurements(now);

        for &index in &self.order {
            let part = self.rocket.part_mut(index);
            if let Err(e) = isolate(|| {
                part.flush();
                Ok(())
            }) {
                error!("Part {} failed to flush: {e}", self.rocket.part(index).meta().name());
            }
        }

        for c in &finished {
            if let Some(issuer) = c.issuer() {
                let part = self.rocket.part_mut(issuer);
                if let Err(e) = isolate(|| {
                    part.on_command_finished(c);
                    Ok(())
                }) {
                    error!("Part {} failed on command completion: {e}", self.rocket.part(issuer).meta().name());
                }
            }
        }
        self.reports.extend(finished);
        self.commands.extend(requeue);

        if !measurements.is_empty() {
            let tick = Arc::new(measurements);
            for sink in &self.sinks {
                sink.push(Arc::clone(&tick));
            }
        }
    }

    /// Routes `command` for this tick. Commands for a part whose turn already
    /// passed (`current` is the slot being updated) wait for the next tick.
    fn dispatch(
        &self,
        mut command: Command,
        now: DateTime<Utc>,
        current: Option<usize>,
        routed: &mut [Vec<Command>],
        requeue: &mut Vec<Command>,
        finished: &mut Vec<Command>,
    ) {
        if command.is_terminal() {
            finished.push(command);
            return;
        }
        match self.route(&command) {
            Route::To(index) if current.is_some_and(|slot| self.position[index] <= slot) => requeue.push(command),
            Route::To(index) => routed[index].push(command),
            Route::Rejected(reason) => {
                warn!("Rejecting {} {}: {reason}", command.type_tag(), command.id());
                command.fail(reason, now);
                finished.push(command);
            }
        }
    }

    fn collect_measurements(&mut self, now: DateTime<Utc>) -> MeasurementsByPart {
        let mut measurements = MeasurementsByPart::new();
        for &index in &self.order {
            let part = self.rocket.part_mut(index);
            if !part.meta().measurement_due(now) {
                continue;
            }
            let start = part.meta().last_measurement().unwrap_or(now);
            let shape = part.measurement_shape();
            let outcome = isolate(|| part.collect_measurements(now));
            part.meta_mut().set_last_measurement(now);
            let rows: Vec<MeasurementRow> = match outcome {
                Ok(rows) => rows,
                Err(e) => {
                    error!("Part {} failed to measure: {e}", part.meta().name());
                    continue;
                }
            };
            let total = rows.len();
            let rows: Vec<MeasurementRow> = rows.into_iter().filter(|r| r.len() <= shape.len()).collect();
            if rows.len() < total {
                warn!(
                    "Dropped {} rows of {} wider than its {} fields.",
                    total - rows.len(),
                    part.meta().name(),
                    shape.len()
                );
            }
            if !rows.is_empty() {
                measurements.push(PartMeasurements { part: index, shape, start, end: now, rows });
            }
        }
        measurements
    }

    /// Ticks until `cancel` fires, keeping at least `min_frame_time` between
    /// tick starts. Late ticks are followed immediately by the next one.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut iteration = 0u64;
        while !cancel.is_cancelled() {
            let started = Instant::now();
            self.run_tick(Utc::now(), iteration);
            iteration += 1;
            let elapsed = started.elapsed();
            match self.min_frame_time.checked_sub(elapsed) {
                Some(rest) if !rest.is_zero() => {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(rest) => {}
                    }
                }
                _ => {
                    event!("Tick {iteration} took {elapsed:?}, frame budget is {:?}.", self.min_frame_time);
                    tokio::task::yield_now().await;
                }
            }
        }
    }
}

/// Runs a part call, turning both errors and panics into a message.
fn isolate<T>(call: impl FnOnce() -> Result<T, PartError>) -> Result<T, String> {
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(payload) => Err(format!("panicked: {}", panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown cause")
}
