mod command_reporter;
mod flight_executor;

#[cfg(test)]
mod tests;

pub use command_reporter::CommandReporter;
pub use flight_executor::FlightExecutor;
