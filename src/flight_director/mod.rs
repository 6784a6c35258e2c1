mod director_state;
mod flight_director;


pub use director_state::DirectorState;
pub use flight_director::{DirectorLinks, FlightDirector};
