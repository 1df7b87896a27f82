//! Local HTTP control surface for a GUI host: triggers in, polled view state out.

mod handlers;
mod models;
mod state;

pub use handlers::run_server;
