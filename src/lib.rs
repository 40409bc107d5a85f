use config::Config;
use tracker::UserTracker;

pub mod admission;
pub mod config;
pub mod database;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod tracker;
pub mod utils;

#[derive(Clone)]
pub struct AppState {
    pub tracker: UserTracker,
    pub config: Config,
}
