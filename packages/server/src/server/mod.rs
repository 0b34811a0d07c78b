// HTTP surface: the search API over the persisted corpus

pub mod app;
pub mod routes;

pub use app::{build_app, AppState};
