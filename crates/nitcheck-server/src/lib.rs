pub mod clinics;
pub mod config;
pub mod error;
pub mod events;
pub mod geocode;
pub mod handlers;
pub mod leads;
pub mod middleware;
pub mod observability;
pub mod ratelimit;
pub mod scan;
pub mod seo;
pub mod server;
pub mod state;

pub use config::AppConfig;
pub use error::{ApiError, Issue};
pub use server::{NitcheckServer, ServerBuilder, build_app};
pub use state::AppState;
