//! HTTP API handlers for pva-agg

pub mod companies;
pub mod finders;
pub mod health;
pub mod progress;
pub mod requestor;
pub mod sse;
pub mod violations;

pub use companies::company_routes;
pub use finders::finder_routes;
pub use health::health_routes;
pub use progress::progress_routes;
pub use requestor::Requestor;
pub use sse::event_stream;
pub use violations::violation_routes;
