pub mod atomic_metrics;
pub mod auth_transport;
pub mod clock;
pub mod fallback_store;
pub mod payment_monitor;
pub mod risk_evaluator;
pub mod session_manager;
pub mod telemetry_client;
pub mod token;

pub use auth_transport::{AuthTransport, GraphqlAuthTransport};
pub use clock::{Clock, ManualClock, SystemClock};
pub use fallback_store::{FallbackStore, FileFallbackStore, MemoryFallbackStore};
pub use payment_monitor::{FlushSummary, PaymentMonitor};
pub use session_manager::SessionManager;
pub use telemetry_client::{HttpTelemetrySink, TelemetrySink};
