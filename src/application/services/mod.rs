pub mod lease_mutex;
pub mod resource_store;
pub mod upload_orchestrator;

pub use lease_mutex::{LeaseGuard, LeaseMutex, RenewalOutcome};
pub use resource_store::ResourceStore;
pub use upload_orchestrator::{UploadOrchestrator, UploadReport};
