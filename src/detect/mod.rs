mod backend;
mod backends;
mod registry;
mod result;

pub use backend::DetectorBackend;
pub use backends::{StubBackend, StubResponse};
pub use registry::{DetectorRegistry, SharedDetector};
pub use result::Detection;
