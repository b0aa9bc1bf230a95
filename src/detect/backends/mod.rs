pub mod stub;

pub use stub::{StubBackend, StubResponse};
