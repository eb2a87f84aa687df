pub mod methods;
pub mod session;
pub mod transform;

pub use methods::{ArtifactScorer, AxisView, Method, default_method, find_method, methods};
pub use session::Analysis;
