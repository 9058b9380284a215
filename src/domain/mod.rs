mod dividend;
mod fund;
mod integrity;
mod metrics;

pub use dividend::*;
pub use fund::*;
pub use integrity::*;
pub use metrics::*;
