//! Small shared helpers: clocks, panic payloads and tracing setup.

pub mod clock;
pub mod panic;
pub mod telemetry;

pub use clock::*;
pub use panic::panic_message;
pub use telemetry::*;
