//! Raw notification handling and event fan-out.

pub mod driver;
pub mod listeners;

pub use driver::{AttributionDriver, DriverSettings, SelfAction};
pub use listeners::{EventFilter, EventListener, ListenerRegistry};
