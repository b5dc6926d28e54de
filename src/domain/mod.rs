//! Domain layer: device identity, samples, and the per-session store.
//!
//! Nothing here is shared between sessions. Each connection builds its own
//! [`DeviceStore`] from the configured seed and drops it on teardown.

pub mod device_id;
pub mod device_sample;
pub mod device_store;
pub mod session_id;

pub use device_id::DeviceId;
pub use device_sample::DeviceSample;
pub use device_store::DeviceStore;
pub use session_id::SessionId;
