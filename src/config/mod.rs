//! Layered application settings

mod settings;

pub use settings::{ApiConfig, ApproverSettings, ControllerConfig, GeneralConfig, Settings, StoreConfig};
