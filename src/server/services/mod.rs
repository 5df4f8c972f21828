pub mod dlhd_services;
pub mod edge_services;
pub mod manifest_services;
pub mod proxy_pool_services;
pub mod transport_services;

pub use dlhd_services::DynDlhdService;
pub use manifest_services::DynManifestService;
pub use proxy_pool_services::DynProxyPool;
pub use transport_services::{DynHttpExecutor, DynTransportClient};
