pub mod gateway;
pub mod metrics;
pub mod portal_api;

pub use gateway::{ApiGateway, ApiRequest, ApiResponse};
pub use portal_api::PortalApi;
