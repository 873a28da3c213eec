pub mod bucket_registry;
pub mod dispatcher;
pub mod error;
pub mod service_registry;
pub mod token_bucket;

pub use bucket_registry::BucketRegistry;
pub use dispatcher::{ClientContext, Dispatcher};
pub use error::GatewayError;
pub use service_registry::{ServiceRegistry, ServiceTarget};
pub use token_bucket::TokenBucket;
