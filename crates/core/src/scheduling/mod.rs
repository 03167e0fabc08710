pub mod request_pool;
pub mod selector;

pub use request_pool::RequestPool;
pub use selector::{Selector, nearby_eligible};
