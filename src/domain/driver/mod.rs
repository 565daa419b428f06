pub mod driver_mock;
pub mod page_driver;
pub mod session_pool;
