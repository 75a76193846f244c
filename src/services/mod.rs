pub mod coordinator;
pub mod registry;
pub mod session;
pub mod storage;
pub mod transfer;
