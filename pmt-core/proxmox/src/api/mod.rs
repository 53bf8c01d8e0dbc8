//! 按资源分组的 API 接口

pub mod cluster;
pub mod node;
pub mod storage;
pub mod vm;

pub use cluster::ClusterApi;
pub use node::NodeApi;
pub use storage::StorageApi;
pub use vm::VmApi;
