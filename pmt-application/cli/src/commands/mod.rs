//! CLI 命令实现

pub mod cluster;
