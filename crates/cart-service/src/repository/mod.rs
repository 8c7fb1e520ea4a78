//! 购物车仓储层
//!
//! 封装 carts 表的 SQL 操作，并提供内存实现用于测试和本地开发。
//!
//! ## 设计原则
//!
//! - 仓储只负责数据持久化，不包含消息解析逻辑
//! - 使用 SQLx 进行数据库操作
//! - 定义 trait 接口以支持 mock 测试

mod cart_repo;
mod memory;
mod traits;

pub use cart_repo::CartRepository;
pub use memory::InMemoryCartRepository;
pub use traits::*;
