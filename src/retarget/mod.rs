//! 每步重定向
//!
//! - reduced: 轴角分解、降维坐标、速度指令与钳制（纯函数）
//! - engine: `HandRig::fixed_update`，每个固定步读取主骨架并驱动物理关节

mod engine;
pub mod reduced;

pub use engine::{RootCommand, TickReport};
