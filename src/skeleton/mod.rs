//! 骨骼层级 - 主/从两套手部骨架的位姿查询
//!
//! 核心设计思想：
//! - PoseSource: 宿主引擎提供的变换查询能力（主骨架、从骨架各一份）
//! - SkeletonNode: 单个节点，类似 nphysics MultibodyLink
//! - Skeleton: 节点 arena，管理父子关系并实现 PoseSource

mod node;
mod node_set;

pub use node::SkeletonNode;
pub use node_set::Skeleton;

use glam::{Quat, Vec3};

// ============================================================================
// 公共类型定义
// ============================================================================

/// 层级节点标识（arena 索引）
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

/// 位姿（位置 + 旋转）
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

impl Pose {
    #[inline]
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }
}

// ============================================================================
// 位姿查询能力
// ============================================================================

/// 变换/位姿查询能力
///
/// 由宿主提供，重定向核心只读不写。未知节点一律返回 `None`。
pub trait PoseSource {
    /// 节点名称
    fn name(&self, node: NodeId) -> Option<&str>;

    /// 父节点
    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// 直接子节点（按层级顺序）
    fn children(&self, node: NodeId) -> &[NodeId];

    /// 世界空间位姿
    fn world_pose(&self, node: NodeId) -> Option<Pose>;

    /// 相对父节点的局部旋转
    fn local_rotation(&self, node: NodeId) -> Option<Quat>;

    /// 世界位置
    fn world_position(&self, node: NodeId) -> Option<Vec3> {
        self.world_pose(node).map(|p| p.position)
    }

    /// 在 `from` 的后代中按名称深度优先查找（不含 `from` 自身）
    fn find_child_recursive(&self, from: NodeId, name: &str) -> Option<NodeId> {
        for &child in self.children(from) {
            if self.name(child) == Some(name) {
                return Some(child);
            }
            if let Some(found) = self.find_child_recursive(child, name) {
                return Some(found);
            }
        }
        None
    }

    /// 以 `node` 为根的子树（含自身，先序）
    fn subtree(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(n) = stack.pop() {
            out.push(n);
            // 逆序压栈以保持先序
            stack.extend(self.children(n).iter().rev().copied());
        }
        out
    }
}
