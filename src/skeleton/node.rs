//! 骨骼节点 - 参考 nphysics MultibodyLink 设计
//!
//! SkeletonNode 是层级中的单个节点。静态数据（名称、父子关系）构建后不变，
//! 动态数据（局部旋转/平移）由宿主每帧写入。

use glam::{Mat4, Quat, Vec3};

use super::Pose;

/// 层级节点 - 类似 nphysics MultibodyLink
///
/// 变换计算：local_to_world = parent.local_to_world * local_to_parent
#[derive(Clone, Debug)]
pub struct SkeletonNode {
    // ========================================
    // 静态数据（初始化后不变）
    // ========================================

    /// 节点名称
    pub name: String,

    /// 父节点索引 (-1 表示根节点)
    pub parent_index: i32,

    // ========================================
    // 动态数据
    // ========================================

    /// 相对父节点的平移
    pub local_translation: Vec3,

    /// 相对父节点的旋转
    pub local_rotation: Quat,

    /// 本地变换矩阵 (local_to_parent)
    pub local_to_parent: Mat4,

    /// 全局变换矩阵 (local_to_world)
    pub local_to_world: Mat4,
}

impl SkeletonNode {
    /// 创建新节点
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent_index: -1,
            local_translation: Vec3::ZERO,
            local_rotation: Quat::IDENTITY,
            local_to_parent: Mat4::IDENTITY,
            local_to_world: Mat4::IDENTITY,
        }
    }

    /// 父节点索引
    #[inline]
    pub fn parent_id(&self) -> Option<usize> {
        if self.parent_index >= 0 {
            Some(self.parent_index as usize)
        } else {
            None
        }
    }

    /// 获取世界位置
    #[inline]
    pub fn position(&self) -> Vec3 {
        self.local_to_world.col(3).truncate()
    }

    /// 获取世界旋转
    #[inline]
    pub fn rotation(&self) -> Quat {
        // 节点没有缩放，直接取旋转部分
        Quat::from_mat4(&self.local_to_world).normalize()
    }

    #[inline]
    pub fn world_pose(&self) -> Pose {
        Pose::new(self.position(), self.rotation())
    }

    /// 计算本地变换 (local_to_parent)
    #[inline]
    pub fn compute_local_transform(&mut self) {
        self.local_to_parent =
            Mat4::from_rotation_translation(self.local_rotation, self.local_translation);
    }
}

impl Default for SkeletonNode {
    fn default() -> Self {
        Self::new(String::new())
    }
}
