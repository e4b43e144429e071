//! 从关节记录

use std::collections::BTreeSet;

use glam::Quat;

use super::{HandJointId, JointId, JointRole};
use crate::physics::{BodyHandle, ColliderHandle};
use crate::skeleton::NodeId;

/// 从关节 - 模拟骨架中追随主节点的受约束刚体
///
/// 静态数据在配置期写入一次：
/// - base_rotation: 初始化时的局部旋转，定义驱动目标的零点
/// - parent / ancestors: 由链构建器推导，层级变化后必须重建
/// - collider / subtree_colliders / exclusions: 碰撞排除
#[derive(Clone, Debug)]
pub struct SlaveJoint {
    /// 从骨架中的节点
    pub node: NodeId,
    /// 语义编号（手动注册的关节可以没有）
    pub hand_joint: Option<HandJointId>,
    pub role: JointRole,
    /// 追随的主节点
    pub(crate) master: Option<NodeId>,

    pub max_linear_velocity: f32,
    pub max_angular_velocity: f32,

    pub(crate) base_rotation: Quat,
    pub(crate) body: Option<BodyHandle>,

    pub(crate) parent: Option<JointId>,
    pub(crate) ancestors: Vec<JointId>,

    pub(crate) collider: Option<ColliderHandle>,
    pub(crate) subtree_colliders: Vec<ColliderHandle>,
    pub(crate) exclusions: BTreeSet<ColliderHandle>,

    // ========== 每步状态 ==========
    pub(crate) position_error: f32,
    pub(crate) diverged: bool,
}

impl SlaveJoint {
    pub fn new(node: NodeId, role: JointRole) -> Self {
        Self {
            node,
            hand_joint: None,
            role,
            master: None,
            max_linear_velocity: 5.0,
            max_angular_velocity: 2.0,
            base_rotation: Quat::IDENTITY,
            body: None,
            parent: None,
            ancestors: Vec::new(),
            collider: None,
            subtree_colliders: Vec::new(),
            exclusions: BTreeSet::new(),
            position_error: 0.0,
            diverged: false,
        }
    }

    pub fn with_hand_joint(node: NodeId, id: HandJointId) -> Self {
        let mut joint = Self::new(node, id.role());
        joint.hand_joint = Some(id);
        joint
    }

    /// 指定该关节自己的速度上限
    pub fn with_velocity_limits(mut self, max_linear: f32, max_angular: f32) -> Self {
        self.max_linear_velocity = max_linear;
        self.max_angular_velocity = max_angular;
        self
    }

    #[inline]
    pub fn master(&self) -> Option<NodeId> {
        self.master
    }

    #[inline]
    pub fn set_master(&mut self, master: NodeId) {
        self.master = Some(master);
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.role == JointRole::Root
    }

    #[inline]
    pub fn base_rotation(&self) -> Quat {
        self.base_rotation
    }

    #[inline]
    pub fn body(&self) -> Option<BodyHandle> {
        self.body
    }

    /// 最近的父关节
    #[inline]
    pub fn parent(&self) -> Option<JointId> {
        self.parent
    }

    /// 祖先关节（由近及远）
    #[inline]
    pub fn ancestors(&self) -> &[JointId] {
        &self.ancestors
    }

    #[inline]
    pub fn collider(&self) -> Option<ColliderHandle> {
        self.collider
    }

    /// 子树（含自身）上的所有碰撞体
    #[inline]
    pub fn subtree_colliders(&self) -> &[ColliderHandle] {
        &self.subtree_colliders
    }

    /// 当前与自身碰撞体互相忽略的碰撞体集合
    #[inline]
    pub fn exclusions(&self) -> &BTreeSet<ColliderHandle> {
        &self.exclusions
    }

    /// 最近一步的位置误差（小于 1e-5 时为 0）
    #[inline]
    pub fn position_error(&self) -> f32 {
        self.position_error
    }

    #[inline]
    pub fn is_diverged(&self) -> bool {
        self.diverged
    }
}
