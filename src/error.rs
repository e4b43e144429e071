//! 错误类型

use thiserror::Error;

use crate::hand::{HandJointId, JointId};
use crate::physics::{BodyHandle, ColliderHandle};

/// 骨骼在哪一侧层级中缺失
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Hierarchy {
    Master,
    Slave,
}

impl std::fmt::Display for Hierarchy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Hierarchy::Master => f.write_str("master"),
            Hierarchy::Slave => f.write_str("slave"),
        }
    }
}

/// 自动映射错误
#[derive(Debug, Error, PartialEq)]
pub enum MappingError {
    /// 层级中找不到指定名称的骨骼
    #[error("bone '{name}' for {joint:?} not found in {hierarchy} hierarchy")]
    MissingBone {
        joint: HandJointId,
        name: String,
        hierarchy: Hierarchy,
    },
}

/// 物理能力层错误
#[derive(Debug, Error, PartialEq)]
pub enum PhysicsError {
    #[error("unknown rigid body {0:?}")]
    UnknownBody(BodyHandle),

    #[error("unknown collider {0:?}")]
    UnknownCollider(ColliderHandle),

    /// 批量写入时目标数组长度与自由度总数不符
    #[error("drive target count mismatch: articulation has {expected} dofs, got {actual}")]
    DofCountMismatch { expected: usize, actual: usize },
}

/// 每步重定向错误
///
/// 任一前置条件不满足时整步放弃，不会写入任何驱动目标或速度。
#[derive(Debug, Error, PartialEq)]
pub enum RetargetError {
    /// setup 尚未完成（或关节注销后链未重建）
    #[error("hand rig is not configured; run setup before ticking")]
    NotConfigured,

    #[error("joint {0:?} has no master node")]
    MasterUnset(JointId),

    #[error("joint {0:?} has no physics body")]
    BodyMissing(JointId),

    #[error("master node of joint {0:?} cannot be resolved")]
    UnknownMasterNode(JointId),

    #[error("invalid fixed timestep {0}")]
    InvalidTimestep(f32),

    #[error(transparent)]
    Physics(#[from] PhysicsError),
}

/// setup 入口错误
#[derive(Debug, Error, PartialEq)]
pub enum SetupError {
    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Physics(#[from] PhysicsError),

    /// 映射未完成（根关节对不完整或映射中途失败），拒绝配置物理
    #[error("hand rig is not mapped; complete the root pair and finish mapping before configuring")]
    NotMapped,

    /// 从骨架中找不到关节对应的节点
    #[error("slave node of joint {0:?} cannot be resolved")]
    UnknownSlaveNode(JointId),
}

pub type PhysicsResult<T> = Result<T, PhysicsError>;
