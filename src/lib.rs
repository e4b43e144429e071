//! 物理驱动的手部重定向
//!
//! 让一条由电机驱动的关节刚体链（从手）追随独立动画/追踪的主手骨架：
//! - skeleton: 层级与位姿查询（PoseSource）
//! - physics: 关节刚体能力层（ArticulationWorld）与配置
//! - hand: 骨骼映射、关节初始化、父链与自碰撞排除
//! - retarget: 每个固定步的驱动目标与速度指令

pub mod error;
pub mod hand;
pub mod physics;
pub mod retarget;
pub mod skeleton;

pub use error::{Hierarchy, MappingError, PhysicsError, RetargetError, SetupError};
pub use hand::{
    DriveProfile, HandDriveProfile, HandJointId, HandRig, Handedness, JointId, JointPair,
    JointRole, RigState, SlaveJoint,
};
pub use physics::{ArticulationWorld, BodyHandle, ColliderHandle, KinematicWorld, RetargetConfig};
pub use retarget::{RootCommand, TickReport};
pub use skeleton::{NodeId, Pose, PoseSource, Skeleton};

#[cfg(feature = "rapier")]
pub use physics::RapierHandWorld;
