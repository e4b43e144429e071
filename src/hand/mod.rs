//! 手部关节映射与配置
//!
//! - HandJointId: 手部追踪骨骼枚举（与追踪 SDK 的关节编号一致）
//! - JointRegistry: 从关节 arena，父链在配置期预计算
//! - HandRig: 整只手的聚合，持有关节对与驱动配置
//! - mapper / initializer / chain: 配置期的三个步骤

pub mod chain;
pub mod initializer;
mod joint;
pub mod mapper;
mod registry;
mod rig;
pub mod template;

pub use joint::SlaveJoint;
pub use registry::{JointId, JointRegistry};
pub use rig::{HandRig, JointPair, RigState};

// ============================================================================
// 手部关节编号
// ============================================================================

/// 手部追踪骨骼编号
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum HandJointId {
    WristRoot = 0,
    ForearmStub = 1,
    Thumb0 = 2,
    Thumb1 = 3,
    Thumb2 = 4,
    Thumb3 = 5,
    Index1 = 6,
    Index2 = 7,
    Index3 = 8,
    Middle1 = 9,
    Middle2 = 10,
    Middle3 = 11,
    Ring1 = 12,
    Ring2 = 13,
    Ring3 = 14,
    Pinky0 = 15,
    Pinky1 = 16,
    Pinky2 = 17,
    Pinky3 = 18,
    ThumbTip = 19,
    IndexTip = 20,
    MiddleTip = 21,
    RingTip = 22,
    PinkyTip = 23,
}

/// 手指关节数量（Thumb0 ..= Pinky3）
pub const FINGER_JOINT_COUNT: usize =
    HandJointId::Pinky3 as usize - HandJointId::Thumb0 as usize + 1;

impl HandJointId {
    pub const ALL: [HandJointId; 24] = [
        HandJointId::WristRoot,
        HandJointId::ForearmStub,
        HandJointId::Thumb0,
        HandJointId::Thumb1,
        HandJointId::Thumb2,
        HandJointId::Thumb3,
        HandJointId::Index1,
        HandJointId::Index2,
        HandJointId::Index3,
        HandJointId::Middle1,
        HandJointId::Middle2,
        HandJointId::Middle3,
        HandJointId::Ring1,
        HandJointId::Ring2,
        HandJointId::Ring3,
        HandJointId::Pinky0,
        HandJointId::Pinky1,
        HandJointId::Pinky2,
        HandJointId::Pinky3,
        HandJointId::ThumbTip,
        HandJointId::IndexTip,
        HandJointId::MiddleTip,
        HandJointId::RingTip,
        HandJointId::PinkyTip,
    ];

    /// 五指第一节（球关节）
    pub const SPHERICAL: [HandJointId; 5] = [
        HandJointId::Thumb1,
        HandJointId::Index1,
        HandJointId::Middle1,
        HandJointId::Ring1,
        HandJointId::Pinky1,
    ];

    #[inline]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// 手指关节序号（Thumb0 = 0 … Pinky3 = 16）
    #[inline]
    pub fn finger_index(self) -> Option<usize> {
        let id = self as usize;
        let first = HandJointId::Thumb0 as usize;
        let last = HandJointId::Pinky3 as usize;
        (first..=last).contains(&id).then(|| id - first)
    }

    #[inline]
    pub fn from_finger_index(index: usize) -> Option<Self> {
        if index < FINGER_JOINT_COUNT {
            Self::from_index(index + HandJointId::Thumb0 as usize)
        } else {
            None
        }
    }

    /// 所有手指关节，按序号排列
    pub fn fingers() -> impl Iterator<Item = HandJointId> {
        (0..FINGER_JOINT_COUNT).filter_map(Self::from_finger_index)
    }

    #[inline]
    pub fn is_fingertip(self) -> bool {
        self >= HandJointId::ThumbTip && self <= HandJointId::PinkyTip
    }

    #[inline]
    pub fn is_thumb(self) -> bool {
        self >= HandJointId::Thumb0 && self <= HandJointId::Thumb3
    }

    /// 初始化时的关节角色
    pub fn role(self) -> JointRole {
        match self {
            HandJointId::WristRoot => JointRole::Root,
            HandJointId::Thumb0 | HandJointId::Pinky0 => JointRole::Fixed,
            id if Self::SPHERICAL.contains(&id) => JointRole::Ball,
            _ => JointRole::Hinge,
        }
    }
}

/// 左右手
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Handedness {
    #[default]
    Left = 0,
    Right = 1,
}

/// 关节角色
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum JointRole {
    /// 腕部根节点，由速度直接驱动
    Root,
    /// 无旋转自由度
    Fixed,
    /// 单轴（屈伸）
    #[default]
    Hinge,
    /// 双轴（屈伸 + 外展）
    Ball,
}

// ============================================================================
// 驱动配置
// ============================================================================

/// 单类手指的驱动参数
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DriveProfile {
    pub stiffness: f32,
    pub damping: f32,
    /// 初始化输入；铰链与球关节的驱动不使用，始终不设上限
    pub force_limit: f32,
}

impl Default for DriveProfile {
    fn default() -> Self {
        Self {
            stiffness: 100.0,
            damping: 5.0,
            force_limit: f32::MAX,
        }
    }
}

/// 拇指与其他手指分别配置
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HandDriveProfile {
    pub thumb: DriveProfile,
    pub others: DriveProfile,
}

impl HandDriveProfile {
    /// 关节所属类别的驱动参数
    #[inline]
    pub fn for_joint(&self, id: HandJointId) -> DriveProfile {
        if id.is_thumb() {
            self.thumb
        } else {
            self.others
        }
    }
}
