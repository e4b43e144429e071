//! 物理能力层
//!
//! 重定向核心不实现求解器，只通过 [`ArticulationWorld`] 配置并驱动宿主的
//! 关节刚体。所有每轴参数先在值类型中算好，再一次性写入。

pub mod config;
mod kinematic;
#[cfg(feature = "rapier")]
mod rapier_world;

pub use config::{get_config, reset_config, set_config, RetargetConfig};
pub use kinematic::KinematicWorld;
#[cfg(feature = "rapier")]
pub use rapier_world::RapierHandWorld;

use bitflags::bitflags;
use glam::{Quat, Vec3};

use crate::error::{PhysicsError, PhysicsResult};
use crate::skeleton::{NodeId, Pose};

// ============================================================================
// 句柄
// ============================================================================

/// 刚体句柄（由物理世界持有，核心只引用）
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BodyHandle(pub u32);

/// 碰撞体句柄
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColliderHandle(pub u32);

// ============================================================================
// 关节配置值类型
// ============================================================================

/// 关节约束类型
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JointType {
    /// 无父约束（链根，由速度直接驱动）
    #[default]
    None,
    Fixed,
    Revolute,
    Spherical,
}

/// 单个旋转自由度的锁定方式
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DofLock {
    #[default]
    Locked,
    Limited,
    Free,
}

/// 碰撞检测精度
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CollisionDetection {
    Discrete,
    #[default]
    ContinuousSpeculative,
}

/// 旋转轴索引：0 = twist(X)，1 = swing Y，2 = swing Z
pub const AXIS_COUNT: usize = 3;

bitflags! {
    /// 关节允许运动的旋转轴集合
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct DriveAxes: u8 {
        const TWIST = 1 << 0;
        const SWING_Y = 1 << 1;
        const SWING_Z = 1 << 2;
    }
}

impl DriveAxes {
    /// 由每轴锁定方式推导自由轴（非 Locked 即自由）
    pub fn from_locks(locks: &[DofLock; AXIS_COUNT]) -> Self {
        let mut axes = DriveAxes::empty();
        for (i, lock) in locks.iter().enumerate() {
            if *lock != DofLock::Locked {
                axes |= Self::axis(i);
            }
        }
        axes
    }

    #[inline]
    pub fn axis(index: usize) -> Self {
        DriveAxes::from_bits_truncate(1 << index)
    }

    #[inline]
    pub fn allows(&self, index: usize) -> bool {
        index < AXIS_COUNT && self.contains(Self::axis(index))
    }

    /// 自由度数量（批量写入时每个连杆占用的目标数）
    #[inline]
    pub fn dof_count(&self) -> usize {
        self.bits().count_ones() as usize
    }
}

/// 单轴驱动参数（角度单位：弧度）
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AxisDrive {
    pub lower_limit: f32,
    pub upper_limit: f32,
    pub stiffness: f32,
    pub damping: f32,
    pub force_limit: f32,
    pub target: f32,
    pub target_velocity: f32,
}

impl Default for AxisDrive {
    fn default() -> Self {
        Self {
            lower_limit: 0.0,
            upper_limit: 0.0,
            stiffness: 0.0,
            damping: 0.0,
            force_limit: f32::MAX,
            target: 0.0,
            target_velocity: 0.0,
        }
    }
}

/// 胶囊碰撞体（沿局部 X 轴）
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CapsuleShape {
    /// 总高度（含两端半球）
    pub height: f32,
    pub radius: f32,
    /// 相对刚体的中心偏移
    pub center: Vec3,
}

impl CapsuleShape {
    /// 中间圆柱段的半高
    #[inline]
    pub fn half_segment(&self) -> f32 {
        (self.height * 0.5 - self.radius).max(0.0)
    }
}

/// 关节刚体完整配置
///
/// 由初始化器一次算好，通过 [`ArticulationWorld::configure_body`] 整体写入，
/// 避免部分写入造成的不一致。
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BodyConfig {
    pub use_gravity: bool,
    pub anchor_position: Vec3,
    pub anchor_rotation: Quat,
    pub match_anchors: bool,

    pub linear_damping: f32,
    pub angular_damping: f32,
    pub joint_friction: f32,

    pub automatic_center_of_mass: bool,
    pub automatic_inertia_tensor: bool,
    /// 质量缩放（链根放大以稳住整条链）
    pub mass_scale: f32,

    pub max_linear_velocity: f32,
    pub max_angular_velocity: f32,
    pub max_depenetration_velocity: f32,
    pub collision_detection: CollisionDetection,

    pub joint_type: JointType,
    /// 每轴锁定方式（twist, swing Y, swing Z）
    pub locks: [DofLock; AXIS_COUNT],
    /// 每轴驱动（xDrive, yDrive, zDrive）
    pub drives: [AxisDrive; AXIS_COUNT],
}

impl Default for BodyConfig {
    fn default() -> Self {
        Self {
            use_gravity: true,
            anchor_position: Vec3::ZERO,
            anchor_rotation: Quat::IDENTITY,
            match_anchors: true,
            linear_damping: 0.05,
            angular_damping: 0.05,
            joint_friction: 0.05,
            automatic_center_of_mass: true,
            automatic_inertia_tensor: true,
            mass_scale: 1.0,
            max_linear_velocity: 1000.0,
            max_angular_velocity: 50.0,
            max_depenetration_velocity: 1.0e10,
            collision_detection: CollisionDetection::Discrete,
            joint_type: JointType::None,
            locks: [DofLock::Locked; AXIS_COUNT],
            drives: [AxisDrive::default(); AXIS_COUNT],
        }
    }
}

impl BodyConfig {
    #[inline]
    pub fn free_axes(&self) -> DriveAxes {
        DriveAxes::from_locks(&self.locks)
    }
}

/// 单个关节的驱动目标（`None` 表示该轴不写）
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DriveTargets {
    pub values: [Option<f32>; AXIS_COUNT],
}

impl DriveTargets {
    /// 从降维坐标取出自由轴分量，锁定轴丢弃
    pub fn from_reduced(reduced: Vec3, free: DriveAxes) -> Self {
        let components = reduced.to_array();
        let mut values = [None; AXIS_COUNT];
        for (i, value) in values.iter_mut().enumerate() {
            if free.allows(i) {
                *value = Some(components[i]);
            }
        }
        Self { values }
    }

    /// 全零目标（每个自由轴写 0）
    pub fn zero(free: DriveAxes) -> Self {
        Self::from_reduced(Vec3::ZERO, free)
    }

    #[inline]
    pub fn get(&self, axis: usize) -> Option<f32> {
        self.values.get(axis).copied().flatten()
    }

    /// 按轴序输出已写入的值（批量布局顺序）
    pub fn written(&self) -> impl Iterator<Item = f32> + '_ {
        self.values.iter().filter_map(|v| *v)
    }
}

// ============================================================================
// 物理世界能力
// ============================================================================

/// 关节刚体物理世界能力
///
/// 宿主实现此 trait；刚体与碰撞体由世界持有，核心通过句柄引用。
/// `require_*` 为幂等的"取得或创建"语义。
pub trait ArticulationWorld {
    // ========== 刚体 ==========

    /// 节点上已有的刚体
    fn body(&self, node: NodeId) -> Option<BodyHandle>;

    /// 取得节点刚体，缺失时以默认配置创建
    ///
    /// `parent` 为 `None` 时新刚体成为一条链的根。已存在时忽略其余参数。
    fn require_body(&mut self, node: NodeId, pose: Pose, parent: Option<BodyHandle>) -> BodyHandle;

    /// 整体写入配置
    fn configure_body(&mut self, body: BodyHandle, config: &BodyConfig) -> PhysicsResult<()>;

    /// 当前配置（含最近写入的驱动目标）
    fn body_config(&self, body: BodyHandle) -> PhysicsResult<BodyConfig>;

    /// 是否为链根
    fn is_root(&self, body: BodyHandle) -> PhysicsResult<bool>;

    /// 当前模拟位姿
    fn body_pose(&self, body: BodyHandle) -> PhysicsResult<Pose>;

    fn linear_velocity(&self, body: BodyHandle) -> PhysicsResult<Vec3>;

    fn angular_velocity(&self, body: BodyHandle) -> PhysicsResult<Vec3>;

    /// 同时写入线速度与角速度
    fn set_velocities(&mut self, body: BodyHandle, linear: Vec3, angular: Vec3) -> PhysicsResult<()>;

    /// 写入单个关节的驱动目标，`None` 轴保持不变
    fn set_drive_targets(&mut self, body: BodyHandle, targets: &DriveTargets) -> PhysicsResult<()>;

    // ========== 链（批量写入） ==========

    /// 以 `root` 为根的链中所有连杆，按连杆索引排序（根在首位）
    fn articulation_links(&self, root: BodyHandle) -> PhysicsResult<Vec<BodyHandle>>;

    /// 每个连杆的自由度起始偏移（按连杆索引）
    fn dof_start_indices(&self, root: BodyHandle) -> PhysicsResult<Vec<usize>> {
        let links = self.articulation_links(root)?;
        let mut starts = Vec::with_capacity(links.len());
        let mut next = 0;
        for link in links {
            starts.push(next);
            next += self.body_config(link)?.free_axes().dof_count();
        }
        Ok(starts)
    }

    /// 整条链当前驱动目标（扁平数组）
    fn chain_drive_targets(&self, root: BodyHandle) -> PhysicsResult<Vec<f32>> {
        let mut flat = Vec::new();
        for link in self.articulation_links(root)? {
            let config = self.body_config(link)?;
            let free = config.free_axes();
            for (i, drive) in config.drives.iter().enumerate() {
                if free.allows(i) {
                    flat.push(drive.target);
                }
            }
        }
        Ok(flat)
    }

    /// 一次写入整条链的驱动目标
    fn set_chain_drive_targets(&mut self, root: BodyHandle, targets: &[f32]) -> PhysicsResult<()> {
        let links = self.articulation_links(root)?;
        let mut layout = Vec::with_capacity(links.len());
        let mut expected = 0;
        for link in &links {
            let free = self.body_config(*link)?.free_axes();
            expected += free.dof_count();
            layout.push(free);
        }
        if expected != targets.len() {
            return Err(PhysicsError::DofCountMismatch {
                expected,
                actual: targets.len(),
            });
        }

        let mut cursor = 0;
        for (link, free) in links.into_iter().zip(layout) {
            let mut per_link = DriveTargets::default();
            for (i, value) in per_link.values.iter_mut().enumerate() {
                if free.allows(i) {
                    *value = Some(targets[cursor]);
                    cursor += 1;
                }
            }
            self.set_drive_targets(link, &per_link)?;
        }
        Ok(())
    }

    /// 刚体在其链中的连杆索引
    fn link_index(&self, body: BodyHandle) -> PhysicsResult<usize>;

    // ========== 碰撞体 ==========

    /// 节点上的主碰撞体
    fn collider(&self, node: NodeId) -> Option<ColliderHandle>;

    /// 取得或创建节点胶囊碰撞体，并更新形状
    fn require_collider(
        &mut self,
        node: NodeId,
        body: BodyHandle,
        shape: &CapsuleShape,
    ) -> PhysicsResult<ColliderHandle>;

    /// 设置（或取消）一对碰撞体之间的接触忽略
    fn set_collision_ignored(
        &mut self,
        a: ColliderHandle,
        b: ColliderHandle,
        ignored: bool,
    ) -> PhysicsResult<()>;

    fn is_collision_ignored(&self, a: ColliderHandle, b: ColliderHandle) -> bool;
}

/// 无序碰撞对的规范形式
#[inline]
pub(crate) fn ordered_pair(a: ColliderHandle, b: ColliderHandle) -> (ColliderHandle, ColliderHandle) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
