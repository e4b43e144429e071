//! 整只手的聚合
//!
//! 持有关节注册表、关节对与驱动配置。流程：
//! setup → [auto_map → build_chains → initialize → collect_colliders → exclude]
//! → 每个固定步 fixed_update

use super::{chain, initializer, mapper};
use super::{
    HandDriveProfile, Handedness, JointId, JointRegistry, SlaveJoint,
    FINGER_JOINT_COUNT,
};
use crate::error::SetupError;
use crate::physics::{get_config, ArticulationWorld, RetargetConfig};
use crate::skeleton::{NodeId, PoseSource};

/// 主/从关节对（不持有任何一方）
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct JointPair {
    pub master: Option<NodeId>,
    pub slave: Option<JointId>,
}

impl JointPair {
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.master.is_some() && self.slave.is_some()
    }
}

/// 配置阶段
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RigState {
    /// 尚未映射（或映射中途失败）
    #[default]
    Unmapped,
    /// 关节对已就绪，物理尚未配置（或层级变化后需重建）
    Mapped,
    /// 可以开始每步重定向
    Configured,
}

/// 物理手
pub struct HandRig {
    pub(crate) config: RetargetConfig,
    handedness: Handedness,
    drive: HandDriveProfile,

    /// 主骨架中查找骨骼的起点
    master_root: NodeId,
    /// 从骨架中查找骨骼的起点
    slave_root: NodeId,

    pub(crate) registry: JointRegistry,
    pub(crate) root_pair: JointPair,
    pub(crate) finger_pairs: Vec<JointPair>,
    pub(crate) state: RigState,
}

impl HandRig {
    /// 使用全局配置创建
    pub fn new(handedness: Handedness, master_root: NodeId, slave_root: NodeId) -> Self {
        Self::with_config(handedness, master_root, slave_root, get_config())
    }

    pub fn with_config(
        handedness: Handedness,
        master_root: NodeId,
        slave_root: NodeId,
        config: RetargetConfig,
    ) -> Self {
        Self {
            config,
            handedness,
            drive: HandDriveProfile::default(),
            master_root,
            slave_root,
            registry: JointRegistry::new(),
            root_pair: JointPair::default(),
            finger_pairs: Vec::new(),
            state: RigState::Unmapped,
        }
    }

    /// 设置驱动配置（仅在 setup 时读取）
    pub fn with_drive_profile(mut self, drive: HandDriveProfile) -> Self {
        self.drive = drive;
        self
    }

    pub fn set_drive_profile(&mut self, drive: HandDriveProfile) {
        self.drive = drive;
    }

    // ========================================
    // 访问器
    // ========================================

    #[inline]
    pub fn handedness(&self) -> Handedness {
        self.handedness
    }

    #[inline]
    pub fn config(&self) -> &RetargetConfig {
        &self.config
    }

    #[inline]
    pub fn drive_profile(&self) -> &HandDriveProfile {
        &self.drive
    }

    #[inline]
    pub fn state(&self) -> RigState {
        self.state
    }

    #[inline]
    pub fn master_root(&self) -> NodeId {
        self.master_root
    }

    #[inline]
    pub fn slave_root(&self) -> NodeId {
        self.slave_root
    }

    #[inline]
    pub fn registry(&self) -> &JointRegistry {
        &self.registry
    }

    #[inline]
    pub fn joint(&self, id: JointId) -> Option<&SlaveJoint> {
        self.registry.get(id)
    }

    #[inline]
    pub fn root_pair(&self) -> &JointPair {
        &self.root_pair
    }

    /// 按手指序号取关节对（Thumb0 = 0 … Pinky3 = 16）
    #[inline]
    pub fn finger_pair(&self, index: usize) -> Option<&JointPair> {
        self.finger_pairs.get(index)
    }

    /// 所有手指关节对
    #[inline]
    pub fn joint_pairs(&self) -> &[JointPair] {
        &self.finger_pairs
    }

    /// 根关节对在前，随后是全部手指关节对
    pub fn all_pairs(&self) -> impl Iterator<Item = &JointPair> {
        std::iter::once(&self.root_pair).chain(self.finger_pairs.iter())
    }

    /// 当前处于发散状态的关节
    pub fn diverged_joints(&self) -> Vec<JointId> {
        self.registry
            .iter()
            .filter(|(_, j)| j.is_diverged())
            .map(|(id, _)| id)
            .collect()
    }

    // ========================================
    // 关节生命周期
    // ========================================

    /// 注册关节（节点上已有关节时返回已有标识）
    ///
    /// 关节自带的速度上限原样保留。层级发生变化，已配置的手退回 Mapped，需要重新 setup。
    pub fn register_joint(&mut self, joint: SlaveJoint) -> JointId {
        let before = self.registry.len();
        let id = self.registry.register(joint);
        if self.registry.len() != before {
            self.invalidate_chains();
        }
        id
    }

    /// 注销关节，并清除引用它的关节对
    pub fn unregister_joint(&mut self, id: JointId) -> Option<SlaveJoint> {
        let removed = self.registry.unregister(id)?;
        for pair in std::iter::once(&mut self.root_pair).chain(self.finger_pairs.iter_mut()) {
            if pair.slave == Some(id) {
                pair.slave = None;
            }
        }
        self.invalidate_chains();
        Some(removed)
    }

    /// 修改单个关节的速度上限，下一步起生效
    pub fn set_velocity_limits(&mut self, id: JointId, max_linear: f32, max_angular: f32) -> bool {
        match self.registry.get_mut(id) {
            Some(joint) => {
                joint.max_linear_velocity = max_linear;
                joint.max_angular_velocity = max_angular;
                true
            }
            None => false,
        }
    }

    fn invalidate_chains(&mut self) {
        if self.state == RigState::Configured {
            log::debug!("[HandRig] 关节层级变化，需要重新 setup");
            self.state = RigState::Mapped;
        }
    }

    // ========================================
    // 映射
    // ========================================

    /// 清空关节对并按手指数量重建
    pub(crate) fn reset_pairs(&mut self) {
        self.root_pair = JointPair::default();
        self.finger_pairs.clear();
        self.finger_pairs.resize(FINGER_JOINT_COUNT, JointPair::default());
        self.state = RigState::Unmapped;
    }

    /// 设置腕部根关节对
    pub fn set_root(&mut self, slave: JointId, master: NodeId) {
        self.root_pair = JointPair {
            master: Some(master),
            slave: Some(slave),
        };
        if let Some(joint) = self.registry.get_mut(slave) {
            joint.set_master(master);
        }
    }

    /// 设置手指关节对
    pub fn set_finger_pair(&mut self, index: usize, slave: JointId, master: NodeId) {
        if index >= self.finger_pairs.len() {
            self.finger_pairs.resize(index + 1, JointPair::default());
        }
        self.finger_pairs[index] = JointPair {
            master: Some(master),
            slave: Some(slave),
        };
        if let Some(joint) = self.registry.get_mut(slave) {
            joint.set_master(master);
        }
    }

    pub(crate) fn mark_mapped(&mut self) {
        self.state = RigState::Mapped;
    }

    /// 手动设置关节对后结束映射
    ///
    /// 根关节对必须完整且从关节已注册。
    pub fn finish_mapping(&mut self) -> Result<(), SetupError> {
        if !self.root_mapped() {
            return Err(SetupError::NotMapped);
        }
        if self.state == RigState::Unmapped {
            self.mark_mapped();
        }
        Ok(())
    }

    fn root_mapped(&self) -> bool {
        self.root_pair.master.is_some()
            && self
                .root_pair
                .slave
                .is_some_and(|id| self.registry.get(id).is_some())
    }

    // ========================================
    // setup 入口
    // ========================================

    /// 映射 + 初始化 + 父链构建 + 自碰撞排除
    ///
    /// 映射失败时已建立的关节对保留，物理不做任何配置。
    pub fn setup<M, S, W>(&mut self, master: &M, slave: &S, world: &mut W) -> Result<(), SetupError>
    where
        M: PoseSource,
        S: PoseSource,
        W: ArticulationWorld,
    {
        mapper::auto_map(self, master, slave)?;
        self.configure(slave, world)
    }

    /// 对已映射的关节完成物理配置
    ///
    /// 映射未完成（含映射中途失败）时返回 [`SetupError::NotMapped`]，不触碰物理世界。
    pub fn configure<S, W>(&mut self, slave: &S, world: &mut W) -> Result<(), SetupError>
    where
        S: PoseSource,
        W: ArticulationWorld,
    {
        if self.state == RigState::Unmapped || !self.root_mapped() {
            log::warn!("[HandRig] 映射未完成，拒绝配置物理");
            return Err(SetupError::NotMapped);
        }

        chain::build_chains(&mut self.registry, slave);

        // 父关节先于子关节初始化
        let mut order = self.registry.ids();
        order.sort_by_key(|id| self.registry.get(*id).map_or(0, |j| j.ancestors().len()));
        for id in &order {
            let profile = self
                .registry
                .get(*id)
                .and_then(|j| j.hand_joint)
                .map(|h| self.drive.for_joint(h))
                .unwrap_or_default();
            initializer::initialize_joint(
                &mut self.registry,
                *id,
                slave,
                world,
                self.handedness,
                profile,
                &self.config,
            )?;
        }

        for id in &order {
            chain::refresh_colliders(&mut self.registry, slave, world, *id);
        }
        for id in &order {
            chain::exclude_self_collisions(&mut self.registry, world, *id)?;
        }

        self.state = RigState::Configured;
        log::info!(
            "[HandRig] setup 完成: {} 个关节, {} 对手指关节",
            self.registry.len(),
            self.finger_pairs.iter().filter(|p| p.is_complete()).count()
        );
        Ok(())
    }
}
