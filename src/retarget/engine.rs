//! 每步重定向引擎
//!
//! 每个固定步分三段执行：
//! 1. 读取：检查前置条件并读取所有需要的位姿/配置，任一失败整步放弃
//! 2. 计算：根关节速度指令、各关节驱动目标（纯计算）
//! 3. 写入：驱动目标（逐关节或整链批量）→ 速度钳制 → 误差监测

use std::collections::HashMap;

use glam::{Quat, Vec3};

use super::reduced::{
    clamp_velocity, drive_target_rotation, floor_position_error, root_velocity_command,
    to_reduced_space,
};
use crate::error::RetargetError;
use crate::hand::{HandRig, JointId, JointRole, RigState};
use crate::physics::{ArticulationWorld, BodyHandle, DriveAxes, DriveTargets};
use crate::skeleton::{Pose, PoseSource};

/// 根关节速度指令（钳制前）
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RootCommand {
    pub joint: Option<JointId>,
    pub linear: Vec3,
    pub angular: Vec3,
}

/// 单步结果
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickReport {
    /// 根关节速度指令，未钳制
    pub root_command: Option<RootCommand>,
    /// 各关节位置误差（注册表顺序）
    pub position_errors: Vec<(JointId, f32)>,
    /// 当前处于发散状态的关节
    pub diverged: Vec<JointId>,
    /// 本步新进入发散状态的关节
    pub newly_diverged: Vec<JointId>,
}

impl TickReport {
    /// 某关节本步的位置误差
    pub fn position_error(&self, id: JointId) -> Option<f32> {
        self.position_errors
            .iter()
            .find(|(j, _)| *j == id)
            .map(|(_, e)| *e)
    }

    /// 最大位置误差
    pub fn max_position_error(&self) -> f32 {
        self.position_errors
            .iter()
            .map(|(_, e)| *e)
            .fold(0.0, f32::max)
    }
}

/// 读取阶段得到的单关节快照
struct JointStep {
    id: JointId,
    role: JointRole,
    body: BodyHandle,
    body_is_root: bool,
    body_pose: Pose,
    master_pose: Pose,
    master_local: Quat,
    base_rotation: Quat,
    anchor_rotation: Quat,
    free_axes: DriveAxes,
    linear_velocity: Vec3,
    angular_velocity: Vec3,
    max_linear_velocity: f32,
    max_angular_velocity: f32,
}

/// 整链批量写入的布局（读取阶段取得）
struct ChainLayout {
    root: BodyHandle,
    /// 刚体 → 连杆索引
    links: HashMap<BodyHandle, usize>,
    starts: Vec<usize>,
    current: Vec<f32>,
}

impl HandRig {
    /// 执行一个固定步
    ///
    /// 前置条件：已 setup，每个关节都有主节点和刚体，`dt` 为正的有限值。
    /// 不满足时返回错误，本步不写入任何东西。
    pub fn fixed_update<P, W>(
        &mut self,
        master: &P,
        world: &mut W,
        dt: f32,
    ) -> Result<TickReport, RetargetError>
    where
        P: PoseSource,
        W: ArticulationWorld,
    {
        if self.state != RigState::Configured {
            return Err(RetargetError::NotConfigured);
        }
        if !(dt.is_finite() && dt > 0.0) {
            return Err(RetargetError::InvalidTimestep(dt));
        }

        // ====== 读取 ======
        let steps = self.read_steps(master, world)?;
        let layout = if self.config.batch_drive_writes {
            self.read_chain_layout(world)?
        } else {
            None
        };

        // ====== 计算 ======
        let mut report = TickReport::default();
        let mut targets: Vec<(BodyHandle, DriveTargets)> = Vec::with_capacity(steps.len());
        let mut velocities: Vec<(BodyHandle, Vec3, Vec3)> = Vec::with_capacity(steps.len());

        for step in &steps {
            let (linear, angular) = if step.role == JointRole::Root {
                let (linear, angular) = root_velocity_command(&step.body_pose, &step.master_pose, dt);
                report.root_command = Some(RootCommand {
                    joint: Some(step.id),
                    linear,
                    angular,
                });
                (linear, angular)
            } else {
                let drive = if step.body_is_root {
                    DriveTargets::zero(step.free_axes)
                } else {
                    let rotation = drive_target_rotation(step.base_rotation, step.master_local);
                    let reduced = to_reduced_space(rotation, step.anchor_rotation);
                    DriveTargets::from_reduced(reduced, step.free_axes)
                };
                targets.push((step.body, drive));
                (step.linear_velocity, step.angular_velocity)
            };

            velocities.push((
                step.body,
                clamp_velocity(linear, step.max_linear_velocity),
                clamp_velocity(angular, step.max_angular_velocity),
            ));
        }

        // ====== 写入 ======
        match layout {
            Some(layout) => write_batched(world, layout, &targets)?,
            None => {
                for (body, drive) in &targets {
                    if drive.written().next().is_some() {
                        world.set_drive_targets(*body, drive)?;
                    }
                }
            }
        }

        for (body, linear, angular) in &velocities {
            world.set_velocities(*body, *linear, *angular)?;
        }

        self.update_errors(&steps, &mut report);
        Ok(report)
    }

    fn read_steps<P, W>(&self, master: &P, world: &W) -> Result<Vec<JointStep>, RetargetError>
    where
        P: PoseSource,
        W: ArticulationWorld,
    {
        let mut steps = Vec::with_capacity(self.registry.len());
        for (id, joint) in self.registry.iter() {
            let master_node = joint.master().ok_or(RetargetError::MasterUnset(id))?;
            let body = joint.body().ok_or(RetargetError::BodyMissing(id))?;
            let master_pose = master
                .world_pose(master_node)
                .ok_or(RetargetError::UnknownMasterNode(id))?;
            let master_local = master
                .local_rotation(master_node)
                .ok_or(RetargetError::UnknownMasterNode(id))?;

            let config = world.body_config(body)?;
            steps.push(JointStep {
                id,
                role: joint.role,
                body,
                body_is_root: world.is_root(body)?,
                body_pose: world.body_pose(body)?,
                master_pose,
                master_local,
                base_rotation: joint.base_rotation(),
                anchor_rotation: config.anchor_rotation,
                free_axes: config.free_axes(),
                linear_velocity: world.linear_velocity(body)?,
                angular_velocity: world.angular_velocity(body)?,
                max_linear_velocity: joint.max_linear_velocity,
                max_angular_velocity: joint.max_angular_velocity,
            });
        }
        Ok(steps)
    }

    /// 以根关节刚体为根的整链布局；没有根关节时退回逐关节写入
    fn read_chain_layout<W: ArticulationWorld>(
        &self,
        world: &W,
    ) -> Result<Option<ChainLayout>, RetargetError> {
        let Some(root) = self
            .root_pair
            .slave
            .and_then(|id| self.registry.get(id))
            .and_then(|j| j.body())
        else {
            return Ok(None);
        };

        let links = world
            .articulation_links(root)?
            .into_iter()
            .enumerate()
            .map(|(i, body)| (body, i))
            .collect();
        Ok(Some(ChainLayout {
            root,
            links,
            starts: world.dof_start_indices(root)?,
            current: world.chain_drive_targets(root)?,
        }))
    }

    fn update_errors(&mut self, steps: &[JointStep], report: &mut TickReport) {
        let threshold = self.config.position_error_threshold;
        let debug = self.config.debug_log;

        for step in steps {
            let error =
                floor_position_error(step.body_pose.position.distance(step.master_pose.position));
            report.position_errors.push((step.id, error));

            let Some(joint) = self.registry.get_mut(step.id) else {
                continue;
            };
            let diverged = error > threshold;
            if diverged && !joint.diverged {
                log::warn!(
                    "[Retarget] 关节 {:?} 位置误差 {:.3} m 超过阈值 {:.3} m",
                    step.id, error, threshold
                );
                report.newly_diverged.push(step.id);
            }
            joint.position_error = error;
            joint.diverged = diverged;
            if diverged {
                report.diverged.push(step.id);
            }

            if debug {
                log::debug!("[Retarget] 关节 {:?}: 误差 {:.6} m", step.id, error);
            }
        }
    }
}

/// 整链一次写入；不在链中的刚体逐个写入
fn write_batched<W: ArticulationWorld>(
    world: &mut W,
    layout: ChainLayout,
    targets: &[(BodyHandle, DriveTargets)],
) -> Result<(), RetargetError> {
    let ChainLayout {
        root,
        links,
        starts,
        mut current,
    } = layout;

    let mut outside = Vec::new();
    for (body, drive) in targets {
        let Some(start) = links.get(body).and_then(|link| starts.get(*link)) else {
            outside.push((*body, *drive));
            continue;
        };
        for (offset, value) in drive.written().enumerate() {
            if let Some(slot) = current.get_mut(start + offset) {
                *slot = value;
            }
        }
    }

    world.set_chain_drive_targets(root, &current)?;
    for (body, drive) in &outside {
        if drive.written().next().is_some() {
            world.set_drive_targets(*body, drive)?;
        }
    }
    Ok(())
}
