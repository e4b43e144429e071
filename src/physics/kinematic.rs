//! 运动学物理世界
//!
//! 内存中的 [`ArticulationWorld`] 实现：记录配置、驱动目标与碰撞忽略表，
//! `step` 只按速度积分位姿，不做约束求解。用于无宿主引擎时的离线运行与测试。

use std::collections::{BTreeSet, HashMap};

use glam::{Quat, Vec3};

use super::{
    ordered_pair, ArticulationWorld, BodyConfig, BodyHandle, CapsuleShape, ColliderHandle,
    DriveTargets, AXIS_COUNT,
};
use crate::error::{PhysicsError, PhysicsResult};
use crate::skeleton::{NodeId, Pose};

/// 单个刚体状态
#[derive(Clone, Debug)]
struct KinematicBody {
    /// 链根（自身为根时等于自身）
    root: BodyHandle,
    /// 在链中的连杆索引
    link_index: usize,
    config: BodyConfig,
    pose: Pose,
    linear_velocity: Vec3,
    angular_velocity: Vec3,
    /// 每轴驱动目标写入次数
    axis_writes: [u32; AXIS_COUNT],
}

#[derive(Clone, Debug)]
struct KinematicCollider {
    body: BodyHandle,
    shape: CapsuleShape,
}

/// 运动学物理世界
#[derive(Clone, Debug, Default)]
pub struct KinematicWorld {
    bodies: Vec<KinematicBody>,
    body_by_node: HashMap<NodeId, BodyHandle>,
    colliders: Vec<KinematicCollider>,
    collider_by_node: HashMap<NodeId, ColliderHandle>,
    /// 忽略接触的碰撞对（规范顺序）
    ignored_pairs: BTreeSet<(ColliderHandle, ColliderHandle)>,
    /// 每条链的连杆（按连杆索引）
    links_by_root: HashMap<BodyHandle, Vec<BodyHandle>>,
}

impl KinematicWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn collider_count(&self) -> usize {
        self.colliders.len()
    }

    /// 当前忽略表（规范顺序）
    pub fn ignored_pairs(&self) -> &BTreeSet<(ColliderHandle, ColliderHandle)> {
        &self.ignored_pairs
    }

    /// 某轴被写入驱动目标的次数
    pub fn axis_write_count(&self, body: BodyHandle, axis: usize) -> PhysicsResult<u32> {
        let b = self.get(body)?;
        Ok(b.axis_writes.get(axis).copied().unwrap_or(0))
    }

    /// 碰撞体当前形状
    pub fn collider_shape(&self, collider: ColliderHandle) -> PhysicsResult<CapsuleShape> {
        self.colliders
            .get(collider.0 as usize)
            .map(|c| c.shape)
            .ok_or(PhysicsError::UnknownCollider(collider))
    }

    /// 碰撞体所挂的刚体
    pub fn collider_body(&self, collider: ColliderHandle) -> PhysicsResult<BodyHandle> {
        self.colliders
            .get(collider.0 as usize)
            .map(|c| c.body)
            .ok_or(PhysicsError::UnknownCollider(collider))
    }

    /// 按当前速度积分一步
    pub fn step(&mut self, dt: f32) {
        for body in &mut self.bodies {
            body.pose.position += body.linear_velocity * dt;
            let delta = Quat::from_scaled_axis(body.angular_velocity * dt);
            body.pose.rotation = (delta * body.pose.rotation).normalize();
        }
    }

    fn get(&self, body: BodyHandle) -> PhysicsResult<&KinematicBody> {
        self.bodies
            .get(body.0 as usize)
            .ok_or(PhysicsError::UnknownBody(body))
    }

    fn get_mut(&mut self, body: BodyHandle) -> PhysicsResult<&mut KinematicBody> {
        self.bodies
            .get_mut(body.0 as usize)
            .ok_or(PhysicsError::UnknownBody(body))
    }

    fn check_collider(&self, collider: ColliderHandle) -> PhysicsResult<()> {
        if (collider.0 as usize) < self.colliders.len() {
            Ok(())
        } else {
            Err(PhysicsError::UnknownCollider(collider))
        }
    }
}

impl ArticulationWorld for KinematicWorld {
    fn body(&self, node: NodeId) -> Option<BodyHandle> {
        self.body_by_node.get(&node).copied()
    }

    fn require_body(&mut self, node: NodeId, pose: Pose, parent: Option<BodyHandle>) -> BodyHandle {
        if let Some(existing) = self.body(node) {
            return existing;
        }

        let handle = BodyHandle(self.bodies.len() as u32);
        let root = parent
            .and_then(|p| self.bodies.get(p.0 as usize))
            .map_or(handle, |p| p.root);

        let links = self.links_by_root.entry(root).or_default();
        let link_index = links.len();
        links.push(handle);

        self.bodies.push(KinematicBody {
            root,
            link_index,
            config: BodyConfig::default(),
            pose,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            axis_writes: [0; AXIS_COUNT],
        });
        self.body_by_node.insert(node, handle);
        handle
    }

    fn configure_body(&mut self, body: BodyHandle, config: &BodyConfig) -> PhysicsResult<()> {
        self.get_mut(body)?.config = *config;
        Ok(())
    }

    fn body_config(&self, body: BodyHandle) -> PhysicsResult<BodyConfig> {
        self.get(body).map(|b| b.config)
    }

    fn is_root(&self, body: BodyHandle) -> PhysicsResult<bool> {
        self.get(body).map(|b| b.root == body)
    }

    fn body_pose(&self, body: BodyHandle) -> PhysicsResult<Pose> {
        self.get(body).map(|b| b.pose)
    }

    fn linear_velocity(&self, body: BodyHandle) -> PhysicsResult<Vec3> {
        self.get(body).map(|b| b.linear_velocity)
    }

    fn angular_velocity(&self, body: BodyHandle) -> PhysicsResult<Vec3> {
        self.get(body).map(|b| b.angular_velocity)
    }

    fn set_velocities(&mut self, body: BodyHandle, linear: Vec3, angular: Vec3) -> PhysicsResult<()> {
        let b = self.get_mut(body)?;
        b.linear_velocity = linear;
        b.angular_velocity = angular;
        Ok(())
    }

    fn set_drive_targets(&mut self, body: BodyHandle, targets: &DriveTargets) -> PhysicsResult<()> {
        let b = self.get_mut(body)?;
        for (axis, value) in targets.values.iter().enumerate() {
            if let Some(v) = value {
                b.config.drives[axis].target = *v;
                b.axis_writes[axis] += 1;
            }
        }
        Ok(())
    }

    fn articulation_links(&self, root: BodyHandle) -> PhysicsResult<Vec<BodyHandle>> {
        let b = self.get(root)?;
        Ok(self.links_by_root.get(&b.root).cloned().unwrap_or_default())
    }

    fn link_index(&self, body: BodyHandle) -> PhysicsResult<usize> {
        self.get(body).map(|b| b.link_index)
    }

    fn collider(&self, node: NodeId) -> Option<ColliderHandle> {
        self.collider_by_node.get(&node).copied()
    }

    fn require_collider(
        &mut self,
        node: NodeId,
        body: BodyHandle,
        shape: &CapsuleShape,
    ) -> PhysicsResult<ColliderHandle> {
        self.get(body)?;
        if let Some(existing) = self.collider(node) {
            self.colliders[existing.0 as usize].shape = *shape;
            return Ok(existing);
        }
        let handle = ColliderHandle(self.colliders.len() as u32);
        self.colliders.push(KinematicCollider {
            body,
            shape: *shape,
        });
        self.collider_by_node.insert(node, handle);
        Ok(handle)
    }

    fn set_collision_ignored(
        &mut self,
        a: ColliderHandle,
        b: ColliderHandle,
        ignored: bool,
    ) -> PhysicsResult<()> {
        self.check_collider(a)?;
        self.check_collider(b)?;
        if a == b {
            return Ok(());
        }
        let pair = ordered_pair(a, b);
        if ignored {
            self.ignored_pairs.insert(pair);
        } else {
            self.ignored_pairs.remove(&pair);
        }
        Ok(())
    }

    fn is_collision_ignored(&self, a: ColliderHandle, b: ColliderHandle) -> bool {
        self.ignored_pairs.contains(&ordered_pair(a, b))
    }
}
