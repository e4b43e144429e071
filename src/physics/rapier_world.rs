//! Rapier 物理世界
//!
//! [`ArticulationWorld`] 的 rapier3d 实现：
//! - 每个关节一个动态刚体，非链根刚体通过通用冲量关节连到父刚体
//! - 关节约束：线性三轴锁定，旋转轴按 `BodyConfig::locks` 锁定/限位，位置马达作为驱动
//! - 自碰撞排除通过 PhysicsHooks 过滤接触对
//!
//! 求解器自身没有逐刚体速度上限，速度上限由重定向引擎每步钳制。

use std::collections::{HashMap, HashSet};

use glam::{Quat, Vec3};
use rapier3d::na::{Isometry3, Quaternion, Translation3, UnitQuaternion, Vector3};
use rapier3d::prelude::{
    ActiveHooks, CCDSolver, ColliderBuilder, ColliderHandle as RapierColliderHandle, ColliderSet,
    DefaultBroadPhase, GenericJoint, GenericJointBuilder, ImpulseJointHandle, ImpulseJointSet,
    IntegrationParameters, IslandManager, JointAxesMask, JointAxis, MultibodyJointSet,
    NarrowPhase, PairFilterContext, PhysicsHooks, PhysicsPipeline, QueryPipeline,
    RigidBodyBuilder, RigidBodyHandle, RigidBodySet, SharedShape, SolverFlags,
};

use super::{
    ordered_pair, ArticulationWorld, BodyConfig, BodyHandle, CapsuleShape, CollisionDetection,
    ColliderHandle, DofLock, DriveTargets, JointType, AXIS_COUNT,
};
use crate::error::{PhysicsError, PhysicsResult};
use crate::skeleton::{NodeId, Pose};

/// 单个连杆的基础质量 (kg)，根连杆按 mass_scale 放大
const LINK_MASS: f32 = 0.02;
/// 手指碰撞体密度 (kg/m³)
const FINGER_DENSITY: f32 = 1000.0;

const ANGULAR_AXES: [JointAxis; AXIS_COUNT] = [JointAxis::AngX, JointAxis::AngY, JointAxis::AngZ];
const ANGULAR_MASKS: [JointAxesMask; AXIS_COUNT] =
    [JointAxesMask::ANG_X, JointAxesMask::ANG_Y, JointAxesMask::ANG_Z];

// ============================================================================
// glam ↔ nalgebra
// ============================================================================

#[inline]
fn to_vector(v: Vec3) -> Vector3<f32> {
    Vector3::new(v.x, v.y, v.z)
}

#[inline]
fn to_unit_quat(q: Quat) -> UnitQuaternion<f32> {
    UnitQuaternion::from_quaternion(Quaternion::new(q.w, q.x, q.y, q.z))
}

#[inline]
fn to_isometry(position: Vec3, rotation: Quat) -> Isometry3<f32> {
    Isometry3::from_parts(Translation3::new(position.x, position.y, position.z), to_unit_quat(rotation))
}

#[inline]
fn from_isometry(iso: &Isometry3<f32>) -> Pose {
    let t = iso.translation.vector;
    let r = iso.rotation;
    Pose::new(Vec3::new(t.x, t.y, t.z), Quat::from_xyzw(r.i, r.j, r.k, r.w))
}

// ============================================================================
// 接触过滤
// ============================================================================

/// 忽略表中的碰撞对不产生接触
#[derive(Default)]
struct ContactFilter {
    ignored: HashSet<(RapierColliderHandle, RapierColliderHandle)>,
}

impl ContactFilter {
    fn set(&mut self, a: RapierColliderHandle, b: RapierColliderHandle, ignored: bool) {
        if ignored {
            self.ignored.insert((a, b));
            self.ignored.insert((b, a));
        } else {
            self.ignored.remove(&(a, b));
            self.ignored.remove(&(b, a));
        }
    }

    fn contains(&self, a: RapierColliderHandle, b: RapierColliderHandle) -> bool {
        self.ignored.contains(&(a, b))
    }
}

impl PhysicsHooks for ContactFilter {
    fn filter_contact_pair(&self, context: &PairFilterContext) -> Option<SolverFlags> {
        if self.contains(context.collider1, context.collider2) {
            None
        } else {
            Some(SolverFlags::COMPUTE_IMPULSES)
        }
    }
}

// ============================================================================
// 刚体/碰撞体记录
// ============================================================================

struct HandBody {
    handle: RigidBodyHandle,
    parent: Option<BodyHandle>,
    root: BodyHandle,
    link_index: usize,
    config: BodyConfig,
    joint: Option<ImpulseJointHandle>,
}

struct HandCollider {
    handle: RapierColliderHandle,
}

/// Rapier 物理世界
pub struct RapierHandWorld {
    gravity: Vector3<f32>,
    integration_parameters: IntegrationParameters,
    physics_pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    rigid_body_set: RigidBodySet,
    collider_set: ColliderSet,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,
    contact_filter: ContactFilter,

    bodies: Vec<HandBody>,
    body_by_node: HashMap<NodeId, BodyHandle>,
    colliders: Vec<HandCollider>,
    collider_by_node: HashMap<NodeId, ColliderHandle>,
    links_by_root: HashMap<BodyHandle, Vec<BodyHandle>>,
}

impl Default for RapierHandWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl RapierHandWorld {
    pub fn new() -> Self {
        Self {
            gravity: Vector3::new(0.0, -9.81, 0.0),
            integration_parameters: IntegrationParameters::default(),
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            contact_filter: ContactFilter::default(),
            bodies: Vec::new(),
            body_by_node: HashMap::new(),
            colliders: Vec::new(),
            collider_by_node: HashMap::new(),
            links_by_root: HashMap::new(),
        }
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn joint_count(&self) -> usize {
        self.impulse_joint_set.len()
    }

    /// 推进一个物理步
    pub fn step(&mut self, dt: f32) {
        self.integration_parameters.dt = dt;
        self.physics_pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &self.contact_filter,
            &(),
        );
    }

    fn get(&self, body: BodyHandle) -> PhysicsResult<&HandBody> {
        self.bodies
            .get(body.0 as usize)
            .ok_or(PhysicsError::UnknownBody(body))
    }

    fn rapier_collider(&self, collider: ColliderHandle) -> PhysicsResult<RapierColliderHandle> {
        self.colliders
            .get(collider.0 as usize)
            .map(|c| c.handle)
            .ok_or(PhysicsError::UnknownCollider(collider))
    }

    fn pose_of(&self, handle: RigidBodyHandle) -> Option<Pose> {
        self.rigid_body_set.get(handle).map(|rb| from_isometry(rb.position()))
    }

    /// soft CCD 预测距离：一个步长内按最大线速度可走过的距离，离散检测时为 0
    fn soft_ccd_prediction(&self, config: &BodyConfig) -> f32 {
        match config.collision_detection {
            CollisionDetection::ContinuousSpeculative => {
                config.max_linear_velocity * self.integration_parameters.dt
            }
            CollisionDetection::Discrete => 0.0,
        }
    }

    /// 通用关节：线性轴锁定，旋转轴按配置锁定/限位并挂位置马达
    fn build_joint(config: &BodyConfig, frame1: Isometry3<f32>, frame2: Isometry3<f32>) -> GenericJoint {
        let mut locked = JointAxesMask::LIN_AXES;
        for (i, lock) in config.locks.iter().enumerate() {
            if config.joint_type == JointType::Fixed || *lock == DofLock::Locked {
                locked |= ANGULAR_MASKS[i];
            }
        }

        let mut builder = GenericJointBuilder::new(locked)
            .local_frame1(frame1)
            .local_frame2(frame2);
        let free = config.free_axes();
        for (i, drive) in config.drives.iter().enumerate() {
            if config.joint_type == JointType::Fixed || !free.allows(i) {
                continue;
            }
            let axis = ANGULAR_AXES[i];
            if config.locks[i] == DofLock::Limited {
                builder = builder.limits(axis, [drive.lower_limit, drive.upper_limit]);
            }
            builder = builder
                .motor_position(axis, drive.target, drive.stiffness, drive.damping)
                .motor_max_force(axis, drive.force_limit);
        }
        builder.build()
    }
}

impl ArticulationWorld for RapierHandWorld {
    fn body(&self, node: NodeId) -> Option<BodyHandle> {
        self.body_by_node.get(&node).copied()
    }

    fn require_body(&mut self, node: NodeId, pose: Pose, parent: Option<BodyHandle>) -> BodyHandle {
        if let Some(existing) = self.body(node) {
            return existing;
        }

        let handle = BodyHandle(self.bodies.len() as u32);
        let parent = parent.filter(|p| (p.0 as usize) < self.bodies.len());
        let root = parent
            .and_then(|p| self.bodies.get(p.0 as usize))
            .map_or(handle, |p| p.root);

        let rb = RigidBodyBuilder::dynamic()
            .position(to_isometry(pose.position, pose.rotation))
            .additional_mass(LINK_MASS)
            .can_sleep(false)
            .build();
        let rapier_handle = self.rigid_body_set.insert(rb);

        let links = self.links_by_root.entry(root).or_default();
        let link_index = links.len();
        links.push(handle);

        self.bodies.push(HandBody {
            handle: rapier_handle,
            parent,
            root,
            link_index,
            config: BodyConfig::default(),
            joint: None,
        });
        self.body_by_node.insert(node, handle);
        handle
    }

    fn configure_body(&mut self, body: BodyHandle, config: &BodyConfig) -> PhysicsResult<()> {
        let (rapier_handle, parent, old_joint) = {
            let b = self.get(body)?;
            (b.handle, b.parent, b.joint)
        };

        let prediction = self.soft_ccd_prediction(config);
        let rb = self
            .rigid_body_set
            .get_mut(rapier_handle)
            .ok_or(PhysicsError::UnknownBody(body))?;
        rb.set_gravity_scale(if config.use_gravity { 1.0 } else { 0.0 }, true);
        rb.set_linear_damping(config.linear_damping);
        rb.set_angular_damping(config.angular_damping);
        rb.set_additional_mass(LINK_MASS * config.mass_scale, true);
        // 推测式连续检测对应 soft CCD（预测接触），不开启扫掠 CCD
        rb.enable_ccd(false);
        rb.set_soft_ccd_prediction(prediction);
        let child_pose = from_isometry(rb.position());

        // 链根或无约束：移除旧关节
        let parent_rb = parent.and_then(|p| self.bodies.get(p.0 as usize)).map(|p| p.handle);
        let joint = match (parent_rb, config.joint_type) {
            (Some(parent_rb), joint_type) if joint_type != JointType::None => {
                let parent_pose = self
                    .pose_of(parent_rb)
                    .ok_or(PhysicsError::UnknownBody(body))?;
                // 子刚体中的锚点框架；父刚体中的框架与之重合（match anchors）
                let frame2 = to_isometry(config.anchor_position, config.anchor_rotation);
                let inv_parent = parent_pose.rotation.inverse();
                let anchor_world = child_pose.position + child_pose.rotation * config.anchor_position;
                let frame1 = to_isometry(
                    inv_parent * (anchor_world - parent_pose.position),
                    inv_parent * child_pose.rotation * config.anchor_rotation,
                );
                let data = Self::build_joint(config, frame1, frame2);

                match old_joint.filter(|h| self.impulse_joint_set.get(*h).is_some()) {
                    Some(h) => {
                        if let Some(existing) = self.impulse_joint_set.get_mut(h) {
                            existing.data = data;
                        }
                        Some(h)
                    }
                    None => Some(self.impulse_joint_set.insert(parent_rb, rapier_handle, data, true)),
                }
            }
            _ => {
                if let Some(h) = old_joint {
                    self.impulse_joint_set.remove(h, true);
                }
                None
            }
        };

        let b = &mut self.bodies[body.0 as usize];
        b.config = *config;
        b.joint = joint;
        Ok(())
    }

    fn body_config(&self, body: BodyHandle) -> PhysicsResult<BodyConfig> {
        self.get(body).map(|b| b.config)
    }

    fn is_root(&self, body: BodyHandle) -> PhysicsResult<bool> {
        self.get(body).map(|b| b.root == body)
    }

    fn body_pose(&self, body: BodyHandle) -> PhysicsResult<Pose> {
        let handle = self.get(body)?.handle;
        self.pose_of(handle).ok_or(PhysicsError::UnknownBody(body))
    }

    fn linear_velocity(&self, body: BodyHandle) -> PhysicsResult<Vec3> {
        let handle = self.get(body)?.handle;
        let rb = self.rigid_body_set.get(handle).ok_or(PhysicsError::UnknownBody(body))?;
        let v = rb.linvel();
        Ok(Vec3::new(v.x, v.y, v.z))
    }

    fn angular_velocity(&self, body: BodyHandle) -> PhysicsResult<Vec3> {
        let handle = self.get(body)?.handle;
        let rb = self.rigid_body_set.get(handle).ok_or(PhysicsError::UnknownBody(body))?;
        let w = rb.angvel();
        Ok(Vec3::new(w.x, w.y, w.z))
    }

    fn set_velocities(&mut self, body: BodyHandle, linear: Vec3, angular: Vec3) -> PhysicsResult<()> {
        let handle = self.get(body)?.handle;
        let rb = self
            .rigid_body_set
            .get_mut(handle)
            .ok_or(PhysicsError::UnknownBody(body))?;
        rb.set_linvel(to_vector(linear), true);
        rb.set_angvel(to_vector(angular), true);
        Ok(())
    }

    fn set_drive_targets(&mut self, body: BodyHandle, targets: &DriveTargets) -> PhysicsResult<()> {
        let b = self
            .bodies
            .get_mut(body.0 as usize)
            .ok_or(PhysicsError::UnknownBody(body))?;
        let mut joint = b.joint.and_then(|h| self.impulse_joint_set.get_mut(h));

        for (i, value) in targets.values.iter().enumerate() {
            let Some(target) = value else {
                continue;
            };
            let drive = &mut b.config.drives[i];
            drive.target = *target;
            if let Some(joint) = joint.as_mut() {
                joint
                    .data
                    .set_motor_position(ANGULAR_AXES[i], *target, drive.stiffness, drive.damping);
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
        let rb_handle = self.get(body)?.handle;
        let capsule = SharedShape::capsule_x(shape.half_segment(), shape.radius);
        let offset = to_isometry(shape.center, Quat::IDENTITY);

        if let Some(existing) = self.collider(node) {
            let handle = self.rapier_collider(existing)?;
            if let Some(c) = self.collider_set.get_mut(handle) {
                c.set_shape(capsule);
                c.set_position_wrt_parent(offset);
            }
            return Ok(existing);
        }

        let collider = ColliderBuilder::new(capsule)
            .position(offset)
            .density(FINGER_DENSITY)
            .active_hooks(ActiveHooks::FILTER_CONTACT_PAIRS)
            .build();
        let rapier_handle =
            self.collider_set
                .insert_with_parent(collider, rb_handle, &mut self.rigid_body_set);

        let handle = ColliderHandle(self.colliders.len() as u32);
        self.colliders.push(HandCollider { handle: rapier_handle });
        self.collider_by_node.insert(node, handle);
        Ok(handle)
    }

    fn set_collision_ignored(
        &mut self,
        a: ColliderHandle,
        b: ColliderHandle,
        ignored: bool,
    ) -> PhysicsResult<()> {
        let (a, b) = ordered_pair(a, b);
        let ra = self.rapier_collider(a)?;
        let rb = self.rapier_collider(b)?;
        if a != b {
            self.contact_filter.set(ra, rb, ignored);
        }
        Ok(())
    }

    fn is_collision_ignored(&self, a: ColliderHandle, b: ColliderHandle) -> bool {
        match (self.rapier_collider(a), self.rapier_collider(b)) {
            (Ok(ra), Ok(rb)) => self.contact_filter.contains(ra, rb),
            _ => false,
        }
    }
}
