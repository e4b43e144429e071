//! 关节初始化器
//!
//! 把关节角色 + 驱动参数 + 左右手翻译成完整的 [`BodyConfig`]，一次写入物理世界。
//! 重复调用结果相同：刚体与碰撞体按"取得或创建"语义获取，刚度补偿每次都从
//! 原始驱动参数计算，不会累乘。

use glam::{EulerRot, Quat, Vec3};

use super::{DriveProfile, Handedness, JointId, JointRegistry, JointRole};
use crate::error::SetupError;
use crate::physics::{
    ArticulationWorld, AxisDrive, BodyConfig, BodyHandle, CapsuleShape, DofLock, JointType,
    RetargetConfig, AXIS_COUNT,
};
use crate::skeleton::PoseSource;

/// 屈曲下限（度），允许轻微过伸
pub const FLEXION_LOWER_DEG: f32 = -10.0;
/// 屈曲上限（度）
pub const FLEXION_UPPER_DEG: f32 = 90.0;

/// 球关节刚度补偿倍数
///
/// 同样的输入刚度下，球关节限位比铰链关节更软，因此球关节刚度乘以该值。
pub const BALL_STIFFNESS_COMPENSATION: f32 = 5.0;

/// 锚点旋转：把约束局部轴对齐到手指屈伸轴
///
/// 右手 Euler(0°, 90°, 0°)，左手 Euler(0°, 270°, 180°)；
/// 欧拉角按 Z → X → Y 的顺序作用。
pub fn anchor_rotation(handedness: Handedness) -> Quat {
    let (x, y, z) = match handedness {
        Handedness::Right => (0.0_f32, 90.0_f32, 0.0_f32),
        Handedness::Left => (0.0, 270.0, 180.0),
    };
    Quat::from_euler(EulerRot::YXZ, y.to_radians(), x.to_radians(), z.to_radians())
}

/// 屈伸轴驱动
///
/// 力上限不取配置值，铰链与球关节的驱动始终不设上限。
fn flexion_drive(profile: &DriveProfile, stiffness: f32) -> AxisDrive {
    AxisDrive {
        lower_limit: FLEXION_LOWER_DEG.to_radians(),
        upper_limit: FLEXION_UPPER_DEG.to_radians(),
        stiffness,
        damping: profile.damping,
        force_limit: f32::MAX,
        target: 0.0,
        target_velocity: 0.0,
    }
}

/// 计算关节的完整刚体配置（纯函数）
pub fn body_config(
    role: JointRole,
    profile: &DriveProfile,
    handedness: Handedness,
    max_linear_velocity: f32,
    max_angular_velocity: f32,
    config: &RetargetConfig,
) -> BodyConfig {
    let mut body = BodyConfig {
        use_gravity: false,
        anchor_position: Vec3::ZERO,
        anchor_rotation: anchor_rotation(handedness),
        match_anchors: true,
        linear_damping: 0.0,
        angular_damping: config.angular_damping,
        joint_friction: 0.0,
        automatic_center_of_mass: true,
        automatic_inertia_tensor: true,
        mass_scale: 1.0,
        max_linear_velocity,
        max_angular_velocity,
        max_depenetration_velocity: config.max_depenetration_velocity,
        collision_detection: config.collision_detection,
        joint_type: JointType::None,
        locks: [DofLock::Locked; AXIS_COUNT],
        drives: [AxisDrive::default(); AXIS_COUNT],
    };

    match role {
        JointRole::Root => {
            body.mass_scale = config.root_mass_scale;
        }
        JointRole::Fixed => {
            body.joint_type = JointType::Fixed;
        }
        JointRole::Hinge => {
            body.joint_type = JointType::Revolute;
            body.locks = [DofLock::Limited, DofLock::Locked, DofLock::Locked];
            body.drives[0] = flexion_drive(profile, profile.stiffness);
        }
        JointRole::Ball => {
            let stiffness = profile.stiffness * BALL_STIFFNESS_COMPENSATION;
            body.joint_type = JointType::Spherical;
            body.locks = [DofLock::Limited, DofLock::Limited, DofLock::Locked];
            body.drives[0] = flexion_drive(profile, stiffness);

            let abduction = config.ball_abduction_limit_deg.abs().to_radians();
            body.drives[1] = AxisDrive {
                lower_limit: -abduction,
                upper_limit: abduction,
                ..flexion_drive(profile, stiffness)
            };
        }
    }

    body
}

/// 手指胶囊碰撞体
///
/// 长度取到第一个子节点的距离；没有子节点时返回 `None`。
pub fn capsule_for<S: PoseSource>(
    slave: &S,
    node: crate::skeleton::NodeId,
    handedness: Handedness,
    config: &RetargetConfig,
) -> Option<CapsuleShape> {
    let child = *slave.children(node).first()?;
    let dist = slave
        .world_position(node)?
        .distance(slave.world_position(child)?);

    let sign = match handedness {
        Handedness::Left => -1.0,
        Handedness::Right => 1.0,
    };
    Some(CapsuleShape {
        height: dist * config.capsule_length_factor,
        radius: config.capsule_radius,
        center: Vec3::new(sign * dist * 0.5, 0.0, 0.0),
    })
}

/// 初始化单个关节
///
/// 父关节必须已初始化，否则该关节的刚体会成为一条新链的根。
pub fn initialize_joint<S, W>(
    registry: &mut JointRegistry,
    id: JointId,
    slave: &S,
    world: &mut W,
    handedness: Handedness,
    profile: DriveProfile,
    config: &RetargetConfig,
) -> Result<BodyHandle, SetupError>
where
    S: PoseSource,
    W: ArticulationWorld,
{
    let (node, role, max_lin, max_ang, parent) = {
        let joint = registry.get(id).ok_or(SetupError::UnknownSlaveNode(id))?;
        (
            joint.node,
            joint.role,
            joint.max_linear_velocity,
            joint.max_angular_velocity,
            joint.parent(),
        )
    };

    let pose = slave.world_pose(node).ok_or(SetupError::UnknownSlaveNode(id))?;
    let base_rotation = slave.local_rotation(node).ok_or(SetupError::UnknownSlaveNode(id))?;
    let parent_body = parent.and_then(|p| registry.get(p)).and_then(|p| p.body());

    let body = world.require_body(node, pose, parent_body);
    let body_config = body_config(role, &profile, handedness, max_lin, max_ang, config);
    world.configure_body(body, &body_config)?;

    let collider = match role {
        JointRole::Root => None,
        _ => match capsule_for(slave, node, handedness, config) {
            Some(shape) => Some(world.require_collider(node, body, &shape)?),
            None => None,
        },
    };

    if let Some(joint) = registry.get_mut(id) {
        joint.body = Some(body);
        joint.base_rotation = base_rotation;
        if collider.is_some() {
            joint.collider = collider;
        }
    }

    if config.debug_log {
        log::debug!(
            "[Initializer] 关节 {:?} ({:?}) → 刚体 {:?}, 碰撞体 {:?}",
            id, role, body, collider
        );
    }

    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hand::SlaveJoint;
    use crate::physics::{CollisionDetection, KinematicWorld};
    use crate::skeleton::{NodeId, Skeleton};

    fn profile(stiffness: f32) -> DriveProfile {
        DriveProfile { stiffness, damping: 2.0, force_limit: f32::MAX }
    }

    #[test]
    fn test_ball_stiffness_compensation() {
        let config = RetargetConfig::default();
        let s = 40.0;
        let ball = body_config(JointRole::Ball, &profile(s), Handedness::Right, 5.0, 2.0, &config);
        let hinge = body_config(JointRole::Hinge, &profile(s), Handedness::Right, 5.0, 2.0, &config);

        assert_eq!(ball.drives[0].stiffness, 5.0 * s);
        assert_eq!(ball.drives[1].stiffness, 5.0 * s);
        assert_eq!(hinge.drives[0].stiffness, s);
    }

    #[test]
    fn test_drive_force_uncapped() {
        let config = RetargetConfig::default();
        let capped = DriveProfile { stiffness: 40.0, damping: 2.0, force_limit: 50.0 };
        for role in [JointRole::Hinge, JointRole::Ball] {
            let body = body_config(role, &capped, Handedness::Right, 5.0, 2.0, &config);
            for axis in 0..AXIS_COUNT {
                if body.free_axes().allows(axis) {
                    assert_eq!(body.drives[axis].force_limit, f32::MAX);
                }
            }
            assert_eq!(body.drives[0].damping, 2.0);
        }
    }

    #[test]
    fn test_role_locks() {
        let config = RetargetConfig::default();
        let p = profile(10.0);
        let hinge = body_config(JointRole::Hinge, &p, Handedness::Left, 5.0, 2.0, &config);
        assert_eq!(hinge.joint_type, JointType::Revolute);
        assert_eq!(hinge.locks, [DofLock::Limited, DofLock::Locked, DofLock::Locked]);
        assert!((hinge.drives[0].lower_limit - (-10.0_f32).to_radians()).abs() < 1e-6);
        assert!((hinge.drives[0].upper_limit - 90.0_f32.to_radians()).abs() < 1e-6);
        assert_eq!(hinge.drives[0].target, 0.0);

        let ball = body_config(JointRole::Ball, &p, Handedness::Left, 5.0, 2.0, &config);
        assert_eq!(ball.joint_type, JointType::Spherical);
        assert_eq!(ball.locks, [DofLock::Limited, DofLock::Limited, DofLock::Locked]);

        let fixed = body_config(JointRole::Fixed, &p, Handedness::Left, 5.0, 2.0, &config);
        assert_eq!(fixed.joint_type, JointType::Fixed);
        assert_eq!(fixed.free_axes().dof_count(), 0);

        let root = body_config(JointRole::Root, &p, Handedness::Left, 5.0, 2.0, &config);
        assert_eq!(root.joint_type, JointType::None);
        assert_eq!(root.mass_scale, config.root_mass_scale);
        assert_eq!(root.free_axes().dof_count(), 0);
    }

    #[test]
    fn test_common_body_settings() {
        let config = RetargetConfig::default();
        let body = body_config(JointRole::Hinge, &profile(1.0), Handedness::Right, 5.0, 2.0, &config);
        assert!(!body.use_gravity);
        assert_eq!(body.linear_damping, 0.0);
        assert_eq!(body.joint_friction, 0.0);
        assert_eq!(body.angular_damping, 1.0);
        assert!(body.automatic_center_of_mass && body.automatic_inertia_tensor);
        assert_eq!(body.max_depenetration_velocity, 3.0);
        assert_eq!(body.collision_detection, CollisionDetection::ContinuousSpeculative);
    }

    #[test]
    fn test_anchor_rotation_by_handedness() {
        let right = anchor_rotation(Handedness::Right);
        // 右手：绕 Y 90°，X 轴转到 -Z
        assert!((right * Vec3::X - Vec3::NEG_Z).length() < 1e-5);

        let left = anchor_rotation(Handedness::Left);
        let expected = Quat::from_rotation_y(270.0_f32.to_radians())
            * Quat::from_rotation_z(180.0_f32.to_radians());
        // f32 下 acos 在点积接近 1 时误差较大，改用点积比较
        assert!(left.dot(expected).abs() > 1.0 - 1e-6);
        assert!((left * Vec3::X - expected * Vec3::X).length() < 1e-5);
    }

    #[test]
    fn test_initialize_twice_is_idempotent() {
        let mut skeleton = Skeleton::new();
        let root = skeleton.add_node("root", None, Vec3::ZERO, Quat::IDENTITY);
        let finger = skeleton.add_node("finger", Some(root), Vec3::new(0.04, 0.0, 0.0), Quat::from_rotation_z(0.2));
        skeleton.add_node("tip", Some(finger), Vec3::new(0.03, 0.0, 0.0), Quat::IDENTITY);

        let mut registry = JointRegistry::new();
        let root_id = registry.register(SlaveJoint::new(root, JointRole::Root));
        let id = registry.register(SlaveJoint::new(finger, JointRole::Ball));
        registry.get_mut(id).unwrap().parent = Some(root_id);

        let mut world = KinematicWorld::new();
        let config = RetargetConfig::default();
        let p = profile(10.0);

        initialize_joint(&mut registry, root_id, &skeleton, &mut world, Handedness::Right, p, &config).unwrap();
        let first = initialize_joint(&mut registry, id, &skeleton, &mut world, Handedness::Right, p, &config).unwrap();
        let first_config = world.body_config(first).unwrap();
        let first_collider = registry.get(id).unwrap().collider();

        let second = initialize_joint(&mut registry, id, &skeleton, &mut world, Handedness::Right, p, &config).unwrap();
        assert_eq!(first, second);
        assert_eq!(world.body_config(second).unwrap(), first_config);
        assert_eq!(first_config.drives[0].stiffness, 50.0);
        assert_eq!(registry.get(id).unwrap().collider(), first_collider);
        assert_eq!(world.body_count(), 2);
        assert_eq!(world.collider_count(), 1);
        assert!(!world.is_root(second).unwrap());

        let base = registry.get(id).unwrap().base_rotation();
        assert!(base.angle_between(Quat::from_rotation_z(0.2)) < 1e-6);
    }

    #[test]
    fn test_capsule_geometry() {
        let mut skeleton = Skeleton::new();
        let a = skeleton.add_node("a", None, Vec3::ZERO, Quat::IDENTITY);
        let b = skeleton.add_node("b", Some(a), Vec3::new(0.04, 0.0, 0.0), Quat::IDENTITY);
        let config = RetargetConfig::default();

        let right = capsule_for(&skeleton, a, Handedness::Right, &config).unwrap();
        assert!((right.height - 0.06).abs() < 1e-6);
        assert!((right.center.x - 0.02).abs() < 1e-6);
        assert_eq!(right.radius, 0.008);

        let left = capsule_for(&skeleton, a, Handedness::Left, &config).unwrap();
        assert!((left.center.x + 0.02).abs() < 1e-6);

        assert!(capsule_for(&skeleton, b, Handedness::Right, &config).is_none());
        assert!(capsule_for(&skeleton, NodeId(99), Handedness::Right, &config).is_none());
    }
}
