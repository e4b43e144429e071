//! 降维坐标与速度指令的纯数学部分
//!
//! 角度单位统一为弧度。

use glam::{Quat, Vec3};

use crate::skeleton::Pose;

/// 小于该角度 (rad) 的旋转视为零
pub const ANGLE_EPSILON: f32 = 1e-6;

/// 小于该距离 (m) 的位置误差记为 0
pub const POSITION_ERROR_FLOOR: f32 = 1e-5;

/// 最短弧上的轴角分解
///
/// 返回的角度位于 [0, π]；角度低于 [`ANGLE_EPSILON`] 时返回 `(X, 0.0)`。
pub fn shortest_axis_angle(rotation: Quat) -> (Vec3, f32) {
    let mut q = rotation.normalize();
    // q 与 -q 表示同一旋转，取 w >= 0 的一半
    if q.w < 0.0 {
        q = -q;
    }
    let (axis, angle) = q.to_axis_angle();
    if !angle.is_finite() || angle < ANGLE_EPSILON {
        (Vec3::X, 0.0)
    } else {
        (axis, angle)
    }
}

/// 旋转向量 (axis × angle)，零旋转时精确为零
#[inline]
pub fn rotation_vector(rotation: Quat) -> Vec3 {
    let (axis, angle) = shortest_axis_angle(rotation);
    if angle == 0.0 {
        Vec3::ZERO
    } else {
        axis * angle
    }
}

/// 把相对旋转转换到关节驱动轴空间
///
/// x / y / z 分量依次对应 twist / swing Y / swing Z 的目标角。
#[inline]
pub fn to_reduced_space(rotation: Quat, anchor_rotation: Quat) -> Vec3 {
    let v = rotation_vector(rotation);
    if v == Vec3::ZERO {
        Vec3::ZERO
    } else {
        anchor_rotation.inverse() * v
    }
}

/// 非根关节的驱动目标旋转：inverse(base) · master 局部旋转
#[inline]
pub fn drive_target_rotation(base_rotation: Quat, master_local: Quat) -> Quat {
    base_rotation.inverse() * master_local
}

/// 根关节速度指令（钳制前）
///
/// 线速度 = 位移 / dt；角速度 = master · inverse(current) 的旋转向量 / dt。
pub fn root_velocity_command(current: &Pose, target: &Pose, dt: f32) -> (Vec3, Vec3) {
    let linear = (target.position - current.position) / dt;
    let delta = target.rotation * current.rotation.inverse();
    let angular = rotation_vector(delta) / dt;
    (linear, angular)
}

/// 把速度长度钳制到 `max` 以内，方向不变
#[inline]
pub fn clamp_velocity(velocity: Vec3, max: f32) -> Vec3 {
    velocity.clamp_length_max(max.max(0.0))
}

/// 位置误差，低于 [`POSITION_ERROR_FLOOR`] 记为 0
#[inline]
pub fn floor_position_error(error: f32) -> f32 {
    if error < POSITION_ERROR_FLOOR {
        0.0
    } else {
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_shortest_arc() {
        // 270° 绕 Z 等价于 -90°
        let q = Quat::from_rotation_z(1.5 * PI);
        let (axis, angle) = shortest_axis_angle(q);
        assert!((angle - FRAC_PI_2).abs() < 1e-5);
        assert!((axis - Vec3::NEG_Z).length() < 1e-5);

        let (axis, angle) = shortest_axis_angle(-Quat::from_rotation_x(0.3));
        assert!((angle - 0.3).abs() < 1e-5);
        assert!((axis - Vec3::X).length() < 1e-5);
    }

    #[test]
    fn test_tiny_angle_is_zero() {
        let q = Quat::from_rotation_y(1e-7);
        assert_eq!(shortest_axis_angle(q).1, 0.0);
        assert_eq!(to_reduced_space(q, Quat::from_rotation_y(0.7)), Vec3::ZERO);
        assert_eq!(to_reduced_space(Quat::IDENTITY, Quat::IDENTITY), Vec3::ZERO);
    }

    #[test]
    fn test_reduced_space_uses_inverse_anchor() {
        // 锚点把局部 X 转到 -Z；绕世界 -Z 的旋转应落在 twist 轴
        let anchor = Quat::from_rotation_y(FRAC_PI_2);
        let q = Quat::from_rotation_z(-0.4);
        let reduced = to_reduced_space(q, anchor);
        assert!((reduced - Vec3::new(0.4, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_root_velocity_command() {
        let current = Pose::default();
        let target = Pose::new(Vec3::new(0.1, 0.0, 0.0), Quat::from_rotation_y(0.02));
        let (linear, angular) = root_velocity_command(&current, &target, 1.0 / 60.0);
        assert!((linear - Vec3::new(6.0, 0.0, 0.0)).length() < 1e-4);
        assert!((angular - Vec3::new(0.0, 1.2, 0.0)).length() < 1e-4);

        let (linear, angular) = root_velocity_command(&target, &target, 1.0 / 60.0);
        assert_eq!(linear, Vec3::ZERO);
        assert_eq!(angular, Vec3::ZERO);
    }

    #[test]
    fn test_clamp_preserves_direction() {
        let v = clamp_velocity(Vec3::new(6.0, 0.0, 0.0), 5.0);
        assert!((v.length() - 5.0).abs() < 1e-5);
        assert!((v.normalize() - Vec3::X).length() < 1e-6);

        let small = Vec3::new(0.1, 0.2, 0.0);
        assert_eq!(clamp_velocity(small, 5.0), small);
    }

    #[test]
    fn test_position_error_floor() {
        assert_eq!(floor_position_error(9e-6), 0.0);
        assert_eq!(floor_position_error(0.0), 0.0);
        assert_eq!(floor_position_error(2e-5), 2e-5);
    }
}
