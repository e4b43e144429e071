//! 标准手部骨架模板
//!
//! 按追踪骨骼命名构建一只静止姿态的手，手指沿局部 X 轴伸展
//! （右手 +X，左手 −X）。用于离线运行与测试。

use glam::{Quat, Vec3};

use super::mapper::bone_name;
use super::{HandJointId, Handedness};
use crate::skeleton::{NodeId, Skeleton};

/// 模板根节点名
pub const TEMPLATE_ROOT: &str = "hand_root";

/// 一根手指：首节相对腕部的偏移 + 之后各节（含指尖）沿 X 的长度
struct FingerLayout {
    joints: &'static [HandJointId],
    tip: HandJointId,
    base: [f32; 3],
    lengths: &'static [f32],
}

const FINGERS: [FingerLayout; 5] = [
    FingerLayout {
        joints: &[HandJointId::Thumb0, HandJointId::Thumb1, HandJointId::Thumb2, HandJointId::Thumb3],
        tip: HandJointId::ThumbTip,
        base: [0.020, 0.0, 0.020],
        lengths: &[0.030, 0.032, 0.025, 0.020],
    },
    FingerLayout {
        joints: &[HandJointId::Index1, HandJointId::Index2, HandJointId::Index3],
        tip: HandJointId::IndexTip,
        base: [0.095, 0.0, 0.025],
        lengths: &[0.040, 0.025, 0.020],
    },
    FingerLayout {
        joints: &[HandJointId::Middle1, HandJointId::Middle2, HandJointId::Middle3],
        tip: HandJointId::MiddleTip,
        base: [0.095, 0.0, 0.005],
        lengths: &[0.045, 0.028, 0.022],
    },
    FingerLayout {
        joints: &[HandJointId::Ring1, HandJointId::Ring2, HandJointId::Ring3],
        tip: HandJointId::RingTip,
        base: [0.090, 0.0, -0.015],
        lengths: &[0.040, 0.026, 0.020],
    },
    FingerLayout {
        joints: &[HandJointId::Pinky0, HandJointId::Pinky1, HandJointId::Pinky2, HandJointId::Pinky3],
        tip: HandJointId::PinkyTip,
        base: [0.035, 0.0, -0.020],
        lengths: &[0.045, 0.030, 0.020, 0.018],
    },
];

/// 构建模板手骨架，返回 (骨架, 根节点)
pub fn build_hand_skeleton(handedness: Handedness) -> (Skeleton, NodeId) {
    let sign = match handedness {
        Handedness::Left => -1.0,
        Handedness::Right => 1.0,
    };
    let along = |len: f32| Vec3::new(sign * len, 0.0, 0.0);

    let mut skeleton = Skeleton::new();
    let root = skeleton.add_node(TEMPLATE_ROOT, None, Vec3::ZERO, Quat::IDENTITY);
    let wrist = skeleton.add_node(
        bone_name(HandJointId::WristRoot, handedness),
        Some(root),
        Vec3::ZERO,
        Quat::IDENTITY,
    );
    skeleton.add_node(
        bone_name(HandJointId::ForearmStub, handedness),
        Some(wrist),
        along(-0.05),
        Quat::IDENTITY,
    );

    for finger in &FINGERS {
        let [x, y, z] = finger.base;
        let mut offset = Vec3::new(sign * x, y, z);
        let mut parent = wrist;
        let segments = finger.joints.iter().copied().chain(std::iter::once(finger.tip));
        for (id, len) in segments.zip(std::iter::once(0.0).chain(finger.lengths.iter().copied())) {
            if len > 0.0 {
                offset = along(len);
            }
            parent = skeleton.add_node(bone_name(id, handedness), Some(parent), offset, Quat::IDENTITY);
        }
    }

    (skeleton, root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::PoseSource;

    #[test]
    fn test_template_contains_every_bone() {
        for handedness in [Handedness::Left, Handedness::Right] {
            let (skeleton, root) = build_hand_skeleton(handedness);
            assert_eq!(skeleton.len(), 1 + HandJointId::ALL.len());
            for id in HandJointId::ALL {
                let name = bone_name(id, handedness);
                assert!(skeleton.find_child_recursive(root, &name).is_some(), "{name}");
            }
        }
    }

    #[test]
    fn test_fingers_extend_along_side_axis() {
        let (right, _) = build_hand_skeleton(Handedness::Right);
        let (left, _) = build_hand_skeleton(Handedness::Left);
        let r = right.find("r_middle_finger_tip_marker").unwrap();
        let l = left.find("l_middle_finger_tip_marker").unwrap();
        let rp = right.world_position(r).unwrap();
        let lp = left.world_position(l).unwrap();
        assert!(rp.x > 0.15);
        assert!((rp.x + lp.x).abs() < 1e-6);

        let index1 = right.find("b_r_index1").unwrap();
        let index2 = right.find("b_r_index2").unwrap();
        let d = right.world_position(index1).unwrap().distance(right.world_position(index2).unwrap());
        assert!((d - 0.040).abs() < 1e-6);
    }
}
