//! 骨骼自动映射
//!
//! 按手部追踪骨骼命名规则在主/从两套层级中查找骨骼，建立关节对。

use super::{HandJointId, HandRig, Handedness, JointId, SlaveJoint};
use crate::error::{Hierarchy, MappingError};
use crate::skeleton::{NodeId, PoseSource};

/// 非指尖骨骼名前缀
const BONE_PREFIX: &str = "b_";
/// 指尖标记后缀
const TIP_SUFFIX: &str = "_finger_tip_marker";

const FINGER_NAMES: [&str; 5] = ["thumb", "index", "middle", "ring", "pinky"];

/// 左右手前缀
#[inline]
pub fn side_prefix(handedness: Handedness) -> &'static str {
    match handedness {
        Handedness::Left => "l_",
        Handedness::Right => "r_",
    }
}

/// 骨骼基础名（不含前缀）
fn base_name(id: HandJointId) -> &'static str {
    match id {
        HandJointId::WristRoot => "wrist",
        HandJointId::ForearmStub => "forearm_stub",
        HandJointId::Thumb0 => "thumb0",
        HandJointId::Thumb1 => "thumb1",
        HandJointId::Thumb2 => "thumb2",
        HandJointId::Thumb3 => "thumb3",
        HandJointId::Index1 => "index1",
        HandJointId::Index2 => "index2",
        HandJointId::Index3 => "index3",
        HandJointId::Middle1 => "middle1",
        HandJointId::Middle2 => "middle2",
        HandJointId::Middle3 => "middle3",
        HandJointId::Ring1 => "ring1",
        HandJointId::Ring2 => "ring2",
        HandJointId::Ring3 => "ring3",
        HandJointId::Pinky0 => "pinky0",
        HandJointId::Pinky1 => "pinky1",
        HandJointId::Pinky2 => "pinky2",
        HandJointId::Pinky3 => "pinky3",
        HandJointId::ThumbTip => "thumb_tip",
        HandJointId::IndexTip => "index_tip",
        HandJointId::MiddleTip => "middle_tip",
        HandJointId::RingTip => "ring_tip",
        HandJointId::PinkyTip => "pinky_tip",
    }
}

/// 骨骼名
///
/// - 指尖：`l_index_finger_tip_marker`
/// - 其他：`b_l_index1`
pub fn bone_name(id: HandJointId, handedness: Handedness) -> String {
    let side = side_prefix(handedness);
    if id.is_fingertip() {
        let finger = FINGER_NAMES[id as usize - HandJointId::ThumbTip as usize];
        format!("{side}{finger}{TIP_SUFFIX}")
    } else {
        format!("{BONE_PREFIX}{side}{}", base_name(id))
    }
}

fn find_bone<P: PoseSource>(
    source: &P,
    root: NodeId,
    id: HandJointId,
    name: &str,
    hierarchy: Hierarchy,
) -> Result<NodeId, MappingError> {
    source.find_child_recursive(root, name).ok_or_else(|| {
        log::error!("[AutoMap] 找不到骨骼: {} ({} 层级)", name, hierarchy);
        MappingError::MissingBone {
            joint: id,
            name: name.to_owned(),
            hierarchy,
        }
    })
}

/// 从节点上取得关节，缺失时注册；角色与语义编号总是按映射结果更新
fn require_joint(rig: &mut HandRig, node: NodeId, id: HandJointId) -> JointId {
    if let Some(existing) = rig.registry.joint_at(node) {
        if let Some(joint) = rig.registry.get_mut(existing) {
            joint.role = id.role();
            joint.hand_joint = Some(id);
        }
        return existing;
    }
    let (max_linear, max_angular) = (rig.config().max_linear_velocity, rig.config().max_angular_velocity);
    rig.register_joint(SlaveJoint::with_hand_joint(node, id).with_velocity_limits(max_linear, max_angular))
}

/// 自动映射腕部根与全部手指关节
///
/// 先清空关节对，再依次映射 WristRoot、Thumb0 … Pinky3。
/// 任一骨骼缺失时记录错误并停止，已建立的关节对保留。
pub fn auto_map<M, S>(rig: &mut HandRig, master: &M, slave: &S) -> Result<(), MappingError>
where
    M: PoseSource,
    S: PoseSource,
{
    rig.reset_pairs();
    let handedness = rig.handedness();

    let ids = std::iter::once(HandJointId::WristRoot).chain(HandJointId::fingers());
    for id in ids {
        let name = bone_name(id, handedness);
        let master_node = find_bone(master, rig.master_root(), id, &name, Hierarchy::Master)?;
        let slave_node = find_bone(slave, rig.slave_root(), id, &name, Hierarchy::Slave)?;

        let joint = require_joint(rig, slave_node, id);
        match id.finger_index() {
            Some(index) => rig.set_finger_pair(index, joint, master_node),
            None => rig.set_root(joint, master_node),
        }
    }

    rig.mark_mapped();
    log::info!(
        "[AutoMap] 映射完成: {:?} 手, {} 个关节",
        handedness,
        rig.registry.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hand::template::build_hand_skeleton;
    use crate::hand::{JointRole, RigState};
    use crate::physics::RetargetConfig;
    use crate::skeleton::Skeleton;
    use glam::{Quat, Vec3};

    #[test]
    fn test_bone_names() {
        assert_eq!(bone_name(HandJointId::WristRoot, Handedness::Left), "b_l_wrist");
        assert_eq!(bone_name(HandJointId::ForearmStub, Handedness::Right), "b_r_forearm_stub");
        assert_eq!(bone_name(HandJointId::Pinky0, Handedness::Right), "b_r_pinky0");
        assert_eq!(bone_name(HandJointId::IndexTip, Handedness::Right), "r_index_finger_tip_marker");
        assert_eq!(bone_name(HandJointId::PinkyTip, Handedness::Left), "l_pinky_finger_tip_marker");
    }

    fn rig_for(master_root: NodeId, slave_root: NodeId) -> HandRig {
        HandRig::with_config(Handedness::Right, master_root, slave_root, RetargetConfig::default())
    }

    #[test]
    fn test_auto_map_complete_hand() {
        let (master, master_root) = build_hand_skeleton(Handedness::Right);
        let (slave, slave_root) = build_hand_skeleton(Handedness::Right);
        let mut rig = rig_for(master_root, slave_root);

        auto_map(&mut rig, &master, &slave).unwrap();
        assert_eq!(rig.state(), RigState::Mapped);
        assert_eq!(rig.joint_pairs().len(), 17);
        assert!(rig.joint_pairs().iter().all(|p| p.is_complete()));
        assert!(rig.root_pair().is_complete());
        assert_eq!(rig.registry().len(), 18);

        let thumb1 = rig.finger_pair(1).unwrap();
        let joint = rig.joint(thumb1.slave.unwrap()).unwrap();
        assert_eq!(joint.role, JointRole::Ball);
        assert_eq!(joint.hand_joint, Some(HandJointId::Thumb1));
        assert_eq!(master.name(thumb1.master.unwrap()), Some("b_r_thumb1"));
        assert_eq!(joint.master(), thumb1.master);
    }

    #[test]
    fn test_missing_master_bone_stops_mapping() {
        // 主骨架只有腕部与拇指
        let mut master = Skeleton::new();
        let root = master.add_node("hand", None, Vec3::ZERO, Quat::IDENTITY);
        let wrist = master.add_node("b_r_wrist", Some(root), Vec3::ZERO, Quat::IDENTITY);
        let mut parent = wrist;
        for name in ["b_r_thumb0", "b_r_thumb1", "b_r_thumb2", "b_r_thumb3"] {
            parent = master.add_node(name, Some(parent), Vec3::X * 0.03, Quat::IDENTITY);
        }
        let (slave, slave_root) = build_hand_skeleton(Handedness::Right);
        let mut rig = rig_for(root, slave_root);

        let err = auto_map(&mut rig, &master, &slave).unwrap_err();
        assert_eq!(
            err,
            MappingError::MissingBone {
                joint: HandJointId::Index1,
                name: "b_r_index1".to_string(),
                hierarchy: Hierarchy::Master,
            }
        );
        assert_eq!(rig.state(), RigState::Unmapped);
        assert!(rig.root_pair().is_complete());
        for i in 0..4 {
            assert!(rig.finger_pair(i).unwrap().is_complete());
        }
        for i in 4..17 {
            assert!(!rig.finger_pair(i).unwrap().is_complete());
        }
    }

    #[test]
    fn test_mapped_joints_take_config_velocity_limits() {
        let (master, master_root) = build_hand_skeleton(Handedness::Right);
        let (slave, slave_root) = build_hand_skeleton(Handedness::Right);
        let config = RetargetConfig {
            max_linear_velocity: 1.5,
            max_angular_velocity: 0.75,
            ..RetargetConfig::default()
        };
        let mut rig = HandRig::with_config(Handedness::Right, master_root, slave_root, config);

        auto_map(&mut rig, &master, &slave).unwrap();
        for (_, joint) in rig.registry().iter() {
            assert_eq!(joint.max_linear_velocity, 1.5);
            assert_eq!(joint.max_angular_velocity, 0.75);
        }
    }

    #[test]
    fn test_remap_reuses_joints() {
        let (master, master_root) = build_hand_skeleton(Handedness::Right);
        let (slave, slave_root) = build_hand_skeleton(Handedness::Right);
        let mut rig = rig_for(master_root, slave_root);

        auto_map(&mut rig, &master, &slave).unwrap();
        let first: Vec<_> = rig.joint_pairs().to_vec();
        auto_map(&mut rig, &master, &slave).unwrap();
        assert_eq!(rig.joint_pairs(), first.as_slice());
        assert_eq!(rig.registry().len(), 18);
    }

    #[test]
    fn test_wrong_handedness_fails_on_root() {
        let (master, master_root) = build_hand_skeleton(Handedness::Left);
        let (slave, slave_root) = build_hand_skeleton(Handedness::Right);
        let mut rig = rig_for(master_root, slave_root);

        let err = auto_map(&mut rig, &master, &slave).unwrap_err();
        assert!(matches!(
            err,
            MappingError::MissingBone { joint: HandJointId::WristRoot, hierarchy: Hierarchy::Master, .. }
        ));
        assert!(!rig.root_pair().is_complete());
    }
}
