//! 父链构建与自碰撞排除
//!
//! 祖先链在配置期一次性算好并缓存在关节记录中，每步不再遍历层级。

use std::collections::BTreeSet;

use super::{JointId, JointRegistry};
use crate::error::PhysicsResult;
use crate::physics::{ArticulationWorld, ColliderHandle};
use crate::skeleton::PoseSource;

// ============================================================================
// 祖先链
// ============================================================================

/// 沿父节点向上收集祖先关节（由近及远）
///
/// 遇到无父节点，或父节点上没有注册关节时停止。
pub fn build_chain<S: PoseSource>(
    registry: &mut JointRegistry,
    slave: &S,
    id: JointId,
) -> Vec<JointId> {
    let Some(start) = registry.get(id).map(|j| j.node) else {
        return Vec::new();
    };

    let mut ancestors = Vec::new();
    let mut current = start;
    while let Some(parent_node) = slave.parent(current) {
        let Some(parent) = registry.joint_at(parent_node) else {
            break;
        };
        // 层级成环时截断
        if parent == id || ancestors.contains(&parent) {
            log::warn!("[Chain] 关节 {:?} 的父链成环，已截断", id);
            break;
        }
        ancestors.push(parent);
        current = parent_node;
    }

    if let Some(joint) = registry.get_mut(id) {
        joint.parent = ancestors.first().copied();
        joint.ancestors = ancestors.clone();
    }
    ancestors
}

/// 为所有已注册关节重建祖先链
pub fn build_chains<S: PoseSource>(registry: &mut JointRegistry, slave: &S) {
    for id in registry.ids() {
        build_chain(registry, slave, id);
    }
}

// ============================================================================
// 碰撞体收集
// ============================================================================

/// 自身碰撞体 + 子树（含自身节点）上的所有碰撞体，去重
pub fn collect_colliders<S, W>(
    registry: &JointRegistry,
    slave: &S,
    world: &W,
    id: JointId,
) -> Vec<ColliderHandle>
where
    S: PoseSource,
    W: ArticulationWorld,
{
    let Some(joint) = registry.get(id) else {
        return Vec::new();
    };

    let mut out: Vec<ColliderHandle> = joint.collider.into_iter().collect();
    for node in slave.subtree(joint.node) {
        if let Some(c) = world.collider(node) {
            if !out.contains(&c) {
                out.push(c);
            }
        }
    }
    out
}

/// 重新收集并缓存子树碰撞体
pub fn refresh_colliders<S, W>(registry: &mut JointRegistry, slave: &S, world: &W, id: JointId)
where
    S: PoseSource,
    W: ArticulationWorld,
{
    let colliders = collect_colliders(registry, slave, world, id);
    if let Some(joint) = registry.get_mut(id) {
        joint.subtree_colliders = colliders;
    }
}

// ============================================================================
// 自碰撞排除
// ============================================================================

/// 应忽略接触的碰撞体集合
///
/// (子树碰撞体 ∪ 各祖先自身碰撞体) − 自身碰撞体；没有自身碰撞体时为空。
pub fn exclusion_set(registry: &JointRegistry, id: JointId) -> BTreeSet<ColliderHandle> {
    let Some(joint) = registry.get(id) else {
        return BTreeSet::new();
    };
    let Some(own) = joint.collider else {
        return BTreeSet::new();
    };

    let ancestor_colliders = joint
        .ancestors
        .iter()
        .filter_map(|a| registry.get(*a))
        .filter_map(|a| a.collider);

    joint
        .subtree_colliders
        .iter()
        .copied()
        .chain(ancestor_colliders)
        .filter(|c| *c != own)
        .collect()
}

/// 对关节执行自碰撞排除
///
/// 重复调用结果不变；上次排除而本次不再需要的碰撞对会恢复接触。
pub fn exclude_self_collisions<W: ArticulationWorld>(
    registry: &mut JointRegistry,
    world: &mut W,
    id: JointId,
) -> PhysicsResult<()> {
    let Some((previous, own)) = registry.get(id).map(|j| (j.exclusions.clone(), j.collider)) else {
        return Ok(());
    };
    let Some(own) = own else {
        if let Some(joint) = registry.get_mut(id) {
            joint.exclusions.clear();
        }
        return Ok(());
    };

    let next = exclusion_set(registry, id);
    for stale in previous.difference(&next) {
        world.set_collision_ignored(own, *stale, false)?;
    }
    for member in &next {
        world.set_collision_ignored(own, *member, true)?;
    }

    if let Some(joint) = registry.get_mut(id) {
        joint.exclusions = next;
    }
    Ok(())
}

/// 单独设置（或恢复）一对碰撞体的接触忽略
///
/// 关节没有自身碰撞体，或目标就是自身碰撞体时不做任何事。
pub fn set_self_collision<W: ArticulationWorld>(
    registry: &mut JointRegistry,
    world: &mut W,
    id: JointId,
    collider: ColliderHandle,
    ignore: bool,
) -> PhysicsResult<()> {
    let Some(joint) = registry.get_mut(id) else {
        return Ok(());
    };
    let Some(own) = joint.collider else {
        log::debug!("[Chain] 关节 {:?} 没有碰撞体，忽略设置", id);
        return Ok(());
    };
    if own == collider {
        return Ok(());
    }

    world.set_collision_ignored(own, collider, ignore)?;
    if ignore {
        joint.exclusions.insert(collider);
    } else {
        joint.exclusions.remove(&collider);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hand::{JointRole, SlaveJoint};
    use crate::physics::{CapsuleShape, KinematicWorld};
    use crate::skeleton::{Pose, Skeleton};
    use glam::{Quat, Vec3};

    /// root → a → b → c，另有一个未注册的中间节点 gap 挂在 c 下，d 挂在 gap 下
    struct Fixture {
        skeleton: Skeleton,
        registry: JointRegistry,
        world: KinematicWorld,
        ids: Vec<JointId>,
    }

    fn fixture() -> Fixture {
        let mut skeleton = Skeleton::new();
        let step = Vec3::new(0.03, 0.0, 0.0);
        let root = skeleton.add_node("root", None, Vec3::ZERO, Quat::IDENTITY);
        let a = skeleton.add_node("a", Some(root), step, Quat::IDENTITY);
        let b = skeleton.add_node("b", Some(a), step, Quat::IDENTITY);
        let c = skeleton.add_node("c", Some(b), step, Quat::IDENTITY);
        let gap = skeleton.add_node("gap", Some(c), step, Quat::IDENTITY);
        let d = skeleton.add_node("d", Some(gap), step, Quat::IDENTITY);

        let mut registry = JointRegistry::new();
        let ids = vec![
            registry.register(SlaveJoint::new(root, JointRole::Root)),
            registry.register(SlaveJoint::new(a, JointRole::Hinge)),
            registry.register(SlaveJoint::new(b, JointRole::Hinge)),
            registry.register(SlaveJoint::new(c, JointRole::Hinge)),
            registry.register(SlaveJoint::new(d, JointRole::Hinge)),
        ];

        // a, b, c 各有一个碰撞体
        let mut world = KinematicWorld::new();
        let shape = CapsuleShape { height: 0.045, radius: 0.008, center: Vec3::ZERO };
        for &id in &ids[1..4] {
            let node = registry.get(id).unwrap().node;
            let body = world.require_body(node, Pose::default(), None);
            let collider = world.require_collider(node, body, &shape).unwrap();
            registry.get_mut(id).unwrap().collider = Some(collider);
        }

        Fixture { skeleton, registry, world, ids }
    }

    fn prepare(f: &mut Fixture) {
        build_chains(&mut f.registry, &f.skeleton);
        for &id in &f.ids {
            refresh_colliders(&mut f.registry, &f.skeleton, &f.world, id);
        }
    }

    #[test]
    fn test_chain_nearest_first_and_stops_at_unregistered() {
        let mut f = fixture();
        build_chains(&mut f.registry, &f.skeleton);
        let [root, a, b, c, d] = [f.ids[0], f.ids[1], f.ids[2], f.ids[3], f.ids[4]];

        assert_eq!(f.registry.get(c).unwrap().ancestors(), &[b, a, root]);
        assert_eq!(f.registry.get(c).unwrap().parent(), Some(b));
        assert!(f.registry.get(root).unwrap().ancestors().is_empty());
        assert_eq!(f.registry.get(root).unwrap().parent(), None);
        // gap 上没有关节，d 的链在此断开
        assert!(f.registry.get(d).unwrap().ancestors().is_empty());
        assert_eq!(build_chain(&mut f.registry, &f.skeleton, a), vec![root]);
    }

    #[test]
    fn test_collect_colliders_covers_subtree() {
        let mut f = fixture();
        prepare(&mut f);
        let a = f.ids[1];
        let c = f.ids[3];
        let all = collect_colliders(&f.registry, &f.skeleton, &f.world, a);
        assert_eq!(all.len(), 3);
        assert_eq!(all[0], f.registry.get(a).unwrap().collider().unwrap());
        assert_eq!(f.registry.get(c).unwrap().subtree_colliders().len(), 1);
    }

    #[test]
    fn test_exclusion_never_contains_self() {
        let mut f = fixture();
        prepare(&mut f);
        for &id in &f.ids {
            let set = exclusion_set(&f.registry, id);
            if let Some(own) = f.registry.get(id).unwrap().collider() {
                assert!(!set.contains(&own));
            }
        }
        // b: 子树 {b, c} ∪ 祖先 {a} − {b}
        let b = f.ids[2];
        let expected: BTreeSet<_> = [f.ids[1], f.ids[3]]
            .iter()
            .map(|id| f.registry.get(*id).unwrap().collider().unwrap())
            .collect();
        assert_eq!(exclusion_set(&f.registry, b), expected);
        // 根没有碰撞体，不排除任何东西
        assert!(exclusion_set(&f.registry, f.ids[0]).is_empty());
    }

    #[test]
    fn test_exclusion_symmetric_and_idempotent() {
        let mut f = fixture();
        prepare(&mut f);
        for &id in &f.ids {
            exclude_self_collisions(&mut f.registry, &mut f.world, id).unwrap();
        }
        let first = f.world.ignored_pairs().clone();
        assert_eq!(first.len(), 3);

        for &id in &f.ids {
            exclude_self_collisions(&mut f.registry, &mut f.world, id).unwrap();
        }
        assert_eq!(f.world.ignored_pairs(), &first);

        let ca = f.registry.get(f.ids[1]).unwrap().collider().unwrap();
        let cc = f.registry.get(f.ids[3]).unwrap().collider().unwrap();
        assert!(f.world.is_collision_ignored(ca, cc));
        assert!(f.world.is_collision_ignored(cc, ca));
    }

    #[test]
    fn test_stale_exclusions_are_reenabled() {
        let mut f = fixture();
        prepare(&mut f);
        let b = f.ids[2];
        let cb = f.registry.get(b).unwrap().collider().unwrap();
        let cc = f.registry.get(f.ids[3]).unwrap().collider().unwrap();
        exclude_self_collisions(&mut f.registry, &mut f.world, b).unwrap();
        assert!(f.world.is_collision_ignored(cb, cc));

        // c 从子树中消失后重新排除
        f.registry.get_mut(b).unwrap().subtree_colliders = vec![cb];
        exclude_self_collisions(&mut f.registry, &mut f.world, b).unwrap();
        assert!(!f.world.is_collision_ignored(cb, cc));
        assert!(!f.registry.get(b).unwrap().exclusions().contains(&cc));
    }

    #[test]
    fn test_set_self_collision_is_reversible() {
        let mut f = fixture();
        prepare(&mut f);
        let a = f.ids[1];
        let ca = f.registry.get(a).unwrap().collider().unwrap();
        let cc = f.registry.get(f.ids[3]).unwrap().collider().unwrap();

        set_self_collision(&mut f.registry, &mut f.world, a, cc, true).unwrap();
        assert!(f.world.is_collision_ignored(ca, cc));
        assert!(f.registry.get(a).unwrap().exclusions().contains(&cc));

        set_self_collision(&mut f.registry, &mut f.world, a, cc, false).unwrap();
        assert!(!f.world.is_collision_ignored(ca, cc));
        assert!(f.registry.get(a).unwrap().exclusions().is_empty());

        set_self_collision(&mut f.registry, &mut f.world, a, ca, true).unwrap();
        assert!(f.world.ignored_pairs().is_empty());
    }

    #[test]
    fn test_unknown_joint_is_noop() {
        let mut f = fixture();
        assert!(build_chain(&mut f.registry, &f.skeleton, JointId(42)).is_empty());
        assert!(exclusion_set(&f.registry, JointId(42)).is_empty());
        exclude_self_collisions(&mut f.registry, &mut f.world, JointId(42)).unwrap();
    }
}
