//! 关节注册表
//!
//! 从关节的 arena。槽位在注销后置空并可复用，`JointId` 在关节存活期间稳定。

use std::collections::HashMap;

use super::SlaveJoint;
use crate::skeleton::NodeId;

/// 关节标识（注册表槽位）
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JointId(pub usize);

#[derive(Clone, Debug, Default)]
pub struct JointRegistry {
    slots: Vec<Option<SlaveJoint>>,
    free: Vec<usize>,
    by_node: HashMap<NodeId, JointId>,
}

impl JointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册关节；节点上已有关节时返回已有的标识，不替换
    pub fn register(&mut self, joint: SlaveJoint) -> JointId {
        if let Some(existing) = self.by_node.get(&joint.node) {
            return *existing;
        }

        let node = joint.node;
        let id = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(joint);
                JointId(slot)
            }
            None => {
                self.slots.push(Some(joint));
                JointId(self.slots.len() - 1)
            }
        };
        self.by_node.insert(node, id);
        id
    }

    /// 注销关节，返回被移除的记录
    pub fn unregister(&mut self, id: JointId) -> Option<SlaveJoint> {
        let joint = self.slots.get_mut(id.0)?.take()?;
        self.by_node.remove(&joint.node);
        self.free.push(id.0);
        Some(joint)
    }

    #[inline]
    pub fn get(&self, id: JointId) -> Option<&SlaveJoint> {
        self.slots.get(id.0).and_then(|s| s.as_ref())
    }

    #[inline]
    pub fn get_mut(&mut self, id: JointId) -> Option<&mut SlaveJoint> {
        self.slots.get_mut(id.0).and_then(|s| s.as_mut())
    }

    /// 节点上注册的关节
    #[inline]
    pub fn joint_at(&self, node: NodeId) -> Option<JointId> {
        self.by_node.get(&node).copied()
    }

    #[inline]
    pub fn contains(&self, id: JointId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.by_node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_node.is_empty()
    }

    /// 按槽位顺序遍历存活关节
    pub fn iter(&self) -> impl Iterator<Item = (JointId, &SlaveJoint)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|j| (JointId(i), j)))
    }

    pub fn ids(&self) -> Vec<JointId> {
        self.iter().map(|(id, _)| id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hand::JointRole;

    #[test]
    fn test_register_is_idempotent_per_node() {
        let mut registry = JointRegistry::new();
        let a = registry.register(SlaveJoint::new(NodeId(3), JointRole::Hinge));
        let b = registry.register(SlaveJoint::new(NodeId(3), JointRole::Ball));
        assert_eq!(a, b);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(a).unwrap().role, JointRole::Hinge);
    }

    #[test]
    fn test_unregister_frees_slot() {
        let mut registry = JointRegistry::new();
        let a = registry.register(SlaveJoint::new(NodeId(1), JointRole::Hinge));
        let b = registry.register(SlaveJoint::new(NodeId(2), JointRole::Hinge));

        let removed = registry.unregister(a).unwrap();
        assert_eq!(removed.node, NodeId(1));
        assert!(registry.joint_at(NodeId(1)).is_none());
        assert!(registry.unregister(a).is_none());
        assert_eq!(registry.ids(), vec![b]);

        let c = registry.register(SlaveJoint::new(NodeId(5), JointRole::Hinge));
        assert_eq!(c, a);
        assert_eq!(registry.joint_at(NodeId(5)), Some(c));
    }
}
