//! 节点集合 - 参考 nphysics Multibody 设计
//!
//! 节点按添加顺序存放，父节点必须先于子节点加入，
//! 因此一次正向遍历即可完成全局变换更新。

use glam::{Quat, Vec3};

use super::{NodeId, Pose, PoseSource, SkeletonNode};

/// 骨骼层级 arena
#[derive(Clone, Debug, Default)]
pub struct Skeleton {
    nodes: Vec<SkeletonNode>,
    /// 子节点缓存（与 nodes 同索引）
    children_cache: Vec<Vec<NodeId>>,
}

impl Skeleton {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加节点并立即计算其全局变换
    ///
    /// `parent` 必须是已存在的节点；否则按根节点处理。
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        parent: Option<NodeId>,
        translation: Vec3,
        rotation: Quat,
    ) -> NodeId {
        let id = self.nodes.len();
        let parent = parent.filter(|p| p.0 < id);

        let mut node = SkeletonNode::new(name);
        node.parent_index = parent.map_or(-1, |p| p.0 as i32);
        node.local_translation = translation;
        node.local_rotation = rotation;

        self.nodes.push(node);
        self.children_cache.push(Vec::new());
        if let Some(p) = parent {
            self.children_cache[p.0].push(NodeId(id));
        }

        self.update_global_transform_recursive(id);
        NodeId(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&SkeletonNode> {
        self.nodes.get(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &SkeletonNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    /// 按名称查找（全局）
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.name == name).map(NodeId)
    }

    /// 设置局部旋转，并更新子树全局变换
    pub fn set_local_rotation(&mut self, id: NodeId, rotation: Quat) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.local_rotation = rotation;
            self.update_global_transform_recursive(id.0);
        }
    }

    /// 设置局部平移，并更新子树全局变换
    pub fn set_local_translation(&mut self, id: NodeId, translation: Vec3) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.local_translation = translation;
            self.update_global_transform_recursive(id.0);
        }
    }

    /// 同时设置局部平移与旋转
    pub fn set_local_pose(&mut self, id: NodeId, translation: Vec3, rotation: Quat) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.local_translation = translation;
            node.local_rotation = rotation;
            self.update_global_transform_recursive(id.0);
        }
    }

    /// 递归更新节点及其所有子节点的全局变换
    fn update_global_transform_recursive(&mut self, index: usize) {
        let mut stack = vec![index];
        while let Some(i) = stack.pop() {
            self.nodes[i].compute_local_transform();
            let parent_to_world = match self.nodes[i].parent_id() {
                Some(p) => self.nodes[p].local_to_world,
                None => glam::Mat4::IDENTITY,
            };
            self.nodes[i].local_to_world = parent_to_world * self.nodes[i].local_to_parent;
            stack.extend(self.children_cache[i].iter().map(|c| c.0));
        }
    }
}

impl PoseSource for Skeleton {
    fn name(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(node.0).map(|n| n.name.as_str())
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node.0).and_then(|n| n.parent_id()).map(NodeId)
    }

    fn children(&self, node: NodeId) -> &[NodeId] {
        self.children_cache
            .get(node.0)
            .map(|c| c.as_slice())
            .unwrap_or(&[])
    }

    fn world_pose(&self, node: NodeId) -> Option<Pose> {
        self.nodes.get(node.0).map(|n| n.world_pose())
    }

    fn local_rotation(&self, node: NodeId) -> Option<Quat> {
        self.nodes.get(node.0).map(|n| n.local_rotation)
    }
}
