//! 依赖图构建和拓扑排序
//!
//! 分析 Pass 之间的资源依赖关系，构建 DAG 并进行拓扑排序。
//! 资源身份为 `{kind, index, subview, version}`，每个版本最多只有一个 producer。

use std::collections::HashMap;

use itertools::Itertools;

use super::resource_handle::RgResourceKey;

/// 一次访问在依赖分析中的角色
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RgDependencyRole {
    /// 读取 `key` 版本的内容
    Consume,
    /// 生成 `key` 版本
    ///
    /// `prev` 为被覆盖的版本；`reads_prev` 表示同时读取旧内容（read-write）。
    Produce { prev: Option<RgResourceKey>, reads_prev: bool },
    /// 结束 `key` 版本的使用（merge 时的子视图），必须在它的所有读者之后
    Retire,
}

/// 依赖分析的输入事件
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RgDependencyEvent {
    pub pass: usize,
    pub key: RgResourceKey,
    pub role: RgDependencyRole,
}

/// 同一个资源版本出现了两个不同的 producer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RgProducerConflict {
    pub key: RgResourceKey,
    pub first_pass: usize,
    pub second_pass: usize,
}

/// 依赖图
///
/// 表示 Pass 之间的依赖关系，用于拓扑排序和执行顺序计算。
pub struct DependencyGraph {
    /// Pass 数量
    pass_count: usize,
    /// 邻接表（出边）：producer -> [consumer]
    adjacency: Vec<Vec<usize>>,
    /// 入边：pass -> 它依赖的 pass
    dependencies: Vec<Vec<usize>>,
    /// 每个 pass 生成的资源版本
    outputs: Vec<Vec<RgResourceKey>>,
    /// 资源版本 -> 读取它的 pass
    readers: HashMap<RgResourceKey, Vec<usize>>,
}

// new & build
impl DependencyGraph {
    /// 创建新的依赖图
    pub fn new(pass_count: usize) -> Self {
        Self {
            pass_count,
            adjacency: vec![Vec::new(); pass_count],
            dependencies: vec![Vec::new(); pass_count],
            outputs: vec![Vec::new(); pass_count],
            readers: HashMap::new(),
        }
    }

    /// 添加依赖边
    ///
    /// - `producer`: 先执行的 Pass
    /// - `consumer`: 后执行的 Pass
    pub fn add_edge(&mut self, producer: usize, consumer: usize) {
        // 自环没有意义
        if producer == consumer {
            return;
        }
        // 避免重复边
        if !self.adjacency[producer].contains(&consumer) {
            self.adjacency[producer].push(consumer);
            self.dependencies[consumer].push(producer);
        }
    }

    /// 从访问事件构建依赖图
    ///
    /// 规则：
    /// - 读：依赖所读版本的 producer
    /// - 写：依赖旧版本的 producer 以及旧版本的所有读者
    /// - retire：依赖该版本的 producer 以及所有读者
    pub fn build(pass_count: usize, events: &[RgDependencyEvent]) -> Result<Self, RgProducerConflict> {
        let mut graph = Self::new(pass_count);
        let mut producers: HashMap<RgResourceKey, usize> = HashMap::new();

        for event in events {
            match event.role {
                RgDependencyRole::Consume | RgDependencyRole::Retire => {
                    graph.readers.entry(event.key).or_default().push(event.pass);
                }
                RgDependencyRole::Produce { prev, reads_prev } => {
                    match producers.get(&event.key) {
                        Some(&first_pass) if first_pass != event.pass => {
                            return Err(RgProducerConflict { key: event.key, first_pass, second_pass: event.pass });
                        }
                        Some(_) => {}
                        None => {
                            producers.insert(event.key, event.pass);
                            graph.outputs[event.pass].push(event.key);
                        }
                    }
                    if let (Some(prev), true) = (prev, reads_prev) {
                        graph.readers.entry(prev).or_default().push(event.pass);
                    }
                }
            }
        }

        for event in events {
            let depends_on_version = |graph: &mut Self, key: &RgResourceKey, with_readers: bool| {
                if let Some(&producer) = producers.get(key) {
                    graph.add_edge(producer, event.pass);
                }
                if with_readers {
                    let readers = graph.readers.get(key).cloned().unwrap_or_default();
                    for reader in readers {
                        graph.add_edge(reader, event.pass);
                    }
                }
            };

            match event.role {
                RgDependencyRole::Consume => depends_on_version(&mut graph, &event.key, false),
                RgDependencyRole::Retire => depends_on_version(&mut graph, &event.key, true),
                RgDependencyRole::Produce { prev: Some(prev), .. } => depends_on_version(&mut graph, &prev, true),
                RgDependencyRole::Produce { prev: None, .. } => {}
            }
        }

        Ok(graph)
    }
}

// getters
impl DependencyGraph {
    #[inline]
    pub fn pass_count(&self) -> usize {
        self.pass_count
    }

    /// 获取 Pass 的直接依赖（前驱）
    #[inline]
    pub fn predecessors(&self, pass_index: usize) -> &[usize] {
        &self.dependencies[pass_index]
    }

    /// 获取 Pass 的直接后继
    #[inline]
    pub fn successors(&self, pass_index: usize) -> &[usize] {
        &self.adjacency[pass_index]
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(Vec::len).sum()
    }

    /// 所有依赖边 `(producer, consumer)`
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.adjacency
            .iter()
            .enumerate()
            .flat_map(|(producer, consumers)| consumers.iter().map(move |&consumer| (producer, consumer)))
    }
}

// 排序
impl DependencyGraph {
    /// 深度优先的拓扑排序
    ///
    /// 按声明顺序依次访问 Pass，先访问它的所有依赖再输出自身。
    ///
    /// # 返回
    /// - `Ok(order)`: 排序后的 Pass 索引列表
    /// - `Err(pass)`: 检测到循环依赖，返回环上的一个 Pass
    pub fn topological_sort(&self) -> Result<Vec<usize>, usize> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            None,
            Temporary,
            Permanent,
        }

        fn visit(graph: &DependencyGraph, pass: usize, marks: &mut [Mark], order: &mut Vec<usize>) -> Result<(), usize> {
            match marks[pass] {
                Mark::Permanent => return Ok(()),
                Mark::Temporary => return Err(pass),
                Mark::None => {}
            }

            marks[pass] = Mark::Temporary;
            for &dependency in &graph.dependencies[pass] {
                visit(graph, dependency, marks, order)?;
            }
            marks[pass] = Mark::Permanent;
            order.push(pass);
            Ok(())
        }

        let mut marks = vec![Mark::None; self.pass_count];
        let mut order = Vec::with_capacity(self.pass_count);
        for pass in 0..self.pass_count {
            visit(self, pass, &mut marks, &mut order)?;
        }
        Ok(order)
    }

    /// 按最长路径深度重新分桶
    ///
    /// 深度相同的 Pass 保持 `order` 中的相对顺序；结果仍然是合法的拓扑序。
    pub fn rebucket_by_depth(&self, order: &[usize]) -> Vec<usize> {
        let mut depth = vec![0usize; self.pass_count];
        for &pass in order {
            depth[pass] = self.dependencies[pass].iter().map(|&dep| depth[dep] + 1).max().unwrap_or(0);
        }

        // sort_by_key 是稳定排序
        order.iter().copied().sorted_by_key(|&pass| depth[pass]).collect()
    }

    /// 计算存活的 Pass
    ///
    /// `roots[pass]` 为 true 的 Pass 必然存活；其余 Pass 只有当它生成的某个版本
    /// 被存活的 Pass 读取时才存活。`order` 必须是拓扑序。
    pub fn live_passes(&self, order: &[usize], roots: &[bool]) -> Vec<bool> {
        let mut live = roots.to_vec();
        for &pass in order.iter().rev() {
            if live[pass] {
                continue;
            }
            live[pass] = self.outputs[pass].iter().any(|key| {
                self.readers.get(key).is_some_and(|readers| readers.iter().any(|&reader| reader != pass && live[reader]))
            });
        }
        live
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_graph::resource_handle::RgResourceKind;

    fn key(index: u32, version: u16) -> RgResourceKey {
        RgResourceKey { kind: RgResourceKind::Buffer, index, subview: None, version }
    }

    fn write(pass: usize, index: u32, version: u16) -> RgDependencyEvent {
        RgDependencyEvent {
            pass,
            key: key(index, version),
            role: RgDependencyRole::Produce { prev: Some(key(index, version - 1)), reads_prev: false },
        }
    }

    fn read(pass: usize, index: u32, version: u16) -> RgDependencyEvent {
        RgDependencyEvent { pass, key: key(index, version), role: RgDependencyRole::Consume }
    }

    fn assert_valid_order(graph: &DependencyGraph, order: &[usize]) {
        let mut position = vec![0; order.len()];
        for (i, &pass) in order.iter().enumerate() {
            position[pass] = i;
        }
        for (producer, consumer) in graph.edges() {
            assert!(position[producer] < position[consumer], "edge {producer} -> {consumer} is backwards");
        }
    }

    #[test]
    fn test_write_after_read_depends_on_readers() {
        // pass 0 读 v0，pass 1 写 v1，pass 2 读 v1
        let events = [read(0, 0, 0), write(1, 0, 1), read(2, 0, 1)];
        let graph = DependencyGraph::build(3, &events).unwrap();

        assert_eq!(graph.predecessors(1), &[0]);
        assert_eq!(graph.predecessors(2), &[1]);
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_declaration_order_does_not_matter() {
        // 读者先于写者声明
        let events = [read(0, 0, 1), write(1, 0, 1)];
        let graph = DependencyGraph::build(2, &events).unwrap();
        let order = graph.topological_sort().unwrap();

        assert_eq!(order, vec![1, 0]);
        assert_valid_order(&graph, &order);
    }

    #[test]
    fn test_cycle_names_a_pass() {
        // pass 0 读 b 的 v1（pass 1 生成），pass 1 读 a 的 v1（pass 0 生成）
        let events = [write(0, 0, 1), read(0, 1, 1), write(1, 1, 1), read(1, 0, 1)];
        let graph = DependencyGraph::build(2, &events).unwrap();

        let pass = graph.topological_sort().unwrap_err();
        assert!(pass < 2);
    }

    #[test]
    fn test_conflicting_producers() {
        let events = [write(0, 0, 1), write(1, 0, 1)];
        let conflict = DependencyGraph::build(2, &events).err().unwrap();
        assert_eq!(conflict.first_pass, 0);
        assert_eq!(conflict.second_pass, 1);
        assert_eq!(conflict.key, key(0, 1));
    }

    #[test]
    fn test_rebucket_keeps_order_valid() {
        // 0 -> 1 -> 2 为一条链，3 独立，4 依赖 3
        let events = [write(0, 0, 1), read(1, 0, 1), write(1, 1, 1), read(2, 1, 1), write(3, 2, 1), read(4, 2, 1)];
        let graph = DependencyGraph::build(5, &events).unwrap();
        let order = graph.topological_sort().unwrap();
        let rebucketed = graph.rebucket_by_depth(&order);

        assert_eq!(rebucketed, vec![0, 3, 1, 4, 2]);
        assert_valid_order(&graph, &rebucketed);
    }

    #[test]
    fn test_live_passes() {
        // pass 0 的输出被 pass 1 读取，pass 1 是 root；pass 2 的输出无人读取
        let events = [write(0, 0, 1), read(1, 0, 1), write(2, 1, 1)];
        let graph = DependencyGraph::build(3, &events).unwrap();
        let order = graph.topological_sort().unwrap();

        let live = graph.live_passes(&order, &[false, true, false]);
        assert_eq!(live, vec![true, true, false]);
    }
}
