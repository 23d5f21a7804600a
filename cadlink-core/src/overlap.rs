//! 线段重叠与端点连接计算。
//!
//! 全部为纯函数：输入是某次变更作用域内取得的只读线段快照，输出是待删除的
//! 实体集合或待执行的端点吸附计划，由调用方在同一作用域内落地。
//!
//! 两两比较的复杂度为 O(n²)，因此所有入口都先做数量上限检查，超过
//! [`MAX_SEGMENTS`] 时直接失败，而不是在单线程的变更上下文里长时间阻塞。

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::{EntityId, Line};
use crate::geometry::{Point2, Vector2};

/// 单次计算允许的最大线段数量。
pub const MAX_SEGMENTS: usize = 5000;

/// 默认几何容差（图纸单位）。
pub const DEFAULT_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error(
        "too many elements: {count} lines exceed the limit of {limit}; filter your input (for example by layer)"
    )]
    TooManySegments { count: usize, limit: usize },
    #[error("tolerance must be a positive finite number, got {0}")]
    InvalidTolerance(f64),
}

/// 几何计算视角下的线段：两端点 + 实体标识 + 图层。
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub id: EntityId,
    pub start: Point2,
    pub end: Point2,
    pub layer: String,
}

impl Segment {
    pub fn new(id: EntityId, start: Point2, end: Point2, layer: impl Into<String>) -> Self {
        Self {
            id,
            start,
            end,
            layer: layer.into(),
        }
    }

    pub fn from_line(id: EntityId, line: &Line) -> Self {
        Self::new(id, line.start, line.end, line.layer.clone())
    }

    #[inline]
    pub fn direction(&self) -> Vector2 {
        Vector2::from_points(self.start, self.end)
    }

    #[inline]
    pub fn length(&self) -> f64 {
        self.start.distance(self.end)
    }

    /// 长度低于容差的线段视为退化，不参与任何重叠或连接计算。
    #[inline]
    pub fn is_degenerate(&self, tolerance: f64) -> bool {
        self.length() < tolerance
    }

    #[inline]
    pub fn endpoint(&self, endpoint: Endpoint) -> Point2 {
        match endpoint {
            Endpoint::Start => self.start,
            Endpoint::End => self.end,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Start,
    End,
}

/// 端点吸附：把 `id` 的 `endpoint` 移动到 `target`。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snap {
    pub id: EntityId,
    pub endpoint: Endpoint,
    pub target: Point2,
}

/// 端点组合的尝试顺序，命中第一个即视为该线段对已处理。
const ENDPOINT_PAIRS: [(Endpoint, Endpoint); 4] = [
    (Endpoint::Start, Endpoint::Start),
    (Endpoint::Start, Endpoint::End),
    (Endpoint::End, Endpoint::Start),
    (Endpoint::End, Endpoint::End),
];

fn guard_scale(count: usize) -> Result<(), GeometryError> {
    if count > MAX_SEGMENTS {
        return Err(GeometryError::TooManySegments {
            count,
            limit: MAX_SEGMENTS,
        });
    }
    Ok(())
}

/// 判定两条线段是否共线且存在正长度的公共区间。
///
/// 仅共享端点（首尾相接）不算重叠：区间比较带有 `tolerance` 余量的严格不等式。
pub fn are_overlapping(a: &Segment, b: &Segment, tolerance: f64) -> bool {
    if a.is_degenerate(tolerance) || b.is_degenerate(tolerance) {
        return false;
    }

    let v1 = a.direction();
    let v2 = b.direction();
    let len1 = v1.length();
    let len2 = v2.length();

    if v1.cross(v2).abs() > tolerance * len1 * len2 {
        return false;
    }

    let dir = v1.scale(1.0 / len1);
    let to_start = Vector2::from_points(a.start, b.start);
    if dir.cross(to_start).abs() > tolerance {
        return false;
    }

    let t_start = to_start.dot(dir);
    let t_end = Vector2::from_points(a.start, b.end).dot(dir);
    let (min2, max2) = if t_start <= t_end {
        (t_start, t_end)
    } else {
        (t_end, t_start)
    };

    min2.max(0.0) < len1.min(max2) - tolerance
}

/// 返回所有重叠线段对的下标 `(i, j)`，`i < j`，每对只出现一次。
pub fn find_overlaps(
    segments: &[Segment],
    tolerance: f64,
) -> Result<Vec<(usize, usize)>, GeometryError> {
    guard_scale(segments.len())?;

    let mut pairs = Vec::new();
    for i in 0..segments.len() {
        for j in (i + 1)..segments.len() {
            if are_overlapping(&segments[i], &segments[j], tolerance) {
                pairs.push((i, j));
            }
        }
    }
    Ok(pairs)
}

/// 单遍清理：每个重叠对删除较短者（等长时删除后出现的一条）。
///
/// 已标记删除的线段不再参与后续比较。保留下来的线段之间不会再有重叠，但删除集合
/// 不保证最小：链式重叠 A-B-C 中可能删掉 A 与 C，而只删 B 就足够。
pub fn plan_cleanup(
    segments: &[Segment],
    tolerance: f64,
) -> Result<BTreeSet<EntityId>, GeometryError> {
    guard_scale(segments.len())?;

    let mut removed: HashSet<usize> = HashSet::new();
    for i in 0..segments.len() {
        if removed.contains(&i) {
            continue;
        }
        for j in (i + 1)..segments.len() {
            if removed.contains(&j) {
                continue;
            }
            if !are_overlapping(&segments[i], &segments[j], tolerance) {
                continue;
            }
            if segments[i].length() < segments[j].length() {
                removed.insert(i);
                break;
            }
            removed.insert(j);
        }
    }

    Ok(removed.into_iter().map(|index| segments[index].id).collect())
}

/// 为端点距离在 `(0, snap_distance]` 内的线段对生成吸附计划。
///
/// 每对线段按固定顺序尝试四种端点组合，首个命中的组合把前一条线段的端点移到
/// 后一条线段的端点上。距离为 0 的端点已重合，不计入。长度不超过 `tolerance`
/// 的退化线段既不吸附也不作为目标。
pub fn plan_connections(
    segments: &[Segment],
    tolerance: f64,
    snap_distance: f64,
) -> Result<Vec<Snap>, GeometryError> {
    if !snap_distance.is_finite() || snap_distance <= 0.0 {
        return Err(GeometryError::InvalidTolerance(snap_distance));
    }
    guard_scale(segments.len())?;

    let mut snaps = Vec::new();
    for i in 0..segments.len() {
        let a = &segments[i];
        if a.is_degenerate(tolerance) {
            continue;
        }
        for b in &segments[(i + 1)..] {
            if b.id == a.id || b.is_degenerate(tolerance) {
                continue;
            }
            let hit = ENDPOINT_PAIRS.iter().find_map(|&(from, to)| {
                let target = b.endpoint(to);
                let distance = a.endpoint(from).distance(target);
                (distance > 0.0 && distance <= snap_distance).then_some(Snap {
                    id: a.id,
                    endpoint: from,
                    target,
                })
            });
            if let Some(snap) = hit {
                snaps.push(snap);
            }
        }
    }
    Ok(snaps)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = DEFAULT_TOLERANCE;

    fn seg(id: u64, x1: f64, y1: f64, x2: f64, y2: f64) -> Segment {
        Segment::new(
            EntityId::new(id),
            Point2::new(x1, y1),
            Point2::new(x2, y2),
            "0",
        )
    }

    #[test]
    fn non_parallel_segments_never_overlap() {
        let cases = [
            (seg(0, 0.0, 0.0, 10.0, 0.0), seg(1, 5.0, -5.0, 5.0, 5.0)),
            (seg(0, 0.0, 0.0, 10.0, 10.0), seg(1, 0.0, 0.0, 10.0, 9.0)),
            (seg(0, 0.0, 0.0, 1.0, 0.0), seg(1, 0.0, 0.0, 1.0, 0.001)),
        ];
        for (a, b) in &cases {
            assert!(!are_overlapping(a, b, EPS), "{a:?} vs {b:?}");
            assert!(!are_overlapping(b, a, EPS), "{b:?} vs {a:?}");
        }
    }

    #[test]
    fn parallel_offset_segments_do_not_overlap() {
        let a = seg(0, 0.0, 0.0, 10.0, 0.0);
        let b = seg(1, 2.0, 1.0, 8.0, 1.0);
        assert!(!are_overlapping(&a, &b, EPS));
        let c = seg(2, 8.0, 1e-3, 2.0, 1e-3);
        assert!(!are_overlapping(&a, &c, EPS));
    }

    #[test]
    fn touching_endpoints_are_not_an_overlap() {
        let a = seg(0, 0.0, 0.0, 1.0, 0.0);
        let b = seg(1, 1.0, 0.0, 2.0, 0.0);
        assert!(!are_overlapping(&a, &b, EPS));
        assert!(!are_overlapping(&b, &a, EPS));

        let reversed = seg(2, 3.0, 0.0, 1.0, 0.0);
        assert!(!are_overlapping(&a, &reversed, EPS));
    }

    #[test]
    fn collinear_shared_interval_overlaps_in_both_orders() {
        let a = seg(0, 0.0, 0.0, 4.0, 0.0);
        let b = seg(1, 3.0, 0.0, 6.0, 0.0);
        assert!(are_overlapping(&a, &b, EPS));
        assert!(are_overlapping(&b, &a, EPS));

        let diagonal = seg(2, 0.0, 0.0, 3.0, 3.0);
        let contained_reversed = seg(3, 2.0, 2.0, 1.0, 1.0);
        assert!(are_overlapping(&diagonal, &contained_reversed, EPS));
    }

    #[test]
    fn degenerate_segments_are_ignored() {
        let a = seg(0, 0.0, 0.0, 4.0, 0.0);
        let point = seg(1, 1.0, 0.0, 1.0, 0.0);
        assert!(!are_overlapping(&a, &point, EPS));
        assert!(!are_overlapping(&point, &a, EPS));
    }

    #[test]
    fn find_overlaps_reports_each_pair_once() {
        let segments = vec![
            seg(0, 0.0, 0.0, 4.0, 0.0),
            seg(1, 10.0, 10.0, 20.0, 10.0),
            seg(2, 3.0, 0.0, 6.0, 0.0),
        ];
        let pairs = find_overlaps(&segments, EPS).unwrap();
        assert_eq!(pairs, vec![(0, 2)]);

        let reversed: Vec<_> = segments.iter().rev().cloned().collect();
        assert_eq!(find_overlaps(&reversed, EPS).unwrap(), vec![(0, 2)]);
    }

    #[test]
    fn scale_guard_rejects_oversized_input() {
        let segments: Vec<_> = (0..=MAX_SEGMENTS as u64)
            .map(|i| seg(i, 0.0, i as f64, 1.0, i as f64))
            .collect();
        assert_eq!(segments.len(), 5001);

        let expected = GeometryError::TooManySegments {
            count: 5001,
            limit: 5000,
        };
        assert_eq!(find_overlaps(&segments, EPS).unwrap_err(), expected);
        assert_eq!(plan_cleanup(&segments, EPS).unwrap_err(), expected);
        assert_eq!(plan_connections(&segments, EPS, 1.0).unwrap_err(), expected);
        assert!(expected.to_string().contains("filter your input"));
    }

    #[test]
    fn cleanup_keeps_the_longest_of_three() {
        let segments = vec![
            seg(1, 0.0, 0.0, 1.0, 0.0),
            seg(2, 0.0, 0.0, 2.0, 0.0),
            seg(3, 0.0, 0.0, 3.0, 0.0),
        ];
        let removed = plan_cleanup(&segments, EPS).unwrap();
        assert_eq!(
            removed,
            BTreeSet::from([EntityId::new(1), EntityId::new(2)])
        );

        let survivors: Vec<_> = segments
            .into_iter()
            .filter(|s| !removed.contains(&s.id))
            .collect();
        assert!(plan_cleanup(&survivors, EPS).unwrap().is_empty());
    }

    #[test]
    fn cleanup_tie_removes_the_later_segment() {
        let segments = vec![seg(7, 0.0, 0.0, 5.0, 0.0), seg(8, 5.0, 0.0, 0.0, 0.0)];
        let removed = plan_cleanup(&segments, EPS).unwrap();
        assert_eq!(removed, BTreeSet::from([EntityId::new(8)]));
    }

    #[test]
    fn single_pass_cleanup_is_not_minimal() {
        // A 与 B 重叠、B 与 C 重叠，A 与 C 互不相交：只删 B 即可，单遍策略会删掉 A 和 C。
        let chain = vec![
            seg(0, 0.0, 0.0, 4.0, 0.0),
            seg(1, 3.0, 0.0, 8.0, 0.0),
            seg(2, 7.0, 0.0, 12.0, 0.0),
        ];
        let removed = plan_cleanup(&chain, EPS).unwrap();
        assert_eq!(removed, BTreeSet::from([EntityId::new(0), EntityId::new(2)]));

        let survivors: Vec<_> = chain
            .iter()
            .filter(|s| !removed.contains(&s.id))
            .cloned()
            .collect();
        assert!(find_overlaps(&survivors, EPS).unwrap().is_empty());
        assert!(plan_cleanup(&survivors, EPS).unwrap().is_empty());
    }

    #[test]
    fn cleanup_survivors_never_overlap() {
        let segments = vec![
            seg(0, 0.0, 0.0, 10.0, 0.0),
            seg(1, 8.0, 0.0, 12.0, 0.0),
            seg(2, 11.0, 0.0, 20.0, 0.0),
            seg(3, 2.0, 0.0, 3.0, 0.0),
            seg(4, 0.0, 5.0, 9.0, 5.0),
            seg(5, 4.0, 5.0, 6.0, 5.0),
        ];
        let removed = plan_cleanup(&segments, EPS).unwrap();
        let survivors: Vec<_> = segments
            .iter()
            .filter(|s| !removed.contains(&s.id))
            .cloned()
            .collect();
        assert!(find_overlaps(&survivors, EPS).unwrap().is_empty());
        assert!(survivors.iter().any(|s| s.id == EntityId::new(4)));
    }

    #[test]
    fn connections_snap_within_tolerance() {
        let segments = vec![seg(0, 0.0, 0.0, 10.0, 0.0), seg(1, 13.0, 0.0, 20.0, 0.0)];

        let snaps = plan_connections(&segments, EPS, 5.0).unwrap();
        assert_eq!(
            snaps,
            vec![Snap {
                id: EntityId::new(0),
                endpoint: Endpoint::End,
                target: Point2::new(13.0, 0.0),
            }]
        );

        assert!(plan_connections(&segments, EPS, 2.0).unwrap().is_empty());
    }

    #[test]
    fn connections_use_first_matching_combination_only() {
        // 两个组合都在容差内，只取优先级最高的 start↔start。
        let segments = vec![seg(0, 0.0, 0.0, 1.0, 0.0), seg(1, 0.0, 0.5, 1.0, 0.5)];
        let snaps = plan_connections(&segments, EPS, 1.0).unwrap();
        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0].endpoint, Endpoint::Start);
        assert_eq!(snaps[0].target, Point2::new(0.0, 0.5));
    }

    #[test]
    fn coincident_endpoints_are_not_snapped() {
        let segments = vec![seg(0, 0.0, 0.0, 10.0, 0.0), seg(1, 10.0, 0.0, 10.0, 10.0)];
        assert!(plan_connections(&segments, EPS, 5.0).unwrap().is_empty());
    }

    #[test]
    fn connections_reject_invalid_tolerance() {
        let segments = vec![seg(0, 0.0, 0.0, 10.0, 0.0)];
        assert_eq!(
            plan_connections(&segments, EPS, 0.0).unwrap_err(),
            GeometryError::InvalidTolerance(0.0)
        );
        assert!(plan_connections(&segments, EPS, f64::NAN).is_err());
    }

    #[test]
    fn degenerate_segments_are_never_snapped() {
        let segments = vec![
            seg(0, 0.0, 0.0, 10.0, 0.0),
            seg(1, 10.0, 0.5, 10.0, 0.5),
            seg(2, 10.5, 0.0, 10.505, 0.0),
        ];

        // 零长度线段始终被排除；0.005 长的线段只在 ε 更大时才算退化。
        let snaps = plan_connections(&segments, EPS, 1.0).unwrap();
        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0].id, EntityId::new(0));
        assert_eq!(snaps[0].target, Point2::new(10.5, 0.0));

        assert!(plan_connections(&segments, 0.01, 1.0).unwrap().is_empty());
    }
}
