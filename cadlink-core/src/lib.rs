pub mod overlap;

pub mod geometry {
    use glam::DVec2;
    use serde::{Deserialize, Serialize};

    /// 二维点，内部以 `glam::DVec2` 表示。图纸为平面模型，不携带 Z 坐标。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_vec(vec: DVec2) -> Self {
            Self(vec)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn translate(self, offset: Vector2) -> Self {
            Self(self.0 + offset.0)
        }

        #[inline]
        pub fn distance(self, other: Point2) -> f64 {
            self.0.distance(other.0)
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }

        /// 以 `[x, y]` 形式输出，便于 JSON 报告。
        #[inline]
        pub fn to_array(self) -> [f64; 2] {
            [self.0.x, self.0.y]
        }
    }

    /// 二维向量。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Vector2(pub DVec2);

    impl Vector2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_points(start: Point2, end: Point2) -> Self {
            Self(end.0 - start.0)
        }

        #[inline]
        pub fn length(self) -> f64 {
            self.0.length()
        }

        #[inline]
        pub fn dot(self, other: Vector2) -> f64 {
            self.0.dot(other.0)
        }

        /// 二维叉积（有向面积），平行时为 0。
        #[inline]
        pub fn cross(self, other: Vector2) -> f64 {
            self.0.perp_dot(other.0)
        }

        /// 逆时针旋转 90° 的垂直向量。
        #[inline]
        pub fn perpendicular(self) -> Vector2 {
            Self(self.0.perp())
        }

        #[inline]
        pub fn scale(self, factor: f64) -> Vector2 {
            Self(self.0 * factor)
        }

        #[inline]
        pub fn normalize(self) -> Option<Self> {
            let len = self.0.length();
            if len <= f64::EPSILON {
                None
            } else {
                Some(Self(self.0 / len))
            }
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }
    }

    /// 轴对齐边界框，用于估算文档/实体范围。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Bounds2D {
        min: Point2,
        max: Point2,
    }

    impl Bounds2D {
        #[inline]
        pub fn new(min: Point2, max: Point2) -> Self {
            Self { min, max }
        }

        #[inline]
        pub fn empty() -> Self {
            Self {
                min: Point2::new(f64::INFINITY, f64::INFINITY),
                max: Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
            }
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.min.x() > self.max.x() || self.min.y() > self.max.y()
        }

        #[inline]
        pub fn min(&self) -> Point2 {
            self.min
        }

        #[inline]
        pub fn max(&self) -> Point2 {
            self.max
        }

        #[inline]
        pub fn width(&self) -> f64 {
            self.max.x() - self.min.x()
        }

        #[inline]
        pub fn height(&self) -> f64 {
            self.max.y() - self.min.y()
        }

        pub fn include_point(&mut self, point: Point2) {
            if self.is_empty() {
                self.min = point;
                self.max = point;
                return;
            }
            let min_vec = self.min.as_vec2().min(point.as_vec2());
            let max_vec = self.max.as_vec2().max(point.as_vec2());
            self.min = Point2::from_vec(min_vec);
            self.max = Point2::from_vec(max_vec);
        }

        pub fn include_bounds(&mut self, other: &Bounds2D) {
            if other.is_empty() {
                return;
            }
            self.include_point(other.min);
            self.include_point(other.max);
        }

        /// 闭区间判定，边界上的点视为在框内。
        #[inline]
        pub fn contains(&self, point: Point2) -> bool {
            !self.is_empty()
                && point.x() >= self.min.x()
                && point.x() <= self.max.x()
                && point.y() >= self.min.y()
                && point.y() <= self.max.y()
        }

        #[inline]
        pub fn center(&self) -> Point2 {
            debug_assert!(!self.is_empty());
            let min_vec = self.min.as_vec2();
            let max_vec = self.max.as_vec2();
            let center = (min_vec + max_vec) * 0.5;
            Point2::from_vec(center)
        }
    }
}

pub mod document {
    use std::collections::BTreeMap;
    use std::fmt;

    use serde::{Deserialize, Serialize};

    use crate::geometry::{Bounds2D, Point2, Vector2};

    /// AutoCAD 颜色索引（ACI）。256 = ByLayer，1..=255 为具体颜色。
    pub type AciColor = u16;

    pub const COLOR_BY_LAYER: AciColor = 256;
    pub const DEFAULT_LAYER_COLOR: AciColor = 7;
    pub const DEFAULT_LAYER: &str = "0";

    /// 图层只接受具体颜色。
    #[inline]
    pub fn is_layer_color(color: AciColor) -> bool {
        (1..=255).contains(&color)
    }

    #[derive(
        Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    )]
    pub struct EntityId(u64);

    impl EntityId {
        #[inline]
        pub fn new(raw: u64) -> Self {
            Self(raw)
        }

        /// 提供原始数值，便于序列化或日志输出。
        #[inline]
        pub fn get(self) -> u64 {
            self.0
        }
    }

    impl fmt::Display for EntityId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "#{}", self.0)
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Layer {
        pub name: String,
        pub color: AciColor,
    }

    impl Layer {
        #[inline]
        pub fn new(name: impl Into<String>) -> Self {
            Self::with_color(name, DEFAULT_LAYER_COLOR)
        }

        #[inline]
        pub fn with_color(name: impl Into<String>, color: AciColor) -> Self {
            Self {
                name: name.into(),
                color,
            }
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum EntityKind {
        Line,
        Circle,
        BlockReference,
    }

    impl EntityKind {
        pub fn as_str(self) -> &'static str {
            match self {
                EntityKind::Line => "line",
                EntityKind::Circle => "circle",
                EntityKind::BlockReference => "block_reference",
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub enum Entity {
        Line(Line),
        Circle(Circle),
        BlockReference(BlockReference),
    }

    impl Entity {
        #[inline]
        pub fn kind(&self) -> EntityKind {
            match self {
                Entity::Line(_) => EntityKind::Line,
                Entity::Circle(_) => EntityKind::Circle,
                Entity::BlockReference(_) => EntityKind::BlockReference,
            }
        }

        #[inline]
        pub fn layer_name(&self) -> &str {
            match self {
                Entity::Line(line) => &line.layer,
                Entity::Circle(circle) => &circle.layer,
                Entity::BlockReference(reference) => &reference.layer,
            }
        }

        /// 显式颜色；`None` 表示随层。
        #[inline]
        pub fn color(&self) -> Option<AciColor> {
            match self {
                Entity::Line(line) => line.color,
                Entity::Circle(circle) => circle.color,
                Entity::BlockReference(reference) => reference.color,
            }
        }

        pub fn set_color(&mut self, color: Option<AciColor>) {
            match self {
                Entity::Line(line) => line.color = color,
                Entity::Circle(circle) => circle.color = color,
                Entity::BlockReference(reference) => reference.color = color,
            }
        }

        /// 代表性坐标：线段两端点、圆心、块插入点。
        pub fn key_points(&self) -> Vec<Point2> {
            match self {
                Entity::Line(line) => vec![line.start, line.end],
                Entity::Circle(circle) => vec![circle.center],
                Entity::BlockReference(reference) => vec![reference.insert],
            }
        }

        /// 计算实体的 2D 轴对齐范围，块参照退化为插入点。
        pub fn bounds(&self) -> Option<Bounds2D> {
            let mut bounds = Bounds2D::empty();
            match self {
                Entity::Line(line) => {
                    bounds.include_point(line.start);
                    bounds.include_point(line.end);
                }
                Entity::Circle(circle) => {
                    let radius = circle.radius.abs();
                    let center = circle.center;
                    bounds.include_point(Point2::new(center.x() - radius, center.y() - radius));
                    bounds.include_point(Point2::new(center.x() + radius, center.y() + radius));
                }
                Entity::BlockReference(reference) => {
                    bounds.include_point(reference.insert);
                }
            }
            if bounds.is_empty() {
                None
            } else {
                Some(bounds)
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Line {
        pub start: Point2,
        pub end: Point2,
        pub layer: String,
        #[serde(default)]
        pub color: Option<AciColor>,
    }

    impl Line {
        pub fn new(start: Point2, end: Point2, layer: impl Into<String>) -> Self {
            Self {
                start,
                end,
                layer: layer.into(),
                color: None,
            }
        }

    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Circle {
        pub center: Point2,
        pub radius: f64,
        pub layer: String,
        #[serde(default)]
        pub color: Option<AciColor>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct BlockReference {
        pub name: String,
        pub insert: Point2,
        pub scale: Vector2,
        pub rotation: f64,
        pub layer: String,
        #[serde(default)]
        pub color: Option<AciColor>,
    }

    /// 一组实体的合并范围；没有任何实体时为 `None`。
    pub fn extents<'a>(entities: impl IntoIterator<Item = &'a Entity>) -> Option<Bounds2D> {
        let mut bounds = Bounds2D::empty();
        for entity in entities {
            if let Some(entity_bounds) = entity.bounds() {
                bounds.include_bounds(&entity_bounds);
            }
        }
        (!bounds.is_empty()).then_some(bounds)
    }

    /// 纯内存图纸：图层表与实体表。事务语义由引擎层的网关负责。
    #[derive(Debug, Default, Clone, Serialize, Deserialize)]
    pub struct Document {
        layers: BTreeMap<String, Layer>,
        entities: Vec<(EntityId, Entity)>,
        next_entity_id: u64,
    }

    #[derive(Debug, Clone, Copy)]
    pub struct DemoEntities {
        pub outer_wall: EntityId,
        pub duplicate_wall: EntityId,
        pub partition: EntityId,
        pub column: EntityId,
        pub door: EntityId,
    }

    impl Document {
        pub fn new() -> Self {
            let mut doc = Self::default();
            doc.ensure_layer(DEFAULT_LAYER);
            doc
        }

        pub fn ensure_layer(&mut self, name: impl AsRef<str>) {
            let key = name.as_ref();
            self.layers
                .entry(key.to_string())
                .or_insert_with(|| Layer::new(key));
        }

        /// 新增图层，同名图层已存在时返回 `false` 且不做修改。
        pub fn add_layer(&mut self, layer: Layer) -> bool {
            if self.layers.contains_key(&layer.name) {
                return false;
            }
            self.layers.insert(layer.name.clone(), layer);
            true
        }

        #[inline]
        pub fn layer(&self, name: &str) -> Option<&Layer> {
            self.layers.get(name)
        }

        #[inline]
        pub fn layer_mut(&mut self, name: &str) -> Option<&mut Layer> {
            self.layers.get_mut(name)
        }

        /// 按名称排序返回图层。
        #[inline]
        pub fn layers(&self) -> impl Iterator<Item = &Layer> {
            self.layers.values()
        }

        pub fn add_line(
            &mut self,
            start: Point2,
            end: Point2,
            layer: impl Into<String>,
        ) -> EntityId {
            self.add_entity(Entity::Line(Line::new(start, end, layer)))
        }

        pub fn add_circle(
            &mut self,
            center: Point2,
            radius: f64,
            layer: impl Into<String>,
        ) -> EntityId {
            self.add_entity(Entity::Circle(Circle {
                center,
                radius,
                layer: layer.into(),
                color: None,
            }))
        }

        pub fn add_block_reference(
            &mut self,
            name: impl Into<String>,
            insert: Point2,
            layer: impl Into<String>,
        ) -> EntityId {
            self.add_entity(Entity::BlockReference(BlockReference {
                name: name.into(),
                insert,
                scale: Vector2::new(1.0, 1.0),
                rotation: 0.0,
                layer: layer.into(),
                color: None,
            }))
        }

        pub fn add_entity(&mut self, entity: Entity) -> EntityId {
            self.ensure_layer(entity.layer_name());
            let id = self.next_id();
            self.entities.push((id, entity));
            id
        }

        /// 原位替换实体，保持实体顺序与 ID；返回旧实体。
        pub fn replace_entity(&mut self, id: EntityId, entity: Entity) -> Option<Entity> {
            self.ensure_layer(entity.layer_name());
            let slot = self
                .entities
                .iter_mut()
                .find(|(entity_id, _)| *entity_id == id)?;
            Some(std::mem::replace(&mut slot.1, entity))
        }

        pub fn remove_entity(&mut self, id: EntityId) -> Option<Entity> {
            let index = self
                .entities
                .iter()
                .position(|(entity_id, _)| *entity_id == id)?;
            Some(self.entities.remove(index).1)
        }

        #[inline]
        pub fn entities(&self) -> impl Iterator<Item = &(EntityId, Entity)> {
            self.entities.iter()
        }

        #[inline]
        pub fn entity_count(&self) -> usize {
            self.entities.len()
        }

        #[inline]
        pub fn entity(&self, id: EntityId) -> Option<&Entity> {
            self.entities
                .iter()
                .find_map(|(entity_id, entity)| (*entity_id == id).then_some(entity))
        }

        /// 填充一组带重叠与断缝的示例图元，便于联调清理/连接命令。
        pub fn populate_demo(&mut self) -> DemoEntities {
            self.add_layer(Layer::with_color("A-WALL", 1));
            self.add_layer(Layer::with_color("A-COLS", 3));
            self.add_layer(Layer::with_color("A-DOOR", 4));

            let outer_wall =
                self.add_line(Point2::new(0.0, 0.0), Point2::new(6000.0, 0.0), "A-WALL");
            let duplicate_wall =
                self.add_line(Point2::new(1500.0, 0.0), Point2::new(3000.0, 0.0), "A-WALL");
            let partition = self.add_line(
                Point2::new(6000.0, 0.5),
                Point2::new(6000.0, 4000.0),
                "A-WALL",
            );
            let column = self.add_circle(Point2::new(3000.0, 2000.0), 200.0, "A-COLS");
            let door = self.add_block_reference("DOOR-900", Point2::new(1200.0, 0.0), "A-DOOR");

            DemoEntities {
                outer_wall,
                duplicate_wall,
                partition,
                column,
                door,
            }
        }

        #[inline]
        fn next_id(&mut self) -> EntityId {
            let id = self.next_entity_id;
            self.next_entity_id += 1;
            EntityId(id)
        }
    }

}
