//! 宿主图纸的窄接口。
//!
//! 命令处理器只通过这里的 trait 读写图纸：每条命令打开一个 [`MutationScope`]，
//! 成功时 `commit`，出错时直接丢弃作用域即回滚。真实 CAD 宿主与内存实现
//! （见 [`crate::memory`]）都实现同一组 trait。

use cadlink_core::document::{AciColor, Entity, EntityId, EntityKind, Layer};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    #[error("layer '{0}' does not exist")]
    UnknownLayer(String),
    #[error("layer '{0}' already exists")]
    DuplicateLayer(String),
    #[error("invalid layer name '{0}'")]
    InvalidLayerName(String),
    #[error("entity {0} not found")]
    EntityNotFound(EntityId),
    #[error("color {0} is not a valid ACI index for this operation")]
    InvalidColor(AciColor),
    #[error("document rejected the change: {0}")]
    Rejected(String),
}

/// 实体枚举条件，字段为空表示不过滤。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityFilter {
    pub kind: Option<EntityKind>,
    pub layer: Option<String>,
}

impl EntityFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn of_kind(kind: EntityKind) -> Self {
        Self {
            kind: Some(kind),
            layer: None,
        }
    }

    pub fn on_layer(mut self, layer: Option<String>) -> Self {
        self.layer = layer;
        self
    }

    pub fn matches(&self, entity: &Entity) -> bool {
        self.kind.is_none_or(|kind| entity.kind() == kind)
            && self
                .layer
                .as_deref()
                .is_none_or(|layer| entity.layer_name() == layer)
    }
}

/// 一次图纸写访问。丢弃而未提交即视为中止。
pub trait MutationScope {
    /// 按图纸顺序返回满足条件的实体快照。
    fn entities(&self, filter: &EntityFilter) -> Vec<(EntityId, Entity)>;
    fn entity(&self, id: EntityId) -> Option<Entity>;
    fn add_entity(&mut self, entity: Entity) -> Result<EntityId, GatewayError>;
    fn replace_entity(&mut self, id: EntityId, entity: Entity) -> Result<(), GatewayError>;
    fn remove_entity(&mut self, id: EntityId) -> Result<(), GatewayError>;

    /// 按名称排序。
    fn layers(&self) -> Vec<Layer>;
    fn layer(&self, name: &str) -> Option<Layer>;
    fn add_layer(&mut self, layer: Layer) -> Result<(), GatewayError>;
    fn set_layer_color(&mut self, name: &str, color: AciColor) -> Result<(), GatewayError>;

    fn commit(self: Box<Self>) -> Result<(), GatewayError>;
}

/// 一份打开的图纸。
pub trait DrawingDocument {
    fn name(&self) -> &str;
    fn open_scope(&mut self) -> Result<Box<dyn MutationScope + '_>, GatewayError>;
}

/// 宿主应用：可能没有任何打开的图纸。
pub trait DocumentHost {
    fn active_document(&mut self) -> Option<&mut dyn DrawingDocument>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadlink_core::document::Line;
    use cadlink_core::geometry::Point2;

    #[test]
    fn filter_matches_kind_and_layer() {
        let line = Entity::Line(Line::new(
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            "A-WALL",
        ));

        assert!(EntityFilter::all().matches(&line));
        assert!(EntityFilter::of_kind(EntityKind::Line).matches(&line));
        assert!(!EntityFilter::of_kind(EntityKind::Circle).matches(&line));
        assert!(
            EntityFilter::of_kind(EntityKind::Line)
                .on_layer(Some("A-WALL".to_string()))
                .matches(&line)
        );
        assert!(
            !EntityFilter::all()
                .on_layer(Some("0".to_string()))
                .matches(&line)
        );
    }
}
