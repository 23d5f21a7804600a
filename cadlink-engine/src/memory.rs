//! 基于 `cadlink_core::document::Document` 的内存宿主。
//!
//! 作用域在文档副本上工作，提交时整体替换，未提交即丢弃副本，从而获得与真实
//! CAD 事务一致的提交/回滚语义。无头运行与测试都使用它。

use cadlink_core::document::{
    AciColor, COLOR_BY_LAYER, Document, Entity, EntityId, Layer, is_layer_color,
};
use tracing::trace;

use crate::gateway::{DocumentHost, DrawingDocument, EntityFilter, GatewayError, MutationScope};

/// AutoCAD 图层名中不允许出现的字符。
const FORBIDDEN_LAYER_CHARS: &[char] = &['<', '>', '/', '\\', '"', ':', ';', '?', '*', '|', '=', '`'];

#[derive(Debug, Clone)]
pub struct MemoryDocument {
    name: String,
    document: Document,
    read_only: bool,
}

impl MemoryDocument {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_document(name, Document::new())
    }

    pub fn with_document(name: impl Into<String>, document: Document) -> Self {
        Self {
            name: name.into(),
            document,
            read_only: false,
        }
    }

    #[inline]
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// 只读图纸拒绝打开写作用域。
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }
}

impl DrawingDocument for MemoryDocument {
    fn name(&self) -> &str {
        &self.name
    }

    fn open_scope(&mut self) -> Result<Box<dyn MutationScope + '_>, GatewayError> {
        if self.read_only {
            return Err(GatewayError::Rejected(format!(
                "document '{}' is read-only",
                self.name
            )));
        }
        trace!(document = %self.name, "打开内存事务");
        let working = self.document.clone();
        Ok(Box::new(MemoryScope {
            target: &mut self.document,
            working,
        }))
    }
}

struct MemoryScope<'a> {
    target: &'a mut Document,
    working: Document,
}

impl MemoryScope<'_> {
    fn check_entity(&self, entity: &Entity) -> Result<(), GatewayError> {
        if self.working.layer(entity.layer_name()).is_none() {
            return Err(GatewayError::UnknownLayer(entity.layer_name().to_string()));
        }
        match entity.color() {
            Some(color) if color > COLOR_BY_LAYER => Err(GatewayError::InvalidColor(color)),
            _ => Ok(()),
        }
    }
}

impl MutationScope for MemoryScope<'_> {
    fn entities(&self, filter: &EntityFilter) -> Vec<(EntityId, Entity)> {
        self.working
            .entities()
            .filter(|(_, entity)| filter.matches(entity))
            .cloned()
            .collect()
    }

    fn entity(&self, id: EntityId) -> Option<Entity> {
        self.working.entity(id).cloned()
    }

    fn add_entity(&mut self, entity: Entity) -> Result<EntityId, GatewayError> {
        self.check_entity(&entity)?;
        Ok(self.working.add_entity(entity))
    }

    fn replace_entity(&mut self, id: EntityId, entity: Entity) -> Result<(), GatewayError> {
        self.check_entity(&entity)?;
        self.working
            .replace_entity(id, entity)
            .map(|_| ())
            .ok_or(GatewayError::EntityNotFound(id))
    }

    fn remove_entity(&mut self, id: EntityId) -> Result<(), GatewayError> {
        self.working
            .remove_entity(id)
            .map(|_| ())
            .ok_or(GatewayError::EntityNotFound(id))
    }

    fn layers(&self) -> Vec<Layer> {
        self.working.layers().cloned().collect()
    }

    fn layer(&self, name: &str) -> Option<Layer> {
        self.working.layer(name).cloned()
    }

    fn add_layer(&mut self, layer: Layer) -> Result<(), GatewayError> {
        let name = layer.name.trim();
        if name.is_empty() || name.contains(FORBIDDEN_LAYER_CHARS) {
            return Err(GatewayError::InvalidLayerName(layer.name));
        }
        if !is_layer_color(layer.color) {
            return Err(GatewayError::InvalidColor(layer.color));
        }
        if self.working.add_layer(layer.clone()) {
            Ok(())
        } else {
            Err(GatewayError::DuplicateLayer(layer.name))
        }
    }

    fn set_layer_color(&mut self, name: &str, color: AciColor) -> Result<(), GatewayError> {
        if !is_layer_color(color) {
            return Err(GatewayError::InvalidColor(color));
        }
        let layer = self
            .working
            .layer_mut(name)
            .ok_or_else(|| GatewayError::UnknownLayer(name.to_string()))?;
        layer.color = color;
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<(), GatewayError> {
        let scope = *self;
        *scope.target = scope.working;
        trace!("提交内存事务");
        Ok(())
    }
}

/// 内存宿主，`None` 表示当前没有打开的图纸。
#[derive(Debug, Default)]
pub struct MemoryHost {
    document: Option<MemoryDocument>,
}

impl MemoryHost {
    pub fn new(document: MemoryDocument) -> Self {
        Self {
            document: Some(document),
        }
    }

    pub fn without_document() -> Self {
        Self::default()
    }

    pub fn open_document(&mut self, document: MemoryDocument) -> Option<MemoryDocument> {
        self.document.replace(document)
    }
}

impl DocumentHost for MemoryHost {
    fn active_document(&mut self) -> Option<&mut dyn DrawingDocument> {
        self.document
            .as_mut()
            .map(|document| document as &mut dyn DrawingDocument)
    }
}
