//! 内置命令处理器。
//!
//! 处理器都是无状态单元结构体，由 [`register_builtin`] 注册到调度器；图纸访问
//! 全部经由 `CommandContext::scope`。

mod drawing;
mod layers;
mod overlaps;
mod reports;

use cadlink_core::document::{Entity, EntityKind};
use cadlink_core::overlap::Segment;

use crate::command::CommandDispatcher;
use crate::gateway::{EntityFilter, MutationScope};

pub(crate) fn register_builtin(dispatcher: &mut CommandDispatcher) {
    dispatcher.register(layers::CreateLayerCommand);
    dispatcher.register(layers::GetLayersCommand);
    dispatcher.register(layers::SetLayerColorCommand);
    dispatcher.register(layers::ChangeColorCommand);
    dispatcher.register(drawing::DrawLineCommand);
    dispatcher.register(drawing::DrawWallCommand);
    dispatcher.register(drawing::DrawCircleCommand);
    dispatcher.register(overlaps::FindOverlapsCommand);
    dispatcher.register(overlaps::CleanOverlapsCommand);
    dispatcher.register(overlaps::ConnectLinesCommand);
    dispatcher.register(reports::CoordinateInfoCommand);
    dispatcher.register(reports::DrawingExtentsCommand);
    dispatcher.register(reports::BlocksInViewCommand);
}

/// 按图纸顺序收集直线快照，可限定图层。
fn line_segments(scope: &dyn MutationScope, layer: Option<String>) -> Vec<Segment> {
    scope
        .entities(&EntityFilter::of_kind(EntityKind::Line).on_layer(layer))
        .into_iter()
        .filter_map(|(id, entity)| match entity {
            Entity::Line(line) => Some(Segment::from_line(id, &line)),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::args::Args;
    use crate::command::{CommandDispatcher, CommandRequest, CommandResponse};
    use crate::memory::MemoryDocument;

    pub fn run(doc: &mut MemoryDocument, command: &str, args: Args) -> CommandResponse {
        CommandDispatcher::new().dispatch(&CommandRequest::new(command, args), doc)
    }

    /// 断言成功并返回消息。
    pub fn run_ok(doc: &mut MemoryDocument, command: &str, args: Args) -> String {
        let response = run(doc, command, args);
        assert!(response.success, "{command} failed: {}", response.message);
        response.message
    }

    pub fn run_err(doc: &mut MemoryDocument, command: &str, args: Args) -> String {
        let response = run(doc, command, args);
        assert!(!response.success, "{command} unexpectedly succeeded: {}", response.message);
        response.message
    }
}
