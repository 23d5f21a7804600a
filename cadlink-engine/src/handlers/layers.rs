use cadlink_core::document::{COLOR_BY_LAYER, DEFAULT_LAYER_COLOR, Layer};
use tracing::debug;

use crate::args::Args;
use crate::command::{CommandContext, CommandHandler};
use crate::errors::CommandError;
use crate::gateway::EntityFilter;

pub(super) struct CreateLayerCommand;

impl CommandHandler for CreateLayerCommand {
    fn name(&self) -> &'static str {
        "create_layer"
    }

    fn execute(
        &self,
        args: &Args,
        context: &mut CommandContext<'_>,
    ) -> Result<String, CommandError> {
        let name = args.text("name")?;
        let color = args.optional_color("color")?.unwrap_or(DEFAULT_LAYER_COLOR);

        // 已存在不算失败，保持原定义。
        if context.scope.layer(&name).is_some() {
            return Ok(format!("Layer '{name}' already exists"));
        }
        context.scope.add_layer(Layer::with_color(name.clone(), color))?;
        Ok(format!("Created layer '{name}' with color {color}"))
    }
}

pub(super) struct GetLayersCommand;

impl CommandHandler for GetLayersCommand {
    fn name(&self) -> &'static str {
        "get_layers"
    }

    fn execute(
        &self,
        _args: &Args,
        context: &mut CommandContext<'_>,
    ) -> Result<String, CommandError> {
        let layers: Vec<String> = context
            .scope
            .layers()
            .iter()
            .map(|layer| format!("{} (Color: {})", layer.name, layer.color))
            .collect();
        Ok(layers.join(", "))
    }
}

pub(super) struct SetLayerColorCommand;

impl CommandHandler for SetLayerColorCommand {
    fn name(&self) -> &'static str {
        "set_layer_color"
    }

    fn execute(
        &self,
        args: &Args,
        context: &mut CommandContext<'_>,
    ) -> Result<String, CommandError> {
        let layer = args.text("layer")?;
        let color = args.color("color")?;
        context.scope.set_layer_color(&layer, color)?;
        Ok(format!("Set layer '{layer}' color to {color}"))
    }
}

/// 按显式颜色批量改色；随层实体按颜色 256 参与匹配。
pub(super) struct ChangeColorCommand;

impl CommandHandler for ChangeColorCommand {
    fn name(&self) -> &'static str {
        "change_color"
    }

    fn execute(
        &self,
        args: &Args,
        context: &mut CommandContext<'_>,
    ) -> Result<String, CommandError> {
        let from = args.color("from_color")?;
        let to = args.color("to_color")?;
        let replacement = (to != COLOR_BY_LAYER).then_some(to);

        let mut changed = 0usize;
        if from != to {
            for (id, mut entity) in context.scope.entities(&EntityFilter::all()) {
                if entity.color().unwrap_or(COLOR_BY_LAYER) != from {
                    continue;
                }
                entity.set_color(replacement);
                context.scope.replace_entity(id, entity)?;
                changed += 1;
            }
        }
        debug!(from, to, changed, "批量改色");
        Ok(format!(
            "Changed {changed} entities from color {from} to color {to}."
        ))
    }
}
