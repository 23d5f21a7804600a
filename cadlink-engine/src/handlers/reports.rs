//! 只读报表命令，结果编码为 JSON 字符串放入回复消息。

use cadlink_core::document::{self, AciColor, Entity};
use cadlink_core::geometry::{Bounds2D, Point2};
use serde::Serialize;

use crate::args::Args;
use crate::command::{CommandContext, CommandHandler};
use crate::errors::CommandError;
use crate::gateway::EntityFilter;

const DEFAULT_COORDINATE_LIMIT: usize = 100;
const VIEW_KEYS: [&str; 4] = ["min_x", "min_y", "max_x", "max_y"];

#[derive(Debug, Serialize)]
struct CoordinateReport {
    total: usize,
    returned: usize,
    entities: Vec<EntityCoordinates>,
}

#[derive(Debug, Serialize)]
struct EntityCoordinates {
    id: u64,
    kind: &'static str,
    layer: String,
    /// `null` 表示随层。
    color: Option<AciColor>,
    points: Vec<[f64; 2]>,
}

pub(super) struct CoordinateInfoCommand;

impl CommandHandler for CoordinateInfoCommand {
    fn name(&self) -> &'static str {
        "get_coordinate_info"
    }

    fn execute(
        &self,
        args: &Args,
        context: &mut CommandContext<'_>,
    ) -> Result<String, CommandError> {
        let filter = EntityFilter::all().on_layer(args.optional_text("layer")?);
        let limit = args
            .optional_count("limit")?
            .unwrap_or(DEFAULT_COORDINATE_LIMIT);

        let entities = context.scope.entities(&filter);
        let total = entities.len();
        let entities: Vec<EntityCoordinates> = entities
            .into_iter()
            .take(limit)
            .map(|(id, entity)| EntityCoordinates {
                id: id.get(),
                kind: entity.kind().as_str(),
                layer: entity.layer_name().to_string(),
                color: entity.color(),
                points: entity.key_points().into_iter().map(Point2::to_array).collect(),
            })
            .collect();
        let report = CoordinateReport {
            total,
            returned: entities.len(),
            entities,
        };
        Ok(serde_json::to_string(&report)?)
    }
}

#[derive(Debug, Serialize)]
struct ExtentsReport {
    empty: bool,
    #[serde(flatten)]
    extents: Option<Extents>,
}

#[derive(Debug, Serialize)]
struct Extents {
    min: [f64; 2],
    max: [f64; 2],
    center: [f64; 2],
    width: f64,
    height: f64,
}

pub(super) struct DrawingExtentsCommand;

impl CommandHandler for DrawingExtentsCommand {
    fn name(&self) -> &'static str {
        "get_drawing_extents"
    }

    fn execute(
        &self,
        _args: &Args,
        context: &mut CommandContext<'_>,
    ) -> Result<String, CommandError> {
        let entities = context.scope.entities(&EntityFilter::all());
        let bounds = document::extents(entities.iter().map(|(_, entity)| entity));
        let extents = bounds.map(|bounds| Extents {
            min: bounds.min().to_array(),
            max: bounds.max().to_array(),
            center: bounds.center().to_array(),
            width: bounds.width(),
            height: bounds.height(),
        });
        let report = ExtentsReport {
            empty: extents.is_none(),
            extents,
        };
        Ok(serde_json::to_string(&report)?)
    }
}

#[derive(Debug, Serialize)]
struct BlocksReport {
    count: usize,
    blocks: Vec<BlockInView>,
}

#[derive(Debug, Serialize)]
struct BlockInView {
    id: u64,
    name: String,
    layer: String,
    insertion: [f64; 2],
}

/// 视窗参数要么全给要么全不给；不给时所有块参照都算在视图内。
fn view_window(args: &Args) -> Result<Option<Bounds2D>, CommandError> {
    if !VIEW_KEYS.iter().any(|key| args.contains(key)) {
        return Ok(None);
    }
    let [min_x, min_y, max_x, max_y] = [
        args.number(VIEW_KEYS[0])?,
        args.number(VIEW_KEYS[1])?,
        args.number(VIEW_KEYS[2])?,
        args.number(VIEW_KEYS[3])?,
    ];
    if min_x > max_x || min_y > max_y {
        return Err(CommandError::InvalidGeometry(format!(
            "view window is inverted: ({min_x},{min_y}) to ({max_x},{max_y})"
        )));
    }
    Ok(Some(Bounds2D::new(
        Point2::new(min_x, min_y),
        Point2::new(max_x, max_y),
    )))
}

pub(super) struct BlocksInViewCommand;

impl CommandHandler for BlocksInViewCommand {
    fn name(&self) -> &'static str {
        "get_blocks_in_view"
    }

    fn execute(
        &self,
        args: &Args,
        context: &mut CommandContext<'_>,
    ) -> Result<String, CommandError> {
        let window = view_window(args)?;
        let blocks: Vec<BlockInView> = context
            .scope
            .entities(&EntityFilter::all())
            .into_iter()
            .filter_map(|(id, entity)| match entity {
                Entity::BlockReference(reference) => Some((id, reference)),
                _ => None,
            })
            .filter(|(_, reference)| {
                window.is_none_or(|window| window.contains(reference.insert))
            })
            .map(|(id, reference)| BlockInView {
                id: id.get(),
                name: reference.name,
                layer: reference.layer,
                insertion: reference.insert.to_array(),
            })
            .collect();
        let report = BlocksReport {
            count: blocks.len(),
            blocks,
        };
        Ok(serde_json::to_string(&report)?)
    }
}
