use cadlink_core::document::{AciColor, Circle, DEFAULT_LAYER, Entity, Layer, Line};
use cadlink_core::geometry::{Point2, Vector2};

use crate::args::Args;
use crate::command::{CommandContext, CommandHandler};
use crate::errors::CommandError;

const WALL_LAYER: &str = "A-WALL";
const WALL_LAYER_COLOR: AciColor = 1;

fn point(args: &Args, x_key: &str, y_key: &str) -> Result<Point2, CommandError> {
    Ok(Point2::new(args.number(x_key)?, args.number(y_key)?))
}

pub(super) struct DrawLineCommand;

impl CommandHandler for DrawLineCommand {
    fn name(&self) -> &'static str {
        "draw_line"
    }

    fn execute(
        &self,
        args: &Args,
        context: &mut CommandContext<'_>,
    ) -> Result<String, CommandError> {
        let start = point(args, "start_x", "start_y")?;
        let end = point(args, "end_x", "end_y")?;
        let layer = args
            .optional_text("layer")?
            .unwrap_or_else(|| DEFAULT_LAYER.to_string());

        context
            .scope
            .add_entity(Entity::Line(Line::new(start, end, layer.clone())))?;
        Ok(format!(
            "Drawn line from ({},{}) to ({},{}) on layer {layer}",
            start.x(),
            start.y(),
            end.x(),
            end.y()
        ))
    }
}

/// 双线墙：沿中心线法向各偏移半个墙厚，画在 `A-WALL` 图层。
pub(super) struct DrawWallCommand;

impl CommandHandler for DrawWallCommand {
    fn name(&self) -> &'static str {
        "draw_wall"
    }

    fn execute(
        &self,
        args: &Args,
        context: &mut CommandContext<'_>,
    ) -> Result<String, CommandError> {
        let start = point(args, "start_x", "start_y")?;
        let end = point(args, "end_x", "end_y")?;
        let width = args.number("width")?;
        if width <= 0.0 {
            return Err(CommandError::InvalidGeometry(format!(
                "wall width must be positive, got {width}"
            )));
        }
        let normal = Vector2::from_points(start, end)
            .perpendicular()
            .normalize()
            .filter(|_| start.distance(end) > context.settings.tolerance)
            .ok_or_else(|| {
                CommandError::InvalidGeometry(
                    "wall start and end points must differ".to_string(),
                )
            })?;
        let offset = normal.scale(width / 2.0);

        if context.scope.layer(WALL_LAYER).is_none() {
            context
                .scope
                .add_layer(Layer::with_color(WALL_LAYER, WALL_LAYER_COLOR))?;
        }
        for side in [offset, offset.scale(-1.0)] {
            let line = Line::new(start.translate(side), end.translate(side), WALL_LAYER);
            context.scope.add_entity(Entity::Line(line))?;
        }
        Ok(format!(
            "Drawn wall from ({},{}) to ({},{}) width {width}",
            start.x(),
            start.y(),
            end.x(),
            end.y()
        ))
    }
}

pub(super) struct DrawCircleCommand;

impl CommandHandler for DrawCircleCommand {
    fn name(&self) -> &'static str {
        "draw_circle"
    }

    fn execute(
        &self,
        args: &Args,
        context: &mut CommandContext<'_>,
    ) -> Result<String, CommandError> {
        let center = point(args, "center_x", "center_y")?;
        let radius = args.number("radius")?;
        if radius <= 0.0 {
            return Err(CommandError::InvalidGeometry(format!(
                "circle radius must be positive, got {radius}"
            )));
        }
        let layer = args
            .optional_text("layer")?
            .unwrap_or_else(|| DEFAULT_LAYER.to_string());

        context.scope.add_entity(Entity::Circle(Circle {
            center,
            radius,
            layer: layer.clone(),
            color: None,
        }))?;
        Ok(format!(
            "Drawn circle at ({},{}) radius {radius} on layer {layer}",
            center.x(),
            center.y()
        ))
    }
}

#[cfg(test)]
mod tests {
    use cadlink_core::document::{Entity, EntityKind};

    use crate::args::Args;
    use crate::handlers::test_support::{run_err, run_ok};
    use crate::memory::MemoryDocument;

    fn segment_args(x1: f64, y1: f64, x2: f64, y2: f64) -> Args {
        Args::new()
            .with("start_x", x1)
            .with("start_y", y1)
            .with("end_x", x2)
            .with("end_y", y2)
    }

    #[test]
    fn draw_line_uses_default_layer() {
        let mut doc = MemoryDocument::new("plan.dwg");
        let message = run_ok(&mut doc, "draw_line", segment_args(0.0, 0.0, 100.0, 50.5));
        assert_eq!(message, "Drawn line from (0,0) to (100,50.5) on layer 0");
        assert_eq!(doc.document().entity_count(), 1);
    }

    #[test]
    fn draw_line_accepts_numeric_strings() {
        let mut doc = MemoryDocument::new("plan.dwg");
        let args = Args::new()
            .with("start_x", "1")
            .with("start_y", "2")
            .with("end_x", 3.0)
            .with("end_y", 4.0);
        let message = run_ok(&mut doc, "draw_line", args);
        assert_eq!(message, "Drawn line from (1,2) to (3,4) on layer 0");
    }

    #[test]
    fn draw_line_reports_missing_and_unknown_layer() {
        let mut doc = MemoryDocument::new("plan.dwg");
        let args = Args::new().with("start_x", 0.0).with("start_y", 0.0);
        let message = run_err(&mut doc, "draw_line", args);
        assert_eq!(message, "missing required argument 'end_x'");

        let message = run_err(
            &mut doc,
            "draw_line",
            segment_args(0.0, 0.0, 1.0, 1.0).with("layer", "GHOST"),
        );
        assert_eq!(message, "layer 'GHOST' does not exist");
        assert_eq!(doc.document().entity_count(), 0);
    }

    #[test]
    fn draw_wall_creates_two_offset_lines() {
        let mut doc = MemoryDocument::new("plan.dwg");
        let message = run_ok(
            &mut doc,
            "draw_wall",
            segment_args(0.0, 0.0, 1000.0, 0.0).with("width", 200.0),
        );
        assert_eq!(message, "Drawn wall from (0,0) to (1000,0) width 200");
        assert_eq!(doc.document().layer("A-WALL").map(|l| l.color), Some(1));

        let mut offsets: Vec<f64> = doc
            .document()
            .entities()
            .map(|(_, entity)| match entity {
                Entity::Line(line) => {
                    assert_eq!(line.layer, "A-WALL");
                    assert!((line.start.distance(line.end) - 1000.0).abs() < 1e-9);
                    assert!((line.start.y() - line.end.y()).abs() < 1e-9);
                    line.start.y()
                }
                other => panic!("unexpected entity {other:?}"),
            })
            .collect();
        offsets.sort_by(f64::total_cmp);
        assert_eq!(offsets, vec![-100.0, 100.0]);

        // 第二面墙复用已有图层。
        run_ok(
            &mut doc,
            "draw_wall",
            segment_args(0.0, 0.0, 0.0, 500.0).with("width", 100.0),
        );
        assert_eq!(doc.document().entity_count(), 4);
    }

    #[test]
    fn draw_wall_rejects_degenerate_input() {
        let mut doc = MemoryDocument::new("plan.dwg");
        let message = run_err(
            &mut doc,
            "draw_wall",
            segment_args(5.0, 5.0, 5.0, 5.0).with("width", 200.0),
        );
        assert_eq!(message, "wall start and end points must differ");

        let message = run_err(
            &mut doc,
            "draw_wall",
            segment_args(0.0, 0.0, 10.0, 0.0).with("width", 0.0),
        );
        assert!(message.contains("width must be positive"));
        assert!(doc.document().layer("A-WALL").is_none());
    }

    #[test]
    fn draw_circle_checks_radius() {
        let mut doc = MemoryDocument::new("plan.dwg");
        let args = Args::new()
            .with("center_x", 10.0)
            .with("center_y", 20.0)
            .with("radius", 5.0);
        let message = run_ok(&mut doc, "draw_circle", args);
        assert_eq!(message, "Drawn circle at (10,20) radius 5 on layer 0");
        let kinds: Vec<_> = doc
            .document()
            .entities()
            .map(|(_, entity)| entity.kind())
            .collect();
        assert_eq!(kinds, vec![EntityKind::Circle]);

        let args = Args::new()
            .with("center_x", 0.0)
            .with("center_y", 0.0)
            .with("radius", -1.0);
        let message = run_err(&mut doc, "draw_circle", args);
        assert_eq!(message, "circle radius must be positive, got -1");
    }
}
