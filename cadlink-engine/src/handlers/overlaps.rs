use cadlink_core::document::Entity;
use cadlink_core::overlap::{self, Endpoint};
use tracing::{debug, info};

use super::line_segments;
use crate::args::Args;
use crate::command::{CommandContext, CommandHandler};
use crate::errors::CommandError;
use crate::gateway::GatewayError;

/// 回复中最多列出的重叠对数量。
const MAX_LISTED_PAIRS: usize = 5;

pub(super) struct FindOverlapsCommand;

impl CommandHandler for FindOverlapsCommand {
    fn name(&self) -> &'static str {
        "find_overlaps"
    }

    fn execute(
        &self,
        args: &Args,
        context: &mut CommandContext<'_>,
    ) -> Result<String, CommandError> {
        let segments = line_segments(&*context.scope, args.optional_text("layer")?);
        let pairs = overlap::find_overlaps(&segments, context.settings.tolerance)?;
        debug!(lines = segments.len(), pairs = pairs.len(), "重叠检测完成");

        let count = pairs.len();
        let details: Vec<String> = pairs
            .iter()
            .take(MAX_LISTED_PAIRS)
            .map(|&(i, j)| format!("Overlap: Line {} & {}", segments[i].id, segments[j].id))
            .collect();
        let summary = format!("Found {count} overlapping line pairs.");
        Ok(if count > MAX_LISTED_PAIRS {
            format!("{summary}\nExamples:\n{}...", details.join("\n"))
        } else if count > 0 {
            format!("{summary}\n{}", details.join("\n"))
        } else {
            summary
        })
    }
}

pub(super) struct CleanOverlapsCommand;

impl CommandHandler for CleanOverlapsCommand {
    fn name(&self) -> &'static str {
        "clean_overlaps"
    }

    fn execute(
        &self,
        args: &Args,
        context: &mut CommandContext<'_>,
    ) -> Result<String, CommandError> {
        let segments = line_segments(&*context.scope, args.optional_text("layer")?);
        let doomed = overlap::plan_cleanup(&segments, context.settings.tolerance)?;
        for &id in &doomed {
            context.scope.remove_entity(id)?;
        }
        info!(removed = doomed.len(), "已清理重叠线段");
        Ok(format!(
            "Cleaned up {} short overlapping segments.",
            doomed.len()
        ))
    }
}

/// 把相距不超过容差的线段端点吸附到一起。
pub(super) struct ConnectLinesCommand;

impl CommandHandler for ConnectLinesCommand {
    fn name(&self) -> &'static str {
        "connect_lines"
    }

    fn execute(
        &self,
        args: &Args,
        context: &mut CommandContext<'_>,
    ) -> Result<String, CommandError> {
        let tolerance = args
            .optional_number("tolerance")?
            .unwrap_or(context.settings.connect_tolerance);
        let segments = line_segments(&*context.scope, args.optional_text("layer")?);
        let snaps =
            overlap::plan_connections(&segments, context.settings.tolerance, tolerance)?;

        // 同一线段可能被多次吸附，每次都基于作用域里的最新状态修改。
        for snap in &snaps {
            let Some(Entity::Line(mut line)) = context.scope.entity(snap.id) else {
                return Err(GatewayError::EntityNotFound(snap.id).into());
            };
            match snap.endpoint {
                Endpoint::Start => line.start = snap.target,
                Endpoint::End => line.end = snap.target,
            }
            context.scope.replace_entity(snap.id, Entity::Line(line))?;
        }
        info!(snapped = snaps.len(), tolerance, "已连接线段端点");
        Ok(format!(
            "Connected {} line endpoints (tolerance {tolerance}).",
            snaps.len()
        ))
    }
}

#[cfg(test)]
mod tests {
    use cadlink_core::document::{Document, Entity, EntityId};
    use cadlink_core::geometry::Point2;
    use cadlink_core::overlap::MAX_SEGMENTS;

    use crate::args::Args;
    use crate::command::{CommandDispatcher, CommandRequest, GeometrySettings};
    use crate::handlers::test_support::{run_err, run_ok};
    use crate::memory::MemoryDocument;

    fn document_with_lines(
        lines: &[((f64, f64), (f64, f64), &str)],
    ) -> (MemoryDocument, Vec<EntityId>) {
        let mut document = Document::new();
        let ids = lines
            .iter()
            .map(|&((x1, y1), (x2, y2), layer)| {
                document.add_line(Point2::new(x1, y1), Point2::new(x2, y2), layer)
            })
            .collect();
        (MemoryDocument::with_document("plan.dwg", document), ids)
    }

    fn line_of(doc: &MemoryDocument, id: EntityId) -> (Point2, Point2) {
        match doc.document().entity(id) {
            Some(Entity::Line(line)) => (line.start, line.end),
            other => panic!("expected line, got {other:?}"),
        }
    }

    #[test]
    fn find_overlaps_lists_pairs() {
        let (mut doc, _) = document_with_lines(&[
            ((0.0, 0.0), (10.0, 0.0), "0"),
            ((5.0, 0.0), (15.0, 0.0), "0"),
            ((10.0, 0.0), (20.0, 0.0), "0"),
        ]);
        let message = run_ok(&mut doc, "find_overlaps", Args::new());
        assert_eq!(
            message,
            "Found 2 overlapping line pairs.\nOverlap: Line #0 & #1\nOverlap: Line #1 & #2"
        );
    }

    #[test]
    fn find_overlaps_truncates_long_lists() {
        let lines: Vec<_> = (0..4)
            .map(|i| ((i as f64, 0.0), (10.0 + i as f64, 0.0), "0"))
            .collect();
        let (mut doc, _) = document_with_lines(&lines);
        let message = run_ok(&mut doc, "find_overlaps", Args::new());
        let mut rows = message.lines();
        assert_eq!(rows.next(), Some("Found 6 overlapping line pairs."));
        assert_eq!(rows.next(), Some("Examples:"));
        assert_eq!(rows.clone().count(), 5);
        assert!(message.ends_with("Overlap: Line #1 & #3..."));
    }

    #[test]
    fn find_overlaps_respects_layer_filter() {
        let (mut doc, _) = document_with_lines(&[
            ((0.0, 0.0), (10.0, 0.0), "A-WALL"),
            ((5.0, 0.0), (15.0, 0.0), "0"),
        ]);
        let message = run_ok(&mut doc, "find_overlaps", Args::new().with("layer", "A-WALL"));
        assert_eq!(message, "Found 0 overlapping line pairs.");
    }

    #[test]
    fn scale_guard_rejects_large_inputs() {
        let lines: Vec<_> = (0..=MAX_SEGMENTS)
            .map(|i| ((0.0, i as f64), (1.0, i as f64), "0"))
            .collect();
        let (mut doc, _) = document_with_lines(&lines);
        for command in ["find_overlaps", "clean_overlaps", "connect_lines"] {
            let message = run_err(&mut doc, command, Args::new());
            assert!(message.contains("filter your input"), "{command}: {message}");
        }
        assert_eq!(doc.document().entity_count(), MAX_SEGMENTS + 1);
    }

    #[test]
    fn clean_overlaps_removes_shorter_lines() {
        let (mut doc, ids) = document_with_lines(&[
            ((0.0, 0.0), (1.0, 0.0), "0"),
            ((0.0, 0.0), (2.0, 0.0), "0"),
            ((0.0, 0.0), (3.0, 0.0), "0"),
            ((0.0, 5.0), (3.0, 5.0), "0"),
        ]);
        let message = run_ok(&mut doc, "clean_overlaps", Args::new());
        assert_eq!(message, "Cleaned up 2 short overlapping segments.");
        assert!(doc.document().entity(ids[0]).is_none());
        assert!(doc.document().entity(ids[1]).is_none());
        assert!(doc.document().entity(ids[2]).is_some());
        assert!(doc.document().entity(ids[3]).is_some());

        let message = run_ok(&mut doc, "clean_overlaps", Args::new());
        assert_eq!(message, "Cleaned up 0 short overlapping segments.");
    }

    #[test]
    fn connect_lines_snaps_within_tolerance() {
        let (mut doc, ids) = document_with_lines(&[
            ((0.0, 0.0), (10.0, 0.0), "0"),
            ((10.0, 3.0), (10.0, 20.0), "0"),
        ]);
        let message = run_ok(
            &mut doc,
            "connect_lines",
            Args::new().with("tolerance", 2.0),
        );
        assert_eq!(message, "Connected 0 line endpoints (tolerance 2).");

        let message = run_ok(
            &mut doc,
            "connect_lines",
            Args::new().with("tolerance", 5.0),
        );
        assert_eq!(message, "Connected 1 line endpoints (tolerance 5).");
        let (_, end) = line_of(&doc, ids[0]);
        assert_eq!(end, Point2::new(10.0, 3.0));
        assert_eq!(line_of(&doc, ids[1]).0, Point2::new(10.0, 3.0));
    }

    #[test]
    fn connect_lines_uses_default_tolerance_and_validates() {
        let (mut doc, ids) = document_with_lines(&[
            ((0.0, 0.0), (10.0, 0.0), "0"),
            ((10.5, 0.0), (20.0, 0.0), "0"),
        ]);
        let message = run_err(
            &mut doc,
            "connect_lines",
            Args::new().with("tolerance", -1.0),
        );
        assert!(message.contains("tolerance"), "{message}");
        assert_eq!(line_of(&doc, ids[0]).1, Point2::new(10.0, 0.0));

        let message = run_ok(&mut doc, "connect_lines", Args::new());
        assert_eq!(message, "Connected 1 line endpoints (tolerance 1).");
        assert_eq!(line_of(&doc, ids[0]).1, Point2::new(10.5, 0.0));
    }

    #[test]
    fn connect_lines_skips_lines_shorter_than_configured_tolerance() {
        let (mut doc, ids) = document_with_lines(&[
            ((0.0, 0.0), (10.0, 0.0), "0"),
            ((10.5, 0.0), (10.505, 0.0), "0"),
        ]);
        let dispatcher = CommandDispatcher::with_settings(GeometrySettings {
            tolerance: 0.01,
            connect_tolerance: 1.0,
        });

        let response =
            dispatcher.dispatch(&CommandRequest::new("connect_lines", Args::new()), &mut doc);
        assert!(response.success, "{}", response.message);
        assert_eq!(response.message, "Connected 0 line endpoints (tolerance 1).");
        assert_eq!(line_of(&doc, ids[0]).1, Point2::new(10.0, 0.0));

        // 默认 ε 下同一条短线参与吸附。
        let message = run_ok(&mut doc, "connect_lines", Args::new());
        assert_eq!(message, "Connected 1 line endpoints (tolerance 1).");
    }
}
