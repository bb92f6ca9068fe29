//! Pipeline Integration Tests
//!
//! End-to-end detection on synthetic operation lists: extraction through
//! classification, including transforms, crop bands and overlap merging.

use planscan_core::{
    Affine, ColumnOrigin, DetectionConfig, DetectionConfigBuilder, DetectionPipeline, OpCode,
    Operation, PageGeometry, PageSource, Rect, StaticSource, Viewport,
};

const EPS: f64 = 1e-9;

fn page(operations: Vec<Operation>) -> PageGeometry {
    PageGeometry {
        operations,
        viewport: Viewport::identity(1000.0, 800.0),
    }
}

fn closed_path(points: &[(f64, f64)]) -> Vec<Operation> {
    let mut ops = vec![Operation::move_to(points[0].0, points[0].1)];
    ops.extend(points[1..].iter().map(|&(x, y)| Operation::line_to(x, y)));
    ops.push(Operation::close_path());
    ops.push(Operation::end_path());
    ops
}

fn detect(geometry: &PageGeometry) -> Vec<Rect> {
    DetectionPipeline::new()
        .detect(0, geometry, None)
        .unwrap()
        .columns
        .into_iter()
        .map(|c| c.geometry)
        .collect()
}

#[test]
fn test_single_square_yields_one_automatic_column() {
    let geometry = page(closed_path(&[
        (200.0, 300.0),
        (240.0, 300.0),
        (240.0, 340.0),
        (200.0, 340.0),
    ]));
    let report = DetectionPipeline::new().detect(0, &geometry, None).unwrap();

    assert_eq!(report.columns.len(), 1);
    let column = &report.columns[0];
    assert!((column.geometry.w - 40.0).abs() < EPS);
    assert!((column.geometry.h - 40.0).abs() < EPS);
    assert_eq!(column.origin, ColumnOrigin::Automatic);
    assert_eq!(column.id, "C-1");
}

#[test]
fn test_overlapping_boxes_collapse_to_larger() {
    let geometry = page(vec![
        Operation::rectangle(300.0, 300.0, 40.0, 40.0),
        Operation::rectangle(298.0, 298.0, 44.0, 44.0),
        Operation::end_path(),
    ]);
    let columns = detect(&geometry);
    assert_eq!(columns, vec![Rect::new(298.0, 298.0, 44.0, 44.0)]);
}

#[test]
fn test_low_overlap_boxes_both_survive() {
    // IoU of these two is 20*40 / (1600 + 1600 - 800) = 1/3
    let geometry = page(vec![
        Operation::rectangle(300.0, 300.0, 40.0, 40.0),
        Operation::rectangle(320.0, 300.0, 40.0, 40.0),
    ]);
    assert_eq!(detect(&geometry).len(), 2);
}

#[test]
fn test_skewed_quad_is_excluded() {
    let geometry = page(closed_path(&[
        (200.0, 300.0),
        (240.0, 300.0),
        (260.0, 340.0),
        (220.0, 340.0),
    ]));
    assert!(detect(&geometry).is_empty());
}

#[test]
fn test_crop_boundary_decided_by_center() {
    // Right cut at 880 for a 1000 px page
    let straddling_in = Operation::rectangle(845.0, 300.0, 40.0, 40.0); // center 865
    let straddling_out = Operation::rectangle(875.0, 400.0, 40.0, 40.0); // center 895
    let geometry = page(vec![straddling_in, straddling_out]);

    let columns = detect(&geometry);
    assert_eq!(columns, vec![Rect::new(845.0, 300.0, 40.0, 40.0)]);
}

#[test]
fn test_title_block_and_header_are_excluded() {
    let geometry = page(vec![
        Operation::rectangle(920.0, 600.0, 40.0, 40.0),
        Operation::rectangle(400.0, 10.0, 40.0, 40.0),
        Operation::rectangle(400.0, 400.0, 40.0, 40.0),
    ]);
    assert_eq!(detect(&geometry), vec![Rect::new(400.0, 400.0, 40.0, 40.0)]);
}

#[test]
fn test_nested_transforms_are_applied() {
    let geometry = page(vec![
        Operation::save(),
        Operation::transform(Affine::translate(100.0, 100.0)),
        Operation::save(),
        Operation::transform(Affine::scale(2.0)),
        Operation::rectangle(50.0, 50.0, 20.0, 20.0),
        Operation::restore(),
        Operation::rectangle(300.0, 300.0, 30.0, 30.0),
        Operation::restore(),
        Operation::rectangle(600.0, 300.0, 25.0, 25.0),
    ]);
    let columns = detect(&geometry);
    assert_eq!(
        columns,
        vec![
            Rect::new(200.0, 200.0, 40.0, 40.0),
            Rect::new(400.0, 400.0, 30.0, 30.0),
            Rect::new(600.0, 300.0, 25.0, 25.0),
        ]
    );
}

#[test]
fn test_malformed_and_curved_paths_do_not_abort() {
    let mut operations = vec![
        Operation::new(OpCode::Rectangle, vec![1.0, 2.0]),
        Operation::move_to(100.0, 100.0),
        Operation::new(OpCode::CurveTo, vec![110.0, 100.0, 120.0, 110.0, 120.0, 120.0]),
        Operation::line_to(100.0, 120.0),
        Operation::close_path(),
        Operation::new(OpCode::Other, Vec::new()),
    ];
    operations.extend(closed_path(&[
        (200.0, 300.0),
        (240.0, 300.0),
        (240.0, 340.0),
        (200.0, 340.0),
    ]));
    let report = DetectionPipeline::new()
        .detect(0, &page(operations), None)
        .unwrap();
    assert_eq!(report.columns.len(), 1);
    assert_eq!(report.stats.extract.malformed, 1);
    assert_eq!(report.stats.extract.curve_paths, 1);
}

#[test]
fn test_elongated_boxes_are_not_columns() {
    let geometry = page(vec![
        Operation::rectangle(100.0, 300.0, 200.0, 40.0),
        Operation::rectangle(400.0, 300.0, 40.0, 30.0),
    ]);
    assert_eq!(detect(&geometry), vec![Rect::new(400.0, 300.0, 40.0, 30.0)]);
}

#[test]
fn test_lenient_preset_accepts_more() {
    let geometry = page(vec![Operation::rectangle(100.0, 300.0, 40.0, 24.0)]);
    assert!(detect(&geometry).is_empty());

    let lenient = DetectionConfigBuilder::lenient().build().unwrap();
    let report = DetectionPipeline::with_config(lenient)
        .detect(0, &geometry, None)
        .unwrap();
    assert_eq!(report.columns.len(), 1);
}

#[test]
fn test_static_source_pdf_style_viewport() {
    // PDF space: y up, media box 612 x 792
    let geometry = PageGeometry {
        operations: vec![Operation::rectangle(100.0, 200.0, 40.0, 40.0)],
        viewport: Viewport::for_media_box([0.0, 0.0, 612.0, 792.0], 1.0),
    };
    let source = StaticSource::new(vec![geometry]);
    let at_two = source.page_geometry(0, 2.0).unwrap();

    let pipeline = DetectionPipeline::with_config(DetectionConfig::default());
    let base = pipeline.detect(0, &source.page_geometry(0, 1.0).unwrap(), None).unwrap();
    let zoomed = pipeline.detect(0, &at_two, None).unwrap();

    let expected = Rect::new(100.0, 552.0, 40.0, 40.0);
    assert_eq!(base.columns[0].geometry, expected);
    assert_eq!(zoomed.columns[0].geometry, expected);
}
