//! Behavioral properties of the optimizer: idempotence, exact coverage,
//! compositing order and the worked examples.

use crispy::{
    Mode, Notice, Options, Pixel, Rgba, SourceRect, composite, expand_to_unit_rects, extract, merge_grid,
    optimize, optimize_with_options, parse_svg,
};

const RED: Rgba = Rgba::opaque(255, 0, 0);
const BLUE: Rgba = Rgba::opaque(0, 0, 255);

fn paths() -> Options {
    Options {
        mode: Mode::Paths,
        ..Options::default()
    }
}

/// A deterministic pseudo-random sprite, one rect per painted pixel.
fn noisy_sprite(width: u32, height: u32, seed: u64) -> String {
    let palette = [
        r##"fill="#e33""##,
        r##"fill="#3a3""##,
        r##"fill="#33e""##,
        r##"fill="#ff0" fill-opacity="0.5""##,
    ];
    let mut state = seed;
    let mut svg = String::from(r#"<svg xmlns="http://www.w3.org/2000/svg">"#);
    for y in 0..height {
        for x in 0..width {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let pick = (state >> 33) % 6;
            // Bias toward runs so merging has something to do.
            if pick >= 4 {
                continue;
            }
            svg.push_str(&format!(
                r#"<rect x="{}" y="{}" width="1" height="1" {}/>"#,
                x, y, palette[pick as usize]
            ));
        }
    }
    svg.push_str("</svg>");
    svg
}

fn painted_cells(svg: &str, pixel_size: f64) -> Vec<(Pixel, Rgba)> {
    let doc = parse_svg(svg).unwrap();
    let extraction = extract(&doc, false, Some(pixel_size), None).unwrap();
    composite(&extraction.rects).unwrap().painted().collect()
}

fn rect(order: u64, x: u32, y: u32, w: u32, h: u32, color: Rgba, opacity: f64) -> SourceRect {
    SourceRect {
        order,
        x,
        y,
        width: w,
        height: h,
        color,
        opacity,
    }
}

#[test]
fn test_idempotence() {
    for seed in 1..6 {
        let input = noisy_sprite(9, 7, seed);
        for options in [Options::default(), paths()] {
            let once = optimize_with_options(&input, &options).unwrap().svg;
            let twice = optimize_with_options(&once, &options).unwrap().svg;
            assert_eq!(once, twice, "seed {}", seed);
        }
    }
}

#[test]
fn test_every_painted_pixel_covered_exactly_once() {
    for seed in 1..6 {
        let input = noisy_sprite(12, 9, seed);
        let expected = painted_cells(&input, 1.0);

        for options in [Options::default(), paths()] {
            let out = optimize_with_options(&input, &options).unwrap().svg;
            assert_eq!(painted_cells(&out, 1.0), expected, "seed {}", seed);

            // Shapes don't overlap: their areas add up to the painted cells.
            let doc = parse_svg(&out).unwrap();
            let shapes = extract(&doc, false, Some(1.0), None).unwrap();
            let area: u64 = shapes.rects.iter().map(|r| r.width as u64 * r.height as u64).sum();
            assert_eq!(area, expected.len() as u64, "seed {}", seed);
        }
    }
}

#[test]
fn test_merged_rects_are_monochrome() {
    let input = noisy_sprite(16, 16, 42);
    let doc = parse_svg(&input).unwrap();
    let grid = composite(&extract(&doc, false, None, None).unwrap().rects).unwrap();
    for merged in merge_grid(&grid, true) {
        for y in merged.y..merged.y + merged.height {
            for x in merged.x..merged.x + merged.width {
                assert_eq!(grid.get(x, y), Some(merged.color));
            }
        }
    }
}

#[test]
fn test_disjoint_reorder_keeps_grid() {
    let a = rect(1, 0, 0, 1, 1, RED, 1.0);
    let b = rect(2, 3, 0, 1, 1, BLUE, 0.5);
    let swapped = [SourceRect { order: 1, ..b }, SourceRect { order: 2, ..a }];

    let before: Vec<_> = composite(&[a, b]).unwrap().painted().collect();
    let after: Vec<_> = composite(&swapped).unwrap().painted().collect();
    assert_eq!(before, after);
}

#[test]
fn test_overlapping_reorder_changes_top_paint() {
    let a = rect(1, 0, 0, 2, 1, RED, 1.0);
    let b = rect(2, 1, 0, 2, 1, BLUE, 1.0);
    let swapped = [SourceRect { order: 2, ..a }, SourceRect { order: 1, ..b }];

    assert_eq!(composite(&[a, b]).unwrap().get(1, 0), Some(BLUE));
    assert_eq!(composite(&swapped).unwrap().get(1, 0), Some(RED));
}

#[test]
fn test_expansion_does_not_change_compositing() {
    let rects = [
        rect(1, 0, 0, 3, 2, RED, 1.0),
        rect(2, 1, 1, 3, 3, BLUE, 0.4),
    ];
    let whole: Vec<_> = composite(&rects).unwrap().painted().collect();
    let expanded: Vec<_> = composite(&expand_to_unit_rects(&rects))
        .unwrap()
        .painted()
        .collect();
    assert_eq!(whole, expanded);
}

#[test]
fn test_already_merged_input_never_grows() {
    let inputs = [
        r##"<svg xmlns="http://www.w3.org/2000/svg">
            <rect width="4" height="1" fill="#f00"/>
            <rect y="1" width="1" height="3" fill="#f00"/>
            <rect x="1" y="1" width="3" height="3" fill="#00f"/>
        </svg>"##,
        r##"<svg xmlns="http://www.w3.org/2000/svg">
            <rect width="6" height="2" fill="#0a0"/>
            <rect y="2" width="2" height="4" fill="#0a0"/>
        </svg>"##,
    ];
    for input in inputs {
        let before = input.matches("<rect").count();
        let out = optimize_with_options(input, &Options::default()).unwrap();
        assert!(out.shape_count <= before, "{} > {}", out.shape_count, before);
    }
}

#[test]
fn test_two_by_one_red_block() {
    let merged = optimize(
        r##"<svg xmlns="http://www.w3.org/2000/svg"><rect x="0" y="0" width="2" height="1" fill="#ff0000"/></svg>"##,
    )
    .unwrap();
    assert_eq!(
        merged,
        r##"<svg xmlns="http://www.w3.org/2000/svg"><g shape-rendering="crispEdges"><rect fill="#f00" height="1" width="2"/></g></svg>"##
    );

    let expanded = optimize(
        r##"<svg xmlns="http://www.w3.org/2000/svg"><rect x="0" y="0" width="1" height="1" fill="#ff0000"/><rect x="1" y="0" width="1" height="1" fill="#ff0000"/></svg>"##,
    )
    .unwrap();
    assert_eq!(expanded, merged);
}

#[test]
fn test_overlap_blends_to_purple() {
    let svg = r##"<svg xmlns="http://www.w3.org/2000/svg">
        <rect x="0" y="0" width="2" height="2" fill="#ff0000"/>
        <rect x="1" y="1" width="2" height="2" fill="#0000ff" opacity="0.5"/>
    </svg>"##;
    let doc = parse_svg(svg).unwrap();
    let grid = composite(&extract(&doc, false, None, None).unwrap().rects).unwrap();

    let blended = grid.get(1, 1).unwrap();
    assert_ne!(blended, RED);
    assert_ne!(blended, BLUE);
    assert_eq!(blended, Rgba::opaque(127, 0, 128));
    assert_eq!(grid.get(2, 2), Some(Rgba::new(0, 0, 255, 128)));

    let out = optimize(svg).unwrap();
    assert!(out.contains(r##"fill="#7f0080""##));
}

#[test]
fn test_checkerboard_paths_keep_diagonal_reds_apart() {
    let svg = r##"<svg xmlns="http://www.w3.org/2000/svg">
        <rect x="0" y="0" fill="#f00"/>
        <rect x="1" y="0" fill="#00f"/>
        <rect x="0" y="1" fill="#00f"/>
        <rect x="1" y="1" fill="#f00"/>
    </svg>"##;
    let out = optimize_with_options(svg, &paths()).unwrap();
    assert_eq!(out.shape_count, 4);
    assert_eq!(
        out.svg,
        r##"<svg xmlns="http://www.w3.org/2000/svg"><g shape-rendering="crispEdges"><path d="M0 0h1v1h-1z" fill="#f00"/><path d="M1 0h1v1h-1z" fill="#00f"/><path d="M0 1h1v1h-1z" fill="#00f"/><path d="M1 1h1v1h-1z" fill="#f00"/></g></svg>"##
    );
}

#[test]
fn test_traced_hole_survives_reoptimization() {
    let svg = r##"<svg xmlns="http://www.w3.org/2000/svg">
        <rect width="3" height="3" fill="#408"/>
        <rect x="1" y="1" fill="#fc0"/>
    </svg>"##;
    let out = optimize_with_options(svg, &paths()).unwrap().svg;
    assert!(out.contains(r##"<path d="M0 0h3v3h-3zM1 1v1h1v-1z" fill="#408"/>"##));
    assert_eq!(painted_cells(&out, 1.0), painted_cells(svg, 1.0));
}

#[test]
fn test_strict_mode_rejects_non_rect_content() {
    let strict = Options {
        strict: true,
        ..Options::default()
    };
    let inputs = [
        r#"<svg xmlns="http://www.w3.org/2000/svg"><rect/><circle r="3"/></svg>"#,
        r##"<svg xmlns="http://www.w3.org/2000/svg"><rect/><rect x="4" y="4" width="2" height="2" fill="#f00" stroke="#00f" stroke-width="4"/></svg>"##,
        r##"<svg xmlns="http://www.w3.org/2000/svg"><rect/><rect x="2" width="2" height="2" rx="1" fill="#f00"/></svg>"##,
    ];
    for svg in inputs {
        assert!(
            matches!(
                optimize_with_options(svg, &strict),
                Err(crispy::CrispyError::UnsupportedContent { .. })
            ),
            "{}",
            svg
        );

        let lenient = optimize_with_options(svg, &Options::default()).unwrap();
        assert_eq!(lenient.notices, vec![Notice::SkippedElements { count: 1 }]);
        assert_eq!(lenient.shape_count, 1);
        assert!(!lenient.svg.contains("#f00"));
    }
}

#[test]
fn test_negative_coordinates_keep_their_paint() {
    let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="-2 0 4 1"><rect x="-2" width="2" fill="#f00"/><rect width="2" fill="#00f"/></svg>"##;
    let out = optimize_with_options(svg, &Options::default()).unwrap();
    assert!(out.notices.is_empty());
    assert_eq!(
        out.svg,
        r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="-2 0 4 1"><g shape-rendering="crispEdges"><rect fill="#f00" height="1" width="2" x="-2"/><rect fill="#00f" height="1" width="2"/></g></svg>"##
    );
    assert_eq!(optimize(&out.svg).unwrap(), out.svg);

    let traced = optimize_with_options(svg, &paths()).unwrap().svg;
    assert!(traced.contains(r##"<path d="M-2 0h2v1h-2z" fill="#f00"/>"##));
    assert_eq!(optimize_with_options(&traced, &paths()).unwrap().svg, traced);
}

#[test]
fn test_editor_noise_keeps_the_pixel_size() {
    let mut svg = String::from(r#"<svg xmlns="http://www.w3.org/2000/svg">"#);
    for y in 0..4 {
        for x in 0..4 {
            let width = if (x, y) == (1, 1) { "10.002" } else { "10" };
            let fill = if y < 2 { "#f00" } else { "#00f" };
            svg.push_str(&format!(
                r#"<rect x="{}" y="{}" width="{}" height="10" fill="{}"/>"#,
                x * 10,
                y * 10,
                width,
                fill
            ));
        }
    }
    svg.push_str("</svg>");

    assert_eq!(
        optimize(&svg).unwrap(),
        r##"<svg xmlns="http://www.w3.org/2000/svg"><g shape-rendering="crispEdges"><rect fill="#f00" height="20" width="40"/><rect fill="#00f" height="20" width="40" y="20"/></g></svg>"##
    );
}

#[test]
fn test_parse_error_names_element() {
    let err = optimize(r#"<svg xmlns="http://www.w3.org/2000/svg"><rect/><rect width="wide"/></svg>"#)
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "parse error at element #2 <rect>: invalid number \"wide\" in width"
    );
}
