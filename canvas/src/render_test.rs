use uuid::Uuid;

use super::*;
use crate::layer::Color;

const WHITE: [u8; 4] = [255, 255, 255, 255];
const RED: [u8; 4] = [255, 0, 0, 255];
const BLUE: [u8; 4] = [0, 0, 255, 255];

fn page_image() -> RgbaImage {
    RgbaImage::from_pixel(20, 20, Rgba(WHITE))
}

fn line(color: [u8; 4], tool: StrokeTool, width: f64) -> Stroke {
    let color = Color { r: color[0], g: color[1], b: color[2], a: color[3] };
    Stroke::new(vec![Point::new(2.0, 10.0), Point::new(18.0, 10.0)], color, width, tool).unwrap()
}

fn layer_with(owner: OwnerId, created_at: i64, strokes: Vec<Stroke>) -> AnnotationLayer {
    AnnotationLayer { owner_id: owner, created_at, strokes }
}

fn scene<'a>(
    image: Option<&'a RgbaImage>,
    background: &'a [Arc<AnnotationLayer>],
    foreground: &'a AnnotationLayer,
    visibility: &'a LayerVisibility,
) -> Scene<'a> {
    Scene { image, image_size: Size::new(20.0, 20.0), background, foreground, preview: None, visibility }
}

// =============================================================
// draw_order
// =============================================================

#[test]
fn draw_order_sorts_by_submission_time() {
    let a = Arc::new(layer_with(Uuid::new_v4(), 30, Vec::new()));
    let b = Arc::new(layer_with(Uuid::new_v4(), 10, Vec::new()));
    let c = Arc::new(layer_with(Uuid::new_v4(), 20, Vec::new()));
    let bg = vec![a, b, c];
    let order: Vec<i64> = draw_order(&bg, &LayerVisibility::default()).iter().map(|l| l.created_at).collect();
    assert_eq!(order, vec![10, 20, 30]);
}

#[test]
fn draw_order_breaks_ties_by_owner() {
    let low = Uuid::from_u128(1);
    let high = Uuid::from_u128(2);
    let bg = vec![Arc::new(layer_with(high, 5, Vec::new())), Arc::new(layer_with(low, 5, Vec::new()))];
    let order: Vec<OwnerId> = draw_order(&bg, &LayerVisibility::default()).iter().map(|l| l.owner_id).collect();
    assert_eq!(order, vec![low, high]);
}

#[test]
fn draw_order_skips_hidden_layers() {
    let hidden = Uuid::new_v4();
    let bg = vec![Arc::new(layer_with(hidden, 1, Vec::new())), Arc::new(layer_with(Uuid::new_v4(), 2, Vec::new()))];
    let mut visibility = LayerVisibility::default();
    visibility.set_visible(hidden, false);
    let order = draw_order(&bg, &visibility);
    assert_eq!(order.len(), 1);
    assert_ne!(order[0].owner_id, hidden);
}

#[test]
fn visibility_toggle_flips_state() {
    let owner = Uuid::new_v4();
    let mut visibility = LayerVisibility::default();
    assert!(!visibility.toggle(owner));
    assert!(!visibility.is_visible(&owner));
    assert!(visibility.toggle(owner));
    visibility.set_visible(owner, false);
    visibility.show_all();
    assert!(visibility.is_visible(&owner));
}

// =============================================================
// render_page
// =============================================================

#[test]
fn render_page_matches_image_dimensions() {
    let image = page_image();
    let fg = AnnotationLayer::empty(Uuid::new_v4());
    let vis = LayerVisibility::default();
    let out = render_page(&scene(Some(&image), &[], &fg, &vis)).unwrap();
    assert_eq!(out.dimensions(), (20, 20));
    assert_eq!(out, image);
}

#[test]
fn missing_image_renders_placeholder() {
    let fg = AnnotationLayer::empty(Uuid::new_v4());
    let vis = LayerVisibility::default();
    let out = render_page(&scene(None, &[], &fg, &vis)).unwrap();
    assert_eq!(out.dimensions(), (20, 20));
    assert_eq!(out.get_pixel(5, 5).0, PLACEHOLDER_RGBA);
}

#[test]
fn stroke_covers_pixels_within_half_width() {
    let image = page_image();
    let fg = layer_with(Uuid::new_v4(), 0, vec![line(RED, StrokeTool::Pen, 4.0)]);
    let vis = LayerVisibility::default();
    let out = render_page(&scene(Some(&image), &[], &fg, &vis)).unwrap();
    assert_eq!(out.get_pixel(10, 10).0, RED);
    assert_eq!(out.get_pixel(10, 13).0, WHITE);
}

#[test]
fn dot_stroke_is_drawn() {
    let image = page_image();
    let dot = Stroke::new(vec![Point::new(5.0, 5.0)], Color::rgb(0, 0, 255), 4.0, StrokeTool::Pen).unwrap();
    let fg = layer_with(Uuid::new_v4(), 0, vec![dot]);
    let vis = LayerVisibility::default();
    let out = render_page(&scene(Some(&image), &[], &fg, &vis)).unwrap();
    assert_eq!(out.get_pixel(5, 5).0, BLUE);
    assert_eq!(out.get_pixel(15, 15).0, WHITE);
}

#[test]
fn foreground_draws_above_background() {
    let image = page_image();
    let bg = vec![Arc::new(layer_with(Uuid::new_v4(), 1, vec![line(BLUE, StrokeTool::Pen, 4.0)]))];
    let fg = layer_with(Uuid::new_v4(), 0, vec![line(RED, StrokeTool::Pen, 4.0)]);
    let vis = LayerVisibility::default();
    let out = render_page(&scene(Some(&image), &bg, &fg, &vis)).unwrap();
    assert_eq!(out.get_pixel(10, 10).0, RED);
}

#[test]
fn later_background_layer_draws_above_earlier() {
    let image = page_image();
    let early = Arc::new(layer_with(Uuid::new_v4(), 1, vec![line(RED, StrokeTool::Pen, 4.0)]));
    let late = Arc::new(layer_with(Uuid::new_v4(), 2, vec![line(BLUE, StrokeTool::Pen, 4.0)]));
    let fg = AnnotationLayer::empty(Uuid::new_v4());
    let vis = LayerVisibility::default();

    let supplied_late_first = vec![late.clone(), early.clone()];
    let out = render_page(&scene(Some(&image), &supplied_late_first, &fg, &vis)).unwrap();
    assert_eq!(out.get_pixel(10, 10).0, BLUE);
}

#[test]
fn hidden_background_layer_is_not_drawn() {
    let image = page_image();
    let owner = Uuid::new_v4();
    let bg = vec![Arc::new(layer_with(owner, 1, vec![line(BLUE, StrokeTool::Pen, 4.0)]))];
    let fg = AnnotationLayer::empty(Uuid::new_v4());
    let mut vis = LayerVisibility::default();
    vis.set_visible(owner, false);
    let out = render_page(&scene(Some(&image), &bg, &fg, &vis)).unwrap();
    assert_eq!(out.get_pixel(10, 10).0, WHITE);
    assert_eq!(bg[0].strokes.len(), 1);
}

#[test]
fn eraser_stroke_clears_only_its_own_layer() {
    let image = page_image();
    let bg = vec![Arc::new(layer_with(Uuid::new_v4(), 1, vec![line(BLUE, StrokeTool::Pen, 4.0)]))];
    let fg = layer_with(
        Uuid::new_v4(),
        0,
        vec![line(RED, StrokeTool::Pen, 4.0), line(RED, StrokeTool::Eraser, 6.0)],
    );
    let vis = LayerVisibility::default();
    let out = render_page(&scene(Some(&image), &bg, &fg, &vis)).unwrap();
    assert_eq!(out.get_pixel(10, 10).0, BLUE);
}

#[test]
fn translucent_stroke_blends_over_page() {
    let image = page_image();
    let half_red = Stroke::new(
        vec![Point::new(2.0, 10.0), Point::new(18.0, 10.0)],
        Color { r: 255, g: 0, b: 0, a: 128 },
        4.0,
        StrokeTool::Pen,
    )
    .unwrap();
    let fg = layer_with(Uuid::new_v4(), 0, vec![half_red]);
    let vis = LayerVisibility::default();
    let out = render_page(&scene(Some(&image), &[], &fg, &vis)).unwrap();
    let px = out.get_pixel(10, 10).0;
    assert_eq!(px[0], 255);
    assert!(px[1] > 100 && px[1] < 155, "{px:?}");
    assert_eq!(px[3], 255);
}

// =============================================================
// render through a view
// =============================================================

#[test]
fn render_is_pixel_identical_across_calls_and_layer_supply_order() {
    let image = page_image();
    let a = Arc::new(layer_with(Uuid::new_v4(), 1, vec![line(BLUE, StrokeTool::Pen, 3.0)]));
    let b = Arc::new(layer_with(
        Uuid::new_v4(),
        2,
        vec![Stroke::new(vec![Point::new(10.0, 2.0), Point::new(10.0, 18.0)], Color::rgb(0, 128, 0), 2.0, StrokeTool::Pen)
            .unwrap()],
    ));
    let fg = layer_with(Uuid::new_v4(), 0, vec![line(RED, StrokeTool::Pen, 1.0)]);
    let vis = LayerVisibility::default();

    let mut view = ViewTransform::default();
    view.set_view(Point::new(7.0, 3.0), 2.5);

    let forward = vec![a.clone(), b.clone()];
    let reversed = vec![b, a];
    let first = render(&scene(Some(&image), &forward, &fg, &vis), &view, 64, 48).unwrap();
    let second = render(&scene(Some(&image), &forward, &fg, &vis), &view, 64, 48).unwrap();
    let third = render(&scene(Some(&image), &reversed, &fg, &vis), &view, 64, 48).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, third);
}

#[test]
fn render_places_page_at_view_offset() {
    let image = page_image();
    let fg = AnnotationLayer::empty(Uuid::new_v4());
    let vis = LayerVisibility::default();
    let mut view = ViewTransform::default();
    view.set_view(Point::new(10.0, 10.0), 2.0);

    let out = render(&scene(Some(&image), &[], &fg, &vis), &view, 100, 100).unwrap();
    assert_eq!(out.get_pixel(5, 5).0, BACKDROP_RGBA);
    assert_eq!(out.get_pixel(10, 10).0, WHITE);
    assert_eq!(out.get_pixel(49, 49).0, WHITE);
    assert_eq!(out.get_pixel(50, 50).0, BACKDROP_RGBA);
}

#[test]
fn preview_stroke_is_drawn_on_top() {
    let image = page_image();
    let fg = layer_with(Uuid::new_v4(), 0, vec![line(BLUE, StrokeTool::Pen, 4.0)]);
    let preview = line(RED, StrokeTool::Pen, 4.0);
    let vis = LayerVisibility::default();
    let mut s = scene(Some(&image), &[], &fg, &vis);
    s.preview = Some(&preview);
    let out = render_page(&s).unwrap();
    assert_eq!(out.get_pixel(10, 10).0, RED);
}

#[test]
fn zero_sized_viewport_is_empty() {
    let image = page_image();
    let fg = AnnotationLayer::empty(Uuid::new_v4());
    let vis = LayerVisibility::default();
    let out = render(&scene(Some(&image), &[], &fg, &vis), &ViewTransform::default(), 0, 10).unwrap();
    assert_eq!(out.dimensions(), (0, 10));
}

#[test]
fn oversized_viewport_is_rejected() {
    let image = page_image();
    let fg = AnnotationLayer::empty(Uuid::new_v4());
    let vis = LayerVisibility::default();
    let err = render(&scene(Some(&image), &[], &fg, &vis), &ViewTransform::default(), 70_000, 10).unwrap_err();
    assert_eq!(err, CanvasError::SurfaceTooLarge { width: 70_000, height: 10 });
}

#[test]
fn stroke_edges_are_antialiased() {
    let image = page_image();
    let fg = layer_with(Uuid::new_v4(), 0, vec![line(RED, StrokeTool::Pen, 3.0)]);
    let vis = LayerVisibility::default();
    let out = render_page(&scene(Some(&image), &[], &fg, &vis)).unwrap();
    assert_eq!(out.get_pixel(10, 10).0, RED);
    let edge = out.get_pixel(10, 8).0;
    assert_eq!(edge[0], 255);
    assert!(edge[1] > 0 && edge[1] < 255, "{edge:?}");
    assert_eq!(out.get_pixel(10, 6).0, WHITE);
}

#[test]
fn eraser_dot_clears_a_round_hole() {
    let image = page_image();
    let hole = Stroke::new(vec![Point::new(10.0, 10.0)], Color::rgb(0, 0, 0), 4.0, StrokeTool::Eraser).unwrap();
    let fg = layer_with(Uuid::new_v4(), 0, vec![line(RED, StrokeTool::Pen, 6.0), hole]);
    let vis = LayerVisibility::default();
    let out = render_page(&scene(Some(&image), &[], &fg, &vis)).unwrap();
    assert_eq!(out.get_pixel(10, 10).0, WHITE);
    assert_eq!(out.get_pixel(4, 10).0, RED);
}
