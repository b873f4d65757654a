use ticker_board::model::{PricePoint, SymbolEntry};
use ticker_board::render::sparkline::{draw_sparkline, ChartArea, SparklineStyle};
use ticker_board::render::surface::{FrameBuffer, Surface};
use ticker_board::render::{format_gain, gain_pct, BoardLayout, Renderer};
use ticker_board::store::{PriceStore, SqlitePriceStore};

const AREA: ChartArea = ChartArea {
    x: 0,
    y: 0,
    width: 8,
    height: 4,
};

fn layout() -> BoardLayout {
    BoardLayout {
        width: 8,
        height: 16,
        chart_height: 4,
        logo_size: 6,
        render_logos: true,
    }
}

const NOW: i64 = 1_700_000_000_000;

#[test]
/// Verifies an all-gap window draws nothing, repeatedly.
fn all_gap_window_renders_blank() {
    let mut fb = FrameBuffer::new(8, 5);
    let window = vec![None; 8];
    assert_eq!(draw_sparkline(&mut fb, AREA, &window, SparklineStyle::default()), 0);
    assert_eq!(draw_sparkline(&mut fb, AREA, &window, SparklineStyle::default()), 0);
    assert_eq!(fb.lit_pixels(), 0);
}

#[test]
/// Verifies a flat series draws a single baseline row of peaks.
fn flat_series_draws_baseline_only() {
    let mut fb = FrameBuffer::new(8, 5);
    let window = vec![Some(42.0); 8];
    let style = SparklineStyle::default();
    assert_eq!(draw_sparkline(&mut fb, AREA, &window, style), 8);
    for x in 0..8 {
        assert_eq!(fb.pixel(x, 4), Some(style.top));
        assert!(fb.pixel(x, 3).unwrap().is_black());
    }
}

#[test]
/// Verifies leading gaps are trimmed so the chart starts at column 0, while
/// interior gaps stay blank.
fn leading_gaps_trimmed_interior_gaps_blank() {
    let mut fb = FrameBuffer::new(8, 5);
    let window = vec![None, None, Some(1.0), None, Some(5.0)];
    draw_sparkline(&mut fb, AREA, &window, SparklineStyle::default());

    // column 0 = first real sample (min, baseline only)
    assert!(!fb.pixel(0, 4).unwrap().is_black());
    // column 1 = interior gap
    for y in 0..5 {
        assert!(fb.pixel(1, y).unwrap().is_black());
    }
    // column 2 = max, full height
    assert!(!fb.pixel(2, 0).unwrap().is_black());
    for x in 3..8 {
        assert!(fb.pixel(x, 4).unwrap().is_black());
    }
}

#[test]
/// Verifies peaks are highlighted, fill below uses the base color and rows
/// above a lower neighbour's peak are highlighted as a ridge.
fn ridge_highlights_rows_above_lower_neighbour() {
    let mut fb = FrameBuffer::new(8, 5);
    let style = SparklineStyle::default();
    // peaks: 0, 4, 4
    let window = vec![Some(0.0), Some(8.0), Some(8.0)];
    draw_sparkline(&mut fb, AREA, &window, style);

    // column 1 has a lower left neighbour: rows 1..=4 highlighted, row 0 base
    for row in 1..=4 {
        assert_eq!(fb.pixel(1, 4 - row), Some(style.top), "row {}", row);
    }
    assert_eq!(fb.pixel(1, 4), Some(style.base));
    // column 2 neighbours are not lower above the baseline: only the peak is top
    assert_eq!(fb.pixel(2, 0), Some(style.top));
    assert_eq!(fb.pixel(2, 2), Some(style.base));
}

#[test]
/// Verifies only the newest `width` buckets are drawn.
fn oversized_window_shows_newest_columns() {
    let mut fb = FrameBuffer::new(8, 5);
    let mut window = vec![Some(1.0); 8];
    window.push(Some(9.0));
    draw_sparkline(&mut fb, AREA, &window, SparklineStyle::default());
    assert!(!fb.pixel(7, 0).unwrap().is_black());
}

#[test]
/// Verifies a transient preview leaves the stored window byte-identical.
fn transient_render_does_not_mutate_window() {
    let store = SqlitePriceStore::open_in_memory(60).unwrap();
    store.write("AAPL", 10.0, NOW - 120_000).unwrap();
    store.write("AAPL", 11.0, NOW).unwrap();

    let mut renderer = Renderer::new(layout());
    renderer.update_chart("AAPL", 0, Some(PricePoint::Confirmed(11.0)), &store, NOW);
    let before = renderer.window("AAPL").cloned().expect("window loaded");

    let mut fb = FrameBuffer::new(8, 16);
    let drawn = renderer.draw_chart(&mut fb, "AAPL", Some(14.0));
    assert!(drawn > 0);
    assert_eq!(renderer.window("AAPL"), Some(&before));

    renderer.update_chart("AAPL", 0, Some(PricePoint::Transient(15.0)), &store, NOW + 1_000);
    assert_eq!(renderer.window("AAPL"), Some(&before));
}

#[test]
/// Verifies the first update loads the window from the store and later
/// durable updates roll it forward, including backfilled gaps.
fn update_chart_loads_then_rolls() {
    let store = SqlitePriceStore::open_in_memory(60).unwrap();
    store.write("AAPL", 10.0, NOW).unwrap();

    let mut renderer = Renderer::new(layout());
    renderer.update_chart("AAPL", 3, Some(PricePoint::Confirmed(10.0)), &store, NOW);
    let loaded: Vec<_> = renderer.window("AAPL").unwrap().iter().copied().collect();
    assert_eq!(loaded.len(), 8);
    assert_eq!(loaded[7], Some(10.0));
    assert_eq!(loaded.iter().flatten().count(), 1);

    renderer.update_chart("AAPL", 2, Some(PricePoint::Confirmed(12.0)), &store, NOW + 180_000);
    let rolled: Vec<_> = renderer.window("AAPL").unwrap().iter().copied().collect();
    assert_eq!(rolled.len(), 8);
    assert_eq!(&rolled[4..], &[Some(10.0), None, None, Some(12.0)]);

    renderer.clear_charts();
    assert!(renderer.window("AAPL").is_none());
}

#[test]
/// Verifies the primary view draws label, price, gain and logo.
fn primary_view_draws_text_and_logo() {
    let store = SqlitePriceStore::open_in_memory(60).unwrap();
    store.write("AAPL", 100.0, NOW - 60_000).unwrap();

    let entry = SymbolEntry {
        api_name: "AAPL".to_string(),
        label: "Apple".to_string(),
        logo: Some("apple".to_string()),
    };
    let mut renderer = Renderer::new(layout());
    let mut fb = FrameBuffer::new(8, 16);
    renderer.render_primary(&mut fb, &entry, Some(110.0), Some(110.0), true, &store, NOW);

    let texts: Vec<&str> = fb.texts().iter().map(|t| t.text.as_str()).collect();
    assert!(texts.contains(&"Apple"));
    assert!(texts.contains(&"110.00"));
    assert!(texts.contains(&"+10.00%"));
    assert_eq!(fb.images().len(), 1);
    assert_eq!(fb.images()[0].key, "apple");
}

#[test]
/// Verifies the price falls back to the last stored price when nothing is
/// in flight.
fn primary_view_falls_back_to_last_price() {
    let store = SqlitePriceStore::open_in_memory(60).unwrap();
    store.write("AAPL", 99.5, NOW - 60_000).unwrap();

    let mut renderer = Renderer::new(layout());
    let mut fb = FrameBuffer::new(8, 16);
    renderer.render_primary(&mut fb, &SymbolEntry::plain("AAPL"), None, None, true, &store, NOW);
    assert!(fb.texts().iter().any(|t| t.text == "99.50"));
}

#[test]
fn gain_formatting() {
    assert!((gain_pct(110.0, 100.0).unwrap() - 10.0).abs() < 1e-9);
    assert_eq!(gain_pct(110.0, 0.0), None);
    assert_eq!(format_gain(-1.234), "-1.23%");
    assert_eq!(format_gain(0.5), "+0.50%");
}

#[test]
fn clear_region_drops_pixels_and_spans() {
    let mut fb = FrameBuffer::new(8, 8);
    fb.set_pixel(1, 1, ticker_board::render::surface::Rgb::WHITE);
    fb.draw_text(1, 1, "x", ticker_board::render::surface::Rgb::WHITE);
    fb.draw_text(6, 6, "y", ticker_board::render::surface::Rgb::WHITE);
    fb.clear_region(0, 0, 4, 4);
    assert_eq!(fb.lit_pixels(), 0);
    assert_eq!(fb.texts().len(), 1);
}
