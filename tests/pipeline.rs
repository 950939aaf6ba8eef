use std::path::PathBuf;

use image::{DynamicImage, GrayAlphaImage, LumaA};
use rstest::{fixture, rstest};

use ferrite_cam::gradcam::TOP_K;
use ferrite_cam::{CamError, ClassSelection, EngineConfig, GradCam, LayerIndex, NetworkSpec, LAYER_CATALOG};

mod support;
use support::{approx_eq, png_bytes, synthetic_image, tiny_engine};

#[fixture]
fn engine() -> GradCam {
    tiny_engine()
}

fn rank(r: usize) -> ClassSelection {
    ClassSelection::from_rank(Some(r)).expect("valid rank")
}

#[rstest]
#[case(synthetic_image(64, 64))]
#[case(synthetic_image(300, 120))]
#[case(synthetic_image(17, 91))]
#[case(DynamicImage::ImageLumaA8(GrayAlphaImage::from_pixel(40, 40, LumaA([90, 10]))))]
fn predict_returns_a_ranked_table_of_five(engine: GradCam, #[case] image: DynamicImage) {
    let table = engine.predict(&image);
    assert_eq!(table.len(), TOP_K);
    assert!(table.iter().all(|p| (0.0..=1.0).contains(&p.confidence)));
    assert!(table.windows(2).all(|w| w[0].confidence >= w[1].confidence));
    let ranks: Vec<usize> = table.iter().map(|p| p.rank).collect();
    assert_eq!(ranks, vec![0, 1, 2, 3, 4]);
}

#[rstest]
fn every_catalog_layer_gives_a_unit_interval_heatmap(engine: GradCam) {
    let image = synthetic_image(64, 64);
    let mut previous_width = usize::MAX;
    for entry in LAYER_CATALOG.iter() {
        let layer = LayerIndex::new(entry.index).expect("catalog index");
        let out = engine.explain(&image, layer, ClassSelection::Top).expect("explain");
        assert!(
            out.heatmap.values.iter().all(|v| (0.0..=1.0).contains(v)),
            "layer {} left the unit interval",
            entry.name
        );
        assert!(out.heatmap.is_empty() || approx_eq(out.heatmap.max(), 1.0, 1e-6));
        // Catalog order is depth order, so maps never get finer.
        assert!(out.heatmap.width <= previous_width, "layer {} is finer than its predecessor", entry.name);
        previous_width = out.heatmap.width;
    }
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(2)]
#[case(3)]
#[case(4)]
fn rank_selection_matches_the_prediction_table(engine: GradCam, #[case] r: usize) {
    let image = synthetic_image(96, 64);
    let table = engine.predict(&image);
    let out = engine.explain(&image, LayerIndex::DEFAULT, rank(r)).expect("explain");
    assert_eq!(out.class_index, table[r].class_index);
    assert_eq!(out.label, table[r].label);
    assert_eq!(out.predictions, table);
}

#[rstest]
fn unselected_class_is_the_full_argmax(engine: GradCam) {
    let image = synthetic_image(64, 64);
    let out = engine.explain(&image, LayerIndex::DEFAULT, ClassSelection::Top).expect("explain");
    let prepared = engine.prepare(&image);
    assert_eq!(out.class_index, engine.network().scores(&prepared.input).argmax());
    assert_eq!(out.class_index, out.predictions[0].class_index);
}

#[rstest]
fn fifth_place_is_a_different_class(engine: GradCam) {
    let image = synthetic_image(64, 64);
    let first = engine.explain(&image, LayerIndex::DEFAULT, rank(0)).expect("rank 0");
    let fifth = engine.explain(&image, LayerIndex::DEFAULT, rank(4)).expect("rank 4");
    assert_ne!(first.class_index, fifth.class_index);
}

#[rstest]
#[case(0)]
#[case(8)]
#[case(17)]
fn overlay_has_the_prepared_image_dimensions(engine: GradCam, #[case] layer: usize) {
    let image = synthetic_image(200, 50);
    let out = engine
        .explain(&image, LayerIndex::new(layer).expect("layer"), ClassSelection::Top)
        .expect("explain");
    let size = engine.network().image_size() as u32;
    assert_eq!(out.overlay.dimensions(), (size, size));
    assert_eq!(out.input.dimensions(), (size, size));
}

#[rstest]
fn repeated_requests_are_bit_identical(engine: GradCam) {
    let image = synthetic_image(64, 64);
    let layer = LayerIndex::new(11).expect("layer");
    let a = engine.explain(&image, layer, rank(2)).expect("first");
    let b = engine.explain(&image, layer, rank(2)).expect("second");
    assert_eq!(a.heatmap, b.heatmap);
    assert_eq!(a.overlay, b.overlay);
}

#[rstest]
fn stem_and_top_maps_differ(engine: GradCam) {
    let image = synthetic_image(64, 64);
    let stem = engine.explain(&image, LayerIndex::new(0).expect("stem"), ClassSelection::Top).expect("stem");
    let top = engine.explain(&image, LayerIndex::DEFAULT, ClassSelection::Top).expect("top");
    assert!(stem.heatmap.width > top.heatmap.width);
    assert!(stem.heatmap.height > top.heatmap.height);
    assert!(!stem.heatmap.is_empty(), "stem map carries no evidence");
    assert!(!top.heatmap.is_empty(), "top map carries no evidence");
    assert_ne!(stem.overlay, top.overlay, "stem and top overlays are pixel-identical");
}

#[rstest]
fn concurrent_requests_share_one_network(engine: GradCam) {
    let image = synthetic_image(64, 64);
    let expected = engine.explain(&image, LayerIndex::DEFAULT, ClassSelection::Top).expect("serial");
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = engine.clone();
            let image = image.clone();
            std::thread::spawn(move || engine.explain(&image, LayerIndex::DEFAULT, ClassSelection::Top))
        })
        .collect();
    for handle in handles {
        let out = handle.join().expect("thread").expect("explain");
        assert_eq!(out.heatmap, expected.heatmap);
    }
}

#[rstest]
fn bytes_entry_points_decode_first(engine: GradCam) {
    let image = synthetic_image(64, 64);
    let bytes = png_bytes(&image);
    assert_eq!(engine.predict_bytes(&bytes).expect("predict"), engine.predict(&image));
    assert!(matches!(engine.predict_bytes(b"GIF89a?"), Err(CamError::Decode(_))));
}

#[rstest]
fn small_vocabularies_reject_missing_ranks() {
    let spec = NetworkSpec { num_classes: 3, ..NetworkSpec::tiny() };
    let engine = GradCam::random(spec, 3).expect("engine");
    let image = synthetic_image(64, 64);
    assert_eq!(engine.predict(&image).len(), 3);
    let err = engine.explain(&image, LayerIndex::DEFAULT, rank(4));
    assert!(matches!(err, Err(CamError::RankUnavailable { rank: 4, classes: 3 })));
}

fn env_path(var: &str) -> PathBuf {
    PathBuf::from(std::env::var(var).unwrap_or_else(|_| panic!("{} must point at a file", var)))
}

/// Needs real ImageNet weights:
/// `FERRITE_CAM_WEIGHTS`, `FERRITE_CAM_LABELS` and a tabby cat photo in
/// `FERRITE_CAM_FIXTURE`.
#[rstest]
#[ignore = "requires EfficientNet-B0 ImageNet weights"]
fn tabby_cat_is_recognised_and_explained() {
    let config = EngineConfig::new(env_path("FERRITE_CAM_WEIGHTS"), env_path("FERRITE_CAM_LABELS"));
    let engine = GradCam::from_config(&config).expect("engine");
    let bytes = std::fs::read(env_path("FERRITE_CAM_FIXTURE")).expect("fixture");

    let out = engine.explain_bytes(&bytes, LayerIndex::DEFAULT, ClassSelection::Top).expect("explain");
    let top = out.predictions[0].label.to_lowercase();
    assert!(top.contains("cat") || top.contains("tabby"), "top prediction was {}", top);
    assert_eq!((out.heatmap.width, out.heatmap.height), (7, 7));
    assert_eq!(out.overlay.dimensions(), (224, 224));
    assert!(!out.heatmap.is_empty());
}
