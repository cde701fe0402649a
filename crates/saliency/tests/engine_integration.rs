//! Integration tests for the heatmap engine on the reference classifier.
//!
//! These tests run the full forward/backward pipeline on small randomly
//! initialized VGG-style networks with synthetic images.

use std::thread;

use burn::prelude::*;
use burn::tensor::TensorData;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use saliency::prelude::*;

type ExplainBackend = Autodiff<NdArray>;

/// Raw logits keep the maps' maxima far above the normalization epsilon.
fn small_config() -> VggNetConfig {
    VggNetConfig::new(16, 16, 3, 5)
        .with_blocks(vec![6, 8], vec![2, 2])
        .with_softmax_output(false)
}

/// Create a synthetic preprocessed image with values roughly in [-1, 1].
fn synthetic_image(shape: ImageShape, seed: u64) -> Vec<f32> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..shape.numel())
        .map(|i| {
            let row = (i / (shape.width() * shape.channels())) as f32 / shape.height() as f32;
            row - 0.5 + rng.gen::<f32>() * 0.5
        })
        .collect()
}

fn to_tensor(values: Vec<f32>, shape: ImageShape) -> Tensor<ExplainBackend, 4> {
    Tensor::from_data(TensorData::new(values, shape.as_batch_dims()), &Default::default())
}

fn assert_unit_range(heatmap: &Heatmap) {
    assert!(
        heatmap.values().iter().all(|&v| (0.0..=1.0).contains(&v)),
        "values outside [0, 1] at {}",
        heatmap.layer()
    );
    // max / (max + 1e-10) falls short of 1 for tiny raw maxima
    let max = heatmap.max();
    assert!(heatmap.is_zero() || (max > 0.999 && max <= 1.0), "max {max}");
}

#[test]
fn test_softmax_output_range() {
    let device = Default::default();
    let config = small_config().with_softmax_output(true);
    let model = config.init::<ExplainBackend>(&device);
    let shape = config.input_shape();
    let image = synthetic_image(shape, 42);

    for layer in ["block1_conv1", "block2_conv2", "block2_pool"] {
        let heatmap = compute_heatmap(&model, to_tensor(image.clone(), shape), layer).unwrap();
        assert!(heatmap.score() > 0.0 && heatmap.score() <= 1.0);
        assert_unit_range(&heatmap);
    }
}

#[test]
fn test_heatmap_shape_and_range_at_every_layer() {
    let device = Default::default();
    let config = small_config();
    let model = config.try_init::<ExplainBackend>(&device).expect("valid config");
    let shape = config.input_shape();
    let image = synthetic_image(shape, 42);

    for tap in config.tap_points() {
        let heatmap = compute_heatmap(&model, to_tensor(image.clone(), shape), &tap.name)
            .unwrap_or_else(|e| panic!("{}: {e}", tap.name));

        assert_eq!(heatmap.dim(), tap.shape.spatial(), "{}", tap.name);
        assert_eq!(heatmap.channel_weights().len(), tap.shape.channels());
        assert!(heatmap.class_index() < config.n_classes);
        assert_unit_range(&heatmap);
    }
}

#[test]
fn test_grad_cam_method_range() {
    let device = Default::default();
    let config = small_config();
    let model = config.init::<ExplainBackend>(&device);
    let shape = config.input_shape();
    let engine = HeatmapEngine::new(EngineConfig::default().with_method(CamMethod::GradCam));

    let heatmap = engine
        .compute(&model, to_tensor(synthetic_image(shape, 3), shape), "block2_conv2")
        .expect("heatmap");

    assert_eq!(heatmap.method(), CamMethod::GradCam);
    assert_eq!(heatmap.dim(), (8, 8));
    assert_unit_range(&heatmap);
}

#[test]
fn test_heatmap_is_deterministic() {
    let device = Default::default();
    let config = small_config();
    let model = config.init::<ExplainBackend>(&device);
    let shape = config.input_shape();
    let image = synthetic_image(shape, 7);

    let first = compute_heatmap(&model, to_tensor(image.clone(), shape), "block2_conv2").unwrap();
    let second = compute_heatmap(&model, to_tensor(image, shape), "block2_conv2").unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_explains_predicted_class() {
    let device = Default::default();
    let config = small_config();
    let model = config.init::<ExplainBackend>(&device);
    let shape = config.input_shape();
    let image = synthetic_image(shape, 11);

    let probs = model
        .forward(to_tensor(image.clone(), shape))
        .into_data()
        .to_vec::<f32>()
        .unwrap();
    let heatmap = compute_heatmap(&model, to_tensor(image, shape), "block1_pool").unwrap();

    let expected = probs
        .iter()
        .enumerate()
        .fold(0, |best, (i, &p)| if p > probs[best] { i } else { best });
    assert_eq!(heatmap.class_index(), expected);
    assert!((heatmap.score() - probs[expected]).abs() < 1e-6);
}

#[test]
fn test_explicit_target_class() {
    let device = Default::default();
    let config = small_config();
    let model = config.init::<ExplainBackend>(&device);
    let shape = config.input_shape();

    for class in 0..config.n_classes {
        let engine = HeatmapEngine::new(EngineConfig::default().with_target(TargetClass::Index(class)));
        let heatmap = engine
            .compute(&model, to_tensor(synthetic_image(shape, 5), shape), "block2_conv1")
            .unwrap();
        assert_eq!(heatmap.class_index(), class);
        assert_unit_range(&heatmap);
    }
}

#[test]
fn test_invalid_layer() {
    let device = Default::default();
    let config = small_config();
    let model = config.init::<ExplainBackend>(&device);
    let shape = config.input_shape();

    for layer in ["block5_conv3", "fc", ""] {
        let err = compute_heatmap(&model, to_tensor(synthetic_image(shape, 1), shape), layer)
            .unwrap_err();
        assert!(
            matches!(err, SaliencyError::InvalidLayer { .. }),
            "{layer:?} gave {err}"
        );
        assert!(err.is_client_error());
    }
}

#[test]
fn test_shape_mismatch() {
    let device = Default::default();
    let model = small_config().init::<ExplainBackend>(&device);

    let wrong_size = ImageShape::new(8, 8, 3);
    let err = compute_heatmap(
        &model,
        to_tensor(synthetic_image(wrong_size, 1), wrong_size),
        "block1_conv1",
    )
    .unwrap_err();
    assert!(matches!(err, SaliencyError::ShapeMismatch(_)));

    let batch = Tensor::<ExplainBackend, 4>::zeros([2, 16, 16, 3], &device);
    let err = compute_heatmap(&model, batch, "block1_conv1").unwrap_err();
    assert!(matches!(err, SaliencyError::ShapeMismatch(_)));
}

#[test]
fn test_concurrent_invocations_share_classifier() {
    let device = Default::default();
    let config = small_config();
    let model = config.init::<ExplainBackend>(&device);
    let shape = config.input_shape();
    let image = synthetic_image(shape, 99);

    let reference = compute_heatmap(&model, to_tensor(image.clone(), shape), "block2_conv2").unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let model = model.clone();
            let image = image.clone();
            thread::spawn(move || {
                compute_heatmap(&model, to_tensor(image, shape), "block2_conv2")
                    .expect("heatmap in worker thread")
            })
        })
        .collect();

    for handle in handles {
        let heatmap = handle.join().expect("worker panicked");
        assert_eq!(heatmap, reference);
    }
}

#[test]
fn test_checkpoint_reload_gives_same_heatmap() {
    let device = Default::default();
    let config = small_config();
    let model = config.init::<ExplainBackend>(&device);
    let shape = config.input_shape();
    let image = synthetic_image(shape, 21);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("classifier");
    model.save_checkpoint(&path).unwrap();
    let restored = config
        .init::<ExplainBackend>(&device)
        .load_checkpoint(&path, &device)
        .unwrap();

    let expected = compute_heatmap(&model, to_tensor(image.clone(), shape), "block1_conv2").unwrap();
    let actual = compute_heatmap(&restored, to_tensor(image, shape), "block1_conv2").unwrap();
    assert_eq!(expected, actual);
}

#[test]
fn test_resize_to_input_resolution() {
    let device = Default::default();
    let config = small_config();
    let model = config.init::<ExplainBackend>(&device);
    let shape = config.input_shape();

    let heatmap = compute_heatmap(&model, to_tensor(synthetic_image(shape, 8), shape), "block2_pool")
        .unwrap();
    assert_eq!(heatmap.dim(), (4, 4));

    let overlay = heatmap.resize(shape.height(), shape.width()).unwrap();
    assert_eq!(overlay.dim(), (16, 16));
    assert!(overlay.values().iter().all(|&v| (0.0..=1.0).contains(&v)));
    assert_eq!(overlay.class_index(), heatmap.class_index());

    let report = overlay.to_report();
    assert_eq!((report.height, report.width), (16, 16));
}
