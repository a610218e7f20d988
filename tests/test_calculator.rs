use ndarray::{array, Array2};
use rastercalc::core::operators::{
    AddWithHoles, Clamp, FnOperator, Multiply, Subtract, Threshold,
};
use rastercalc::core::reclassify::{LookupTable, Reclassify};
use rastercalc::core::BlockInput;
use rastercalc::{
    array_to_raster, raster_to_array, BlockReader, CalculatorConfig, Comparison, ProcessingContext,
    RasterCalculator, RasterDataType, RasterError, RasterInfo, RawConstant, SourceTerm,
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const ND: f64 = -9999.0;
const GEO_TRANSFORM: [f64; 6] = [100.0, 2.0, 0.0, 200.0, 0.0, -2.0];

fn write_f32(dir: &Path, name: &str, data: &Array2<f64>, nodata: Option<f64>) -> PathBuf {
    let path = dir.join(name);
    array_to_raster(data, &path, RasterDataType::Float32, nodata, GEO_TRANSFORM, "")
        .expect("Failed to write test raster");
    path
}

fn ramp(rows: usize, cols: usize, scale: f64) -> Array2<f64> {
    Array2::from_shape_fn((rows, cols), |(r, c)| (r * cols + c) as f64 * scale)
}

fn small_blocks() -> RasterCalculator {
    RasterCalculator::new(CalculatorConfig::default().with_block_size(3, 2))
}

#[test]
fn test_add_with_holes_scenario() {
    let dir = TempDir::new().unwrap();
    let a = write_f32(dir.path(), "a.tif", &array![[5.0, ND], [3.0, 4.0]], Some(ND));
    let b = write_f32(dir.path(), "b.tif", &array![[1.0, 2.0], [ND, 6.0]], Some(ND));
    let target = dir.path().join("sum.tif");

    let info = RasterCalculator::standard()
        .evaluate(
            &ProcessingContext::new("add_scenario"),
            &[SourceTerm::raster(&a), SourceTerm::raster(&b)],
            &AddWithHoles,
            &target,
            RasterDataType::Float32,
            -1.0,
        )
        .unwrap();

    assert_eq!(info.size, (2, 2));
    assert_eq!(raster_to_array(&target, 1).unwrap(), array![[6.0, 2.0], [3.0, 10.0]]);
}

#[test]
fn test_reclassify_passthrough_scenario() {
    let dir = TempDir::new().unwrap();
    let base = dir.path().join("lulc.tif");
    array_to_raster(&array![[1.0, 2.0], [3.0, 1.0]], &base, RasterDataType::Int32, None, GEO_TRANSFORM, "")
        .unwrap();
    let target = dir.path().join("reclass.tif");

    let table = LookupTable::from_pairs(vec![(1, 10.0), (2, 20.0)]);
    RasterCalculator::standard()
        .evaluate(
            &ProcessingContext::default(),
            &[SourceTerm::raster(&base)],
            &Reclassify::new(table, false),
            &target,
            RasterDataType::Int32,
            -1.0,
        )
        .unwrap();

    assert_eq!(raster_to_array(&target, 1).unwrap(), array![[10.0, 20.0], [3.0, 10.0]]);
}

#[test]
fn test_unmapped_code_aborts() {
    let dir = TempDir::new().unwrap();
    let base = dir.path().join("lulc.tif");
    array_to_raster(&array![[1.0, 2.0], [3.0, 1.0]], &base, RasterDataType::Int32, None, GEO_TRANSFORM, "")
        .unwrap();

    let table = LookupTable::from_pairs(vec![(1, 10.0), (2, 20.0)]);
    let result = RasterCalculator::standard().evaluate(
        &ProcessingContext::default(),
        &[SourceTerm::raster(&base)],
        &Reclassify::new(table, true),
        dir.path().join("reclass.tif"),
        RasterDataType::Int32,
        -1.0,
    );
    assert!(matches!(result, Err(RasterError::UnmappedCode { value }) if value == 3.0));
}

#[test]
fn test_strict_subtract_is_reproducible_across_blocks() {
    let dir = TempDir::new().unwrap();
    let mut a_data = ramp(7, 5, 1.5);
    a_data[[3, 2]] = ND;
    let mut b_data = ramp(7, 5, 0.25);
    b_data[[6, 4]] = ND;
    let a = write_f32(dir.path(), "a.tif", &a_data, Some(ND));
    let b = write_f32(dir.path(), "b.tif", &b_data, Some(ND));
    let first = dir.path().join("first.tif");
    let second = dir.path().join("second.tif");

    let sources = [SourceTerm::raster(&a), SourceTerm::raster(&b)];
    let calculator = small_blocks();
    let ctx = ProcessingContext::new("subtract");
    calculator
        .evaluate(&ctx, &sources, &Subtract, &first, RasterDataType::Float32, -1.0)
        .unwrap();
    calculator
        .evaluate(&ctx, &sources, &Subtract, &second, RasterDataType::Float32, -1.0)
        .unwrap();

    let r1 = raster_to_array(&first, 1).unwrap();
    let r2 = raster_to_array(&second, 1).unwrap();
    assert!(r1.iter().zip(r2.iter()).all(|(x, y)| x.to_bits() == y.to_bits()));

    assert_eq!(r1[[3, 2]], -1.0);
    assert_eq!(r1[[6, 4]], -1.0);
    assert_eq!(r1[[1, 1]], (a_data[[1, 1]] - b_data[[1, 1]]) as f32 as f64);
}

#[test]
fn test_union_with_zero_fill_property() {
    let dir = TempDir::new().unwrap();
    let (rows, cols) = (6, 7);
    let datasets: Vec<Array2<f64>> = (0..3)
        .map(|k| {
            Array2::from_shape_fn((rows, cols), |(r, c)| {
                // Each source has holes in a different pattern; (0, 0) is a hole everywhere
                if (r + c) % (k + 2) == 0 {
                    ND
                } else {
                    (r * cols + c + k) as f64
                }
            })
        })
        .collect();
    let paths: Vec<PathBuf> = datasets
        .iter()
        .enumerate()
        .map(|(k, data)| write_f32(dir.path(), &format!("s{}.tif", k), data, Some(ND)))
        .collect();
    let target = dir.path().join("stack.tif");

    small_blocks()
        .evaluate(
            &ProcessingContext::new("stack"),
            &paths.iter().map(SourceTerm::raster).collect::<Vec<_>>(),
            &AddWithHoles,
            &target,
            RasterDataType::Float64,
            -1.0,
        )
        .unwrap();
    let result = raster_to_array(&target, 1).unwrap();

    for r in 0..rows {
        for c in 0..cols {
            let valid: Vec<f64> = datasets
                .iter()
                .map(|d| d[[r, c]])
                .filter(|&v| v != ND)
                .collect();
            let expected = if valid.is_empty() { -1.0 } else { valid.iter().sum() };
            assert_eq!(result[[r, c]], expected, "pixel ({}, {})", r, c);
        }
    }
    assert_eq!(result[[0, 0]], -1.0);
}

#[test]
fn test_shape_mismatch_fails_before_output() {
    let dir = TempDir::new().unwrap();
    let a = write_f32(dir.path(), "a.tif", &ramp(2, 2, 1.0), None);
    let b = write_f32(dir.path(), "b.tif", &ramp(2, 3, 1.0), None);
    let target = dir.path().join("out.tif");

    let result = RasterCalculator::standard().evaluate(
        &ProcessingContext::default(),
        &[SourceTerm::raster(&a), SourceTerm::raster(&b)],
        &Multiply,
        &target,
        RasterDataType::Float32,
        ND,
    );
    assert!(matches!(result, Err(RasterError::ShapeMismatch(_))));
    assert!(!target.exists());

    let bad_row = SourceTerm::Raw(RawConstant::Row(vec![1.0, 2.0, 3.0]));
    let result = RasterCalculator::standard().evaluate(
        &ProcessingContext::default(),
        &[SourceTerm::raster(&a), bad_row],
        &Multiply,
        &target,
        RasterDataType::Float32,
        ND,
    );
    assert!(matches!(result, Err(RasterError::ShapeMismatch(_))));
    assert!(!target.exists());
}

#[test]
fn test_existing_target_requires_overwrite() {
    let dir = TempDir::new().unwrap();
    let a = write_f32(dir.path(), "a.tif", &ramp(3, 3, 1.0), None);
    let target = dir.path().join("out.tif");
    std::fs::write(&target, b"placeholder").unwrap();

    let clamp = Clamp::new(0.0, 4.0).unwrap();
    let sources = [SourceTerm::raster(&a)];
    let result = RasterCalculator::standard().evaluate(
        &ProcessingContext::default(),
        &sources,
        &clamp,
        &target,
        RasterDataType::Float32,
        ND,
    );
    assert!(matches!(result, Err(RasterError::TargetExists(_))));

    RasterCalculator::new(CalculatorConfig::default().with_overwrite(true))
        .evaluate(&ProcessingContext::default(), &sources, &clamp, &target, RasterDataType::Float32, ND)
        .unwrap();
    let result = raster_to_array(&target, 1).unwrap();
    assert!(result.iter().all(|&v| v == ND || (0.0..=4.0).contains(&v)));
    assert_eq!(result[[2, 2]], 4.0);
}

#[test]
fn test_unrepresentable_nodata_fails_before_output() {
    let dir = TempDir::new().unwrap();
    let a = write_f32(dir.path(), "a.tif", &array![[0.1, 0.6], [ND, 0.5]], Some(ND));
    let target = dir.path().join("mask.tif");

    let result = RasterCalculator::standard().evaluate(
        &ProcessingContext::default(),
        &[SourceTerm::raster(&a), SourceTerm::scalar(0.5)],
        &Threshold::new(Comparison::GreaterOrEqual),
        &target,
        RasterDataType::Byte,
        ND,
    );
    assert!(matches!(result, Err(RasterError::InvalidInput(_))));
    assert!(!target.exists());
}

#[test]
fn test_target_aliasing_a_source_is_rejected() {
    let dir = TempDir::new().unwrap();
    let a = write_f32(dir.path(), "a.tif", &ramp(3, 3, 1.0), None);
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    let alias = dir.path().join("sub").join("..").join("a.tif");

    let result = RasterCalculator::new(CalculatorConfig::default().with_overwrite(true)).evaluate(
        &ProcessingContext::default(),
        &[SourceTerm::raster(&a)],
        &Clamp::new(0.0, 4.0).unwrap(),
        &alias,
        RasterDataType::Float32,
        ND,
    );
    assert!(matches!(result, Err(RasterError::InvalidInput(_))));
    assert_eq!(raster_to_array(&a, 1).unwrap(), ramp(3, 3, 1.0));
}

#[test]
fn test_no_raster_source_rejected() {
    let dir = TempDir::new().unwrap();
    let result = RasterCalculator::standard().evaluate(
        &ProcessingContext::default(),
        &[SourceTerm::scalar(1.0)],
        &Multiply,
        dir.path().join("out.tif"),
        RasterDataType::Float32,
        ND,
    );
    assert!(matches!(result, Err(RasterError::InvalidInput(_))));
}

#[test]
fn test_raw_terms_are_broadcast_per_block() {
    let dir = TempDir::new().unwrap();
    let a = write_f32(dir.path(), "a.tif", &Array2::from_elem((4, 5), 2.0), None);
    let target = dir.path().join("scaled.tif");

    let row = RawConstant::Row(vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    let column = RawConstant::Column(vec![1.0, 10.0, 100.0, 1000.0]);
    small_blocks()
        .evaluate(
            &ProcessingContext::default(),
            &[SourceTerm::raster(&a), SourceTerm::Raw(row), SourceTerm::Raw(column)],
            &Multiply,
            &target,
            RasterDataType::Float64,
            ND,
        )
        .unwrap();

    let expected = Array2::from_shape_fn((4, 5), |(r, c)| 2.0 * (c + 1) as f64 * 10f64.powi(r as i32));
    assert_eq!(raster_to_array(&target, 1).unwrap(), expected);
}

#[test]
fn test_threshold_against_scalar_writes_byte() {
    let dir = TempDir::new().unwrap();
    let a = write_f32(dir.path(), "a.tif", &array![[0.1, 0.6], [ND, 0.5]], Some(ND));
    let target = dir.path().join("mask.tif");

    let info = RasterCalculator::standard()
        .evaluate(
            &ProcessingContext::default(),
            &[SourceTerm::raster(&a), SourceTerm::scalar(0.5)],
            &Threshold::new(Comparison::GreaterOrEqual),
            &target,
            RasterDataType::Byte,
            255.0,
        )
        .unwrap();

    assert_eq!(info.bands[0].datatype, Some(RasterDataType::Byte));
    assert_eq!(info.bands[0].nodata, Some(255.0));
    assert_eq!(raster_to_array(&target, 1).unwrap(), array![[0.0, 1.0], [255.0, 1.0]]);
}

#[test]
fn test_output_inherits_grid() {
    let dir = TempDir::new().unwrap();
    let a = write_f32(dir.path(), "a.tif", &ramp(3, 4, 1.0), Some(ND));
    let target = dir.path().join("out.tif");

    let info = RasterCalculator::standard()
        .evaluate(
            &ProcessingContext::default(),
            &[SourceTerm::raster(&a), SourceTerm::scalar(2.0)],
            &Multiply,
            &target,
            RasterDataType::Float64,
            -1.0,
        )
        .unwrap();
    let source = RasterInfo::open(&a).unwrap();

    assert!(info.is_aligned_with(&source));
    assert_eq!(info.geo_transform, GEO_TRANSFORM);
    assert_eq!(info.bands[0].nodata, Some(-1.0));
    assert_eq!(info.bands[0].datatype, Some(RasterDataType::Float64));
}

#[test]
fn test_operator_error_propagates() {
    let dir = TempDir::new().unwrap();
    let a = write_f32(dir.path(), "a.tif", &ramp(4, 4, 1.0), None);

    let failing = FnOperator::new("fail_on_large_values", |inputs: &[BlockInput<'_>], _nodata: f64| {
        if inputs[0].values.iter().any(|&v| v >= 6.0) {
            Err(RasterError::Processing("value too large".to_string()))
        } else {
            Ok(inputs[0].values.to_owned())
        }
    });
    let result = small_blocks().evaluate(
        &ProcessingContext::default(),
        &[SourceTerm::raster(&a)],
        &failing,
        dir.path().join("out.tif"),
        RasterDataType::Float32,
        ND,
    );
    assert!(matches!(result, Err(RasterError::Processing(_))));
}

#[test]
fn test_block_reader_covers_raster() {
    let dir = TempDir::new().unwrap();
    let data = ramp(9, 11, 1.0);
    let path = write_f32(dir.path(), "a.tif", &data, None);

    let reader = BlockReader::open_with_budget(&path, 1, 8 * 20).unwrap();
    let mut stitched = Array2::<f64>::from_elem((9, 11), f64::NAN);
    let mut count = 0;
    for block in reader.blocks() {
        let (window, values) = block.unwrap();
        stitched
            .slice_mut(ndarray::s![
                window.y_offset..window.y_offset + window.height,
                window.x_offset..window.x_offset + window.width
            ])
            .assign(&values);
        count += 1;
    }
    assert_eq!(count, reader.layout().block_count());
    assert_eq!(stitched, data);

    // A second pass starts over
    assert_eq!(reader.blocks().count(), count);
    assert!(matches!(BlockReader::open(&path, 2), Err(RasterError::InvalidInput(_))));
}
