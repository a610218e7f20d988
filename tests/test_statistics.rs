use approx::assert_relative_eq;
use ndarray::array;
use rastercalc::core::statistics::{raster_percentiles, raster_statistics};
use rastercalc::{array_to_raster, ProcessingContext, RasterDataType};
use tempfile::TempDir;

const ND: f64 = -9999.0;

#[test]
fn test_statistics_skip_nodata() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dem.tif");
    let data = array![[1.0, 2.0, ND], [4.0, ND, 6.0], [7.0, 8.0, 9.0]];
    array_to_raster(&data, &path, RasterDataType::Float32, Some(ND), [0.0, 1.0, 0.0, 0.0, 0.0, -1.0], "")
        .unwrap();

    let ctx = ProcessingContext::new("stats");
    let stats = raster_statistics(&ctx, &path, 1).unwrap();
    assert_eq!(stats.valid_count, 7);
    assert_eq!(stats.nodata_count, 2);
    assert_eq!(stats.min, Some(1.0));
    assert_eq!(stats.max, Some(9.0));
    assert_relative_eq!(stats.sum, 37.0);
    assert_relative_eq!(stats.mean.unwrap(), 37.0 / 7.0);

    let percentiles = raster_percentiles(&ctx, &path, 1, &[0.0, 50.0, 100.0]).unwrap();
    assert_eq!(percentiles, vec![1.0, 6.0, 9.0]);
}

#[test]
fn test_percentiles_of_empty_raster_fail() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.tif");
    let data = array![[ND, ND], [ND, ND]];
    array_to_raster(&data, &path, RasterDataType::Int16, Some(ND), [0.0, 1.0, 0.0, 0.0, 0.0, -1.0], "")
        .unwrap();

    let ctx = ProcessingContext::default();
    let stats = raster_statistics(&ctx, &path, 1).unwrap();
    assert_eq!(stats.valid_count, 0);
    assert_eq!(stats.mean, None);
    assert!(raster_percentiles(&ctx, &path, 1, &[50.0]).is_err());
}
