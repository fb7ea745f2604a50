//! Plane extraction throughput: contiguous native copies vs strided scans

use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use voxstream::{Axis, DenseVoxelGrid, ScalarType, VolumeMetadata, VoxelBuffer};

fn pattern_grid() -> DenseVoxelGrid {
    let meta = VolumeMetadata::new([256, 256, 64], [1.0; 3], ScalarType::U16)
        .expect("valid benchmark metadata");
    let data: Vec<u16> = (0..meta.voxel_count()).map(|i| (i % 4096) as u16).collect();
    DenseVoxelGrid::new(meta, VoxelBuffer::U16(data)).expect("valid benchmark grid")
}

fn bench_plane_extraction(c: &mut Criterion) {
    let grid = pattern_grid();

    c.bench_function("native_plane_256x256", |b| {
        b.iter(|| black_box(grid.plane_sync(Axis::Z, black_box(32)).unwrap()))
    });

    c.bench_function("derived_plane_y_256x64", |b| {
        b.iter(|| black_box(grid.plane_sync(Axis::Y, black_box(128)).unwrap()))
    });

    c.bench_function("derived_plane_x_256x64", |b| {
        b.iter(|| black_box(grid.plane_sync(Axis::X, black_box(128)).unwrap()))
    });
}

criterion_group!(benches, bench_plane_extraction);
criterion_main!(benches);
