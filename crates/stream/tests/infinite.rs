use std::collections::HashSet;

use glam::Vec3;
use proptest::prelude::*;
use tilefield_assets::MaterialParams;
use tilefield_common::{Dimensions, GridCoord};
use tilefield_render::{DebugTextRenderer, Renderer, SceneGraph};
use tilefield_stream::{
    DEFAULT_TILE_MATERIAL, FnHooks, GridRange, SideTable, TileConfig, TileManager,
};

fn scene_with(materials: &[&str]) -> SceneGraph {
    let mut scene = SceneGraph::new();
    for name in materials {
        scene.define_material(*name, MaterialParams::new()).unwrap();
    }
    scene
}

fn checkerboard() -> FnHooks {
    FnHooks::new().material(|c| {
        if (c.i + c.k).rem_euclid(2) == 1 {
            "red".to_string()
        } else {
            "white".to_string()
        }
    })
}

#[test]
fn active_and_inactive_after_one_step() {
    let mut scene = scene_with(&[DEFAULT_TILE_MATERIAL]);
    let config = TileConfig {
        threshold: 0,
        ..TileConfig::default()
    };
    let mut tiles = TileManager::new(config).unwrap();
    tiles.reposition(Vec3::ZERO, &mut scene).unwrap();
    assert_eq!(tiles.active_tiles().len(), 81);

    let stats = tiles
        .reposition(Vec3::new(0.0, 0.0, 10.0), &mut scene)
        .unwrap();
    assert_eq!(stats.deactivated, 9);
    assert_eq!(stats.created, 9);
    assert_eq!(tiles.active_tiles().len(), 81);
    assert_eq!(tiles.inactive_tiles().len(), 9);

    let report = scene.update_pass();
    assert_eq!(report.tiles, 81);
    assert_eq!(scene.node_count(), 90);
}

#[test]
fn three_dimensional_window() {
    let mut scene = scene_with(&[DEFAULT_TILE_MATERIAL]);
    let config = TileConfig {
        range: 1,
        dimensions: Dimensions::all(),
        ..TileConfig::default()
    };
    let mut tiles = TileManager::new(config).unwrap();
    tiles
        .reposition(Vec3::new(-14.0, 26.0, 5.0), &mut scene)
        .unwrap();
    // -1.4 -> -1, 2.6 -> 3, 0.5 rounds up to 1
    assert_eq!(tiles.center(), Some(GridCoord::new(-1, 3, 1)));
    assert_eq!(tiles.store().len(), 27);
}

#[test]
fn checkerboard_compresses_lightest_group_first() {
    let mut scene = scene_with(&["red", "white"]);
    let config = TileConfig {
        max_compression_time_ms: 0,
        ..TileConfig::default()
    };
    let mut tiles = TileManager::with_hooks(config, checkerboard()).unwrap();
    tiles.reposition(Vec3::ZERO, &mut scene).unwrap();

    // 40 red tiles against 41 white; red has fewer vertices
    let report = tiles.compress(&mut scene);
    assert_eq!(report.groups_compressed, 1);
    assert_eq!(report.groups_deferred, 1);
    assert_eq!(report.tiles_compressed, 40);
    assert!(tiles.uncompressed_tiles().iter().all(|t| t.material == "white"));
    assert_eq!(tiles.batches()[0].material, "red");
}

#[test]
fn full_pass_compresses_every_group() {
    let mut scene = scene_with(&["red", "white"]);
    let config = TileConfig {
        max_compression_time_ms: 60_000,
        ..TileConfig::default()
    };
    let mut tiles = TileManager::with_hooks(config, checkerboard()).unwrap();
    tiles.reposition(Vec3::ZERO, &mut scene).unwrap();

    let report = tiles.compress(&mut scene);
    assert_eq!(report.groups_compressed, 2);
    assert!(tiles.uncompressed_tiles().is_empty());
    assert_eq!(tiles.batches().len(), 2);

    // batches alone are drawn now
    let frame = scene.update_pass();
    assert_eq!(frame.draw_calls, 2);
    assert_eq!(frame.vertices, 81 * 24);

    assert!(tiles.compress(&mut scene).throttled);
}

#[test]
fn later_passes_absorb_into_live_batch() {
    let mut scene = scene_with(&[DEFAULT_TILE_MATERIAL]);
    let config = TileConfig {
        threshold: 0,
        compression_cooldown_ms: 0,
        ..TileConfig::default()
    };
    let mut tiles = TileManager::new(config).unwrap();
    tiles.reposition(Vec3::ZERO, &mut scene).unwrap();
    tiles.compress(&mut scene);

    tiles
        .reposition(Vec3::new(10.0, 0.0, 0.0), &mut scene)
        .unwrap();
    let report = tiles.compress(&mut scene);
    assert_eq!(report.tiles_compressed, 9);

    let batches = tiles.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].composition_count, 2);
    assert_eq!(batches[0].tiles.len(), 90);
}

#[test]
fn far_jump_evicts_batches_with_their_tiles() {
    let mut scene = scene_with(&[DEFAULT_TILE_MATERIAL]);
    let config = TileConfig {
        range: 2,
        ..TileConfig::default()
    };
    let mut tiles = TileManager::new(config).unwrap();
    tiles.reposition(Vec3::ZERO, &mut scene).unwrap();
    tiles.compress(&mut scene);
    assert_eq!(tiles.batches().len(), 1);

    let stats = tiles
        .reposition(Vec3::new(1000.0, 0.0, 0.0), &mut scene)
        .unwrap();
    assert_eq!(stats.batches_evicted, 1);
    assert!(tiles.batches().is_empty());
    assert_eq!(tiles.store().len(), 25);
    assert!(tiles.tile(GridCoord::ORIGIN).is_none());
    assert_eq!(scene.node_count(), 25);
}

#[test]
fn compress_on_reposition_runs_after_moves() {
    let mut scene = scene_with(&[DEFAULT_TILE_MATERIAL]);
    let config = TileConfig {
        compress_on_reposition: true,
        compression_cooldown_ms: 0,
        threshold: 0,
        ..TileConfig::default()
    };
    let mut tiles = TileManager::new(config).unwrap();
    let stats = tiles.reposition(Vec3::ZERO, &mut scene).unwrap();
    assert_eq!(stats.compressed, 81);
    assert_eq!(tiles.batches().len(), 1);

    let stats = tiles
        .reposition(Vec3::new(0.0, 0.0, 10.0), &mut scene)
        .unwrap();
    assert_eq!(stats.compressed, 9);
    assert_eq!(tiles.batches().len(), 1);
    assert_eq!(tiles.batches()[0].composition_count, 2);

    // under the threshold nothing moves and nothing is compressed
    let stats = tiles
        .reposition(Vec3::new(0.0, 0.0, 12.0), &mut scene)
        .unwrap();
    assert!(!stats.moved);
    assert_eq!(stats.compressed, 0);
}

#[test]
fn roads_leave_gaps() {
    let mut scene = scene_with(&[DEFAULT_TILE_MATERIAL]);
    let hooks = FnHooks::new()
        .has_tile(|c| c.i.rem_euclid(4) != 0 && c.k.rem_euclid(4) != 0)
        .locate(|c, size| Vec3::new(c.i as f32 * size, -size / 2.0, c.k as f32 * size));
    let mut tiles = TileManager::with_hooks(TileConfig::default(), hooks).unwrap();
    tiles.reposition(Vec3::ZERO, &mut scene).unwrap();

    assert_eq!(tiles.store().len(), 36);
    let tile = tiles.tile(GridCoord::new(1, 0, 1)).unwrap();
    assert_eq!(tile.position, Vec3::new(10.0, -5.0, 10.0));
    assert_eq!(scene.node(tile.node).unwrap().transform.position, tile.position);

    let text = DebugTextRenderer::with_limit(3).render(&scene);
    assert!(text.contains("Tiles: 36"));
}

#[test]
fn side_table_follows_evictions() {
    let mut scene = scene_with(&[DEFAULT_TILE_MATERIAL]);
    let mut tiles = TileManager::new(TileConfig::default()).unwrap();
    tiles.reposition(Vec3::ZERO, &mut scene).unwrap();

    let mut heights = SideTable::new();
    for tile in tiles.store().iter() {
        heights.insert(tile.coord, tile.coord.i + tile.coord.k);
    }
    tiles
        .reposition(Vec3::new(1000.0, 0.0, 1000.0), &mut scene)
        .unwrap();
    assert_eq!(heights.prune(tiles.store()), 81);
    assert!(heights.is_empty());
}

#[test]
fn draining_events_each_step_keeps_log_bounded() {
    let mut scene = scene_with(&[DEFAULT_TILE_MATERIAL]);
    let config = TileConfig {
        threshold: 0,
        ..TileConfig::default()
    };
    let mut tiles = TileManager::new(config).unwrap();

    for step in 0..20 {
        let point = Vec3::new(step as f32 * 10.0, 0.0, 0.0);
        tiles.reposition(point, &mut scene).unwrap();
        let events = scene.drain_events();
        assert!(!events.is_empty());
        // create, move and attach for every tile of a full window at most
        assert!(events.len() <= 3 * 81, "step {step}: {} events", events.len());
        assert!(scene.events().is_empty());
    }
}

proptest! {
    // Wherever the center wanders, the active set is exactly the window,
    // inactive tiles are detached, and the compactor bounds the store.
    #[test]
    fn random_walk_keeps_store_consistent(
        steps in prop::collection::vec((-12i32..12, -12i32..12), 1..25),
    ) {
        let mut scene = scene_with(&[DEFAULT_TILE_MATERIAL]);
        let config = TileConfig { range: 2, ..TileConfig::default() };
        let mut tiles = TileManager::new(config.clone()).unwrap();

        for (i, k) in steps {
            let point = Vec3::new(i as f32 * 10.0, 0.0, k as f32 * 10.0);
            tiles.reposition(point, &mut scene).unwrap();
            let center = tiles.center().unwrap();

            let coords: HashSet<GridCoord> = tiles.store().iter().map(|t| t.coord).collect();
            prop_assert_eq!(coords.len(), tiles.store().len());

            let window: HashSet<GridCoord> =
                GridRange::around(center, config.range, config.dimensions).iter().collect();
            let active: HashSet<GridCoord> =
                tiles.active_tiles().iter().map(|t| t.coord).collect();
            prop_assert_eq!(&active, &window);

            for tile in tiles.store().iter() {
                prop_assert_eq!(tile.active, scene.is_attached(tile.node));
                prop_assert_eq!(tile.active, tile.is_attached());
            }
            prop_assert!(tiles.store().len() <= 30);
        }
    }

    // With compression and batch eviction in play, every window cell still
    // holds a tile and every compressed tile is drawn by a live batch.
    #[test]
    fn random_walk_with_compression_covers_window(
        steps in prop::collection::vec((-12i32..12, -12i32..12), 1..25),
    ) {
        let mut scene = scene_with(&[DEFAULT_TILE_MATERIAL]);
        let config = TileConfig {
            range: 2,
            threshold: 0,
            compress_on_reposition: true,
            compression_cooldown_ms: 0,
            ..TileConfig::default()
        };
        let mut tiles = TileManager::new(config.clone()).unwrap();

        for (i, k) in steps {
            let point = Vec3::new(i as f32 * 10.0, 0.0, k as f32 * 10.0);
            tiles.reposition(point, &mut scene).unwrap();
            let center = tiles.center().unwrap();

            for coord in &GridRange::around(center, config.range, config.dimensions) {
                prop_assert!(tiles.tile(coord).is_some(), "no tile at {}", coord);
            }

            let batched: HashSet<GridCoord> = tiles
                .batches()
                .iter()
                .flat_map(|b| b.tiles.iter().copied())
                .collect();
            for tile in tiles.store().iter() {
                if tile.compressed {
                    prop_assert!(batched.contains(&tile.coord));
                    prop_assert!(!tile.is_attached());
                } else {
                    prop_assert_eq!(tile.active, scene.is_attached(tile.node));
                }
            }
            for batch in tiles.batches() {
                prop_assert!(scene.is_attached(batch.node));
            }
        }
    }
}
