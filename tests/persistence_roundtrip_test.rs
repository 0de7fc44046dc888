use std::sync::Arc;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use tempfile::TempDir;

use obspace::comm::run_workers;
use obspace::error::Result;
use obspace::geometry::{GridGeometry, LatitudeBands, Point3, RegularLonLatGrid};
use obspace::obs::{
    ColumnSet, DEFAULT_ERROR_GROUP, ObsContext, ObsSpace, ObsSpaceConfig, ObsVector,
    ScreeningFilter, TimeWindow,
};
use obspace::storage::Storage;
use obspace::storage::file::{FileStorage, FileStorageConfig};

fn analysis_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2018, 4, 15, 0, 0, 0).unwrap()
}

fn six_hour_window() -> TimeWindow {
    let t0 = analysis_time();
    TimeWindow::new(t0 - TimeDelta::hours(3), t0 + TimeDelta::hours(3)).unwrap()
}

fn file_storage(dir: &TempDir) -> Arc<dyn Storage> {
    Arc::new(FileStorage::new(dir.path(), FileStorageConfig::new(dir.path())).unwrap())
}

fn grid() -> Arc<dyn GridGeometry> {
    Arc::new(RegularLonLatGrid::global(18, 9).unwrap())
}

fn config() -> ObsSpaceConfig {
    ObsSpaceConfig::new(vec!["temperature".to_string()])
}

/// Local records of one worker as (order, time, location).
type Records = Vec<(u64, DateTime<Utc>, Point3)>;

fn local_records(space: &ObsSpace) -> Records {
    space
        .records()
        .iter()
        .map(|r| (r.global_order, r.time, r.location))
        .collect()
}

fn merged(per_worker: Vec<Records>) -> Records {
    let mut all: Records = per_worker.into_iter().flatten().collect();
    all.sort_by_key(|r| r.0);
    all
}

fn generate_to(storage: &Arc<dyn Storage>, workers: usize, density: usize, base: &str) -> Result<Records> {
    let grid = grid();
    let config = config().with_output(base);
    let window = TimeWindow::instant(analysis_time());
    let per_worker = run_workers(workers, |comm| {
        let ctx = ObsContext::new(comm, storage.clone(), grid.clone(), &LatitudeBands)?;
        let mut space = ObsSpace::new(&config, ctx, window, false)?;
        space.generate_distribution(density, "temperature", &[0.5])?;
        let records = local_records(&space);
        space.close()?;
        Ok(records)
    })?;
    Ok(merged(per_worker))
}

fn close_enough(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-6 * a.abs().max(1.0)
}

#[test]
fn generated_store_survives_a_round_trip() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let storage = file_storage(&dir);
    let written = generate_to(&storage, 2, 100, "sonde")?;
    assert!(dir.path().join("sonde.obs").exists());

    let grid = grid();
    let config = config().with_input("sonde");
    let window = six_hour_window();
    let per_worker = run_workers(3, |comm| {
        let ctx = ObsContext::new(comm, storage.clone(), grid.clone(), &LatitudeBands)?;
        let space = ObsSpace::new(&config, ctx, window, false)?;
        assert_eq!(space.global_count(), 100);
        assert!(space.has_group(DEFAULT_ERROR_GROUP));
        Ok(local_records(&space))
    })?;
    let read = merged(per_worker);

    assert_eq!(read.len(), written.len());
    for (before, after) in written.iter().zip(&read) {
        assert_eq!(before.0, after.0);
        assert!((after.1 - before.1).num_seconds().abs() <= 1);
        assert!(close_enough(before.2.lon, after.2.lon));
        assert!(close_enough(before.2.lat, after.2.lat));
        assert!(close_enough(before.2.height, after.2.height));
    }
    Ok(())
}

#[test]
fn records_at_the_window_start_move_one_second_later() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let storage = file_storage(&dir);
    generate_to(&storage, 1, 20, "start")?;

    let t0 = analysis_time();
    let grid = grid();
    let config = config().with_input("start");
    let window = TimeWindow::new(t0, t0 + TimeDelta::hours(6))?;
    let selected = run_workers(2, |comm| {
        let ctx = ObsContext::new(comm, storage.clone(), grid.clone(), &LatitudeBands)?;
        let space = ObsSpace::new(&config, ctx, window, false)?;
        assert!(space.times().iter().all(|&t| t == t0 + TimeDelta::seconds(1)));
        Ok(space.time_select(window.begin(), window.end()).len() == space.local_count())
    })?;
    assert!(selected.into_iter().all(|all| all));
    Ok(())
}

/// Keeps observations with a non-negative residual.
#[derive(Debug)]
struct NonNegative;

impl ScreeningFilter for NonNegative {
    fn accept(&self, residual: &[f64], _predicted: &[f64]) -> bool {
        residual.iter().all(|&r| r >= 0.0)
    }
}

#[test]
fn screened_subset_is_written_beside_the_full_set() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let storage = file_storage(&dir);
    generate_to(&storage, 1, 80, "raw")?;

    let grid = grid();
    let config = config().with_input("raw").with_output("qc");
    let window = six_hour_window();
    let kept = run_workers(4, |comm| {
        let ctx = ObsContext::new(comm, storage.clone(), grid.clone(), &LatitudeBands)?;
        let space = ObsSpace::new(&config, ctx, window, false)?;
        let mut residual = ObsVector::new(&space);
        residual.random()?;
        let predicted = ObsVector::from_group(&space, DEFAULT_ERROR_GROUP)?;
        space.screen_with(&NonNegative, &residual, &predicted)?;

        let expected = residual
            .column("temperature")
            .map_or(0, |values| values.iter().filter(|&&r| r >= 0.0).count());
        assert_eq!(space.screened_local_count(), Some(expected));
        let kept: usize = space.screened_counts_by_worker().unwrap_or_default().iter().sum();
        space.close()?;
        Ok(kept)
    })?;
    assert!(dir.path().join("qc.obs").exists());
    assert!(dir.path().join("qc_screened.obs").exists());

    let config = self::config().with_input("qc_screened");
    let reloaded = run_workers(2, |comm| {
        let ctx = ObsContext::new(comm, storage.clone(), grid.clone(), &LatitudeBands)?;
        let space = ObsSpace::new(&config, ctx, window, false)?;
        Ok(space.global_count())
    })?;
    assert_eq!(reloaded, vec![kept[0]; 2]);
    assert!(kept[0] < 80);
    Ok(())
}

#[test]
fn unscreened_store_has_no_screened_file() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let storage = file_storage(&dir);
    generate_to(&storage, 2, 10, "plain")?;

    assert!(dir.path().join("plain.obs").exists());
    assert!(!dir.path().join("plain_screened.obs").exists());
    Ok(())
}

#[test]
fn failed_generation_leaves_the_output_untouched() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let storage = file_storage(&dir);
    generate_to(&storage, 2, 50, "sonde")?;
    let before = std::fs::read(dir.path().join("sonde.obs")).unwrap();

    let t0 = analysis_time();
    let grid = grid();
    let config = config().with_output("sonde");
    let window = TimeWindow::new(t0, t0 + TimeDelta::hours(1))?;
    let outcomes = run_workers(2, |comm| {
        let ctx = ObsContext::new(comm, storage.clone(), grid.clone(), &LatitudeBands)?;
        let mut space = ObsSpace::new(&config, ctx, window, false)?;
        let failed = space.generate_distribution(50, "temperature", &[0.5]).is_err();
        Ok((failed, space.is_poisoned(), space.is_populated()))
    })?;

    assert_eq!(outcomes, vec![(true, true, false); 2]);
    assert_eq!(std::fs::read(dir.path().join("sonde.obs")).unwrap(), before);
    Ok(())
}

#[test]
fn store_is_not_persisted_after_a_failure() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let storage = file_storage(&dir);
    generate_to(&storage, 1, 30, "base")?;

    let grid = grid();
    let config = config().with_input("base").with_output("base");
    let window = six_hour_window();
    let refused = run_workers(3, |comm| {
        let ctx = ObsContext::new(comm, storage.clone(), grid.clone(), &LatitudeBands)?;
        let mut space = ObsSpace::new(&config, ctx, window, false)?;
        let local = space.local_count();
        space.put(ColumnSet::filled("Extra", space.variables(), local, 1.0))?;
        // a loaded store over a six hour window cannot generate
        assert!(space.generate_distribution(5, "temperature", &[0.5]).is_err());
        Ok(space.close().is_err())
    })?;
    assert_eq!(refused, vec![true; 3]);

    let config = self::config().with_input("base");
    let reloaded = run_workers(1, |comm| {
        let ctx = ObsContext::new(comm, storage.clone(), grid.clone(), &LatitudeBands)?;
        let space = ObsSpace::new(&config, ctx, window, false)?;
        Ok((space.global_count(), space.has_group("Extra")))
    })?;
    assert_eq!(reloaded, vec![(30, false)]);
    Ok(())
}

#[test]
fn workers_without_records_take_part_in_the_write() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let storage = file_storage(&dir);

    let grid = grid();
    let config = config().with_output("pair");
    let window = TimeWindow::instant(analysis_time());
    let counts = run_workers(6, |comm| {
        let ctx = ObsContext::new(comm, storage.clone(), grid.clone(), &LatitudeBands)?;
        let mut space = ObsSpace::new(&config, ctx, window, false)?;
        space.generate_distribution(2, "temperature", &[0.5])?;
        let counts = space.counts_by_worker().to_vec();
        space.close()?;
        Ok(counts)
    })?;
    assert_eq!(counts[0].iter().sum::<usize>(), 2);
    assert!(counts[0].iter().filter(|&&c| c == 0).count() >= 4);

    let config = self::config().with_input("pair");
    let reloaded = run_workers(1, |comm| {
        let ctx = ObsContext::new(comm, storage.clone(), grid.clone(), &LatitudeBands)?;
        let space = ObsSpace::new(&config, ctx, six_hour_window(), false)?;
        Ok(space.records().global_order().to_vec())
    })?;
    assert_eq!(reloaded, vec![vec![0, 1]]);
    Ok(())
}

#[test]
fn group_values_follow_their_records_across_worker_counts() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let storage = file_storage(&dir);
    generate_to(&storage, 1, 40, "base")?;

    let grid = grid();
    let window = six_hour_window();
    let config = config().with_input("base").with_output("tagged");
    run_workers(3, |comm| {
        let ctx = ObsContext::new(comm, storage.clone(), grid.clone(), &LatitudeBands)?;
        let mut space = ObsSpace::new(&config, ctx, window, false)?;
        let tags: Vec<f64> = space.records().global_order().iter().map(|&o| o as f64).collect();
        space.put(ColumnSet::from_columns(
            "Tag",
            vec![("temperature".to_string(), tags)],
        )?)?;
        space.close()
    })?;

    let config = self::config().with_input("tagged");
    let read = run_workers(1, |comm| {
        let ctx = ObsContext::new(comm, storage.clone(), grid.clone(), &LatitudeBands)?;
        let space = ObsSpace::new(&config, ctx, window, false)?;
        let tags = space
            .get("Tag")?
            .column("temperature")
            .map(<[f64]>::to_vec)
            .unwrap_or_default();
        Ok((space.records().global_order().to_vec(), tags))
    })?;

    let (order, tags) = &read[0];
    assert_eq!(order, &(0..40).collect::<Vec<u64>>());
    assert_eq!(tags.len(), 40);
    for (&o, &tag) in order.iter().zip(tags) {
        assert_eq!(tag, o as f64);
    }
    Ok(())
}
