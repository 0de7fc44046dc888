use std::sync::Arc;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};

use obspace::codec::{GlobalObservations, write_obs_file};
use obspace::comm::run_workers;
use obspace::error::Result;
use obspace::geometry::{GridGeometry, LatitudeBands, Point3, RegularLonLatGrid};
use obspace::obs::{ObsContext, ObsSpace, ObsSpaceConfig, ObsVector, TimeWindow};
use obspace::storage::memory::{MemoryStorage, MemoryStorageConfig};
use obspace::util::missing::{MISSING_F64, is_missing};

fn analysis_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 7, 1, 12, 0, 0).unwrap()
}

fn grid() -> Arc<dyn GridGeometry> {
    Arc::new(RegularLonLatGrid::global(24, 12).unwrap())
}

fn variables() -> Vec<String> {
    vec!["temperature".to_string(), "humidity".to_string()]
}

/// Generate `density` observations on one worker and store them as `base`.
fn prepare(storage: &MemoryStorage, density: usize, base: &str) -> Result<()> {
    let grid = grid();
    let config = ObsSpaceConfig::new(variables()).with_output(base);
    let window = TimeWindow::instant(analysis_time());
    run_workers(1, |comm| {
        let ctx = ObsContext::new(comm, Arc::new(storage.clone()), grid.clone(), &LatitudeBands)?;
        let mut space = ObsSpace::new(&config, ctx, window, false)?;
        space.generate_distribution(density, "temperature", &[0.5, 0.1])?;
        space.close()
    })?;
    Ok(())
}

/// Run `work` on a store loaded from `base` by `workers` workers.
fn with_loaded<R, F>(storage: &MemoryStorage, base: &str, workers: usize, work: F) -> Result<Vec<R>>
where
    F: Fn(&ObsSpace) -> Result<R> + Sync,
    R: Send,
{
    let grid = grid();
    let config = ObsSpaceConfig::new(variables()).with_input(base);
    let t0 = analysis_time();
    let window = TimeWindow::new(t0 - TimeDelta::hours(3), t0 + TimeDelta::hours(3))?;
    run_workers(workers, |comm| {
        let ctx = ObsContext::new(comm, Arc::new(storage.clone()), grid.clone(), &LatitudeBands)?;
        let space = ObsSpace::new(&config, ctx, window, false)?;
        work(&space)
    })
}

/// Perturbation values keyed by (global order, variable index).
fn perturbations(storage: &MemoryStorage, workers: usize) -> Result<Vec<(u64, usize, f64)>> {
    let per_worker = with_loaded(storage, "base", workers, |space| {
        let mut vector = ObsVector::new(space);
        vector.random()?;
        let mut values = Vec::new();
        for (index, &order) in space.records().global_order().iter().enumerate() {
            for variable in 0..vector.variables().len() {
                values.push((order, variable, vector.get(variable, index)?));
            }
        }
        Ok(values)
    })?;
    let mut values: Vec<_> = per_worker.into_iter().flatten().collect();
    values.sort_by_key(|&(order, variable, _)| (order, variable));
    Ok(values)
}

#[test]
fn random_draws_do_not_depend_on_worker_count() -> Result<()> {
    let storage = MemoryStorage::new(MemoryStorageConfig::default());
    prepare(&storage, 100, "base")?;

    let single = perturbations(&storage, 1)?;
    let four = perturbations(&storage, 4)?;
    assert_eq!(single.len(), 200);
    assert_eq!(single, four);

    let three = perturbations(&storage, 3)?;
    assert_eq!(single, three);
    Ok(())
}

#[test]
fn rms_squared_times_count_equals_self_dot() -> Result<()> {
    let storage = MemoryStorage::new(MemoryStorageConfig::default());
    prepare(&storage, 64, "base")?;

    for workers in [1, 3] {
        let results = with_loaded(&storage, "base", workers, |space| {
            let mut vector = ObsVector::new(space);
            vector.random()?;
            let rms = vector.rms()?;
            let dot = vector.dot_product_with(&vector)?;
            Ok((rms, dot, space.global_count()))
        })?;
        for (rms, dot, count) in results {
            assert_eq!(count, 64);
            assert!((rms * rms * count as f64 - dot).abs() <= 1e-9 * dot.max(1.0));
        }
    }
    Ok(())
}

#[test]
fn dot_products_agree_across_worker_counts() -> Result<()> {
    let storage = MemoryStorage::new(MemoryStorageConfig::default());
    prepare(&storage, 90, "base")?;

    let dot = |workers| -> Result<Vec<f64>> {
        with_loaded(&storage, "base", workers, |space| {
            let mut x = ObsVector::new(space);
            x.random()?;
            let errors = ObsVector::from_group(space, "ObsError")?;
            x.dot_product_with(&errors)
        })
    };
    let single = dot(1)?;
    let four = dot(4)?;
    // every worker holds the same reduced value
    assert!(four.iter().all(|&d| d == four[0]));
    assert!((single[0] - four[0]).abs() <= 1e-9 * single[0].abs().max(1.0));
    Ok(())
}

#[test]
fn dense_packing_skips_missing_entries() -> Result<()> {
    let storage = MemoryStorage::new(MemoryStorageConfig::default());
    prepare(&storage, 40, "base")?;

    let results = with_loaded(&storage, "base", 2, |space| {
        let mut values = ObsVector::new(space);
        values.random()?;
        let mut mask = ObsVector::new(space);
        mask.ones();
        for index in (0..space.local_count()).step_by(3) {
            mask.set(0, index, MISSING_F64)?;
        }
        for index in (0..space.local_count()).step_by(4) {
            values.set(1, index, MISSING_F64)?;
        }

        let expected = (0..2)
            .flat_map(|v| (0..space.local_count()).map(move |i| (v, i)))
            .filter(|&(v, i)| {
                let x = values.get(v, i).unwrap_or(MISSING_F64);
                let m = mask.get(v, i).unwrap_or(MISSING_F64);
                !is_missing(x) && !is_missing(m)
            })
            .count();
        let packed = values.pack_dense(&mask);
        assert!(packed.iter().all(|&x| !is_missing(x)));

        values.mask(&mask);
        let masked = (0..space.local_count())
            .step_by(3)
            .all(|i| values.get(0, i).map(is_missing).unwrap_or(false));

        Ok((values.pack_dense_size(&mask), packed.len(), expected, masked))
    })?;

    for (size, len, expected, masked) in results {
        assert_eq!(size, len);
        assert_eq!(len, expected);
        assert!(masked);
    }
    Ok(())
}

#[test]
fn element_access_out_of_range_is_an_error() -> Result<()> {
    let storage = MemoryStorage::new(MemoryStorageConfig::default());
    prepare(&storage, 5, "base")?;

    let results = with_loaded(&storage, "base", 1, |space| {
        let mut vector = ObsVector::new(space);
        Ok((
            vector.get(0, space.local_count()).is_err(),
            vector.set(2, 0, 1.0).is_err(),
        ))
    })?;
    assert_eq!(results, vec![(true, true)]);
    Ok(())
}

#[test]
fn time_selection_is_open_closed_unless_instant() -> Result<()> {
    let storage = MemoryStorage::new(MemoryStorageConfig::default());
    let t0 = analysis_time();
    let times = vec![t0, t0 + TimeDelta::seconds(1), t0 + TimeDelta::seconds(2)];
    let observations = GlobalObservations {
        times: times.clone(),
        locations: vec![
            Point3::new(10.0, -60.0, 0.0),
            Point3::new(120.0, 5.0, 100.0),
            Point3::new(250.0, 70.0, 200.0),
        ],
        order: vec![0, 1, 2],
        groups: Vec::new(),
    };
    write_obs_file(&storage, "three.obs", &observations.to_file()?)?;

    let grid = grid();
    let config = ObsSpaceConfig::new(variables()).with_input("three");
    let window = TimeWindow::new(t0 - TimeDelta::hours(1), times[2])?;
    let selections = run_workers(2, |comm| {
        let ctx = ObsContext::new(comm, Arc::new(storage.clone()), grid.clone(), &LatitudeBands)?;
        let space = ObsSpace::new(&config, ctx, window, false)?;
        let pick = |t1, t2| -> Vec<DateTime<Utc>> {
            space
                .time_select(t1, t2)
                .into_iter()
                .map(|i| space.times()[i])
                .collect()
        };
        Ok((pick(t0, times[2]), pick(t0, t0)))
    })?;

    let mut open_closed: Vec<_> = selections.iter().flat_map(|s| s.0.clone()).collect();
    open_closed.sort();
    assert_eq!(open_closed, times[1..].to_vec());

    let exact: Vec<_> = selections.iter().flat_map(|s| s.1.clone()).collect();
    assert_eq!(exact, vec![t0]);
    Ok(())
}
