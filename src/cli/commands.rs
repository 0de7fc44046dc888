//! Command implementations for the obspace CLI.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use log::{debug, info};

use crate::cli::args::*;
use crate::cli::output::*;
use crate::codec;
use crate::comm::{Communicator, run_workers};
use crate::error::Result as ObsResult;
use crate::geometry::{GridGeometry, LatitudeBands, RegularLonLatGrid};
use crate::obs::{FileSpec, ObsContext, ObsSpace, ObsSpaceConfig, ObsVector, TimeWindow};
use crate::partition::SpatialPartitioner;
use crate::storage::file::FileStorageConfig;
use crate::storage::{Storage, StorageConfig, StorageFactory};

/// Execute a CLI command.
pub fn execute_command(args: ObspaceArgs) -> Result<()> {
    match &args.command {
        Command::Generate(generate_args) => generate(generate_args.clone(), &args),
        Command::Inspect(inspect_args) => inspect(inspect_args.clone(), &args),
        Command::Perturb(perturb_args) => perturb(perturb_args.clone(), &args),
    }
}

/// Everything a worker group needs besides its communicator.
struct Setup {
    storage: Arc<dyn Storage>,
    geometry: Arc<dyn GridGeometry>,
    partitioner: Arc<SpatialPartitioner>,
    workers: usize,
}

impl Setup {
    fn new(args: &WorkerArgs) -> Result<Self> {
        let workers = args.worker_count();
        if workers == 0 {
            bail!("at least one worker is required");
        }
        let storage = open_storage(&args.dir)?;
        let grid = RegularLonLatGrid::new(args.grid_config())
            .with_context(|| format!("invalid {}x{} grid", args.nx, args.ny))?;
        let partitioner = SpatialPartitioner::new(&grid, &LatitudeBands, workers)?;
        debug!("{workers} workers over a {}x{} grid", args.nx, args.ny);
        Ok(Setup {
            storage,
            geometry: Arc::new(grid),
            partitioner: Arc::new(partitioner),
            workers,
        })
    }

    fn context(&self, comm: Arc<dyn Communicator>) -> ObsResult<ObsContext> {
        ObsContext::with_partitioner(
            comm,
            Arc::clone(&self.storage),
            Arc::clone(&self.geometry),
            Arc::clone(&self.partitioner),
        )
    }
}

fn open_storage(dir: &Path) -> Result<Arc<dyn Storage>> {
    StorageFactory::create(StorageConfig::File(FileStorageConfig::new(dir)))
        .with_context(|| format!("cannot open directory {}", dir.display()))
}

fn window(args: &WindowArgs) -> Result<TimeWindow> {
    TimeWindow::new(args.begin, args.end).context("invalid assimilation window")
}

/// Generate observations and persist them.
fn generate(args: GenerateArgs, cli_args: &ObspaceArgs) -> Result<()> {
    let setup = Setup::new(&args.workers)?;
    let variable = match &args.variable {
        Some(variable) => variable.clone(),
        None => args
            .workers
            .variables
            .first()
            .cloned()
            .context("no variables declared")?,
    };
    let config = ObsSpaceConfig::new(args.workers.variables.clone());
    let window = TimeWindow::instant(args.time);

    if cli_args.verbosity() > 1 {
        println!("Generating {} observations with {} workers", args.density, setup.workers);
    }

    let counts = run_workers(setup.workers, |comm| {
        let mut space = ObsSpace::new(&config, setup.context(comm)?, window, false)?;
        space.generate_distribution(args.density, &variable, &args.error)?;
        space.write(&args.output)?;
        Ok(space.counts_by_worker().to_vec())
    })
    .context("generation failed")?;
    let counts_by_worker = counts.into_iter().next().unwrap_or_default();
    info!("wrote {}", codec::file_name(&args.output, false));

    output_result(
        "Observations generated successfully",
        &GenerationResult {
            file: args
                .workers
                .dir
                .join(codec::file_name(&args.output, false))
                .display()
                .to_string(),
            time: args.time.to_rfc3339(),
            workers: setup.workers,
            global_count: counts_by_worker.iter().sum(),
            counts_by_worker,
        },
        cli_args,
    )
}

/// Load a file and summarize every group.
fn inspect(args: InspectArgs, cli_args: &ObspaceArgs) -> Result<()> {
    let setup = Setup::new(&args.workers)?;
    let window = window(&args.window)?;
    let mut config = ObsSpaceConfig::new(args.workers.variables.clone());
    let data = config.obs_data.get_or_insert_with(Default::default);
    if args.screened {
        data.obsdatain_screened = Some(FileSpec::new(args.input.clone()));
    } else {
        data.obsdatain = Some(FileSpec::new(args.input.clone()));
    }

    let reports = run_workers(setup.workers, |comm| {
        let space = ObsSpace::new(&config, setup.context(comm)?, window, args.screened)?;
        let mut groups = Vec::new();
        for name in space.group_names() {
            let summary = ObsVector::from_group(&space, &name)?.summary()?;
            groups.push(GroupReport { name, summary });
        }
        Ok(InspectionResult {
            file: args
                .workers
                .dir
                .join(codec::file_name(&args.input, false))
                .display()
                .to_string(),
            window: window.to_string(),
            workers: space.comm().size(),
            global_count: space.global_count(),
            counts_by_worker: space.counts_by_worker().to_vec(),
            groups,
        })
    })
    .with_context(|| format!("cannot inspect {}", args.input))?;

    let report = reports.into_iter().next().context("no worker reported")?;
    output_result("Observation file loaded", &report, cli_args)
}

/// Add a random perturbation group and persist to a new file.
fn perturb(args: PerturbArgs, cli_args: &ObspaceArgs) -> Result<()> {
    let setup = Setup::new(&args.workers)?;
    let window = window(&args.window)?;
    let config = ObsSpaceConfig::new(args.workers.variables.clone()).with_input(args.input.clone());

    let summaries = run_workers(setup.workers, |comm| {
        let mut space = ObsSpace::new(&config, setup.context(comm)?, window, false)?;
        let group = {
            let mut perturbation = ObsVector::new(&space);
            perturbation.random()?;
            if let Some(scale) = &args.scale_by {
                let scale = ObsVector::from_group(&space, scale)?;
                perturbation *= &scale;
            }
            (perturbation.to_group(&args.group), perturbation.summary()?)
        };
        space.put(group.0)?;
        space.write(&args.output)?;
        Ok(group.1)
    })
    .with_context(|| format!("cannot perturb {}", args.input))?;

    let summary = summaries.into_iter().next().context("no worker reported")?;
    output_result(
        "Perturbation written",
        &PerturbationResult {
            input: codec::file_name(&args.input, false),
            output: codec::file_name(&args.output, false),
            group: args.group.clone(),
            workers: setup.workers,
            summary,
        },
        cli_args,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    fn run(dir: &Path, command: &[&str]) -> Result<()> {
        let dir = dir.to_string_lossy().to_string();
        let mut argv = vec!["obspace", "-q", "--format", "json"];
        argv.extend_from_slice(command);
        argv.extend_from_slice(&["--dir", &dir]);
        execute_command(ObspaceArgs::parse_from(argv))
    }

    #[test]
    fn test_generate_inspect_perturb() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();

        run(dir, &["generate", "--output", "sonde", "--workers", "3", "--density", "40"]).unwrap();
        assert!(dir.join("sonde.obs").exists());

        run(dir, &["inspect", "sonde", "--workers", "2"]).unwrap();

        run(
            dir,
            &["perturb", "sonde", "--output", "pert", "--workers", "2", "--scale-by", "ObsError"],
        )
        .unwrap();
        assert!(dir.join("pert.obs").exists());
    }

    #[test]
    fn test_inspect_missing_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let error = run(temp_dir.path(), &["inspect", "absent", "--workers", "2"]).unwrap_err();
        assert!(error.to_string().contains("cannot inspect absent"));
    }

    #[test]
    fn test_generate_rejects_wrong_error_count() {
        let temp_dir = TempDir::new().unwrap();
        let result = run(
            temp_dir.path(),
            &["generate", "--output", "bad", "--workers", "1", "--error", "1.0,2.0"],
        );
        assert!(result.is_err());
        assert!(!temp_dir.path().join("bad.obs").exists());
    }
}
