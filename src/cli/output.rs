//! Output formatting for CLI commands.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::cli::args::{ObspaceArgs, OutputFormat};
use crate::obs::VectorSummary;

/// Result structure for observation generation.
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationResult {
    pub file: String,
    pub time: String,
    pub workers: usize,
    pub global_count: usize,
    pub counts_by_worker: Vec<usize>,
}

/// Summary of one group of a loaded file.
#[derive(Debug, Serialize, Deserialize)]
pub struct GroupReport {
    pub name: String,
    pub summary: VectorSummary,
}

/// Result structure for file inspection.
#[derive(Debug, Serialize, Deserialize)]
pub struct InspectionResult {
    pub file: String,
    pub window: String,
    pub workers: usize,
    pub global_count: usize,
    pub counts_by_worker: Vec<usize>,
    pub groups: Vec<GroupReport>,
}

/// Result structure for perturbation.
#[derive(Debug, Serialize, Deserialize)]
pub struct PerturbationResult {
    pub input: String,
    pub output: String,
    pub group: String,
    pub workers: usize,
    pub summary: VectorSummary,
}

/// Output a result in the format selected on the command line.
pub fn output_result<T: Serialize + HumanReadable>(
    message: &str,
    result: &T,
    args: &ObspaceArgs,
) -> Result<()> {
    match args.format {
        OutputFormat::Human => {
            if args.verbosity() > 0 {
                println!("{message}");
            }
            result.print_human();
        }
        OutputFormat::Json => output_json(result, args)?,
    }
    Ok(())
}

/// Output in JSON format.
fn output_json<T: Serialize>(result: &T, args: &ObspaceArgs) -> Result<()> {
    let json = if args.pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };

    println!("{json}");
    Ok(())
}

/// Plain text rendering of a command result.
pub trait HumanReadable {
    fn print_human(&self);
}

fn join_counts(counts: &[usize]) -> String {
    counts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl HumanReadable for GenerationResult {
    fn print_human(&self) {
        println!("File: {}", self.file);
        println!("Time: {}", self.time);
        println!("Observations: {}", self.global_count);
        println!(
            "Per worker ({}): [{}]",
            self.workers,
            join_counts(&self.counts_by_worker)
        );
    }
}

impl HumanReadable for InspectionResult {
    fn print_human(&self) {
        println!("File: {}", self.file);
        println!("Window: {}", self.window);
        println!("Observations: {}", self.global_count);
        println!(
            "Per worker ({}): [{}]",
            self.workers,
            join_counts(&self.counts_by_worker)
        );
        for group in &self.groups {
            println!();
            println!("Group {}:", group.name);
            for (variable, line) in group
                .summary
                .variables
                .iter()
                .zip(group.summary.to_string().lines())
            {
                println!("  {}: {line}", variable.name);
            }
        }
    }
}

impl HumanReadable for PerturbationResult {
    fn print_human(&self) {
        println!("Input: {}", self.input);
        println!("Output: {}", self.output);
        println!("Group: {}", self.group);
        println!("{}", self.summary);
    }
}
