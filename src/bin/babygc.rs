//! Runs the collector demo scenarios.
//!
//! Each scenario builds a small object graph on a fresh VM, collects, and checks how many objects
//! were freed. Set `RUST_LOG=babygc=info` to also log every collection cycle, or `babygc=trace` to
//! watch individual objects being marked and freed.

use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use babygc::{CollectReport, Vm, VmConfig, VmResult};

#[derive(Parser)]
#[command(name = "babygc", version, about = "Mark-and-sweep collector demos")]
struct Cli {
    /// Scenarios to run (all of them if none are given)
    #[arg(value_enum)]
    scenarios: Vec<Scenario>,

    /// Root stack capacity
    #[arg(long = "stack-max", default_value_t = babygc::config::STACK_MAX)]
    stack_max: usize,

    /// Live object count that triggers the first collection
    #[arg(long = "initial-threshold", default_value_t = babygc::config::INITIAL_GC_THRESHOLD)]
    initial_threshold: usize,
}

impl Cli {
    /// Returns the scenarios to run.
    fn scenarios(&self) -> Vec<Scenario> {
        if self.scenarios.is_empty() {
            Scenario::ALL.to_vec()
        } else {
            self.scenarios.clone()
        }
    }

    /// Checks that the flags leave room for every selected scenario.
    fn validate(&self) -> Result<(), String> {
        // The threshold scenario keeps `initial_threshold + 1` objects rooted.
        if self.scenarios().contains(&Scenario::Threshold)
            && self.stack_max <= self.initial_threshold
        {
            return Err(format!(
                "--stack-max ({}) must exceed --initial-threshold ({}) to run `threshold`",
                self.stack_max, self.initial_threshold,
            ));
        }

        Ok(())
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Scenario {
    /// Objects on the stack are preserved
    Preserve,
    /// Unreached objects are collected
    Unreached,
    /// Nested objects are reached through pairs
    Nested,
    /// Cycles do not hang the collector
    Cycles,
    /// Reaching the threshold collects automatically
    Threshold,
}

impl Scenario {
    const ALL: [Scenario; 5] = [
        Scenario::Preserve,
        Scenario::Unreached,
        Scenario::Nested,
        Scenario::Cycles,
        Scenario::Threshold,
    ];

    fn title(self) -> &'static str {
        match self {
            Scenario::Preserve => "Objects on stack are preserved.",
            Scenario::Unreached => "Unreached objects are collected.",
            Scenario::Nested => "Reach nested objects.",
            Scenario::Cycles => "Handle cycles.",
            Scenario::Threshold => "Reaching the threshold collects.",
        }
    }

    /// Runs the scenario, returning the report it produced and the one it should have produced.
    fn run(self, config: VmConfig) -> VmResult<(CollectReport, CollectReport)> {
        let mut vm = Vm::with_config(config);

        let expected = |collected, remaining| CollectReport {
            collected,
            remaining,
        };

        match self {
            Scenario::Preserve => {
                vm.push_int(1)?;
                vm.push_int(2)?;

                Ok((vm.collect(), expected(0, 2)))
            }

            Scenario::Unreached => {
                vm.push_int(1)?;
                vm.push_int(2)?;
                vm.pop()?;
                vm.pop()?;

                Ok((vm.collect(), expected(2, 0)))
            }

            Scenario::Nested => {
                vm.push_int(1)?;
                vm.push_int(2)?;
                vm.push_pair()?;

                Ok((vm.collect(), expected(0, 3)))
            }

            Scenario::Cycles => {
                vm.push_int(1)?;
                vm.push_int(2)?;
                let a = vm.push_pair()?;

                vm.push_int(3)?;
                vm.push_int(4)?;
                let b = vm.push_pair()?;

                vm.set_second(a, Some(b))?;
                vm.set_second(b, Some(a))?;

                // The replaced tails (2 and 4) are no longer referenced.
                Ok((vm.collect(), expected(2, 4)))
            }

            Scenario::Threshold => {
                let threshold = vm.threshold();

                for i in 0..threshold {
                    vm.push_int(i32::try_from(i).unwrap_or(i32::MAX))?;
                }

                // Every object so far is a root, so the automatic cycle frees nothing.
                vm.push_int(-1)?;

                Ok((vm.last_report().unwrap_or_default(), expected(0, threshold)))
            }
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("babygc=warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    if let Err(msg) = cli.validate() {
        Cli::command().error(ErrorKind::ArgumentConflict, msg).exit();
    }

    let config = VmConfig::default()
        .with_stack_max(cli.stack_max)
        .with_initial_threshold(cli.initial_threshold);

    let mut failed = false;

    for (idx, scenario) in cli.scenarios().into_iter().enumerate() {
        println!("Test {}: {}", idx + 1, scenario.title());

        match scenario.run(config) {
            Ok((actual, expected)) if actual == expected => println!("  {actual}"),

            Ok((actual, expected)) => {
                println!("  {actual}");
                eprintln!("  expected: {expected}");
                failed = true;
            }

            Err(e) => {
                eprintln!("  error: {e}");
                failed = true;
            }
        }
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("babygc").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn small_stack_rejects_threshold_scenario() {
        assert!(parse(&["--stack-max", "4", "threshold"]).validate().is_err());
        assert!(parse(&["--stack-max", "8"]).validate().is_err());
        assert!(parse(&["--stack-max", "4", "cycles"]).validate().is_ok());
        assert!(
            parse(&["--stack-max", "5", "--initial-threshold", "4", "threshold"])
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn default_flags_pass_every_scenario() {
        let cli = parse(&[]);
        assert!(cli.validate().is_ok());

        let config = VmConfig::default()
            .with_stack_max(cli.stack_max)
            .with_initial_threshold(cli.initial_threshold);

        for scenario in cli.scenarios() {
            let (actual, expected) = scenario.run(config).unwrap();
            assert_eq!(actual, expected, "{scenario:?}");
        }
    }
}
