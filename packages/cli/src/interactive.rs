//! Interactive mode, entered when no subcommand is given.

use std::path::{Path, PathBuf};

use dialoguer::{Confirm, Input, Select};
use soil_trade_cli_utils::MultiProgress;
use soil_trade_trade::YearSelection;

use crate::{MergeArg, RunArgs};

enum Tool {
    Run,
    Overrides,
    Select,
}

impl Tool {
    const ALL: &[Self] = &[Self::Run, Self::Overrides, Self::Select];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::Run => "Run pipeline",
            Self::Overrides => "List reporter code overrides",
            Self::Select => "Select merged rows for a partner",
        }
    }
}

const MERGE_CHOICES: &[(&str, MergeArg)] = &[
    ("Automatic (from input size and memory budget)", MergeArg::Auto),
    ("In memory", MergeArg::InMemory),
    ("Chunked", MergeArg::Chunked),
];

pub fn run(multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
    println!("Soil/Trade Pipeline");
    println!();

    let labels: Vec<&str> = Tool::ALL.iter().map(Tool::label).collect();
    let idx = Select::new()
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;

    match Tool::ALL[idx] {
        Tool::Run => {
            let args = prompt_run_args()?;
            crate::run_pipeline(multi, args)?;
        }
        Tool::Overrides => crate::list_overrides(),
        Tool::Select => {
            let input: String = Input::new()
                .with_prompt("Merged table")
                .default("output/trade_soil.csv".to_string())
                .interact_text()?;
            let partner: String = Input::new()
                .with_prompt("Partner country (code or name)")
                .interact_text()?;
            let item: String = Input::new()
                .with_prompt("Food item (blank for all)")
                .allow_empty(true)
                .interact_text()?;
            let item = item.trim();
            crate::select_rows(
                Path::new(&input),
                &partner,
                (!item.is_empty()).then_some(item),
            )?;
        }
    }

    Ok(())
}

fn prompt_run_args() -> Result<RunArgs, Box<dyn std::error::Error>> {
    let config: String = Input::new()
        .with_prompt("Configuration file")
        .default("pipeline.toml".to_string())
        .interact_text()?;
    let config = PathBuf::from(config);

    let year: YearSelection = Input::<String>::new()
        .with_prompt("Year (all, latest or a year)")
        .default("latest".to_string())
        .interact_text()?
        .parse()?;

    let merge_labels: Vec<&str> = MERGE_CHOICES.iter().map(|(label, _)| *label).collect();
    let merge_idx = Select::new()
        .with_prompt("Merge strategy")
        .items(&merge_labels)
        .default(0)
        .interact()?;

    let strict_keys = Confirm::new()
        .with_prompt("Fail on unresolved reporter codes?")
        .default(false)
        .interact()?;

    Ok(RunArgs {
        config: config.exists().then_some(config),
        year: Some(year),
        strict_keys,
        merge: Some(MERGE_CHOICES[merge_idx].1),
        ..RunArgs::default()
    })
}
