use std::io;
use std::path::PathBuf;

use clap::{command, Args, Parser, Subcommand};
use enum_dispatch::enum_dispatch;
use log::{debug, info};
use polars::frame::DataFrame;
use sdmxprep::{
    config::Config,
    formatters::{
        write_table, write_table_as, CSVFormatter, JSONRecordsFormatter, OutputFormatter,
        OutputGenerator, TSVFormatter,
    },
    resolver::{CodeSelector, ResolutionReport},
    vocabulary::{dimension_candidates_df, value_pairs_df, ColumnMapping, ValuePair},
    Classification, SdmxPrep,
};
use serde::{Deserialize, Serialize};
use spinners::{Spinner, Spinners};
use strum_macros::EnumString;

use crate::display::{display_resolution, display_skipped, display_summary};
use crate::error::SdmxPrepCliResult;
use crate::prompt::ConsoleSelector;

const DEFAULT_PROGRESS_SPINNER: Spinners = Spinners::Dots;
const COMPLETE_PROGRESS_STRING: &str = "✔";
const RUNNING_TAIL_STRING: &str = "...";

/// Defines the formats the included indicators can be printed in.
#[derive(Clone, Debug, Deserialize, Serialize, EnumString, PartialEq, Eq)]
#[strum(ascii_case_insensitive)]
pub enum OutputFormat {
    Csv,
    Tsv,
    Json,
}

impl From<&OutputFormat> for OutputFormatter {
    fn from(value: &OutputFormat) -> Self {
        match value {
            OutputFormat::Csv => OutputFormatter::Csv(CSVFormatter),
            OutputFormat::Tsv => OutputFormatter::Tsv(TSVFormatter),
            OutputFormat::Json => OutputFormatter::Json(JSONRecordsFormatter),
        }
    }
}

fn write_stdout(formatter: OutputFormatter, mut data: DataFrame) -> SdmxPrepCliResult<()> {
    let mut stdout_lock = std::io::stdout().lock();
    formatter.save(&mut stdout_lock, &mut data)?;
    Ok(())
}

fn spinner(quiet: bool, message: &str) -> Option<Spinner> {
    (!quiet).then(|| {
        Spinner::with_timer(
            DEFAULT_PROGRESS_SPINNER,
            message.to_string() + RUNNING_TAIL_STRING,
        )
    })
}

fn stop(sp: Option<Spinner>) {
    if let Some(mut s) = sp {
        s.stop_with_symbol(COMPLETE_PROGRESS_STRING);
    }
}

/// Trait that defines what to run when a given subcommand is invoked.
#[enum_dispatch]
pub trait RunCommand {
    async fn run(&self, config: Config) -> SdmxPrepCliResult<()>;
}

async fn classify(
    prep: &SdmxPrep,
    quiet: bool,
    output_format: Option<&OutputFormat>,
) -> SdmxPrepCliResult<Classification> {
    let sp = spinner(quiet, "Loading and classifying indicators");
    let classification = prep.classify().await?;
    stop(sp);

    let outputs = &prep.config.outputs;
    write_table(&outputs.indicators, &mut classification.indicators.0.clone())?;
    let names = prep.dimension_candidates(&classification)?;
    write_table(
        &outputs.dimension_candidates,
        &mut dimension_candidates_df(&names)?,
    )?;
    info!(
        "Wrote {} dimension candidates to {}",
        names.len(),
        outputs.dimension_candidates
    );
    display_summary(&classification.summary()?);
    if let Some(format) = output_format {
        write_stdout(format.into(), classification.included.0.clone())?;
    }
    Ok(classification)
}

async fn value_pairs(
    prep: &SdmxPrep,
    mapping: &ColumnMapping,
    quiet: bool,
) -> SdmxPrepCliResult<Vec<ValuePair>> {
    let sp = spinner(quiet, "Fetching dimension values");
    let extraction = prep.value_pairs(mapping).await?;
    stop(sp);
    display_skipped(&extraction.skipped);
    Ok(extraction.pairs)
}

async fn resolve(
    prep: &SdmxPrep,
    mapping: &ColumnMapping,
    pairs: Vec<ValuePair>,
    selector: &mut impl CodeSelector,
) -> SdmxPrepCliResult<ResolutionReport> {
    let report = prep.resolve(pairs, selector).await?;
    let outputs = &prep.config.outputs;
    write_table(&outputs.value_pairs, &mut value_pairs_df(&report.pairs)?)?;
    write_table_as(
        &outputs.code_mapping,
        &mut report.code_mapping_df()?,
        OutputFormatter::Tsv(TSVFormatter),
    )?;
    write_table_as(
        &outputs.column_mapping,
        &mut report.column_mapping_df(mapping)?,
        OutputFormatter::Tsv(TSVFormatter),
    )?;
    display_resolution(&report);
    Ok(report)
}

/// Options that override the manual resolution toggles of the config.
#[derive(Args, Debug, Clone)]
pub struct ResolveOptions {
    #[arg(
        long,
        help = "Never prompt; values without an exact or recorded code are left unresolved"
    )]
    no_prompt: bool,
    #[arg(
        long,
        help = "Reapply the codes recorded in the value pair table of an earlier run"
    )]
    replay: bool,
}

impl ResolveOptions {
    fn apply(&self, mut config: Config) -> Config {
        if self.no_prompt {
            config.manual.manually_choose_code_mapping = false;
        }
        if self.replay {
            config.manual.map_manual_names_to_codes = true;
        }
        config
    }
}

/// The `classify` command loads both sources, classifies the indicators and writes the
/// indicator and dimension candidate tables.
#[derive(Args, Debug)]
pub struct ClassifyCommand {
    #[arg(
        short = 'f',
        long,
        value_name = "csv|tsv|json",
        help = "Also print the included indicators to stdout in this format"
    )]
    output_format: Option<OutputFormat>,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for ClassifyCommand {
    async fn run(&self, config: Config) -> SdmxPrepCliResult<()> {
        info!("Running `classify` subcommand");
        let prep = SdmxPrep::new(config)?;
        classify(&prep, self.quiet, self.output_format.as_ref()).await?;
        Ok(())
    }
}

/// The `values` command fetches the observed values of every mapped dimension.
#[derive(Args, Debug)]
pub struct ValuesCommand {
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for ValuesCommand {
    async fn run(&self, config: Config) -> SdmxPrepCliResult<()> {
        info!("Running `values` subcommand");
        let prep = SdmxPrep::new(config)?;
        let mapping = prep.column_mapping().await?;
        let pairs = value_pairs(&prep, &mapping, self.quiet).await?;
        write_table(&prep.config.outputs.value_pairs, &mut value_pairs_df(&pairs)?)?;
        println!(
            "\n{} value pairs written to {}",
            pairs.len(),
            prep.config.outputs.value_pairs
        );
        Ok(())
    }
}

/// The `resolve` command fetches the dimension values, resolves them against the DSD and
/// writes both mapping tables.
#[derive(Args, Debug)]
pub struct ResolveCommand {
    #[command(flatten)]
    options: ResolveOptions,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for ResolveCommand {
    async fn run(&self, config: Config) -> SdmxPrepCliResult<()> {
        info!("Running `resolve` subcommand");
        let prep = SdmxPrep::new(self.options.apply(config))?;
        let mapping = prep.column_mapping().await?;
        let pairs = value_pairs(&prep, &mapping, self.quiet).await?;
        let mut selector = ConsoleSelector::new(io::stdin().lock(), io::stdout());
        resolve(&prep, &mapping, pairs, &mut selector).await?;
        Ok(())
    }
}

/// The `run` command runs every stage in order.
#[derive(Args, Debug)]
pub struct RunAllCommand {
    #[command(flatten)]
    options: ResolveOptions,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for RunAllCommand {
    async fn run(&self, config: Config) -> SdmxPrepCliResult<()> {
        info!("Running `run` subcommand");
        let prep = SdmxPrep::new(self.options.apply(config))?;
        classify(&prep, self.quiet, None).await?;
        let mapping = prep.column_mapping().await?;
        let pairs = value_pairs(&prep, &mapping, self.quiet).await?;
        let mut selector = ConsoleSelector::new(io::stdin().lock(), io::stdout());
        let report = resolve(&prep, &mapping, pairs, &mut selector).await?;
        debug!("{} value pairs resolved", report.pairs.len());
        Ok(())
    }
}

/// The entrypoint for the CLI.
#[derive(Parser, Debug)]
#[command(version, about="sdmxprep classifies indicator metadata and maps its vocabulary onto an SDMX DSD", long_about = None, name="sdmxprep")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
    #[arg(
        short = 'c',
        long = "config",
        value_name = "PATH",
        help = "YAML config file. Defaults to `sdmxprep/config.yml` in the user config directory",
        global = true
    )]
    pub config: Option<PathBuf>,
    #[arg(
        short = 'q',
        long = "quiet",
        help = "\
            Do not print progress spinners to stdout. Prompts, results and logs (when\n\
            `RUST_LOG` is set) will still be printed.",
        global = true
    )]
    quiet: bool,
}

/// Commands contains the list of subcommands avaliable for use in the CLI.
/// Each command should implement the RunCommand trait and specify the list
/// of required args for that command.
#[derive(Subcommand, Debug)]
#[enum_dispatch(RunCommand)]
pub enum Commands {
    /// Classify indicators and write the indicator and dimension candidate tables
    Classify(ClassifyCommand),
    /// Fetch the observed values of every dimension in the column mapping
    Values(ValuesCommand),
    /// Resolve dimension values to DSD codes and write the mapping tables
    Resolve(ResolveCommand),
    /// Run every stage in order
    Run(RunAllCommand),
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn output_type_should_deserialize_properly() {
        let output_format = OutputFormat::from_str("TSV");
        assert_eq!(
            output_format.unwrap(),
            OutputFormat::Tsv,
            "parsing should be case insensitive"
        );
        let output_format = OutputFormat::from_str("json");
        assert_eq!(
            output_format.unwrap(),
            OutputFormat::Json,
            "correct variants should parse correctly"
        );
        let output_format = OutputFormat::from_str("geojson");
        assert!(output_format.is_err(), "non listed formats should fail");
    }

    #[test]
    fn resolve_options_override_the_config() {
        let options = ResolveOptions {
            no_prompt: true,
            replay: true,
        };
        let config = options.apply(Config::default());
        assert!(!config.manual.manually_choose_code_mapping);
        assert!(config.manual.map_manual_names_to_codes);
    }

    #[test]
    fn global_flags_parse_after_the_subcommand() {
        let cli = Cli::parse_from(["sdmxprep", "resolve", "--no-prompt", "-q", "-c", "cfg.yml"]);
        assert_eq!(cli.config, Some(PathBuf::from("cfg.yml")));
        assert!(matches!(
            cli.command,
            Some(Commands::Resolve(ResolveCommand { quiet: true, .. }))
        ));
    }

    #[tokio::test]
    async fn classify_requires_a_valid_config() {
        let result = ClassifyCommand {
            output_format: None,
            quiet: true,
        }
        .run(Config::default())
        .await;
        assert!(result.is_err());
    }

    #[test]
    fn cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
