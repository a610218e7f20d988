//! Command line front end: one subcommand per raster transformation

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use rastercalc::core::operators::{
    Add, AddWithHoles, Clamp, Divide, Mask, Multiply, ReplaceNodata, Subtract, SubtractWithHoles,
    Threshold,
};
use rastercalc::core::reclassify::Reclassify;
use rastercalc::core::statistics::{raster_percentiles, raster_statistics};
use rastercalc::io::table::{read_lookup_table, ValueColumn};
use rastercalc::{
    CalculatorConfig, Comparison, ProcessingContext, RasterCalculator, RasterDataType, RasterOperator,
    SourceTerm,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rastercalc", version, about = "Blockwise, nodata-aware raster algebra")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct OutputArgs {
    /// Output raster path
    #[arg(short, long)]
    output: PathBuf,

    /// Replace the output if it already exists
    #[arg(long)]
    overwrite: bool,

    /// Output datatype (byte, int16, uint16, int32, uint32, float32, float64)
    #[arg(long, default_value = "float32")]
    datatype: String,

    /// Nodata value of the output
    #[arg(long, default_value_t = -9999.0, allow_negative_numbers = true)]
    nodata: f64,
}

#[derive(Args)]
struct HolesArgs {
    /// Treat nodata as 0; output is nodata only where every input is nodata
    #[arg(long)]
    treat_nodata_as_zero: bool,

    /// Output is nodata wherever any input is nodata (default)
    #[arg(long)]
    strict: bool,
}

impl HolesArgs {
    fn zero_fill(&self) -> Result<bool> {
        if self.treat_nodata_as_zero && self.strict {
            bail!("--treat-nodata-as-zero and --strict are mutually exclusive");
        }
        Ok(self.treat_nodata_as_zero)
    }
}

#[derive(Subcommand)]
enum Command {
    /// Sum two or more rasters
    Add {
        #[arg(required = true, num_args = 2..)]
        rasters: Vec<PathBuf>,
        #[command(flatten)]
        holes: HolesArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Subtract raster B from raster A
    Subtract {
        a: PathBuf,
        b: PathBuf,
        #[command(flatten)]
        holes: HolesArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Multiply two or more rasters
    Multiply {
        #[arg(required = true, num_args = 2..)]
        rasters: Vec<PathBuf>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Divide raster A by raster B; division by zero gives nodata
    Divide {
        a: PathBuf,
        b: PathBuf,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Sum a stack of rasters, tolerating holes
    Sum {
        #[arg(required = true, num_args = 1..)]
        rasters: Vec<PathBuf>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Bound values into [lower, upper]
    Clamp {
        raster: PathBuf,
        #[arg(long, allow_negative_numbers = true)]
        lower: f64,
        #[arg(long, allow_negative_numbers = true)]
        upper: f64,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// 1 where the comparison holds, 0 elsewhere
    Threshold {
        raster: PathBuf,
        /// Comparison operator: lt, le, gt, ge, eq, ne
        #[arg(long, default_value = "ge")]
        op: String,
        /// Compare against a constant
        #[arg(long, allow_negative_numbers = true, conflicts_with_all = ["percentile", "against"])]
        value: Option<f64>,
        /// Compare against this percentile of the raster's valid pixels
        #[arg(long, conflicts_with = "against")]
        percentile: Option<f64>,
        /// Compare against a second, aligned raster
        #[arg(long)]
        against: Option<PathBuf>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Keep values where a mask raster selects the pixel
    Mask {
        raster: PathBuf,
        #[arg(long)]
        mask: PathBuf,
        /// Mask codes that select a pixel; any non-zero code when omitted
        #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
        values: Vec<f64>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Map integer codes through a CSV lookup table
    Reclassify {
        raster: PathBuf,
        #[arg(long)]
        table: PathBuf,
        /// Take the output value from the third CSV column instead of the second
        #[arg(long)]
        third_column: bool,
        /// Fail on codes missing from the table instead of passing them through
        #[arg(long)]
        values_required: bool,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Fill nodata of a primary raster from a secondary raster
    ReplaceNodata {
        primary: PathBuf,
        secondary: PathBuf,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Print summary statistics and percentiles of a band as JSON
    Stats {
        raster: PathBuf,
        #[arg(long, default_value_t = 1)]
        band: usize,
        #[arg(long, value_delimiter = ',')]
        percentiles: Vec<f64>,
    },
}

fn rasters(paths: &[PathBuf]) -> Vec<SourceTerm> {
    paths.iter().map(SourceTerm::raster).collect()
}

fn evaluate(
    ctx: &ProcessingContext,
    sources: Vec<SourceTerm>,
    operator: &dyn RasterOperator,
    output: &OutputArgs,
) -> Result<()> {
    let datatype: RasterDataType = output.datatype.parse()?;
    let calculator = RasterCalculator::new(CalculatorConfig::default().with_overwrite(output.overwrite));
    let info = calculator
        .evaluate(ctx, &sources, operator, &output.output, datatype, output.nodata)
        .with_context(|| format!("{} failed", operator.name()))?;
    log::info!(
        "Wrote {}x{} raster to {}",
        info.size.0,
        info.size.1,
        output.output.display()
    );
    Ok(())
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Add { rasters: paths, holes, output } => {
            let ctx = ProcessingContext::new("add");
            if holes.zero_fill()? {
                evaluate(&ctx, rasters(&paths), &AddWithHoles, &output)
            } else {
                evaluate(&ctx, rasters(&paths), &Add, &output)
            }
        }
        Command::Subtract { a, b, holes, output } => {
            let ctx = ProcessingContext::new("subtract");
            let sources = rasters(&[a, b]);
            if holes.zero_fill()? {
                evaluate(&ctx, sources, &SubtractWithHoles, &output)
            } else {
                evaluate(&ctx, sources, &Subtract, &output)
            }
        }
        Command::Multiply { rasters: paths, output } => {
            evaluate(&ProcessingContext::new("multiply"), rasters(&paths), &Multiply, &output)
        }
        Command::Divide { a, b, output } => {
            evaluate(&ProcessingContext::new("divide"), rasters(&[a, b]), &Divide, &output)
        }
        Command::Sum { rasters: paths, output } => {
            evaluate(&ProcessingContext::new("sum"), rasters(&paths), &AddWithHoles, &output)
        }
        Command::Clamp { raster, lower, upper, output } => {
            let clamp = Clamp::new(lower, upper)?;
            evaluate(&ProcessingContext::new("clamp"), rasters(&[raster]), &clamp, &output)
        }
        Command::Threshold { raster, op, value, percentile, against, output } => {
            let ctx = ProcessingContext::new("threshold");
            let comparison: Comparison = op.parse()?;
            let other = match (value, percentile, against) {
                (Some(v), None, None) => SourceTerm::scalar(v),
                (None, Some(p), None) => {
                    let cutoff = raster_percentiles(&ctx, &raster, 1, &[p])?[0];
                    log::info!("Percentile {} of {} is {}", p, raster.display(), cutoff);
                    SourceTerm::scalar(cutoff)
                }
                (None, None, Some(path)) => SourceTerm::raster(path),
                _ => bail!("exactly one of --value, --percentile or --against is required"),
            };
            let sources = vec![SourceTerm::raster(raster), other];
            evaluate(&ctx, sources, &Threshold::new(comparison), &output)
        }
        Command::Mask { raster, mask, values, output } => {
            let operator = if values.is_empty() {
                Mask::nonzero()
            } else {
                Mask::with_values(values)
            };
            evaluate(&ProcessingContext::new("mask"), rasters(&[raster, mask]), &operator, &output)
        }
        Command::Reclassify { raster, table, third_column, values_required, output } => {
            let column = if third_column {
                ValueColumn::Second
            } else {
                ValueColumn::First
            };
            let table = read_lookup_table(&table, column)
                .with_context(|| format!("reading lookup table {}", table.display()))?;
            let operator = Reclassify::new(table, values_required);
            evaluate(&ProcessingContext::new("reclassify"), rasters(&[raster]), &operator, &output)
        }
        Command::ReplaceNodata { primary, secondary, output } => evaluate(
            &ProcessingContext::new("replace_nodata"),
            rasters(&[primary, secondary]),
            &ReplaceNodata,
            &output,
        ),
        Command::Stats { raster, band, percentiles } => {
            let ctx = ProcessingContext::new("stats");
            let stats = raster_statistics(&ctx, &raster, band)?;
            let values = if percentiles.is_empty() {
                Vec::new()
            } else {
                raster_percentiles(&ctx, &raster, band, &percentiles)?
            };
            let report = serde_json::json!({
                "raster": raster.display().to_string(),
                "band": band,
                "statistics": stats,
                "percentiles": percentiles
                    .iter()
                    .zip(values.iter())
                    .map(|(p, v)| serde_json::json!({ "percentile": p, "value": v }))
                    .collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    run(cli.command)
}
