use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use pcbmill::cncjob::preprocessor_by_name;
use pcbmill::gerber::{self, SourceKind};
use pcbmill::{
    drill_params, excellon, excellon_options, gerber_options, init_logging, mill_params,
    CamConfig, CancellationToken, CncJob, GeometryObject, JobError, ParseStatus, Units,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "pcbmill", version, about = "PCB isolation milling and drilling CAM")]
struct Cli {
    /// Configuration file (TOML or JSON); the platform default is used otherwise
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Isolation-route a Gerber copper layer
    Gerber {
        input: PathBuf,
        /// Output G-code file, stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Override the number of isolation passes
        #[arg(long)]
        passes: Option<u32>,
    },
    /// Drill holes and mill slots from an Excellon file
    Drill {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the tool table of a Gerber or Excellon file
    Info { input: PathBuf },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging()?;
    info!("PcbMill {} ({})", pcbmill::VERSION, pcbmill::BUILD_DATE);

    let config = match &cli.config {
        Some(path) => CamConfig::load_from_file(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => CamConfig::load_or_default().context("loading default configuration")?,
    };

    match cli.command {
        Command::Gerber {
            input,
            output,
            passes,
        } => {
            let gcode = isolate(&config, &input, passes)?;
            write_output(output.as_deref(), &gcode)
        }
        Command::Drill { input, output } => {
            let gcode = drill(&config, &input)?;
            write_output(output.as_deref(), &gcode)
        }
        Command::Info { input } => describe(&config, &input),
    }
}

fn read_gerber(config: &CamConfig, input: &Path) -> anyhow::Result<GeometryObject> {
    let parsed = gerber::parse_file(input, &gerber_options(config), &CancellationToken::new())
        .with_context(|| format!("parsing {}", input.display()))?;
    if let ParseStatus::Defective(defects) = &parsed.status {
        for defect in defects {
            warn!("{}: {}", input.display(), defect);
        }
    }
    Ok(parsed.geometry)
}

fn read_excellon(config: &CamConfig, input: &Path) -> anyhow::Result<GeometryObject> {
    excellon::parse_file(input, &excellon_options(config), &CancellationToken::new())
        .with_context(|| format!("parsing {}", input.display()))
}

fn new_job(name: &str) -> anyhow::Result<CncJob> {
    let Some(preprocessor) = preprocessor_by_name(name) else {
        bail!("unknown preprocessor '{}'", name);
    };
    Ok(CncJob::new(Units::Mm, preprocessor, CancellationToken::new()))
}

fn isolate(config: &CamConfig, input: &Path, passes: Option<u32>) -> anyhow::Result<String> {
    let mut copper = read_gerber(config, input)?;
    copper.convert_units(Units::Mm);

    let mill = &config.mill;
    let paths = copper.isolation_paths(
        mill.tool_diameter,
        passes.unwrap_or(mill.isolation_passes),
        mill.overlap,
    );
    info!("{} isolation paths", paths.len());

    let mut job = new_job(&mill.preprocessor)?;
    job.mill_paths(1, &paths, &mill_params(config))
        .context("generating isolation toolpath")?;
    Ok(job.finish())
}

fn drill(config: &CamConfig, input: &Path) -> anyhow::Result<String> {
    let mut drills = read_excellon(config, input)?;
    drills.convert_units(Units::Mm);

    let mut job = new_job(&config.drill.preprocessor)?;
    for (&tool, entry) in &drills.tools {
        let params = drill_params(config, entry.aperture.size);
        let holes = drills.drill_locations(tool);
        let slots = drills.tool_paths(tool);

        let mut outcome = Ok(());
        if !holes.is_empty() {
            outcome = job.drill_points(tool, &holes, &params).map(|_| ());
        }
        if outcome.is_ok() && !slots.is_empty() {
            outcome = job.mill_paths(tool, &slots, &params).map(|_| ());
        }
        match outcome {
            Ok(()) => {}
            Err(err @ JobError::Skipped { .. }) => warn!("{}", err),
            Err(err) => return Err(err.into()),
        }
    }
    if job.stats().is_empty() {
        bail!("no tool in {} produced a toolpath", input.display());
    }
    Ok(job.finish())
}

fn describe(config: &CamConfig, input: &Path) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("reading {}", input.display()))?;
    let kind = gerber::detect(&text);
    let (object, status) = match kind {
        SourceKind::Excellon => (read_excellon(config, input)?, ParseStatus::Success),
        SourceKind::Rs274x | SourceKind::GerberX2 => {
            let parsed = gerber::parse(&text, &gerber_options(config), &CancellationToken::new())
                .with_context(|| format!("parsing {}", input.display()))?;
            (parsed.geometry, parsed.status)
        }
    };

    println!("{} ({:?}, {})", input.display(), kind, object.units);
    match &status {
        ParseStatus::Success => println!("status: success"),
        ParseStatus::Defective(defects) => {
            println!("status: defective");
            for defect in defects {
                println!("  {}", defect);
            }
        }
    }
    println!("{:>5}  {:<10} {:>10} {:>9}", "tool", "kind", "size", "items");
    for row in object.tool_summary() {
        println!(
            "{:>5}  {:<10} {:>10.4} {:>9}",
            row.id, row.kind, row.size, row.fragments
        );
    }
    if let Some(bounds) = object.bounds() {
        println!(
            "bounds: ({:.4}, {:.4}) - ({:.4}, {:.4})",
            bounds.min().x,
            bounds.min().y,
            bounds.max().x,
            bounds.max().y
        );
    }
    Ok(())
}

fn write_output(path: Option<&Path>, gcode: &str) -> anyhow::Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, gcode)
                .with_context(|| format!("writing {}", path.display()))?;
            info!("wrote {}", path.display());
        }
        None => print!("{}", gcode),
    }
    Ok(())
}
