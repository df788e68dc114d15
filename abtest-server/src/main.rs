use abtest::experiments::config::DEFAULT_ALPHA;
use abtest::experiments::ingest::{self, IngestConfig};
use abtest::experiments::significance;
use abtest::{
    AbTestError, AnalysisParams, HypothesisMode, Report, ReportFormat, VariantObservation,
};
use abtest_http::server::DEFAULT_BIND_ADDR;
use abtest_http::{serve, ServerConfig};
use clap::{
    parser::ValueSource, ArgMatches, Args, CommandFactory, FromArgMatches, Parser, Subcommand,
};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "abtest", version, about = "Significance testing for A/B conversion experiments")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP significance service
    Serve(ServeArgs),
    /// Test a pair of conversion counts given on the command line
    Compute(ComputeArgs),
    /// Aggregate a CSV of per-visitor results and test the two groups in it
    Analyze(AnalyzeArgs),
}

#[derive(Args, Clone, Debug)]
struct ParamsArgs {
    /// Alternative hypothesis: one-sided or two-sided
    #[arg(long, env = "ABTEST_HYPOTHESIS", default_value = "one-sided")]
    hypothesis: HypothesisMode,
    /// Significance level, strictly between 0 and 1
    #[arg(long, env = "ABTEST_ALPHA", default_value_t = DEFAULT_ALPHA)]
    alpha: f64,
}

impl ParamsArgs {
    fn params(&self) -> AnalysisParams {
        AnalysisParams::new(self.hypothesis, self.alpha)
    }
}

#[derive(Args, Clone, Debug)]
struct OutputArgs {
    /// Output format: text, markdown or json
    #[arg(long, default_value = "text")]
    format: ReportFormat,
    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

impl OutputArgs {
    fn color(&self) -> bool {
        !self.no_color && std::io::stdout().is_terminal()
    }
}

#[derive(Args, Clone, Debug)]
struct ServeArgs {
    #[arg(long, env = "ABTEST_BIND_ADDR")]
    bind_addr: Option<String>,
    #[arg(long, env = "ABTEST_PORT")]
    port: Option<u16>,
    /// Bind to 127.0.0.1:0 (OS-assigned ephemeral port). Prints resolved address at startup.
    #[arg(long)]
    auto_port: bool,
    /// Request body limit in megabytes
    #[arg(long, env = "ABTEST_MAX_BODY_MB", default_value_t = abtest_http::server::DEFAULT_MAX_BODY_MB)]
    max_body_mb: usize,
    #[command(flatten)]
    params: ParamsArgs,
}

#[derive(Args, Clone, Debug)]
struct ComputeArgs {
    /// Control counts as CONVERSIONS/VISITORS
    #[arg(long, value_parser = parse_counts)]
    control: VariantObservation,
    /// Treatment counts as CONVERSIONS/VISITORS
    #[arg(long, value_parser = parse_counts)]
    treatment: VariantObservation,
    #[command(flatten)]
    params: ParamsArgs,
    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args, Clone, Debug)]
struct AnalyzeArgs {
    /// CSV file with one row per visitor
    file: PathBuf,
    /// Column holding the group label
    #[arg(long)]
    group_column: String,
    /// Column holding the conversion result (0/1, true/false, yes/no or a count)
    #[arg(long)]
    result_column: String,
    /// Label of the treatment group (defaults to the second label in the file)
    #[arg(long)]
    treatment: Option<String>,
    #[command(flatten)]
    params: ParamsArgs,
    #[command(flatten)]
    output: OutputArgs,
}

#[tokio::main]
async fn main() -> ExitCode {
    let matches = Cli::command().get_matches();
    let cli = match Cli::from_arg_matches(&matches) {
        Ok(cli) => cli,
        Err(e) => e.exit(),
    };

    match run(cli, &matches).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Serve(args) => {
            let sub = matches
                .subcommand_matches("serve")
                .ok_or("missing serve arguments")?;
            let config = resolve_server_config(&args, sub)?;
            serve(config).await
        }
        Command::Compute(args) => {
            init_cli_tracing();
            run_compute(&args)
        }
        Command::Analyze(args) => {
            init_cli_tracing();
            run_analyze(&args)
        }
    }
}

/// Logs go to stderr so that stdout carries only the report.
fn init_cli_tracing() {
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn run_compute(args: &ComputeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let result = significance::compute_with(args.control, args.treatment, &args.params.params())
        .map_err(AbTestError::from)?;
    let report = Report::new(&result, args.control, args.treatment);
    print!("{}", with_trailing_newline(report.render(args.output.format, args.output.color())?));
    Ok(())
}

fn run_analyze(args: &AnalyzeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = IngestConfig {
        group_column: args.group_column.clone(),
        result_column: args.result_column.clone(),
        treatment_label: args.treatment.clone(),
    };
    tracing::debug!(file = %args.file.display(), "reading experiment rows");
    let groups = ingest::from_csv_path(&args.file, &config).map_err(AbTestError::from)?;
    let result = groups.compute(&args.params.params()).map_err(AbTestError::from)?;
    let report = Report::from_groups(&result, &groups);
    print!("{}", with_trailing_newline(report.render(args.output.format, args.output.color())?));
    Ok(())
}

fn with_trailing_newline(mut s: String) -> String {
    if !s.ends_with('\n') {
        s.push('\n');
    }
    s
}

/// Parses `CONVERSIONS/VISITORS`, e.g. `48/100`.
fn parse_counts(s: &str) -> Result<VariantObservation, String> {
    let (conversions, visitors) = s
        .split_once('/')
        .ok_or_else(|| format!("expected CONVERSIONS/VISITORS, got '{}'", s))?;
    let conversions = conversions
        .trim()
        .parse::<u64>()
        .map_err(|e| format!("invalid conversions '{}': {}", conversions.trim(), e))?;
    let visitors = visitors
        .trim()
        .parse::<u64>()
        .map_err(|e| format!("invalid visitors '{}': {}", visitors.trim(), e))?;
    Ok(VariantObservation::new(conversions, visitors))
}

fn resolve_server_config(
    args: &ServeArgs,
    matches: &ArgMatches,
) -> Result<ServerConfig, AbTestError> {
    let defaults = args.params.params();
    defaults
        .validate()
        .map_err(|e| AbTestError::Config(format!("default {}", e)))?;
    Ok(ServerConfig {
        bind_addr: resolve_bind_addr(args, matches).map_err(AbTestError::Config)?,
        defaults,
        max_body_mb: args.max_body_mb,
    })
}

fn resolve_bind_addr(args: &ServeArgs, matches: &ArgMatches) -> Result<String, String> {
    let bind_on_cli = is_set_on_command_line(matches, "bind_addr");
    let port_on_cli = is_set_on_command_line(matches, "port");

    if args.auto_port && bind_on_cli {
        return Err("--auto-port cannot be used with --bind-addr".to_string());
    }
    if args.auto_port && port_on_cli {
        return Err("--auto-port cannot be used with --port".to_string());
    }
    if bind_on_cli && port_on_cli {
        return Err("--bind-addr cannot be used with --port".to_string());
    }

    if let Some(bind_addr) = args.bind_addr.as_ref().filter(|_| bind_on_cli) {
        return Ok(bind_addr.clone());
    }
    if args.auto_port {
        return Ok("127.0.0.1:0".to_string());
    }
    if let Some(port) = args.port.filter(|_| port_on_cli) {
        return Ok(format!("127.0.0.1:{port}"));
    }
    if let Some(bind_addr) = &args.bind_addr {
        return Ok(bind_addr.clone());
    }
    if let Some(port) = args.port {
        return Ok(format!("127.0.0.1:{port}"));
    }
    Ok(DEFAULT_BIND_ADDR.to_string())
}

fn is_set_on_command_line(matches: &ArgMatches, arg: &str) -> bool {
    matches.value_source(arg) == Some(ValueSource::CommandLine)
}
