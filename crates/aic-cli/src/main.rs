use aic_graph::{DeploymentState, SimulatedProvisioner};
use aic_stack::{
    ComposedStack, Config, DeploymentIdentity, ResolvedOutputs, StackComposer, StackSettings,
    DEFAULT_CONFIG_PATH, DEFAULT_STACK_NAME,
};
use anyhow::{bail, Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const DEFAULT_STATE_PATH: &str = "./aic-state.json";
const DEFAULT_REGION: &str = "us-east-1";

fn state_arg() -> Arg {
    Arg::new("state")
        .long("state")
        .default_value(DEFAULT_STATE_PATH)
        .help("Deployment state file")
}

fn cli() -> Command {
    Command::new("aic")
        .version(aic_stack::VERSION)
        .about("AI chatbot deployment topology")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .default_value(DEFAULT_CONFIG_PATH)
                .help("Configuration file; a missing file yields the default record"),
        )
        .arg(
            Arg::new("stack-name")
                .long("stack-name")
                .global(true)
                .default_value(DEFAULT_STACK_NAME)
                .help("Name of the deployed stack"),
        )
        .arg(
            Arg::new("account")
                .long("account")
                .global(true)
                .env("CDK_DEFAULT_ACCOUNT")
                .default_value("000000000000")
                .help("Target account id"),
        )
        .arg(
            Arg::new("region")
                .long("region")
                .global(true)
                .env("CDK_DEFAULT_REGION")
                .help("Target region (falls back to AWS_REGION)"),
        )
        .subcommand(
            Command::new("synth")
                .about("Print the synthesized template")
                .arg(
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .help("Write the template to a file instead of stdout"),
                ),
        )
        .subcommand(
            Command::new("plan").about("Print the build plan in provisioning order"),
        )
        .subcommand(
            Command::new("deploy")
                .about("Deploy the topology and print the resolved outputs")
                .arg(
                    Arg::new("simulate")
                        .long("simulate")
                        .action(ArgAction::SetTrue)
                        .help("Provision against the in-memory simulator"),
                )
                .arg(state_arg()),
        )
        .subcommand(
            Command::new("outputs")
                .about("Print the outputs recorded by the last deployment")
                .arg(state_arg()),
        )
}

fn deployment_identity(matches: &ArgMatches) -> DeploymentIdentity {
    let region = matches
        .get_one::<String>("region")
        .cloned()
        .or_else(|| std::env::var("AWS_REGION").ok())
        .unwrap_or_else(|| DEFAULT_REGION.to_string());
    DeploymentIdentity::new(
        string_arg(matches, "stack-name"),
        string_arg(matches, "account"),
        region,
    )
}

// only called for arguments carrying a default value
fn string_arg(matches: &ArgMatches, name: &str) -> String {
    matches.get_one::<String>(name).cloned().unwrap_or_default()
}

fn compose(matches: &ArgMatches) -> Result<ComposedStack> {
    let config_path = string_arg(matches, "config");
    let config = Config::load(&config_path)
        .with_context(|| format!("loading configuration from {config_path}"))?;
    let composer = StackComposer::new(
        &config,
        StackSettings::default(),
        deployment_identity(matches),
    )?;
    Ok(composer.compose()?)
}

fn load_state(path: &Path) -> Result<DeploymentState> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "no prior state, starting fresh");
        return Ok(DeploymentState::new());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading state from {}", path.display()))?;
    DeploymentState::from_json(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn synth(args: &ArgMatches) -> Result<()> {
    let stack = compose(args)?;
    let rendered = serde_json::to_string_pretty(&stack.synth())?;
    match args.get_one::<String>("output") {
        Some(path) => {
            std::fs::write(path, rendered).with_context(|| format!("writing {path}"))?;
            tracing::info!(path = %path, "template written");
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

fn plan(args: &ArgMatches) -> Result<()> {
    let stack = compose(args)?;
    let topology = stack.topology();
    println!("{} ({})", topology.description(), topology.digest());
    for asset in topology.assets() {
        println!("  asset  {}  [{}]", asset.fingerprint(), asset.component());
    }
    for (step, id) in topology.order().iter().enumerate() {
        let Some(node) = topology.resource(id.as_str()) else {
            continue;
        };
        println!(
            "  {:>3}  {:<40} {:<45} [{}]",
            step + 1,
            id,
            node.resource_type(),
            node.component()
        );
    }
    println!("Outputs:");
    for output in topology.outputs() {
        println!("  {}", output.name());
    }
    Ok(())
}

async fn deploy(args: &ArgMatches) -> Result<()> {
    if !args.get_flag("simulate") {
        bail!("only simulated deployments are supported; pass --simulate");
    }
    let stack = compose(args)?;
    let state_path = string_arg(args, "state");
    let path = Path::new(&state_path);
    let mut state = load_state(path)?;

    let deployment = stack.deployment();
    let provisioner = Arc::new(
        SimulatedProvisioner::new().with_identity(&deployment.account, &deployment.region),
    );
    let deployed = stack.deploy(provisioner, &mut state).await?;

    std::fs::write(path, state.to_json()?)
        .with_context(|| format!("writing state to {}", path.display()))?;
    let report = &deployed.report;
    println!(
        "created {}, updated {}, unchanged {}, removed {} in {}ms",
        report.created.len(),
        report.updated.len(),
        report.unchanged.len(),
        report.removed.len(),
        report.execution_time_ms
    );
    println!("{}", deployed.outputs.to_json()?);
    Ok(())
}

fn outputs(args: &ArgMatches) -> Result<()> {
    let state_path = string_arg(args, "state");
    let path = Path::new(&state_path);
    if !path.exists() {
        bail!("no deployment recorded at {}", path.display());
    }
    let state = load_state(path)?;
    let outputs = ResolvedOutputs::from_resolved(&state.outputs)?;
    println!("{}", outputs.to_json()?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // global flags are propagated into the subcommand's matches
    let matches = cli().get_matches();
    match matches.subcommand() {
        Some(("synth", args)) => synth(args),
        Some(("plan", args)) => plan(args),
        Some(("deploy", args)) => deploy(args).await,
        Some(("outputs", args)) => outputs(args),
        _ => unreachable!("a subcommand is required"),
    }
}
