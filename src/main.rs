//! Stacksmith CLI entrypoint.
//!
//! This is the main entrypoint for the stacksmith command-line tool.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use stacksmith::cli::{Cli, Commands, OutputFormatter, RenderFormat};
use stacksmith::cloud::{
    descriptor_from_spec, template_source, ClusterResolver, DeployOptions, ResourceLookup,
    StackDeployer, TemplateSource, TemplateUploader,
};
use stacksmith::compose::{find_compose_file, ComposeDocument, ComposeParser, ComposeValidator};
use stacksmith::error::Result;
use stacksmith::graph::{TemplateFormat, TemplateRenderer};
use stacksmith::synth::{ClusterDescriptor, SynthContext, Synthesizer};

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);

    match &cli.command {
        Commands::Init { path, force } => cmd_init(path, *force),
        Commands::Validate { warnings } => cmd_validate(&cli, *warnings, &formatter),
        Commands::Render { output_dir, format } => {
            cmd_render(&cli, output_dir, *format, &formatter).await
        }
        Commands::Plan {
            yes,
            keep,
            bucket,
            disable_rollback,
        } => {
            cmd_plan(
                &cli,
                *yes,
                *keep,
                bucket.as_deref(),
                *disable_rollback,
                &formatter,
            )
            .await
        }
        Commands::Up {
            yes,
            bucket,
            disable_rollback,
        } => cmd_up(&cli, *yes, bucket.as_deref(), *disable_rollback, &formatter).await,
    }
}

/// Initialize a new project.
fn cmd_init(path: &PathBuf, force: bool) -> Result<()> {
    info!("Initializing new Stacksmith project in: {}", path.display());

    let compose_path = path.join("stacksmith.compose.yaml");
    let env_path = path.join(".env.example");

    if !force && compose_path.exists() {
        eprintln!("Compose file already exists: {}", compose_path.display());
        eprintln!("Use --force to overwrite.");
        return Ok(());
    }

    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }

    let compose_template = include_str!("../templates/stacksmith.compose.yaml");
    std::fs::write(&compose_path, compose_template)?;
    eprintln!("Created: {}", compose_path.display());

    let env_template = include_str!("../templates/.env.example");
    std::fs::write(&env_path, env_template)?;
    eprintln!("Created: {}", env_path.display());

    eprintln!("\nProject initialized successfully!");
    eprintln!("Next steps:");
    eprintln!("  1. Edit stacksmith.compose.yaml with your services");
    eprintln!("  2. Run 'stacksmith validate' to check the document");
    eprintln!("  3. Run 'stacksmith render' to inspect the synthesized template");
    eprintln!("  4. Run 'stacksmith plan -n <stack>' to review the change set");
    eprintln!("  5. Run 'stacksmith up -n <stack>' to deploy");

    Ok(())
}

/// Validate the compose document.
fn cmd_validate(cli: &Cli, show_warnings: bool, formatter: &OutputFormatter) -> Result<()> {
    let document = load_document(cli)?;
    let validator = ComposeValidator::new();
    let result = validator.validate(&document)?;

    eprintln!("{}", formatter.format_validation(&result, show_warnings));
    eprintln!("Services: {}", document.services.len());
    eprintln!("Families: {}", document.family_names().len());
    eprintln!("Load balancers: {}", document.load_balancers.len());
    Ok(())
}

/// Synthesize and write the template.
async fn cmd_render(
    cli: &Cli,
    output_dir: &PathBuf,
    format: RenderFormat,
    formatter: &OutputFormatter,
) -> Result<()> {
    let document = load_document(cli)?;
    let context = synthesize(cli, &document).await?;

    let template_format = match format {
        RenderFormat::Json => TemplateFormat::Json,
        RenderFormat::Yaml => TemplateFormat::Yaml,
    };
    let body = renderer(cli).render(&context.graph, template_format)?;

    if !output_dir.exists() {
        std::fs::create_dir_all(output_dir)?;
    }
    let extension = match format {
        RenderFormat::Json => "json",
        RenderFormat::Yaml => "yaml",
    };
    let file_name = format!(
        "{}.template.{extension}",
        cli.name.as_deref().unwrap_or("stacksmith")
    );
    let output_path = output_dir.join(file_name);
    std::fs::write(&output_path, &body)?;

    eprintln!("{}", formatter.format_synthesis(&context));
    eprintln!("Wrote: {}", output_path.display());
    Ok(())
}

/// Create a change set, show the diff, and prompt to apply.
async fn cmd_plan(
    cli: &Cli,
    auto_approve: bool,
    keep: bool,
    bucket: Option<&str>,
    disable_rollback: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let document = load_document(cli)?;
    let context = synthesize(cli, &document).await?;
    let body = renderer(cli).render(&context.graph, TemplateFormat::Json)?;

    let options = deploy_options(cli, &document, disable_rollback).await?;
    let deployer = StackDeployer::new(cli.region.as_deref()).await;
    let source = prepare_template(cli, bucket, body).await?;

    let plan = deployer.plan(&options, &source).await?;
    eprintln!("{}", formatter.format_changes(&plan));

    if plan.is_empty {
        return Ok(());
    }

    let apply = auto_approve || confirm("Do you want to apply this change set? [y/N]: ")?;
    if apply {
        deployer.execute_change_set(&plan).await?;
        eprintln!("Change set {} executed.", plan.change_set_name);
    } else if keep {
        eprintln!(
            "Change set {} kept for later execution.",
            plan.change_set_name
        );
    } else {
        deployer.delete_change_set(&plan).await?;
        eprintln!("Change set {} deleted.", plan.change_set_name);
    }

    Ok(())
}

/// Synthesize and deploy the stack directly.
async fn cmd_up(
    cli: &Cli,
    auto_approve: bool,
    bucket: Option<&str>,
    disable_rollback: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let document = load_document(cli)?;
    let context = synthesize(cli, &document).await?;
    eprintln!("{}", formatter.format_synthesis(&context));

    let options = deploy_options(cli, &document, disable_rollback).await?;
    if !auto_approve
        && !confirm(&format!(
            "Deploy stack '{}' to region {}? [y/N]: ",
            options.name,
            options.region.as_deref().unwrap_or("default")
        ))?
    {
        eprintln!("Deployment cancelled.");
        return Ok(());
    }

    let body = renderer(cli).render(&context.graph, TemplateFormat::Json)?;
    let deployer = StackDeployer::new(cli.region.as_deref()).await;
    let source = prepare_template(cli, bucket, body).await?;

    let stack_id = deployer.deploy(&options, &source).await?;
    eprintln!("Deployment submitted: {stack_id}");
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Resolves the compose file paths from the CLI or by searching upwards.
fn resolve_compose_files(cli: &Cli) -> Result<Vec<PathBuf>> {
    if cli.files.is_empty() {
        Ok(vec![find_compose_file(".")?])
    } else {
        Ok(cli.files.clone())
    }
}

/// Loads, merges, and validates the compose document.
fn load_document(cli: &Cli) -> Result<ComposeDocument> {
    let files = resolve_compose_files(cli)?;
    debug!("Loading compose files: {files:?}");

    let parser = ComposeParser::new().with_base_path(
        files[0]
            .parent()
            .unwrap_or_else(|| std::path::Path::new(".")),
    );
    parser.load_dotenv()?;

    let document = parser.load_with_env(&files)?;
    ComposeValidator::new().validate(&document)?;
    Ok(document)
}

/// Resolves the cluster descriptor, remotely when the document asks for
/// a lookup.
async fn resolve_cluster(cli: &Cli, document: &ComposeDocument) -> Result<ClusterDescriptor> {
    let default_name = cli.name.as_deref().unwrap_or("default");
    if let Some(spec) = &document.cluster
        && spec.lookup
    {
        let name = spec.name.as_deref().unwrap_or(default_name);
        let resolver = ClusterResolver::new(cli.region.as_deref()).await;
        let mut descriptor = resolver.describe(name).await?;
        descriptor.platform_override = spec.platform_override;
        return Ok(descriptor);
    }
    Ok(descriptor_from_spec(default_name, document.cluster.as_ref()))
}

/// Runs the synthesis pipeline.
async fn synthesize(cli: &Cli, document: &ComposeDocument) -> Result<SynthContext> {
    let cluster = resolve_cluster(cli, document).await?;
    let synthesizer = cli
        .seed
        .map_or_else(Synthesizer::new, |seed| Synthesizer::new().with_seed(seed));
    synthesizer.synthesize(document, &cluster)
}

/// Builds the template renderer with the stack description.
fn renderer(cli: &Cli) -> TemplateRenderer {
    TemplateRenderer::new().with_description(format!(
        "Stacksmith-synthesized stack {}",
        cli.name.as_deref().unwrap_or("stacksmith")
    ))
}

/// Builds the deployment options, requiring a stack name. A declared
/// VPC lookup is resolved here and passed down as stack parameters.
async fn deploy_options(
    cli: &Cli,
    document: &ComposeDocument,
    disable_rollback: bool,
) -> Result<DeployOptions> {
    let name = cli.name.clone().ok_or_else(|| {
        stacksmith::error::StacksmithError::internal(
            "A stack name is required: pass --name or set STACKSMITH_STACK_NAME",
        )
    })?;

    let mut parameters = Vec::new();
    if let Some(vpc) = &document.vpc
        && let Some(lookup) = &vpc.lookup
    {
        let filters: Vec<(String, String)> = lookup
            .tags
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let client = ResourceLookup::new(cli.region.as_deref()).await;
        let arn = client.find_one("ec2:vpc", &filters).await?;
        // The tagging API returns ARNs; the template parameter wants the
        // bare vpc id.
        let vpc_id = arn.rsplit('/').next().unwrap_or(&arn).to_string();
        info!("Resolved VPC {vpc_id} from tags");
        parameters.push((String::from("VpcId"), vpc_id));
    }

    Ok(DeployOptions {
        name,
        region: cli.region.clone(),
        disable_rollback,
        parameters,
    })
}

/// Prepares the template source, uploading when a bucket is configured.
async fn prepare_template(
    cli: &Cli,
    bucket: Option<&str>,
    body: String,
) -> Result<TemplateSource> {
    let uploader = match bucket {
        Some(bucket) => Some(TemplateUploader::new(bucket, None, cli.region.as_deref()).await),
        None => None,
    };
    template_source(body, uploader.as_ref()).await
}

/// Prompts the user for a yes/no confirmation.
fn confirm(prompt: &str) -> Result<bool> {
    eprint!("{prompt}");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}
