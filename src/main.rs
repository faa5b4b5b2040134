use anyhow::Context;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use trendscope::cli::output::Output;
use trendscope::cli::{Cli, Commands, RunArgs};
use trendscope::utils::toml_config::{ReportStyle, SelectionMode};
use trendscope::{
    Classifier, DuckDuckGoSearch, ExplicitClassifier, LlmClassifier, LlmReportRenderer,
    MarkdownReportRenderer, RenderStatus, ReportRenderer, Research, Supervisor, TaskSet,
    TrendConfig,
};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();
    let output = if cli.no_color {
        Output::no_color()
    } else {
        Output::new()
    };

    match run(cli, &output).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output.error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, output: &Output) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Config { validate } => show_config(&cli, *validate, output),
        Commands::Run(args) => {
            let config = TrendConfig::load_or_default(&cli.config)
                .with_context(|| format!("loading {}", cli.config.display()))?;
            init_tracing(&config, cli.verbose, cli.log_json);
            run_analysis(&config, args, cli.verbose, output).await
        }
    }
}

fn show_config(cli: &Cli, validate: bool, output: &Output) -> anyhow::Result<()> {
    if validate {
        TrendConfig::load(&cli.config)
            .with_context(|| format!("validating {}", cli.config.display()))?;
        output.success(&format!("{} is valid", cli.config.display()));
        return Ok(());
    }

    let config = TrendConfig::load_or_default(&cli.config)?;
    output.header("Effective configuration");
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn init_tracing(config: &TrendConfig, verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { config.log_level.as_str() };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("trendscope={}", default_level)));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run_analysis(
    config: &TrendConfig,
    args: &RunArgs,
    verbose: bool,
    output: &Output,
) -> anyhow::Result<()> {
    output.banner();

    let provider = config.llm.provider()?;
    let llm = provider.create_client()?;
    output.info(&format!("model: {} via {}", provider.model(), provider.name()));

    let research = Research::new(llm.clone(), Arc::new(DuckDuckGoSearch::new()), config.search);
    let classifier: Arc<dyn Classifier> =
        if args.tasks.is_some() || config.selection.mode == SelectionMode::Explicit {
            Arc::new(ExplicitClassifier)
        } else {
            Arc::new(LlmClassifier::new(llm.clone()))
        };

    let supervisor = Supervisor::new(TaskSet::from_research(research), classifier, config.quality)
        .with_task_timeout(config.executor.task_timeout());

    let params = args.query_params();
    output.step(1, 2, "running analyses");
    let state = supervisor.coordinate(params).await?;

    output.header("Outcomes");
    if let Some(summary) = state.summary() {
        for &(kind, outcome) in &summary.outcomes {
            output.outcome(kind, outcome);
        }
        output.kv(
            "succeeded",
            &format!("{}/{}", summary.success_count, summary.total),
        );
        if !summary.is_complete() && !verbose {
            output.hint("re-run with --verbose to see why analyses failed");
        }
    }
    output.kv("retries", &state.retry_count().to_string());

    if args.no_report {
        output.complete("Done (report skipped)");
        return Ok(());
    }

    output.step(2, 2, "writing report");
    let report = &config.report;
    let renderer: Box<dyn ReportRenderer> = match report.style {
        ReportStyle::Llm => Box::new(
            LlmReportRenderer::new(llm, report.output_dir.clone()).with_title(report.title.clone()),
        ),
        ReportStyle::Plain => Box::new(
            MarkdownReportRenderer::new(report.output_dir.clone()).with_title(report.title.clone()),
        ),
    };
    let rendered = renderer.render(&state, args.output.as_deref()).await;
    match rendered.status {
        RenderStatus::Success => {
            for path in &rendered.output_locations {
                output.success(&format!("report written to {}", path.display()));
            }
            output.complete("Done");
        }
        RenderStatus::Failed => {
            output.warning(&format!(
                "report not written: {}",
                rendered.error.as_deref().unwrap_or("unknown error")
            ));
        }
    }

    Ok(())
}
