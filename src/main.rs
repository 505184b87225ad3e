use anyhow::Result;
use clap::{Parser, Subcommand};
use dbchat::classifier::LlmClassifier;
use dbchat::config::AppConfig;
use dbchat::db::{init_pool, PostgresExecutor, PostgresSchemaProvider};
use dbchat::generation::LlmSqlGenerator;
use dbchat::guardrails::SafetyValidator;
use dbchat::llm::{LanguageModel, LlmClient};
use dbchat::observability::init_tracing;
use dbchat::response::{display_message, render_table, LlmResponseSynthesizer, MAX_ROWS_DISPLAY};
use dbchat::schema::{CachedSchemaProvider, SchemaProvider};
use dbchat::session::{ChatSession, TurnOutcome};
use dbchat::workflow::{CancellationToken, RunOptions, WorkflowOrchestrator};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "dbchat")]
#[command(about = "Ask questions about a PostgreSQL database in plain English")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database URL (overrides DATABASE_URL)
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Schema to introspect (overrides DBCHAT_SCHEMA)
    #[arg(long, global = true)]
    db_schema: Option<String>,

    /// Chat model name (overrides LLM_MODEL)
    #[arg(long, global = true)]
    model: Option<String>,

    /// Repair budget per question (overrides DBCHAT_MAX_RETRIES)
    #[arg(long, global = true)]
    max_retries: Option<u32>,

    /// Timeout for each model or database call, in seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Classify with the keyword heuristic only
    #[arg(long, global = true)]
    no_llm_classifier: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a single question
    Ask {
        question: String,
        /// Print the step trace
        #[arg(long)]
        trace: bool,
        /// Print the turn transcript as JSON
        #[arg(long)]
        json: bool,
    },
    /// Interactive session reading questions from stdin
    Chat {
        /// Print the step trace after each answer
        #[arg(long)]
        trace: bool,
    },
    /// Run the SQL safety validator on a statement
    Validate { sql: String },
    /// Print the introspected schema context
    Schema {
        /// Only show these tables
        #[arg(long)]
        table: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("info");

    let cli = Cli::parse();
    let mut config = AppConfig::from_env()?;
    if let Some(url) = cli.database_url {
        config.database_url = Some(url);
    }
    if let Some(schema) = cli.db_schema {
        config.db_schema = schema;
    }
    if let Some(model) = cli.model {
        config.llm.model = model;
    }
    if let Some(max_retries) = cli.max_retries {
        config.workflow.max_retries = max_retries;
    }
    if let Some(secs) = cli.timeout_secs {
        config.workflow.call_timeout = Duration::from_secs(secs);
    }

    match cli.command {
        Commands::Validate { sql } => {
            match SafetyValidator::new().validate(&sql) {
                Ok(()) => println!("OK: statement is a single read-only SELECT"),
                Err(violation) => {
                    println!("Rejected ({:?}): {}", violation.rule, violation);
                    std::process::exit(1);
                }
            }
        }
        Commands::Schema { table } => {
            let pool = init_pool(config.require_database_url()?).await?;
            let provider = PostgresSchemaProvider::new(pool, config.db_schema.clone());
            let schema = provider.introspect().await?;
            let filter: Vec<&str> = table.iter().map(String::as_str).collect();
            let only = if filter.is_empty() { None } else { Some(filter.as_slice()) };
            println!("{}", schema.to_prompt_context(only));
        }
        Commands::Ask { question, trace, json } => {
            let orchestrator = build_orchestrator(&config, !cli.no_llm_classifier).await?;
            let mut session = ChatSession::new(Arc::new(orchestrator));
            let outcome = ask_cancellable(&mut session, &question).await;
            if json {
                println!("{}", serde_json::to_string_pretty(outcome.transcript.as_ref())?);
            } else {
                print_outcome(&outcome, trace);
            }
        }
        Commands::Chat { trace } => {
            let orchestrator = build_orchestrator(&config, !cli.no_llm_classifier).await?;
            let mut session = ChatSession::new(Arc::new(orchestrator));
            run_repl(&mut session, trace).await?;
        }
    }

    Ok(())
}

async fn build_orchestrator(
    config: &AppConfig,
    llm_classifier: bool,
) -> Result<WorkflowOrchestrator> {
    let pool = init_pool(config.require_database_url()?).await?;
    let model: Arc<dyn LanguageModel> = Arc::new(LlmClient::new(config.llm.clone()));
    info!("Using model '{}' at {}", config.llm.model, config.llm.base_url);

    let introspection: Arc<dyn SchemaProvider> = Arc::new(PostgresSchemaProvider::new(
        pool.clone(),
        config.db_schema.clone(),
    ));
    let schema_provider = Arc::new(CachedSchemaProvider::new(introspection));
    // Warm the cache so the classifier prompt can list table names from the first question on.
    if let Err(e) = schema_provider.reload().await {
        warn!("Could not preload schema: {}", e);
    }
    let executor = Arc::new(PostgresExecutor::new(pool, config.workflow.call_timeout));

    let mut orchestrator = WorkflowOrchestrator::new(
        schema_provider,
        Arc::new(LlmSqlGenerator::new(Arc::clone(&model))),
        executor,
    )
    .with_synthesizer(Arc::new(LlmResponseSynthesizer::new(Arc::clone(&model))))
    .with_config(config.workflow.clone());

    if llm_classifier {
        orchestrator = orchestrator.with_classifier(Arc::new(LlmClassifier::new(model)));
    }
    Ok(orchestrator)
}

/// Run one turn; Ctrl-C cancels it at the next stage boundary.
async fn ask_cancellable(session: &mut ChatSession, question: &str) -> TurnOutcome {
    let token = CancellationToken::new();
    let watcher = {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel();
            }
        })
    };
    let outcome = session
        .ask_with_options(question, RunOptions::default().with_cancel(token))
        .await;
    watcher.abort();
    outcome
}

async fn run_repl(session: &mut ChatSession, trace: bool) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!(
        "Ask a question about your database. Type 'exit' to quit, 'clear' to reset the conversation."
    );

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        match question {
            "" => continue,
            "exit" | "quit" => break,
            "clear" => {
                session.clear();
                println!("Conversation cleared.");
                continue;
            }
            _ => {}
        }
        let outcome = ask_cancellable(session, question).await;
        print_outcome(&outcome, trace);
    }
    Ok(())
}

fn print_outcome(outcome: &TurnOutcome, trace: bool) {
    println!("\n{}\n", outcome.response);

    if let Some(sql) = &outcome.sql {
        println!("SQL: {}\n", sql);
    }
    if let Some(result) = &outcome.result {
        println!("{}", display_message(result));
        if !result.is_empty() {
            println!("{}\n", render_table(result, MAX_ROWS_DISPLAY));
        }
    }
    if trace {
        println!("Steps:");
        for step in &outcome.transcript.steps {
            println!("{}", step);
        }
        println!();
    }
}
