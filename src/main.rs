//! Noteflow CLI - talk to an agent-backed notebook from the terminal

use std::io::Write;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

use noteflow::{
    ClientConfig, FixSuggestion, HttpApi, LiveTranscript, NoteflowError, ResearchProgress,
    SessionController, StageStatus, StepStatus,
};

#[derive(Parser)]
#[command(name = "noteflow")]
#[command(about = "Noteflow - streaming client for agent-backed notebooks")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a message and stream the agent's reply
    Ask {
        /// The message text
        message: String,

        /// Continue an existing session instead of creating one
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Run the broad-research pipeline for a query
    Research {
        /// The research query
        query: String,
    },

    /// List sessions in the workspace
    Sessions,

    /// Delete a session
    Delete {
        /// Session id
        id: String,
    },

    /// Fetch suggested follow-up questions for a session
    Suggest {
        /// Session id
        session: String,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (ignore if not present)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Ask { message, session } => ask(&message, session).await,
        Commands::Research { query } => research(&query).await,
        Commands::Sessions => list_sessions().await,
        Commands::Delete { id } => delete_session(&id).await,
        Commands::Suggest { session } => suggest(&session).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if let Some(suggestion) = e
            .downcast_ref::<NoteflowError>()
            .and_then(FixSuggestion::fix_suggestion)
        {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

fn controller() -> Result<SessionController> {
    let config = ClientConfig::from_env()?;
    let workspace = config.workspace.clone();
    Ok(SessionController::new(
        std::sync::Arc::new(HttpApi::new(config)),
        workspace,
    ))
}

/// Cancel everything live when the user hits Ctrl-C; the stream loop keeps
/// partial output and exits cleanly
fn install_abort_handler(controller: &SessionController) {
    let operations = controller.operations();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n{} stopping, keeping partial output", "→".yellow());
            operations.cancel_all();
        }
    });
}

async fn ask(message: &str, session: Option<String>) -> Result<()> {
    let mut controller = controller()?;
    if let Some(session_id) = session {
        controller = controller.with_active_session(session_id);
    }
    install_abort_handler(&controller);

    let mut printed = 0usize;
    let mut steps_seen = 0usize;
    let committed = controller
        .send(message, |transcript: &LiveTranscript| {
            render_transcript(transcript, &mut printed, &mut steps_seen);
        })
        .await?;

    println!();
    match committed {
        Some(reply) => {
            // Anything the incremental renderer didn't get to (e.g. a reply
            // delivered only in the final metadata envelope)
            if printed == 0 && !reply.content.is_empty() {
                println!("{}", reply.content);
            }
            if let Some(meta) = reply.agent_meta {
                for artifact in &meta.artifacts {
                    println!(
                        "{} {}",
                        "file:".cyan(),
                        artifact.name.as_deref().unwrap_or(&artifact.id)
                    );
                }
                if let Some(elapsed) = meta.elapsed_secs {
                    println!("{} {:.1}s", "done in".dimmed(), elapsed);
                }
            }
        }
        None => println!("{}", "(no response)".dimmed()),
    }

    if let Some(session_id) = controller.active_session() {
        println!("{} {}", "session:".dimmed(), session_id);
    }
    Ok(())
}

fn render_transcript(transcript: &LiveTranscript, printed: &mut usize, steps_seen: &mut usize) {
    for step in transcript.steps().iter().skip(*steps_seen) {
        eprintln!("{} {}", "→".cyan(), step.label.cyan());
    }
    *steps_seen = transcript.steps().len();

    if let Some(step) = transcript.steps().last() {
        if step.status == StepStatus::Error {
            if let Some(ref error) = step.error {
                eprintln!("{} {}", "step failed:".red(), error);
            }
        }
    }

    let text = transcript.text();
    if text.len() > *printed {
        print!("{}", &text[*printed..]);
        let _ = std::io::stdout().flush();
        *printed = text.len();
    }
}

async fn research(query: &str) -> Result<()> {
    let mut controller = controller()?;
    install_abort_handler(&controller);

    let mut printed = 0usize;
    let mut done_stages = Vec::new();
    let committed = controller
        .run_research(query, |progress: &ResearchProgress| {
            render_research(progress, &mut printed, &mut done_stages);
        })
        .await?;

    println!();
    match committed {
        Some(report) => {
            if printed == 0 && !report.content.is_empty() {
                println!("{}", report.content);
            }
        }
        None => println!("{}", "(no report)".dimmed()),
    }
    Ok(())
}

fn render_research(
    progress: &ResearchProgress,
    printed: &mut usize,
    announced: &mut Vec<&'static str>,
) {
    for (stage, status) in progress.stages() {
        if status == StageStatus::Active && !announced.contains(&stage.label()) {
            announced.push(stage.label());
            eprintln!("{} {}", "→".cyan(), stage.label().cyan());
        }
    }
    let text = progress.text();
    if text.len() > *printed {
        print!("{}", &text[*printed..]);
        let _ = std::io::stdout().flush();
        *printed = text.len();
    }
}

async fn list_sessions() -> Result<()> {
    let mut controller = controller()?;
    controller.refresh_sessions().await?;

    if controller.sessions().is_empty() {
        println!("{}", "No sessions yet".dimmed());
        return Ok(());
    }
    for session in controller.sessions() {
        println!(
            "{}  {}  {}",
            session.id.cyan(),
            session.title,
            session.created_at.dimmed()
        );
    }
    Ok(())
}

async fn delete_session(id: &str) -> Result<()> {
    let mut controller = controller()?;
    controller.refresh_sessions().await?;
    controller.delete_session(id).await?;
    println!("{} Deleted session {}", "✓".green(), id);
    Ok(())
}

async fn suggest(session: &str) -> Result<()> {
    let mut controller = controller()?.with_active_session(session);
    install_abort_handler(&controller);

    let suggestions = controller.fetch_suggestions().await?;
    if suggestions.is_empty() {
        println!("{}", "No suggestions".dimmed());
        return Ok(());
    }
    for suggestion in suggestions {
        println!("{} {}", "?".cyan(), suggestion);
    }
    Ok(())
}
