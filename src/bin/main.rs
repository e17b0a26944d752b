use ashare_analyst::{
    agent::{AnalystAgent, StreamMode},
    config::AgentConfig,
    execution::ActionExecutor,
    llm::{GeminiClient, LanguageModel},
    session::generate_session_id,
    tools::create_default_registry,
};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let config = AgentConfig::from_env()?;

    let model: Arc<dyn LanguageModel> = Arc::new(GeminiClient::from_config(&config));
    let registry = create_default_registry(&config, model.clone())?;

    println!(">>> A-Share Analyst Agent Starting...");
    println!(
        "[*] Loaded {} tools: {:?}",
        registry.len(),
        registry.tools().iter().map(|t| t.name()).collect::<Vec<_>>()
    );

    let agent = Arc::new(AnalystAgent::new(
        model,
        ActionExecutor::new(registry),
        &config,
    ));

    // One session per REPL process: every run appends to the same log file.
    let session_id = generate_session_id();
    info!(session_id = %session_id, "CLI session started");

    println!("\n>>> Ready! Type 'exit' to quit.");
    let stdin = io::stdin();

    loop {
        print!("You: ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let user_input = line.trim();

        if user_input.eq_ignore_ascii_case("exit") || user_input.eq_ignore_ascii_case("quit") {
            break;
        }
        if user_input.is_empty() {
            continue;
        }

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let printer = tokio::spawn(async move {
            while let Some(chunk) = rx.recv().await {
                println!("{}", chunk);
            }
        });

        let outcome = agent
            .run(
                user_input,
                &[],
                StreamMode::Full,
                Some(session_id.clone()),
                tx,
            )
            .await;
        printer.await?;

        if let Some(answer) = outcome.final_answer {
            println!("\n{}", answer);
        }
    }

    println!("Exiting...");
    Ok(())
}
