//! Interactive chat against Amazon Bedrock models.
//!
//! This binary provides a streaming REPL that keeps a short rolling history and can take
//! input from the keyboard, an image, or a voice recording.
//!
//! # Usage
//!
//! ```bash
//! # Model and region from the environment
//! export AWS_BEARER_TOKEN_BEDROCK=...
//! MODEL_ID=anthropic.claude-3-haiku-20240307-v1:0 colloquy-chat
//!
//! # Answer questions about a corpus
//! colloquy-chat --corpus honglou.txt --top-k 2
//!
//! # Teach a lesson described in YAML
//! colloquy-chat --persona lesson.yaml --log-level info
//! ```

use std::path::Path;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use colloquy::chat::{
    ChatArgs, ChatCommand, ChatConfig, LogLevel, PlainTextRenderer, Renderer, help_text,
    is_multiline_end, parse_command,
};
use colloquy::{
    BedrockTransport, CommandTranscriber, ConversationSession, CorpusRetriever, Embedder, Error,
    History, ProviderCatalog, RequestAdapter, TeachingPrompt, TesseractOcr,
};

fn init_tracing(level: LogLevel) {
    let filter = EnvFilter::new(level.filter_directive());
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn exit_with(err: Error) -> ! {
    match err {
        Error::UnknownModel { model_id, valid } => {
            eprintln!("Error: {model_id} is not a valid model id. Set MODEL_ID or --model to one of:");
            for id in valid {
                eprintln!("    {id}");
            }
        }
        err => eprintln!("Error: {err}"),
    }
    process::exit(1);
}

#[cfg(feature = "fastembed-embeddings")]
fn corpus_embedder() -> Result<Arc<dyn Embedder>, Error> {
    Ok(Arc::new(colloquy::FastEmbedder::new()?))
}

#[cfg(not(feature = "fastembed-embeddings"))]
fn corpus_embedder() -> Result<Arc<dyn Embedder>, Error> {
    Err(Error::configuration(
        "--corpus requires the fastembed-embeddings feature",
    ))
}

async fn build_session(config: &ChatConfig) -> Result<ConversationSession, Error> {
    let spec = config.provider_spec()?.clone();
    let transport = BedrockTransport::with_options(None, Some(config.endpoint_url()), None)?;

    let mut system = Vec::new();
    if let Some(path) = &config.persona_path {
        system.push(TeachingPrompt::load(path)?.render());
    }
    if let Some(prompt) = &config.system_prompt {
        system.push(prompt.clone());
    }

    let mut history = History::with_pairs(config.history_pairs);
    if !system.is_empty() {
        history.set_system(Some(system.join("\n\n")));
    }

    let mut session = ConversationSession::new(spec, Arc::new(transport))
        .with_adapter(RequestAdapter::new(config.language_directive()))
        .with_history(history)
        .with_ocr(Arc::new(TesseractOcr::new(config.ocr_languages.clone())));
    if let Some(corpus) = &config.corpus_path {
        let retriever =
            CorpusRetriever::from_path(corpus, config.passage_words, corpus_embedder()?).await?;
        session = session.with_retriever(Arc::new(retriever), config.top_k);
    }
    if let Some(command) = &config.transcriber {
        session = session.with_transcriber(Arc::new(CommandTranscriber::from_command_line(
            command,
        )?));
    }
    Ok(session)
}

/// Main entry point for the colloquy-chat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, _) = ChatArgs::from_command_line_relaxed("colloquy-chat [OPTIONS]");
    let config = ChatConfig::from_args(args).unwrap_or_else(|err| exit_with(err));
    init_tracing(config.log_level);

    let mut session = match build_session(&config).await {
        Ok(session) => session,
        Err(err) => exit_with(err),
    };

    // Flag for interrupt handling during streaming
    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_clone = interrupted.clone();
    ctrlc::set_handler(move || {
        interrupted_clone.store(true, Ordering::Relaxed);
    })?;

    let mut renderer =
        PlainTextRenderer::with_color(config.use_color).with_interrupt(interrupted.clone());
    let mut rl = DefaultEditor::new()?;

    println!("Supported models: {}", ProviderCatalog::global().model_ids().join(", "));
    println!("Region: {}", config.region);
    println!("Model: {}", session.spec().model_id());
    println!("Log level: {}", config.log_level);
    println!("Type /help for commands, quit to exit\n");

    loop {
        // Reset interrupt flag before each input
        interrupted.store(false, Ordering::Relaxed);

        let line = match rl.readline("You: ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C at prompt - soft interrupt
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                // Ctrl+D - exit
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {err}"));
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(line);

        let text = match parse_command(line) {
            None => line.to_string(),
            Some(ChatCommand::Quit) => {
                println!("Goodbye!");
                break;
            }
            Some(ChatCommand::Clear) => {
                session.clear();
                renderer.print_info("Conversation cleared.");
                continue;
            }
            Some(ChatCommand::Help) => {
                for line in help_text().lines() {
                    println!("    {line}");
                }
                continue;
            }
            Some(ChatCommand::System(prompt)) => {
                match &prompt {
                    Some(p) => renderer.print_info(&format!("System prompt set to: {p}")),
                    None => renderer.print_info("System prompt cleared."),
                }
                session.set_system(prompt);
                continue;
            }
            Some(ChatCommand::History) => {
                print_history(&session);
                continue;
            }
            Some(ChatCommand::Multiline) => match read_multiline(&mut rl) {
                Some(text) if !text.trim().is_empty() => text,
                _ => continue,
            },
            Some(ChatCommand::Voice(path)) => {
                match session.voice_input(Path::new(&path)).await {
                    Ok(text) => {
                        renderer.print_info(&format!("You said: {text}"));
                        text
                    }
                    Err(err) => {
                        renderer.print_error(&err.to_string());
                        continue;
                    }
                }
            }
            Some(ChatCommand::Image { path, text }) => {
                match session.image_input(Path::new(&path), text.as_deref()).await {
                    Ok(text) => {
                        renderer.print_info(&format!("Recognized: {text}"));
                        text
                    }
                    Err(err) => {
                        renderer.print_error(&err.to_string());
                        continue;
                    }
                }
            }
            Some(ChatCommand::Invalid(message)) => {
                renderer.print_error(&message);
                continue;
            }
        };

        println!("Assistant:");
        if let Err(err) = session.process_turn(&text, &mut renderer).await {
            renderer.print_error(&err.to_string());
        }
    }

    Ok(())
}

fn read_multiline(rl: &mut DefaultEditor) -> Option<String> {
    println!("    (finish with a line containing only \".\")");
    let mut lines = Vec::new();
    loop {
        match rl.readline("... ") {
            Ok(line) if is_multiline_end(&line) => break,
            Ok(line) => lines.push(line),
            Err(_) => return None,
        }
    }
    Some(lines.join("\n"))
}

fn print_history(session: &ConversationSession) {
    let history = session.history();
    println!(
        "    History ({}/{} entries):",
        history.dialogue_len(),
        history.max_entries()
    );
    for turn in history.turns() {
        println!("      {}: {}", turn.role, turn.content);
    }
}
