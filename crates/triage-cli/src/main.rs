use anyhow::{Context, Result};
use base64::Engine;
use bat::PrettyPrinter;
use clap::{Args, Parser, Subcommand};
use cliclack::spinner;
use console::style;
use futures::StreamExt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use triage::{
    models::message::Message, result::Provenance, GenerateParams, Prompt, Settings, StreamChunk,
    Triage,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file, overrides TRIAGE_CONFIG
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Plan, augment and answer one prompt
    Generate(GenerateArgs),
    /// List the registered models
    Models,
}

#[derive(Args)]
struct GenerateArgs {
    prompt: String,

    #[arg(long)]
    system: Option<String>,

    /// JSON schema file the answer must satisfy
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Print the answer as it is generated
    #[arg(long)]
    stream: bool,

    /// Attach an image or document to the prompt
    #[arg(long = "image", value_name = "PATH")]
    attachments: Vec<PathBuf>,

    #[arg(long, overrides_with = "no_reasoning")]
    reasoning: bool,
    #[arg(long)]
    no_reasoning: bool,

    #[arg(long, overrides_with = "no_web_search")]
    web_search: bool,
    #[arg(long)]
    no_web_search: bool,

    #[arg(long, overrides_with = "no_tools")]
    tools: bool,
    #[arg(long)]
    no_tools: bool,

    /// Cross-check the answer with every registered model
    #[arg(long)]
    multi_model: bool,

    #[arg(long)]
    temperature: Option<f32>,
}

/// `--x` forces on, `--no-x` forces off, neither leaves it to the planner
fn flag(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

fn mime_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("pdf") => "application/pdf",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        _ => "application/octet-stream",
    }
}

fn user_message(text: &str, attachments: &[PathBuf]) -> Result<Message> {
    let mut message = Message::user().with_text(text);
    for path in attachments {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read attachment {}", path.display()))?;
        let data = base64::engine::general_purpose::STANDARD.encode(bytes);
        let mime = mime_type(path);
        message = if mime.starts_with("image/") {
            message.with_image(data, mime)
        } else {
            message.with_file(data, mime)
        };
    }
    Ok(message)
}

impl GenerateArgs {
    fn into_params(self) -> Result<GenerateParams> {
        let prompt = if self.attachments.is_empty() {
            Prompt::Text(self.prompt)
        } else {
            Prompt::Messages(vec![user_message(&self.prompt, &self.attachments)?])
        };
        let mut params = GenerateParams::new(prompt);
        params.system = self.system;
        if let Some(path) = self.schema {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read schema {}", path.display()))?;
            params.schema = Some(serde_json::from_str(&raw).context("Schema is not valid JSON")?);
        }
        params.stream = self.stream;
        params.reasoning = flag(self.reasoning, self.no_reasoning);
        params.use_web_search = flag(self.web_search, self.no_web_search);
        params.auto_tool = flag(self.tools, self.no_tools);
        params.multi_model = self.multi_model.then_some(true);
        params.temperature = self.temperature;
        Ok(params)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Some(path) = &cli.config {
        std::env::set_var(triage::configuration::CONFIG_PATH_VAR, path);
    }
    let triage = Settings::new()?.build()?;

    match cli.command {
        Command::Models => list_models(&triage),
        Command::Generate(args) => generate(&triage, args).await,
    }
}

fn list_models(triage: &Triage) -> Result<()> {
    for model in triage.registry().iter() {
        println!(
            "{} {}",
            style(&model.id).bold().cyan(),
            style(format!(
                "speed {} · capability {} · {} tokens",
                model.speed_rank, model.capability_rank, model.context_window
            ))
            .dim()
        );
        if !model.description.is_empty() {
            println!("    {}", model.description);
        }
        if let Some(fallback) = &model.fallback {
            println!("    {} {}", style("falls back to").dim(), fallback);
        }
    }
    Ok(())
}

async fn generate(triage: &Triage, args: GenerateArgs) -> Result<()> {
    let params = args.into_params()?;

    let spin = spinner();
    spin.start("planning");
    let result = triage.generate(params).await;
    spin.stop("");
    let (output, provenance) = result?.into_parts();

    match output {
        triage::result::Output::Text(text) => render(&text)?,
        triage::result::Output::Object { object, .. } => {
            println!("{}", serde_json::to_string_pretty(&object)?)
        }
        triage::result::Output::Stream(mut stream) => {
            let mut stdout = std::io::stdout();
            while let Some(chunk) = stream.next().await {
                match chunk? {
                    StreamChunk::Text(text) => {
                        write!(stdout, "{}", text)?;
                        stdout.flush()?;
                    }
                    StreamChunk::Object(object) => println!("{}", object),
                }
            }
            println!();
        }
    }
    print_provenance(&provenance);
    Ok(())
}

fn print_provenance(provenance: &Provenance) {
    println!("\n{} {}", style("model").dim(), style(&provenance.model).green());
    for invocation in &provenance.tool_used {
        println!(
            "{} {} {}",
            style("tool").dim(),
            style(&invocation.tool_name).magenta(),
            style(invocation.arguments.to_string()).dim()
        );
    }
    for artifact in &provenance.generated_artifacts {
        println!(
            "{} {} ({} bytes)",
            style("artifact").dim(),
            artifact.mime_type,
            artifact.payload.len()
        );
    }
    if let Some(reasoning) = &provenance.reasoning_text {
        println!("{} {}", style("reasoning").dim(), style(reasoning).italic());
    }
}

fn render(content: &str) -> Result<()> {
    PrettyPrinter::new()
        .input_from_bytes(content.as_bytes())
        .language("markdown")
        .print()?;
    println!();
    Ok(())
}
