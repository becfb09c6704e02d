use anyhow::Result;
use book2profiles::core::config::{Config, DEFAULT_CONFIG_PATH};
use book2profiles::core::io::JsonArrayFile;
use book2profiles::core::state::OutputSummary;
use book2profiles::services::llm::create_llm;
use book2profiles::services::pdf;
use book2profiles::services::workflow::ProfilePipeline;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "book2profiles", version, about = "Extract character profiles from a PDF book with a local LLM")]
struct Cli {
    /// YAML configuration file; built-in defaults are used when it is missing
    #[arg(long, value_name = "FILE", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Convert the PDF into plain book text
    ExtractText(TextArgs),
    /// Run every paragraph of the book text through the model
    ExtractProfiles {
        #[arg(long, value_name = "FILE")]
        book: Option<String>,
        #[command(flatten)]
        profiles: ProfileArgs,
    },
    /// Both stages, one after the other
    Run {
        #[command(flatten)]
        text: TextArgs,
        #[command(flatten)]
        profiles: ProfileArgs,
    },
    /// Print counts for an existing output file
    Inspect {
        #[arg(long, value_name = "FILE")]
        output: Option<String>,
    },
}

#[derive(Debug, Args)]
struct TextArgs {
    #[arg(long, value_name = "FILE")]
    pdf: Option<String>,
    #[arg(long, value_name = "FILE")]
    book: Option<String>,
}

#[derive(Debug, Args)]
struct ProfileArgs {
    #[arg(long, value_name = "FILE")]
    output: Option<String>,
    #[arg(long, value_name = "N")]
    batch_size: Option<usize>,
    #[arg(long, value_name = "NAME")]
    model: Option<String>,
}

impl TextArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(pdf) = &self.pdf {
            config.pdf_file = pdf.clone();
        }
        if let Some(book) = &self.book {
            config.book_file = book.clone();
        }
    }
}

impl ProfileArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(output) = &self.output {
            config.output_file = output.clone();
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(model) = &self.model {
            config.llm.set_model(model);
        }
    }
}

impl Command {
    fn apply(&self, config: &mut Config) {
        match self {
            Command::ExtractText(text) => text.apply(config),
            Command::ExtractProfiles { book, profiles } => {
                if let Some(book) = book {
                    config.book_file = book.clone();
                }
                profiles.apply(config);
            }
            Command::Run { text, profiles } => {
                text.apply(config);
                profiles.apply(config);
            }
            Command::Inspect { output } => {
                if let Some(output) = output {
                    config.output_file = output.clone();
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // 1. Load config, then let flags override it
    let mut config = Config::load(&cli.config)?;
    cli.command.apply(&mut config);
    config.validate()?;

    // 2. Dispatch
    match cli.command {
        Command::ExtractText(_) => extract_text(&config),
        Command::ExtractProfiles { .. } => extract_profiles(&config).await,
        Command::Run { .. } => {
            extract_text(&config)?;
            extract_profiles(&config).await
        }
        Command::Inspect { .. } => inspect(&config),
    }
}

fn extract_text(config: &Config) -> Result<()> {
    println!("Extracting text from {}", config.pdf_file);
    pdf::extract_to_file(Path::new(&config.pdf_file), Path::new(&config.book_file))?;
    Ok(())
}

async fn extract_profiles(config: &Config) -> Result<()> {
    let llm = create_llm(config)?;
    let pipeline = ProfilePipeline::new(config, llm)?;
    pipeline.run_file(Path::new(&config.book_file)).await?;
    Ok(())
}

fn inspect(config: &Config) -> Result<()> {
    let entries = JsonArrayFile::new(&config.output_file).load()?;
    let summary = OutputSummary::from_entries(&entries);

    println!("{}: {} entries", config.output_file, summary.total);
    println!("  character records: {}", summary.profiles);
    println!("  error records: {}", summary.error_count());
    for (kind, count) in &summary.errors {
        println!("    {}: {}", kind, count);
    }
    if summary.other > 0 {
        println!("  other values: {}", summary.other);
    }
    println!("  distinct characters: {}", summary.names.len());
    for name in &summary.names {
        println!("    {}", name);
    }
    Ok(())
}
