use std::{
    io::{BufRead, Write},
    sync::Arc,
};

use clap::Parser;
use tracing_subscriber::EnvFilter;
use vajra::{
    Config,
    Corpus,
    DataDir,
    ResponseOrchestrator,
    cli::{self, ChatCommand, Cli, Command},
    corpus,
    error::{self, Error},
    gemini::{GeminiEmbedder, GeminiGenerator},
    index_builder,
};

const DISCLAIMER: &str = "This is general legal information, not legal advice. Consult a qualified lawyer for your situation.";

const PREVIEW_CHARS: usize = 200;

const EXAMPLE_QUESTIONS: &[&str] = &[
    "What is the punishment for theft under the BNS?",
    "Is a confession made to a police officer admissible as evidence?",
    "Within how many hours must an arrested person be produced before a magistrate?",
    "What does the BNS say about organised crime?",
    "How do I file a zero FIR?",
];

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("VAJRA_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> error::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let config = Config::load(cli.config.as_deref(), &data_dir)?;

    match cli.command {
        Command::Build(args) => {
            cmd_build(&config, &data_dir, args.corpus.as_deref())?;
        }
        Command::Ask(args) => {
            let orchestrator = open_orchestrator(&config, &data_dir)?;
            let answer = runtime()?.block_on(orchestrator.answer(&args.query));
            println!("{answer}");
            println!();
            println!("{DISCLAIMER}");
        }
        Command::Search(args) => {
            cmd_search(&config, &data_dir, &args)?;
        }
        Command::Find(args) => {
            let corpora = load_corpora(&config, &data_dir)?;
            print_find(&corpora, &args.term, args.corpus.as_deref(), args.limit)?;
        }
        Command::Status(args) => {
            cmd_status(&config, &data_dir, args.json)?;
        }
        Command::Chat => {
            let orchestrator = open_orchestrator(&config, &data_dir)?;
            cmd_chat(&orchestrator)?;
        }
        Command::Mcp => {
            let orchestrator = open_orchestrator(&config, &data_dir)?;
            vajra::mcp::run_mcp(orchestrator, data_dir.root().to_path_buf())?;
        }
        Command::Completions(_) => {}
    }

    Ok(())
}

fn runtime() -> error::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Config(format!("failed to start tokio runtime: {e}")))
}

/// Load every corpus and connect the Gemini services. Any corpus that fails
/// to load is fatal.
fn open_orchestrator(
    config: &Config,
    data_dir: &DataDir,
) -> error::Result<ResponseOrchestrator> {
    let embedder = Arc::new(GeminiEmbedder::from_env(&config.embedding)?);
    let generator = Arc::new(GeminiGenerator::from_env(&config.generation)?);
    ResponseOrchestrator::from_config(config, data_dir, embedder, generator)
}

fn load_corpora(config: &Config, data_dir: &DataDir) -> error::Result<Vec<Corpus>> {
    config
        .corpora
        .iter()
        .map(|c| Corpus::from_config(c, data_dir, config.embedding.dimension))
        .collect()
}

fn cmd_build(
    config: &Config,
    data_dir: &DataDir,
    only: Option<&str>,
) -> error::Result<()> {
    let targets = match only {
        Some(name) => vec![config.corpus(name)?],
        None => config.corpora.iter().collect(),
    };

    let embedder = GeminiEmbedder::from_env(&config.embedding)?;
    let runtime = runtime()?;

    for corpus in targets {
        eprintln!("Building index for '{}'...", corpus.name);
        let count = runtime.block_on(index_builder::build_corpus_index(
            corpus, data_dir, &embedder,
        ))?;
        eprintln!("  Indexed {count} sections");
    }

    eprintln!("Build complete.");
    Ok(())
}

fn cmd_search(
    config: &Config,
    data_dir: &DataDir,
    args: &cli::SearchArgs,
) -> error::Result<()> {
    let orchestrator = open_orchestrator(config, data_dir)?;
    let k = args.count.unwrap_or(config.retrieval.top_k).max(1);
    let context = runtime()?.block_on(orchestrator.retriever().search(&args.query, k));

    if args.json {
        println!("{}", serde_json::to_string_pretty(&context)?);
        return Ok(());
    }

    if context.is_empty() {
        println!("No results found for \"{}\"", args.query);
        return Ok(());
    }

    for group in context.groups() {
        if group.results.is_empty() {
            continue;
        }
        println!("{}:", group.label);
        for result in &group.results {
            println!(
                "  {:>8.4}  Section {} - {}",
                result.relevance_score,
                result.entry.section_number,
                result.entry.section_title
            );
        }
    }
    Ok(())
}

fn print_find(
    corpora: &[Corpus],
    term: &str,
    only: Option<&str>,
    limit: usize,
) -> error::Result<()> {
    let found = corpus::find_in(corpora, term, only, limit)?;

    if found.iter().all(|(_, hits)| hits.is_empty()) {
        println!("No sections mention '{term}'.");
        return Ok(());
    }

    for (corpus, hits) in found {
        if hits.is_empty() {
            continue;
        }
        println!("{}:", corpus.label());
        for entry in hits {
            println!("  Section {} - {}", entry.section_number, entry.section_title);
            println!("    {}", entry.preview(PREVIEW_CHARS));
        }
    }
    Ok(())
}

fn cmd_status(config: &Config, data_dir: &DataDir, json: bool) -> error::Result<()> {
    let corpora: Vec<(String, String, Result<usize, String>)> = config
        .corpora
        .iter()
        .map(|c| {
            let sections = Corpus::from_config(c, data_dir, config.embedding.dimension)
                .map(|corpus| corpus.len())
                .map_err(|e| e.to_string());
            (c.name.clone(), c.label.clone(), sections)
        })
        .collect();

    if json {
        let corpora: Vec<serde_json::Value> = corpora
            .iter()
            .map(|(name, label, sections)| match sections {
                Ok(n) => serde_json::json!({ "name": name, "label": label, "sections": n }),
                Err(e) => serde_json::json!({ "name": name, "label": label, "error": e }),
            })
            .collect();
        let status = serde_json::json!({
            "dataDir": data_dir.root().display().to_string(),
            "embeddingModel": config.embedding.model,
            "generationModel": config.generation.model,
            "dimension": config.embedding.dimension,
            "corpora": corpora,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("Data directory: {}", data_dir.root().display());
        println!(
            "Embedding model: {} ({} dims)",
            config.embedding.model, config.embedding.dimension
        );
        println!("Generation model: {}", config.generation.model);
        println!("Corpora: {}", corpora.len());
        for (name, label, sections) in &corpora {
            match sections {
                Ok(n) => println!("  {label} ({name}): {n} sections"),
                Err(e) => println!("  {label} ({name}): unavailable ({e})"),
            }
        }
    }
    Ok(())
}

fn cmd_chat(orchestrator: &ResponseOrchestrator) -> error::Result<()> {
    let runtime = runtime()?;
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();

    println!("VAJRA legal assistant. Type 'help' for commands, 'quit' to leave.");
    println!("{DISCLAIMER}");

    loop {
        print!("\n> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        match ChatCommand::parse(&line) {
            ChatCommand::Empty => continue,
            ChatCommand::Quit => break,
            ChatCommand::Help => print_chat_help(),
            ChatCommand::Sections => {
                for c in orchestrator.retriever().corpora() {
                    println!("  {} ({}): {} sections", c.label(), c.name(), c.len());
                }
            }
            ChatCommand::Examples => {
                for q in EXAMPLE_QUESTIONS {
                    println!("  {q}");
                }
            }
            ChatCommand::Find(term) => {
                print_find(orchestrator.retriever().corpora(), term, None, 5)?;
            }
            ChatCommand::Ask(question) => {
                let answer = runtime.block_on(orchestrator.answer(question));
                println!("{answer}");
            }
        }
    }

    println!("Goodbye.");
    Ok(())
}

fn print_chat_help() {
    println!("Ask any question about the BNS, BSA or BNSS, or use:");
    println!("  sections      show loaded corpora");
    println!("  examples      show sample questions");
    println!("  find <term>   list sections mentioning a term");
    println!("  search <term> same as find");
    println!("  quit | exit   leave the session");
}
